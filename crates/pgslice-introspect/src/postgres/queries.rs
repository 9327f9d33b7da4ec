use sqlx::PgPool;

use pgslice_core::{Error, Result};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RawTable {
    pub name: String,
}

pub async fn list_tables(pool: &PgPool, schema: &str) -> Result<Vec<RawTable>> {
    sqlx::query_as::<_, RawTable>(
        r#"
        select c.relname::text as name
        from pg_class c
        join pg_namespace n on n.oid = c.relnamespace
        where n.nspname = $1
          and c.relkind in ('r', 'p')
        order by c.relname
        "#,
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|err| Error::Query(err.to_string()))
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RawColumn {
    pub table_name: String,
    pub ordinal_position: i16,
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub default: Option<String>,
}

/// Every live column of every ordinary table in `schema`.
pub async fn list_columns(pool: &PgPool, schema: &str) -> Result<Vec<RawColumn>> {
    sqlx::query_as::<_, RawColumn>(
        r#"
        select
          c.relname::text as table_name,
          a.attnum as ordinal_position,
          a.attname::text as name,
          pg_catalog.format_type(a.atttypid, a.atttypmod) as data_type,
          (not a.attnotnull) as is_nullable,
          pg_get_expr(ad.adbin, ad.adrelid) as "default"
        from pg_attribute a
        join pg_class c on c.oid = a.attrelid
        join pg_namespace n on n.oid = c.relnamespace
        left join pg_attrdef ad on ad.adrelid = a.attrelid and ad.adnum = a.attnum
        where n.nspname = $1
          and c.relkind in ('r', 'p')
          and a.attnum > 0
          and not a.attisdropped
        order by c.relname, a.attnum
        "#,
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|err| Error::Query(err.to_string()))
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RawPrimaryKey {
    pub table_name: String,
    pub columns: Vec<String>,
}

pub async fn list_primary_keys(pool: &PgPool, schema: &str) -> Result<Vec<RawPrimaryKey>> {
    sqlx::query_as::<_, RawPrimaryKey>(
        r#"
        select
          c.relname::text as table_name,
          array_agg(a.attname::text order by k.ordinality) as columns
        from pg_constraint con
        join pg_class c on c.oid = con.conrelid
        join pg_namespace n on n.oid = c.relnamespace
        join unnest(con.conkey) with ordinality as k(attnum, ordinality) on true
        join pg_attribute a on a.attrelid = c.oid and a.attnum = k.attnum
        where n.nspname = $1
          and con.contype = 'p'
        group by c.relname
        order by c.relname
        "#,
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|err| Error::Query(err.to_string()))
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RawForeignKey {
    pub name: String,
    pub table_name: String,
    pub columns: Vec<String>,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

/// Foreign keys declared by tables of `schema`, with paired column lists.
pub async fn list_foreign_keys(pool: &PgPool, schema: &str) -> Result<Vec<RawForeignKey>> {
    sqlx::query_as::<_, RawForeignKey>(
        r#"
        select
          con.conname::text as name,
          src_rel.relname::text as table_name,
          array_agg(src_att.attname::text order by s_ord.ordinality) as columns,
          ref_nsp.nspname::text as referenced_schema,
          ref_rel.relname::text as referenced_table,
          array_agg(ref_att.attname::text order by s_ord.ordinality) as referenced_columns
        from pg_constraint con
        join pg_class src_rel on src_rel.oid = con.conrelid
        join pg_namespace src_nsp on src_nsp.oid = src_rel.relnamespace
        join pg_class ref_rel on ref_rel.oid = con.confrelid
        join pg_namespace ref_nsp on ref_nsp.oid = ref_rel.relnamespace
        join unnest(con.conkey, con.confkey) with ordinality as s_ord(src_attnum, ref_attnum, ordinality) on true
        join pg_attribute src_att on src_att.attrelid = src_rel.oid and src_att.attnum = s_ord.src_attnum
        join pg_attribute ref_att on ref_att.attrelid = ref_rel.oid and ref_att.attnum = s_ord.ref_attnum
        where src_nsp.nspname = $1
          and con.contype = 'f'
        group by con.conname, src_rel.relname, ref_nsp.nspname, ref_rel.relname
        order by src_rel.relname, con.conname
        "#,
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|err| Error::Query(err.to_string()))
}
