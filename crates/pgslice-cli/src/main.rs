mod registry;

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use pgslice_core::{
    Error as CoreError, GeneratorConfig, OrderOptions, SchemaGraph, render_queries, starter_config,
};
use pgslice_extract::{ExtractOptions, Extractor, Multiplicity, PgRowSource, Seed};
use pgslice_introspect::{IntrospectOptions, Introspector, PostgresIntrospector};
use registry::{
    RunContext, RunOptions, init_console_logging, init_run_logging, redact_connection, start_run,
    write_report, write_sql, write_text,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const STARTER_HEADER: &str = "# Starter configuration generated by `pgslice inspect`.\n\
# Review primary keys and proto names before running `pgslice generate`.\n\n";

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unsupported engine: {0}")]
    UnsupportedEngine(String),
}

#[derive(Parser, Debug)]
#[command(name = "pgslice", version, about = "Extract a connected slice of Postgres rows")]
struct Cli {
    /// Log at debug level on stderr and in the run log.
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract the rows connected to one seed row as INSERT statements.
    Extract(ExtractArgs),
    /// Print a starter configuration for a schema.
    Inspect(InspectArgs),
    /// Render CRUD queries for every configured schema.
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
struct ConnArgs {
    /// Database connection string (flag form, or `DATABASE_URL`).
    #[arg(long, value_name = "CONNECTION_STRING", env = "DATABASE_URL", hide_env_values = true)]
    conn: Option<String>,
    /// Database connection string (positional form).
    #[arg(value_name = "CONNECTION_STRING")]
    conn_pos: Option<String>,
}

impl ConnArgs {
    /// The positional form wins over the flag and the environment.
    fn resolve(self) -> Result<String, CliError> {
        self.conn_pos
            .or(self.conn)
            .filter(|conn| !conn.is_empty())
            .ok_or_else(|| CliError::InvalidConfig("connection string is required".to_string()))
    }
}

#[derive(Args, Debug)]
struct ExtractArgs {
    #[command(flatten)]
    conn: ConnArgs,
    /// Table holding the seed row.
    #[arg(long)]
    table: String,
    /// Column matched against the seed value.
    #[arg(long, default_value = "id")]
    column: String,
    /// Seed value, typed by the column.
    #[arg(long)]
    value: String,
    /// Schema to extract from.
    #[arg(long, default_value = "public")]
    schema: String,
    /// Generator configuration supplying skipped tables and primary keys.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Also write the script here; `-` prints it to stdout.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Output directory for runs.
    #[arg(long, default_value = "runs")]
    run_dir: PathBuf,
    /// Abort when a single fetch takes longer than this.
    #[arg(long, value_name = "SECONDS")]
    timeout_secs: Option<u64>,
    /// Fail instead of keeping the latest row when a lookup matches several.
    #[arg(long, default_value_t = false)]
    reject_ambiguous: bool,
    /// Leave a foreign key out of insertion ordering (`table.column`).
    #[arg(long, value_name = "TABLE.COLUMN")]
    defer: Vec<String>,
    /// Wrap the script in BEGIN/COMMIT.
    #[arg(long, default_value_t = false)]
    transaction: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    #[command(flatten)]
    conn: ConnArgs,
    /// Schema to describe.
    #[arg(long, default_value = "public")]
    schema: String,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[command(flatten)]
    conn: ConnArgs,
    /// Generator configuration.
    #[arg(long, default_value = "pgslice.toml")]
    config: PathBuf,
    /// Output path; `-` prints to stdout.
    #[arg(long, default_value = "generated.sql")]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Extract(args) => run_extract(args, cli.debug).await,
        Command::Inspect(args) => run_inspect(args, cli.debug).await,
        Command::Generate(args) => run_generate(args, cli.debug).await,
    }
}

async fn run_extract(args: ExtractArgs, debug: bool) -> Result<(), CliError> {
    let ExtractArgs {
        conn,
        table,
        column,
        value,
        schema,
        config,
        out,
        run_dir,
        timeout_secs,
        reject_ambiguous,
        defer,
        transaction,
    } = args;

    let conn = conn.resolve()?;
    let engine = detect_engine(&conn)?;
    let order = parse_deferred(&defer)?;

    let introspect_options = match &config {
        Some(path) => {
            let config = GeneratorConfig::load(path)?;
            match config.schema(&schema) {
                Some(schema_config) => IntrospectOptions::from_schema_config(&schema, schema_config),
                None => IntrospectOptions::for_schema(&schema),
            }
        }
        None => IntrospectOptions::for_schema(&schema),
    };

    let run_id = Uuid::new_v4().to_string();
    let run_ctx = RunContext {
        run_id: run_id.clone(),
        started_at: chrono::Utc::now(),
        engine: engine.to_string(),
        run_dir,
        options: RunOptions {
            schema: schema.clone(),
            table: table.clone(),
            column: column.clone(),
            value: value.clone(),
            config,
            timeout_secs,
            reject_ambiguous,
            defer,
            transaction,
        },
        connection: redact_connection(&conn),
    };

    let run_paths = start_run(&run_ctx)?;
    init_run_logging(&run_paths.logs_path, debug)?;

    tracing::info!(event = "run_started", run_id = %run_id, engine = %engine);
    let timer = Instant::now();

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let pool = connect(&conn).await?;
    let graph = introspect(&pool, &introspect_options).await?;

    let seed = Seed::parse(&graph, &table, &column, &value)?;
    let options = ExtractOptions {
        multiplicity: if reject_ambiguous {
            Multiplicity::Reject
        } else {
            Multiplicity::Latest
        },
        fetch_timeout: timeout_secs.map(Duration::from_secs),
        order,
    };

    let source = PgRowSource::new(pool.clone());
    let extraction = match Extractor::new(&graph, &source, options)
        .extract(&seed, &cancel)
        .await
    {
        Ok(extraction) => extraction,
        Err(err) => {
            tracing::error!(event = "run_finished", status = "failed", error = %err);
            return Err(err.into());
        }
    };

    if extraction.is_empty() {
        tracing::warn!(event = "seed_absent", table = %table, column = %column, value = %value);
    }

    let sql = extraction.to_sql(transaction);
    let out_file = out.as_deref().filter(|path| !is_stdout(path));
    write_sql(&run_paths, &sql, out_file)?;
    tracing::info!(event = "sql_written", path = %run_paths.sql_path.display());
    if out.as_deref().is_some_and(is_stdout) {
        std::io::stdout().write_all(sql.as_bytes())?;
    }

    write_report(&run_paths, &extraction.report)?;
    tracing::info!(event = "report_written", path = %run_paths.report_path.display());

    tracing::info!(
        event = "run_finished",
        status = "success",
        rows = extraction.report.rows_total,
        duration_ms = timer.elapsed().as_millis() as u64
    );

    Ok(())
}

async fn run_inspect(args: InspectArgs, debug: bool) -> Result<(), CliError> {
    init_console_logging(debug)?;
    let conn = args.conn.resolve()?;
    detect_engine(&conn)?;

    let pool = connect(&conn).await?;
    let graph = introspect(&pool, &IntrospectOptions::for_schema(&args.schema)).await?;
    if graph.is_empty() {
        return Err(CliError::InvalidConfig(format!(
            "no tables found in schema {}",
            args.schema
        )));
    }

    let config = starter_config(&args.schema, &graph).to_toml_string()?;
    let mut stdout = std::io::stdout();
    stdout.write_all(STARTER_HEADER.as_bytes())?;
    stdout.write_all(config.as_bytes())?;
    Ok(())
}

async fn run_generate(args: GenerateArgs, debug: bool) -> Result<(), CliError> {
    init_console_logging(debug)?;
    let conn = args.conn.resolve()?;
    detect_engine(&conn)?;

    let config = GeneratorConfig::load(&args.config)?;
    if config.schema_config.is_empty() {
        return Err(CliError::InvalidConfig(format!(
            "{} configures no schemas",
            args.config.display()
        )));
    }

    let pool = connect(&conn).await?;
    let mut graphs = BTreeMap::new();
    for (schema, schema_config) in &config.schema_config {
        let options = IntrospectOptions::from_schema_config(schema, schema_config);
        graphs.insert(schema.clone(), introspect(&pool, &options).await?);
    }

    let queries = render_queries(&config, &graphs)?;
    if is_stdout(&args.out) {
        std::io::stdout().write_all(queries.as_bytes())?;
    } else {
        write_text(&args.out, &queries)?;
        tracing::info!(event = "queries_written", path = %args.out.display());
    }
    Ok(())
}

async fn connect(conn: &str) -> Result<PgPool, CliError> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect(conn)
        .await?;
    Ok(pool)
}

async fn introspect(pool: &PgPool, options: &IntrospectOptions) -> Result<SchemaGraph, CliError> {
    let introspector = PostgresIntrospector::new(pool.clone());
    tracing::info!(
        event = "introspection_started",
        engine = introspector.engine(),
        schema = %options.schema
    );
    let graph = introspector.introspect(options).await?;
    tracing::info!(
        event = "introspection_finished",
        schema = %options.schema,
        tables = graph.len()
    );
    Ok(graph)
}

/// Cancel `token` on Ctrl-C, or SIGTERM on unix.
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        cancel_on_shutdown(wait_for_shutdown().await, &token);
    });
}

async fn wait_for_shutdown() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => result,
                    _ = sigterm.recv() => Ok(()),
                }
            }
            Err(err) => {
                tracing::warn!(event = "sigterm_unavailable", error = %err);
                tokio::signal::ctrl_c().await
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

/// Cancels only on a delivered signal; a failed listener leaves the run alone.
fn cancel_on_shutdown(signal: std::io::Result<()>, token: &CancellationToken) {
    match signal {
        Ok(()) => {
            tracing::warn!(event = "cancel_requested");
            token.cancel();
        }
        Err(err) => {
            tracing::error!(event = "signal_handler_failed", error = %err);
        }
    }
}

fn parse_deferred(defer: &[String]) -> Result<OrderOptions, CliError> {
    defer.iter().try_fold(OrderOptions::new(), |options, edge| {
        match edge.split_once('.') {
            Some((table, column)) if !table.is_empty() && !column.is_empty() => {
                Ok(options.defer(table, column))
            }
            _ => Err(CliError::InvalidConfig(format!(
                "--defer expects table.column, got {edge}"
            ))),
        }
    })
}

fn is_stdout(path: &Path) -> bool {
    path.as_os_str() == "-"
}

fn detect_engine(conn: &str) -> Result<&'static str, CliError> {
    if conn.starts_with("postgres://") || conn.starts_with("postgresql://") {
        Ok("postgres")
    } else {
        Err(CliError::UnsupportedEngine(
            redact_connection(conn).redacted,
        ))
    }
}
