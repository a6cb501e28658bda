use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mirage::server::{self, ServerConfig};
use mirage::{constants, Exporter, Mirage, Runtime, SharedMirage, StoreConfig};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Parser, Debug)]
#[command(name = "mirage")]
#[command(version)]
#[command(about = "Mirror and resolver for the PLC DID directory", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Config {
    /// Postgres host
    #[arg(long, env = "POSTGRES_HOST")]
    postgres_host: String,

    /// Postgres port
    #[arg(long, env = "POSTGRES_PORT", default_value = "5432")]
    postgres_port: String,

    /// Postgres database name
    #[arg(long, env = "POSTGRES_DB")]
    postgres_db: String,

    /// Postgres user
    #[arg(long, env = "POSTGRES_USER")]
    postgres_user: String,

    /// Postgres password
    #[arg(long, env = "POSTGRES_PASS")]
    postgres_pass: String,

    /// Redis address for the lookup tier
    #[arg(long, env = "REDIS_HOST")]
    redis_host: String,

    /// Upstream PLC directory root URL
    #[arg(long, env = "PLC_ROOT", default_value = constants::DEFAULT_PLC_ROOT)]
    plc_root: String,

    /// Log level (debug|info|warn|error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the mirror: HTTP server plus the export loop
    Run {
        /// Listen port
        #[arg(long, env = "SERVER_PORT", default_value = "8080")]
        port: u16,

        /// Listen host
        #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0")]
        host: String,
    },

    /// Resolve a DID against local state and print its document
    Resolve {
        #[arg(long)]
        did: String,
    },

    /// Backfill the lookup tier from the handle index
    FillCache {
        /// Number of handle index rows to skip
        #[arg(long, default_value = "0")]
        skip: usize,
    },
}

fn init_logger(level: &str) {
    let filter = match level {
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };

    // RUST_LOG overrides the flag entirely
    if std::env::var("RUST_LOG").is_ok() {
        return env_logger::init();
    }

    env_logger::Builder::new()
        .filter_level(filter)
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(&cli.config.log_level);

    let store_config = StoreConfig {
        host: cli.config.postgres_host.clone(),
        port: cli.config.postgres_port.clone(),
        db: cli.config.postgres_db.clone(),
        user: cli.config.postgres_user.clone(),
        pass: cli.config.postgres_pass.clone(),
    };

    let mirage: SharedMirage = Arc::new(
        Mirage::new(&store_config, &cli.config.redis_host)
            .await
            .context("failed to initialize mirage")?,
    );

    match cli.command {
        Command::Run { port, host } => run(mirage, cli.config.plc_root, host, port).await,
        Command::Resolve { did } => {
            let document = mirage.resolve_did(&did).await?;
            println!("{}", serde_json::to_string_pretty(&document)?);
            Ok(())
        }
        Command::FillCache { skip } => {
            mirage.fill_cache(skip).await?;
            Ok(())
        }
    }
}

async fn run(mirage: SharedMirage, plc_root: String, host: String, port: u16) -> Result<()> {
    let runtime = Runtime::new();

    let config = ServerConfig {
        host: host.clone(),
        port,
        version: constants::VERSION.to_string(),
    };
    let app = server::create_router(Arc::clone(&mirage), config);

    log::info!("starting exporter");
    let exporter = Exporter::new(Arc::clone(&mirage), plc_root, runtime.shutdown_signal())
        .await
        .context("failed to initialize exporter")?;

    let mut background_tasks = JoinSet::new();
    background_tasks.spawn(exporter.run());

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind listen address")?;

    log::info!("starting web server on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(runtime.create_shutdown_future())
        .await
        .context("server error")?;

    runtime
        .wait_for_shutdown_cleanup("Server", &mut background_tasks)
        .await;

    Ok(())
}
