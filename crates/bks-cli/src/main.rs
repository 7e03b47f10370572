use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(name = "bks")]
#[command(about = "Brokerage to Notion / Sheets synchronizer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one synchronization pass against a captured brokerage session
    Sync {
        /// Layered config paths in merge order (base -> account -> local)
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Session capture (JSON) to read positions, trades and account values from
        #[arg(long)]
        session: String,

        /// Run a single stage, ignoring the stage toggles
        #[arg(long, value_enum)]
        only: Option<StageArg>,

        /// Fail instead of warning when the config carries keys no enabled stage reads
        #[arg(long, default_value_t = false)]
        strict_config: bool,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum StageArg {
    Positions,
    Trades,
    AccountSummary,
}

impl From<StageArg> for bks_config::Stage {
    fn from(arg: StageArg) -> Self {
        match arg {
            StageArg::Positions => bks_config::Stage::Positions,
            StageArg::Trades => bks_config::Stage::Trades,
            StageArg::AccountSummary => bks_config::Stage::AccountSummary,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Sync {
            config_paths,
            session,
            only,
            strict_config,
        } => {
            commands::sync::run_sync(commands::sync::SyncArgs {
                config_paths,
                session,
                only: only.map(Into::into),
                strict_config,
            })
            .await?;
        }

        Commands::ConfigHash { paths } => {
            let loaded = bks_config::load_layered_yaml(paths.as_slice())?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
