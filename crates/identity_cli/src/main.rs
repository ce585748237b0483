//! Identity reconciliation command line entry point.
//!
//! # Responsibility
//! - Run one identify request against a SQLite contact store.
//! - Print the unified identity as JSON on stdout.
//!
//! # Usage
//!
//! ```bash
//! identity_cli identify --db contacts.sqlite3 --email doc@hillvalley.edu --phone 123456
//! identity_cli cluster --db contacts.sqlite3 --id 1 --pretty
//! ```

use clap::{Args, Parser, Subcommand};
use identity_core::db::open_db_with;
use identity_core::{
    init_logging, IdentifyError, IdentifyRequest, IdentifyService, RepoError, RetryPolicy,
    StoreConfig,
};
use log::error;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

const EXIT_INTERNAL_FAILURE: u8 = 1;
const EXIT_INVALID_INPUT: u8 = 2;

#[derive(Parser)]
#[command(name = "identity_cli")]
#[command(version)]
#[command(about = "Reconcile customer contact records into unified identities")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    store: StoreArgs,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, global = true, default_value_t = identity_core::default_log_level().to_string())]
    log_level: String,

    /// Absolute directory for rolling log files (logging is off when unset)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Args)]
struct StoreArgs {
    /// SQLite database file (created and migrated when missing)
    #[arg(long, global = true, default_value = "contacts.sqlite3")]
    db: PathBuf,

    /// Milliseconds to wait on a locked database
    #[arg(long, global = true, default_value_t = 5000)]
    busy_timeout_ms: u64,

    /// Total attempts for a reconciliation hitting store conflicts
    #[arg(long, global = true, default_value_t = 3)]
    max_attempts: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile an (email, phone number) observation
    Identify {
        #[arg(long)]
        email: Option<String>,

        #[arg(long = "phone")]
        phone_number: Option<String>,
    },

    /// Show the unified view of the cluster containing a contact
    Cluster {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_ref() {
        if let Err(err) = init_logging(&cli.log_level, log_dir) {
            eprintln!("failed to initialize logging: {err}");
            return ExitCode::from(EXIT_INTERNAL_FAILURE);
        }
    }

    match run(&cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) if err.is_caller_error() => {
            print_error(err.to_string(), cli.pretty);
            ExitCode::from(EXIT_INVALID_INPUT)
        }
        Err(err) => {
            error!("event=cli_run module=cli status=error error={err}");
            eprintln!("{err}");
            print_error("internal error".to_string(), cli.pretty);
            ExitCode::from(EXIT_INTERNAL_FAILURE)
        }
    }
}

fn run(cli: &Cli) -> Result<String, IdentifyError> {
    let config = StoreConfig {
        busy_timeout: Duration::from_millis(cli.store.busy_timeout_ms),
    };
    let mut conn =
        open_db_with(&cli.store.db, &config).map_err(|err| IdentifyError::Store(err.into()))?;
    let mut service = IdentifyService::try_new(&mut conn)?.with_retry_policy(RetryPolicy {
        max_attempts: cli.store.max_attempts,
        ..RetryPolicy::default()
    });

    let text = match &cli.command {
        Commands::Identify {
            email,
            phone_number,
        } => {
            let request = IdentifyRequest {
                email: email.clone(),
                phone_number: phone_number.clone(),
            };
            render(&service.identify(&request)?, cli.pretty)
        }
        Commands::Cluster { id } => render(&service.cluster_view(*id)?, cli.pretty),
    };

    text.map_err(|err| {
        IdentifyError::Store(RepoError::InvalidData(format!(
            "failed to encode response: {err}"
        )))
    })
}

fn print_error(message: String, pretty: bool) {
    match render(&ErrorBody { error: message }, pretty) {
        Ok(text) => println!("{text}"),
        Err(err) => eprintln!("{err}"),
    }
}

fn render<T: Serialize>(value: &T, pretty: bool) -> Result<String, serde_json::Error> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}
