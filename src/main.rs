//! coldstore command-line entry point

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use tracing::error;

use coldstore::account::{AccountStatus, AccountValidator};
use coldstore::config::DEFAULT_CONFIG_PATH;
use coldstore::{logging, signal, Config, Pipeline};

#[derive(Parser)]
#[command(
    name = "coldstore",
    version,
    about = "Audit-artifact encryption and offsite retention pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct CommonArgs {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Increase verbosity (-v per-artifact transitions, -vv debug detail)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline once
    Run {
        #[command(flatten)]
        common: CommonArgs,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration, keys, staging, and destination without
    /// touching any artifact
    ConfigTest {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Ask the external account validator about one account
    CheckAccount {
        /// Account name to check
        name: String,

        #[command(flatten)]
        common: CommonArgs,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Run { common, json } => run(&common, json),
        Command::ConfigTest { common } => config_test(&common),
        Command::CheckAccount { name, common } => check_account(&common, &name),
    };
    ExitCode::from(code as u8)
}

/// Load config and install logging; errors here are configuration errors
fn setup(common: &CommonArgs) -> Result<Config, i32> {
    let config = match Config::from_file(&common.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("coldstore: {}", e);
            return Err(1);
        }
    };
    if let Err(e) = logging::init(common.verbose, config.logging.file.as_deref()) {
        eprintln!("coldstore: cannot open log file: {}", e);
        return Err(1);
    }
    Ok(config)
}

fn run(common: &CommonArgs, json: bool) -> i32 {
    let config = match setup(common) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let cancel = match signal::install() {
        Ok(flag) => flag,
        Err(e) => {
            eprintln!("coldstore: cannot install signal handler: {}", e);
            return 3;
        }
    };

    let pipeline = Pipeline::new(config).with_cancel_flag(cancel);
    match pipeline.run() {
        Ok(summary) => {
            if json {
                println!("{}", summary.to_json());
            } else {
                println!("{}", summary);
            }
            summary.exit_code()
        }
        Err(e) => {
            error!(error = %e, "run aborted");
            eprintln!("coldstore: {}", e);
            e.exit_code()
        }
    }
}

fn config_test(common: &CommonArgs) -> i32 {
    let config = match setup(common) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let pipeline = Pipeline::new(config);
    let report = pipeline.validate();
    println!("{}", report);
    if report.passed() {
        0
    } else {
        1
    }
}

fn check_account(common: &CommonArgs, name: &str) -> i32 {
    let config = match setup(common) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let filter = match &config.account_filter {
        Some(filter) => filter,
        None => {
            eprintln!("coldstore: no [account_filter] configured");
            return 1;
        }
    };

    let validator = AccountValidator::new(filter);
    match validator.status(name) {
        Ok(status) => {
            println!("{}: {}", name, status);
            let allowed = match status {
                AccountStatus::Active => true,
                AccountStatus::Inactive => false,
                AccountStatus::Failure(_) => !filter.deny_on_failure,
            };
            if allowed {
                0
            } else {
                1
            }
        }
        Err(e) => {
            eprintln!("coldstore: {}", e);
            3
        }
    }
}
