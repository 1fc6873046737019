//! SQL Server script generator.
//!
//! Connects to a database and writes one T-SQL script recreating its
//! tables, data, indexes and foreign keys.
//!
//! ```text
//! generatescript "server=.;database=test_db;user=sa;password=password" "c:\temp\script.sql"
//! ```
//!
//! # Security Guarantees
//! - Read-only database operations only
//! - Passwords are never logged

use std::process::ExitCode;

use sqlscript_core::logging::init_logging;
use sqlscript_generate::{error_report, parse_args, run};
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) => {
            println!("{}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    if let Err(e) = init_logging(0, false) {
        eprintln!("{}", error_report(&e));
        return ExitCode::from(e.exit_code());
    }

    match run(cli).await {
        Ok(summary) => {
            info!(
                "Script written to {} ({} tables, {} indexes, {} foreign keys, {} statements)",
                summary.output.display(),
                summary.tables,
                summary.indexes,
                summary.foreign_keys,
                summary.statements
            );
            if summary.skipped > 0 {
                info!("{} objects skipped", summary.skipped);
            }
            if summary.excluded > 0 {
                info!("{} statements excluded", summary.excluded);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", error_report(&e));
            ExitCode::from(e.exit_code())
        }
    }
}
