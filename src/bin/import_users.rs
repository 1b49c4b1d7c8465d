use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use log::error;

use favboard::core::db::Database;
use favboard::import::{HttpUserSource, ImportJob};

/// Import users from a JSON URL
#[derive(Debug, Parser)]
#[command(name = "import_users")]
struct Args {
    /// URL answering with a JSON array of `{name, email}` records
    url: String,
    /// Maximum number of records to import
    #[arg(short, long)]
    limit: Option<usize>,
    /// SQLite database file
    #[arg(short, long, env = "FAVBOARD_DATABASE", default_value = "favboard.db")]
    database: PathBuf,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    let db = match Database::open(&args.database) {
        Ok(db) => db,
        Err(e) => {
            error!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let job = ImportJob::new(HttpUserSource::default());
    match job.run(&db, &args.url, args.limit).await {
        Ok(report) => {
            if report.failed > 0 {
                log::warn!("{} records could not be read", report.failed);
            }
            println!("Successfully imported {} users", report.imported);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
