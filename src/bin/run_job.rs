use std::{error::Error, path::PathBuf, process::ExitCode};

use clap::Parser;
use cqc_exports::config::{load_dotenv, Settings};
use cqc_exports::run::run_with_reqwest;
use log::{error, info};

#[derive(Parser, Debug)]
#[command(version, about = "Download the CQC CSV exports once", long_about = None)]
struct Args {
    /// Environment name, e.g. test, prod.  Loads `.env/<env>.env`
    #[arg(short, long)]
    env: Option<String>,

    /// Where the CSV files are saved, overrides DATA_DIR
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

/// Run this job from cron.  Exits with 0 only if every export was saved.
fn main() -> Result<ExitCode, Box<dyn Error>> {
    let args = Args::parse();
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    load_dotenv(args.env.as_deref())?;
    let mut settings = Settings::from_env()?;
    if let Some(dir) = args.data_dir {
        settings.data_dir = dir;
    }

    info!("CQC CSV cron job starting");
    let res = run_with_reqwest(&settings);

    info!("Summary:");
    for r in &res.results {
        info!(
            "  {}: ok={}, http_status={}, attempts={}, bytes={}, lines={}, path={}, error={}",
            r.source,
            r.is_ok(),
            r.http_status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
            r.attempts,
            r.bytes,
            r.lines,
            r.path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
            r.error.as_deref().unwrap_or("-"),
        );
    }

    if !res.is_ok() {
        error!("One or more downloads failed, status={}", res.status);
        return Ok(ExitCode::FAILURE);
    }
    info!("All CSV downloads completed successfully");
    Ok(ExitCode::SUCCESS)
}
