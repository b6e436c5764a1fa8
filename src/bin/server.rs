use std::{error::Error, fs, path::PathBuf};

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use clap::Parser;
use cqc_exports::api::{files, health, jobs};
use cqc_exports::config::{load_dotenv, Settings};
use env_logger::Env;
use log::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "CQC CSV downloader service", long_about = None)]
struct Args {
    /// Environment name, e.g. test, prod.  Loads `.env/<env>.env`
    #[arg(short, long)]
    env: Option<String>,

    /// Port number, overrides PORT
    #[arg(short, long)]
    port: Option<u16>,

    /// Where the CSV files are saved, overrides DATA_DIR
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[actix_web::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    load_dotenv(args.env.as_deref())?;
    let mut settings = Settings::from_env()?;
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(dir) = args.data_dir {
        settings.data_dir = dir;
    }
    fs::create_dir_all(&settings.data_dir)?;
    if settings.run_token.is_none() {
        warn!("RUN_TOKEN is not set; all authenticated endpoints will reject requests.");
    }

    info!(
        "Serving {} on {}:{}",
        settings.data_dir.display(),
        settings.host,
        settings.port
    );
    let bind = (settings.host.clone(), settings.port);
    let settings = Data::new(settings);

    HttpServer::new(move || {
        let cors = Cors::permissive();
        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(settings.clone())
            .service(health::api_health)
            .service(jobs::api_run)
            .service(files::api_get_file)
    })
    .bind(bind)?
    .run()
    .await?;
    Ok(())
}
