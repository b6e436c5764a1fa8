use std::{collections::BTreeMap, fmt::Display, fs, path::PathBuf};

use log::{error, info};
use serde::Serialize;

use crate::{
    config::Settings,
    fetch::{
        transport::{ReqwestTransport, Transport},
        DownloadResult, Fetcher,
    },
    retention::{self, SweepReport},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every source was saved
    Ok,
    /// Some, not all
    Partial,
    /// Nothing was saved
    Error,
}

impl RunStatus {
    pub fn from_results(results: &[DownloadResult]) -> RunStatus {
        let saved = results.iter().filter(|r| r.is_ok()).count();
        if saved == 0 {
            RunStatus::Error
        } else if saved == results.len() {
            RunStatus::Ok
        } else {
            RunStatus::Partial
        }
    }
}

impl Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use RunStatus::*;
        match self {
            Ok => write!(f, "ok"),
            Partial => write!(f, "partial"),
            Error => write!(f, "error"),
        }
    }
}

/// One download of every configured source.
#[derive(Debug)]
pub struct RunResult {
    pub status: RunStatus,
    pub saved_to: PathBuf,
    /// In the order of [`Settings::sources`]
    pub results: Vec<DownloadResult>,
    pub sweep: SweepReport,
}

/// JSON body returned by `POST /run`.
#[derive(Debug, PartialEq, Serialize)]
pub struct RunEnvelope {
    pub status: RunStatus,
    pub saved_to: String,
    pub results: BTreeMap<String, SourceReport>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct SourceReport {
    pub file: Option<String>,
    pub bytes: Option<u64>,
    /// Where the saved file can be downloaded from, relative to the server root
    pub url: Option<String>,
    pub error: Option<String>,
}

impl From<&DownloadResult> for SourceReport {
    fn from(res: &DownloadResult) -> Self {
        SourceReport {
            file: res.file.clone(),
            bytes: res.file.as_ref().map(|_| res.bytes),
            url: res.file.as_ref().map(|name| format!("/files/{}", name)),
            error: res.error.clone(),
        }
    }
}

impl RunResult {
    pub fn new(saved_to: PathBuf, results: Vec<DownloadResult>, sweep: SweepReport) -> Self {
        RunResult {
            status: RunStatus::from_results(&results),
            saved_to,
            results,
            sweep,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == RunStatus::Ok
    }

    pub fn envelope(&self) -> RunEnvelope {
        RunEnvelope {
            status: self.status,
            saved_to: self.saved_to.display().to_string(),
            results: self
                .results
                .iter()
                .map(|r| (r.source.clone(), SourceReport::from(r)))
                .collect(),
        }
    }
}

/// Download every source in `settings` one after the other, then sweep the
/// data directory.  A failing source never stops the others.
pub fn run_once<T: Transport>(settings: &Settings, fetcher: &Fetcher<T>) -> RunResult {
    info!("Starting CSV downloads for CQC exports");
    info!("Using data directory {}", settings.data_dir.display());
    if let Err(e) = fs::create_dir_all(&settings.data_dir) {
        // each fetch reports the failure on its own
        error!(
            "Failed to create data directory {}: {}",
            settings.data_dir.display(),
            e
        );
    }

    let results: Vec<DownloadResult> = settings
        .sources
        .iter()
        .map(|source| {
            info!("Downloading {} CSV", source.name);
            fetcher.fetch(source)
        })
        .collect();

    let sweep = retention::sweep(&settings.data_dir, settings.retention);
    if !sweep.deleted.is_empty() {
        info!("Deleted {} old file(s)", sweep.deleted.len());
    }

    let res = RunResult::new(settings.data_dir.clone(), results, sweep);
    info!("Completed with status={}", res.status);
    res
}

/// [`run_once`] over the network.
pub fn run_with_reqwest(settings: &Settings) -> RunResult {
    match ReqwestTransport::from_settings(settings) {
        Ok(transport) => {
            let fetcher = Fetcher::new(transport, settings.retry, &settings.data_dir);
            run_once(settings, &fetcher)
        }
        Err(e) => {
            error!("Failed to build the HTTP client: {}", e);
            failed_run(settings, &format!("request error: {}", e))
        }
    }
}

/// Every source fails with `error`.  Old files are still swept.
fn failed_run(settings: &Settings, error: &str) -> RunResult {
    let results = settings
        .sources
        .iter()
        .map(|source| DownloadResult::failed(source, error.to_string()))
        .collect();
    let sweep = retention::sweep(&settings.data_dir, settings.retention);
    RunResult::new(settings.data_dir.clone(), results, sweep)
}
