//! Validated, retried download of one CSV export into the data directory.

pub mod retry;
pub mod sniff;
pub mod transport;
pub mod validate;

use std::{
    fs::File,
    io::{self, ErrorKind, Read, Write},
    path::{Path, PathBuf},
    thread,
};

use jiff::Timestamp;
use log::{error, info, warn};
use thiserror::Error;

use crate::source::Source;
use retry::{is_retryable_status, RetryPolicy};
use sniff::SniffReader;
use transport::{Transport, TransportError};
use validate::{is_csv_like, SNIFF_LEN};

const COPY_BUFFER_LEN: usize = 8192;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("request error: {0}")]
    Transport(#[from] TransportError),
    #[error("transient HTTP error {0}")]
    RetryableStatus(u16),
    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),
    #[error("error while streaming content: {0}")]
    Stream(io::Error),
    #[error("response did not look like CSV (Content-Type: {})", .content_type.as_deref().unwrap_or("none"))]
    NotCsv { content_type: Option<String> },
    #[error("empty response body")]
    EmptyBody,
    #[error("error while saving file: {0}")]
    Filesystem(io::Error),
    #[error("refusing to overwrite existing file {}", .0.display())]
    AlreadyExists(PathBuf),
    #[error("gave up after {attempts} attempts, last error: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<DownloadError>,
    },
}

impl DownloadError {
    /// Transport failures, transient statuses and broken bodies get another
    /// attempt.  Everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DownloadError::Transport(_)
                | DownloadError::RetryableStatus(_)
                | DownloadError::Stream(_)
        )
    }
}

/// Outcome of one [`Fetcher::fetch`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadResult {
    /// Source name, e.g. `homecare`
    pub source: String,
    pub url: String,
    /// File name inside the data directory, `None` unless the download succeeded.
    pub file: Option<String>,
    pub path: Option<PathBuf>,
    /// Size of the saved file.  Zero on failure.
    pub bytes: u64,
    /// Number of newline characters in the saved file.
    pub lines: u64,
    /// Status of the last response received, if any.
    pub http_status: Option<u16>,
    pub attempts: u32,
    pub error: Option<String>,
}

impl DownloadResult {
    /// A result for a download that could not even be started.
    pub fn failed(source: &Source, error: String) -> DownloadResult {
        DownloadResult {
            source: source.name.clone(),
            url: source.url.clone(),
            file: None,
            path: None,
            bytes: 0,
            lines: 0,
            http_status: None,
            attempts: 0,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.file.is_some() && self.error.is_none()
    }
}

/// What is known about a download while it is in flight.
#[derive(Debug, Default)]
struct Attempt {
    number: u32,
    http_status: Option<u16>,
}

#[derive(Debug)]
struct Saved {
    bytes: u64,
    lines: u64,
}

pub struct Fetcher<T> {
    transport: T,
    retry: RetryPolicy,
    out_dir: PathBuf,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, retry: RetryPolicy, out_dir: impl Into<PathBuf>) -> Self {
        Fetcher {
            transport,
            retry,
            out_dir: out_dir.into(),
        }
    }

    /// Download `source` into a new timestamped file.  Never panics and never
    /// returns an error: failures end up in [`DownloadResult::error`].
    pub fn fetch(&self, source: &Source) -> DownloadResult {
        self.fetch_at(source, Timestamp::now())
    }

    /// Same as [`Fetcher::fetch`] with the file name stamped with `at`.
    pub fn fetch_at(&self, source: &Source, at: Timestamp) -> DownloadResult {
        let file_name = source.file_name(at);
        let target = self.out_dir.join(&file_name);
        let mut attempt = Attempt::default();

        let res = self.download(&source.url, &target, &mut attempt);
        let mut result = DownloadResult::failed(source, String::new());
        result.http_status = attempt.http_status;
        result.attempts = attempt.number;
        match res {
            Ok(saved) => {
                info!(
                    "Saved {} bytes, {} lines to {}",
                    saved.bytes,
                    saved.lines,
                    target.display()
                );
                result.file = Some(file_name);
                result.path = Some(target);
                result.bytes = saved.bytes;
                result.lines = saved.lines;
                result.error = None;
            }
            Err(e) => {
                error!("Download of {} failed: {}", source.name, e);
                result.error = Some(e.to_string());
            }
        }
        result
    }

    fn download(
        &self,
        url: &str,
        target: &Path,
        attempt: &mut Attempt,
    ) -> Result<Saved, DownloadError> {
        loop {
            attempt.number += 1;
            info!(
                "Attempt {}/{} for {}",
                attempt.number, self.retry.max_attempts, url
            );
            let e = match self.try_once(url, target, attempt) {
                Ok(saved) => return Ok(saved),
                Err(e) => e,
            };
            if !e.is_retryable() {
                return Err(e);
            }
            if !self.retry.allows_another(attempt.number) {
                return Err(DownloadError::Exhausted {
                    attempts: attempt.number,
                    last: Box::new(e),
                });
            }
            let delay = self.retry.delay(attempt.number);
            warn!("{}, retrying in {:?}", e, delay);
            thread::sleep(delay);
        }
    }

    fn try_once(
        &self,
        url: &str,
        target: &Path,
        attempt: &mut Attempt,
    ) -> Result<Saved, DownloadError> {
        let response = self.transport.get(url)?;
        attempt.http_status = Some(response.status);
        info!("HTTP status {} for {}", response.status, url);
        if is_retryable_status(response.status) {
            return Err(DownloadError::RetryableStatus(response.status));
        }
        if response.status != 200 {
            return Err(DownloadError::UnexpectedStatus(response.status));
        }

        let mut body = SniffReader::new(response.body);
        let sample = body.sniff(SNIFF_LEN).map_err(DownloadError::Stream)?;
        if sample.is_empty() {
            return Err(DownloadError::EmptyBody);
        }
        if !is_csv_like(response.content_type.as_deref(), sample) {
            return Err(DownloadError::NotCsv {
                content_type: response.content_type,
            });
        }

        // Hidden until complete.  Dropping it on any error removes it.
        let mut part = tempfile::Builder::new()
            .prefix(".cqc_")
            .suffix(".part")
            .tempfile_in(&self.out_dir)
            .map_err(DownloadError::Filesystem)?;
        let lines = copy_body(&mut body, part.as_file_mut())?;
        part.as_file()
            .sync_all()
            .map_err(DownloadError::Filesystem)?;

        let file = part.persist_noclobber(target).map_err(|e| {
            if e.error.kind() == ErrorKind::AlreadyExists {
                DownloadError::AlreadyExists(target.to_path_buf())
            } else {
                DownloadError::Filesystem(e.error)
            }
        })?;
        let bytes = file
            .metadata()
            .map_err(DownloadError::Filesystem)?
            .len();
        Ok(Saved { bytes, lines })
    }
}

/// Copy the whole body into `out`, returning the number of newlines seen.
/// Read failures are network trouble, write failures are disk trouble.
fn copy_body<R: Read>(body: &mut R, out: &mut File) -> Result<u64, DownloadError> {
    let mut buf = vec![0u8; COPY_BUFFER_LEN];
    let mut lines = 0u64;
    loop {
        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(DownloadError::Stream(e)),
        };
        out.write_all(&buf[..n]).map_err(DownloadError::Filesystem)?;
        lines += buf[..n].iter().filter(|&&b| b == b'\n').count() as u64;
    }
    out.flush().map_err(DownloadError::Filesystem)?;
    Ok(lines)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::error::Error;
    use std::fs;
    use std::io::Cursor;
    use std::sync::Mutex;

    use super::transport::Response;
    use super::*;

    /// Canned answer for one call of the fake transport.
    pub(crate) enum Reply {
        Fail(&'static str),
        Status(u16),
        Body(Option<&'static str>, Vec<u8>),
        /// Sends the bytes then breaks the connection.
        Broken(Vec<u8>),
    }

    pub(crate) fn csv_reply(body: &[u8]) -> Reply {
        Reply::Body(Some("text/csv; charset=utf-8"), body.to_vec())
    }

    /// Plays back one [`Reply`] per request, 404 once the script runs out.
    pub(crate) struct FakeTransport {
        replies: Mutex<VecDeque<Reply>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        pub(crate) fn new(replies: Vec<Reply>) -> Self {
            FakeTransport {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    type Body = Box<dyn Read + Send>;

    struct BrokenBody(Cursor<Vec<u8>>);

    impl Read for BrokenBody {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.read(buf)? {
                0 => Err(io::Error::new(ErrorKind::ConnectionReset, "connection reset")),
                n => Ok(n),
            }
        }
    }

    impl Transport for FakeTransport {
        fn get(&self, url: &str) -> Result<Response, TransportError> {
            self.calls.lock().unwrap().push(url.to_string());
            let reply = self.replies.lock().unwrap().pop_front();
            let (status, content_type, body): (u16, Option<&str>, Body) = match reply {
                Some(Reply::Fail(msg)) => return Err(TransportError(msg.to_string())),
                Some(Reply::Status(status)) => (status, None, Box::new(io::empty()) as Body),
                Some(Reply::Body(ct, body)) => (200, ct, Box::new(Cursor::new(body)) as Body),
                Some(Reply::Broken(body)) => {
                    (200, None, Box::new(BrokenBody(Cursor::new(body))) as Body)
                }
                None => (404, None, Box::new(io::empty()) as Body),
            };
            Ok(Response {
                status,
                content_type: content_type.map(|s| s.to_string()),
                body,
            })
        }
    }

    pub(crate) fn source() -> Source {
        Source::new("homecare", "https://example.test/homecare.csv")
    }

    fn fetcher(dir: &Path, replies: Vec<Reply>) -> Fetcher<FakeTransport> {
        Fetcher::new(
            FakeTransport::new(replies),
            RetryPolicy::immediate(5),
            dir,
        )
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    fn big_csv() -> Vec<u8> {
        let mut body = b"Name,Address,Postcode,Rating\n".to_vec();
        for i in 0..2000 {
            body.extend_from_slice(format!("Care {},{} High St,AB1 2CD,Inadequate\n", i, i).as_bytes());
        }
        body
    }

    #[test]
    fn csv_without_content_type_is_saved() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let body = big_csv();
        let fetcher = fetcher(dir.path(), vec![Reply::Body(None, body.clone())]);
        let at: Timestamp = "2026-10-16T08:30:05Z".parse()?;

        let res = fetcher.fetch_at(&source(), at);
        assert!(res.is_ok(), "{:?}", res.error);
        assert_eq!(res.file.as_deref(), Some("cqc_homecare_20261016_083005Z.csv"));
        assert_eq!(res.bytes, body.len() as u64);
        assert_eq!(res.lines, 2001);
        assert_eq!(res.http_status, Some(200));
        assert_eq!(res.attempts, 1);
        let path = res.path.unwrap();
        assert_eq!(fs::read(&path)?, body);
        assert_eq!(dir_entries(dir.path()), vec!["cqc_homecare_20261016_083005Z.csv"]);
        Ok(())
    }

    #[test]
    fn html_is_rejected_and_nothing_is_left() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let html = b"<!DOCTYPE html><html><body>Service unavailable, try later\n</body></html>";
        let fetcher = fetcher(
            dir.path(),
            vec![Reply::Body(Some("text/html"), html.to_vec()), csv_reply(b"a,b\n")],
        );

        let res = fetcher.fetch(&source());
        assert!(!res.is_ok());
        assert_eq!(res.file, None);
        assert_eq!(res.bytes, 0);
        assert!(res.error.unwrap().contains("did not look like CSV"));
        // validation failures are final
        assert_eq!(fetcher.transport.calls(), 1);
        assert!(dir_entries(dir.path()).is_empty());
        Ok(())
    }

    #[test]
    fn html_without_content_type_is_rejected() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let html = b"<html>\n<head><title>a, b</title></head></html>";
        let fetcher = fetcher(dir.path(), vec![Reply::Body(None, html.to_vec())]);

        let res = fetcher.fetch(&source());
        assert_eq!(
            res.error.as_deref(),
            Some("response did not look like CSV (Content-Type: none)")
        );
        assert!(dir_entries(dir.path()).is_empty());
        Ok(())
    }

    #[test]
    fn csv_content_type_wins_over_html_body() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let html = b"<!doctype html><html></html>";
        let fetcher = fetcher(dir.path(), vec![csv_reply(html)]);

        let res = fetcher.fetch(&source());
        assert!(res.is_ok());
        assert_eq!(res.bytes, html.len() as u64);
        Ok(())
    }

    #[test]
    fn four_503s_then_success() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let body = b"id,name\n1,Acme\n".to_vec();
        let mut replies: Vec<Reply> = (0..4).map(|_| Reply::Status(503)).collect();
        replies.push(csv_reply(&body));
        let fetcher = fetcher(dir.path(), replies);

        let res = fetcher.fetch(&source());
        assert!(res.is_ok(), "{:?}", res.error);
        assert_eq!(res.attempts, 5);
        assert_eq!(res.bytes, body.len() as u64);
        assert_eq!(dir_entries(dir.path()).len(), 1);
        Ok(())
    }

    #[test]
    fn five_503s_exhaust_the_retries() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let mut replies: Vec<Reply> = (0..5).map(|_| Reply::Status(503)).collect();
        replies.push(csv_reply(b"a,b\n"));
        let fetcher = fetcher(dir.path(), replies);

        let res = fetcher.fetch(&source());
        assert_eq!(
            res.error.as_deref(),
            Some("gave up after 5 attempts, last error: transient HTTP error 503")
        );
        assert_eq!(res.http_status, Some(503));
        assert_eq!(fetcher.transport.calls(), 5);
        assert!(dir_entries(dir.path()).is_empty());
        Ok(())
    }

    #[test]
    fn not_found_fails_without_retrying() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let fetcher = fetcher(dir.path(), vec![Reply::Status(404), csv_reply(b"a,b\n")]);

        let res = fetcher.fetch(&source());
        assert_eq!(res.error.as_deref(), Some("unexpected HTTP status 404"));
        assert_eq!(res.attempts, 1);
        assert_eq!(fetcher.transport.calls(), 1);
        Ok(())
    }

    #[test]
    fn transport_and_stream_errors_are_retried() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let body = big_csv();
        let fetcher = fetcher(
            dir.path(),
            vec![
                Reply::Fail("connection refused"),
                Reply::Broken(body[..5000].to_vec()),
                Reply::Body(None, body.clone()),
            ],
        );

        let res = fetcher.fetch(&source());
        assert!(res.is_ok(), "{:?}", res.error);
        assert_eq!(res.attempts, 3);
        assert_eq!(res.bytes, body.len() as u64);
        // the broken attempt left no partial file behind
        assert_eq!(dir_entries(dir.path()).len(), 1);
        Ok(())
    }

    #[test]
    fn transport_errors_exhaust_the_retries() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let replies = (0..5).map(|_| Reply::Fail("operation timed out")).collect();
        let fetcher = fetcher(dir.path(), replies);

        let res = fetcher.fetch(&source());
        assert_eq!(
            res.error.as_deref(),
            Some("gave up after 5 attempts, last error: request error: operation timed out")
        );
        assert_eq!(res.http_status, None);
        Ok(())
    }

    #[test]
    fn empty_body_is_an_error() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let fetcher = fetcher(dir.path(), vec![csv_reply(b"")]);

        let res = fetcher.fetch(&source());
        assert_eq!(res.error.as_deref(), Some("empty response body"));
        assert!(dir_entries(dir.path()).is_empty());
        Ok(())
    }

    #[test]
    fn existing_file_is_never_overwritten() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let at: Timestamp = "2026-10-16T08:30:05Z".parse()?;
        let existing = dir.path().join(source().file_name(at));
        fs::write(&existing, "old,content\n")?;
        let fetcher = fetcher(dir.path(), vec![csv_reply(b"new,content\n")]);

        let res = fetcher.fetch_at(&source(), at);
        assert!(res.error.unwrap().starts_with("refusing to overwrite"));
        assert_eq!(fs::read_to_string(&existing)?, "old,content\n");
        assert_eq!(dir_entries(dir.path()).len(), 1);
        Ok(())
    }

    #[test]
    fn runs_at_different_times_keep_both_files() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let fetcher = fetcher(dir.path(), vec![csv_reply(b"a,b\n1,2\n"), csv_reply(b"a,b\n3,4\n")]);
        let t0: Timestamp = "2026-10-15T06:00:00Z".parse()?;
        let t1: Timestamp = "2026-10-16T06:00:00Z".parse()?;

        let first = fetcher.fetch_at(&source(), t0);
        let second = fetcher.fetch_at(&source(), t1);
        assert_ne!(first.file, second.file);
        assert_eq!(fs::read_to_string(first.path.unwrap())?, "a,b\n1,2\n");
        assert_eq!(fs::read_to_string(second.path.unwrap())?, "a,b\n3,4\n");
        Ok(())
    }

    #[test]
    fn missing_directory_is_a_filesystem_error() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let fetcher = fetcher(&dir.path().join("nope"), vec![csv_reply(b"a,b\n")]);

        let res = fetcher.fetch(&source());
        assert!(res.error.unwrap().starts_with("error while saving file"));
        assert_eq!(fetcher.transport.calls(), 1);
        Ok(())
    }
}
