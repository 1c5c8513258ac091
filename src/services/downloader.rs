use std::path::Path;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, RANGE, USER_AGENT};
use reqwest::StatusCode;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::errors::{LauncherError, Result};
use crate::utils::format::{format_bytes, format_eta, format_rate};

const DOWNLOAD_USER_AGENT: &str = concat!("launcher-sync/", env!("CARGO_PKG_VERSION"));

/// Receives human-readable status lines.
pub trait ProgressSink: Send + Sync {
    fn report(&self, status: String);
}

impl<F> ProgressSink for F
where
    F: Fn(String) + Send + Sync,
{
    fn report(&self, status: String) {
        self(status)
    }
}

/// Byte counter for one transfer; lives exactly as long as the transfer.
pub struct ProgressTracker {
    label: String,
    total: Option<u64>,
    current: u64,
    started_at: Instant,
    last_sample_at: Instant,
    last_sample_bytes: u64,
    interval: Duration,
}

impl ProgressTracker {
    pub fn new(label: &str, total: Option<u64>, initial: u64, interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            label: label.to_string(),
            total: total.filter(|value| *value > 0),
            current: initial,
            started_at: now,
            last_sample_at: now,
            last_sample_bytes: initial,
            interval,
        }
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Counts `bytes`; yields a status line at most once per interval.
    pub fn record(&mut self, bytes: u64, now: Instant) -> Option<String> {
        self.current = self.current.saturating_add(bytes);
        let elapsed = now.saturating_duration_since(self.last_sample_at);
        if elapsed < self.interval {
            return None;
        }
        let delta = self.current.saturating_sub(self.last_sample_bytes);
        let speed = delta as f64 / elapsed.as_secs_f64();
        self.last_sample_at = now;
        self.last_sample_bytes = self.current;
        Some(self.render(speed))
    }

    pub fn render(&self, bytes_per_second: f64) -> String {
        match self.total {
            Some(total) => {
                let percent = (self.current as f64 / total as f64 * 100.0).min(100.0);
                let eta = if bytes_per_second > 0.0 {
                    let remaining = total.saturating_sub(self.current) as f64;
                    format!(
                        "{} left",
                        format_eta(Duration::from_secs_f64(remaining / bytes_per_second))
                    )
                } else {
                    "stalled".to_string()
                };
                format!(
                    "Downloading {}: {:.1}% ({} / {}), {}, {}",
                    self.label,
                    percent,
                    format_bytes(self.current),
                    format_bytes(total),
                    format_rate(bytes_per_second),
                    eta
                )
            }
            None => format!(
                "Downloading {}: {}, {}",
                self.label,
                format_bytes(self.current),
                format_rate(bytes_per_second)
            ),
        }
    }

    pub fn finish(&self) -> String {
        format!(
            "Downloaded {} ({} in {})",
            self.label,
            format_bytes(self.current),
            format_eta(self.started_at.elapsed())
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub resumed_from: u64,
    pub transferred: u64,
    pub total: Option<u64>,
    pub already_complete: bool,
}

#[derive(Clone)]
pub struct Downloader {
    client: reqwest::Client,
    progress_interval: Duration,
}

fn header_u64(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<u64> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

/// `bytes 100-199/200` -> 200
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse::<u64>().ok()
}

fn supports_byte_ranges(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT_RANGES)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase().contains("bytes"))
        .unwrap_or(false)
}

async fn remove_partial(dest: &Path) {
    match tokio::fs::remove_file(dest).await {
        Ok(()) => tracing::debug!("removed partial download {}", dest.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!("failed to remove partial {}: {}", dest.display(), err),
    }
}

impl Downloader {
    pub fn new(client: reqwest::Client, progress_interval: Duration) -> Self {
        Self {
            client,
            progress_interval,
        }
    }

    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        label: &str,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadOutcome> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut resume_pos = match tokio::fs::metadata(dest).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => 0,
        };

        if resume_pos > 0 {
            let head = self
                .client
                .head(url)
                .header(USER_AGENT, DOWNLOAD_USER_AGENT)
                .send()
                .await?;
            if !head.status().is_success() {
                return Err(LauncherError::Http(format!(
                    "HTTP {}: HEAD {}",
                    head.status().as_u16(),
                    url
                )));
            }
            let remote_len = header_u64(head.headers(), CONTENT_LENGTH);
            if remote_len == Some(resume_pos) {
                tracing::info!("{} already complete ({} bytes)", dest.display(), resume_pos);
                sink.report(format!("Downloaded {} ({})", label, format_bytes(resume_pos)));
                return Ok(DownloadOutcome {
                    resumed_from: resume_pos,
                    transferred: 0,
                    total: remote_len,
                    already_complete: true,
                });
            }
            if !supports_byte_ranges(head.headers()) {
                tracing::warn!("{} does not accept byte ranges, restarting download", url);
                resume_pos = 0;
            } else if remote_len.is_some_and(|len| resume_pos > len) {
                tracing::warn!(
                    "partial {} is larger than remote ({} > {:?}), restarting",
                    dest.display(),
                    resume_pos,
                    remote_len
                );
                resume_pos = 0;
            }
        }

        let resuming = resume_pos > 0;
        if !resuming {
            remove_partial(dest).await;
        }

        let mut request = self.client.get(url).header(USER_AGENT, DOWNLOAD_USER_AGENT);
        if resuming {
            request = request.header(RANGE, format!("bytes={resume_pos}-"));
        }
        let response = request.send().await?;
        let expected = if resuming {
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        };
        if response.status() != expected {
            return Err(LauncherError::Http(format!(
                "HTTP {}: expected {} for {}",
                response.status().as_u16(),
                expected.as_u16(),
                url
            )));
        }

        let total = if resuming {
            response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_content_range_total)
                .or_else(|| {
                    header_u64(response.headers(), CONTENT_LENGTH).map(|len| len + resume_pos)
                })
        } else {
            header_u64(response.headers(), CONTENT_LENGTH).or(response.content_length())
        };

        tracing::info!(
            "downloading {} -> {} (resume_from={} total={:?})",
            url,
            dest.display(),
            resume_pos,
            total
        );

        let file = if resuming {
            OpenOptions::new().append(true).open(dest).await?
        } else {
            File::create(dest).await?
        };

        let mut tracker = ProgressTracker::new(label, total, resume_pos, self.progress_interval);
        match Self::stream_body(response, file, &mut tracker, sink).await {
            Ok(()) => {
                sink.report(tracker.finish());
                Ok(DownloadOutcome {
                    resumed_from: resume_pos,
                    transferred: tracker.current() - resume_pos,
                    total,
                    already_complete: false,
                })
            }
            Err(err) => {
                if resuming {
                    tracing::warn!(
                        "resumed download of {} failed, keeping partial for retry: {}",
                        dest.display(),
                        err
                    );
                } else {
                    tracing::warn!("download of {} failed: {}", dest.display(), err);
                    remove_partial(dest).await;
                }
                Err(err)
            }
        }
    }

    async fn stream_body(
        response: reqwest::Response,
        mut file: File,
        tracker: &mut ProgressTracker,
        sink: &dyn ProgressSink,
    ) -> Result<()> {
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            if let Some(status) = tracker.record(chunk.len() as u64, Instant::now()) {
                sink.report(status);
            }
        }
        file.flush().await?;
        file.sync_all().await?;

        if let Some(total) = tracker.total() {
            if tracker.current() != total {
                return Err(LauncherError::Http(format!(
                    "transfer ended at {} of {} bytes",
                    tracker.current(),
                    total
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{temp_root, Route, TestServer};
    use std::sync::{Arc, Mutex};

    fn payload() -> Vec<u8> {
        (0..10_000u32).map(|i| (i % 251) as u8).collect()
    }

    fn downloader() -> Downloader {
        Downloader::new(reqwest::Client::new(), Duration::from_millis(500))
    }

    fn collector() -> (Arc<Mutex<Vec<String>>>, impl ProgressSink) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = Arc::clone(&lines);
        let sink = move |line: String| sink_lines.lock().expect("lines").push(line);
        (lines, sink)
    }

    #[tokio::test]
    async fn fresh_download_writes_whole_file() {
        let server = TestServer::start();
        server.route("/game.zip", Route::File { body: payload(), ranges: true });
        let dest = temp_root("dl-fresh").join("downloads").join("game.zip");
        let (lines, sink) = collector();

        let outcome = downloader()
            .download(&server.url("/game.zip"), &dest, "game.zip", &sink)
            .await
            .expect("download");

        assert_eq!(std::fs::read(&dest).expect("read"), payload());
        assert_eq!(outcome.resumed_from, 0);
        assert_eq!(outcome.transferred, payload().len() as u64);
        assert_eq!(server.count("HEAD", "/game.zip"), 0);
        let last = lines.lock().expect("lines").last().cloned().expect("final line");
        assert!(last.starts_with("Downloaded game.zip"));
    }

    #[tokio::test]
    async fn resume_fetches_only_the_missing_tail() {
        let server = TestServer::start();
        server.route("/game.zip", Route::File { body: payload(), ranges: true });
        let dest = temp_root("dl-resume").join("game.zip");
        std::fs::write(&dest, &payload()[..4_000]).expect("seed partial");
        let (_lines, sink) = collector();

        let outcome = downloader()
            .download(&server.url("/game.zip"), &dest, "game.zip", &sink)
            .await
            .expect("download");

        assert_eq!(outcome.resumed_from, 4_000);
        assert_eq!(outcome.transferred, 6_000);
        assert_eq!(outcome.total, Some(10_000));
        assert_eq!(std::fs::read(&dest).expect("read"), payload());
        let gets: Vec<_> = server
            .requests()
            .into_iter()
            .filter(|req| req.method == "GET")
            .collect();
        assert_eq!(gets.len(), 1);
        assert_eq!(gets[0].range.as_deref(), Some("bytes=4000-"));
    }

    #[tokio::test]
    async fn complete_partial_short_circuits_without_get() {
        let server = TestServer::start();
        server.route("/game.zip", Route::File { body: payload(), ranges: true });
        let dest = temp_root("dl-complete").join("game.zip");
        std::fs::write(&dest, payload()).expect("seed complete");
        let (_lines, sink) = collector();

        let outcome = downloader()
            .download(&server.url("/game.zip"), &dest, "game.zip", &sink)
            .await
            .expect("download");

        assert!(outcome.already_complete);
        assert_eq!(server.count("HEAD", "/game.zip"), 1);
        assert_eq!(server.count("GET", "/game.zip"), 0);
    }

    #[tokio::test]
    async fn missing_range_support_forces_full_download() {
        let server = TestServer::start();
        server.route("/game.zip", Route::File { body: payload(), ranges: false });
        let dest = temp_root("dl-norange").join("game.zip");
        std::fs::write(&dest, vec![0xAAu8; 3_000]).expect("seed partial");
        let (_lines, sink) = collector();

        let outcome = downloader()
            .download(&server.url("/game.zip"), &dest, "game.zip", &sink)
            .await
            .expect("download");

        assert_eq!(outcome.resumed_from, 0);
        assert_eq!(std::fs::read(&dest).expect("read"), payload());
        let get = server
            .requests()
            .into_iter()
            .find(|req| req.method == "GET")
            .expect("get issued");
        assert!(get.range.is_none());
    }

    #[tokio::test]
    async fn failed_fresh_download_leaves_no_file() {
        let server = TestServer::start();
        server.route("/game.zip", Route::Status(404));
        let dest = temp_root("dl-404").join("game.zip");
        let (_lines, sink) = collector();

        let err = downloader()
            .download(&server.url("/game.zip"), &dest, "game.zip", &sink)
            .await
            .expect_err("404");

        assert!(matches!(err, LauncherError::Http(_)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn failed_head_keeps_partial_for_later() {
        let server = TestServer::start();
        server.route("/game.zip", Route::Status(500));
        let dest = temp_root("dl-head").join("game.zip");
        std::fs::write(&dest, b"partial").expect("seed partial");
        let (_lines, sink) = collector();

        let err = downloader()
            .download(&server.url("/game.zip"), &dest, "game.zip", &sink)
            .await
            .expect_err("500");

        assert!(matches!(err, LauncherError::Http(_)));
        assert_eq!(std::fs::read(&dest).expect("read"), b"partial");
    }

    #[tokio::test]
    async fn fresh_download_cut_short_removes_partial() {
        let server = TestServer::start();
        server.route(
            "/game.zip",
            Route::Truncated {
                body: payload(),
                cut_at: 4_000,
            },
        );
        let dest = temp_root("dl-cut-fresh").join("game.zip");
        let (_lines, sink) = collector();

        let err = downloader()
            .download(&server.url("/game.zip"), &dest, "game.zip", &sink)
            .await
            .expect_err("connection dropped");

        assert!(matches!(err, LauncherError::Network(_) | LauncherError::Http(_)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn resumed_download_cut_short_keeps_partial() {
        let server = TestServer::start();
        server.route(
            "/game.zip",
            Route::Truncated {
                body: payload(),
                cut_at: 3_000,
            },
        );
        let dest = temp_root("dl-cut-resume").join("game.zip");
        std::fs::write(&dest, &payload()[..2_000]).expect("seed partial");
        let (_lines, sink) = collector();

        downloader()
            .download(&server.url("/game.zip"), &dest, "game.zip", &sink)
            .await
            .expect_err("connection dropped");

        let kept = std::fs::read(&dest).expect("partial kept");
        assert!(kept.len() >= 2_000 && kept.len() <= 3_000, "len {}", kept.len());
        assert_eq!(kept, payload()[..kept.len()]);
        let get = server
            .requests()
            .into_iter()
            .find(|req| req.method == "GET")
            .expect("get issued");
        assert_eq!(get.range.as_deref(), Some("bytes=2000-"));
    }

    #[tokio::test]
    async fn full_reply_to_ranged_request_is_rejected() {
        let server = TestServer::start();
        server.route("/game.zip", Route::IgnoresRange(payload()));
        let dest = temp_root("dl-ignored-range").join("game.zip");
        std::fs::write(&dest, &payload()[..2_000]).expect("seed partial");
        let (_lines, sink) = collector();

        let err = downloader()
            .download(&server.url("/game.zip"), &dest, "game.zip", &sink)
            .await
            .expect_err("200 instead of 206");

        assert!(matches!(err, LauncherError::Http(ref msg) if msg.starts_with("HTTP 200")));
        assert_eq!(std::fs::read(&dest).expect("read"), payload()[..2_000]);
    }

    #[test]
    fn tracker_throttles_and_estimates() {
        let mut tracker =
            ProgressTracker::new("game.zip", Some(1_000), 0, Duration::from_millis(500));
        let start = Instant::now();

        assert!(tracker.record(100, start + Duration::from_millis(100)).is_none());
        let line = tracker
            .record(150, start + Duration::from_millis(1_000))
            .expect("interval elapsed");
        assert!(line.contains("25.0%"), "{line}");
        assert!(line.contains("left"), "{line}");
        assert!(tracker.record(10, start + Duration::from_millis(1_200)).is_none());
        assert_eq!(tracker.current(), 260);
    }

    #[test]
    fn tracker_without_total_shows_bytes() {
        let tracker = ProgressTracker::new("blob", None, 2_048, Duration::from_millis(500));
        assert_eq!(tracker.render(0.0), "Downloading blob: 2.0 KiB, 0 B/s");
    }

    #[test]
    fn content_range_total_parses() {
        assert_eq!(parse_content_range_total("bytes 100-199/200"), Some(200));
        assert_eq!(parse_content_range_total("bytes 0-0/*"), None);
    }
}
