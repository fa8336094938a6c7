//! Distribution archive download.
//!
//! Archives live at
//! `<mirror>/<base dir>/{releases|snapshots}/<arch path>/<version>/<component>.txz`.
//! `file://` mirrors are read straight from disk.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use jmanager_core::distribution::{Architecture, Component, Version, VersionType};
use jmanager_core::error::{JailError, Result};
use reqwest::Url;

/// Default distribution mirror.
pub const DEFAULT_MIRROR_URL: &str = "https://ftp.FreeBSD.org";

/// Directory on the mirror holding the release and snapshot trees.
pub const DEFAULT_BASE_DIRECTORY: &str = "pub/FreeBSD";

/// Bytes read per transfer step; progress is reported once per block.
pub const BLOCK_SIZE: usize = 8192;

/// Throughput measurement window.
pub const THROUGHPUT_WINDOW: Duration = Duration::from_secs(5);

/// Progress of one file transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchProgress<'a> {
    /// File being downloaded, e.g. `base.txz`.
    pub label: &'a str,
    pub received: u64,
    /// Announced size; 0 when the server sends no length.
    pub total: u64,
    pub bytes_per_sec: f64,
}

/// Average transfer rate over a window that restarts once it is older than
/// [`THROUGHPUT_WINDOW`].
#[derive(Debug, Clone)]
pub struct ThroughputMeter {
    window: Duration,
    window_bytes: u64,
    window_elapsed: Duration,
    rate: f64,
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new(THROUGHPUT_WINDOW)
    }
}

impl ThroughputMeter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            window_bytes: 0,
            window_elapsed: Duration::ZERO,
            rate: 0.0,
        }
    }

    /// Account `bytes` transferred in `elapsed` and return bytes/second.
    pub fn record(&mut self, bytes: u64, elapsed: Duration) -> f64 {
        if self.window_elapsed > self.window {
            self.window_bytes = 0;
            self.window_elapsed = Duration::ZERO;
        }
        self.window_bytes += bytes;
        self.window_elapsed += elapsed;

        let secs = self.window_elapsed.as_secs_f64();
        if secs > 0.0 {
            self.rate = self.window_bytes as f64 / secs;
        }
        self.rate
    }
}

/// Downloads distribution archives from an HTTP(S) or `file://` mirror.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    mirror_url: String,
    base_directory: String,
    block_size: usize,
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(mirror_url: impl Into<String>) -> Result<Self> {
        let mirror_url = mirror_url.into();
        Url::parse(&mirror_url).map_err(|e| {
            JailError::Config(format!("invalid mirror url '{}': {}", mirror_url, e))
        })?;

        // Archives are large; transfers run without a deadline.
        let client = reqwest::blocking::Client::builder()
            .timeout(None)
            .build()
            .map_err(|e| JailError::Transport {
                url: mirror_url.clone(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            mirror_url: mirror_url.trim_end_matches('/').to_string(),
            base_directory: DEFAULT_BASE_DIRECTORY.to_string(),
            block_size: BLOCK_SIZE,
            client,
        })
    }

    /// Replace the `pub/FreeBSD` prefix; an empty string drops it.
    pub fn with_base_directory(mut self, base_directory: impl Into<String>) -> Self {
        self.base_directory = base_directory.into().trim_matches('/').to_string();
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    pub fn mirror_url(&self) -> &str {
        &self.mirror_url
    }

    /// Mirror directory holding the archives of one version/architecture.
    pub fn directory_path(&self, architecture: Architecture, version: &Version) -> String {
        let tree = match version.channel {
            VersionType::Release => "releases",
            VersionType::Stable | VersionType::Snapshot => "snapshots",
        };
        let version = version.to_string();
        [
            self.base_directory.as_str(),
            tree,
            architecture.mirror_path(),
            version.as_str(),
        ]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/")
    }

    pub fn component_url(
        &self,
        component: Component,
        version: &Version,
        architecture: Architecture,
    ) -> String {
        format!(
            "{}/{}/{}",
            self.mirror_url,
            self.directory_path(architecture, version),
            component.archive_name()
        )
    }

    /// Download `<component>.txz` for each component, in order, into
    /// `destination_dir`. The first failure stops the remaining downloads.
    pub fn fetch(
        &self,
        components: &[Component],
        version: &Version,
        architecture: Architecture,
        destination_dir: &Path,
        callback: &mut dyn FnMut(&FetchProgress<'_>) -> Result<()>,
    ) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(destination_dir)?;

        let mut fetched = Vec::with_capacity(components.len());
        for component in components {
            let url = self.component_url(*component, version, architecture);
            let destination = destination_dir.join(component.archive_name());
            self.fetch_file(&url, &destination, callback)?;
            fetched.push(destination);
        }
        Ok(fetched)
    }

    /// Stream one URL into `destination`, returning the bytes written.
    ///
    /// A partial file is left behind on failure.
    pub fn fetch_file(
        &self,
        url: &str,
        destination: &Path,
        callback: &mut dyn FnMut(&FetchProgress<'_>) -> Result<()>,
    ) -> Result<u64> {
        let transport = |message: String| JailError::Transport {
            url: url.to_string(),
            message,
        };

        let (mut source, total) = self.open(url)?;
        let mut file = File::create(destination)?;

        let label = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        tracing::info!(url, destination = %destination.display(), total, "Downloading");

        let mut meter = ThroughputMeter::default();
        let mut buffer = vec![0u8; self.block_size];
        let mut received = 0u64;
        loop {
            let started = Instant::now();
            let read = source
                .read(&mut buffer)
                .map_err(|e| transport(format!("read failed: {}", e)))?;
            if read == 0 {
                break;
            }
            let bytes_per_sec = meter.record(read as u64, started.elapsed());

            file.write_all(&buffer[..read])?;
            received += read as u64;

            callback(&FetchProgress {
                label: &label,
                received,
                total,
                bytes_per_sec,
            })?;
        }
        file.flush()?;

        tracing::debug!(url, bytes = received, "Download complete");
        Ok(received)
    }

    /// Open a reader for `url` along with its announced length.
    fn open(&self, url: &str) -> Result<(Box<dyn Read>, u64)> {
        let transport = |message: String| JailError::Transport {
            url: url.to_string(),
            message,
        };

        let parsed = Url::parse(url).map_err(|e| transport(format!("invalid url: {}", e)))?;
        if parsed.scheme() == "file" {
            let path = parsed
                .to_file_path()
                .map_err(|_| transport("not a local path".to_string()))?;
            let file = File::open(&path)
                .map_err(|e| transport(format!("{}: {}", path.display(), e)))?;
            let total = file.metadata().map(|m| m.len()).unwrap_or(0);
            return Ok((Box::new(file), total));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .map_err(|e| transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(transport(format!("HTTP {}", status)));
        }
        let total = response.content_length().unwrap_or(0);
        Ok((Box::new(response), total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;
    use std::net::TcpListener;
    use tempfile::TempDir;

    fn release() -> Version {
        Version::new(12, 0, VersionType::Release)
    }

    /// A `file://` mirror with no base directory holding `base.txz` for
    /// 12.0-RELEASE and 12.0-STABLE on amd64.
    fn local_mirror(tmp: &TempDir) -> HttpFetcher {
        for dir in ["releases/amd64/12.0-RELEASE", "snapshots/amd64/12.0-STABLE"] {
            let path = tmp.path().join("mirror").join(dir);
            std::fs::create_dir_all(&path).unwrap();
            std::fs::write(path.join("base.txz"), vec![7u8; 20_000]).unwrap();
        }
        let url = format!("file://{}", tmp.path().join("mirror").display());
        HttpFetcher::new(url).unwrap().with_base_directory("")
    }

    #[test]
    fn test_directory_path() {
        let fetcher = HttpFetcher::new(DEFAULT_MIRROR_URL).unwrap();
        assert_eq!(
            fetcher.directory_path(Architecture::Amd64, &release()),
            "pub/FreeBSD/releases/amd64/12.0-RELEASE"
        );
        assert_eq!(
            fetcher.directory_path(
                Architecture::Arm64,
                &Version::new(14, 0, VersionType::Stable)
            ),
            "pub/FreeBSD/snapshots/arm64/aarch64/14.0-STABLE"
        );
        assert_eq!(
            fetcher.component_url(Component::Lib32, &release(), Architecture::Amd64),
            "https://ftp.FreeBSD.org/pub/FreeBSD/releases/amd64/12.0-RELEASE/lib32.txz"
        );
    }

    #[test]
    fn test_invalid_mirror_url() {
        assert!(matches!(
            HttpFetcher::new("not a url").unwrap_err(),
            JailError::Config(_)
        ));
    }

    #[test]
    fn test_fetch_from_local_mirror() {
        let tmp = TempDir::new().unwrap();
        let fetcher = local_mirror(&tmp);
        let dest = tmp.path().join("staging");

        let fetched = fetcher
            .fetch(
                &[Component::Base],
                &release(),
                Architecture::Amd64,
                &dest,
                &mut |_| Ok(()),
            )
            .unwrap();
        assert_eq!(fetched, vec![dest.join("base.txz")]);
        assert_eq!(std::fs::read(dest.join("base.txz")).unwrap().len(), 20_000);
    }

    #[test]
    fn test_fetch_snapshot_tree() {
        let tmp = TempDir::new().unwrap();
        let fetcher = local_mirror(&tmp);
        let dest = tmp.path().join("staging");
        fetcher
            .fetch(
                &[Component::Base],
                &Version::new(12, 0, VersionType::Stable),
                Architecture::Amd64,
                &dest,
                &mut |_| Ok(()),
            )
            .unwrap();
        assert!(dest.join("base.txz").is_file());
    }

    #[test]
    fn test_fetch_reports_progress_per_block() {
        let tmp = TempDir::new().unwrap();
        let fetcher = local_mirror(&tmp);

        let mut events = Vec::new();
        fetcher
            .fetch(
                &[Component::Base],
                &release(),
                Architecture::Amd64,
                &tmp.path().join("staging"),
                &mut |p| {
                    events.push((p.label.to_string(), p.received, p.total));
                    Ok(())
                },
            )
            .unwrap();

        // 20000 bytes in 8192-byte blocks.
        let received: Vec<u64> = events.iter().map(|e| e.1).collect();
        assert_eq!(received, vec![8192, 16384, 20000]);
        assert!(events.iter().all(|e| e.0 == "base.txz" && e.2 == 20_000));
    }

    #[test]
    fn test_fetch_missing_version_is_transport_error() {
        let tmp = TempDir::new().unwrap();
        let fetcher = local_mirror(&tmp);
        let err = fetcher
            .fetch(
                &[Component::Base],
                &Version::new(10, 6, VersionType::Release),
                Architecture::Amd64,
                &tmp.path().join("staging"),
                &mut |_| Ok(()),
            )
            .unwrap_err();
        match err {
            JailError::Transport { url, .. } => assert!(url.ends_with("10.6-RELEASE/base.txz")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fetch_stops_at_first_failure() {
        let tmp = TempDir::new().unwrap();
        let fetcher = local_mirror(&tmp);
        let dest = tmp.path().join("staging");
        let result = fetcher.fetch(
            &[Component::Lib32, Component::Base],
            &release(),
            Architecture::Amd64,
            &dest,
            &mut |_| Ok(()),
        );
        assert!(result.is_err());
        assert!(!dest.join("base.txz").exists());
    }

    #[test]
    fn test_callback_error_aborts_transfer() {
        let tmp = TempDir::new().unwrap();
        let fetcher = local_mirror(&tmp);
        let dest = tmp.path().join("staging");

        let err = fetcher
            .fetch(
                &[Component::Base],
                &release(),
                Architecture::Amd64,
                &dest,
                &mut |_| Err(JailError::Conflict("cancelled".to_string())),
            )
            .unwrap_err();
        assert!(matches!(err, JailError::Conflict(_)));
        assert_eq!(std::fs::read(dest.join("base.txz")).unwrap().len(), 8192);
    }

    #[test]
    fn test_http_error_status() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = std::io::BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
                line.clear();
            }
            let mut stream = stream;
            stream
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .unwrap();
        });

        let fetcher = HttpFetcher::new(format!("http://{}", addr)).unwrap();
        let tmp = TempDir::new().unwrap();
        let err = fetcher
            .fetch_file(
                &format!("http://{}/base.txz", addr),
                &tmp.path().join("base.txz"),
                &mut |_| Ok(()),
            )
            .unwrap_err();
        server.join().unwrap();

        match err {
            JailError::Transport { message, .. } => assert!(message.contains("404")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_throughput_meter_window() {
        let mut meter = ThroughputMeter::new(Duration::from_secs(5));
        assert_eq!(meter.record(1000, Duration::from_secs(1)), 1000.0);
        assert_eq!(meter.record(3000, Duration::from_secs(1)), 2000.0);
        // Push the window past 5s, then the next sample starts a new window.
        meter.record(0, Duration::from_secs(4));
        assert_eq!(meter.record(500, Duration::from_secs(1)), 500.0);
    }

    #[test]
    fn test_throughput_meter_zero_elapsed() {
        let mut meter = ThroughputMeter::default();
        assert_eq!(meter.record(100, Duration::ZERO), 0.0);
    }
}
