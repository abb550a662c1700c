//! Source locations and HTTP range reads.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::StatusCode;
use tracing::trace;

use super::error::SourceError;

/// Default read-ahead block for range requests.
pub const DEFAULT_BLOCK_SIZE: usize = 512 * 1024;

/// Where a source raster lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Local(PathBuf),
    /// HTTP(S) URL; `s3://` locations are rewritten to their public
    /// virtual-hosted endpoint.
    Http(String),
}

impl SourceLocation {
    /// Classifies a catalog location string.
    pub fn parse(location: &str) -> Result<Self, SourceError> {
        if let Some(rest) = location.strip_prefix("s3://") {
            let (bucket, key) = rest
                .split_once('/')
                .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
                .ok_or_else(|| {
                    SourceError::Corrupt(format!("malformed S3 location '{}'", location))
                })?;
            return Ok(SourceLocation::Http(format!(
                "https://{}.s3.amazonaws.com/{}",
                bucket, key
            )));
        }
        if location.starts_with("http://") || location.starts_with("https://") {
            return Ok(SourceLocation::Http(location.to_string()));
        }
        let path = location.strip_prefix("file://").unwrap_or(location);
        Ok(SourceLocation::Local(PathBuf::from(path)))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, SourceLocation::Http(_))
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocation::Local(path) => write!(f, "{}", path.display()),
            SourceLocation::Http(url) => f.write_str(url),
        }
    }
}

/// HTTP client settings for remote sources.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub block_size: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl RemoteConfig {
    /// Builds the blocking client. Must not be called on an async worker.
    pub fn build_client(&self) -> Result<Client, SourceError> {
        Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.read_timeout)
            .build()
            .map_err(|e| SourceError::Unavailable(format!("failed to create HTTP client: {}", e)))
    }
}

/// `Read + Seek` over an HTTP resource using Range requests.
///
/// Reads are served from a read-ahead block; a read outside the block
/// fetches `block_size` bytes starting at the current position.
pub struct HttpRangeReader {
    client: Client,
    url: String,
    len: u64,
    pos: u64,
    block: Vec<u8>,
    block_start: u64,
    block_size: usize,
}

impl HttpRangeReader {
    /// Opens `url`, learning its length from a HEAD request.
    pub fn open(client: Client, url: &str, block_size: usize) -> Result<Self, SourceError> {
        let response = client
            .head(url)
            .send()
            .map_err(|e| SourceError::Unavailable(format!("HEAD {}: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, url));
        }
        let len = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| SourceError::Unavailable(format!("HEAD {}: no content length", url)))?;

        Ok(Self {
            client,
            url: url.to_string(),
            len,
            pos: 0,
            block: Vec::new(),
            block_start: 0,
            block_size: block_size.max(4096),
        })
    }

    /// Total object length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn fetch(&mut self, start: u64) -> io::Result<()> {
        let end = (start + self.block_size as u64).min(self.len) - 1;
        trace!(url = %self.url, start, end, "Range request");

        let response = self
            .client
            .get(&self.url)
            .header(RANGE, format!("bytes={}-{}", start, end))
            .send()
            .map_err(|e| io::Error::other(format!("GET {}: {}", self.url, e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .map_err(|e| io::Error::other(format!("GET {}: {}", self.url, e)))?;

        self.block = match status {
            StatusCode::PARTIAL_CONTENT => body.to_vec(),
            // Server ignored the range and sent the whole object.
            StatusCode::OK => {
                let from = (start as usize).min(body.len());
                let to = (end as usize + 1).min(body.len());
                body[from..to].to_vec()
            }
            other => {
                return Err(io::Error::other(format!("GET {}: HTTP {}", self.url, other)));
            }
        };
        self.block_start = start;
        Ok(())
    }
}

impl Read for HttpRangeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.len {
            return Ok(0);
        }

        let block_end = self.block_start + self.block.len() as u64;
        if self.pos < self.block_start || self.pos >= block_end {
            self.fetch(self.pos)?;
        }

        let offset = (self.pos - self.block_start) as usize;
        let available = &self.block[offset..];
        if available.is_empty() {
            // Server sent less than it advertised.
            return Err(io::Error::other(format!(
                "GET {}: short range response",
                self.url
            )));
        }
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for HttpRangeReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(target) => {
                self.pos = target;
                Ok(target)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of object",
            )),
        }
    }
}

fn status_error(status: StatusCode, url: &str) -> SourceError {
    let message = format!("HTTP {} from {}", status, url);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        SourceError::Unavailable(message)
    } else {
        // 403/404 will not fix themselves on retry.
        SourceError::Corrupt(message)
    }
}
