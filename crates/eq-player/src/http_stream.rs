//! Seekable HTTP media source.
//!
//! Serves `Read + Seek` over `Range` requests, keeping one fetched block in
//! memory. Enough for Symphonia's probe/seek patterns on remote files.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use symphonia::core::io::MediaSource;

/// Configuration for HTTP range fetching.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpRangeConfig {
    /// Bytes per fetched block.
    pub block_size: usize,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for HttpRangeConfig {
    fn default() -> Self {
        Self {
            block_size: 512 * 1024,
            timeout: Duration::from_secs(10),
        }
    }
}

/// One fetched block and where it sits in the remote resource.
#[derive(Default)]
struct Block {
    start: u64,
    data: Vec<u8>,
}

impl Block {
    fn contains(&self, pos: u64) -> bool {
        pos >= self.start && pos < self.start.saturating_add(self.data.len() as u64)
    }
}

/// HTTP byte-range reader with a single-block cache.
///
/// Once `cancel` is set every read returns EOF, which lets a decoder thread
/// blocked on the network wind down with the rest of the session.
pub struct HttpRangeSource {
    url: String,
    config: HttpRangeConfig,
    pos: u64,
    len: Option<u64>,
    block: Block,
    cancel: Option<Arc<AtomicBool>>,
}

impl HttpRangeSource {
    /// Create a range source for `url`; nothing is fetched until the first read.
    pub fn new(url: String, config: HttpRangeConfig, cancel: Option<Arc<AtomicBool>>) -> Self {
        Self {
            url,
            config,
            pos: 0,
            len: None,
            block: Block::default(),
            cancel,
        }
    }

    fn is_canceled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
    }

    fn ensure_len(&mut self) -> io::Result<u64> {
        if let Some(len) = self.len {
            return Ok(len);
        }
        let (data, len) = self.fetch_range(0, 0)?;
        let len = len.ok_or_else(|| io::Error::other("content length unavailable"))?;
        self.block = Block { start: 0, data };
        self.len = Some(len);
        Ok(len)
    }

    fn fetch_range(&self, start: u64, end: u64) -> io::Result<(Vec<u8>, Option<u64>)> {
        let range = format!("bytes={start}-{end}");
        let began = Instant::now();
        let resp = ureq::get(&self.url)
            .config()
            .timeout_per_call(Some(self.config.timeout))
            .build()
            .header("Range", &range)
            .call()
            .map_err(|e| io::Error::other(format!("http range request failed: {e}")))?;

        let status = resp.status();
        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_range = header("Content-Range");
        let content_length = header("Content-Length").and_then(|s| s.parse::<u64>().ok());

        let mut data = Vec::new();
        resp.into_body()
            .into_reader()
            .read_to_end(&mut data)
            .map_err(|e| io::Error::other(format!("http read failed: {e}")))?;

        let took = began.elapsed();
        if took > Duration::from_millis(250) {
            tracing::warn!(
                took_ms = took.as_millis() as u64,
                bytes = data.len(),
                range = range.as_str(),
                "http range fetch slow"
            );
        }

        let len = match status {
            ureq::http::StatusCode::PARTIAL_CONTENT => content_range
                .as_deref()
                .and_then(parse_content_range_total)
                .or(content_length),
            ureq::http::StatusCode::OK => {
                // Server ignored the range and sent the whole resource.
                let total = content_length.unwrap_or(data.len() as u64);
                if start > 0 {
                    let skip = (start as usize).min(data.len());
                    data.drain(..skip);
                }
                Some(total)
            }
            _ => None,
        };

        Ok((data, len))
    }

    fn refill(&mut self) -> io::Result<()> {
        let start = self.pos;
        let mut end = start
            .saturating_add(self.config.block_size as u64)
            .saturating_sub(1);
        if let Some(len) = self.len.filter(|len| *len > 0) {
            end = end.min(len - 1);
        }

        let (data, len) = self.fetch_range(start, end)?;
        if len.is_some() {
            self.len = len;
        }
        self.block = Block { start, data };
        Ok(())
    }
}

impl Read for HttpRangeSource {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() || self.is_canceled() {
            return Ok(0);
        }
        if self.len.is_some_and(|len| self.pos >= len) {
            return Ok(0);
        }

        if !self.block.contains(self.pos) {
            self.refill()?;
            if !self.block.contains(self.pos) {
                return Ok(0);
            }
        }

        let offset = (self.pos - self.block.start) as usize;
        let available = &self.block.data[offset..];
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.pos = self.pos.saturating_add(n as u64);
        Ok(n)
    }
}

impl Seek for HttpRangeSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = match pos {
            SeekFrom::Start(x) => x,
            SeekFrom::Current(d) => add_signed(self.pos, d),
            SeekFrom::End(d) => {
                let len = self.ensure_len()?;
                add_signed(len, d)
            }
        };
        Ok(self.pos)
    }
}

impl MediaSource for HttpRangeSource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        self.len
    }
}

/// Total length from a `Content-Range: bytes start-end/total` header.
fn parse_content_range_total(header: &str) -> Option<u64> {
    let (_, total) = header.split_once('/')?;
    total.trim().parse::<u64>().ok()
}

fn add_signed(base: u64, delta: i64) -> u64 {
    if delta >= 0 {
        base.saturating_add(delta as u64)
    } else {
        base.saturating_sub(delta.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = HttpRangeConfig::default();
        assert_eq!(cfg.block_size, 512 * 1024);
        assert_eq!(cfg.timeout, Duration::from_secs(10));
    }

    #[test]
    fn parse_content_range_total_reads_total() {
        assert_eq!(parse_content_range_total("bytes 0-99/12345"), Some(12345));
        assert_eq!(parse_content_range_total("bytes 0-99/*"), None);
        assert_eq!(parse_content_range_total("bytes 0-99"), None);
    }

    #[test]
    fn add_signed_saturates_both_ways() {
        assert_eq!(add_signed(10, 5), 15);
        assert_eq!(add_signed(10, -3), 7);
        assert_eq!(add_signed(5, -10), 0);
        assert_eq!(add_signed(u64::MAX, 10), u64::MAX);
        assert_eq!(add_signed(u64::MAX, i64::MIN), u64::MAX - (1u64 << 63));
    }

    #[test]
    fn block_contains_is_half_open() {
        let block = Block {
            start: 100,
            data: vec![0; 10],
        };
        assert!(!block.contains(99));
        assert!(block.contains(100));
        assert!(block.contains(109));
        assert!(!block.contains(110));
    }

    #[test]
    fn canceled_source_reads_eof_without_network() {
        let cancel = Arc::new(AtomicBool::new(true));
        let mut source = HttpRangeSource::new(
            "http://127.0.0.1:9/never.flac".to_string(),
            HttpRangeConfig::default(),
            Some(cancel),
        );
        let mut buf = [0u8; 16];
        assert_eq!(source.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn seek_from_start_and_current_moves_position() {
        let mut source =
            HttpRangeSource::new("http://example/a.mp3".to_string(), HttpRangeConfig::default(), None);
        assert_eq!(source.seek(SeekFrom::Start(40)).unwrap(), 40);
        assert_eq!(source.seek(SeekFrom::Current(-15)).unwrap(), 25);
        assert!(source.byte_len().is_none());
    }
}
