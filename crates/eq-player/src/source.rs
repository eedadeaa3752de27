//! Media locations: what a player is constructed from.
//!
//! A player accepts a URL-ish string. Local files may be given as `file://`
//! URLs or plain paths; remote media is read over HTTP range requests.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result, anyhow, bail};
use symphonia::core::io::MediaSource;
use symphonia::core::probe::Hint;

use crate::http_stream::{HttpRangeConfig, HttpRangeSource};

/// Where the audio comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaLocation {
    /// A file on the local filesystem.
    File(PathBuf),
    /// An `http://` or `https://` resource.
    Http(String),
}

impl MediaLocation {
    /// Parse a `file://` URL, an `http(s)://` URL, or a bare filesystem path.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            bail!("empty media URL");
        }

        let Some((scheme, rest)) = split_scheme(input) else {
            return Ok(MediaLocation::File(PathBuf::from(input)));
        };

        match scheme.to_ascii_lowercase().as_str() {
            "file" => {
                // file:///abs/path and file://localhost/abs/path
                let path = rest
                    .strip_prefix("localhost")
                    .unwrap_or(rest)
                    .split(['?', '#'])
                    .next()
                    .unwrap_or_default();
                if path.is_empty() {
                    bail!("file URL has no path: {input}");
                }
                let decoded = urlencoding::decode(path)
                    .with_context(|| format!("decode file URL {input}"))?;
                Ok(MediaLocation::File(PathBuf::from(decoded.into_owned())))
            }
            "http" | "https" => {
                if rest.trim_start_matches('/').is_empty() {
                    bail!("URL has no host: {input}");
                }
                Ok(MediaLocation::Http(input.to_string()))
            }
            other => Err(anyhow!("unsupported URL scheme: {other}")),
        }
    }

    /// Lowercase extension of the file or URL path, if any.
    pub fn extension_hint(&self) -> Option<String> {
        match self {
            MediaLocation::File(path) => path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase),
            MediaLocation::Http(url) => infer_ext_from_url(url),
        }
    }

    /// Symphonia probe hint seeded with [`Self::extension_hint`].
    pub fn probe_hint(&self) -> Hint {
        let mut hint = Hint::new();
        if let Some(ext) = self.extension_hint() {
            hint.with_extension(&ext);
        }
        hint
    }

    /// Short human-readable label: the file name, or the URL itself.
    pub fn display_name(&self) -> String {
        match self {
            MediaLocation::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            MediaLocation::Http(url) => url.clone(),
        }
    }

    /// Open a fresh byte stream positioned at the start of the media.
    pub fn open(
        &self,
        http: &HttpRangeConfig,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<Box<dyn MediaSource>> {
        match self {
            MediaLocation::File(path) => {
                let file = open_file(path)?;
                Ok(Box::new(file))
            }
            MediaLocation::Http(url) => Ok(Box::new(HttpRangeSource::new(
                url.clone(),
                http.clone(),
                cancel,
            ))),
        }
    }
}

impl fmt::Display for MediaLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaLocation::File(path) => write!(f, "{}", path.display()),
            MediaLocation::Http(url) => f.write_str(url),
        }
    }
}

fn open_file(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("open {:?}", path))
}

/// Split `scheme://rest`. Single-letter schemes are treated as Windows drive
/// letters, not URLs.
fn split_scheme(input: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = input.split_once("://")?;
    let valid = scheme.len() > 1
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some((scheme, rest))
}

/// Infer a file extension from the URL path if present.
fn infer_ext_from_url(url: &str) -> Option<String> {
    let tail = url.split(['?', '#']).next().unwrap_or(url);
    let tail = tail.split_once("://").map_or(tail, |(_, rest)| rest);
    let (_, path) = tail.split_once('/')?;
    let file = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
