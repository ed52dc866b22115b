//! Binary downloads: bytes plus a suggested filename.

use regex::Regex;
use std::sync::LazyLock;

static EXTENDED_FILENAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)filename\*\s*=\s*(?:utf-8)?''([^;]+)"#).ok());

static PLAIN_FILENAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)filename\s*=\s*(?:"([^"]*)"|([^;]+))"#).ok());

/// A downloaded file. Saving it is the caller's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    /// File content.
    pub bytes: Vec<u8>,
    /// Suggested filename.
    pub filename: String,
}

impl Download {
    /// Builds a download from a `Content-Disposition` header, falling back to
    /// `fallback` when the header is missing or carries no usable name.
    #[must_use]
    pub fn new(bytes: Vec<u8>, content_disposition: Option<&str>, fallback: &str) -> Self {
        let filename = content_disposition
            .and_then(filename_from_content_disposition)
            .unwrap_or_else(|| fallback.to_string());
        Self { bytes, filename }
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Extracts the filename from a `Content-Disposition` header value.
///
/// The RFC 5987 `filename*` form takes precedence over `filename`. Directory
/// components are stripped.
#[must_use]
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    let extended = EXTENDED_FILENAME
        .as_ref()
        .and_then(|re| re.captures(header))
        .and_then(|c| c.get(1))
        .map(|m| percent_decode(m.as_str().trim()));

    let name = extended.or_else(|| {
        PLAIN_FILENAME
            .as_ref()
            .and_then(|re| re.captures(header))
            .and_then(|c| c.get(1).or_else(|| c.get(2)))
            .map(|m| m.as_str().trim().to_string())
    })?;

    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base.is_empty() {
        None
    } else {
        Some(base.to_string())
    }
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && let Some(hex) = input.get(i + 1..i + 3)
            && let Ok(byte) = u8::from_str_radix(hex, 16)
        {
            out.push(byte);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
