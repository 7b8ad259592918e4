//! Value decoder (spec §4.3): decides whether the right-hand side of an
//! attribute line is empty, plain UTF-8, base64, or URL-referenced bytes.

use crate::base64::read_base64;

/// Host hook for resolving `attr:< url` values. The scheme set is
/// implementation-defined (spec §4.3); `file:` must be supported.
/// `allowed_schemes` lets a host restrict which schemes may be fetched
/// (spec §9's open question on URL scheme exfiltration).
pub trait UrlFetcher {
    fn allowed_schemes(&self) -> &[&str] {
        &["file"]
    }
    fn fetch(&self, url: &str) -> std::io::Result<Vec<u8>>;
}

/// Default `UrlFetcher`: supports `file:` URLs by reading the local
/// filesystem, refuses everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileUrlFetcher;

impl UrlFetcher for FileUrlFetcher {
    fn fetch(&self, url: &str) -> std::io::Result<Vec<u8>> {
        let path = url.strip_prefix("file://").unwrap_or(url);
        std::fs::read(path)
    }
}

/// Decode a raw line's value portion (the bytes after the encoding
/// marker on an attribute line) into a concrete byte string.
///
/// `raw` is everything after the colon that selects the encoding:
/// - `Plain(s)` — one or more leading spaces already stripped by the
///   caller; `s` is taken verbatim as UTF-8-safe bytes.
/// - `Base64(s)` — leading spaces after `::` already stripped; `s` is
///   standard base64 text to decode.
/// - `Url(s)` — leading spaces after `:<` already stripped; `s` is an
///   absolute URL to fetch.
/// - `Empty` — the colon was the last character on the line.
pub enum RawValue<'a> {
    Empty,
    Plain(&'a str),
    Base64(&'a str),
    Url(&'a str),
}

/// Split one attribute (or `dn:`, or `changetype:`) logical line into its
/// attribute description and raw value, per the colon/encoding-marker
/// rules of spec §4.3. `line` is a folded logical line with no
/// terminator. Returns an error if the colon is absent or at position 0.
pub fn split_line(line: &[u8]) -> Result<(String, RawValue<'_>), String> {
    let colon = match line.iter().position(|&b| b == b':') {
        Some(0) => return Err("line has no attribute description before ':'".to_string()),
        Some(pos) => pos,
        None => return Err("line has no ':' separator".to_string()),
    };
    let attrdesc = std::str::from_utf8(&line[..colon])
        .map_err(|_| "attribute description is not valid UTF-8".to_string())?
        .to_string();

    let rest = &line[colon + 1..];
    if rest.is_empty() {
        return Ok((attrdesc, RawValue::Empty));
    }
    match rest[0] {
        b':' => {
            let s = skip_leading_spaces(&rest[1..]);
            let s = std::str::from_utf8(s)
                .map_err(|_| "base64 payload is not valid UTF-8".to_string())?;
            Ok((attrdesc, RawValue::Base64(s)))
        }
        b'<' => {
            let s = skip_leading_spaces(&rest[1..]);
            let s =
                std::str::from_utf8(s).map_err(|_| "URL is not valid UTF-8".to_string())?;
            Ok((attrdesc, RawValue::Url(s)))
        }
        _ => {
            let s = skip_leading_spaces(rest);
            let s = std::str::from_utf8(s)
                .map_err(|_| "plain value is not valid UTF-8".to_string())?;
            Ok((attrdesc, RawValue::Plain(s)))
        }
    }
}

fn skip_leading_spaces(bytes: &[u8]) -> &[u8] {
    let mut i = 0;
    while i < bytes.len() && bytes[i] == b' ' {
        i += 1;
    }
    &bytes[i..]
}

pub fn decode_value(raw: RawValue<'_>, fetcher: &dyn UrlFetcher) -> Result<Vec<u8>, String> {
    match raw {
        RawValue::Empty => Ok(Vec::new()),
        RawValue::Plain(s) => Ok(s.as_bytes().to_vec()),
        RawValue::Base64(s) => read_base64(s).ok_or_else(|| "invalid base64 value".to_string()),
        RawValue::Url(s) => {
            let scheme = s.split(':').next().unwrap_or("");
            if !fetcher.allowed_schemes().contains(&scheme) {
                return Err(format!("URL scheme not permitted: {}", scheme));
            }
            fetcher
                .fetch(s)
                .map_err(|e| format!("failed to fetch URL {}: {}", s, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_value_decodes_to_empty_bytes() {
        let v = decode_value(RawValue::Empty, &FileUrlFetcher).unwrap();
        assert!(v.is_empty());
    }

    #[test]
    fn plain_value_is_utf8_bytes() {
        let v = decode_value(RawValue::Plain("hello"), &FileUrlFetcher).unwrap();
        assert_eq!(v, b"hello");
    }

    #[test]
    fn base64_value_decodes() {
        let v = decode_value(RawValue::Base64("aGVsbG8="), &FileUrlFetcher).unwrap();
        assert_eq!(v, b"hello");
    }

    #[test]
    fn base64_invalid_is_fatal() {
        assert!(decode_value(RawValue::Base64("!!!"), &FileUrlFetcher).is_err());
    }

    #[test]
    fn file_url_reads_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"file contents").unwrap();
        let url = format!("file://{}", f.path().display());
        let v = decode_value(RawValue::Url(&url), &FileUrlFetcher).unwrap();
        assert_eq!(v, b"file contents");
    }

    #[test]
    fn unknown_scheme_rejected() {
        let v = decode_value(RawValue::Url("http://example.com/x"), &FileUrlFetcher);
        assert!(v.is_err());
    }
}
