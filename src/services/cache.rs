//! Conditional request handling.
//!
//! Validators are derived from `(path, mtime, size)` only, so they are stable
//! for an unchanged file and move whenever either the size or the mtime does.

use axum::{
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED},
    },
    response::{IntoResponse, Response},
};
use std::{
    path::Path,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// ETag, Last-Modified and Cache-Control for one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheValidators {
    /// Quoted strong entity tag.
    pub etag: String,
    /// IMF-fixdate; `None` for pre-epoch mtimes, which HTTP dates cannot express.
    pub last_modified: Option<String>,
    pub cache_control: String,
    modified_secs: Option<u64>,
}

impl CacheValidators {
    pub fn compute(path: &Path, modified: SystemTime, size: u64, max_age: Duration) -> Self {
        let since_epoch = modified.duration_since(UNIX_EPOCH).ok();
        let mtime_nanos = since_epoch.map(|d| d.as_nanos()).unwrap_or_default();
        let digest = md5::compute(format!("{}\0{}\0{}", path.display(), mtime_nanos, size));

        Self {
            etag: format!("\"{:x}\"", digest),
            last_modified: since_epoch.map(|_| httpdate::fmt_http_date(modified)),
            cache_control: format!("private, max-age={}", max_age.as_secs()),
            modified_secs: since_epoch.map(|d| d.as_secs()),
        }
    }

    /// True when the client's cached copy is still current.
    ///
    /// Either a matching `If-None-Match` or an `If-Modified-Since` at or after
    /// the file's mtime short-circuits the response.
    pub fn is_not_modified(&self, request: &HeaderMap) -> bool {
        let etag_matches = request
            .get(IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|inm| if_none_match_matches(inm, &self.etag));
        if etag_matches {
            return true;
        }

        let (Some(resource_secs), Some(since)) = (
            self.modified_secs,
            request
                .get(IF_MODIFIED_SINCE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_imf_fixdate),
        ) else {
            return false;
        };

        // HTTP dates carry whole seconds; compare at that resolution.
        since
            .duration_since(UNIX_EPOCH)
            .is_ok_and(|since| resource_secs <= since.as_secs())
    }

    /// Set `ETag`, `Last-Modified` and `Cache-Control` on a response.
    pub fn apply(&self, headers: &mut HeaderMap) {
        if let Ok(value) = HeaderValue::from_str(&self.etag) {
            headers.insert(ETAG, value);
        }
        if let Some(value) = self
            .last_modified
            .as_deref()
            .and_then(|lm| HeaderValue::from_str(lm).ok())
        {
            headers.insert(LAST_MODIFIED, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.cache_control) {
            headers.insert(CACHE_CONTROL, value);
        }
    }

    /// An empty 304 carrying the current validators.
    pub fn not_modified_response(&self) -> Response {
        let mut response = StatusCode::NOT_MODIFIED.into_response();
        self.apply(response.headers_mut());
        response
    }
}

/// Accept only the IMF-fixdate form, the one this service emits.
///
/// `httpdate` also understands the obsolete RFC 850 and asctime forms; a
/// date is kept only if formatting it back reproduces the input exactly.
fn parse_imf_fixdate(raw: &str) -> Option<SystemTime> {
    let raw = raw.trim();
    let parsed = httpdate::parse_http_date(raw).ok()?;
    (httpdate::fmt_http_date(parsed) == raw).then_some(parsed)
}

fn if_none_match_matches(if_none_match: &str, current: &str) -> bool {
    let current = strip_weak_prefix(current);

    // Entity tags may contain commas inside their quotes; split outside only.
    let mut start = 0usize;
    let mut in_quotes = false;
    for (i, b) in if_none_match.bytes().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b',' if !in_quotes => {
                if tag_matches(&if_none_match[start..i], current) {
                    return true;
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    tag_matches(&if_none_match[start..], current)
}

fn tag_matches(tag: &str, current: &str) -> bool {
    let tag = tag.trim();
    tag == "*" || (!tag.is_empty() && strip_weak_prefix(tag) == current)
}

fn strip_weak_prefix(tag: &str) -> &str {
    let trimmed = tag.trim();
    trimmed
        .strip_prefix("W/")
        .or_else(|| trimmed.strip_prefix("w/"))
        .unwrap_or(trimmed)
}
