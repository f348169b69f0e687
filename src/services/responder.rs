//! Turning an authorized media handle into an HTTP response.
//!
//! Bodies are produced with a fixed-size read buffer (`chunk_size`), so the
//! memory held per request does not depend on the file size. The file
//! handle is owned by the body stream and closed when the stream is dropped,
//! whether it finished, errored or the client went away.

use crate::{
    errors::MediaError,
    models::media::AuthorizedMediaHandle,
    services::{cache::CacheValidators, filename::content_disposition},
};
use axum::{
    body::Body,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{
            ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE,
            IF_RANGE, RANGE,
        },
    },
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::{io::SeekFrom, time::Duration};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// A requested byte range, inclusive on both ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteRange {
    /// Serve the whole file.
    Full,
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

#[derive(Clone, Debug)]
pub struct StreamingResponder {
    chunk_size: usize,
    cache_max_age: Duration,
}

impl StreamingResponder {
    pub fn new(chunk_size: usize, cache_max_age: Duration) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            cache_max_age,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Build the response for `handle`, honouring conditional and range headers.
    ///
    /// Length and validators are read from the opened file, not from the
    /// stat taken during validation.
    pub async fn respond(
        &self,
        handle: &AuthorizedMediaHandle,
        request: &HeaderMap,
    ) -> Result<Response, MediaError> {
        let mut file = File::open(&handle.media.path).await.map_err(|err| {
            warn!(media_id = %handle.media.id, error = %err, "failed to open media file");
            MediaError::StreamOpenFailure(err)
        })?;
        let metadata = file.metadata().await.map_err(MediaError::StreamOpenFailure)?;
        let size = metadata.len();
        let modified = metadata.modified().unwrap_or(handle.modified);
        if size != handle.size {
            debug!(media_id = %handle.media.id, "media file changed since validation");
        }

        let validators =
            CacheValidators::compute(&handle.media.path, modified, size, self.cache_max_age);
        if validators.is_not_modified(request) {
            debug!(media_id = %handle.media.id, "client copy is current");
            return Ok(validators.not_modified_response());
        }

        let range = if range_applies(request, &validators) {
            request
                .get(RANGE)
                .and_then(|v| v.to_str().ok())
                .map(|raw| parse_range(raw, size))
                .unwrap_or(ByteRange::Full)
        } else {
            ByteRange::Full
        };

        if range == ByteRange::Unsatisfiable {
            let mut response = StatusCode::RANGE_NOT_SATISFIABLE.into_response();
            let headers = response.headers_mut();
            insert_header(headers, CONTENT_RANGE, &format!("bytes */{}", size));
            validators.apply(headers);
            return Ok(response);
        }

        let (status, body, length) = match range {
            ByteRange::Partial { start, end } => {
                let length = end - start + 1;
                file.seek(SeekFrom::Start(start))
                    .await
                    .map_err(MediaError::StreamOpenFailure)?;
                (StatusCode::PARTIAL_CONTENT, self.stream_body(file, length), length)
            }
            _ if size <= self.chunk_size as u64 => {
                // Small enough to fit in one chunk: read it in one go.
                let mut buf = Vec::with_capacity(size as usize);
                file.take(size)
                    .read_to_end(&mut buf)
                    .await
                    .map_err(MediaError::StreamOpenFailure)?;
                let length = buf.len() as u64;
                (StatusCode::OK, Body::from(buf), length)
            }
            _ => (StatusCode::OK, self.stream_body(file, size), size),
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        let headers = response.headers_mut();
        insert_header(headers, CONTENT_TYPE, &handle.media.mime_type);
        insert_header(headers, CONTENT_LENGTH, &length.to_string());
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        insert_header(
            headers,
            CONTENT_DISPOSITION,
            &content_disposition(&handle.media.file_name, handle.access.is_attachment()),
        );
        if let ByteRange::Partial { start, end } = range {
            insert_header(
                headers,
                CONTENT_RANGE,
                &format!("bytes {}-{}/{}", start, end, size),
            );
        }
        validators.apply(headers);

        Ok(response)
    }

    /// Stream at most `length` bytes of `file` in `chunk_size` pieces.
    fn stream_body(&self, file: File, length: u64) -> Body {
        let stream = ReaderStream::with_capacity(file.take(length), self.chunk_size).map(
            |chunk| {
                if let Err(err) = &chunk {
                    warn!(error = %err, "media stream aborted");
                }
                chunk
            },
        );
        Body::from_stream(stream)
    }
}

fn insert_header(headers: &mut HeaderMap, name: axum::http::HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => debug!(header = %name, "dropping header with invalid value"),
    }
}

/// `If-Range` only lets a range through when it names the current representation.
fn range_applies(request: &HeaderMap, validators: &CacheValidators) -> bool {
    let Some(if_range) = request.get(IF_RANGE) else {
        return true;
    };
    let Ok(if_range) = if_range.to_str() else {
        return false;
    };
    let if_range = if_range.trim();
    if_range == validators.etag || validators.last_modified.as_deref() == Some(if_range)
}

/// Parse a `Range` header against a file of `size` bytes.
///
/// Only a single `bytes` range is honoured; multiple ranges and syntax
/// errors fall back to the full body.
pub fn parse_range(raw: &str, size: u64) -> ByteRange {
    let Some(set) = raw.trim().strip_prefix("bytes=") else {
        return ByteRange::Full;
    };
    if set.contains(',') {
        return ByteRange::Full;
    }
    let Some((first, last)) = set.trim().split_once('-') else {
        return ByteRange::Full;
    };
    let (first, last) = (first.trim(), last.trim());

    if first.is_empty() {
        // Suffix range: the final `n` bytes.
        let Ok(suffix) = last.parse::<u64>() else {
            return ByteRange::Full;
        };
        if suffix == 0 || size == 0 {
            return ByteRange::Unsatisfiable;
        }
        return ByteRange::Partial {
            start: size.saturating_sub(suffix),
            end: size - 1,
        };
    }

    let Ok(start) = first.parse::<u64>() else {
        return ByteRange::Full;
    };
    let end = if last.is_empty() {
        None
    } else {
        match last.parse::<u64>() {
            Ok(end) if end >= start => Some(end),
            _ => return ByteRange::Full,
        }
    };

    if start >= size {
        return ByteRange::Unsatisfiable;
    }
    ByteRange::Partial {
        start,
        end: end.map_or(size - 1, |end| end.min(size - 1)),
    }
}
