//! Size-limited request body reading.

use axum::body::{Body, Bytes};
use axum::http::HeaderMap;
use axum::http::header::CONTENT_LENGTH;
use futures_util::StreamExt;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Rejects a declared `Content-Length` above `limit` before any read.
///
/// # Errors
///
/// Returns [`Error::PayloadTooLarge`] if the header exceeds the limit.
pub fn check_content_length(headers: &HeaderMap, limit: usize) -> Result<()> {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    match declared {
        Some(len) if len > limit as u64 => {
            warn!(declared = len, limit, "Declared body too large");
            Err(Error::payload_too_large(limit))
        }
        _ => Ok(()),
    }
}

/// Reads a body chunk by chunk, stopping as soon as it exceeds `limit`.
///
/// # Errors
///
/// - [`Error::PayloadTooLarge`] once more than `limit` bytes arrive
/// - [`Error::BadRequest`] if the body stream fails
pub async fn read_limited(body: Body, limit: usize) -> Result<Bytes> {
    let mut stream = body.into_data_stream();
    let mut buf = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            debug!(error = %e, "Body stream failed");
            Error::bad_request("failed to read request body")
        })?;

        if buf.len() + chunk.len() > limit {
            warn!(limit, "Body exceeded limit while streaming");
            return Err(Error::payload_too_large(limit));
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::HeaderValue;

    #[tokio::test]
    async fn test_reads_body_within_limit() {
        let bytes = read_limited(Body::from("{\"a\":1}"), 64).await.expect("read");
        assert_eq!(&bytes[..], b"{\"a\":1}");
    }

    #[tokio::test]
    async fn test_rejects_oversized_stream() {
        let chunks = futures_util::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from(vec![b'a'; 600])),
            Ok(Bytes::from(vec![b'b'; 600])),
        ]);
        let err = read_limited(Body::from_stream(chunks), 1000).await.unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { limit: 1000 }));
    }

    #[tokio::test]
    async fn test_exact_limit_accepted() {
        let bytes = read_limited(Body::from(vec![0u8; 16]), 16).await.expect("read");
        assert_eq!(bytes.len(), 16);
    }

    #[test]
    fn test_declared_length_checked() {
        let mut headers = HeaderMap::new();
        assert!(check_content_length(&headers, 10).is_ok());

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("10"));
        assert!(check_content_length(&headers, 10).is_ok());

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("11"));
        assert!(check_content_length(&headers, 10).is_err());
    }
}
