// Chunked streaming of generated file bodies
use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::stream::Stream;

/// Create a chunked download response from a stream of body chunks.
///
/// An `Err` item aborts the body, so the client never sees a cleanly ended
/// but incomplete file.
pub fn chunked_stream<S>(
    stream: S,
    content_type: &'static str,
    filename: &str,
) -> Result<Response<Body>, StatusCode>
where
    S: Stream<Item = std::io::Result<Bytes>> + Send + 'static,
{
    let body = Body::from_stream(stream);
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::TRANSFER_ENCODING, "chunked")
        .body(body)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Helper to create a streaming response from a receiver
pub fn stream_from_receiver(
    mut rx: tokio::sync::mpsc::Receiver<std::io::Result<Bytes>>,
    content_type: &'static str,
    filename: &str,
) -> Response<Body> {
    let stream = async_stream::stream! {
        while let Some(chunk) = rx.recv().await {
            yield chunk;
        }
    };

    match chunked_stream(stream, content_type, filename) {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}
