//! HTTP middleware stack.
//!
//! Applied outside-in: request logging, subnet filter, body size limit (a
//! tower-http layer), request decompression, body decryption, signature
//! check, then the router. Each security middleware passes requests through
//! untouched when its option is not configured.

use std::net::IpAddr;
use std::time::Instant;

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use pulsemon_codec::{compress, crypt, sign};
use pulsemon_common::headers;

use crate::state::AppState;

/// Logs method, path, status, and elapsed time for every request.
pub async fn request_logging(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();
    tracing::info!(%method, path, status, elapsed_ms, "request handled");

    response
}

/// Rejects requests whose `X-Real-IP` is missing, unparsable, or outside the
/// trusted subnet.
pub async fn subnet_filter(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(subnet) = state.trusted_subnet else {
        return next.run(req).await;
    };

    let real_ip = req
        .headers()
        .get(headers::REAL_IP)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let Ok(ip) = real_ip.parse::<IpAddr>() else {
        tracing::debug!(header = real_ip, "failed to parse X-Real-IP header");
        return StatusCode::FORBIDDEN.into_response();
    };

    if !subnet.contains(&ip) {
        tracing::debug!(%ip, %subnet, "client address is not in trusted subnet");
        return StatusCode::FORBIDDEN.into_response();
    }

    next.run(req).await
}

/// Buffers the request body, mapping an exceeded body limit to 413.
async fn buffer_body(req: Request) -> Result<(axum::http::request::Parts, Bytes), Response> {
    let (parts, body) = req.into_parts();
    match to_bytes(body, usize::MAX).await {
        Ok(bytes) => Ok((parts, bytes)),
        Err(_) => Err(StatusCode::PAYLOAD_TOO_LARGE.into_response()),
    }
}

/// Decompresses gzip request bodies in place. Unsupported encodings pass
/// through untouched; corrupt gzip payloads are rejected as bad data.
pub async fn decompression(req: Request, next: Next) -> Response {
    let encoding = req
        .headers()
        .get(headers::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if encoding.is_empty() {
        return next.run(req).await;
    }

    if !compress::is_supported(&encoding) {
        tracing::debug!(encoding, "unsupported content encoding, passing through");
        return next.run(req).await;
    }

    let (mut parts, bytes) = match buffer_body(req).await {
        Ok(ok) => ok,
        Err(resp) => return resp,
    };

    let decompressed = match compress::decompress(&bytes) {
        Ok(data) => data,
        Err(e) => {
            tracing::debug!(error = %e, "failed to decompress request body");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    // The body no longer matches the encoding header; drop it so inner
    // layers see plain bytes.
    parts.headers.remove(headers::CONTENT_ENCODING);
    next.run(Request::from_parts(parts, Body::from(decompressed)))
        .await
}

/// Decrypts hybrid-encrypted request bodies with the configured private key.
pub async fn decryption(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(private_key) = state.private_key else {
        return next.run(req).await;
    };

    let (parts, bytes) = match buffer_body(req).await {
        Ok(ok) => ok,
        Err(resp) => return resp,
    };

    if bytes.is_empty() {
        return next.run(Request::from_parts(parts, Body::empty())).await;
    }

    let mut data = bytes.to_vec();
    if let Err(e) = crypt::decrypt_body(&mut data, &private_key) {
        tracing::debug!(error = %e, "failed to decrypt request body");
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }

    next.run(Request::from_parts(parts, Body::from(data))).await
}

/// Verifies the `HashSHA256` signature over the (already decompressed and
/// decrypted) body. Requests without the header pass through.
pub async fn signature_check(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(secret) = state.secret_key else {
        return next.run(req).await;
    };

    let Some(signature) = req
        .headers()
        .get(headers::SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        return next.run(req).await;
    };

    let (parts, bytes) = match buffer_body(req).await {
        Ok(ok) => ok,
        Err(resp) => return resp,
    };

    if let Err(e) = sign::check_data(&bytes, &secret, &signature) {
        tracing::debug!(error = %e, "failed to validate body signature");
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
