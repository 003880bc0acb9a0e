//! Page cache middleware.
//!
//! Wraps a host router: eligible requests with a stored page are answered immediately and the
//! inner service never runs; otherwise the rendered response is recorded on the way out.

use std::sync::Arc;

use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt};
use http_body_util::BodyExt;
use tracing::{debug, instrument, warn};

use super::context::{RequestContext, SessionState};
use super::gate::CacheGate;

/// Shared cache state for middleware.
pub type CacheState = Arc<CacheGate>;

/// Middleware binding the gate to request dispatch and completion.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn page_cache_layer(
    State(gate): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ctx = RequestContext::from_request(&request);

    if let Some(page) = gate.on_request_start(&ctx).await {
        return page.into_response();
    }

    let response = next.run(request).await;

    // Session changes made while rendering are reported on the response.
    let ctx = match response.extensions().get::<SessionState>() {
        Some(session) => ctx.with_session(session.clone()),
        None => ctx,
    };

    if !should_store_response(&response) || !gate.should_record(&ctx) {
        return response;
    }

    let limit = gate.config().max_body_bytes;
    if declared_length(&response) > limit as u64 {
        debug!(limit, "rendered page too large to cache");
        return response;
    }

    let (parts, body) = response.into_parts();
    match buffer_page(body, limit).await {
        Buffered::Complete(bytes) => {
            gate.record(&ctx, &bytes).await;
            Response::from_parts(parts, Body::from(bytes))
        }
        Buffered::Passthrough(body) => Response::from_parts(parts, body),
    }
}

enum Buffered {
    /// The whole page, within the size limit.
    Complete(Bytes),
    /// The page could not be recorded; the body replays what was read and continues unchanged.
    Passthrough(Body),
}

/// Length the response announces through `Content-Length` or the body size hint, whichever is larger.
fn declared_length(response: &Response) -> u64 {
    let header = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    let hint = HttpBody::size_hint(response.body()).lower();
    header.map_or(hint, |len| len.max(hint))
}

/// Read the body frame by frame, giving up once it exceeds `limit` or fails.
async fn buffer_page(mut body: Body, limit: usize) -> Buffered {
    let mut page = BytesMut::new();

    loop {
        match body.frame().await {
            None => return Buffered::Complete(page.freeze()),
            Some(Ok(frame)) => match frame.into_data() {
                Ok(data) => {
                    page.extend_from_slice(&data);
                    if page.len() > limit {
                        debug!(limit, "rendered page too large to cache");
                        return Buffered::Passthrough(replay(page.freeze(), body));
                    }
                }
                Err(_) => {
                    debug!("rendered page carries trailers, not caching");
                    return Buffered::Passthrough(replay(page.freeze(), body));
                }
            },
            Some(Err(err)) => {
                warn!(error = %err, "rendered page body failed, not caching");
                let head = stream::once(async move { Ok::<_, axum::Error>(page.freeze()) });
                let failure = stream::once(async move { Err::<Bytes, _>(err) });
                return Buffered::Passthrough(Body::from_stream(head.chain(failure)));
            }
        }
    }
}

fn replay(head: Bytes, rest: Body) -> Body {
    let head = stream::once(async move { Ok::<_, axum::Error>(head) });
    Body::from_stream(head.chain(rest.into_data_stream()))
}

/// Only complete, non-personalized HTML pages are recorded.
pub fn should_store_response(response: &Response) -> bool {
    if response.status() != StatusCode::OK {
        return false;
    }

    if response.headers().contains_key(header::SET_COOKIE) {
        return false;
    }

    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/html"))
}
