//! REST adapter.
//!
//! Every request passes through one fallback handler so that WebSocket
//! upgrades on any path reach the agent admission path.
//!
//! # Request Pipeline
//!
//! 1. Upgrade request → [`admit`]
//! 2. `OPTIONS` → 204
//! 3. Rate limit by client IP → 429
//! 4. `GET /status` (public)
//! 5. Token → 401
//! 6. Route lookup → 404
//! 7. Body (POST only, capped) → 413 / 400
//! 8. Dispatch to the local delay or the agent

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::header::{AUTHORIZATION, CONNECTION, CONTENT_TYPE, ORIGIN, RETRY_AFTER, UPGRADE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::{Map, Value, from_slice, json};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::gate::auth::TOKEN_PARAM;
use crate::gate::{check_content_length, origin_allowed, read_limited};
use crate::protocol::Action;
use crate::relay::Relay;
use crate::transport::{UpgradeRequest, admit};

use super::local_wait;

// ============================================================================
// Route Table
// ============================================================================

/// What a route does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Public status document.
    Status,
    /// Local delay.
    Wait,
    /// Forward to the agent.
    Peer(Action),
}

/// `(method, path, route)` entries.
pub const ROUTES: &[(&str, &str, Route)] = &[
    ("GET", "/status", Route::Status),
    ("GET", "/tabs", Route::Peer(Action::GetTabs)),
    ("GET", "/active", Route::Peer(Action::GetActiveTab)),
    ("GET", "/groups", Route::Peer(Action::ListGroups)),
    ("GET", "/console", Route::Peer(Action::GetConsoleLogs)),
    ("POST", "/navigate", Route::Peer(Action::Navigate)),
    ("POST", "/back", Route::Peer(Action::GoBack)),
    ("POST", "/forward", Route::Peer(Action::GoForward)),
    ("POST", "/newtab", Route::Peer(Action::NewTab)),
    ("POST", "/close", Route::Peer(Action::CloseTab)),
    ("POST", "/focus", Route::Peer(Action::FocusTab)),
    ("POST", "/click", Route::Peer(Action::Click)),
    ("POST", "/type", Route::Peer(Action::Type)),
    ("POST", "/hover", Route::Peer(Action::Hover)),
    ("POST", "/drag", Route::Peer(Action::DragDrop)),
    ("POST", "/key", Route::Peer(Action::PressKey)),
    ("POST", "/select", Route::Peer(Action::SelectOption)),
    ("POST", "/input", Route::Peer(Action::SetInputValue)),
    ("POST", "/read", Route::Peer(Action::ReadPage)),
    ("POST", "/snapshot", Route::Peer(Action::Snapshot)),
    ("POST", "/screenshot", Route::Peer(Action::Screenshot)),
    ("POST", "/execute", Route::Peer(Action::ExecuteScript)),
    ("POST", "/wait", Route::Wait),
    ("POST", "/group", Route::Peer(Action::CreateGroup)),
    ("POST", "/group/add", Route::Peer(Action::AddToGroup)),
    ("POST", "/opengroup", Route::Peer(Action::OpenUrlsInGroup)),
    ("POST", "/ungroup", Route::Peer(Action::UngroupTabs)),
    ("POST", "/group/collapse", Route::Peer(Action::CollapseGroup)),
];

/// Parameters converted from text to numbers.
const NUMERIC_FIELDS: &[&str] = &["tabId", "groupId", "windowId", "x", "y", "time"];

/// Looks up a route by method and path.
#[must_use]
pub fn find_route(method: &Method, path: &str) -> Option<Route> {
    ROUTES
        .iter()
        .find(|(m, p, _)| *m == method.as_str() && *p == path)
        .map(|(_, _, route)| *route)
}

fn available_routes() -> Vec<String> {
    ROUTES.iter().map(|(m, p, _)| format!("{m} {p}")).collect()
}

// ============================================================================
// Router
// ============================================================================

/// Builds the relay's HTTP router.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()` so
/// the rate limiter can see client addresses.
pub fn router(relay: Arc<Relay>) -> Router {
    let cors = cors_layer(relay.gate().extension_scheme().to_string());

    Router::new()
        .fallback(handle_request)
        .with_state(relay)
        .layer(cors)
}

fn cors_layer(scheme: String) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _: &Parts| {
                origin
                    .to_str()
                    .is_ok_and(|origin| origin_allowed(origin, &scheme))
            },
        ))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
}

// ============================================================================
// Handler
// ============================================================================

async fn handle_request(
    State(relay): State<Arc<Relay>>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let (mut parts, body) = request.into_parts();

    if is_upgrade(&parts.headers) {
        return upgrade(relay, &mut parts).await;
    }

    if parts.method == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }

    match serve(&relay, client, parts, body).await {
        Ok(response) => response,
        Err(e) => error_response(&e),
    }
}

async fn serve(
    relay: &Relay,
    client: SocketAddr,
    parts: Parts,
    body: axum::body::Body,
) -> Result<Response> {
    let gate = relay.gate();
    gate.throttle(client.ip())?;

    let path = parts.uri.path();
    let route = find_route(&parts.method, path);

    if route == Some(Route::Status) {
        return Ok(Json(relay.status()).into_response());
    }

    gate.authenticate(header_str(&parts.headers, AUTHORIZATION), parts.uri.query())?;

    let Some(route) = route else {
        debug!(method = %parts.method, path, "No route");
        let body = json!({ "error": "Not found", "availableRoutes": available_routes() });
        return Ok((StatusCode::NOT_FOUND, Json(body)).into_response());
    };

    let body = if parts.method == Method::POST {
        check_content_length(&parts.headers, gate.max_body_bytes())?;
        let bytes = read_limited(body, gate.max_body_bytes()).await?;
        parse_body(&bytes)?
    } else {
        None
    };
    let params = merge_params(parts.uri.query(), body);

    let data = match route {
        Route::Status => relay.status(),
        Route::Wait => local_wait(params.get("time"), relay.config().max_wait).await,
        Route::Peer(action) => {
            debug!(%action, "HTTP call");
            relay.registry().submit(action, Value::Object(params)).await?
        }
    };
    Ok(Json(data).into_response())
}

async fn upgrade(relay: Arc<Relay>, parts: &mut Parts) -> Response {
    let ws = match WebSocketUpgrade::from_request_parts(parts, &relay).await {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let request = UpgradeRequest {
        origin: header_str(&parts.headers, ORIGIN),
        authorization: header_str(&parts.headers, AUTHORIZATION),
        query: parts.uri.query(),
    };

    match admit(Arc::clone(&relay), ws, request) {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Agent upgrade refused");
            error_response(&e)
        }
    }
}

// ============================================================================
// Parameters
// ============================================================================

fn parse_body(bytes: &[u8]) -> Result<Option<Map<String, Value>>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    match from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(_) => Err(Error::bad_request("body must be a JSON object")),
        Err(_) => Err(Error::bad_request("body is not valid JSON")),
    }
}

/// Merges query parameters and body fields, body winning.
///
/// The `token` credential is removed and known numeric fields are converted
/// from text.
fn merge_params(query: Option<&str>, body: Option<Map<String, Value>>) -> Map<String, Value> {
    let mut params = parse_query(query);
    if let Some(body) = body {
        params.extend(body);
    }
    params.remove(TOKEN_PARAM);

    for field in NUMERIC_FIELDS {
        if let Some(value) = params.get_mut(*field)
            && let Some(number) = value.as_str().and_then(parse_number)
        {
            *value = number;
        }
    }
    params
}

fn parse_query(query: Option<&str>) -> Map<String, Value> {
    let mut params = Map::new();
    let Some(query) = query else {
        return params;
    };

    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if let (Some(key), Some(value)) = (decode_component(key), decode_component(value)) {
            params.insert(key, Value::String(value));
        }
    }
    params
}

fn decode_component(raw: &str) -> Option<String> {
    urlencoding::decode(&raw.replace('+', " "))
        .ok()
        .map(|decoded| decoded.into_owned())
}

fn parse_number(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(int) = text.parse::<i64>() {
        return Some(json!(int));
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(|f| json!(f))
}

// ============================================================================
// Helpers
// ============================================================================

fn header_str(headers: &HeaderMap, name: axum::http::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn is_upgrade(headers: &HeaderMap) -> bool {
    let upgrade = header_str(headers, UPGRADE).is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    let connection = header_str(headers, CONNECTION).is_some_and(|v| {
        v.split(',')
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
    });
    upgrade && connection
}

/// Maps an error to its status and `{error, kind}` body.
fn error_response(err: &Error) -> Response {
    let status = match err {
        Error::Unauthenticated => StatusCode::UNAUTHORIZED,
        Error::Forbidden { .. } => StatusCode::FORBIDDEN,
        Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
        Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let mut body = json!({ "error": err.public_message(), "kind": err.kind() });
    match err {
        Error::ActionFailed { message } | Error::BadRequest { message } => {
            body["detail"] = Value::String(message.clone());
        }
        _ => {}
    }

    if status.is_server_error() {
        warn!(kind = err.kind(), error = %err, "Request failed");
    }

    let mut response = (status, Json(body)).into_response();
    if let Error::RateLimited { retry_after_secs } = err
        && let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string())
    {
        response.headers_mut().insert(RETRY_AFTER, value);
    }
    response
}

// ============================================================================
// Tests
// ============================================================================
