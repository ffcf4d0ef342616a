// src/transport/http.rs

//! The HTTP front door: request decoding, CORS preflight, the single-shot
//! (long-poll) connection, and JSONP response encoding.

use crate::core::dispatch::RequestPayload;
use crate::core::errors::BayeuxError;
use crate::core::metrics;
use crate::core::protocol::{Connection, Message, SINGLE_SHOT_PRIORITY};
use crate::core::state::ServerState;
use crate::transport::websocket;
use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// The largest request body accepted, in bytes.
const MAX_BODY_BYTES: usize = 1024 * 1024;
/// The longest jsonp callback name accepted.
const MAX_CALLBACK_LEN: usize = 128;

lazy_static! {
    /// A jsonp callback must be a dotted JavaScript identifier path.
    static ref JSONP_CALLBACK: Regex =
        Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$.]*$").expect("static regex must compile");
}

/// The fixed CORS header set answered to preflight requests.
const CORS_HEADERS: [(&str, &str); 5] = [
    ("Access-Control-Allow-Credentials", "false"),
    (
        "Access-Control-Allow-Headers",
        "Accept, Authorization, Content-Type, Pragma, X-Requested-With",
    ),
    ("Access-Control-Allow-Methods", "POST, GET, PUT"),
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Max-Age", "86400"),
];

/// Validates a jsonp callback name. Anything else would allow script
/// injection into the wrapped response.
pub fn is_valid_jsonp_callback(callback: &str) -> bool {
    callback.len() <= MAX_CALLBACK_LEN && JSONP_CALLBACK.is_match(callback)
}

/// One parked response batch, handed from the dispatcher side to the HTTP
/// response writer.
#[derive(Debug)]
pub struct PollResponse {
    pub messages: Vec<Message>,
    /// The callback to wrap the body in, when the poll was jsonp-style.
    pub jsonp: Option<String>,
}

/// The single-shot connection: carries exactly one response batch per HTTP
/// exchange, rendezvous'd through a bounded channel of capacity one.
pub struct LongPollConnection {
    response_tx: mpsc::Sender<PollResponse>,
    /// The callback the request arrived with, applied to responses sent
    /// through the plain `send` path.
    jsonp: Option<String>,
    closed: AtomicBool,
}

impl LongPollConnection {
    pub fn new(response_tx: mpsc::Sender<PollResponse>, jsonp: Option<String>) -> Self {
        Self {
            response_tx,
            jsonp,
            closed: AtomicBool::new(false),
        }
    }

    fn complete(&self, response: PollResponse) -> Result<(), BayeuxError> {
        // The poll is spent after its first write, successful or not.
        self.closed.store(true, Ordering::Relaxed);
        self.response_tx.try_send(response).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BayeuxError::ResponseAlreadyCompleted,
            mpsc::error::TrySendError::Closed(_) => BayeuxError::ConnectionClosed,
        })
    }
}

impl Connection for LongPollConnection {
    fn send(&self, batch: Vec<Message>) -> Result<(), BayeuxError> {
        self.complete(PollResponse {
            messages: batch,
            jsonp: self.jsonp.clone(),
        })
    }

    fn send_jsonp(&self, batch: Vec<Message>, callback: &str) -> Result<(), BayeuxError> {
        self.complete(PollResponse {
            messages: batch,
            jsonp: Some(callback.to_string()),
        })
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Relaxed)
    }

    fn is_single_shot(&self) -> bool {
        true
    }

    fn priority(&self) -> u8 {
        SINGLE_SHOT_PRIORITY
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

/// Builds the router serving the Bayeux endpoint on every path and method.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new().fallback(bayeux_handler).with_state(state)
}

/// The single entry point: upgrades streaming sockets, answers CORS
/// preflight, and runs the single-shot flow for everything else.
async fn bayeux_handler(State(state): State<Arc<ServerState>>, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();

    let wants_upgrade = parts
        .headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));

    if wants_upgrade {
        return match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(upgrade) => {
                metrics::CONNECTIONS_RECEIVED_TOTAL.inc();
                upgrade.on_upgrade(move |socket| websocket::serve(socket, state))
            }
            Err(rejection) => {
                debug!("Not a websocket handshake: {rejection}");
                rejection.into_response()
            }
        };
    }

    let method = parts.method.clone();
    if method == Method::OPTIONS {
        cors_preflight()
    } else if method == Method::POST || method == Method::GET || method == Method::PUT {
        long_poll(state, Request::from_parts(parts, body)).await
    } else {
        (StatusCode::BAD_REQUEST, "Invalid http request").into_response()
    }
}

fn cors_preflight() -> Response {
    let mut response = StatusCode::OK.into_response();
    let headers = response.headers_mut();
    for (name, value) in CORS_HEADERS {
        if let Ok(value) = value.parse() {
            headers.insert(name, value);
        }
    }
    response
}

/// Runs one single-shot exchange: decode, dispatch, then wait for the
/// response batch to be completed by the handler, a publish fan-out, or the
/// poll-timeout flush.
async fn long_poll(state: Arc<ServerState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let mut params: HashMap<String, String> = HashMap::new();
    if let Some(query) = parts.uri.query() {
        params.extend(
            url::form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
    }

    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let is_json = content_type.starts_with("application/json");

    let body_bytes: Bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("While reading request body: {e}");
            return (StatusCode::BAD_REQUEST, "Invalid http request").into_response();
        }
    };

    let payload = if is_json {
        match serde_json::from_slice::<Value>(&body_bytes) {
            Ok(Value::Array(items)) => Some(RequestPayload::Batch(items)),
            Ok(value) => Some(RequestPayload::Single(value)),
            Err(e) => {
                debug!("Couldn't decode request body: {e}");
                None
            }
        }
    } else {
        // Form-encoded: merge body fields over the query string and look
        // for the JSON-encoded `message` field.
        params.extend(
            url::form_urlencoded::parse(&body_bytes)
                .map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
        params.get("message").map(|message| RequestPayload::Form {
            message: message.clone(),
            jsonp: validated_callback(&params),
        })
    };

    let Some(payload) = payload else {
        return (StatusCode::BAD_REQUEST, "Invalid http request").into_response();
    };
    metrics::CONNECTIONS_RECEIVED_TOTAL.inc();

    let (response_tx, mut response_rx) = mpsc::channel(1);
    let conn: Arc<dyn Connection> = Arc::new(LongPollConnection::new(
        response_tx,
        validated_callback(&params),
    ));

    state.dispatcher.dispatch(payload, &conn);
    // Release our handle so a request that produced no response resolves to
    // an empty batch instead of holding the poll forever.
    drop(conn);

    match response_rx.recv().await {
        Some(poll_response) => encode_response(poll_response),
        None => encode_response(PollResponse {
            messages: Vec::new(),
            jsonp: None,
        }),
    }
}

/// Pulls a validated jsonp callback out of the request parameters.
fn validated_callback(params: &HashMap<String, String>) -> Option<String> {
    let callback = params.get("jsonp")?;
    if is_valid_jsonp_callback(callback) {
        Some(callback.clone())
    } else {
        warn!("Ignoring invalid jsonp callback");
        None
    }
}

fn encode_response(poll_response: PollResponse) -> Response {
    let json = match serde_json::to_string(&poll_response.messages) {
        Ok(json) => json,
        Err(e) => {
            warn!("While encoding response msgs: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match poll_response.jsonp {
        Some(callback) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/javascript")],
            format!("/**/{callback}({json})"),
        )
            .into_response(),
        None => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            json,
        )
            .into_response(),
    }
}
