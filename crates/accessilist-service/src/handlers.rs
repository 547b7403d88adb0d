use std::net::SocketAddr;

use accessilist_core::checklist::is_known_type;
use accessilist_core::csrf::{CsrfGuard, CSRF_HEADER, SESSION_COOKIE};
use accessilist_core::rate_limit::RateAction;
use accessilist_core::report::build_report;
use accessilist_core::session_key::{generate_session_key, validate_session_key};
use accessilist_core::state::StateDocument;
use accessilist_core::store::{now_ms, SessionWrite, StoreError};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::error::{ApiError, Envelope};
use crate::AppState;

type ApiResult = Result<Json<Envelope>, ApiError>;

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::BadRequest(format!("Invalid request body: {}", err.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(err: QueryRejection) -> Self {
        ApiError::BadRequest(format!("Invalid query: {}", err.body_text()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstantiateRequest {
    pub session_key: String,
    pub type_slug: String,
}

/// Only these fields are persisted; legacy extras in the body are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub session_key: String,
    pub type_slug: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub state: StateDocument,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreQuery {
    pub session_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub session: Option<String>,
}

async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ApiError::Internal(format!("worker failed: {}", err)))?
}

/// `x-forwarded-for` is only honoured behind a trusted proxy; otherwise the
/// socket peer address identifies the client.
fn client_ip(
    trust_proxy: bool,
    headers: &HeaderMap,
    connect: Option<&ConnectInfo<SocketAddr>>,
) -> String {
    trust_proxy
        .then(|| forwarded_for(headers))
        .flatten()
        .or_else(|| connect.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get("x-forwarded-for")?.to_str().ok()?;
    let first = raw.split(',').next()?.trim();
    if first.is_empty() || first.len() > 64 {
        return None;
    }
    if first
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b':' || b == b'-')
    {
        Some(first.to_string())
    } else {
        None
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

fn require_csrf(csrf: &CsrfGuard, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(session_id) = session_cookie(headers) else {
        warn!("csrf session cookie missing");
        return Err(ApiError::Forbidden("Missing CSRF session".to_string()));
    };
    let token = headers
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !csrf.verify(&session_id, token) {
        warn!("csrf token rejected");
        return Err(ApiError::Forbidden("Invalid CSRF token".to_string()));
    }
    Ok(())
}

fn check_rate(state: &AppState, action: RateAction, client: &str) -> Result<(), ApiError> {
    state
        .limiter
        .check(action, client, now_ms())
        .map(|_| ())
        .map_err(|err| {
            warn!(action = action.as_str(), client, error = %err, "rate limited");
            ApiError::from(err)
        })
}

fn require_key(key: &str) -> Result<(), ApiError> {
    if validate_session_key(key) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("Invalid session key: {}", key)))
    }
}

fn require_metadata(metadata: Option<&Map<String, Value>>) -> Result<(), ApiError> {
    let Some(metadata) = metadata else {
        return Ok(());
    };
    let valid = |name: &str, value: &Value| match name {
        "created" => value.as_i64().is_some(),
        "lastModified" => value.is_null() || value.as_i64().is_some(),
        "version" => value.is_string(),
        _ => true,
    };
    match metadata.iter().find(|(name, value)| !valid(name.as_str(), *value)) {
        Some((name, _)) => Err(ApiError::BadRequest(format!(
            "Invalid metadata field: {}",
            name
        ))),
        None => Ok(()),
    }
}

fn require_type(type_slug: &str) -> Result<(), ApiError> {
    if is_known_type(type_slug) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "Unknown checklist type: {}",
            type_slug
        )))
    }
}

pub async fn generate_key(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> ApiResult {
    let client = client_ip(state.trust_proxy, &headers, connect.as_ref());
    let key = blocking(move || {
        check_rate(&state, RateAction::GenerateKey, &client)?;
        generate_session_key(&state.store).map_err(|err| ApiError::Internal(err.to_string()))
    })
    .await?;
    info!(session_key = %key, "generated session key");
    Ok(Json(Envelope::ok(Some(json!({ "sessionKey": key })), None)))
}

pub async fn instantiate(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<InstantiateRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    require_key(&request.session_key)?;
    require_type(&request.type_slug)?;
    require_csrf(&state.csrf, &headers)?;
    let client = client_ip(state.trust_proxy, &headers, connect.as_ref());
    let key = request.session_key.clone();
    let type_slug = request.type_slug.clone();
    let created = blocking(move || {
        check_rate(&state, RateAction::Instantiate, &client)?;
        match state.store.create(&request.session_key, &request.type_slug) {
            Ok(_) => Ok(true),
            Err(StoreError::AlreadyExists(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    })
    .await?;
    info!(session_key = %key, type_slug = %type_slug, created, "instantiate");
    let message = if created {
        "Session created"
    } else {
        "Session already exists"
    };
    Ok(Json(Envelope::ok(
        Some(json!({ "sessionKey": key, "typeSlug": type_slug, "created": created })),
        Some(message),
    )))
}

pub async fn save(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<SaveRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    require_key(&request.session_key)?;
    require_type(&request.type_slug)?;
    require_metadata(request.metadata.as_ref())?;
    if let Some(duplicate) = request.state.duplicate_manual_row() {
        return Err(ApiError::BadRequest(format!(
            "Duplicate manual row id: {}",
            duplicate
        )));
    }
    require_csrf(&state.csrf, &headers)?;
    let client = client_ip(state.trust_proxy, &headers, connect.as_ref());
    let key = request.session_key.clone();
    let client_timestamp = request.timestamp;
    blocking(move || {
        check_rate(&state, RateAction::Save, &client)?;
        state.store.write(
            &request.session_key,
            &SessionWrite {
                type_slug: request.type_slug,
                metadata: request.metadata,
                state: request.state,
            },
        )?;
        Ok(())
    })
    .await?;
    info!(session_key = %key, client_timestamp = ?client_timestamp, "saved session");
    Ok(Json(Envelope::ok(None, Some("Saved"))))
}

pub async fn restore(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    query: Result<Query<RestoreQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let key = query
        .session_key
        .ok_or_else(|| ApiError::BadRequest("Missing sessionKey".to_string()))?;
    require_key(&key)?;
    let client = client_ip(state.trust_proxy, &headers, connect.as_ref());
    let lookup = key.clone();
    let document = blocking(move || {
        check_rate(&state, RateAction::Restore, &client)?;
        Ok(state.store.read(&lookup)?)
    })
    .await?;
    info!(session_key = %key, "restored session");
    let data = serde_json::to_value(&document).map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(Json(Envelope::ok(Some(data), None)))
}

pub async fn delete(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    query: Result<Query<DeleteQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let key = query
        .session
        .ok_or_else(|| ApiError::BadRequest("Missing session".to_string()))?;
    require_key(&key)?;
    require_csrf(&state.csrf, &headers)?;
    let client = client_ip(state.trust_proxy, &headers, connect.as_ref());
    let target = key.clone();
    blocking(move || {
        check_rate(&state, RateAction::Delete, &client)?;
        Ok(state.store.delete(&target)?)
    })
    .await?;
    info!(session_key = %key, "deleted session");
    Ok(Json(Envelope::ok(
        Some(json!({ "sessionKey": key })),
        Some("Session deleted"),
    )))
}

pub async fn list(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> ApiResult {
    let client = client_ip(state.trust_proxy, &headers, connect.as_ref());
    let sessions = blocking(move || {
        check_rate(&state, RateAction::List, &client)?;
        Ok(state.store.list()?)
    })
    .await?;
    let data = serde_json::to_value(&sessions).map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(Json(Envelope::ok(Some(data), None)))
}

pub async fn list_detailed(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> ApiResult {
    let client = client_ip(state.trust_proxy, &headers, connect.as_ref());
    let sessions = blocking(move || {
        check_rate(&state, RateAction::List, &client)?;
        Ok(state.store.list_detailed()?)
    })
    .await?;
    let data = serde_json::to_value(&sessions).map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(Json(Envelope::ok(Some(data), None)))
}

pub async fn report(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> ApiResult {
    let client = client_ip(state.trust_proxy, &headers, connect.as_ref());
    let details = blocking(move || {
        check_rate(&state, RateAction::List, &client)?;
        Ok(state.store.list_detailed()?)
    })
    .await?;
    let report = build_report(&details);
    let data = serde_json::to_value(&report).map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(Json(Envelope::ok(Some(data), None)))
}

/// Hands out the CSRF token for the caller's browser session, minting the
/// session cookie on first contact.
pub async fn csrf_token(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let existing = session_cookie(&headers);
    let session_id = existing.clone().unwrap_or_else(CsrfGuard::new_session_id);
    let token = state.csrf.token_for(&session_id);
    let mut resp = Json(Envelope::ok(Some(json!({ "token": token })), None)).into_response();
    if existing.is_none() {
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Strict",
            SESSION_COOKIE, session_id
        );
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                resp.headers_mut().insert(header::SET_COOKIE, value);
            }
            Err(err) => return ApiError::Internal(err.to_string()).into_response(),
        }
    }
    resp
}

pub async fn health() -> Json<Envelope> {
    Json(Envelope::ok(
        Some(json!({ "version": accessilist_core::version() })),
        None,
    ))
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound("No such endpoint".to_string())
}
