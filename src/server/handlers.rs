//! HTTP request handlers.
//!
//! Every route except `/incoming` acts on behalf of the user named by the
//! `X-Foaf-Agent` header, which the fronting proxy sets after login.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::render;
use super::AppState;
use crate::diary::history::HistoryQuery;
use crate::diary::structured::ChoiceNode;
use crate::diary::{Bot, BotError, Kvs, Payload};

pub const AGENT_HEADER: &str = "x-foaf-agent";

/// Errors a handler can answer with.
#[derive(Debug)]
pub enum ApiError {
    Bot(BotError),
    UnknownBot(String),
    NoAgent,
    Unauthorized,
    BadRequest(String),
}

impl From<BotError> for ApiError {
    fn from(err: BotError) -> Self {
        Self::Bot(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            Self::Bot(err @ BotError::Forbidden { .. }) => (StatusCode::FORBIDDEN, err.to_string()),
            Self::Bot(err @ (BotError::NotFound(_) | BotError::UnknownQuery(_))) => {
                (StatusCode::NOT_FOUND, err.to_string())
            }
            Self::Bot(err @ BotError::InvalidPayload(_)) => (StatusCode::BAD_REQUEST, err.to_string()),
            Self::Bot(err @ BotError::Store(_)) => {
                tracing::error!(error = %err, "store failure");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            Self::UnknownBot(name) => (StatusCode::NOT_FOUND, format!("no bot named {name}")),
            Self::NoAgent => (StatusCode::FORBIDDEN, "not logged in".to_string()),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "bad chat token".to_string()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, msg).into_response()
    }
}

fn agent(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(AGENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::NoAgent)
}

fn lookup(state: &AppState, name: &str) -> Result<Arc<Bot>, ApiError> {
    state
        .registry
        .get(name)
        .cloned()
        .ok_or_else(|| ApiError::UnknownBot(name.to_string()))
}

#[derive(Debug, Serialize)]
pub struct QueryLink {
    pub name: String,
    pub desc: String,
    pub suffix: Option<String>,
}

impl From<&HistoryQuery> for QueryLink {
    fn from(q: &HistoryQuery) -> Self {
        Self {
            name: q.name.clone(),
            desc: q.desc.clone(),
            suffix: q.suffix.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BotSummary {
    pub name: String,
    pub owners: Vec<String>,
    pub structured_input: Vec<ChoiceNode>,
    pub queries: Vec<QueryLink>,
}

/// GET /
pub async fn index(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Vec<BotSummary>>, ApiError> {
    let user = agent(&headers)?;
    let bots = state
        .registry
        .visible_to(user)
        .iter()
        .map(|bot| BotSummary {
            name: bot.name().to_string(),
            owners: bot.owners().iter().cloned().collect(),
            structured_input: bot.structured().choices().to_vec(),
            queries: bot.history_queries().iter().map(QueryLink::from).collect(),
        })
        .collect();
    Ok(Json(bots))
}

#[derive(Debug, Deserialize)]
pub struct MessageForm {
    pub msg: String,
}

/// POST /{bot}/message
pub async fn post_message(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Form(form): Form<MessageForm>,
) -> Result<&'static str, ApiError> {
    let bot = lookup(&state, &name)?;
    bot.save(agent(&headers)?, Payload::text(form.msg)).await?;
    Ok("saved")
}

#[derive(Debug, Deserialize)]
pub struct StructuredForm {
    /// JSON object of string keys to string values.
    pub kv: String,
}

/// POST /{bot}/structuredInput
pub async fn post_structured(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Form(form): Form<StructuredForm>,
) -> Result<&'static str, ApiError> {
    let bot = lookup(&state, &name)?;
    let kvs: Kvs = serde_json::from_str(&form.kv)
        .map_err(|e| ApiError::BadRequest(format!("kv must be a JSON object of strings: {e}")))?;
    bot.save(agent(&headers)?, Payload::Structured(kvs)).await?;
    Ok("saved")
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub rdf: Option<String>,
    #[serde(default, rename = "entriesOnly")]
    pub entries_only: Option<String>,
}

/// GET /{bot}/history
pub async fn history(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HistoryParams>,
) -> Result<Response, ApiError> {
    render_history(&state, &name, None, &headers, &params)
}

/// GET /{bot}/history/{*selection}
pub async fn history_selection(
    State(state): State<AppState>,
    Path((name, selection)): Path<(String, String)>,
    headers: HeaderMap,
    Query(params): Query<HistoryParams>,
) -> Result<Response, ApiError> {
    let suffix = format!("/{}", selection.trim_start_matches('/'));
    render_history(&state, &name, Some(&suffix), &headers, &params)
}

fn render_history(
    state: &AppState,
    name: &str,
    selection: Option<&str>,
    headers: &HeaderMap,
    params: &HistoryParams,
) -> Result<Response, ApiError> {
    let bot = lookup(state, name)?;
    let page = bot.history(agent(headers)?, selection)?;

    if params.rdf.as_deref() == Some("1") {
        let rows: Vec<_> = page.rows.iter().map(|e| render::entry_json(&bot, e)).collect();
        return Ok(Json(rows).into_response());
    }
    if params.entries_only.as_deref() == Some("1") {
        return Ok(Html(render::rows_html(&bot, &state.registry, &page.rows)).into_response());
    }
    Ok(Html(render::history_page(&bot, &state.registry, &page)).into_response())
}

/// GET /{bot}/{entry}
pub async fn get_entry(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let bot = lookup(&state, &name)?;
    let entry = bot.get_entry(agent(&headers)?, &id)?;
    Ok(Json(entry).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct EditForm {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default, rename = "newTime")]
    pub new_time: Option<String>,
}

/// POST /{bot}/{entry}: delete (`method=DELETE`) or retime (`newTime`).
pub async fn edit_entry(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    headers: HeaderMap,
    Form(form): Form<EditForm>,
) -> Result<Response, ApiError> {
    let bot = lookup(&state, &name)?;
    let user = agent(&headers)?;

    if form.method.as_deref() == Some("DELETE") {
        bot.delete(user, &id)?;
        return Ok(Redirect::to("history/recent").into_response());
    }
    if let Some(raw) = form.new_time.as_deref() {
        let new_time = parse_new_time(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("cannot parse newTime {raw:?}")))?;
        let entry = bot.update_time(user, &id, new_time)?;
        return Ok(Json(entry).into_response());
    }
    Err(ApiError::BadRequest("expected method=DELETE or newTime".into()))
}

/// RFC 3339, or a zone-less `YYYY-MM-DDTHH:MM[:SS]` taken as server local time.
fn parse_new_time(raw: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t);
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
        .ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.fixed_offset())
}

#[derive(Debug, Deserialize)]
pub struct IncomingForm {
    pub user: String,
    pub msg: String,
}

/// POST /{bot}/incoming: a chat message delivered by the chat transport.
pub async fn incoming(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Form(form): Form<IncomingForm>,
) -> Result<String, ApiError> {
    let bot = lookup(&state, &name)?;

    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match (bot.chat_token(), presented) {
        (Some(expected), Some(token)) if expected == token => {}
        _ => {
            tracing::warn!(bot = %name, "rejected incoming chat message");
            return Err(ApiError::Unauthorized);
        }
    }

    Ok(bot.handle_chat(&form.user, &form.msg).await)
}
