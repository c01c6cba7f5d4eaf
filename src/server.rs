use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{debug, info};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::auth::{self, AuthOutcome};
use crate::composio::{ComposioClient, COMPOSIO_API_BASE_URL};
use crate::config::{ConfigStore, CredentialSet, Field};
use crate::errors::{AgentError, AgentResult};

/// Shared state handed to every handler. The store is the only mutable
/// resource; handlers take the lock in a scope and never hold it across
/// an await.
#[derive(Clone)]
pub struct AppState {
    store: Arc<Mutex<ConfigStore>>,
    http: reqwest::Client,
    composio_base_url: String,
}

impl AppState {
    pub fn new(store: ConfigStore) -> Self {
        Self::with_base_url(store, COMPOSIO_API_BASE_URL)
    }

    /// Platform base URL override, used by tests to point at a mock server.
    pub fn with_base_url(store: ConfigStore, base_url: &str) -> Self {
        AppState {
            store: Arc::new(Mutex::new(store)),
            http: reqwest::Client::new(),
            composio_base_url: base_url.to_string(),
        }
    }

    fn store(&self) -> MutexGuard<'_, ConfigStore> {
        self.store.lock().expect("config store lock poisoned")
    }

    fn composio(&self, api_key: &str) -> ComposioClient {
        ComposioClient::with_base_url(api_key, &self.composio_base_url, self.http.clone())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/status", get(status))
        .route("/config", get(get_config).post(update_config))
        .route("/authenticate", post(authenticate))
        .route("/logout", post(logout))
        .route("/query", post(query))
        .route("/send", post(send_email))
        .route("/draft", post(create_draft))
        .route("/emails", get(get_emails))
        .route("/drafts", get(list_drafts))
        .route("/labels", get(list_labels))
        .with_state(state)
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = match &self {
            AgentError::Validation(_) => StatusCode::BAD_REQUEST,
            AgentError::MissingCredentials(_) => StatusCode::PRECONDITION_REQUIRED,
            AgentError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            AgentError::AuthServiceUnavailable
            | AgentError::Upstream(_)
            | AgentError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = json!({ "error": self.to_string() });
        if let AgentError::MissingCredentials(fields) = &self {
            body["missing"] = json!(fields);
        }
        (status, Json(body)).into_response()
    }
}

async fn home() -> Json<Value> {
    Json(json!({
        "name": "Email Agent API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Gmail actions powered by Composio",
        "endpoints": {
            "GET /": "API documentation",
            "GET /status": "Check authentication status",
            "GET /config": "View current configuration (masked)",
            "POST /config": "Update configuration",
            "POST /authenticate": "Initiate Gmail authentication",
            "POST /logout": "Clear authentication",
            "POST /query": "Execute Gmail action with natural language",
            "POST /send": "Send an email",
            "POST /draft": "Create an email draft",
            "GET /emails": "Fetch recent emails",
            "GET /drafts": "List email drafts",
            "GET /labels": "List Gmail labels",
        }
    }))
}

/// Configuration and authentication status, from local state only.
async fn status(State(state): State<AppState>) -> Json<Value> {
    let (resolved, authenticated) = {
        let store = state.store();
        (store.resolve(), store.is_authenticated())
    };
    let missing = resolved.missing();

    Json(json!({
        "configured": missing.is_empty(),
        "authenticated": authenticated,
        "user_id": resolved.user_id(),
        "missing_credentials": missing,
    }))
}

async fn get_config(State(state): State<AppState>) -> Json<Value> {
    let view = state.store().view();
    Json(json!(view))
}

async fn update_config(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> AgentResult<Json<Value>> {
    let map = require_object(body)?;

    let mut partial = CredentialSet::default();
    for field in Field::ALL {
        match map.get(field.key()) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) => partial.set(field, Some(s.clone())),
            Some(_) => {
                return Err(AgentError::Validation(format!(
                    "Field '{}' must be a string",
                    field.key()
                )))
            }
        }
    }

    let mut clears = Vec::new();
    if let Some(value) = map.get("clear") {
        let items = value.as_array().ok_or_else(|| {
            AgentError::Validation("'clear' must be an array of field names".to_string())
        })?;
        for item in items {
            let name = item.as_str().ok_or_else(|| {
                AgentError::Validation("'clear' entries must be field names".to_string())
            })?;
            let field = Field::from_key(name).ok_or_else(|| {
                AgentError::Validation(format!("Unknown credential field '{}'", name))
            })?;
            clears.push(field);
        }
    }

    let resolved = {
        let mut store = state.store();
        for field in clears {
            store.clear(field)?;
        }
        store.update(&partial)?
    };

    info!("Configuration updated");
    Ok(Json(json!({
        "success": true,
        "message": "Configuration updated",
        "configured": resolved.is_complete(),
    })))
}

/// Initiate Gmail authentication through the platform. Returns either the
/// already-authenticated status or a pending OAuth redirect URL; the
/// browser flow is never awaited here.
async fn authenticate(State(state): State<AppState>) -> AgentResult<Json<Value>> {
    let (resolved, known_auth_config) = {
        let store = state.store();
        (store.resolve(), store.auth().auth_config_id.clone())
    };

    let missing = resolved.missing();
    if !missing.is_empty() {
        return Err(AgentError::MissingCredentials(missing));
    }

    let client = state.composio(resolved.get(Field::ComposioApiKey).unwrap_or_default());
    let user_id = resolved.user_id().to_string();

    if let Some(connection_id) = auth::check_active_connection(&client, &user_id).await? {
        state.store().set_connection_id(&connection_id)?;
        info!("User {} already authenticated", user_id);
        return Ok(Json(json!({
            "success": true,
            "status": "authenticated",
            "connection_id": connection_id,
            "message": "Already authenticated",
        })));
    }

    let auth_config_id = auth::ensure_auth_config(
        &client,
        known_auth_config.as_deref(),
        resolved.get(Field::GmailClientId).unwrap_or_default(),
        resolved.get(Field::GmailClientSecret).unwrap_or_default(),
    )
    .await?;
    state.store().set_auth_config_id(&auth_config_id)?;

    match auth::begin_authentication(&client, &user_id, &auth_config_id).await? {
        AuthOutcome::Authenticated { connection_id } => {
            state.store().set_connection_id(&connection_id)?;
            info!("Authentication successful for user {}", user_id);
            Ok(Json(json!({
                "success": true,
                "status": "authenticated",
                "connection_id": connection_id,
                "message": "Authentication successful",
            })))
        }
        AuthOutcome::Pending {
            connection_id,
            auth_url,
        } => Ok(Json(json!({
            "success": true,
            "status": "pending",
            "connection_id": connection_id,
            "auth_url": auth_url,
            "message": "Complete the OAuth flow in your browser, then call POST /authenticate again",
        }))),
    }
}

/// Clears local auth state only; platform tokens are not revoked.
async fn logout(State(state): State<AppState>) -> AgentResult<Json<Value>> {
    state.store().clear_auth()?;
    info!("Authentication cleared");
    Ok(Json(json!({
        "success": true,
        "message": "Authentication cleared",
    })))
}

async fn query(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> AgentResult<Json<Value>> {
    let map = require_object(body)?;
    let instruction = field_str(&map, "query")?
        .ok_or_else(|| AgentError::Validation("Missing 'query' in request body".to_string()))?;

    run_gmail_action(&state, instruction).await
}

async fn send_email(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> AgentResult<Json<Value>> {
    let map = require_object(body)?;
    let (to, subject, text) = require_message_fields(&map)?;

    let mut instruction = format!(
        "Send an email to {} with:\nSubject: {}\nBody: {}",
        to, subject, text
    );
    if let Some(cc) = field_str(&map, "cc")? {
        instruction.push_str(&format!("\nCC: {}", cc));
    }
    if let Some(bcc) = field_str(&map, "bcc")? {
        instruction.push_str(&format!("\nBCC: {}", bcc));
    }

    run_gmail_action(&state, instruction).await
}

async fn create_draft(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> AgentResult<Json<Value>> {
    let map = require_object(body)?;
    let (to, subject, text) = require_message_fields(&map)?;

    let mut instruction = format!(
        "Create an email draft to {} with:\nSubject: {}\nBody: {}",
        to, subject, text
    );
    if let Some(cc) = field_str(&map, "cc")? {
        instruction.push_str(&format!("\nCC: {}", cc));
    }

    run_gmail_action(&state, instruction).await
}

#[derive(Debug, Deserialize)]
struct EmailListParams {
    #[serde(default = "default_max_results")]
    max: u32,
    #[serde(default = "default_label")]
    label: String,
}

#[derive(Debug, Deserialize)]
struct DraftListParams {
    #[serde(default = "default_max_results")]
    max: u32,
}

fn default_max_results() -> u32 {
    10
}

fn default_label() -> String {
    "INBOX".to_string()
}

async fn get_emails(
    State(state): State<AppState>,
    Query(params): Query<EmailListParams>,
) -> AgentResult<Json<Value>> {
    let instruction = format!(
        "Fetch the {} most recent emails from the {} folder. \
         Show me the sender, subject, and a brief preview of each email.",
        params.max, params.label
    );
    run_gmail_action(&state, instruction).await
}

async fn list_drafts(
    State(state): State<AppState>,
    Query(params): Query<DraftListParams>,
) -> AgentResult<Json<Value>> {
    let instruction = format!(
        "List my {} most recent email drafts with their subjects and recipients.",
        params.max
    );
    run_gmail_action(&state, instruction).await
}

async fn list_labels(State(state): State<AppState>) -> AgentResult<Json<Value>> {
    run_gmail_action(&state, "List all my Gmail labels.".to_string()).await
}

/// One pass through the platform for a Gmail action. Checks credentials
/// and local auth status before issuing the single upstream call, so an
/// unauthenticated request never reaches the platform.
async fn run_gmail_action(state: &AppState, instruction: String) -> AgentResult<Json<Value>> {
    let resolved = {
        let store = state.store();
        let resolved = store.resolve();
        let missing = resolved.missing();
        if !missing.is_empty() {
            return Err(AgentError::MissingCredentials(missing));
        }
        if !store.is_authenticated() {
            return Err(AgentError::NotAuthenticated);
        }
        resolved
    };

    debug!("Dispatching Gmail action to the platform");
    let client = state.composio(resolved.get(Field::ComposioApiKey).unwrap_or_default());
    let outcome = client
        .run_agent(
            resolved.user_id(),
            resolved.get(Field::OpenaiApiKey).unwrap_or_default(),
            &instruction,
        )
        .await?;

    Ok(Json(json!({
        "success": true,
        "response": outcome.response,
        "tool_results": outcome.tool_results,
    })))
}

fn require_object(body: Option<Json<Value>>) -> AgentResult<Map<String, Value>> {
    match body {
        Some(Json(Value::Object(map))) => Ok(map),
        _ => Err(AgentError::Validation(
            "Request body must be a JSON object".to_string(),
        )),
    }
}

/// Read an optional string field. Empty-after-trim counts as absent;
/// a non-string value is malformed.
fn field_str(map: &Map<String, Value>, key: &str) -> AgentResult<Option<String>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Some(_) => Err(AgentError::Validation(format!(
            "Field '{}' must be a string",
            key
        ))),
    }
}

fn require_message_fields(map: &Map<String, Value>) -> AgentResult<(String, String, String)> {
    let to = field_str(map, "to")?;
    let subject = field_str(map, "subject")?;
    let text = field_str(map, "body")?;

    let mut missing = Vec::new();
    if to.is_none() {
        missing.push("to");
    }
    if subject.is_none() {
        missing.push("subject");
    }
    if text.is_none() {
        missing.push("body");
    }
    if !missing.is_empty() {
        return Err(AgentError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    Ok((
        to.unwrap_or_default(),
        subject.unwrap_or_default(),
        text.unwrap_or_default(),
    ))
}
