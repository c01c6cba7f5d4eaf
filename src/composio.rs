use crate::errors::ComposioError;
use log::{debug, error};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

// API URL constant
pub const COMPOSIO_API_BASE_URL: &str = "https://backend.composio.dev/api/v1";

/// Name given to the Gmail OAuth config created on the platform.
pub const GMAIL_AUTH_CONFIG_NAME: &str = "email_agent_gmail_auth";

/// Gmail tools the platform is allowed to translate instructions into.
pub const GMAIL_TOOLS: [&str; 13] = [
    "GMAIL_FETCH_EMAILS",
    "GMAIL_SEND_EMAIL",
    "GMAIL_CREATE_EMAIL_DRAFT",
    "GMAIL_LIST_DRAFTS",
    "GMAIL_SEND_DRAFT",
    "GMAIL_DELETE_DRAFT",
    "GMAIL_REPLY_TO_THREAD",
    "GMAIL_GET_THREAD",
    "GMAIL_LIST_THREADS",
    "GMAIL_ADD_LABEL_TO_EMAIL",
    "GMAIL_REMOVE_LABEL_FROM_EMAIL",
    "GMAIL_LIST_LABELS",
    "GMAIL_CREATE_LABEL",
];

pub type Result<T> = std::result::Result<T, ComposioError>;

/// A connected Gmail account on the platform. `ACTIVE` status means the
/// OAuth exchange completed.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectedAccount {
    pub id: String,
    pub status: String,
}

impl ConnectedAccount {
    pub fn is_active(&self) -> bool {
        self.status == "ACTIVE"
    }
}

/// An OAuth auth config registered on the platform.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfigEntry {
    pub id: String,
    #[serde(default)]
    pub toolkit: String,
}

/// Response to initiating a connection: the platform hands back a
/// connection id and a redirect URL for the browser-based OAuth exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionRequest {
    pub id: String,
    #[serde(default)]
    pub redirect_url: Option<String>,
}

/// Result of a natural-language Gmail action run on the platform.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentOutcome {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub tool_results: Value,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// Thin client for the Composio REST surface the agent relies on. The
/// platform performs the actual Gmail API calls and the natural-language
/// to action translation; this client only passes parameters through.
#[derive(Debug, Clone)]
pub struct ComposioClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl ComposioClient {
    pub fn new(api_key: &str, http: Client) -> Self {
        Self::with_base_url(api_key, COMPOSIO_API_BASE_URL, http)
    }

    /// Base URL override, used by tests to point at a mock server.
    pub fn with_base_url(api_key: &str, base_url: &str, http: Client) -> Self {
        ComposioClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// List Gmail-toolkit accounts connected for a user.
    pub async fn list_connected_accounts(&self, user_id: &str) -> Result<Vec<ConnectedAccount>> {
        debug!("Listing connected accounts for user {}", user_id);
        let response: ListResponse<ConnectedAccount> = self
            .get_json(
                "/connected_accounts",
                &[("user_id", user_id), ("toolkit", "GMAIL")],
            )
            .await?;
        Ok(response.items)
    }

    /// List the auth configs registered under this API key.
    pub async fn list_auth_configs(&self) -> Result<Vec<AuthConfigEntry>> {
        debug!("Listing auth configs");
        let response: ListResponse<AuthConfigEntry> =
            self.get_json("/auth_configs", &[]).await?;
        Ok(response.items)
    }

    /// Register a Gmail OAuth2 auth config using the caller's own client
    /// credentials.
    pub async fn create_auth_config(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<AuthConfigEntry> {
        debug!("Creating Gmail auth config");
        let body = json!({
            "toolkit": "GMAIL",
            "name": GMAIL_AUTH_CONFIG_NAME,
            "type": "use_custom_auth",
            "auth_scheme": "OAUTH2",
            "credentials": {
                "client_id": client_id,
                "client_secret": client_secret,
            },
        });
        self.post_json("/auth_configs", &body).await
    }

    /// Begin the OAuth2 exchange for a user. The platform manages the
    /// callback; the returned redirect URL must be completed in a browser.
    pub async fn initiate_connection(
        &self,
        user_id: &str,
        auth_config_id: &str,
    ) -> Result<ConnectionRequest> {
        debug!(
            "Initiating connection for user {} with auth config {}",
            user_id, auth_config_id
        );
        let body = json!({
            "user_id": user_id,
            "auth_config_id": auth_config_id,
        });
        self.post_json("/connected_accounts", &body).await
    }

    /// Run a natural-language Gmail instruction. The platform translates
    /// it into Gmail tool calls using the supplied LLM key and executes
    /// them; one call, no retries.
    pub async fn run_agent(
        &self,
        user_id: &str,
        openai_api_key: &str,
        instruction: &str,
    ) -> Result<AgentOutcome> {
        debug!("Running agent instruction for user {}", user_id);
        let body = json!({
            "user_id": user_id,
            "llm_api_key": openai_api_key,
            "instruction": instruction,
            "tools": GMAIL_TOOLS,
        });
        self.post_json("/agent/execute", &body).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .header("x-api-key", &self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| ComposioError::Network(e.to_string()))?;
        Self::decode(response).await
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ComposioError::Network(e.to_string()))?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ComposioError::Network(e.to_string()))?;

        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            error!("Composio rejected the API key (status {})", status);
            return Err(ComposioError::Unauthorized(text));
        }
        if !status.is_success() {
            error!("Composio API error: status {}, body: {}", status, text);
            return Err(ComposioError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            error!("Failed to decode Composio response: {}", e);
            ComposioError::Decode(e.to_string())
        })
    }
}
