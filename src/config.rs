use crate::errors::ConfigError;
use dotenv::dotenv;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default user identity when none has been configured.
pub const DEFAULT_USER_ID: &str = "default_user";

/// File names inside the application directory.
pub const CREDENTIALS_FILE: &str = "credentials.json";
pub const AUTH_STATE_FILE: &str = "auth_state.json";

/// Environment variable that overrides where the config files live.
pub const APP_DIR_ENV_VAR: &str = "EMAIL_AGENT_HOME";

/// The credential fields the agent needs to operate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    ComposioApiKey,
    OpenaiApiKey,
    GmailClientId,
    GmailClientSecret,
    UserId,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::ComposioApiKey,
        Field::OpenaiApiKey,
        Field::GmailClientId,
        Field::GmailClientSecret,
        Field::UserId,
    ];

    /// JSON key for this field in the credentials file and HTTP payloads.
    pub fn key(self) -> &'static str {
        match self {
            Field::ComposioApiKey => "composio_api_key",
            Field::OpenaiApiKey => "openai_api_key",
            Field::GmailClientId => "gmail_client_id",
            Field::GmailClientSecret => "gmail_client_secret",
            Field::UserId => "user_id",
        }
    }

    /// Environment variable backing this field, if any. The user id is
    /// only ever set through the file or a runtime update.
    pub fn env_var(self) -> Option<&'static str> {
        match self {
            Field::ComposioApiKey => Some("COMPOSIO_API_KEY"),
            Field::OpenaiApiKey => Some("OPENAI_API_KEY"),
            Field::GmailClientId => Some("GMAIL_CLIENT_ID"),
            Field::GmailClientSecret => Some("GMAIL_CLIENT_SECRET"),
            Field::UserId => None,
        }
    }

    /// Secret-like fields are masked in `view()` output.
    pub fn is_secret(self) -> bool {
        !matches!(self, Field::UserId)
    }

    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL.iter().copied().find(|f| f.key() == key)
    }
}

/// The bundle of credentials required to operate the Composio platform
/// and Gmail on the user's behalf. Fields are optional until resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composio_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gmail_client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gmail_client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl CredentialSet {
    pub fn get(&self, field: Field) -> Option<&str> {
        let value = match field {
            Field::ComposioApiKey => &self.composio_api_key,
            Field::OpenaiApiKey => &self.openai_api_key,
            Field::GmailClientId => &self.gmail_client_id,
            Field::GmailClientSecret => &self.gmail_client_secret,
            Field::UserId => &self.user_id,
        };
        value.as_deref()
    }

    pub fn set(&mut self, field: Field, value: Option<String>) {
        let slot = match field {
            Field::ComposioApiKey => &mut self.composio_api_key,
            Field::OpenaiApiKey => &mut self.openai_api_key,
            Field::GmailClientId => &mut self.gmail_client_id,
            Field::GmailClientSecret => &mut self.gmail_client_secret,
            Field::UserId => &mut self.user_id,
        };
        *slot = value;
    }

    /// The user id to operate as, falling back to the default identity.
    pub fn user_id(&self) -> &str {
        match self.user_id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => DEFAULT_USER_ID,
        }
    }

    /// Names of required fields that are unresolved or empty. Absence of
    /// any field is a single missing-credentials condition, so callers
    /// report the whole list at once.
    pub fn missing(&self) -> Vec<&'static str> {
        Field::ALL
            .iter()
            .filter(|f| !matches!(**f, Field::UserId))
            .filter(|f| self.get(**f).map_or(true, |v| v.trim().is_empty()))
            .map(|f| f.key())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

/// Locally persisted record of the last-known OAuth exchange with the
/// platform. Not independently verifiable; it only reflects what the
/// platform last reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_config_id: Option<String>,
}

/// Masked view of the resolved credential set for display.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigView {
    pub composio_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub gmail_client_id: Option<String>,
    pub gmail_client_secret: Option<String>,
    pub user_id: String,
    pub connection_id: Option<String>,
    pub configured: bool,
    pub authenticated: bool,
}

/// Mask a secret for display: long values keep their last 4 characters,
/// anything shorter is fully redacted. Never returns the value verbatim.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 8 {
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("****{}", tail)
    } else {
        "****".to_string()
    }
}

/// Source of environment values, injectable so resolution is testable
/// without mutating process-global state.
pub type EnvSource = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// A place a credential value can come from. Runtime updates win over the
/// environment, which wins over the persisted file.
#[derive(Debug, Clone, Copy)]
enum Source {
    Override,
    Env,
    File,
}

const PRECEDENCE: [Source; 3] = [Source::Override, Source::Env, Source::File];

/// Credential store merging runtime updates, environment variables and a
/// persisted JSON file. Single-writer: one process owns the files, and
/// mutations go through scoped acquisition of the enclosing lock.
pub struct ConfigStore {
    credentials_path: PathBuf,
    auth_path: PathBuf,
    overrides: CredentialSet,
    file: CredentialSet,
    auth: AuthState,
    env: EnvSource,
}

impl ConfigStore {
    /// Open the store in `dir`, reading the real process environment.
    /// Also loads a `.env` file if one is present.
    pub fn open(dir: &Path) -> Result<Self, ConfigError> {
        let _ = dotenv();
        Self::with_env(dir, Box::new(|name| env::var(name).ok()))
    }

    /// Open the store with an explicit environment source.
    pub fn with_env(dir: &Path, env: EnvSource) -> Result<Self, ConfigError> {
        fs::create_dir_all(dir)?;
        let credentials_path = dir.join(CREDENTIALS_FILE);
        let auth_path = dir.join(AUTH_STATE_FILE);

        let file = load_json(&credentials_path).unwrap_or_default();
        let auth = load_json(&auth_path).unwrap_or_default();

        debug!(
            "Loaded configuration from {} (auth state: {})",
            credentials_path.display(),
            auth_path.display()
        );

        Ok(ConfigStore {
            credentials_path,
            auth_path,
            overrides: CredentialSet::default(),
            file,
            auth,
            env,
        })
    }

    fn value_from(&self, source: Source, field: Field) -> Option<String> {
        let value = match source {
            Source::Override => self.overrides.get(field).map(str::to_string),
            Source::Env => field.env_var().and_then(|name| (self.env)(name)),
            Source::File => self.file.get(field).map(str::to_string),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    fn lookup(&self, field: Field) -> Option<String> {
        PRECEDENCE
            .iter()
            .find_map(|source| self.value_from(*source, field))
    }

    /// Merge all sources into a resolved credential set.
    pub fn resolve(&self) -> CredentialSet {
        let mut resolved = CredentialSet::default();
        for field in Field::ALL {
            resolved.set(field, self.lookup(field));
        }
        if resolved.user_id.is_none() {
            resolved.set(Field::UserId, Some(DEFAULT_USER_ID.to_string()));
        }
        resolved
    }

    /// Apply the given fields over the current resolved set and persist
    /// the complete result to the credentials file. Values that are empty
    /// after trimming are treated as "not provided" rather than as
    /// overrides; unsetting a field goes through `clear`.
    pub fn update(&mut self, partial: &CredentialSet) -> Result<CredentialSet, ConfigError> {
        for field in Field::ALL {
            if let Some(value) = partial.get(field) {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    debug!("Ignoring empty update for {}", field.key());
                    continue;
                }
                self.overrides.set(field, Some(trimmed.to_string()));
            }
        }

        let resolved = self.resolve();
        self.persist_credentials(&resolved)?;
        self.file = resolved.clone();
        Ok(resolved)
    }

    /// Explicit clear action: drops the runtime override and the persisted
    /// value for a field. Environment values still apply afterwards.
    pub fn clear(&mut self, field: Field) -> Result<(), ConfigError> {
        debug!("Clearing credential field {}", field.key());
        self.overrides.set(field, None);
        self.file.set(field, None);
        let snapshot = self.file.clone();
        self.persist_credentials(&snapshot)
    }

    /// Resolved set with secret fields masked for display.
    pub fn view(&self) -> ConfigView {
        let resolved = self.resolve();
        let masked = |field: Field| -> Option<String> {
            resolved.get(field).map(|v| {
                if field.is_secret() {
                    mask_secret(v)
                } else {
                    v.to_string()
                }
            })
        };

        ConfigView {
            composio_api_key: masked(Field::ComposioApiKey),
            openai_api_key: masked(Field::OpenaiApiKey),
            gmail_client_id: masked(Field::GmailClientId),
            gmail_client_secret: masked(Field::GmailClientSecret),
            user_id: resolved.user_id().to_string(),
            connection_id: self.auth.connection_id.clone(),
            configured: resolved.is_complete(),
            authenticated: self.is_authenticated(),
        }
    }

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    /// Last-known authentication status. Set exclusively by a successful
    /// gateway call, cleared by logout.
    pub fn is_authenticated(&self) -> bool {
        self.auth
            .connection_id
            .as_deref()
            .map_or(false, |id| !id.is_empty())
    }

    pub fn set_connection_id(&mut self, connection_id: &str) -> Result<(), ConfigError> {
        self.auth.connection_id = Some(connection_id.to_string());
        self.persist_auth()
    }

    pub fn set_auth_config_id(&mut self, auth_config_id: &str) -> Result<(), ConfigError> {
        self.auth.auth_config_id = Some(auth_config_id.to_string());
        self.persist_auth()
    }

    /// Clears local auth state only; does not revoke platform tokens.
    pub fn clear_auth(&mut self) -> Result<(), ConfigError> {
        self.auth = AuthState::default();
        self.persist_auth()
    }

    fn persist_credentials(&self, set: &CredentialSet) -> Result<(), ConfigError> {
        write_json_atomic(&self.credentials_path, set)
    }

    fn persist_auth(&self) -> Result<(), ConfigError> {
        write_json_atomic(&self.auth_path, &self.auth)
    }
}

/// Where the config files live: env override, else next to the executable
/// (packaged deployment), else the working directory.
pub fn default_app_dir() -> PathBuf {
    if let Ok(dir) = env::var(APP_DIR_ENV_VAR) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring unparseable config file {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            None
        }
    }
}

/// Atomic replace: write a sibling temp file, then rename over the target.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    debug!("Persisted {}", path.display());
    Ok(())
}
