/// Email Agent
///
/// This crate provides a small local HTTP server exposing Gmail actions
/// (send, draft, fetch, labels, natural-language query) by delegating to
/// the Composio automation platform. Composio performs the actual Gmail
/// API calls, the OAuth2 exchange and the natural-language-to-action
/// translation; this server resolves credentials, validates requests and
/// relays results.
///
/// # Features
///
/// - Credential resolution from runtime updates, environment variables
///   and a persisted JSON file, in that precedence order
/// - Delegated Gmail OAuth2 authentication with local status tracking
/// - REST endpoints for sending, drafting, fetching and labeling email
///
pub mod auth;
pub mod composio;
pub mod config;
pub mod errors;
pub mod logging;
pub mod server;

pub use crate::config::{ConfigStore, CredentialSet};
pub use crate::logging::setup_logging;
pub use crate::server::{router, AppState};
