use crate::composio::ComposioClient;
use crate::errors::{AgentError, AgentResult};
use log::{debug, error, info, warn};

/// Outcome of an authentication attempt. The gateway never polls for the
/// OAuth callback; a pending exchange is completed in the browser and
/// confirmed by a later authenticate call.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    Authenticated { connection_id: String },
    Pending { connection_id: String, auth_url: String },
}

/// Any failure to reach the platform is a single error condition; the
/// underlying cause is only logged.
fn unavailable<E: std::fmt::Display>(context: &str, err: E) -> AgentError {
    error!("Authentication gateway failure ({}): {}", context, err);
    AgentError::AuthServiceUnavailable
}

/// Look for an ACTIVE Gmail connection for the user. Returns its id when
/// the platform reports a completed OAuth exchange.
pub async fn check_active_connection(
    client: &ComposioClient,
    user_id: &str,
) -> AgentResult<Option<String>> {
    let accounts = client
        .list_connected_accounts(user_id)
        .await
        .map_err(|e| unavailable("listing connected accounts", e))?;

    for account in accounts {
        if account.is_active() {
            debug!("Found active connection {} for user {}", account.id, user_id);
            return Ok(Some(account.id));
        }
        warn!(
            "Ignoring inactive account {} ({}) for user {}",
            account.id, account.status, user_id
        );
    }
    Ok(None)
}

/// Reuse a known Gmail auth config if the platform still has it, else
/// pick any existing Gmail config, else create one from the caller's
/// OAuth client credentials.
pub async fn ensure_auth_config(
    client: &ComposioClient,
    known_id: Option<&str>,
    gmail_client_id: &str,
    gmail_client_secret: &str,
) -> AgentResult<String> {
    let configs = client
        .list_auth_configs()
        .await
        .map_err(|e| unavailable("listing auth configs", e))?;

    if let Some(known) = known_id {
        if configs.iter().any(|c| c.id == known) {
            debug!("Reusing known auth config {}", known);
            return Ok(known.to_string());
        }
    }

    if let Some(existing) = configs.iter().find(|c| c.toolkit == "GMAIL") {
        debug!("Adopting existing Gmail auth config {}", existing.id);
        return Ok(existing.id.clone());
    }

    info!("Creating a new Gmail auth config on the platform");
    let created = client
        .create_auth_config(gmail_client_id, gmail_client_secret)
        .await
        .map_err(|e| unavailable("creating auth config", e))?;
    Ok(created.id)
}

/// Initiate the OAuth2 exchange. Returns the pending redirect URL; the
/// caller completes it in a browser.
pub async fn begin_authentication(
    client: &ComposioClient,
    user_id: &str,
    auth_config_id: &str,
) -> AgentResult<AuthOutcome> {
    let request = client
        .initiate_connection(user_id, auth_config_id)
        .await
        .map_err(|e| unavailable("initiating connection", e))?;

    match request.redirect_url {
        Some(url) if !url.is_empty() => {
            info!("OAuth exchange pending; redirect URL issued");
            Ok(AuthOutcome::Pending {
                connection_id: request.id,
                auth_url: url,
            })
        }
        // No redirect means the platform considered the exchange done.
        _ => Ok(AuthOutcome::Authenticated {
            connection_id: request.id,
        }),
    }
}
