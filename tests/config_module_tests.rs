/// Config Module Tests
///
/// Covers credential resolution precedence, runtime updates, the explicit
/// clear action, secret masking, and persistence of the config files.
///
use email_agent::config::{
    mask_secret, ConfigStore, CredentialSet, EnvSource, Field, CREDENTIALS_FILE,
};
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

/// Build an injected environment source from a fixed set of pairs, so
/// tests never touch process-global environment variables.
fn env_source(pairs: &[(&str, &str)]) -> EnvSource {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Box::new(move |name| map.get(name).cloned())
}

fn open_store(dir: &TempDir, pairs: &[(&str, &str)]) -> ConfigStore {
    ConfigStore::with_env(dir.path(), env_source(pairs)).expect("store should open")
}

#[test]
fn test_resolve_with_no_sources() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, &[]);

    let resolved = store.resolve();
    assert_eq!(resolved.composio_api_key, None);
    assert_eq!(resolved.openai_api_key, None);
    assert_eq!(resolved.gmail_client_id, None);
    assert_eq!(resolved.gmail_client_secret, None);
    // The user id falls back to the default identity
    assert_eq!(resolved.user_id(), "default_user");

    let missing = resolved.missing();
    assert_eq!(
        missing,
        vec![
            "composio_api_key",
            "openai_api_key",
            "gmail_client_id",
            "gmail_client_secret",
        ]
    );
    assert!(!resolved.is_complete());
}

#[test]
fn test_env_value_overrides_file_value() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(CREDENTIALS_FILE),
        r#"{"composio_api_key": "from_the_file"}"#,
    )
    .unwrap();

    let store = open_store(&dir, &[("COMPOSIO_API_KEY", "from_the_env")]);
    let resolved = store.resolve();
    assert_eq!(resolved.composio_api_key.as_deref(), Some("from_the_env"));
}

#[test]
fn test_file_value_used_when_env_absent() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(CREDENTIALS_FILE),
        r#"{"composio_api_key": "from_the_file", "user_id": "alice"}"#,
    )
    .unwrap();

    let store = open_store(&dir, &[]);
    let resolved = store.resolve();
    assert_eq!(resolved.composio_api_key.as_deref(), Some("from_the_file"));
    assert_eq!(resolved.user_id(), "alice");
}

#[test]
fn test_runtime_update_overrides_env() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir, &[("GMAIL_CLIENT_ID", "env_client_id")]);

    let partial = CredentialSet {
        gmail_client_id: Some("X".to_string()),
        ..Default::default()
    };
    store.update(&partial).unwrap();

    // A runtime update is overridden by nothing
    let resolved = store.resolve();
    assert_eq!(resolved.gmail_client_id.as_deref(), Some("X"));
}

#[test]
fn test_empty_string_update_leaves_value_unchanged() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir, &[]);

    let initial = CredentialSet {
        composio_api_key: Some("settled_value".to_string()),
        ..Default::default()
    };
    store.update(&initial).unwrap();

    for empty in ["", "   ", "\t\n"] {
        let partial = CredentialSet {
            composio_api_key: Some(empty.to_string()),
            ..Default::default()
        };
        let resolved = store.update(&partial).unwrap();
        assert_eq!(resolved.composio_api_key.as_deref(), Some("settled_value"));
    }
}

#[test]
fn test_update_trims_whitespace() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir, &[]);

    let partial = CredentialSet {
        openai_api_key: Some("  padded_key  ".to_string()),
        ..Default::default()
    };
    let resolved = store.update(&partial).unwrap();
    assert_eq!(resolved.openai_api_key.as_deref(), Some("padded_key"));
}

#[test]
fn test_update_persists_complete_resolved_set() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = open_store(&dir, &[("OPENAI_API_KEY", "env_openai_key")]);
        let partial = CredentialSet {
            composio_api_key: Some("updated_composio".to_string()),
            ..Default::default()
        };
        store.update(&partial).unwrap();
    }

    // The file now holds the complete resolved set, including the value
    // that came from the environment at update time.
    let reopened = open_store(&dir, &[]);
    let resolved = reopened.resolve();
    assert_eq!(
        resolved.composio_api_key.as_deref(),
        Some("updated_composio")
    );
    assert_eq!(resolved.openai_api_key.as_deref(), Some("env_openai_key"));
}

#[test]
fn test_clear_removes_override_and_file_value() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir, &[]);

    let partial = CredentialSet {
        gmail_client_secret: Some("secret_to_clear".to_string()),
        ..Default::default()
    };
    store.update(&partial).unwrap();
    assert!(store.resolve().gmail_client_secret.is_some());

    store.clear(Field::GmailClientSecret).unwrap();
    assert_eq!(store.resolve().gmail_client_secret, None);
}

#[test]
fn test_clear_does_not_shadow_env() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir, &[("GMAIL_CLIENT_ID", "env_client_id")]);

    let partial = CredentialSet {
        gmail_client_id: Some("override_id".to_string()),
        ..Default::default()
    };
    store.update(&partial).unwrap();
    assert_eq!(store.resolve().gmail_client_id.as_deref(), Some("override_id"));

    // Clearing drops the override; the environment value applies again.
    store.clear(Field::GmailClientId).unwrap();
    assert_eq!(
        store.resolve().gmail_client_id.as_deref(),
        Some("env_client_id")
    );
}

#[test]
fn test_view_masks_secret_fields() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir, &[]);

    let partial = CredentialSet {
        composio_api_key: Some("composio_key_abcd".to_string()),
        openai_api_key: Some("openai_key_wxyz".to_string()),
        gmail_client_id: Some("client_id_1234".to_string()),
        gmail_client_secret: Some("client_secret_5678".to_string()),
        user_id: Some("alice".to_string()),
    };
    store.update(&partial).unwrap();

    let view = store.view();
    assert_eq!(view.composio_api_key.as_deref(), Some("****abcd"));
    assert_eq!(view.openai_api_key.as_deref(), Some("****wxyz"));
    assert_eq!(view.gmail_client_id.as_deref(), Some("****1234"));
    assert_eq!(view.gmail_client_secret.as_deref(), Some("****5678"));
    // The user id is not secret-like and is shown verbatim
    assert_eq!(view.user_id, "alice");
    assert!(view.configured);
}

#[test]
fn test_mask_secret_never_returns_value_verbatim() {
    for value in ["a", "abc", "12345678", "123456789", "a_much_longer_secret"] {
        let masked = mask_secret(value);
        assert_ne!(masked, value);
    }
    // Short values are fully redacted
    assert_eq!(mask_secret("short"), "****");
    assert_eq!(mask_secret("12345678"), "****");
    // Long values keep only their last 4 characters
    assert_eq!(mask_secret("123456789"), "****6789");
}

#[test]
fn test_corrupt_credentials_file_treated_as_empty() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(CREDENTIALS_FILE), "not json at all {{{").unwrap();

    let store = open_store(&dir, &[]);
    let resolved = store.resolve();
    assert_eq!(resolved.composio_api_key, None);
    assert!(!resolved.is_complete());
}

#[test]
fn test_auth_state_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = open_store(&dir, &[]);
        assert!(!store.is_authenticated());
        store.set_connection_id("conn_42").unwrap();
        store.set_auth_config_id("ac_7").unwrap();
        assert!(store.is_authenticated());
    }

    let reopened = open_store(&dir, &[]);
    assert!(reopened.is_authenticated());
    assert_eq!(reopened.auth().connection_id.as_deref(), Some("conn_42"));
    assert_eq!(reopened.auth().auth_config_id.as_deref(), Some("ac_7"));
}

#[test]
fn test_clear_auth_clears_local_state_only() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = open_store(&dir, &[]);
        store.set_connection_id("conn_42").unwrap();
        store.clear_auth().unwrap();
        assert!(!store.is_authenticated());
        assert_eq!(store.auth().connection_id, None);
    }

    // Cleared state is persisted
    let reopened = open_store(&dir, &[]);
    assert!(!reopened.is_authenticated());
}

#[test]
fn test_field_key_lookup() {
    for field in Field::ALL {
        assert_eq!(Field::from_key(field.key()), Some(field));
    }
    assert_eq!(Field::from_key("no_such_field"), None);
}
