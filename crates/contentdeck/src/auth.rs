//! Bearer tokens and the OAuth worker handshake.
//!
//! Identity is delegated to an external OAuth worker that hands back an opaque
//! GitHub token. This module only deals with what happens around it: building
//! the worker URL, validating the callback message, and caching the token in
//! shared storage so other clients of the same storage stay signed in.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::storage::{self, SharedStorage, StorageError};

/// Storage key for the cached token.
pub const TOKEN_STORAGE_KEY: &str = "gh_token";

/// Prefix of a successful OAuth worker message.
pub const CALLBACK_SUCCESS_PREFIX: &str = "authorization:github:success:";

/// Tokens shorter than this are rejected as malformed.
const MIN_TOKEN_LEN: usize = 10;

/// Errors from token lookup and the OAuth handshake.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("User not authenticated")]
    NotAuthenticated,

    #[error("OAuth message from untrusted origin: {0}")]
    UntrustedOrigin(String),

    #[error("Invalid OAuth message: {0}")]
    InvalidMessage(String),

    #[error("Invalid OAuth worker URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Token storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Supplies the bearer token attached to each API request.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, AuthError>;
}

/// A fixed token, e.g. from configuration.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String, AuthError> {
        if self.0.is_empty() {
            return Err(AuthError::NotAuthenticated);
        }
        Ok(self.0.clone())
    }
}

/// A token cached in shared storage.
///
/// Read on every request, so a logout elsewhere takes effect on the next call.
#[derive(Clone)]
pub struct StoredToken {
    storage: Arc<dyn SharedStorage>,
}

impl StoredToken {
    pub fn new(storage: Arc<dyn SharedStorage>) -> Self {
        Self { storage }
    }

    pub fn save(&self, token: &str) -> Result<(), AuthError> {
        storage::write_json(self.storage.as_ref(), TOKEN_STORAGE_KEY, &token)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), AuthError> {
        self.storage.remove(TOKEN_STORAGE_KEY)?;
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.load(), Ok(Some(_)))
    }

    fn load(&self) -> Result<Option<String>, AuthError> {
        let token: Option<String> = storage::read_json(self.storage.as_ref(), TOKEN_STORAGE_KEY)?;
        Ok(token.filter(|t| !t.is_empty()))
    }
}

#[async_trait]
impl TokenProvider for StoredToken {
    async fn token(&self) -> Result<String, AuthError> {
        self.load()?.ok_or(AuthError::NotAuthenticated)
    }
}

/// Build the OAuth worker URL a user is sent to for login.
///
/// ```
/// use contentdeck::auth::login_url;
///
/// let url = login_url("https://auth.example.workers.dev", "https://site.example", "repo", None)
///     .unwrap();
/// assert_eq!(
///     url.as_str(),
///     "https://auth.example.workers.dev/auth?origin=https%3A%2F%2Fsite.example&scope=repo"
/// );
/// ```
pub fn login_url(
    worker_base: &str,
    origin: &str,
    scope: &str,
    client_id: Option<&str>,
) -> Result<Url, AuthError> {
    let mut url = Url::parse(&format!("{}/auth", worker_base.trim_end_matches('/')))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("origin", origin);
        query.append_pair("scope", scope);
        if let Some(id) = client_id {
            query.append_pair("client_id", id);
        }
    }
    Ok(url)
}

/// Validate an OAuth worker callback message and extract the token.
///
/// The sender must match the worker origin and the payload must carry the
/// success prefix followed by a plausible token.
pub fn parse_callback_message(
    sender_origin: &str,
    worker_origin: &str,
    data: &str,
) -> Result<String, AuthError> {
    if !sender_origin.starts_with(worker_origin.trim_end_matches('/')) {
        return Err(AuthError::UntrustedOrigin(sender_origin.to_string()));
    }

    let token = data
        .strip_prefix(CALLBACK_SUCCESS_PREFIX)
        .ok_or_else(|| AuthError::InvalidMessage("missing success prefix".to_string()))?
        .trim();

    if token.len() < MIN_TOKEN_LEN {
        return Err(AuthError::InvalidMessage("token too short".to_string()));
    }

    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    const WORKER: &str = "https://auth.example.workers.dev";

    #[tokio::test]
    async fn static_token_rejects_empty_value() {
        assert_eq!(StaticToken::new("ghp_abc").token().await.unwrap(), "ghp_abc");
        assert!(matches!(
            StaticToken::new("").token().await,
            Err(AuthError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn stored_token_round_trips_through_shared_storage() {
        let storage = MemoryStorage::new();
        let tokens = StoredToken::new(Arc::new(storage.clone()));
        assert!(!tokens.is_authenticated());
        assert!(matches!(
            tokens.token().await,
            Err(AuthError::NotAuthenticated)
        ));

        tokens.save("gho_1234567890").expect("save");
        assert_eq!(
            storage.get(TOKEN_STORAGE_KEY).unwrap().as_deref(),
            Some("\"gho_1234567890\"")
        );
        assert_eq!(tokens.token().await.unwrap(), "gho_1234567890");

        tokens.clear().expect("clear");
        assert!(!tokens.is_authenticated());
    }

    #[test]
    fn login_url_includes_client_id_when_given() {
        let url = login_url(&format!("{WORKER}/"), "http://localhost:1313", "repo", Some("abc"))
            .expect("url");
        assert_eq!(url.path(), "/auth");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("origin".to_string(), "http://localhost:1313".to_string()),
                ("scope".to_string(), "repo".to_string()),
                ("client_id".to_string(), "abc".to_string()),
            ]
        );
    }

    #[test]
    fn callback_message_requires_trusted_origin_and_prefix() {
        let token = parse_callback_message(
            WORKER,
            WORKER,
            "authorization:github:success:gho_abcdefghij",
        )
        .expect("valid message");
        assert_eq!(token, "gho_abcdefghij");

        assert!(matches!(
            parse_callback_message(
                "https://evil.example",
                WORKER,
                "authorization:github:success:gho_abcdefghij"
            ),
            Err(AuthError::UntrustedOrigin(_))
        ));
        assert!(matches!(
            parse_callback_message(WORKER, WORKER, "authorization:github:error:denied"),
            Err(AuthError::InvalidMessage(_))
        ));
        assert!(matches!(
            parse_callback_message(WORKER, WORKER, "authorization:github:success:short"),
            Err(AuthError::InvalidMessage(_))
        ));
    }
}
