//! Google OAuth login and per-user access tokens.

use rand::rngs::StdRng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};
use yt_oauth::{OAuthConfig, OAuthError};

use crate::store::{CredentialStore, StoreError, is_valid_user_id};

/// How long a user has to come back from the consent screen
const PENDING_LOGIN_TTL: Duration = Duration::from_secs(600);

const USER_ID_LEN: usize = 13;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Unknown or expired login state")]
    UnknownState,

    #[error(transparent)]
    OAuth(#[from] OAuthError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

struct PendingLogin {
    user_id: String,
    verifier: String,
    started: Instant,
}

#[derive(Debug, Clone)]
pub struct LoginStart {
    pub user_id: String,
    pub auth_url: String,
}

pub struct OAuthGateway {
    config: OAuthConfig,
    http: reqwest::Client,
    store: Arc<dyn CredentialStore>,
    pending: Mutex<HashMap<String, PendingLogin>>,
    rng: Mutex<StdRng>,
}

impl OAuthGateway {
    pub fn new(
        config: OAuthConfig,
        http: reqwest::Client,
        store: Arc<dyn CredentialStore>,
        rng: StdRng,
    ) -> Self {
        Self {
            config,
            http,
            store,
            pending: Mutex::new(HashMap::new()),
            rng: Mutex::new(rng),
        }
    }

    /// Start a login, keeping the caller's id when it already has one
    pub async fn begin_login(&self, existing_user_id: Option<&str>) -> LoginStart {
        let (user_id, request) = {
            let mut rng = self.rng.lock().await;
            let user_id = match existing_user_id {
                Some(id) if is_valid_user_id(id) => id.to_string(),
                _ => yt_oauth::random_token(&mut *rng, USER_ID_LEN),
            };
            (user_id, yt_oauth::generate_auth_url(&self.config, &mut *rng))
        };

        let mut pending = self.pending.lock().await;
        pending.retain(|_, login| login.started.elapsed() < PENDING_LOGIN_TTL);
        pending.insert(
            request.state,
            PendingLogin {
                user_id: user_id.clone(),
                verifier: request.verifier,
                started: Instant::now(),
            },
        );

        info!(%user_id, "Starting OAuth login");

        LoginStart {
            user_id,
            auth_url: request.url,
        }
    }

    /// Finish a login from the OAuth callback and store the user's tokens
    pub async fn complete_login(&self, code: &str, state: &str) -> Result<String, GatewayError> {
        let login = self
            .pending
            .lock()
            .await
            .remove(state)
            .filter(|login| login.started.elapsed() < PENDING_LOGIN_TTL)
            .ok_or(GatewayError::UnknownState)?;

        let token = yt_oauth::exchange_code(&self.http, &self.config, code, &login.verifier).await?;
        self.store.set(&login.user_id, token).await?;

        info!(user_id = %login.user_id, "OAuth login completed");

        Ok(login.user_id)
    }

    pub async fn is_authenticated(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self.store.get(user_id).await?.is_some())
    }

    /// Valid access token for the user, refreshed and written back if expired
    pub async fn access_token(&self, user_id: &str) -> Result<Option<String>, GatewayError> {
        let Some(token) = self.store.get(user_id).await? else {
            return Ok(None);
        };

        if !token.is_expired() {
            return Ok(Some(token.access_token));
        }

        debug!(%user_id, "Access token expired, refreshing");
        let refreshed = yt_oauth::refresh_token(&self.http, &self.config, &token).await?;
        let access_token = refreshed.access_token.clone();
        self.store.set(user_id, refreshed).await?;

        Ok(Some(access_token))
    }

    pub async fn logout(&self, user_id: &str) -> Result<bool, StoreError> {
        let removed = self.store.delete(user_id).await?;
        info!(%user_id, removed, "Logged out");
        Ok(removed)
    }
}
