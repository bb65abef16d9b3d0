use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Scope required to read comment threads and post replies
pub const YOUTUBE_SCOPE: &str = "https://www.googleapis.com/auth/youtube.force-ssl";

/// Google authorization endpoint
pub const GOOGLE_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google token endpoint (code exchange and refresh)
pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Tokens expiring within this many seconds are treated as expired
const EXPIRY_SKEW_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{context} (status {status}): {body}")]
    TokenEndpoint {
        context: &'static str,
        status: u16,
        body: String,
    },

    #[error("Missing {0} in token response")]
    MissingField(&'static str),

    #[error("Failed to access '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize token: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Credentials file has neither a 'web' nor an 'installed' client section")]
    MissingClientSection,
}

/// Current time as Unix seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Tokens granted for one Google account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    /// Bearer token sent with Data API calls
    pub access_token: String,
    /// Long-lived token used to mint new access tokens
    pub refresh_token: String,
    /// Normally "Bearer"
    pub token_type: String,
    /// Unix seconds after which `access_token` stops working
    pub expires_at: u64,
    /// Space separated scopes granted by the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl OAuthToken {
    /// Expired, or expiring within the next minute
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_now())
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        now + EXPIRY_SKEW_SECS >= self.expires_at
    }

    /// Load token from file
    pub fn load_from_file(path: &Path) -> Result<Self, OAuthError> {
        let content = std::fs::read_to_string(path).map_err(|source| OAuthError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| OAuthError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the token as JSON, readable by the owner only on Unix
    pub fn save_to_file(&self, path: &Path) -> Result<(), OAuthError> {
        let content = serde_json::to_string_pretty(self)?;
        let io_err = |source| OAuthError::Io {
            path: path.to_path_buf(),
            source,
        };

        std::fs::write(path, content).map_err(io_err)?;

        // Owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(path, permissions).map_err(io_err)?;
        }

        Ok(())
    }
}

/// A registered OAuth client and the endpoints it talks to
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Where Google sends the user back with `code` and `state`
    pub redirect_uri: String,
    /// OAuth scope(s)
    pub scope: String,
    pub auth_endpoint: String,
    pub token_endpoint: String,
}

#[derive(Deserialize)]
struct CredentialsFile {
    web: Option<ClientSecrets>,
    installed: Option<ClientSecrets>,
}

#[derive(Deserialize)]
struct ClientSecrets {
    client_id: String,
    client_secret: String,
}

impl OAuthConfig {
    /// Client for the YouTube scope against Google's endpoints
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
            scope: YOUTUBE_SCOPE.to_string(),
            auth_endpoint: GOOGLE_AUTH_ENDPOINT.to_string(),
            token_endpoint: GOOGLE_TOKEN_ENDPOINT.to_string(),
        }
    }

    /// Read client id and secret from a Google Cloud `credentials.json`
    ///
    /// Both the `web` and the `installed` application layouts are accepted,
    /// `web` taking precedence when a file carries both.
    pub fn from_credentials_file(path: &Path, redirect_uri: String) -> Result<Self, OAuthError> {
        let content = std::fs::read_to_string(path).map_err(|source| OAuthError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: CredentialsFile =
            serde_json::from_str(&content).map_err(|source| OAuthError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let secrets = file
            .web
            .or(file.installed)
            .ok_or(OAuthError::MissingClientSection)?;

        Ok(Self::new(
            secrets.client_id,
            secrets.client_secret,
            redirect_uri,
        ))
    }
}

/// Random alphanumeric string of the given length
pub fn random_token<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    use rand::distributions::Alphanumeric;

    (0..len).map(|_| char::from(rng.sample(Alphanumeric))).collect()
}

/// PKCE `(verifier, S256 challenge)` pair
pub fn generate_pkce<R: Rng + ?Sized>(rng: &mut R) -> (String, String) {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use sha2::{Digest, Sha256};

    // 43-128 characters allowed
    let verifier = random_token(rng, 64);

    // base64url(SHA256(verifier))
    let hash = Sha256::digest(verifier.as_bytes());
    let challenge = URL_SAFE_NO_PAD.encode(hash);

    (verifier, challenge)
}

/// Everything needed to send a user to the consent screen and finish the
/// exchange once they come back.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub verifier: String,
}

/// Consent URL plus the state and verifier to remember until the callback
pub fn generate_auth_url<R: Rng + ?Sized>(config: &OAuthConfig, rng: &mut R) -> AuthorizationRequest {
    let (verifier, challenge) = generate_pkce(rng);
    let state = random_token(rng, 32);

    let url = format!(
        "{}?\
        client_id={}&\
        redirect_uri={}&\
        response_type=code&\
        scope={}&\
        state={}&\
        code_challenge={}&\
        code_challenge_method=S256&\
        access_type=offline&\
        prompt=consent",
        config.auth_endpoint,
        urlencoding::encode(&config.client_id),
        urlencoding::encode(&config.redirect_uri),
        urlencoding::encode(&config.scope),
        urlencoding::encode(&state),
        urlencoding::encode(&challenge),
    );

    AuthorizationRequest {
        url,
        state,
        verifier,
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<u64>,
    scope: Option<String>,
}

async fn request_token(
    http: &reqwest::Client,
    config: &OAuthConfig,
    params: &[(&str, &str)],
    context: &'static str,
) -> Result<TokenResponse, OAuthError> {
    let response = http
        .post(&config.token_endpoint)
        .form(params)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await?;
        return Err(OAuthError::TokenEndpoint {
            context,
            status,
            body,
        });
    }

    Ok(response.json().await?)
}

/// Trade the callback `code` for tokens
pub async fn exchange_code(
    http: &reqwest::Client,
    config: &OAuthConfig,
    code: &str,
    verifier: &str,
) -> Result<OAuthToken, OAuthError> {
    tracing::debug!("Exchanging authorization code for tokens");

    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("code", code),
        ("code_verifier", verifier),
        ("grant_type", "authorization_code"),
        ("redirect_uri", config.redirect_uri.as_str()),
    ];
    let response = request_token(
        http,
        config,
        &params,
        "Failed to exchange authorization code",
    )
    .await?;

    let token = OAuthToken {
        access_token: response
            .access_token
            .ok_or(OAuthError::MissingField("access_token"))?,
        refresh_token: response
            .refresh_token
            .ok_or(OAuthError::MissingField("refresh_token"))?,
        token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
        expires_at: unix_now()
            + response
                .expires_in
                .ok_or(OAuthError::MissingField("expires_in"))?,
        scope: response.scope,
    };

    tracing::debug!("Successfully obtained OAuth tokens");

    Ok(token)
}

/// Mint a new access token from `current.refresh_token`
///
/// Google normally does not rotate refresh tokens, so the current one is kept
/// unless the response carries a replacement.
pub async fn refresh_token(
    http: &reqwest::Client,
    config: &OAuthConfig,
    current: &OAuthToken,
) -> Result<OAuthToken, OAuthError> {
    tracing::debug!("Refreshing OAuth token");

    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("refresh_token", current.refresh_token.as_str()),
        ("grant_type", "refresh_token"),
    ];
    let response = request_token(http, config, &params, "Failed to refresh OAuth token").await?;

    Ok(OAuthToken {
        access_token: response
            .access_token
            .ok_or(OAuthError::MissingField("access_token"))?,
        refresh_token: response
            .refresh_token
            .unwrap_or_else(|| current.refresh_token.clone()),
        token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
        expires_at: unix_now()
            + response
                .expires_in
                .ok_or(OAuthError::MissingField("expires_in"))?,
        scope: response.scope.or_else(|| current.scope.clone()),
    })
}
