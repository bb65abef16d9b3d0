use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use yt_oauth::{OAuthConfig, OAuthError};

/// YouTube Comment Replier - fetch a video's comments and reply in bulk
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Address to bind the HTTP server to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// Externally reachable base URL of this server, used for the OAuth redirect URI
    #[arg(long, env = "PUBLIC_URL", default_value = "http://localhost:5000")]
    pub public_url: String,

    /// Frontend to send users back to after login (also the allowed CORS origin)
    #[arg(long, env = "FRONTEND_URL", default_value = "http://localhost:3000")]
    pub frontend_url: String,

    /// Google Cloud OAuth client file (`web` or `installed` layout)
    #[arg(long, env = "CREDENTIALS_PATH", default_value = "credentials.json")]
    pub credentials_path: PathBuf,

    /// OAuth client ID, overrides the credentials file
    #[arg(long, env = "GOOGLE_CLIENT_ID", requires = "client_secret")]
    pub client_id: Option<String>,

    /// OAuth client secret, overrides the credentials file
    #[arg(long, env = "GOOGLE_CLIENT_SECRET", requires = "client_id")]
    pub client_secret: Option<String>,

    /// Directory to keep user tokens in; tokens live in memory when omitted
    #[arg(long, env = "SESSION_DIR")]
    pub session_dir: Option<PathBuf>,

    /// Seed for user ids, OAuth state and preset selection (testing only)
    #[arg(long, env = "RNG_SEED")]
    pub rng_seed: Option<u64>,
}

impl Config {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn redirect_uri(&self) -> String {
        format!(
            "{}/api/auth/callback",
            self.public_url.trim_end_matches('/')
        )
    }

    pub fn oauth_config(&self) -> Result<OAuthConfig, OAuthError> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => Ok(OAuthConfig::new(
                id.clone(),
                secret.clone(),
                self.redirect_uri(),
            )),
            _ => OAuthConfig::from_credentials_file(&self.credentials_path, self.redirect_uri()),
        }
    }

    pub fn rng(&self) -> StdRng {
        match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("yt-comment-replier").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn redirect_uri_follows_public_url() {
        let config = parse(&["--public-url", "https://replier.example.com/"]);
        assert_eq!(
            config.redirect_uri(),
            "https://replier.example.com/api/auth/callback"
        );
    }

    #[test]
    fn explicit_client_overrides_file() {
        let config = parse(&[
            "--client-id",
            "id",
            "--client-secret",
            "secret",
            "--credentials-path",
            "/does/not/exist.json",
        ]);
        let oauth = config.oauth_config().unwrap();
        assert_eq!(oauth.client_id, "id");
        assert_eq!(oauth.redirect_uri, config.redirect_uri());
    }

    #[test]
    fn client_id_requires_secret() {
        let parsed = Config::try_parse_from(["yt-comment-replier", "--client-id", "id"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        use rand::Rng;

        let config = parse(&["--rng-seed", "42"]);
        let a: u64 = config.rng().r#gen();
        let b: u64 = config.rng().r#gen();
        assert_eq!(a, b);
    }
}
