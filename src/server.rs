//! HTTP surface: routes, request/response shapes and shutdown handling.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, header};
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use yt_data_client::YouTubeApi;

use crate::aggregator::{self, CommentRecord, FetchOutcome};
use crate::dispatcher::{self, DispatchResult};
use crate::error::AppError;
use crate::gateway::{GatewayError, OAuthGateway};
use crate::quota::{self, QuotaEstimate};

/// Header carrying the caller's opaque user id
pub const USER_ID_HEADER: &str = "x-user-id";

/// Fewest non-empty presets a reply batch may use
pub const MIN_REPLY_PRESETS: usize = 2;

pub struct AppState {
    pub api: Arc<dyn YouTubeApi>,
    pub gateway: OAuthGateway,
    pub frontend_url: String,
    rng: Mutex<StdRng>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        api: Arc<dyn YouTubeApi>,
        gateway: OAuthGateway,
        frontend_url: String,
        rng: StdRng,
    ) -> Self {
        Self {
            api,
            gateway,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            rng: Mutex::new(rng),
        }
    }

    /// Independent generator for one reply batch, derived from the shared one
    async fn batch_rng(&self) -> StdRng {
        StdRng::from_seed(self.rng.lock().await.r#gen())
    }
}

pub fn router(state: SharedState) -> Router {
    let cors = match HeaderValue::from_str(&state.frontend_url) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(USER_ID_HEADER)]),
        Err(_) => {
            warn!(frontend_url = %state.frontend_url, "Frontend URL is not a valid origin, CORS disabled");
            CorsLayer::new()
        }
    };

    Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/status", get(auth_status))
        .route("/api/auth/login", get(login))
        .route("/api/auth/callback", get(callback))
        .route("/api/auth/logout", post(logout))
        .route("/api/comments/fetch", post(fetch_comments))
        .route("/api/comments/reply", post(reply_to_comments))
        .route("/api/quota/estimate", post(estimate_quota))
        .layer(cors)
        .with_state(state)
}

/// Serve until SIGINT (or SIGTERM on Unix)
pub async fn serve(listener: TcpListener, state: SharedState) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, shutting down..."),
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGINT");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, shutting down...");
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn caller_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(USER_ID_HEADER)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

/// Access token for the caller, or the 401 to answer with
async fn require_access_token(state: &AppState, headers: &HeaderMap) -> Result<String, AppError> {
    let user_id = caller_id(headers).ok_or(AppError::NotAuthenticated)?;

    match state.gateway.access_token(user_id).await {
        Ok(Some(token)) => Ok(token),
        Ok(None) => Err(AppError::InvalidCredentials),
        Err(GatewayError::Store(e)) => Err(e.into()),
        Err(e) => {
            warn!(%user_id, error = %e, "Could not obtain access token");
            Err(AppError::InvalidCredentials)
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct AuthStatus {
    authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
}

async fn auth_status(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<AuthStatus>, AppError> {
    let user_id = caller_id(&headers);
    let authenticated = match user_id {
        Some(id) => state.gateway.is_authenticated(id).await?,
        None => false,
    };

    Ok(Json(AuthStatus {
        authenticated,
        user_id: user_id.filter(|_| authenticated).map(str::to_string),
    }))
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    auth_url: String,
    user_id: String,
}

async fn login(State(state): State<SharedState>, headers: HeaderMap) -> Json<LoginResponse> {
    let start = state.gateway.begin_login(caller_id(&headers)).await;
    Json(LoginResponse {
        auth_url: start.auth_url,
        user_id: start.user_id,
    })
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn callback(
    State(state): State<SharedState>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    let outcome = match (params.error, params.code, params.state) {
        (Some(error), _, _) => Err(error),
        (None, Some(code), Some(login_state)) => state
            .gateway
            .complete_login(&code, &login_state)
            .await
            .map_err(|e| e.to_string()),
        _ => Err("Missing authorization code".to_string()),
    };

    let target = match outcome {
        Ok(user_id) => format!(
            "{}?login=success&user={}",
            state.frontend_url,
            urlencoding::encode(&user_id)
        ),
        Err(message) => {
            warn!(%message, "OAuth callback failed");
            format!(
                "{}?login=error&message={}",
                state.frontend_url,
                urlencoding::encode(&message)
            )
        }
    };

    Redirect::to(&target)
}

#[derive(Debug, Serialize)]
struct SuccessResponse {
    success: bool,
}

async fn logout(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, AppError> {
    if let Some(user_id) = caller_id(&headers) {
        state.gateway.logout(user_id).await?;
    }
    Ok(Json(SuccessResponse { success: true }))
}

#[derive(Debug, Deserialize)]
struct FetchRequest {
    video_id: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct FetchResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    comments: Option<Vec<CommentRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fetched_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    already_replied: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quota_exceeded: Option<bool>,
}

impl From<FetchOutcome> for FetchResponse {
    fn from(outcome: FetchOutcome) -> Self {
        match outcome {
            FetchOutcome::Fetched(batch) => FetchResponse {
                success: true,
                comments: Some(batch.comments),
                total_count: Some(batch.total_count),
                fetched_count: Some(batch.fetched_count),
                already_replied: Some(batch.already_replied_count),
                ..Default::default()
            },
            FetchOutcome::NotFound => FetchResponse {
                error: Some("Video not found".to_string()),
                ..Default::default()
            },
            FetchOutcome::QuotaExceeded => FetchResponse {
                error: Some(dispatcher::QUOTA_EXCEEDED_MESSAGE.to_string()),
                quota_exceeded: Some(true),
                ..Default::default()
            },
            FetchOutcome::Failed(message) => FetchResponse {
                error: Some(message),
                ..Default::default()
            },
        }
    }
}

async fn fetch_comments(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Result<Json<FetchRequest>, JsonRejection>,
) -> Result<Json<FetchResponse>, AppError> {
    let access_token = require_access_token(&state, &headers).await?;
    let Json(request) = body?;
    let video_id = request
        .video_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Validation("video_id required".to_string()))?;

    let outcome = aggregator::aggregate(state.api.as_ref(), &access_token, &video_id).await;
    Ok(Json(outcome.into()))
}

#[derive(Debug, Deserialize)]
struct ReplyRequest {
    comments: Option<Vec<CommentRecord>>,
    reply_presets: Option<Vec<String>>,
}

async fn reply_to_comments(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Result<Json<ReplyRequest>, JsonRejection>,
) -> Result<Json<DispatchResult>, AppError> {
    let access_token = require_access_token(&state, &headers).await?;
    let Json(request) = body?;
    let (Some(comments), Some(presets)) = (request.comments, request.reply_presets) else {
        return Err(AppError::Validation(
            "Comments and reply_presets required".to_string(),
        ));
    };
    if presets.iter().filter(|p| !p.trim().is_empty()).count() < MIN_REPLY_PRESETS {
        return Err(AppError::Validation(format!(
            "At least {} non-empty reply presets required",
            MIN_REPLY_PRESETS
        )));
    }

    info!(comments = comments.len(), presets = presets.len(), "Replying to comments");

    let mut rng = state.batch_rng().await;
    let result = dispatcher::dispatch(
        state.api.as_ref(),
        &access_token,
        &comments,
        &presets,
        &mut rng,
    )
    .await;

    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct QuotaRequest {
    num_comments: Option<i64>,
}

async fn estimate_quota(
    body: Result<Json<QuotaRequest>, JsonRejection>,
) -> Result<Json<QuotaEstimate>, AppError> {
    let Json(request) = body?;
    let num_comments = request
        .num_comments
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| {
            AppError::Validation("num_comments must be a non-negative integer".to_string())
        })?;

    Ok(Json(quota::estimate(num_comments)))
}
