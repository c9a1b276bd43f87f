//! Sessiongate demo service
//!
//! ```text
//! POST /login     {"username": "admin", "password": "admin"}  -> token pair
//! POST /refresh   refresh_token cookie, form, JSON or query     -> rotated pair
//! POST /logout    refresh token as above                        -> revoked
//! GET  /me        Authorization: Bearer <access_token>          -> identity
//! ```
//!
//! `--issue N` skips the server and prints N token pairs as JSON lines.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use clap::Parser;
use serde_json::{Value, json};
use sessiongate::{
    AuthenticationError, RequestContext, SessionConfig, SessionEngine, SessionEngineBuilder,
    SessionError, SetCookie, spawn_cleanup,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Parser, Debug)]
#[command(name = "sessiongate-demo", about = "Sessiongate demo service", version)]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, short = 'c', env = "SESSIONGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Shared secret, overriding the configuration file
    #[arg(long, env = "SESSIONGATE_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Redis address for refresh tokens; falls back to memory when unreachable
    #[arg(long)]
    redis: Option<String>,

    /// Listen address
    #[arg(long, default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Print this many token pairs as JSON lines and exit
    #[arg(long, value_name = "N")]
    issue: Option<usize>,

    /// Seconds between purges of expired refresh tokens
    #[arg(long, default_value_t = 60)]
    cleanup_interval: u64,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let engine = build_engine(&args).await?;

    if let Some(count) = args.issue {
        return issue_batch(&engine, count).await;
    }

    let shutdown = CancellationToken::new();
    let cleanup = spawn_cleanup(
        engine.store().clone(),
        Duration::from_secs(args.cleanup_interval),
        shutdown.clone(),
    )
    .context("invalid cleanup interval")?;

    let app = Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .with_state(engine);

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    info!(addr = %args.bind, "Demo service listening");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            signal.cancel();
        })
        .await
        .context("server error")?;

    shutdown.cancel();
    cleanup.await.context("cleanup task panicked")?;
    info!("Demo service stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sessiongate=debug,sessiongate_store=debug"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn build_engine(args: &Args) -> anyhow::Result<SessionEngine> {
    let config = match &args.config {
        Some(path) => SessionConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => SessionConfig::default(),
    };

    let mut builder = SessionEngineBuilder::from_config(config).authenticator(authenticate);
    if let Some(secret) = &args.secret {
        builder = builder.secret(secret.clone());
    }
    if let Some(addr) = &args.redis {
        builder = builder.with_redis_addr(addr.clone());
    }

    builder.build().await.context("failed to initialize session engine")
}

/// Demo credentials: `admin`/`admin` and `test`/`test`
fn authenticate(credentials: &Value) -> Result<Value, AuthenticationError> {
    let username = credentials.get("username").and_then(Value::as_str);
    let password = credentials.get("password").and_then(Value::as_str);
    match (username, password) {
        (Some(user), Some(pass)) if user == pass && matches!(user, "admin" | "test") => {
            Ok(json!({"user": user, "first_name": "Demo", "last_name": "User"}))
        }
        (Some(_), Some(_)) => Err(AuthenticationError::FailedAuthentication),
        _ => Err(AuthenticationError::MissingLoginValues),
    }
}

async fn issue_batch(engine: &SessionEngine, count: usize) -> anyhow::Result<()> {
    for i in 0..count {
        let pair = engine
            .generate_token_pair(json!({"user": format!("batch-{i}")}))
            .await
            .with_context(|| format!("failed to issue token pair {i}"))?;
        println!("{}", serde_json::to_string(&pair)?);
    }
    info!(count, store = %engine.store_backend(), "Issued token pairs");
    Ok(())
}

/// Session failure rendered as `{code, message}` with the engine's status
struct ApiError {
    error: SessionError,
    www_authenticate: String,
}

impl ApiError {
    fn new(engine: &SessionEngine, error: SessionError) -> Self {
        Self {
            error,
            www_authenticate: engine.www_authenticate(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        if status.is_server_error() {
            error!(error = %self.error, category = self.error.category(), "Request failed");
        }

        let body = json!({
            "code": status.as_u16(),
            "message": self.error.to_string(),
            "category": self.error.category(),
        });
        let mut response = (status, axum::Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED
            && let Ok(value) = HeaderValue::from_str(&self.www_authenticate)
        {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

fn with_cookies(mut response: Response, cookies: &[SetCookie]) -> Response {
    for cookie in cookies {
        match cookie.to_header_value() {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => warn!(cookie = %cookie.name, error = %e, "Dropped cookie with invalid header value"),
        }
    }
    response
}

async fn request_context(request: Request<Body>) -> Result<RequestContext, StatusCode> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)?;
    Ok(RequestContext::from_parts(&parts).with_body(&body))
}

async fn login(
    State(engine): State<SessionEngine>,
    axum::Json(credentials): axum::Json<Value>,
) -> Response {
    match engine.login(&credentials).await {
        Ok(grant) => with_cookies(axum::Json(&grant.pair).into_response(), &grant.cookies),
        Err(e) => ApiError::new(&engine, e).into_response(),
    }
}

async fn refresh(State(engine): State<SessionEngine>, request: Request<Body>) -> Response {
    let ctx = match request_context(request).await {
        Ok(ctx) => ctx,
        Err(status) => return status.into_response(),
    };
    match engine.refresh(&ctx).await {
        Ok(grant) => with_cookies(axum::Json(&grant.pair).into_response(), &grant.cookies),
        Err(e) => ApiError::new(&engine, e).into_response(),
    }
}

async fn logout(State(engine): State<SessionEngine>, request: Request<Body>) -> Response {
    let ctx = match request_context(request).await {
        Ok(ctx) => ctx,
        Err(status) => return status.into_response(),
    };
    match engine.logout(&ctx).await {
        Ok(outcome) => with_cookies(
            axum::Json(json!({"code": 200, "revoked": outcome.revoked})).into_response(),
            &outcome.cookies,
        ),
        Err(e) => ApiError::new(&engine, e).into_response(),
    }
}

async fn me(State(engine): State<SessionEngine>, request: Request<Body>) -> Response {
    let ctx = match request_context(request).await {
        Ok(ctx) => ctx,
        Err(status) => return status.into_response(),
    };
    match engine.validate(&ctx).await {
        Ok(validated) => {
            let mut response = axum::Json(json!({
                "identity": validated.identity,
                "claims": validated.claims,
            }))
            .into_response();
            if let Some(authorization) = validated.authorization
                && let Ok(value) = HeaderValue::from_str(&authorization)
            {
                response.headers_mut().insert(header::AUTHORIZATION, value);
            }
            response
        }
        Err(e) => ApiError::new(&engine, e).into_response(),
    }
}
