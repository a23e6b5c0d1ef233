use crate::cache::SignatureCache;
use crate::config::Listener as ListenerConfig;
use crate::render;
use crate::types::MergedRecord;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

pub fn router(cache: SignatureCache) -> Router {
    Router::new()
        .route("/signatures", get(signatures))
        .route("/health", get(health))
        .with_state(cache)
}

pub async fn serve(listener: ListenerConfig, cache: SignatureCache) -> Result<(), ApiError> {
    let app = router(cache);
    let addr = format!("{}:{}", listener.host, listener.port);
    info!(%addr, "serving signature API");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Serialize)]
struct SignaturesResponse<'a> {
    signatures: &'a [MergedRecord],
    total: usize,
    last_updated: u64,
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error: String,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
enum Format {
    #[default]
    Json,
    Simple,
    Detailed,
}

#[derive(Deserialize, Debug, Default)]
struct Params {
    #[serde(default)]
    format: Format,
}

async fn signatures(
    State(cache): State<SignatureCache>,
    Query(params): Query<Params>,
) -> Response {
    let entry = match cache.get_or_refresh().await {
        Ok(entry) => entry,
        Err(err) => {
            error!(error = %err, "could not produce signature data");
            return error_response();
        }
    };

    let response = match params.format {
        Format::Json => Json(SignaturesResponse {
            signatures: &entry.records,
            total: entry.records.len(),
            last_updated: entry.last_updated_epoch(),
        })
        .into_response(),
        Format::Simple => render::simple_list(&entry.records).into_response(),
        Format::Detailed => render::detailed_list(&entry.records).into_response(),
    };

    with_cors(response)
}

async fn health() -> &'static str {
    "ok\n"
}

/// The wall is embedded in a static site served from another origin, so
/// every data response carries a permissive CORS header.
fn with_cors(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

/// Upstream failure details never reach the public body.
fn error_response() -> Response {
    let body = Json(ApiErrorResponse {
        error: "failed to fetch supporter data".into(),
    });
    with_cors((StatusCode::INTERNAL_SERVER_ERROR, body).into_response())
}
