use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use axum::{
    extract::{Path, Query, Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// What `/echo` saw. Header names are lowercase.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Echo {
    pub request_id: Uuid,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlakyReport {
    pub key: String,
    pub attempts: u32,
}

#[derive(Deserialize)]
pub struct FlakyParams {
    #[serde(default)]
    pub failures: u32,
}

#[derive(Clone, Default)]
pub struct AppState {
    hits: Arc<RwLock<HashMap<String, u32>>>,
    log: Arc<RwLock<Vec<String>>>,
}

pub fn app() -> Router {
    let state = AppState::default();
    Router::new()
        .route("/echo", any(echo))
        .route("/flaky/{key}", any(flaky))
        .route("/status/{code}", any(status))
        .route("/delay/{ms}", any(delay))
        .route("/log", get(request_log))
        .layer(middleware::from_fn_with_state(state.clone(), record))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn record(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if request.uri().path() != "/log" {
        let entry = format!("{} {}", request.method(), request.uri().path());
        state.log.write().await.push(entry);
    }
    next.run(request).await
}

async fn echo(method: Method, headers: HeaderMap, body: String) -> Json<Echo> {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    Json(Echo {
        request_id: Uuid::new_v4(),
        method: method.to_string(),
        headers,
        body,
    })
}

/// Answers 503 for the first `failures` hits on `key`, then 200.
async fn flaky(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<FlakyParams>,
) -> Result<Json<FlakyReport>, (StatusCode, String)> {
    let attempts = {
        let mut hits = state.hits.write().await;
        let count = hits.entry(key.clone()).or_insert(0);
        *count += 1;
        *count
    };
    if attempts <= params.failures {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            format!("unavailable (attempt {attempts})"),
        ));
    }
    Ok(Json(FlakyReport { key, attempts }))
}

async fn status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

async fn delay(Path(ms): Path<u64>) -> String {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    format!("slept {ms}ms")
}

async fn request_log(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.log.read().await.clone())
}
