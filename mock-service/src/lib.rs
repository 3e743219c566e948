use axum::{
    debug_handler,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use lazy_static::lazy_static;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::{
    num::NonZeroU32,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, RwLock,
    },
    time::Duration,
};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

pub mod prelude {
    pub use crate::{MockConfig, MockState};
}

/// Behaviour of the alert ingestion endpoint.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Bearer token required on `POST /alerts`. No auth check when `None`.
    pub token: Option<String>,
    /// Alerts accepted per second before answering `429`. Unlimited when `None`.
    pub alerts_per_second: Option<u32>,
}

/// Shared state, inspectable by tests.
pub struct MockState {
    config: MockConfig,
    limiter: Option<DefaultDirectRateLimiter>,
    alerts: Mutex<Vec<String>>,
}

impl MockState {
    pub fn new(config: MockConfig) -> Self {
        let limiter = config.alerts_per_second.map(rate_limiter);
        Self {
            config,
            limiter,
            alerts: Mutex::new(vec![]),
        }
    }

    /// Ids of every alert accepted so far.
    pub fn alert_ids(&self) -> Vec<String> {
        self.alerts
            .lock()
            .map(|alerts| alerts.clone())
            .unwrap_or_default()
    }
}

pub fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/ok", get(ok).post(ok))
        .route("/status/:code", get(status).post(status))
        .route("/delay/ms/:delay_ms", get(delay))
        .route("/limited/:max_tps/server/:server_id", get(limited))
        .route("/alerts", post(alerts))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn run(addr: SocketAddr, config: MockConfig) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Mock service listening on {}", listener.local_addr()?);
    axum::serve(listener, router(Arc::new(MockState::new(config)))).await?;
    Ok(())
}

/// Serves on an ephemeral localhost port in the background.
pub async fn spawn(config: MockConfig) -> anyhow::Result<(SocketAddr, Arc<MockState>)> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = Arc::new(MockState::new(config));
    let app = router(state.clone());
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!("Mock service on {addr} stopped: {err}");
        }
    });
    Ok((addr, state))
}

#[debug_handler]
async fn ok() -> &'static str {
    TPS_MEASURE.fetch_add(1, Ordering::Relaxed);
    "ok"
}

#[debug_handler]
async fn status(Path(code): Path<u16>) -> StatusCode {
    TPS_MEASURE.fetch_add(1, Ordering::Relaxed);
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

#[debug_handler]
async fn delay(Path(delay_ms): Path<u64>) {
    TPS_MEASURE.fetch_add(1, Ordering::Relaxed);
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
}

lazy_static! {
    static ref LIMITED_MAP: RwLock<HashMap<String, Arc<DefaultDirectRateLimiter>>> =
        RwLock::new(HashMap::new());
}

/// Answers `429` once `max_tps` is exceeded for `server_id`.
#[debug_handler]
async fn limited(Path((max_tps, server_id)): Path<(u32, String)>) -> StatusCode {
    TPS_MEASURE.fetch_add(1, Ordering::Relaxed);

    let read = LIMITED_MAP
        .read()
        .ok()
        .and_then(|map| map.get(&server_id).cloned());
    let limiter = match read {
        Some(limiter) => limiter,
        None => {
            let limiter = Arc::new(rate_limiter(max_tps));
            if let Ok(mut map) = LIMITED_MAP.write() {
                map.insert(server_id, limiter.clone());
            }
            limiter
        }
    };

    match limiter.check() {
        Ok(_) => StatusCode::OK,
        Err(_) => {
            debug!("Rate limit reached");
            StatusCode::TOO_MANY_REQUESTS
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlertBody {
    alert_id: String,
}

#[debug_handler]
async fn alerts(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<AlertBody>,
) -> Result<Json<Value>, StatusCode> {
    TPS_MEASURE.fetch_add(1, Ordering::Relaxed);

    if let Some(token) = &state.config.token {
        let expected = format!("Bearer {token}");
        let provided = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    if let Some(limiter) = &state.limiter {
        if limiter.check().is_err() {
            return Err(StatusCode::TOO_MANY_REQUESTS);
        }
    }

    let mut alerts = state
        .alerts
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    alerts.push(body.alert_id.clone());

    Ok(Json(json!({ "accepted": body.alert_id })))
}

/** Utils **/

pub fn rate_limiter(tps: u32) -> DefaultDirectRateLimiter {
    let tps = NonZeroU32::new(tps).unwrap_or(NonZeroU32::MIN);
    RateLimiter::direct(Quota::per_second(tps))
}

/** TPS Printer **/

static TPS_MEASURE: AtomicU64 = AtomicU64::new(0);

pub async fn tps_measure_task() {
    loop {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let transactions = TPS_MEASURE.swap(0, Ordering::Relaxed);
        info!("{transactions} TPS");
    }
}
