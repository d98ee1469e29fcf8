use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Integrations {
    pub mail: bool,
    pub translate: bool,
    pub cdn: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub db_ok: bool,
    pub integrations: Integrations,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let db_ok = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();

    Json(HealthResponse {
        status: if db_ok { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        db_ok,
        integrations: Integrations {
            mail: state.mailer.is_some(),
            translate: state.translator.is_some(),
            cdn: state.cdn.is_some(),
        },
    })
}
