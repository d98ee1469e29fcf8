use axum::{
    extract::State,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    db,
    error::AppResult,
    extract::ApiQuery,
    models::{ApiResponse, ContentQuery},
    settings::{ImageSettings, Locale, SettingsSnapshot, SiteContent},
    AppState,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicContent {
    pub lang: Locale,
    pub languages: Vec<Locale>,
    pub version: i64,
    pub content: SiteContent,
    pub images: ImageSettings,
}

/// GET /api/content?lang=xx — landing page copy for an enabled locale,
/// Korean otherwise.
pub async fn content(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ContentQuery>,
) -> AppResult<Json<ApiResponse<PublicContent>>> {
    let rows = db::all_settings(&state.db).await?;
    let mut snapshot = SettingsSnapshot::from_rows(&rows);
    let lang = snapshot.resolve_locale(query.lang.as_deref());

    let (version, content) = match snapshot.content.remove(&lang) {
        Some(v) => (v.version, v.content),
        None => (0, SiteContent::defaults(lang)),
    };

    Ok(Json(ApiResponse::success(PublicContent {
        lang,
        languages: snapshot.languages,
        version,
        content,
        images: snapshot.images,
    })))
}
