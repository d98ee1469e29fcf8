use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    auth, booking, db,
    error::{AppError, AppResult},
    extract::{ApiJson, ApiQuery},
    models::*,
    settings::{self, Locale, SettingKey, SettingsSnapshot, SiteContentPatch},
    AppState,
};

// ── Auth ──

/// POST /api/admin/auth — exchange the admin password for a bearer token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> AppResult<Json<ApiResponse<Token>>> {
    let digest = auth::current_password_digest(&state).await?;
    if body.password.is_empty() || auth::password_digest(&body.password) != digest {
        tracing::warn!("Admin login failed");
        return Err(AppError::Unauthorized("비밀번호가 올바르지 않습니다".into()));
    }

    let token = auth::issue_token(&state.config.auth_secret, &digest, chrono::Utc::now().timestamp());
    tracing::info!("Admin logged in");
    Ok(Json(ApiResponse::success(Token { token })))
}

// ── Settings ──

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedSetting {
    pub key: String,
    pub version: i64,
    /// Locales that received a machine translation of the saved content.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub translated: Vec<Locale>,
}

/// GET /api/admin/settings
pub async fn get_settings(State(state): State<Arc<AppState>>) -> AppResult<Json<ApiResponse<SettingsSnapshot>>> {
    let rows = db::all_settings(&state.db).await?;
    Ok(Json(ApiResponse::success(SettingsSnapshot::from_rows(&rows))))
}

/// POST /api/admin/settings
pub async fn save_settings(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<SaveSettingRequest>,
) -> AppResult<Json<ApiResponse<SavedSetting>>> {
    let key: SettingKey = body.key.parse()?;
    let value = settings::prepare_value(key, &body.value)?;
    let now = booking::kst_now().to_rfc3339();

    let version = db::put_setting(&state.db, &key.to_string(), &value, &now).await?;
    tracing::info!("Setting {} saved (version {})", key, version);

    let translated = if body.translate && key == SettingKey::Content(Locale::SOURCE) {
        translate_content(&state, &value, &now).await?
    } else {
        Vec::new()
    };

    Ok(Json(ApiResponse::success(SavedSetting {
        key: key.to_string(),
        version,
        translated,
    })))
}

/// Fills every other enabled locale from freshly saved Korean content.
async fn translate_content(state: &AppState, source_value: &str, now: &str) -> AppResult<Vec<Locale>> {
    let source: SiteContentPatch = serde_json::from_str(source_value)
        .map_err(|e| AppError::Upstream(anyhow::anyhow!("stored content unreadable: {}", e)))?;
    let texts = source.texts();

    let snapshot = SettingsSnapshot::from_rows(&db::all_settings(&state.db).await?);
    let targets: Vec<Locale> = snapshot
        .languages
        .iter()
        .copied()
        .filter(|l| *l != Locale::SOURCE)
        .collect();

    for &target in &targets {
        let translated = match &state.translator {
            Some(translator) => translator.translate_or_original(&texts, Locale::SOURCE, target).await,
            None => {
                tracing::warn!("Translation not configured, copying original text to {}", target.code());
                texts.clone()
            }
        };
        let patch = serde_json::to_value(source.with_texts(&translated))
            .map_err(|e| AppError::Upstream(e.into()))?;
        let key = SettingKey::Content(target);
        let value = settings::prepare_value(key, &patch)?;
        let version = db::put_setting(&state.db, &key.to_string(), &value, now).await?;
        tracing::info!("Setting {} translated (version {})", key, version);
    }

    Ok(targets)
}

// ── Records ──

/// GET /api/admin/records?date=&time=
pub async fn list_records(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<RecordsQuery>,
) -> AppResult<Json<ApiResponse<Records>>> {
    let date = match query.date.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(booking::parse_date(raw)?.format("%Y-%m-%d").to_string()),
        None => None,
    };
    let time = match query.time.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(booking::normalize_time(raw)?),
        None => None,
    };

    let records = db::list_leads(&state.db, date.as_deref(), time.as_deref()).await?;
    Ok(Json(ApiResponse::success(Records { records })))
}

/// PUT /api/admin/records — overwrite status and/or admin memo.
pub async fn update_record(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<UpdateRecordRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    if body.status.is_none() && body.admin_memo.is_none() {
        return Err(AppError::validation("변경할 내용이 없습니다"));
    }

    let status = body.status.as_deref().map(str::trim);
    if let Some(status) = status {
        if status.is_empty() {
            return Err(AppError::validation("상태를 입력해주세요"));
        }
        if LeadStatus::from_label(status).is_none() {
            tracing::warn!("Lead {} set to unrecognised status {:?}", body.id, status);
        }
    }
    let memo = body.admin_memo.as_deref().map(str::trim);

    if !db::update_lead(&state.db, body.id, status, memo).await? {
        return Err(AppError::not_found("해당 문의를 찾을 수 없습니다"));
    }
    tracing::info!("Lead {} updated (status: {:?}, memo changed: {})", body.id, status, memo.is_some());

    Ok(Json(ApiResponse::done("저장되었습니다")))
}

/// DELETE /api/admin/records?id=
pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<RecordIdQuery>,
) -> AppResult<Json<ApiResponse<()>>> {
    if !db::delete_lead(&state.db, query.id).await? {
        return Err(AppError::not_found("해당 문의를 찾을 수 없습니다"));
    }
    tracing::info!("Lead {} deleted", query.id);
    Ok(Json(ApiResponse::done("삭제되었습니다")))
}

// ── Upload ──

struct ImagePart {
    file_name: String,
    content_type: String,
    bytes: Vec<u8>,
}

/// POST /api/admin/upload — multipart image files, relayed to the CDN.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<ApiResponse<Urls>>> {
    let mut multipart = multipart?;
    let mut parts = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("업로드 형식이 올바르지 않습니다: {}", e)))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image/") {
            return Err(AppError::validation(format!(
                "이미지 파일만 업로드할 수 있습니다: {}",
                file_name
            )));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::validation(format!("파일을 읽을 수 없습니다: {}", e)))?;
        parts.push(ImagePart {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    if parts.is_empty() {
        return Err(AppError::validation("업로드할 파일이 없습니다"));
    }

    let cdn = state
        .cdn
        .as_ref()
        .ok_or_else(|| AppError::Upstream(anyhow::anyhow!("image CDN is not configured")))?;

    let mut urls = Vec::with_capacity(parts.len());
    for part in parts {
        urls.push(cdn.upload(&part.file_name, &part.content_type, part.bytes).await?);
    }
    tracing::info!("Uploaded {} images", urls.len());

    Ok(Json(ApiResponse::success(Urls { urls })))
}
