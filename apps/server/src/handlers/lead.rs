use axum::{
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use std::sync::Arc;

use crate::{
    auth, booking,
    booking::SlotCheck,
    db,
    error::{AppError, AppResult},
    extract::ApiJson,
    models::*,
    settings::{self, SettingsSnapshot},
    AppState,
};

const MAX_NAME_LEN: usize = 50;
const MAX_PHONE_LEN: usize = 30;
const MAX_REGION_LEN: usize = 100;
const MAX_MEMO_LEN: usize = 2000;
const MAX_HEADER_LEN: usize = 500;

const SLOT_FULL_MESSAGE: &str = "선택하신 시간은 예약이 마감되었습니다. 다른 시간을 선택해주세요.";

fn bounded(value: &str, max: usize, field: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.chars().count() > max {
        return Err(AppError::validation(format!(
            "{}은(는) {}자 이하로 입력해주세요",
            field, max
        )));
    }
    Ok(trimmed.to_string())
}

fn header_text(headers: &HeaderMap, name: header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.chars().take(MAX_HEADER_LEN).collect())
        .unwrap_or_default()
}

/// Validates the form and turns it into a row to append.
pub fn validate_lead(req: &LeadRequest, headers: &HeaderMap, created_at: String) -> AppResult<NewLead> {
    let name = bounded(&req.name, MAX_NAME_LEN, "이름")?;
    if name.is_empty() {
        return Err(AppError::validation("이름을 입력해주세요"));
    }
    let phone = bounded(&req.phone, MAX_PHONE_LEN, "연락처")?;
    if phone.is_empty() {
        return Err(AppError::validation("연락처를 입력해주세요"));
    }

    let non_blank = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
    let booking = match (non_blank(&req.booking_date), non_blank(&req.booking_time)) {
        (Some(date), Some(time)) => {
            let date = booking::parse_date(&date)?.format("%Y-%m-%d").to_string();
            let time = booking::normalize_time(&time)?;
            Some((date, time))
        }
        (None, None) => None,
        _ => {
            return Err(AppError::validation(
                "예약 날짜와 시간을 모두 선택해주세요",
            ))
        }
    };

    Ok(NewLead {
        created_at,
        name,
        phone: booking::normalize_phone(&phone),
        region: bounded(req.region.as_deref().unwrap_or(""), MAX_REGION_LEN, "지역")?,
        booking,
        memo: bounded(req.memo.as_deref().unwrap_or(""), MAX_MEMO_LEN, "메모")?,
        user_agent: header_text(headers, header::USER_AGENT),
        referer: header_text(headers, header::REFERER),
    })
}

/// Re-reads availability for the requested slot. `Err` means the check
/// itself could not run.
async fn precheck(state: &AppState, date: &str, time: &str) -> Result<SlotCheck, sqlx::Error> {
    let slots = db::fetch_slots(&state.db, Some(date), Some(date)).await?;
    let bookings = db::fetch_bookings(&state.db, Some(date), Some(date)).await?;
    Ok(booking::check_slot(&slots, &bookings, date, time))
}

/// POST /api/lead — submit a lead, optionally holding a booking slot.
pub async fn submit_lead(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<LeadRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let lead = validate_lead(&body, &headers, booking::kst_now().to_rfc3339())?;

    let guarded = match &lead.booking {
        None => false,
        Some((date, time)) => match precheck(&state, date, time).await {
            Ok(SlotCheck::Open { booked, capacity }) => {
                tracing::debug!("Slot {} {} has {}/{} booked", date, time, booked, capacity);
                true
            }
            Ok(SlotCheck::Full { booked, capacity }) => {
                tracing::info!("Lead refused: {} {} is full ({}/{})", date, time, booked, capacity);
                return Err(AppError::conflict(SLOT_FULL_MESSAGE));
            }
            Ok(SlotCheck::Missing) => {
                tracing::info!("Lead refused: no slot defined for {} {}", date, time);
                return Err(AppError::conflict(SLOT_FULL_MESSAGE));
            }
            Err(e) => {
                // Fail open: the lead is appended without the capacity guard
                tracing::warn!("Availability check failed for {} {}, accepting lead: {}", date, time, e);
                false
            }
        },
    };

    let id = match db::insert_lead(&state.db, &lead, guarded).await? {
        Some(id) => id,
        None => {
            tracing::info!("Lead refused: last seat taken concurrently");
            return Err(AppError::conflict(SLOT_FULL_MESSAGE));
        }
    };
    tracing::info!("Lead {} created (booking: {:?})", id, lead.booking);

    notify_admin(&state, id).await;

    Ok(Json(ApiResponse::done(
        "예약 문의가 접수되었습니다. 확인 후 연락드리겠습니다.",
    )))
}

/// Emails the admin about a new lead. Failures are logged, never surfaced.
async fn notify_admin(state: &AppState, id: i64) {
    let Some(mailer) = &state.mailer else {
        return;
    };

    let lead = match db::get_lead(&state.db, id).await {
        Ok(Some(lead)) => lead,
        Ok(None) => return,
        Err(e) => {
            tracing::error!("Failed to reload lead {} for notification: {}", id, e);
            return;
        }
    };

    let snapshot = match db::all_settings(&state.db).await {
        Ok(rows) => SettingsSnapshot::from_rows(&rows),
        Err(e) => {
            tracing::warn!("Settings unavailable for lead {} notification: {}", id, e);
            SettingsSnapshot::from_rows(&[])
        }
    };
    let sms = settings::render_sms(
        &snapshot.sms_message,
        &lead.name,
        lead.booking_date.as_deref().unwrap_or(""),
        lead.booking_time.as_deref().unwrap_or(""),
    );

    let confirm_url = confirm_link(&state.config.public_url, &state.config.auth_secret, id);
    if let Err(e) = mailer.notify_new_lead(&lead, &confirm_url, &sms).await {
        tracing::error!("Failed to send lead {} notification: {:#}", id, e);
    }
}

/// `{public_url}/api/booking/confirm?id=..&secret=..`
pub fn confirm_link(public_url: &str, auth_secret: &str, id: i64) -> String {
    let secret = auth::confirm_secret(auth_secret, id);
    match url::Url::parse(public_url).and_then(|base| base.join("/api/booking/confirm")) {
        Ok(mut url) => {
            url.query_pairs_mut()
                .append_pair("id", &id.to_string())
                .append_pair("secret", &secret);
            url.to_string()
        }
        Err(e) => {
            tracing::warn!("PUBLIC_URL {} is not a valid URL: {}", public_url, e);
            format!("{}/api/booking/confirm?id={}&secret={}", public_url, id, secret)
        }
    }
}
