use axum::{
    extract::State,
    http::StatusCode,
    response::Html,
    Json,
};
use std::sync::Arc;

use crate::{
    auth, booking,
    db::{self, CapacityChange},
    error::{AppError, AppResult},
    extract::{ApiJson, ApiQuery},
    models::*,
    notify::escape_html,
    schedule::SchedulePlan,
    AppState,
};

// ── Public availability ──

/// GET /api/booking/times?date=YYYY-MM-DD
pub async fn times(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<TimesQuery>,
) -> AppResult<Json<ApiResponse<Slots<TimeAvailability>>>> {
    let date = booking::parse_date(&query.date)?.format("%Y-%m-%d").to_string();

    let slots = db::fetch_slots(&state.db, Some(&date), Some(&date)).await?;
    let bookings = db::fetch_bookings(&state.db, Some(&date), Some(&date)).await?;

    Ok(Json(ApiResponse::success(Slots {
        slots: booking::times_for_date(&slots, &bookings, &date),
    })))
}

/// GET /api/booking/dates?month=YYYY-MM
pub async fn dates(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<DatesQuery>,
) -> AppResult<Json<ApiResponse<Dates>>> {
    let (first, last) = booking::month_bounds(&query.month)?;
    let from = first.format("%Y-%m-%d").to_string();
    let to = last.format("%Y-%m-%d").to_string();

    let slots = db::fetch_slots(&state.db, Some(&from), Some(&to)).await?;
    let bookings = db::fetch_bookings(&state.db, Some(&from), Some(&to)).await?;

    Ok(Json(ApiResponse::success(Dates {
        dates: booking::dates_for_month(&slots, &bookings, first, last),
    })))
}

// ── Admin slot management ──

fn optional_date(raw: Option<&str>) -> AppResult<Option<String>> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| booking::parse_date(s).map(|d| d.format("%Y-%m-%d").to_string()))
        .transpose()
}

/// GET /api/booking/available-slots?from=&to=
pub async fn available_slots(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SlotRangeQuery>,
) -> AppResult<Json<ApiResponse<Slots<SlotUsage>>>> {
    let from = optional_date(query.from.as_deref())?;
    let to = optional_date(query.to.as_deref())?;

    let slots = db::fetch_slots(&state.db, from.as_deref(), to.as_deref()).await?;
    let bookings = db::fetch_bookings(&state.db, from.as_deref(), to.as_deref()).await?;

    Ok(Json(ApiResponse::success(Slots {
        slots: booking::slot_table(&slots, &bookings),
    })))
}

/// POST /api/booking/generate-schedule
pub async fn generate_schedule(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<GenerateScheduleRequest>,
) -> AppResult<Json<ApiResponse<Generated>>> {
    let plan = SchedulePlan::from_request(&body)?;
    let generated = plan.generate();

    let start = plan.start.format("%Y-%m-%d").to_string();
    let end = plan.end.format("%Y-%m-%d").to_string();
    let range = match plan.scope {
        RegenerateScope::All => None,
        RegenerateScope::Range => Some((start.as_str(), end.as_str())),
    };

    let wiped = db::replace_schedule(&state.db, range, &generated).await?;
    tracing::info!(
        "Schedule regenerated {}..{} ({:?}): {} slots removed, {} created",
        start,
        end,
        plan.scope,
        wiped,
        generated.len()
    );

    Ok(Json(ApiResponse::success(Generated {
        generated: generated.len(),
        message: format!(
            "{} ~ {} 기간에 {}개의 예약 슬롯이 생성되었습니다",
            start,
            end,
            generated.len()
        ),
    })))
}

fn normalize_key(key: &SlotKey) -> AppResult<SlotKey> {
    Ok(SlotKey {
        date: booking::parse_date(&key.date)?.format("%Y-%m-%d").to_string(),
        time: booking::normalize_time(&key.time)?,
    })
}

/// POST /api/booking/delete-slots
pub async fn delete_slots(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<DeleteSlotsRequest>,
) -> AppResult<Json<ApiResponse<Deleted>>> {
    let keys = body
        .slots
        .iter()
        .map(normalize_key)
        .collect::<AppResult<Vec<_>>>()?;

    let deleted = db::delete_slots(&state.db, &keys).await?;
    tracing::info!("Deleted {} of {} requested slots", deleted, keys.len());

    Ok(Json(ApiResponse::success(Deleted { deleted })))
}

async fn set_capacity(state: &AppState, date: &str, time: &str, capacity: i64) -> AppResult<()> {
    let key = normalize_key(&SlotKey {
        date: date.to_string(),
        time: time.to_string(),
    })?;

    match db::set_slot_capacity(&state.db, &key.date, &key.time, capacity).await? {
        CapacityChange::Updated => {
            tracing::info!("Slot {} {} capacity set to {}", key.date, key.time, capacity);
            Ok(())
        }
        CapacityChange::SlotMissing => Err(AppError::not_found("해당 예약 슬롯이 없습니다")),
        CapacityChange::ActiveBookings(n) => Err(AppError::conflict(format!(
            "예약이 {}건 있는 시간은 비활성화할 수 없습니다",
            n
        ))),
    }
}

/// POST /api/booking/enable-slot
pub async fn enable_slot(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<SlotToggleRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let capacity = body.capacity.unwrap_or(1);
    if capacity < 1 {
        return Err(AppError::validation("인원은 1명 이상이어야 합니다"));
    }
    set_capacity(&state, &body.date, &body.time, capacity).await?;
    Ok(Json(ApiResponse::done("슬롯이 활성화되었습니다")))
}

/// POST /api/booking/disable-slot
pub async fn disable_slot(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<SlotToggleRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    set_capacity(&state, &body.date, &body.time, 0).await?;
    Ok(Json(ApiResponse::done("슬롯이 비활성화되었습니다")))
}

// ── Confirm link ──

/// Pending → confirmed. Already confirmed is accepted again.
async fn confirm_lead(state: &AppState, id: i64, secret: &str) -> AppResult<&'static str> {
    if !auth::verify_confirm_secret(&state.config.auth_secret, id, secret.trim()) {
        tracing::warn!("Rejected confirm link for lead {}", id);
        return Err(AppError::Unauthorized("유효하지 않은 확정 링크입니다".into()));
    }

    if db::confirm_pending_lead(&state.db, id).await? {
        tracing::info!("Lead {} confirmed", id);
        return Ok("예약이 확정되었습니다");
    }

    let lead = db::get_lead(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("해당 문의를 찾을 수 없습니다"))?;
    match LeadStatus::from_label(&lead.status) {
        Some(LeadStatus::Confirmed) => Ok("이미 확정된 예약입니다"),
        _ => Err(AppError::conflict(format!(
            "'{}' 상태의 예약은 확정할 수 없습니다",
            lead.status
        ))),
    }
}

fn confirm_page(title: &str, message: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html lang=\"ko\"><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
         <title>{title}</title></head>\
         <body style=\"font-family:sans-serif;text-align:center;padding:48px\">\
         <h1>{title}</h1><p>{message}</p></body></html>",
        title = escape_html(title),
        message = escape_html(message),
    ))
}

/// GET /api/booking/confirm?id=&secret= — opened from the admin email.
pub async fn confirm_link(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ConfirmRequest>,
) -> (StatusCode, Html<String>) {
    match confirm_lead(&state, query.id, &query.secret).await {
        Ok(message) => (StatusCode::OK, confirm_page("예약 확정", message)),
        Err(e) => {
            let status = e.status();
            let message = match e {
                AppError::Database(err) => {
                    tracing::error!("database failure: {}", err);
                    "일시적인 오류가 발생했습니다. 잠시 후 다시 시도해주세요.".to_string()
                }
                other => other.to_string(),
            };
            (status, confirm_page("예약 확정 실패", &message))
        }
    }
}

/// POST /api/booking/confirm
pub async fn confirm(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<ConfirmRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let message = confirm_lead(&state, body.id, &body.secret).await?;
    Ok(Json(ApiResponse::done(message)))
}
