use serde::{Deserialize, Serialize};

// ── Lead status ──

/// Lifecycle of a lead. Stored in the database as the Korean label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadStatus {
    #[serde(rename = "대기")]
    Pending,
    #[serde(rename = "확정")]
    Confirmed,
    #[serde(rename = "거부")]
    Rejected,
    #[serde(rename = "취소")]
    Cancelled,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 4] = [
        LeadStatus::Pending,
        LeadStatus::Confirmed,
        LeadStatus::Rejected,
        LeadStatus::Cancelled,
    ];

    pub fn label(self) -> &'static str {
        match self {
            LeadStatus::Pending => "대기",
            LeadStatus::Confirmed => "확정",
            LeadStatus::Rejected => "거부",
            LeadStatus::Cancelled => "취소",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.label() == label.trim())
    }

    /// Pending and confirmed leads hold a seat; everything else frees it.
    pub fn is_active(self) -> bool {
        matches!(self, LeadStatus::Pending | LeadStatus::Confirmed)
    }
}

/// True when a raw status string counts against slot capacity.
pub fn is_active_label(label: &str) -> bool {
    LeadStatus::from_label(label).is_some_and(LeadStatus::is_active)
}

// ── Database models ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SlotDefinition {
    pub date: String,
    pub time: String,
    pub capacity: i64,
}

impl SlotDefinition {
    pub fn new(date: &str, time: &str, capacity: i64) -> Self {
        Self {
            date: date.to_string(),
            time: time.to_string(),
            capacity,
        }
    }
}

/// The booking columns of a lead; all the capacity model needs.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Booking {
    pub date: String,
    pub time: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: i64,
    pub created_at: String,
    pub name: String,
    pub phone: String,
    pub region: String,
    pub booking_date: Option<String>,
    pub booking_time: Option<String>,
    pub memo: String,
    pub user_agent: String,
    pub referer: String,
    pub status: String,
    pub admin_memo: String,
}

/// A validated lead ready to be appended.
#[derive(Debug, Clone)]
pub struct NewLead {
    pub created_at: String,
    pub name: String,
    pub phone: String,
    pub region: String,
    pub booking: Option<(String, String)>,
    pub memo: String,
    pub user_agent: String,
    pub referer: String,
}

// ── API request types ──

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    pub region: Option<String>,
    #[serde(alias = "message")]
    pub memo: Option<String>,
    pub booking_date: Option<String>,
    pub booking_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TimesQuery {
    pub date: String,
}

#[derive(Debug, Deserialize)]
pub struct DatesQuery {
    pub month: String,
}

#[derive(Debug, Deserialize)]
pub struct SlotRangeQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegenerateScope {
    /// Wipe every slot before inserting (historical behaviour).
    #[default]
    All,
    /// Wipe only slots inside the generated range.
    Range,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateScheduleRequest {
    pub start_date: String,
    pub end_date: String,
    pub weekday_capacity: i64,
    #[serde(default)]
    pub weekday_times: String,
    pub weekend_capacity: i64,
    #[serde(default)]
    pub weekend_times: String,
    #[serde(default)]
    pub scope: RegenerateScope,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotKey {
    pub date: String,
    pub time: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteSlotsRequest {
    #[serde(default)]
    pub slots: Vec<SlotKey>,
}

#[derive(Debug, Deserialize)]
pub struct SlotToggleRequest {
    pub date: String,
    pub time: String,
    pub capacity: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordsQuery {
    pub date: Option<String>,
    pub time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecordRequest {
    #[serde(alias = "rowIndex")]
    pub id: i64,
    pub status: Option<String>,
    pub admin_memo: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecordIdQuery {
    #[serde(alias = "rowIndex")]
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    #[serde(alias = "rowIndex")]
    pub id: i64,
    pub secret: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveSettingRequest {
    pub key: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub translate: bool,
}

#[derive(Debug, Deserialize)]
pub struct ContentQuery {
    pub lang: Option<String>,
}

// ── API response types ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeAvailability {
    pub time: String,
    pub booked: i64,
    pub capacity: i64,
    pub available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DateStatus {
    Available,
    Partial,
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateAvailability {
    pub date: String,
    pub status: DateStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotUsage {
    pub date: String,
    pub time: String,
    pub capacity: i64,
    pub booked_count: i64,
}

#[derive(Debug, Serialize)]
pub struct Slots<T: Serialize> {
    pub slots: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct Dates {
    pub dates: Vec<DateAvailability>,
}

#[derive(Debug, Serialize)]
pub struct Records {
    pub records: Vec<Lead>,
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted: u64,
}

#[derive(Debug, Serialize)]
pub struct Token {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct Urls {
    pub urls: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Generated {
    pub generated: usize,
    pub message: String,
}

/// Envelope for every JSON response: `{ok, ...payload}` or `{ok: false, message}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    #[serde(flatten)]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            message: Some(msg.into()),
        }
    }
}

impl ApiResponse<()> {
    /// Success without payload, carrying a human-readable message.
    pub fn done(msg: impl Into<String>) -> Self {
        Self {
            ok: true,
            data: None,
            message: Some(msg.into()),
        }
    }
}
