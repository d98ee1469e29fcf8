use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::models::{Booking, Lead, LeadStatus, NewLead, SlotDefinition, SlotKey};

/// Ordered list of migrations; each runs once and is recorded in `_migrations`.
const MIGRATIONS: &[(&str, &str)] = &[("001_init", include_str!("../migrations/001_init.sql"))];

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    // WAL lets availability reads proceed while a lead is being appended
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await?;

    for &(name, sql) in MIGRATIONS {
        let applied: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?")
                .bind(name)
                .fetch_one(pool)
                .await?;
        if applied {
            continue;
        }

        let mut tx = pool.begin().await?;
        for statement in sql.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed).execute(&mut *tx).await?;
            }
        }
        sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::info!("Applied migration: {}", name);
    }

    tracing::info!("Database migrations up to date");
    Ok(())
}

// ── Slots ──

/// Slots with `from <= date <= to`; either bound may be open.
pub async fn fetch_slots(
    pool: &SqlitePool,
    from: Option<&str>,
    to: Option<&str>,
) -> sqlx::Result<Vec<SlotDefinition>> {
    sqlx::query_as::<_, SlotDefinition>(
        "SELECT date, time, capacity FROM slots
         WHERE (? IS NULL OR date >= ?) AND (? IS NULL OR date <= ?)
         ORDER BY date ASC, time ASC",
    )
    .bind(from)
    .bind(from)
    .bind(to)
    .bind(to)
    .fetch_all(pool)
    .await
}

/// Booking columns of every lead tied to a slot in `[from, to]`.
pub async fn fetch_bookings(
    pool: &SqlitePool,
    from: Option<&str>,
    to: Option<&str>,
) -> sqlx::Result<Vec<Booking>> {
    sqlx::query_as::<_, Booking>(
        "SELECT booking_date AS date, booking_time AS time, status FROM leads
         WHERE booking_date IS NOT NULL AND booking_time IS NOT NULL
           AND (? IS NULL OR booking_date >= ?) AND (? IS NULL OR booking_date <= ?)",
    )
    .bind(from)
    .bind(from)
    .bind(to)
    .bind(to)
    .fetch_all(pool)
    .await
}

/// Replaces slots with `generated` in one transaction. With `range` set only
/// slots inside that inclusive date range are wiped, otherwise all of them.
pub async fn replace_schedule(
    pool: &SqlitePool,
    range: Option<(&str, &str)>,
    generated: &[SlotDefinition],
) -> sqlx::Result<u64> {
    let mut tx = pool.begin().await?;

    let wiped = match range {
        Some((start, end)) => {
            sqlx::query("DELETE FROM slots WHERE date >= ? AND date <= ?")
                .bind(start)
                .bind(end)
                .execute(&mut *tx)
                .await?
        }
        None => sqlx::query("DELETE FROM slots").execute(&mut *tx).await?,
    }
    .rows_affected();

    for slot in generated {
        sqlx::query("INSERT INTO slots (date, time, capacity) VALUES (?, ?, ?)")
            .bind(&slot.date)
            .bind(&slot.time)
            .bind(slot.capacity)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(wiped)
}

pub async fn delete_slots(pool: &SqlitePool, keys: &[SlotKey]) -> sqlx::Result<u64> {
    let mut tx = pool.begin().await?;
    let mut deleted = 0;
    for key in keys {
        deleted += sqlx::query("DELETE FROM slots WHERE date = ? AND time = ?")
            .bind(&key.date)
            .bind(&key.time)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }
    tx.commit().await?;
    Ok(deleted)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapacityChange {
    Updated,
    SlotMissing,
    /// Disabling refused: this many pending/confirmed leads hold the slot.
    ActiveBookings(i64),
}

/// Sets a slot's capacity. Setting 0 only succeeds when no active lead holds
/// the slot; the check and the write are a single statement.
pub async fn set_slot_capacity(
    pool: &SqlitePool,
    date: &str,
    time: &str,
    capacity: i64,
) -> sqlx::Result<CapacityChange> {
    let updated = sqlx::query(
        "UPDATE slots SET capacity = ?
         WHERE date = ? AND time = ?
           AND (? > 0 OR NOT EXISTS (
                SELECT 1 FROM leads
                WHERE booking_date = ? AND booking_time = ? AND status IN (?, ?)))",
    )
    .bind(capacity)
    .bind(date)
    .bind(time)
    .bind(capacity)
    .bind(date)
    .bind(time)
    .bind(LeadStatus::Pending.label())
    .bind(LeadStatus::Confirmed.label())
    .execute(pool)
    .await?
    .rows_affected();

    if updated > 0 {
        return Ok(CapacityChange::Updated);
    }

    let exists: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM slots WHERE date = ? AND time = ?")
            .bind(date)
            .bind(time)
            .fetch_one(pool)
            .await?;
    if !exists {
        return Ok(CapacityChange::SlotMissing);
    }

    let active = count_active_bookings(pool, date, time).await?;
    Ok(CapacityChange::ActiveBookings(active))
}

pub async fn count_active_bookings(pool: &SqlitePool, date: &str, time: &str) -> sqlx::Result<i64> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM leads
         WHERE booking_date = ? AND booking_time = ? AND status IN (?, ?)",
    )
    .bind(date)
    .bind(time)
    .bind(LeadStatus::Pending.label())
    .bind(LeadStatus::Confirmed.label())
    .fetch_one(pool)
    .await
}

// ── Leads ──

const LEAD_COLUMNS: &str = "id, created_at, name, phone, region, booking_date, booking_time,
     memo, user_agent, referer, status, admin_memo";

/// Appends a pending lead.
///
/// With `guarded` set and a booking attached, the row is only written when
/// the slot exists and still has a free seat, evaluated in the same
/// statement as the insert. Returns `None` when the guard refused.
pub async fn insert_lead(pool: &SqlitePool, lead: &NewLead, guarded: bool) -> sqlx::Result<Option<i64>> {
    let (date, time) = match &lead.booking {
        Some((d, t)) => (Some(d.as_str()), Some(t.as_str())),
        None => (None, None),
    };

    let result = if guarded && lead.booking.is_some() {
        sqlx::query(
            "INSERT INTO leads (created_at, name, phone, region, booking_date, booking_time,
                                memo, user_agent, referer, status)
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
             WHERE EXISTS (
                SELECT 1 FROM slots s
                WHERE s.date = ? AND s.time = ?
                  AND s.capacity > (
                    SELECT COUNT(*) FROM leads l
                    WHERE l.booking_date = s.date AND l.booking_time = s.time
                      AND l.status IN (?, ?)))",
        )
        .bind(&lead.created_at)
        .bind(&lead.name)
        .bind(&lead.phone)
        .bind(&lead.region)
        .bind(date)
        .bind(time)
        .bind(&lead.memo)
        .bind(&lead.user_agent)
        .bind(&lead.referer)
        .bind(LeadStatus::Pending.label())
        .bind(date)
        .bind(time)
        .bind(LeadStatus::Pending.label())
        .bind(LeadStatus::Confirmed.label())
        .execute(pool)
        .await?
    } else {
        sqlx::query(
            "INSERT INTO leads (created_at, name, phone, region, booking_date, booking_time,
                                memo, user_agent, referer, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&lead.created_at)
        .bind(&lead.name)
        .bind(&lead.phone)
        .bind(&lead.region)
        .bind(date)
        .bind(time)
        .bind(&lead.memo)
        .bind(&lead.user_agent)
        .bind(&lead.referer)
        .bind(LeadStatus::Pending.label())
        .execute(pool)
        .await?
    };

    if result.rows_affected() == 0 {
        Ok(None)
    } else {
        Ok(Some(result.last_insert_rowid()))
    }
}

pub async fn get_lead(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<Lead>> {
    sqlx::query_as::<_, Lead>(&format!("SELECT {} FROM leads WHERE id = ?", LEAD_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Leads newest first, optionally narrowed to a booking date and/or time.
pub async fn list_leads(
    pool: &SqlitePool,
    date: Option<&str>,
    time: Option<&str>,
) -> sqlx::Result<Vec<Lead>> {
    sqlx::query_as::<_, Lead>(&format!(
        "SELECT {} FROM leads
         WHERE (? IS NULL OR booking_date = ?) AND (? IS NULL OR booking_time = ?)
         ORDER BY id DESC",
        LEAD_COLUMNS
    ))
    .bind(date)
    .bind(date)
    .bind(time)
    .bind(time)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
pub async fn count_leads(pool: &SqlitePool) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM leads")
        .fetch_one(pool)
        .await
}

/// Overwrites the status and/or admin memo in one statement; `None` leaves
/// the column as it is. Returns false when the lead does not exist.
pub async fn update_lead(
    pool: &SqlitePool,
    id: i64,
    status: Option<&str>,
    admin_memo: Option<&str>,
) -> sqlx::Result<bool> {
    let affected = sqlx::query(
        "UPDATE leads SET status = COALESCE(?, status), admin_memo = COALESCE(?, admin_memo)
         WHERE id = ?",
    )
    .bind(status)
    .bind(admin_memo)
    .bind(id)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(affected > 0)
}

/// Moves a pending lead to confirmed. Returns false if it was not pending.
pub async fn confirm_pending_lead(pool: &SqlitePool, id: i64) -> sqlx::Result<bool> {
    let affected = sqlx::query("UPDATE leads SET status = ? WHERE id = ? AND status = ?")
        .bind(LeadStatus::Confirmed.label())
        .bind(id)
        .bind(LeadStatus::Pending.label())
        .execute(pool)
        .await?
        .rows_affected();
    Ok(affected > 0)
}

pub async fn delete_lead(pool: &SqlitePool, id: i64) -> sqlx::Result<bool> {
    let affected = sqlx::query("DELETE FROM leads WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(affected > 0)
}

// ── Settings ──

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredSetting {
    pub key: String,
    pub value: String,
    pub version: i64,
}

pub async fn get_setting(pool: &SqlitePool, key: &str) -> sqlx::Result<Option<StoredSetting>> {
    sqlx::query_as::<_, StoredSetting>("SELECT key, value, version FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
}

pub async fn all_settings(pool: &SqlitePool) -> sqlx::Result<Vec<StoredSetting>> {
    sqlx::query_as::<_, StoredSetting>("SELECT key, value, version FROM settings ORDER BY key")
        .fetch_all(pool)
        .await
}

/// Upserts a setting and returns its new version.
pub async fn put_setting(pool: &SqlitePool, key: &str, value: &str, updated_at: &str) -> sqlx::Result<i64> {
    sqlx::query_scalar(
        "INSERT INTO settings (key, value, version, updated_at) VALUES (?, ?, 1, ?)
         ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            version = settings.version + 1,
            updated_at = excluded.updated_at
         RETURNING version",
    )
    .bind(key)
    .bind(value)
    .bind(updated_at)
    .fetch_one(pool)
    .await
}

// ── Tests ──

/// Single-connection in-memory database with the schema applied.
#[cfg(test)]
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}
