//! Slot capacity model and availability queries.
//!
//! Everything here is pure: callers load the slot table and the booking
//! columns of the leads table, and these functions derive booked counts and
//! availability from them. Booked counts are never stored.

use chrono::{Datelike, FixedOffset, NaiveDate, NaiveTime, Utc};
use std::collections::BTreeMap;

use crate::error::{AppError, AppResult};
use crate::models::{
    is_active_label, Booking, DateAvailability, DateStatus, SlotDefinition, SlotUsage,
    TimeAvailability,
};

// ── Clock ──

/// Korea Standard Time offset (UTC+9).
const KST_OFFSET_SECS: i32 = 9 * 3600;

pub fn kst_now() -> chrono::DateTime<FixedOffset> {
    let kst = FixedOffset::east_opt(KST_OFFSET_SECS).expect("UTC+9 is a valid offset");
    Utc::now().with_timezone(&kst)
}

// ── Input parsing ──

pub fn parse_date(raw: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("날짜 형식이 올바르지 않습니다: {}", raw)))
}

/// Accepts `H:MM` or `HH:MM` and returns the canonical `HH:MM` label.
pub fn normalize_time(raw: &str) -> AppResult<String> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map(|t| t.format("%H:%M").to_string())
        .map_err(|_| AppError::validation(format!("시간 형식이 올바르지 않습니다: {}", raw)))
}

/// Parses `YYYY-MM` into the first and last day of that month.
pub fn month_bounds(raw: &str) -> AppResult<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::parse_from_str(&format!("{}-01", raw.trim()), "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("월 형식이 올바르지 않습니다: {}", raw)))?;
    let next = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    let last = next
        .and_then(|d| d.pred_opt())
        .ok_or_else(|| AppError::validation(format!("월 범위를 벗어났습니다: {}", raw)))?;
    Ok((first, last))
}

/// `01012345678` → `010-1234-5678`. Anything that is not exactly eleven
/// digits is kept as typed.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 11 {
        format!("{}-{}-{}", &digits[..3], &digits[3..7], &digits[7..])
    } else {
        raw.trim().to_string()
    }
}

// ── Capacity model ──

/// Active (pending or confirmed) bookings for one slot.
pub fn booked_count(bookings: &[Booking], date: &str, time: &str) -> i64 {
    bookings
        .iter()
        .filter(|b| b.date == date && b.time == time && is_active_label(&b.status))
        .count() as i64
}

/// Disabled slots (capacity 0) are never available.
fn is_available(booked: i64, capacity: i64) -> bool {
    capacity > 0 && booked < capacity
}

/// Outcome of looking up a single slot before accepting a booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotCheck {
    Open { booked: i64, capacity: i64 },
    Full { booked: i64, capacity: i64 },
    Missing,
}

pub fn check_slot(slots: &[SlotDefinition], bookings: &[Booking], date: &str, time: &str) -> SlotCheck {
    times_for_date(slots, bookings, date)
        .into_iter()
        .find(|t| t.time == time)
        .map(|t| {
            if t.available {
                SlotCheck::Open {
                    booked: t.booked,
                    capacity: t.capacity,
                }
            } else {
                SlotCheck::Full {
                    booked: t.booked,
                    capacity: t.capacity,
                }
            }
        })
        .unwrap_or(SlotCheck::Missing)
}

// ── Availability queries ──

/// Every slot defined for `date` with its booked count, ordered by time.
pub fn times_for_date(
    slots: &[SlotDefinition],
    bookings: &[Booking],
    date: &str,
) -> Vec<TimeAvailability> {
    let mut times: Vec<TimeAvailability> = slots
        .iter()
        .filter(|s| s.date == date)
        .map(|s| {
            let booked = booked_count(bookings, &s.date, &s.time);
            TimeAvailability {
                time: s.time.clone(),
                booked,
                capacity: s.capacity,
                available: is_available(booked, s.capacity),
            }
        })
        .collect();
    times.sort_by(|a, b| a.time.cmp(&b.time));
    times
}

/// Per-date status for every date in `[first, last]` that has slots.
///
/// A date is `full` when none of its times can take another booking,
/// `available` when none of its times has an active booking, and `partial`
/// otherwise. Dates without slots are left out.
pub fn dates_for_month(
    slots: &[SlotDefinition],
    bookings: &[Booking],
    first: NaiveDate,
    last: NaiveDate,
) -> Vec<DateAvailability> {
    let first = first.format("%Y-%m-%d").to_string();
    let last = last.format("%Y-%m-%d").to_string();

    let mut by_date: BTreeMap<&str, Vec<&SlotDefinition>> = BTreeMap::new();
    for slot in slots {
        if slot.date.as_str() >= first.as_str() && slot.date.as_str() <= last.as_str() {
            by_date.entry(slot.date.as_str()).or_default().push(slot);
        }
    }

    by_date
        .into_iter()
        .map(|(date, day_slots)| {
            let mut any_open = false;
            let mut any_booked = false;
            for slot in day_slots {
                let booked = booked_count(bookings, date, &slot.time);
                any_open |= is_available(booked, slot.capacity);
                any_booked |= booked > 0;
            }
            let status = if !any_open {
                DateStatus::Full
            } else if !any_booked {
                DateStatus::Available
            } else {
                DateStatus::Partial
            };
            DateAvailability {
                date: date.to_string(),
                status,
            }
        })
        .collect()
}

/// Admin overview: every slot with its capacity and booked count.
pub fn slot_table(slots: &[SlotDefinition], bookings: &[Booking]) -> Vec<SlotUsage> {
    let mut table: Vec<SlotUsage> = slots
        .iter()
        .map(|s| SlotUsage {
            date: s.date.clone(),
            time: s.time.clone(),
            capacity: s.capacity,
            booked_count: booked_count(bookings, &s.date, &s.time),
        })
        .collect();
    table.sort_by(|a, b| (&a.date, &a.time).cmp(&(&b.date, &b.time)));
    table
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(date: &str, time: &str, capacity: i64) -> SlotDefinition {
        SlotDefinition::new(date, time, capacity)
    }

    fn booking(date: &str, time: &str, status: &str) -> Booking {
        Booking {
            date: date.to_string(),
            time: time.to_string(),
            status: status.to_string(),
        }
    }

    fn feb() -> (NaiveDate, NaiveDate) {
        month_bounds("2026-02").unwrap()
    }

    // ── parsing ──

    #[test]
    fn test_normalize_phone_eleven_digits() {
        assert_eq!(normalize_phone("01012345678"), "010-1234-5678");
        assert_eq!(normalize_phone("010 1234 5678"), "010-1234-5678");
        assert_eq!(normalize_phone("010-1234-5678"), "010-1234-5678");
    }

    #[test]
    fn test_normalize_phone_passthrough() {
        assert_eq!(normalize_phone(" 02-123-4567 "), "02-123-4567");
        assert_eq!(normalize_phone("+82 10 1234 5678"), "+82 10 1234 5678");
    }

    #[test]
    fn test_normalize_time_pads_hour() {
        assert_eq!(normalize_time("9:00").unwrap(), "09:00");
        assert_eq!(normalize_time(" 14:30 ").unwrap(), "14:30");
        assert!(normalize_time("25:00").is_err());
        assert!(normalize_time("noon").is_err());
    }

    #[test]
    fn test_month_bounds() {
        let (first, last) = month_bounds("2026-02").unwrap();
        assert_eq!(first.to_string(), "2026-02-01");
        assert_eq!(last.to_string(), "2026-02-28");
        let (_, dec_last) = month_bounds("2025-12").unwrap();
        assert_eq!(dec_last.to_string(), "2025-12-31");
        assert!(month_bounds("2026-13").is_err());
        assert!(month_bounds("feb").is_err());
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert!(parse_date("2026-02-30").is_err());
        assert!(parse_date("2026/02/01").is_err());
        assert!(parse_date("2026-02-01").is_ok());
    }

    // ── booked_count ──

    #[test]
    fn test_booked_count_only_active_statuses() {
        let bookings = vec![
            booking("2026-02-02", "10:00", "대기"),
            booking("2026-02-02", "10:00", "확정"),
            booking("2026-02-02", "10:00", "거부"),
            booking("2026-02-02", "10:00", "취소"),
            booking("2026-02-02", "14:00", "대기"),
            booking("2026-02-03", "10:00", "대기"),
        ];
        assert_eq!(booked_count(&bookings, "2026-02-02", "10:00"), 2);
        assert_eq!(booked_count(&bookings, "2026-02-02", "14:00"), 1);
        assert_eq!(booked_count(&bookings, "2026-02-02", "18:00"), 0);
    }

    // ── times_for_date ──

    #[test]
    fn test_times_for_date_empty_when_no_slots() {
        let slots = vec![slot("2026-02-02", "10:00", 2)];
        assert!(times_for_date(&slots, &[], "2026-02-03").is_empty());
    }

    #[test]
    fn test_times_for_date_full_slot_unavailable() {
        let slots = vec![slot("2026-02-01", "14:00", 2), slot("2026-02-01", "10:00", 2)];
        let bookings = vec![
            booking("2026-02-01", "10:00", "대기"),
            booking("2026-02-01", "10:00", "확정"),
        ];
        let times = times_for_date(&slots, &bookings, "2026-02-01");
        assert_eq!(
            times[0],
            TimeAvailability {
                time: "10:00".into(),
                booked: 2,
                capacity: 2,
                available: false,
            }
        );
        assert_eq!(times[1].time, "14:00");
        assert!(times[1].available);
    }

    #[test]
    fn test_times_for_date_disabled_slot_never_available() {
        let slots = vec![slot("2026-02-02", "10:00", 0)];
        let times = times_for_date(&slots, &[], "2026-02-02");
        assert_eq!(times.len(), 1);
        assert!(!times[0].available);
    }

    #[test]
    fn test_cancel_frees_seat() {
        let slots = vec![slot("2026-02-02", "10:00", 1)];
        let mut bookings = vec![booking("2026-02-02", "10:00", "대기")];
        assert!(!times_for_date(&slots, &bookings, "2026-02-02")[0].available);

        bookings[0].status = "취소".into();
        let times = times_for_date(&slots, &bookings, "2026-02-02");
        assert_eq!(times[0].booked, 0);
        assert!(times[0].available);
    }

    // ── check_slot ──

    #[test]
    fn test_check_slot_missing_even_with_leads() {
        let bookings = vec![booking("2026-02-02", "10:00", "대기")];
        assert_eq!(
            check_slot(&[], &bookings, "2026-02-02", "10:00"),
            SlotCheck::Missing
        );
    }

    #[test]
    fn test_check_slot_open_and_full() {
        let slots = vec![slot("2026-02-02", "10:00", 1)];
        assert_eq!(
            check_slot(&slots, &[], "2026-02-02", "10:00"),
            SlotCheck::Open { booked: 0, capacity: 1 }
        );
        let bookings = vec![booking("2026-02-02", "10:00", "확정")];
        assert_eq!(
            check_slot(&slots, &bookings, "2026-02-02", "10:00"),
            SlotCheck::Full { booked: 1, capacity: 1 }
        );
    }

    // ── dates_for_month ──

    #[test]
    fn test_dates_without_bookings_are_available() {
        let slots = vec![
            slot("2026-02-02", "10:00", 2),
            slot("2026-02-02", "14:00", 2),
            slot("2026-02-10", "10:00", 1),
        ];
        let (first, last) = feb();
        let dates = dates_for_month(&slots, &[], first, last);
        assert_eq!(dates.len(), 2);
        assert!(dates.iter().all(|d| d.status == DateStatus::Available));
    }

    #[test]
    fn test_dates_outside_month_omitted() {
        let slots = vec![slot("2026-01-31", "10:00", 2), slot("2026-03-01", "10:00", 2)];
        let (first, last) = feb();
        assert!(dates_for_month(&slots, &[], first, last).is_empty());
    }

    #[test]
    fn test_date_partial_when_one_time_full() {
        let slots = vec![slot("2026-02-02", "10:00", 1), slot("2026-02-02", "14:00", 1)];
        let bookings = vec![booking("2026-02-02", "10:00", "대기")];
        let (first, last) = feb();
        let dates = dates_for_month(&slots, &bookings, first, last);
        assert_eq!(dates[0].status, DateStatus::Partial);
    }

    #[test]
    fn test_date_partial_when_seat_taken_but_not_full() {
        let slots = vec![slot("2026-02-02", "10:00", 3)];
        let bookings = vec![booking("2026-02-02", "10:00", "확정")];
        let (first, last) = feb();
        assert_eq!(
            dates_for_month(&slots, &bookings, first, last)[0].status,
            DateStatus::Partial
        );
    }

    #[test]
    fn test_date_full_when_every_time_at_capacity() {
        let slots = vec![slot("2026-02-02", "10:00", 2), slot("2026-02-02", "14:00", 1)];
        let bookings = vec![
            booking("2026-02-02", "10:00", "대기"),
            booking("2026-02-02", "10:00", "확정"),
            booking("2026-02-02", "14:00", "대기"),
        ];
        let (first, last) = feb();
        assert_eq!(
            dates_for_month(&slots, &bookings, first, last)[0].status,
            DateStatus::Full
        );
    }

    #[test]
    fn test_date_full_when_all_slots_disabled() {
        let slots = vec![slot("2026-02-02", "10:00", 0), slot("2026-02-02", "14:00", 0)];
        let (first, last) = feb();
        assert_eq!(
            dates_for_month(&slots, &[], first, last)[0].status,
            DateStatus::Full
        );
    }

    #[test]
    fn test_rejected_leads_do_not_affect_date_status() {
        let slots = vec![slot("2026-02-02", "10:00", 1)];
        let bookings = vec![booking("2026-02-02", "10:00", "거부")];
        let (first, last) = feb();
        assert_eq!(
            dates_for_month(&slots, &bookings, first, last)[0].status,
            DateStatus::Available
        );
    }

    // ── slot_table ──

    #[test]
    fn test_slot_table_sorted_with_counts() {
        let slots = vec![slot("2026-02-03", "10:00", 2), slot("2026-02-02", "14:00", 2)];
        let bookings = vec![booking("2026-02-03", "10:00", "대기")];
        let table = slot_table(&slots, &bookings);
        assert_eq!(table[0].date, "2026-02-02");
        assert_eq!(table[0].booked_count, 0);
        assert_eq!(table[1].booked_count, 1);
    }
}
