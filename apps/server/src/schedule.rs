use chrono::{Datelike, NaiveDate, Weekday};

use crate::booking::{normalize_time, parse_date};
use crate::error::{AppError, AppResult};
use crate::models::{GenerateScheduleRequest, RegenerateScope, SlotDefinition};

/// Longest range a single generation may cover (inclusive days).
pub const MAX_SCHEDULE_DAYS: i64 = 366;

/// Capacity and time list applied to one class of day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayRule {
    pub capacity: i64,
    pub times: Vec<String>,
}

impl DayRule {
    /// Capacity is only checked when the rule produces slots.
    fn new(capacity: i64, times_csv: &str, label: &str) -> AppResult<Self> {
        let times = parse_times(times_csv)?;
        if !times.is_empty() {
            positive_capacity(capacity, label)?;
        }
        Ok(Self { capacity, times })
    }
}

#[derive(Debug, Clone)]
pub struct SchedulePlan {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub weekday: DayRule,
    pub weekend: DayRule,
    pub scope: RegenerateScope,
}

impl SchedulePlan {
    pub fn from_request(req: &GenerateScheduleRequest) -> AppResult<Self> {
        let start = parse_date(&req.start_date)?;
        let end = parse_date(&req.end_date)?;
        if start > end {
            return Err(AppError::validation(
                "시작일은 종료일보다 늦을 수 없습니다",
            ));
        }
        if (end - start).num_days() + 1 > MAX_SCHEDULE_DAYS {
            return Err(AppError::validation(format!(
                "한 번에 최대 {}일까지 생성할 수 있습니다",
                MAX_SCHEDULE_DAYS
            )));
        }

        let weekday = DayRule::new(req.weekday_capacity, &req.weekday_times, "평일")?;
        let weekend = DayRule::new(req.weekend_capacity, &req.weekend_times, "주말")?;
        if weekday.times.is_empty() && weekend.times.is_empty() {
            return Err(AppError::validation("예약 시간을 하나 이상 입력해주세요"));
        }

        Ok(Self {
            start,
            end,
            weekday,
            weekend,
            scope: req.scope,
        })
    }

    pub fn rule_for(&self, date: NaiveDate) -> &DayRule {
        if is_weekend(date) {
            &self.weekend
        } else {
            &self.weekday
        }
    }

    /// Expands the plan into one slot per (day, time), in date then time order.
    pub fn generate(&self) -> Vec<SlotDefinition> {
        let mut slots = Vec::new();
        for day in self.start.iter_days().take_while(|d| *d <= self.end) {
            let rule = self.rule_for(day);
            let date = day.format("%Y-%m-%d").to_string();
            for time in &rule.times {
                slots.push(SlotDefinition::new(&date, time, rule.capacity));
            }
        }
        slots
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn positive_capacity(capacity: i64, label: &str) -> AppResult<i64> {
    if capacity < 1 {
        return Err(AppError::validation(format!(
            "{} 정원은 1 이상이어야 합니다",
            label
        )));
    }
    Ok(capacity)
}

/// `"14:00, 9:30,,14:00"` → `["09:30", "14:00"]`.
pub fn parse_times(csv: &str) -> AppResult<Vec<String>> {
    let mut times = csv
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(normalize_time)
        .collect::<AppResult<Vec<_>>>()?;
    times.sort();
    times.dedup();
    Ok(times)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(start: &str, end: &str) -> GenerateScheduleRequest {
        GenerateScheduleRequest {
            start_date: start.into(),
            end_date: end.into(),
            weekday_capacity: 2,
            weekday_times: "10:00,14:00".into(),
            weekend_capacity: 3,
            weekend_times: "11:00".into(),
            scope: RegenerateScope::All,
        }
    }

    #[test]
    fn test_parse_times_normalizes_and_dedups() {
        assert_eq!(
            parse_times("14:00, 9:30,,14:00").unwrap(),
            vec!["09:30".to_string(), "14:00".to_string()]
        );
        assert!(parse_times("").unwrap().is_empty());
        assert!(parse_times("10:00,lunch").is_err());
    }

    #[test]
    fn test_weekdays_get_weekday_rule() {
        // 2026-02-02 is a Monday, 2026-02-03 a Tuesday
        let plan = SchedulePlan::from_request(&request("2026-02-02", "2026-02-03")).unwrap();
        let slots = plan.generate();
        assert_eq!(
            slots,
            vec![
                SlotDefinition::new("2026-02-02", "10:00", 2),
                SlotDefinition::new("2026-02-02", "14:00", 2),
                SlotDefinition::new("2026-02-03", "10:00", 2),
                SlotDefinition::new("2026-02-03", "14:00", 2),
            ]
        );
    }

    #[test]
    fn test_weekend_split() {
        // Fri 2026-02-06 .. Mon 2026-02-09
        let plan = SchedulePlan::from_request(&request("2026-02-06", "2026-02-09")).unwrap();
        let slots = plan.generate();
        let sat: Vec<_> = slots.iter().filter(|s| s.date == "2026-02-07").collect();
        let sun: Vec<_> = slots.iter().filter(|s| s.date == "2026-02-08").collect();
        assert_eq!(sat.len(), 1);
        assert_eq!(sat[0].capacity, 3);
        assert_eq!(sun[0].time, "11:00");
        assert_eq!(slots.len(), 2 + 1 + 1 + 2);
    }

    #[test]
    fn test_single_day_range() {
        let plan = SchedulePlan::from_request(&request("2026-02-02", "2026-02-02")).unwrap();
        assert_eq!(plan.generate().len(), 2);
    }

    #[test]
    fn test_start_after_end_rejected() {
        let err = SchedulePlan::from_request(&request("2026-02-05", "2026-02-01")).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_range_too_long_rejected() {
        assert!(SchedulePlan::from_request(&request("2026-01-01", "2027-01-02")).is_err());
        assert!(SchedulePlan::from_request(&request("2026-01-01", "2026-12-31")).is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut req = request("2026-02-02", "2026-02-03");
        req.weekend_capacity = 0;
        assert!(SchedulePlan::from_request(&req).is_err());
    }

    #[test]
    fn test_zero_capacity_allowed_without_times() {
        let mut req = request("2026-02-02", "2026-02-08");
        req.weekend_capacity = 0;
        req.weekend_times = String::new();
        let plan = SchedulePlan::from_request(&req).unwrap();
        assert_eq!(plan.generate().len(), 10);

        req.weekday_capacity = -1;
        assert!(SchedulePlan::from_request(&req).is_err());
    }

    #[test]
    fn test_no_times_rejected() {
        let mut req = request("2026-02-02", "2026-02-03");
        req.weekday_times = " ".into();
        req.weekend_times = String::new();
        assert!(SchedulePlan::from_request(&req).is_err());
    }

    #[test]
    fn test_empty_weekend_list_skips_weekends() {
        let mut req = request("2026-02-07", "2026-02-08");
        req.weekend_times = String::new();
        let plan = SchedulePlan::from_request(&req).unwrap();
        assert!(plan.generate().is_empty());
    }
}
