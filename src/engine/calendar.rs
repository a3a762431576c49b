// ==========================================
// 生产排程与车间执行引擎 - 工作日历
// ==========================================
// 职责: 工作日判定 (周一至周五), 工作日推进与计数
// ==========================================

use chrono::{Datelike, Days, NaiveDate, Weekday};

/// 是否工作日 (周六/周日休息)
pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// 下一个日历日
pub fn next_day(date: NaiveDate) -> Option<NaiveDate> {
    date.checked_add_days(Days::new(1))
}

/// 不早于 date 的第一个工作日
pub fn first_business_day_on_or_after(date: NaiveDate) -> Option<NaiveDate> {
    let mut current = date;
    while !is_business_day(current) {
        current = next_day(current)?;
    }
    Some(current)
}

/// 从 start (工作日) 起算, 第 n 个工作日 (n=1 即 start 自身)
///
/// start 非工作日时先顺延到工作日
pub fn nth_business_day(start: NaiveDate, n: u32) -> Option<NaiveDate> {
    let mut current = first_business_day_on_or_after(start)?;
    let mut remaining = n.max(1) - 1;
    while remaining > 0 {
        current = first_business_day_on_or_after(next_day(current)?)?;
        remaining -= 1;
    }
    Some(current)
}

/// [start, end] 内的工作日数 (含两端)
pub fn business_days_between(start: NaiveDate, end: NaiveDate) -> u32 {
    if end < start {
        return 0;
    }
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| is_business_day(*d))
        .count() as u32
}

/// 以 hours_per_day 产能消化 hours 所需天数 (不足一天按一天)
pub fn days_needed(hours: f64, hours_per_day: f64) -> u32 {
    if hours_per_day <= 0.0 || !hours.is_finite() || hours <= 0.0 {
        return 1;
    }
    let days = (hours / hours_per_day).ceil();
    if days < 1.0 {
        1
    } else {
        days as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2026-10-23 为周五
    fn friday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 23).unwrap()
    }

    #[test]
    fn test_weekend_is_not_business_day() {
        let fri = friday();
        assert!(is_business_day(fri));
        assert!(!is_business_day(fri + Days::new(1)));
        assert!(!is_business_day(fri + Days::new(2)));
        assert!(is_business_day(fri + Days::new(3)));
    }

    #[test]
    fn test_first_business_day_skips_weekend() {
        let saturday = friday() + Days::new(1);
        let monday = friday() + Days::new(3);
        assert_eq!(first_business_day_on_or_after(saturday), Some(monday));
        assert_eq!(first_business_day_on_or_after(monday), Some(monday));
    }

    #[test]
    fn test_nth_business_day_spans_weekend() {
        let fri = friday();
        assert_eq!(nth_business_day(fri, 1), Some(fri));
        assert_eq!(nth_business_day(fri, 2), Some(fri + Days::new(3)));
        assert_eq!(nth_business_day(fri, 0), Some(fri));
    }

    #[test]
    fn test_business_days_between() {
        let monday = friday() + Days::new(3);
        // 周一 ~ 下周日: 5 个工作日
        assert_eq!(business_days_between(monday, monday + Days::new(6)), 5);
        assert_eq!(business_days_between(monday, monday), 1);
        assert_eq!(business_days_between(monday + Days::new(1), monday), 0);
    }

    #[test]
    fn test_days_needed_rounds_up() {
        assert_eq!(days_needed(10.0, 8.0), 2);
        assert_eq!(days_needed(8.0, 8.0), 1);
        assert_eq!(days_needed(0.5, 8.0), 1);
        assert_eq!(days_needed(16.1, 8.0), 3);
        assert_eq!(days_needed(5.0, 0.0), 1);
    }
}
