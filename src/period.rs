use crate::error::AppError;
use crate::models::{BillingPeriod, PeriodKind};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

// Months are approximated as 30 days, not calendar months.
const DAYS_PER_MONTH: i64 = 30;

pub fn resolve(kind: PeriodKind, count: u32, now: DateTime<Utc>) -> Result<BillingPeriod, AppError> {
    if count < 1 {
        return Err(AppError::Config(format!(
            "Period count must be at least 1 (got {count})."
        )));
    }

    let span_days = match kind {
        PeriodKind::Days => i64::from(count),
        PeriodKind::Months => i64::from(count) * DAYS_PER_MONTH,
    };

    let end = now.date_naive();
    let start = end
        .checked_sub_signed(Duration::days(span_days))
        .ok_or_else(|| AppError::Config(format!("Period of {span_days} days is out of range.")))?;

    Ok(BillingPeriod {
        start,
        end,
        kind,
        count,
    })
}

pub fn trailing_days(days: u32, now: DateTime<Utc>) -> Result<BillingPeriod, AppError> {
    resolve(PeriodKind::Days, days, now)
}

pub fn previous_calendar_month(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let end = today.with_day(1).unwrap_or(today);
    let start = end
        .pred_opt()
        .and_then(|last| last.with_day(1))
        .unwrap_or(end);
    (start, end)
}
