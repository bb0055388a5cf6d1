use crate::models::{CreditState, CreditStatus, Projection, RunwayOutlook};
use chrono::{Duration, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

const HEALTHY_ABOVE: i64 = 1000;
const MONITOR_ABOVE: i64 = 500;
const DAYS_PER_MONTH: i64 = 30;

pub fn compute_credit_state(total_available: Decimal, used_lifetime: Decimal) -> CreditState {
    CreditState {
        total_available,
        used_lifetime,
        remaining: (total_available - used_lifetime).max(Decimal::ZERO),
    }
}

// credits_applied is signed (credits are negative), so net never exceeds usage.
pub fn compute_net_cost(usage_cost: Decimal, credits_applied: Decimal) -> Decimal {
    usage_cost + credits_applied
}

pub fn monthly_burn_rate(credits_applied: Decimal, period_days: i64) -> Decimal {
    if period_days <= 0 {
        return Decimal::ZERO;
    }
    credits_applied
        .abs()
        .checked_mul(Decimal::from(DAYS_PER_MONTH))
        .and_then(|scaled| scaled.checked_div(Decimal::from(period_days)))
        .unwrap_or(Decimal::MAX)
}

pub fn project_exhaustion(
    remaining: Decimal,
    monthly_burn_rate: Decimal,
    today: NaiveDate,
) -> Option<Projection> {
    if monthly_burn_rate <= Decimal::ZERO {
        return None;
    }

    let months_remaining = remaining.max(Decimal::ZERO).checked_div(monthly_burn_rate)?;
    let exhaustion_date = months_remaining
        .checked_mul(Decimal::from(DAYS_PER_MONTH))
        .and_then(|days| days.round().to_i64())
        .and_then(|days| today.checked_add_signed(Duration::try_days(days)?))
        .unwrap_or(NaiveDate::MAX);

    Some(Projection {
        months_remaining,
        exhaustion_date,
    })
}

pub fn classify(remaining: Decimal) -> CreditStatus {
    if remaining > Decimal::from(HEALTHY_ABOVE) {
        CreditStatus::Healthy
    } else if remaining > Decimal::from(MONITOR_ABOVE) {
        CreditStatus::Monitor
    } else if remaining > Decimal::ZERO {
        CreditStatus::Critical
    } else {
        CreditStatus::Exhausted
    }
}

pub fn runway_outlook(months_remaining: Decimal) -> RunwayOutlook {
    if months_remaining < Decimal::ONE {
        RunwayOutlook::Warning
    } else if months_remaining < Decimal::from(3) {
        RunwayOutlook::Caution
    } else if months_remaining < Decimal::from(6) {
        RunwayOutlook::Info
    } else {
        RunwayOutlook::Good
    }
}

pub fn credit_coverage(usage_cost: Decimal, credits_applied: Decimal) -> Option<Decimal> {
    if usage_cost.abs() < Decimal::new(1, 2) {
        return None;
    }
    let share = credits_applied.abs().checked_div(usage_cost)?;
    Some(
        share
            .checked_mul(Decimal::ONE_HUNDRED)
            .unwrap_or(Decimal::ONE_HUNDRED)
            .min(Decimal::ONE_HUNDRED),
    )
}
