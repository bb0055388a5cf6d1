use crate::error::{AppError, QueryFailure};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    #[serde(alias = "d")]
    Days,
    #[default]
    #[serde(alias = "m")]
    Months,
}

impl PeriodKind {
    pub fn unit_label(self, count: u32) -> &'static str {
        match (self, count) {
            (PeriodKind::Days, 1) => "day",
            (PeriodKind::Days, _) => "days",
            (PeriodKind::Months, 1) => "month",
            (PeriodKind::Months, _) => "months",
        }
    }
}

impl FromStr for PeriodKind {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "d" | "day" | "days" => Ok(PeriodKind::Days),
            "m" | "month" | "months" => Ok(PeriodKind::Months),
            other => Err(AppError::Config(format!(
                "Unsupported period kind '{other}'. Use days (d) or months (m)."
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BillingPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub kind: PeriodKind,
    pub count: u32,
}

impl BillingPeriod {
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn describe(&self) -> String {
        format!(
            "{} to {} (last {} {})",
            self.start,
            self.end,
            self.count,
            self.kind.unit_label(self.count)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostRecord {
    pub dimension_key: String,
    pub amount: Decimal,
    pub currency_unit: String,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostEntry {
    pub key: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct AggregatedCosts {
    entries: Vec<CostEntry>,
}

impl AggregatedCosts {
    pub(crate) fn from_entries(entries: Vec<CostEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> Decimal {
        self.entries.iter().map(|e| e.amount).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CostEntry> {
        self.entries.iter()
    }

    // Descending by amount; equal amounts keep first-seen order.
    pub fn sorted_desc(&self) -> Vec<&CostEntry> {
        let mut sorted: Vec<&CostEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| b.amount.cmp(&a.amount));
        sorted
    }

    pub fn sorted_by_key(&self) -> Vec<&CostEntry> {
        let mut sorted: Vec<&CostEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| a.key.cmp(&b.key));
        sorted
    }
}

#[cfg(test)]
impl AggregatedCosts {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &str) -> Option<Decimal> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.amount)
    }

    pub fn to_map(&self) -> std::collections::BTreeMap<String, Decimal> {
        self.entries
            .iter()
            .map(|e| (e.key.clone(), e.amount))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CreditState {
    pub total_available: Decimal,
    pub used_lifetime: Decimal,
    pub remaining: Decimal,
}

impl CreditState {
    pub fn percent_used(&self) -> Decimal {
        if self.total_available <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.used_lifetime
            .checked_div(self.total_available)
            .and_then(|share| share.checked_mul(Decimal::ONE_HUNDRED))
            .unwrap_or(Decimal::ONE_HUNDRED)
            .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditStatus {
    Healthy,
    Monitor,
    Critical,
    Exhausted,
}

impl CreditStatus {
    pub fn as_label(self) -> &'static str {
        match self {
            CreditStatus::Healthy => "HEALTHY",
            CreditStatus::Monitor => "MONITOR",
            CreditStatus::Critical => "CRITICAL",
            CreditStatus::Exhausted => "EXHAUSTED",
        }
    }

    pub fn needs_alert(self) -> bool {
        matches!(self, CreditStatus::Critical | CreditStatus::Exhausted)
    }
}

impl fmt::Display for CreditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Projection {
    pub months_remaining: Decimal,
    pub exhaustion_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunwayOutlook {
    Warning,
    Caution,
    Info,
    Good,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingReport {
    pub period: BillingPeriod,
    pub total_cost: Decimal,
    pub usage_cost: Decimal,
    pub credits_applied: Decimal,
    pub net_cost: Decimal,
    pub credit_state: CreditState,
    pub status: CreditStatus,
    pub monthly_burn_rate: Decimal,
    pub projection: Option<Projection>,
    pub by_service: AggregatedCosts,
    pub by_usage_type: AggregatedCosts,
    pub by_day: AggregatedCosts,
    pub currency: String,
    pub generated_at: DateTime<Utc>,
    pub degraded: Vec<QueryFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub period: BillingPeriod,
    pub usage_cost: Decimal,
    pub credits_applied: Decimal,
    pub net_cost: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditAnalysis {
    pub current_month: PeriodSummary,
    pub trend: PeriodSummary,
    pub trend_months: u32,
    pub top_services: AggregatedCosts,
    pub credit_state: CreditState,
    pub status: CreditStatus,
    pub monthly_burn_rate: Decimal,
    pub projection: Option<Projection>,
    pub currency: String,
    pub generated_at: DateTime<Utc>,
    pub degraded: Vec<QueryFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricTotal {
    pub metric: String,
    pub amount: Option<Decimal>,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub metric_totals: Vec<MetricTotal>,
    pub services: AggregatedCosts,
    pub record_types: AggregatedCosts,
    pub degraded: Vec<QueryFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn costs(pairs: &[(&str, i64)]) -> AggregatedCosts {
        AggregatedCosts::from_entries(
            pairs
                .iter()
                .map(|(k, v)| CostEntry {
                    key: (*k).to_string(),
                    amount: Decimal::from(*v),
                })
                .collect(),
        )
    }

    #[test]
    fn period_kind_parses_short_and_long_forms() {
        assert_eq!("d".parse::<PeriodKind>().unwrap(), PeriodKind::Days);
        assert_eq!("Months".parse::<PeriodKind>().unwrap(), PeriodKind::Months);
        let err = "w".parse::<PeriodKind>().expect_err("expected config error");
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("Unsupported period kind"));
    }

    #[test]
    fn sorted_desc_breaks_ties_by_first_seen_key() {
        let agg = costs(&[("b", 5), ("a", 10), ("c", 5)]);
        let keys: Vec<&str> = agg.sorted_desc().iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn percent_used_is_clamped() {
        let state = CreditState {
            total_available: Decimal::from(100),
            used_lifetime: Decimal::from(250),
            remaining: Decimal::ZERO,
        };
        assert_eq!(state.percent_used(), Decimal::ONE_HUNDRED);

        let partial = CreditState {
            total_available: Decimal::from(5000),
            used_lifetime: Decimal::from(4600),
            remaining: Decimal::from(400),
        };
        assert_eq!(partial.percent_used(), Decimal::from(92));

        let empty = CreditState {
            total_available: Decimal::ZERO,
            used_lifetime: Decimal::from(10),
            remaining: Decimal::ZERO,
        };
        assert_eq!(empty.percent_used(), Decimal::ZERO);
    }
}
