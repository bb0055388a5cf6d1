use crate::error::AppError;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

pub mod cost_explorer;
pub mod sigv4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Granularity {
    Daily,
    Monthly,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Dimension {
    Service,
    UsageType,
    RecordType,
}

impl Dimension {
    pub fn as_label(self) -> &'static str {
        match self {
            Dimension::Service => "service",
            Dimension::UsageType => "usage type",
            Dimension::RecordType => "record type",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Metric {
    UnblendedCost,
    BlendedCost,
    AmortizedCost,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::UnblendedCost => "UnblendedCost",
            Metric::BlendedCost => "BlendedCost",
            Metric::AmortizedCost => "AmortizedCost",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct DateInterval {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct GroupDefinition {
    #[serde(rename = "Type")]
    pub kind: String,
    pub key: Dimension,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct CostAndUsageRequest {
    pub time_period: DateInterval,
    pub granularity: Granularity,
    pub metrics: Vec<Metric>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<GroupDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

impl CostAndUsageRequest {
    pub fn new(start: NaiveDate, end: NaiveDate, granularity: Granularity, metric: Metric) -> Self {
        Self {
            time_period: DateInterval { start, end },
            granularity,
            metrics: vec![metric],
            group_by: vec![],
            next_page_token: None,
        }
    }

    pub fn grouped_by(mut self, dimension: Dimension) -> Self {
        self.group_by.push(GroupDefinition {
            kind: "DIMENSION".into(),
            key: dimension,
        });
        self
    }

    pub fn metric(&self) -> Metric {
        self.metrics.first().copied().unwrap_or(Metric::UnblendedCost)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct CostAndUsagePage {
    #[serde(default)]
    pub results_by_time: Vec<ResultByTime>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResultByTime {
    pub time_period: DateInterval,
    #[serde(default)]
    pub total: HashMap<String, MetricValue>,
    #[serde(default)]
    pub groups: Vec<Group>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Group {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub metrics: HashMap<String, MetricValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricValue {
    pub amount: String,
    #[serde(default)]
    pub unit: String,
}

impl MetricValue {
    pub fn parse_amount(&self) -> Result<Decimal, String> {
        let raw = self.amount.trim();
        Decimal::from_str(raw)
            .or_else(|_| Decimal::from_scientific(raw))
            .map_err(|_| format!("malformed amount '{}'", self.amount))
    }
}

#[async_trait]
pub trait CostApi: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get_cost_and_usage(
        &self,
        request: &CostAndUsageRequest,
    ) -> Result<CostAndUsagePage, AppError>;
}
