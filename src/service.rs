use crate::aggregation::aggregate;
use crate::config::{AppConfig, Credentials};
use crate::credits::{
    classify, compute_credit_state, compute_net_cost, monthly_burn_rate, project_exhaustion,
};
use crate::error::AppError;
use crate::models::{
    BillingReport, CreditAnalysis, DiagnosticReport, MetricTotal, PeriodKind, PeriodSummary,
};
use crate::period;
use crate::query::CostQueryAdapter;
use crate::source::cost_explorer::CostExplorerClient;
use crate::source::{CostApi, Dimension, Metric};
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::info;

const TREND_MONTHS: u32 = 3;

pub struct BillingService {
    adapter: CostQueryAdapter,
}

impl BillingService {
    pub fn new(api: Box<dyn CostApi>) -> Self {
        Self {
            adapter: CostQueryAdapter::new(api),
        }
    }

    pub fn from_config(cfg: &AppConfig, credentials: Credentials) -> Result<Self, AppError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        let api = CostExplorerClient::new(
            client,
            &cfg.cost_endpoint(),
            &cfg.billing.region,
            credentials,
        )?;
        Ok(Self::new(Box::new(api)))
    }

    async fn summarize(
        &self,
        kind: PeriodKind,
        count: u32,
        now: DateTime<Utc>,
        degraded: &mut Vec<crate::error::QueryFailure>,
    ) -> Result<PeriodSummary, AppError> {
        let period = period::resolve(kind, count, now)?;
        let usage_cost = self
            .adapter
            .query_usage_cost(&period)
            .await
            .collect_into(degraded);
        let credits_applied = self
            .adapter
            .query_credits_applied(&period)
            .await
            .collect_into(degraded);
        Ok(PeriodSummary {
            period,
            usage_cost,
            credits_applied,
            net_cost: compute_net_cost(usage_cost, credits_applied),
        })
    }

    // Only an invalid period fails; query failures leave zeros and are listed in `degraded`.
    pub async fn generate_report(
        &self,
        cfg: &AppConfig,
        now: DateTime<Utc>,
    ) -> Result<BillingReport, AppError> {
        let billing = &cfg.billing;
        let period = period::resolve(billing.period_kind, billing.period_count, now)?;
        info!(start = %period.start, end = %period.end, "generating billing report");

        let mut degraded = Vec::new();
        let adapter = &self.adapter;

        let total_cost = adapter.query_total_cost(&period).await.collect_into(&mut degraded);
        let usage_cost = adapter.query_usage_cost(&period).await.collect_into(&mut degraded);
        let credits_applied = adapter
            .query_credits_applied(&period)
            .await
            .collect_into(&mut degraded);
        let used_lifetime = adapter
            .query_lifetime_credits_used(now)
            .await
            .collect_into(&mut degraded);

        let services = adapter
            .query_costs_by_dimension(&period, Dimension::Service)
            .await
            .collect_into(&mut degraded);
        let usage_types = adapter
            .query_costs_by_dimension(&period, Dimension::UsageType)
            .await
            .collect_into(&mut degraded);
        let days = adapter
            .query_daily_costs(&period)
            .await
            .collect_into(&mut degraded);

        let credit_state = compute_credit_state(billing.total_credits, used_lifetime);
        let burn_rate = monthly_burn_rate(credits_applied, period.days());
        let status = classify(credit_state.remaining);

        let report = BillingReport {
            period,
            total_cost,
            usage_cost,
            credits_applied,
            net_cost: compute_net_cost(usage_cost, credits_applied),
            credit_state,
            status,
            monthly_burn_rate: burn_rate,
            projection: project_exhaustion(credit_state.remaining, burn_rate, now.date_naive()),
            by_service: aggregate(&services, billing.min_cost_threshold),
            by_usage_type: aggregate(&usage_types, billing.min_cost_threshold),
            by_day: aggregate(&days, billing.min_cost_threshold),
            currency: billing.currency.clone(),
            generated_at: now,
            degraded,
        };

        info!(
            total_cost = %report.total_cost,
            net_cost = %report.net_cost,
            remaining = %report.credit_state.remaining,
            status = %report.status,
            failed_queries = report.degraded.len(),
            "billing report ready"
        );
        Ok(report)
    }

    pub async fn analyze_credits(
        &self,
        cfg: &AppConfig,
        now: DateTime<Utc>,
    ) -> Result<CreditAnalysis, AppError> {
        let billing = &cfg.billing;
        let mut degraded = Vec::new();

        let current_month = self
            .summarize(PeriodKind::Months, 1, now, &mut degraded)
            .await?;
        let trend = self
            .summarize(PeriodKind::Months, TREND_MONTHS, now, &mut degraded)
            .await?;
        let top_services = self
            .adapter
            .query_costs_by_dimension(&trend.period, Dimension::Service)
            .await
            .collect_into(&mut degraded);
        let used_lifetime = self
            .adapter
            .query_lifetime_credits_used(now)
            .await
            .collect_into(&mut degraded);

        let credit_state = compute_credit_state(billing.total_credits, used_lifetime);
        let burn_rate = monthly_burn_rate(current_month.credits_applied, current_month.period.days());

        Ok(CreditAnalysis {
            current_month,
            trend,
            trend_months: TREND_MONTHS,
            top_services: aggregate(&top_services, billing.min_cost_threshold),
            credit_state,
            status: classify(credit_state.remaining),
            monthly_burn_rate: burn_rate,
            projection: project_exhaustion(credit_state.remaining, burn_rate, now.date_naive()),
            currency: billing.currency.clone(),
            generated_at: now,
            degraded,
        })
    }

    pub async fn diagnose(&self, now: DateTime<Utc>) -> DiagnosticReport {
        let (start, end) = period::previous_calendar_month(now.date_naive());
        let mut degraded = Vec::new();

        let mut metric_totals = Vec::new();
        for metric in [Metric::UnblendedCost, Metric::BlendedCost, Metric::AmortizedCost] {
            let queried = self.adapter.query_metric_total(start, end, metric).await;
            let failed = queried.failure.is_some();
            let (amount, unit) = queried.collect_into(&mut degraded);
            metric_totals.push(MetricTotal {
                metric: metric.as_str().to_string(),
                amount: (!failed).then_some(amount),
                unit,
            });
        }

        let services = self
            .adapter
            .query_group_totals(start, end, Dimension::Service, Metric::UnblendedCost)
            .await
            .collect_into(&mut degraded);
        let record_types = self
            .adapter
            .query_group_totals(start, end, Dimension::RecordType, Metric::UnblendedCost)
            .await
            .collect_into(&mut degraded);

        DiagnosticReport {
            start,
            end,
            metric_totals,
            services: aggregate(&services, Decimal::MIN),
            record_types: aggregate(&record_types, Decimal::MIN),
            degraded,
        }
    }
}
