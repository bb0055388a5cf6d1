use crate::error::{AppError, QueryFailure};
use crate::models::{BillingPeriod, CostRecord};
use crate::period;
use crate::source::{
    CostAndUsageRequest, CostApi, Dimension, Granularity, Metric, ResultByTime,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};

// Cost Explorer only answers reliably for roughly the last 13 months, so
// "lifetime" credit usage is measured over this trailing window.
pub const LIFETIME_LOOKBACK_DAYS: u32 = 400;

pub const CREDIT_RECORD_TYPE: &str = "Credit";
pub const USAGE_RECORD_TYPE: &str = "Usage";

const MAX_PAGES: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct Queried<T> {
    pub value: T,
    pub failure: Option<QueryFailure>,
}

impl<T> Queried<T> {
    fn ok(value: T) -> Self {
        Self {
            value,
            failure: None,
        }
    }

    pub fn collect_into(self, sink: &mut Vec<QueryFailure>) -> T {
        if let Some(failure) = self.failure {
            sink.push(failure);
        }
        self.value
    }
}

pub struct CostQueryAdapter {
    api: Box<dyn CostApi>,
}

impl CostQueryAdapter {
    pub fn new(api: Box<dyn CostApi>) -> Self {
        Self { api }
    }

    async fn fetch_all(&self, request: CostAndUsageRequest) -> Result<Vec<ResultByTime>, AppError> {
        let mut request = request;
        let mut results = Vec::new();
        let mut pages = 0;

        loop {
            let page = self.api.get_cost_and_usage(&request).await?;
            pages += 1;
            results.extend(page.results_by_time);

            match page.next_page_token {
                Some(token) if !token.is_empty() => {
                    if request.next_page_token.as_deref() == Some(token.as_str())
                        || pages >= MAX_PAGES
                    {
                        return Err(AppError::Query(QueryFailure::new(
                            "pagination",
                            format!("{} kept returning page token after {pages} pages", self.api.name()),
                        )));
                    }
                    request.next_page_token = Some(token);
                }
                _ => break,
            }
        }

        debug!(source = self.api.name(), pages, buckets = results.len(), "query complete");
        Ok(results)
    }

    fn settle<T: Default>(&self, query: &str, result: Result<T, AppError>) -> Queried<T> {
        match result {
            Ok(value) => Queried::ok(value),
            Err(err) => {
                let cause = match err {
                    AppError::Query(inner) => inner.cause,
                    other => other.to_string(),
                };
                let failure = QueryFailure::new(query, cause);
                warn!(query, cause = %failure.cause, "cost query failed; continuing with empty data");
                Queried {
                    value: T::default(),
                    failure: Some(failure),
                }
            }
        }
    }

    async fn grouped_records(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        granularity: Granularity,
        metric: Metric,
        dimension: Dimension,
    ) -> Result<Vec<CostRecord>, AppError> {
        let request = CostAndUsageRequest::new(start, end, granularity, metric).grouped_by(dimension);
        let results = self.fetch_all(request).await?;
        normalize_groups(&results, metric)
    }

    async fn total_records(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        granularity: Granularity,
        metric: Metric,
    ) -> Result<Vec<CostRecord>, AppError> {
        let request = CostAndUsageRequest::new(start, end, granularity, metric);
        let results = self.fetch_all(request).await?;
        normalize_totals(&results, metric)
    }

    async fn record_type_sum(
        &self,
        period: &BillingPeriod,
        metric: Metric,
        record_type: &str,
    ) -> Result<Decimal, AppError> {
        let records = self
            .grouped_records(
                period.start,
                period.end,
                Granularity::Monthly,
                metric,
                Dimension::RecordType,
            )
            .await?;
        Ok(records
            .iter()
            .filter(|r| r.dimension_key == record_type)
            .map(|r| r.amount)
            .sum())
    }

    pub async fn query_costs_by_dimension(
        &self,
        period: &BillingPeriod,
        dimension: Dimension,
    ) -> Queried<Vec<CostRecord>> {
        let result = self
            .grouped_records(
                period.start,
                period.end,
                Granularity::Daily,
                Metric::UnblendedCost,
                dimension,
            )
            .await;
        self.settle(&format!("costs by {}", dimension.as_label()), result)
    }

    pub async fn query_daily_costs(&self, period: &BillingPeriod) -> Queried<Vec<CostRecord>> {
        let result = self
            .total_records(
                period.start,
                period.end,
                Granularity::Daily,
                Metric::UnblendedCost,
            )
            .await;
        self.settle("daily costs", result)
    }

    pub async fn query_total_cost(&self, period: &BillingPeriod) -> Queried<Decimal> {
        let result = self
            .total_records(
                period.start,
                period.end,
                Granularity::Monthly,
                Metric::UnblendedCost,
            )
            .await
            .map(|records| records.iter().map(|r| r.amount).sum());
        self.settle("total cost", result)
    }

    pub async fn query_usage_cost(&self, period: &BillingPeriod) -> Queried<Decimal> {
        let result = self
            .record_type_sum(period, Metric::UnblendedCost, USAGE_RECORD_TYPE)
            .await;
        self.settle("usage cost", result)
    }

    // Signed: credits come back negative.
    pub async fn query_credits_applied(&self, period: &BillingPeriod) -> Queried<Decimal> {
        let result = self
            .record_type_sum(period, Metric::AmortizedCost, CREDIT_RECORD_TYPE)
            .await;
        self.settle("credits applied", result)
    }

    pub async fn query_lifetime_credits_used(&self, now: DateTime<Utc>) -> Queried<Decimal> {
        let result = match period::trailing_days(LIFETIME_LOOKBACK_DAYS, now) {
            Ok(window) => self
                .record_type_sum(&window, Metric::AmortizedCost, CREDIT_RECORD_TYPE)
                .await
                .map(|used| used.abs()),
            Err(err) => Err(err),
        };
        self.settle("lifetime credits used", result)
    }

    pub async fn query_metric_total(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        metric: Metric,
    ) -> Queried<(Decimal, String)> {
        let result = self
            .total_records(start, end, Granularity::Monthly, metric)
            .await
            .map(|records| {
                let unit = records
                    .first()
                    .map(|r| r.currency_unit.clone())
                    .unwrap_or_default();
                (records.iter().map(|r| r.amount).sum(), unit)
            });
        self.settle(&format!("{} total", metric.as_str()), result)
    }

    pub async fn query_group_totals(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        dimension: Dimension,
        metric: Metric,
    ) -> Queried<Vec<CostRecord>> {
        let result = self
            .grouped_records(start, end, Granularity::Monthly, metric, dimension)
            .await;
        self.settle(&format!("{} by {}", metric.as_str(), dimension.as_label()), result)
    }
}

fn malformed(cause: String) -> AppError {
    AppError::Query(QueryFailure::new("normalize", format!("malformed response: {cause}")))
}

fn normalize_groups(results: &[ResultByTime], metric: Metric) -> Result<Vec<CostRecord>, AppError> {
    let mut records = Vec::new();
    for result in results {
        for group in &result.groups {
            let value = group.metrics.get(metric.as_str()).ok_or_else(|| {
                malformed(format!("group {:?} has no {} metric", group.keys, metric.as_str()))
            })?;
            records.push(CostRecord {
                dimension_key: group.keys.join(" / "),
                amount: value.parse_amount().map_err(malformed)?,
                currency_unit: value.unit.clone(),
                date: Some(result.time_period.start),
            });
        }
    }
    Ok(records)
}

fn normalize_totals(results: &[ResultByTime], metric: Metric) -> Result<Vec<CostRecord>, AppError> {
    results
        .iter()
        .map(|result| {
            let value = result.total.get(metric.as_str()).ok_or_else(|| {
                malformed(format!(
                    "bucket {} has no {} total",
                    result.time_period.start,
                    metric.as_str()
                ))
            })?;
            Ok(CostRecord {
                dimension_key: result.time_period.start.to_string(),
                amount: value.parse_amount().map_err(malformed)?,
                currency_unit: value.unit.clone(),
                date: Some(result.time_period.start),
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::PeriodKind;
    use crate::source::CostAndUsagePage;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub(crate) struct ScriptedApi {
        pages: Arc<Mutex<VecDeque<Result<Value, String>>>>,
        pub(crate) requests: Arc<Mutex<Vec<CostAndUsageRequest>>>,
    }

    impl ScriptedApi {
        pub(crate) fn with(pages: Vec<Result<Value, String>>) -> Self {
            Self {
                pages: Arc::new(Mutex::new(pages.into())),
                requests: Arc::default(),
            }
        }

        pub(crate) fn seen(&self) -> Vec<CostAndUsageRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CostApi for ScriptedApi {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn get_cost_and_usage(
            &self,
            request: &CostAndUsageRequest,
        ) -> Result<CostAndUsagePage, AppError> {
            self.requests.lock().unwrap().push(request.clone());
            let next = self.pages.lock().unwrap().pop_front();
            match next {
                Some(Ok(body)) => Ok(serde_json::from_value(body)?),
                Some(Err(cause)) => Err(AppError::Query(QueryFailure::new("GetCostAndUsage", cause))),
                None => Err(AppError::Query(QueryFailure::new(
                    "GetCostAndUsage",
                    "no scripted response left",
                ))),
            }
        }
    }

    pub(crate) fn grouped_page(day: &str, metric: &str, groups: &[(&str, &str)]) -> Value {
        let groups: Vec<Value> = groups
            .iter()
            .map(|(key, amount)| {
                json!({
                    "Keys": [key],
                    "Metrics": { metric: { "Amount": amount, "Unit": "USD" } }
                })
            })
            .collect();
        json!({
            "ResultsByTime": [{
                "TimePeriod": { "Start": day, "End": day },
                "Total": {},
                "Groups": groups
            }]
        })
    }

    pub(crate) fn totals_page(metric: &str, buckets: &[(&str, &str)]) -> Value {
        let results: Vec<Value> = buckets
            .iter()
            .map(|(day, amount)| {
                json!({
                    "TimePeriod": { "Start": day, "End": day },
                    "Total": { metric: { "Amount": amount, "Unit": "USD" } },
                    "Groups": []
                })
            })
            .collect();
        json!({ "ResultsByTime": results })
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    fn month() -> BillingPeriod {
        period::resolve(PeriodKind::Months, 1, now()).unwrap()
    }

    fn adapter(api: &ScriptedApi) -> CostQueryAdapter {
        CostQueryAdapter::new(Box::new(api.clone()))
    }

    #[tokio::test]
    async fn dimension_query_normalizes_daily_groups() {
        let api = ScriptedApi::with(vec![Ok(json!({
            "ResultsByTime": [
                {
                    "TimePeriod": { "Start": "2024-05-01", "End": "2024-05-02" },
                    "Groups": [
                        { "Keys": ["Amazon EC2"], "Metrics": { "UnblendedCost": { "Amount": "3.5", "Unit": "USD" } } }
                    ]
                },
                {
                    "TimePeriod": { "Start": "2024-05-02", "End": "2024-05-03" },
                    "Groups": [
                        { "Keys": ["Amazon EC2"], "Metrics": { "UnblendedCost": { "Amount": "1.5", "Unit": "USD" } } }
                    ]
                }
            ]
        }))]);

        let out = adapter(&api)
            .query_costs_by_dimension(&month(), Dimension::Service)
            .await;
        assert!(out.failure.is_none());
        assert_eq!(out.value.len(), 2);
        assert_eq!(out.value[1].dimension_key, "Amazon EC2");
        assert_eq!(out.value[1].amount, Decimal::new(15, 1));
        assert_eq!(out.value[1].date, NaiveDate::from_ymd_opt(2024, 5, 2));

        let seen = api.seen();
        assert_eq!(seen[0].granularity, Granularity::Daily);
        assert_eq!(seen[0].group_by[0].key, Dimension::Service);
    }

    #[tokio::test]
    async fn pages_are_concatenated() {
        let mut first = grouped_page("2024-05-01", "UnblendedCost", &[("S3", "1.0")]);
        first["NextPageToken"] = json!("page-2");
        let second = grouped_page("2024-05-02", "UnblendedCost", &[("S3", "2.0")]);
        let api = ScriptedApi::with(vec![Ok(first), Ok(second)]);

        let out = adapter(&api)
            .query_costs_by_dimension(&month(), Dimension::Service)
            .await;
        assert_eq!(out.value.len(), 2);

        let seen = api.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].next_page_token, None);
        assert_eq!(seen[1].next_page_token.as_deref(), Some("page-2"));
    }

    #[tokio::test]
    async fn repeated_page_token_is_a_failure() {
        let mut page = grouped_page("2024-05-01", "UnblendedCost", &[("S3", "1.0")]);
        page["NextPageToken"] = json!("same");
        let api = ScriptedApi::with(vec![Ok(page.clone()), Ok(page)]);

        let out = adapter(&api)
            .query_costs_by_dimension(&month(), Dimension::Service)
            .await;
        assert!(out.value.is_empty());
        assert!(out.failure.expect("failure").cause.contains("page token"));
    }

    #[tokio::test]
    async fn failed_query_degrades_to_zero() {
        let api = ScriptedApi::with(vec![Err("AccessDenied".into())]);
        let out = adapter(&api).query_total_cost(&month()).await;
        assert_eq!(out.value, Decimal::ZERO);
        let failure = out.failure.expect("failure recorded");
        assert_eq!(failure.query, "total cost");
        assert_eq!(failure.cause, "AccessDenied");
    }

    #[tokio::test]
    async fn malformed_amount_degrades_to_empty() {
        let api = ScriptedApi::with(vec![Ok(grouped_page(
            "2024-05-01",
            "UnblendedCost",
            &[("EC2", "lots")],
        ))]);
        let out = adapter(&api)
            .query_costs_by_dimension(&month(), Dimension::UsageType)
            .await;
        assert!(out.value.is_empty());
        assert!(out.failure.expect("failure").cause.contains("malformed"));
    }

    #[tokio::test]
    async fn total_cost_sums_every_bucket() {
        let api = ScriptedApi::with(vec![Ok(totals_page(
            "UnblendedCost",
            &[("2024-04-01", "10.25"), ("2024-05-01", "4.75")],
        ))]);
        let out = adapter(&api).query_total_cost(&month()).await;
        assert_eq!(out.value, Decimal::from(15));
        assert_eq!(api.seen()[0].granularity, Granularity::Monthly);
    }

    #[tokio::test]
    async fn credits_match_record_type_exactly() {
        let api = ScriptedApi::with(vec![Ok(grouped_page(
            "2024-05-01",
            "AmortizedCost",
            &[
                ("Credit", "-120.0"),
                ("SavingsPlanCredit", "-30.0"),
                ("Usage", "150.0"),
            ],
        ))]);
        let out = adapter(&api).query_credits_applied(&month()).await;
        assert_eq!(out.value, Decimal::from(-120));
        let seen = api.seen();
        assert_eq!(seen[0].metric(), Metric::AmortizedCost);
        assert_eq!(seen[0].group_by[0].key, Dimension::RecordType);
    }

    #[tokio::test]
    async fn usage_cost_reads_usage_record_type() {
        let api = ScriptedApi::with(vec![Ok(grouped_page(
            "2024-05-01",
            "UnblendedCost",
            &[("Credit", "-20.0"), ("Usage", "200.0"), ("Tax", "3.0")],
        ))]);
        let out = adapter(&api).query_usage_cost(&month()).await;
        assert_eq!(out.value, Decimal::from(200));
    }

    #[tokio::test]
    async fn lifetime_credits_use_fixed_lookback_window() {
        let api = ScriptedApi::with(vec![Ok(grouped_page(
            "2023-06-01",
            "AmortizedCost",
            &[("Credit", "-4600.0")],
        ))]);
        let out = adapter(&api).query_lifetime_credits_used(now()).await;
        assert_eq!(out.value, Decimal::from(4600));

        let window = api.seen()[0].time_period;
        assert_eq!(window.end, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!((window.end - window.start).num_days(), 400);
    }

    #[tokio::test]
    async fn daily_costs_are_keyed_by_iso_date() {
        let api = ScriptedApi::with(vec![Ok(totals_page(
            "UnblendedCost",
            &[("2024-05-30", "1.00"), ("2024-05-31", "2.00")],
        ))]);
        let out = adapter(&api).query_daily_costs(&month()).await;
        let keys: Vec<&str> = out.value.iter().map(|r| r.dimension_key.as_str()).collect();
        assert_eq!(keys, vec!["2024-05-30", "2024-05-31"]);
    }

    #[test]
    fn collect_into_moves_failures() {
        let mut sink = Vec::new();
        let value = Queried {
            value: Decimal::from(3),
            failure: Some(QueryFailure::new("total cost", "boom")),
        }
        .collect_into(&mut sink);
        assert_eq!(value, Decimal::from(3));
        assert_eq!(sink.len(), 1);
    }
}
