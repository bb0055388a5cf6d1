use crate::config::Credentials;
use crate::error::{AppError, QueryFailure};
use crate::source::sigv4::{self, SigningRequest};
use crate::source::{CostAndUsagePage, CostAndUsageRequest, CostApi};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

const SERVICE: &str = "ce";
const TARGET: &str = "AWSInsightsIndexService.GetCostAndUsage";
const JSON_1_1: &str = "application/x-amz-json-1.1";

pub struct CostExplorerClient {
    client: Client,
    endpoint: Url,
    region: String,
    credentials: Credentials,
}

impl CostExplorerClient {
    pub fn new(
        client: Client,
        endpoint: &str,
        region: &str,
        credentials: Credentials,
    ) -> Result<Self, AppError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| AppError::Config(format!("Invalid cost endpoint '{endpoint}': {e}")))?;
        if endpoint.host_str().is_none() {
            return Err(AppError::Config(format!(
                "Cost endpoint '{endpoint}' has no host."
            )));
        }
        Ok(Self {
            client,
            endpoint,
            region: region.to_string(),
            credentials,
        })
    }

    pub fn default_endpoint(region: &str) -> String {
        format!("https://ce.{region}.amazonaws.com/")
    }

    fn host_header(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    fn describe_error(status: reqwest::StatusCode, body: &str) -> String {
        let Ok(parsed) = serde_json::from_str::<Value>(body) else {
            return format!("HTTP {status}");
        };
        let kind = parsed
            .get("__type")
            .and_then(Value::as_str)
            .map(|t| t.rsplit('#').next().unwrap_or(t));
        let message = parsed
            .get("message")
            .or_else(|| parsed.get("Message"))
            .and_then(Value::as_str);
        match (kind, message) {
            (Some(kind), Some(message)) => format!("HTTP {status}: {kind}: {message}"),
            (Some(kind), None) => format!("HTTP {status}: {kind}"),
            (None, Some(message)) => format!("HTTP {status}: {message}"),
            (None, None) => format!("HTTP {status}"),
        }
    }
}

#[async_trait]
impl CostApi for CostExplorerClient {
    fn name(&self) -> &'static str {
        "cost-explorer"
    }

    async fn get_cost_and_usage(
        &self,
        request: &CostAndUsageRequest,
    ) -> Result<CostAndUsagePage, AppError> {
        let body = serde_json::to_vec(request)?;
        let host = self.host_header();
        let headers = [("content-type", JSON_1_1), ("x-amz-target", TARGET)];
        let signed = sigv4::sign(
            &self.credentials,
            &self.region,
            SERVICE,
            &SigningRequest {
                method: "POST",
                host: &host,
                path: self.endpoint.path(),
                query: "",
                headers: &headers,
                payload: &body,
            },
            Utc::now(),
        )?;

        let mut req = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, JSON_1_1)
            .header("x-amz-target", TARGET)
            .body(body);
        for (name, value) in signed {
            req = req.header(name, value);
        }

        debug!(
            granularity = ?request.granularity,
            metric = request.metric().as_str(),
            group_by = ?request.group_by.first().map(|g| g.key),
            start = %request.time_period.start,
            end = %request.time_period.end,
            "GetCostAndUsage"
        );

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Query(QueryFailure::new(
                "GetCostAndUsage",
                Self::describe_error(status, &text),
            )));
        }

        let text = response.text().await?;
        let page: CostAndUsagePage = serde_json::from_str(&text)?;
        Ok(page)
    }
}
