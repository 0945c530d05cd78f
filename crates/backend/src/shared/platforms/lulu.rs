use async_trait::async_trait;
use contracts::domain::a001_platform_connection::aggregate::PlatformConnection;
use contracts::enums::platform::Platform;
use contracts::shared::normalized_record::NormalizedSaleRecord;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use super::http::{decode_json, pace, send_for_body};
use super::parse::{json_amount, json_i64, json_str, json_timestamp};
use super::{
    pull_window_start, AdapterError, FetchPage, PullAdapter, WebhookAdapter, WebhookInterpretation,
};

/// Print-job states booked as sales. Lulu still lets a job be cancelled up to
/// and including PRODUCTION_DELAYED, so earlier states are left for a later pull.
const BOOKED_STATUSES: &[&str] = &["PRODUCTION_READY", "IN_PRODUCTION", "SHIPPED"];

/// Lulu print API: `GET /print-jobs/?page=N` with a bearer token. Once a
/// connection has synced, `modified_after` limits the pull to jobs that
/// changed recently (a job turns into a sale on a later status change).
pub struct LuluAdapter {
    client: reqwest::Client,
    base_url: String,
    page_delay: Duration,
    lookback: chrono::Duration,
}

#[derive(Debug, Deserialize)]
struct PrintJobsPage {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    next: Option<String>,
}

impl LuluAdapter {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        page_delay: Duration,
        lookback: chrono::Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_delay,
            lookback,
        }
    }

    fn jobs_query(&self, connection: &PlatformConnection, cursor: Option<&str>) -> Vec<(&'static str, String)> {
        let mut query = vec![("page", cursor.unwrap_or("1").to_string())];
        if let Some(since) = pull_window_start(connection, self.lookback) {
            query.push(("modified_after", since.format("%Y-%m-%d").to_string()));
        }
        query
    }
}

#[async_trait]
impl PullAdapter for LuluAdapter {
    fn platform(&self) -> Platform {
        Platform::Lulu
    }

    async fn fetch(
        &self,
        connection: &PlatformConnection,
        cursor: Option<&str>,
    ) -> Result<FetchPage, AdapterError> {
        pace(cursor, self.page_delay).await;

        let url = format!("{}/print-jobs/", self.base_url);
        let request = self
            .client
            .get(&url)
            .query(&self.jobs_query(connection, cursor))
            .bearer_auth(connection.credential.as_str());

        let body = send_for_body(request).await?;
        parse_print_jobs_page(&body)
    }
}

pub fn parse_print_jobs_page(body: &[u8]) -> Result<FetchPage, AdapterError> {
    let page: PrintJobsPage = decode_json(body, "lulu print-jobs page")?;

    let mut records = Vec::new();
    for job in &page.results {
        let status = job
            .get("status")
            .and_then(|s| json_str(s, &["name"]))
            .unwrap_or_default();
        if !BOOKED_STATUSES.iter().any(|b| status.eq_ignore_ascii_case(b)) {
            tracing::debug!("Lulu: print job not booked yet (status '{}')", status);
            continue;
        }
        let parsed = job_records(job);
        if parsed.is_empty() {
            tracing::warn!("Lulu: print job without usable line items: {}", job);
        }
        records.extend(parsed);
    }

    Ok(FetchPage {
        records,
        next_cursor: page.next.as_deref().and_then(page_from_next_url),
    })
}

/// The `next` link is a full URL; only its `page` parameter is kept
fn page_from_next_url(next: &str) -> Option<String> {
    let parsed = url::Url::parse(next).ok()?;
    let page = parsed
        .query_pairs()
        .find(|(k, _)| k == "page")
        .map(|(_, v)| v.into_owned());
    page
}

/// One record per line item. The job total is attributed to the line when
/// the job has a single line; multi-line jobs need per-line costs.
fn job_records(job: &Value) -> Vec<NormalizedSaleRecord> {
    let Some(job_id) = json_str(job, &["id"]) else {
        return Vec::new();
    };
    let Some(occurred_at) = json_timestamp(job, &["date_created", "created_at"]) else {
        return Vec::new();
    };
    let costs = job.get("costs").cloned().unwrap_or(Value::Null);
    let currency = json_str(&costs, &["currency"]).unwrap_or_else(|| "USD".to_string());
    let job_total = json_amount(&costs, &["total_cost_incl_tax", "total_cost_excl_tax"]);

    let items = match job.get("line_items") {
        Some(Value::Array(items)) => items.as_slice(),
        _ => return Vec::new(),
    };
    let single = items.len() == 1;

    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let title = json_str(item, &["title"])?;
            let quantity = json_i64(item, &["quantity"]).unwrap_or(1);
            let amount = json_amount(item, &["total_cost_incl_tax", "cost"])
                .or_else(|| if single { job_total.clone() } else { None })?;
            let line_id = json_str(item, &["id"]).unwrap_or_else(|| index.to_string());
            Some(NormalizedSaleRecord::sale(
                Some(format!("{}:{}", job_id, line_id)),
                title,
                quantity,
                amount,
                currency.clone(),
                occurred_at,
                job.clone(),
            ))
        })
        .collect()
}

/// Lulu status-change notifications only say "a print job changed"
pub struct LuluWebhook;

impl WebhookAdapter for LuluWebhook {
    fn platform(&self) -> Platform {
        Platform::Lulu
    }

    fn signature_header(&self) -> &'static str {
        "x-lulu-signature"
    }

    fn interpret(&self, body: &[u8]) -> Result<WebhookInterpretation, AdapterError> {
        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| AdapterError::malformed(format!("lulu payload is not JSON: {}", e)))?;
        let topic = json_str(&payload, &["topic"]).unwrap_or_else(|| "unknown".to_string());
        let data = payload.get("data").cloned().unwrap_or(Value::Null);
        let email = json_str(&data, &["contact_email"]).map(|e| e.to_ascii_lowercase());

        if topic.eq_ignore_ascii_case("PRINT_JOB_STATUS_CHANGED") {
            Ok(WebhookInterpretation::FetchRequested {
                event_type: topic,
                attribution_email: email,
            })
        } else {
            Ok(WebhookInterpretation::Ignored {
                reason: format!("topic '{}' not handled", topic),
                event_type: topic,
            })
        }
    }
}
