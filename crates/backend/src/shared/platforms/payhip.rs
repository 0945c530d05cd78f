use async_trait::async_trait;
use contracts::domain::a001_platform_connection::aggregate::PlatformConnection;
use contracts::enums::platform::Platform;
use contracts::shared::normalized_record::NormalizedSaleRecord;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use super::http::{decode_json, pace, send_for_body};
use super::parse::{json_amount, json_bool, json_i64, json_str, json_timestamp};
use super::{AdapterError, FetchPage, PullAdapter, WebhookAdapter, WebhookInterpretation};

const TXN_KEYS: &[&str] = &["transaction_id", "id"];
const TITLE_KEYS: &[&str] = &["product_name", "title"];
const DATE_KEYS: &[&str] = &["date", "created_at"];

/// Payhip sales API: `GET /api/v1/sales?page=N` with the `payhip-api-key` header
pub struct PayhipAdapter {
    client: reqwest::Client,
    base_url: String,
    page_delay: Duration,
}

#[derive(Debug, Deserialize)]
struct SalesPage {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    meta: Option<PageMeta>,
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    #[serde(default)]
    next_page: Option<Value>,
}

impl PayhipAdapter {
    pub fn new(client: reqwest::Client, base_url: &str, page_delay: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_delay,
        }
    }
}

#[async_trait]
impl PullAdapter for PayhipAdapter {
    fn platform(&self) -> Platform {
        Platform::Payhip
    }

    async fn fetch(
        &self,
        connection: &PlatformConnection,
        cursor: Option<&str>,
    ) -> Result<FetchPage, AdapterError> {
        pace(cursor, self.page_delay).await;

        let page = cursor.unwrap_or("1");
        let url = format!("{}/api/v1/sales", self.base_url);
        let request = self
            .client
            .get(&url)
            .query(&[("page", page)])
            .header("payhip-api-key", connection.credential.as_str());

        let body = send_for_body(request).await?;
        parse_sales_page(&body)
    }
}

pub fn parse_sales_page(body: &[u8]) -> Result<FetchPage, AdapterError> {
    let page: SalesPage = decode_json(body, "payhip sales page")?;

    let mut records = Vec::with_capacity(page.data.len());
    for sale in &page.data {
        let Some(record) = sale_record(sale, false) else {
            tracing::warn!("Payhip: skipping sale without product/date: {}", sale);
            continue;
        };
        // A refunded row still books the original sale; the refund nets it out
        let refund = is_refund(sale).then(|| sale_record(sale, true)).flatten();
        records.push(record);
        records.extend(refund);
    }

    let next_cursor = page
        .meta
        .and_then(|m| m.next_page)
        .and_then(|v| match v {
            Value::Number(n) => n.as_i64().map(|p| p.to_string()),
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        });

    Ok(FetchPage {
        records,
        next_cursor,
    })
}

fn is_refund(sale: &Value) -> bool {
    json_bool(sale, "refunded")
        || json_str(sale, &["status"]).is_some_and(|s| s.eq_ignore_ascii_case("refunded"))
}

/// `price` is the total charged for the line, not a unit price
fn sale_record(obj: &Value, refund: bool) -> Option<NormalizedSaleRecord> {
    let title = json_str(obj, TITLE_KEYS)?;
    let occurred_at = json_timestamp(obj, DATE_KEYS)?;
    let amount = json_amount(obj, &["price", "amount"])?;
    let quantity = json_i64(obj, &["quantity"]).unwrap_or(1);
    let currency = json_str(obj, &["currency"]).unwrap_or_else(|| "USD".to_string());
    let txn_id = json_str(obj, TXN_KEYS);

    Some(if refund {
        NormalizedSaleRecord::refund(txn_id, title, quantity, amount, currency, occurred_at, obj.clone())
    } else {
        NormalizedSaleRecord::sale(txn_id, title, quantity, amount, currency, occurred_at, obj.clone())
    })
}

/// Payhip pushes complete sale/refund payloads; they go straight to the ledger
pub struct PayhipWebhook;

impl WebhookAdapter for PayhipWebhook {
    fn platform(&self) -> Platform {
        Platform::Payhip
    }

    fn signature_header(&self) -> &'static str {
        "x-payhip-signature"
    }

    fn delivery_id(&self, body: &[u8]) -> Option<String> {
        let payload: Value = serde_json::from_slice(body).ok()?;
        json_str(&payload, &["delivery_id", "webhook_id"])
    }

    fn interpret(&self, body: &[u8]) -> Result<WebhookInterpretation, AdapterError> {
        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| AdapterError::malformed(format!("payhip payload is not JSON: {}", e)))?;

        let event_type = json_str(&payload, &["event", "type"])
            .unwrap_or_default()
            .to_ascii_lowercase();
        let email = json_str(&payload, &["buyer_email", "email"]).map(|e| e.to_ascii_lowercase());

        let refund = match event_type.as_str() {
            "sale" | "paid" => false,
            "refund" | "refunded" => true,
            "" => return Err(AdapterError::malformed("payhip payload without event type")),
            other => {
                return Ok(WebhookInterpretation::Ignored {
                    event_type: other.to_string(),
                    reason: format!("event '{}' carries no sale", other),
                })
            }
        };

        if !refund {
            if let Some(status) = json_str(&payload, &["status"]) {
                if !status.eq_ignore_ascii_case("completed") && !status.eq_ignore_ascii_case("paid") {
                    return Ok(WebhookInterpretation::Ignored {
                        event_type,
                        reason: format!("sale status '{}' is not completed", status),
                    });
                }
            }
        }

        let record = sale_record(&payload, refund).ok_or_else(|| {
            AdapterError::malformed("payhip sale is missing product name, date or price")
        })?;

        Ok(WebhookInterpretation::Record {
            event_type,
            record,
            attribution_email: email,
        })
    }
}
