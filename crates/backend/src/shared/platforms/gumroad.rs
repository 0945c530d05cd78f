use async_trait::async_trait;
use contracts::domain::a001_platform_connection::aggregate::PlatformConnection;
use contracts::enums::platform::Platform;
use contracts::shared::normalized_record::NormalizedSaleRecord;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use super::http::{decode_json, pace, send_for_body};
use super::parse::{cents_to_amount, json_bool, json_i64, json_str, json_timestamp};
use super::{
    pull_window_start, AdapterError, FetchPage, PullAdapter, WebhookAdapter, WebhookInterpretation,
};

/// Gumroad sales API: `GET /v2/sales`, paginated by `page_key`. Once a
/// connection has synced, `after` limits the pull to recent sales.
pub struct GumroadAdapter {
    client: reqwest::Client,
    base_url: String,
    page_delay: Duration,
    lookback: chrono::Duration,
}

#[derive(Debug, Deserialize)]
struct SalesPage {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    sales: Vec<Value>,
    #[serde(default)]
    next_page_key: Option<String>,
}

impl GumroadAdapter {
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

    fn sales_query(&self, connection: &PlatformConnection, cursor: Option<&str>) -> Vec<(&'static str, String)> {
        let mut query = vec![("access_token", connection.credential.clone())];
        if let Some(after) = pull_window_start(connection, self.lookback) {
            query.push(("after", after.format("%Y-%m-%d").to_string()));
        }
        if let Some(page_key) = cursor {
            query.push(("page_key", page_key.to_string()));
        }
        query
    }
}

#[async_trait]
impl PullAdapter for GumroadAdapter {
    fn platform(&self) -> Platform {
        Platform::Gumroad
    }

    async fn fetch(
        &self,
        connection: &PlatformConnection,
        cursor: Option<&str>,
    ) -> Result<FetchPage, AdapterError> {
        pace(cursor, self.page_delay).await;

        let url = format!("{}/v2/sales", self.base_url);
        let query = self.sales_query(connection, cursor);

        tracing::debug!(
            "Gumroad: fetching sales for tenant {} (page_key: {:?})",
            connection.tenant_id,
            cursor
        );
        let body = send_for_body(self.client.get(&url).query(&query)).await?;
        parse_sales_page(&body)
    }
}

/// Decode one `/v2/sales` response
pub fn parse_sales_page(body: &[u8]) -> Result<FetchPage, AdapterError> {
    let page: SalesPage = decode_json(body, "gumroad sales page")?;
    if !page.success {
        return Err(AdapterError::malformed_with_raw(
            format!(
                "gumroad reported failure: {}",
                page.message.unwrap_or_else(|| "no message".to_string())
            ),
            body,
        ));
    }

    let mut records = Vec::with_capacity(page.sales.len());
    for sale in &page.sales {
        match sale_to_records(sale) {
            Some(mut recs) => records.append(&mut recs),
            None => tracing::warn!("Gumroad: skipping sale without id/product/date/price: {}", sale),
        }
    }

    Ok(FetchPage {
        records,
        next_cursor: page.next_page_key.filter(|k| !k.is_empty()),
    })
}

/// A refunded sale yields the sale plus its refund; the ledger keys them
/// apart by event kind.
fn sale_to_records(sale: &Value) -> Option<Vec<NormalizedSaleRecord>> {
    let id = json_str(sale, &["id", "sale_id"])?;
    let title = json_str(sale, &["product_name"])?;
    let occurred_at = json_timestamp(sale, &["created_at", "sale_timestamp"])?;
    let cents = json_i64(sale, &["price"])?;
    let quantity = json_i64(sale, &["quantity"]).unwrap_or(1);
    let currency = json_str(sale, &["currency"]).unwrap_or_else(|| "USD".to_string());
    let amount = cents_to_amount(cents);

    let mut out = vec![NormalizedSaleRecord::sale(
        Some(id.clone()),
        title.clone(),
        quantity,
        amount.clone(),
        currency.clone(),
        occurred_at,
        sale.clone(),
    )];
    if json_bool(sale, "refunded") {
        out.push(NormalizedSaleRecord::refund(
            Some(id),
            title,
            quantity,
            amount,
            currency,
            occurred_at,
            sale.clone(),
        ));
    }
    Some(out)
}

/// Gumroad "ping": form-encoded notice, ingested by fetching the sales page
pub struct GumroadWebhook;

impl WebhookAdapter for GumroadWebhook {
    fn platform(&self) -> Platform {
        Platform::Gumroad
    }

    fn signature_header(&self) -> &'static str {
        "x-gumroad-signature"
    }

    fn delivery_id(&self, body: &[u8]) -> Option<String> {
        form_field(body, "sale_id")
            .map(|sale_id| match form_field(body, "refunded").as_deref() {
                Some("true") => format!("{}:refunded", sale_id),
                _ => sale_id,
            })
    }

    fn interpret(&self, body: &[u8]) -> Result<WebhookInterpretation, AdapterError> {
        if form_field(body, "sale_id").is_none() && form_field(body, "resource_name").is_none() {
            return Err(AdapterError::malformed("gumroad ping without sale_id"));
        }
        let event_type = form_field(body, "resource_name").unwrap_or_else(|| "sale".to_string());
        Ok(WebhookInterpretation::FetchRequested {
            event_type,
            attribution_email: form_field(body, "seller_email")
                .or_else(|| form_field(body, "email")),
        })
    }
}

fn form_field(body: &[u8], name: &str) -> Option<String> {
    url::form_urlencoded::parse(body)
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
