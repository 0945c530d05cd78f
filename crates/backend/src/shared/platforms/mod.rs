pub mod csv_report;
pub mod gumroad;
pub mod http;
pub mod lulu;
pub mod parse;
pub mod payhip;

use async_trait::async_trait;
use contracts::domain::a001_platform_connection::aggregate::PlatformConnection;
use chrono::NaiveDate;
use contracts::enums::platform::Platform;
use contracts::shared::normalized_record::NormalizedSaleRecord;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::shared::config::Config;

/// Typed failures every adapter reports; the orchestrator alone decides
/// what each one means for the job.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Credential invalid or expired; needs a human to reconnect
    #[error("credential rejected by platform: {0}")]
    AuthExpired(String),

    /// Timeouts, connection failures, throttling, 5xx
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Input that will never parse; `raw` keeps the offending bytes
    #[error("malformed input: {reason}")]
    MalformedInput {
        reason: String,
        raw: Option<Vec<u8>>,
    },
}

impl AdapterError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        AdapterError::MalformedInput {
            reason: reason.into(),
            raw: None,
        }
    }

    pub fn malformed_with_raw(reason: impl Into<String>, raw: &[u8]) -> Self {
        AdapterError::MalformedInput {
            reason: reason.into(),
            raw: Some(raw.to_vec()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AdapterError::AuthExpired(_) => "auth_expired",
            AdapterError::TransientNetwork(_) => "transient_network_error",
            AdapterError::MalformedInput { .. } => "malformed_input",
        }
    }
}

/// One page of a pull fetch
#[derive(Debug, Clone, Default)]
pub struct FetchPage {
    pub records: Vec<NormalizedSaleRecord>,
    /// Present while more pages remain
    pub next_cursor: Option<String>,
}

/// Result of parsing an uploaded export
#[derive(Debug, Clone, Default)]
pub struct ParseReport {
    pub records: Vec<NormalizedSaleRecord>,
    pub skipped_rows: usize,
    pub warnings: Vec<String>,
}

/// What an inbound webhook asks us to do
#[derive(Debug, Clone)]
pub enum WebhookInterpretation {
    /// The payload carries a complete sale/refund
    Record {
        event_type: String,
        record: NormalizedSaleRecord,
        attribution_email: Option<String>,
    },
    /// "Something changed", go fetch the details
    FetchRequested {
        event_type: String,
        attribution_email: Option<String>,
    },
    /// Valid delivery that carries nothing to ingest
    Ignored { event_type: String, reason: String },
}

impl WebhookInterpretation {
    pub fn event_type(&self) -> &str {
        match self {
            WebhookInterpretation::Record { event_type, .. }
            | WebhookInterpretation::FetchRequested { event_type, .. }
            | WebhookInterpretation::Ignored { event_type, .. } => event_type,
        }
    }
}

/// First day an incremental pull asks for: the last completed sync minus
/// the lookback. `None` until a chain has reached its final page once.
pub fn pull_window_start(connection: &PlatformConnection, lookback: chrono::Duration) -> Option<NaiveDate> {
    connection.synced_at.map(|at| (at - lookback).date_naive())
}

/// Platforms with a paginated sales API
#[async_trait]
pub trait PullAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    async fn fetch(
        &self,
        connection: &PlatformConnection,
        cursor: Option<&str>,
    ) -> Result<FetchPage, AdapterError>;
}

/// Platforms that only offer CSV exports
pub trait UploadAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    fn parse(&self, bytes: &[u8]) -> Result<ParseReport, AdapterError>;
}

/// Platforms that push notifications to us
pub trait WebhookAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Header carrying the HMAC of the raw body
    fn signature_header(&self) -> &'static str;

    /// Delivery id embedded in the payload, if the platform sends one
    fn delivery_id(&self, _body: &[u8]) -> Option<String> {
        None
    }

    fn interpret(&self, body: &[u8]) -> Result<WebhookInterpretation, AdapterError>;
}

/// Реестр адаптеров платформ, собирается один раз при старте
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    pull: HashMap<Platform, Arc<dyn PullAdapter>>,
    upload: HashMap<Platform, Arc<dyn UploadAdapter>>,
    webhook: HashMap<Platform, Arc<dyn WebhookAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every adapter this backend ships, wired from configuration
    pub fn with_defaults(config: &Config) -> anyhow::Result<Self> {
        let client = http::build_client(config.ingestion.http_timeout())?;
        let page_delay = config.ingestion.page_delay();
        let lookback = config.ingestion.pull_lookback();
        let mut registry = Self::new();

        registry.register_pull(gumroad::GumroadAdapter::new(
            client.clone(),
            &config.platforms.gumroad_base_url,
            page_delay,
            lookback,
        ));
        registry.register_pull(payhip::PayhipAdapter::new(
            client.clone(),
            &config.platforms.payhip_base_url,
            page_delay,
        ));
        registry.register_pull(lulu::LuluAdapter::new(
            client,
            &config.platforms.lulu_base_url,
            page_delay,
            lookback,
        ));

        registry.register_webhook(payhip::PayhipWebhook);
        registry.register_webhook(gumroad::GumroadWebhook);
        registry.register_webhook(lulu::LuluWebhook);

        for layout in csv_report::CsvLayout::all() {
            registry.register_upload(csv_report::CsvReportAdapter::new(layout));
        }

        Ok(registry)
    }

    pub fn register_pull<T: PullAdapter + 'static>(&mut self, adapter: T) {
        self.pull.insert(adapter.platform(), Arc::new(adapter));
    }

    pub fn register_upload<T: UploadAdapter + 'static>(&mut self, adapter: T) {
        self.upload.insert(adapter.platform(), Arc::new(adapter));
    }

    pub fn register_webhook<T: WebhookAdapter + 'static>(&mut self, adapter: T) {
        self.webhook.insert(adapter.platform(), Arc::new(adapter));
    }

    pub fn pull(&self, platform: Platform) -> Option<Arc<dyn PullAdapter>> {
        self.pull.get(&platform).cloned()
    }

    pub fn upload(&self, platform: Platform) -> Option<Arc<dyn UploadAdapter>> {
        self.upload.get(&platform).cloned()
    }

    pub fn webhook(&self, platform: Platform) -> Option<Arc<dyn WebhookAdapter>> {
        self.webhook.get(&platform).cloned()
    }
}
