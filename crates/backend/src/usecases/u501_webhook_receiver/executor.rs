use anyhow::Result;
use axum::http::HeaderMap;
use contracts::domain::a002_webhook_event::aggregate::DeliveryStatus;
use contracts::enums::platform::Platform;
use contracts::system::ingestion_jobs::{IngestionJobId, JobPayload};
use contracts::usecases::u501_webhook_receiver::WebhookAck;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use super::signature;
use crate::domain::a002_webhook_event::repository as webhook_events;
use crate::domain::a003_tenant_profile::repository as tenants;
use crate::projections::p900_sales_ledger::natural_key::sha256_hex;
use crate::projections::p900_sales_ledger::repository as ledger;
use crate::shared::config::WebhooksConfig;
use crate::shared::platforms::{AdapterRegistry, WebhookAdapter, WebhookInterpretation};
use crate::system::ingestion::JobQueue;

/// How one delivery ended. Duplicates and unattributed events are
/// outcomes here, not errors: the vendor always gets a 200 for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// 404
    UnknownProvider,
    /// 401, nothing stored
    InvalidSignature(String),
    /// Same delivery id seen before
    AlreadyProcessed,
    Recorded {
        event_id: String,
        tenant_id: String,
    },
    /// Fresh delivery id, but the ledger already has this sale
    DuplicateDelivery {
        event_id: String,
    },
    UnattributedEvent {
        event_id: String,
    },
    FetchEnqueued {
        event_id: String,
        tenant_id: String,
        /// None when a job for the pair was already open
        job_id: Option<IngestionJobId>,
    },
    Ignored {
        event_id: String,
        reason: String,
    },
    Rejected {
        event_id: String,
        reason: String,
    },
}

impl WebhookOutcome {
    /// Body of the 200 answer; None for the 401/404 outcomes
    pub fn ack(&self) -> Option<WebhookAck> {
        let ack = match self {
            Self::UnknownProvider | Self::InvalidSignature(_) => return None,
            Self::AlreadyProcessed => WebhookAck::acknowledged("already processed"),
            Self::Recorded { .. } => WebhookAck::success("sale recorded"),
            Self::DuplicateDelivery { .. } => WebhookAck::acknowledged("sale already recorded"),
            Self::UnattributedEvent { .. } => WebhookAck::acknowledged("no tenant matches this event"),
            Self::FetchEnqueued { job_id: Some(_), .. } => WebhookAck::acknowledged("sync queued"),
            Self::FetchEnqueued { job_id: None, .. } => WebhookAck::acknowledged("sync already queued"),
            Self::Ignored { reason, .. } => WebhookAck::acknowledged(reason.clone()),
            Self::Rejected { .. } => WebhookAck::acknowledged("event rejected"),
        };
        Some(ack)
    }
}

/// Executor для приёма webhook от платформ
pub struct WebhookReceiver {
    db: DatabaseConnection,
    registry: Arc<AdapterRegistry>,
    queue: Arc<JobQueue>,
    secrets: WebhooksConfig,
}

impl WebhookReceiver {
    pub fn new(
        db: DatabaseConnection,
        registry: Arc<AdapterRegistry>,
        queue: Arc<JobQueue>,
        secrets: WebhooksConfig,
    ) -> Self {
        Self {
            db,
            registry,
            queue,
            secrets,
        }
    }

    /// Verify, dedup and apply one delivery.
    ///
    /// Errs only when the dedup row itself cannot be written, so the
    /// vendor retries; anything after that ends as a `rejected` event.
    pub async fn receive(&self, provider: &str, headers: &HeaderMap, body: &[u8]) -> Result<WebhookOutcome> {
        let Some(platform) = Platform::from_code(provider) else {
            return Ok(WebhookOutcome::UnknownProvider);
        };
        let Some(adapter) = self.registry.webhook(platform) else {
            return Ok(WebhookOutcome::UnknownProvider);
        };

        if let Err(reason) = self.check_signature(platform, adapter.as_ref(), headers, body) {
            tracing::warn!("Webhook from {} rejected: {}", platform, reason);
            return Ok(WebhookOutcome::InvalidSignature(reason));
        }

        let delivery_id = delivery_id(platform, adapter.as_ref(), headers, body);
        let raw_payload = String::from_utf8_lossy(body);
        let Some(event_id) =
            webhook_events::insert_if_absent(&self.db, platform, &delivery_id, &raw_payload).await?
        else {
            tracing::info!("Webhook {} delivery {} already seen", platform, delivery_id);
            return Ok(WebhookOutcome::AlreadyProcessed);
        };

        let outcome = match self.apply(platform, adapter.as_ref(), &event_id, body).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let reason = e.to_string();
                tracing::error!("Webhook {} event {} rejected: {}", platform, event_id, reason);
                webhook_events::finish(&self.db, &event_id, DeliveryStatus::Rejected, None, "unknown", Some(&reason))
                    .await?;
                WebhookOutcome::Rejected { event_id, reason }
            }
        };
        Ok(outcome)
    }

    fn check_signature(
        &self,
        platform: Platform,
        adapter: &dyn WebhookAdapter,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<(), String> {
        let Some(secret) = self.secrets.secret_for(platform) else {
            tracing::warn!("No webhook secret for {}; accepting unsigned delivery (mock mode)", platform);
            return Ok(());
        };
        let header = adapter.signature_header();
        let value = headers
            .get(header)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| format!("missing {} header", header))?;
        signature::verify(secret, body, value)
    }

    async fn apply(
        &self,
        platform: Platform,
        adapter: &dyn WebhookAdapter,
        event_id: &str,
        body: &[u8],
    ) -> Result<WebhookOutcome> {
        let interpretation = adapter.interpret(body)?;
        let event_type = interpretation.event_type().to_string();

        match interpretation {
            WebhookInterpretation::Record {
                record,
                attribution_email,
                ..
            } => {
                let Some(tenant_id) = self.resolve_tenant(attribution_email.as_deref()).await? else {
                    return self.unattributed(platform, event_id, &event_type).await;
                };
                let source = format!("webhook:{}", event_id);
                let outcome = ledger::upsert_sales_event(&self.db, &tenant_id, platform, &record, &source).await?;
                if outcome.inserted {
                    webhook_events::finish(
                        &self.db,
                        event_id,
                        DeliveryStatus::Processed,
                        Some(&tenant_id),
                        &event_type,
                        None,
                    )
                    .await?;
                    Ok(WebhookOutcome::Recorded {
                        event_id: event_id.to_string(),
                        tenant_id,
                    })
                } else {
                    webhook_events::finish(
                        &self.db,
                        event_id,
                        DeliveryStatus::Duplicate,
                        Some(&tenant_id),
                        &event_type,
                        Some("sale already in ledger"),
                    )
                    .await?;
                    Ok(WebhookOutcome::DuplicateDelivery {
                        event_id: event_id.to_string(),
                    })
                }
            }
            WebhookInterpretation::FetchRequested { attribution_email, .. } => {
                let Some(tenant_id) = self.resolve_tenant(attribution_email.as_deref()).await? else {
                    return self.unattributed(platform, event_id, &event_type).await;
                };
                let job_id = if self.queue.has_open_job(&tenant_id, platform).await? {
                    None
                } else {
                    Some(self.queue.enqueue(&tenant_id, platform, JobPayload::first_page()).await?)
                };
                let note = match job_id {
                    Some(id) => format!("queued job {}", id.value()),
                    None => "job already open".to_string(),
                };
                webhook_events::finish(
                    &self.db,
                    event_id,
                    DeliveryStatus::Processed,
                    Some(&tenant_id),
                    &event_type,
                    Some(&note),
                )
                .await?;
                Ok(WebhookOutcome::FetchEnqueued {
                    event_id: event_id.to_string(),
                    tenant_id,
                    job_id,
                })
            }
            WebhookInterpretation::Ignored { reason, .. } => {
                webhook_events::finish(&self.db, event_id, DeliveryStatus::Processed, None, &event_type, Some(&reason))
                    .await?;
                Ok(WebhookOutcome::Ignored {
                    event_id: event_id.to_string(),
                    reason,
                })
            }
        }
    }

    async fn resolve_tenant(&self, email: Option<&str>) -> Result<Option<String>> {
        match email {
            Some(email) => tenants::find_tenant_by_email(&self.db, email).await,
            None => Ok(None),
        }
    }

    async fn unattributed(&self, platform: Platform, event_id: &str, event_type: &str) -> Result<WebhookOutcome> {
        tracing::warn!("Webhook {} event {} matches no tenant; kept for audit", platform, event_id);
        webhook_events::finish(
            &self.db,
            event_id,
            DeliveryStatus::Processed,
            None,
            event_type,
            Some("unattributed"),
        )
        .await?;
        Ok(WebhookOutcome::UnattributedEvent {
            event_id: event_id.to_string(),
        })
    }
}

/// Header first, then the payload, then a hash of the body
fn delivery_id(platform: Platform, adapter: &dyn WebhookAdapter, headers: &HeaderMap, body: &[u8]) -> String {
    let provider_header = format!("x-{}-delivery-id", platform.code());
    ["x-delivery-id", provider_header.as_str()]
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| adapter.delivery_id(body))
        .unwrap_or_else(|| sha256_hex(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::data::db::connect_in_memory;
    use crate::shared::platforms::{lulu::LuluWebhook, payhip::PayhipWebhook};
    use axum::http::HeaderValue;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::time::Duration;

    const SECRET: &str = "payhip-secret";
    const SALE: &[u8] = br#"{"event":"sale","transaction_id":"tx-77","buyer_email":"T@Example.com",
        "product_name":"Field Guide","quantity":2,"price":9.98,"currency":"USD",
        "status":"completed","date":"2024-05-01T10:00:00Z"}"#;

    struct Setup {
        db: DatabaseConnection,
        queue: Arc<JobQueue>,
        receiver: WebhookReceiver,
    }

    async fn setup(with_secret: bool) -> Setup {
        let db = connect_in_memory().await;
        let queue = Arc::new(JobQueue::new(db.clone(), Duration::from_secs(600)));
        let mut registry = AdapterRegistry::new();
        registry.register_webhook(PayhipWebhook);
        registry.register_webhook(LuluWebhook);

        let mut secrets = HashMap::new();
        if with_secret {
            secrets.insert("payhip".to_string(), SECRET.to_string());
        }
        let receiver = WebhookReceiver::new(
            db.clone(),
            Arc::new(registry),
            queue.clone(),
            WebhooksConfig { secrets },
        );
        tenants::upsert(&db, "t1", "t@example.com", Some("Author One")).await.unwrap();
        Setup { db, queue, receiver }
    }

    fn signed(body: &[u8], delivery: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let sig = format!("sha256={}", signature::sign_hex(SECRET, body));
        headers.insert("x-payhip-signature", HeaderValue::from_str(&sig).unwrap());
        if let Some(d) = delivery {
            headers.insert("x-delivery-id", HeaderValue::from_str(d).unwrap());
        }
        headers
    }

    #[tokio::test]
    async fn test_payhip_redelivery_records_one_sale() {
        let s = setup(true).await;

        let first = s.receiver.receive("payhip", &signed(SALE, Some("d-1")), SALE).await.unwrap();
        assert!(matches!(first, WebhookOutcome::Recorded { ref tenant_id, .. } if tenant_id == "t1"));
        assert_eq!(first.ack().unwrap().status, "success");

        let second = s.receiver.receive("payhip", &signed(SALE, Some("d-1")), SALE).await.unwrap();
        assert_eq!(second, WebhookOutcome::AlreadyProcessed);
        assert_eq!(second.ack().unwrap().message, "already processed");

        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let events = ledger::list_range(&s.db, "t1", day, day, None).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].quantity, 2);
        assert_eq!(events[0].amount, BigDecimal::from_str("9.98").unwrap());
        assert!(events[0].source.starts_with("webhook:"));

        let stored = webhook_events::get_by_delivery(&s.db, Platform::Payhip, "d-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, DeliveryStatus::Processed);
        assert_eq!(stored.tenant_id.as_deref(), Some("t1"));
        assert_eq!(webhook_events::list_recent(&s.db, None, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fresh_delivery_id_for_known_sale_is_duplicate() {
        let s = setup(true).await;
        s.receiver.receive("payhip", &signed(SALE, Some("d-1")), SALE).await.unwrap();
        let again = s.receiver.receive("payhip", &signed(SALE, Some("d-2")), SALE).await.unwrap();

        assert!(matches!(again, WebhookOutcome::DuplicateDelivery { .. }));
        assert_eq!(again.ack().unwrap().status, "acknowledged");
        let stored = webhook_events::get_by_delivery(&s.db, Platform::Payhip, "d-2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, DeliveryStatus::Duplicate);
        assert_eq!(ledger::count_for_tenant(&s.db, "t1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delivery_id_falls_back_to_body_hash() {
        let s = setup(true).await;
        s.receiver.receive("payhip", &signed(SALE, None), SALE).await.unwrap();
        let again = s.receiver.receive("payhip", &signed(SALE, None), SALE).await.unwrap();
        assert_eq!(again, WebhookOutcome::AlreadyProcessed);

        let stored = webhook_events::get_by_delivery(&s.db, Platform::Payhip, &sha256_hex(SALE))
            .await
            .unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn test_bad_signature_stores_nothing() {
        let s = setup(true).await;
        let mut headers = signed(b"something else", Some("d-1"));
        let outcome = s.receiver.receive("payhip", &headers, SALE).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::InvalidSignature("signature mismatch".into()));
        assert!(outcome.ack().is_none());

        headers.remove("x-payhip-signature");
        let missing = s.receiver.receive("payhip", &headers, SALE).await.unwrap();
        assert!(matches!(missing, WebhookOutcome::InvalidSignature(ref r) if r.contains("missing")));

        assert!(webhook_events::list_recent(&s.db, None, 10).await.unwrap().is_empty());
        assert_eq!(ledger::count_for_tenant(&s.db, "t1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mock_mode_accepts_unsigned() {
        let s = setup(false).await;
        let outcome = s.receiver.receive("payhip", &HeaderMap::new(), SALE).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Recorded { .. }));
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let s = setup(false).await;
        let headers = HeaderMap::new();
        assert_eq!(
            s.receiver.receive("myspace", &headers, SALE).await.unwrap(),
            WebhookOutcome::UnknownProvider
        );
        // Real platform, but no webhook support
        assert_eq!(
            s.receiver.receive("amazon_kdp", &headers, SALE).await.unwrap(),
            WebhookOutcome::UnknownProvider
        );
    }

    #[tokio::test]
    async fn test_unattributed_sale_is_kept_for_audit() {
        let s = setup(false).await;
        let body = br#"{"event":"sale","transaction_id":"tx-1","buyer_email":"stranger@example.com",
            "product_name":"Guide","quantity":1,"price":5,"status":"completed",
            "date":"2024-05-01T10:00:00Z"}"#;
        let outcome = s.receiver.receive("payhip", &HeaderMap::new(), body).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::UnattributedEvent { .. }));

        let events = webhook_events::list_recent(&s.db, Some(Platform::Payhip), 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, DeliveryStatus::Processed);
        assert_eq!(events[0].note.as_deref(), Some("unattributed"));
        assert!(events[0].tenant_id.is_none());
    }

    #[tokio::test]
    async fn test_incomplete_sale_is_ignored() {
        let s = setup(false).await;
        let body = br#"{"event":"sale","transaction_id":"tx-2","buyer_email":"t@example.com",
            "product_name":"Guide","quantity":1,"price":5,"status":"pending",
            "date":"2024-05-01T10:00:00Z"}"#;
        let outcome = s.receiver.receive("payhip", &HeaderMap::new(), body).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));
        assert_eq!(ledger::count_for_tenant(&s.db, "t1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_rejected_but_acknowledged() {
        let s = setup(false).await;
        let outcome = s.receiver.receive("payhip", &HeaderMap::new(), b"not json").await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Rejected { .. }));
        assert!(outcome.ack().is_some());

        let events = webhook_events::list_recent(&s.db, None, 10).await.unwrap();
        assert_eq!(events[0].status, DeliveryStatus::Rejected);
        assert!(events[0].note.is_some());
    }

    #[tokio::test]
    async fn test_lulu_status_change_queues_single_pull() {
        let s = setup(false).await;
        tenants::upsert(&s.db, "t2", "printer@example.com", None).await.unwrap();
        let body = |n: u32| {
            format!(
                r#"{{"topic":"PRINT_JOB_STATUS_CHANGED","data":{{"id":{},"contact_email":"Printer@example.com"}}}}"#,
                n
            )
        };

        let first = s
            .receiver
            .receive("lulu", &HeaderMap::new(), body(1).as_bytes())
            .await
            .unwrap();
        let job_id = match first {
            WebhookOutcome::FetchEnqueued { job_id: Some(id), ref tenant_id, .. } => {
                assert_eq!(tenant_id, "t2");
                id
            }
            other => panic!("unexpected {:?}", other),
        };
        let job = s.queue.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.platform, Platform::Lulu);
        assert_eq!(job.payload, JobPayload::first_page());

        let second = s
            .receiver
            .receive("lulu", &HeaderMap::new(), body(2).as_bytes())
            .await
            .unwrap();
        assert!(matches!(second, WebhookOutcome::FetchEnqueued { job_id: None, .. }));
    }
}
