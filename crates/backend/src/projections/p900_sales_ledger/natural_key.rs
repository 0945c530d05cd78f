use contracts::enums::platform::Platform;
use contracts::shared::normalized_record::NormalizedSaleRecord;
use sha2::{Digest, Sha256};

/// Stable idempotency key of a record within (tenant, platform).
///
/// With a platform transaction id: `txn:<kind>:<id>`, so a sale and its
/// refund never collapse into one row. Without one: `fp:<sha256>` over
/// tenant, platform, occurrence time, amount, quantity and a hash of the
/// raw row.
pub fn natural_key(tenant_id: &str, platform: Platform, record: &NormalizedSaleRecord) -> String {
    let txn_id = record
        .platform_txn_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());

    match txn_id {
        Some(id) => format!("txn:{}:{}", record.kind.as_str(), id),
        None => format!("fp:{}", fingerprint(tenant_id, platform, record)),
    }
}

fn fingerprint(tenant_id: &str, platform: Platform, record: &NormalizedSaleRecord) -> String {
    let mut raw = String::new();
    write_canonical(&record.raw, &mut raw);

    let mut hasher = Sha256::new();
    hasher.update(tenant_id.as_bytes());
    hasher.update(b"|");
    hasher.update(platform.code().as_bytes());
    hasher.update(b"|");
    hasher.update(record.occurred_at.to_rfc3339().as_bytes());
    hasher.update(b"|");
    hasher.update(record.amount.normalized().to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(record.quantity.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(sha256_hex(raw.as_bytes()).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// JSON with object keys sorted at every level
fn write_canonical(value: &serde_json::Value, out: &mut String) {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::{TimeZone, Utc};
    use std::str::FromStr;

    fn record(txn: Option<&str>, amount: &str, raw: serde_json::Value) -> NormalizedSaleRecord {
        NormalizedSaleRecord::sale(
            txn.map(|s| s.to_string()),
            "Book",
            1,
            BigDecimal::from_str(amount).unwrap(),
            "USD",
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            raw,
        )
    }

    #[test]
    fn test_txn_key_includes_kind() {
        let sale = record(Some("abc"), "4.99", serde_json::json!({}));
        let mut refund = sale.clone();
        refund.kind = contracts::shared::normalized_record::SaleKind::Refund;

        assert_eq!(natural_key("t", Platform::Gumroad, &sale), "txn:sale:abc");
        assert_eq!(natural_key("t", Platform::Gumroad, &refund), "txn:refund:abc");
    }

    #[test]
    fn test_fingerprint_is_stable_and_scale_insensitive() {
        let a = record(None, "4.99", serde_json::json!({"Title": "Book", "ASIN": "X"}));
        let b = record(None, "4.990", serde_json::json!({"ASIN": "X", "Title": "Book"}));
        let key = natural_key("t", Platform::AmazonKdp, &a);

        assert!(key.starts_with("fp:"));
        assert_eq!(key, natural_key("t", Platform::AmazonKdp, &b));
        assert_ne!(key, natural_key("other", Platform::AmazonKdp, &a));
    }

    #[test]
    fn test_blank_txn_id_falls_back_to_fingerprint() {
        let r = record(Some("  "), "1.00", serde_json::json!({"row": 1}));
        assert!(natural_key("t", Platform::Kobo, &r).starts_with("fp:"));
    }

    #[test]
    fn test_different_titles_do_not_collide() {
        let a = record(None, "2.99", serde_json::json!({"Title": "One"}));
        let b = record(None, "2.99", serde_json::json!({"Title": "Two"}));
        assert_ne!(
            natural_key("t", Platform::Kobo, &a),
            natural_key("t", Platform::Kobo, &b)
        );
    }
}
