use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of ledger event a record produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleKind {
    Sale,
    Refund,
}

impl SaleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleKind::Sale => "sale",
            SaleKind::Refund => "refund",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "sale" => Some(SaleKind::Sale),
            "refund" => Some(SaleKind::Refund),
            _ => None,
        }
    }
}

/// Common record shape every platform adapter produces.
///
/// Refunds carry negative quantity and amount. `raw` is the platform's own
/// row or object, kept only for audit and re-derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSaleRecord {
    pub platform_txn_id: Option<String>,
    pub kind: SaleKind,
    pub title: String,
    pub quantity: i64,
    pub amount: BigDecimal,
    pub currency: String,
    pub occurred_at: DateTime<Utc>,
    pub raw: serde_json::Value,
}

impl NormalizedSaleRecord {
    pub fn sale(
        platform_txn_id: Option<String>,
        title: impl Into<String>,
        quantity: i64,
        amount: BigDecimal,
        currency: impl Into<String>,
        occurred_at: DateTime<Utc>,
        raw: serde_json::Value,
    ) -> Self {
        Self {
            platform_txn_id,
            kind: SaleKind::Sale,
            title: title.into(),
            quantity: quantity.abs(),
            amount: amount.abs(),
            currency: normalize_currency(&currency.into()),
            occurred_at,
            raw,
        }
    }

    pub fn refund(
        platform_txn_id: Option<String>,
        title: impl Into<String>,
        quantity: i64,
        amount: BigDecimal,
        currency: impl Into<String>,
        occurred_at: DateTime<Utc>,
        raw: serde_json::Value,
    ) -> Self {
        Self {
            platform_txn_id,
            kind: SaleKind::Refund,
            title: title.into(),
            quantity: -quantity.abs(),
            amount: -amount.abs(),
            currency: normalize_currency(&currency.into()),
            occurred_at,
            raw,
        }
    }
}

fn normalize_currency(code: &str) -> String {
    let code = code.trim();
    if code.is_empty() {
        "USD".to_string()
    } else {
        code.to_ascii_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_refund_is_always_negative() {
        let now = Utc::now();
        let amount = BigDecimal::from_str("4.99").unwrap();
        let refund = NormalizedSaleRecord::refund(
            None,
            "Book",
            1,
            amount.clone(),
            "usd",
            now,
            serde_json::Value::Null,
        );
        assert_eq!(refund.quantity, -1);
        assert_eq!(refund.amount, -amount.clone());
        assert_eq!(refund.currency, "USD");

        let already_negative =
            NormalizedSaleRecord::refund(None, "Book", -3, -amount.clone(), "EUR", now, serde_json::Value::Null);
        assert_eq!(already_negative.quantity, -3);
        assert_eq!(already_negative.amount, -amount);
    }

    #[test]
    fn test_sale_is_positive_and_defaults_currency() {
        let sale = NormalizedSaleRecord::sale(
            Some("t-1".into()),
            "Book",
            2,
            BigDecimal::from_str("9.98").unwrap(),
            "",
            Utc::now(),
            serde_json::Value::Null,
        );
        assert_eq!(sale.kind, SaleKind::Sale);
        assert_eq!(sale.quantity, 2);
        assert_eq!(sale.currency, "USD");
    }
}
