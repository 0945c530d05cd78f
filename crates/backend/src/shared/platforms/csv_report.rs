use contracts::enums::platform::Platform;
use contracts::shared::normalized_record::NormalizedSaleRecord;
use serde_json::{Map, Value};

use super::parse::{parse_amount, parse_timestamp, parse_units};
use super::{AdapterError, ParseReport, UploadAdapter};

const GENERIC_TITLE: &[&str] = &["Title", "Book Title", "Product Name", "Product", "Item"];
const GENERIC_UNITS: &[&str] = &["Units", "Quantity", "Qty", "Units Sold", "Net Units Sold"];
const GENERIC_AMOUNT: &[&str] = &[
    "Amount",
    "Earnings",
    "Royalty",
    "Royalties",
    "Revenue",
    "Net Sales",
    "Proceeds",
];
const GENERIC_DATE: &[&str] = &["Date", "Sale Date", "Transaction Date", "Order Date"];
const GENERIC_CURRENCY: &[&str] = &["Currency", "Currency Code"];
const GENERIC_TXN: &[&str] = &["Transaction ID", "Order ID", "Sale ID"];

/// Column aliases of one vendor's sales export
#[derive(Debug, Clone)]
pub struct CsvLayout {
    pub platform: Platform,
    pub title: &'static [&'static str],
    pub units: &'static [&'static str],
    pub amount: &'static [&'static str],
    pub date: &'static [&'static str],
    pub currency: &'static [&'static str],
    pub txn_id: &'static [&'static str],
    pub default_currency: &'static str,
}

impl CsvLayout {
    pub fn for_platform(platform: Platform) -> Option<Self> {
        if !platform.is_upload() {
            return None;
        }
        let layout = match platform {
            Platform::AmazonKdp => CsvLayout {
                platform,
                title: &["Title"],
                units: &["Units Sold", "Net Units Sold", "Net Units"],
                amount: &["Royalties", "Royalty", "Royalty Amount"],
                date: &["Date", "Royalty Date", "Order Date"],
                currency: &["Currency"],
                txn_id: &[],
                default_currency: "USD",
            },
            Platform::AppleBooks => CsvLayout {
                platform,
                title: &["Title"],
                units: &["Quantity", "Units"],
                amount: &["Proceeds", "Partner Share", "Extended Partner Share"],
                date: &["Date", "Sale Date", "Begin Date"],
                currency: &["Currency", "Partner Share Currency"],
                txn_id: &["Transaction ID"],
                default_currency: "USD",
            },
            _ => CsvLayout {
                platform,
                title: GENERIC_TITLE,
                units: GENERIC_UNITS,
                amount: GENERIC_AMOUNT,
                date: GENERIC_DATE,
                currency: GENERIC_CURRENCY,
                txn_id: GENERIC_TXN,
                default_currency: "USD",
            },
        };
        Some(layout)
    }

    /// Layouts of every upload-only platform
    pub fn all() -> Vec<Self> {
        Platform::all()
            .into_iter()
            .filter_map(Self::for_platform)
            .collect()
    }
}

/// Resolved header positions
struct Columns {
    title: usize,
    units: usize,
    amount: usize,
    date: usize,
    currency: Option<usize>,
    txn_id: Option<usize>,
}

fn find_column(headers: &[String], aliases: &[&str]) -> Option<usize> {
    aliases
        .iter()
        .find_map(|alias| headers.iter().position(|h| h.eq_ignore_ascii_case(alias)))
}

pub struct CsvReportAdapter {
    layout: CsvLayout,
}

impl CsvReportAdapter {
    pub fn new(layout: CsvLayout) -> Self {
        Self { layout }
    }

    fn resolve_columns(&self, headers: &[String]) -> Result<Columns, AdapterError> {
        let layout = &self.layout;
        let mut missing = Vec::new();
        let mut required = |name: &str, aliases: &[&str]| {
            let found = find_column(headers, aliases);
            if found.is_none() {
                missing.push(name.to_string());
            }
            found
        };

        let title = required("Title", layout.title);
        let units = required("Units", layout.units);
        let amount = required("Amount", layout.amount);
        let date = required("Date", layout.date);

        match (title, units, amount, date) {
            (Some(title), Some(units), Some(amount), Some(date)) => Ok(Columns {
                title,
                units,
                amount,
                date,
                currency: find_column(headers, layout.currency),
                txn_id: find_column(headers, layout.txn_id),
            }),
            _ => Err(AdapterError::malformed(format!(
                "{} export is missing required columns: {}",
                layout.platform.code(),
                missing.join(", ")
            ))),
        }
    }
}

impl UploadAdapter for CsvReportAdapter {
    fn platform(&self) -> Platform {
        self.layout.platform
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParseReport, AdapterError> {
        let text = String::from_utf8_lossy(bytes);
        // Strip UTF-8 BOM if present
        let text = text.trim_start_matches('\u{FEFF}');

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| AdapterError::malformed(format!("Failed to read CSV headers: {}", e)))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let columns = self.resolve_columns(&headers)?;
        let mut report = ParseReport::default();

        for (index, result) in reader.records().enumerate() {
            // header is line 1
            let line = index + 2;
            let row = match result {
                Ok(r) => r,
                Err(e) => {
                    report.skipped_rows += 1;
                    report.warnings.push(format!("line {}: unreadable row: {}", line, e));
                    continue;
                }
            };

            let field = |i: usize| row.get(i).map(str::trim).filter(|v| !v.is_empty());

            let title = field(columns.title);
            let units = field(columns.units).and_then(parse_units);
            let amount = field(columns.amount).and_then(parse_amount);
            let occurred_at = field(columns.date).and_then(parse_timestamp);

            let (title, units, amount, occurred_at) = match (title, units, amount, occurred_at) {
                (Some(t), Some(u), Some(a), Some(d)) => (t, u, a, d),
                _ => {
                    report.skipped_rows += 1;
                    report.warnings.push(format!(
                        "line {}: missing or unparsable Title/Units/Amount/Date",
                        line
                    ));
                    continue;
                }
            };

            let zero = bigdecimal::BigDecimal::from(0);
            if units == 0 && amount == zero {
                report.skipped_rows += 1;
                report
                    .warnings
                    .push(format!("line {}: no units and no amount", line));
                continue;
            }

            let currency = columns
                .currency
                .and_then(field)
                .unwrap_or(self.layout.default_currency);
            let txn_id = columns.txn_id.and_then(field).map(|s| s.to_string());

            let mut raw = Map::new();
            for (i, header) in headers.iter().enumerate() {
                if let Some(value) = row.get(i) {
                    raw.insert(header.clone(), Value::String(value.to_string()));
                }
            }
            let raw = Value::Object(raw);

            let record = if units < 0 || amount < zero {
                NormalizedSaleRecord::refund(txn_id, title, units, amount, currency, occurred_at, raw)
            } else {
                NormalizedSaleRecord::sale(txn_id, title, units, amount, currency, occurred_at, raw)
            };
            report.records.push(record);
        }

        if report.skipped_rows > 0 {
            tracing::warn!(
                "{} export: {} rows parsed, {} skipped",
                self.layout.platform,
                report.records.len(),
                report.skipped_rows
            );
        }

        Ok(report)
    }
}
