pub mod p900_sales_ledger;
pub mod p901_daily_sales;
