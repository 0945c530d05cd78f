pub mod a001_platform_connection;
pub mod cron;
pub mod ingestion_jobs;
pub mod p900_sales_ledger;
pub mod p901_daily_sales;
pub mod uploads;
pub mod webhooks;
