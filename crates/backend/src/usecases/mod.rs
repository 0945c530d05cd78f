pub mod u501_webhook_receiver;
pub mod u502_csv_upload;
pub mod u503_ingestion_sweep;
pub mod u504_daily_analytics;
