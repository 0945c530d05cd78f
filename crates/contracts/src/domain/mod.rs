pub mod a001_platform_connection;
pub mod a002_webhook_event;
pub mod common;
