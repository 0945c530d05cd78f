pub mod db;
pub mod upload_storage;
