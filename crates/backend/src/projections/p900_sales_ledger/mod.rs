pub mod natural_key;
pub mod repository;
