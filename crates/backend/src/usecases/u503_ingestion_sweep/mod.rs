pub mod executor;

pub use executor::IngestionSweep;
