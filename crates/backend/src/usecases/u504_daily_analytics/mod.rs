pub mod executor;

pub use executor::DailyAnalytics;
