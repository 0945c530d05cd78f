pub mod executor;

pub use executor::{CsvUploadExecutor, UploadError};
