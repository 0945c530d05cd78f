pub mod response;

pub use response::UploadAccepted;
