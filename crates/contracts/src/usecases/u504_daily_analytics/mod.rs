pub mod request;
pub mod response;

pub use request::DailyAnalyticsRequest;
pub use response::DailyAnalyticsResponse;
