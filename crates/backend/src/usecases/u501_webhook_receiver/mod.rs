pub mod executor;
pub mod signature;

pub use executor::{WebhookOutcome, WebhookReceiver};
