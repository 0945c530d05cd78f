pub mod response;

pub use response::{WebhookAck, WebhookRejection};
