pub mod response;

pub use response::SweepResponse;
