use serde::{de::DeserializeOwned, Serialize};
use std::hash::Hash;

/// Identifier of an aggregate that travels as a string (URLs, DB columns)
pub trait AggregateId:
    Clone + Copy + PartialEq + Eq + Hash + Serialize + DeserializeOwned + std::fmt::Debug
{
    fn as_string(&self) -> String;

    fn from_string(s: &str) -> Result<Self, String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::ingestion_jobs::IngestionJobId;

    #[test]
    fn test_job_id_string_round_trip() {
        let id = IngestionJobId::new_v4();
        assert_eq!(IngestionJobId::from_string(&id.as_string()), Ok(id));
        assert!(IngestionJobId::from_string("not-a-uuid").is_err());
    }
}
