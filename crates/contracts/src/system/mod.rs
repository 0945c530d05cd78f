pub mod ingestion_jobs;
