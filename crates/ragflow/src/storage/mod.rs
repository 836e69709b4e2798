//! Relational persistence for queries, answers, and the job queue

mod database;

pub use database::{ClaimedJob, Database, JobStatus};
