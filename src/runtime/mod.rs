//! API surface for embedding the scheduler behind a transport.

pub mod api;

pub use api::{
    health, submit_job, Health, JobStatusResponse, JobSubmission, QueueStatusResponse,
};
