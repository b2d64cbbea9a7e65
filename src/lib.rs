//! # Prometheus Job Scheduler
//!
//! A resource-aware priority job scheduler for accelerator-bound batch work.
//!
//! The scheduler decides which pending job runs next, how much of the device
//! it may take given live hardware pressure, and how failures are retried or
//! abandoned. Executing the work itself is delegated to a [`core::JobExecutor`].
//!
//! ## Core Problem Solved
//!
//! Batch inference on a single GPU has constraints a plain work queue ignores:
//!
//! - **Thermal and memory pressure**: admitting more work while the device is
//!   hot or nearly full causes slowdowns and out-of-memory failures
//! - **Bounded memory**: every running job holds a slice of device memory that
//!   must be reserved up front and released exactly once
//! - **Uneven value**: user-requested and high-quality items should run first,
//!   while nothing may wait forever
//! - **Flaky failures**: transient I/O and timeouts deserve a retry, bad input
//!   does not
//!
//! ## Key Features
//!
//! - **Priority formula**: weighted quality, age, user request, and context
//!   components on a 1–10 scale, with manual overrides, session boosts, and
//!   starvation floors
//! - **Pressure states**: OPTIMAL, NORMAL, THROTTLED, CRITICAL, UNAVAILABLE,
//!   with hysteresis and a throttle multiplier applied to admitted cost
//! - **Capacity ledger**: all-or-nothing reservations keyed by job id
//! - **Retry manager**: immediate, fixed, linear, and exponential backoff with
//!   jitter, cancellation, and per-operation attempt history
//! - **Dispatcher**: concurrent workers that never hand the same job to two
//!   executors
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_job_scheduler::builders::SchedulerBuilder;
//! use prometheus_job_scheduler::config::SchedulerConfig;
//! use prometheus_job_scheduler::core::Job;
//! use prometheus_job_scheduler::infra::StaticTelemetry;
//!
//! let scheduler = SchedulerBuilder::new(my_executor)
//!     .config(SchedulerConfig::load()?)
//!     .telemetry(Arc::new(StaticTelemetry::idle(8_192)))
//!     .build()?;
//! scheduler.start();
//!
//! let id = scheduler
//!     .submit(Job::new("IMG_0042.CR3", now_ms()).with_quality(4.6).with_cost(1_024))
//!     .await?;
//! scheduler.boost_session("shoot-17", 2);
//! scheduler.shutdown().await;
//! ```
//!
//! For complete examples, see:
//! - `tests/scheduler_test.rs` - end-to-end submission and cancellation
//! - `tests/dispatcher_test.rs` - admission under pressure

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions and capacity accounting.
pub mod core;
/// Configuration models for priorities, resources, retries, and dispatch.
pub mod config;
/// Builders to construct the scheduler from configuration.
pub mod builders;
/// Infrastructure adapters for job storage, telemetry, and events.
pub mod infra;
/// API request/response models.
pub mod runtime;
/// Shared utilities.
pub mod util;
