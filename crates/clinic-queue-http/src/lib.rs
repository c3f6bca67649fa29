//! HTTP client for the clinic queueing service.
//!
//! This crate provides a blocking [`HttpQueueService`] that implements the
//! core [`QueueService`](clinic_queue_core::QueueService) seam over the
//! service's REST endpoints.

pub mod client;

pub use client::*;
