//! Delayed email scheduling with rate-limited delivery.
//!
//! This crate wires the pieces together: the email record store, the job
//! queue, the sliding-window rate limiter (Redis-backed or in-memory), the
//! scheduler, and the delivery worker pool. The [`controller::Postdate`]
//! struct is deserialized straight from the RON config file and owns the
//! whole runtime.

pub mod controller;
