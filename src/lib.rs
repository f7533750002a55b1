//! # calcq
//!
//! Evaluates arithmetic expressions on an elastic pool of workers. The pool
//! size and a per-character simulated latency both come from a live,
//! editable key/value configuration.

pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod http;
pub mod model;
pub mod telemetry;
