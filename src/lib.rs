//! Asynchronous critical-CSS generation service.
//!
//! Requests enter through the HTTP boundary and are serialized through a
//! FIFO single-worker queue that resolves the page's stylesheets, asks an
//! external rendering engine for the above-the-fold rules per viewport, and
//! aggregates the fragments into one minified result. Successful jobs raise
//! a completion event that the boundary turns into a stored result and an
//! optional webhook notification. Failed jobs are logged and dropped without
//! a notification; callers must impose their own timeout to detect them.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
