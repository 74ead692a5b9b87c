//! Mediafetch - fetch a media URL, convert it, and share the result
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod error;
pub mod fetch;
pub mod jobs;
pub mod qr;
pub mod server;
pub mod store;
pub mod tools;
pub mod transcode;
