//! Pdfbirch Library
//!
//! This library provides the core functionality for the Pdfbirch server,
//! including the sliding-window download quota, identity resolution, filler
//! PDF rendering and the HTTP delivery layer.

pub mod auth;
pub mod config;
pub mod document;
pub mod metrics;
pub mod quota;
pub mod server;
