#![deny(missing_docs)]

//! Core library for Rusty RFP: a topic-routed agent pipeline that turns an uploaded RFP
//! document into a problem statement, requirements, expectations and a response outline.

/// Pipeline agents and their error type.
pub mod agents;
/// Topic-addressed message bus.
pub mod bus;
/// Environment-driven configuration management.
pub mod config;
/// Chat-completion clients.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Typed payloads exchanged on the bus.
pub mod messages;
/// End-to-end run driver.
pub mod pipeline;
/// Document loading and chunking.
pub mod processing;
/// Per-run model usage accounting.
pub mod usage;
