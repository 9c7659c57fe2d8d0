//! narramine - narrative extraction and analytics pipeline.
//!
//! Converts free-text project narratives into typed, queryable structured
//! records through a rate-limited generative model, with content-addressed
//! deduplication, durable caching, strict schema validation and
//! confidence-gated acceptance, then aggregates the results (themes,
//! co-occurrence, trends, quality rollups) for analysts.

pub mod aggregate;
pub mod cache;
pub mod cli;
pub mod config;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod rate_limit;
pub mod repository;
pub mod validator;
