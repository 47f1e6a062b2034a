//! FLIPPER: Grand Exchange flip advisor
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod api;
pub mod config;
pub mod history;
pub mod market;
pub mod scoring;
pub mod storage;
pub mod strategy;
pub mod types;
