//! Scenario tests for the loader, orchestration and dashboard loading flow
//!
//! - Load cache idempotence under concurrency and URL conflicts
//! - Sentinel engine bound resolution and link ordering
//! - Engine resolution deduplication and joint loading
//! - End-to-end dashboard loading with side-loading and compatibility filtering
