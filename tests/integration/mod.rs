//! Integration test suite for dagrun.
//!
//! These tests exercise the engine end to end: validating subtask sets
//! into graphs, leveling them into plans, running the plans through the
//! orchestrator, and observing progress through the tracker registry.
//!
//! # Test Categories
//!
//! - `planning`: graph validation, leveling, critical path, estimates
//! - `execution`: level barriers, parallelism bounds, retries, failure
//!   and cancellation semantics
//! - `progress`: counter invariants, notifications, registry lifecycle
//!
//! # CI Compatibility
//!
//! Executors are simulated in-process; no external services are touched,
//! making the suite safe to run in CI environments.


mod execution;
mod planning;
mod progress;
