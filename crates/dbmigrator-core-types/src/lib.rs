//! Core types shared across dbmigrator facilities
//!
//! This crate provides foundational types used by both the error and the
//! logging facilities:
//!
//! - **Correlation types**: RunId for tying every log line of one
//!   up/down/redo call together
//! - **Schema constants**: Canonical field keys and event names

pub mod correlation;
pub mod schema;

pub use correlation::RunId;
