//! `mergedb` Core
//!
//! This crate provides the fundamental value types shared by the `mergedb`
//! execution crates.
//!
//! # Overview
//!
//! - **Values**: [`Value`] enum holding the typed content of a row column
//! - **Ordering**: [`Value::total_cmp`] for merge comparisons and
//!   [`Value::sql_cmp`] for predicate evaluation
//! - **Errors**: [`CoreError`]
//!
//! # Example
//!
//! ```
//! use std::cmp::Ordering;
//! use mergedb_core::Value;
//!
//! let a = Value::from(1i64);
//! let b = Value::from(2.5f64);
//!
//! // Integers and floats order numerically with each other
//! assert_eq!(a.total_cmp(&b), Ordering::Less);
//!
//! // Null sorts before everything else
//! assert_eq!(Value::Null.total_cmp(&a), Ordering::Less);
//!
//! // SQL comparison with a null is unknown
//! assert_eq!(Value::Null.sql_cmp(&a).unwrap(), None);
//! ```
//!
//! # Modules
//!
//! - [`types`] - Core data types ([`Value`])
//! - [`error`] - Error types ([`CoreError`])

// Deny unwrap in library code to ensure proper error handling
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod types;

pub use error::CoreError;
pub use types::Value;
