//! `leadstack-validation` — cross-module validation and relationship queries.
//!
//! Domain modules ask this crate questions like "may this lead be converted
//! into this project" without importing each other. Answers come from a closed
//! rule catalog evaluated over a rebuildable relationship index, and are
//! cached with a TTL so the same decision backs both interactive pre-flight
//! checks and asynchronous event handling.

pub mod relationships;
pub mod rules;
pub mod service;

pub use relationships::{EntityLink, RelationshipService, RelationshipStats};
pub use rules::ValidationRule;
pub use service::{ValidationResult, ValidationService, ValidationStats};
