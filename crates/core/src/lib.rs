//! `leadstack-core` — shared foundation for the cross-module integration layer.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, the closed module/entity catalogs, and the error model.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::{EntityKind, EntityRef, Module};
pub use error::{DomainError, DomainResult};
pub use id::{EntityId, EventId, SagaId, StepId, TenantId, UserId};
