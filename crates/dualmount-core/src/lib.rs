#![forbid(unsafe_code)]

//! Dual-mount core
//!
//! Data model for the sacred mount system: anchor identities and the closed
//! anchor catalog, the per-anchor ownership state machine, the error
//! taxonomy, and the read-only snapshot audit.
//!
//! # Role in dualmount
//! `dualmount-core` has no notion of time, subscribers, or UI lifecycles.
//! `dualmount-runtime` wraps each [`MountSlot`] in a registry with change
//! notification and drives cutovers; `dualmount_doctor` reuses the catalog
//! for its offline source checks.

pub mod anchor;
pub mod audit;
pub mod error;
pub mod slot;

pub use anchor::{AnchorCatalog, AnchorId, AnchorSpec, OwnerRef};
pub use audit::{AuditFinding, AuditReport, Severity, audit_against_catalog, audit_snapshot};
pub use error::{MountError, Result};
pub use slot::{Generation, MountSlot, SlotState};
