#![forbid(unsafe_code)]

//! Dual-mount runtime
//!
//! Arbitrates which implementation (legacy or next-gen) may render into each
//! named anchor of an application shell, and sequences the handoff of one
//! anchor at a time without tearing the shell down.
//!
//! # Key Components
//!
//! - [`MountRegistry`] - The anchor ownership table with per-anchor change notification
//! - [`MountBinding`] - A component's claim on one anchor, released on drop
//! - [`DualMountBootstrap`] - Startup gating, audit, and timed cutover/rollback
//! - [`BootstrapConfig`] - Anchor catalog and cutover tuning as data
//! - [`Observable`] - The single-threaded reactive cell everything is built on
//!
//! # Role in dualmount
//! `dualmount-runtime` wraps the state machine from `dualmount-core` in a
//! shared registry and drives it from UI lifecycles. Everything here is
//! single-threaded (`Rc`-based handles) and nothing blocks; time enters only
//! through the `now` arguments of the bootstrap.

pub mod binding;
pub mod bootstrap;
pub mod config;
pub mod reactive;
pub mod registry;

pub use binding::{MountBinding, MountView, YieldPolicy};
pub use bootstrap::{
    BootstrapError, CutoverOutcome, CutoverRecord, CutoverStatus, DualMountBootstrap, ShellGate,
};
pub use config::{BootstrapConfig, ConfigError};
pub use reactive::{Observable, Subscription};
pub use registry::MountRegistry;

pub use dualmount_core::{
    AnchorCatalog, AnchorId, AnchorSpec, AuditFinding, AuditReport, Generation, MountError,
    MountSlot, OwnerRef, SlotState,
};
