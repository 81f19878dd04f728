#![forbid(unsafe_code)]

//! Read-only audit of a registry snapshot.
//!
//! The bootstrap runs [`audit_snapshot`] once the registry reports ready and
//! refuses to open the shell if any finding is an error. Operators can run it
//! at any time; it never mutates anything.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::anchor::{AnchorCatalog, AnchorId, OwnerRef};
use crate::slot::{MountSlot, SlotState};

/// How much a finding matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Severity {
    Warning,
    Error,
}

/// A single audit observation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum AuditFinding {
    /// A required anchor has no owner.
    RequiredUnowned { id: AnchorId, state: SlotState },
    /// A slot is mid-swap; never a rest state.
    StuckTransitioning { id: AnchorId, owner: Option<OwnerRef> },
    /// An owner is recorded on a slot that reads as free.
    OwnerOnFreeSlot { id: AnchorId, owner: OwnerRef },
    /// A claimed slot has no owner recorded.
    ClaimedWithoutOwner { id: AnchorId },
    /// The same anchor appears more than once in the snapshot.
    DuplicateAnchor { id: AnchorId },
    /// The catalog declares an anchor the registry does not know.
    MissingFromRegistry { id: AnchorId },
    /// The registry holds an anchor the catalog does not declare.
    Undeclared { id: AnchorId },
}

impl AuditFinding {
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::StuckTransitioning { .. } | Self::Undeclared { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }

    #[must_use]
    pub fn anchor(&self) -> &AnchorId {
        match self {
            Self::RequiredUnowned { id, .. }
            | Self::StuckTransitioning { id, .. }
            | Self::OwnerOnFreeSlot { id, .. }
            | Self::ClaimedWithoutOwner { id }
            | Self::DuplicateAnchor { id }
            | Self::MissingFromRegistry { id }
            | Self::Undeclared { id } => id,
        }
    }
}

impl fmt::Display for AuditFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequiredUnowned { id, state } => {
                write!(f, "required anchor {id} has no owner ({state})")
            }
            Self::StuckTransitioning { id, owner } => match owner {
                Some(owner) => write!(f, "anchor {id} is transitioning away from {owner}"),
                None => write!(f, "anchor {id} is transitioning with no owner"),
            },
            Self::OwnerOnFreeSlot { id, owner } => {
                write!(f, "anchor {id} is free but still records owner {owner}")
            }
            Self::ClaimedWithoutOwner { id } => write!(f, "anchor {id} is claimed by nobody"),
            Self::DuplicateAnchor { id } => write!(f, "anchor {id} appears more than once"),
            Self::MissingFromRegistry { id } => {
                write!(f, "declared anchor {id} is not registered")
            }
            Self::Undeclared { id } => write!(f, "registered anchor {id} is not declared"),
        }
    }
}

/// Result of one audit pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AuditReport {
    pub anchors: usize,
    pub claimed: usize,
    pub findings: Vec<AuditFinding>,
}

impl AuditReport {
    /// True when no finding is an error.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &AuditFinding> {
        self.findings
            .iter()
            .filter(|finding| finding.severity() == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &AuditFinding> {
        self.findings
            .iter()
            .filter(|finding| finding.severity() == Severity::Warning)
    }
}

/// Check the per-slot invariants of a snapshot.
#[must_use]
pub fn audit_snapshot(slots: &[MountSlot]) -> AuditReport {
    let mut report = AuditReport {
        anchors: slots.len(),
        ..AuditReport::default()
    };
    let mut seen: Vec<&AnchorId> = Vec::with_capacity(slots.len());

    for slot in slots {
        if seen.contains(&&slot.id) {
            report
                .findings
                .push(AuditFinding::DuplicateAnchor { id: slot.id.clone() });
            continue;
        }
        seen.push(&slot.id);

        match (slot.state, &slot.owner) {
            (SlotState::Claimed, Some(_)) => report.claimed += 1,
            (SlotState::Claimed, None) => report
                .findings
                .push(AuditFinding::ClaimedWithoutOwner { id: slot.id.clone() }),
            (SlotState::Transitioning, owner) => {
                report.findings.push(AuditFinding::StuckTransitioning {
                    id: slot.id.clone(),
                    owner: owner.clone(),
                })
            }
            (SlotState::Unclaimed | SlotState::Released, Some(owner)) => {
                report.findings.push(AuditFinding::OwnerOnFreeSlot {
                    id: slot.id.clone(),
                    owner: owner.clone(),
                })
            }
            (SlotState::Unclaimed | SlotState::Released, None) => {}
        }

        if slot.required && !(slot.is_claimed() && slot.owner.is_some()) {
            report.findings.push(AuditFinding::RequiredUnowned {
                id: slot.id.clone(),
                state: slot.state,
            });
        }
    }

    report
}

/// [`audit_snapshot`] plus drift between the snapshot and a catalog.
#[must_use]
pub fn audit_against_catalog(slots: &[MountSlot], catalog: &AnchorCatalog) -> AuditReport {
    let mut report = audit_snapshot(slots);
    for id in catalog.ids() {
        if !slots.iter().any(|slot| &slot.id == id) {
            report
                .findings
                .push(AuditFinding::MissingFromRegistry { id: id.clone() });
        }
    }
    for slot in slots {
        if catalog.get(&slot.id).is_none() {
            report
                .findings
                .push(AuditFinding::Undeclared { id: slot.id.clone() });
        }
    }
    report
}
