use thiserror::Error;

use crate::anchor::{AnchorId, OwnerRef};
use crate::slot::{Generation, SlotState};

pub type Result<T> = std::result::Result<T, MountError>;

/// Every failure a registry, binding, or bootstrap operation can report.
///
/// Only [`MountError::AlreadyRegistered`] (and [`MountError::InvalidAnchorId`]
/// raised while loading the catalog) stop the process from starting; the rest
/// are anchor-local and degrade with a log entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MountError {
    #[error("invalid anchor id {id:?}: {reason}")]
    InvalidAnchorId { id: String, reason: &'static str },

    #[error("anchor {id} already registered with required={existing}, refusing required={requested}")]
    AlreadyRegistered {
        id: AnchorId,
        existing: bool,
        requested: bool,
    },

    #[error("anchor {id} refused claim by {claimant}: {}", describe_holder(.holder.as_ref(), .reserved_for.as_ref(), .state))]
    Conflict {
        id: AnchorId,
        claimant: OwnerRef,
        holder: Option<OwnerRef>,
        reserved_for: Option<OwnerRef>,
        state: SlotState,
    },

    #[error("stale operation on {id}{} at generation {generation} (current {current})", by_owner(.owner.as_ref()))]
    Stale {
        id: AnchorId,
        /// `None` for a forced release, which acts for no owner.
        owner: Option<OwnerRef>,
        generation: Generation,
        current: Generation,
    },

    #[error("unknown anchor: {id}")]
    UnknownAnchor { id: AnchorId },

    #[error("anchor {id} not released by {} within {waited_ms}ms", owner_label(.owner.as_ref()))]
    TransitionTimeout {
        id: AnchorId,
        owner: Option<OwnerRef>,
        waited_ms: u64,
    },

    #[error("required anchor {id} left without an owner after the shell became ready (last held by {})", owner_label(.owner.as_ref()))]
    ConsistencyViolation {
        id: AnchorId,
        owner: Option<OwnerRef>,
    },

    #[error("transition of {id}{} already in progress", to_owner(.target.as_ref()))]
    CutoverInProgress {
        id: AnchorId,
        /// `None` while a bare transition is pending.
        target: Option<OwnerRef>,
    },
}

fn describe_holder(
    holder: Option<&OwnerRef>,
    reserved_for: Option<&OwnerRef>,
    state: &SlotState,
) -> String {
    match (holder, reserved_for) {
        (Some(holder), _) => format!("held by {holder} ({state})"),
        (None, Some(successor)) => format!("reserved for {successor} ({state})"),
        (None, None) => format!("slot is {state}"),
    }
}

fn owner_label(owner: Option<&OwnerRef>) -> &str {
    owner.map_or("nobody", OwnerRef::as_str)
}

fn by_owner(owner: Option<&OwnerRef>) -> String {
    owner.map_or_else(String::new, |owner| format!(" by {owner}"))
}

fn to_owner(owner: Option<&OwnerRef>) -> String {
    owner.map_or_else(String::new, |owner| format!(" to {owner}"))
}

impl MountError {
    /// The anchor the error concerns, if any.
    #[must_use]
    pub fn anchor(&self) -> Option<&AnchorId> {
        match self {
            Self::InvalidAnchorId { .. } => None,
            Self::AlreadyRegistered { id, .. }
            | Self::Conflict { id, .. }
            | Self::Stale { id, .. }
            | Self::UnknownAnchor { id }
            | Self::TransitionTimeout { id, .. }
            | Self::ConsistencyViolation { id, .. }
            | Self::CutoverInProgress { id, .. } => Some(id),
        }
    }

    /// Configuration defects that must abort startup.
    #[must_use]
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRegistered { .. } | Self::InvalidAnchorId { .. }
        )
    }

    /// Errors that are resolved locally (degrade, no-op, or forced recovery).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. }
                | Self::Stale { .. }
                | Self::TransitionTimeout { .. }
                | Self::CutoverInProgress { .. }
        )
    }
}
