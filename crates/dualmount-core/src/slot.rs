#![forbid(unsafe_code)]

//! Per-anchor ownership state machine.
//!
//! # State machine
//!
//! ```text
//!              claim(owner)                 begin_transition
//!  Unclaimed ───────────────▶ Claimed ─────────────────────────▶ Transitioning
//!      ▲                        │                                    │   │
//!      │   release(owner, gen)  │       release(owner, gen)          │   │
//!      └────────────────────────┘◀───────────────────────────────────┘   │
//!      ▲                                  force_release(gen)             │
//!      └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Invariants
//!
//! 1. At most one owner is recorded at any time. `Claimed` always has an
//!    owner; an owner is only recorded while `Claimed` or `Transitioning`.
//! 2. `generation` increments by exactly 1 on every ownership change (claim,
//!    release, forced release) and never decreases.
//! 3. A release whose `(owner, generation)` does not match is a no-op
//!    reported as [`MountError::Stale`].
//! 4. While a successor is reserved, only that successor may claim.
//!
//! [`SlotState::Released`] is never stored here: a released slot is free
//! again and reads `Unclaimed`. Bindings report `Released` to their own
//! component after letting go.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::anchor::{AnchorId, OwnerRef};
use crate::error::{MountError, Result};

/// Monotonic per-anchor ownership counter.
pub type Generation = u64;

/// Lifecycle state of a mount slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SlotState {
    /// No owner; free to claim.
    #[default]
    Unclaimed,
    /// Exactly one owner renders into the anchor.
    Claimed,
    /// Owner swap in progress; bound components must not render.
    Transitioning,
    /// The observing binding gave the anchor up.
    Released,
}

impl SlotState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unclaimed => "unclaimed",
            Self::Claimed => "claimed",
            Self::Transitioning => "transitioning",
            Self::Released => "released",
        }
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ownership record for one anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MountSlot {
    pub id: AnchorId,
    pub required: bool,
    pub owner: Option<OwnerRef>,
    pub state: SlotState,
    pub generation: Generation,
    /// Owner a pending handoff is reserved for.
    pub successor: Option<OwnerRef>,
}

impl MountSlot {
    #[must_use]
    pub fn new(id: AnchorId, required: bool) -> Self {
        Self {
            id,
            required,
            owner: None,
            state: SlotState::Unclaimed,
            generation: 0,
            successor: None,
        }
    }

    #[must_use]
    pub fn is_claimed(&self) -> bool {
        self.state == SlotState::Claimed
    }

    #[must_use]
    pub fn is_held_by(&self, owner: &OwnerRef) -> bool {
        self.owner.as_ref() == Some(owner)
    }

    /// Install `owner`. Only valid from `Unclaimed`.
    pub fn claim(&mut self, owner: &OwnerRef) -> Result<Generation> {
        let reserved_elsewhere = self
            .successor
            .as_ref()
            .is_some_and(|successor| successor != owner);
        if self.state != SlotState::Unclaimed || reserved_elsewhere {
            return Err(MountError::Conflict {
                id: self.id.clone(),
                claimant: owner.clone(),
                holder: self.owner.clone(),
                reserved_for: self.successor.clone(),
                state: self.state,
            });
        }
        self.owner = Some(owner.clone());
        self.state = SlotState::Claimed;
        self.successor = None;
        self.generation += 1;
        Ok(self.generation)
    }

    /// Give the slot up. `sealed` is true once the shell has reached ready;
    /// a sealed required slot may then only be released mid-transition.
    pub fn release(
        &mut self,
        owner: &OwnerRef,
        generation: Generation,
        sealed: bool,
    ) -> Result<Generation> {
        let live = matches!(self.state, SlotState::Claimed | SlotState::Transitioning);
        if !live || !self.is_held_by(owner) || generation != self.generation {
            return Err(MountError::Stale {
                id: self.id.clone(),
                owner: Some(owner.clone()),
                generation,
                current: self.generation,
            });
        }
        if sealed && self.required && self.state == SlotState::Claimed {
            return Err(MountError::ConsistencyViolation {
                id: self.id.clone(),
                owner: Some(owner.clone()),
            });
        }
        self.owner = None;
        self.state = SlotState::Unclaimed;
        self.generation += 1;
        Ok(self.generation)
    }

    /// Mark the slot as mid-swap. Idempotent.
    ///
    /// A free slot handed to a known successor stays `Unclaimed` with the
    /// reservation set, since there is no incumbent to wait for. A free slot
    /// without a successor is frozen in `Transitioning` until released or
    /// forced.
    pub fn begin_transition(&mut self, successor: Option<OwnerRef>) {
        let free = self.owner.is_none();
        if !(free && successor.is_some()) {
            self.state = SlotState::Transitioning;
        }
        if successor.is_some() {
            self.successor = successor;
        }
    }

    /// Break a wedged claim. `generation` must be the generation the caller
    /// observed when it started waiting; anything newer means the slot moved
    /// on and the forced release is stale.
    pub fn force_release(&mut self, generation: Generation) -> Result<Option<OwnerRef>> {
        if generation != self.generation {
            return Err(MountError::Stale {
                id: self.id.clone(),
                owner: None,
                generation,
                current: self.generation,
            });
        }
        let evicted = self.owner.take();
        self.state = SlotState::Unclaimed;
        self.successor = None;
        if evicted.is_some() {
            self.generation += 1;
        }
        Ok(evicted)
    }

    /// Drop a pending reservation. Returns whether one was set.
    pub fn clear_successor(&mut self) -> bool {
        self.successor.take().is_some()
    }
}
