#![forbid(unsafe_code)]

//! Mount binding: the per-component handle on one anchor.
//!
//! A UI unit that wants to render into an anchor activates a
//! [`MountBinding`]. Activation subscribes to the anchor and claims it;
//! dropping the binding (the component leaving the tree) releases it with the
//! generation captured at claim time, so a binding can never release a slot
//! it no longer owns.
//!
//! The component reads [`MountBinding::view`] (or subscribes through
//! [`MountBinding::watch`]) and renders its anchor content only while
//! `view.should_render()` is true.
//!
//! # Lifecycle
//!
//! ```text
//!   activate ──claim ok──▶ Owner ──Transitioning + OnTransition──▶ Released
//!      │                     │
//!      │                     └──slot forced away──▶ Evicted
//!      ├──conflict, handoff reserved for us──▶ Awaiting ──slot free──▶ Owner
//!      └──conflict──▶ Degraded (renders nothing, never retries)
//! ```

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use dualmount_core::{AnchorId, Generation, MountError, MountSlot, OwnerRef, Result, SlotState};
use tracing::{debug, info, warn};

use crate::reactive::{Observable, Subscription};
use crate::registry::MountRegistry;

/// What the owning component may do with its anchor right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountView {
    pub is_owner: bool,
    pub state: SlotState,
}

impl MountView {
    /// Render anchor content only while owning a settled slot.
    #[must_use]
    pub fn should_render(&self) -> bool {
        self.is_owner && self.state == SlotState::Claimed
    }
}

/// How an owning binding reacts when the bootstrap starts a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YieldPolicy {
    /// Release as soon as `Transitioning` is observed.
    #[default]
    OnTransition,
    /// Stop rendering but keep the claim until the component is removed or
    /// calls [`MountBinding::yield_anchor`].
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Owner(Generation),
    /// Release in flight; nested notifications must not act.
    Yielding,
    Released,
    /// Claim in flight from `Awaiting`.
    Claiming,
    Awaiting,
    Evicted,
    Degraded,
}

struct BindingShared {
    registry: MountRegistry,
    id: AnchorId,
    owner: OwnerRef,
    policy: YieldPolicy,
    phase: RefCell<Phase>,
    view: Observable<MountView>,
}

impl BindingShared {
    fn set_phase(&self, phase: Phase) {
        *self.phase.borrow_mut() = phase;
    }

    fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    fn view_for(&self, phase: Phase, slot: &MountSlot) -> MountView {
        match phase {
            Phase::Owner(generation) => MountView {
                is_owner: slot.is_held_by(&self.owner) && slot.generation == generation,
                state: slot.state,
            },
            Phase::Yielding | Phase::Released => MountView {
                is_owner: false,
                state: SlotState::Released,
            },
            Phase::Claiming | Phase::Awaiting | Phase::Evicted | Phase::Degraded => MountView {
                is_owner: false,
                state: slot.state,
            },
        }
    }

    /// React to one registry notification. No borrow is held while calling
    /// back into the registry, since that call notifies us again.
    fn on_slot(&self, slot: &MountSlot) {
        match self.phase() {
            Phase::Owner(generation) => {
                let still_ours = slot.is_held_by(&self.owner) && slot.generation == generation;
                if !still_ours {
                    warn!(
                        target: "dualmount.binding",
                        anchor = %self.id,
                        owner = %self.owner,
                        generation,
                        current = slot.generation,
                        "ownership lost without release"
                    );
                    self.set_phase(Phase::Evicted);
                } else if slot.state == SlotState::Transitioning
                    && self.policy == YieldPolicy::OnTransition
                {
                    if let Err(err) = self.yield_from(generation) {
                        debug!(target: "dualmount.binding", anchor = %self.id, owner = %self.owner, error = %err, "yield on transition refused");
                    }
                    return;
                }
            }
            Phase::Awaiting if slot.state == SlotState::Unclaimed => {
                let admitted = slot.successor.as_ref().is_none_or(|s| s == &self.owner);
                if admitted {
                    self.claim_now();
                    return;
                }
                debug!(target: "dualmount.binding", anchor = %self.id, owner = %self.owner, "handoff went elsewhere");
                self.set_phase(Phase::Degraded);
            }
            _ => {}
        }
        self.view.set(self.view_for(self.phase(), slot));
    }

    fn yield_from(&self, generation: Generation) -> Result<Generation> {
        self.set_phase(Phase::Yielding);
        let result = self.registry.release(&self.id, &self.owner, generation);
        match &result {
            Ok(_) => {
                debug!(target: "dualmount.binding", anchor = %self.id, owner = %self.owner, "yielded anchor");
                self.set_phase(Phase::Released);
            }
            Err(MountError::ConsistencyViolation { .. }) => {
                // Refused: the slot is still ours.
                self.set_phase(Phase::Owner(generation));
            }
            Err(_) => self.set_phase(Phase::Released),
        }
        self.refresh();
        result
    }

    fn claim_now(&self) {
        self.set_phase(Phase::Claiming);
        match self.registry.claim(&self.id, &self.owner) {
            Ok(generation) => {
                info!(target: "dualmount.binding", anchor = %self.id, owner = %self.owner, generation, "handoff claimed");
                self.set_phase(Phase::Owner(generation));
            }
            Err(err) => {
                let keep_waiting = self
                    .registry
                    .slot(&self.id)
                    .is_ok_and(|slot| slot.successor.as_ref() == Some(&self.owner));
                if keep_waiting {
                    self.set_phase(Phase::Awaiting);
                } else {
                    warn!(target: "dualmount.binding", anchor = %self.id, owner = %self.owner, error = %err, "handoff claim failed");
                    self.set_phase(Phase::Degraded);
                }
            }
        }
        self.refresh();
    }

    fn refresh(&self) {
        if let Ok(slot) = self.registry.slot(&self.id) {
            self.view.set(self.view_for(self.phase(), &slot));
        }
    }
}

/// A component's claim on one anchor.
///
/// Not `Clone`: exactly one binding stands for one component instance.
pub struct MountBinding {
    shared: Rc<BindingShared>,
    subscription: Option<Subscription>,
}

impl std::fmt::Debug for MountBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountBinding")
            .field("anchor", &self.shared.id)
            .field("owner", &self.shared.owner)
            .field("phase", &self.shared.phase())
            .field("view", &self.shared.view.get())
            .finish()
    }
}

impl MountBinding {
    /// Activate with the default [`YieldPolicy::OnTransition`].
    pub fn activate(registry: &MountRegistry, id: AnchorId, owner: OwnerRef) -> Result<Self> {
        Self::activate_with(registry, id, owner, YieldPolicy::default())
    }

    /// Subscribe to `id` and claim it for `owner`.
    ///
    /// A conflicting claim yields a degraded binding rather than an error.
    /// An unknown anchor is an error when the registry is strict and a
    /// degraded binding otherwise.
    pub fn activate_with(
        registry: &MountRegistry,
        id: AnchorId,
        owner: OwnerRef,
        policy: YieldPolicy,
    ) -> Result<Self> {
        let shared = Rc::new(BindingShared {
            registry: registry.clone(),
            id: id.clone(),
            owner: owner.clone(),
            policy,
            phase: RefCell::new(Phase::Degraded),
            view: Observable::new(MountView {
                is_owner: false,
                state: SlotState::Unclaimed,
            }),
        });

        let weak: Weak<BindingShared> = Rc::downgrade(&shared);
        let subscription = match registry.subscribe(&id, move |slot| {
            if let Some(shared) = weak.upgrade() {
                shared.on_slot(slot);
            }
        }) {
            Ok(subscription) => subscription,
            Err(err) if registry.is_strict() => return Err(err),
            Err(err) => {
                warn!(target: "dualmount.binding", anchor = %id, owner = %owner, error = %err, "binding degraded");
                return Ok(Self {
                    shared,
                    subscription: None,
                });
            }
        };

        let phase = match registry.claim(&id, &owner) {
            Ok(generation) => Phase::Owner(generation),
            Err(MountError::Conflict {
                reserved_for,
                state,
                ..
            }) if state == SlotState::Transitioning && reserved_for.as_ref() == Some(&owner) => {
                debug!(target: "dualmount.binding", anchor = %id, owner = %owner, "awaiting handoff");
                Phase::Awaiting
            }
            Err(err) => {
                warn!(target: "dualmount.binding", anchor = %id, owner = %owner, error = %err, "claim conflict, rendering nothing");
                Phase::Degraded
            }
        };
        shared.set_phase(phase);
        shared.refresh();

        Ok(Self {
            shared,
            subscription: Some(subscription),
        })
    }

    #[must_use]
    pub fn anchor(&self) -> &AnchorId {
        &self.shared.id
    }

    #[must_use]
    pub fn owner(&self) -> &OwnerRef {
        &self.shared.owner
    }

    /// Current `{is_owner, state}` for the owning component.
    #[must_use]
    pub fn view(&self) -> MountView {
        self.shared.view.get()
    }

    /// Generation captured at claim time, while this binding owns the slot.
    #[must_use]
    pub fn generation(&self) -> Option<Generation> {
        match self.shared.phase() {
            Phase::Owner(generation) => Some(generation),
            _ => None,
        }
    }

    /// True when the claim was refused and the binding will never render.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.shared.phase() == Phase::Degraded
    }

    /// True while waiting for a reserved handoff to free the slot.
    #[must_use]
    pub fn is_awaiting(&self) -> bool {
        self.shared.phase() == Phase::Awaiting
    }

    /// Be told whenever the view changes.
    pub fn watch(&self, callback: impl Fn(&MountView) + 'static) -> Subscription {
        self.shared.view.subscribe(callback)
    }

    /// Give the anchor up while staying mounted (for [`YieldPolicy::Manual`]
    /// components that finish their exit work).
    pub fn yield_anchor(&self) -> Result<Generation> {
        match self.shared.phase() {
            Phase::Owner(generation) => self.shared.yield_from(generation),
            _ => Err(MountError::Stale {
                id: self.shared.id.clone(),
                owner: Some(self.shared.owner.clone()),
                generation: 0,
                current: self.shared.registry.slot(&self.shared.id).map_or(0, |s| s.generation),
            }),
        }
    }

    /// Deactivate and report how the release went.
    pub fn deactivate(mut self) -> Option<Result<Generation>> {
        self.relinquish()
    }

    fn relinquish(&mut self) -> Option<Result<Generation>> {
        // Unsubscribe first so the release does not call back into us.
        self.subscription.take();
        let Phase::Owner(generation) = self.shared.phase() else {
            return None;
        };
        self.shared.set_phase(Phase::Released);
        let result = self
            .shared
            .registry
            .release(&self.shared.id, &self.shared.owner, generation);
        if let Err(err) = &result {
            debug!(target: "dualmount.binding", anchor = %self.shared.id, owner = %self.shared.owner, error = %err, "release on deactivation refused");
        }
        Some(result)
    }
}

impl Drop for MountBinding {
    fn drop(&mut self) {
        self.relinquish();
    }
}
