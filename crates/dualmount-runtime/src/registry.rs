#![forbid(unsafe_code)]

//! Sacred mount registry: the single source of truth for anchor ownership.
//!
//! # Design
//!
//! [`MountRegistry`] is a cheap, cloneable handle over one registry
//! instance. The bootstrap constructs it, and every binding receives a clone
//! through explicit context passing; there is no global registry.
//!
//! Each registered anchor is one [`Observable<MountSlot>`]. Every mutation
//! runs the slot's state-machine transition inside a single
//! [`Observable::update`] step (no two calls interleave their
//! read-modify-write) and then notifies that anchor's subscribers before the
//! call returns.
//!
//! # Ordering
//!
//! Operations on one anchor are totally ordered by arrival; the generation
//! counter rejects callers acting on stale ownership. Operations on distinct
//! anchors are independent.
//!
//! # Failure Modes
//!
//! - **Unknown anchor**: reported as [`MountError::UnknownAnchor`] and logged.
//!   Whether that is fatal is the caller's decision (see [`Self::is_strict`]).
//! - **Required anchor released after ready**: refused with
//!   [`MountError::ConsistencyViolation`], logged at error level, and kept in
//!   [`MountRegistry::violations`].
//!
//! # Transitions
//!
//! Starting a transition, breaking a claim and dropping a reservation are
//! crate-private. Every transition is started by the
//! [`DualMountBootstrap`](crate::DualMountBootstrap), which owns its deadline.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use dualmount_core::{
    AnchorCatalog, AnchorId, Generation, MountError, MountSlot, OwnerRef, Result, SlotState,
};
use tracing::{debug, error, info, warn};

use crate::reactive::{Observable, Subscription};

struct RegistryInner {
    /// Registration order is snapshot order.
    slots: RefCell<Vec<Observable<MountSlot>>>,
    /// Set once the shell has reached ready.
    sealed: Cell<bool>,
    strict: bool,
    violations: RefCell<Vec<MountError>>,
}

/// Handle to the process-wide anchor ownership table.
#[derive(Clone)]
pub struct MountRegistry {
    inner: Rc<RegistryInner>,
}

impl std::fmt::Debug for MountRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountRegistry")
            .field("anchors", &self.inner.slots.borrow().len())
            .field("sealed", &self.inner.sealed.get())
            .field("strict", &self.inner.strict)
            .finish()
    }
}

impl Default for MountRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MountRegistry {
    /// Empty registry. Unknown anchors are treated strictly in debug builds.
    #[must_use]
    pub fn new() -> Self {
        Self::with_strict(cfg!(debug_assertions))
    }

    #[must_use]
    pub fn with_strict(strict: bool) -> Self {
        Self {
            inner: Rc::new(RegistryInner {
                slots: RefCell::new(Vec::new()),
                sealed: Cell::new(false),
                strict,
                violations: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Whether operations on unknown anchors should be fatal to the caller.
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.inner.strict
    }

    /// Register every anchor of `catalog`, stopping at the first conflict.
    pub fn register_catalog(&self, catalog: &AnchorCatalog) -> Result<()> {
        for spec in catalog.specs() {
            self.register(spec.id.clone(), spec.required)?;
        }
        Ok(())
    }

    /// Declare an anchor. Re-registering with the same `required` flag is a
    /// no-op; a different flag is configuration drift and is refused.
    pub fn register(&self, id: AnchorId, required: bool) -> Result<()> {
        if let Some(existing) = self.lookup(&id) {
            let existing_required = existing.with(|slot| slot.required);
            if existing_required == required {
                return Ok(());
            }
            error!(
                target: "dualmount.registry",
                anchor = %id,
                existing = existing_required,
                requested = required,
                "anchor re-registered with conflicting required flag"
            );
            return Err(MountError::AlreadyRegistered {
                id,
                existing: existing_required,
                requested: required,
            });
        }
        debug!(target: "dualmount.registry", anchor = %id, required, "anchor registered");
        self.inner
            .slots
            .borrow_mut()
            .push(Observable::new(MountSlot::new(id, required)));
        Ok(())
    }

    /// Install `owner` on a free anchor.
    pub fn claim(&self, id: &AnchorId, owner: &OwnerRef) -> Result<Generation> {
        let slot = self.require(id)?;
        let result = slot.update(|slot| slot.claim(owner));
        match &result {
            Ok(generation) => {
                info!(target: "dualmount.registry", anchor = %id, owner = %owner, generation, "anchor claimed");
            }
            Err(err) => {
                warn!(target: "dualmount.registry", anchor = %id, owner = %owner, error = %err, "claim refused");
            }
        }
        result
    }

    /// Give an anchor back. `generation` must be the one returned by the
    /// caller's claim.
    pub fn release(
        &self,
        id: &AnchorId,
        owner: &OwnerRef,
        generation: Generation,
    ) -> Result<Generation> {
        let slot = self.require(id)?;
        let sealed = self.inner.sealed.get();
        let result = slot.update(|slot| slot.release(owner, generation, sealed));
        match &result {
            Ok(next) => {
                info!(target: "dualmount.registry", anchor = %id, owner = %owner, generation = next, "anchor released");
            }
            Err(err @ MountError::ConsistencyViolation { .. }) => {
                error!(target: "dualmount.registry", anchor = %id, owner = %owner, "required anchor released after ready");
                self.inner.violations.borrow_mut().push(err.clone());
            }
            Err(err) => {
                debug!(target: "dualmount.registry", anchor = %id, owner = %owner, error = %err, "stale release ignored");
            }
        }
        result
    }

    /// Mark an anchor as mid-swap so bound components stop rendering.
    /// Returns the generation a forced release must present.
    pub(crate) fn begin_transition(&self, id: &AnchorId) -> Result<Generation> {
        self.transition(id, None)
    }

    /// [`Self::begin_transition`] plus a reservation for `successor`.
    pub(crate) fn begin_handoff(&self, id: &AnchorId, successor: OwnerRef) -> Result<Generation> {
        self.transition(id, Some(successor))
    }

    fn transition(&self, id: &AnchorId, successor: Option<OwnerRef>) -> Result<Generation> {
        let slot = self.require(id)?;
        let reserved = successor.as_ref().map(ToString::to_string);
        let generation = slot.update(|slot| {
            slot.begin_transition(successor);
            slot.generation
        });
        info!(
            target: "dualmount.registry",
            anchor = %id,
            generation,
            successor = reserved.as_deref().unwrap_or("-"),
            "transition started"
        );
        Ok(generation)
    }

    /// Break a wedged claim left over from `generation`. Returns the evicted
    /// owner, if any. Used by the bootstrap's timeout path.
    pub(crate) fn force_release(&self, id: &AnchorId, generation: Generation) -> Result<Option<OwnerRef>> {
        let slot = self.require(id)?;
        let result = slot.update(|slot| slot.force_release(generation));
        match &result {
            Ok(evicted) => warn!(
                target: "dualmount.registry",
                anchor = %id,
                evicted = evicted.as_ref().map_or("-", OwnerRef::as_str),
                "anchor forcibly released"
            ),
            Err(err) => debug!(target: "dualmount.registry", anchor = %id, error = %err, "forced release skipped"),
        }
        result
    }

    /// Drop a pending successor reservation. Returns whether one was set.
    pub(crate) fn clear_successor(&self, id: &AnchorId) -> Result<bool> {
        let slot = self.require(id)?;
        Ok(slot.update(MountSlot::clear_successor))
    }

    /// Subscribe to every change of one anchor.
    pub fn subscribe(
        &self,
        id: &AnchorId,
        callback: impl Fn(&MountSlot) + 'static,
    ) -> Result<Subscription> {
        Ok(self.require(id)?.subscribe(callback))
    }

    /// Current record of one anchor.
    pub fn slot(&self, id: &AnchorId) -> Result<MountSlot> {
        Ok(self.require(id)?.get())
    }

    #[must_use]
    pub fn contains(&self, id: &AnchorId) -> bool {
        self.lookup(id).is_some()
    }

    /// All slots in registration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<MountSlot> {
        self.inner.slots.borrow().iter().map(Observable::get).collect()
    }

    /// True iff every required anchor is `Claimed`.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner
            .slots
            .borrow()
            .iter()
            .all(|slot| slot.with(|s| !s.required || s.state == SlotState::Claimed))
    }

    /// Required anchors that are not yet `Claimed`, in registration order.
    #[must_use]
    pub fn pending_required(&self) -> Vec<AnchorId> {
        self.inner
            .slots
            .borrow()
            .iter()
            .filter_map(|slot| {
                slot.with(|s| (s.required && s.state != SlotState::Claimed).then(|| s.id.clone()))
            })
            .collect()
    }

    /// Latch the ready state: from now on a required anchor may only change
    /// hands through a transition.
    pub fn seal(&self) {
        if !self.inner.sealed.replace(true) {
            info!(target: "dualmount.registry", "registry sealed");
        }
    }

    /// Lift the ready latch (process teardown).
    pub fn unseal(&self) {
        if self.inner.sealed.replace(false) {
            info!(target: "dualmount.registry", "registry unsealed");
        }
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.inner.sealed.get()
    }

    /// Consistency violations refused or detected since startup.
    #[must_use]
    pub fn violations(&self) -> Vec<MountError> {
        self.inner.violations.borrow().clone()
    }

    pub(crate) fn record_violation(&self, violation: MountError) {
        self.inner.violations.borrow_mut().push(violation);
    }

    fn lookup(&self, id: &AnchorId) -> Option<Observable<MountSlot>> {
        self.inner
            .slots
            .borrow()
            .iter()
            .find(|slot| slot.with(|s| &s.id == id))
            .cloned()
    }

    fn require(&self, id: &AnchorId) -> Result<Observable<MountSlot>> {
        self.lookup(id).ok_or_else(|| {
            warn!(target: "dualmount.registry", anchor = %id, strict = self.inner.strict, "operation on unknown anchor");
            MountError::UnknownAnchor { id: id.clone() }
        })
    }
}
