#![forbid(unsafe_code)]

//! Dual-mount bootstrap: startup gating and anchor cutover.
//!
//! # Startup
//!
//! [`DualMountBootstrap::new`] validates the configuration, builds the
//! registry and registers the catalog. The initial owner trees then activate
//! their bindings against [`DualMountBootstrap::registry`]. Until every
//! required anchor is claimed the shell gate reads
//! [`ShellGate::Booting`]; once it is, the startup audit runs, the registry
//! is sealed and the gate flips to [`ShellGate::Ready`]. Readiness is
//! latched: a later cutover does not send the shell back to booting.
//!
//! # Cutover
//!
//! ```text
//!  request_cutover ──begin_handoff──▶ Transitioning(reserved for target)
//!        │                                  │ old owner releases
//!        │                                  ▼
//!        │                      Unclaimed(reserved) ──target claims──▶ Completed
//!        │
//!        └── tick(now) past deadline:
//!              still Transitioning ──force_release──▶ ForcedRelease
//!              still Unclaimed     ──clear_successor──▶ Cancelled
//! ```
//!
//! [`DualMountBootstrap::begin_transition`] is the same flow without a
//! reservation: whoever claims the freed anchor first completes it. Every
//! transition has a deadline, so no anchor stays `Transitioning` past
//! `cutover_timeout`.
//!
//! A transition that resolves after ready and leaves a required anchor
//! without an owner is recorded as [`MountError::ConsistencyViolation`].
//!
//! Nothing here blocks. The host calls [`DualMountBootstrap::tick`] from its
//! frame loop; [`DualMountBootstrap::next_deadline`] says when it matters.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::{Rc, Weak};

use dualmount_core::{
    AnchorId, AuditFinding, AuditReport, Generation, MountError, MountSlot, OwnerRef, SlotState,
    audit_against_catalog,
};
use tracing::{debug, error, info, warn};
use web_time::{Duration, Instant};

use crate::config::{BootstrapConfig, ConfigError};
use crate::reactive::{Observable, Subscription};
use crate::registry::MountRegistry;

/// What the top-level shell may render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellGate {
    /// Boot screen. `pending` lists required anchors not yet claimed.
    Booting { pending: Vec<AnchorId> },
    Ready,
    /// Every required anchor is claimed but the startup audit found errors.
    Faulted { findings: Vec<AuditFinding> },
}

impl ShellGate {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Immediate result of [`DualMountBootstrap::request_cutover`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutoverStatus {
    /// The requested owner already holds the anchor; nothing was started.
    AlreadyOwner { generation: Generation },
    /// Waiting for the old owner to release and the new one to claim.
    Pending { deadline: Instant },
    /// The swap finished before the call returned.
    Completed { generation: Generation },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CutoverOutcome {
    Completed { generation: Generation },
    /// The old owner never released; its claim was broken.
    ForcedRelease { evicted: Option<OwnerRef> },
    /// The new owner never claimed; the reservation was dropped.
    Cancelled,
}

/// One finished cutover, as kept in the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutoverRecord {
    pub anchor: AnchorId,
    pub from: Option<OwnerRef>,
    /// `None` for a bare transition that nobody claimed.
    pub to: Option<OwnerRef>,
    pub outcome: CutoverOutcome,
    pub elapsed: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Mount(#[from] MountError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("startup audit failed with {} error(s)", .report.errors().count())]
    AuditFailed { report: AuditReport },

    #[error("no previous owner recorded for anchor {id}")]
    NoRollbackTarget { id: AnchorId },
}

impl BootstrapError {
    /// Errors that mean the shell must not start.
    #[must_use]
    pub fn is_startup_fatal(&self) -> bool {
        match self {
            Self::Mount(err) => err.is_startup_fatal(),
            Self::Config(_) | Self::AuditFailed { .. } => true,
            Self::NoRollbackTarget { .. } => false,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingCutover {
    anchor: AnchorId,
    from: Option<OwnerRef>,
    /// Generation when the handoff began; a forced release must match it.
    from_generation: Generation,
    /// Reserved successor; `None` admits any claimant.
    to: Option<OwnerRef>,
    started: Instant,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct BootState {
    ready: bool,
    pending: Vec<PendingCutover>,
    journal: VecDeque<CutoverRecord>,
    /// Owner each anchor had before its last cutover.
    previous: HashMap<AnchorId, OwnerRef>,
    /// Latest `now` handed in by the host.
    clock: Option<Instant>,
}

struct BootShared {
    registry: MountRegistry,
    config: BootstrapConfig,
    state: RefCell<BootState>,
    gate: Observable<ShellGate>,
}

impl BootShared {
    fn observe(&self, now: Instant) {
        let mut state = self.state.borrow_mut();
        state.clock = Some(state.clock.map_or(now, |clock| clock.max(now)));
    }

    fn record(&self, record: CutoverRecord) {
        let mut state = self.state.borrow_mut();
        if let (Some(from), CutoverOutcome::Completed { .. } | CutoverOutcome::ForcedRelease { .. }) =
            (&record.from, &record.outcome)
        {
            if record.to.as_ref() != Some(from) {
                state.previous.insert(record.anchor.clone(), from.clone());
            }
        }
        if state.journal.len() >= self.config.journal_capacity {
            state.journal.pop_front();
        }
        state.journal.push_back(record);
    }

    /// Registry watcher: finish cutovers and keep the gate current.
    fn on_slot(&self, slot: &MountSlot) {
        self.complete_cutover(slot);
        if let Err(err) = self.evaluate_gate() {
            debug!(target: "dualmount.bootstrap", error = %err, "gate evaluation failed");
        }
    }

    fn complete_cutover(&self, slot: &MountSlot) {
        if slot.state != SlotState::Claimed {
            return;
        }
        let finished = {
            let mut state = self.state.borrow_mut();
            let position = state.pending.iter().position(|p| {
                p.anchor == slot.id && p.to.as_ref().is_none_or(|to| slot.is_held_by(to))
            });
            position.map(|index| {
                let pending = state.pending.remove(index);
                let elapsed = state
                    .clock
                    .map_or(Duration::ZERO, |clock| clock.saturating_duration_since(pending.started));
                (pending, elapsed)
            })
        };
        let Some((pending, elapsed)) = finished else {
            return;
        };
        let to = pending.to.or_else(|| slot.owner.clone());
        info!(
            target: "dualmount.bootstrap",
            anchor = %pending.anchor,
            from = pending.from.as_ref().map_or("-", OwnerRef::as_str),
            to = to.as_ref().map_or("-", OwnerRef::as_str),
            generation = slot.generation,
            elapsed_ms = elapsed.as_millis() as u64,
            "cutover completed"
        );
        self.record(CutoverRecord {
            anchor: pending.anchor,
            from: pending.from,
            to,
            outcome: CutoverOutcome::Completed {
                generation: slot.generation,
            },
            elapsed,
        });
    }

    /// Move the gate forward. `Ok(true)` once ready.
    fn evaluate_gate(&self) -> Result<bool, BootstrapError> {
        if self.state.borrow().ready {
            return Ok(true);
        }
        if !self.registry.is_ready() {
            self.gate.set(ShellGate::Booting {
                pending: self.registry.pending_required(),
            });
            return Ok(false);
        }

        let report = audit_against_catalog(&self.registry.snapshot(), &self.config.anchors);
        for warning in report.warnings() {
            warn!(target: "dualmount.bootstrap", finding = %warning, "startup audit warning");
        }
        if !report.passed() {
            for finding in report.errors() {
                error!(target: "dualmount.bootstrap", finding = %finding, "startup audit error");
            }
            self.gate.set(ShellGate::Faulted {
                findings: report.findings.clone(),
            });
            return Err(BootstrapError::AuditFailed { report });
        }

        self.state.borrow_mut().ready = true;
        self.registry.seal();
        info!(
            target: "dualmount.bootstrap",
            anchors = report.anchors,
            claimed = report.claimed,
            "shell ready"
        );
        self.gate.set(ShellGate::Ready);
        Ok(true)
    }

    /// After ready, a required anchor must come out of a transition owned.
    fn check_resolved(&self, pending: &PendingCutover) {
        if !self.state.borrow().ready {
            return;
        }
        let Ok(slot) = self.registry.slot(&pending.anchor) else {
            return;
        };
        if !slot.required || slot.is_claimed() {
            return;
        }
        let violation = MountError::ConsistencyViolation {
            id: pending.anchor.clone(),
            owner: pending.from.clone(),
        };
        error!(
            target: "dualmount.bootstrap",
            anchor = %pending.anchor,
            error = %violation,
            "required anchor left unowned after transition"
        );
        self.registry.record_violation(violation);
    }
}

/// Owns the registry for the lifetime of the shell.
pub struct DualMountBootstrap {
    shared: Rc<BootShared>,
    _watchers: Vec<Subscription>,
}

impl std::fmt::Debug for DualMountBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualMountBootstrap")
            .field("registry", &self.shared.registry)
            .field("gate", &self.shared.gate.get())
            .finish_non_exhaustive()
    }
}

impl DualMountBootstrap {
    /// Validate `config`, build the registry and register every anchor.
    pub fn new(config: BootstrapConfig) -> Result<Self, BootstrapError> {
        let config = config.validated()?;
        let registry = MountRegistry::with_strict(config.strict_anchors);
        registry.register_catalog(&config.anchors)?;

        let gate = Observable::new(ShellGate::Booting {
            pending: registry.pending_required(),
        });
        let shared = Rc::new(BootShared {
            registry,
            config,
            state: RefCell::new(BootState::default()),
            gate,
        });

        let mut watchers = Vec::with_capacity(shared.config.anchors.len());
        for id in shared.config.anchors.ids() {
            let weak: Weak<BootShared> = Rc::downgrade(&shared);
            watchers.push(shared.registry.subscribe(id, move |slot| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_slot(slot);
                }
            })?);
        }

        info!(
            target: "dualmount.bootstrap",
            anchors = shared.config.anchors.len(),
            timeout_ms = shared.config.cutover_timeout_ms,
            strict = shared.config.strict_anchors,
            "bootstrap started"
        );
        Ok(Self {
            shared,
            _watchers: watchers,
        })
    }

    /// Registry handle to pass to bindings.
    #[must_use]
    pub fn registry(&self) -> &MountRegistry {
        &self.shared.registry
    }

    #[must_use]
    pub fn config(&self) -> &BootstrapConfig {
        &self.shared.config
    }

    /// Re-evaluate readiness. `Ok(false)` while booting.
    pub fn poll_ready(&self) -> Result<bool, BootstrapError> {
        self.shared.evaluate_gate()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.shared.state.borrow().ready
    }

    #[must_use]
    pub fn shell_gate(&self) -> ShellGate {
        self.shared.gate.get()
    }

    /// Observable gate for shells that re-render on change.
    #[must_use]
    pub fn gate(&self) -> Observable<ShellGate> {
        self.shared.gate.clone()
    }

    /// Start handing `id` to `to`.
    ///
    /// The current owner's binding sees `Transitioning` and yields; `to`'s
    /// binding may claim as soon as the slot frees up. The swap must finish
    /// within the configured timeout, enforced by [`Self::tick`].
    pub fn request_cutover(
        &self,
        id: &AnchorId,
        to: OwnerRef,
        now: Instant,
    ) -> Result<CutoverStatus, BootstrapError> {
        self.start_transition(id, Some(to), now)
    }

    /// Put `id` into `Transitioning` without reserving it for anyone.
    ///
    /// The current owner's binding yields (or is forced out at the
    /// deadline); the first claimant of the freed anchor completes the
    /// transition.
    pub fn begin_transition(&self, id: &AnchorId, now: Instant) -> Result<CutoverStatus, BootstrapError> {
        self.start_transition(id, None, now)
    }

    fn start_transition(
        &self,
        id: &AnchorId,
        to: Option<OwnerRef>,
        now: Instant,
    ) -> Result<CutoverStatus, BootstrapError> {
        let slot = self.shared.registry.slot(id)?;
        self.shared.observe(now);

        if let Some(pending) = self
            .shared
            .state
            .borrow()
            .pending
            .iter()
            .find(|p| &p.anchor == id)
        {
            warn!(
                target: "dualmount.bootstrap",
                anchor = %id,
                target = pending.to.as_ref().map_or("-", OwnerRef::as_str),
                "cutover already in progress"
            );
            return Err(MountError::CutoverInProgress {
                id: id.clone(),
                target: pending.to.clone(),
            }
            .into());
        }
        if let Some(to) = to.as_ref().filter(|to| slot.is_claimed() && slot.is_held_by(to)) {
            debug!(target: "dualmount.bootstrap", anchor = %id, owner = %to, "cutover target already owns anchor");
            return Ok(CutoverStatus::AlreadyOwner {
                generation: slot.generation,
            });
        }

        let deadline = now + self.shared.config.cutover_timeout();
        info!(
            target: "dualmount.bootstrap",
            anchor = %id,
            from = slot.owner.as_ref().map_or("-", OwnerRef::as_str),
            to = to.as_ref().map_or("-", OwnerRef::as_str),
            generation = slot.generation,
            "cutover requested"
        );
        self.shared.state.borrow_mut().pending.push(PendingCutover {
            anchor: id.clone(),
            from: slot.owner.clone(),
            from_generation: slot.generation,
            to: to.clone(),
            started: now,
            deadline,
        });

        let started = match to {
            Some(to) => self.shared.registry.begin_handoff(id, to),
            None => self.shared.registry.begin_transition(id),
        };
        if let Err(err) = started {
            self.shared
                .state
                .borrow_mut()
                .pending
                .retain(|p| &p.anchor != id);
            return Err(err.into());
        }

        let still_pending = self
            .shared
            .state
            .borrow()
            .pending
            .iter()
            .any(|p| &p.anchor == id);
        if still_pending {
            Ok(CutoverStatus::Pending { deadline })
        } else {
            Ok(CutoverStatus::Completed {
                generation: self.shared.registry.slot(id)?.generation,
            })
        }
    }

    /// Hand `id` back to the owner it had before its last cutover.
    pub fn request_rollback(&self, id: &AnchorId, now: Instant) -> Result<CutoverStatus, BootstrapError> {
        let previous = self.shared.state.borrow().previous.get(id).cloned();
        let Some(previous) = previous else {
            return Err(BootstrapError::NoRollbackTarget { id: id.clone() });
        };
        info!(target: "dualmount.bootstrap", anchor = %id, to = %previous, "rollback requested");
        self.request_cutover(id, previous, now)
    }

    /// Resolve every cutover whose deadline has passed. Returns the records
    /// produced by this call.
    pub fn tick(&self, now: Instant) -> Vec<CutoverRecord> {
        self.shared.observe(now);
        let expired: Vec<PendingCutover> = {
            let mut state = self.shared.state.borrow_mut();
            let (expired, waiting): (Vec<_>, Vec<_>) =
                state.pending.drain(..).partition(|p| p.deadline <= now);
            state.pending = waiting;
            expired
        };

        let mut records = Vec::with_capacity(expired.len());
        for pending in expired {
            let elapsed = now.saturating_duration_since(pending.started);
            let outcome = match self.shared.registry.slot(&pending.anchor) {
                Ok(slot) if slot.state == SlotState::Transitioning => {
                    let timeout = MountError::TransitionTimeout {
                        id: pending.anchor.clone(),
                        owner: slot.owner.clone(),
                        waited_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    };
                    warn!(target: "dualmount.bootstrap", error = %timeout, "cutover timed out, forcing release");
                    match self
                        .shared
                        .registry
                        .force_release(&pending.anchor, pending.from_generation)
                    {
                        Ok(evicted) => CutoverOutcome::ForcedRelease { evicted },
                        Err(err) => {
                            debug!(target: "dualmount.bootstrap", anchor = %pending.anchor, error = %err, "forced release skipped");
                            CutoverOutcome::Cancelled
                        }
                    }
                }
                _ => {
                    if let Err(err) = self.shared.registry.clear_successor(&pending.anchor) {
                        debug!(target: "dualmount.bootstrap", anchor = %pending.anchor, error = %err, "reservation already gone");
                    }
                    info!(
                        target: "dualmount.bootstrap",
                        anchor = %pending.anchor,
                        to = pending.to.as_ref().map_or("-", OwnerRef::as_str),
                        "cutover cancelled, new owner never claimed"
                    );
                    CutoverOutcome::Cancelled
                }
            };
            self.shared.check_resolved(&pending);
            let record = CutoverRecord {
                anchor: pending.anchor,
                from: pending.from,
                to: pending.to,
                outcome,
                elapsed,
            };
            self.shared.record(record.clone());
            records.push(record);
        }
        records
    }

    /// Earliest pending cutover deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.shared
            .state
            .borrow()
            .pending
            .iter()
            .map(|p| p.deadline)
            .min()
    }

    #[must_use]
    pub fn is_cutover_pending(&self, id: &AnchorId) -> bool {
        self.shared
            .state
            .borrow()
            .pending
            .iter()
            .any(|p| &p.anchor == id)
    }

    /// Finished cutovers, oldest first, bounded by `journal_capacity`.
    #[must_use]
    pub fn journal(&self) -> Vec<CutoverRecord> {
        self.shared.state.borrow().journal.iter().cloned().collect()
    }

    /// Audit the live registry against the catalog.
    #[must_use]
    pub fn audit(&self) -> AuditReport {
        audit_against_catalog(&self.shared.registry.snapshot(), &self.shared.config.anchors)
    }

    /// Begin teardown: drop pending cutovers and unseal the registry so
    /// bindings unmounting with the shell may release required anchors.
    pub fn shutdown(&self) {
        let abandoned = std::mem::take(&mut self.shared.state.borrow_mut().pending);
        for pending in &abandoned {
            let _ = self.shared.registry.clear_successor(&pending.anchor);
        }
        self.shared.registry.unseal();
        info!(target: "dualmount.bootstrap", abandoned = abandoned.len(), "bootstrap shutting down");
    }
}
