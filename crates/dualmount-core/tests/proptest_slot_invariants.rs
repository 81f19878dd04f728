#![forbid(unsafe_code)]

//! Property tests for [`MountSlot`] invariants.
//!
//! Validates:
//! - Mutual exclusion: two claims never both succeed without a release.
//! - Generation monotonicity: each successful mutation strictly increases it.
//! - Stale rejection: mismatched releases never change the slot.
//! - Owner/state consistency after any operation sequence.

use dualmount_core::{AnchorId, MountError, MountSlot, OwnerRef, SlotState};
use proptest::prelude::*;

// ============================================================================
// Strategy helpers
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Claim(usize),
    Release { owner: usize, generation_skew: i8 },
    BeginTransition(Option<usize>),
    Force { generation_skew: i8 },
}

const OWNERS: usize = 3;

fn owner(idx: usize) -> OwnerRef {
    match idx % OWNERS {
        0 => OwnerRef::Legacy,
        1 => OwnerRef::NextGen,
        _ => OwnerRef::custom("canary"),
    }
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..OWNERS).prop_map(Op::Claim),
        4 => ((0..OWNERS), -1i8..=1).prop_map(|(owner, generation_skew)| Op::Release { owner, generation_skew }),
        1 => prop::option::of(0..OWNERS).prop_map(Op::BeginTransition),
        1 => (-1i8..=0).prop_map(|generation_skew| Op::Force { generation_skew }),
    ]
}

fn skewed(generation: u64, skew: i8) -> u64 {
    generation.saturating_add_signed(i64::from(skew))
}

// ============================================================================
// Invariant 1: at most one owner; no double successful claim
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn claims_are_mutually_exclusive(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let mut slot = MountSlot::new(AnchorId::TOP_BAR, false);
        let mut live_claim = false;

        for op in ops {
            match op {
                Op::Claim(idx) => {
                    let ok = slot.claim(&owner(idx)).is_ok();
                    if ok {
                        prop_assert!(!live_claim, "second successful claim without release");
                        live_claim = true;
                    }
                }
                Op::Release { owner: idx, generation_skew } => {
                    let g = skewed(slot.generation, generation_skew);
                    if slot.release(&owner(idx), g, false).is_ok() {
                        live_claim = false;
                    }
                }
                Op::BeginTransition(successor) => slot.begin_transition(successor.map(owner)),
                Op::Force { generation_skew } => {
                    let g = skewed(slot.generation, generation_skew);
                    if slot.force_release(g).is_ok() {
                        live_claim = false;
                    }
                }
            }

            if slot.state == SlotState::Claimed {
                prop_assert!(slot.owner.is_some());
            }
            if slot.owner.is_some() {
                prop_assert!(matches!(slot.state, SlotState::Claimed | SlotState::Transitioning));
            }
            prop_assert_ne!(slot.state, SlotState::Released);
        }
    }
}

// ============================================================================
// Invariant 2: generation strictly increases on each successful mutation
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn generation_is_monotonic(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let mut slot = MountSlot::new(AnchorId::FAB, true);
        let mut last = slot.generation;

        for op in ops {
            let before = slot.generation;
            let mutated = match op {
                Op::Claim(idx) => slot.claim(&owner(idx)).ok(),
                Op::Release { owner: idx, generation_skew } => {
                    let g = skewed(slot.generation, generation_skew);
                    slot.release(&owner(idx), g, false).ok()
                }
                Op::BeginTransition(successor) => {
                    slot.begin_transition(successor.map(owner));
                    None
                }
                Op::Force { generation_skew } => {
                    let g = skewed(slot.generation, generation_skew);
                    slot.force_release(g).ok().flatten().map(|_| slot.generation)
                }
            };

            prop_assert!(slot.generation >= before);
            if let Some(g) = mutated {
                prop_assert!(g > last, "generation {} not above {}", g, last);
                prop_assert_eq!(g, slot.generation);
                last = g;
            }
        }
    }
}

// ============================================================================
// Invariant 3: stale release never changes the slot
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn stale_release_is_a_no_op(
        claims in 1usize..10,
        lag in 1u64..5,
    ) {
        let mut slot = MountSlot::new(AnchorId::FAB, true);
        for _ in 0..claims {
            let g = slot.claim(&OwnerRef::Legacy).unwrap();
            slot.release(&OwnerRef::Legacy, g, false).unwrap();
        }
        let g = slot.claim(&OwnerRef::Legacy).unwrap();
        let before = slot.clone();

        let stale = g.saturating_sub(lag);
        let result = slot.release(&OwnerRef::Legacy, stale, false);
        let is_stale = matches!(result, Err(MountError::Stale { .. }));
        prop_assert!(is_stale);
        prop_assert_eq!(slot, before);
    }
}
