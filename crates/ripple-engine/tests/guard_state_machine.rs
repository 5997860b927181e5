//! Stateful property testing for the mutation guard.
//!
//! The reference model tracks a virtual clock, the set of in-flight keys
//! and each key's completion time; the real guard runs against tokio's
//! paused clock. The invariant is that the guard's pending set always
//! matches the model — acquisitions succeed exactly when no mutation is
//! in flight for the key and the debounce window has fully elapsed.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use proptest::prelude::*;
use proptest_state_machine::{ReferenceStateMachine, StateMachineTest, prop_state_machine};
use tokio::runtime::Runtime;

use ripple_engine::{ActionKind, MutationGuard, MutationKey, MutationPermit};

/// Debounce window used by both model and guard (must stay in sync).
const MIN_INTERVAL_MS: u64 = 500;

/// Distinct keys exercised by the machine.
const KEYS: usize = 3;

fn key(i: usize) -> MutationKey {
    MutationKey::new("viewer", format!("target-{i}"), ActionKind::Like)
}

/// Operations on the guard.
#[derive(Debug, Clone)]
pub enum GuardOp {
    /// Attempt to acquire the key.
    TryAcquire { key: usize },
    /// Drop the held permit, if any.
    Release { key: usize },
    /// Advance the clock.
    Advance { ms: u64 },
}

/// Reference model of the guard.
#[derive(Clone, Debug, Default)]
pub struct GuardModel {
    now_ms: u64,
    in_flight: HashSet<usize>,
    completed_at: HashMap<usize, u64>,
}

impl GuardModel {
    fn would_accept(&self, key: usize) -> bool {
        if self.in_flight.contains(&key) {
            return false;
        }
        match self.completed_at.get(&key) {
            Some(done) => self.now_ms - done >= MIN_INTERVAL_MS,
            None => true,
        }
    }
}

impl ReferenceStateMachine for GuardModel {
    type State = Self;
    type Transition = GuardOp;

    fn init_state() -> BoxedStrategy<Self::State> {
        Just(Self::default()).boxed()
    }

    fn transitions(_state: &Self::State) -> BoxedStrategy<Self::Transition> {
        prop_oneof![
            3 => (0..KEYS).prop_map(|key| GuardOp::TryAcquire { key }),
            2 => (0..KEYS).prop_map(|key| GuardOp::Release { key }),
            // Spans both inside and beyond the debounce window.
            2 => (0u64..1200).prop_map(|ms| GuardOp::Advance { ms }),
        ]
        .boxed()
    }

    fn apply(mut state: Self::State, transition: &Self::Transition) -> Self::State {
        match transition {
            GuardOp::TryAcquire { key } => {
                if state.would_accept(*key) {
                    state.in_flight.insert(*key);
                }
            }
            GuardOp::Release { key } => {
                if state.in_flight.remove(key) {
                    state.completed_at.insert(*key, state.now_ms);
                }
            }
            GuardOp::Advance { ms } => {
                state.now_ms += ms;
            }
        }
        state
    }
}

/// Test harness wrapping the real guard with a paused-clock runtime.
pub struct GuardHarness {
    runtime: Runtime,
    guard: MutationGuard,
    permits: HashMap<usize, MutationPermit>,
}

impl GuardHarness {
    fn new() -> Self {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .expect("failed to build paused runtime");
        let guard = MutationGuard::new(Duration::from_millis(MIN_INTERVAL_MS));
        Self {
            runtime,
            guard,
            permits: HashMap::new(),
        }
    }

    fn apply_op(&mut self, op: &GuardOp) {
        match op {
            GuardOp::TryAcquire { key: i } => {
                let permit = self.runtime.block_on(async { self.guard.try_acquire(key(*i)) });
                if let Some(permit) = permit {
                    self.permits.insert(*i, permit);
                }
            }
            GuardOp::Release { key: i } => {
                let permit = self.permits.remove(i);
                self.runtime.block_on(async move { drop(permit) });
            }
            GuardOp::Advance { ms } => {
                self.runtime
                    .block_on(tokio::time::advance(Duration::from_millis(*ms)));
            }
        }
    }

    fn verify_invariants(&self, model: &GuardModel) {
        for i in 0..KEYS {
            let pending = self.guard.is_pending(&key(i));
            assert_eq!(
                pending,
                model.in_flight.contains(&i),
                "pending mismatch for key {i}: guard {pending} vs model {:?}",
                model.in_flight
            );
            assert_eq!(
                self.permits.contains_key(&i),
                model.in_flight.contains(&i),
                "held-permit mismatch for key {i}"
            );
        }
    }
}

impl Drop for GuardHarness {
    fn drop(&mut self) {
        // Permits touch the paused clock on release; drop them inside the
        // runtime.
        let permits = std::mem::take(&mut self.permits);
        self.runtime.block_on(async move { drop(permits) });
    }
}

impl StateMachineTest for GuardHarness {
    type SystemUnderTest = Self;
    type Reference = GuardModel;

    fn init_test(
        _ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) -> Self::SystemUnderTest {
        Self::new()
    }

    fn apply(
        mut state: Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
        transition: <Self::Reference as ReferenceStateMachine>::Transition,
    ) -> Self::SystemUnderTest {
        state.apply_op(&transition);
        state.verify_invariants(ref_state);
        state
    }

    fn check_invariants(
        state: &Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) {
        state.verify_invariants(ref_state);
    }
}

prop_state_machine! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 10000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn guard_state_machine_test(sequential 1..50 => GuardHarness);
}
