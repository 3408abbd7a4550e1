//! Probe fan-out and completion.
//!
//! [`ProbeCoordinator::start`] sends one can-match probe per shard target
//! and returns immediately. Each shard owns a slot holding its attempt
//! cursor (which copy is being probed) and its write-once outcome. A
//! single atomic counter tracks how many slots are still open; whoever
//! closes the last one runs the [`ShardOrderingPolicy`] and hands the
//! result to the [`NextPhase`], on its own thread.
//!
//! Every transition of a slot is a compare-and-swap on its attempt cursor,
//! so a probe resolved twice (a transport that returns an error *and*
//! drops the listener, say) moves the slot forward only once.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use bytes::Bytes;
use sieve_net::{
    ConnectionResolver, NetError, ProbeListener, ProbeRequest, ProbeResponse, ProbeTransport,
};
use sieve_types::{NodeId, OrderedShardResult, ProbeOutcome, ShardTarget, SortSpec};
use tracing::{Span, debug, info, info_span, trace, warn};

use crate::executor::Executor;
use crate::ordering::ShardOrderingPolicy;

/// Attempt cursor value of a slot whose outcome is recorded.
const DONE: usize = usize::MAX;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Receives the result of a can-match phase, exactly once.
///
/// Any `FnOnce(OrderedShardResult)` closure is a next phase. The blanket
/// impl does not drive closure inference, so annotate the parameter:
/// `move |result: OrderedShardResult| { .. }`.
pub trait NextPhase: Send + 'static {
    /// Called with every shard of the phase, ordered and flagged.
    fn on_shards_resolved(self: Box<Self>, result: OrderedShardResult);
}

impl<F> NextPhase for F
where
    F: FnOnce(OrderedShardResult) + Send + 'static,
{
    fn on_shards_resolved(self: Box<Self>, result: OrderedShardResult) {
        (*self)(result)
    }
}

/// The parts of a search request a probe needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseRequest {
    /// Primary sort; shards report bounds for this field.
    pub sort: Option<SortSpec>,
    /// Serialized query source, forwarded verbatim.
    pub source: Option<Bytes>,
}

impl PhaseRequest {
    /// A request with no sort and no source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the primary sort.
    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Set the query source.
    pub fn with_source(mut self, source: impl Into<Bytes>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Observes a running phase.
#[derive(Clone)]
pub struct PhaseHandle {
    state: Arc<PhaseState>,
}

impl PhaseHandle {
    /// Identifier of the phase, unique per coordinator.
    pub fn phase_id(&self) -> u64 {
        self.state.id
    }

    /// Number of shard targets in the phase.
    pub fn shard_count(&self) -> usize {
        self.state.targets.len()
    }

    /// Shards whose outcome is not recorded yet.
    pub fn outstanding(&self) -> usize {
        self.state.outstanding.load(Ordering::Acquire)
    }

    /// Whether every shard has an outcome.
    ///
    /// Turns true when the last outcome is recorded, before the result is
    /// ordered and while the next phase may still be running on the thread
    /// that recorded it. Wait on the next phase itself for the result.
    pub fn is_complete(&self) -> bool {
        self.state.completed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for PhaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseHandle")
            .field("phase_id", &self.phase_id())
            .field("shards", &self.shard_count())
            .field("outstanding", &self.outstanding())
            .field("complete", &self.is_complete())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Runs can-match phases.
///
/// The coordinator owns no threads and no connections: probes go through
/// the injected transport, connections come from the resolver and every
/// dispatch runs on the executor. One coordinator can run any number of
/// phases at once.
pub struct ProbeCoordinator {
    transport: Arc<dyn ProbeTransport>,
    resolver: Arc<dyn ConnectionResolver>,
    executor: Arc<dyn Executor>,
    policy: ShardOrderingPolicy,
    next_phase_id: AtomicU64,
}

impl ProbeCoordinator {
    /// Create a coordinator with the default ordering policy.
    pub fn new(
        transport: Arc<dyn ProbeTransport>,
        resolver: Arc<dyn ConnectionResolver>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            transport,
            resolver,
            executor,
            policy: ShardOrderingPolicy::default(),
            next_phase_id: AtomicU64::new(0),
        }
    }

    /// Replace the ordering policy.
    pub fn with_policy(mut self, policy: ShardOrderingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The ordering policy in use.
    pub fn policy(&self) -> ShardOrderingPolicy {
        self.policy
    }

    /// Probe every target and deliver the result to `next`.
    ///
    /// Returns as soon as every dispatch is handed to the executor. `next`
    /// runs exactly once, on whichever thread records the last outcome;
    /// with no targets it runs before `start` returns. A closure passed as
    /// `next` needs its parameter typed as [`OrderedShardResult`].
    #[tracing::instrument(
        skip_all,
        fields(shards = targets.len(), sorted = request.sort.is_some())
    )]
    pub fn start<N: NextPhase>(
        &self,
        targets: Vec<ShardTarget>,
        request: PhaseRequest,
        next: N,
    ) -> PhaseHandle {
        debug_assert!(
            has_unique_targets(&targets),
            "can-match phase started with duplicate shard targets"
        );
        debug_assert!(
            !(targets.is_empty() && request.sort.is_some()),
            "sorted can-match phase started without shard targets"
        );

        let id = self.next_phase_id.fetch_add(1, Ordering::Relaxed);
        let shard_count = targets.len();
        let span = info_span!(
            "can_match",
            phase = id,
            shards = shard_count,
            sort = request.sort.as_ref().map(|s| s.field.as_str()),
        );
        debug!(parent: &span, "starting can-match phase");

        let slots = (0..shard_count).map(|_| ShardSlot::default()).collect();
        let next: Box<dyn NextPhase> = Box::new(next);
        let state = Arc::new(PhaseState {
            id,
            targets,
            slots,
            request,
            outstanding: AtomicUsize::new(shard_count),
            completed: AtomicBool::new(false),
            next: Mutex::new(Some(next)),
            transport: Arc::clone(&self.transport),
            resolver: Arc::clone(&self.resolver),
            policy: self.policy,
            started: Instant::now(),
            span,
        });

        if shard_count == 0 {
            state.complete();
            return PhaseHandle { state };
        }

        for slot in 0..shard_count {
            let task = DispatchTask {
                phase: Arc::clone(&state),
                slot,
                ran: false,
            };
            if let Err(e) = self.executor.execute(Box::new(move || task.run())) {
                warn!(
                    parent: &state.span,
                    shard = %state.targets[slot],
                    error = %e,
                    "executor rejected can-match dispatch"
                );
                state.finish_slot(slot, 0, ProbeOutcome::failure());
            }
        }

        PhaseHandle { state }
    }
}

fn has_unique_targets(targets: &[ShardTarget]) -> bool {
    let mut seen = HashSet::with_capacity(targets.len());
    targets
        .iter()
        .all(|t| seen.insert((t.shard_id(), t.cluster_alias())))
}

// ---------------------------------------------------------------------------
// Phase state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ShardSlot {
    /// Index of the copy being probed, or [`DONE`].
    attempt: AtomicUsize,
    outcome: OnceLock<ProbeOutcome>,
}

struct PhaseState {
    id: u64,
    targets: Vec<ShardTarget>,
    slots: Box<[ShardSlot]>,
    request: PhaseRequest,
    outstanding: AtomicUsize,
    completed: AtomicBool,
    next: Mutex<Option<Box<dyn NextPhase>>>,
    transport: Arc<dyn ProbeTransport>,
    resolver: Arc<dyn ConnectionResolver>,
    policy: ShardOrderingPolicy,
    started: Instant,
    span: Span,
}

impl PhaseState {
    /// Probe copy `copy` of shard `slot`, moving on to later copies while
    /// attempts fail synchronously.
    fn dispatch(self: &Arc<Self>, slot: usize, mut copy: usize) {
        let target = &self.targets[slot];
        loop {
            let Some(node) = target.copies().get(copy) else {
                if !target.copies().is_empty() {
                    warn!(
                        parent: &self.span,
                        shard = %target,
                        copies = target.copies().len(),
                        "every copy failed, shard stays in the search"
                    );
                } else {
                    debug!(parent: &self.span, shard = %target, "shard is unassigned");
                }
                self.finish_slot(slot, copy, ProbeOutcome::failure());
                return;
            };

            let error = match self.resolver.resolve(target.cluster_alias(), node) {
                Ok(connection) => {
                    let request = self.probe_request(target, node.clone());
                    let phase = Arc::clone(self);
                    let listener =
                        ProbeListener::new(move |result| phase.on_result(slot, copy, result));
                    match self.transport.send_probe(connection, request, listener) {
                        Ok(()) => return,
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            };

            self.attempt_failed(slot, copy, &error);
            if !self.advance(slot, copy) {
                return;
            }
            copy += 1;
        }
    }

    /// Listener callback for attempt `copy` of shard `slot`.
    fn on_result(
        self: &Arc<Self>,
        slot: usize,
        copy: usize,
        result: Result<ProbeResponse, NetError>,
    ) {
        match result {
            Ok(response) => {
                let outcome = ProbeOutcome::success(response.can_match, response.bound);
                self.finish_slot(slot, copy, outcome);
            }
            Err(e) => {
                self.attempt_failed(slot, copy, &e);
                if self.advance(slot, copy) {
                    self.dispatch(slot, copy + 1);
                }
            }
        }
    }

    fn probe_request(&self, target: &ShardTarget, node_id: NodeId) -> ProbeRequest {
        ProbeRequest {
            shard_id: target.shard_id().clone(),
            node_id,
            cluster_alias: target.cluster_alias().map(str::to_string),
            alias_filter: target.alias_filter().clone(),
            source: self.request.source.clone(),
            sort: self.request.sort.clone(),
            shard_count: self.targets.len(),
        }
    }

    fn attempt_failed(&self, slot: usize, copy: usize, error: &NetError) {
        let target = &self.targets[slot];
        debug!(
            parent: &self.span,
            shard = %target,
            node = %target.copies()[copy],
            copy,
            error = %error,
            "can-match attempt failed"
        );
    }

    /// Move shard `slot` from attempt `copy` to the next copy. Returns
    /// `false` when the attempt was already superseded.
    fn advance(&self, slot: usize, copy: usize) -> bool {
        self.slots[slot]
            .attempt
            .compare_exchange(copy, copy + 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Record the outcome of shard `slot` if attempt `copy` is still
    /// current, and complete the phase when it was the last open slot.
    fn finish_slot(&self, slot: usize, copy: usize, outcome: ProbeOutcome) {
        let shard = &self.slots[slot];
        if shard
            .attempt
            .compare_exchange(copy, DONE, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!(parent: &self.span, slot, copy, "ignoring superseded probe result");
            return;
        }

        let fresh = shard.outcome.set(outcome).is_ok();
        debug_assert!(fresh, "outcome recorded twice for slot {slot}");

        let remaining = self.outstanding.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(remaining > 0, "outstanding counter underflow");
        if remaining == 1 {
            self.complete();
        }
    }

    fn complete(&self) {
        if self
            .completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug_assert!(false, "can-match phase {} completed twice", self.id);
            return;
        }

        let outcomes = self
            .targets
            .iter()
            .zip(self.slots.iter())
            .map(|(target, slot)| {
                let outcome = slot.outcome.get().cloned();
                debug_assert!(outcome.is_some(), "missing outcome for {target}");
                (target.clone(), outcome.unwrap_or_else(ProbeOutcome::failure))
            })
            .collect();
        let result = self.policy.order(outcomes, self.request.sort.as_ref());

        let summary = result.summary();
        info!(
            parent: &self.span,
            total = summary.total,
            skipped = summary.skipped,
            failed = summary.failed,
            sorted = summary.sorted,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "can-match phase complete"
        );

        let next = self.next.lock().expect("next phase lock poisoned").take();
        if let Some(next) = next {
            next.on_shards_resolved(result);
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch task
// ---------------------------------------------------------------------------

/// First attempt of one shard, as handed to the executor.
///
/// An executor that drops the task without running it (queue closed,
/// runtime gone) records a failure outcome for the shard instead.
struct DispatchTask {
    phase: Arc<PhaseState>,
    slot: usize,
    ran: bool,
}

impl DispatchTask {
    fn run(mut self) {
        self.ran = true;
        self.phase.dispatch(self.slot, 0);
    }
}

impl Drop for DispatchTask {
    fn drop(&mut self) {
        if !self.ran {
            debug!(
                parent: &self.phase.span,
                shard = %self.phase.targets[self.slot],
                "can-match dispatch dropped before running"
            );
            self.phase.finish_slot(self.slot, 0, ProbeOutcome::failure());
        }
    }
}
