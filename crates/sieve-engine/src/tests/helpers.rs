//! Shared test utilities for sieve-engine tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use sieve_net::{
    Connection, ConnectionResolver, NetError, NodeConnection, ProbeListener, ProbeRequest,
    ProbeResponse, ProbeTransport,
};
use sieve_types::{NodeId, OrderedShardResult, ShardId, ShardTarget};

use crate::coordinator::{NextPhase, ProbeCoordinator};
use crate::error::EngineError;
use crate::executor::{DirectExecutor, Executor, Task};

/// How long a test waits for a phase to complete before failing.
pub const WAIT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// What the mock transport does with one probe.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Resolve the listener before `send_probe` returns.
    Respond(ProbeResponse),
    /// Resolve the listener from a freshly spawned thread.
    RespondOnThread(ProbeResponse),
    /// Resolve the listener with a remote error.
    FailAsync,
    /// Return an error from `send_probe`, dropping the listener.
    FailSync,
    /// Resolve the listener with a response, then return an error anyway.
    RespondThenFailSync(ProbeResponse),
    /// Drop the listener without resolving it.
    DropListener,
    /// Keep the listener until [`MockTransport::release_held`].
    Hold,
}

/// Callback transport scripted per shard (and optionally per node).
pub struct MockTransport {
    default: Behavior,
    by_shard: HashMap<ShardId, Behavior>,
    by_copy: HashMap<(ShardId, NodeId), Behavior>,
    sent: Mutex<Vec<ProbeRequest>>,
    held: Mutex<Vec<(ProbeRequest, ProbeListener)>>,
}

impl MockTransport {
    /// Every shard matches, answered inline.
    pub fn new() -> Self {
        Self::with_default(Behavior::Respond(ProbeResponse::matched()))
    }

    pub fn with_default(default: Behavior) -> Self {
        Self {
            default,
            by_shard: HashMap::new(),
            by_copy: HashMap::new(),
            sent: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
        }
    }

    /// Script every probe of one shard.
    pub fn on_shard(mut self, shard: ShardId, behavior: Behavior) -> Self {
        self.by_shard.insert(shard, behavior);
        self
    }

    /// Script probes of one shard sent to one node.
    pub fn on_copy(mut self, shard: ShardId, node: &str, behavior: Behavior) -> Self {
        self.by_copy.insert((shard, NodeId::from(node)), behavior);
        self
    }

    /// Every request sent so far, in send order.
    pub fn sent(&self) -> Vec<ProbeRequest> {
        self.sent.lock().unwrap().clone()
    }

    /// Nodes probed for `shard`, in send order.
    pub fn nodes_probed(&self, shard: &ShardId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|r| &r.shard_id == shard)
            .map(|r| r.node_id.to_string())
            .collect()
    }

    /// Number of listeners waiting in [`Behavior::Hold`].
    pub fn held_count(&self) -> usize {
        self.held.lock().unwrap().len()
    }

    /// Resolve every held listener with `answer(request)`.
    pub fn release_held<F>(&self, answer: F)
    where
        F: Fn(&ProbeRequest) -> ProbeResponse,
    {
        let held = std::mem::take(&mut *self.held.lock().unwrap());
        for (request, listener) in held {
            listener.on_response(answer(&request));
        }
    }

    fn behavior_for(&self, request: &ProbeRequest) -> Behavior {
        let key = (request.shard_id.clone(), request.node_id.clone());
        self.by_copy
            .get(&key)
            .or_else(|| self.by_shard.get(&request.shard_id))
            .unwrap_or(&self.default)
            .clone()
    }
}

impl ProbeTransport for MockTransport {
    fn send_probe(
        &self,
        _connection: Arc<dyn Connection>,
        request: ProbeRequest,
        listener: ProbeListener,
    ) -> Result<(), NetError> {
        self.sent.lock().unwrap().push(request.clone());
        match self.behavior_for(&request) {
            Behavior::Respond(response) => listener.on_response(response),
            Behavior::RespondOnThread(response) => {
                std::thread::spawn(move || listener.on_response(response));
            }
            Behavior::FailAsync => listener.on_failure(NetError::Remote {
                node_id: request.node_id.clone(),
                message: "shard failed".to_string(),
            }),
            Behavior::FailSync => {
                return Err(NetError::Dispatch("connection reset".to_string()));
            }
            Behavior::RespondThenFailSync(response) => {
                listener.on_response(response);
                return Err(NetError::Dispatch("late error".to_string()));
            }
            Behavior::DropListener => drop(listener),
            Behavior::Hold => self.held.lock().unwrap().push((request, listener)),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Resolvers and executors
// ---------------------------------------------------------------------------

fn connect_any(
    cluster_alias: Option<&str>,
    node_id: &NodeId,
) -> Result<Arc<dyn Connection>, NetError> {
    let connection = match cluster_alias {
        Some(alias) => NodeConnection::remote(alias, node_id.clone()),
        None => NodeConnection::local(node_id.clone()),
    };
    Ok(Arc::new(connection))
}

/// Resolver that connects to any node.
pub fn any_node() -> Arc<dyn ConnectionResolver> {
    Arc::new(connect_any)
}

/// Runs tasks inline, except the ones whose submission index is listed.
///
/// Rejected tasks are dropped, as the executor contract requires. With
/// `report_error == false` the task is dropped silently and `Ok` returned.
pub struct SelectiveExecutor {
    reject: Vec<usize>,
    report_error: bool,
    submitted: AtomicUsize,
}

impl SelectiveExecutor {
    pub fn rejecting(reject: Vec<usize>) -> Self {
        Self {
            reject,
            report_error: true,
            submitted: AtomicUsize::new(0),
        }
    }

    pub fn dropping(reject: Vec<usize>) -> Self {
        Self {
            reject,
            report_error: false,
            submitted: AtomicUsize::new(0),
        }
    }
}

impl Executor for SelectiveExecutor {
    fn execute(&self, task: Task) -> Result<(), EngineError> {
        let index = self.submitted.fetch_add(1, Ordering::SeqCst);
        if !self.reject.contains(&index) {
            task();
            return Ok(());
        }
        drop(task);
        if self.report_error {
            Err(EngineError::Rejected {
                queued: 0,
                limit: 0,
            })
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinators, targets and results
// ---------------------------------------------------------------------------

/// Coordinator over `transport` with a connect-anything resolver and
/// inline execution.
pub fn direct_coordinator(transport: Arc<MockTransport>) -> ProbeCoordinator {
    ProbeCoordinator::new(transport, any_node(), Arc::new(DirectExecutor))
}

/// `count` shards of index `idx`, spread over three nodes.
pub fn targets(count: u32) -> Vec<ShardTarget> {
    (0..count)
        .map(|i| ShardTarget::new(shard(i), format!("node-{}", i % 3)))
        .collect()
}

pub fn shard(ordinal: u32) -> ShardId {
    ShardId::new("idx", ordinal)
}

/// Ordinals in delivery order.
pub fn ordinals(result: &OrderedShardResult) -> Vec<u32> {
    result.iter().map(|s| s.target.shard_id().ordinal).collect()
}

/// Skip flags in delivery order.
pub fn skips(result: &OrderedShardResult) -> Vec<bool> {
    result.iter().map(|s| s.skip).collect()
}

/// A [`NextPhase`] that forwards the result to a [`Collected`] and counts
/// how often it was invoked.
pub struct Collector {
    tx: mpsc::Sender<OrderedShardResult>,
    calls: Arc<AtomicUsize>,
}

impl NextPhase for Collector {
    fn on_shards_resolved(self: Box<Self>, result: OrderedShardResult) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.tx.send(result);
    }
}

/// Receiving end of a [`Collector`].
pub struct Collected {
    rx: mpsc::Receiver<OrderedShardResult>,
    calls: Arc<AtomicUsize>,
}

impl Collected {
    /// The result, if the phase already completed.
    pub fn try_result(&self) -> Option<OrderedShardResult> {
        self.rx.try_recv().ok()
    }

    /// Block until the phase completes.
    pub fn wait(&self) -> OrderedShardResult {
        self.rx
            .recv_timeout(WAIT)
            .expect("can-match phase did not complete in time")
    }

    /// Number of times the next phase ran.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn collector() -> (Collector, Collected) {
    let (tx, rx) = mpsc::channel();
    let calls = Arc::new(AtomicUsize::new(0));
    (
        Collector {
            tx,
            calls: Arc::clone(&calls),
        },
        Collected { rx, calls },
    )
}

/// Assert the result holds every target exactly once.
pub fn assert_complete(result: &OrderedShardResult, targets: &[ShardTarget]) {
    assert_eq!(result.len(), targets.len(), "result cardinality");
    let mut got: Vec<String> = result.iter().map(|s| s.target.to_string()).collect();
    let mut want: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
    got.sort();
    want.sort();
    assert_eq!(got, want, "every target exactly once");
}
