//! Page-level lock management.
//!
//! Transactions take shared locks to read pages and exclusive locks to
//! write them. Requests queue FIFO per page and block on a condition
//! variable; a request that would close a cycle in the wait-for graph is
//! refused instead of enqueued.

use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Lock modes supported by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared lock for read access.
    Shared,
    /// Exclusive lock for write access.
    Exclusive,
}

impl LockMode {
    pub fn is_compatible_with(&self, other: &LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }
}

/// Why a lock request was refused. Surfacing one of these aborts the
/// calling operation; the transaction's dirtied pages are then the
/// rollback collaborator's problem.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortError {
    #[error("{0} aborted: deadlock detected")]
    Deadlock(TransactionId),

    #[error("{0} aborted: lock wait timed out")]
    Timeout(TransactionId),
}

#[derive(Debug, Clone)]
struct LockRequest {
    tid: TransactionId,
    mode: LockMode,
    granted: bool,
}

#[derive(Debug)]
struct LockInfo {
    /// Granted and waiting requests, in arrival order.
    requests: VecDeque<LockRequest>,
    cv: Arc<Condvar>,
}

impl LockInfo {
    fn new() -> Self {
        Self {
            requests: VecDeque::new(),
            cv: Arc::new(Condvar::new()),
        }
    }

    /// Compatibility against granted requests from other transactions.
    /// The requester's own grants are ignored so a shared-to-exclusive
    /// upgrade only waits on everyone else.
    fn is_compatible(&self, tid: TransactionId, mode: LockMode) -> bool {
        self.requests
            .iter()
            .filter(|r| r.granted && r.tid != tid)
            .all(|r| r.mode.is_compatible_with(&mode))
    }

    /// Grants waiting requests in FIFO order until the first one that
    /// stays incompatible.
    fn grant_waiters(&mut self) {
        let mut effective: Vec<(TransactionId, LockMode)> = self
            .requests
            .iter()
            .filter(|r| r.granted)
            .map(|r| (r.tid, r.mode))
            .collect();

        let mut to_grant = Vec::new();
        for (i, req) in self.requests.iter().enumerate() {
            if req.granted {
                continue;
            }
            let compatible = effective
                .iter()
                .filter(|(t, _)| *t != req.tid)
                .all(|(_, m)| m.is_compatible_with(&req.mode));
            if compatible {
                to_grant.push(i);
                effective.push((req.tid, req.mode));
            } else {
                break;
            }
        }

        if !to_grant.is_empty() {
            for i in to_grant {
                self.requests[i].granted = true;
            }
            self.cv.notify_all();
        }
    }
}

/// Wait-for graph: an edge waiter -> holder means the waiter is blocked
/// on a lock the holder has.
#[derive(Debug, Default)]
struct WaitGraph {
    wait_for: HashMap<TransactionId, HashSet<TransactionId>>,
}

impl WaitGraph {
    fn add_edge(&mut self, waiter: TransactionId, holder: TransactionId) {
        self.wait_for.entry(waiter).or_default().insert(holder);
    }

    fn remove_transaction(&mut self, tid: TransactionId) {
        self.wait_for.remove(&tid);
        for holders in self.wait_for.values_mut() {
            holders.remove(&tid);
        }
    }

    /// Would the edge waiter -> holder close a cycle?
    fn would_cause_deadlock(&self, waiter: TransactionId, holder: TransactionId) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([holder]);
        while let Some(current) = queue.pop_front() {
            if current == waiter {
                return true;
            }
            if visited.insert(current) {
                if let Some(next) = self.wait_for.get(&current) {
                    queue.extend(next.iter().copied());
                }
            }
        }
        false
    }
}

/// Grants page locks to transactions.
pub struct LockManager {
    locks: Mutex<HashMap<PageId, LockInfo>>,
    held: Mutex<HashMap<TransactionId, HashSet<PageId>>>,
    waits: Mutex<WaitGraph>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            held: Mutex::new(HashMap::new()),
            waits: Mutex::new(WaitGraph::default()),
        }
    }

    /// Acquires a page lock for a transaction, blocking until granted.
    ///
    /// Re-entrant: a transaction already holding the same or a stronger
    /// lock returns immediately. A shared holder requesting exclusive is
    /// upgraded in place when it is the sole holder, and queued behind
    /// the other holders otherwise.
    pub fn acquire(
        &self,
        tid: TransactionId,
        pid: PageId,
        mode: LockMode,
        timeout: Option<Duration>,
    ) -> Result<(), AbortError> {
        let start = Instant::now();

        let cv = {
            let mut locks = self.locks.lock().unwrap();
            let info = locks.entry(pid).or_insert_with(LockInfo::new);

            if let Some(i) = info
                .requests
                .iter()
                .position(|r| r.tid == tid && r.granted)
            {
                let held_mode = info.requests[i].mode;
                if held_mode == LockMode::Exclusive || held_mode == mode {
                    return Ok(());
                }
                let sole = !info.requests.iter().any(|r| r.granted && r.tid != tid);
                if sole {
                    info.requests[i].mode = LockMode::Exclusive;
                    return Ok(());
                }
                // other shared holders present: queue the upgrade below
            }

            {
                let waits = self.waits.lock().unwrap();
                for r in info.requests.iter().filter(|r| r.granted) {
                    if r.tid != tid
                        && !r.mode.is_compatible_with(&mode)
                        && waits.would_cause_deadlock(tid, r.tid)
                    {
                        return Err(AbortError::Deadlock(tid));
                    }
                }
            }

            let compatible = info.is_compatible(tid, mode);
            info.requests.push_back(LockRequest {
                tid,
                mode,
                granted: compatible,
            });
            if compatible {
                self.held.lock().unwrap().entry(tid).or_default().insert(pid);
                return Ok(());
            }

            {
                let mut waits = self.waits.lock().unwrap();
                for r in info.requests.iter().filter(|r| r.granted) {
                    if r.tid != tid && !r.mode.is_compatible_with(&mode) {
                        waits.add_edge(tid, r.tid);
                    }
                }
            }
            Arc::clone(&info.cv)
        };

        let mut locks = self.locks.lock().unwrap();
        loop {
            let granted = locks
                .get(&pid)
                .map(|info| {
                    info.requests
                        .iter()
                        .any(|r| r.tid == tid && r.mode == mode && r.granted)
                })
                .unwrap_or(false);
            if granted {
                self.held.lock().unwrap().entry(tid).or_default().insert(pid);
                self.waits.lock().unwrap().remove_transaction(tid);
                return Ok(());
            }

            match timeout {
                Some(limit) => {
                    let elapsed = start.elapsed();
                    if elapsed >= limit {
                        self.abandon_wait(&mut locks, tid, pid);
                        return Err(AbortError::Timeout(tid));
                    }
                    let (guard, result) = cv.wait_timeout(locks, limit - elapsed).unwrap();
                    locks = guard;
                    if result.timed_out() {
                        self.abandon_wait(&mut locks, tid, pid);
                        return Err(AbortError::Timeout(tid));
                    }
                }
                None => {
                    locks = cv.wait(locks).unwrap();
                }
            }
        }
    }

    /// Drops a waiting (never granted) request after a timeout.
    fn abandon_wait(
        &self,
        locks: &mut HashMap<PageId, LockInfo>,
        tid: TransactionId,
        pid: PageId,
    ) {
        if let Some(info) = locks.get_mut(&pid) {
            info.requests.retain(|r| r.granted || r.tid != tid);
            info.grant_waiters();
        }
        self.waits.lock().unwrap().remove_transaction(tid);
    }

    /// Releases one page lock held by a transaction.
    pub fn release(&self, tid: TransactionId, pid: PageId) {
        let mut locks = self.locks.lock().unwrap();
        if let Some(info) = locks.get_mut(&pid) {
            info.requests.retain(|r| r.tid != tid);
            if info.requests.is_empty() {
                locks.remove(&pid);
            } else {
                info.grant_waiters();
            }
        }

        let mut held = self.held.lock().unwrap();
        if let Some(pages) = held.get_mut(&tid) {
            pages.remove(&pid);
            if pages.is_empty() {
                held.remove(&tid);
            }
        }
    }

    /// Releases every lock held by a transaction.
    pub fn release_all(&self, tid: TransactionId) {
        let pages = self.held.lock().unwrap().remove(&tid);
        if let Some(pages) = pages {
            let mut locks = self.locks.lock().unwrap();
            for pid in pages {
                if let Some(info) = locks.get_mut(&pid) {
                    info.requests.retain(|r| r.tid != tid);
                    if info.requests.is_empty() {
                        locks.remove(&pid);
                    } else {
                        info.grant_waiters();
                    }
                }
            }
        }
        self.waits.lock().unwrap().remove_transaction(tid);
    }

    /// Whether the transaction holds the page in the given mode (an
    /// exclusive grant also satisfies a shared query).
    pub fn holds(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        let locks = self.locks.lock().unwrap();
        locks.get(&pid).is_some_and(|info| {
            info.requests.iter().any(|r| {
                r.tid == tid
                    && r.granted
                    && (r.mode == mode || r.mode == LockMode::Exclusive)
            })
        })
    }

    /// Pages locked by a transaction, for tests and rollback bookkeeping.
    pub fn pages_locked_by(&self, tid: TransactionId) -> Vec<PageId> {
        self.held
            .lock()
            .unwrap()
            .get(&tid)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default()
    }
}
