//! Page-level shared/exclusive locks with deadlock detection.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::page::HeapPageId;
use crate::transaction::TransactionId;

/// How long a waiter sleeps before re-checking the waits-for graph.
const WAIT_SLICE: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug)]
struct LockRequest {
    tx_id: TransactionId,
    mode: LockMode,
}

#[derive(Debug, Default)]
struct LockQueue {
    queue: VecDeque<LockRequest>,
    sharing: HashSet<TransactionId>,
    exclusive: Option<TransactionId>,
}

impl LockQueue {
    /// Transactions the given request has to wait for: conflicting holders
    /// plus everything queued ahead of it.
    fn blockers(&self, request: &LockRequest) -> Vec<TransactionId> {
        let mut blockers = Vec::new();
        if let Some(ex_holder) = self.exclusive {
            if ex_holder != request.tx_id {
                blockers.push(ex_holder);
            }
        }
        if request.mode == LockMode::Exclusive {
            blockers.extend(self.sharing.iter().filter(|&&tx| tx != request.tx_id));
        }
        for ahead in self
            .queue
            .iter()
            .take_while(|req| req.tx_id != request.tx_id)
        {
            if !blockers.contains(&ahead.tx_id) {
                blockers.push(ahead.tx_id);
            }
        }
        blockers
    }

    fn held_by(&self, tx_id: TransactionId, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => self.sharing.contains(&tx_id) || self.exclusive == Some(tx_id),
            LockMode::Exclusive => self.exclusive == Some(tx_id),
        }
    }

    fn conflicts(&self, tx_id: TransactionId, mode: LockMode) -> bool {
        if let Some(ex_tx) = self.exclusive {
            if ex_tx != tx_id {
                return true;
            }
        }
        mode == LockMode::Exclusive && self.sharing.iter().any(|&tx| tx != tx_id)
    }
}

#[derive(Debug, Default)]
struct WaitQueue {
    queue: Mutex<LockQueue>,
    cvar: Condvar,
}

#[derive(Debug)]
pub enum LockError {
    /// Granting the request would close a cycle in the waits-for graph. The
    /// requesting transaction is the victim.
    Deadlock,
}

#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<HashMap<HeapPageId, Arc<WaitQueue>>>,
    waits_for: Mutex<HashMap<TransactionId, Vec<TransactionId>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until `tx_id` holds `page` in `mode`. Re-requesting a lock
    /// already held in the same or a stronger mode returns immediately; a
    /// sole shared holder asking for exclusive is upgraded.
    pub fn lock(
        &self,
        tx_id: TransactionId,
        page: HeapPageId,
        mode: LockMode,
    ) -> Result<(), LockError> {
        let wait_queue = {
            let mut table = self.table.lock();
            table.entry(page).or_default().clone()
        };

        let mut guard = wait_queue.queue.lock();
        if guard.held_by(tx_id, mode) {
            return Ok(());
        }

        guard.queue.push_back(LockRequest { tx_id, mode });

        loop {
            if Self::try_acquire(&mut guard, tx_id, mode) {
                self.waits_for.lock().remove(&tx_id);
                wait_queue.cvar.notify_all();
                return Ok(());
            }

            if self.closes_cycle(&guard, tx_id) {
                debug!("[LockManager::lock] deadlock: {tx_id} waiting on page {page}");
                guard.queue.retain(|req| req.tx_id != tx_id);
                wait_queue.cvar.notify_all();
                return Err(LockError::Deadlock);
            }

            wait_queue.cvar.wait_for(&mut guard, WAIT_SLICE);
        }
    }

    /// Records what `waiting` is blocked on and reports whether that creates
    /// a cycle.
    fn closes_cycle(&self, queue: &LockQueue, waiting: TransactionId) -> bool {
        let mut waits_for = self.waits_for.lock();
        waits_for.remove(&waiting);

        if let Some(request) = queue.queue.iter().find(|req| req.tx_id == waiting) {
            let blockers = queue.blockers(request);
            if !blockers.is_empty() {
                waits_for.insert(waiting, blockers);
            }
        }

        let mut visited = HashSet::new();
        let mut stack = HashSet::new();
        if Self::has_cycle(waiting, &mut visited, &mut stack, &waits_for) {
            waits_for.remove(&waiting);
            return true;
        }
        false
    }

    fn has_cycle(
        tx_id: TransactionId,
        visited: &mut HashSet<TransactionId>,
        stack: &mut HashSet<TransactionId>,
        waits_for: &HashMap<TransactionId, Vec<TransactionId>>,
    ) -> bool {
        if stack.contains(&tx_id) {
            return true;
        }
        if !visited.insert(tx_id) {
            return false;
        }
        stack.insert(tx_id);
        if let Some(next) = waits_for.get(&tx_id) {
            for &waited in next {
                if Self::has_cycle(waited, visited, stack, waits_for) {
                    return true;
                }
            }
        }
        stack.remove(&tx_id);
        false
    }

    fn try_acquire(queue: &mut LockQueue, tx_id: TransactionId, mode: LockMode) -> bool {
        if queue.conflicts(tx_id, mode) {
            return false;
        }

        // Upgrades jump the queue; everyone else waits their turn.
        let upgrade = queue.sharing.contains(&tx_id);
        let at_front = queue.queue.front().map(|req| req.tx_id) == Some(tx_id);
        if !upgrade && !at_front {
            return false;
        }

        queue.queue.retain(|req| req.tx_id != tx_id);
        match mode {
            LockMode::Shared => {
                queue.sharing.insert(tx_id);
            }
            LockMode::Exclusive => {
                queue.sharing.remove(&tx_id);
                queue.exclusive = Some(tx_id);
            }
        }
        true
    }

    pub fn holds_lock(&self, tx_id: TransactionId, page: HeapPageId) -> bool {
        let wait_queue = match self.table.lock().get(&page) {
            Some(wait_queue) => wait_queue.clone(),
            None => return false,
        };
        let held = wait_queue.queue.lock().held_by(tx_id, LockMode::Shared);
        held
    }

    /// Releases whatever lock `tx_id` holds on `page`.
    pub fn unlock(&self, tx_id: TransactionId, page: HeapPageId) {
        let wait_queue = match self.table.lock().get(&page) {
            Some(wait_queue) => wait_queue.clone(),
            None => return,
        };
        let mut queue = wait_queue.queue.lock();
        if queue.exclusive == Some(tx_id) {
            queue.exclusive = None;
        }
        queue.sharing.remove(&tx_id);
        drop(queue);
        wait_queue.cvar.notify_all();
    }

    /// Releases every lock held or requested by `tx_id`.
    pub fn unlock_all(&self, tx_id: TransactionId) {
        self.waits_for.lock().remove(&tx_id);

        let queues: Vec<Arc<WaitQueue>> = self.table.lock().values().cloned().collect();
        for wait_queue in queues {
            let mut queue = wait_queue.queue.lock();
            let mut changed = false;
            if queue.exclusive == Some(tx_id) {
                queue.exclusive = None;
                changed = true;
            }
            if queue.sharing.remove(&tx_id) {
                changed = true;
            }
            let before = queue.queue.len();
            queue.queue.retain(|req| req.tx_id != tx_id);
            changed |= queue.queue.len() != before;
            drop(queue);

            if changed {
                wait_queue.cvar.notify_all();
            }
        }
    }
}
