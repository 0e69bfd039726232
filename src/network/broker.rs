//! The single slot rendezvous between mining threads and the session thread.

use crate::miner::Solution;
use std::sync::{Condvar, Mutex};
use tokio::sync::Notify;

#[derive(Debug)]
struct Slot {
    solution: Option<Solution>,
    id: u64,
    verdict: bool,
    closed: bool,
}

/// Hands solutions from workers to the session thread, one at a time.
///
/// A producer blocks in [`submit_and_wait`](SubmitSlot::submit_and_wait)
/// until the session thread resolves the submission, so at most one
/// submission is ever outstanding. Replies are correlated by the id that was
/// current when the solution was installed; every
/// [`clear`](SubmitSlot::clear) advances it.
#[derive(Debug)]
pub struct SubmitSlot {
    slot: Mutex<Slot>,
    cv: Condvar,
    notify: Notify,
}

impl SubmitSlot {
    pub fn new() -> Self {
        SubmitSlot {
            slot: Mutex::new(Slot {
                solution: None,
                id: 1,
                verdict: false,
                closed: false,
            }),
            cv: Condvar::new(),
            notify: Notify::new(),
        }
    }

    /// Park a solution and block until it is resolved. Returns whether the
    /// node accepted it; a dropped connection or a closed slot resolves as
    /// not accepted.
    pub fn submit_and_wait(&self, solution: Solution) -> bool {
        let mut slot = self.slot.lock().unwrap();
        while slot.solution.is_some() && !slot.closed {
            slot = self.cv.wait(slot).unwrap();
        }
        if slot.closed {
            return false;
        }

        let id = slot.id;
        slot.solution = Some(solution);
        drop(slot);
        self.notify.notify_one();

        let mut slot = self.slot.lock().unwrap();
        while slot.id == id && !slot.closed {
            slot = self.cv.wait(slot).unwrap();
        }
        slot.id != id && slot.verdict
    }

    /// Wait until a producer parks a solution.
    pub async fn notified(&self) {
        self.notify.notified().await
    }

    /// The parked solution, if any, without resolving it.
    pub fn peek(&self) -> Option<Solution> {
        self.slot.lock().unwrap().solution
    }

    /// The id to tag the next outgoing submission with.
    pub fn current_id(&self) -> u64 {
        self.slot.lock().unwrap().id
    }

    /// Resolve the outstanding submission, free the slot and advance the id.
    pub fn clear(&self, accepted: bool) {
        let mut slot = self.slot.lock().unwrap();
        slot.solution = None;
        slot.verdict = accepted;
        slot.id += 1;
        self.cv.notify_all();
    }

    /// Unblock all producers permanently.
    pub fn close(&self) {
        let mut slot = self.slot.lock().unwrap();
        slot.closed = true;
        self.cv.notify_all();
    }
}

impl Default for SubmitSlot {
    fn default() -> Self {
        Self::new()
    }
}
