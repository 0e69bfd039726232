//! Shared coordination between device workers and the node client.

use super::{Solution, Target};
use crate::krist::address::Address;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};

/// Decides the fate of a candidate solution; returns whether the node
/// accepted it.
pub type SolveCallback = Box<dyn Fn(Solution) -> bool + Send + Sync>;

#[derive(Debug, Default)]
struct TargetSlot {
    target: Option<Target>,
    valid: bool,
    generation: u64,
}

/// The one object every worker and the node client share.
///
/// The target, its validity flag and its generation counter update together
/// under a single mutex so workers always observe them as a bundle. Counters
/// and the stop flag are atomics and may be read without the lock.
///
/// Workers cache the generation of the target they mine; any mismatch means
/// their in-flight batch belongs to a dead target and must be discarded.
pub struct MiningState {
    address: Address,
    solve: SolveCallback,
    slot: Mutex<TargetSlot>,
    target_cv: Condvar,
    stopped: AtomicBool,
    total_hashes: AtomicU64,
    total_solved: AtomicU64,
}

impl MiningState {
    pub fn new(address: Address, solve: SolveCallback) -> Self {
        MiningState {
            address,
            solve,
            slot: Mutex::new(TargetSlot::default()),
            target_cv: Condvar::new(),
            stopped: AtomicBool::new(false),
            total_hashes: AtomicU64::new(0),
            total_solved: AtomicU64::new(0),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    fn locked(&self) -> MutexGuard<TargetSlot> {
        self.slot.lock().unwrap()
    }

    /// Install a new target and wake every worker. Ignored after a stop.
    pub fn set_target(&self, target: Target) {
        let mut slot = self.locked();
        if self.is_stopped() {
            return;
        }
        slot.target = Some(target);
        slot.generation += 1;
        slot.valid = true;
        self.target_cv.notify_all();
    }

    /// Drop the target entirely; workers idle until the next install.
    pub fn clear_target(&self) {
        let mut slot = self.locked();
        slot.target = None;
        slot.valid = false;
        self.target_cv.notify_all();
    }

    /// Request a global stop. Idempotent; never unset.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let mut slot = self.locked();
        slot.target = None;
        slot.valid = false;
        self.target_cv.notify_all();
    }

    /// Block until a target is available and return it with its generation,
    /// or return None once mining has been stopped.
    pub fn wait_for_target(&self) -> Option<(Target, u64)> {
        let mut slot = self.locked();
        loop {
            if self.is_stopped() {
                return None;
            }
            if slot.valid {
                if let Some(target) = slot.target {
                    return Some((target, slot.generation));
                }
            }
            slot = self.target_cv.wait(slot).unwrap();
        }
    }

    /// Whether the given generation is still the one being mined.
    pub fn is_current(&self, generation: u64) -> bool {
        let slot = self.locked();
        slot.valid && slot.generation == generation && !self.is_stopped()
    }

    /// Generation of the most recently installed target.
    pub fn generation(&self) -> u64 {
        self.locked().generation
    }

    /// Hand a candidate to the solve callback, pausing every worker while
    /// the submission is in flight.
    ///
    /// On rejection the target is validated again under its existing
    /// generation so workers pick it back up; an accepted solution leaves the
    /// target cleared until the node announces the next one.
    pub fn report_solution(&self, solution: Solution) -> bool {
        {
            let mut slot = self.locked();
            slot.valid = false;
            self.target_cv.notify_all();
        }

        let accepted = (self.solve)(solution);

        if accepted {
            self.total_solved.fetch_add(1, Ordering::Relaxed);
        } else {
            let mut slot = self.locked();
            if slot.target.is_some() && !self.is_stopped() {
                slot.valid = true;
            }
            self.target_cv.notify_all();
        }

        accepted
    }

    pub fn add_hashes(&self, hashes: u64) {
        self.total_hashes.fetch_add(hashes, Ordering::Relaxed);
    }

    pub fn total_hashes(&self) -> u64 {
        self.total_hashes.load(Ordering::Relaxed)
    }

    pub fn total_solved(&self) -> u64 {
        self.total_solved.load(Ordering::Relaxed)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
