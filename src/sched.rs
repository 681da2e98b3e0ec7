//! The pluggable scheduler (spec §4.5, component C5): policy
//! selection plus the per-CPU dispatch loop.
//!
//! Grounded on `original_source/proc.c`'s `scheduler()` for exact
//! per-policy selection order (RR/FCFS/PBS linear scan vs. MLFQ's
//! age-then-pop-lowest-queue), and on
//! `boranseckin-octopos/kernel/src/proc.rs`'s `scheduler()` for the
//! Rust dispatch-loop shape (lock, pick, switch, release). All four
//! policies are always compiled — spec §6 asks for exactly one to be
//! *active* at build time, not for the others to not exist — and a
//! Cargo feature selects which one `ActivePolicy` aliases to.

use std::sync::Arc;

use crate::cpu::{bind_current_thread_to_cpu, pop_cli, push_cli};
use crate::param::{AGING_THRESHOLD_TICKS, MLFQSIZE, MLFQ_QUANTUM};
use crate::proc::{Pid, ProcState, ProcTable, ProcTableInner};

/// A scheduling policy: how to pick the next `Runnable` slot, and what
/// bookkeeping (if any) to do around that pick. Spec §4.5 describes
/// all four; only their selection rule differs, not the surrounding
/// dispatch mechanics.
pub trait Policy {
    const NAME: &'static str;

    /// Index of the slot to dispatch next, or `None` if nothing is
    /// `Runnable`. Caller holds the table lock.
    fn select(inner: &mut ProcTableInner, now: u64) -> Option<usize>;

    /// Called once a dispatched slot returns `Runnable` (i.e. it
    /// yielded rather than slept or exited). No-op for policies with
    /// no queue state to update.
    fn requeue(_inner: &mut ProcTableInner, _idx: usize, _now: u64) {}

    /// Called the moment a slot first becomes `Runnable` (fork,
    /// userinit, wakeup, kill-while-sleeping). MLFQ uses this to seed
    /// queue 0; the others need nothing.
    fn on_runnable(_inner: &mut ProcTableInner, _idx: usize) {}
}

/// Spec §4.5: "RR: first `Runnable` slot in table order." Repeated
/// dispatch naturally round-robins, since a still-`Runnable` process
/// is simply picked again next time it is first in scan order.
pub struct RoundRobin;

impl Policy for RoundRobin {
    const NAME: &'static str = "round-robin";

    fn select(inner: &mut ProcTableInner, _now: u64) -> Option<usize> {
        inner.slots.iter().position(|s| s.state == ProcState::Runnable)
    }
}

/// Spec §4.5: "FCFS: lowest creation tick among `Runnable` slots."
pub struct Fcfs;

impl Policy for Fcfs {
    const NAME: &'static str = "fcfs";

    fn select(inner: &mut ProcTableInner, _now: u64) -> Option<usize> {
        inner
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.state == ProcState::Runnable)
            .min_by_key(|(_, s)| s.ctime)
            .map(|(i, _)| i)
    }
}

/// Spec §4.5: "PBS: lowest priority value among `Runnable` slots,
/// ties broken by table order" (priority 0 is highest).
pub struct Pbs;

impl Policy for Pbs {
    const NAME: &'static str = "pbs";

    fn select(inner: &mut ProcTableInner, _now: u64) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, s) in inner.slots.iter().enumerate() {
            if s.state != ProcState::Runnable {
                continue;
            }
            match best {
                None => best = Some(i),
                Some(b) if s.priority < inner.slots[b].priority => best = Some(i),
                _ => {}
            }
        }
        best
    }
}

/// Spec §4.5/§9: MLFQ. Ages every queue (promoting long-waiters to
/// `queue - 1`), then pops the front of the lowest-numbered non-empty
/// queue. A popped entry that is no longer `Runnable` (it may have
/// been killed, or slept, since being enqueued) is abandoned and the
/// pop retried, matching spec §4.5's MLFQ bullet.
pub struct Mlfq;

impl Policy for Mlfq {
    const NAME: &'static str = "mlfq";

    fn select(inner: &mut ProcTableInner, now: u64) -> Option<usize> {
        for level in 1..MLFQSIZE {
            crate::accounting::age_processes(inner, level, now);
        }

        for level in 0..MLFQSIZE {
            loop {
                let Some(pid) = inner.mlfq[level].pop() else {
                    break;
                };
                let Some(idx) = inner.idx_of(pid) else {
                    continue;
                };
                if inner.slots[idx].state == ProcState::Runnable {
                    return Some(idx);
                }
                log::debug!("mlfq: abandoning stale entry for pid {pid}");
            }
        }
        None
    }

    fn requeue(inner: &mut ProcTableInner, idx: usize, now: u64) {
        let pid = inner.slots[idx].pid;
        let level = inner.slots[idx].cur_queue;
        if inner.slots[idx].punish {
            inner.slots[idx].punish = false;
            inner.slots[idx].time_slices = 0;
            inner.slots[idx].cur_queue = (level + 1).min(MLFQSIZE - 1);
        }
        inner.slots[idx].queue_entered_at = now;
        let target = inner.slots[idx].cur_queue;
        inner.mlfq[target].push(pid);
    }

    fn on_runnable(inner: &mut ProcTableInner, idx: usize) {
        inner.slots[idx].cur_queue = 0;
        inner.slots[idx].time_slices = 0;
        inner.slots[idx].punish = false;
        let pid = inner.slots[idx].pid;
        inner.mlfq[0].push(pid);
    }
}

#[cfg(feature = "sched-fcfs")]
pub type ActivePolicy = Fcfs;
#[cfg(feature = "sched-pbs")]
pub type ActivePolicy = Pbs;
#[cfg(feature = "sched-mlfq")]
pub type ActivePolicy = Mlfq;
#[cfg(not(any(feature = "sched-fcfs", feature = "sched-pbs", feature = "sched-mlfq")))]
pub type ActivePolicy = RoundRobin;

/// One dispatch round on simulated CPU `cpu_id`: select a `Runnable`
/// process (if any), mark it `Running`, block until it stops running,
/// then do any policy-specific requeue bookkeeping. Spec §4.5's
/// dispatcher loop, one iteration.
pub fn dispatch_once(table: &Arc<ProcTable>, cpu_id: usize) {
    bind_current_thread_to_cpu(cpu_id);
    push_cli();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        dispatch_once_inner(table, cpu_id);
    }));
    pop_cli();
    if let Err(e) = result {
        std::panic::resume_unwind(e);
    }
}

fn dispatch_once_inner(table: &Arc<ProcTable>, cpu_id: usize) {
    let now = table.current_tick();
    let mut inner = table.lock_inner();

    let Some(idx) = ActivePolicy::select(&mut inner, now) else {
        drop(inner);
        std::thread::yield_now();
        return;
    };

    inner.slots[idx].state = ProcState::Running;
    inner.slots[idx].n_sched += 1;
    let quantum = quantum_for(&inner.slots[idx]);
    crate::accounting::punisher(&mut inner, idx, quantum);
    let pid = inner.slots[idx].pid;
    *table.cpus().get(cpu_id).running.lock().unwrap() = Some(pid);
    table.notify_all();

    inner = table.wait_while_running(inner, idx);

    *table.cpus().get(cpu_id).running.lock().unwrap() = None;

    if inner.slots[idx].state == ProcState::Runnable {
        ActivePolicy::requeue(&mut inner, idx, table.current_tick());
    }
}

fn quantum_for(slot: &crate::proc::ProcSlot) -> usize {
    MLFQ_QUANTUM[slot.cur_queue.min(MLFQSIZE - 1)] as usize
}

/// Drives `dispatch_once` `iterations` times on simulated CPU
/// `cpu_id`. Tests use this (bounded) instead of an infinite loop so
/// they terminate deterministically.
pub fn run_cpu_n(table: &Arc<ProcTable>, cpu_id: usize, iterations: usize) {
    for _ in 0..iterations {
        dispatch_once(table, cpu_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::NullFs;
    use crate::program::ClosureProgram;
    use crate::vm::NullVm;

    fn table() -> Arc<ProcTable> {
        ProcTable::new(Box::new(NullVm::new()), Box::new(NullFs::new()))
    }

    #[test]
    fn round_robin_picks_first_runnable() {
        let t = table();
        t.user_init(Box::new(ClosureProgram::new(|ctx| ctx.exit(0))));
        run_cpu_n(&t, 0, 4);
        t.with_inner(|inner| {
            assert!(inner.slots.iter().all(|s| s.state == ProcState::Unused || s.state == ProcState::Zombie));
        });
    }

    #[test]
    fn pbs_prefers_lower_priority_value() {
        let mut inner = ProcTableInner::new();
        inner.slots[0] = crate::proc::ProcSlot::unused();
        inner.slots[0].pid = Pid(1);
        inner.slots[0].state = ProcState::Runnable;
        inner.slots[0].priority = 80;

        inner.slots[1] = crate::proc::ProcSlot::unused();
        inner.slots[1].pid = Pid(2);
        inner.slots[1].state = ProcState::Runnable;
        inner.slots[1].priority = 10;

        let picked = Pbs::select(&mut inner, 0).unwrap();
        assert_eq!(inner.slots[picked].pid, Pid(2));
    }

    #[test]
    fn fcfs_prefers_earliest_ctime() {
        let mut inner = ProcTableInner::new();
        inner.slots[0] = crate::proc::ProcSlot::unused();
        inner.slots[0].pid = Pid(1);
        inner.slots[0].state = ProcState::Runnable;
        inner.slots[0].ctime = 50;

        inner.slots[1] = crate::proc::ProcSlot::unused();
        inner.slots[1].pid = Pid(2);
        inner.slots[1].state = ProcState::Runnable;
        inner.slots[1].ctime = 10;

        let picked = Fcfs::select(&mut inner, 0).unwrap();
        assert_eq!(inner.slots[picked].pid, Pid(2));
    }

    #[test]
    fn mlfq_promotes_before_selecting() {
        let mut inner = ProcTableInner::new();
        inner.slots[0] = crate::proc::ProcSlot::unused();
        inner.slots[0].pid = Pid(1);
        inner.slots[0].state = ProcState::Runnable;
        inner.slots[0].cur_queue = 1;
        inner.slots[0].queue_entered_at = 0;
        inner.mlfq[1].push(Pid(1));

        let picked = Mlfq::select(&mut inner, AGING_THRESHOLD_TICKS + 1).unwrap();
        assert_eq!(inner.slots[picked].pid, Pid(1));
        assert_eq!(inner.slots[picked].cur_queue, 0);
    }
}
