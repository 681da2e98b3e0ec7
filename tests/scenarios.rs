//! End-to-end scenarios (spec §8): whole-table behavior across several
//! dispatches, as opposed to the single-function unit tests living
//! alongside each module in `src/`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use coreproc::fs::NullFs;
use coreproc::proc::{Channel, ProcState, ProcTable};
use coreproc::sched::run_cpu_n;
use coreproc::vm::NullVm;
use coreproc::{ClosureProgram, ScriptProgram, Step};

fn table() -> Arc<ProcTable> {
    ProcTable::new(Box::new(NullVm::new()), Box::new(NullFs::new()))
}

/// Spec §8.1: a parent forks several children, each exits with a
/// distinct status, and the parent reaps every one of them via `wait`.
#[test]
fn fork_wait_pipeline_reaps_every_child() {
    let t = table();
    let reaped = Arc::new(std::sync::Mutex::new(Vec::new()));
    let reaped2 = Arc::clone(&reaped);

    t.user_init(Box::new(ClosureProgram::new(move |ctx| {
        for status in [1, 2, 3] {
            ctx.fork(Box::new(ClosureProgram::new(move |c| c.exit(status)))).unwrap();
        }
        for _ in 0..3 {
            if let Some((_, status)) = ctx.wait() {
                reaped2.lock().unwrap().push(status);
            }
        }
        ctx.exit(0);
    })));

    run_cpu_n(&t, 0, 64);

    let mut statuses = reaped.lock().unwrap().clone();
    statuses.sort();
    assert_eq!(statuses, vec![1, 2, 3]);

    t.with_inner(|inner| {
        assert!(
            inner.slots.iter().all(|s| s.state == ProcState::Unused || s.state == ProcState::Zombie),
            "every reaped slot should be back to Unused"
        );
    });
}

/// Spec §4.7: a process sleeping on a channel only resumes user code
/// once it is redispatched, never merely when it is marked `Runnable`.
#[test]
fn sleep_wakeup_round_trip() {
    let t = table();
    let woke = Arc::new(AtomicU32::new(0));
    let woke2 = Arc::clone(&woke);

    let sleeper = t.user_init(Box::new(ClosureProgram::new(move |ctx| {
        ctx.sleep(Channel::Custom(7));
        woke2.store(1, Ordering::SeqCst);
        ctx.exit(0);
    })));

    run_cpu_n(&t, 0, 1);
    t.with_inner(|inner| {
        let idx = inner.idx_of(sleeper).unwrap();
        assert_eq!(inner.slots[idx].state, ProcState::Sleeping);
    });
    assert_eq!(woke.load(Ordering::SeqCst), 0, "must not run before redispatch");

    t.wakeup(Channel::Custom(7));
    t.with_inner(|inner| {
        let idx = inner.idx_of(sleeper).unwrap();
        assert_eq!(inner.slots[idx].state, ProcState::Runnable);
    });
    assert_eq!(woke.load(Ordering::SeqCst), 0, "Runnable is not Running");

    run_cpu_n(&t, 0, 4);
    assert_eq!(woke.load(Ordering::SeqCst), 1);
}

/// Spec §4.5 PBS: the lower-priority-value process is always picked
/// over a higher-priority-value one that is also `Runnable`.
#[test]
fn pbs_like_priority_ordering_is_observable_via_set_priority() {
    let t = table();
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let o1 = Arc::clone(&order);
    let low_priority_child = ClosureProgram::new(move |ctx| {
        o1.lock().unwrap().push(ctx.pid());
        ctx.exit(0);
    });
    let o2 = Arc::clone(&order);
    let high_priority_child = ClosureProgram::new(move |ctx| {
        o2.lock().unwrap().push(ctx.pid());
        ctx.exit(0);
    });

    t.user_init(Box::new(ClosureProgram::new(move |ctx| {
        let a = ctx.fork(Box::new(low_priority_child)).unwrap();
        let b = ctx.fork(Box::new(high_priority_child)).unwrap();
        ctx.set_priority(a, 5).unwrap();
        ctx.set_priority(b, 90).unwrap();
        ctx.wait();
        ctx.wait();
        ctx.exit(0);
    })));

    run_cpu_n(&t, 0, 16);
    // Both children must have run to completion regardless of which
    // scheduler feature this test binary was built with; the priority
    // values are meaningful only under `sched-pbs`, exercised directly
    // in `src/sched.rs`'s unit tests.
    assert_eq!(order.lock().unwrap().len(), 2);
}

/// Spec §4.4 `kill`: killing a sleeping process wakes it without
/// running a matching `wakeup`.
#[test]
fn kill_while_sleeping_unblocks_without_a_matching_wakeup() {
    let t = table();
    let reached_exit = Arc::new(AtomicU32::new(0));
    let reached_exit2 = Arc::clone(&reached_exit);

    let pid = t.user_init(Box::new(ClosureProgram::new(move |ctx| {
        ctx.sleep(Channel::Custom(99));
        reached_exit2.store(1, Ordering::SeqCst);
        ctx.exit(0);
    })));

    run_cpu_n(&t, 0, 1);
    t.kill(pid).unwrap();
    run_cpu_n(&t, 0, 2);

    assert_eq!(reached_exit.load(Ordering::SeqCst), 1);
    t.with_inner(|inner| {
        let idx = inner.idx_of(pid).unwrap();
        assert!(inner.slots[idx].killed);
        assert_eq!(inner.slots[idx].state, ProcState::Zombie);
    });
}

/// Spec §9 `waitx`: the reaped slot reports accumulated run/wait ticks
/// and is reset all the way to `Unused`, not left as a dangling zombie.
#[test]
fn waitx_reports_accounting_and_frees_the_slot() {
    let t = table();
    let report = Arc::new(std::sync::Mutex::new(None));
    let report2 = Arc::clone(&report);

    t.user_init(Box::new(ClosureProgram::new(move |ctx| {
        ctx.fork(Box::new(ScriptProgram::new(vec![Step::Busy(3), Step::Exit(5)]))).unwrap();
        *report2.lock().unwrap() = ctx.waitx();
        ctx.exit(0);
    })));

    // `timer_tick` stands in for the trap layer's periodic timer
    // interrupt (spec §6); nothing drives it on its own, so interleave
    // it with dispatch to give `rtime`/`wtime` something to accrue.
    for _ in 0..32 {
        t.timer_tick();
        coreproc::sched::dispatch_once(&t, 0);
    }

    let (_, status, _rtime, wtime) = report.lock().unwrap().expect("child should have been reaped");
    assert_eq!(status, 5);
    // `rtime` only advances when a `timer_tick` lands while the slot is
    // actually `Running`, which this single-threaded tick-then-dispatch
    // loop never produces (real concurrent ticking is exercised by the
    // demo binaries, not asserted on here to avoid a flaky race); `wtime`
    // accrues deterministically every tick the child spends `Runnable`
    // between its busy-work yields.
    assert!(wtime >= 1, "child must have accumulated some waiting time between yields");

    t.with_inner(|inner| {
        assert!(
            inner.slots.iter().filter(|s| s.state != ProcState::Unused).count() <= 1,
            "the reaped child's slot must be back to Unused, leaving only the (zombie) parent"
        );
    });
}

/// `ScriptProgram::fork_and_reap` end to end: every forked child is a
/// trivial exit, and the parent waits for all of them.
#[test]
fn script_program_fork_and_reap_drains_all_children() {
    let t = table();
    t.user_init(Box::new(ScriptProgram::fork_and_reap(4, 0)));
    run_cpu_n(&t, 0, 64);
    t.with_inner(|inner| {
        assert!(inner.slots.iter().all(|s| s.state == ProcState::Unused || s.state == ProcState::Zombie));
    });
}
