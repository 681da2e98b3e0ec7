//! What a process "runs" in this crate's execution model
//! (`SPEC_FULL.md` §D).
//!
//! There is no kernel stack to jump into here — VM and traps are
//! external collaborators (spec §1, §6) — so a process is a `Program`
//! trait object run to completion on its own OS thread, and
//! `ProcContext` is the thin handle that thread uses to call back
//! into the process table (fork/sleep/wait/yield/exit), the same way
//! the source's `curproc` lets kernel code executing on behalf of a
//! process reach its own slot.

use std::sync::Arc;

use crate::error::KernelError;
use crate::proc::{Channel, Pid, ProcTable};
use crate::queue::alloc_free_vec::DisplayVec;

/// Something a process thread runs. Implementors call back into the
/// table through `ctx` to fork, sleep, wait, yield or exit; `run`
/// returning without calling `ctx.exit` is equivalent to falling off
/// the end of `main` — the table exits the process with status 0.
pub trait Program: Send {
    fn run(&mut self, ctx: &ProcContext);
}

/// The per-process handle a `Program` uses to act on its own behalf.
/// Every method blocks the calling (process) thread exactly the way
/// the corresponding kernel function blocks the calling process in
/// the source.
pub struct ProcContext {
    table: Arc<ProcTable>,
    pid: Pid,
}

impl ProcContext {
    pub(crate) fn new(table: Arc<ProcTable>, pid: Pid) -> Self {
        Self { table, pid }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Spec §4.3 `fork`. Returns the child's pid.
    pub fn fork(&self, child_program: Box<dyn Program>) -> Result<Pid, KernelError> {
        self.table.fork(self.pid, child_program)
    }

    /// Spec §4.4 `exit`. Never returns.
    pub fn exit(&self, status: i32) -> ! {
        self.table.exit(self.pid, status)
    }

    /// Spec §4.4 `wait`. `None` if this process has no children.
    pub fn wait(&self) -> Option<(Pid, i32)> {
        self.table.wait(self.pid)
    }

    /// Spec §9 `waitx`.
    pub fn waitx(&self) -> Option<(Pid, i32, u64, u64)> {
        self.table.waitx(self.pid)
    }

    /// Spec §4.7 `sleep`.
    pub fn sleep(&self, chan: Channel) {
        self.table.sleep(self.pid, chan)
    }

    /// Spec §4.7 `wakeup`. Not pid-scoped — any process may wake any
    /// channel, matching the source.
    pub fn wakeup(&self, chan: Channel) {
        self.table.wakeup(chan)
    }

    /// Spec §4.6 `yield`.
    pub fn yield_now(&self) {
        self.table.yield_now(self.pid)
    }

    /// Spec §4.4 `kill`, targeting an arbitrary pid.
    pub fn kill(&self, target: Pid) -> Result<(), KernelError> {
        self.table.kill(target)
    }

    /// Spec §9 `set_priority`, targeting an arbitrary pid. Self-yields
    /// (via `ProcTable::set_priority`) exactly when `target == self.pid`.
    pub fn set_priority(&self, target: Pid, new_priority: u8) -> Result<u8, KernelError> {
        self.table.set_priority(self.pid, target, new_priority)
    }

    pub fn table(&self) -> &Arc<ProcTable> {
        &self.table
    }
}

/// Wraps a plain closure as a `Program`, for tests and the `demos/`
/// binaries that don't need a named type.
pub struct ClosureProgram<F: FnMut(&ProcContext) + Send> {
    f: Option<F>,
}

impl<F: FnMut(&ProcContext) + Send> ClosureProgram<F> {
    pub fn new(f: F) -> Self {
        Self { f: Some(f) }
    }
}

impl<F: FnMut(&ProcContext) + Send> Program for ClosureProgram<F> {
    fn run(&mut self, ctx: &ProcContext) {
        if let Some(mut f) = self.f.take() {
            f(ctx);
        }
    }
}

/// A single action in a `ScriptProgram` (spec §8's end-to-end
/// scenarios, written as data instead of bespoke `Program` impls).
pub enum Step {
    /// Forks a child running the given program.
    Fork(Box<dyn Program>),
    /// Sleeps on a channel.
    Sleep(Channel),
    /// Busy-work: yields `count` times in a row, simulating a process
    /// that keeps using the CPU across several quanta.
    Busy(u32),
    /// Voluntarily yields once.
    Yield,
    /// Waits for one child, discarding the result.
    WaitChild,
    /// Exits with the given status. Must be the last step — any steps
    /// after it are never reached, `exit` does not return.
    Exit(i32),
}

/// Drives a fixed sequence of `Step`s. The common case for integration
/// tests: describe a scenario as data rather than writing a new
/// `Program` impl per test.
pub struct ScriptProgram {
    steps: Vec<Step>,
}

impl ScriptProgram {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Convenience for "fork `n` trivial children that exit
    /// immediately, then wait for all of them."
    pub fn fork_and_reap(n: usize, child_exit_status: i32) -> Self {
        let mut steps: Vec<Step> = (0..n)
            .map(|_| Step::Fork(Box::new(ClosureProgram::new(move |ctx: &ProcContext| ctx.exit(child_exit_status)))))
            .collect();
        for _ in 0..n {
            steps.push(Step::WaitChild);
        }
        steps.push(Step::Exit(0));
        Self::new(steps)
    }
}

impl Program for ScriptProgram {
    fn run(&mut self, ctx: &ProcContext) {
        let mut forked: DisplayVec<Pid> = DisplayVec::default();
        for step in self.steps.drain(..) {
            match step {
                Step::Fork(program) => {
                    if let Ok(pid) = ctx.fork(program) {
                        forked.push(pid);
                    }
                }
                Step::Sleep(chan) => ctx.sleep(chan),
                Step::Busy(count) => {
                    for _ in 0..count {
                        ctx.yield_now();
                    }
                }
                Step::Yield => ctx.yield_now(),
                Step::WaitChild => {
                    ctx.wait();
                }
                Step::Exit(status) => ctx.exit(status),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::NullFs;
    use crate::vm::NullVm;

    #[test]
    fn closure_program_runs_once() {
        let t = ProcTable::new(Box::new(NullVm::new()), Box::new(NullFs::new()));
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let ran2 = Arc::clone(&ran);
        let pid = t.user_init(Box::new(ClosureProgram::new(move |ctx| {
            ran2.store(true, std::sync::atomic::Ordering::SeqCst);
            ctx.exit(0);
        })));
        crate::sched::dispatch_once(&t, 0);
        assert!(ran.load(std::sync::atomic::Ordering::SeqCst));
        let _ = pid;
    }
}
