//! Thin syscall-layer wrappers (spec §6's "exposed upward" table).
//!
//! Grounded on `boranseckin-octopos/kernel/src/sysproc.rs`: each
//! `sys_*` function here does argument validation and shape
//! conversion only, then calls straight into `ProcContext`/
//! `ProcTable` — exactly the division of labor the teacher's
//! `sysproc.rs` has with `proc.rs`. There is no real trap/argument
//! layer to decode registers (VM/trap are out of scope), so these
//! take already-typed arguments instead of reading them off a
//! `TrapFrame`.

use crate::error::KernelError;
use crate::proc::Pid;
use crate::program::{Program, ProcContext};

pub fn sys_getpid(ctx: &ProcContext) -> Pid {
    ctx.pid()
}

pub fn sys_fork(ctx: &ProcContext, child: Box<dyn Program>) -> Result<Pid, KernelError> {
    ctx.fork(child)
}

pub fn sys_exit(ctx: &ProcContext, status: i32) -> ! {
    ctx.exit(status)
}

pub fn sys_wait(ctx: &ProcContext) -> Option<(Pid, i32)> {
    ctx.wait()
}

pub fn sys_waitx(ctx: &ProcContext) -> Option<(Pid, i32, u64, u64)> {
    ctx.waitx()
}

pub fn sys_kill(ctx: &ProcContext, target: Pid) -> Result<(), KernelError> {
    ctx.kill(target)
}

pub fn sys_set_priority(ctx: &ProcContext, target: Pid, new_priority: u8) -> Result<u8, KernelError> {
    ctx.set_priority(target, new_priority)
}

/// Spec §6 `sbrk`/`growproc`: `delta` in bytes, positive to grow.
pub fn sys_sbrk(ctx: &ProcContext, old_size: usize, delta: isize) -> Result<usize, KernelError> {
    ctx.table().growproc(ctx.pid(), old_size, delta)
}

/// Spec §6 `ps`: a debug snapshot of the whole table.
pub fn sys_ps(ctx: &ProcContext) -> Vec<crate::accounting::PsRow> {
    ctx.table().with_inner(|inner| crate::accounting::ps(inner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::NullFs;
    use crate::program::ClosureProgram;
    use crate::proc::ProcTable;
    use crate::vm::NullVm;

    #[test]
    fn sys_getpid_matches_user_init_pid() {
        let t = ProcTable::new(Box::new(NullVm::new()), Box::new(NullFs::new()));
        let observed = std::sync::Arc::new(std::sync::Mutex::new(None));
        let observed2 = std::sync::Arc::clone(&observed);
        let pid = t.user_init(Box::new(ClosureProgram::new(move |ctx| {
            *observed2.lock().unwrap() = Some(sys_getpid(ctx));
            ctx.exit(0);
        })));
        crate::sched::dispatch_once(&t, 0);
        assert_eq!(*observed.lock().unwrap(), Some(pid));
    }
}
