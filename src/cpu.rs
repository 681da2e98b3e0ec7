//! Per-CPU records and the `push_cli`/`pop_cli` nesting discipline
//! (spec component C3).
//!
//! Grounded on `boranseckin-octopos/kernel/src/proc.rs`'s `Cpu`/
//! `CpuTable`/`InterruptLock` and on the teacher's `riscv.rs`
//! `intr_on`/`intr_off`. On real hardware `mycpu()` reads the `tp`
//! register to find which physical core is asking; here each
//! simulated CPU is a dedicated OS thread, so a thread-local id plays
//! the same role. There is no real interrupt controller to mask, so
//! `push_cli`/`pop_cli` only track nesting depth — enough to keep the
//! discipline spec §4.4/§7 requires of callers (`mycpu()`/`myproc()`
//! demand interrupts disabled) testable and assertable, even though
//! nothing is literally masked.

use std::cell::Cell;
use std::sync::Mutex;

use crate::param::NCPU;
use crate::proc::Pid;

thread_local! {
    static CURRENT_CPU_ID: Cell<Option<usize>> = const { Cell::new(None) };
    static CLI_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Registers the calling OS thread as simulated CPU `id`. Call once,
/// at the top of a dispatch loop's thread body.
pub fn bind_current_thread_to_cpu(id: usize) {
    assert!(id < NCPU, "cpu id {id} out of range (NCPU={NCPU})");
    CURRENT_CPU_ID.with(|c| c.set(Some(id)));
}

/// The simulated CPU id bound to the calling thread, if any.
pub fn current_cpu_id() -> Option<usize> {
    CURRENT_CPU_ID.with(|c| c.get())
}

/// Disables "interrupts" (logically) and increments the nesting
/// counter. Mirrors `push_off`/`push_cli`: the outermost call records
/// whether interrupts were previously enabled; here, since nothing is
/// really masked, it is present purely for contract fidelity and is a
/// cheap counter bump.
pub fn push_cli() {
    CLI_DEPTH.with(|d| d.set(d.get() + 1));
}

/// Pairs with `push_cli`. Panics on an unbalanced pop, matching the
/// teacher's `pop_off` assertion that depth never goes negative.
pub fn pop_cli() {
    CLI_DEPTH.with(|d| {
        let depth = d.get();
        assert!(depth > 0, "pop_cli: not holding cli");
        d.set(depth - 1);
    });
}

/// Asserts the calling thread currently holds at least one `push_cli`
/// — the precondition spec §4.4 places on `mycpu()`/`myproc()`.
pub fn assert_cli_held() {
    let depth = CLI_DEPTH.with(|d| d.get());
    assert!(depth > 0, "called with interrupts enabled (need push_cli)");
}

/// A single simulated CPU's bookkeeping: which process (if any) it is
/// currently running. Spec component C3.
#[derive(Debug, Default)]
pub struct CpuRecord {
    pub running: Mutex<Option<Pid>>,
}

/// The fixed-size table of simulated CPUs (spec component C3, sized
/// by `param::NCPU`).
pub struct CpuTable {
    cpus: [CpuRecord; NCPU],
}

impl CpuTable {
    pub const fn new() -> Self {
        Self {
            cpus: [const { CpuRecord { running: Mutex::new(None) } }; NCPU],
        }
    }

    /// The record for the calling thread's bound CPU. Requires
    /// `push_cli` discipline, same as `mycpu()` in the source.
    pub fn current(&self) -> &CpuRecord {
        assert_cli_held();
        let id = current_cpu_id().expect("current thread is not bound to a simulated cpu");
        &self.cpus[id]
    }

    pub fn get(&self, id: usize) -> &CpuRecord {
        &self.cpus[id]
    }
}

impl Default for CpuTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_nesting_balances() {
        push_cli();
        push_cli();
        pop_cli();
        pop_cli();
    }

    #[test]
    #[should_panic(expected = "not holding cli")]
    fn unbalanced_pop_panics() {
        pop_cli();
    }

    #[test]
    fn current_requires_binding() {
        bind_current_thread_to_cpu(0);
        push_cli();
        let table = CpuTable::new();
        assert!(table.current().running.lock().unwrap().is_none());
        pop_cli();
    }
}
