//! `coreproc` — the process table, lifecycle manager and pluggable
//! scheduler of a teaching kernel, modeled as a host-testable library.
//!
//! Virtual memory, trap handling, the file system, ELF loading and
//! the console are external collaborators: this crate models their
//! interfaces (`vm::Vm`, `fs::Fs`) rather than implementing them, and
//! exercises the process subsystem itself — the process table,
//! fork/exit/wait/kill, sleep/wakeup rendezvous, and the RR/FCFS/PBS/
//! MLFQ scheduler policies — under real concurrency: one OS thread per
//! simulated CPU, one OS thread per simulated process, everything
//! synchronized by the single coarse table lock the design calls for.
//! See `SPEC_FULL.md` for the full requirements this implements and
//! `DESIGN.md` for where each piece is grounded.

pub mod accounting;
pub mod cpu;
pub mod error;
pub mod fs;
pub mod param;
pub mod program;
pub mod proc;
pub mod queue;
pub mod sched;
pub mod sysproc;
pub mod vm;

pub use error::KernelError;
pub use proc::{Channel, Pid, ProcState, ProcTable};
pub use program::{ClosureProgram, Program, ProcContext, ScriptProgram, Step};
pub use sched::{ActivePolicy, Fcfs, Mlfq, Pbs, Policy, RoundRobin};
