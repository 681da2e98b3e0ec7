//! Build-time configuration constants.
//!
//! Grounded on the teacher's `param.rs`: plain `pub const`s, one per
//! line, doc-commented with what it bounds.

/// Maximum number of simulated CPUs.
pub const NCPU: usize = 8;
/// Maximum number of concurrent processes.
pub const NPROC: usize = 64;
/// Open files per process.
pub const NOFILE: usize = 16;
/// Number of MLFQ priority levels.
pub const MLFQSIZE: usize = 5;
/// MLFQ quantum, in ticks, before a process is punished (demoted).
pub const MLFQ_QUANTUM: [u32; MLFQSIZE] = [1, 2, 4, 8, 16];
/// Ticks a RUNNABLE process may wait in a queue before `age_processes`
/// promotes it to `queue - 1`. Resolves spec §9's open aging policy.
pub const AGING_THRESHOLD_TICKS: u64 = 30;
/// Default priority for all but the first two processes (PBS).
pub const DEFAULT_PRIORITY: u8 = 60;
/// Priority given to the first two processes (PBS): init and the shell.
pub const INIT_PRIORITY: u8 = 1;
