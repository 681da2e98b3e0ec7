//! Demo binary mirroring `original_source/time.c`: forks a child, waits
//! for it with `waitx`, and prints the accumulated run/wait ticks
//! `time.c` reports for whatever command it wrapped.
//!
//! `time.c` wraps a real `exec`; there is no exec here (VM/ELF are out
//! of scope), so the "command" is a `Busy`/`Exit` `ScriptProgram`
//! standing in for whatever workload a real shell would have execed.

use coreproc::fs::NullFs;
use coreproc::proc::ProcTable;
use coreproc::vm::NullVm;
use coreproc::{ClosureProgram, ScriptProgram, Step};

fn main() {
    env_logger::init();

    let busy_ticks: u32 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(8);

    let table = ProcTable::new(Box::new(NullVm::new()), Box::new(NullFs::new()));
    table.user_init(Box::new(ClosureProgram::new(move |ctx| {
        ctx.fork(Box::new(ScriptProgram::new(vec![Step::Busy(busy_ticks), Step::Exit(0)])))
            .expect("fork failed");
        match ctx.waitx() {
            Some((pid, status, rtime, wtime)) => {
                println!("child {pid} exited {status}: rtime={rtime} wtime={wtime}");
            }
            None => println!("no child to wait for"),
        }
        ctx.exit(0);
    })));

    coreproc::sched::run_cpu_n(&table, 0, (busy_ticks as usize) * 2 + 8);
}
