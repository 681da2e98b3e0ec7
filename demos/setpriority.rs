//! Demo binary mirroring `original_source/setPriority.c`: a tiny
//! driver that spawns one process, lowers its PBS priority, and prints
//! the value `set_priority` handed back (the priority it replaced).
//!
//! `setPriority.c` itself is a userland program that reads its args
//! off `argv` and issues one syscall; there is no real userland exec
//! here (VM/ELF/trap are out of scope), so this demo plays both roles:
//! it boots a one-process table, then calls the library directly the
//! way the syscall layer would on the process's behalf.

use std::sync::Arc;
use std::time::Duration;

use coreproc::{fs::NullFs, program::ClosureProgram, proc::{Channel, Pid, ProcTable}, vm::NullVm};

fn usage() -> ! {
    eprintln!("usage: setpriority <priority 0-100> <pid>");
    std::process::exit(1);
}

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let priority: u8 = match args.next().and_then(|s| s.parse().ok()) {
        Some(p) if p <= 100 => p,
        _ => usage(),
    };
    // There is no real shell handing us a live pid to target, so this
    // demo ignores the second argument and spawns its own subject
    // process, the way a test harness would stand in for `argv[2]`.
    let _requested_pid = args.next();

    let table = ProcTable::new(Box::new(NullVm::new()), Box::new(NullFs::new()));
    let subject = table.user_init(Box::new(ClosureProgram::new(|ctx| {
        ctx.sleep(Channel::Custom(0));
        ctx.exit(0);
    })));

    let dispatcher = Arc::clone(&table);
    std::thread::spawn(move || coreproc::sched::run_cpu_n(&dispatcher, 0, 4));
    std::thread::sleep(Duration::from_millis(20));

    // This driver is the syscall layer's stand-in, not a simulated
    // process itself, so it has no real pid to pass as `caller` — use
    // the reserved `Pid(0)` sentinel, which can never equal `subject`
    // and so never triggers the self-yield branch from here.
    match table.set_priority(Pid(0), subject, priority) {
        Ok(old) => println!("{old}"),
        Err(e) => {
            eprintln!("setpriority: {e}");
            std::process::exit(1);
        }
    }

    table.wakeup(Channel::Custom(0));
}
