//! The process table and lifecycle manager (spec §3, §4 — components
//! C2/C4/C5/C6/C7).
//!
//! Grounded on `boranseckin-octopos/kernel/src/proc.rs`'s `Proc`/
//! `ProcState`/`ProcTable` and its `fork`/`exit`/`wait`/`sleep`/
//! `wakeup`/`kill` functions, generalized from the teacher's
//! per-slot-lock-plus-separate-parents-lock design to the single
//! coarse mutex spec §4.2/§9 requires ("the design is deliberately
//! single-locked; preserve that"). Exact lifecycle-bug semantics
//! (`waitx`'s state reset, default PBS priorities, the unified
//! `userinit` banner, `set_priority`'s self-yield) are taken from
//! `original_source/proc.c`, as resolved in `SPEC_FULL.md` §B.
//!
//! Every function below that touches more than one slot's worth of
//! state takes the table's single `Mutex` — never a slot-local lock —
//! matching spec §4.2 ("one mutex guards every field of every slot,
//! the pid counter, and every MLFQ queue").

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::cpu::CpuTable;
use crate::error::KernelError;
use crate::fs::{Fs, FileHandle, InodeHandle};
use crate::param::{AGING_THRESHOLD_TICKS, DEFAULT_PRIORITY, INIT_PRIORITY, MLFQSIZE, NOFILE, NPROC};
use crate::program::{Program, ProcContext};
use crate::queue::CircularQueue;
use crate::vm::{PageTableHandle, Vm};

/// A process id (spec glossary: "pid"). `0` is never assigned — it is
/// reserved the way the source reserves it for "no parent"/"no pid
/// yet", matching `Pid::alloc` in the teacher starting its counter
/// at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A rendezvous token processes sleep and wake on (spec §4.7:
/// "opaque, value-typed; never a raw pointer"). `Proc` matches the
/// source's convention of a parent sleeping on its own pid and a
/// child's `exit` waking on that same value; `Custom` is an escape
/// hatch for tests that want a producer/consumer channel unrelated to
/// any specific pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Proc(u32),
    Ticks,
    Custom(u64),
}

/// The six-state process lifecycle (spec §3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Unused,
    Embryo,
    Runnable,
    Running,
    Sleeping,
    Zombie,
}

/// One process table entry (spec §3.1, component C2). Everything here
/// lives behind the table's single mutex — there is deliberately no
/// per-slot lock, unlike the teacher.
pub struct ProcSlot {
    pub state: ProcState,
    pub pid: Pid,
    pub parent: Option<usize>,
    pub killed: bool,
    pub xstate: i32,
    pub channel: Option<Channel>,
    pub name: String,

    /// PBS priority, 0 (highest) .. 100 (lowest).
    pub priority: u8,
    /// MLFQ queue currently holding this process, 0 (highest) to
    /// `MLFQSIZE - 1`.
    pub cur_queue: usize,
    /// Tick at which this process entered `cur_queue` — aging clock.
    pub queue_entered_at: u64,
    /// Consecutive ticks run in the current MLFQ quantum.
    pub time_slices: u32,
    /// Set when a quantum is exceeded; cleared (and the process
    /// demoted one queue) the next time it is requeued.
    pub punish: bool,

    /// Tick of creation — FCFS's sort key.
    pub ctime: u64,
    pub etime: u64,
    pub rtime: u64,
    pub wtime: u64,
    pub iotime: u64,
    pub n_sched: u32,

    pub pagetable: Option<PageTableHandle>,
    /// Size of the address space in bytes, as last reported by `Vm`
    /// (spec §3.1: "memory: size in bytes; page-directory handle").
    /// Kept up to date by `growproc` and copied across `fork`; read
    /// back at reap time so `free_vm` is told the real size instead
    /// of always freeing as if the process never grew.
    pub size: usize,
    pub open_files: [Option<FileHandle>; NOFILE],
    pub cwd: Option<InodeHandle>,
}

impl ProcSlot {
    pub(crate) fn unused() -> Self {
        Self {
            state: ProcState::Unused,
            pid: Pid(0),
            parent: None,
            killed: false,
            xstate: 0,
            channel: None,
            name: String::new(),
            priority: DEFAULT_PRIORITY,
            cur_queue: 0,
            queue_entered_at: 0,
            time_slices: 0,
            punish: false,
            ctime: 0,
            etime: 0,
            rtime: 0,
            wtime: 0,
            iotime: 0,
            n_sched: 0,
            pagetable: None,
            size: 0,
            open_files: [None; NOFILE],
            cwd: None,
        }
    }
}

/// Everything the single mutex guards: every slot, the pid counter,
/// and every MLFQ queue (spec §4.2).
pub struct ProcTableInner {
    pub slots: Vec<ProcSlot>,
    pub next_pid: u32,
    pub mlfq: [CircularQueue<Pid>; MLFQSIZE],
}

impl ProcTableInner {
    pub(crate) fn new() -> Self {
        Self {
            slots: (0..NPROC).map(|_| ProcSlot::unused()).collect(),
            next_pid: 1,
            mlfq: [CircularQueue::new(); MLFQSIZE],
        }
    }

    pub fn idx_of(&self, pid: Pid) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.state != ProcState::Unused && s.pid == pid)
    }
}

/// The process table (spec component C4), one coarse mutex, one
/// shared condvar used for every rendezvous: dispatch hand-off,
/// sleep/wakeup, and a freshly-forked thread waiting for its first
/// dispatch. See `SPEC_FULL.md` §D for why one condvar suffices.
pub struct ProcTable {
    inner: Mutex<ProcTableInner>,
    cvar: Condvar,
    ticks: std::sync::atomic::AtomicU64,
    vm: Box<dyn Vm>,
    fs: Box<dyn Fs>,
    cpus: CpuTable,
}

impl ProcTable {
    pub fn new(vm: Box<dyn Vm>, fs: Box<dyn Fs>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(ProcTableInner::new()),
            cvar: Condvar::new(),
            ticks: std::sync::atomic::AtomicU64::new(0),
            vm,
            fs,
            cpus: CpuTable::new(),
        })
    }

    pub fn vm(&self) -> &dyn Vm {
        self.vm.as_ref()
    }

    pub fn fs(&self) -> &dyn Fs {
        self.fs.as_ref()
    }

    pub fn cpus(&self) -> &CpuTable {
        &self.cpus
    }

    pub(crate) fn lock_inner(&self) -> MutexGuard<'_, ProcTableInner> {
        self.inner.lock().unwrap()
    }

    pub fn current_tick(&self) -> u64 {
        self.ticks.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Advances the simulated clock by one tick and runs the
    /// accounting the real timer-interrupt handler would (spec §6:
    /// "the trap layer invokes `update_timing`").
    pub fn timer_tick(self: &Arc<Self>) {
        self.ticks.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let mut inner = self.inner.lock().unwrap();
        crate::accounting::update_timing(&mut inner);
    }

    /// Best-effort, non-blocking snapshot for `procdump` (spec §9: the
    /// one place the source reads without the lock). Returns `None`
    /// instead of blocking if the table is currently held elsewhere.
    pub fn try_snapshot(&self) -> Option<Vec<crate::accounting::PsRow>> {
        self.inner.try_lock().ok().map(|inner| crate::accounting::ps(&inner))
    }

    /// Runs a closure with the locked inner table — an escape hatch
    /// for `accounting.rs`/`sched.rs`, which operate on several slots
    /// at once and would otherwise need every query duplicated here.
    pub fn with_inner<R>(&self, f: impl FnOnce(&mut ProcTableInner) -> R) -> R {
        let mut inner = self.inner.lock().unwrap();
        f(&mut inner)
    }

    /// Blocks the calling (CPU dispatcher) thread until slot `idx`
    /// stops being `Running` — the "process releases the lock when
    /// it stops running" half of the rendezvous (spec §4.5, §9).
    pub(crate) fn wait_while_running<'a>(
        &'a self,
        inner: MutexGuard<'a, ProcTableInner>,
        idx: usize,
    ) -> MutexGuard<'a, ProcTableInner> {
        self.cvar
            .wait_while(inner, |t| t.slots[idx].state == ProcState::Running)
            .unwrap()
    }

    pub(crate) fn notify_all(&self) {
        self.cvar.notify_all();
    }

    /// The "sched()" analog (spec §4.6): asserts the contract, then
    /// blocks until the scheduler marks this slot `Running` again.
    /// Used by `yield_now`, `sleep` and the fresh-thread rendezvous.
    fn park_until_running<'a>(
        &'a self,
        mut inner: MutexGuard<'a, ProcTableInner>,
        idx: usize,
    ) -> MutexGuard<'a, ProcTableInner> {
        assert_ne!(
            inner.slots[idx].state,
            ProcState::Running,
            "sched(): called while still RUNNING"
        );
        self.cvar.notify_all();
        loop {
            inner = self.cvar.wait(inner).unwrap();
            if inner.slots[idx].state == ProcState::Running {
                return inner;
            }
        }
    }

    /// Marks slot `idx` `Runnable` and hands it to the active policy's
    /// `on_runnable` hook (MLFQ pushes onto queue 0; RR/FCFS/PBS need
    /// no bookkeeping). Caller holds the lock.
    fn mark_runnable_locked(&self, inner: &mut ProcTableInner, idx: usize) {
        let now = self.current_tick();
        inner.slots[idx].state = ProcState::Runnable;
        inner.slots[idx].queue_entered_at = now;
        crate::sched::ActivePolicy::on_runnable(inner, idx);
        self.notify_all();
    }

    /// Allocates a free slot (spec §4.3 `allocproc`), assigns it a
    /// pid, and spawns the OS thread that will run `program` once the
    /// scheduler dispatches it. Does **not** mark the slot `Runnable`
    /// — callers (`user_init`, `fork`) do that once setup (VM, cwd)
    /// is complete, matching the source's `allocproc`/`userinit`
    /// split.
    fn alloc(
        self: &Arc<Self>,
        program: Box<dyn Program>,
        is_init_or_shell: bool,
        name: impl Into<String>,
    ) -> Result<(Pid, usize), KernelError> {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner
            .slots
            .iter()
            .position(|s| s.state == ProcState::Unused)
            .ok_or(KernelError::OutOfProc)?;

        let pid = Pid(inner.next_pid);
        inner.next_pid += 1;

        let slot = &mut inner.slots[idx];
        *slot = ProcSlot::unused();
        slot.state = ProcState::Embryo;
        slot.pid = pid;
        slot.name = name.into();
        slot.ctime = self.current_tick();
        slot.priority = if is_init_or_shell { INIT_PRIORITY } else { DEFAULT_PRIORITY };

        log::debug!("alloc: pid {pid} ({})", slot.name);
        drop(inner);

        let table = Arc::clone(self);
        // The returned `JoinHandle` is intentionally dropped: `exit`
        // parks this thread forever rather than returning, so there
        // is nothing useful to join — dropping a `JoinHandle` detaches
        // the thread without signaling it to stop, which is exactly
        // what a parked zombie thread should do until the table
        // itself is dropped.
        std::thread::Builder::new()
            .name(format!("proc-{pid}"))
            .spawn(move || proc_main(table, pid, program))
            .expect("failed to spawn process thread");

        Ok((pid, idx))
    }

    /// Spawns the first process (spec §4.3 `userinit`) and makes it
    /// `Runnable` directly — there is no parent to fork from.
    pub fn user_init(self: &Arc<Self>, program: Box<dyn Program>) -> Pid {
        let (pid, idx) = self
            .alloc(program, true, "init")
            .expect("userinit: process table unexpectedly full");
        let mut inner = self.inner.lock().unwrap();
        inner.slots[idx].pagetable = self.vm.setup_kvm().ok();
        inner.slots[idx].cwd = self.fs.namei("/").ok();
        log::info!("scheduler policy: {}", crate::sched::ActivePolicy::NAME);
        self.mark_runnable_locked(&mut inner, idx);
        pid
    }

    /// Spec §4.3 `fork`: allocates a child slot, copies the parent's
    /// address space, and marks the child `Runnable`. Returns the
    /// child's pid to the caller — unlike the source, there is no
    /// "0 in the child" return, because the child is a distinct
    /// `Program`, not a register-level copy of the parent (see
    /// `SPEC_FULL.md` §D).
    pub fn fork(self: &Arc<Self>, parent: Pid, child_program: Box<dyn Program>) -> Result<Pid, KernelError> {
        let (parent_idx, parent_pt, parent_name, parent_size) = {
            let inner = self.inner.lock().unwrap();
            let idx = inner.idx_of(parent).ok_or(KernelError::NoSuchProcess)?;
            (idx, inner.slots[idx].pagetable, inner.slots[idx].name.clone(), inner.slots[idx].size)
        };

        let (child_pid, child_idx) = self.alloc(child_program, false, format!("{parent_name}-child"))?;

        let child_pt = match parent_pt {
            Some(pt) => match self.vm.copy_uvm(pt, parent_size) {
                Ok(pt) => Some(pt),
                Err(e) => {
                    // `alloc` already transitioned the child slot to
                    // `Embryo` and spawned its OS thread, parked in
                    // `wait_for_first_dispatch`. Unwind both: free the
                    // slot and let the parked thread observe that its
                    // pid no longer owns it, so it exits on its own
                    // instead of leaking forever (spec §4.3 "failures
                    // at any allocation step must unwind cleanly").
                    let mut inner = self.inner.lock().unwrap();
                    inner.slots[child_idx] = ProcSlot::unused();
                    self.notify_all();
                    log::warn!("fork: copy_uvm failed for pid {parent} -> pid {child_pid}: {e}");
                    return Err(e);
                }
            },
            None => self.vm.setup_kvm().ok(),
        };

        let mut inner = self.inner.lock().unwrap();
        inner.slots[child_idx].parent = Some(parent_idx);
        inner.slots[child_idx].pagetable = child_pt;
        inner.slots[child_idx].size = parent_size;
        for i in 0..NOFILE {
            if let Some(f) = inner.slots[parent_idx].open_files[i] {
                inner.slots[child_idx].open_files[i] = Some(self.fs.file_dup(f));
            }
        }
        inner.slots[child_idx].cwd = inner.slots[parent_idx].cwd.map(|c| self.fs.inode_dup(c));

        log::debug!("fork: pid {parent} -> pid {child_pid}");
        self.mark_runnable_locked(&mut inner, child_idx);
        Ok(child_pid)
    }

    /// Spec §4.4 `exit`. Never returns: the calling thread parks
    /// forever once the state transition to `Zombie` is visible,
    /// matching the source's `panic("zombie exit")` being unreachable
    /// by construction rather than by convention.
    pub fn exit(self: &Arc<Self>, pid: Pid, status: i32) -> ! {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner.idx_of(pid).expect("exit: pid not in table");

        for i in 0..NOFILE {
            if let Some(f) = inner.slots[idx].open_files[i].take() {
                self.fs.file_close(f);
            }
        }
        if let Some(cwd) = inner.slots[idx].cwd.take() {
            self.fs.begin_op();
            self.fs.inode_put(cwd);
            self.fs.end_op();
        }

        let init_idx = inner.slots.iter().position(|s| s.name == "init");
        self.reparent_children_locked(&mut inner, idx, init_idx);

        inner.slots[idx].xstate = status;
        inner.slots[idx].etime = self.current_tick();
        inner.slots[idx].state = ProcState::Zombie;
        log::debug!("exit: pid {pid} status {status}");

        if let Some(parent_idx) = inner.slots[idx].parent {
            let parent_pid = inner.slots[parent_idx].pid;
            self.wakeup_locked(&mut inner, Channel::Proc(parent_pid.0));
        }
        self.notify_all();
        drop(inner);

        loop {
            std::thread::park();
        }
    }

    fn reparent_children_locked(&self, inner: &mut ProcTableInner, exiting_idx: usize, init_idx: Option<usize>) {
        let Some(init_idx) = init_idx else { return };
        let mut woke_init = false;
        for i in 0..inner.slots.len() {
            if inner.slots[i].parent == Some(exiting_idx) {
                inner.slots[i].parent = Some(init_idx);
                if inner.slots[i].state == ProcState::Zombie {
                    woke_init = true;
                }
            }
        }
        if woke_init {
            let init_pid = inner.slots[init_idx].pid;
            self.wakeup_locked(inner, Channel::Proc(init_pid.0));
        }
    }

    /// Spec §4.4 `wait`: blocks until a child becomes `Zombie`, reaps
    /// it, and returns its pid and exit status. `None` if the caller
    /// has no children at all.
    pub fn wait(self: &Arc<Self>, pid: Pid) -> Option<(Pid, i32)> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            let self_idx = inner.idx_of(pid).expect("wait: pid not in table");
            let mut have_children = false;
            for i in 0..inner.slots.len() {
                if inner.slots[i].parent != Some(self_idx) {
                    continue;
                }
                have_children = true;
                if inner.slots[i].state == ProcState::Zombie {
                    let (child_pid, status) = self.reap_locked(&mut inner, i, false);
                    return Some((child_pid, status));
                }
            }
            if !have_children || inner.slots[self_idx].killed {
                return None;
            }
            inner.slots[self_idx].channel = Some(Channel::Proc(pid.0));
            inner.slots[self_idx].state = ProcState::Sleeping;
            inner = self.park_until_running(inner, self_idx);
        }
    }

    /// Spec §9 `waitx`: like `wait`, but also reports accumulated run
    /// and wait time, and — the fixed bug — resets the reaped slot to
    /// `Unused` exactly like `wait` does (the source leaves this
    /// commented out).
    pub fn waitx(self: &Arc<Self>, pid: Pid) -> Option<(Pid, i32, u64, u64)> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            let self_idx = inner.idx_of(pid).expect("waitx: pid not in table");
            let mut have_children = false;
            for i in 0..inner.slots.len() {
                if inner.slots[i].parent != Some(self_idx) {
                    continue;
                }
                have_children = true;
                if inner.slots[i].state == ProcState::Zombie {
                    let rtime = inner.slots[i].rtime;
                    let wtime = inner.slots[i].wtime;
                    let (child_pid, status) = self.reap_locked(&mut inner, i, true);
                    return Some((child_pid, status, rtime, wtime));
                }
            }
            if !have_children || inner.slots[self_idx].killed {
                return None;
            }
            inner.slots[self_idx].channel = Some(Channel::Proc(pid.0));
            inner.slots[self_idx].state = ProcState::Sleeping;
            inner = self.park_until_running(inner, self_idx);
        }
    }

    /// Reaps a zombie slot: frees its address space and resets it to
    /// `Unused`. Both `wait` and `waitx` reset to `Unused` — the
    /// source's `waitx` skips this (a commented-out assignment); spec
    /// §9 calls it a bug, so this crate fixes it for both call sites.
    /// The zombie's OS thread is already parked forever by this point
    /// (see `exit`) and is simply abandoned — nothing left to join.
    fn reap_locked(&self, inner: &mut ProcTableInner, idx: usize, _waitx: bool) -> (Pid, i32) {
        let pid = inner.slots[idx].pid;
        let status = inner.slots[idx].xstate;
        let size = inner.slots[idx].size;
        if let Some(pt) = inner.slots[idx].pagetable.take() {
            self.vm.free_vm(pt, size);
        }
        inner.slots[idx] = ProcSlot::unused();
        (pid, status)
    }

    /// Spec §9 `set_priority`: returns the target's previous PBS
    /// priority, clamps to `[0, 100]`, and self-yields if `caller`
    /// changed its own priority (the source's `set_priority` calls
    /// `yield()` unconditionally when `pid == myproc()->pid`). `caller`
    /// is the pid of the process actually making the call — it is the
    /// only slot this method is ever allowed to park, since `yield_now`
    /// parks whichever OS thread calls it, not the slot named by `pid`.
    pub fn set_priority(self: &Arc<Self>, caller: Pid, pid: Pid, new_priority: u8) -> Result<u8, KernelError> {
        if new_priority > 100 {
            return Err(KernelError::InvalidArgument);
        }
        let old = {
            let mut inner = self.inner.lock().unwrap();
            let idx = inner.idx_of(pid).ok_or(KernelError::NoSuchProcess)?;
            let old = inner.slots[idx].priority;
            inner.slots[idx].priority = new_priority;
            old
        };
        if pid == caller {
            self.yield_now(caller);
        }
        Ok(old)
    }

    /// Spec §4.4 `kill`: marks the target killed, and if it is
    /// currently `Sleeping`, wakes it (so it observes `killed` the
    /// next time it checks, exactly as the source does).
    pub fn kill(&self, pid: Pid) -> Result<(), KernelError> {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner.idx_of(pid).ok_or(KernelError::NoSuchProcess)?;
        inner.slots[idx].killed = true;
        if inner.slots[idx].state == ProcState::Sleeping {
            inner.slots[idx].state = ProcState::Runnable;
            inner.slots[idx].channel = None;
        }
        self.notify_all();
        Ok(())
    }

    /// Spec §4.7 `sleep`: atomically gives up the CPU on `chan` and
    /// blocks until a matching `wakeup`. Always uses the table's own
    /// lock as the "lk" the source's `sleep(chan, lk)` takes — every
    /// in-scope caller (`wait`/`waitx`/a ticks-based sleep) already
    /// holds no other lock, so the general "different lock" branch of
    /// the source is vestigial here (see `DESIGN.md`).
    pub fn sleep(&self, pid: Pid, chan: Channel) {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner.idx_of(pid).expect("sleep: pid not in table");
        inner.slots[idx].channel = Some(chan);
        inner.slots[idx].state = ProcState::Sleeping;
        // `wakeup` only promotes Sleeping -> Runnable; this process's
        // code must not resume until the scheduler actually dispatches
        // it again (Runnable -> Running), so this waits on the same
        // predicate `yield_now` does, not merely "no longer sleeping".
        inner = self.park_until_running(inner, idx);
        drop(inner);
    }

    /// Spec §4.7 `wakeup`: every slot `Sleeping` on `chan` becomes
    /// `Runnable`; the channel is cleared on the same transition
    /// (spec invariant I-CH).
    pub fn wakeup(&self, chan: Channel) {
        let mut inner = self.inner.lock().unwrap();
        self.wakeup_locked(&mut inner, chan);
    }

    fn wakeup_locked(&self, inner: &mut ProcTableInner, chan: Channel) {
        for i in 0..inner.slots.len() {
            if inner.slots[i].state == ProcState::Sleeping && inner.slots[i].channel == Some(chan) {
                inner.slots[i].channel = None;
                self.mark_runnable_locked(inner, i);
            }
        }
        self.notify_all();
    }

    /// Spec §4.6 `yield`: gives up the CPU voluntarily, becoming
    /// `Runnable` again, and blocks until redispatched.
    pub fn yield_now(&self, pid: Pid) {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner.idx_of(pid).expect("yield: pid not in table");
        inner.slots[idx].state = ProcState::Runnable;
        inner = self.park_until_running(inner, idx);
        drop(inner);
    }

    /// Spec §6 `growproc`/`sbrk`: grows (`delta > 0`) or shrinks
    /// (`delta < 0`) the caller's address space via the `Vm`
    /// collaborator.
    pub fn growproc(&self, pid: Pid, old_size: usize, delta: isize) -> Result<usize, KernelError> {
        let inner = self.inner.lock().unwrap();
        let idx = inner.idx_of(pid).ok_or(KernelError::NoSuchProcess)?;
        let pt = inner.slots[idx].pagetable.ok_or(KernelError::Alloc)?;
        drop(inner);
        let new_size = if delta >= 0 {
            self.vm.alloc_uvm(pt, old_size, old_size + delta as usize)?
        } else {
            self.vm.dealloc_uvm(pt, old_size, old_size - (-delta) as usize)
        };
        let mut inner = self.inner.lock().unwrap();
        if let Some(idx) = inner.idx_of(pid) {
            inner.slots[idx].size = new_size;
        }
        Ok(new_size)
    }

    /// Blocks a freshly spawned process thread until the scheduler
    /// dispatches it for the first time. Returns `false` instead if the
    /// slot is torn down before that ever happens — an aborted `fork`
    /// whose `copy_uvm` failed resets the slot to `Unused`, which no
    /// longer matches `pid`, so the wait ends without ever observing
    /// `Running`.
    fn wait_for_first_dispatch(&self, pid: Pid) -> bool {
        let mut inner = self.inner.lock().unwrap();
        loop {
            match inner.idx_of(pid) {
                Some(idx) if inner.slots[idx].state == ProcState::Running => return true,
                Some(_) => {}
                None => return false,
            }
            inner = self.cvar.wait(inner).unwrap();
        }
    }
}

fn proc_main(table: Arc<ProcTable>, pid: Pid, mut program: Box<dyn Program>) {
    if !table.wait_for_first_dispatch(pid) {
        log::debug!("proc_main: pid {pid} torn down before its first dispatch, exiting thread");
        return;
    }
    let ctx = ProcContext::new(Arc::clone(&table), pid);
    program.run(&ctx);
    // A `Program` that returns without calling `ctx.exit` falls off
    // the end like `main` returning — exit with status 0.
    table.exit(pid, 0);
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
    fn user_init_is_runnable_immediately() {
        let t = table();
        let pid = t.user_init(Box::new(ClosureProgram::new(|ctx| ctx.exit(0))));
        t.with_inner(|inner| {
            let idx = inner.idx_of(pid).unwrap();
            assert_eq!(inner.slots[idx].state, ProcState::Runnable);
            assert_eq!(inner.slots[idx].priority, INIT_PRIORITY);
        });
    }

    #[test]
    fn fork_child_defaults_to_standard_priority() {
        let t = table();
        let parent = t.user_init(Box::new(ClosureProgram::new(|ctx| {
            ctx.fork(Box::new(ClosureProgram::new(|c| c.exit(0)))).unwrap();
            ctx.exit(0);
        })));
        // Drive one dispatch so the init program actually runs and forks.
        crate::sched::dispatch_once(&t, 0);
        t.with_inner(|inner| {
            let child = inner
                .slots
                .iter()
                .find(|s| s.parent == Some(inner.idx_of(parent).unwrap()))
                .expect("child registered");
            assert_eq!(child.priority, DEFAULT_PRIORITY);
        });
    }

    #[test]
    fn kill_wakes_a_sleeper() {
        let t = table();
        let pid = t.user_init(Box::new(ClosureProgram::new(|ctx| {
            ctx.sleep(Channel::Custom(42));
            ctx.exit(0);
        })));
        crate::sched::dispatch_once(&t, 0);
        t.with_inner(|inner| {
            let idx = inner.idx_of(pid).unwrap();
            assert_eq!(inner.slots[idx].state, ProcState::Sleeping);
        });
        t.kill(pid).unwrap();
        t.with_inner(|inner| {
            let idx = inner.idx_of(pid).unwrap();
            assert_eq!(inner.slots[idx].state, ProcState::Runnable);
        });
    }
}
