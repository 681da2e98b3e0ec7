//! Virtual memory collaborator interface (spec §6: VM is external,
//! only its interface is modeled here).
//!
//! Grounded on `boranseckin-octopos/kernel/src/vm.rs`'s function
//! surface (`uvmcreate`, `uvmcopy`, `uvmalloc`, `uvmdealloc`,
//! `uvmfree`), narrowed to the calls the process lifecycle actually
//! makes into VM: create an address space, fork-copy one, grow or
//! shrink one, and free one. The page table itself is opaque here —
//! a real kernel's `PageTable` is a physical-address-indexed
//! structure `proc.rs` has no business reaching into.

use crate::error::KernelError;

/// Opaque handle to a process's page table. Spec §2/§6: VM internals
/// (page table layout, TLB, trap frames) are explicitly out of scope;
/// the process table only ever needs to hold this handle and hand it
/// back to the `Vm` collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageTableHandle(pub u64);

/// Virtual-memory operations the process lifecycle depends on.
/// Mirrors `vm.rs`'s free functions as trait methods so `proc.rs` can
/// be tested against a mock instead of a real page table.
pub trait Vm: Send + Sync {
    /// Allocates a fresh address space for a brand-new process.
    fn setup_kvm(&self) -> Result<PageTableHandle, KernelError>;

    /// Copies a parent's address space for `fork`.
    fn copy_uvm(&self, parent: PageTableHandle, size: usize) -> Result<PageTableHandle, KernelError>;

    /// Grows `pt` from `old_size` to `new_size` bytes, returning the
    /// new size actually achieved (spec: `growproc`/`sbrk`).
    fn alloc_uvm(&self, pt: PageTableHandle, old_size: usize, new_size: usize) -> Result<usize, KernelError>;

    /// Shrinks `pt` from `old_size` down to `new_size` bytes.
    fn dealloc_uvm(&self, pt: PageTableHandle, old_size: usize, new_size: usize) -> usize;

    /// Tears down an address space entirely, at `exit`/reap time.
    fn free_vm(&self, pt: PageTableHandle, size: usize);
}

/// No-op `Vm` for tests: hands back monotonically increasing handles
/// and does no bookkeeping on size. Named after the teacher's pattern
/// of tiny mock collaborators used to unit-test kernel logic that
/// would otherwise need real hardware.
#[derive(Debug, Default)]
pub struct NullVm {
    next: std::sync::atomic::AtomicU64,
}

impl NullVm {
    pub const fn new() -> Self {
        Self {
            next: std::sync::atomic::AtomicU64::new(1),
        }
    }
}

impl Vm for NullVm {
    fn setup_kvm(&self) -> Result<PageTableHandle, KernelError> {
        Ok(PageTableHandle(
            self.next.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
        ))
    }

    fn copy_uvm(&self, _parent: PageTableHandle, _size: usize) -> Result<PageTableHandle, KernelError> {
        self.setup_kvm()
    }

    fn alloc_uvm(&self, _pt: PageTableHandle, _old_size: usize, new_size: usize) -> Result<usize, KernelError> {
        Ok(new_size)
    }

    fn dealloc_uvm(&self, _pt: PageTableHandle, _old_size: usize, new_size: usize) -> usize {
        new_size
    }

    fn free_vm(&self, _pt: PageTableHandle, _size: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_vm_hands_out_distinct_handles() {
        let vm = NullVm::new();
        let a = vm.setup_kvm().unwrap();
        let b = vm.setup_kvm().unwrap();
        assert_ne!(a, b);
    }
}
