//! File system collaborator interface (spec §6: FS is external, only
//! its interface is modeled here).
//!
//! Grounded on `boranseckin-octopos/kernel/src/file.rs` and
//! `fs.rs`'s function surface (`filedup`, `fileclose`, `idup`,
//! `iput`, `namei`, `begin_op`/`end_op`), narrowed to what the process
//! lifecycle touches: duplicating open files across `fork`, closing
//! them at `exit`, and the log transaction bracket FS operations are
//! wrapped in.

use crate::error::KernelError;

/// Opaque handle to an open file (spec §2/§6: descriptor table
/// internals are out of scope; `proc.rs` only stores and forwards
/// these).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(pub u32);

/// Opaque handle to an inode (used for `cwd`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InodeHandle(pub u32);

/// File-system operations the process lifecycle depends on.
pub trait Fs: Send + Sync {
    /// Bumps the refcount on an open file, for `fork`.
    fn file_dup(&self, file: FileHandle) -> FileHandle;

    /// Drops a reference to an open file, at `exit`.
    fn file_close(&self, file: FileHandle);

    /// Bumps the refcount on an inode, for `fork`'s `cwd` copy.
    fn inode_dup(&self, inode: InodeHandle) -> InodeHandle;

    /// Drops a reference to an inode, at `exit`.
    fn inode_put(&self, inode: InodeHandle);

    /// Path lookup, used by `exec` (out of scope) but kept on the
    /// trait since spec §6 lists it among the external calls the
    /// process subsystem makes into FS.
    fn namei(&self, path: &str) -> Result<InodeHandle, KernelError>;

    /// Starts a log transaction.
    fn begin_op(&self);

    /// Ends a log transaction.
    fn end_op(&self);
}

/// No-op `Fs` for tests.
#[derive(Debug, Default)]
pub struct NullFs;

impl NullFs {
    pub const fn new() -> Self {
        Self
    }
}

impl Fs for NullFs {
    fn file_dup(&self, file: FileHandle) -> FileHandle {
        file
    }

    fn file_close(&self, _file: FileHandle) {}

    fn inode_dup(&self, inode: InodeHandle) -> InodeHandle {
        inode
    }

    fn inode_put(&self, _inode: InodeHandle) {}

    fn namei(&self, _path: &str) -> Result<InodeHandle, KernelError> {
        Ok(InodeHandle(0))
    }

    fn begin_op(&self) {}

    fn end_op(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_fs_roundtrips_handles() {
        let fs = NullFs::new();
        let f = FileHandle(7);
        assert_eq!(fs.file_dup(f), f);
    }
}
