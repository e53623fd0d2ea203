//! Cross-process build lock
//!
//! Command-line builds share the references folder and the compile temp
//! directory, so only one may run at a time. The lock is an exclusive OS file
//! lock on a single file; it is released when the [`BuildLock`] is dropped or
//! the process exits.

use crate::error::{BuildError, BuildResult};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct BuildLock {
    _file: File,
    path: PathBuf,
}

impl BuildLock {
    /// Take the lock at `path`, waiting for other holders.
    ///
    /// `on_wait` runs once if the lock is contended, before blocking.
    pub fn acquire(path: &Path, on_wait: impl FnOnce()) -> BuildResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| BuildError::io(path, e))?;

        match try_lock(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || is_contended(&e) => {
                on_wait();
                lock(&file).map_err(|e| BuildError::io(path, e))?;
            }
            Err(e) => return Err(BuildError::io(path, e)),
        }

        debug!(path = %path.display(), "build lock acquired");
        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    /// Take the lock only if it is free
    pub fn try_acquire(path: &Path) -> BuildResult<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| BuildError::io(path, e))?;

        match try_lock(&file) {
            Ok(()) => Ok(Some(Self {
                _file: file,
                path: path.to_path_buf(),
            })),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || is_contended(&e) => Ok(None),
            Err(e) => Err(BuildError::io(path, e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn is_contended(_err: &io::Error) -> bool {
    false
}

#[cfg(windows)]
fn is_contended(err: &io::Error) -> bool {
    // ERROR_LOCK_VIOLATION
    err.raw_os_error() == Some(33)
}

#[cfg(unix)]
fn try_lock(file: &File) -> io::Result<()> {
    use rustix::fs::{flock, FlockOperation};
    use std::os::unix::io::AsFd;

    flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive)
        .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(unix)]
fn lock(file: &File) -> io::Result<()> {
    use rustix::fs::{flock, FlockOperation};
    use std::os::unix::io::AsFd;

    flock(file.as_fd(), FlockOperation::LockExclusive)
        .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn lock_with_flags(file: &File, flags: u32) -> io::Result<()> {
    use std::os::windows::io::AsRawHandle;
    use windows_sys::Win32::Foundation::HANDLE;
    use windows_sys::Win32::Storage::FileSystem::LockFileEx;

    let handle = file.as_raw_handle() as HANDLE;

    // SAFETY: OVERLAPPED is a plain data struct that is valid when zero-initialized.
    // LockFileEx is safe to call with a valid file handle and zeroed OVERLAPPED.
    let result = unsafe {
        let mut overlapped = std::mem::zeroed();
        LockFileEx(handle, flags, 0, 1, 0, &mut overlapped)
    };

    if result == 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(windows)]
fn try_lock(file: &File) -> io::Result<()> {
    use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY};
    lock_with_flags(file, LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY)
}

#[cfg(windows)]
fn lock(file: &File) -> io::Result<()> {
    use windows_sys::Win32::Storage::FileSystem::LOCKFILE_EXCLUSIVE_LOCK;
    lock_with_flags(file, LOCKFILE_EXCLUSIVE_LOCK)
}
