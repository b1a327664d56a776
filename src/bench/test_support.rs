//! Scripted device used by the worker and coordinator tests

use crate::bench::CancelToken;
use crate::io::{BlockFile, DiskIO, PlatformDiskIO};
use crate::models::{DiskIdentity, TestRun, WorkerKind};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Real files with scripted free space, failures and cancellation
#[derive(Clone, Default)]
pub struct FakeDisk {
    free_bytes: u64,
    script: Arc<Script>,
}

#[derive(Default)]
struct Script {
    writes: AtomicUsize,
    reads: AtomicUsize,
    cancel_after_writes: Option<(usize, CancelToken)>,
    cancel_after_reads: Option<(usize, CancelToken)>,
    fail_write_at: Option<usize>,
    fail_read_at: Option<usize>,
    vanished: Option<String>,
}

impl FakeDisk {
    pub fn with_free_space(free_bytes: u64) -> Self {
        Self {
            free_bytes,
            ..Self::default()
        }
    }

    pub fn plenty() -> Self {
        Self::with_free_space(1 << 50)
    }

    /// Raise `cancel` right after the `k`-th block write
    pub fn cancel_after_writes(self, k: usize, cancel: CancelToken) -> Self {
        self.edit(|s| s.cancel_after_writes = Some((k, cancel)))
    }

    /// Raise `cancel` right after the `k`-th block read
    pub fn cancel_after_reads(self, k: usize, cancel: CancelToken) -> Self {
        self.edit(|s| s.cancel_after_reads = Some((k, cancel)))
    }

    /// Fail the `n`-th block write (1-based)
    pub fn fail_write_at(self, n: usize) -> Self {
        self.edit(|s| s.fail_write_at = Some(n))
    }

    /// Fail the `n`-th block read (1-based)
    pub fn fail_read_at(self, n: usize) -> Self {
        self.edit(|s| s.fail_read_at = Some(n))
    }

    /// Report files named `name` as gone when they are opened for reading
    pub fn vanish_on_open(self, name: &str) -> Self {
        let name = name.to_string();
        self.edit(|s| s.vanished = Some(name))
    }

    fn edit(mut self, f: impl FnOnce(&mut Script)) -> Self {
        let mut script = Script {
            writes: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            cancel_after_writes: self.script.cancel_after_writes.clone(),
            cancel_after_reads: self.script.cancel_after_reads.clone(),
            fail_write_at: self.script.fail_write_at,
            fail_read_at: self.script.fail_read_at,
            vanished: self.script.vanished.clone(),
        };
        f(&mut script);
        self.script = Arc::new(script);
        self
    }
}

impl DiskIO for FakeDisk {
    fn open_write(&self, path: &Path) -> io::Result<Box<dyn BlockFile>> {
        let inner = PlatformDiskIO::new().open_write(path)?;
        Ok(Box::new(FakeFile {
            inner,
            script: self.script.clone(),
        }))
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn BlockFile>> {
        let name = path.file_name().and_then(|n| n.to_str());
        if name.is_some() && name == self.script.vanished.as_deref() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "file vanished"));
        }
        let inner = PlatformDiskIO::new().open_read(path)?;
        Ok(Box::new(FakeFile {
            inner,
            script: self.script.clone(),
        }))
    }

    fn free_space(&self, _path: &Path) -> io::Result<u64> {
        Ok(self.free_bytes)
    }

    fn total_space(&self, _path: &Path) -> io::Result<u64> {
        Ok(self.free_bytes.saturating_mul(2))
    }
}

struct FakeFile {
    inner: Box<dyn BlockFile>,
    script: Arc<Script>,
}

impl BlockFile for FakeFile {
    fn write_block(&mut self, buf: &[u8]) -> io::Result<()> {
        let n = self.script.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.script.fail_write_at == Some(n) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
        }
        self.inner.write_block(buf)?;
        if let Some((k, cancel)) = &self.script.cancel_after_writes {
            if n == *k {
                cancel.cancel();
            }
        }
        Ok(())
    }

    fn read_block(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let n = self.script.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.script.fail_read_at == Some(n) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected read failure"));
        }
        self.inner.read_block(buf)?;
        if let Some((k, cancel)) = &self.script.cancel_after_reads {
            if n == *k {
                cancel.cancel();
            }
        }
        Ok(())
    }

    fn file_size(&self) -> io::Result<u64> {
        self.inner.file_size()
    }
}

/// Empty run rooted at `root` with a 64 KiB block size
pub fn test_run(kind: WorkerKind, root: &Path) -> TestRun {
    TestRun::new(
        kind,
        DiskIdentity::new("Fake Disk", root.to_path_buf()),
        64 * crate::KIB,
    )
}
