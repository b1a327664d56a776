use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

/// Cross-platform disk I/O operations trait
///
/// Workers only talk to the device through this seam so tests can swap in
/// a fake device with scripted free space and failures.
pub trait DiskIO: Send + Sync {
    /// Create (or truncate) a file for block writes
    fn open_write(&self, path: &Path) -> io::Result<Box<dyn BlockFile>>;

    /// Open an existing file for block reads
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn BlockFile>>;

    /// Bytes available to the current user on the device holding `path`
    fn free_space(&self, path: &Path) -> io::Result<u64>;

    /// Total bytes of the device holding `path`
    fn total_space(&self, path: &Path) -> io::Result<u64>;
}

/// Block-granular file operations
pub trait BlockFile: Send {
    /// Write the whole buffer and flush it to the device
    fn write_block(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Fill the whole buffer from the file
    fn read_block(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Current file size
    fn file_size(&self) -> io::Result<u64>;
}

/// Shared handle passed to the blocking worker loops
pub type SharedDiskIO = Arc<dyn DiskIO>;

/// Plain file backed by the OS
pub struct OsBlockFile {
    file: File,
}

impl OsBlockFile {
    pub fn new(file: File) -> Self {
        Self { file }
    }
}

impl BlockFile for OsBlockFile {
    fn write_block(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)?;
        self.file.sync_data()
    }

    fn read_block(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.file.read_exact(buf)
    }

    fn file_size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

/// Platform-specific disk I/O implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformDiskIO;

impl PlatformDiskIO {
    pub fn new() -> Self {
        Self
    }
}

impl DiskIO for PlatformDiskIO {
    fn open_write(&self, path: &Path) -> io::Result<Box<dyn BlockFile>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Box::new(OsBlockFile::new(file)))
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn BlockFile>> {
        let file = OpenOptions::new().read(true).open(path)?;
        Ok(Box::new(OsBlockFile::new(file)))
    }

    fn free_space(&self, path: &Path) -> io::Result<u64> {
        space::query(path).map(|s| s.available)
    }

    fn total_space(&self, path: &Path) -> io::Result<u64> {
        space::query(path).map(|s| s.total)
    }
}

#[cfg(unix)]
mod space {
    use std::ffi::CString;
    use std::io;
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    pub struct Space {
        pub available: u64,
        pub total: u64,
    }

    pub fn query(path: &Path) -> io::Result<Space> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut stat = MaybeUninit::<libc::statvfs>::uninit();

        // SAFETY: c_path is NUL-terminated and statvfs fully initializes
        // stat when it returns 0, the only case in which stat is read
        let stat = unsafe {
            if libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) != 0 {
                return Err(io::Error::last_os_error());
            }
            stat.assume_init()
        };

        let frsize = stat.f_frsize as u64;
        Ok(Space {
            available: (stat.f_bavail as u64).saturating_mul(frsize),
            total: (stat.f_blocks as u64).saturating_mul(frsize),
        })
    }
}

#[cfg(windows)]
mod space {
    use std::io;
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;

    pub struct Space {
        pub available: u64,
        pub total: u64,
    }

    extern "system" {
        fn GetDiskFreeSpaceExW(
            directory: *const u16,
            free_to_caller: *mut u64,
            total: *mut u64,
            total_free: *mut u64,
        ) -> i32;
    }

    pub fn query(path: &Path) -> io::Result<Space> {
        let wide: Vec<u16> = path.as_os_str().encode_wide().chain(Some(0)).collect();
        let (mut available, mut total, mut total_free) = (0u64, 0u64, 0u64);

        let ok = unsafe {
            GetDiskFreeSpaceExW(wide.as_ptr(), &mut available, &mut total, &mut total_free)
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Space { available, total })
    }
}

/// Create a new platform-specific disk I/O instance
pub fn create_disk_io() -> SharedDiskIO {
    Arc::new(PlatformDiskIO::new())
}
