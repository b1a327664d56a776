//! I/O operations module
//!
//! Contains the block-file abstraction the workers run against and its
//! platform implementation.

pub mod disk;

pub use disk::{create_disk_io, BlockFile, DiskIO, OsBlockFile, PlatformDiskIO, SharedDiskIO};
