pub mod disk_file;
pub mod error;

pub use disk_file::{DiskFile, DiskFileId};
pub use error::{Errno, GuestFault, GuestResult, MmanFatal};
