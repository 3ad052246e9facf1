//! Backing filesystem capability
//!
//! Both protocol dialects talk to storage exclusively through
//! [`VirtualFileSystem`]. Objects are named by [`Inode`]; file handles are
//! derived from inodes by [`crate::filehandle::FileHandle`].

pub mod memory;

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::error;

use crate::acl::UnixAcl;
use crate::error::NfsStatus;

/// Inode number
pub type Inode = u64;

/// Filesystem error
#[derive(Debug, Error)]
pub enum FsError {
    /// No such entry
    #[error("no such file or directory")]
    NotFound,
    /// Entry already exists
    #[error("entry exists")]
    Exists,
    /// Object is not a directory
    #[error("not a directory")]
    NotDirectory,
    /// Object is a directory
    #[error("is a directory")]
    IsDirectory,
    /// Directory not empty
    #[error("directory not empty")]
    NotEmpty,
    /// Permission denied by the filesystem itself
    #[error("permission denied")]
    PermissionDenied,
    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Name longer than the filesystem allows
    #[error("name too long")]
    NameTooLong,
    /// Inode no longer exists
    #[error("stale inode {0}")]
    Stale(Inode),
    /// Operation not supported by this filesystem
    #[error("operation not supported")]
    NotSupported,
    /// Filesystem is read-only
    #[error("read-only filesystem")]
    ReadOnly,
    /// No space left
    #[error("no space left")]
    NoSpace,
    /// Unexpected backend failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FsError> for NfsStatus {
    fn from(err: FsError) -> Self {
        match err {
            FsError::NotFound => NfsStatus::Noent,
            FsError::Exists => NfsStatus::Exist,
            FsError::NotDirectory => NfsStatus::Notdir,
            FsError::IsDirectory => NfsStatus::Isdir,
            FsError::NotEmpty => NfsStatus::Notempty,
            FsError::PermissionDenied => NfsStatus::Access,
            FsError::InvalidArgument(_) => NfsStatus::Inval,
            FsError::NameTooLong => NfsStatus::Nametoolong,
            FsError::Stale(_) => NfsStatus::Stale,
            FsError::NotSupported => NfsStatus::Notsupp,
            FsError::ReadOnly => NfsStatus::Rofs,
            FsError::NoSpace => NfsStatus::Nospc,
            FsError::Io(e) => {
                error!(error = %e, "filesystem failure");
                NfsStatus::Serverfault
            }
        }
    }
}

/// Result type for filesystem calls
pub type FsResult<T> = Result<T, FsError>;

/// Object type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// Regular file
    Regular,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
    /// Block device
    BlockDevice,
    /// Character device
    CharDevice,
    /// Socket
    Socket,
    /// FIFO (named pipe)
    Fifo,
}

/// Seconds and nanoseconds since the epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    /// Seconds
    pub seconds: i64,
    /// Nanoseconds
    pub nseconds: u32,
}

impl Timestamp {
    /// Create a timestamp
    pub fn new(seconds: i64, nseconds: u32) -> Self {
        Self { seconds, nseconds }
    }

    /// Wall clock time
    pub fn now() -> Self {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => Self::new(d.as_secs() as i64, d.subsec_nanos()),
            Err(_) => Self::default(),
        }
    }
}

/// Object attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttr {
    /// Inode number
    pub ino: Inode,
    /// Object type
    pub file_type: FileType,
    /// Permission bits
    pub mode: u32,
    /// Link count
    pub nlink: u32,
    /// Owner
    pub uid: u32,
    /// Owning group
    pub gid: u32,
    /// Size in bytes
    pub size: u64,
    /// Bytes of storage used
    pub used: u64,
    /// Device numbers for special files
    pub rdev: (u32, u32),
    /// Filesystem id
    pub fsid: u64,
    /// Change counter, bumped on every data or metadata update
    pub change: u64,
    /// Last access
    pub atime: Timestamp,
    /// Last data modification
    pub mtime: Timestamp,
    /// Last status change
    pub ctime: Timestamp,
}

impl FileAttr {
    /// Ownership and mode for the access policy
    pub fn acl(&self) -> UnixAcl {
        UnixAcl::new(self.uid, self.gid, self.mode)
    }

    /// Check for directory
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

/// One directory entry with the attributes captured when it was listed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name
    pub name: String,
    /// Inode the entry points to
    pub ino: Inode,
    /// Attributes at listing time
    pub attr: FileAttr,
}

/// How to set a timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetTime {
    /// Use the server's clock
    ServerTime,
    /// Use the given value
    ClientTime(Timestamp),
}

/// Attribute changes requested by SETATTR and create calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetAttr {
    /// New permission bits
    pub mode: Option<u32>,
    /// New owner
    pub uid: Option<u32>,
    /// New group
    pub gid: Option<u32>,
    /// New size
    pub size: Option<u64>,
    /// New access time
    pub atime: Option<SetTime>,
    /// New modification time
    pub mtime: Option<SetTime>,
}

impl SetAttr {
    /// Check whether nothing is requested
    pub fn is_empty(&self) -> bool {
        self == &SetAttr::default()
    }
}

/// Ownership and mode for a new object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewObject {
    /// Permission bits
    pub mode: u32,
    /// Owner
    pub uid: u32,
    /// Group
    pub gid: u32,
}

/// Backing filesystem
#[async_trait]
pub trait VirtualFileSystem: Send + Sync {
    /// Inode of the export root
    fn root(&self) -> Inode;

    /// Resolve `name` in directory `parent`
    async fn lookup(&self, parent: Inode, name: &str) -> FsResult<Inode>;

    /// Create a non-directory, non-symlink object of the given type
    async fn create(
        &self,
        parent: Inode,
        name: &str,
        file_type: FileType,
        new: NewObject,
    ) -> FsResult<Inode>;

    /// Create a directory
    async fn mkdir(&self, parent: Inode, name: &str, new: NewObject) -> FsResult<Inode>;

    /// Create a symbolic link
    async fn symlink(
        &self,
        parent: Inode,
        name: &str,
        target: &str,
        new: NewObject,
    ) -> FsResult<Inode>;

    /// Remove an entry; directories must be empty
    async fn remove(&self, parent: Inode, name: &str) -> FsResult<()>;

    /// Move an entry, replacing a compatible destination
    async fn rename(
        &self,
        from_parent: Inode,
        from_name: &str,
        to_parent: Inode,
        to_name: &str,
    ) -> FsResult<()>;

    /// Add a hard link to `target` named `name` in `parent`
    async fn link(&self, parent: Inode, name: &str, target: Inode) -> FsResult<()>;

    /// Read up to `count` bytes; the flag reports end of file
    async fn read(&self, ino: Inode, offset: u64, count: u32) -> FsResult<(Bytes, bool)>;

    /// Write `data` at `offset`, returning the byte count written
    async fn write(&self, ino: Inode, offset: u64, data: &[u8]) -> FsResult<u32>;

    /// Read a symbolic link's target
    async fn read_link(&self, ino: Inode) -> FsResult<String>;

    /// Live attributes
    async fn stat(&self, ino: Inode) -> FsResult<FileAttr>;

    /// Attributes that may come from a cache; used for pre-operation wcc data
    async fn stat_cached(&self, ino: Inode) -> FsResult<FileAttr> {
        self.stat(ino).await
    }

    /// Apply attribute changes, returning the new attributes
    async fn set_attr(&self, ino: Inode, attr: &SetAttr) -> FsResult<FileAttr>;

    /// Full, ordered listing of a directory
    async fn list(&self, ino: Inode) -> FsResult<Vec<DirEntry>>;
}
