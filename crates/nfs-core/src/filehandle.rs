//! Opaque file handles
//!
//! Format (9 bytes):
//! - version: 1 byte
//! - inode: 8 bytes (big-endian)

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::NfsStatus;
use crate::vfs::Inode;

/// Largest handle either dialect accepts (NFS4_FHSIZE)
pub const MAX_FH_SIZE: usize = 128;

const FH_VERSION: u8 = 1;
const FH_LEN: usize = 9;

/// Opaque handle naming one filesystem object
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct FileHandle(Bytes);

impl FileHandle {
    /// Build the handle for an inode
    pub fn from_inode(ino: Inode) -> Self {
        let mut buf = BytesMut::with_capacity(FH_LEN);
        buf.put_u8(FH_VERSION);
        buf.put_u64(ino);
        Self(buf.freeze())
    }

    /// Wrap handle bytes received from a client
    pub fn from_wire(data: impl Into<Bytes>) -> Result<Self, NfsStatus> {
        let data = data.into();
        if data.is_empty() || data.len() > MAX_FH_SIZE {
            return Err(NfsStatus::Badhandle);
        }
        Ok(Self(data))
    }

    /// Resolve the inode this handle names
    pub fn inode(&self) -> Result<Inode, NfsStatus> {
        if self.0.len() != FH_LEN || self.0[0] != FH_VERSION {
            return Err(NfsStatus::Badhandle);
        }
        let mut ino = [0u8; 8];
        ino.copy_from_slice(&self.0[1..]);
        Ok(u64::from_be_bytes(ino))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length on the wire (without the XDR length word)
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inode() {
            Ok(ino) => write!(f, "FileHandle(ino={})", ino),
            Err(_) => write!(f, "FileHandle({:02x?})", &self.0[..]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inode_round_trip() {
        let fh = FileHandle::from_inode(0xdead_beef);
        assert_eq!(fh.len(), 9);
        assert_eq!(fh.inode().unwrap(), 0xdead_beef);
    }

    #[test]
    fn test_foreign_handle_is_bad() {
        let fh = FileHandle::from_wire(vec![7u8; 16]).unwrap();
        assert_eq!(fh.inode(), Err(NfsStatus::Badhandle));
        assert_eq!(
            FileHandle::from_wire(Vec::new()).unwrap_err(),
            NfsStatus::Badhandle
        );
        assert!(FileHandle::from_wire(vec![0u8; MAX_FH_SIZE + 1]).is_err());
    }
}
