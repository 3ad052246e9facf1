//! NFSv4 protocol implementation
//!
//! COMPOUND processing for minor versions 0 and 1 (RFC 7530, RFC 8881).
//! Client registration follows the v4.0 SETCLIENTID handshake; from v4.1
//! only GETDEVICEINFO is served.

pub mod attr;
pub mod compound;
pub mod ops;
pub mod state;

use crate::error::NfsStatus;
use crate::rpc::xdr::{XdrDecoder, XdrEncoder};
use state::ClientId;

/// Highest minor version accepted
pub const NFS4_MAX_MINOR_VERSION: u32 = 1;

/// Longest component name accepted by CREATE and friends
pub const NFS4_MAX_NAME_LEN: usize = 255;

/// NFSv4 stateid (identifies state at server)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId {
    /// Sequence number
    pub seqid: u32,
    /// Owning client id (8 bytes BE) followed by a per-client counter (4 bytes BE)
    pub other: [u8; 12],
}

impl StateId {
    /// Anonymous stateid (all zeros)
    pub const ANONYMOUS: Self = Self {
        seqid: 0,
        other: [0; 12],
    };

    /// Read bypass stateid (all ones)
    pub const READ_BYPASS: Self = Self {
        seqid: 0xFFFFFFFF,
        other: [0xFF; 12],
    };

    /// Create a new stateid
    pub fn new(seqid: u32, other: [u8; 12]) -> Self {
        Self { seqid, other }
    }

    /// First stateid of a client's `counter`-th state
    pub fn for_client(client_id: ClientId, counter: u32) -> Self {
        let mut other = [0u8; 12];
        other[..8].copy_from_slice(&client_id.to_be_bytes());
        other[8..].copy_from_slice(&counter.to_be_bytes());
        Self { seqid: 1, other }
    }

    /// Client id embedded in `other`
    pub fn client_id(&self) -> ClientId {
        let mut id = [0u8; 8];
        id.copy_from_slice(&self.other[..8]);
        u64::from_be_bytes(id)
    }

    /// Check for the anonymous or read-bypass stateid
    pub fn is_special(&self) -> bool {
        *self == Self::ANONYMOUS || *self == Self::READ_BYPASS
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_u32(self.seqid);
        enc.encode_opaque_fixed(&self.other);
    }

    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        let seqid = dec.decode_u32()?;
        let other = dec.decode_array::<12>()?;
        Ok(Self { seqid, other })
    }
}

/// Directory change information returned by mutating operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChangeInfo {
    /// Atomic operation
    pub atomic: bool,
    /// Change value before operation
    pub before: u64,
    /// Change value after operation
    pub after: u64,
}

impl ChangeInfo {
    /// Create new change info
    pub fn new(before: u64, after: u64, atomic: bool) -> Self {
        Self {
            atomic,
            before,
            after,
        }
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_bool(self.atomic);
        enc.encode_u64(self.before);
        enc.encode_u64(self.after);
    }
}

/// File type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Nfs4FileType {
    /// Regular file
    Regular = 1,
    /// Directory
    Directory = 2,
    /// Block device
    BlockDevice = 3,
    /// Character device
    CharDevice = 4,
    /// Symbolic link
    SymLink = 5,
    /// Socket
    Socket = 6,
    /// FIFO (named pipe)
    Fifo = 7,
    /// Attribute directory
    AttrDir = 8,
    /// Named attribute
    NamedAttr = 9,
}

impl TryFrom<u32> for Nfs4FileType {
    type Error = NfsStatus;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Regular),
            2 => Ok(Self::Directory),
            3 => Ok(Self::BlockDevice),
            4 => Ok(Self::CharDevice),
            5 => Ok(Self::SymLink),
            6 => Ok(Self::Socket),
            7 => Ok(Self::Fifo),
            8 => Ok(Self::AttrDir),
            9 => Ok(Self::NamedAttr),
            _ => Err(NfsStatus::BadType),
        }
    }
}

impl From<crate::vfs::FileType> for Nfs4FileType {
    fn from(t: crate::vfs::FileType) -> Self {
        use crate::vfs::FileType;
        match t {
            FileType::Regular => Self::Regular,
            FileType::Directory => Self::Directory,
            FileType::Symlink => Self::SymLink,
            FileType::BlockDevice => Self::BlockDevice,
            FileType::CharDevice => Self::CharDevice,
            FileType::Socket => Self::Socket,
            FileType::Fifo => Self::Fifo,
        }
    }
}

/// ACCESS request/reply bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessBits(pub u32);

impl AccessBits {
    /// Read data
    pub const READ: u32 = 0x00000001;
    /// Lookup in directory
    pub const LOOKUP: u32 = 0x00000002;
    /// Modify file
    pub const MODIFY: u32 = 0x00000004;
    /// Extend file
    pub const EXTEND: u32 = 0x00000008;
    /// Delete entry
    pub const DELETE: u32 = 0x00000010;
    /// Execute file
    pub const EXECUTE: u32 = 0x00000020;

    /// Every defined bit
    pub const ALL: u32 = 0x3f;
}

/// Check a component name the way CREATE, LINK, RENAME and OPEN do
pub fn check_component(name: &str) -> Result<(), NfsStatus> {
    if name.is_empty() {
        return Err(NfsStatus::Inval);
    }
    if name.len() > NFS4_MAX_NAME_LEN {
        return Err(NfsStatus::Nametoolong);
    }
    if name == "." || name == ".." || name.contains('/') {
        return Err(NfsStatus::Badname);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stateid_special_values() {
        assert!(StateId::ANONYMOUS.is_special());
        assert!(StateId::READ_BYPASS.is_special());
        assert!(!StateId::for_client(1, 1).is_special());
    }

    #[test]
    fn test_stateid_carries_client() {
        let stateid = StateId::for_client(0x0102_0304_0506_0708, 9);
        assert_eq!(stateid.client_id(), 0x0102_0304_0506_0708);
        assert_eq!(&stateid.other[8..], &[0, 0, 0, 9]);
        assert_eq!(stateid.seqid, 1);
    }

    #[test]
    fn test_check_component() {
        assert_eq!(check_component(""), Err(NfsStatus::Inval));
        assert_eq!(check_component(".."), Err(NfsStatus::Badname));
        assert_eq!(check_component(&"x".repeat(256)), Err(NfsStatus::Nametoolong));
        assert!(check_component("file.txt").is_ok());
    }
}
