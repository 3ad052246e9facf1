//! NFSv4 COMPOUND processing
//!
//! A COMPOUND carries an ordered list of operations that share one
//! [`CompoundContext`]. [`execute`] runs them in order, records every
//! executed operation's result and stops at the first failure.

use tracing::debug;

use super::attr::{Bitmap, Fattr4};
use super::ops::{self, dispatch};
use super::state::ClientId;
use super::StateId;
use crate::acl::{AccessRight, Principal};
use crate::error::NfsStatus;
use crate::filehandle::FileHandle;
use crate::nfs4::ChangeInfo;
use crate::pnfs::{GetDeviceInfoArgs, NetAddr};
use crate::rpc::xdr::{XdrDecoder, XdrEncoder};
use crate::server::{Caller, NfsServer};
use crate::vfs::{FileAttr, Inode, VirtualFileSystem};

/// NFSv4 operation codes (RFC 7530, RFC 8881)
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Nfs4Op {
    Access = 3,
    Close = 4,
    Commit = 5,
    Create = 6,
    DelegPurge = 7,
    DelegReturn = 8,
    GetAttr = 9,
    GetFh = 10,
    Link = 11,
    Lock = 12,
    LockT = 13,
    LockU = 14,
    Lookup = 15,
    LookupP = 16,
    NVerify = 17,
    Open = 18,
    OpenAttr = 19,
    OpenConfirm = 20,
    OpenDowngrade = 21,
    PutFh = 22,
    PutPubFh = 23,
    PutRootFh = 24,
    Read = 25,
    ReadDir = 26,
    ReadLink = 27,
    Remove = 28,
    Rename = 29,
    Renew = 30,
    RestoreFh = 31,
    SaveFh = 32,
    SecInfo = 33,
    SetAttr = 34,
    SetClientId = 35,
    SetClientIdConfirm = 36,
    Verify = 37,
    Write = 38,
    ReleaseLockOwner = 39,
    // NFSv4.1 operations
    BackchannelCtl = 40,
    BindConnToSession = 41,
    ExchangeId = 42,
    CreateSession = 43,
    DestroySession = 44,
    FreeStateId = 45,
    GetDirDelegation = 46,
    GetDeviceInfo = 47,
    GetDeviceList = 48,
    LayoutCommit = 49,
    LayoutGet = 50,
    LayoutReturn = 51,
    SecInfoNoName = 52,
    Sequence = 53,
    SetSsv = 54,
    TestStateId = 55,
    WantDelegation = 56,
    DestroyClientId = 57,
    ReclaimComplete = 58,
    Illegal = 10044,
}

impl TryFrom<u32> for Nfs4Op {
    type Error = NfsStatus;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(Self::Access),
            4 => Ok(Self::Close),
            5 => Ok(Self::Commit),
            6 => Ok(Self::Create),
            7 => Ok(Self::DelegPurge),
            8 => Ok(Self::DelegReturn),
            9 => Ok(Self::GetAttr),
            10 => Ok(Self::GetFh),
            11 => Ok(Self::Link),
            12 => Ok(Self::Lock),
            13 => Ok(Self::LockT),
            14 => Ok(Self::LockU),
            15 => Ok(Self::Lookup),
            16 => Ok(Self::LookupP),
            17 => Ok(Self::NVerify),
            18 => Ok(Self::Open),
            19 => Ok(Self::OpenAttr),
            20 => Ok(Self::OpenConfirm),
            21 => Ok(Self::OpenDowngrade),
            22 => Ok(Self::PutFh),
            23 => Ok(Self::PutPubFh),
            24 => Ok(Self::PutRootFh),
            25 => Ok(Self::Read),
            26 => Ok(Self::ReadDir),
            27 => Ok(Self::ReadLink),
            28 => Ok(Self::Remove),
            29 => Ok(Self::Rename),
            30 => Ok(Self::Renew),
            31 => Ok(Self::RestoreFh),
            32 => Ok(Self::SaveFh),
            33 => Ok(Self::SecInfo),
            34 => Ok(Self::SetAttr),
            35 => Ok(Self::SetClientId),
            36 => Ok(Self::SetClientIdConfirm),
            37 => Ok(Self::Verify),
            38 => Ok(Self::Write),
            39 => Ok(Self::ReleaseLockOwner),
            40 => Ok(Self::BackchannelCtl),
            41 => Ok(Self::BindConnToSession),
            42 => Ok(Self::ExchangeId),
            43 => Ok(Self::CreateSession),
            44 => Ok(Self::DestroySession),
            45 => Ok(Self::FreeStateId),
            46 => Ok(Self::GetDirDelegation),
            47 => Ok(Self::GetDeviceInfo),
            48 => Ok(Self::GetDeviceList),
            49 => Ok(Self::LayoutCommit),
            50 => Ok(Self::LayoutGet),
            51 => Ok(Self::LayoutReturn),
            52 => Ok(Self::SecInfoNoName),
            53 => Ok(Self::Sequence),
            54 => Ok(Self::SetSsv),
            55 => Ok(Self::TestStateId),
            56 => Ok(Self::WantDelegation),
            57 => Ok(Self::DestroyClientId),
            58 => Ok(Self::ReclaimComplete),
            10044 => Ok(Self::Illegal),
            _ => Err(NfsStatus::OpIllegal),
        }
    }
}

impl Nfs4Op {
    /// Whether the operation exists in `minor_version`
    pub fn in_minor_version(self, minor_version: u32) -> bool {
        minor_version > 0 || (self as u32) <= Nfs4Op::ReleaseLockOwner as u32
    }
}

/// COMPOUND request arguments
#[derive(Debug, Clone)]
pub struct CompoundArgs {
    /// Minor version
    pub minor_version: u32,
    /// Tag (for debugging)
    pub tag: String,
    /// Operations
    pub ops: Vec<Nfs4OpArgs>,
}

impl CompoundArgs {
    /// Decode from XDR.
    ///
    /// Decoding stops after an operation the server cannot parse; it is
    /// kept so execution reports it and ends there.
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        let tag = dec.decode_string()?;
        let minor_version = dec.decode_u32()?;
        let op_count = dec.decode_len()?;

        let mut ops = Vec::with_capacity(op_count.min(64));
        for _ in 0..op_count {
            let op = Nfs4OpArgs::decode(dec, minor_version)?;
            let last = matches!(op, Nfs4OpArgs::Illegal | Nfs4OpArgs::Unsupported(_));
            ops.push(op);
            if last {
                break;
            }
        }

        Ok(Self {
            minor_version,
            tag,
            ops,
        })
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_string(&self.tag);
        enc.encode_u32(self.minor_version);
        enc.encode_u32(self.ops.len() as u32);
        for op in &self.ops {
            op.encode(enc);
        }
    }
}

/// Decoded arguments of one operation
#[derive(Debug, Clone)]
pub enum Nfs4OpArgs {
    /// ACCESS
    Access(ops::attrs::AccessArgs),
    /// CLOSE
    Close(ops::open::CloseArgs),
    /// COMMIT
    Commit(ops::io::CommitArgs),
    /// CREATE
    Create(ops::create::CreateArgs),
    /// GETATTR
    GetAttr(ops::attrs::GetAttrArgs),
    /// GETFH
    GetFh,
    /// LINK
    Link(ops::namespace::LinkArgs),
    /// LOOKUP
    Lookup(ops::namespace::LookupArgs),
    /// LOOKUPP
    LookupP,
    /// NVERIFY
    NVerify(ops::attrs::VerifyArgs),
    /// OPEN
    Open(ops::open::OpenArgs),
    /// OPEN_CONFIRM
    OpenConfirm(ops::open::OpenConfirmArgs),
    /// PUTFH
    PutFh(ops::PutFhArgs),
    /// PUTROOTFH
    PutRootFh,
    /// READ
    Read(ops::io::ReadArgs),
    /// READDIR
    ReadDir(ops::readdir::ReadDirArgs),
    /// READLINK
    ReadLink,
    /// REMOVE
    Remove(ops::namespace::RemoveArgs),
    /// RENAME
    Rename(ops::namespace::RenameArgs),
    /// RENEW
    Renew(ops::clientid::RenewArgs),
    /// RESTOREFH
    RestoreFh,
    /// SAVEFH
    SaveFh,
    /// SECINFO
    SecInfo(ops::secinfo::SecInfoArgs),
    /// SETATTR
    SetAttr(ops::attrs::SetAttrArgs),
    /// SETCLIENTID
    SetClientId(ops::clientid::SetClientIdArgs),
    /// SETCLIENTID_CONFIRM
    SetClientIdConfirm(ops::clientid::SetClientIdConfirmArgs),
    /// VERIFY
    Verify(ops::attrs::VerifyArgs),
    /// WRITE
    Write(ops::io::WriteArgs),
    /// GETDEVICEINFO
    GetDeviceInfo(GetDeviceInfoArgs),
    /// A defined operation this server does not implement
    Unsupported(Nfs4Op),
    /// Unknown opcode, or one outside the request's minor version
    Illegal,
}

impl Nfs4OpArgs {
    /// Decode one nfs_argop4
    pub fn decode(dec: &mut XdrDecoder, minor_version: u32) -> std::io::Result<Self> {
        let code = dec.decode_u32()?;
        let op = match Nfs4Op::try_from(code) {
            Ok(op) if op.in_minor_version(minor_version) => op,
            _ => {
                debug!(code, minor_version, "illegal operation");
                return Ok(Self::Illegal);
            }
        };

        Ok(match op {
            Nfs4Op::Access => Self::Access(ops::attrs::AccessArgs::decode(dec)?),
            Nfs4Op::Close => Self::Close(ops::open::CloseArgs::decode(dec)?),
            Nfs4Op::Commit => Self::Commit(ops::io::CommitArgs::decode(dec)?),
            Nfs4Op::Create => Self::Create(ops::create::CreateArgs::decode(dec)?),
            Nfs4Op::GetAttr => Self::GetAttr(ops::attrs::GetAttrArgs::decode(dec)?),
            Nfs4Op::GetFh => Self::GetFh,
            Nfs4Op::Link => Self::Link(ops::namespace::LinkArgs::decode(dec)?),
            Nfs4Op::Lookup => Self::Lookup(ops::namespace::LookupArgs::decode(dec)?),
            Nfs4Op::LookupP => Self::LookupP,
            Nfs4Op::NVerify => Self::NVerify(ops::attrs::VerifyArgs::decode(dec)?),
            Nfs4Op::Open => Self::Open(ops::open::OpenArgs::decode(dec)?),
            Nfs4Op::OpenConfirm => Self::OpenConfirm(ops::open::OpenConfirmArgs::decode(dec)?),
            Nfs4Op::PutFh => Self::PutFh(ops::PutFhArgs::decode(dec)?),
            Nfs4Op::PutRootFh => Self::PutRootFh,
            Nfs4Op::Read => Self::Read(ops::io::ReadArgs::decode(dec)?),
            Nfs4Op::ReadDir => Self::ReadDir(ops::readdir::ReadDirArgs::decode(dec)?),
            Nfs4Op::ReadLink => Self::ReadLink,
            Nfs4Op::Remove => Self::Remove(ops::namespace::RemoveArgs::decode(dec)?),
            Nfs4Op::Rename => Self::Rename(ops::namespace::RenameArgs::decode(dec)?),
            Nfs4Op::Renew => Self::Renew(ops::clientid::RenewArgs::decode(dec)?),
            Nfs4Op::RestoreFh => Self::RestoreFh,
            Nfs4Op::SaveFh => Self::SaveFh,
            Nfs4Op::SecInfo => Self::SecInfo(ops::secinfo::SecInfoArgs::decode(dec)?),
            Nfs4Op::SetAttr => Self::SetAttr(ops::attrs::SetAttrArgs::decode(dec)?),
            Nfs4Op::SetClientId => {
                Self::SetClientId(ops::clientid::SetClientIdArgs::decode(dec)?)
            }
            Nfs4Op::SetClientIdConfirm => {
                Self::SetClientIdConfirm(ops::clientid::SetClientIdConfirmArgs::decode(dec)?)
            }
            Nfs4Op::Verify => Self::Verify(ops::attrs::VerifyArgs::decode(dec)?),
            Nfs4Op::Write => Self::Write(ops::io::WriteArgs::decode(dec)?),
            Nfs4Op::GetDeviceInfo => Self::GetDeviceInfo(GetDeviceInfoArgs::decode(dec)?),
            Nfs4Op::Illegal => Self::Illegal,
            other => Self::Unsupported(other),
        })
    }

    /// Encode as nfs_argop4; `Unsupported` and `Illegal` carry no body
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_u32(self.op() as u32);
        match self {
            Self::Access(args) => args.encode(enc),
            Self::Close(args) => args.encode(enc),
            Self::Commit(args) => args.encode(enc),
            Self::Create(args) => args.encode(enc),
            Self::GetAttr(args) => args.encode(enc),
            Self::Link(args) => args.encode(enc),
            Self::Lookup(args) => args.encode(enc),
            Self::NVerify(args) | Self::Verify(args) => args.encode(enc),
            Self::Open(args) => args.encode(enc),
            Self::OpenConfirm(args) => args.encode(enc),
            Self::PutFh(args) => args.encode(enc),
            Self::Read(args) => args.encode(enc),
            Self::ReadDir(args) => args.encode(enc),
            Self::Remove(args) => args.encode(enc),
            Self::Rename(args) => args.encode(enc),
            Self::Renew(args) => args.encode(enc),
            Self::SecInfo(args) => args.encode(enc),
            Self::SetAttr(args) => args.encode(enc),
            Self::SetClientId(args) => args.encode(enc),
            Self::SetClientIdConfirm(args) => args.encode(enc),
            Self::Write(args) => args.encode(enc),
            Self::GetDeviceInfo(args) => args.encode(enc),
            Self::GetFh
            | Self::LookupP
            | Self::PutRootFh
            | Self::ReadLink
            | Self::RestoreFh
            | Self::SaveFh
            | Self::Unsupported(_)
            | Self::Illegal => {}
        }
    }

    /// Operation code
    pub fn op(&self) -> Nfs4Op {
        match self {
            Self::Access(_) => Nfs4Op::Access,
            Self::Close(_) => Nfs4Op::Close,
            Self::Commit(_) => Nfs4Op::Commit,
            Self::Create(_) => Nfs4Op::Create,
            Self::GetAttr(_) => Nfs4Op::GetAttr,
            Self::GetFh => Nfs4Op::GetFh,
            Self::Link(_) => Nfs4Op::Link,
            Self::Lookup(_) => Nfs4Op::Lookup,
            Self::LookupP => Nfs4Op::LookupP,
            Self::NVerify(_) => Nfs4Op::NVerify,
            Self::Open(_) => Nfs4Op::Open,
            Self::OpenConfirm(_) => Nfs4Op::OpenConfirm,
            Self::PutFh(_) => Nfs4Op::PutFh,
            Self::PutRootFh => Nfs4Op::PutRootFh,
            Self::Read(_) => Nfs4Op::Read,
            Self::ReadDir(_) => Nfs4Op::ReadDir,
            Self::ReadLink => Nfs4Op::ReadLink,
            Self::Remove(_) => Nfs4Op::Remove,
            Self::Rename(_) => Nfs4Op::Rename,
            Self::Renew(_) => Nfs4Op::Renew,
            Self::RestoreFh => Nfs4Op::RestoreFh,
            Self::SaveFh => Nfs4Op::SaveFh,
            Self::SecInfo(_) => Nfs4Op::SecInfo,
            Self::SetAttr(_) => Nfs4Op::SetAttr,
            Self::SetClientId(_) => Nfs4Op::SetClientId,
            Self::SetClientIdConfirm(_) => Nfs4Op::SetClientIdConfirm,
            Self::Verify(_) => Nfs4Op::Verify,
            Self::Write(_) => Nfs4Op::Write,
            Self::GetDeviceInfo(_) => Nfs4Op::GetDeviceInfo,
            Self::Unsupported(op) => *op,
            Self::Illegal => Nfs4Op::Illegal,
        }
    }

    /// Whether the operation modifies the exported filesystem
    pub fn is_mutating(&self) -> bool {
        match self {
            Self::Create(_)
            | Self::Link(_)
            | Self::Remove(_)
            | Self::Rename(_)
            | Self::SetAttr(_)
            | Self::Write(_) => true,
            Self::Open(args) => args.creates(),
            _ => false,
        }
    }
}

/// COMPOUND response
#[derive(Debug, Clone)]
pub struct CompoundRes {
    /// Status of last operation
    pub status: NfsStatus,
    /// Tag (echoed from request)
    pub tag: String,
    /// Operation results
    pub results: Vec<Nfs4OpRes>,
}

impl CompoundRes {
    /// Create a new response
    pub fn new(tag: String) -> Self {
        Self {
            status: NfsStatus::Ok,
            tag,
            results: Vec::new(),
        }
    }

    /// A response rejected before any operation ran
    pub fn failed(tag: String, status: NfsStatus) -> Self {
        Self {
            status,
            tag,
            results: Vec::new(),
        }
    }

    /// Add an operation result
    pub fn add_result(&mut self, result: Nfs4OpRes) {
        if result.status != NfsStatus::Ok {
            self.status = result.status;
        }
        self.results.push(result);
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_u32(self.status as u32);
        enc.encode_string(&self.tag);
        enc.encode_u32(self.results.len() as u32);
        for result in &self.results {
            result.encode(enc);
        }
    }
}

/// Operation-specific result body
#[derive(Debug, Clone, PartialEq)]
pub enum OpResBody {
    /// Nothing beyond the status
    Empty,
    /// GETFH
    GetFh(FileHandle),
    /// ACCESS
    Access(ops::attrs::AccessRes),
    /// GETATTR
    Attrs(Fattr4),
    /// SETATTR, present on failure too
    AttrsSet(Bitmap),
    /// REMOVE, LINK
    Change(ChangeInfo),
    /// RENAME: source then target directory
    Rename(ChangeInfo, ChangeInfo),
    /// CREATE
    Create(ops::create::CreateRes),
    /// READLINK
    ReadLink(String),
    /// READDIR
    ReadDir(ops::readdir::ReadDirRes),
    /// SECINFO
    SecInfo(Vec<ops::secinfo::SecInfoEntry>),
    /// SETCLIENTID
    SetClientId(ops::clientid::SetClientIdRes),
    /// SETCLIENTID refused with `ClidInuse`: the live registration's address
    ClientInUse(NetAddr),
    /// OPEN
    Open(ops::open::OpenRes),
    /// OPEN_CONFIRM, CLOSE
    StateId(StateId),
    /// READ
    Read(ops::io::ReadRes),
    /// WRITE
    Write(ops::io::WriteRes),
    /// COMMIT
    Commit([u8; 8]),
    /// GETDEVICEINFO
    DeviceInfo(ops::deviceinfo::GetDeviceInfoRes),
    /// GETDEVICEINFO refused with `Toosmall`: the size needed
    MinCount(u32),
}

impl OpResBody {
    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        match self {
            OpResBody::Empty => {}
            OpResBody::GetFh(fh) => enc.encode_opaque(fh.as_bytes()),
            OpResBody::Access(res) => res.encode(enc),
            OpResBody::Attrs(fattr) => fattr.encode(enc),
            OpResBody::AttrsSet(mask) => mask.encode(enc),
            OpResBody::Change(cinfo) => cinfo.encode(enc),
            OpResBody::Rename(source, target) => {
                source.encode(enc);
                target.encode(enc);
            }
            OpResBody::Create(res) => res.encode(enc),
            OpResBody::ReadLink(target) => enc.encode_string(target),
            OpResBody::ReadDir(res) => res.encode(enc),
            OpResBody::SecInfo(entries) => {
                enc.encode_u32(entries.len() as u32);
                for entry in entries {
                    entry.encode(enc);
                }
            }
            OpResBody::SetClientId(res) => res.encode(enc),
            OpResBody::ClientInUse(addr) => addr.encode(enc),
            OpResBody::Open(res) => res.encode(enc),
            OpResBody::StateId(stateid) => stateid.encode(enc),
            OpResBody::Read(res) => res.encode(enc),
            OpResBody::Write(res) => res.encode(enc),
            OpResBody::Commit(verifier) => enc.encode_opaque_fixed(verifier),
            OpResBody::DeviceInfo(res) => res.encode(enc),
            OpResBody::MinCount(count) => enc.encode_u32(*count),
        }
    }
}

/// Individual operation result
#[derive(Debug, Clone, PartialEq)]
pub struct Nfs4OpRes {
    /// Operation code
    pub op: Nfs4Op,
    /// Status
    pub status: NfsStatus,
    /// Operation-specific result
    pub body: OpResBody,
}

impl Nfs4OpRes {
    /// Create a successful result
    pub fn ok(op: Nfs4Op, body: OpResBody) -> Self {
        Self {
            op,
            status: NfsStatus::Ok,
            body,
        }
    }

    /// Create an error result
    pub fn error(op: Nfs4Op, status: NfsStatus) -> Self {
        let body = match op {
            Nfs4Op::SetAttr => OpResBody::AttrsSet(Bitmap::default()),
            _ => OpResBody::Empty,
        };
        Self { op, status, body }
    }

    /// Create an error result that carries a body
    pub fn error_with(op: Nfs4Op, status: NfsStatus, body: OpResBody) -> Self {
        Self { op, status, body }
    }

    /// Encode as nfs_resop4
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_u32(self.op as u32);
        enc.encode_u32(self.status as u32);
        if self.status == NfsStatus::Ok || self.body != OpResBody::Empty {
            self.body.encode(enc);
        }
    }
}

/// COMPOUND execution context
pub struct CompoundContext<'a> {
    server: &'a NfsServer,
    caller: &'a Caller,
    minor_version: u32,
    /// Current filehandle
    pub current_fh: Option<FileHandle>,
    /// Saved filehandle
    pub saved_fh: Option<FileHandle>,
    /// Client bound by a stateful operation earlier in this COMPOUND
    pub client_id: Option<ClientId>,
    /// Results of the operations executed so far
    pub results: Vec<Nfs4OpRes>,
}

impl<'a> CompoundContext<'a> {
    /// Create a new context
    pub fn new(server: &'a NfsServer, caller: &'a Caller, minor_version: u32) -> Self {
        Self {
            server,
            caller,
            minor_version,
            current_fh: None,
            saved_fh: None,
            client_id: None,
            results: Vec::new(),
        }
    }

    /// Shared server services
    pub fn server(&self) -> &'a NfsServer {
        self.server
    }

    /// Who the request runs as
    pub fn caller(&self) -> &'a Caller {
        self.caller
    }

    /// Effective identity
    pub fn principal(&self) -> &'a Principal {
        &self.caller.principal
    }

    /// Minor version of the COMPOUND
    pub fn minor_version(&self) -> u32 {
        self.minor_version
    }

    /// Backing filesystem
    pub fn fs(&self) -> &'a dyn VirtualFileSystem {
        self.server.fs()
    }

    /// Check if current filehandle is set
    pub fn has_current_fh(&self) -> bool {
        self.current_fh.is_some()
    }

    /// Get current filehandle or return error
    pub fn require_current_fh(&self) -> Result<&FileHandle, NfsStatus> {
        self.current_fh.as_ref().ok_or(NfsStatus::NoFileHandle)
    }

    /// Inode of the current filehandle
    pub fn current_inode(&self) -> Result<Inode, NfsStatus> {
        self.require_current_fh()?.inode()
    }

    /// Inode of the saved filehandle
    pub fn saved_inode(&self) -> Result<Inode, NfsStatus> {
        self.saved_fh
            .as_ref()
            .ok_or(NfsStatus::NoFileHandle)?
            .inode()
    }

    /// Make `ino` the current object
    pub fn set_current(&mut self, ino: Inode) {
        self.current_fh = Some(FileHandle::from_inode(ino));
    }

    /// Fail with `Access` unless the caller holds `right` on `attr`
    pub fn require(&self, attr: &FileAttr, right: AccessRight) -> Result<(), NfsStatus> {
        if self.server.acl().is_allowed(&attr.acl(), self.principal(), right) {
            Ok(())
        } else {
            Err(NfsStatus::Access)
        }
    }

    /// Whether the caller holds `right` on `attr`
    pub fn allowed(&self, attr: &FileAttr, right: AccessRight) -> bool {
        self.server.acl().is_allowed(&attr.acl(), self.principal(), right)
    }

    /// Lease time advertised in attributes, in seconds
    pub fn lease_secs(&self) -> u32 {
        self.server.registry().lease_time().as_secs() as u32
    }
}

impl std::fmt::Debug for CompoundContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompoundContext")
            .field("minor_version", &self.minor_version)
            .field("current_fh", &self.current_fh)
            .field("saved_fh", &self.saved_fh)
            .field("client_id", &self.client_id)
            .field("results", &self.results.len())
            .finish()
    }
}

/// Run `ops` in order against `ctx`.
///
/// Every executed operation's result is appended to `ctx.results`; the
/// first non-OK status ends the COMPOUND and is returned.
pub async fn execute(ctx: &mut CompoundContext<'_>, ops: Vec<Nfs4OpArgs>) -> NfsStatus {
    let mut status = NfsStatus::Ok;
    for args in ops {
        let res = dispatch(ctx, args).await;
        status = res.status;
        ctx.results.push(res);
        if status != NfsStatus::Ok {
            break;
        }
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_code_conversion() {
        assert_eq!(Nfs4Op::try_from(9).unwrap(), Nfs4Op::GetAttr);
        assert_eq!(Nfs4Op::try_from(53).unwrap(), Nfs4Op::Sequence);
        assert!(Nfs4Op::try_from(999).is_err());
    }

    #[test]
    fn test_minor_version_gates_operations() {
        assert!(Nfs4Op::Open.in_minor_version(0));
        assert!(!Nfs4Op::GetDeviceInfo.in_minor_version(0));
        assert!(Nfs4Op::GetDeviceInfo.in_minor_version(1));
    }

    #[test]
    fn test_decode_stops_at_illegal_op() {
        let mut enc = XdrEncoder::new();
        enc.encode_string("t");
        enc.encode_u32(0);
        enc.encode_u32(3);
        enc.encode_u32(Nfs4Op::PutRootFh as u32);
        enc.encode_u32(Nfs4Op::GetDeviceInfo as u32);
        enc.encode_u32(Nfs4Op::GetFh as u32);
        let data = enc.finish();

        let args = CompoundArgs::decode(&mut XdrDecoder::new(&data)).unwrap();
        assert_eq!(args.ops.len(), 2);
        assert!(matches!(args.ops[0], Nfs4OpArgs::PutRootFh));
        assert!(matches!(args.ops[1], Nfs4OpArgs::Illegal));
    }

    #[test]
    fn test_decode_unsupported_op() {
        let mut enc = XdrEncoder::new();
        enc.encode_string("");
        enc.encode_u32(1);
        enc.encode_u32(1);
        enc.encode_u32(Nfs4Op::Sequence as u32);
        let data = enc.finish();

        let args = CompoundArgs::decode(&mut XdrDecoder::new(&data)).unwrap();
        assert_eq!(args.ops[0].op(), Nfs4Op::Sequence);
        assert!(matches!(args.ops[0], Nfs4OpArgs::Unsupported(_)));
    }

    #[test]
    fn test_compound_res() {
        let mut res = CompoundRes::new("test".to_string());
        res.add_result(Nfs4OpRes::ok(Nfs4Op::GetFh, OpResBody::Empty));
        assert_eq!(res.status, NfsStatus::Ok);

        res.add_result(Nfs4OpRes::error(Nfs4Op::Read, NfsStatus::Access));
        assert_eq!(res.status, NfsStatus::Access);
    }

    #[test]
    fn test_setattr_error_keeps_attrsset() {
        let res = Nfs4OpRes::error(Nfs4Op::SetAttr, NfsStatus::Access);
        let mut enc = XdrEncoder::new();
        res.encode(&mut enc);
        let data = enc.finish();

        let mut dec = XdrDecoder::new(&data);
        assert_eq!(dec.decode_u32().unwrap(), Nfs4Op::SetAttr as u32);
        assert_eq!(dec.decode_u32().unwrap(), NfsStatus::Access as u32);
        assert_eq!(dec.decode_u32().unwrap(), 0);
        assert_eq!(dec.remaining(), 0);
    }
}
