//! NFS error types

use thiserror::Error;

/// NFS error types
#[derive(Debug, Error)]
pub enum NfsError {
    /// RPC error
    #[error("RPC error: {0}")]
    Rpc(String),

    /// XDR encoding/decoding error
    #[error("XDR error: {0}")]
    Xdr(String),

    /// NFS protocol error
    #[error("NFS error: {0}")]
    Protocol(NfsStatus),

    /// Client address not admitted by any export
    #[error("no export admits client {0}")]
    ExportNotFound(std::net::IpAddr),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NfsError {
    /// Protocol status to report for this error
    pub fn status(&self) -> NfsStatus {
        match self {
            NfsError::Protocol(status) => *status,
            NfsError::ExportNotFound(_) => NfsStatus::Access,
            NfsError::Xdr(_) => NfsStatus::BadXdr,
            _ => NfsStatus::Serverfault,
        }
    }
}

impl From<NfsStatus> for NfsError {
    fn from(status: NfsStatus) -> Self {
        NfsError::Protocol(status)
    }
}

/// NFS status codes
///
/// NFSv3 (RFC 1813) status values are a numeric subset of the NFSv4
/// (RFC 7530) ones, so both dialects share this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum NfsStatus {
    /// Success
    Ok = 0,
    /// Not owner
    Perm = 1,
    /// No such file or directory
    Noent = 2,
    /// I/O error
    Io = 5,
    /// No such device or address
    Nxio = 6,
    /// Access denied
    Access = 13,
    /// File exists
    Exist = 17,
    /// Cross-device link
    Xdev = 18,
    /// Not a directory
    Notdir = 20,
    /// Is a directory
    Isdir = 21,
    /// Invalid argument
    Inval = 22,
    /// File too large
    Fbig = 27,
    /// No space left on device
    Nospc = 28,
    /// Read-only file system
    Rofs = 30,
    /// Too many links
    Mlink = 31,
    /// File name too long
    Nametoolong = 63,
    /// Directory not empty
    Notempty = 66,
    /// Disk quota exceeded
    Dquot = 69,
    /// Stale file handle
    Stale = 70,
    /// Bad file handle
    Badhandle = 10001,
    /// Update synchronization mismatch (NFSv3 guarded SETATTR)
    NotSync = 10002,
    /// Bad cookie
    BadCookie = 10003,
    /// Not supported
    Notsupp = 10004,
    /// Too small
    Toosmall = 10005,
    /// Server fault
    Serverfault = 10006,
    /// Bad type
    BadType = 10007,
    /// Attributes are the same (NVERIFY)
    Same = 10009,
    /// Lock range conflict
    Denied = 10010,
    /// Lease expired
    Expired = 10011,
    /// Locked
    Locked = 10012,
    /// Grace period in effect
    Grace = 10013,
    /// Client id in use by another verifier
    ClidInuse = 10017,
    /// Compound too large
    Resource = 10018,
    /// Moved
    Moved = 10019,
    /// No filehandle
    NoFileHandle = 10020,
    /// Minor version not supported
    MinorVersMismatch = 10021,
    /// Client id unknown or stale
    StaleClientid = 10022,
    /// Stateid from a previous server instance
    StaleStateid = 10023,
    /// Stateid seqid is behind the current one
    OldStateid = 10024,
    /// Bad stateid
    BadStateid = 10025,
    /// Bad sequence ID
    BadSeqid = 10026,
    /// Attributes (or cookie verifier) not the same
    NotSame = 10027,
    /// Restore filehandle error
    RestoreFh = 10030,
    /// Attribute not supported
    Attrnotsupp = 10032,
    /// Illegal name
    Badname = 10041,
    /// Illegal operation
    OpIllegal = 10044,
    /// Layout unavailable
    LayoutUnavailable = 10059,
    /// Object is a symbolic link
    Symlink = 10029,
    /// Arguments could not be decoded
    BadXdr = 10036,
    /// Stateid does not grant the access the operation needs
    OpenMode = 10038,
}

impl NfsStatus {
    /// Check for success
    pub fn is_ok(&self) -> bool {
        *self == NfsStatus::Ok
    }
}

impl std::fmt::Display for NfsStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NfsStatus::Ok => "NFS4_OK",
            NfsStatus::Perm => "NFS4ERR_PERM",
            NfsStatus::Noent => "NFS4ERR_NOENT",
            NfsStatus::Io => "NFS4ERR_IO",
            NfsStatus::Nxio => "NFS4ERR_NXIO",
            NfsStatus::Access => "NFS4ERR_ACCESS",
            NfsStatus::Exist => "NFS4ERR_EXIST",
            NfsStatus::Xdev => "NFS4ERR_XDEV",
            NfsStatus::Notdir => "NFS4ERR_NOTDIR",
            NfsStatus::Isdir => "NFS4ERR_ISDIR",
            NfsStatus::Inval => "NFS4ERR_INVAL",
            NfsStatus::Fbig => "NFS4ERR_FBIG",
            NfsStatus::Nospc => "NFS4ERR_NOSPC",
            NfsStatus::Rofs => "NFS4ERR_ROFS",
            NfsStatus::Mlink => "NFS4ERR_MLINK",
            NfsStatus::Nametoolong => "NFS4ERR_NAMETOOLONG",
            NfsStatus::Notempty => "NFS4ERR_NOTEMPTY",
            NfsStatus::Dquot => "NFS4ERR_DQUOT",
            NfsStatus::Stale => "NFS4ERR_STALE",
            NfsStatus::Badhandle => "NFS4ERR_BADHANDLE",
            NfsStatus::NotSync => "NFS3ERR_NOT_SYNC",
            NfsStatus::BadCookie => "NFS4ERR_BAD_COOKIE",
            NfsStatus::Notsupp => "NFS4ERR_NOTSUPP",
            NfsStatus::Toosmall => "NFS4ERR_TOOSMALL",
            NfsStatus::Serverfault => "NFS4ERR_SERVERFAULT",
            NfsStatus::BadType => "NFS4ERR_BADTYPE",
            NfsStatus::Same => "NFS4ERR_SAME",
            NfsStatus::Denied => "NFS4ERR_DENIED",
            NfsStatus::Expired => "NFS4ERR_EXPIRED",
            NfsStatus::Locked => "NFS4ERR_LOCKED",
            NfsStatus::Grace => "NFS4ERR_GRACE",
            NfsStatus::ClidInuse => "NFS4ERR_CLID_INUSE",
            NfsStatus::Resource => "NFS4ERR_RESOURCE",
            NfsStatus::Moved => "NFS4ERR_MOVED",
            NfsStatus::NoFileHandle => "NFS4ERR_NOFILEHANDLE",
            NfsStatus::MinorVersMismatch => "NFS4ERR_MINOR_VERS_MISMATCH",
            NfsStatus::StaleClientid => "NFS4ERR_STALE_CLIENTID",
            NfsStatus::StaleStateid => "NFS4ERR_STALE_STATEID",
            NfsStatus::OldStateid => "NFS4ERR_OLD_STATEID",
            NfsStatus::BadStateid => "NFS4ERR_BAD_STATEID",
            NfsStatus::BadSeqid => "NFS4ERR_BAD_SEQID",
            NfsStatus::NotSame => "NFS4ERR_NOT_SAME",
            NfsStatus::RestoreFh => "NFS4ERR_RESTOREFH",
            NfsStatus::Attrnotsupp => "NFS4ERR_ATTRNOTSUPP",
            NfsStatus::Badname => "NFS4ERR_BADNAME",
            NfsStatus::OpIllegal => "NFS4ERR_OP_ILLEGAL",
            NfsStatus::LayoutUnavailable => "NFS4ERR_LAYOUTUNAVAILABLE",
            NfsStatus::Symlink => "NFS4ERR_SYMLINK",
            NfsStatus::BadXdr => "NFS4ERR_BADXDR",
            NfsStatus::OpenMode => "NFS4ERR_OPENMODE",
        };
        write!(f, "{}", name)
    }
}

/// Result type for NFS operations
pub type NfsResult<T> = Result<T, NfsError>;
