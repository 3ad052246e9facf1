//! Open state: OPEN, OPEN_CONFIRM, CLOSE
//!
//! OPEN hands out an unconfirmed state and always asks the client to
//! confirm it. Only CLAIM_NULL opens and UNCHECKED/GUARDED creation are
//! served; delegations are never granted.

use tracing::debug;

use super::{current_dir, OpResult};
use crate::acl::AccessRight;
use crate::error::NfsStatus;
use crate::filehandle::FileHandle;
use crate::nfs4::attr::{decode_settable, Bitmap, Fattr4};
use crate::nfs4::compound::{CompoundContext, Nfs4Op, Nfs4OpRes, OpResBody};
use crate::nfs4::state::{ClientId, ShareAccess, ShareDeny};
use crate::nfs4::{check_component, ChangeInfo, StateId};
use crate::rpc::xdr::{XdrDecoder, XdrEncoder};
use crate::vfs::{FileType, FsError, NewObject, SetAttr};

/// Client must confirm the open with OPEN_CONFIRM
pub const OPEN4_RESULT_CONFIRM: u32 = 0x2;
/// Server uses POSIX lock semantics
pub const OPEN4_RESULT_LOCKTYPE_POSIX: u32 = 0x4;

/// createhow4
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateHow {
    /// Create or open an existing file
    Unchecked(Fattr4),
    /// Create, failing if the name exists
    Guarded(Fattr4),
    /// Exclusive create keyed by a verifier
    Exclusive([u8; 8]),
}

/// open_claim4
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenClaim {
    /// Open by name in the current directory
    Null(String),
    /// Any other claim type; its body is consumed but not served
    Other(u32),
}

/// OPEN arguments
#[derive(Debug, Clone)]
pub struct OpenArgs {
    /// Open-owner sequence number
    pub seqid: u32,
    /// Requested access
    pub share_access: u32,
    /// Requested deny mode
    pub share_deny: u32,
    /// Client part of the open-owner
    pub client_id: ClientId,
    /// Owner part of the open-owner
    pub owner: Vec<u8>,
    /// Creation mode, `None` for OPEN4_NOCREATE
    pub create: Option<CreateHow>,
    /// What to open
    pub claim: OpenClaim,
}

impl OpenArgs {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        let seqid = dec.decode_u32()?;
        let share_access = dec.decode_u32()?;
        let share_deny = dec.decode_u32()?;
        let client_id = dec.decode_u64()?;
        let owner = dec.decode_opaque()?;

        let create = match dec.decode_u32()? {
            0 => None,
            _ => Some(match dec.decode_u32()? {
                0 => CreateHow::Unchecked(Fattr4::decode(dec)?),
                1 => CreateHow::Guarded(Fattr4::decode(dec)?),
                _ => CreateHow::Exclusive(dec.decode_array::<8>()?),
            }),
        };

        let claim = match dec.decode_u32()? {
            0 => OpenClaim::Null(dec.decode_string()?),
            claim => {
                match claim {
                    // CLAIM_PREVIOUS: delegation type
                    1 => {
                        dec.decode_u32()?;
                    }
                    // CLAIM_DELEGATE_CUR: stateid and name
                    2 => {
                        StateId::decode(dec)?;
                        dec.decode_string()?;
                    }
                    // CLAIM_DELEGATE_PREV: name
                    3 => {
                        dec.decode_string()?;
                    }
                    _ => {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            "unknown open claim",
                        ))
                    }
                }
                OpenClaim::Other(claim)
            }
        };

        Ok(Self {
            seqid,
            share_access,
            share_deny,
            client_id,
            owner,
            create,
            claim,
        })
    }

    /// Encode to XDR; claims other than CLAIM_NULL are written without a body
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_u32(self.seqid);
        enc.encode_u32(self.share_access);
        enc.encode_u32(self.share_deny);
        enc.encode_u64(self.client_id);
        enc.encode_opaque(&self.owner);
        match &self.create {
            None => enc.encode_u32(0),
            Some(how) => {
                enc.encode_u32(1);
                match how {
                    CreateHow::Unchecked(attrs) => {
                        enc.encode_u32(0);
                        attrs.encode(enc);
                    }
                    CreateHow::Guarded(attrs) => {
                        enc.encode_u32(1);
                        attrs.encode(enc);
                    }
                    CreateHow::Exclusive(verifier) => {
                        enc.encode_u32(2);
                        enc.encode_opaque_fixed(verifier);
                    }
                }
            }
        }
        match &self.claim {
            OpenClaim::Null(name) => {
                enc.encode_u32(0);
                enc.encode_string(name);
            }
            OpenClaim::Other(claim) => enc.encode_u32(*claim),
        }
    }

    /// Whether the open may create a file
    pub fn creates(&self) -> bool {
        self.create.is_some()
    }
}

/// OPEN result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRes {
    /// New open stateid
    pub stateid: StateId,
    /// Change of the parent directory
    pub cinfo: ChangeInfo,
    /// OPEN4_RESULT_* flags
    pub rflags: u32,
    /// Creation attributes applied
    pub attrset: Bitmap,
}

impl OpenRes {
    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        self.stateid.encode(enc);
        self.cinfo.encode(enc);
        enc.encode_u32(self.rflags);
        self.attrset.encode(enc);
        // OPEN_DELEGATE_NONE
        enc.encode_u32(0);
    }
}

/// Process OPEN operation
pub async fn process_open(ctx: &mut CompoundContext<'_>, args: &OpenArgs) -> OpResult {
    let access = ShareAccess::from_bits(args.share_access)?;
    ShareDeny::from_bits(args.share_deny)?;
    let name = match &args.claim {
        OpenClaim::Null(name) => name,
        OpenClaim::Other(claim) => {
            debug!(claim, "unsupported open claim");
            return Err(NfsStatus::Notsupp);
        }
    };

    let registry = ctx.server().registry();
    registry.lookup_client_by_id(args.client_id)?;

    let (dir, dir_attr) = current_dir(ctx).await?;
    check_component(name)?;
    ctx.require(&dir_attr, AccessRight::Lookup)?;

    let fs = ctx.fs();
    let existing = match fs.lookup(dir, name).await {
        Ok(ino) => Some(ino),
        Err(FsError::NotFound) => None,
        Err(e) => return Err(e.into()),
    };

    let (ino, attrset) = match (&args.create, existing) {
        (None, None) => return Err(NfsStatus::Noent),
        (None, Some(ino)) | (Some(CreateHow::Unchecked(_)), Some(ino)) => (ino, Bitmap::default()),
        (Some(CreateHow::Guarded(_)), Some(_)) => return Err(NfsStatus::Exist),
        (Some(CreateHow::Exclusive(_)), _) => return Err(NfsStatus::Notsupp),
        (Some(CreateHow::Unchecked(attrs) | CreateHow::Guarded(attrs)), None) => {
            ctx.require(&dir_attr, AccessRight::Insert)?;
            let requested = decode_settable(attrs)?;
            let principal = ctx.principal();
            let new = NewObject {
                mode: requested.mode.unwrap_or(0o644),
                uid: principal.uid,
                gid: principal.gid,
            };
            let ino = fs.create(dir, name, FileType::Regular, new).await?;
            let rest = SetAttr {
                mode: None,
                ..requested
            };
            if !rest.is_empty() {
                fs.set_attr(ino, &rest).await?;
            }
            (ino, attrs.mask.clone())
        }
    };

    let attr = fs.stat(ino).await?;
    match attr.file_type {
        FileType::Regular => {}
        FileType::Directory => return Err(NfsStatus::Isdir),
        FileType::Symlink => return Err(NfsStatus::Symlink),
        _ => return Err(NfsStatus::Inval),
    }
    // the creator may open what it just created
    if existing.is_some() {
        if access.contains(ShareAccess::READ) {
            ctx.require(&attr, AccessRight::Read)?;
        }
        if access.contains(ShareAccess::WRITE) {
            ctx.require(&attr, AccessRight::Write)?;
        }
    }

    let stateid = registry.create_state(args.client_id, FileHandle::from_inode(ino), access)?;
    let after = fs.stat(dir).await?;
    debug!(client = args.client_id, ino, ?stateid, "file opened");

    ctx.client_id = Some(args.client_id);
    ctx.set_current(ino);
    Ok(Nfs4OpRes::ok(
        Nfs4Op::Open,
        OpResBody::Open(OpenRes {
            stateid,
            cinfo: ChangeInfo::new(dir_attr.change, after.change, true),
            rflags: OPEN4_RESULT_CONFIRM | OPEN4_RESULT_LOCKTYPE_POSIX,
            attrset,
        }),
    ))
}

// ============================================================================
// OPEN_CONFIRM
// ============================================================================

/// OPEN_CONFIRM arguments
#[derive(Debug, Clone)]
pub struct OpenConfirmArgs {
    /// Stateid returned by OPEN
    pub stateid: StateId,
    /// Open-owner sequence number
    pub seqid: u32,
}

impl OpenConfirmArgs {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        Ok(Self {
            stateid: StateId::decode(dec)?,
            seqid: dec.decode_u32()?,
        })
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        self.stateid.encode(enc);
        enc.encode_u32(self.seqid);
    }
}

/// Process OPEN_CONFIRM operation
pub fn process_open_confirm(ctx: &mut CompoundContext<'_>, args: &OpenConfirmArgs) -> OpResult {
    ctx.require_current_fh()?;
    let stateid = ctx.server().registry().confirm_state(&args.stateid)?;
    ctx.client_id = Some(stateid.client_id());
    Ok(Nfs4OpRes::ok(
        Nfs4Op::OpenConfirm,
        OpResBody::StateId(stateid),
    ))
}

// ============================================================================
// CLOSE
// ============================================================================

/// CLOSE arguments
#[derive(Debug, Clone)]
pub struct CloseArgs {
    /// Open-owner sequence number
    pub seqid: u32,
    /// State to release
    pub stateid: StateId,
}

impl CloseArgs {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        Ok(Self {
            seqid: dec.decode_u32()?,
            stateid: StateId::decode(dec)?,
        })
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_u32(self.seqid);
        self.stateid.encode(enc);
    }
}

/// Process CLOSE operation
pub fn process_close(ctx: &mut CompoundContext<'_>, args: &CloseArgs) -> OpResult {
    ctx.require_current_fh()?;
    let state = ctx.server().registry().release_state(&args.stateid)?;
    ctx.client_id = Some(state.client_id);
    let mut closed = state.stateid;
    closed.seqid = closed.seqid.wrapping_add(1);
    Ok(Nfs4OpRes::ok(Nfs4Op::Close, OpResBody::StateId(closed)))
}
