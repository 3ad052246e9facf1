//! File data: READ, WRITE, COMMIT
//!
//! A stateid from OPEN is validated (and its client's lease renewed) on
//! every call. The anonymous stateid, and for READ the bypass stateid, fall
//! back to a plain permission check.

use super::OpResult;
use crate::acl::AccessRight;
use crate::error::NfsStatus;
use crate::nfs4::compound::{CompoundContext, Nfs4Op, Nfs4OpRes, OpResBody};
use crate::nfs4::state::ShareAccess;
use crate::nfs4::StateId;
use crate::rpc::xdr::{XdrDecoder, XdrEncoder};
use crate::vfs::{FileType, Inode};

/// stable_how4 FILE_SYNC4
const FILE_SYNC4: u32 = 2;

async fn open_file(
    ctx: &CompoundContext<'_>,
    stateid: &StateId,
    right: AccessRight,
    need: ShareAccess,
) -> Result<Inode, NfsStatus> {
    let ino = ctx.current_inode()?;
    let attr = ctx.fs().stat(ino).await?;
    match attr.file_type {
        FileType::Regular => {}
        FileType::Directory => return Err(NfsStatus::Isdir),
        _ => return Err(NfsStatus::Inval),
    }

    if *stateid == StateId::ANONYMOUS
        || (*stateid == StateId::READ_BYPASS && need == ShareAccess::READ)
    {
        ctx.require(&attr, right)?;
        return Ok(ino);
    }

    let state = ctx.server().registry().check_state(stateid)?;
    if &state.filehandle != ctx.require_current_fh()? {
        return Err(NfsStatus::BadStateid);
    }
    if !state.share_access.contains(need) {
        return Err(NfsStatus::OpenMode);
    }
    Ok(ino)
}

// ============================================================================
// READ
// ============================================================================

/// READ arguments
#[derive(Debug, Clone)]
pub struct ReadArgs {
    /// Open stateid or a special stateid
    pub stateid: StateId,
    /// Byte offset
    pub offset: u64,
    /// Bytes wanted
    pub count: u32,
}

impl ReadArgs {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        Ok(Self {
            stateid: StateId::decode(dec)?,
            offset: dec.decode_u64()?,
            count: dec.decode_u32()?,
        })
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        self.stateid.encode(enc);
        enc.encode_u64(self.offset);
        enc.encode_u32(self.count);
    }
}

/// READ result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRes {
    /// End of file reached
    pub eof: bool,
    /// Data read
    pub data: bytes::Bytes,
}

impl ReadRes {
    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_bool(self.eof);
        enc.encode_opaque(&self.data);
    }
}

/// Process READ operation
pub async fn process_read(ctx: &mut CompoundContext<'_>, args: &ReadArgs) -> OpResult {
    let ino = open_file(ctx, &args.stateid, AccessRight::Read, ShareAccess::READ).await?;
    let count = args.count.min(ctx.server().config().max_read_size);
    let (data, eof) = ctx.fs().read(ino, args.offset, count).await?;
    Ok(Nfs4OpRes::ok(
        Nfs4Op::Read,
        OpResBody::Read(ReadRes { eof, data }),
    ))
}

// ============================================================================
// WRITE
// ============================================================================

/// WRITE arguments
#[derive(Debug, Clone)]
pub struct WriteArgs {
    /// Open stateid or the anonymous stateid
    pub stateid: StateId,
    /// Byte offset
    pub offset: u64,
    /// Requested stability
    pub stable: u32,
    /// Data to write
    pub data: bytes::Bytes,
}

impl WriteArgs {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        Ok(Self {
            stateid: StateId::decode(dec)?,
            offset: dec.decode_u64()?,
            stable: dec.decode_u32()?,
            data: bytes::Bytes::from(dec.decode_opaque()?),
        })
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        self.stateid.encode(enc);
        enc.encode_u64(self.offset);
        enc.encode_u32(self.stable);
        enc.encode_opaque(&self.data);
    }
}

/// WRITE result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRes {
    /// Bytes written
    pub count: u32,
    /// Stability achieved
    pub committed: u32,
    /// Server write verifier
    pub verifier: [u8; 8],
}

impl WriteRes {
    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_u32(self.count);
        enc.encode_u32(self.committed);
        enc.encode_opaque_fixed(&self.verifier);
    }
}

/// Process WRITE operation
pub async fn process_write(ctx: &mut CompoundContext<'_>, args: &WriteArgs) -> OpResult {
    let ino = open_file(ctx, &args.stateid, AccessRight::Write, ShareAccess::WRITE).await?;
    let max = ctx.server().config().max_write_size as usize;
    let data = &args.data[..args.data.len().min(max)];
    let count = ctx.fs().write(ino, args.offset, data).await?;
    Ok(Nfs4OpRes::ok(
        Nfs4Op::Write,
        OpResBody::Write(WriteRes {
            count,
            committed: FILE_SYNC4,
            verifier: ctx.server().write_verifier(),
        }),
    ))
}

// ============================================================================
// COMMIT
// ============================================================================

/// COMMIT arguments
#[derive(Debug, Clone)]
pub struct CommitArgs {
    /// Start of the range
    pub offset: u64,
    /// Length of the range, 0 for to end of file
    pub count: u32,
}

impl CommitArgs {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        Ok(Self {
            offset: dec.decode_u64()?,
            count: dec.decode_u32()?,
        })
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_u64(self.offset);
        enc.encode_u32(self.count);
    }
}

/// Process COMMIT operation; writes are already stable
pub async fn process_commit(ctx: &mut CompoundContext<'_>, _args: &CommitArgs) -> OpResult {
    let ino = ctx.current_inode()?;
    match ctx.fs().stat(ino).await?.file_type {
        FileType::Regular => {}
        FileType::Directory => return Err(NfsStatus::Isdir),
        _ => return Err(NfsStatus::Inval),
    }
    Ok(Nfs4OpRes::ok(
        Nfs4Op::Commit,
        OpResBody::Commit(ctx.server().write_verifier()),
    ))
}
