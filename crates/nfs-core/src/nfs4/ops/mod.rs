//! NFSv4 operation handlers
//!
//! Handlers take the COMPOUND context and their decoded arguments and
//! return an [`OpResult`]; a `NfsStatus` error becomes the operation's
//! failed result. Filehandle bookkeeping lives here, everything else in the
//! submodules.

pub mod attrs;
pub mod clientid;
pub mod create;
pub mod deviceinfo;
pub mod io;
pub mod namespace;
pub mod open;
pub mod readdir;
pub mod secinfo;

use bytes::Bytes;
use tracing::debug;

use super::compound::{CompoundContext, Nfs4Op, Nfs4OpArgs, Nfs4OpRes, OpResBody};
use crate::error::NfsStatus;
use crate::filehandle::FileHandle;
use crate::rpc::xdr::{XdrDecoder, XdrEncoder};
use crate::vfs::{FileAttr, Inode};

/// Result of an operation
pub type OpResult = Result<Nfs4OpRes, NfsStatus>;

/// Run one operation
pub async fn dispatch(ctx: &mut CompoundContext<'_>, args: Nfs4OpArgs) -> Nfs4OpRes {
    let op = args.op();
    if ctx.caller().read_only && args.is_mutating() {
        debug!(?op, "read-only export");
        return Nfs4OpRes::error(op, NfsStatus::Rofs);
    }

    let result = match args {
        Nfs4OpArgs::PutFh(args) => process_putfh(ctx, &args),
        Nfs4OpArgs::PutRootFh => process_putrootfh(ctx),
        Nfs4OpArgs::GetFh => process_getfh(ctx),
        Nfs4OpArgs::SaveFh => process_savefh(ctx),
        Nfs4OpArgs::RestoreFh => process_restorefh(ctx),
        Nfs4OpArgs::Lookup(args) => namespace::process_lookup(ctx, &args).await,
        Nfs4OpArgs::LookupP => namespace::process_lookupp(ctx).await,
        Nfs4OpArgs::Remove(args) => namespace::process_remove(ctx, &args).await,
        Nfs4OpArgs::Rename(args) => namespace::process_rename(ctx, &args).await,
        Nfs4OpArgs::Link(args) => namespace::process_link(ctx, &args).await,
        Nfs4OpArgs::ReadLink => namespace::process_readlink(ctx).await,
        Nfs4OpArgs::Access(args) => attrs::process_access(ctx, &args).await,
        Nfs4OpArgs::GetAttr(args) => attrs::process_getattr(ctx, &args).await,
        Nfs4OpArgs::SetAttr(args) => attrs::process_setattr(ctx, &args).await,
        Nfs4OpArgs::Verify(args) => attrs::process_verify(ctx, &args, false).await,
        Nfs4OpArgs::NVerify(args) => attrs::process_verify(ctx, &args, true).await,
        Nfs4OpArgs::Create(args) => create::process_create(ctx, &args).await,
        Nfs4OpArgs::ReadDir(args) => readdir::process_readdir(ctx, &args).await,
        Nfs4OpArgs::SecInfo(args) => secinfo::process_secinfo(ctx, &args).await,
        Nfs4OpArgs::SetClientId(args) => clientid::process_setclientid(ctx, &args),
        Nfs4OpArgs::SetClientIdConfirm(args) => clientid::process_setclientid_confirm(ctx, &args),
        Nfs4OpArgs::Renew(args) => clientid::process_renew(ctx, &args),
        Nfs4OpArgs::Open(args) => open::process_open(ctx, &args).await,
        Nfs4OpArgs::OpenConfirm(args) => open::process_open_confirm(ctx, &args),
        Nfs4OpArgs::Close(args) => open::process_close(ctx, &args),
        Nfs4OpArgs::Read(args) => io::process_read(ctx, &args).await,
        Nfs4OpArgs::Write(args) => io::process_write(ctx, &args).await,
        Nfs4OpArgs::Commit(args) => io::process_commit(ctx, &args).await,
        Nfs4OpArgs::GetDeviceInfo(args) => deviceinfo::process_getdeviceinfo(ctx, &args),
        Nfs4OpArgs::Unsupported(_) => Err(NfsStatus::Notsupp),
        Nfs4OpArgs::Illegal => Err(NfsStatus::OpIllegal),
    };

    match result {
        Ok(res) => res,
        Err(status) => {
            debug!(?op, %status, "operation failed");
            Nfs4OpRes::error(op, status)
        }
    }
}

/// Current object's attributes, which must be a directory
pub(crate) async fn current_dir(ctx: &CompoundContext<'_>) -> Result<(Inode, FileAttr), NfsStatus> {
    let ino = ctx.current_inode()?;
    let attr = ctx.fs().stat_cached(ino).await?;
    if !attr.is_dir() {
        return Err(NfsStatus::Notdir);
    }
    Ok((ino, attr))
}

// ============================================================================
// PUTFH - Set current filehandle
// ============================================================================

/// PUTFH arguments
#[derive(Debug, Clone)]
pub struct PutFhArgs {
    /// Filehandle as sent, validated when the operation runs
    pub object: Bytes,
}

impl PutFhArgs {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        Ok(Self {
            object: Bytes::from(dec.decode_opaque()?),
        })
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_opaque(&self.object);
    }
}

/// Process PUTFH operation
pub fn process_putfh(ctx: &mut CompoundContext<'_>, args: &PutFhArgs) -> OpResult {
    let fh = FileHandle::from_wire(args.object.clone())?;
    fh.inode()?;
    ctx.current_fh = Some(fh);
    Ok(Nfs4OpRes::ok(Nfs4Op::PutFh, OpResBody::Empty))
}

// ============================================================================
// PUTROOTFH - Set current filehandle to root
// ============================================================================

/// Process PUTROOTFH operation
pub fn process_putrootfh(ctx: &mut CompoundContext<'_>) -> OpResult {
    let root = ctx.fs().root();
    ctx.set_current(root);
    Ok(Nfs4OpRes::ok(Nfs4Op::PutRootFh, OpResBody::Empty))
}

// ============================================================================
// GETFH - Get current filehandle
// ============================================================================

/// Process GETFH operation
pub fn process_getfh(ctx: &CompoundContext<'_>) -> OpResult {
    let fh = ctx.require_current_fh()?.clone();
    Ok(Nfs4OpRes::ok(Nfs4Op::GetFh, OpResBody::GetFh(fh)))
}

// ============================================================================
// SAVEFH / RESTOREFH
// ============================================================================

/// Process SAVEFH operation
pub fn process_savefh(ctx: &mut CompoundContext<'_>) -> OpResult {
    let fh = ctx.require_current_fh()?.clone();
    ctx.saved_fh = Some(fh);
    Ok(Nfs4OpRes::ok(Nfs4Op::SaveFh, OpResBody::Empty))
}

/// Process RESTOREFH operation
pub fn process_restorefh(ctx: &mut CompoundContext<'_>) -> OpResult {
    let fh = ctx.saved_fh.clone().ok_or(NfsStatus::RestoreFh)?;
    ctx.current_fh = Some(fh);
    Ok(Nfs4OpRes::ok(Nfs4Op::RestoreFh, OpResBody::Empty))
}
