//! Name space operations: LOOKUP, LOOKUPP, REMOVE, RENAME, LINK, READLINK

use super::{current_dir, OpResult};
use crate::acl::AccessRight;
use crate::error::NfsStatus;
use crate::nfs4::compound::{CompoundContext, Nfs4Op, Nfs4OpRes, OpResBody};
use crate::nfs4::{check_component, ChangeInfo};
use crate::rpc::xdr::{XdrDecoder, XdrEncoder};
use crate::vfs::{FileType, Inode};

async fn change_after(
    ctx: &CompoundContext<'_>,
    dir: Inode,
    before: u64,
) -> Result<ChangeInfo, NfsStatus> {
    let after = ctx.fs().stat(dir).await?;
    Ok(ChangeInfo::new(before, after.change, true))
}

// ============================================================================
// LOOKUP / LOOKUPP
// ============================================================================

/// LOOKUP arguments
#[derive(Debug, Clone)]
pub struct LookupArgs {
    /// Name to look up
    pub name: String,
}

impl LookupArgs {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        let name = dec.decode_string()?;
        Ok(Self { name })
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_string(&self.name);
    }
}

/// Process LOOKUP operation
pub async fn process_lookup(ctx: &mut CompoundContext<'_>, args: &LookupArgs) -> OpResult {
    let (dir, attr) = current_dir(ctx).await?;
    check_component(&args.name)?;
    ctx.require(&attr, AccessRight::Lookup)?;
    let ino = ctx.fs().lookup(dir, &args.name).await?;
    ctx.set_current(ino);
    Ok(Nfs4OpRes::ok(Nfs4Op::Lookup, OpResBody::Empty))
}

/// Process LOOKUPP operation
pub async fn process_lookupp(ctx: &mut CompoundContext<'_>) -> OpResult {
    let (dir, attr) = current_dir(ctx).await?;
    if dir == ctx.fs().root() {
        return Err(NfsStatus::Noent);
    }
    ctx.require(&attr, AccessRight::Lookup)?;
    let parent = ctx.fs().lookup(dir, "..").await?;
    ctx.set_current(parent);
    Ok(Nfs4OpRes::ok(Nfs4Op::LookupP, OpResBody::Empty))
}

// ============================================================================
// REMOVE - Remove a directory entry
// ============================================================================

/// REMOVE arguments
#[derive(Debug, Clone)]
pub struct RemoveArgs {
    /// Entry to remove from the current directory
    pub target: String,
}

impl RemoveArgs {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        Ok(Self {
            target: dec.decode_string()?,
        })
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_string(&self.target);
    }
}

/// Process REMOVE operation
pub async fn process_remove(ctx: &mut CompoundContext<'_>, args: &RemoveArgs) -> OpResult {
    let (dir, attr) = current_dir(ctx).await?;
    check_component(&args.target)?;
    ctx.require(&attr, AccessRight::Delete)?;
    ctx.fs().remove(dir, &args.target).await?;
    let cinfo = change_after(ctx, dir, attr.change).await?;
    Ok(Nfs4OpRes::ok(Nfs4Op::Remove, OpResBody::Change(cinfo)))
}

// ============================================================================
// RENAME - Saved filehandle is the source directory, current the target
// ============================================================================

/// RENAME arguments
#[derive(Debug, Clone)]
pub struct RenameArgs {
    /// Name in the saved directory
    pub old_name: String,
    /// Name in the current directory
    pub new_name: String,
}

impl RenameArgs {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        Ok(Self {
            old_name: dec.decode_string()?,
            new_name: dec.decode_string()?,
        })
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_string(&self.old_name);
        enc.encode_string(&self.new_name);
    }
}

/// Process RENAME operation
pub async fn process_rename(ctx: &mut CompoundContext<'_>, args: &RenameArgs) -> OpResult {
    let (to_dir, to_attr) = current_dir(ctx).await?;
    let from_dir = ctx.saved_inode()?;
    let from_attr = ctx.fs().stat_cached(from_dir).await?;
    if !from_attr.is_dir() {
        return Err(NfsStatus::Notdir);
    }
    check_component(&args.old_name)?;
    check_component(&args.new_name)?;
    ctx.require(&from_attr, AccessRight::Delete)?;
    ctx.require(&to_attr, AccessRight::Insert)?;

    ctx.fs()
        .rename(from_dir, &args.old_name, to_dir, &args.new_name)
        .await?;

    let source = change_after(ctx, from_dir, from_attr.change).await?;
    let target = change_after(ctx, to_dir, to_attr.change).await?;
    Ok(Nfs4OpRes::ok(
        Nfs4Op::Rename,
        OpResBody::Rename(source, target),
    ))
}

// ============================================================================
// LINK - Saved filehandle is the object, current the directory
// ============================================================================

/// LINK arguments
#[derive(Debug, Clone)]
pub struct LinkArgs {
    /// Name of the new link
    pub new_name: String,
}

impl LinkArgs {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        Ok(Self {
            new_name: dec.decode_string()?,
        })
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_string(&self.new_name);
    }
}

/// Process LINK operation
pub async fn process_link(ctx: &mut CompoundContext<'_>, args: &LinkArgs) -> OpResult {
    let (dir, attr) = current_dir(ctx).await?;
    let target = ctx.saved_inode()?;
    check_component(&args.new_name)?;
    if ctx.fs().stat_cached(target).await?.is_dir() {
        return Err(NfsStatus::Isdir);
    }
    ctx.require(&attr, AccessRight::Insert)?;
    ctx.fs().link(dir, &args.new_name, target).await?;
    let cinfo = change_after(ctx, dir, attr.change).await?;
    Ok(Nfs4OpRes::ok(Nfs4Op::Link, OpResBody::Change(cinfo)))
}

// ============================================================================
// READLINK
// ============================================================================

/// Process READLINK operation
pub async fn process_readlink(ctx: &mut CompoundContext<'_>) -> OpResult {
    let ino = ctx.current_inode()?;
    let attr = ctx.fs().stat(ino).await?;
    match attr.file_type {
        FileType::Symlink => {}
        FileType::Directory => return Err(NfsStatus::Isdir),
        _ => return Err(NfsStatus::Inval),
    }
    ctx.require(&attr, AccessRight::Read)?;
    let target = ctx.fs().read_link(ino).await?;
    Ok(Nfs4OpRes::ok(Nfs4Op::ReadLink, OpResBody::ReadLink(target)))
}
