//! Attribute operations: ACCESS, GETATTR, SETATTR, VERIFY, NVERIFY

use super::OpResult;
use crate::acl::AccessRight;
use crate::error::NfsStatus;
use crate::nfs4::attr::{check_supported, decode_settable, encode_attrs, Bitmap, Fattr4};
use crate::nfs4::compound::{CompoundContext, Nfs4Op, Nfs4OpRes, OpResBody};
use crate::nfs4::{AccessBits, StateId};
use crate::rpc::xdr::{XdrDecoder, XdrEncoder};
use crate::vfs::FileAttr;

// ============================================================================
// ACCESS - Check access permission
// ============================================================================

/// ACCESS arguments
#[derive(Debug, Clone)]
pub struct AccessArgs {
    /// Access bits to check
    pub access: u32,
}

impl AccessArgs {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        let access = dec.decode_u32()?;
        Ok(Self { access })
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_u32(self.access);
    }
}

/// ACCESS result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRes {
    /// Supported access bits
    pub supported: u32,
    /// Granted access bits
    pub access: u32,
}

impl AccessRes {
    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_u32(self.supported);
        enc.encode_u32(self.access);
    }
}

fn access_rights(attr: &FileAttr) -> [(u32, AccessRight); 6] {
    if attr.is_dir() {
        [
            (AccessBits::READ, AccessRight::Read),
            (AccessBits::LOOKUP, AccessRight::Lookup),
            (AccessBits::MODIFY, AccessRight::Insert),
            (AccessBits::EXTEND, AccessRight::Insert),
            (AccessBits::DELETE, AccessRight::Delete),
            // EXECUTE means nothing for a directory
            (0, AccessRight::Execute),
        ]
    } else {
        [
            (AccessBits::READ, AccessRight::Read),
            (0, AccessRight::Lookup),
            (AccessBits::MODIFY, AccessRight::Write),
            (AccessBits::EXTEND, AccessRight::Write),
            (0, AccessRight::Delete),
            (AccessBits::EXECUTE, AccessRight::Execute),
        ]
    }
}

/// Process ACCESS operation
pub async fn process_access(ctx: &mut CompoundContext<'_>, args: &AccessArgs) -> OpResult {
    let ino = ctx.current_inode()?;
    let attr = ctx.fs().stat(ino).await?;

    let mut res = AccessRes {
        supported: 0,
        access: 0,
    };
    for (bit, right) in access_rights(&attr) {
        if bit == 0 || args.access & bit == 0 {
            continue;
        }
        res.supported |= bit;
        if ctx.allowed(&attr, right) {
            res.access |= bit;
        }
    }
    Ok(Nfs4OpRes::ok(Nfs4Op::Access, OpResBody::Access(res)))
}

// ============================================================================
// GETATTR - Get file attributes
// ============================================================================

/// GETATTR arguments
#[derive(Debug, Clone)]
pub struct GetAttrArgs {
    /// Attribute bitmap request
    pub attr_request: Bitmap,
}

impl GetAttrArgs {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        Ok(Self {
            attr_request: Bitmap::decode(dec)?,
        })
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        self.attr_request.encode(enc);
    }
}

/// Process GETATTR operation
pub async fn process_getattr(ctx: &mut CompoundContext<'_>, args: &GetAttrArgs) -> OpResult {
    let ino = ctx.current_inode()?;
    let attr = ctx.fs().stat(ino).await?;
    let fattr = encode_attrs(&args.attr_request, &attr, ctx.lease_secs());
    Ok(Nfs4OpRes::ok(Nfs4Op::GetAttr, OpResBody::Attrs(fattr)))
}

// ============================================================================
// SETATTR - Set file attributes
// ============================================================================

/// SETATTR arguments
#[derive(Debug, Clone)]
pub struct SetAttrArgs {
    /// Stateid
    pub stateid: StateId,
    /// Attribute values to set
    pub attrs: Fattr4,
}

impl SetAttrArgs {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        Ok(Self {
            stateid: StateId::decode(dec)?,
            attrs: Fattr4::decode(dec)?,
        })
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        self.stateid.encode(enc);
        self.attrs.encode(enc);
    }
}

/// Process SETATTR operation
pub async fn process_setattr(ctx: &mut CompoundContext<'_>, args: &SetAttrArgs) -> OpResult {
    let ino = ctx.current_inode()?;
    let set = decode_settable(&args.attrs)?;
    let attr = ctx.fs().stat(ino).await?;

    if set.size.is_some() {
        if attr.is_dir() {
            return Err(NfsStatus::Isdir);
        }
        if !args.stateid.is_special() {
            ctx.server().registry().check_state(&args.stateid)?;
        }
        ctx.require(&attr, AccessRight::Write)?;
    }
    if set.mode.is_some() || set.uid.is_some() || set.gid.is_some() {
        ctx.require(&attr, AccessRight::Admin)?;
    }
    if (set.atime.is_some() || set.mtime.is_some()) && !ctx.allowed(&attr, AccessRight::Admin) {
        ctx.require(&attr, AccessRight::Write)?;
    }

    ctx.fs().set_attr(ino, &set).await?;
    Ok(Nfs4OpRes::ok(
        Nfs4Op::SetAttr,
        OpResBody::AttrsSet(args.attrs.mask.clone()),
    ))
}

// ============================================================================
// VERIFY / NVERIFY - Compare attributes
// ============================================================================

/// VERIFY and NVERIFY arguments
#[derive(Debug, Clone)]
pub struct VerifyArgs {
    /// Attributes the client expects
    pub attrs: Fattr4,
}

impl VerifyArgs {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        Ok(Self {
            attrs: Fattr4::decode(dec)?,
        })
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        self.attrs.encode(enc);
    }
}

/// Process VERIFY (`negate == false`) or NVERIFY.
///
/// VERIFY succeeds when every presented attribute matches and fails with
/// `NotSame` otherwise; NVERIFY succeeds when at least one differs and
/// fails with `Same` when all match.
pub async fn process_verify(
    ctx: &mut CompoundContext<'_>,
    args: &VerifyArgs,
    negate: bool,
) -> OpResult {
    let op = if negate { Nfs4Op::NVerify } else { Nfs4Op::Verify };
    let ino = ctx.current_inode()?;
    check_supported(&args.attrs.mask)?;

    let attr = ctx.fs().stat(ino).await?;
    let live = encode_attrs(&args.attrs.mask, &attr, ctx.lease_secs());
    let same = live.vals == args.attrs.vals;

    match (same, negate) {
        (true, false) | (false, true) => Ok(Nfs4OpRes::ok(op, OpResBody::Empty)),
        (false, false) => Err(NfsStatus::NotSame),
        (true, true) => Err(NfsStatus::Same),
    }
}
