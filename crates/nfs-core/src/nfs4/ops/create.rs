//! CREATE - make a non-regular object in the current directory
//!
//! Regular files are created by OPEN, so CREATE refuses them with
//! `BadType`. Named-attribute objects are not supported.

use tracing::debug;

use super::{current_dir, OpResult};
use crate::acl::AccessRight;
use crate::error::NfsStatus;
use crate::nfs4::attr::{decode_settable, Bitmap, Fattr4};
use crate::nfs4::compound::{CompoundContext, Nfs4Op, Nfs4OpRes, OpResBody};
use crate::nfs4::{check_component, ChangeInfo, Nfs4FileType};
use crate::rpc::xdr::{XdrDecoder, XdrEncoder};
use crate::vfs::{FileType, FsError, NewObject, SetAttr};

/// Object to create (createtype4)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateType {
    /// Symbolic link with its target
    Link(String),
    /// Block or character device with major/minor numbers
    Device {
        /// NF4BLK or NF4CHR
        file_type: u32,
        /// Major and minor number
        spec: (u32, u32),
    },
    /// Any other type, by its raw nfs_ftype4 value
    Other(u32),
}

impl CreateType {
    fn raw(&self) -> u32 {
        match self {
            CreateType::Link(_) => Nfs4FileType::SymLink as u32,
            CreateType::Device { file_type, .. } => *file_type,
            CreateType::Other(file_type) => *file_type,
        }
    }
}

/// CREATE arguments
#[derive(Debug, Clone)]
pub struct CreateArgs {
    /// Object type
    pub obj_type: CreateType,
    /// Name in the current directory
    pub name: String,
    /// Attributes to apply to the new object
    pub attrs: Fattr4,
}

impl CreateArgs {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        let raw = dec.decode_u32()?;
        let obj_type = match raw {
            5 => CreateType::Link(dec.decode_string()?),
            3 | 4 => CreateType::Device {
                file_type: raw,
                spec: (dec.decode_u32()?, dec.decode_u32()?),
            },
            other => CreateType::Other(other),
        };
        Ok(Self {
            obj_type,
            name: dec.decode_string()?,
            attrs: Fattr4::decode(dec)?,
        })
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_u32(self.obj_type.raw());
        match &self.obj_type {
            CreateType::Link(target) => enc.encode_string(target),
            CreateType::Device { spec, .. } => {
                enc.encode_u32(spec.0);
                enc.encode_u32(spec.1);
            }
            CreateType::Other(_) => {}
        }
        enc.encode_string(&self.name);
        self.attrs.encode(enc);
    }
}

/// CREATE result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRes {
    /// Change of the parent directory
    pub cinfo: ChangeInfo,
    /// Attributes applied from the request
    pub attrset: Bitmap,
}

impl CreateRes {
    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        self.cinfo.encode(enc);
        self.attrset.encode(enc);
    }
}

/// Process CREATE operation
pub async fn process_create(ctx: &mut CompoundContext<'_>, args: &CreateArgs) -> OpResult {
    check_component(&args.name)?;
    let (dir, dir_attr) = current_dir(ctx).await?;
    // regular files are created by OPEN
    let file_type = match Nfs4FileType::try_from(args.obj_type.raw())? {
        Nfs4FileType::Directory => FileType::Directory,
        Nfs4FileType::SymLink => FileType::Symlink,
        Nfs4FileType::BlockDevice => FileType::BlockDevice,
        Nfs4FileType::CharDevice => FileType::CharDevice,
        Nfs4FileType::Socket => FileType::Socket,
        Nfs4FileType::Fifo => FileType::Fifo,
        Nfs4FileType::AttrDir | Nfs4FileType::NamedAttr => return Err(NfsStatus::Notsupp),
        Nfs4FileType::Regular => return Err(NfsStatus::BadType),
    };

    ctx.require(&dir_attr, AccessRight::Insert)?;

    match ctx.fs().lookup(dir, &args.name).await {
        Ok(_) => return Err(NfsStatus::Exist),
        Err(FsError::NotFound) => {}
        Err(e) => return Err(e.into()),
    }

    let requested = decode_settable(&args.attrs)?;
    let principal = ctx.principal();
    let new = NewObject {
        mode: requested.mode.unwrap_or(match file_type {
            FileType::Directory => 0o755,
            FileType::Symlink => 0o777,
            _ => 0o644,
        }),
        uid: principal.uid,
        gid: principal.gid,
    };

    let fs = ctx.fs();
    let ino = match &args.obj_type {
        CreateType::Link(target) => fs.symlink(dir, &args.name, target, new).await?,
        _ if file_type == FileType::Directory => fs.mkdir(dir, &args.name, new).await?,
        _ => fs.create(dir, &args.name, file_type, new).await?,
    };

    let rest = SetAttr {
        mode: None,
        ..requested
    };
    if !rest.is_empty() {
        fs.set_attr(ino, &rest).await?;
    }

    let after = fs.stat(dir).await?;
    debug!(parent = dir, name = %args.name, ino, ?file_type, "created object");
    ctx.set_current(ino);
    Ok(Nfs4OpRes::ok(
        Nfs4Op::Create,
        OpResBody::Create(CreateRes {
            cinfo: ChangeInfo::new(dir_attr.change, after.change, true),
            attrset: args.attrs.mask.clone(),
        }),
    ))
}
