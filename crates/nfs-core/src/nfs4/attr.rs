//! fattr4 encoding
//!
//! Attributes travel as a bitmap4 naming the attributes present followed by
//! an opaque holding their XDR values in ascending attribute order.

use bytes::Bytes;

use super::Nfs4FileType;
use crate::error::NfsStatus;
use crate::filehandle::FileHandle;
use crate::rpc::xdr::{XdrDecoder, XdrEncoder};
use crate::vfs::{FileAttr, SetAttr, SetTime, Timestamp};

/// Attribute numbers (RFC 7530 section 5)
pub mod bits {
    /// supported_attrs
    pub const SUPPORTED_ATTRS: u32 = 0;
    /// type
    pub const TYPE: u32 = 1;
    /// fh_expire_type
    pub const FH_EXPIRE_TYPE: u32 = 2;
    /// change
    pub const CHANGE: u32 = 3;
    /// size
    pub const SIZE: u32 = 4;
    /// link_support
    pub const LINK_SUPPORT: u32 = 5;
    /// symlink_support
    pub const SYMLINK_SUPPORT: u32 = 6;
    /// named_attr
    pub const NAMED_ATTR: u32 = 7;
    /// fsid
    pub const FSID: u32 = 8;
    /// unique_handles
    pub const UNIQUE_HANDLES: u32 = 9;
    /// lease_time
    pub const LEASE_TIME: u32 = 10;
    /// rdattr_error
    pub const RDATTR_ERROR: u32 = 11;
    /// filehandle
    pub const FILEHANDLE: u32 = 19;
    /// fileid
    pub const FILEID: u32 = 20;
    /// mode
    pub const MODE: u32 = 33;
    /// numlinks
    pub const NUMLINKS: u32 = 35;
    /// owner
    pub const OWNER: u32 = 36;
    /// owner_group
    pub const OWNER_GROUP: u32 = 37;
    /// space_used
    pub const SPACE_USED: u32 = 45;
    /// time_access
    pub const TIME_ACCESS: u32 = 47;
    /// time_access_set
    pub const TIME_ACCESS_SET: u32 = 48;
    /// time_metadata
    pub const TIME_METADATA: u32 = 52;
    /// time_modify
    pub const TIME_MODIFY: u32 = 53;
    /// time_modify_set
    pub const TIME_MODIFY_SET: u32 = 54;
}

const READABLE: &[u32] = &[
    bits::SUPPORTED_ATTRS,
    bits::TYPE,
    bits::FH_EXPIRE_TYPE,
    bits::CHANGE,
    bits::SIZE,
    bits::LINK_SUPPORT,
    bits::SYMLINK_SUPPORT,
    bits::NAMED_ATTR,
    bits::FSID,
    bits::UNIQUE_HANDLES,
    bits::LEASE_TIME,
    bits::FILEHANDLE,
    bits::FILEID,
    bits::MODE,
    bits::NUMLINKS,
    bits::OWNER,
    bits::OWNER_GROUP,
    bits::SPACE_USED,
    bits::TIME_ACCESS,
    bits::TIME_METADATA,
    bits::TIME_MODIFY,
];

const WRITABLE: &[u32] = &[
    bits::SIZE,
    bits::MODE,
    bits::OWNER,
    bits::OWNER_GROUP,
    bits::TIME_ACCESS_SET,
    bits::TIME_MODIFY_SET,
];

/// bitmap4
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitmap(pub Vec<u32>);

impl Bitmap {
    /// Build from attribute numbers
    pub fn from_bits(attrs: &[u32]) -> Self {
        let mut map = Self::default();
        for attr in attrs {
            map.set(*attr);
        }
        map
    }

    /// Set an attribute
    pub fn set(&mut self, attr: u32) {
        let word = (attr / 32) as usize;
        if self.0.len() <= word {
            self.0.resize(word + 1, 0);
        }
        self.0[word] |= 1 << (attr % 32);
    }

    /// Check an attribute
    pub fn is_set(&self, attr: u32) -> bool {
        self.0
            .get((attr / 32) as usize)
            .is_some_and(|w| w & (1 << (attr % 32)) != 0)
    }

    /// Attribute numbers present, ascending
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().enumerate().flat_map(|(word, bits)| {
            (0..32u32)
                .filter(move |bit| bits & (1 << bit) != 0)
                .map(move |bit| word as u32 * 32 + bit)
        })
    }

    /// Check whether no attribute is present
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }

    /// Encode as bitmap4
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_bitmap(&self.0);
    }

    /// Decode a bitmap4
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        dec.decode_bitmap().map(Self)
    }
}

/// Attributes the server can report
pub fn supported() -> Bitmap {
    Bitmap::from_bits(READABLE)
}

/// Fail with `Attrnotsupp` if `request` names an attribute not reported
pub fn check_supported(request: &Bitmap) -> Result<(), NfsStatus> {
    match request.iter().find(|a| !READABLE.contains(a)) {
        Some(_) => Err(NfsStatus::Attrnotsupp),
        None => Ok(()),
    }
}

/// An encoded fattr4
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fattr4 {
    /// Attributes present
    pub mask: Bitmap,
    /// Their XDR-encoded values
    pub vals: Bytes,
}

impl Fattr4 {
    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        self.mask.encode(enc);
        enc.encode_opaque(&self.vals);
    }

    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        let mask = Bitmap::decode(dec)?;
        let vals = Bytes::from(dec.decode_opaque()?);
        Ok(Self { mask, vals })
    }
}

fn encode_time(enc: &mut XdrEncoder, t: &Timestamp) {
    enc.encode_i64(t.seconds);
    enc.encode_u32(t.nseconds);
}

/// Encode the supported subset of `request` for an object.
pub fn encode_attrs(request: &Bitmap, attr: &FileAttr, lease_time: u32) -> Fattr4 {
    let mut mask = Bitmap::default();
    let mut enc = XdrEncoder::with_capacity(128);

    for bit in request.iter().filter(|b| READABLE.contains(b)) {
        mask.set(bit);
        match bit {
            bits::SUPPORTED_ATTRS => supported().encode(&mut enc),
            bits::TYPE => enc.encode_u32(Nfs4FileType::from(attr.file_type) as u32),
            // FH4_PERSISTENT
            bits::FH_EXPIRE_TYPE => enc.encode_u32(0),
            bits::CHANGE => enc.encode_u64(attr.change),
            bits::SIZE => enc.encode_u64(attr.size),
            bits::LINK_SUPPORT | bits::SYMLINK_SUPPORT | bits::UNIQUE_HANDLES => {
                enc.encode_bool(true)
            }
            bits::NAMED_ATTR => enc.encode_bool(false),
            bits::FSID => {
                enc.encode_u64(attr.fsid);
                enc.encode_u64(0);
            }
            bits::LEASE_TIME => enc.encode_u32(lease_time),
            bits::FILEHANDLE => enc.encode_opaque(FileHandle::from_inode(attr.ino).as_bytes()),
            bits::FILEID => enc.encode_u64(attr.ino),
            bits::MODE => enc.encode_u32(attr.mode & 0o7777),
            bits::NUMLINKS => enc.encode_u32(attr.nlink),
            bits::OWNER => enc.encode_string(&attr.uid.to_string()),
            bits::OWNER_GROUP => enc.encode_string(&attr.gid.to_string()),
            bits::SPACE_USED => enc.encode_u64(attr.used),
            bits::TIME_ACCESS => encode_time(&mut enc, &attr.atime),
            bits::TIME_METADATA => encode_time(&mut enc, &attr.ctime),
            bits::TIME_MODIFY => encode_time(&mut enc, &attr.mtime),
            _ => {}
        }
    }

    Fattr4 {
        mask,
        vals: enc.finish(),
    }
}

/// Parse "1000" or "1000@domain" into a numeric id
fn parse_principal(name: &str) -> Result<u32, NfsStatus> {
    let id = name.split('@').next().unwrap_or_default();
    id.parse().map_err(|_| NfsStatus::Inval)
}

fn decode_settime(dec: &mut XdrDecoder) -> std::io::Result<SetTime> {
    match dec.decode_u32()? {
        1 => Ok(SetTime::ClientTime(Timestamp::new(
            dec.decode_i64()?,
            dec.decode_u32()?,
        ))),
        _ => Ok(SetTime::ServerTime),
    }
}

/// Decode settable attributes (SETATTR, CREATE, OPEN).
///
/// Attributes outside the settable set fail with `Inval` when the server
/// knows them as read-only and `Attrnotsupp` otherwise.
pub fn decode_settable(fattr: &Fattr4) -> Result<SetAttr, NfsStatus> {
    let mut set = SetAttr::default();
    let mut dec = XdrDecoder::new(&fattr.vals);
    let bad = |_| NfsStatus::BadXdr;

    for bit in fattr.mask.iter() {
        if !WRITABLE.contains(&bit) {
            return Err(if READABLE.contains(&bit) {
                NfsStatus::Inval
            } else {
                NfsStatus::Attrnotsupp
            });
        }
        match bit {
            bits::SIZE => set.size = Some(dec.decode_u64().map_err(bad)?),
            bits::MODE => set.mode = Some(dec.decode_u32().map_err(bad)? & 0o7777),
            bits::OWNER => set.uid = Some(parse_principal(&dec.decode_string().map_err(bad)?)?),
            bits::OWNER_GROUP => {
                set.gid = Some(parse_principal(&dec.decode_string().map_err(bad)?)?)
            }
            bits::TIME_ACCESS_SET => set.atime = Some(decode_settime(&mut dec).map_err(bad)?),
            bits::TIME_MODIFY_SET => set.mtime = Some(decode_settime(&mut dec).map_err(bad)?),
            _ => {}
        }
    }
    Ok(set)
}
