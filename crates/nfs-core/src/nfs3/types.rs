//! NFSv3 argument and result types with their XDR encodings

use bytes::Bytes;

use crate::dircache::CookieVerifier;
use crate::filehandle::FileHandle;
use crate::rpc::xdr::XdrEncoder;
use crate::vfs::{FileAttr, FileType, Inode, SetAttr, Timestamp};

/// ACCESS3_* bits
pub mod access {
    /// Read data or list a directory
    pub const READ: u32 = 0x0001;
    /// Look up a name
    pub const LOOKUP: u32 = 0x0002;
    /// Rewrite data or directory entries
    pub const MODIFY: u32 = 0x0004;
    /// Append data or add entries
    pub const EXTEND: u32 = 0x0008;
    /// Remove entries
    pub const DELETE: u32 = 0x0010;
    /// Execute a file
    pub const EXECUTE: u32 = 0x0020;
}

/// stable_how FILE_SYNC
pub const FILE_SYNC: u32 = 2;

/// FSF3_LINK
pub const FSF3_LINK: u32 = 0x0001;
/// FSF3_SYMLINK
pub const FSF3_SYMLINK: u32 = 0x0002;
/// FSF3_HOMOGENEOUS
pub const FSF3_HOMOGENEOUS: u32 = 0x0008;
/// FSF3_CANSETTIME
pub const FSF3_CANSETTIME: u32 = 0x0010;

fn ftype3(file_type: FileType) -> u32 {
    match file_type {
        FileType::Regular => 1,
        FileType::Directory => 2,
        FileType::BlockDevice => 3,
        FileType::CharDevice => 4,
        FileType::Symlink => 5,
        FileType::Socket => 6,
        FileType::Fifo => 7,
    }
}

fn encode_time(enc: &mut XdrEncoder, time: &Timestamp) {
    enc.encode_u32(time.seconds as u32);
    enc.encode_u32(time.nseconds);
}

/// Encode `attr` as fattr3
pub fn encode_fattr3(enc: &mut XdrEncoder, attr: &FileAttr) {
    enc.encode_u32(ftype3(attr.file_type));
    enc.encode_u32(attr.mode & 0o7777);
    enc.encode_u32(attr.nlink);
    enc.encode_u32(attr.uid);
    enc.encode_u32(attr.gid);
    enc.encode_u64(attr.size);
    enc.encode_u64(attr.used);
    enc.encode_u32(attr.rdev.0);
    enc.encode_u32(attr.rdev.1);
    enc.encode_u64(attr.fsid);
    enc.encode_u64(attr.ino);
    encode_time(enc, &attr.atime);
    encode_time(enc, &attr.mtime);
    encode_time(enc, &attr.ctime);
}

/// Encode post_op_attr
pub fn encode_post_op_attr(enc: &mut XdrEncoder, attr: Option<&FileAttr>) {
    enc.encode_option(attr, encode_fattr3);
}

fn encode_post_op_fh(enc: &mut XdrEncoder, fh: &FileHandle) {
    enc.encode_bool(true);
    enc.encode_opaque(fh.as_bytes());
}

/// Weak cache consistency data of a modified object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WccData {
    /// Attributes before the change, possibly cached
    pub before: Option<FileAttr>,
    /// Attributes after the change
    pub after: Option<FileAttr>,
}

impl WccData {
    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_option(self.before.as_ref(), |enc, attr| {
            enc.encode_u64(attr.size);
            encode_time(enc, &attr.mtime);
            encode_time(enc, &attr.ctime);
        });
        encode_post_op_attr(enc, self.after.as_ref());
    }
}

/// SETATTR arguments
#[derive(Debug, Clone, Default)]
pub struct SetAttrArgs {
    /// Changes to apply
    pub attrs: SetAttr,
    /// Apply only if the object's ctime still equals this
    pub guard: Option<Timestamp>,
}

/// How CREATE treats an existing name (createhow3)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateHow3 {
    /// Reuse an existing file
    Unchecked(SetAttr),
    /// Fail if the name exists
    Guarded(SetAttr),
    /// Exclusive create keyed by a verifier
    Exclusive([u8; 8]),
}

/// LOOKUP result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRes {
    /// Handle of the found object
    pub object: FileHandle,
    /// Its attributes
    pub obj_attributes: FileAttr,
    /// Attributes of the searched directory
    pub dir_attributes: FileAttr,
}

/// ACCESS result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRes {
    /// Object attributes
    pub attributes: FileAttr,
    /// Granted ACCESS3 bits
    pub access: u32,
}

/// READ result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRes {
    /// File attributes after the read
    pub attributes: FileAttr,
    /// End of file reached
    pub eof: bool,
    /// Data read
    pub data: Bytes,
}

/// WRITE result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRes {
    /// File wcc data
    pub file_wcc: WccData,
    /// Bytes written
    pub count: u32,
    /// Stability achieved
    pub committed: u32,
    /// Server write verifier
    pub verifier: [u8; 8],
}

/// Result of CREATE, MKDIR and SYMLINK
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRes {
    /// Handle of the new object
    pub object: FileHandle,
    /// Its attributes
    pub attributes: FileAttr,
    /// Parent directory wcc data
    pub dir_wcc: WccData,
}

/// RENAME result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRes {
    /// Source directory wcc data
    pub from_dir_wcc: WccData,
    /// Target directory wcc data
    pub to_dir_wcc: WccData,
}

/// LINK result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRes {
    /// Attributes of the linked file
    pub file_attributes: FileAttr,
    /// Directory wcc data
    pub link_dir_wcc: WccData,
}

/// READDIR and READDIRPLUS arguments
#[derive(Debug, Clone, Copy)]
pub struct ReadDirArgs {
    /// Cookie to resume after, 0 to start
    pub cookie: u64,
    /// Verifier returned with the cookie
    pub cookie_verf: CookieVerifier,
    /// Budget for names and cookies; ignored by READDIR
    pub dircount: u32,
    /// Budget for the whole reply
    pub maxcount: u32,
}

/// One entry3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry3 {
    /// File id
    pub fileid: Inode,
    /// Entry name
    pub name: String,
    /// Resume cookie
    pub cookie: u64,
}

/// READDIR result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadDirRes {
    /// Directory attributes
    pub dir_attributes: FileAttr,
    /// Verifier to present with later cookies
    pub cookie_verf: CookieVerifier,
    /// Entries in listing order
    pub entries: Vec<Entry3>,
    /// No entries follow
    pub eof: bool,
}

impl ReadDirRes {
    /// Encode READDIR3resok
    pub fn encode(&self, enc: &mut XdrEncoder) {
        encode_post_op_attr(enc, Some(&self.dir_attributes));
        enc.encode_opaque_fixed(&self.cookie_verf);
        for entry in &self.entries {
            enc.encode_bool(true);
            enc.encode_u64(entry.fileid);
            enc.encode_string(&entry.name);
            enc.encode_u64(entry.cookie);
        }
        enc.encode_bool(false);
        enc.encode_bool(self.eof);
    }
}

/// One entryplus3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPlus3 {
    /// File id
    pub fileid: Inode,
    /// Entry name
    pub name: String,
    /// Resume cookie
    pub cookie: u64,
    /// Attributes captured with the listing
    pub attributes: FileAttr,
    /// Handle of the entry
    pub handle: FileHandle,
}

/// READDIRPLUS result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadDirPlusRes {
    /// Directory attributes
    pub dir_attributes: FileAttr,
    /// Verifier to present with later cookies
    pub cookie_verf: CookieVerifier,
    /// Entries in listing order
    pub entries: Vec<EntryPlus3>,
    /// No entries follow
    pub eof: bool,
}

impl ReadDirPlusRes {
    /// Encode READDIRPLUS3resok
    pub fn encode(&self, enc: &mut XdrEncoder) {
        encode_post_op_attr(enc, Some(&self.dir_attributes));
        enc.encode_opaque_fixed(&self.cookie_verf);
        for entry in &self.entries {
            enc.encode_bool(true);
            enc.encode_u64(entry.fileid);
            enc.encode_string(&entry.name);
            enc.encode_u64(entry.cookie);
            encode_post_op_attr(enc, Some(&entry.attributes));
            encode_post_op_fh(enc, &entry.handle);
        }
        enc.encode_bool(false);
        enc.encode_bool(self.eof);
    }
}

/// FSINFO result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsInfo {
    /// Root attributes
    pub attributes: FileAttr,
    /// Maximum READ size
    pub rtmax: u32,
    /// Preferred READ size
    pub rtpref: u32,
    /// READ size multiple
    pub rtmult: u32,
    /// Maximum WRITE size
    pub wtmax: u32,
    /// Preferred WRITE size
    pub wtpref: u32,
    /// WRITE size multiple
    pub wtmult: u32,
    /// Preferred READDIR size
    pub dtpref: u32,
    /// Largest file size
    pub maxfilesize: u64,
    /// Server time granularity
    pub time_delta: Timestamp,
    /// FSF3_* flags
    pub properties: u32,
}

/// PATHCONF result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConf {
    /// Object attributes
    pub attributes: FileAttr,
    /// Maximum hard links
    pub linkmax: u32,
    /// Maximum name length
    pub name_max: u32,
    /// Long names are rejected, not truncated
    pub no_trunc: bool,
    /// Only root may change ownership
    pub chown_restricted: bool,
    /// Names compare case-insensitively
    pub case_insensitive: bool,
    /// Name case is preserved
    pub case_preserving: bool,
}
