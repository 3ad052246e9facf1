//! READDIR - paged listing of the current directory

use super::OpResult;
use crate::dircache::CookieVerifier;
use crate::nfs4::attr::{encode_attrs, Bitmap, Fattr4};
use crate::nfs4::compound::{CompoundContext, Nfs4Op, Nfs4OpRes, OpResBody};
use crate::readdir::{entry4_dir_size, entry4_size, ListRequest, ListingPolicy, Sized};
use crate::rpc::xdr::{XdrDecoder, XdrEncoder};

/// READDIR arguments
#[derive(Debug, Clone)]
pub struct ReadDirArgs {
    /// Cookie to resume after, 0 to start
    pub cookie: u64,
    /// Verifier returned with the cookie
    pub cookie_verf: CookieVerifier,
    /// Budget for names and cookies
    pub dircount: u32,
    /// Budget for the whole reply
    pub maxcount: u32,
    /// Attributes wanted per entry
    pub attr_request: Bitmap,
}

impl ReadDirArgs {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        Ok(Self {
            cookie: dec.decode_u64()?,
            cookie_verf: dec.decode_array::<8>()?,
            dircount: dec.decode_u32()?,
            maxcount: dec.decode_u32()?,
            attr_request: Bitmap::decode(dec)?,
        })
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_u64(self.cookie);
        enc.encode_opaque_fixed(&self.cookie_verf);
        enc.encode_u32(self.dircount);
        enc.encode_u32(self.maxcount);
        self.attr_request.encode(enc);
    }
}

/// One entry4
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry4 {
    /// Resume cookie
    pub cookie: u64,
    /// Entry name
    pub name: String,
    /// Requested attributes
    pub attrs: Fattr4,
}

/// READDIR result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadDirRes {
    /// Verifier to present with later cookies
    pub cookie_verf: CookieVerifier,
    /// Entries in listing order
    pub entries: Vec<Entry4>,
    /// No entries follow
    pub eof: bool,
}

impl ReadDirRes {
    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_opaque_fixed(&self.cookie_verf);
        for entry in &self.entries {
            enc.encode_bool(true);
            enc.encode_u64(entry.cookie);
            enc.encode_string(&entry.name);
            entry.attrs.encode(enc);
        }
        enc.encode_bool(false);
        enc.encode_bool(self.eof);
    }
}

/// Process READDIR operation
pub async fn process_readdir(ctx: &mut CompoundContext<'_>, args: &ReadDirArgs) -> OpResult {
    let dir = ctx.current_inode()?;
    let lease = ctx.lease_secs();
    let request = ListRequest {
        dir,
        cookie: args.cookie,
        verifier: args.cookie_verf,
        maxcount: args.maxcount,
        dircount: args.dircount,
    };

    let page = ctx
        .server()
        .lister()
        .list(ctx.principal(), &ListingPolicy::NFS4, &request, |entry| {
            let attrs = encode_attrs(&args.attr_request, &entry.attr, lease);
            Ok(Sized {
                reply: entry4_size(&entry.name, attrs.vals.len()),
                dir: entry4_dir_size(&entry.name),
                value: (entry.name.clone(), attrs),
            })
        })
        .await?;

    let entries = page
        .entries
        .into_iter()
        .map(|(cookie, (name, attrs))| Entry4 {
            cookie,
            name,
            attrs,
        })
        .collect();

    Ok(Nfs4OpRes::ok(
        Nfs4Op::ReadDir,
        OpResBody::ReadDir(ReadDirRes {
            cookie_verf: page.verifier,
            entries,
            eof: page.eof,
        }),
    ))
}
