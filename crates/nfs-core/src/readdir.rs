//! Paged directory listing shared by READDIR3, READDIRPLUS3 and READDIR4
//!
//! Cookies are absolute snapshot indexes shifted by a per-dialect offset so
//! that the reserved start cookie (and, for NFSv4, the cookies "." and ".."
//! would occupy) are never handed out. Resuming with cookie `c` continues at
//! index `c + 1 - offset`.

use std::sync::Arc;

use tracing::debug;

use crate::acl::{AccessRight, AclHandler, Principal};
use crate::dircache::{CookieVerifier, DirectoryListCache, Snapshot};
use crate::error::NfsStatus;
use crate::rpc::xdr::xdr_pad;
use crate::vfs::{DirEntry, Inode, VirtualFileSystem};

/// Smallest possible entry4: cookie, name, bitmap, attrlist and next flag
pub const ENTRY4_SIZE: u32 = 36;
/// dirlist4 header around one entry4
pub const DIRLIST4_SIZE: u32 = 4 + 8 + 4 + ENTRY4_SIZE + 4;
/// READDIR4resok holding the smallest possible entry
pub const READDIR4RESOK_SIZE: u32 = DIRLIST4_SIZE + ENTRY4_SIZE;

/// Fixed part of entry3
pub const ENTRY3_SIZE: u32 = 24;
/// Fixed part of READDIR3resok
pub const READDIR3RESOK_SIZE: u32 = 104;
/// Fixed part of entryplus3
pub const ENTRYPLUS3_SIZE: u32 = 124;
/// Fixed part of READDIRPLUS3resok
pub const READDIRPLUS3RESOK_SIZE: u32 = 104;

/// Per-dialect listing rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingPolicy {
    /// Added to a snapshot index to form the entry cookie
    pub cookie_offset: u64,
    /// Leave "." and ".." out of the reply
    pub skip_dots: bool,
    /// Cookies below the offset other than 0 are rejected
    pub reserve_low_cookies: bool,
    /// Budgets below this are `Toosmall` outright
    pub min_reply: u32,
    /// Reply bytes charged before the first entry
    pub reply_overhead: u32,
    /// On a verifier miss, list again instead of failing `NotSame`
    pub relist_on_miss: bool,
}

impl ListingPolicy {
    /// READDIR4
    pub const NFS4: Self = Self {
        cookie_offset: 3,
        skip_dots: true,
        reserve_low_cookies: true,
        min_reply: READDIR4RESOK_SIZE,
        reply_overhead: READDIR4RESOK_SIZE,
        relist_on_miss: false,
    };

    /// READDIR3
    pub const NFS3: Self = Self {
        cookie_offset: 1,
        skip_dots: false,
        reserve_low_cookies: false,
        min_reply: READDIR3RESOK_SIZE + ENTRY3_SIZE,
        reply_overhead: READDIR3RESOK_SIZE,
        relist_on_miss: true,
    };

    /// READDIRPLUS3
    pub const NFS3_PLUS: Self = Self {
        cookie_offset: 1,
        skip_dots: false,
        reserve_low_cookies: false,
        min_reply: READDIRPLUS3RESOK_SIZE + ENTRYPLUS3_SIZE,
        reply_overhead: READDIRPLUS3RESOK_SIZE,
        relist_on_miss: true,
    };

    /// Snapshot index a continuation cookie resumes at
    fn resume_index(&self, cookie: u64) -> Option<u64> {
        cookie.checked_add(1)?.checked_sub(self.cookie_offset)
    }
}

/// Reply size of an entry4 with `attr_len` bytes of encoded attributes
pub fn entry4_size(name: &str, attr_len: usize) -> u32 {
    ENTRY4_SIZE + (name.len() + xdr_pad(name.len()) + attr_len) as u32
}

/// Directory-information size of an entry4 (name and cookie)
pub fn entry4_dir_size(name: &str) -> u32 {
    name.len() as u32 + 8
}

/// Reply size of an entry3
pub fn entry3_size(name: &str) -> u32 {
    ENTRY3_SIZE + name.len() as u32
}

/// Reply size of an entryplus3 carrying a handle of `fh_len` bytes
pub fn entryplus3_size(name: &str, fh_len: usize) -> u32 {
    ENTRYPLUS3_SIZE + (name.len() + fh_len) as u32
}

/// Arguments of one listing call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListRequest {
    /// Directory to list
    pub dir: Inode,
    /// Cookie of the last entry the client holds, 0 to start over
    pub cookie: u64,
    /// Verifier returned with that cookie
    pub verifier: CookieVerifier,
    /// Reply byte budget
    pub maxcount: u32,
    /// Directory-information byte budget, 0 for none
    pub dircount: u32,
}

/// Sizes charged for one serialized entry
#[derive(Debug)]
pub struct Sized<T> {
    /// Dialect-specific entry payload
    pub value: T,
    /// Bytes charged against `maxcount`
    pub reply: u32,
    /// Bytes charged against `dircount`
    pub dir: u32,
}

/// One page of a listing
#[derive(Debug)]
pub struct ListPage<T> {
    /// Verifier to present with the next continuation
    pub verifier: CookieVerifier,
    /// Serialized entries with their cookies, in snapshot order
    pub entries: Vec<(u64, T)>,
    /// The snapshot was exhausted
    pub eof: bool,
}

/// Collaborators a listing consults
#[derive(Clone, Copy)]
pub struct Lister<'a> {
    /// Backing filesystem
    pub fs: &'a dyn VirtualFileSystem,
    /// Access policy
    pub acl: &'a dyn AclHandler,
    /// Snapshot cache
    pub cache: &'a DirectoryListCache,
}

impl<'a> Lister<'a> {
    /// Serve one page of `req.dir`.
    ///
    /// `encode` turns a snapshot entry into the dialect's payload and the
    /// byte counts it costs.
    pub async fn list<T, F>(
        &self,
        principal: &Principal,
        policy: &ListingPolicy,
        req: &ListRequest,
        mut encode: F,
    ) -> Result<ListPage<T>, NfsStatus>
    where
        F: FnMut(&DirEntry) -> Result<Sized<T>, NfsStatus>,
    {
        if req.maxcount < policy.min_reply {
            debug!(maxcount = req.maxcount, "listing budget too small");
            return Err(NfsStatus::Toosmall);
        }
        if policy.reserve_low_cookies && req.cookie != 0 && req.cookie < policy.cookie_offset {
            return Err(NfsStatus::BadCookie);
        }

        let dir_attr = self.fs.stat_cached(req.dir).await?;
        if !self
            .acl
            .is_allowed(&dir_attr.acl(), principal, AccessRight::Lookup)
        {
            return Err(NfsStatus::Access);
        }
        if !dir_attr.is_dir() {
            return Err(NfsStatus::Notdir);
        }

        let (verifier, snapshot, start) = if req.cookie == 0 {
            let verifier = self.cache.new_verifier();
            let snapshot: Snapshot = Arc::new(self.fs.list(req.dir).await?);
            self.cache.put(verifier, snapshot.clone());
            (verifier, snapshot, 0)
        } else {
            let start = policy
                .resume_index(req.cookie)
                .ok_or(NfsStatus::BadCookie)?;
            let snapshot = match self.cache.get(&req.verifier) {
                Some(snapshot) => snapshot,
                None => self.snapshot_miss(policy, req, start).await?,
            };
            (req.verifier, snapshot, start)
        };

        if start > snapshot.len() as u64 {
            debug!(cookie = req.cookie, len = snapshot.len(), "bad cookie");
            return Err(NfsStatus::BadCookie);
        }

        let mut reply = policy.reply_overhead;
        let mut dir_bytes = 0u32;
        let mut entries = Vec::new();
        let mut eof = true;

        for (index, entry) in snapshot.iter().enumerate().skip(start as usize) {
            if policy.skip_dots && (entry.name == "." || entry.name == "..") {
                continue;
            }
            let sized = encode(entry)?;
            let over_reply = reply.saturating_add(sized.reply) > req.maxcount;
            let over_dir = req.dircount != 0 && dir_bytes.saturating_add(sized.dir) > req.dircount;
            if over_reply || over_dir {
                eof = false;
                break;
            }
            reply += sized.reply;
            dir_bytes += sized.dir;
            entries.push((index as u64 + policy.cookie_offset, sized.value));
        }

        if !eof && entries.is_empty() {
            if req.cookie == 0 {
                self.cache.invalidate(&verifier);
            }
            return Err(NfsStatus::Toosmall);
        }
        if eof {
            self.cache.invalidate(&verifier);
        }

        debug!(
            dir = req.dir,
            cookie = req.cookie,
            sent = entries.len(),
            total = snapshot.len(),
            bytes = reply,
            eof,
            "listing page"
        );
        Ok(ListPage {
            verifier,
            entries,
            eof,
        })
    }

    async fn snapshot_miss(
        &self,
        policy: &ListingPolicy,
        req: &ListRequest,
        start: u64,
    ) -> Result<Snapshot, NfsStatus> {
        let live = self.fs.list(req.dir).await?;
        if policy.relist_on_miss {
            let snapshot: Snapshot = Arc::new(live);
            self.cache.put(req.verifier, snapshot.clone());
            return Ok(snapshot);
        }
        if start > live.len() as u64 {
            return Err(NfsStatus::BadCookie);
        }
        debug!(dir = req.dir, "unknown cookie verifier");
        Err(NfsStatus::NotSame)
    }
}
