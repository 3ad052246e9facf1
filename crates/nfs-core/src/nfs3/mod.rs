//! NFSv3 procedures (RFC 1813)
//!
//! The stateless dialect shares the filesystem, access policy and listing
//! engine with NFSv4 but keeps no client state. Every procedure takes the
//! handles named in its arguments and returns a typed result or the status
//! to report. Mutating procedures return wcc data: a possibly cached stat
//! before the change and a live stat after it.

pub mod types;

use tracing::debug;

use crate::acl::{AccessRight, Principal};
use crate::error::NfsStatus;
use crate::filehandle::FileHandle;
use crate::nfs4::check_component;
use crate::readdir::{entry3_size, entryplus3_size, ListRequest, ListingPolicy, Sized};
use crate::server::{Caller, NfsServer};
use crate::vfs::{FileAttr, FileType, FsError, Inode, NewObject, SetAttr, Timestamp, VirtualFileSystem};

pub use types::*;

/// Largest file size advertised by FSINFO
const MAX_FILE_SIZE: u64 = 4 * 1024 * 1024 * 1024;
/// Preferred READDIR reply size
const DTPREF: u32 = 8192;
/// Maximum hard links per object
const LINK_MAX: u32 = 512;
/// Maximum name length
const NAME_MAX: u32 = 255;

/// NFSv3 procedures bound to one caller
#[derive(Debug, Clone, Copy)]
pub struct Nfs3<'a> {
    server: &'a NfsServer,
    caller: &'a Caller,
}

fn check_name(name: &str) -> Result<(), NfsStatus> {
    check_component(name).map_err(|status| match status {
        NfsStatus::Badname => NfsStatus::Inval,
        other => other,
    })
}

impl<'a> Nfs3<'a> {
    /// Bind procedures to `caller`
    pub fn new(server: &'a NfsServer, caller: &'a Caller) -> Self {
        Self { server, caller }
    }

    fn fs(&self) -> &'a dyn VirtualFileSystem {
        self.server.fs()
    }

    fn principal(&self) -> &'a Principal {
        &self.caller.principal
    }

    fn allowed(&self, attr: &FileAttr, right: AccessRight) -> bool {
        self.server
            .acl()
            .is_allowed(&attr.acl(), self.principal(), right)
    }

    fn require(&self, attr: &FileAttr, right: AccessRight) -> Result<(), NfsStatus> {
        if self.allowed(attr, right) {
            Ok(())
        } else {
            Err(NfsStatus::Access)
        }
    }

    fn writable(&self) -> Result<(), NfsStatus> {
        if self.caller.read_only {
            return Err(NfsStatus::Rofs);
        }
        Ok(())
    }

    async fn dir(&self, fh: &FileHandle) -> Result<(Inode, FileAttr), NfsStatus> {
        let ino = fh.inode()?;
        let attr = self.fs().stat_cached(ino).await?;
        if !attr.is_dir() {
            return Err(NfsStatus::Notdir);
        }
        Ok((ino, attr))
    }

    async fn wcc(&self, ino: Inode, before: FileAttr) -> WccData {
        WccData {
            before: Some(before),
            after: self.fs().stat(ino).await.ok(),
        }
    }

    async fn exists(&self, dir: Inode, name: &str) -> Result<Option<Inode>, NfsStatus> {
        match self.fs().lookup(dir, name).await {
            Ok(ino) => Ok(Some(ino)),
            Err(FsError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn new_object(&self, mode: u32) -> NewObject {
        let principal = self.principal();
        NewObject {
            mode,
            uid: principal.uid,
            gid: principal.gid,
        }
    }

    async fn created(&self, dir: Inode, before: FileAttr, ino: Inode) -> Result<CreateRes, NfsStatus> {
        Ok(CreateRes {
            object: FileHandle::from_inode(ino),
            attributes: self.fs().stat(ino).await?,
            dir_wcc: self.wcc(dir, before).await,
        })
    }

    /// NULL
    pub fn null(&self) {}

    /// GETATTR
    pub async fn getattr(&self, object: &FileHandle) -> Result<FileAttr, NfsStatus> {
        Ok(self.fs().stat(object.inode()?).await?)
    }

    /// SETATTR; size changes need write permission, ownership and mode
    /// changes need ownership.
    pub async fn setattr(&self, object: &FileHandle, args: &SetAttrArgs) -> Result<WccData, NfsStatus> {
        self.writable()?;
        let ino = object.inode()?;
        let attr = self.fs().stat_cached(ino).await?;
        if let Some(ctime) = args.guard {
            if ctime != attr.ctime {
                return Err(NfsStatus::NotSync);
            }
        }

        let set = &args.attrs;
        if set.size.is_some() {
            if attr.is_dir() {
                return Err(NfsStatus::Isdir);
            }
            self.require(&attr, AccessRight::Write)?;
        }
        if set.mode.is_some() || set.uid.is_some() || set.gid.is_some() {
            self.require(&attr, AccessRight::Admin)?;
        }
        if (set.atime.is_some() || set.mtime.is_some()) && !self.allowed(&attr, AccessRight::Admin) {
            self.require(&attr, AccessRight::Write)?;
        }

        let after = self.fs().set_attr(ino, set).await?;
        Ok(WccData {
            before: Some(attr),
            after: Some(after),
        })
    }

    /// LOOKUP; "." and ".." resolve like any other name
    pub async fn lookup(&self, dir: &FileHandle, name: &str) -> Result<LookupRes, NfsStatus> {
        let (dir, dir_attr) = self.dir(dir).await?;
        if name.len() > NAME_MAX as usize {
            return Err(NfsStatus::Nametoolong);
        }
        self.require(&dir_attr, AccessRight::Lookup)?;
        let ino = self.fs().lookup(dir, name).await?;
        Ok(LookupRes {
            object: FileHandle::from_inode(ino),
            obj_attributes: self.fs().stat(ino).await?,
            dir_attributes: dir_attr,
        })
    }

    /// ACCESS; grants the requested bits the caller holds
    pub async fn access(&self, object: &FileHandle, requested: u32) -> Result<AccessRes, NfsStatus> {
        let attr = self.fs().stat_cached(object.inode()?).await?;
        let rights = [
            (access::READ, AccessRight::Read),
            (access::LOOKUP, AccessRight::Lookup),
            (access::MODIFY, AccessRight::Write),
            (access::EXTEND, AccessRight::Insert),
            (access::DELETE, AccessRight::Delete),
            (access::EXECUTE, AccessRight::Execute),
        ];
        let granted = rights
            .iter()
            .filter(|(bit, right)| requested & bit != 0 && self.allowed(&attr, *right))
            .fold(0, |acc, (bit, _)| acc | bit);
        Ok(AccessRes {
            attributes: attr,
            access: granted,
        })
    }

    /// READLINK
    pub async fn readlink(&self, link: &FileHandle) -> Result<(FileAttr, String), NfsStatus> {
        let ino = link.inode()?;
        let attr = self.fs().stat(ino).await?;
        if attr.file_type != FileType::Symlink {
            return Err(NfsStatus::Inval);
        }
        self.require(&attr, AccessRight::Read)?;
        let target = self.fs().read_link(ino).await?;
        Ok((attr, target))
    }

    /// READ
    pub async fn read(&self, file: &FileHandle, offset: u64, count: u32) -> Result<ReadRes, NfsStatus> {
        let ino = file.inode()?;
        let attr = self.fs().stat_cached(ino).await?;
        match attr.file_type {
            FileType::Regular => {}
            FileType::Directory => return Err(NfsStatus::Isdir),
            _ => return Err(NfsStatus::Inval),
        }
        self.require(&attr, AccessRight::Read)?;
        let count = count.min(self.server.config().max_read_size);
        let (data, eof) = self.fs().read(ino, offset, count).await?;
        Ok(ReadRes {
            attributes: self.fs().stat(ino).await?,
            eof,
            data,
        })
    }

    /// WRITE; data is always stored FILE_SYNC
    pub async fn write(&self, file: &FileHandle, offset: u64, data: &[u8]) -> Result<WriteRes, NfsStatus> {
        self.writable()?;
        let ino = file.inode()?;
        let attr = self.fs().stat_cached(ino).await?;
        match attr.file_type {
            FileType::Regular => {}
            FileType::Directory => return Err(NfsStatus::Isdir),
            _ => return Err(NfsStatus::Inval),
        }
        self.require(&attr, AccessRight::Write)?;
        let max = self.server.config().max_write_size as usize;
        let count = self.fs().write(ino, offset, &data[..data.len().min(max)]).await?;
        Ok(WriteRes {
            file_wcc: self.wcc(ino, attr).await,
            count,
            committed: FILE_SYNC,
            verifier: self.server.write_verifier(),
        })
    }

    /// CREATE a regular file
    pub async fn create(&self, dir: &FileHandle, name: &str, how: &CreateHow3) -> Result<CreateRes, NfsStatus> {
        self.writable()?;
        check_name(name)?;
        let (dir, dir_attr) = self.dir(dir).await?;
        let requested = match how {
            CreateHow3::Unchecked(attrs) | CreateHow3::Guarded(attrs) => attrs,
            CreateHow3::Exclusive(_) => return Err(NfsStatus::Notsupp),
        };

        if let Some(ino) = self.exists(dir, name).await? {
            if matches!(how, CreateHow3::Guarded(_)) {
                return Err(NfsStatus::Exist);
            }
            // UNCHECKED on an existing file only applies a size change
            if let Some(size) = requested.size {
                let attr = self.fs().stat(ino).await?;
                self.require(&attr, AccessRight::Write)?;
                let truncate = SetAttr {
                    size: Some(size),
                    ..SetAttr::default()
                };
                self.fs().set_attr(ino, &truncate).await?;
            }
            return self.created(dir, dir_attr, ino).await;
        }

        self.require(&dir_attr, AccessRight::Insert)?;
        let new = self.new_object(requested.mode.unwrap_or(0o644));
        let ino = self.fs().create(dir, name, FileType::Regular, new).await?;
        let rest = SetAttr {
            mode: None,
            ..requested.clone()
        };
        if !rest.is_empty() {
            self.fs().set_attr(ino, &rest).await?;
        }
        debug!(dir, name, ino, "file created");
        self.created(dir, dir_attr, ino).await
    }

    /// MKDIR
    pub async fn mkdir(&self, dir: &FileHandle, name: &str, attrs: &SetAttr) -> Result<CreateRes, NfsStatus> {
        self.writable()?;
        check_name(name)?;
        let (dir, dir_attr) = self.dir(dir).await?;
        if self.exists(dir, name).await?.is_some() {
            return Err(NfsStatus::Exist);
        }
        self.require(&dir_attr, AccessRight::Insert)?;
        let ino = self
            .fs()
            .mkdir(dir, name, self.new_object(attrs.mode.unwrap_or(0o755)))
            .await?;
        self.created(dir, dir_attr, ino).await
    }

    /// SYMLINK
    pub async fn symlink(
        &self,
        dir: &FileHandle,
        name: &str,
        target: &str,
        attrs: &SetAttr,
    ) -> Result<CreateRes, NfsStatus> {
        self.writable()?;
        check_name(name)?;
        let (dir, dir_attr) = self.dir(dir).await?;
        if self.exists(dir, name).await?.is_some() {
            return Err(NfsStatus::Exist);
        }
        self.require(&dir_attr, AccessRight::Insert)?;
        let ino = self
            .fs()
            .symlink(dir, name, target, self.new_object(attrs.mode.unwrap_or(0o777)))
            .await?;
        self.created(dir, dir_attr, ino).await
    }

    /// MKNOD is not served
    pub async fn mknod(&self, _dir: &FileHandle, _name: &str) -> Result<CreateRes, NfsStatus> {
        Err(NfsStatus::Notsupp)
    }

    async fn unlink(&self, dir: &FileHandle, name: &str, want_dir: bool) -> Result<WccData, NfsStatus> {
        self.writable()?;
        let (dir, dir_attr) = self.dir(dir).await?;
        self.require(&dir_attr, AccessRight::Delete)?;
        let ino = self.fs().lookup(dir, name).await?;
        let is_dir = self.fs().stat_cached(ino).await?.is_dir();
        match (want_dir, is_dir) {
            (false, true) => return Err(NfsStatus::Isdir),
            (true, false) => return Err(NfsStatus::Notdir),
            _ => {}
        }
        self.fs().remove(dir, name).await?;
        Ok(self.wcc(dir, dir_attr).await)
    }

    /// REMOVE a non-directory
    pub async fn remove(&self, dir: &FileHandle, name: &str) -> Result<WccData, NfsStatus> {
        self.unlink(dir, name, false).await
    }

    /// RMDIR
    pub async fn rmdir(&self, dir: &FileHandle, name: &str) -> Result<WccData, NfsStatus> {
        self.unlink(dir, name, true).await
    }

    /// RENAME
    pub async fn rename(
        &self,
        from_dir: &FileHandle,
        from_name: &str,
        to_dir: &FileHandle,
        to_name: &str,
    ) -> Result<RenameRes, NfsStatus> {
        self.writable()?;
        check_name(to_name)?;
        let (from, from_attr) = self.dir(from_dir).await?;
        let (to, to_attr) = self.dir(to_dir).await?;
        self.require(&from_attr, AccessRight::Delete)?;
        self.require(&to_attr, AccessRight::Insert)?;
        self.fs().rename(from, from_name, to, to_name).await?;
        Ok(RenameRes {
            from_dir_wcc: self.wcc(from, from_attr).await,
            to_dir_wcc: self.wcc(to, to_attr).await,
        })
    }

    /// LINK
    pub async fn link(&self, file: &FileHandle, dir: &FileHandle, name: &str) -> Result<LinkRes, NfsStatus> {
        self.writable()?;
        check_name(name)?;
        let target = file.inode()?;
        if self.fs().stat_cached(target).await?.is_dir() {
            return Err(NfsStatus::Isdir);
        }
        let (dir, dir_attr) = self.dir(dir).await?;
        self.require(&dir_attr, AccessRight::Insert)?;
        self.fs().link(dir, name, target).await?;
        Ok(LinkRes {
            file_attributes: self.fs().stat(target).await?,
            link_dir_wcc: self.wcc(dir, dir_attr).await,
        })
    }

    /// READDIR
    pub async fn readdir(&self, dir: &FileHandle, args: &ReadDirArgs) -> Result<ReadDirRes, NfsStatus> {
        let ino = dir.inode()?;
        let request = ListRequest {
            dir: ino,
            cookie: args.cookie,
            verifier: args.cookie_verf,
            maxcount: args.maxcount,
            dircount: 0,
        };
        let page = self
            .server
            .lister()
            .list(self.principal(), &ListingPolicy::NFS3, &request, |entry| {
                Ok(Sized {
                    reply: entry3_size(&entry.name),
                    dir: 0,
                    value: (entry.ino, entry.name.clone()),
                })
            })
            .await?;

        Ok(ReadDirRes {
            dir_attributes: self.fs().stat(ino).await?,
            cookie_verf: page.verifier,
            entries: page
                .entries
                .into_iter()
                .map(|(cookie, (fileid, name))| Entry3 { fileid, name, cookie })
                .collect(),
            eof: page.eof,
        })
    }

    /// READDIRPLUS; attributes come from the listing snapshot
    pub async fn readdirplus(&self, dir: &FileHandle, args: &ReadDirArgs) -> Result<ReadDirPlusRes, NfsStatus> {
        let ino = dir.inode()?;
        let request = ListRequest {
            dir: ino,
            cookie: args.cookie,
            verifier: args.cookie_verf,
            maxcount: args.maxcount,
            dircount: args.dircount,
        };
        let page = self
            .server
            .lister()
            .list(self.principal(), &ListingPolicy::NFS3_PLUS, &request, |entry| {
                let handle = FileHandle::from_inode(entry.ino);
                Ok(Sized {
                    reply: entryplus3_size(&entry.name, handle.len()),
                    dir: entry.name.len() as u32,
                    value: EntryPlus3 {
                        fileid: entry.ino,
                        name: entry.name.clone(),
                        cookie: 0,
                        attributes: entry.attr.clone(),
                        handle,
                    },
                })
            })
            .await?;

        Ok(ReadDirPlusRes {
            dir_attributes: self.fs().stat(ino).await?,
            cookie_verf: page.verifier,
            entries: page
                .entries
                .into_iter()
                .map(|(cookie, entry)| EntryPlus3 { cookie, ..entry })
                .collect(),
            eof: page.eof,
        })
    }

    /// FSINFO
    pub async fn fsinfo(&self, root: &FileHandle) -> Result<FsInfo, NfsStatus> {
        let attributes = self.fs().stat(root.inode()?).await?;
        let config = self.server.config();
        Ok(FsInfo {
            attributes,
            rtmax: config.max_read_size,
            rtpref: config.max_read_size,
            rtmult: 4096,
            wtmax: config.max_write_size,
            wtpref: config.max_write_size,
            wtmult: 4096,
            dtpref: DTPREF,
            maxfilesize: MAX_FILE_SIZE,
            time_delta: Timestamp::new(0, 1_000_000),
            properties: FSF3_CANSETTIME | FSF3_HOMOGENEOUS | FSF3_LINK | FSF3_SYMLINK,
        })
    }

    /// PATHCONF
    pub async fn pathconf(&self, object: &FileHandle) -> Result<PathConf, NfsStatus> {
        let attributes = self.fs().stat(object.inode()?).await?;
        Ok(PathConf {
            attributes,
            linkmax: LINK_MAX,
            name_max: NAME_MAX,
            no_trunc: true,
            chown_restricted: false,
            case_insensitive: false,
            case_preserving: true,
        })
    }

    /// COMMIT is not served; every WRITE is already FILE_SYNC
    pub async fn commit(&self, _file: &FileHandle, _offset: u64, _count: u32) -> Result<[u8; 8], NfsStatus> {
        Err(NfsStatus::Notsupp)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{NfsConfig, NfsExport, SquashMode};
    use crate::vfs::memory::MemoryFs;

    fn server(read_only: bool) -> NfsServer {
        let export = NfsExport::new(1).with_squash(SquashMode::None);
        let export = if read_only { export.read_only() } else { export };
        let config = NfsConfig::default().add_export(export);
        NfsServer::new(config, Arc::new(MemoryFs::new())).unwrap()
    }

    fn caller(server: &NfsServer, principal: Principal) -> Caller {
        server
            .credentials(
                "10.0.0.2:900".parse().unwrap(),
                "10.0.0.1:2049".parse().unwrap(),
                principal,
            )
            .unwrap()
    }

    fn root_fh(server: &NfsServer) -> FileHandle {
        FileHandle::from_inode(server.fs().root())
    }

    #[tokio::test]
    async fn test_create_lookup_write_read() {
        let server = server(false);
        let caller = caller(&server, Principal::root());
        let nfs3 = server.nfs3(&caller);
        let root = root_fh(&server);

        let created = nfs3
            .create(&root, "data", &CreateHow3::Guarded(SetAttr::default()))
            .await
            .unwrap();
        assert_eq!(created.attributes.file_type, FileType::Regular);
        assert_eq!(created.attributes.mode & 0o777, 0o644);
        assert!(created.dir_wcc.after.is_some());

        let found = nfs3.lookup(&root, "data").await.unwrap();
        assert_eq!(found.object, created.object);

        let written = nfs3.write(&found.object, 0, b"hello").await.unwrap();
        assert_eq!(written.count, 5);
        assert_eq!(written.committed, FILE_SYNC);
        assert_eq!(written.verifier, server.write_verifier());

        let read = nfs3.read(&found.object, 0, 100).await.unwrap();
        assert_eq!(&read.data[..], b"hello");
        assert!(read.eof);
    }

    #[tokio::test]
    async fn test_guarded_create_of_existing_name() {
        let server = server(false);
        let caller = caller(&server, Principal::root());
        let nfs3 = server.nfs3(&caller);
        let root = root_fh(&server);

        let how = CreateHow3::Guarded(SetAttr::default());
        nfs3.create(&root, "f", &how).await.unwrap();
        assert_eq!(nfs3.create(&root, "f", &how).await.unwrap_err(), NfsStatus::Exist);

        let unchecked = CreateHow3::Unchecked(SetAttr::default());
        assert!(nfs3.create(&root, "f", &unchecked).await.is_ok());
        assert_eq!(
            nfs3.create(&root, "g", &CreateHow3::Exclusive([1; 8])).await.unwrap_err(),
            NfsStatus::Notsupp
        );
    }

    #[tokio::test]
    async fn test_read_only_export() {
        let server = server(true);
        let caller = caller(&server, Principal::root());
        let nfs3 = server.nfs3(&caller);
        let root = root_fh(&server);

        let err = nfs3.mkdir(&root, "d", &SetAttr::default()).await.unwrap_err();
        assert_eq!(err, NfsStatus::Rofs);
        assert!(nfs3.getattr(&root).await.is_ok());
    }

    #[tokio::test]
    async fn test_remove_and_rmdir_check_type() {
        let server = server(false);
        let caller = caller(&server, Principal::root());
        let nfs3 = server.nfs3(&caller);
        let root = root_fh(&server);

        nfs3.mkdir(&root, "d", &SetAttr::default()).await.unwrap();
        assert_eq!(nfs3.remove(&root, "d").await.unwrap_err(), NfsStatus::Isdir);
        let wcc = nfs3.rmdir(&root, "d").await.unwrap();
        assert!(wcc.before.is_some() && wcc.after.is_some());
        assert_eq!(nfs3.lookup(&root, "d").await.unwrap_err(), NfsStatus::Noent);
    }

    #[tokio::test]
    async fn test_access_reports_granted_bits() {
        let server = server(false);
        let root_caller = caller(&server, Principal::root());
        let root = root_fh(&server);
        server
            .nfs3(&root_caller)
            .create(&root, "private", &CreateHow3::Guarded(SetAttr {
                mode: Some(0o600),
                ..SetAttr::default()
            }))
            .await
            .unwrap();

        let user = caller(&server, Principal::new(1000, 1000));
        let nfs3 = server.nfs3(&user);
        let file = nfs3.lookup(&root, "private").await.unwrap().object;
        let res = nfs3.access(&file, access::READ | access::MODIFY).await.unwrap();
        assert_eq!(res.access, 0);
        assert_eq!(nfs3.read(&file, 0, 10).await.unwrap_err(), NfsStatus::Access);
    }

    #[tokio::test]
    async fn test_readdir_pages_through_snapshot() {
        let server = server(false);
        let caller = caller(&server, Principal::root());
        let nfs3 = server.nfs3(&caller);
        let root = root_fh(&server);
        for name in ["a", "b", "c", "d"] {
            nfs3.mkdir(&root, name, &SetAttr::default()).await.unwrap();
        }

        // "." and ".." plus two names
        let maxcount = READDIR_FIRST_PAGE;
        let mut args = ReadDirArgs {
            cookie: 0,
            cookie_verf: [0; 8],
            dircount: 0,
            maxcount,
        };
        let first = nfs3.readdir(&root, &args).await.unwrap();
        assert!(!first.eof);
        assert_eq!(first.entries.len(), 4);
        assert_eq!(first.entries[0].name, ".");

        // a name added mid-listing stays out of the snapshot
        nfs3.mkdir(&root, "zz", &SetAttr::default()).await.unwrap();

        args.cookie = first.entries.last().unwrap().cookie;
        args.cookie_verf = first.cookie_verf;
        args.maxcount = 4096;
        let rest = nfs3.readdir(&root, &args).await.unwrap();
        assert!(rest.eof);
        let names: Vec<_> = rest.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["c", "d"]);
    }

    // reply overhead plus ".", "..", "a" and "b"
    const READDIR_FIRST_PAGE: u32 = crate::readdir::READDIR3RESOK_SIZE
        + crate::readdir::ENTRY3_SIZE * 4
        + 1
        + 2
        + 1
        + 1;

    #[tokio::test]
    async fn test_readdirplus_carries_handles() {
        let server = server(false);
        let caller = caller(&server, Principal::root());
        let nfs3 = server.nfs3(&caller);
        let root = root_fh(&server);
        let made = nfs3.mkdir(&root, "sub", &SetAttr::default()).await.unwrap();

        let args = ReadDirArgs {
            cookie: 0,
            cookie_verf: [0; 8],
            dircount: 0,
            maxcount: 8192,
        };
        let res = nfs3.readdirplus(&root, &args).await.unwrap();
        assert!(res.eof);
        let sub = res.entries.iter().find(|e| e.name == "sub").unwrap();
        assert_eq!(sub.handle, made.object);
        assert!(sub.attributes.is_dir());
    }

    #[tokio::test]
    async fn test_setattr_guard() {
        let server = server(false);
        let caller = caller(&server, Principal::root());
        let nfs3 = server.nfs3(&caller);
        let root = root_fh(&server);

        let args = SetAttrArgs {
            attrs: SetAttr {
                mode: Some(0o700),
                ..SetAttr::default()
            },
            guard: Some(Timestamp::new(1, 0)),
        };
        assert_eq!(nfs3.setattr(&root, &args).await.unwrap_err(), NfsStatus::NotSync);

        let args = SetAttrArgs {
            guard: None,
            ..args
        };
        let wcc = nfs3.setattr(&root, &args).await.unwrap();
        assert_eq!(wcc.after.unwrap().mode & 0o777, 0o700);
    }

    #[tokio::test]
    async fn test_fsinfo_and_pathconf() {
        let server = server(false);
        let caller = caller(&server, Principal::root());
        let nfs3 = server.nfs3(&caller);
        let root = root_fh(&server);

        let info = nfs3.fsinfo(&root).await.unwrap();
        assert_eq!(info.rtmax, 32 * 1024);
        assert_eq!(info.maxfilesize, 4 * 1024 * 1024 * 1024);
        let conf = nfs3.pathconf(&root).await.unwrap();
        assert!(conf.no_trunc && conf.case_preserving);
        assert_eq!(nfs3.commit(&root, 0, 0).await.unwrap_err(), NfsStatus::Notsupp);
    }
}
