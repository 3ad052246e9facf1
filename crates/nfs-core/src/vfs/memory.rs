//! In-memory filesystem
//!
//! A complete [`VirtualFileSystem`] kept in a single inode table. Directory
//! listings return "." and ".." first, then entries in name order.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use super::{
    DirEntry, FileAttr, FileType, FsError, FsResult, Inode, NewObject, SetAttr, SetTime,
    Timestamp, VirtualFileSystem,
};

/// Inode of the root directory
pub const ROOT_INODE: Inode = 1;

const MAX_NAME_LEN: usize = 255;

#[derive(Debug)]
enum Content {
    Dir {
        parent: Inode,
        entries: BTreeMap<String, Inode>,
    },
    File(Vec<u8>),
    Symlink(String),
    Special,
}

#[derive(Debug)]
struct Node {
    attr: FileAttr,
    content: Content,
}

impl Node {
    fn touch(&mut self) {
        let now = Timestamp::now();
        self.attr.change += 1;
        self.attr.mtime = now;
        self.attr.ctime = now;
    }

    fn entries(&self) -> FsResult<&BTreeMap<String, Inode>> {
        match &self.content {
            Content::Dir { entries, .. } => Ok(entries),
            _ => Err(FsError::NotDirectory),
        }
    }

    fn entries_mut(&mut self) -> FsResult<&mut BTreeMap<String, Inode>> {
        match &mut self.content {
            Content::Dir { entries, .. } => Ok(entries),
            _ => Err(FsError::NotDirectory),
        }
    }
}

fn check_name(name: &str) -> FsResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(FsError::InvalidArgument(format!("bad name {name:?}")));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(FsError::NameTooLong);
    }
    Ok(())
}

/// Filesystem held entirely in memory
#[derive(Debug)]
pub struct MemoryFs {
    nodes: RwLock<HashMap<Inode, Node>>,
    next_ino: AtomicU64,
    fsid: u64,
}

impl MemoryFs {
    /// Create a filesystem whose root is owned by root with mode 0755
    pub fn new() -> Self {
        Self::with_root(NewObject {
            mode: 0o755,
            uid: 0,
            gid: 0,
        })
    }

    /// Create a filesystem with a custom root owner and mode
    pub fn with_root(root: NewObject) -> Self {
        let now = Timestamp::now();
        let attr = FileAttr {
            ino: ROOT_INODE,
            file_type: FileType::Directory,
            mode: root.mode & 0o7777,
            nlink: 2,
            uid: root.uid,
            gid: root.gid,
            size: 4096,
            used: 4096,
            rdev: (0, 0),
            fsid: 1,
            change: 1,
            atime: now,
            mtime: now,
            ctime: now,
        };
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT_INODE,
            Node {
                attr,
                content: Content::Dir {
                    parent: ROOT_INODE,
                    entries: BTreeMap::new(),
                },
            },
        );
        Self {
            nodes: RwLock::new(nodes),
            next_ino: AtomicU64::new(ROOT_INODE + 1),
            fsid: 1,
        }
    }

    fn insert_child(
        &self,
        parent: Inode,
        name: &str,
        file_type: FileType,
        new: NewObject,
        content: Content,
    ) -> FsResult<Inode> {
        check_name(name)?;
        let mut nodes = self.nodes.write();
        let dir = nodes.get(&parent).ok_or(FsError::Stale(parent))?;
        if dir.entries()?.contains_key(name) {
            return Err(FsError::Exists);
        }

        let ino = self.next_ino.fetch_add(1, Ordering::Relaxed);
        let now = Timestamp::now();
        let (nlink, size) = match &content {
            Content::Dir { .. } => (2, 4096),
            Content::Symlink(target) => (1, target.len() as u64),
            _ => (1, 0),
        };
        let attr = FileAttr {
            ino,
            file_type,
            mode: new.mode & 0o7777,
            nlink,
            uid: new.uid,
            gid: new.gid,
            size,
            used: size,
            rdev: (0, 0),
            fsid: self.fsid,
            change: 1,
            atime: now,
            mtime: now,
            ctime: now,
        };
        nodes.insert(ino, Node { attr, content });

        let dir = nodes.get_mut(&parent).ok_or(FsError::Stale(parent))?;
        dir.entries_mut()?.insert(name.to_string(), ino);
        if file_type == FileType::Directory {
            dir.attr.nlink += 1;
        }
        dir.touch();
        Ok(ino)
    }

    fn is_ancestor(nodes: &HashMap<Inode, Node>, ancestor: Inode, mut ino: Inode) -> bool {
        loop {
            if ino == ancestor {
                return true;
            }
            match nodes.get(&ino).map(|n| &n.content) {
                Some(Content::Dir { parent, .. }) if *parent != ino => ino = *parent,
                _ => return false,
            }
        }
    }

    /// Drop one link to `ino`, discarding the node when none remain
    fn unlink(nodes: &mut HashMap<Inode, Node>, ino: Inode) {
        let gone = match nodes.get_mut(&ino) {
            Some(node) if node.attr.file_type == FileType::Directory => true,
            Some(node) => {
                node.attr.nlink = node.attr.nlink.saturating_sub(1);
                node.attr.ctime = Timestamp::now();
                node.attr.change += 1;
                node.attr.nlink == 0
            }
            None => false,
        };
        if gone {
            nodes.remove(&ino);
        }
    }
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VirtualFileSystem for MemoryFs {
    fn root(&self) -> Inode {
        ROOT_INODE
    }

    async fn lookup(&self, parent: Inode, name: &str) -> FsResult<Inode> {
        let nodes = self.nodes.read();
        let dir = nodes.get(&parent).ok_or(FsError::Stale(parent))?;
        match name {
            "." => {
                dir.entries()?;
                Ok(parent)
            }
            ".." => match &dir.content {
                Content::Dir { parent, .. } => Ok(*parent),
                _ => Err(FsError::NotDirectory),
            },
            _ => dir.entries()?.get(name).copied().ok_or(FsError::NotFound),
        }
    }

    async fn create(
        &self,
        parent: Inode,
        name: &str,
        file_type: FileType,
        new: NewObject,
    ) -> FsResult<Inode> {
        let content = match file_type {
            FileType::Regular => Content::File(Vec::new()),
            FileType::Directory | FileType::Symlink => {
                return Err(FsError::InvalidArgument(format!(
                    "{file_type:?} needs a dedicated call"
                )))
            }
            _ => Content::Special,
        };
        self.insert_child(parent, name, file_type, new, content)
    }

    async fn mkdir(&self, parent: Inode, name: &str, new: NewObject) -> FsResult<Inode> {
        let content = Content::Dir {
            parent,
            entries: BTreeMap::new(),
        };
        self.insert_child(parent, name, FileType::Directory, new, content)
    }

    async fn symlink(
        &self,
        parent: Inode,
        name: &str,
        target: &str,
        new: NewObject,
    ) -> FsResult<Inode> {
        let content = Content::Symlink(target.to_string());
        self.insert_child(parent, name, FileType::Symlink, new, content)
    }

    async fn remove(&self, parent: Inode, name: &str) -> FsResult<()> {
        let mut nodes = self.nodes.write();
        let dir = nodes.get(&parent).ok_or(FsError::Stale(parent))?;
        let ino = *dir.entries()?.get(name).ok_or(FsError::NotFound)?;

        let is_dir = match nodes.get(&ino).map(|n| &n.content) {
            Some(Content::Dir { entries, .. }) if !entries.is_empty() => {
                return Err(FsError::NotEmpty)
            }
            Some(Content::Dir { .. }) => true,
            _ => false,
        };

        let dir = nodes.get_mut(&parent).ok_or(FsError::Stale(parent))?;
        dir.entries_mut()?.remove(name);
        if is_dir {
            dir.attr.nlink = dir.attr.nlink.saturating_sub(1);
        }
        dir.touch();
        Self::unlink(&mut nodes, ino);
        Ok(())
    }

    async fn rename(
        &self,
        from_parent: Inode,
        from_name: &str,
        to_parent: Inode,
        to_name: &str,
    ) -> FsResult<()> {
        check_name(to_name)?;
        let mut nodes = self.nodes.write();

        let src = *nodes
            .get(&from_parent)
            .ok_or(FsError::Stale(from_parent))?
            .entries()?
            .get(from_name)
            .ok_or(FsError::NotFound)?;
        let existing = nodes
            .get(&to_parent)
            .ok_or(FsError::Stale(to_parent))?
            .entries()?
            .get(to_name)
            .copied();

        if existing == Some(src) {
            return Ok(());
        }

        let src_is_dir = matches!(
            nodes.get(&src).map(|n| &n.content),
            Some(Content::Dir { .. })
        );
        if src_is_dir && Self::is_ancestor(&nodes, src, to_parent) {
            return Err(FsError::InvalidArgument(
                "cannot move a directory below itself".into(),
            ));
        }

        if let Some(dst) = existing {
            match nodes.get(&dst).map(|n| &n.content) {
                Some(Content::Dir { entries, .. }) => {
                    if !src_is_dir {
                        return Err(FsError::IsDirectory);
                    }
                    if !entries.is_empty() {
                        return Err(FsError::NotEmpty);
                    }
                    if let Some(dir) = nodes.get_mut(&to_parent) {
                        dir.attr.nlink = dir.attr.nlink.saturating_sub(1);
                    }
                }
                _ if src_is_dir => return Err(FsError::NotDirectory),
                _ => {}
            }
            Self::unlink(&mut nodes, dst);
        }

        let from = nodes
            .get_mut(&from_parent)
            .ok_or(FsError::Stale(from_parent))?;
        from.entries_mut()?.remove(from_name);
        if src_is_dir && from_parent != to_parent {
            from.attr.nlink = from.attr.nlink.saturating_sub(1);
        }
        from.touch();

        let to = nodes.get_mut(&to_parent).ok_or(FsError::Stale(to_parent))?;
        to.entries_mut()?.insert(to_name.to_string(), src);
        if src_is_dir && from_parent != to_parent {
            to.attr.nlink += 1;
        }
        to.touch();

        if let Some(node) = nodes.get_mut(&src) {
            if let Content::Dir { parent, .. } = &mut node.content {
                *parent = to_parent;
            }
            node.attr.ctime = Timestamp::now();
            node.attr.change += 1;
        }
        Ok(())
    }

    async fn link(&self, parent: Inode, name: &str, target: Inode) -> FsResult<()> {
        check_name(name)?;
        let mut nodes = self.nodes.write();
        match nodes.get(&target) {
            None => return Err(FsError::Stale(target)),
            Some(node) if node.attr.file_type == FileType::Directory => {
                return Err(FsError::IsDirectory)
            }
            Some(_) => {}
        }
        let dir = nodes.get_mut(&parent).ok_or(FsError::Stale(parent))?;
        let entries = dir.entries_mut()?;
        if entries.contains_key(name) {
            return Err(FsError::Exists);
        }
        entries.insert(name.to_string(), target);
        dir.touch();

        if let Some(node) = nodes.get_mut(&target) {
            node.attr.nlink += 1;
            node.attr.ctime = Timestamp::now();
            node.attr.change += 1;
        }
        Ok(())
    }

    async fn read(&self, ino: Inode, offset: u64, count: u32) -> FsResult<(Bytes, bool)> {
        let nodes = self.nodes.read();
        let node = nodes.get(&ino).ok_or(FsError::Stale(ino))?;
        let data = match &node.content {
            Content::File(data) => data,
            Content::Dir { .. } => return Err(FsError::IsDirectory),
            _ => return Err(FsError::InvalidArgument("not a regular file".into())),
        };
        let len = data.len() as u64;
        let start = offset.min(len) as usize;
        let end = offset.saturating_add(u64::from(count)).min(len) as usize;
        Ok((Bytes::copy_from_slice(&data[start..end]), end as u64 >= len))
    }

    async fn write(&self, ino: Inode, offset: u64, buf: &[u8]) -> FsResult<u32> {
        let mut nodes = self.nodes.write();
        let node = nodes.get_mut(&ino).ok_or(FsError::Stale(ino))?;
        let data = match &mut node.content {
            Content::File(data) => data,
            Content::Dir { .. } => return Err(FsError::IsDirectory),
            _ => return Err(FsError::InvalidArgument("not a regular file".into())),
        };
        let start = usize::try_from(offset).map_err(|_| FsError::NoSpace)?;
        let end = start.checked_add(buf.len()).ok_or(FsError::NoSpace)?;
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        node.attr.size = data.len() as u64;
        node.attr.used = node.attr.size;
        node.touch();
        Ok(buf.len() as u32)
    }

    async fn read_link(&self, ino: Inode) -> FsResult<String> {
        let nodes = self.nodes.read();
        match nodes.get(&ino).map(|n| &n.content) {
            Some(Content::Symlink(target)) => Ok(target.clone()),
            Some(_) => Err(FsError::InvalidArgument("not a symlink".into())),
            None => Err(FsError::Stale(ino)),
        }
    }

    async fn stat(&self, ino: Inode) -> FsResult<FileAttr> {
        self.nodes
            .read()
            .get(&ino)
            .map(|n| n.attr.clone())
            .ok_or(FsError::Stale(ino))
    }

    async fn set_attr(&self, ino: Inode, attr: &SetAttr) -> FsResult<FileAttr> {
        let mut nodes = self.nodes.write();
        let node = nodes.get_mut(&ino).ok_or(FsError::Stale(ino))?;

        if let Some(size) = attr.size {
            match &mut node.content {
                Content::File(data) => {
                    let size = usize::try_from(size).map_err(|_| FsError::NoSpace)?;
                    data.resize(size, 0);
                    node.attr.size = size as u64;
                    node.attr.used = size as u64;
                    node.attr.mtime = Timestamp::now();
                }
                Content::Dir { .. } => return Err(FsError::IsDirectory),
                _ => return Err(FsError::InvalidArgument("size on special file".into())),
            }
        }
        if let Some(mode) = attr.mode {
            node.attr.mode = mode & 0o7777;
        }
        if let Some(uid) = attr.uid {
            node.attr.uid = uid;
        }
        if let Some(gid) = attr.gid {
            node.attr.gid = gid;
        }
        let resolve = |t: SetTime| match t {
            SetTime::ServerTime => Timestamp::now(),
            SetTime::ClientTime(ts) => ts,
        };
        if let Some(t) = attr.atime {
            node.attr.atime = resolve(t);
        }
        if let Some(t) = attr.mtime {
            node.attr.mtime = resolve(t);
        }
        node.attr.ctime = Timestamp::now();
        node.attr.change += 1;
        Ok(node.attr.clone())
    }

    async fn list(&self, ino: Inode) -> FsResult<Vec<DirEntry>> {
        let nodes = self.nodes.read();
        let dir = nodes.get(&ino).ok_or(FsError::Stale(ino))?;
        let (parent, entries) = match &dir.content {
            Content::Dir { parent, entries } => (*parent, entries),
            _ => return Err(FsError::NotDirectory),
        };

        let entry = |name: &str, ino: Inode| -> FsResult<DirEntry> {
            let attr = nodes.get(&ino).ok_or(FsError::Stale(ino))?.attr.clone();
            Ok(DirEntry {
                name: name.to_string(),
                ino,
                attr,
            })
        };

        let mut out = Vec::with_capacity(entries.len() + 2);
        out.push(entry(".", ino)?);
        out.push(entry("..", parent)?);
        for (name, child) in entries {
            out.push(entry(name, *child)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> NewObject {
        NewObject {
            mode: 0o644,
            uid: 10,
            gid: 10,
        }
    }

    #[tokio::test]
    async fn test_listing_order() {
        let fs = MemoryFs::new();
        let root = fs.root();
        fs.create(root, "b", FileType::Regular, owner()).await.unwrap();
        fs.mkdir(root, "a", owner()).await.unwrap();
        fs.symlink(root, "c", "b", owner()).await.unwrap();

        let names: Vec<_> = fs
            .list(root)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec![".", "..", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_create_existing_fails() {
        let fs = MemoryFs::new();
        fs.mkdir(ROOT_INODE, "d", owner()).await.unwrap();
        assert!(matches!(
            fs.mkdir(ROOT_INODE, "d", owner()).await,
            Err(FsError::Exists)
        ));
        assert_eq!(fs.stat(ROOT_INODE).await.unwrap().nlink, 3);
    }

    #[tokio::test]
    async fn test_read_write() {
        let fs = MemoryFs::new();
        let ino = fs
            .create(ROOT_INODE, "f", FileType::Regular, owner())
            .await
            .unwrap();
        assert_eq!(fs.write(ino, 4, b"data").await.unwrap(), 4);

        let (data, eof) = fs.read(ino, 0, 100).await.unwrap();
        assert_eq!(&data[..], b"\0\0\0\0data");
        assert!(eof);

        let (data, eof) = fs.read(ino, 0, 2).await.unwrap();
        assert_eq!(data.len(), 2);
        assert!(!eof);
    }

    #[tokio::test]
    async fn test_remove_non_empty_dir() {
        let fs = MemoryFs::new();
        let dir = fs.mkdir(ROOT_INODE, "d", owner()).await.unwrap();
        fs.create(dir, "f", FileType::Regular, owner()).await.unwrap();

        assert!(matches!(
            fs.remove(ROOT_INODE, "d").await,
            Err(FsError::NotEmpty)
        ));
        fs.remove(dir, "f").await.unwrap();
        fs.remove(ROOT_INODE, "d").await.unwrap();
        assert!(matches!(fs.stat(dir).await, Err(FsError::Stale(_))));
    }

    #[tokio::test]
    async fn test_rename_and_link() {
        let fs = MemoryFs::new();
        let a = fs.mkdir(ROOT_INODE, "a", owner()).await.unwrap();
        let f = fs
            .create(ROOT_INODE, "f", FileType::Regular, owner())
            .await
            .unwrap();

        fs.rename(ROOT_INODE, "f", a, "g").await.unwrap();
        assert_eq!(fs.lookup(a, "g").await.unwrap(), f);
        assert!(matches!(
            fs.lookup(ROOT_INODE, "f").await,
            Err(FsError::NotFound)
        ));

        fs.link(ROOT_INODE, "h", f).await.unwrap();
        assert_eq!(fs.stat(f).await.unwrap().nlink, 2);
        fs.remove(a, "g").await.unwrap();
        assert_eq!(fs.stat(f).await.unwrap().nlink, 1);
    }

    #[tokio::test]
    async fn test_rename_into_own_subtree() {
        let fs = MemoryFs::new();
        let a = fs.mkdir(ROOT_INODE, "a", owner()).await.unwrap();
        let b = fs.mkdir(a, "b", owner()).await.unwrap();
        assert!(matches!(
            fs.rename(ROOT_INODE, "a", b, "a").await,
            Err(FsError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_set_attr_truncates() {
        let fs = MemoryFs::new();
        let ino = fs
            .create(ROOT_INODE, "f", FileType::Regular, owner())
            .await
            .unwrap();
        fs.write(ino, 0, b"hello world").await.unwrap();
        let before = fs.stat(ino).await.unwrap().change;

        let attr = fs
            .set_attr(
                ino,
                &SetAttr {
                    size: Some(5),
                    mode: Some(0o600),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(attr.size, 5);
        assert_eq!(attr.mode, 0o600);
        assert!(attr.change > before);
    }
}
