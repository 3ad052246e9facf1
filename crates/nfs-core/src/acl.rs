//! Access policy
//!
//! Operations ask an [`AclHandler`] whether a [`Principal`] may exercise an
//! [`AccessRight`] on an object described by its [`UnixAcl`]. The bundled
//! [`UnixPermissionHandler`] evaluates classic owner/group/other mode bits.

use serde::{Deserialize, Serialize};

/// Caller identity after export squashing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// Effective user id
    pub uid: u32,
    /// Primary group id
    pub gid: u32,
    /// Supplementary group ids
    pub gids: Vec<u32>,
}

impl Principal {
    /// Create a principal without supplementary groups
    pub fn new(uid: u32, gid: u32) -> Self {
        Self {
            uid,
            gid,
            gids: Vec::new(),
        }
    }

    /// The superuser
    pub fn root() -> Self {
        Self::new(0, 0)
    }

    /// Add supplementary groups
    pub fn with_groups(mut self, gids: impl IntoIterator<Item = u32>) -> Self {
        self.gids.extend(gids);
        self
    }

    /// Check whether the principal is uid 0
    pub fn is_root(&self) -> bool {
        self.uid == 0
    }

    /// Check group membership (primary or supplementary)
    pub fn in_group(&self, gid: u32) -> bool {
        self.gid == gid || self.gids.contains(&gid)
    }
}

/// Ownership and mode of an object, as seen by the access policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnixAcl {
    /// Owner
    pub uid: u32,
    /// Owning group
    pub gid: u32,
    /// Permission bits (the low 12 bits of st_mode)
    pub mode: u32,
}

impl UnixAcl {
    /// Create from ownership and mode
    pub fn new(uid: u32, gid: u32, mode: u32) -> Self {
        Self { uid, gid, mode }
    }
}

/// Rights an operation may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessRight {
    /// Read file data or list a directory
    Read,
    /// Modify file data
    Write,
    /// Add an entry to a directory
    Insert,
    /// Remove an entry from a directory
    Delete,
    /// Resolve names in a directory
    Lookup,
    /// Execute a file
    Execute,
    /// Change ownership or mode
    Admin,
}

/// Pluggable access policy
pub trait AclHandler: Send + Sync {
    /// Decide whether `principal` may exercise `right` on `acl`
    fn is_allowed(&self, acl: &UnixAcl, principal: &Principal, right: AccessRight) -> bool;
}

/// Owner/group/other rwx evaluation
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixPermissionHandler;

const READ: u32 = 0o4;
const WRITE: u32 = 0o2;
const EXEC: u32 = 0o1;

impl UnixPermissionHandler {
    fn class_bits(acl: &UnixAcl, principal: &Principal) -> u32 {
        if principal.uid == acl.uid {
            (acl.mode >> 6) & 0o7
        } else if principal.in_group(acl.gid) {
            (acl.mode >> 3) & 0o7
        } else {
            acl.mode & 0o7
        }
    }
}

impl AclHandler for UnixPermissionHandler {
    fn is_allowed(&self, acl: &UnixAcl, principal: &Principal, right: AccessRight) -> bool {
        if principal.is_root() {
            return true;
        }
        let bits = Self::class_bits(acl, principal);
        match right {
            AccessRight::Read => bits & READ != 0,
            AccessRight::Write => bits & WRITE != 0,
            // directory mutation needs write and search
            AccessRight::Insert | AccessRight::Delete => bits & (WRITE | EXEC) == WRITE | EXEC,
            AccessRight::Lookup | AccessRight::Execute => bits & EXEC != 0,
            AccessRight::Admin => principal.uid == acl.uid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_group_other() {
        let handler = UnixPermissionHandler;
        let acl = UnixAcl::new(100, 200, 0o750);

        let owner = Principal::new(100, 1);
        let member = Principal::new(101, 1).with_groups([200]);
        let other = Principal::new(102, 2);

        assert!(handler.is_allowed(&acl, &owner, AccessRight::Insert));
        assert!(handler.is_allowed(&acl, &member, AccessRight::Lookup));
        assert!(!handler.is_allowed(&acl, &member, AccessRight::Insert));
        assert!(!handler.is_allowed(&acl, &other, AccessRight::Read));
    }

    #[test]
    fn test_root_bypasses_mode() {
        let handler = UnixPermissionHandler;
        let acl = UnixAcl::new(100, 100, 0o000);
        assert!(handler.is_allowed(&acl, &Principal::root(), AccessRight::Delete));
    }

    #[test]
    fn test_admin_is_owner_only() {
        let handler = UnixPermissionHandler;
        let acl = UnixAcl::new(5, 5, 0o777);
        assert!(handler.is_allowed(&acl, &Principal::new(5, 5), AccessRight::Admin));
        assert!(!handler.is_allowed(&acl, &Principal::new(6, 5), AccessRight::Admin));
    }
}
