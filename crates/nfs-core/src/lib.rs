//! NFS server core
//!
//! Protocol logic shared by an NFSv3 and NFSv4 server: the NFSv4 client and
//! open-state registry with lease expiry, COMPOUND execution, and directory
//! listings served from snapshots so cookies stay stable while a client
//! pages through a changing directory.
//!
//! # Features
//!
//! - NFSv4.0 SETCLIENTID/OPEN/CLOSE state with lease renewal and reaping
//! - COMPOUND pipeline for minor versions 0 and 1 with current/saved handles
//! - NFSv3 procedure set over the same filesystem and access policy
//! - Snapshot-backed READDIR/READDIRPLUS for both dialects
//! - pNFS device lookup (GETDEVICEINFO)
//!
//! # Architecture
//!
//! ```text
//!         NFSv3 procedures        NFSv4 COMPOUND
//!               │                       │
//!        ┌──────▼───────────────────────▼──────┐
//!        │              NfsServer              │
//!        │  exports · credentials · verifier   │
//!        └──┬─────────┬──────────┬─────────┬───┘
//!           │         │          │         │
//!    ┌──────▼───┐ ┌───▼────┐ ┌───▼────┐ ┌──▼──────────┐
//!    │ Registry │ │ Lister │ │  ACL   │ │ VirtualFile │
//!    │ (leases) │ │ + cache│ │ policy │ │   System    │
//!    └──────────┘ └────────┘ └────────┘ └─────────────┘
//! ```
//!
//! RPC transport is not part of this crate; embedders decode the call,
//! resolve a [`Caller`] and hand the procedure to [`NfsServer`].

#![warn(missing_docs)]

pub mod acl;
pub mod clock;
pub mod config;
pub mod dircache;
pub mod error;
pub mod filehandle;
pub mod nfs3;
pub mod nfs4;
pub mod pnfs;
pub mod readdir;
pub mod rpc;
pub mod server;
pub mod vfs;

pub use acl::{AccessRight, AclHandler, Principal, UnixPermissionHandler};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{NfsConfig, NfsExport, SecurityFlavor, SquashMode};
pub use dircache::DirectoryListCache;
pub use error::{NfsError, NfsResult, NfsStatus};
pub use filehandle::FileHandle;
pub use nfs4::state::ClientRegistry;
pub use server::{Caller, NfsServer};
pub use vfs::memory::MemoryFs;
pub use vfs::VirtualFileSystem;
