//! NFS server implementation
//!
//! [`NfsServer`] owns the services shared by every request and is cheap to
//! clone into connection handlers. RPC transport is left to the embedder:
//! it resolves a [`Caller`] with [`NfsServer::credentials`] and then feeds
//! COMPOUND bodies or NFSv3 procedure arguments through the server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::acl::{AclHandler, Principal, UnixPermissionHandler};
use crate::clock::{Clock, SystemClock};
use crate::config::{NfsConfig, NfsExport, SecurityFlavor, SquashMode};
use crate::dircache::DirectoryListCache;
use crate::error::{NfsError, NfsResult, NfsStatus};
use crate::filehandle::FileHandle;
use crate::nfs3::Nfs3;
use crate::nfs4::compound::{execute, CompoundArgs, CompoundContext, CompoundRes};
use crate::nfs4::state::ClientRegistry;
use crate::nfs4::NFS4_MAX_MINOR_VERSION;
use crate::pnfs::{DeviceManager, StaticDeviceManager};
use crate::readdir::Lister;
use crate::rpc::xdr::{XdrDecoder, XdrEncoder};
use crate::vfs::VirtualFileSystem;

/// Identity and export a request runs under
#[derive(Debug, Clone)]
pub struct Caller {
    /// Peer address
    pub remote: SocketAddr,
    /// Local address the peer connected to
    pub local: SocketAddr,
    /// Effective identity after squashing
    pub principal: Principal,
    /// Export that admitted the peer
    pub export_id: u32,
    /// The export refuses modifications
    pub read_only: bool,
    /// Flavors the export accepts
    pub flavors: Vec<SecurityFlavor>,
}

/// NFS server
#[derive(Clone)]
pub struct NfsServer {
    config: Arc<NfsConfig>,
    fs: Arc<dyn VirtualFileSystem>,
    acl: Arc<dyn AclHandler>,
    registry: Arc<ClientRegistry>,
    dir_cache: Arc<DirectoryListCache>,
    devices: Arc<dyn DeviceManager>,
    write_verifier: [u8; 8],
}

impl NfsServer {
    /// Create a server exporting `fs`
    pub fn new(config: NfsConfig, fs: Arc<dyn VirtualFileSystem>) -> NfsResult<Self> {
        config.validate()?;
        let registry = Arc::new(ClientRegistry::new(
            config.lease_time,
            Arc::new(SystemClock),
        ));
        let dir_cache = Arc::new(DirectoryListCache::new(
            config.dir_cache_capacity,
            config.dir_cache_idle,
        ));
        info!(
            exports = config.exports.len(),
            lease = ?config.lease_time,
            "NFS server configured"
        );
        Ok(Self {
            config: Arc::new(config),
            fs,
            acl: Arc::new(UnixPermissionHandler),
            registry,
            dir_cache,
            devices: Arc::new(StaticDeviceManager::new()),
            write_verifier: rand::random(),
        })
    }

    /// Use `clock` for lease accounting.
    ///
    /// Replaces the client registry, so call before serving requests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.registry = Arc::new(ClientRegistry::new(self.config.lease_time, clock));
        self
    }

    /// Use a different access policy
    pub fn with_acl(mut self, acl: Arc<dyn AclHandler>) -> Self {
        self.acl = acl;
        self
    }

    /// Use a different pNFS device source
    pub fn with_devices(mut self, devices: Arc<dyn DeviceManager>) -> Self {
        self.devices = devices;
        self
    }

    /// Server configuration
    pub fn config(&self) -> &NfsConfig {
        &self.config
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Get an export by ID
    pub fn get_export(&self, id: u32) -> Option<&NfsExport> {
        self.config.exports.iter().find(|e| e.export_id == id)
    }

    /// Backing filesystem
    pub fn fs(&self) -> &dyn VirtualFileSystem {
        self.fs.as_ref()
    }

    /// Access policy
    pub fn acl(&self) -> &dyn AclHandler {
        self.acl.as_ref()
    }

    /// NFSv4 client registry
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Listing snapshot cache
    pub fn dir_cache(&self) -> &DirectoryListCache {
        &self.dir_cache
    }

    /// pNFS device source
    pub fn devices(&self) -> &dyn DeviceManager {
        self.devices.as_ref()
    }

    /// Verifier returned by WRITE and COMMIT; changes with every instance
    pub fn write_verifier(&self) -> [u8; 8] {
        self.write_verifier
    }

    /// Listing engine bound to this server's collaborators
    pub fn lister(&self) -> Lister<'_> {
        Lister {
            fs: self.fs.as_ref(),
            acl: self.acl.as_ref(),
            cache: &self.dir_cache,
        }
    }

    /// Resolve the export admitting `remote` and squash `principal` by its
    /// rules. The first matching export wins; none → `Access`.
    pub fn credentials(
        &self,
        remote: SocketAddr,
        local: SocketAddr,
        principal: Principal,
    ) -> Result<Caller, NfsStatus> {
        let export = self
            .config
            .exports
            .iter()
            .find(|e| e.is_client_allowed(&remote.ip()))
            .ok_or_else(|| {
                debug!(%remote, "no export admits client");
                NfsStatus::Access
            })?;

        Ok(Caller {
            remote,
            local,
            principal: squash(export, principal),
            export_id: export.export_id,
            read_only: export.read_only,
            flavors: export.security.clone(),
        })
    }

    /// Run a COMPOUND with no current filehandle
    pub async fn compound(&self, caller: &Caller, args: CompoundArgs) -> CompoundRes {
        self.compound_with_fh(caller, args, None).await
    }

    /// Run a COMPOUND starting from `initial_fh`
    pub async fn compound_with_fh(
        &self,
        caller: &Caller,
        args: CompoundArgs,
        initial_fh: Option<FileHandle>,
    ) -> CompoundRes {
        if args.minor_version > NFS4_MAX_MINOR_VERSION {
            debug!(minor = args.minor_version, "unsupported minor version");
            return CompoundRes::failed(args.tag, NfsStatus::MinorVersMismatch);
        }
        if args.ops.len() > self.config.max_compound_ops {
            debug!(ops = args.ops.len(), "compound too long");
            return CompoundRes::failed(args.tag, NfsStatus::Resource);
        }

        let mut ctx = CompoundContext::new(self, caller, args.minor_version);
        ctx.current_fh = initial_fh;
        let status = execute(&mut ctx, args.ops).await;
        CompoundRes {
            status,
            tag: args.tag,
            results: ctx.results,
        }
    }

    /// Decode a COMPOUND4args body, run it and encode the COMPOUND4res
    pub async fn process_compound(&self, caller: &Caller, request: &[u8]) -> NfsResult<Bytes> {
        let mut dec = XdrDecoder::new(request);
        let args = CompoundArgs::decode(&mut dec).map_err(|e| NfsError::Xdr(e.to_string()))?;
        let res = self.compound(caller, args).await;
        let mut enc = XdrEncoder::new();
        res.encode(&mut enc);
        Ok(enc.finish())
    }

    /// NFSv3 procedures on behalf of `caller`
    pub fn nfs3<'a>(&'a self, caller: &'a Caller) -> Nfs3<'a> {
        Nfs3::new(self, caller)
    }

    /// Start the lease reaper at the configured interval
    pub fn spawn_lease_reaper(&self) -> JoinHandle<()> {
        spawn_lease_reaper(self.registry.clone(), self.config.reaper_interval)
    }
}

impl std::fmt::Debug for NfsServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NfsServer")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("dir_cache", &self.dir_cache)
            .finish_non_exhaustive()
    }
}

fn squash(export: &NfsExport, principal: Principal) -> Principal {
    let anonymous = || Principal::new(export.anon_uid, export.anon_gid);
    match export.squash {
        SquashMode::None => principal,
        SquashMode::RootSquash if principal.is_root() => anonymous(),
        SquashMode::RootSquash => principal,
        SquashMode::AllSquash => anonymous(),
    }
}

/// Sweep expired clients from `registry` every `interval`.
pub fn spawn_lease_reaper(registry: Arc<ClientRegistry>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let expired = registry.expire_clients(registry.now());
            if !expired.is_empty() {
                debug!(count = expired.len(), "lease reaper removed clients");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::vfs::memory::MemoryFs;

    fn server(config: NfsConfig) -> NfsServer {
        NfsServer::new(config, Arc::new(MemoryFs::new())).unwrap()
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_server_creation() {
        let server = server(NfsConfig::default().add_export(NfsExport::new(1)));
        assert!(server.get_export(1).is_some());
        assert!(server.get_export(2).is_none());
        assert_eq!(server.bind_addr().port(), 2049);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let fs = Arc::new(MemoryFs::new());
        let config = NfsConfig::default().with_max_compound_ops(0);
        assert!(NfsServer::new(config, fs).is_err());
    }

    #[test]
    fn test_credentials_squash() {
        let config = NfsConfig::default()
            .add_export(
                NfsExport::new(1)
                    .with_allowed_clients(vec!["10.0.0.0/8".parse().unwrap()])
                    .with_squash(SquashMode::AllSquash),
            )
            .add_export(NfsExport::new(2).with_anon(99, 99));
        let server = server(config);
        let local = addr("10.0.0.1:2049");

        let caller = server
            .credentials(addr("10.1.1.1:800"), local, Principal::new(1000, 100))
            .unwrap();
        assert_eq!(caller.export_id, 1);
        assert_eq!(caller.principal.uid, 65534);

        let caller = server
            .credentials(addr("192.168.0.7:800"), local, Principal::root())
            .unwrap();
        assert_eq!(caller.export_id, 2);
        assert_eq!(caller.principal.uid, 99);

        let caller = server
            .credentials(addr("192.168.0.7:800"), local, Principal::new(5, 5))
            .unwrap();
        assert_eq!(caller.principal.uid, 5);
    }

    #[test]
    fn test_credentials_without_export() {
        let config = NfsConfig::default().add_export(
            NfsExport::new(1).with_allowed_clients(vec!["10.0.0.0/8".parse().unwrap()]),
        );
        let server = server(config);
        let err = server
            .credentials(addr("172.16.0.1:700"), addr("10.0.0.1:2049"), Principal::root())
            .unwrap_err();
        assert_eq!(err, NfsStatus::Access);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_reaper_sweeps_expired_clients() {
        let clock = Arc::new(ManualClock::new());
        let registry = Arc::new(ClientRegistry::new(Duration::from_secs(5), clock.clone()));
        let id = registry
            .create_client(
                b"reaped",
                [1; 8],
                None,
                addr("10.0.0.2:700"),
                addr("10.0.0.1:2049"),
            )
            .unwrap()
            .id;

        let reaper = spawn_lease_reaper(registry.clone(), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(registry.client_count(), 1);

        clock.advance(Duration::from_secs(6));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(registry.client_count(), 0);
        assert!(registry.lookup_client_by_id(id).is_err());
        reaper.abort();
    }
}
