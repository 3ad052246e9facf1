//! NFS server configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use ipnet::{IpNet, Ipv4Net};
use serde::{Deserialize, Serialize};

use crate::error::{NfsError, NfsResult};

/// Security flavor for NFS authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SecurityFlavor {
    /// AUTH_SYS (traditional UNIX authentication)
    #[default]
    Sys,
    /// RPCSEC_GSS with Kerberos (authentication only)
    Krb5,
    /// RPCSEC_GSS with Kerberos (authentication + integrity)
    Krb5i,
    /// RPCSEC_GSS with Kerberos (authentication + integrity + privacy)
    Krb5p,
}

impl SecurityFlavor {
    /// RPC auth flavor number reported by SECINFO
    pub fn rpc_flavor(&self) -> u32 {
        match self {
            SecurityFlavor::Sys => crate::rpc::AUTH_SYS,
            _ => crate::rpc::RPCSEC_GSS,
        }
    }
}

/// UID/GID squashing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SquashMode {
    /// No squashing
    None,
    /// Squash root (UID 0) to anonymous
    #[default]
    RootSquash,
    /// Squash all UIDs to anonymous
    AllSquash,
}

/// NFS export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NfsExport {
    /// Export ID (unique identifier)
    pub export_id: u32,
    /// Allowed client networks
    pub allowed_clients: Vec<IpNet>,
    /// Read-only export
    pub read_only: bool,
    /// UID/GID squashing mode
    pub squash: SquashMode,
    /// Anonymous UID (for squashed users)
    pub anon_uid: u32,
    /// Anonymous GID (for squashed users)
    pub anon_gid: u32,
    /// Allowed security flavors
    pub security: Vec<SecurityFlavor>,
}

impl Default for NfsExport {
    fn default() -> Self {
        Self {
            export_id: 0,
            allowed_clients: vec![IpNet::V4(Ipv4Net::default())],
            read_only: false,
            squash: SquashMode::RootSquash,
            anon_uid: 65534,
            anon_gid: 65534,
            security: vec![SecurityFlavor::Sys],
        }
    }
}

impl NfsExport {
    /// Create a new export open to every IPv4 client
    pub fn new(export_id: u32) -> Self {
        Self {
            export_id,
            ..Default::default()
        }
    }

    /// Set read-only
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Set squashing mode
    pub fn with_squash(mut self, squash: SquashMode) -> Self {
        self.squash = squash;
        self
    }

    /// Set the anonymous identity used for squashed callers
    pub fn with_anon(mut self, uid: u32, gid: u32) -> Self {
        self.anon_uid = uid;
        self.anon_gid = gid;
        self
    }

    /// Add allowed client network
    pub fn allow_client(mut self, network: IpNet) -> Self {
        self.allowed_clients.push(network);
        self
    }

    /// Set allowed client networks (replaces default)
    pub fn with_allowed_clients(mut self, clients: Vec<IpNet>) -> Self {
        self.allowed_clients = clients;
        self
    }

    /// Check if client IP is allowed
    pub fn is_client_allowed(&self, addr: &IpAddr) -> bool {
        // v4-mapped v6 peers match v4 networks
        let addr = match addr {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(*addr),
            IpAddr::V4(_) => *addr,
        };
        self.allowed_clients.iter().any(|net| net.contains(&addr))
    }
}

/// NFS server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NfsConfig {
    /// TCP bind address
    pub bind_addr: SocketAddr,
    /// Lease time granted to NFSv4 clients
    pub lease_time: Duration,
    /// Maximum COMPOUND operations per request
    pub max_compound_ops: usize,
    /// Maximum read size
    pub max_read_size: u32,
    /// Maximum write size
    pub max_write_size: u32,
    /// Total number of directory entries held by listing snapshots
    pub dir_cache_capacity: u64,
    /// Idle time after which an unused listing snapshot is dropped
    pub dir_cache_idle: Duration,
    /// How often the lease reaper sweeps expired clients
    pub reaper_interval: Duration,
    /// Exports
    pub exports: Vec<NfsExport>,
}

impl Default for NfsConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 2049),
            lease_time: Duration::from_secs(90),
            max_compound_ops: 64,
            max_read_size: 32 * 1024,
            max_write_size: 32 * 1024,
            dir_cache_capacity: 64 * 1024,
            dir_cache_idle: Duration::from_secs(10 * 60),
            reaper_interval: Duration::from_secs(10),
            exports: Vec::new(),
        }
    }
}

impl NfsConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Add an export
    pub fn add_export(mut self, export: NfsExport) -> Self {
        self.exports.push(export);
        self
    }

    /// Set lease time
    pub fn with_lease_time(mut self, lease_time: Duration) -> Self {
        self.lease_time = lease_time;
        self
    }

    /// Set the listing snapshot cache bounds
    pub fn with_dir_cache(mut self, capacity: u64, idle: Duration) -> Self {
        self.dir_cache_capacity = capacity;
        self.dir_cache_idle = idle;
        self
    }

    /// Set maximum COMPOUND length
    pub fn with_max_compound_ops(mut self, max: usize) -> Self {
        self.max_compound_ops = max;
        self
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> NfsResult<()> {
        if self.lease_time.is_zero() {
            return Err(NfsError::Config("lease_time must be non-zero".into()));
        }
        if self.reaper_interval.is_zero() {
            return Err(NfsError::Config("reaper_interval must be non-zero".into()));
        }
        if self.max_compound_ops == 0 {
            return Err(NfsError::Config("max_compound_ops must be non-zero".into()));
        }
        if self.dir_cache_capacity == 0 {
            return Err(NfsError::Config(
                "dir_cache_capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
