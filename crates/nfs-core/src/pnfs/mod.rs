//! Parallel NFS (pNFS) device registry
//!
//! GETDEVICEINFO resolves a device id handed out in a layout to the data
//! server addresses behind it. Layout grants themselves are not served.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::error::NfsStatus;
use crate::nfs4::attr::Bitmap;
use crate::nfs4::state::ClientId;
use crate::rpc::xdr::{XdrDecoder, XdrEncoder};

/// Layout type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum LayoutType {
    /// NFSv4.1 file layout (RFC 5661)
    NfsV41Files = 1,
    /// Object-based storage (RFC 5664)
    Osd2Objects = 2,
    /// Block/volume layout (RFC 5663)
    BlockVolume = 3,
    /// Flex files (RFC 8435)
    FlexFiles = 4,
}

impl TryFrom<u32> for LayoutType {
    type Error = NfsStatus;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::NfsV41Files),
            2 => Ok(Self::Osd2Objects),
            3 => Ok(Self::BlockVolume),
            4 => Ok(Self::FlexFiles),
            _ => Err(NfsStatus::LayoutUnavailable),
        }
    }
}

/// Device ID (16 bytes)
pub type DeviceId = [u8; 16];

/// netaddr4
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetAddr {
    /// Network ID (e.g., "tcp", "tcp6")
    pub netid: String,
    /// Universal address (e.g., "192.168.1.1.8.1" for port 2049)
    pub addr: String,
}

impl NetAddr {
    /// Create a new network address
    pub fn new(netid: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            netid: netid.into(),
            addr: addr.into(),
        }
    }

    /// Universal address of a socket address (RFC 5665)
    pub fn from_socket_addr(addr: &SocketAddr) -> Self {
        let port = addr.port();
        let netid = match addr {
            SocketAddr::V4(_) => "tcp",
            SocketAddr::V6(_) => "tcp6",
        };
        Self::new(
            netid,
            format!("{}.{}.{}", addr.ip(), port >> 8, port & 0xff),
        )
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_string(&self.netid);
        enc.encode_string(&self.addr);
    }
}

/// Data servers behind a file-layout device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAddress {
    /// Layout type this applies to
    pub layout_type: LayoutType,
    /// One multipath list per stripe
    pub data_servers: Vec<Vec<NetAddr>>,
}

impl DeviceAddress {
    /// File-layout device striping across `servers`, one path each
    pub fn files(servers: &[SocketAddr]) -> Self {
        Self {
            layout_type: LayoutType::NfsV41Files,
            data_servers: servers
                .iter()
                .map(|s| vec![NetAddr::from_socket_addr(s)])
                .collect(),
        }
    }

    /// Encode as device_addr4 with an nfsv4_1_file_layout_ds_addr4 body
    pub fn encode(&self, enc: &mut XdrEncoder) {
        let mut body = XdrEncoder::new();
        body.encode_u32(self.data_servers.len() as u32);
        for index in 0..self.data_servers.len() {
            body.encode_u32(index as u32);
        }
        body.encode_u32(self.data_servers.len() as u32);
        for paths in &self.data_servers {
            body.encode_u32(paths.len() as u32);
            for path in paths {
                path.encode(&mut body);
            }
        }
        enc.encode_u32(self.layout_type as u32);
        enc.encode_opaque(&body.finish());
    }
}

/// GETDEVICEINFO arguments
#[derive(Debug, Clone)]
pub struct GetDeviceInfoArgs {
    /// Device ID
    pub device_id: DeviceId,
    /// Requested layout type (raw, validated at execution)
    pub layout_type: u32,
    /// Max reply size for the device address, 0 for none
    pub maxcount: u32,
    /// Notification types requested
    pub notify_types: Bitmap,
}

impl GetDeviceInfoArgs {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        Ok(Self {
            device_id: dec.decode_array::<16>()?,
            layout_type: dec.decode_u32()?,
            maxcount: dec.decode_u32()?,
            notify_types: Bitmap::decode(dec)?,
        })
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_opaque_fixed(&self.device_id);
        enc.encode_u32(self.layout_type);
        enc.encode_u32(self.maxcount);
        self.notify_types.encode(enc);
    }
}

/// Source of device addresses
pub trait DeviceManager: Send + Sync {
    /// Resolve a device id for `client` (None outside a client context)
    fn get_device_info(&self, client: Option<ClientId>, device_id: &DeviceId)
        -> Option<DeviceAddress>;
}

/// Devices registered up front
#[derive(Debug)]
pub struct StaticDeviceManager {
    devices: DashMap<DeviceId, DeviceAddress>,
    device_counter: AtomicU64,
}

impl StaticDeviceManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self {
            devices: DashMap::new(),
            device_counter: AtomicU64::new(1),
        }
    }

    fn generate_device_id(&self) -> DeviceId {
        let counter = self.device_counter.fetch_add(1, Ordering::Relaxed);
        let mut id = [0u8; 16];
        id[..8].copy_from_slice(&counter.to_be_bytes());
        id
    }

    /// Register a device, returning its id
    pub fn register_device(&self, address: DeviceAddress) -> DeviceId {
        let device_id = self.generate_device_id();
        self.devices.insert(device_id, address);
        device_id
    }
}

impl Default for StaticDeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceManager for StaticDeviceManager {
    fn get_device_info(
        &self,
        _client: Option<ClientId>,
        device_id: &DeviceId,
    ) -> Option<DeviceAddress> {
        self.devices.get(device_id).map(|d| d.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_universal_address() {
        let v4: SocketAddr = "192.168.1.1:2049".parse().unwrap();
        assert_eq!(NetAddr::from_socket_addr(&v4), NetAddr::new("tcp", "192.168.1.1.8.1"));
        let v6: SocketAddr = "[::1]:2049".parse().unwrap();
        assert_eq!(NetAddr::from_socket_addr(&v6).netid, "tcp6");
    }

    #[test]
    fn test_register_and_resolve() {
        let manager = StaticDeviceManager::new();
        let ds: SocketAddr = "10.0.0.5:2049".parse().unwrap();
        let id = manager.register_device(DeviceAddress::files(&[ds]));

        let found = manager.get_device_info(None, &id).unwrap();
        assert_eq!(found.layout_type, LayoutType::NfsV41Files);
        assert_eq!(found.data_servers.len(), 1);
        assert!(manager.get_device_info(Some(1), &[0xee; 16]).is_none());
    }
}
