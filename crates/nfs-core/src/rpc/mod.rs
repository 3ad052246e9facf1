//! ONC RPC pieces the NFS programs need
//!
//! Transport and message framing live outside this crate; what is here is
//! the program numbering and AUTH_SYS credential decoding that turns an RPC
//! call's credential into a [`Principal`].

pub mod xdr;

use crate::acl::Principal;
use xdr::XdrDecoder;

/// NFS program number
pub const NFS_PROGRAM: u32 = 100003;

/// NFS version 3
pub const NFS_V3: u32 = 3;

/// NFS version 4
pub const NFS_V4: u32 = 4;

/// AUTH_NONE flavor
pub const AUTH_NONE: u32 = 0;

/// AUTH_SYS (AUTH_UNIX) flavor
pub const AUTH_SYS: u32 = 1;

/// RPCSEC_GSS flavor
pub const RPCSEC_GSS: u32 = 6;

/// Largest machine name AUTH_SYS allows
const MAX_MACHINE_NAME: usize = 255;

/// Most supplementary groups AUTH_SYS carries
const MAX_GIDS: usize = 16;

/// AUTH_SYS credential body (RFC 5531 appendix A)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSys {
    /// Arbitrary id generated by the caller
    pub stamp: u32,
    /// Caller's host name
    pub machine_name: String,
    /// Effective user id
    pub uid: u32,
    /// Effective group id
    pub gid: u32,
    /// Supplementary groups
    pub gids: Vec<u32>,
}

impl AuthSys {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        let stamp = dec.decode_u32()?;
        let machine_name = dec.decode_string()?;
        if machine_name.len() > MAX_MACHINE_NAME {
            return Err(invalid("machine name too long"));
        }
        let uid = dec.decode_u32()?;
        let gid = dec.decode_u32()?;
        let count = dec.decode_u32()? as usize;
        if count > MAX_GIDS {
            return Err(invalid("too many groups"));
        }
        let gids = (0..count)
            .map(|_| dec.decode_u32())
            .collect::<std::io::Result<_>>()?;
        Ok(Self {
            stamp,
            machine_name,
            uid,
            gid,
            gids,
        })
    }

    /// Caller identity before export squashing
    pub fn principal(&self) -> Principal {
        Principal::new(self.uid, self.gid).with_groups(self.gids.iter().copied())
    }
}

fn invalid(msg: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xdr::XdrEncoder;

    #[test]
    fn test_auth_sys_principal() {
        let mut enc = XdrEncoder::new();
        enc.encode_u32(99);
        enc.encode_string("client.example.org");
        enc.encode_u32(1000);
        enc.encode_u32(100);
        enc.encode_u32(2);
        enc.encode_u32(10);
        enc.encode_u32(20);
        let data = enc.finish();

        let auth = AuthSys::decode(&mut XdrDecoder::new(&data)).unwrap();
        assert_eq!(auth.machine_name, "client.example.org");
        let principal = auth.principal();
        assert_eq!(principal.uid, 1000);
        assert!(principal.in_group(20));
    }

    #[test]
    fn test_auth_sys_group_limit() {
        let mut enc = XdrEncoder::new();
        enc.encode_u32(0);
        enc.encode_string("h");
        enc.encode_u32(0);
        enc.encode_u32(0);
        enc.encode_u32(17);
        let data = enc.finish();
        assert!(AuthSys::decode(&mut XdrDecoder::new(&data)).is_err());
    }
}
