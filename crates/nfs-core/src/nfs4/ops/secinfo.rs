//! SECINFO - security flavors acceptable for a name

use super::{current_dir, OpResult};
use crate::config::SecurityFlavor;
use crate::nfs4::compound::{CompoundContext, Nfs4Op, Nfs4OpRes, OpResBody};
use crate::rpc::xdr::{XdrDecoder, XdrEncoder};

/// DER encoding of the Kerberos V5 mechanism OID 1.2.840.113554.1.2.2
const KRB5_OID: &[u8] = &[
    0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x12, 0x01, 0x02, 0x02,
];

/// SECINFO arguments
#[derive(Debug, Clone)]
pub struct SecInfoArgs {
    /// Name in the current directory
    pub name: String,
}

impl SecInfoArgs {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        Ok(Self {
            name: dec.decode_string()?,
        })
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_string(&self.name);
    }
}

/// One secinfo4
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecInfoEntry(pub SecurityFlavor);

impl SecInfoEntry {
    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_u32(self.0.rpc_flavor());
        // rpc_gss_svc_t: none, integrity, privacy
        let service = match self.0 {
            SecurityFlavor::Sys => return,
            SecurityFlavor::Krb5 => 1,
            SecurityFlavor::Krb5i => 2,
            SecurityFlavor::Krb5p => 3,
        };
        enc.encode_opaque(KRB5_OID);
        enc.encode_u32(0);
        enc.encode_u32(service);
    }
}

/// Process SECINFO operation.
///
/// Consumes the current filehandle on success.
pub async fn process_secinfo(ctx: &mut CompoundContext<'_>, _args: &SecInfoArgs) -> OpResult {
    current_dir(ctx).await?;
    let flavors = ctx
        .caller()
        .flavors
        .iter()
        .copied()
        .map(SecInfoEntry)
        .collect();
    ctx.current_fh = None;
    Ok(Nfs4OpRes::ok(Nfs4Op::SecInfo, OpResBody::SecInfo(flavors)))
}
