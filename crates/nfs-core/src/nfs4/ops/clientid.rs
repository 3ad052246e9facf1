//! Client registration: SETCLIENTID, SETCLIENTID_CONFIRM, RENEW

use super::OpResult;
use crate::error::NfsStatus;
use crate::nfs4::compound::{CompoundContext, Nfs4Op, Nfs4OpRes, OpResBody};
use crate::nfs4::state::{CallbackInfo, ClientId, StateError, Verifier};
use crate::pnfs::NetAddr;
use crate::rpc::xdr::{XdrDecoder, XdrEncoder};

/// Longest owner id accepted (nfs_client_id4.id)
const MAX_OWNER_LEN: usize = 1024;

// ============================================================================
// SETCLIENTID
// ============================================================================

/// SETCLIENTID arguments
#[derive(Debug, Clone)]
pub struct SetClientIdArgs {
    /// Client boot verifier
    pub verifier: Verifier,
    /// Client-chosen owner identifier
    pub owner: Vec<u8>,
    /// Callback program
    pub cb_program: u32,
    /// Callback address
    pub cb_location: NetAddr,
    /// Callback ident
    pub callback_ident: u32,
}

impl SetClientIdArgs {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        let verifier = dec.decode_array::<8>()?;
        let owner = dec.decode_opaque()?;
        if owner.len() > MAX_OWNER_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "client owner too long",
            ));
        }
        Ok(Self {
            verifier,
            owner,
            cb_program: dec.decode_u32()?,
            cb_location: NetAddr::new(dec.decode_string()?, dec.decode_string()?),
            callback_ident: dec.decode_u32()?,
        })
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_opaque_fixed(&self.verifier);
        enc.encode_opaque(&self.owner);
        enc.encode_u32(self.cb_program);
        self.cb_location.encode(enc);
        enc.encode_u32(self.callback_ident);
    }

    fn callback(&self) -> Option<CallbackInfo> {
        if self.cb_location.addr.is_empty() {
            return None;
        }
        Some(CallbackInfo {
            program: self.cb_program,
            netid: self.cb_location.netid.clone(),
            addr: self.cb_location.addr.clone(),
            ident: self.callback_ident,
        })
    }
}

/// SETCLIENTID result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetClientIdRes {
    /// Assigned client id
    pub client_id: ClientId,
    /// Verifier SETCLIENTID_CONFIRM must echo
    pub confirm: Verifier,
}

impl SetClientIdRes {
    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_u64(self.client_id);
        enc.encode_opaque_fixed(&self.confirm);
    }
}

/// Process SETCLIENTID operation
pub fn process_setclientid(ctx: &mut CompoundContext<'_>, args: &SetClientIdArgs) -> OpResult {
    let caller = ctx.caller();
    let registry = ctx.server().registry();
    match registry.create_client(
        &args.owner,
        args.verifier,
        args.callback(),
        caller.remote,
        caller.local,
    ) {
        Ok(client) => Ok(Nfs4OpRes::ok(
            Nfs4Op::SetClientId,
            OpResBody::SetClientId(SetClientIdRes {
                client_id: client.id,
                confirm: client.confirm_verifier,
            }),
        )),
        Err(StateError::ClientInUse { holder }) => Ok(Nfs4OpRes::error_with(
            Nfs4Op::SetClientId,
            NfsStatus::ClidInuse,
            OpResBody::ClientInUse(NetAddr::from_socket_addr(&holder)),
        )),
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// SETCLIENTID_CONFIRM
// ============================================================================

/// SETCLIENTID_CONFIRM arguments
#[derive(Debug, Clone)]
pub struct SetClientIdConfirmArgs {
    /// Id from SETCLIENTID
    pub client_id: ClientId,
    /// Confirm verifier from SETCLIENTID
    pub confirm: Verifier,
}

impl SetClientIdConfirmArgs {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        Ok(Self {
            client_id: dec.decode_u64()?,
            confirm: dec.decode_array::<8>()?,
        })
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_u64(self.client_id);
        enc.encode_opaque_fixed(&self.confirm);
    }
}

/// Process SETCLIENTID_CONFIRM operation
pub fn process_setclientid_confirm(
    ctx: &mut CompoundContext<'_>,
    args: &SetClientIdConfirmArgs,
) -> OpResult {
    ctx.server()
        .registry()
        .confirm_client(args.client_id, args.confirm)?;
    ctx.client_id = Some(args.client_id);
    Ok(Nfs4OpRes::ok(Nfs4Op::SetClientIdConfirm, OpResBody::Empty))
}

// ============================================================================
// RENEW
// ============================================================================

/// RENEW arguments
#[derive(Debug, Clone)]
pub struct RenewArgs {
    /// Client whose lease to renew
    pub client_id: ClientId,
}

impl RenewArgs {
    /// Decode from XDR
    pub fn decode(dec: &mut XdrDecoder) -> std::io::Result<Self> {
        Ok(Self {
            client_id: dec.decode_u64()?,
        })
    }

    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        enc.encode_u64(self.client_id);
    }
}

/// Process RENEW operation
pub fn process_renew(ctx: &mut CompoundContext<'_>, args: &RenewArgs) -> OpResult {
    ctx.server().registry().renew_client(args.client_id)?;
    ctx.client_id = Some(args.client_id);
    Ok(Nfs4OpRes::ok(Nfs4Op::Renew, OpResBody::Empty))
}
