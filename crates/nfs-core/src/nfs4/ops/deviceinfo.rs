//! GETDEVICEINFO - resolve a pNFS device id to its data servers

use super::OpResult;
use crate::error::NfsStatus;
use crate::nfs4::attr::Bitmap;
use crate::nfs4::compound::{CompoundContext, Nfs4Op, Nfs4OpRes, OpResBody};
use crate::pnfs::{DeviceAddress, GetDeviceInfoArgs, LayoutType};
use crate::rpc::xdr::XdrEncoder;

/// GETDEVICEINFO result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetDeviceInfoRes {
    /// Device address
    pub device_addr: DeviceAddress,
    /// Notifications the server will send; always none
    pub notification: Bitmap,
}

impl GetDeviceInfoRes {
    /// Encode to XDR
    pub fn encode(&self, enc: &mut XdrEncoder) {
        self.device_addr.encode(enc);
        self.notification.encode(enc);
    }
}

/// Process GETDEVICEINFO operation
pub fn process_getdeviceinfo(ctx: &mut CompoundContext<'_>, args: &GetDeviceInfoArgs) -> OpResult {
    let layout_type = LayoutType::try_from(args.layout_type)?;
    let device_addr = ctx
        .server()
        .devices()
        .get_device_info(ctx.client_id, &args.device_id)
        .filter(|d| d.layout_type == layout_type)
        .ok_or(NfsStatus::Inval)?;

    if args.maxcount != 0 {
        let mut enc = XdrEncoder::new();
        device_addr.encode(&mut enc);
        let needed = enc.len() as u32;
        if needed > args.maxcount {
            return Ok(Nfs4OpRes::error_with(
                Nfs4Op::GetDeviceInfo,
                NfsStatus::Toosmall,
                OpResBody::MinCount(needed),
            ));
        }
    }

    Ok(Nfs4OpRes::ok(
        Nfs4Op::GetDeviceInfo,
        OpResBody::DeviceInfo(GetDeviceInfoRes {
            device_addr,
            notification: Bitmap::default(),
        }),
    ))
}
