//! COMPOUND Integration Tests
//!
//! Whole requests against an in-memory export: ordering and early stop,
//! permission failures, the client/open-state life cycle and the wire
//! codec.

use std::sync::Arc;

use bytes::Bytes;
use nfs_core::nfs4::compound::{CompoundArgs, CompoundRes, Nfs4Op, Nfs4OpArgs, OpResBody};
use nfs_core::nfs4::ops::attrs::{GetAttrArgs, VerifyArgs};
use nfs_core::nfs4::ops::clientid::{SetClientIdArgs, SetClientIdConfirmArgs};
use nfs_core::nfs4::ops::create::{CreateArgs, CreateType};
use nfs_core::nfs4::ops::io::{ReadArgs, WriteArgs};
use nfs_core::nfs4::ops::namespace::{LookupArgs, RenameArgs};
use nfs_core::nfs4::ops::open::{CloseArgs, CreateHow, OpenArgs, OpenClaim, OpenConfirmArgs};
use nfs_core::nfs4::ops::secinfo::SecInfoArgs;
use nfs_core::nfs4::ops::PutFhArgs;
use nfs_core::nfs4::StateId;
use nfs_core::pnfs::{DeviceAddress, GetDeviceInfoArgs, NetAddr, StaticDeviceManager};
use nfs_core::rpc::xdr::{XdrDecoder, XdrEncoder};
use nfs_core::nfs4::attr::{bits, Bitmap};
use nfs_core::{
    Caller, FileHandle, MemoryFs, NfsConfig, NfsExport, NfsServer, NfsStatus, Principal,
    SquashMode, VirtualFileSystem,
};

fn export() -> NfsExport {
    NfsExport::new(1).with_squash(SquashMode::None)
}

fn server_for(export: NfsExport) -> NfsServer {
    let config = NfsConfig::default().add_export(export);
    NfsServer::new(config, Arc::new(MemoryFs::new())).unwrap()
}

fn caller(server: &NfsServer, principal: Principal) -> Caller {
    server
        .credentials(
            "10.0.0.2:800".parse().unwrap(),
            "10.0.0.1:2049".parse().unwrap(),
            principal,
        )
        .unwrap()
}

fn compound(minor_version: u32, ops: Vec<Nfs4OpArgs>) -> CompoundArgs {
    CompoundArgs {
        minor_version,
        tag: "test".to_string(),
        ops,
    }
}

fn mkdir(name: &str) -> Nfs4OpArgs {
    Nfs4OpArgs::Create(CreateArgs {
        obj_type: CreateType::Other(2),
        name: name.to_string(),
        attrs: Default::default(),
    })
}

fn lookup(name: &str) -> Nfs4OpArgs {
    Nfs4OpArgs::Lookup(LookupArgs {
        name: name.to_string(),
    })
}

fn putfh(fh: &FileHandle) -> Nfs4OpArgs {
    Nfs4OpArgs::PutFh(PutFhArgs {
        object: Bytes::copy_from_slice(fh.as_bytes()),
    })
}

fn statuses(res: &CompoundRes) -> Vec<(Nfs4Op, NfsStatus)> {
    res.results.iter().map(|r| (r.op, r.status)).collect()
}

#[tokio::test]
async fn test_compound_stops_at_first_failure() {
    let server = server_for(export());
    let caller = caller(&server, Principal::root());

    let res = server
        .compound(&caller, compound(0, vec![Nfs4OpArgs::PutRootFh, mkdir("sub")]))
        .await;
    assert_eq!(res.status, NfsStatus::Ok);

    let res = server
        .compound(
            &caller,
            compound(
                0,
                vec![
                    Nfs4OpArgs::PutRootFh,
                    lookup("sub"),
                    Nfs4OpArgs::PutRootFh,
                    mkdir("sub"),
                    mkdir("never"),
                ],
            ),
        )
        .await;
    assert_eq!(res.status, NfsStatus::Exist);
    assert_eq!(
        statuses(&res),
        [
            (Nfs4Op::PutRootFh, NfsStatus::Ok),
            (Nfs4Op::Lookup, NfsStatus::Ok),
            (Nfs4Op::PutRootFh, NfsStatus::Ok),
            (Nfs4Op::Create, NfsStatus::Exist),
        ]
    );

    let fs = server.fs();
    assert!(fs.lookup(fs.root(), "never").await.is_err());
}

#[tokio::test]
async fn test_create_without_insert_permission() {
    let server = server_for(export());
    let user = caller(&server, Principal::new(1000, 1000));
    let fs = server.fs();
    let before = fs.list(fs.root()).await.unwrap();

    let res = server
        .compound(&user, compound(0, vec![Nfs4OpArgs::PutRootFh, mkdir("x")]))
        .await;
    assert_eq!(res.status, NfsStatus::Access);
    assert_eq!(fs.list(fs.root()).await.unwrap(), before);
}

fn create_regular(name: &str) -> Nfs4OpArgs {
    Nfs4OpArgs::Create(CreateArgs {
        obj_type: CreateType::Other(1),
        name: name.to_string(),
        attrs: Default::default(),
    })
}

#[tokio::test]
async fn test_create_regular_file_is_bad_type() {
    let server = server_for(export());
    let root = caller(&server, Principal::root());
    let res = server
        .compound(&root, compound(0, vec![Nfs4OpArgs::PutRootFh, create_regular("plain")]))
        .await;
    assert_eq!(res.status, NfsStatus::BadType);

    // the type is rejected before permissions or existing names matter
    let user = caller(&server, Principal::new(1000, 1000));
    let res = server
        .compound(&user, compound(0, vec![Nfs4OpArgs::PutRootFh, create_regular("plain")]))
        .await;
    assert_eq!(res.status, NfsStatus::BadType);

    let res = server
        .compound(&root, compound(0, vec![Nfs4OpArgs::PutRootFh, mkdir("d")]))
        .await;
    assert_eq!(res.status, NfsStatus::Ok);
    let res = server
        .compound(&root, compound(0, vec![Nfs4OpArgs::PutRootFh, create_regular("d")]))
        .await;
    assert_eq!(res.status, NfsStatus::BadType);
}

#[tokio::test]
async fn test_nverify() {
    let server = server_for(export());
    let caller = caller(&server, Principal::root());
    let request = Bitmap::from_bits(&[bits::TYPE, bits::FILEID, bits::MODE]);

    let res = server
        .compound(
            &caller,
            compound(
                0,
                vec![
                    Nfs4OpArgs::PutRootFh,
                    mkdir("sub"),
                    Nfs4OpArgs::PutRootFh,
                    Nfs4OpArgs::GetAttr(GetAttrArgs {
                        attr_request: request,
                    }),
                ],
            ),
        )
        .await;
    let OpResBody::Attrs(root_attrs) = res.results[3].body.clone() else {
        panic!("unexpected reply {res:?}");
    };

    let nverify = || {
        Nfs4OpArgs::NVerify(VerifyArgs {
            attrs: root_attrs.clone(),
        })
    };
    let res = server
        .compound(
            &caller,
            compound(0, vec![Nfs4OpArgs::PutRootFh, nverify(), Nfs4OpArgs::GetFh]),
        )
        .await;
    assert_eq!(res.status, NfsStatus::Same);
    assert_eq!(res.results.len(), 2);

    // a different object has a different fileid
    let res = server
        .compound(
            &caller,
            compound(
                0,
                vec![Nfs4OpArgs::PutRootFh, lookup("sub"), nverify(), Nfs4OpArgs::GetFh],
            ),
        )
        .await;
    assert_eq!(res.status, NfsStatus::Ok);
    assert_eq!(res.results.len(), 4);
}

#[tokio::test]
async fn test_secinfo() {
    let server = server_for(export());
    let caller = caller(&server, Principal::root());
    let secinfo = || {
        Nfs4OpArgs::SecInfo(SecInfoArgs {
            name: "anything".to_string(),
        })
    };

    let res = server
        .compound(
            &caller,
            compound(0, vec![Nfs4OpArgs::PutRootFh, secinfo(), Nfs4OpArgs::GetFh]),
        )
        .await;
    assert_eq!(res.status, NfsStatus::NoFileHandle);
    assert_eq!(
        statuses(&res),
        [
            (Nfs4Op::PutRootFh, NfsStatus::Ok),
            (Nfs4Op::SecInfo, NfsStatus::Ok),
            (Nfs4Op::GetFh, NfsStatus::NoFileHandle),
        ]
    );
    assert!(matches!(&res.results[1].body, OpResBody::SecInfo(flavors) if !flavors.is_empty()));

    let res = server
        .compound(
            &caller,
            compound(
                0,
                vec![
                    Nfs4OpArgs::PutRootFh,
                    Nfs4OpArgs::Create(CreateArgs {
                        obj_type: CreateType::Link("target".to_string()),
                        name: "l".to_string(),
                        attrs: Default::default(),
                    }),
                    secinfo(),
                ],
            ),
        )
        .await;
    assert_eq!(res.status, NfsStatus::Notdir);
}

#[tokio::test]
async fn test_operations_need_current_filehandle() {
    let server = server_for(export());
    let caller = caller(&server, Principal::root());
    let res = server
        .compound(&caller, compound(0, vec![Nfs4OpArgs::GetFh]))
        .await;
    assert_eq!(res.status, NfsStatus::NoFileHandle);
}

#[tokio::test]
async fn test_rename_and_readlink() {
    let server = server_for(export());
    let caller = caller(&server, Principal::root());

    let res = server
        .compound(
            &caller,
            compound(
                0,
                vec![
                    Nfs4OpArgs::PutRootFh,
                    Nfs4OpArgs::Create(CreateArgs {
                        obj_type: CreateType::Link("target".to_string()),
                        name: "l".to_string(),
                        attrs: Default::default(),
                    }),
                    Nfs4OpArgs::PutRootFh,
                    Nfs4OpArgs::SaveFh,
                    Nfs4OpArgs::Rename(RenameArgs {
                        old_name: "l".to_string(),
                        new_name: "m".to_string(),
                    }),
                    lookup("m"),
                    Nfs4OpArgs::ReadLink,
                ],
            ),
        )
        .await;
    assert_eq!(res.status, NfsStatus::Ok);
    assert_eq!(
        res.results.last().unwrap().body,
        OpResBody::ReadLink("target".to_string())
    );
}

#[tokio::test]
async fn test_read_only_export_refuses_changes() {
    let server = server_for(export().read_only());
    let caller = caller(&server, Principal::root());
    let res = server
        .compound(
            &caller,
            compound(0, vec![Nfs4OpArgs::PutRootFh, Nfs4OpArgs::GetFh, mkdir("d")]),
        )
        .await;
    assert_eq!(res.status, NfsStatus::Rofs);
    assert_eq!(res.results.len(), 3);
}

#[tokio::test]
async fn test_minor_version_and_length_limits() {
    let config = NfsConfig::default()
        .add_export(export())
        .with_max_compound_ops(2);
    let server = NfsServer::new(config, Arc::new(MemoryFs::new())).unwrap();
    let caller = caller(&server, Principal::root());

    let res = server
        .compound(&caller, compound(2, vec![Nfs4OpArgs::PutRootFh]))
        .await;
    assert_eq!(res.status, NfsStatus::MinorVersMismatch);
    assert!(res.results.is_empty());

    let ops = vec![Nfs4OpArgs::PutRootFh; 3];
    let res = server.compound(&caller, compound(0, ops)).await;
    assert_eq!(res.status, NfsStatus::Resource);
    assert!(res.results.is_empty());
}

async fn register_client(server: &NfsServer, caller: &Caller, owner: &[u8]) -> u64 {
    let res = server
        .compound(
            caller,
            compound(
                0,
                vec![Nfs4OpArgs::SetClientId(SetClientIdArgs {
                    verifier: [7; 8],
                    owner: owner.to_vec(),
                    cb_program: 0,
                    cb_location: NetAddr::new("tcp", ""),
                    callback_ident: 0,
                })],
            ),
        )
        .await;
    let OpResBody::SetClientId(reply) = res.results[0].body.clone() else {
        panic!("unexpected reply {res:?}");
    };

    let res = server
        .compound(
            caller,
            compound(
                0,
                vec![Nfs4OpArgs::SetClientIdConfirm(SetClientIdConfirmArgs {
                    client_id: reply.client_id,
                    confirm: reply.confirm,
                })],
            ),
        )
        .await;
    assert_eq!(res.status, NfsStatus::Ok);
    reply.client_id
}

fn open(client_id: u64, name: &str, share_access: u32) -> Nfs4OpArgs {
    Nfs4OpArgs::Open(OpenArgs {
        seqid: 0,
        share_access,
        share_deny: 0,
        client_id,
        owner: b"owner".to_vec(),
        create: Some(CreateHow::Unchecked(Default::default())),
        claim: OpenClaim::Null(name.to_string()),
    })
}

fn read(stateid: StateId) -> Nfs4OpArgs {
    Nfs4OpArgs::Read(ReadArgs {
        stateid,
        offset: 0,
        count: 1024,
    })
}

fn write(stateid: StateId, data: &'static [u8]) -> Nfs4OpArgs {
    Nfs4OpArgs::Write(WriteArgs {
        stateid,
        offset: 0,
        stable: 2,
        data: Bytes::from_static(data),
    })
}

#[tokio::test]
async fn test_open_state_life_cycle() {
    let server = server_for(export());
    let caller = caller(&server, Principal::root());
    let client_id = register_client(&server, &caller, b"client-a").await;

    let res = server
        .compound(
            &caller,
            compound(
                0,
                vec![Nfs4OpArgs::PutRootFh, open(client_id, "file", 3), Nfs4OpArgs::GetFh],
            ),
        )
        .await;
    assert_eq!(res.status, NfsStatus::Ok);
    let OpResBody::Open(opened) = res.results[1].body.clone() else {
        panic!("unexpected reply {res:?}");
    };
    let OpResBody::GetFh(fh) = res.results[2].body.clone() else {
        panic!("unexpected reply {res:?}");
    };
    assert_eq!(opened.stateid.client_id(), client_id);
    assert_eq!(opened.stateid.seqid, 1);

    // unconfirmed state cannot do I/O
    let res = server
        .compound(&caller, compound(0, vec![putfh(&fh), read(opened.stateid)]))
        .await;
    assert_eq!(res.status, NfsStatus::BadStateid);

    let res = server
        .compound(
            &caller,
            compound(
                0,
                vec![
                    putfh(&fh),
                    Nfs4OpArgs::OpenConfirm(OpenConfirmArgs {
                        stateid: opened.stateid,
                        seqid: 1,
                    }),
                ],
            ),
        )
        .await;
    let OpResBody::StateId(confirmed) = res.results[1].body.clone() else {
        panic!("unexpected reply {res:?}");
    };
    assert_eq!(confirmed.seqid, 2);

    let res = server
        .compound(
            &caller,
            compound(
                0,
                vec![putfh(&fh), write(confirmed, b"payload"), read(confirmed)],
            ),
        )
        .await;
    assert_eq!(res.status, NfsStatus::Ok);
    match &res.results[2].body {
        OpResBody::Read(data) => {
            assert_eq!(&data.data[..], b"payload");
            assert!(data.eof);
        }
        other => panic!("unexpected body {other:?}"),
    }

    // the superseded seqid is old
    let res = server
        .compound(&caller, compound(0, vec![putfh(&fh), read(opened.stateid)]))
        .await;
    assert_eq!(res.status, NfsStatus::OldStateid);

    let res = server
        .compound(
            &caller,
            compound(
                0,
                vec![
                    putfh(&fh),
                    Nfs4OpArgs::Close(CloseArgs {
                        seqid: 2,
                        stateid: confirmed,
                    }),
                ],
            ),
        )
        .await;
    let OpResBody::StateId(closed) = res.results[1].body.clone() else {
        panic!("unexpected reply {res:?}");
    };
    assert_eq!(closed.seqid, 3);
    assert_eq!(server.registry().state_count(client_id), 0);

    let res = server
        .compound(&caller, compound(0, vec![putfh(&fh), read(confirmed)]))
        .await;
    assert_eq!(res.status, NfsStatus::BadStateid);
}

#[tokio::test]
async fn test_write_through_read_only_open() {
    let server = server_for(export());
    let caller = caller(&server, Principal::root());
    let client_id = register_client(&server, &caller, b"client-b").await;

    let res = server
        .compound(
            &caller,
            compound(0, vec![Nfs4OpArgs::PutRootFh, open(client_id, "ro", 1)]),
        )
        .await;
    let OpResBody::Open(opened) = res.results[1].body.clone() else {
        panic!("unexpected reply {res:?}");
    };
    let res = server
        .compound(
            &caller,
            compound(
                0,
                vec![
                    Nfs4OpArgs::PutRootFh,
                    lookup("ro"),
                    Nfs4OpArgs::OpenConfirm(OpenConfirmArgs {
                        stateid: opened.stateid,
                        seqid: 1,
                    }),
                ],
            ),
        )
        .await;
    let OpResBody::StateId(confirmed) = res.results[2].body.clone() else {
        panic!("unexpected reply {res:?}");
    };

    let res = server
        .compound(
            &caller,
            compound(
                0,
                vec![Nfs4OpArgs::PutRootFh, lookup("ro"), write(confirmed, b"x")],
            ),
        )
        .await;
    assert_eq!(res.status, NfsStatus::OpenMode);

    // the anonymous stateid falls back to permission checks
    let res = server
        .compound(
            &caller,
            compound(
                0,
                vec![Nfs4OpArgs::PutRootFh, lookup("ro"), write(StateId::ANONYMOUS, b"x")],
            ),
        )
        .await;
    assert_eq!(res.status, NfsStatus::Ok);
}

#[tokio::test]
async fn test_client_owner_in_use() {
    let server = server_for(export());
    let caller = caller(&server, Principal::root());
    register_client(&server, &caller, b"shared-owner").await;

    let res = server
        .compound(
            &caller,
            compound(
                0,
                vec![Nfs4OpArgs::SetClientId(SetClientIdArgs {
                    verifier: [8; 8],
                    owner: b"shared-owner".to_vec(),
                    cb_program: 0,
                    cb_location: NetAddr::new("tcp", ""),
                    callback_ident: 0,
                })],
            ),
        )
        .await;
    assert_eq!(res.status, NfsStatus::ClidInuse);
    assert_eq!(
        res.results[0].body,
        OpResBody::ClientInUse(NetAddr::new("tcp", "10.0.0.2.3.32"))
    );
}

#[tokio::test]
async fn test_getdeviceinfo() {
    let devices = StaticDeviceManager::new();
    let device_id = devices.register_device(DeviceAddress::files(&[
        "10.0.0.5:2049".parse().unwrap(),
        "10.0.0.6:2049".parse().unwrap(),
    ]));
    let server = server_for(export()).with_devices(Arc::new(devices));
    let caller = caller(&server, Principal::root());

    let request = |maxcount| {
        compound(
            1,
            vec![Nfs4OpArgs::GetDeviceInfo(GetDeviceInfoArgs {
                device_id,
                layout_type: 1,
                maxcount,
                notify_types: Bitmap::default(),
            })],
        )
    };

    let res = server.compound(&caller, request(0)).await;
    assert_eq!(res.status, NfsStatus::Ok);

    let res = server.compound(&caller, request(8)).await;
    assert_eq!(res.status, NfsStatus::Toosmall);
    assert!(matches!(res.results[0].body, OpResBody::MinCount(n) if n > 8));

    let res = server
        .compound(
            &caller,
            compound(
                1,
                vec![Nfs4OpArgs::GetDeviceInfo(GetDeviceInfoArgs {
                    device_id: [0xee; 16],
                    layout_type: 1,
                    maxcount: 0,
                    notify_types: Bitmap::default(),
                })],
            ),
        )
        .await;
    assert_eq!(res.status, NfsStatus::Inval);

    // not part of minor version 0
    let mut args = request(0);
    args.minor_version = 0;
    let mut enc = XdrEncoder::new();
    args.encode(&mut enc);
    let reply = server.process_compound(&caller, &enc.finish()).await.unwrap();
    let mut dec = XdrDecoder::new(&reply);
    assert_eq!(dec.decode_u32().unwrap(), NfsStatus::OpIllegal as u32);
}

#[tokio::test]
async fn test_process_compound_wire_format() {
    let server = server_for(export());
    let caller = caller(&server, Principal::root());

    let args = compound(0, vec![Nfs4OpArgs::PutRootFh, Nfs4OpArgs::GetFh]);
    let mut enc = XdrEncoder::new();
    args.encode(&mut enc);
    let reply = server.process_compound(&caller, &enc.finish()).await.unwrap();

    let mut dec = XdrDecoder::new(&reply);
    assert_eq!(dec.decode_u32().unwrap(), 0);
    assert_eq!(dec.decode_string().unwrap(), "test");
    assert_eq!(dec.decode_u32().unwrap(), 2);
    assert_eq!(dec.decode_u32().unwrap(), Nfs4Op::PutRootFh as u32);
    assert_eq!(dec.decode_u32().unwrap(), 0);
    assert_eq!(dec.decode_u32().unwrap(), Nfs4Op::GetFh as u32);
    assert_eq!(dec.decode_u32().unwrap(), 0);
    let root = FileHandle::from_inode(server.fs().root());
    assert_eq!(dec.decode_opaque().unwrap(), root.as_bytes());
    assert_eq!(dec.remaining(), 0);

    // truncated request
    let err = server.process_compound(&caller, &[0, 0, 0]).await.unwrap_err();
    assert_eq!(err.status(), NfsStatus::BadXdr);
}
