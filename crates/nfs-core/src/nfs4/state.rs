//! NFSv4 client and state registry
//!
//! Tracks SETCLIENTID registrations, their leases and the open states each
//! client owns. A stateid's `other` field carries the owning client id in
//! its first eight bytes, so any stateid resolves to its client without a
//! separate index.
//!
//! Locking: client creation holds the owner-index entry for the whole
//! check-and-insert. Lease renewal mutates a record under its `clients`
//! shard lock and expiry removes it with `remove_if`, so the two never
//! interleave for one client. Nested acquisition always goes
//! `by_owner` → `clients` → `by_verifier`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info};

use super::StateId;
use crate::clock::Clock;
use crate::error::NfsStatus;
use crate::filehandle::FileHandle;

/// Server-assigned client id
pub type ClientId = u64;

/// 8-byte verifier exchanged by SETCLIENTID
pub type Verifier = [u8; 8];

/// Registry failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// No such client, or the confirm verifier did not match
    #[error("unknown client {0:#x}")]
    UnknownClient(ClientId),
    /// The stateid does not resolve to a state
    #[error("unknown stateid")]
    UnknownState,
    /// Another verifier holds the owner's registration
    #[error("client owner in use by {holder}")]
    ClientInUse {
        /// Address of the live registration
        holder: SocketAddr,
    },
    /// Client or state not confirmed yet
    #[error("not confirmed")]
    NotConfirmed,
    /// The client's lease has lapsed
    #[error("lease expired")]
    Expired,
    /// Presented seqid is ahead of the state's
    #[error("seqid {presented} ahead of {current}")]
    BadSeqid {
        /// Seqid in the request
        presented: u32,
        /// Seqid held by the server
        current: u32,
    },
    /// Presented seqid is behind the state's
    #[error("old stateid")]
    OldStateid,
}

impl From<StateError> for NfsStatus {
    fn from(err: StateError) -> Self {
        match err {
            StateError::UnknownClient(_) => NfsStatus::StaleClientid,
            StateError::UnknownState => NfsStatus::BadStateid,
            StateError::ClientInUse { .. } => NfsStatus::ClidInuse,
            StateError::NotConfirmed => NfsStatus::BadStateid,
            StateError::Expired => NfsStatus::Expired,
            StateError::BadSeqid { .. } => NfsStatus::BadStateid,
            StateError::OldStateid => NfsStatus::OldStateid,
        }
    }
}

/// Callback channel offered by SETCLIENTID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackInfo {
    /// Callback RPC program
    pub program: u32,
    /// Network id (`tcp`, `tcp6`, ...)
    pub netid: String,
    /// Universal address
    pub addr: String,
    /// Callback ident
    pub ident: u32,
}

/// Share access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareAccess(u32);

impl ShareAccess {
    /// Read access
    pub const READ: Self = Self(0x1);
    /// Write access
    pub const WRITE: Self = Self(0x2);
    /// Both read and write
    pub const BOTH: Self = Self(0x3);

    /// Check if contains a flag
    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Get raw value
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Create from raw value, keeping only the access bits
    pub fn from_bits(bits: u32) -> Result<Self, NfsStatus> {
        match bits & 0xff {
            0x1..=0x3 => Ok(Self(bits & 0x3)),
            _ => Err(NfsStatus::Inval),
        }
    }
}

/// Share deny mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareDeny(u32);

impl ShareDeny {
    /// No deny
    pub const NONE: Self = Self(0x0);

    /// Get raw value
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Create from raw value
    pub fn from_bits(bits: u32) -> Result<Self, NfsStatus> {
        if bits > 0x3 {
            return Err(NfsStatus::Inval);
        }
        Ok(Self(bits))
    }
}

/// An open state
#[derive(Debug, Clone)]
pub struct Nfs4State {
    /// Current stateid
    pub stateid: StateId,
    /// Owning client
    pub client_id: ClientId,
    /// Opened file
    pub filehandle: FileHandle,
    /// Granted access
    pub share_access: ShareAccess,
    /// Confirmed by OPEN_CONFIRM
    pub confirmed: bool,
}

/// A registered client
#[derive(Debug, Clone)]
pub struct Nfs4Client {
    /// Server-assigned id
    pub id: ClientId,
    /// Client-chosen owner identifier
    pub owner: Vec<u8>,
    /// Client boot verifier
    pub verifier: Verifier,
    /// Server-generated verifier SETCLIENTID_CONFIRM must echo
    pub confirm_verifier: Verifier,
    /// Peer address
    pub remote: SocketAddr,
    /// Local address the client reached
    pub local: SocketAddr,
    /// Callback channel
    pub callback: Option<CallbackInfo>,
    /// Confirmed by SETCLIENTID_CONFIRM
    pub confirmed: bool,
    /// When the lease lapses
    pub lease_expiry: Instant,
}

impl Nfs4Client {
    /// Check whether the lease has lapsed at `now`
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.lease_expiry
    }
}

#[derive(Debug)]
struct ClientRecord {
    client: Nfs4Client,
    states: HashMap<[u8; 12], Nfs4State>,
    next_state: u32,
}

impl ClientRecord {
    fn state_mut(&mut self, stateid: &StateId) -> Result<&mut Nfs4State, StateError> {
        let state = self
            .states
            .get_mut(&stateid.other)
            .ok_or(StateError::UnknownState)?;
        check_seqid(stateid.seqid, state.stateid.seqid)?;
        Ok(state)
    }
}

fn check_seqid(presented: u32, current: u32) -> Result<(), StateError> {
    match presented {
        p if p > current => Err(StateError::BadSeqid {
            presented,
            current,
        }),
        p if p < current => Err(StateError::OldStateid),
        _ => Ok(()),
    }
}

fn random_verifier() -> Verifier {
    loop {
        let verifier: Verifier = rand::random();
        if verifier != [0; 8] {
            return verifier;
        }
    }
}

/// In-memory client and state table
pub struct ClientRegistry {
    clients: DashMap<ClientId, ClientRecord>,
    by_owner: DashMap<Vec<u8>, ClientId>,
    by_verifier: DashMap<Verifier, ClientId>,
    next_id: AtomicU64,
    lease_time: Duration,
    clock: Arc<dyn Clock>,
}

impl ClientRegistry {
    /// Create an empty registry.
    ///
    /// Client ids carry a random per-instance prefix so ids handed out by a
    /// previous server instance come back as unknown.
    pub fn new(lease_time: Duration, clock: Arc<dyn Clock>) -> Self {
        let prefix = u64::from(rand::random::<u32>()) << 32;
        Self {
            clients: DashMap::new(),
            by_owner: DashMap::new(),
            by_verifier: DashMap::new(),
            next_id: AtomicU64::new(prefix | 1),
            lease_time,
            clock,
        }
    }

    /// Lease granted per renewal
    pub fn lease_time(&self) -> Duration {
        self.lease_time
    }

    /// Current instant of the registry's clock
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Register a client (SETCLIENTID).
    ///
    /// The same owner with the same verifier gets its existing record back
    /// with a fresh lease. A different verifier is refused while the
    /// existing lease runs; once it lapsed the old record and its states are
    /// dropped and a new one is created.
    pub fn create_client(
        &self,
        owner: &[u8],
        verifier: Verifier,
        callback: Option<CallbackInfo>,
        remote: SocketAddr,
        local: SocketAddr,
    ) -> Result<Nfs4Client, StateError> {
        let now = self.clock.now();
        let slot = match self.by_owner.entry(owner.to_vec()) {
            Entry::Occupied(mut slot) => {
                let existing = *slot.get();
                if let Some(mut record) = self.clients.get_mut(&existing) {
                    if !record.client.is_expired(now) {
                        if record.client.verifier != verifier {
                            debug!(client = existing, holder = %record.client.remote, "client owner in use");
                            return Err(StateError::ClientInUse {
                                holder: record.client.remote,
                            });
                        }
                        record.client.lease_expiry = now + self.lease_time;
                        record.client.callback = callback;
                        return Ok(record.client.clone());
                    }
                }
                if let Some((_, old)) = self.clients.remove(&existing) {
                    info!(client = existing, states = old.states.len(), "replacing expired client");
                    self.by_verifier
                        .remove_if(&old.client.verifier, |_, id| *id == existing);
                }
                let client = self.insert_record(owner, verifier, callback, remote, local, now);
                slot.insert(client.id);
                return Ok(client);
            }
            Entry::Vacant(slot) => slot,
        };
        let client = self.insert_record(owner, verifier, callback, remote, local, now);
        slot.insert(client.id);
        Ok(client)
    }

    fn insert_record(
        &self,
        owner: &[u8],
        verifier: Verifier,
        callback: Option<CallbackInfo>,
        remote: SocketAddr,
        local: SocketAddr,
        now: Instant,
    ) -> Nfs4Client {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let client = Nfs4Client {
            id,
            owner: owner.to_vec(),
            verifier,
            confirm_verifier: random_verifier(),
            remote,
            local,
            callback,
            confirmed: false,
            lease_expiry: now + self.lease_time,
        };
        self.clients.insert(
            id,
            ClientRecord {
                client: client.clone(),
                states: HashMap::new(),
                next_state: 0,
            },
        );
        self.by_verifier.insert(verifier, id);
        info!(client = id, %remote, "client registered");
        client
    }

    /// Confirm a registration (SETCLIENTID_CONFIRM)
    pub fn confirm_client(&self, id: ClientId, confirm: Verifier) -> Result<(), StateError> {
        let now = self.clock.now();
        let mut record = self
            .clients
            .get_mut(&id)
            .ok_or(StateError::UnknownClient(id))?;
        if record.client.confirm_verifier != confirm {
            return Err(StateError::UnknownClient(id));
        }
        if record.client.is_expired(now) {
            return Err(StateError::Expired);
        }
        record.client.confirmed = true;
        record.client.lease_expiry = now + self.lease_time;
        debug!(client = id, "client confirmed");
        Ok(())
    }

    /// Find a client by its boot verifier
    pub fn lookup_client_by_verifier(&self, verifier: &Verifier) -> Option<Nfs4Client> {
        let id = *self.by_verifier.get(verifier)?;
        self.clients.get(&id).map(|r| r.client.clone())
    }

    /// Find a client by id
    pub fn lookup_client_by_id(&self, id: ClientId) -> Result<Nfs4Client, StateError> {
        self.clients
            .get(&id)
            .map(|r| r.client.clone())
            .ok_or(StateError::UnknownClient(id))
    }

    /// Validate `stateid` and renew the owning client's lease
    pub fn renew_lease(&self, stateid: &StateId) -> Result<(), StateError> {
        self.check_state(stateid).map(|_| ())
    }

    /// Validate a stateid presented for I/O, renewing the owner's lease.
    pub fn check_state(&self, stateid: &StateId) -> Result<Nfs4State, StateError> {
        let now = self.clock.now();
        let mut record = self
            .clients
            .get_mut(&stateid.client_id())
            .ok_or(StateError::UnknownState)?;
        if record.client.is_expired(now) {
            return Err(StateError::Expired);
        }
        let state = record.state_mut(stateid)?.clone();
        if !record.client.confirmed || !state.confirmed {
            return Err(StateError::NotConfirmed);
        }
        record.client.lease_expiry = now + self.lease_time;
        Ok(state)
    }

    /// Renew a confirmed client's lease (RENEW)
    pub fn renew_client(&self, id: ClientId) -> Result<(), StateError> {
        let now = self.clock.now();
        let mut record = self
            .clients
            .get_mut(&id)
            .ok_or(StateError::UnknownClient(id))?;
        if !record.client.confirmed {
            return Err(StateError::UnknownClient(id));
        }
        if record.client.is_expired(now) {
            return Err(StateError::Expired);
        }
        record.client.lease_expiry = now + self.lease_time;
        Ok(())
    }

    /// Create an unconfirmed open state for a confirmed client
    pub fn create_state(
        &self,
        client_id: ClientId,
        filehandle: FileHandle,
        share_access: ShareAccess,
    ) -> Result<StateId, StateError> {
        let now = self.clock.now();
        let mut record = self
            .clients
            .get_mut(&client_id)
            .ok_or(StateError::UnknownClient(client_id))?;
        if !record.client.confirmed {
            return Err(StateError::UnknownClient(client_id));
        }
        if record.client.is_expired(now) {
            return Err(StateError::Expired);
        }
        record.next_state = record.next_state.wrapping_add(1);
        let stateid = StateId::for_client(client_id, record.next_state);
        record.states.insert(
            stateid.other,
            Nfs4State {
                stateid,
                client_id,
                filehandle,
                share_access,
                confirmed: false,
            },
        );
        record.client.lease_expiry = now + self.lease_time;
        Ok(stateid)
    }

    /// Confirm an open state (OPEN_CONFIRM), bumping its seqid
    pub fn confirm_state(&self, stateid: &StateId) -> Result<StateId, StateError> {
        let now = self.clock.now();
        let mut record = self
            .clients
            .get_mut(&stateid.client_id())
            .ok_or(StateError::UnknownState)?;
        if record.client.is_expired(now) {
            return Err(StateError::Expired);
        }
        let state = record.state_mut(stateid)?;
        if state.confirmed {
            return Err(StateError::BadSeqid {
                presented: stateid.seqid,
                current: state.stateid.seqid,
            });
        }
        state.confirmed = true;
        state.stateid.seqid = state.stateid.seqid.wrapping_add(1);
        let confirmed = state.stateid;
        record.client.lease_expiry = now + self.lease_time;
        Ok(confirmed)
    }

    /// Destroy a state (CLOSE)
    pub fn release_state(&self, stateid: &StateId) -> Result<Nfs4State, StateError> {
        let now = self.clock.now();
        let mut record = self
            .clients
            .get_mut(&stateid.client_id())
            .ok_or(StateError::UnknownState)?;
        if record.client.is_expired(now) {
            return Err(StateError::Expired);
        }
        record.state_mut(stateid)?;
        let state = record
            .states
            .remove(&stateid.other)
            .ok_or(StateError::UnknownState)?;
        record.client.lease_expiry = now + self.lease_time;
        Ok(state)
    }

    /// Remove every client whose lease ended by `now`, with its states
    pub fn expire_clients(&self, now: Instant) -> Vec<ClientId> {
        let due: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|r| r.client.is_expired(now))
            .map(|r| *r.key())
            .collect();

        let mut expired = Vec::with_capacity(due.len());
        for id in due {
            // renewed since the scan: remove_if sees the fresh expiry
            let Some((_, record)) = self
                .clients
                .remove_if(&id, |_, r| r.client.is_expired(now))
            else {
                continue;
            };
            self.by_owner
                .remove_if(&record.client.owner, |_, owner_id| *owner_id == id);
            self.by_verifier
                .remove_if(&record.client.verifier, |_, verifier_id| *verifier_id == id);
            info!(
                client = id,
                states = record.states.len(),
                "client lease expired"
            );
            expired.push(id);
        }
        expired
    }

    /// Number of registered clients
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Number of states a client holds
    pub fn state_count(&self, id: ClientId) -> usize {
        self.clients.get(&id).map(|r| r.states.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("clients", &self.clients.len())
            .field("lease_time", &self.lease_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const LEASE: Duration = Duration::from_secs(90);

    fn addr(last: u8) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, last], 700))
    }

    fn registry() -> (ClientRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (ClientRegistry::new(LEASE, clock.clone()), clock)
    }

    fn confirmed_client(registry: &ClientRegistry, owner: &[u8]) -> Nfs4Client {
        let client = registry
            .create_client(owner, [1; 8], None, addr(1), addr(2))
            .unwrap();
        registry
            .confirm_client(client.id, client.confirm_verifier)
            .unwrap();
        client
    }

    #[test]
    fn test_lookup_by_verifier() {
        let (registry, _) = registry();
        let client = registry
            .create_client(b"owner", [5; 8], None, addr(1), addr(2))
            .unwrap();
        let found = registry.lookup_client_by_verifier(&[5; 8]).unwrap();
        assert_eq!(found.id, client.id);
        assert!(registry.lookup_client_by_verifier(&[6; 8]).is_none());
    }

    #[test]
    fn test_unknown_client_id() {
        let (registry, _) = registry();
        assert_eq!(
            registry.lookup_client_by_id(42).unwrap_err(),
            StateError::UnknownClient(42)
        );
    }

    #[test]
    fn test_owner_conflict_and_reregistration() {
        let (registry, _) = registry();
        let first = registry
            .create_client(b"owner", [1; 8], None, addr(1), addr(9))
            .unwrap();

        let err = registry
            .create_client(b"owner", [2; 8], None, addr(3), addr(9))
            .unwrap_err();
        assert_eq!(err, StateError::ClientInUse { holder: addr(1) });
        assert_eq!(NfsStatus::from(err), NfsStatus::ClidInuse);

        let again = registry
            .create_client(b"owner", [1; 8], None, addr(1), addr(9))
            .unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(registry.client_count(), 1);
    }

    #[test]
    fn test_expired_predecessor_replaced() {
        let (registry, clock) = registry();
        let first = confirmed_client(&registry, b"owner");
        let fh = FileHandle::from_inode(7);
        registry
            .create_state(first.id, fh, ShareAccess::READ)
            .unwrap();

        clock.advance(LEASE + Duration::from_secs(1));
        let second = registry
            .create_client(b"owner", [2; 8], None, addr(3), addr(9))
            .unwrap();
        assert_ne!(second.id, first.id);
        assert!(registry.lookup_client_by_id(first.id).is_err());
        assert_eq!(registry.state_count(first.id), 0);
        assert_eq!(registry.client_count(), 1);
    }

    #[test]
    fn test_confirm_with_wrong_verifier() {
        let (registry, _) = registry();
        let client = registry
            .create_client(b"owner", [1; 8], None, addr(1), addr(2))
            .unwrap();
        let mut wrong = client.confirm_verifier;
        wrong[0] ^= 0xff;
        assert_eq!(
            registry.confirm_client(client.id, wrong),
            Err(StateError::UnknownClient(client.id))
        );
        assert!(!registry.lookup_client_by_id(client.id).unwrap().confirmed);
    }

    #[test]
    fn test_renew_lease_requires_confirmation() {
        let (registry, clock) = registry();
        let client = registry
            .create_client(b"owner", [1; 8], None, addr(1), addr(2))
            .unwrap();
        let bogus = StateId::for_client(client.id, 1);
        assert_eq!(registry.renew_lease(&bogus), Err(StateError::UnknownState));

        registry
            .confirm_client(client.id, client.confirm_verifier)
            .unwrap();
        let stateid = registry
            .create_state(client.id, FileHandle::from_inode(2), ShareAccess::BOTH)
            .unwrap();
        assert_eq!(registry.renew_lease(&stateid), Err(StateError::NotConfirmed));

        let stateid = registry.confirm_state(&stateid).unwrap();
        assert_eq!(stateid.seqid, 2);

        let before = registry.lookup_client_by_id(client.id).unwrap().lease_expiry;
        clock.advance(Duration::from_secs(10));
        registry.renew_lease(&stateid).unwrap();
        let after = registry.lookup_client_by_id(client.id).unwrap().lease_expiry;
        assert!(after > before);
    }

    #[test]
    fn test_renew_lapsed_lease() {
        let (registry, clock) = registry();
        let client = confirmed_client(&registry, b"owner");
        let stateid = registry
            .create_state(client.id, FileHandle::from_inode(2), ShareAccess::READ)
            .unwrap();
        let stateid = registry.confirm_state(&stateid).unwrap();

        clock.advance(LEASE);
        assert_eq!(registry.renew_lease(&stateid), Err(StateError::Expired));
        assert_eq!(registry.renew_client(client.id), Err(StateError::Expired));
    }

    #[test]
    fn test_seqid_checks() {
        let (registry, _) = registry();
        let client = confirmed_client(&registry, b"owner");
        let opened = registry
            .create_state(client.id, FileHandle::from_inode(2), ShareAccess::READ)
            .unwrap();
        let current = registry.confirm_state(&opened).unwrap();

        assert_eq!(registry.renew_lease(&opened), Err(StateError::OldStateid));
        let ahead = StateId::new(current.seqid + 1, current.other);
        assert!(matches!(
            registry.renew_lease(&ahead),
            Err(StateError::BadSeqid { .. })
        ));
        assert_eq!(
            NfsStatus::from(registry.renew_lease(&ahead).unwrap_err()),
            NfsStatus::BadStateid
        );
    }

    #[test]
    fn test_state_ids_embed_client() {
        let (registry, _) = registry();
        let client = confirmed_client(&registry, b"owner");
        let a = registry
            .create_state(client.id, FileHandle::from_inode(2), ShareAccess::READ)
            .unwrap();
        let b = registry
            .create_state(client.id, FileHandle::from_inode(3), ShareAccess::READ)
            .unwrap();
        assert_ne!(a.other, b.other);
        assert_eq!(a.client_id(), client.id);
        assert_eq!(a.seqid, 1);

        let released = registry.release_state(&a).unwrap();
        assert_eq!(released.filehandle, FileHandle::from_inode(2));
        assert_eq!(registry.release_state(&a).unwrap_err(), StateError::UnknownState);
        assert_eq!(registry.state_count(client.id), 1);
    }

    #[test]
    fn test_expire_clients() {
        let (registry, clock) = registry();
        let old = confirmed_client(&registry, b"old");
        clock.advance(Duration::from_secs(60));
        let young = confirmed_client(&registry, b"young");

        clock.advance(Duration::from_secs(40));
        let expired = registry.expire_clients(clock.now());
        assert_eq!(expired, vec![old.id]);
        assert!(registry.lookup_client_by_id(young.id).is_ok());

        // the owner is free again
        let fresh = registry
            .create_client(b"old", [9; 8], None, addr(4), addr(2))
            .unwrap();
        assert_ne!(fresh.id, old.id);
    }

    #[test]
    fn test_concurrent_registration_single_winner() {
        let (registry, _) = registry();
        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8u8)
                .map(|i| {
                    let registry = &registry;
                    s.spawn(move || registry.create_client(b"shared", [i; 8], None, addr(i), addr(0)))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert_eq!(registry.client_count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, StateError::ClientInUse { .. })));
    }
}
