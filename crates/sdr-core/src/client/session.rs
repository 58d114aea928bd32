// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One connected client's state machine, partial-PDU buffer, and
//! client-local inspector handle map.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use crate::auth;
use crate::codec::PartialPdu;
use crate::error::{Error, Result};
use crate::tx_worker::TxHandle;
use crate::wire::{ClientAuth, ServerHello};

/// `Connecting → AwaitingAuth → Authenticated → Failed/Closed → Destroyed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    AwaitingAuth,
    Authenticated,
    Failed,
    Closed,
}

/// One slot in the client's private handle map: `{global_handle, itl_index}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleMapEntry {
    pub global_handle: u32,
    pub itl_index: u32,
}

/// A connected client: socket bookkeeping, auth state, and the per-client
/// inspector handle map required to keep `c.epoch != list.epoch` or an
/// empty map as the only valid conditions for destroying it.
pub struct ClientSession {
    pub fd_token: usize,
    pub remote_addr: SocketAddr,
    pub connected_at: Instant,
    pub state: SessionState,
    pub accepts_multicast: bool,
    pub epoch: u64,
    pub tx: TxHandle,
    partial: PartialPdu,
    salt: [u8; 32],
    user: Option<String>,
    handle_map: HashMap<u32, HandleMapEntry>,
    pending_opens: u32,
}

impl ClientSession {
    pub fn new(fd_token: usize, remote_addr: SocketAddr, tx: TxHandle, epoch: u64) -> Self {
        Self {
            fd_token,
            remote_addr,
            connected_at: Instant::now(),
            state: SessionState::Connecting,
            accepts_multicast: false,
            epoch,
            tx,
            partial: PartialPdu::new(),
            salt: [0u8; 32],
            user: None,
            handle_map: HashMap::new(),
            pending_opens: 0,
        }
    }

    /// Build and enqueue the server-hello for this session, recording its
    /// salt for the subsequent auth-token check. Transitions to
    /// `AwaitingAuth`.
    pub fn send_hello(
        &mut self,
        server_name: &str,
        auth_mode: u8,
        multicast: Option<(u32, u16)>,
    ) -> Result<()> {
        let salt = auth::generate_salt()?;
        self.salt = salt;
        let hello = ServerHello {
            server_name: server_name.to_string(),
            protocol_major: crate::config::PROTOCOL_VERSION.0,
            protocol_minor: crate::config::PROTOCOL_VERSION.1,
            auth_mode,
            enc_type: crate::config::ENC_TYPE_NONE,
            sha256_salt: salt,
            flags: if multicast.is_some() { crate::config::HELLO_FLAG_MULTICAST } else { 0 },
            multicast_addr: multicast,
        };
        self.tx.enqueue(crate::wire::RemoteCall::ServerHello(hello).serialize())?;
        self.state = SessionState::AwaitingAuth;
        Ok(())
    }

    /// Validate an inbound auth call against the server's configured
    /// `expected_user`/`expected_password`. On success transitions to
    /// `Authenticated`; on failure transitions to `Failed` (the caller
    /// still owes the client an `AuthRejected` reply before kicking it).
    pub fn authenticate(&mut self, auth: &ClientAuth, expected_user: &str, expected_password: &str) -> bool {
        let ok = auth.user == expected_user
            && auth::verify_auth_token(expected_user, expected_password, &self.salt, &auth.sha256_token);
        if ok {
            self.user = Some(auth.user.clone());
            self.accepts_multicast = auth.flags & crate::config::AUTH_FLAG_MULTICAST_OPT_IN != 0;
            self.state = SessionState::Authenticated;
        } else {
            self.state = SessionState::Failed;
        }
        ok
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    #[cfg(test)]
    pub fn salt_for_test(&self) -> [u8; 32] {
        self.salt
    }

    /// Feed newly-read bytes into the partial-PDU buffer. Returns the raw
    /// (decompressed) payload once a full PDU has arrived.
    pub fn feed(&mut self, data: &[u8]) -> Result<Option<Vec<u8>>> {
        self.partial.feed(data)
    }

    /// Allocate a private handle for a freshly-opened inspector, returning
    /// it. Collisions are re-rolled until a free slot is found.
    pub fn allocate_handle(&mut self, global_handle: u32, itl_index: u32) -> Result<u32> {
        loop {
            let candidate = auth::generate_handle()?;
            if let std::collections::hash_map::Entry::Vacant(entry) = self.handle_map.entry(candidate) {
                entry.insert(HandleMapEntry { global_handle, itl_index });
                return Ok(candidate);
            }
        }
    }

    pub fn lookup_handle(&self, private_handle: u32) -> Option<HandleMapEntry> {
        self.handle_map.get(&private_handle).copied()
    }

    pub fn remove_handle(&mut self, private_handle: u32) -> Option<HandleMapEntry> {
        self.handle_map.remove(&private_handle)
    }

    pub fn open_pending(&mut self) {
        self.pending_opens += 1;
    }

    pub fn open_resolved(&mut self) {
        self.pending_opens = self.pending_opens.saturating_sub(1);
    }

    pub fn has_outstanding_inspectors(&self) -> bool {
        !self.handle_map.is_empty() || self.pending_opens > 0
    }

    pub fn is_failed(&self) -> bool {
        self.state == SessionState::Failed || self.tx.is_failed()
    }

    pub fn mark_failed(&mut self) {
        self.state = SessionState::Failed;
    }

    /// Every live handle in this client's map, for synthesizing `Close`
    /// requests to the analyzer when the client is kicked.
    pub fn live_handles(&self) -> impl Iterator<Item = (&u32, &HandleMapEntry)> {
        self.handle_map.iter()
    }

    pub fn kick(&mut self) {
        self.mark_failed();
        self.tx.stop_hard();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::net::{TcpListener, TcpStream as StdTcpStream};

    fn fake_tx() -> TxHandle {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = StdTcpStream::connect(addr).unwrap();
        let (server_side, _) = listener.accept().unwrap();
        let (_join, handle) = crate::tx_worker::TxWorker::spawn(server_side, crate::codec::PduCodec::default()).unwrap();
        handle
    }

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9999)
    }

    #[test]
    fn authenticate_with_matching_credentials_transitions_to_authenticated() {
        let mut session = ClientSession::new(2, addr(), fake_tx(), 0);
        session.send_hello("sdr-serverd", crate::config::AUTH_MODE_USER_PASSWORD, None).unwrap();
        let token = auth::compute_auth_token("alice", "secret", &session.salt);
        let call = ClientAuth {
            client_name: "client".to_string(),
            protocol_major: 0,
            protocol_minor: 1,
            user: "alice".to_string(),
            sha256_token: token,
            flags: 0,
        };
        assert!(session.authenticate(&call, "alice", "secret"));
        assert_eq!(session.state, SessionState::Authenticated);
    }

    #[test]
    fn authenticate_with_wrong_claimed_user_fails_even_with_right_password() {
        let mut session = ClientSession::new(2, addr(), fake_tx(), 0);
        session.send_hello("sdr-serverd", crate::config::AUTH_MODE_USER_PASSWORD, None).unwrap();
        let token = auth::compute_auth_token("mallory", "secret", &session.salt);
        let call = ClientAuth {
            client_name: "client".to_string(),
            protocol_major: 0,
            protocol_minor: 1,
            user: "mallory".to_string(),
            sha256_token: token,
            flags: 0,
        };
        assert!(!session.authenticate(&call, "alice", "secret"));
        assert_eq!(session.state, SessionState::Failed);
    }

    #[test]
    fn authenticate_with_wrong_password_fails() {
        let mut session = ClientSession::new(2, addr(), fake_tx(), 0);
        session.send_hello("sdr-serverd", crate::config::AUTH_MODE_USER_PASSWORD, None).unwrap();
        let token = auth::compute_auth_token("alice", "wrong", &session.salt);
        let call = ClientAuth {
            client_name: "client".to_string(),
            protocol_major: 0,
            protocol_minor: 1,
            user: "alice".to_string(),
            sha256_token: token,
            flags: 0,
        };
        assert!(!session.authenticate(&call, "alice", "secret"));
        assert_eq!(session.state, SessionState::Failed);
    }

    #[test]
    fn handle_map_round_trips_and_tracks_outstanding_inspectors() {
        let mut session = ClientSession::new(2, addr(), fake_tx(), 0);
        assert!(!session.has_outstanding_inspectors());
        let private = session.allocate_handle(42, 0).unwrap();
        assert!(session.has_outstanding_inspectors());
        let entry = session.lookup_handle(private).unwrap();
        assert_eq!(entry.global_handle, 42);
        session.remove_handle(private);
        assert!(!session.has_outstanding_inspectors());
    }

    #[test]
    fn kick_marks_failed_and_stops_the_tx_worker() {
        let mut session = ClientSession::new(2, addr(), fake_tx(), 0);
        session.kick();
        assert!(session.is_failed());
    }
}
