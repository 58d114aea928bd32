// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Single source of truth for wire and runtime constants.
//!
//! **Never hardcode these values elsewhere.** Every magic number that shows
//! up more than once in the protocol or the concurrency model lives here.

// =======================================================================
// Control PDU framing
// =======================================================================

/// Magic marking a plain (uncompressed) PDU payload.
pub const PDU_MAGIC_PLAIN: u32 = 0xF500_5CA9;

/// Magic marking a zlib-compressed PDU payload.
///
/// The payload begins with a big-endian `u32` holding the inflated length,
/// followed by the zlib stream itself.
pub const PDU_MAGIC_COMPRESSED: u32 = 0xF500_5CAA;

/// Size of the PDU header on the wire: 4-byte magic + 4-byte length.
pub const PDU_HEADER_SIZE: usize = 8;

/// Default chunk size for writing a PDU payload to a socket.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1400;

/// Default byte threshold above which a PDU payload is zlib-compressed.
///
/// Zero disables compression unconditionally.
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 1400;

// =======================================================================
// Multicast fragment framing
// =======================================================================

/// Header size of a multicast fragment: type + id + reserved + size + offset + len.
pub const FRAGMENT_HEADER_SIZE: usize = 1 + 1 + 2 + 4 + 4 + 2;

/// Conservative IPv4/UDP MTU ceiling for a single fragment datagram.
pub const MAX_DATAGRAM_SIZE: usize = 508;

/// Maximum fragment payload size: `MAX_DATAGRAM_SIZE - FRAGMENT_HEADER_SIZE`.
pub const MAX_FRAGMENT_PAYLOAD: usize = MAX_DATAGRAM_SIZE - FRAGMENT_HEADER_SIZE;

/// Upper bound on an announced full-superframe size; larger announcements are
/// rejected with a warning rather than allocated.
pub const MAX_SUPERFRAME_SIZE: usize = 1024 * 1024;

/// Interval between `announce` superframes emitted by a live multicast manager.
pub const ANNOUNCE_INTERVAL_MS: u64 = 1000;

/// Default multicast group used for the analyzer data plane.
pub const DEFAULT_MULTICAST_ADDR: std::net::Ipv4Addr = std::net::Ipv4Addr::new(224, 4, 4, 4);

/// Default multicast port used for the analyzer data plane.
pub const DEFAULT_MULTICAST_PORT: u16 = 5556;

// =======================================================================
// Poll / cancellation
// =======================================================================

/// Default `Poll::poll` timeout for every worker loop in this crate.
pub const DEFAULT_POLL_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(100);

/// Maximum events drained from one `Poll::poll` call.
pub const MAX_POLL_EVENTS: usize = 128;

// =======================================================================
// Client / server bookkeeping
// =======================================================================

/// Queue depth above which a client's TX worker is considered backed up and
/// the client is marked failed on the next write error.
pub const TX_QUEUE_HIGH_WATERMARK: usize = 256;

/// Protocol version advertised and required by this implementation.
pub const PROTOCOL_VERSION: (u8, u8) = (0, 1);

/// `auth_mode` value for username/password authentication.
pub const AUTH_MODE_USER_PASSWORD: u8 = 1;

/// `enc_type` value meaning "no on-wire encryption".
pub const ENC_TYPE_NONE: u8 = 0;

/// Server-hello `flags` bit indicating multicast availability.
pub const HELLO_FLAG_MULTICAST: u32 = 1 << 0;

/// Client-auth `flags` bit indicating the client opts into multicast.
pub const AUTH_FLAG_MULTICAST_OPT_IN: u32 = 1 << 0;

/// Seed used when hashing a device's canonical URI into its 64-bit UUID.
pub const DEVICE_UUID_SEED: u64 = 0x5005_cafa_cade;
