// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire layout for one multicast fragment datagram.
//!
//! `[sf_type:u8][sf_id:u8][reserved:u16][sf_size:u32 BE][sf_offset:u32 BE][size:u16 BE][payload]`

use crate::config::{FRAGMENT_HEADER_SIZE, MAX_DATAGRAM_SIZE};
use crate::error::{Error, Result};

/// Closed set of superframe kinds understood by the reassembly pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuperframeType {
    Announce,
    Encap,
    Psd,
    Unknown(u8),
}

impl SuperframeType {
    pub fn to_u8(self) -> u8 {
        match self {
            SuperframeType::Announce => 0,
            SuperframeType::Encap => 1,
            SuperframeType::Psd => 2,
            SuperframeType::Unknown(code) => code,
        }
    }

    pub fn from_u8(code: u8) -> Self {
        match code {
            0 => SuperframeType::Announce,
            1 => SuperframeType::Encap,
            2 => SuperframeType::Psd,
            other => SuperframeType::Unknown(other),
        }
    }
}

/// A parsed fragment header plus a borrowed view of its payload.
#[derive(Debug, Clone, Copy)]
pub struct FragmentHeader {
    pub sf_type: SuperframeType,
    pub sf_id: u8,
    pub sf_size: u32,
    pub sf_offset: u32,
    pub payload_len: u16,
}

impl FragmentHeader {
    /// Parse the header from the front of `datagram`, returning the header
    /// and the remaining payload slice.
    pub fn parse(datagram: &[u8]) -> Result<(Self, &[u8])> {
        if datagram.len() < FRAGMENT_HEADER_SIZE {
            return Err(Error::MalformedPdu);
        }
        let sf_type = SuperframeType::from_u8(datagram[0]);
        let sf_id = datagram[1];
        // bytes [2..4] are reserved.
        let sf_size = u32::from_be_bytes(datagram[4..8].try_into().unwrap());
        let sf_offset = u32::from_be_bytes(datagram[8..12].try_into().unwrap());
        let payload_len = u16::from_be_bytes(datagram[12..14].try_into().unwrap());

        let header = FragmentHeader {
            sf_type,
            sf_id,
            sf_size,
            sf_offset,
            payload_len,
        };

        let payload = &datagram[FRAGMENT_HEADER_SIZE..];
        if payload.len() < payload_len as usize {
            return Err(Error::MalformedPdu);
        }
        Ok((header, &payload[..payload_len as usize]))
    }

    /// Encode one fragment datagram: header + `payload`.
    pub fn encode(sf_type: SuperframeType, sf_id: u8, sf_size: u32, sf_offset: u32, payload: &[u8]) -> Vec<u8> {
        debug_assert!(FRAGMENT_HEADER_SIZE + payload.len() <= MAX_DATAGRAM_SIZE);
        let mut out = Vec::with_capacity(FRAGMENT_HEADER_SIZE + payload.len());
        out.push(sf_type.to_u8());
        out.push(sf_id);
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&sf_size.to_be_bytes());
        out.extend_from_slice(&sf_offset.to_be_bytes());
        out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }
}

/// Signed 8-bit rollover-aware delta, `new - current`.
///
/// A 255→0 wrap yields `delta == 1`, not a large negative number, which is
/// exactly the "forward by one" case the rollover policy treats as normal.
pub fn rollover_delta(current: u8, new: u8) -> i8 {
    new.wrapping_sub(current) as i8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_parse_round_trip() {
        let payload = b"psd-bytes";
        let datagram = FragmentHeader::encode(SuperframeType::Psd, 7, 1000, 50, payload);
        let (header, parsed_payload) = FragmentHeader::parse(&datagram).unwrap();
        assert_eq!(header.sf_type, SuperframeType::Psd);
        assert_eq!(header.sf_id, 7);
        assert_eq!(header.sf_size, 1000);
        assert_eq!(header.sf_offset, 50);
        assert_eq!(parsed_payload, payload);
    }

    #[test]
    fn wraparound_255_to_0_is_forward_delta_one() {
        assert_eq!(rollover_delta(255, 0), 1);
    }

    #[test]
    fn stale_id_yields_negative_delta() {
        assert_eq!(rollover_delta(10, 9), -1);
    }

    #[test]
    fn truncated_datagram_is_malformed() {
        assert!(matches!(FragmentHeader::parse(&[0u8; 4]), Err(Error::MalformedPdu)));
    }

    #[test]
    fn payload_shorter_than_announced_length_is_malformed() {
        let mut datagram = FragmentHeader::encode(SuperframeType::Encap, 1, 100, 0, b"abc");
        // Claim the payload is longer than what actually follows.
        let len_offset = 12;
        datagram[len_offset..len_offset + 2].copy_from_slice(&50u16.to_be_bytes());
        assert!(matches!(FragmentHeader::parse(&datagram), Err(Error::MalformedPdu)));
    }
}
