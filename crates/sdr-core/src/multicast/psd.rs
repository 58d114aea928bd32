// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reassembler for `psd` superframes: a small fixed header followed by `N`
//! little-endian `f32` power bins. Unlike `encap`, a partial frame is still
//! useful, so it is delivered with missing bins left at zero.

use crate::error::{Error, Result};
use crate::multicast::fragment::FragmentHeader;

/// `[sample_rate:f64 LE][center_freq:f64 LE][t0:u64 LE][t1:u64 LE][flags:u32 LE]`
const PSD_HEADER_SIZE: usize = 8 + 8 + 8 + 8 + 4;

/// A PSD frame header: sample rate, center frequency, two timestamps, flags.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PsdHeader {
    pub sample_rate: f64,
    pub center_freq: f64,
    pub t0: u64,
    pub t1: u64,
    pub flags: u32,
}

impl PsdHeader {
    fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PSD_HEADER_SIZE {
            return Err(Error::MalformedPdu);
        }
        Ok(PsdHeader {
            sample_rate: f64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            center_freq: f64::from_le_bytes(bytes[8..16].try_into().unwrap()),
            t0: u64::from_le_bytes(bytes[16..24].try_into().unwrap()),
            t1: u64::from_le_bytes(bytes[24..32].try_into().unwrap()),
            flags: u32::from_le_bytes(bytes[32..36].try_into().unwrap()),
        })
    }
}

/// One reassembled (possibly partial) PSD frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PsdFrame {
    pub header: PsdHeader,
    pub bins: Vec<f32>,
}

/// State for one in-progress `psd` superframe.
#[derive(Debug, Default)]
pub struct PsdReassembler {
    header: PsdHeader,
    bins: Vec<f32>,
    full_size: usize,
    sf_id: u8,
    has_id: bool,
    /// Set once the first fragment of the current frame has been applied;
    /// used by `trigger_on_call` to decide whether there is anything to flush.
    dirty: bool,
}

impl PsdReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    fn sample_count(full_size: usize) -> usize {
        full_size.saturating_sub(PSD_HEADER_SIZE) / 4
    }

    /// Feed one fragment. Returns `true` if a size change flushed the
    /// previous frame (the caller may want to log that a partial frame was
    /// dropped in favor of the new one).
    pub fn on_fragment(&mut self, header: &FragmentHeader, payload: &[u8]) -> Option<PsdFrame> {
        let full_size = header.sf_size as usize;
        let mut flushed = None;
        if full_size != self.full_size || !self.has_id || header.sf_id != self.sf_id {
            flushed = self.flush_internal();
            self.bins = vec![0.0f32; Self::sample_count(full_size)];
            self.full_size = full_size;
            self.sf_id = header.sf_id;
            self.has_id = true;
            self.dirty = false;
        }

        let offset = header.sf_offset as usize;
        if offset == 0 {
            if payload.len() < PSD_HEADER_SIZE {
                log::debug!("psd: fragment at offset 0 smaller than the PSD header, dropping");
                return flushed;
            }
            if let Ok(parsed) = PsdHeader::parse(payload) {
                self.header = parsed;
            }
            self.copy_bins(PSD_HEADER_SIZE, &payload[PSD_HEADER_SIZE..]);
        } else {
            self.copy_bins(offset, payload);
        }
        self.dirty = true;
        flushed
    }

    fn copy_bins(&mut self, byte_offset: usize, payload: &[u8]) {
        if byte_offset < PSD_HEADER_SIZE {
            return;
        }
        let bin_start = (byte_offset - PSD_HEADER_SIZE) / 4;
        for (i, chunk) in payload.chunks_exact(4).enumerate() {
            let idx = bin_start + i;
            if idx >= self.bins.len() {
                break;
            }
            self.bins[idx] = f32::from_le_bytes(chunk.try_into().unwrap());
        }
    }

    fn flush_internal(&mut self) -> Option<PsdFrame> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(PsdFrame {
            header: self.header,
            bins: std::mem::take(&mut self.bins),
        })
    }

    /// Flush whenever at least one update has arrived since the last flush.
    pub fn try_flush(&mut self) -> Option<PsdFrame> {
        let frame = self.flush_internal();
        if frame.is_some() {
            self.bins = vec![0.0f32; Self::sample_count(self.full_size)];
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multicast::fragment::SuperframeType;

    fn header_bytes(h: &PsdHeader) -> Vec<u8> {
        let mut out = Vec::with_capacity(PSD_HEADER_SIZE);
        out.extend_from_slice(&h.sample_rate.to_le_bytes());
        out.extend_from_slice(&h.center_freq.to_le_bytes());
        out.extend_from_slice(&h.t0.to_le_bytes());
        out.extend_from_slice(&h.t1.to_le_bytes());
        out.extend_from_slice(&h.flags.to_le_bytes());
        out
    }

    #[test]
    fn single_fragment_frame_round_trips_header_and_bins() {
        let header = PsdHeader {
            sample_rate: 2_000_000.0,
            center_freq: 100_000_000.0,
            t0: 1,
            t1: 2,
            flags: 0,
        };
        let bins = [1.0f32, 2.0, 3.0, 4.0];
        let mut payload = header_bytes(&header);
        for b in &bins {
            payload.extend_from_slice(&b.to_le_bytes());
        }
        let full_size = (PSD_HEADER_SIZE + bins.len() * 4) as u32;

        let mut reassembler = PsdReassembler::new();
        let frag_header = FragmentHeader {
            sf_type: SuperframeType::Psd,
            sf_id: 0,
            sf_size: full_size,
            sf_offset: 0,
            payload_len: payload.len() as u16,
        };
        reassembler.on_fragment(&frag_header, &payload);

        let frame = reassembler.try_flush().unwrap();
        assert_eq!(frame.header, header);
        assert_eq!(frame.bins, bins);
    }

    #[test]
    fn partial_frame_leaves_missing_bins_zero() {
        let header = PsdHeader::default();
        let mut payload = header_bytes(&header);
        payload.extend_from_slice(&1.0f32.to_le_bytes());
        let full_size = (PSD_HEADER_SIZE + 4 * 4) as u32; // announces 4 bins, only 1 arrives

        let mut reassembler = PsdReassembler::new();
        let frag_header = FragmentHeader {
            sf_type: SuperframeType::Psd,
            sf_id: 0,
            sf_size: full_size,
            sf_offset: 0,
            payload_len: payload.len() as u16,
        };
        reassembler.on_fragment(&frag_header, &payload);

        let frame = reassembler.try_flush().unwrap();
        assert_eq!(frame.bins, vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn size_change_flushes_previous_partial_frame() {
        let mut reassembler = PsdReassembler::new();
        let small_header = FragmentHeader {
            sf_type: SuperframeType::Psd,
            sf_id: 0,
            sf_size: (PSD_HEADER_SIZE + 4) as u32,
            sf_offset: 0,
            payload_len: 0,
        };
        let mut payload = header_bytes(&PsdHeader::default());
        payload.extend_from_slice(&9.0f32.to_le_bytes());
        reassembler.on_fragment(&small_header, &payload);

        let bigger_header = FragmentHeader {
            sf_size: (PSD_HEADER_SIZE + 8) as u32,
            ..small_header
        };
        let flushed = reassembler.on_fragment(&bigger_header, &payload);
        assert!(flushed.is_some());
    }

    #[test]
    fn no_updates_means_nothing_to_flush() {
        let mut reassembler = PsdReassembler::new();
        assert!(reassembler.try_flush().is_none());
    }
}
