// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-prefixed, magic-tagged PDU framing for the control channel.
//!
//! A PDU is `[magic: u32 BE][length: u32 BE][payload]`. Payloads larger than
//! a configurable threshold are transparently zlib-compressed; the receiver
//! accepts either magic on every read.

use std::io::{self, Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::config::{
    DEFAULT_COMPRESSION_THRESHOLD, DEFAULT_READ_BUFFER_SIZE, PDU_HEADER_SIZE, PDU_MAGIC_COMPRESSED,
    PDU_MAGIC_PLAIN,
};
use crate::error::{Error, Result};

/// Encodes and decodes control-channel PDUs.
///
/// Cheap to clone: holds only the compression policy, no buffers.
#[derive(Debug, Clone, Copy)]
pub struct PduCodec {
    compression_threshold: usize,
    write_chunk_size: usize,
}

impl Default for PduCodec {
    fn default() -> Self {
        Self {
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            write_chunk_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl PduCodec {
    pub fn new(compression_threshold: usize) -> Self {
        Self {
            compression_threshold,
            write_chunk_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    /// Encode `payload` into a complete PDU (header + body), compressing it
    /// first if `compression_threshold` is non-zero and exceeded.
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if self.compression_threshold > 0 && payload.len() > self.compression_threshold {
            let mut body = Vec::with_capacity(payload.len() / 2 + 4);
            body.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            let mut encoder = ZlibEncoder::new(&mut body, Compression::default());
            // Writing to an in-memory Vec through flate2 cannot fail with I/O
            // errors; only a corrupt encoder state could, which is not
            // reachable from safe code here.
            encoder.write_all(payload).map_err(Error::Io)?;
            encoder.finish().map_err(Error::Io)?;
            Ok(frame(PDU_MAGIC_COMPRESSED, &body))
        } else {
            Ok(frame(PDU_MAGIC_PLAIN, payload))
        }
    }

    /// Write an encoded PDU to `w` in chunks of at most `write_chunk_size`
    /// bytes, matching the reference codec's bounded-write policy.
    pub fn write_pdu<W: Write>(&self, w: &mut W, payload: &[u8]) -> Result<()> {
        let framed = self.encode(payload)?;
        for chunk in framed.chunks(self.write_chunk_size) {
            w.write_all(chunk).map_err(Error::Io)?;
        }
        Ok(())
    }

    /// Read exactly one PDU from `r`, decompressing it if necessary.
    ///
    /// `MalformedPdu` is returned for magic mismatch, truncated stream, or a
    /// post-inflate size mismatch.
    pub fn read_pdu<R: Read>(&self, r: &mut R) -> Result<Vec<u8>> {
        let mut header = [0u8; PDU_HEADER_SIZE];
        r.read_exact(&mut header).map_err(map_read_err)?;
        let magic = u32::from_be_bytes(header[0..4].try_into().unwrap());
        let length = u32::from_be_bytes(header[4..8].try_into().unwrap()) as usize;

        let mut body = vec![0u8; length];
        r.read_exact(&mut body).map_err(map_read_err)?;

        match magic {
            PDU_MAGIC_PLAIN => Ok(body),
            PDU_MAGIC_COMPRESSED => decompress(&body),
            _ => Err(Error::MalformedPdu),
        }
    }
}

fn frame(magic: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(PDU_HEADER_SIZE + payload.len());
    out.extend_from_slice(&magic.to_be_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

fn decompress(body: &[u8]) -> Result<Vec<u8>> {
    if body.len() < 4 {
        return Err(Error::MalformedPdu);
    }
    let inflated_len = u32::from_be_bytes(body[0..4].try_into().unwrap()) as usize;
    let mut decoder = ZlibDecoder::new(&body[4..]);
    let mut out = Vec::with_capacity(inflated_len);
    decoder.read_to_end(&mut out).map_err(|_| Error::MalformedPdu)?;
    if out.len() != inflated_len {
        return Err(Error::MalformedPdu);
    }
    Ok(out)
}

fn map_read_err(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::MalformedPdu
    } else {
        Error::Io(e)
    }
}

/// Incremental reader for use inside a non-blocking poll loop: feed it bytes
/// as they arrive and it reports when a full PDU payload is ready.
///
/// Mirrors the reference session's three-field partial-PDU state: header
/// bytes consumed so far, a `have_header` flag, and a growing payload buffer.
#[derive(Debug, Default)]
pub struct PartialPdu {
    header_buf: Vec<u8>,
    have_header: bool,
    magic: u32,
    expected_len: usize,
    payload: Vec<u8>,
}

impl PartialPdu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly-read bytes in. Returns `Some(raw_payload)` once a full
    /// frame (header + body, still possibly compressed) has been consumed,
    /// and resets internal state for the next PDU.
    pub fn feed(&mut self, data: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut cursor = data;

        if !self.have_header {
            let need = PDU_HEADER_SIZE - self.header_buf.len();
            let take = need.min(cursor.len());
            self.header_buf.extend_from_slice(&cursor[..take]);
            cursor = &cursor[take..];

            if self.header_buf.len() < PDU_HEADER_SIZE {
                return Ok(None);
            }

            let magic = u32::from_be_bytes(self.header_buf[0..4].try_into().unwrap());
            if magic != PDU_MAGIC_PLAIN && magic != PDU_MAGIC_COMPRESSED {
                return Err(Error::MalformedPdu);
            }
            self.magic = magic;
            self.expected_len =
                u32::from_be_bytes(self.header_buf[4..8].try_into().unwrap()) as usize;
            self.have_header = true;
            self.payload = Vec::with_capacity(self.expected_len);
        }

        let remaining = self.expected_len - self.payload.len();
        let take = remaining.min(cursor.len());
        self.payload.extend_from_slice(&cursor[..take]);

        if self.payload.len() < self.expected_len {
            return Ok(None);
        }

        let raw = match self.magic {
            PDU_MAGIC_PLAIN => std::mem::take(&mut self.payload),
            _ => decompress(&self.payload)?,
        };
        self.reset();
        Ok(Some(raw))
    }

    fn reset(&mut self) {
        self.header_buf.clear();
        self.have_header = false;
        self.payload.clear();
        self.expected_len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_round_trip_begins_with_plain_magic() {
        let codec = PduCodec::new(0);
        let payload = b"hello analyzer";
        let framed = codec.encode(payload).unwrap();
        assert_eq!(&framed[0..4], &PDU_MAGIC_PLAIN.to_be_bytes());

        let mut cursor = io::Cursor::new(framed);
        let decoded = codec.read_pdu(&mut cursor).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn compressed_round_trip_preserves_inflated_length_prefix() {
        let codec = PduCodec::new(1400);
        let payload = vec![0xABu8; 2048];
        let framed = codec.encode(&payload).unwrap();
        assert_eq!(&framed[0..4], &PDU_MAGIC_COMPRESSED.to_be_bytes());

        let body_start = PDU_HEADER_SIZE;
        let inflated_len =
            u32::from_be_bytes(framed[body_start..body_start + 4].try_into().unwrap());
        assert_eq!(inflated_len, 2048);

        let mut cursor = io::Cursor::new(framed);
        let decoded = codec.read_pdu(&mut cursor).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn below_threshold_payload_stays_plain() {
        let codec = PduCodec::new(1400);
        let framed = codec.encode(b"short").unwrap();
        assert_eq!(&framed[0..4], &PDU_MAGIC_PLAIN.to_be_bytes());
    }

    #[test]
    fn unknown_magic_is_malformed() {
        let codec = PduCodec::default();
        let mut bogus = Vec::new();
        bogus.extend_from_slice(&0xDEAD_BEEFu32.to_be_bytes());
        bogus.extend_from_slice(&0u32.to_be_bytes());
        let mut cursor = io::Cursor::new(bogus);
        assert!(matches!(codec.read_pdu(&mut cursor), Err(Error::MalformedPdu)));
    }

    #[test]
    fn truncated_stream_is_malformed() {
        let codec = PduCodec::default();
        let mut bogus = Vec::new();
        bogus.extend_from_slice(&PDU_MAGIC_PLAIN.to_be_bytes());
        bogus.extend_from_slice(&100u32.to_be_bytes());
        bogus.extend_from_slice(b"short");
        let mut cursor = io::Cursor::new(bogus);
        assert!(matches!(codec.read_pdu(&mut cursor), Err(Error::MalformedPdu)));
    }

    #[test]
    fn partial_pdu_feed_reassembles_across_fragmented_reads() {
        let codec = PduCodec::new(0);
        let payload = b"tune to 100MHz";
        let framed = codec.encode(payload).unwrap();

        let mut partial = PartialPdu::new();
        let mut result = None;
        for byte in framed.chunks(3) {
            if let Some(done) = partial.feed(byte).unwrap() {
                result = Some(done);
            }
        }
        assert_eq!(result.unwrap(), payload);
    }

    #[test]
    fn zero_length_pdu_yields_empty_payload() {
        let mut partial = PartialPdu::new();
        let mut header = Vec::new();
        header.extend_from_slice(&PDU_MAGIC_PLAIN.to_be_bytes());
        header.extend_from_slice(&0u32.to_be_bytes());
        let result = partial.feed(&header).unwrap();
        assert_eq!(result, Some(Vec::new()));
    }
}
