// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `RemoteCall`: the tagged union exchanged on the control channel.
//!
//! Every operation a client can ask of the analyzer, and every notification
//! the server can push back, is one variant here. The wire encoding is a
//! `u32` type tag followed by tag-specific fields; the only contract is
//! `decode(encode(x)) == x` for every valid `x`.

use crate::error::{Error, Result};
use crate::wire::cursor::{Reader, Writer};

const TAG_NONE: u32 = 0;
const TAG_CLIENT_AUTH: u32 = 1;
const TAG_SOURCE_INFO: u32 = 2;
const TAG_SET_FREQUENCY: u32 = 3;
const TAG_SET_GAIN: u32 = 4;
const TAG_SET_ANTENNA: u32 = 5;
const TAG_SET_BANDWIDTH: u32 = 6;
const TAG_SET_PPM: u32 = 7;
const TAG_SET_DC_REMOVE: u32 = 8;
const TAG_SET_IQ_REVERSE: u32 = 9;
const TAG_SET_AGC: u32 = 10;
const TAG_FORCE_EOS: u32 = 11;
const TAG_SET_SWEEP_STRATEGY: u32 = 12;
const TAG_SET_SPECTRUM_PARTITIONING: u32 = 13;
const TAG_SET_HOP_RANGE: u32 = 14;
const TAG_SET_BUFFERING_SIZE: u32 = 15;
const TAG_ANALYZER_MESSAGE: u32 = 16;
const TAG_REQUEST_HALT: u32 = 17;
const TAG_AUTH_REJECTED: u32 = 18;
const TAG_STARTUP_ERROR: u32 = 19;
const TAG_SERVER_HELLO: u32 = 20;

/// `client-auth` call payload: `{client_name, version, user, sha256token, flags}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientAuth {
    pub client_name: String,
    pub protocol_major: u8,
    pub protocol_minor: u8,
    pub user: String,
    pub sha256_token: [u8; 32],
    pub flags: u32,
}

/// `server-hello` payload: `{server_name, protocol_version, auth_mode, enc_type, salt, flags}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerHello {
    pub server_name: String,
    pub protocol_major: u8,
    pub protocol_minor: u8,
    pub auth_mode: u8,
    pub enc_type: u8,
    pub sha256_salt: [u8; 32],
    pub flags: u32,
    pub multicast_addr: Option<(u32, u16)>,
}

/// Snapshot of the current source/analyzer state, sent on auth success.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceInfo {
    pub sample_rate: f64,
    pub frequency: f64,
    pub bandwidth: f64,
    pub gain: f64,
}

/// An embedded analyzer sub-message: inspector lifecycle and data frames.
///
/// `handle` is the field the server supervisor rewrites in place when
/// translating between a client-private handle and the analyzer's global
/// one (see the inspector interception rules in the component design).
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerMessage {
    pub msg_type: AnalyzerMsgType,
    pub handle: u32,
    pub req_id: u32,
    pub payload: Vec<u8>,
}

/// Closed set of inspector-lifecycle message kinds the supervisor must
/// recognize to apply its interception rules; anything else passes through
/// as opaque inspector data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerMsgType {
    Open,
    OpenResponse,
    SetId,
    Close,
    InvalidChannel,
    WrongHandle,
    Data,
    Other(u32),
}

impl AnalyzerMsgType {
    fn to_u32(self) -> u32 {
        match self {
            AnalyzerMsgType::Open => 0,
            AnalyzerMsgType::OpenResponse => 1,
            AnalyzerMsgType::SetId => 2,
            AnalyzerMsgType::Close => 3,
            AnalyzerMsgType::InvalidChannel => 4,
            AnalyzerMsgType::WrongHandle => 5,
            AnalyzerMsgType::Data => 6,
            AnalyzerMsgType::Other(code) => code,
        }
    }

    fn from_u32(code: u32) -> Self {
        match code {
            0 => AnalyzerMsgType::Open,
            1 => AnalyzerMsgType::OpenResponse,
            2 => AnalyzerMsgType::SetId,
            3 => AnalyzerMsgType::Close,
            4 => AnalyzerMsgType::InvalidChannel,
            5 => AnalyzerMsgType::WrongHandle,
            6 => AnalyzerMsgType::Data,
            other => AnalyzerMsgType::Other(other),
        }
    }
}

/// Every operation exchanged on the control channel.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    /// Default call produced by a zero-length PDU; otherwise a no-op.
    None,
    ClientAuth(ClientAuth),
    ServerHello(ServerHello),
    SourceInfo(SourceInfo),
    SetFrequency { freq: f64, lnb: f64 },
    SetGain { name: String, value: f64 },
    SetAntenna(String),
    SetBandwidth(f64),
    SetPpm(f64),
    SetDcRemove(bool),
    SetIqReverse(bool),
    SetAgc(bool),
    ForceEos,
    SetSweepStrategy(u32),
    SetSpectrumPartitioning(u32),
    SetHopRange { min: f64, max: f64 },
    SetBufferingSize(u32),
    AnalyzerMessage(AnalyzerMessage),
    RequestHalt,
    AuthRejected,
    StartupError(String),
}

impl RemoteCall {
    pub fn serialize(&self) -> Vec<u8> {
        let mut w = Writer::new();
        match self {
            RemoteCall::None => w.write_u32(TAG_NONE),
            RemoteCall::ClientAuth(auth) => {
                w.write_u32(TAG_CLIENT_AUTH);
                w.write_str(&auth.client_name);
                w.write_u8(auth.protocol_major);
                w.write_u8(auth.protocol_minor);
                w.write_str(&auth.user);
                w.write_bytes(&auth.sha256_token);
                w.write_u32(auth.flags);
            }
            RemoteCall::ServerHello(hello) => {
                w.write_u32(TAG_SERVER_HELLO);
                w.write_str(&hello.server_name);
                w.write_u8(hello.protocol_major);
                w.write_u8(hello.protocol_minor);
                w.write_u8(hello.auth_mode);
                w.write_u8(hello.enc_type);
                w.write_bytes(&hello.sha256_salt);
                w.write_u32(hello.flags);
                match hello.multicast_addr {
                    Some((addr, port)) => {
                        w.write_bool(true);
                        w.write_u32(addr);
                        w.write_u16(port);
                    }
                    None => w.write_bool(false),
                }
            }
            RemoteCall::SourceInfo(info) => {
                w.write_u32(TAG_SOURCE_INFO);
                w.write_f64(info.sample_rate);
                w.write_f64(info.frequency);
                w.write_f64(info.bandwidth);
                w.write_f64(info.gain);
            }
            RemoteCall::SetFrequency { freq, lnb } => {
                w.write_u32(TAG_SET_FREQUENCY);
                w.write_f64(*freq);
                w.write_f64(*lnb);
            }
            RemoteCall::SetGain { name, value } => {
                w.write_u32(TAG_SET_GAIN);
                w.write_str(name);
                w.write_f64(*value);
            }
            RemoteCall::SetAntenna(name) => {
                w.write_u32(TAG_SET_ANTENNA);
                w.write_str(name);
            }
            RemoteCall::SetBandwidth(bw) => {
                w.write_u32(TAG_SET_BANDWIDTH);
                w.write_f64(*bw);
            }
            RemoteCall::SetPpm(ppm) => {
                w.write_u32(TAG_SET_PPM);
                w.write_f64(*ppm);
            }
            RemoteCall::SetDcRemove(on) => {
                w.write_u32(TAG_SET_DC_REMOVE);
                w.write_bool(*on);
            }
            RemoteCall::SetIqReverse(on) => {
                w.write_u32(TAG_SET_IQ_REVERSE);
                w.write_bool(*on);
            }
            RemoteCall::SetAgc(on) => {
                w.write_u32(TAG_SET_AGC);
                w.write_bool(*on);
            }
            RemoteCall::ForceEos => w.write_u32(TAG_FORCE_EOS),
            RemoteCall::SetSweepStrategy(strategy) => {
                w.write_u32(TAG_SET_SWEEP_STRATEGY);
                w.write_u32(*strategy);
            }
            RemoteCall::SetSpectrumPartitioning(partitioning) => {
                w.write_u32(TAG_SET_SPECTRUM_PARTITIONING);
                w.write_u32(*partitioning);
            }
            RemoteCall::SetHopRange { min, max } => {
                w.write_u32(TAG_SET_HOP_RANGE);
                w.write_f64(*min);
                w.write_f64(*max);
            }
            RemoteCall::SetBufferingSize(size) => {
                w.write_u32(TAG_SET_BUFFERING_SIZE);
                w.write_u32(*size);
            }
            RemoteCall::AnalyzerMessage(msg) => {
                w.write_u32(TAG_ANALYZER_MESSAGE);
                w.write_u32(msg.msg_type.to_u32());
                w.write_u32(msg.handle);
                w.write_u32(msg.req_id);
                w.write_bytes(&msg.payload);
            }
            RemoteCall::RequestHalt => w.write_u32(TAG_REQUEST_HALT),
            RemoteCall::AuthRejected => w.write_u32(TAG_AUTH_REJECTED),
            RemoteCall::StartupError(reason) => {
                w.write_u32(TAG_STARTUP_ERROR);
                w.write_str(reason);
            }
        }
        w.into_vec()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(RemoteCall::None);
        }
        let mut r = Reader::new(bytes);
        let tag = r.read_u32()?;
        Ok(match tag {
            TAG_NONE => RemoteCall::None,
            TAG_CLIENT_AUTH => RemoteCall::ClientAuth(ClientAuth {
                client_name: r.read_str()?,
                protocol_major: r.read_u8()?,
                protocol_minor: r.read_u8()?,
                user: r.read_str()?,
                sha256_token: read_token(&mut r)?,
                flags: r.read_u32()?,
            }),
            TAG_SERVER_HELLO => {
                let server_name = r.read_str()?;
                let protocol_major = r.read_u8()?;
                let protocol_minor = r.read_u8()?;
                let auth_mode = r.read_u8()?;
                let enc_type = r.read_u8()?;
                let sha256_salt = read_token(&mut r)?;
                let flags = r.read_u32()?;
                let multicast_addr = if r.read_bool()? {
                    Some((r.read_u32()?, r.read_u16()?))
                } else {
                    None
                };
                RemoteCall::ServerHello(ServerHello {
                    server_name,
                    protocol_major,
                    protocol_minor,
                    auth_mode,
                    enc_type,
                    sha256_salt,
                    flags,
                    multicast_addr,
                })
            }
            TAG_SOURCE_INFO => RemoteCall::SourceInfo(SourceInfo {
                sample_rate: r.read_f64()?,
                frequency: r.read_f64()?,
                bandwidth: r.read_f64()?,
                gain: r.read_f64()?,
            }),
            TAG_SET_FREQUENCY => RemoteCall::SetFrequency {
                freq: r.read_f64()?,
                lnb: r.read_f64()?,
            },
            TAG_SET_GAIN => RemoteCall::SetGain {
                name: r.read_str()?,
                value: r.read_f64()?,
            },
            TAG_SET_ANTENNA => RemoteCall::SetAntenna(r.read_str()?),
            TAG_SET_BANDWIDTH => RemoteCall::SetBandwidth(r.read_f64()?),
            TAG_SET_PPM => RemoteCall::SetPpm(r.read_f64()?),
            TAG_SET_DC_REMOVE => RemoteCall::SetDcRemove(r.read_bool()?),
            TAG_SET_IQ_REVERSE => RemoteCall::SetIqReverse(r.read_bool()?),
            TAG_SET_AGC => RemoteCall::SetAgc(r.read_bool()?),
            TAG_FORCE_EOS => RemoteCall::ForceEos,
            TAG_SET_SWEEP_STRATEGY => RemoteCall::SetSweepStrategy(r.read_u32()?),
            TAG_SET_SPECTRUM_PARTITIONING => RemoteCall::SetSpectrumPartitioning(r.read_u32()?),
            TAG_SET_HOP_RANGE => RemoteCall::SetHopRange {
                min: r.read_f64()?,
                max: r.read_f64()?,
            },
            TAG_SET_BUFFERING_SIZE => RemoteCall::SetBufferingSize(r.read_u32()?),
            TAG_ANALYZER_MESSAGE => RemoteCall::AnalyzerMessage(AnalyzerMessage {
                msg_type: AnalyzerMsgType::from_u32(r.read_u32()?),
                handle: r.read_u32()?,
                req_id: r.read_u32()?,
                payload: r.read_bytes()?,
            }),
            TAG_REQUEST_HALT => RemoteCall::RequestHalt,
            TAG_AUTH_REJECTED => RemoteCall::AuthRejected,
            TAG_STARTUP_ERROR => RemoteCall::StartupError(r.read_str()?),
            _ => return Err(Error::MalformedPdu),
        })
    }
}

fn read_token(r: &mut Reader<'_>) -> Result<[u8; 32]> {
    let bytes = r.read_bytes()?;
    bytes.try_into().map_err(|_| Error::MalformedPdu)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(call: RemoteCall) {
        let bytes = call.serialize();
        let decoded = RemoteCall::deserialize(&bytes).unwrap();
        assert_eq!(decoded, call);
    }

    #[test]
    fn set_frequency_round_trips() {
        round_trip(RemoteCall::SetFrequency {
            freq: 100_000_000.0,
            lnb: 0.0,
        });
    }

    #[test]
    fn client_auth_round_trips() {
        round_trip(RemoteCall::ClientAuth(ClientAuth {
            client_name: "probe".into(),
            protocol_major: 0,
            protocol_minor: 1,
            user: "u".into(),
            sha256_token: [0x42; 32],
            flags: 1,
        }));
    }

    #[test]
    fn analyzer_message_round_trips_with_handle() {
        round_trip(RemoteCall::AnalyzerMessage(AnalyzerMessage {
            msg_type: AnalyzerMsgType::Open,
            handle: 0xDEAD_BEEF,
            req_id: 7,
            payload: vec![1, 2, 3, 4],
        }));
    }

    #[test]
    fn empty_payload_deserializes_to_none() {
        assert_eq!(RemoteCall::deserialize(&[]).unwrap(), RemoteCall::None);
    }

    #[test]
    fn unknown_tag_is_malformed() {
        let mut w = Writer::new();
        w.write_u32(0xFFFF_FFFF);
        assert!(matches!(
            RemoteCall::deserialize(&w.into_vec()),
            Err(Error::MalformedPdu)
        ));
    }

    #[test]
    fn server_hello_without_multicast_round_trips() {
        round_trip(RemoteCall::ServerHello(ServerHello {
            server_name: "sdr-serverd".into(),
            protocol_major: 0,
            protocol_minor: 1,
            auth_mode: 1,
            enc_type: 0,
            sha256_salt: [0u8; 32],
            flags: 0,
            multicast_addr: None,
        }));
    }
}
