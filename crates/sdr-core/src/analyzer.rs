// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The analyzer boundary: the core treats the actual DSP engine (sample
//! acquisition, FFT, channel demodulation) as an opaque collaborator with a
//! fixed command set and one output queue. Everything in this module is the
//! shape of that boundary, not an implementation of the DSP itself.

use std::sync::mpsc::{Receiver, Sender};

use crate::wire::{AnalyzerMessage, RemoteCall, SourceInfo};

/// Something the server supervisor or a client asks the analyzer to do.
/// One-to-one with the tuning/control `RemoteCall` variants; `Inspector`
/// wraps the embedded analyzer sub-message unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyzerCommand {
    SetFrequency { freq: f64, lnb: f64 },
    SetGain { name: String, value: f64 },
    SetAntenna { name: String },
    SetBandwidth { bandwidth: f64 },
    SetPpm { ppm: f64 },
    SetDcRemove { enabled: bool },
    SetIqReverse { enabled: bool },
    SetAgc { enabled: bool },
    ForceEos,
    SetSweepStrategy { strategy: u32 },
    SetSpectrumPartitioning { partitions: u32 },
    SetHopRange { min: f64, max: f64 },
    SetBufferingSize { size: u32 },
    Inspector(AnalyzerMessage),
    Halt,
}

impl AnalyzerCommand {
    /// Translate a post-authentication `RemoteCall` into the command the
    /// analyzer understands, or `None` for calls that are not analyzer
    /// commands (auth/hello/startup-error are handled before dispatch).
    pub fn from_remote_call(call: RemoteCall) -> Option<Self> {
        match call {
            RemoteCall::SetFrequency { freq, lnb } => Some(Self::SetFrequency { freq, lnb }),
            RemoteCall::SetGain { name, value } => Some(Self::SetGain { name, value }),
            RemoteCall::SetAntenna(name) => Some(Self::SetAntenna { name }),
            RemoteCall::SetBandwidth(bandwidth) => Some(Self::SetBandwidth { bandwidth }),
            RemoteCall::SetPpm(ppm) => Some(Self::SetPpm { ppm }),
            RemoteCall::SetDcRemove(enabled) => Some(Self::SetDcRemove { enabled }),
            RemoteCall::SetIqReverse(enabled) => Some(Self::SetIqReverse { enabled }),
            RemoteCall::SetAgc(enabled) => Some(Self::SetAgc { enabled }),
            RemoteCall::ForceEos => Some(Self::ForceEos),
            RemoteCall::SetSweepStrategy(strategy) => Some(Self::SetSweepStrategy { strategy }),
            RemoteCall::SetSpectrumPartitioning(partitions) => {
                Some(Self::SetSpectrumPartitioning { partitions })
            }
            RemoteCall::SetHopRange { min, max } => Some(Self::SetHopRange { min, max }),
            RemoteCall::SetBufferingSize(size) => Some(Self::SetBufferingSize { size }),
            RemoteCall::AnalyzerMessage(msg) => Some(Self::Inspector(msg)),
            RemoteCall::RequestHalt => Some(Self::Halt),
            _ => None,
        }
    }
}

/// Something the analyzer emits on its output queue: either a command
/// acknowledgement/update to rebroadcast, or the halt sentinel that tells
/// the supervisor's TX thread to exit.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyzerEvent {
    SourceInfo(SourceInfo),
    Inspector(AnalyzerMessage),
    Halted,
}

/// Handle to the one live analyzer instance. Owns the command channel and
/// the receiving end of its output queue; `reported_req_id` on an
/// `AnalyzerEvent::Inspector` with `msg_type == OpenResponse` is how the
/// supervisor routes a response back to the client that opened it (the
/// `req_id` was rewritten to the client's fd on the way in).
pub struct AnalyzerHandle {
    commands: Sender<AnalyzerCommand>,
    pub events: Receiver<AnalyzerEvent>,
}

impl AnalyzerHandle {
    pub fn new(commands: Sender<AnalyzerCommand>, events: Receiver<AnalyzerEvent>) -> Self {
        Self { commands, events }
    }

    pub fn dispatch(&self, command: AnalyzerCommand) -> Result<(), AnalyzerCommand> {
        self.commands.send(command).map_err(|e| e.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_call_translates_to_the_matching_command() {
        let call = RemoteCall::SetFrequency { freq: 100.0, lnb: 0.0 };
        assert_eq!(
            AnalyzerCommand::from_remote_call(call),
            Some(AnalyzerCommand::SetFrequency { freq: 100.0, lnb: 0.0 })
        );
    }

    #[test]
    fn non_analyzer_calls_translate_to_none() {
        assert_eq!(AnalyzerCommand::from_remote_call(RemoteCall::None), None);
        assert_eq!(AnalyzerCommand::from_remote_call(RemoteCall::AuthRejected), None);
    }
}
