// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! A stand-in analyzer backend.
//!
//! The actual DSP engine (sample acquisition, FFT, channel demodulation) is
//! out of scope for this daemon; this module gives [`sdr_core::server::Supervisor`]
//! something real to dispatch to so the control-plane multiplexing can be
//! exercised end to end. It tracks one `SourceInfo` and acknowledges
//! inspector open/close requests with freshly minted handles.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::{self, JoinHandle};

use sdr_core::analyzer::{AnalyzerCommand, AnalyzerEvent, AnalyzerHandle};
use sdr_core::wire::{AnalyzerMessage, AnalyzerMsgType, SourceInfo};

/// Spawn the stub analyzer thread and hand back the handle the supervisor
/// dispatches commands through.
pub fn spawn(initial: SourceInfo) -> (AnalyzerHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = channel();
    let (event_tx, event_rx) = channel();
    let thread = thread::Builder::new()
        .name("sdr-stub-analyzer".to_string())
        .spawn(move || run(initial, cmd_rx, event_tx))
        .expect("failed to spawn stub analyzer thread");
    (AnalyzerHandle::new(cmd_tx, event_rx), thread)
}

fn run(mut source: SourceInfo, commands: Receiver<AnalyzerCommand>, events: Sender<AnalyzerEvent>) {
    let mut next_handle: u32 = 1;

    for command in commands {
        match command {
            AnalyzerCommand::SetFrequency { freq, .. } => {
                source.frequency = freq;
                let _ = events.send(AnalyzerEvent::SourceInfo(source.clone()));
            }
            AnalyzerCommand::SetBandwidth { bandwidth } => {
                source.bandwidth = bandwidth;
                let _ = events.send(AnalyzerEvent::SourceInfo(source.clone()));
            }
            AnalyzerCommand::SetGain { value, .. } => {
                source.gain = value;
                let _ = events.send(AnalyzerEvent::SourceInfo(source.clone()));
            }
            AnalyzerCommand::Inspector(msg) => handle_inspector(msg, &mut next_handle, &events),
            AnalyzerCommand::Halt => break,
            AnalyzerCommand::SetAntenna { .. }
            | AnalyzerCommand::SetPpm { .. }
            | AnalyzerCommand::SetDcRemove { .. }
            | AnalyzerCommand::SetIqReverse { .. }
            | AnalyzerCommand::SetAgc { .. }
            | AnalyzerCommand::ForceEos
            | AnalyzerCommand::SetSweepStrategy { .. }
            | AnalyzerCommand::SetSpectrumPartitioning { .. }
            | AnalyzerCommand::SetHopRange { .. }
            | AnalyzerCommand::SetBufferingSize { .. } => {
                // Tuning/sweep knobs with no observable effect on a source
                // that never actually samples anything.
            }
        }
    }

    let _ = events.send(AnalyzerEvent::Halted);
}

fn handle_inspector(msg: AnalyzerMessage, next_handle: &mut u32, events: &Sender<AnalyzerEvent>) {
    match msg.msg_type {
        AnalyzerMsgType::Open => {
            let handle = *next_handle;
            *next_handle += 1;
            let response = AnalyzerMessage {
                msg_type: AnalyzerMsgType::OpenResponse,
                handle,
                req_id: msg.req_id,
                payload: Vec::new(),
            };
            let _ = events.send(AnalyzerEvent::Inspector(response));
        }
        AnalyzerMsgType::Close => {
            // Nothing to free on this side; the supervisor's inspector
            // table owns the handle lifecycle.
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_frequency_emits_updated_source_info() {
        let (handle, _thread) = spawn(SourceInfo::default());
        handle
            .dispatch(AnalyzerCommand::SetFrequency { freq: 100.0, lnb: 0.0 })
            .unwrap();
        match handle.events.recv().unwrap() {
            AnalyzerEvent::SourceInfo(info) => assert_eq!(info.frequency, 100.0),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn open_inspector_mints_a_handle_and_echoes_req_id() {
        let (handle, _thread) = spawn(SourceInfo::default());
        let open = AnalyzerMessage {
            msg_type: AnalyzerMsgType::Open,
            handle: 0,
            req_id: 42,
            payload: Vec::new(),
        };
        handle.dispatch(AnalyzerCommand::Inspector(open)).unwrap();
        match handle.events.recv().unwrap() {
            AnalyzerEvent::Inspector(msg) => {
                assert_eq!(msg.msg_type, AnalyzerMsgType::OpenResponse);
                assert_eq!(msg.req_id, 42);
                assert_eq!(msg.handle, 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn halt_command_terminates_the_loop_and_emits_halted() {
        let (handle, thread) = spawn(SourceInfo::default());
        handle.dispatch(AnalyzerCommand::Halt).unwrap();
        assert_eq!(handle.events.recv().unwrap(), AnalyzerEvent::Halted);
        thread.join().unwrap();
    }
}
