//! Single-frame buffering between two flit links.
//!
//! Both relays in this module decouple an input stream from an output
//! stream through a queue sized to hold one maximum-size frame
//! ([`FRAME64_FLITS`]), and both run indefinitely, one frame at a time,
//! until a link closes. They differ in when output begins:
//!
//! - [`forward_frames`] is a cut-through relay: flits start draining to
//!   the output as soon as they land in the buffer, overlapping input
//!   and output of the same frame.
//! - [`assemble_frames`] is store-and-forward: the whole frame is
//!   buffered first, and only after its terminal flit has arrived does
//!   the output side start draining. Higher latency, but the consumer
//!   never observes a partially received frame mid-transfer.
//!
//! Backpressure is inherited from the queue: a full queue blocks the
//! ingress side, and a stalled destination blocks the egress side, which
//! in turn backpressures the queue and then the source.

use crate::flit::FRAME64_FLITS;
use crate::link::{FlitReceiver, FlitSender, LinkClosed};
use crossbeam_channel::bounded;
use std::thread;

/// Relay frames from `input` to `output` with cut-through buffering.
///
/// An ingress thread copies each frame from the input into an internal
/// single-frame queue while the calling flow simultaneously drains the
/// queue to the output, so the first output flit can be observed before
/// the input frame has finished arriving.
///
/// Runs until either link closes.
pub fn forward_frames(input: FlitReceiver, output: FlitSender) -> Result<(), LinkClosed> {
    let (buffer_tx, buffer_rx) = bounded(FRAME64_FLITS);

    thread::spawn(move || -> Result<(), LinkClosed> {
        loop {
            let mut more_flits = true;
            while more_flits {
                let flit = input.recv()?;
                more_flits = !flit.is_frame_end();
                buffer_tx.send(flit)?;
            }
        }
    });

    loop {
        let mut more_flits = true;
        while more_flits {
            let flit = buffer_rx.recv()?;
            more_flits = !flit.is_frame_end();
            output.send(flit)?;
        }
    }
}

/// Relay frames from `input` to `output` with store-and-forward buffering.
///
/// Each frame is drained from the input into the internal queue in full,
/// terminal flit included, before any of it is copied to the output.
///
/// Runs until either link closes.
pub fn assemble_frames(input: FlitReceiver, output: FlitSender) -> Result<(), LinkClosed> {
    let (buffer_tx, buffer_rx) = bounded(FRAME64_FLITS);

    loop {
        let mut more_flits = true;
        while more_flits {
            let flit = input.recv()?;
            more_flits = !flit.is_frame_end();
            buffer_tx.send(flit)?;
        }

        let mut more_flits = true;
        while more_flits {
            let flit = buffer_rx.recv()?;
            more_flits = !flit.is_frame_end();
            output.send(flit)?;
        }
    }
}
