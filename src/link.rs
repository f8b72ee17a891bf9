//! Channel plumbing for flit streams.
//!
//! Every connection in the fabric is a `crossbeam_channel` carrying
//! [`Flit64`] values. External links are rendezvous channels (a send
//! blocks until a matching receive is ready), modeling the hardware
//! ready/valid handshake; internal links use small fixed capacities.
//!
//! The fabric's persistent flows run until a channel endpoint on the
//! other side is dropped, at which point they return [`LinkClosed`].
//! That is a process-lifecycle signal, not a protocol error: the SMI
//! arbitration layer itself has no error path.

use crate::flit::Flit64;
use crossbeam_channel::{bounded, Receiver, RecvError, SendError, Sender};

/// Sending half of a flit stream.
pub type FlitSender = Sender<Flit64>;

/// Receiving half of a flit stream.
pub type FlitReceiver = Receiver<Flit64>;

/// Create a rendezvous flit channel: a send blocks until the receiver
/// is ready, like an unbuffered hardware handshake.
pub fn rendezvous() -> (FlitSender, FlitReceiver) {
    bounded(0)
}

/// A channel endpoint was dropped while a fabric flow was still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("flit link closed")]
pub struct LinkClosed;

impl<T> From<SendError<T>> for LinkClosed {
    fn from(_: SendError<T>) -> Self {
        LinkClosed
    }
}

impl From<RecvError> for LinkClosed {
    fn from(_: RecvError) -> Self {
        LinkClosed
    }
}
