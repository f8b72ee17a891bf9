//! SMI flit fabric — arbitration and framing for the SMI memory bus
//! protocol.
//!
//! This crate multiplexes several independent request/response memory
//! ports onto a single shared downstream port and steers the shared
//! response stream back to each transaction's originator. Traffic moves
//! as fixed-size flits ([`Flit64`]) grouped into frames delimited by a
//! nonzero completion code; frames are never interleaved on a shared
//! channel.
//!
//! Composition is entirely message passing: every component is a
//! persistent flow over `crossbeam_channel` links, with rendezvous
//! channels at the system boundary modeling hardware ready/valid
//! handshakes. A flow runs until an endpoint on the other side of one
//! of its links is dropped.
//!
//! - [`flit`] — the wire-level data model and protocol constants.
//! - [`frame_buffer`] — cut-through and store-and-forward single-frame
//!   relays.
//! - [`port_manager`] — per-port tag leasing and header substitution.
//! - [`arbiter`] — the N-port arbiter over one shared downstream port.
//!
//! # Example
//!
//! ```no_run
//! use smi_fabric::{rendezvous, Arbiter, Downstream, UpstreamPort};
//!
//! // Two upstream ports, one shared downstream port.
//! let (req_a_tx, req_a_rx) = rendezvous();
//! let (resp_a_tx, resp_a_rx) = rendezvous();
//! let (req_b_tx, req_b_rx) = rendezvous();
//! let (resp_b_tx, resp_b_rx) = rendezvous();
//! let (down_req_tx, down_req_rx) = rendezvous();
//! let (down_resp_tx, down_resp_rx) = rendezvous();
//!
//! let handle = Arbiter::spawn(
//!     vec![
//!         UpstreamPort { request: req_a_rx, response: resp_a_tx },
//!         UpstreamPort { request: req_b_rx, response: resp_b_tx },
//!     ],
//!     Downstream { request: down_req_tx, response: down_resp_rx },
//! )?;
//!
//! // ... producers drive req_a_tx / req_b_tx, the backing memory sits
//! // behind down_req_rx / down_resp_tx ...
//!
//! drop((req_a_tx, resp_a_rx, req_b_tx, resp_b_rx, down_req_rx, down_resp_tx));
//! handle.join();
//! # Ok::<(), smi_fabric::ArbiterError>(())
//! ```

pub mod arbiter;
pub mod flit;
pub mod frame_buffer;
pub mod link;
pub mod port_manager;


pub use arbiter::{Arbiter, ArbiterError, ArbiterHandle, Downstream, UpstreamPort};
pub use flit::{
    Flit64, BURST_SIZE, DEFAULT_OPTIONS, FRAME64_FLITS, IN_FLIGHT_LIMIT, MEM_OPT_UNBUFFERED,
    MEM_READ_REQ, MEM_READ_RESP, MEM_WRITE_REQ, MEM_WRITE_RESP, PORT_ID_OFFSET, TAG_OFFSET,
};
pub use frame_buffer::{assemble_frames, forward_frames};
pub use link::{rendezvous, FlitReceiver, FlitSender, LinkClosed};
pub use port_manager::PortManager;
