//! N-port arbitration onto a shared downstream SMI port.
//!
//! The arbiter multiplexes any number of upstream ports onto one shared
//! downstream request channel with frame atomicity, and steers the shared
//! downstream response stream back to the originating port. Tag matching
//! and substitution on bytes 2 and 3 of each header (see
//! [`PortManager`]) ensures response frames reach the source of the
//! original request even though the downstream path carries interleaved
//! traffic from every port.
//!
//! ```text
//! ┌────────┐ ┌────────┐ ┌────────┐
//! │ port 1 │ │ port 2 │ │ port N │   upstream req/resp pairs
//! └───┬────┘ └───┬────┘ └───┬────┘
//!     ▼          ▼          ▼
//! ┌──────────────────────────────┐
//! │  PortManager per port        │   tag lease / substitution
//! │  • tagged request + ready    │
//! │  • tagged response           │
//! └───┬──────────┬──────────┬───┘
//!     ▼          ▼          ▼
//! ┌──────────────────────────────┐
//! │  Arbiter                     │
//! │  • request mux: one full     │
//! │    frame at a time           │
//! │  • response demux: route by  │
//! │    header port id            │
//! └──────────────┬───────────────┘
//!                ▼
//!         shared downstream
//! ```
//!
//! Arbitration among simultaneously ready ports is deliberately
//! unspecified: no fairness or ordering guarantee is made. Once a port
//! is granted, its entire frame drains before the next grant, so a slow
//! producer holds the shared channel for the duration of its frame
//! (head-of-line blocking, inherent to the no-interleave invariant).

use crate::flit::PORT_ID_OFFSET;
use crate::link::{FlitReceiver, FlitSender, LinkClosed};
use crate::port_manager::PortManager;
use crossbeam_channel::{bounded, Receiver, Select};
use std::thread::{self, JoinHandle};

/// Fabric-side channel ends of one upstream port.
pub struct UpstreamPort {
    /// Requests flowing from the upstream producer into the fabric.
    pub request: FlitReceiver,
    /// Responses flowing from the fabric back to the upstream consumer.
    pub response: FlitSender,
}

/// Channel ends of the shared downstream port.
pub struct Downstream {
    /// Multiplexed requests toward the backing memory or interconnect.
    pub request: FlitSender,
    /// Responses coming back from the backing memory or interconnect.
    pub response: FlitReceiver,
}

/// Errors raised while wiring an arbiter. Once running, the fabric has
/// no protocol error path; misrouted responses are silently discarded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArbiterError {
    #[error("arbiter requires at least one upstream port")]
    NoPorts,

    #[error("{0} upstream ports exceed the port id byte (max 255)")]
    TooManyPorts(usize),
}

/// Handle over the threads of a running arbiter instance.
///
/// The fabric runs until its external endpoints are dropped: closing the
/// upstream request senders and the downstream channel ends unwinds
/// every flow, after which [`join`](ArbiterHandle::join) returns.
#[derive(Debug)]
pub struct ArbiterHandle {
    threads: Vec<JoinHandle<()>>,
}

impl ArbiterHandle {
    /// Wait for every fabric thread to finish.
    pub fn join(self) {
        for handle in self.threads {
            let _ = handle.join();
        }
    }
}

/// SMI bus arbiter between N upstream ports and one downstream port.
pub struct Arbiter;

impl Arbiter {
    /// Wire and start an arbiter over the given upstream ports.
    ///
    /// Ports are assigned ids 1..=N in order; 0 stays reserved as the
    /// "no routing information" value. One [`PortManager`] thread is
    /// spawned per port, plus a request mux thread and a response demux
    /// thread. All threads run until their links close.
    pub fn spawn(ports: Vec<UpstreamPort>, downstream: Downstream) -> Result<ArbiterHandle, ArbiterError> {
        if ports.is_empty() {
            return Err(ArbiterError::NoPorts);
        }
        if ports.len() > u8::MAX as usize {
            return Err(ArbiterError::TooManyPorts(ports.len()));
        }

        let mut threads = Vec::with_capacity(ports.len() + 2);
        let mut ready_signals = Vec::with_capacity(ports.len());
        let mut tagged_requests = Vec::with_capacity(ports.len());
        let mut tagged_responses = Vec::with_capacity(ports.len());

        for (index, port) in ports.into_iter().enumerate() {
            let (tagged_request_tx, tagged_request_rx) = bounded(1);
            let (tagged_response_tx, tagged_response_rx) = bounded(1);
            let (ready_tx, ready_rx) = bounded(1);

            let manager = PortManager::new(
                port.request,
                port.response,
                tagged_request_tx,
                tagged_response_rx,
                ready_tx,
                (index + 1) as u8,
            );
            threads.push(thread::spawn(move || {
                let _ = manager.run();
            }));

            ready_signals.push(ready_rx);
            tagged_requests.push(tagged_request_rx);
            tagged_responses.push(tagged_response_tx);
        }

        let downstream_request = downstream.request;
        threads.push(thread::spawn(move || {
            let _ = mux_requests(&ready_signals, &tagged_requests, &downstream_request);
        }));

        let downstream_response = downstream.response;
        threads.push(thread::spawn(move || {
            let _ = demux_responses(&downstream_response, &tagged_responses);
        }));

        Ok(ArbiterHandle { threads })
    }
}

/// Request side: wait for any port to signal a pending frame, then copy
/// that port's frame to the downstream channel in full before selecting
/// again. No other port's flits may slip in mid-frame.
fn mux_requests(
    ready_signals: &[Receiver<u8>],
    tagged_requests: &[FlitReceiver],
    downstream_request: &FlitSender,
) -> Result<(), LinkClosed> {
    let mut select = Select::new();
    for ready in ready_signals {
        select.recv(ready);
    }

    loop {
        let oper = select.select();
        let index = oper.index();
        let port_id = oper.recv(&ready_signals[index])?;
        log::trace!("arbiter: granted port {}", port_id);

        let source = &tagged_requests[index];
        let mut more_flits = true;
        while more_flits {
            let flit = source.recv()?;
            more_flits = !flit.is_frame_end();
            downstream_request.send(flit)?;
        }
    }
}

/// Response side: latch the port id from each frame header and route
/// every flit of the frame to that port's tagged-response channel. A
/// port id that matches no configured port drops the flit on the floor;
/// the demux keeps running.
fn demux_responses(
    downstream_response: &FlitReceiver,
    tagged_responses: &[FlitSender],
) -> Result<(), LinkClosed> {
    let mut port_id = 0u8;
    let mut expecting_header = true;

    loop {
        let flit = downstream_response.recv()?;
        if expecting_header {
            port_id = flit.data[PORT_ID_OFFSET];
        }
        match usize::from(port_id)
            .checked_sub(1)
            .and_then(|index| tagged_responses.get(index))
        {
            Some(target) => target.send(flit)?,
            None => log::trace!("arbiter: discarding flit with unroutable port id {}", port_id),
        }
        expecting_header = flit.is_frame_end();
    }
}
