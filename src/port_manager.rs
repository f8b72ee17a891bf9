//! Per-port transaction management for arbitrated upstream ports.
//!
//! A [`PortManager`] bridges one upstream request/response channel pair to
//! the arbiter's internal tagged channel pair. Because the shared
//! downstream path reuses tag values across ports, the manager performs
//! tag substitution on the way down and restores the original bytes on
//! the way back up:
//!
//! - **Request flow** (own thread): for each frame, lease a local tag,
//!   save the header's original bytes at offsets 2 and 3 in the tag
//!   table, overwrite them with `{port id, tag}`, announce the frame on
//!   the transfer-ready channel, and forward the frame.
//! - **Response flow** (the manager's main flow): for each frame, look
//!   the tag up, restore the saved bytes, return the tag to the pool and
//!   forward the frame upstream.
//!
//! The tag pool is a channel preloaded with [`IN_FLIGHT_LIMIT`] tags;
//! leasing blocks once all tags are outstanding, which is the in-flight
//! backpressure point of the protocol. A matching response is the only
//! thing that reclaims a tag — there is no timeout or retry at this
//! layer.

use crate::flit::{IN_FLIGHT_LIMIT, PORT_ID_OFFSET, TAG_OFFSET};
use crate::link::{FlitReceiver, FlitSender, LinkClosed};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

/// Original header bytes displaced by tag substitution, indexed by the
/// leased tag. Lower holds offset 2, upper holds offset 3.
#[derive(Debug, Clone, Copy, Default)]
struct TagEntry {
    lower: u8,
    upper: u8,
}

type TagTable = Arc<Mutex<[TagEntry; IN_FLIGHT_LIMIT]>>;

/// Transaction manager for one arbitrated upstream port.
pub struct PortManager {
    upstream_request: FlitReceiver,
    upstream_response: FlitSender,
    tagged_request: FlitSender,
    tagged_response: FlitReceiver,
    transfer_ready: Sender<u8>,
    port_id: u8,
}

impl PortManager {
    /// Wire a manager between one upstream channel pair and the
    /// arbiter-facing tagged channel pair. `port_id` is this port's
    /// identity as embedded in downstream headers (1-based; 0 is the
    /// reserved "no route" value).
    pub fn new(
        upstream_request: FlitReceiver,
        upstream_response: FlitSender,
        tagged_request: FlitSender,
        tagged_response: FlitReceiver,
        transfer_ready: Sender<u8>,
        port_id: u8,
    ) -> Self {
        PortManager {
            upstream_request,
            upstream_response,
            tagged_request,
            tagged_response,
            transfer_ready,
            port_id,
        }
    }

    /// Run both flows of the manager until a link closes.
    ///
    /// The request flow runs on its own thread; the response flow runs
    /// on the calling thread. The pool sender/receiver halves are split
    /// between the two flows so leasing and release never contend.
    pub fn run(self) -> Result<(), LinkClosed> {
        let tag_table: TagTable = Arc::default();
        let (tag_return, tag_lease) = bounded(IN_FLIGHT_LIMIT);
        for tag in 0..IN_FLIGHT_LIMIT as u8 {
            // Preloading an empty pool-sized channel cannot block.
            tag_return.send(tag)?;
        }

        let request_flow = RequestFlow {
            upstream_request: self.upstream_request,
            tagged_request: self.tagged_request,
            transfer_ready: self.transfer_ready,
            tag_lease,
            tag_table: Arc::clone(&tag_table),
            port_id: self.port_id,
        };
        thread::spawn(move || {
            let _ = request_flow.run();
        });

        let response_flow = ResponseFlow {
            tagged_response: self.tagged_response,
            upstream_response: self.upstream_response,
            tag_return,
            tag_table,
            port_id: self.port_id,
        };
        response_flow.run()
    }
}

struct RequestFlow {
    upstream_request: FlitReceiver,
    tagged_request: FlitSender,
    transfer_ready: Sender<u8>,
    tag_lease: Receiver<u8>,
    tag_table: TagTable,
    port_id: u8,
}

impl RequestFlow {
    fn run(self) -> Result<(), LinkClosed> {
        loop {
            // Tag replacement on the header. Leasing blocks while all
            // tags are outstanding.
            let mut header = self.upstream_request.recv()?;
            let tag = self.tag_lease.recv()?;
            {
                let mut table = self.tag_table.lock().unwrap();
                table[tag as usize] = TagEntry {
                    lower: header.data[PORT_ID_OFFSET],
                    upper: header.data[TAG_OFFSET],
                };
            }
            header.data[PORT_ID_OFFSET] = self.port_id;
            header.data[TAG_OFFSET] = tag;
            log::trace!("port {}: leased tag {} for request frame", self.port_id, tag);

            self.transfer_ready.send(self.port_id)?;
            self.tagged_request.send(header)?;

            // Copy the remaining body flits unmodified.
            let mut more_flits = !header.is_frame_end();
            while more_flits {
                let body = self.upstream_request.recv()?;
                more_flits = !body.is_frame_end();
                self.tagged_request.send(body)?;
            }
        }
    }
}

struct ResponseFlow {
    tagged_response: FlitReceiver,
    upstream_response: FlitSender,
    tag_return: Sender<u8>,
    tag_table: TagTable,
    port_id: u8,
}

impl ResponseFlow {
    fn run(self) -> Result<(), LinkClosed> {
        loop {
            // Extract the tag from the header and restore the bytes it
            // displaced. A tag that was never issued is undefined input
            // and is not checked here.
            let mut header = self.tagged_response.recv()?;
            let tag = header.data[TAG_OFFSET];
            let entry = self.tag_table.lock().unwrap()[tag as usize];
            header.data[PORT_ID_OFFSET] = entry.lower;
            header.data[TAG_OFFSET] = entry.upper;
            self.tag_return.send(tag)?;
            log::trace!("port {}: released tag {} on response frame", self.port_id, tag);

            self.upstream_response.send(header)?;

            let mut more_flits = !header.is_frame_end();
            while more_flits {
                let body = self.tagged_response.recv()?;
                more_flits = !body.is_frame_end();
                self.upstream_response.send(body)?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flit::Flit64;
    use std::collections::HashSet;
    use std::time::Duration;

    struct Harness {
        upstream_request: FlitSender,
        upstream_response: FlitReceiver,
        tagged_request: FlitReceiver,
        tagged_response: FlitSender,
        transfer_ready: Receiver<u8>,
    }

    // Buffered test channels so the harness can inspect traffic without
    // running a live arbiter on the other side.
    fn spawn_manager(port_id: u8) -> Harness {
        let (up_req_tx, up_req_rx) = bounded(16);
        let (up_resp_tx, up_resp_rx) = bounded(16);
        let (tag_req_tx, tag_req_rx) = bounded(16);
        let (tag_resp_tx, tag_resp_rx) = bounded(16);
        let (ready_tx, ready_rx) = bounded(16);

        let manager = PortManager::new(
            up_req_rx, up_resp_tx, tag_req_tx, tag_resp_rx, ready_tx, port_id,
        );
        thread::spawn(move || {
            let _ = manager.run();
        });

        Harness {
            upstream_request: up_req_tx,
            upstream_response: up_resp_rx,
            tagged_request: tag_req_rx,
            tagged_response: tag_resp_tx,
            transfer_ready: ready_rx,
        }
    }

    fn request_header(lower: u8, upper: u8, eofc: u8) -> Flit64 {
        let mut data = [0u8; 8];
        data[PORT_ID_OFFSET] = lower;
        data[TAG_OFFSET] = upper;
        Flit64 { data, eofc }
    }

    #[test]
    fn header_bytes_survive_the_round_trip() {
        let h = spawn_manager(3);

        h.upstream_request.send(request_header(0xAA, 0xBB, 1)).unwrap();

        assert_eq!(h.transfer_ready.recv_timeout(Duration::from_secs(2)).unwrap(), 3);
        let tagged = h.tagged_request.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(tagged.data[PORT_ID_OFFSET], 3);
        assert!((tagged.data[TAG_OFFSET] as usize) < IN_FLIGHT_LIMIT);

        // Echo the substituted header back as the response.
        h.tagged_response.send(tagged).unwrap();
        let restored = h.upstream_response.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(restored.data[PORT_ID_OFFSET], 0xAA);
        assert_eq!(restored.data[TAG_OFFSET], 0xBB);
    }

    #[test]
    fn four_transactions_in_flight_then_fifth_blocks() {
        let h = spawn_manager(1);

        for i in 0..5u8 {
            h.upstream_request.send(request_header(0x10 + i, 0x20 + i, 1)).unwrap();
        }

        // Exactly four substituted headers come through, with distinct tags.
        let mut tags = HashSet::new();
        let mut first = None;
        for _ in 0..IN_FLIGHT_LIMIT {
            let tagged = h.tagged_request.recv_timeout(Duration::from_secs(2)).unwrap();
            tags.insert(tagged.data[TAG_OFFSET]);
            first.get_or_insert(tagged);
        }
        assert_eq!(tags.len(), IN_FLIGHT_LIMIT);
        assert!(h.tagged_request.recv_timeout(Duration::from_millis(100)).is_err());

        // Completing one transaction frees its tag for the fifth request.
        h.tagged_response.send(first.unwrap()).unwrap();
        let fifth = h.tagged_request.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(tags.contains(&fifth.data[TAG_OFFSET]));
        let restored = h.upstream_response.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(restored.data[PORT_ID_OFFSET], 0x10);
        assert_eq!(restored.data[TAG_OFFSET], 0x20);
    }

    #[test]
    fn body_flits_pass_through_unmodified() {
        let h = spawn_manager(2);

        h.upstream_request.send(request_header(9, 9, 0)).unwrap();
        h.upstream_request.send(Flit64::body([0x55; 8])).unwrap();
        h.upstream_request.send(Flit64::terminal([0x66; 8], 4)).unwrap();

        let header = h.tagged_request.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(h.tagged_request.recv_timeout(Duration::from_secs(2)).unwrap(),
                   Flit64::body([0x55; 8]));
        assert_eq!(h.tagged_request.recv_timeout(Duration::from_secs(2)).unwrap(),
                   Flit64::terminal([0x66; 8], 4));

        // One ready signal per frame, not per flit.
        assert_eq!(h.transfer_ready.recv_timeout(Duration::from_secs(2)).unwrap(), 2);
        assert!(h.transfer_ready.recv_timeout(Duration::from_millis(100)).is_err());

        // Response body flits are forwarded untouched as well.
        let mut response = header;
        response.eofc = 0;
        h.tagged_response.send(response).unwrap();
        h.tagged_response.send(Flit64::terminal([0x77; 8], 2)).unwrap();
        let _restored_header = h.upstream_response.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(h.upstream_response.recv_timeout(Duration::from_secs(2)).unwrap(),
                   Flit64::terminal([0x77; 8], 2));
    }

    #[test]
    fn tags_are_reused_after_release() {
        let h = spawn_manager(1);

        for round in 0..3 {
            h.upstream_request.send(request_header(round, round, 1)).unwrap();
            let tagged = h.tagged_request.recv_timeout(Duration::from_secs(2)).unwrap();
            h.tagged_response.send(tagged).unwrap();
            let restored = h.upstream_response.recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!(restored.data[PORT_ID_OFFSET], round);
        }
    }
}
