//! Flit and frame model for the SMI memory bus protocol.
//!
//! The atomic unit of transfer is the [`Flit64`]: a fixed 8-byte payload
//! plus a 1-byte "end of frame" completion code. A *frame* is an ordered
//! run of flits starting with a header flit and ending at the first flit
//! (inclusive) whose completion code is nonzero.
//!
//! ## Flit format
//!
//! ```text
//! ┌──────────────────────────────────────────────┬───────────┐
//! │  data[0..8]: payload (64-bit datapath)       │  eofc: u8 │
//! └──────────────────────────────────────────────┴───────────┘
//! ```
//!
//! `eofc == 0` means more flits belong to this frame. A nonzero value
//! marks the terminal flit; in the full protocol it encodes the number of
//! valid bytes in that flit, which this crate treats as opaque and passes
//! through unmodified.
//!
//! ## Header flits
//!
//! The first flit of a frame carries routing metadata at fixed payload
//! offsets: the arbitration layer writes the upstream port id at
//! [`PORT_ID_OFFSET`] and the locally leased tag at [`TAG_OFFSET`] of
//! every downstream request header, and matching responses carry the same
//! bytes back at the same offsets. Every other byte of every flit is
//! opaque payload and is forwarded unchanged.

/// SMI memory write request frame type byte.
pub const MEM_WRITE_REQ: u8 = 0x01;

/// SMI memory write response frame type byte.
pub const MEM_WRITE_RESP: u8 = 0xFE;

/// SMI memory read request frame type byte.
pub const MEM_READ_REQ: u8 = 0x02;

/// SMI memory read response frame type byte.
pub const MEM_READ_RESP: u8 = 0xFD;

/// Default buffered read or write access.
pub const DEFAULT_OPTIONS: u8 = 0x00;

/// Perform a direct unbuffered read or write.
pub const MEM_OPT_UNBUFFERED: u8 = 0x01;

/// Standard burst fragment size in bytes.
pub const BURST_SIZE: usize = 256;

/// Maximum frame size in flits: one burst of payload at 8 bytes per flit
/// plus up to 16 bytes of header information.
pub const FRAME64_FLITS: usize = 2 + BURST_SIZE / 8;

/// Number of in-flight transactions supported by each arbitrated port.
pub const IN_FLIGHT_LIMIT: usize = 4;

/// Header payload offset carrying the upstream port id.
pub const PORT_ID_OFFSET: usize = 2;

/// Header payload offset carrying the substituted transaction tag.
pub const TAG_OFFSET: usize = 3;

/// An SMI flit with a 64-bit datapath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flit64 {
    /// Payload bytes.
    pub data: [u8; 8],
    /// End-of-frame completion code. Zero means more flits follow.
    pub eofc: u8,
}

impl Flit64 {
    /// A body flit with more flits following it in the same frame.
    pub fn body(data: [u8; 8]) -> Self {
        Flit64 { data, eofc: 0 }
    }

    /// The terminal flit of a frame. `eofc` must be nonzero.
    pub fn terminal(data: [u8; 8], eofc: u8) -> Self {
        debug_assert!(eofc != 0);
        Flit64 { data, eofc }
    }

    /// True when this flit is the last flit of its frame.
    ///
    /// This predicate is the only interpretation the fabric places on the
    /// completion code; the nonzero value itself is carried through opaque.
    pub fn is_frame_end(&self) -> bool {
        self.eofc != 0
    }
}
