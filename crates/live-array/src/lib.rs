//! # Verto Live Array
//!
//! Network-free replication of server-held ordered collections.
//!
//! Verto servers publish collections such as conference rosters as a stream
//! of sequence-numbered deltas on an event channel. This crate holds the
//! client side of that protocol:
//!
//! - [`OrderedMap`] - the ordered keyed collection that stores the replica
//! - [`LiveArray`] - the sync engine: sequencing, gap detection, resync
//! - [`LiveArrayPacket`] / [`LiveArrayCommand`] - wire decoding of deltas and
//!   the envelope for commands sent back to the server
//!
//! Transport, subscription and timers live in `verto-client-core`, which binds
//! a [`LiveArray`] to a channel.
//!
//! ## Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use verto_live_array::{LiveArray, LiveArrayPacket};
//!
//! let mut roster = LiveArray::new("conference-liveArray.3000", "3000", json!(null));
//!
//! let packet = LiveArrayPacket::from_value(json!({
//!     "action": "bootObj",
//!     "name": "3000",
//!     "wireSerno": -1,
//!     "data": [["m-1", ["m-1", "Alice"]], ["m-2", ["m-2", "Bob"]]],
//! }))?;
//!
//! let outcome = roster.apply_packet(packet)?;
//! assert!(outcome.change.unwrap().redraw);
//! assert_eq!(roster.len(), 2);
//! # Ok::<(), verto_live_array::LiveArrayError>(())
//! ```

pub mod errors;
pub mod live_array;
pub mod ordered_map;
pub mod packet;

pub use errors::{LiveArrayError, LiveArrayResult};
pub use live_array::{
    ApplyOutcome, LiveArray, LiveArrayChange, LiveArrayListener, SequenceGap, MAX_RESYNC_ATTEMPTS,
};
pub use ordered_map::OrderedMap;
pub use packet::{Delta, LiveArrayAction, LiveArrayCommand, LiveArrayPacket};
