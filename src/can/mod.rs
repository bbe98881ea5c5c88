//! CAN signal codec.
//!
//! Outbound telemetry is assembled per message by a [`TxTransaction`]: opening
//! it reads the store blocks the message needs once, each signal is encoded
//! from that snapshot, and closing it yields the frame. Inbound frames go
//! through an [`RxTransaction`] the same way in reverse.
//!
//! ```
//! use bmscore::can::{MessageId, TxCodec};
//! use bmscore::config::CodecConfig;
//! use bmscore::store::{MemoryStore, Sox, Store};
//!
//! let store = MemoryStore::new();
//! store.write_block(&Sox { soc_mean: 50.0, soc_min: 49.0, soc_max: 51.0 });
//!
//! let mut codec = TxCodec::new(CodecConfig::default());
//! let frame = codec.encode_message(&store, MessageId::Soc).unwrap();
//! assert_eq!(frame.id, 0x140);
//! assert_eq!(u16::from_le_bytes([frame.data[0], frame.data[1]]), 5000);
//! ```

pub mod cursor;
pub mod rx;
pub mod signal;
pub mod table;
pub mod tx;

pub use cursor::{CursorKind, ModuleCursor};
pub use rx::{RequestSink, RxCodec, RxTransaction};
pub use signal::{ByteOrder, SignalDescriptor};
pub use table::{MessageId, RxAccessor, RxSignal, TxAccessor, TxSignal};
pub use tx::{TxCodec, TxTransaction};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const FRAME_BYTES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Bus {
    #[default]
    Can0,
    Can1,
}

/// Classic CAN data frame with a standard identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanFrame {
    pub id: u16,
    pub dlc: u8,
    pub data: [u8; FRAME_BYTES],
}

impl CanFrame {
    pub fn new(id: u16, data: [u8; FRAME_BYTES]) -> Self {
        Self {
            id,
            dlc: FRAME_BYTES as u8,
            data,
        }
    }

    pub fn for_message(message: MessageId, data: [u8; FRAME_BYTES]) -> Self {
        Self::new(message.can_id(), data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("signal #{signal} does not belong to message {message:?}")]
    ForeignSignal { signal: usize, message: MessageId },
    #[error("message {0:?} is not in the {1:?} table for this direction")]
    NotInTable(MessageId, Bus),
    #[error("no message with id {0:#05x} on {1:?}")]
    UnknownFrame(u16, Bus),
}
