//! im-protocol: wire framing and typed command bodies shared by the
//! WebSocket and TCP transports.
//!
//! `packet` frames/unframes raw TCP bytes (§4.1); `command` is the shared
//! command id table (§6); `model` holds the wire-level data types (§3);
//! `messages` and `binary` provide the typed command bodies (§4.2) in JSON
//! (WebSocket) and bincode (TCP) form respectively.

pub mod binary;
pub mod command;
pub mod messages;
pub mod model;
pub mod packet;

pub use binary::{decode_binary, encode_binary, BinaryCodecError};
pub use command::Command;
pub use messages::*;
pub use model::*;
pub use packet::{crc16_ccitt, encode, CodecError, Frame, PacketCodec, PacketLoss, PacketLossSeverity};
