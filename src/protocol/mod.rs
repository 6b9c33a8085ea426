//! GDB Remote Serial Protocol wire format: packet parsing, command decoding,
//! and reply composition.

pub(crate) mod commands;
pub(crate) mod common;
mod console_output;
pub(crate) mod packet;
mod qxfer;
pub(crate) mod recv_packet;
mod reply;
mod response_writer;

pub use console_output::ConsoleOutput;
pub use qxfer::{QxferBuffer, QxferObject};
pub use reply::{checksum, escape, frame, unescape, verify, ReplyBuffer};

pub(crate) use common::thread_id::IdKind;
pub(crate) use packet::{Packet, PacketParseError};
pub(crate) use response_writer::{Error as ResponseWriterError, ResponseWriter};
