#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    clippy::all,
    clippy::todo,
    clippy::empty_enum,
    clippy::mem_forget,
    clippy::unused_self,
    clippy::needless_continue,
    clippy::needless_borrow,
    clippy::match_wildcard_for_single_variants,
    clippy::unnested_or_patterns,
    rust_2018_idioms,
    future_incompatible,
    nonstandard_style,
    missing_docs
)]
//! Engine.IO protocol types: packets, session ids, protocol versions
//! and the codecs mapping them to the wire for engine.io v3 and v4.

pub use codec::{Codec, Fragment, Framing, Heartbeat, V3Codec, V4Codec};
pub use packet::{OpenPacket, Packet, PacketBuf, PacketParseError};
pub use protocol::{ProtocolVersion, TransportType, UnknownProtocolVersionError, UnknownTransportError};
pub use sid::{Sid, SidDecodeError};
pub use str::Str;

pub mod payload;

mod codec;
mod packet;
mod protocol;
mod sid;
mod str;
