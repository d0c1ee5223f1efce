#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    clippy::all,
    clippy::todo,
    clippy::empty_enum,
    clippy::mem_forget,
    clippy::unused_self,
    clippy::filter_map_next,
    clippy::needless_continue,
    clippy::needless_borrow,
    clippy::match_wildcard_for_single_variants,
    clippy::if_let_mutex,
    clippy::await_holding_lock,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::fn_params_excessive_bools,
    clippy::exit,
    clippy::inefficient_to_string,
    clippy::macro_use_imports,
    clippy::option_option,
    clippy::unnested_or_patterns,
    rust_2018_idioms,
    future_incompatible,
    nonstandard_style
)]
#![doc = include_str!("../README.md")]

pub use engineioxide_core::{OpenPacket, ProtocolVersion, Sid, Str, TransportType};
pub use errors::{BoxError, Error, ErrorKind};
pub use socket::{CloseReason, Socket, SocketState};

pub mod config;
pub mod handler;
pub mod transport;

mod engine;
mod errors;
mod socket;
mod yeast;
