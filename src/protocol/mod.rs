//! `stream-json` protocol codec
//!
//! Stateless line decoding and encoding ([`decode`], [`encode_user_turn`])
//! and the [`RecordCodec`] framing used on the CLI's pipes.

mod codec;
mod parser;

pub use codec::{DEFAULT_MAX_LINE_LENGTH, RecordCodec};
pub use parser::{decode, encode_record, encode_user_turn};
