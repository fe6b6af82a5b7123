//! Jinx Core: extended JSON values, the wire codec, and request envelopes.

pub mod codec;
pub mod context;
pub mod envelope;
pub mod temporal;
pub mod types;

pub use codec::{decode, encode, encode_to_string, CodecError, MAX_DEPTH};
pub use context::{Principal, RequestContext};
pub use envelope::{Envelope, EnvelopeError};
pub use temporal::{Instant, Interval, ParseTemporalError};
pub use types::Value;
