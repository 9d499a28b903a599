//! Typed values and their flattened wire form.
//!
//! A [`Value`] is what callers hand to the bindings. Before crossing the
//! foreign boundary it is encoded into a [`WireValue`]: a value type tag, a
//! row/column shape, one flat buffer, and an optional per-element null mask.
//! Decoding goes the other way and collapses degenerate shapes.

pub mod decode;
pub mod encode;
pub mod infer;
pub mod limits;
pub mod value;
pub mod wire;

pub use decode::decode;
pub use encode::encode;
pub use infer::{infer_shape, infer_tag};
pub use limits::Limits;
pub use value::{Tag, Value};
pub use wire::{WireData, WireTuple, WireValue};
