//! Wire-level protocol shared by clients and drivers.
//!
//! Architecture:
//! - `types`: tagged wire values and the slot types the catalog declares
//! - `codec`: bounded encoding/decoding of wire values
//! - `status`: procedure return codes
//! - `catalog`: the closed set of procedures and their argument/result shapes

pub mod catalog;
pub mod codec;
pub mod status;
pub mod types;


pub use catalog::{CatalogEntry, Procedure};
pub use codec::{decode, encode, encode_to_bytes, try_decode, CodecLimits};
pub use status::StatusCode;
pub use types::{Row, Slot, WireType, WireValue};
