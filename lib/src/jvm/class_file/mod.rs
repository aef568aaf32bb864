//! Binary representation of the pieces of a class file this crate reads and writes
//!
//! Only the constant pool entries needed to name classes and fields are modelled, along with the
//! `StackMapTable` attribute. Everything is serialized big-endian through [`Serialize`] and read
//! back through [`Deserialize`].

mod attribute;
mod constants;
mod serialize;

pub use attribute::*;
pub use constants::*;
pub use serialize::*;
