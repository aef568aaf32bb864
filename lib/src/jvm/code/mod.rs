//! Positions in method bytecode
//!
//! Stack map frames (and the uninitialized types inside them) point at instructions by their
//! offset in the code array. Tools working on method bodies would rather deal in labels, so
//! everything that reads or writes offsets goes through a [`LabelResolver`].

mod label;

pub use label::*;
