//! Binary codecs at the boundary between managed bytecode and native code
//!
//!   - [`jvm`] models the `StackMapTable` attribute of class files: verification types, frame
//!     states, the implicit initial frame of a method, and the differential encoding that packs a
//!     method's frames into a compact byte sequence (and back).
//!
//!   - [`abi`] arranges foreign function calls: it classifies the memory layout of every argument
//!     and return value against a platform calling convention, hands out registers and stack
//!     slots, and produces the binding program that moves values between the managed call and the
//!     native one.

pub mod abi;
pub mod jvm;
