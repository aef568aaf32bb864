//! Read and write JVM stack map tables
//!
//! ### Simple example
//!
//! Consider the following Java constructor:
//!
//! ```java,ignore,no_run
//! public class Point {
//!     public Point(boolean flag) {
//!         super();
//!         if (flag) { ... }
//!     }
//! }
//! ```
//!
//! The frame at the `if` target can be encoded (and decoded back) as follows:
//!
//! ```
//! use frameabi::jvm::code::RawOffsets;
//! use frameabi::jvm::class_file::ConstantsPool;
//! use frameabi::jvm::verifier::*;
//! use frameabi::jvm::*;
//!
//! # fn main() -> Result<(), Error> {
//! let point = BinaryName::from_str("me/alec/Point").map_err(Error::BadDescriptor)?;
//! let context = MethodContext::new(
//!     point.clone(),
//!     UnqualifiedName::INIT,
//!     MethodAccessFlags::PUBLIC,
//!     MethodDescriptor::parse("(Z)V").map_err(Error::BadDescriptor)?,
//! );
//! let initial = context.initial_frame();
//!
//! // After `super()`, `this` is an initialized `Point`
//! let this = VerificationType::Object(RefType::Object(point));
//! let frames = vec![StackMapFrameInfo::new(8, vec![this, VerificationType::Integer], vec![])];
//!
//! let mut constants = ConstantsPool::new();
//! let bytes = encode_stack_map(&frames, &initial, &RawOffsets, &mut constants)?;
//! let decoded = decode_stack_map(&bytes, &initial, &mut RawOffsets, &mut constants)?;
//! assert_eq!(decoded, frames);
//! # Ok(())
//! # }
//! ```

mod access_flags;
pub mod class_file;
pub mod code;
mod descriptors;
mod errors;
mod names;
pub mod verifier;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
