//! Arrange native calls according to a platform calling convention
//!
//! ### Simple example
//!
//! Passing a struct of two `long`s and a `double` to a native function on AArch64 Linux:
//!
//! ```
//! use frameabi::abi::*;
//! use frameabi::jvm::ParseDescriptor;
//!
//! # fn main() -> Result<(), Error> {
//! let descriptor = FunctionDescriptor::parse("([JJ]D)V").map_err(Error::InvalidLayout)?;
//! let method_type = MethodType::from_descriptor(&descriptor)?;
//!
//! let arranger = CallArranger::new(&Platform::LINUX_AARCH64);
//! let bindings = arranger.get_bindings(&method_type, &descriptor, false, &LinkerOptions::default())?;
//!
//! // The struct is split across `x0` and `x1`, the double goes in `v0`
//! let storages: Vec<String> = bindings
//!     .calling_sequence
//!     .storages()
//!     .map(|storage| storage.to_string())
//!     .collect();
//! assert_eq!(storages, vec!["x0", "x1", "v0"]);
//! # Ok(())
//! # }
//! ```

mod arranger;
mod binding;
mod calculator;
pub mod classifier;
mod descriptor;
mod errors;
mod interpreter;
mod layout;
mod platform;
mod storage;

pub use arranger::*;
pub use binding::*;
pub use calculator::*;
pub use classifier::{classify, classify_return, TypeClass};
pub use descriptor::*;
pub use errors::*;
pub use interpreter::*;
pub use layout::*;
pub use platform::*;
pub use storage::*;
