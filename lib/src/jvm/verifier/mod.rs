//! Stack map frames
//!
//! For any specific instruction inside a method body, the stack and locals should have the same
//! structure, regardless of which control flow was used to reach that instruction. In other words:
//! although the values on the stack and in the locals may obviously be different, the types and
//! order of the stack and local variables cannot. This information is referred to as the _stack
//! map frame_ (represented using [`StackMapFrameInfo`]) and the set of stack map frames for all
//! jump targets in a method is the _stack map table_.
//!
//! The "types" used in verification (represented using [`VerificationType`]) are slightly
//! augmented to take into account initialization and null. While a constructor is running, frames
//! also track which strictly-initialized fields of `this` have not been assigned yet.
//!
//! Since every frame is stored relative to the previous one (and the first relative to an
//! implicit frame derived from the method signature, see [`MethodContext::initial_frame`]), the
//! table is read and written through [`StackMapDecoder`] and [`StackMapEncoder`]. Those resolve
//! offsets through a [`crate::jvm::code::LabelResolver`] and constant indices through a
//! [`ConstantResolver`].
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1

mod frame;
mod stack_map;
mod types;

pub use frame::*;
pub use stack_map::*;
pub use types::*;
