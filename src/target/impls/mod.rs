mod slice;

#[cfg(feature = "alloc")]
mod vec;

#[cfg(feature = "std")]
mod write;

pub use slice::{SliceTarget, SliceTargetError};
#[cfg(feature = "std")]
pub use write::WriteTarget;
