//! Core types for Pollster

mod notification;
mod object;
mod presigned;

pub use notification::*;
pub use object::*;
pub use presigned::*;
