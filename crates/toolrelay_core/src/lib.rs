//! TOOLRELAY Core Types
//!
//! Pure types shared by the broker, the schema compiler and the session
//! runtime. Nothing in this crate performs I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod content;
pub mod error;
pub mod id;
pub mod value;

// Re-exports
pub use content::StructuredContent;
pub use error::{CoreError, CoreResult};
pub use id::{InvocationId, SessionId};
pub use value::{PlainMap, PlainValue};
