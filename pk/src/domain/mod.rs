//! Domain types shared by every layer

mod message;
mod revision;

pub use message::{Message, MessageKind, Role};
pub use revision::{Revision, Variables};
