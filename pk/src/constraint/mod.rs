//! Constraint Parser
//!
//! Turns selector strings such as `support_reply@^1#prod` into immutable
//! [`Selector`] / [`Constraint`] values. Parsing is pure and never suspends.

mod parser;
mod version;

pub use parser::{Bound, Constraint, ConstraintError, Selector, VersionRange, name_of};
pub use version::Version;
