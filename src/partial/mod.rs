//! Partials: named reusable fragments invoked as `<_name ...>...</_name>`

pub mod expander;
pub mod registry;

pub use expander::{contents, invocation_context};
pub use registry::{is_valid_name, PartialRegistry, SharedRegistry};
