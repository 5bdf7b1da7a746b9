//! Representation of native memory layouts recovered from debug information.
//!
//! A layout describes the exact byte-level shape of a compiled type: field
//! offsets, padding, array extents, and pointer widths. Layouts are stored
//! in a shared [LayoutTable] and referenced by [LayoutId] handles so that
//! self-referential and mutually-recursive structures stay representable.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub use data_type::*;
pub use error::*;
pub use table::*;
pub use value::*;

mod data_type;
mod error;
mod table;
mod value;
