//! Conversion of compiler-emitted type debug information into native
//! memory layouts.
//!
//! The input is a graph of type description nodes, accessed read-only
//! through the [TypeNodeSource] trait (a DWARF-backed implementation is
//! provided by [DwarfSource]). The output is a set of
//! [NativeLayout](corelens_data_type::NativeLayout) descriptors in a shared
//! [LayoutTable](corelens_data_type::LayoutTable), byte-for-byte compatible
//! with the compiled layout, sufficient to decode raw bytes captured from
//! the binary's address space.
//!
//! [convert] is the entry point: it discovers every type node reachable
//! from a requested root, orders them so each type is materialized after
//! everything its layout depends on, and converts them kind by kind,
//! synthesizing padding to reproduce declared sizes exactly.

pub use convert::*;
pub use dwarf::*;
pub use error::*;
pub use graph::*;
pub use registry::*;
pub use source::*;

mod convert;
mod dwarf;
mod error;
mod graph;
mod registry;
mod source;
