#![allow(missing_docs)]

use std::{error::Error, fmt, io, sync::Arc};

/// A fatal conversion failure.
///
/// Every variant identifies the offending node by name and kind so the
/// problem can be located in the original debug information. Conversion
/// errors abort the whole request; there is no partial-result mode.
#[derive(Debug, Clone)]
pub enum ConvertError {
    /// A node kind the converter has no rule for.
    UnsupportedKind { label: String },
    /// A primitive name absent from the fixed base-type table.
    UnsupportedBaseType { name: String },
    /// A declaration-only node with no matching definition in any unit.
    MissingDefinition { name: String },
    /// A dependency cycle not mediated by a pointer.
    CycleDetected { label: String },
    /// An anonymous aggregate marked declaration-only.
    InvalidDeclaration { label: String },
    /// A node is missing an attribute its kind requires.
    MissingAttribute {
        label: String,
        attribute: &'static str,
    },
    /// An array node with no subrange child.
    MissingSubrange { label: String },
    /// The synthesized field sequence does not add up to the declared size.
    SizeMismatch {
        label: String,
        declared: u64,
        actual: u64,
    },
    /// The conversion recursed deeper than the configured limit.
    RecursionLimit { label: String },
    /// A layout table operation failed.
    LayoutError(corelens_data_type::LayoutError),
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvertError::UnsupportedKind { label } => {
                write!(f, "unsupported node kind: {}", label)
            }
            ConvertError::UnsupportedBaseType { name } => {
                write!(f, "unsupported base type name: {}", name)
            }
            ConvertError::MissingDefinition { name } => {
                write!(f, "no definition found for declaration: {}", name)
            }
            ConvertError::CycleDetected { label } => {
                write!(f, "dependency cycle through: {}", label)
            }
            ConvertError::InvalidDeclaration { label } => {
                write!(f, "anonymous aggregate marked as declaration: {}", label)
            }
            ConvertError::MissingAttribute { label, attribute } => {
                write!(f, "missing attribute {} on node {}", attribute, label)
            }
            ConvertError::MissingSubrange { label } => {
                write!(f, "array node without a subrange child: {}", label)
            }
            ConvertError::SizeMismatch {
                label,
                declared,
                actual,
            } => write!(
                f,
                "synthesized size of {} is {} bytes, declared size is {}",
                label, actual, declared
            ),
            ConvertError::RecursionLimit { label } => {
                write!(f, "type nesting too deep at: {}", label)
            }
            ConvertError::LayoutError(error) => write!(f, "layout error: {}", error),
        }
    }
}

impl Error for ConvertError {}

impl From<corelens_data_type::LayoutError> for ConvertError {
    fn from(v: corelens_data_type::LayoutError) -> Self {
        Self::LayoutError(v)
    }
}

/// An error while loading debug information from an object file.
#[derive(Debug, Clone)]
pub enum DwarfLoadError {
    FileReadError(Arc<io::Error>),
    ObjectReadError(object::Error),
    DwarfReadError(gimli::Error),
    /// The object file carries no debug information.
    NoDebugInfo,
}

impl fmt::Display for DwarfLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DwarfLoadError::FileReadError(error) => write!(f, "file error: {}", error),
            DwarfLoadError::ObjectReadError(error) => write!(f, "object file error: {}", error),
            DwarfLoadError::DwarfReadError(error) => write!(f, "dwarf error: {}", error),
            DwarfLoadError::NoDebugInfo => write!(f, "no debug info found"),
        }
    }
}

impl Error for DwarfLoadError {}

impl From<io::Error> for DwarfLoadError {
    fn from(v: io::Error) -> Self {
        Self::FileReadError(Arc::new(v))
    }
}

impl From<object::Error> for DwarfLoadError {
    fn from(v: object::Error) -> Self {
        Self::ObjectReadError(v)
    }
}

impl From<gimli::Error> for DwarfLoadError {
    fn from(v: gimli::Error) -> Self {
        Self::DwarfReadError(v)
    }
}
