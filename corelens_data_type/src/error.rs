#![allow(missing_docs)]

use std::{error::Error, fmt};

use crate::LayoutId;

/// Errors from layout table queries and raw-memory decoding.
#[derive(Debug, Clone)]
pub enum LayoutError {
    /// A handle that was not issued by this table.
    UndefinedLayout(LayoutId),
    /// The byte buffer is too short for the layout being decoded.
    BufferTooSmall { needed: usize, actual: usize },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::UndefinedLayout(id) => write!(f, "undefined layout handle: {}", id),
            LayoutError::BufferTooSmall { needed, actual } => write!(
                f,
                "buffer too small: layout needs {} bytes, got {}",
                needed, actual
            ),
        }
    }
}

impl Error for LayoutError {}
