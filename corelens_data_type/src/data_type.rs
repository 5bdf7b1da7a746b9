//! Types and functions for describing exact native memory layouts.

use std::{fmt, mem};

use serde::{Deserialize, Serialize};

/// A handle to a layout stored in a [LayoutTable](crate::LayoutTable).
///
/// Handles are plain indices into the table that issued them. Aggregate
/// fields and pointer targets store handles rather than inline layouts, so
/// a named struct is a single shared descriptor no matter how many times it
/// is referenced, and pointer cycles through a name remain representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayoutId(pub(crate) u32);

impl LayoutId {
    /// The index of the layout within its table.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LayoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Integer types of different sizes and signedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntType {
    /// 8 bit unsigned int
    U8,
    /// 8 bit signed int
    S8,
    /// 16 bit unsigned int
    U16,
    /// 16 bit signed int
    S16,
    /// 32 bit unsigned int
    U32,
    /// 32 bit signed int
    S32,
    /// 64 bit unsigned int
    U64,
    /// 64 bit signed int
    S64,
}

impl IntType {
    /// An unsigned IntType with the same size as native usize.
    pub fn u_ptr_native() -> Self {
        match mem::size_of::<usize>() {
            4 => Self::U32,
            8 => Self::U64,
            s => unimplemented!("size_of<usize> = {}", s),
        }
    }

    /// The size of the int in bytes.
    pub fn size(&self) -> u64 {
        match self {
            Self::U8 | Self::S8 => 1,
            Self::U16 | Self::S16 => 2,
            Self::U32 | Self::S32 => 4,
            Self::U64 | Self::S64 => 8,
        }
    }

    /// Return true for the signed variants.
    pub fn is_signed(&self) -> bool {
        matches!(self, Self::S8 | Self::S16 | Self::S32 | Self::S64)
    }

    /// Returns an unsigned int type with the given size in bytes.
    pub fn unsigned_with_size(size: u64) -> Self {
        match size {
            1 => Self::U8,
            2 => Self::U16,
            4 => Self::U32,
            8 => Self::U64,
            _ => unimplemented!("unsigned int with size {}", size),
        }
    }

    /// Returns a signed int type with the given size in bytes.
    pub fn signed_with_size(size: u64) -> Self {
        match size {
            1 => Self::S8,
            2 => Self::S16,
            4 => Self::S32,
            8 => Self::S64,
            _ => unimplemented!("signed int with size {}", size),
        }
    }
}

/// A fixed-size scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseType {
    /// An integer of a specific size and signedness.
    Int(IntType),
    /// A one-byte boolean.
    Bool,
}

impl BaseType {
    /// The size of the scalar in bytes.
    pub fn size(&self) -> u64 {
        match self {
            Self::Int(int_type) => int_type.size(),
            Self::Bool => 1,
        }
    }
}

/// A memory-layout-exact description of a native type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum NativeLayout {
    /// A fixed-size scalar.
    Base(BaseType),
    /// A pointer-sized value.
    ///
    /// A `None` target means the pointer is opaque: it points to an
    /// undefined or unsupported type (e.g. `void *` or a function pointer).
    Pointer {
        /// The layout being pointed to, if known.
        target: Option<LayoutId>,
    },
    /// A contiguous sequence of elements.
    ///
    /// `count == 0` denotes an incomplete/flexible trailing array.
    Array {
        /// The element layout.
        element: LayoutId,
        /// The number of elements.
        count: u64,
    },
    /// An enumeration, reduced to its underlying integer layout.
    Enum {
        /// The integer layout the enumeration is stored as.
        underlying: LayoutId,
    },
    /// A union: all fields overlap at offset 0.
    Union {
        /// The union's declared or synthesized name.
        name: String,
        /// The fields, in declaration order.
        fields: Vec<Field>,
    },
    /// A struct with an exact byte size.
    ///
    /// Gaps between fields are filled with explicit padding fields, so the
    /// field sequence accounts for every byte up to `byte_size`.
    Struct {
        /// The struct's declared or synthesized name.
        name: String,
        /// The fields, in increasing offset order.
        fields: Vec<Field>,
        /// The total size of the struct in bytes.
        byte_size: u64,
    },
}

/// A field in a struct or union.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// The field's name.
    ///
    /// `None` marks a field whose storage is transparently merged into the
    /// containing aggregate (an anonymous union/struct member).
    pub name: Option<String>,
    /// The byte offset within the struct or union.
    pub offset: u64,
    /// The layout of the field.
    pub layout: LayoutId,
    /// The width in bits for bit-field members.
    pub bit_size: Option<u32>,
}

impl NativeLayout {
    /// Return true if the layout is a struct.
    pub fn is_struct(&self) -> bool {
        matches!(self, Self::Struct { .. })
    }

    /// Return true if the layout is a union.
    pub fn is_union(&self) -> bool {
        matches!(self, Self::Union { .. })
    }

    /// Return true if the layout is a pointer (opaque or not).
    pub fn is_pointer(&self) -> bool {
        matches!(self, Self::Pointer { .. })
    }

    /// The fields of a struct or union layout.
    pub fn fields(&self) -> Option<&[Field]> {
        match self {
            Self::Struct { fields, .. } | Self::Union { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// The name of a struct or union layout.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Struct { name, .. } | Self::Union { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for NativeLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeLayout::Base(base) => write!(f, "{}", base),
            NativeLayout::Pointer { target: None } => write!(f, "ptr[?]"),
            NativeLayout::Pointer {
                target: Some(target),
            } => write!(f, "ptr[{}]", target),
            NativeLayout::Array { element, count } => write!(f, "array[{}; {}]", element, count),
            NativeLayout::Enum { underlying } => write!(f, "enum[{}]", underlying),
            NativeLayout::Union { name, fields } => {
                write!(f, "union {} ", name)?;
                display_fields(f, fields)
            }
            NativeLayout::Struct {
                name,
                fields,
                byte_size,
            } => {
                write!(f, "struct {} ({} bytes) ", name, byte_size)?;
                display_fields(f, fields)
            }
        }
    }
}

fn display_fields(f: &mut fmt::Formatter<'_>, fields: &[Field]) -> fmt::Result {
    write!(f, "{{")?;
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            write!(f, ",")?;
        }
        match &field.name {
            Some(name) => write!(f, " {}: {} @{}", name, field.layout, field.offset)?,
            None => write!(f, " {} @{}", field.layout, field.offset)?,
        }
        if let Some(bits) = field.bit_size {
            write!(f, ":{}", bits)?;
        }
    }
    write!(f, " }}")
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseType::Int(int_type) => write!(f, "{}", int_type),
            BaseType::Bool => write!(f, "bool"),
        }
    }
}

impl fmt::Display for IntType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntType::U8 => write!(f, "u8"),
            IntType::S8 => write!(f, "s8"),
            IntType::U16 => write!(f, "u16"),
            IntType::S16 => write!(f, "s16"),
            IntType::U32 => write!(f, "u32"),
            IntType::S32 => write!(f, "s32"),
            IntType::U64 => write!(f, "u64"),
            IntType::S64 => write!(f, "s64"),
        }
    }
}
