//! Dynamically typed values decoded from raw memory.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    table::size_of_in, BaseType, Field, IntType, LayoutError, LayoutId, LayoutTable, NativeLayout,
};

/// An integer value.
///
/// i128 is used so that any [IntType] fits, signed or unsigned.
pub type IntValue = i128;

/// The byte order of the memory being decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endianness {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

/// A dynamically typed value decoded against a layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// An integer or boolean value (booleans decode to 0 or 1).
    Int(IntValue),
    /// A pointer value, kept as a raw address.
    Address(u64),
    /// A struct or union value.
    ///
    /// Fields keep their declaration order. The fields of an anonymous
    /// member are merged into the containing value, mirroring how the
    /// member's storage is merged into the aggregate.
    Struct(Box<IndexMap<String, Value>>),
    /// An array value.
    Array(Vec<Value>),
}

impl Value {
    /// Fetch a field of a struct or union value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(fields) => fields.get(name),
            _ => None,
        }
    }

    /// The value as an integer, if it is one.
    pub fn as_int(&self) -> Option<IntValue> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// The value as an address, if it is one.
    pub fn as_address(&self) -> Option<u64> {
        match self {
            Value::Address(address) => Some(*address),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Address(address) => write!(f, "{:#x}", address),
            Value::Struct(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, value)?;
                }
                write!(f, "}}")
            }
            Value::Array(values) => {
                write!(f, "[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl LayoutTable {
    /// Decode the bytes of one value of the given layout.
    ///
    /// The value is read from the start of `buf`, which must hold at least
    /// [size_of](LayoutTable::size_of) bytes for the layout. Union fields
    /// are all decoded at offset 0, giving every overlapping view of the
    /// shared bytes. A flexible trailing array decodes as an empty array.
    pub fn read_value(
        &self,
        id: LayoutId,
        buf: &[u8],
        endianness: Endianness,
    ) -> Result<Value, LayoutError> {
        self.with_slots(|slots| {
            let needed = size_of_in(slots, self.pointer_size(), id)? as usize;
            if buf.len() < needed {
                return Err(LayoutError::BufferTooSmall {
                    needed,
                    actual: buf.len(),
                });
            }
            read_in(slots, self.pointer_size(), id, buf, endianness)
        })
    }
}

fn read_in(
    slots: &[NativeLayout],
    pointer_size: u64,
    id: LayoutId,
    buf: &[u8],
    endianness: Endianness,
) -> Result<Value, LayoutError> {
    let layout = slots
        .get(id.index())
        .ok_or(LayoutError::UndefinedLayout(id))?;
    let value = match layout {
        NativeLayout::Base(BaseType::Bool) => {
            let byte = slice(buf, 0, 1)?[0];
            Value::Int((byte != 0) as IntValue)
        }
        NativeLayout::Base(BaseType::Int(int_type)) => {
            let bytes = slice(buf, 0, int_type.size() as usize)?;
            Value::Int(decode_int(bytes, *int_type, endianness))
        }
        NativeLayout::Pointer { .. } => {
            let bytes = slice(buf, 0, pointer_size as usize)?;
            Value::Address(decode_uint(bytes, endianness) as u64)
        }
        NativeLayout::Array { element, count } => {
            let stride = size_of_in(slots, pointer_size, *element)? as usize;
            let mut values = Vec::with_capacity(*count as usize);
            for index in 0..*count as usize {
                let bytes = slice(buf, index * stride, stride)?;
                values.push(read_in(slots, pointer_size, *element, bytes, endianness)?);
            }
            Value::Array(values)
        }
        NativeLayout::Enum { underlying } => {
            read_in(slots, pointer_size, *underlying, buf, endianness)?
        }
        NativeLayout::Union { fields, .. } | NativeLayout::Struct { fields, .. } => {
            let mut field_values: IndexMap<String, Value> = IndexMap::new();
            for field in fields {
                let size = size_of_in(slots, pointer_size, field.layout)? as usize;
                let bytes = slice(buf, field.offset as usize, size)?;
                let mut value = read_in(slots, pointer_size, field.layout, bytes, endianness)?;
                if let Some(bits) = field.bit_size {
                    value = mask_bit_field(slots, field, value, bits);
                }
                match &field.name {
                    Some(name) => {
                        field_values.insert(name.clone(), value);
                    }
                    // Anonymous member: merge its fields into this value.
                    None => match value {
                        Value::Struct(inner) => field_values.extend(*inner),
                        other => {
                            field_values.insert("__anon".to_string(), other);
                        }
                    },
                }
            }
            Value::Struct(Box::new(field_values))
        }
    };
    Ok(value)
}

fn slice(buf: &[u8], offset: usize, size: usize) -> Result<&[u8], LayoutError> {
    buf.get(offset..offset + size)
        .ok_or(LayoutError::BufferTooSmall {
            needed: offset + size,
            actual: buf.len(),
        })
}

fn decode_uint(bytes: &[u8], endianness: Endianness) -> u128 {
    let mut result: u128 = 0;
    match endianness {
        Endianness::Little => {
            for &byte in bytes.iter().rev() {
                result = (result << 8) | byte as u128;
            }
        }
        Endianness::Big => {
            for &byte in bytes {
                result = (result << 8) | byte as u128;
            }
        }
    }
    result
}

fn decode_int(bytes: &[u8], int_type: IntType, endianness: Endianness) -> IntValue {
    let raw = decode_uint(bytes, endianness);
    if int_type.is_signed() {
        let bits = int_type.size() * 8;
        sign_extend(raw, bits as u32)
    } else {
        raw as IntValue
    }
}

fn sign_extend(raw: u128, bits: u32) -> IntValue {
    let sign_bit = 1u128 << (bits - 1);
    if raw & sign_bit != 0 {
        (raw as IntValue) - (1 << bits)
    } else {
        raw as IntValue
    }
}

/// Reduce a decoded storage unit to the low-order `bits` of a bit-field.
///
/// Only the first bit-field of a storage unit is represented as a field, so
/// the low-bits-first placement of little-endian targets is assumed.
fn mask_bit_field(slots: &[NativeLayout], field: &Field, value: Value, bits: u32) -> Value {
    let raw = match value {
        Value::Int(n) => n as u128,
        other => return other,
    };
    if bits == 0 || bits >= 128 {
        return Value::Int(raw as IntValue);
    }
    let masked = raw & ((1u128 << bits) - 1);
    if storage_is_signed(slots, field.layout) {
        Value::Int(sign_extend(masked, bits))
    } else {
        Value::Int(masked as IntValue)
    }
}

fn storage_is_signed(slots: &[NativeLayout], id: LayoutId) -> bool {
    match slots.get(id.index()) {
        Some(NativeLayout::Base(BaseType::Int(int_type))) => int_type.is_signed(),
        Some(NativeLayout::Enum { underlying }) => storage_is_signed(slots, *underlying),
        _ => false,
    }
}
