//! Shared storage for layout descriptors.

use std::{fmt, sync::Mutex};

use serde::{
    de::{self, Deserializer, MapAccess, Visitor},
    ser::{SerializeStruct, Serializer},
    Deserialize, Serialize,
};

use crate::{IntType, LayoutError, LayoutId, NativeLayout};

/// The arena holding every layout of one conversion session.
///
/// Handles issued by a table are only meaningful for that table. The slot
/// vector is guarded by a single lock so that independent conversions
/// running on separate threads can share one table; every operation is a
/// single short critical section.
#[derive(Debug)]
pub struct LayoutTable {
    pointer_size: u64,
    slots: Mutex<Vec<NativeLayout>>,
}

impl LayoutTable {
    /// Create an empty table using the host's native pointer width.
    pub fn new() -> Self {
        Self::with_pointer_size(IntType::u_ptr_native().size())
    }

    /// Create an empty table for a target with the given pointer width in
    /// bytes.
    pub fn with_pointer_size(pointer_size: u64) -> Self {
        Self {
            pointer_size,
            slots: Mutex::new(Vec::new()),
        }
    }

    /// The pointer width in bytes used for pointer and function-pointer
    /// layouts.
    pub fn pointer_size(&self) -> u64 {
        self.pointer_size
    }

    /// Add a layout to the table and return its handle.
    pub fn insert(&self, layout: NativeLayout) -> LayoutId {
        let mut slots = self.slots.lock().unwrap();
        let id = LayoutId(slots.len() as u32);
        slots.push(layout);
        id
    }

    /// Fetch a copy of the layout behind a handle.
    pub fn get(&self, id: LayoutId) -> Result<NativeLayout, LayoutError> {
        let slots = self.slots.lock().unwrap();
        slots
            .get(id.index())
            .cloned()
            .ok_or(LayoutError::UndefinedLayout(id))
    }

    /// Overwrite the layout behind a handle.
    ///
    /// This is how a forward-declared aggregate is completed in place:
    /// every consumer that captured the handle earlier observes the final
    /// fields afterwards.
    pub fn replace(&self, id: LayoutId, layout: NativeLayout) -> Result<(), LayoutError> {
        let mut slots = self.slots.lock().unwrap();
        match slots.get_mut(id.index()) {
            Some(slot) => {
                *slot = layout;
                Ok(())
            }
            None => Err(LayoutError::UndefinedLayout(id)),
        }
    }

    /// The number of layouts in the table.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    /// Return true if the table holds no layouts.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The size in bytes of the layout behind a handle.
    ///
    /// Structs report their declared byte size, pointers the table's
    /// pointer width, arrays `element size * count` (0 for a flexible
    /// array), and unions the size of their widest field.
    pub fn size_of(&self, id: LayoutId) -> Result<u64, LayoutError> {
        let slots = self.slots.lock().unwrap();
        size_of_in(&slots, self.pointer_size, id)
    }

    pub(crate) fn with_slots<T>(&self, f: impl FnOnce(&[NativeLayout]) -> T) -> T {
        let slots = self.slots.lock().unwrap();
        f(&slots)
    }
}

impl Default for LayoutTable {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn size_of_in(
    slots: &[NativeLayout],
    pointer_size: u64,
    id: LayoutId,
) -> Result<u64, LayoutError> {
    let layout = slots
        .get(id.index())
        .ok_or(LayoutError::UndefinedLayout(id))?;
    match layout {
        NativeLayout::Base(base) => Ok(base.size()),
        NativeLayout::Pointer { .. } => Ok(pointer_size),
        NativeLayout::Array { element, count } => {
            Ok(size_of_in(slots, pointer_size, *element)? * count)
        }
        NativeLayout::Enum { underlying } => size_of_in(slots, pointer_size, *underlying),
        NativeLayout::Union { fields, .. } => {
            let mut size = 0;
            for field in fields {
                size = size.max(size_of_in(slots, pointer_size, field.layout)?);
            }
            Ok(size)
        }
        NativeLayout::Struct { byte_size, .. } => Ok(*byte_size),
    }
}

impl fmt::Display for LayoutTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock().unwrap();
        for (i, layout) in slots.iter().enumerate() {
            writeln!(f, "{}: {}", LayoutId(i as u32), layout)?;
        }
        Ok(())
    }
}

impl Serialize for LayoutTable {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let slots = self.slots.lock().unwrap();
        let mut state = serializer.serialize_struct("LayoutTable", 2)?;
        state.serialize_field("pointer_size", &self.pointer_size)?;
        state.serialize_field("layouts", &*slots)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for LayoutTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = LayoutTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a layout table with pointer_size and layouts")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut pointer_size: Option<u64> = None;
                let mut layouts: Option<Vec<NativeLayout>> = None;
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "pointer_size" => pointer_size = Some(map.next_value()?),
                        "layouts" => layouts = Some(map.next_value()?),
                        _ => {
                            let _: de::IgnoredAny = map.next_value()?;
                        }
                    }
                }
                let pointer_size =
                    pointer_size.ok_or_else(|| de::Error::missing_field("pointer_size"))?;
                let layouts = layouts.ok_or_else(|| de::Error::missing_field("layouts"))?;
                Ok(LayoutTable {
                    pointer_size,
                    slots: Mutex::new(layouts),
                })
            }
        }

        deserializer.deserialize_struct("LayoutTable", &["pointer_size", "layouts"], TableVisitor)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{BaseType, Field};

    #[test]
    fn test_size_of_scalars_and_arrays() {
        let table = LayoutTable::with_pointer_size(8);
        let int = table.insert(NativeLayout::Base(BaseType::Int(IntType::S32)));
        let arr = table.insert(NativeLayout::Array {
            element: int,
            count: 10,
        });
        let flexible = table.insert(NativeLayout::Array {
            element: int,
            count: 0,
        });
        let ptr = table.insert(NativeLayout::Pointer { target: Some(arr) });

        assert_eq!(table.size_of(int).unwrap(), 4);
        assert_eq!(table.size_of(arr).unwrap(), 40);
        assert_eq!(table.size_of(flexible).unwrap(), 0);
        assert_eq!(table.size_of(ptr).unwrap(), 8);
    }

    #[test]
    fn test_size_of_union_is_widest_field() {
        let table = LayoutTable::new();
        let c = table.insert(NativeLayout::Base(BaseType::Int(IntType::S8)));
        let s = table.insert(NativeLayout::Base(BaseType::Int(IntType::S16)));
        let union = table.insert(NativeLayout::Union {
            name: "u".to_string(),
            fields: vec![
                Field {
                    name: Some("f_char".to_string()),
                    offset: 0,
                    layout: c,
                    bit_size: None,
                },
                Field {
                    name: Some("f_short".to_string()),
                    offset: 0,
                    layout: s,
                    bit_size: None,
                },
            ],
        });
        assert_eq!(table.size_of(union).unwrap(), 2);
    }

    #[test]
    fn test_replace_completes_in_place() {
        let table = LayoutTable::new();
        let id = table.insert(NativeLayout::Struct {
            name: "node".to_string(),
            fields: Vec::new(),
            byte_size: 0,
        });
        table
            .replace(
                id,
                NativeLayout::Struct {
                    name: "node".to_string(),
                    fields: Vec::new(),
                    byte_size: 16,
                },
            )
            .unwrap();
        assert_eq!(table.size_of(id).unwrap(), 16);
    }
}
