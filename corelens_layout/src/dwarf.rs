//! Loading a type description graph from a binary's DWARF debug info.
//!
//! This is the I/O side of the pipeline: it parses an object file with
//! [object], walks every compilation unit with [gimli], and materializes
//! all debug entries into a flat in-memory arena up front. The conversion
//! core then runs against the arena through [TypeNodeSource] without
//! touching the file again.

use std::{borrow::Cow, collections::HashMap, fs, path::Path};

use corelens_data_type::{Endianness, IntType};
use gimli::{
    AttributeValue, DebuggingInformationEntry, DwAt, Dwarf, EndianSlice, Reader, RunTimeEndian,
    SectionId, Unit,
};
use object::{Object, ObjectSection};

use crate::{DwarfLoadError, NodeKind, TypeNodeSource};

/// A handle to a node in a [DwarfSource] arena.
///
/// Two equal handles refer to the same underlying debug entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(u32);

impl NodeRef {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
struct NodeData {
    kind: Option<NodeKind>,
    tag: gimli::DwTag,
    name: Option<String>,
    byte_size: Option<u64>,
    declaration: bool,
    bit_size: Option<u32>,
    member_offset: Option<u64>,
    upper_bound: Option<u64>,
    referenced: Option<NodeRef>,
    children: Vec<NodeRef>,
}

/// An in-memory type description graph extracted from DWARF debug info.
#[derive(Debug)]
pub struct DwarfSource {
    nodes: Vec<NodeData>,
    units: Vec<NodeRef>,
    definitions: HashMap<(String, NodeKind), NodeRef>,
    pointer_size: u64,
    endianness: Endianness,
}

impl DwarfSource {
    /// Read the debug info of the object file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DwarfLoadError> {
        let buffer = fs::read(path)?;
        Self::parse(&buffer)
    }

    /// Parse debug info out of an in-memory object file.
    pub fn parse(buffer: &[u8]) -> Result<Self, DwarfLoadError> {
        let object = object::File::parse(buffer)?;

        let endian = if object.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        let load_section = |id: SectionId| -> Result<Cow<'_, [u8]>, object::Error> {
            Ok(object
                .section_by_name(id.name())
                .map(|ref section| section.uncompressed_data())
                .transpose()?
                .unwrap_or(Cow::Borrowed(&[])))
        };
        let dwarf_cow = Dwarf::load(&load_section)?;
        let dwarf = dwarf_cow.borrow(|section| EndianSlice::new(section, endian));

        let mut source = Self::from_dwarf(&dwarf)?;
        source.endianness = if object.is_little_endian() {
            Endianness::Little
        } else {
            Endianness::Big
        };
        Ok(source)
    }

    /// Materialize every debug entry of every compilation unit.
    pub fn from_dwarf<R: Reader>(dwarf: &Dwarf<R>) -> Result<Self, DwarfLoadError> {
        let mut nodes: Vec<NodeData> = Vec::new();
        let mut units: Vec<NodeRef> = Vec::new();
        let mut pointer_size: Option<u64> = None;

        // Global entry offset -> node, for resolving type references, and
        // the raw reference offsets to fix up once every unit is read.
        let mut offset_to_node: HashMap<R::Offset, NodeRef> = HashMap::new();
        let mut raw_references: Vec<(usize, R::Offset)> = Vec::new();

        let mut iter = dwarf.units();
        while let Some(header) = iter.next()? {
            let unit = dwarf.unit(header)?;
            if pointer_size.is_none() {
                pointer_size = Some(unit.header.address_size() as u64);
            }

            let mut stack: Vec<NodeRef> = Vec::new();
            let mut depth: isize = 0;
            let mut entries = unit.entries();
            while let Some((delta_depth, entry)) = entries.next_dfs()? {
                depth += delta_depth;
                stack.truncate(depth as usize);

                let node = NodeRef(nodes.len() as u32);
                nodes.push(read_entry(dwarf, &unit, entry)?);

                if let Some(global) = entry.offset().to_debug_info_offset(&unit.header) {
                    offset_to_node.insert(global.0, node);
                }
                if let Some(target) = attr_reference(&unit, entry)? {
                    raw_references.push((node.index(), target));
                }

                match stack.last() {
                    Some(&parent) => nodes[parent.index()].children.push(node),
                    None => units.push(node),
                }
                stack.push(node);
            }
        }

        if units.is_empty() {
            return Err(DwarfLoadError::NoDebugInfo);
        }

        for (index, target) in raw_references {
            nodes[index].referenced = offset_to_node.get(&target).copied();
        }

        // Index name+kind -> first non-declaration entry, backing the
        // cross-unit definition search.
        let mut definitions: HashMap<(String, NodeKind), NodeRef> = HashMap::new();
        for (index, data) in nodes.iter().enumerate() {
            if data.declaration {
                continue;
            }
            if let (Some(name), Some(kind)) = (&data.name, data.kind) {
                definitions
                    .entry((name.clone(), kind))
                    .or_insert(NodeRef(index as u32));
            }
        }

        Ok(DwarfSource {
            nodes,
            units,
            definitions,
            pointer_size: pointer_size.unwrap_or_else(|| IntType::u_ptr_native().size()),
            endianness: Endianness::Little,
        })
    }

    /// The pointer width in bytes reported by the debug info.
    pub fn pointer_size(&self) -> u64 {
        self.pointer_size
    }

    /// The byte order of the binary the debug info came from.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// The number of materialized nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Search the top level of every compilation unit for a type with the
    /// given name.
    pub fn find_type_node(&self, name: &str) -> Option<NodeRef> {
        for &unit in &self.units {
            if self.data(unit).name.as_deref() == Some(name) {
                return Some(unit);
            }
            for &child in &self.data(unit).children {
                if self.data(child).name.as_deref() == Some(name) {
                    return Some(child);
                }
            }
        }
        None
    }

    fn data(&self, node: NodeRef) -> &NodeData {
        &self.nodes[node.index()]
    }
}

impl TypeNodeSource for DwarfSource {
    type Node = NodeRef;

    fn top_level_units(&self) -> Vec<NodeRef> {
        self.units.clone()
    }

    fn children(&self, node: NodeRef) -> Vec<NodeRef> {
        self.data(node).children.clone()
    }

    fn kind(&self, node: NodeRef) -> Option<NodeKind> {
        self.data(node).kind
    }

    fn name(&self, node: NodeRef) -> Option<String> {
        self.data(node).name.clone()
    }

    fn byte_size(&self, node: NodeRef) -> Option<u64> {
        self.data(node).byte_size
    }

    fn is_declaration(&self, node: NodeRef) -> bool {
        self.data(node).declaration
    }

    fn bit_size(&self, node: NodeRef) -> Option<u32> {
        self.data(node).bit_size
    }

    fn member_offset(&self, node: NodeRef) -> Option<u64> {
        self.data(node).member_offset
    }

    fn upper_bound(&self, node: NodeRef) -> Option<u64> {
        self.data(node).upper_bound
    }

    fn referenced_type(&self, node: NodeRef) -> Option<NodeRef> {
        self.data(node).referenced
    }

    fn find_definition(&self, name: &str, kind: NodeKind) -> Option<NodeRef> {
        self.definitions.get(&(name.to_string(), kind)).copied()
    }

    fn node_label(&self, node: NodeRef) -> String {
        let data = self.data(node);
        match &data.name {
            Some(name) => format!("{} ({})", name, data.tag),
            None => format!("<anonymous> ({})", data.tag),
        }
    }
}

fn read_entry<R: Reader>(
    dwarf: &Dwarf<R>,
    unit: &Unit<R>,
    entry: &DebuggingInformationEntry<'_, '_, R>,
) -> Result<NodeData, DwarfLoadError> {
    Ok(NodeData {
        kind: kind_for_tag(entry.tag()),
        tag: entry.tag(),
        name: attr_string(dwarf, unit, entry, gimli::DW_AT_name)?,
        byte_size: attr_u64(entry, gimli::DW_AT_byte_size)?,
        declaration: attr_flag(entry, gimli::DW_AT_declaration)?,
        bit_size: attr_u64(entry, gimli::DW_AT_bit_size)?.map(|bits| bits as u32),
        member_offset: attr_u64(entry, gimli::DW_AT_data_member_location)?,
        upper_bound: attr_u64(entry, gimli::DW_AT_upper_bound)?,
        referenced: None,
        children: Vec::new(),
    })
}

fn kind_for_tag(tag: gimli::DwTag) -> Option<NodeKind> {
    let kind = match tag {
        gimli::DW_TAG_base_type => NodeKind::Base,
        gimli::DW_TAG_pointer_type => NodeKind::Pointer,
        gimli::DW_TAG_array_type => NodeKind::Array,
        gimli::DW_TAG_enumeration_type => NodeKind::Enumeration,
        gimli::DW_TAG_structure_type => NodeKind::Structure,
        gimli::DW_TAG_union_type => NodeKind::Union,
        gimli::DW_TAG_typedef => NodeKind::Typedef,
        gimli::DW_TAG_const_type => NodeKind::Const,
        gimli::DW_TAG_volatile_type => NodeKind::Volatile,
        gimli::DW_TAG_member => NodeKind::Member,
        gimli::DW_TAG_subroutine_type => NodeKind::Subroutine,
        gimli::DW_TAG_subrange_type => NodeKind::Subrange,
        _ => return None,
    };
    Some(kind)
}

/// Read a string attribute from `entry`.
///
/// Return None if the attribute is not present.
fn attr_string<R: Reader>(
    dwarf: &Dwarf<R>,
    unit: &Unit<R>,
    entry: &DebuggingInformationEntry<'_, '_, R>,
    attr_name: DwAt,
) -> Result<Option<String>, DwarfLoadError> {
    Ok(match entry.attr_value(attr_name)? {
        Some(attr) => Some(
            dwarf
                .attr_string(unit, attr)?
                .to_string()?
                .as_ref()
                .to_owned(),
        ),
        None => None,
    })
}

/// Read an unsigned int attribute from `entry`.
///
/// Return None if the attribute is not present or is not an unsigned int.
fn attr_u64<R: Reader>(
    entry: &DebuggingInformationEntry<'_, '_, R>,
    attr_name: DwAt,
) -> Result<Option<u64>, DwarfLoadError> {
    Ok(entry.attr(attr_name)?.and_then(|attr| attr.udata_value()))
}

/// Read a flag attribute from `entry`, defaulting to false.
fn attr_flag<R: Reader>(
    entry: &DebuggingInformationEntry<'_, '_, R>,
    attr_name: DwAt,
) -> Result<bool, DwarfLoadError> {
    Ok(match entry.attr_value(attr_name)? {
        Some(AttributeValue::Flag(flag)) => flag,
        Some(attr) => attr.udata_value().map_or(false, |value| value != 0),
        None => false,
    })
}

/// Read the entry's type reference as a global offset, if present.
fn attr_reference<R: Reader>(
    unit: &Unit<R>,
    entry: &DebuggingInformationEntry<'_, '_, R>,
) -> Result<Option<R::Offset>, DwarfLoadError> {
    Ok(match entry.attr_value(gimli::DW_AT_type)? {
        Some(AttributeValue::UnitRef(offset)) => offset
            .to_debug_info_offset(&unit.header)
            .map(|global| global.0),
        Some(AttributeValue::DebugInfoRef(offset)) => Some(offset.0),
        _ => None,
    })
}
