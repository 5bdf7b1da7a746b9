//! Conversion from type description nodes to native layout descriptors.

use corelens_data_type::{BaseType, Field, IntType, LayoutId, NativeLayout};
use indexmap::IndexMap;
use log::{debug, trace, warn};

use crate::{
    build_reference_graph, topological_order, ConvertError, NodeKind, Session, TypeNodeSource,
};

/// The maximum nesting depth of a single conversion.
///
/// Depth is bounded by the longest strong-dependency chain in the input;
/// debug information nested deeper than this is treated as malformed
/// rather than risking the call stack.
pub const MAX_CONVERT_DEPTH: usize = 128;

/// Convert the type reachable from `root` into a native layout.
///
/// Discovers every node reachable from `root`, orders the strong-dependency
/// graph, converts each named aggregate definition in dependency order so
/// later references reuse completed layouts, resolves aggregates that were
/// only reached as pointer targets, and finally returns the handle for
/// `root` itself.
///
/// The result is deterministic for a fixed source and root. Concurrent
/// calls may share one [Session]; each call builds its own reachability
/// state.
pub fn convert<S: TypeNodeSource>(
    source: &S,
    session: &Session<S::Node>,
    root: S::Node,
) -> Result<LayoutId, ConvertError> {
    let graph = build_reference_graph(source, root)?;
    let order = topological_order(&graph).map_err(|node| ConvertError::CycleDetected {
        label: source.node_label(node),
    })?;
    debug!("{} nodes reachable from conversion root", graph.nodes.len());

    let mut converter = Converter {
        source,
        session,
        base_cache: IndexMap::new(),
        opaque_pointer: None,
    };

    for &node in &order {
        let is_aggregate = matches!(
            source.kind(node),
            Some(NodeKind::Structure | NodeKind::Union)
        );
        // Anonymous aggregates are not cacheable, so converting them here
        // would only orphan a synthetic identity; they are converted at
        // their use site instead.
        if is_aggregate && !source.is_declaration(node) && source.name(node).is_some() {
            converter.convert_node(node, false, 0)?;
        }
    }

    // Aggregates reached only through pointers were registered as pending
    // declarations; completing one can enqueue more, so drain until empty.
    while let Some((name, node)) = session.registry().take_pending() {
        trace!("resolving pending declaration {}", name);
        converter.convert_node(node, false, 0)?;
    }

    converter.convert_node(root, false, 0)
}

struct Converter<'a, S: TypeNodeSource> {
    source: &'a S,
    session: &'a Session<S::Node>,
    base_cache: IndexMap<BaseType, LayoutId>,
    opaque_pointer: Option<LayoutId>,
}

struct MemberInfo {
    name: Option<String>,
    layout: LayoutId,
    size: u64,
    offset: u64,
    bit_size: Option<u32>,
}

impl<'a, S: TypeNodeSource> Converter<'a, S> {
    /// Convert one node, transparently unwrapping qualifiers and resolving
    /// declarations first.
    ///
    /// `declaration` marks a pointer-target conversion: a named aggregate
    /// only needs a usable forward handle, not a completed layout.
    fn convert_node(
        &mut self,
        node: S::Node,
        declaration: bool,
        depth: usize,
    ) -> Result<LayoutId, ConvertError> {
        if depth > MAX_CONVERT_DEPTH {
            return Err(ConvertError::RecursionLimit {
                label: self.source.node_label(node),
            });
        }
        let kind = match self.source.kind(node) {
            Some(kind) => kind,
            None => {
                return Err(ConvertError::UnsupportedKind {
                    label: self.source.node_label(node),
                })
            }
        };
        match kind {
            NodeKind::Typedef | NodeKind::Const | NodeKind::Volatile | NodeKind::Member => {
                let target = self.source.referenced_type(node).ok_or_else(|| {
                    ConvertError::MissingAttribute {
                        label: self.source.node_label(node),
                        attribute: "referenced type",
                    }
                })?;
                self.convert_node(target, declaration, depth + 1)
            }
            _ if self.source.is_declaration(node) => {
                let definition = self.resolve_declaration(node, kind)?;
                self.convert_node(definition, declaration, depth + 1)
            }
            NodeKind::Base => self.convert_base(node),
            NodeKind::Pointer => self.convert_pointer(node, depth),
            // Function pointers are represented opaquely; the callable
            // itself is never expanded.
            NodeKind::Subroutine => Ok(self.opaque_pointer()),
            NodeKind::Array => self.convert_array(node, depth),
            NodeKind::Enumeration => self.convert_enum(node, depth),
            NodeKind::Structure | NodeKind::Union => {
                self.convert_aggregate(node, kind, declaration, depth)
            }
            NodeKind::Subrange => Err(ConvertError::UnsupportedKind {
                label: self.source.node_label(node),
            }),
        }
    }

    /// Find the full definition for a declaration-only node.
    fn resolve_declaration(
        &self,
        node: S::Node,
        kind: NodeKind,
    ) -> Result<S::Node, ConvertError> {
        let name = match self.source.name(node) {
            Some(name) => name,
            None if matches!(kind, NodeKind::Structure | NodeKind::Union) => {
                return Err(ConvertError::InvalidDeclaration {
                    label: self.source.node_label(node),
                })
            }
            None => {
                return Err(ConvertError::MissingAttribute {
                    label: self.source.node_label(node),
                    attribute: "name",
                })
            }
        };
        self.source
            .find_definition(&name, kind)
            .ok_or(ConvertError::MissingDefinition { name })
    }

    fn convert_base(&mut self, node: S::Node) -> Result<LayoutId, ConvertError> {
        let name = self
            .source
            .name(node)
            .ok_or_else(|| ConvertError::MissingAttribute {
                label: self.source.node_label(node),
                attribute: "name",
            })?;
        let base = base_type_for_name(&name).ok_or(ConvertError::UnsupportedBaseType { name })?;
        Ok(self.base_layout(base))
    }

    fn convert_pointer(&mut self, node: S::Node, depth: usize) -> Result<LayoutId, ConvertError> {
        let target = match self.source.referenced_type(node) {
            Some(target) => target,
            None => return Ok(self.opaque_pointer()),
        };
        // A bare `const void` target is a qualifier with no further type.
        if matches!(
            self.source.kind(target),
            Some(NodeKind::Const | NodeKind::Volatile)
        ) && self.source.referenced_type(target).is_none()
        {
            return Ok(self.opaque_pointer());
        }
        match self.convert_node(target, true, depth + 1) {
            Ok(id) => Ok(self
                .session
                .table()
                .insert(NativeLayout::Pointer { target: Some(id) })),
            // Pointers to types with no definition anywhere are common and
            // must not block the rest of the graph.
            Err(ConvertError::MissingDefinition { name }) => {
                trace!("pointer target {} has no definition, using opaque", name);
                Ok(self.opaque_pointer())
            }
            Err(error) => Err(error),
        }
    }

    fn convert_array(&mut self, node: S::Node, depth: usize) -> Result<LayoutId, ConvertError> {
        let element_node =
            self.source
                .referenced_type(node)
                .ok_or_else(|| ConvertError::MissingAttribute {
                    label: self.source.node_label(node),
                    attribute: "referenced type",
                })?;
        let element = self.convert_node(element_node, false, depth + 1)?;

        let mut counts: Vec<u64> = Vec::new();
        for child in self.source.children(node) {
            match self.source.kind(child) {
                Some(NodeKind::Subrange) => {
                    // The upper bound is the largest valid index; no bound
                    // means a flexible trailing array.
                    let count = self.source.upper_bound(child).map_or(0, |bound| bound + 1);
                    counts.push(count);
                }
                _ => {
                    return Err(ConvertError::UnsupportedKind {
                        label: self.source.node_label(child),
                    })
                }
            }
        }
        if counts.is_empty() {
            return Err(ConvertError::MissingSubrange {
                label: self.source.node_label(node),
            });
        }

        // Fold multi-dimensional arrays innermost-first.
        let mut layout = element;
        for &count in counts.iter().rev() {
            layout = self.session.table().insert(NativeLayout::Array {
                element: layout,
                count,
            });
        }
        Ok(layout)
    }

    fn convert_enum(&mut self, node: S::Node, depth: usize) -> Result<LayoutId, ConvertError> {
        let underlying = match self.source.referenced_type(node) {
            Some(target) => self.convert_node(target, false, depth + 1)?,
            // Older producers omit the underlying type; fall back to the
            // declared size.
            None => {
                let size =
                    self.source
                        .byte_size(node)
                        .ok_or_else(|| ConvertError::MissingAttribute {
                            label: self.source.node_label(node),
                            attribute: "byte size",
                        })?;
                self.base_layout(BaseType::Int(IntType::signed_with_size(size)))
            }
        };
        Ok(self
            .session
            .table()
            .insert(NativeLayout::Enum { underlying }))
    }

    fn convert_aggregate(
        &mut self,
        node: S::Node,
        kind: NodeKind,
        declaration: bool,
        depth: usize,
    ) -> Result<LayoutId, ConvertError> {
        let is_union = kind == NodeKind::Union;
        let (name, is_anon) = match self.source.name(node) {
            Some(name) => (name, false),
            None => {
                let prefix = if is_union { "union" } else { "struct" };
                (self.session.anon_names().next_name(prefix), true)
            }
        };
        // A pointer to an anonymous aggregate still needs the full layout;
        // only named aggregates can stop at a forward handle.
        let declaration = declaration && !is_anon;

        let id = if is_anon {
            self.session.table().insert(forward_layout(is_union, &name))
        } else {
            let table = self.session.table();
            let (id, completed) = self
                .session
                .registry()
                .get_or_insert_forward(&name, || table.insert(forward_layout(is_union, &name)));
            if completed {
                trace!("returning completed {} from registry", name);
                return Ok(id);
            }
            if declaration {
                self.session.registry().register_pending(&name, node);
                return Ok(id);
            }
            id
        };

        debug!(
            "converting {} {}",
            if is_union { "union" } else { "struct" },
            name
        );

        let declared_size =
            self.source
                .byte_size(node)
                .ok_or_else(|| ConvertError::MissingAttribute {
                    label: self.source.node_label(node),
                    attribute: "byte size",
                })?;

        let mut members: Vec<MemberInfo> = Vec::new();
        for child in self.source.children(node) {
            if self.source.kind(child) != Some(NodeKind::Member) {
                // Nested type definitions appear as children; they are
                // reached through the members that use them.
                continue;
            }
            let type_node = self.source.referenced_type(child).ok_or_else(|| {
                ConvertError::MissingAttribute {
                    label: self.source.node_label(child),
                    attribute: "referenced type",
                }
            })?;
            let layout = self.convert_node(type_node, false, depth + 1)?;
            let size = self.session.table().size_of(layout)?;
            let offset = if is_union {
                // Union members share one base offset regardless of what
                // the source reports.
                0
            } else {
                self.source.member_offset(child).ok_or_else(|| {
                    ConvertError::MissingAttribute {
                        label: self.source.node_label(child),
                        attribute: "member offset",
                    }
                })?
            };
            members.push(MemberInfo {
                name: self.source.name(child),
                layout,
                size,
                offset,
                bit_size: self.source.bit_size(child),
            });
        }

        let layout = if is_union {
            self.build_union_layout(&name, members, declared_size)?
        } else {
            self.build_struct_layout(&name, members, declared_size)?
        };
        self.session.table().replace(id, layout)?;

        if !is_anon {
            self.session.registry().mark_completed(&name);
            self.session.registry().remove_pending(&name);
        }
        Ok(id)
    }

    fn build_union_layout(
        &mut self,
        name: &str,
        members: Vec<MemberInfo>,
        declared_size: u64,
    ) -> Result<NativeLayout, ConvertError> {
        let widest = members.iter().map(|m| m.size).max().unwrap_or(0);
        if widest > declared_size {
            return Err(ConvertError::SizeMismatch {
                label: name.to_string(),
                declared: declared_size,
                actual: widest,
            });
        }
        let mut fields: Vec<Field> = members
            .into_iter()
            .map(|member| Field {
                name: member.name,
                offset: 0,
                layout: member.layout,
                bit_size: member.bit_size,
            })
            .collect();
        // Alignment can make the union wider than its widest member.
        if declared_size > widest {
            fields.push(self.padding_field(0, 0, declared_size));
        }
        Ok(NativeLayout::Union {
            name: name.to_string(),
            fields,
        })
    }

    /// Synthesize the field sequence of a struct, padding every gap so the
    /// layout accounts for each byte up to the declared size.
    fn build_struct_layout(
        &mut self,
        name: &str,
        mut members: Vec<MemberInfo>,
        declared_size: u64,
    ) -> Result<NativeLayout, ConvertError> {
        members.sort_by_key(|member| member.offset);

        let mut fields: Vec<Field> = Vec::new();
        let mut padding_nr: u32 = 0;
        let mut cursor: u64 = 0;

        for member in members {
            if member.offset > cursor {
                fields.push(self.padding_field(padding_nr, cursor, member.offset - cursor));
                padding_nr += 1;
                cursor = member.offset;
            }
            if member.offset < cursor {
                if member.bit_size.is_none() {
                    warn!(
                        "member {} of {} overlaps preceding storage without a bit size",
                        member.name.as_deref().unwrap_or("<anonymous>"),
                        name
                    );
                }
                // A later bit-field sharing a storage unit; the first
                // member of the unit already covers these bytes.
                continue;
            }
            cursor += member.size;
            fields.push(Field {
                name: member.name,
                offset: member.offset,
                layout: member.layout,
                bit_size: member.bit_size,
            });
        }

        if cursor > declared_size {
            return Err(ConvertError::SizeMismatch {
                label: name.to_string(),
                declared: declared_size,
                actual: cursor,
            });
        }
        if cursor < declared_size {
            fields.push(self.padding_field(padding_nr, cursor, declared_size - cursor));
        }

        Ok(NativeLayout::Struct {
            name: name.to_string(),
            fields,
            byte_size: declared_size,
        })
    }

    fn padding_field(&mut self, index: u32, offset: u64, bytes: u64) -> Field {
        let element = self.base_layout(BaseType::Int(IntType::S8));
        let layout = self.session.table().insert(NativeLayout::Array {
            element,
            count: bytes,
        });
        Field {
            name: Some(format!("__padding_{}", index)),
            offset,
            layout,
            bit_size: None,
        }
    }

    fn base_layout(&mut self, base: BaseType) -> LayoutId {
        if let Some(&id) = self.base_cache.get(&base) {
            return id;
        }
        let id = self.session.table().insert(NativeLayout::Base(base));
        self.base_cache.insert(base, id);
        id
    }

    fn opaque_pointer(&mut self) -> LayoutId {
        if let Some(id) = self.opaque_pointer {
            return id;
        }
        let id = self
            .session
            .table()
            .insert(NativeLayout::Pointer { target: None });
        self.opaque_pointer = Some(id);
        id
    }
}

fn forward_layout(is_union: bool, name: &str) -> NativeLayout {
    if is_union {
        NativeLayout::Union {
            name: name.to_string(),
            fields: Vec::new(),
        }
    } else {
        NativeLayout::Struct {
            name: name.to_string(),
            fields: Vec::new(),
            byte_size: 0,
        }
    }
}

/// The fixed table of supported primitive names.
///
/// Sizes follow the LP64 convention of the targets this is used against:
/// `long` is 8 bytes.
fn base_type_for_name(name: &str) -> Option<BaseType> {
    let base = match name {
        "char" | "signed char" => BaseType::Int(IntType::S8),
        "unsigned char" => BaseType::Int(IntType::U8),
        "short int" => BaseType::Int(IntType::S16),
        "short unsigned int" => BaseType::Int(IntType::U16),
        "int" => BaseType::Int(IntType::S32),
        "unsigned int" => BaseType::Int(IntType::U32),
        "long int" => BaseType::Int(IntType::S64),
        "long unsigned int" => BaseType::Int(IntType::U64),
        "long long int" => BaseType::Int(IntType::S64),
        "long long unsigned int" => BaseType::Int(IntType::U64),
        "_Bool" => BaseType::Bool,
        _ => return None,
    };
    Some(base)
}
