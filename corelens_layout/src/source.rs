//! Read-only access to a compiler-emitted type description graph.

use std::{fmt, hash::Hash};

/// The kinds of type description nodes the converter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A primitive scalar type.
    Base,
    /// A pointer type.
    Pointer,
    /// An array type; extents come from subrange children.
    Array,
    /// An enumeration type.
    Enumeration,
    /// A struct type.
    Structure,
    /// A union type.
    Union,
    /// A type alias.
    Typedef,
    /// A const qualifier.
    Const,
    /// A volatile qualifier.
    Volatile,
    /// A member of a struct or union.
    Member,
    /// A function type.
    Subroutine,
    /// An array extent.
    Subrange,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Base => "base type",
            NodeKind::Pointer => "pointer type",
            NodeKind::Array => "array type",
            NodeKind::Enumeration => "enumeration type",
            NodeKind::Structure => "structure type",
            NodeKind::Union => "union type",
            NodeKind::Typedef => "typedef",
            NodeKind::Const => "const qualifier",
            NodeKind::Volatile => "volatile qualifier",
            NodeKind::Member => "member",
            NodeKind::Subroutine => "subroutine type",
            NodeKind::Subrange => "subrange",
        };
        write!(f, "{}", name)
    }
}

/// A source of type description nodes, e.g. the debug info of a binary.
///
/// The source is read-only and is not owned by the conversion core; it must
/// be fully in memory before conversion starts (no I/O happens behind these
/// methods). Two equal `Node` handles refer to the same underlying entry.
pub trait TypeNodeSource {
    /// An opaque handle to a node in the graph.
    type Node: Copy + Eq + Hash + fmt::Debug;

    /// The root node of each compilation unit.
    fn top_level_units(&self) -> Vec<Self::Node>;

    /// The child nodes of a node, in declaration order.
    fn children(&self, node: Self::Node) -> Vec<Self::Node>;

    /// The node's kind, or `None` for a kind outside the supported set.
    fn kind(&self, node: Self::Node) -> Option<NodeKind>;

    /// The node's name, if it has one.
    fn name(&self, node: Self::Node) -> Option<String>;

    /// The node's size in bytes, if declared.
    fn byte_size(&self, node: Self::Node) -> Option<u64>;

    /// True if the node is a forward declaration without a definition.
    fn is_declaration(&self, node: Self::Node) -> bool;

    /// The width in bits of a bit-field member.
    fn bit_size(&self, node: Self::Node) -> Option<u32>;

    /// The byte offset of a member within its aggregate.
    fn member_offset(&self, node: Self::Node) -> Option<u64>;

    /// The declared upper bound of a subrange node.
    fn upper_bound(&self, node: Self::Node) -> Option<u64>;

    /// The node the node's type attribute points to.
    fn referenced_type(&self, node: Self::Node) -> Option<Self::Node>;

    /// Search every compilation unit for a non-declaration node with the
    /// given name and kind.
    fn find_definition(&self, name: &str, kind: NodeKind) -> Option<Self::Node>;

    /// A human-readable label for the node, used in error messages.
    fn node_label(&self, node: Self::Node) -> String {
        match (self.name(node), self.kind(node)) {
            (Some(name), Some(kind)) => format!("{} ({})", name, kind),
            (Some(name), None) => name,
            (None, Some(kind)) => format!("<anonymous> ({})", kind),
            (None, None) => format!("{:?}", node),
        }
    }
}
