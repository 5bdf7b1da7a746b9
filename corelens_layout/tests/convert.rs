//! End-to-end conversion tests against an in-memory type node graph.

use corelens_data_type::{BaseType, Endianness, IntType, NativeLayout, Value};
use corelens_layout::{convert, ConvertError, NodeKind, Session, TypeNodeSource};

#[derive(Debug, Default)]
struct TestNode {
    kind: Option<NodeKind>,
    name: Option<String>,
    byte_size: Option<u64>,
    declaration: bool,
    bit_size: Option<u32>,
    member_offset: Option<u64>,
    upper_bound: Option<u64>,
    referenced: Option<usize>,
    children: Vec<usize>,
}

#[derive(Debug, Default)]
struct TestSource {
    nodes: Vec<TestNode>,
}

impl TestSource {
    fn add(&mut self, node: TestNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn base(&mut self, name: &str, byte_size: u64) -> usize {
        self.add(TestNode {
            kind: Some(NodeKind::Base),
            name: Some(name.to_string()),
            byte_size: Some(byte_size),
            ..Default::default()
        })
    }

    fn pointer(&mut self, target: Option<usize>) -> usize {
        self.add(TestNode {
            kind: Some(NodeKind::Pointer),
            byte_size: Some(8),
            referenced: target,
            ..Default::default()
        })
    }

    fn member(&mut self, name: Option<&str>, type_node: usize, offset: u64) -> usize {
        self.add(TestNode {
            kind: Some(NodeKind::Member),
            name: name.map(str::to_string),
            member_offset: Some(offset),
            referenced: Some(type_node),
            ..Default::default()
        })
    }

    fn bit_member(&mut self, name: &str, type_node: usize, offset: u64, bits: u32) -> usize {
        self.add(TestNode {
            kind: Some(NodeKind::Member),
            name: Some(name.to_string()),
            member_offset: Some(offset),
            bit_size: Some(bits),
            referenced: Some(type_node),
            ..Default::default()
        })
    }

    fn aggregate(
        &mut self,
        kind: NodeKind,
        name: Option<&str>,
        byte_size: u64,
        members: Vec<usize>,
    ) -> usize {
        self.add(TestNode {
            kind: Some(kind),
            name: name.map(str::to_string),
            byte_size: Some(byte_size),
            children: members,
            ..Default::default()
        })
    }

    fn struct_def(&mut self, name: Option<&str>, byte_size: u64, members: Vec<usize>) -> usize {
        self.aggregate(NodeKind::Structure, name, byte_size, members)
    }

    fn union_def(&mut self, name: Option<&str>, byte_size: u64, members: Vec<usize>) -> usize {
        self.aggregate(NodeKind::Union, name, byte_size, members)
    }

    fn struct_decl(&mut self, name: &str) -> usize {
        self.add(TestNode {
            kind: Some(NodeKind::Structure),
            name: Some(name.to_string()),
            declaration: true,
            ..Default::default()
        })
    }

    fn qualifier(&mut self, kind: NodeKind, target: Option<usize>) -> usize {
        self.add(TestNode {
            kind: Some(kind),
            referenced: target,
            ..Default::default()
        })
    }

    fn array(&mut self, element: usize, upper_bounds: &[Option<u64>]) -> usize {
        let subranges: Vec<usize> = upper_bounds
            .iter()
            .map(|&upper_bound| {
                self.add(TestNode {
                    kind: Some(NodeKind::Subrange),
                    upper_bound,
                    ..Default::default()
                })
            })
            .collect();
        self.add(TestNode {
            kind: Some(NodeKind::Array),
            referenced: Some(element),
            children: subranges,
            ..Default::default()
        })
    }
}

impl TypeNodeSource for TestSource {
    type Node = usize;

    fn top_level_units(&self) -> Vec<usize> {
        Vec::new()
    }

    fn children(&self, node: usize) -> Vec<usize> {
        self.nodes[node].children.clone()
    }

    fn kind(&self, node: usize) -> Option<NodeKind> {
        self.nodes[node].kind
    }

    fn name(&self, node: usize) -> Option<String> {
        self.nodes[node].name.clone()
    }

    fn byte_size(&self, node: usize) -> Option<u64> {
        self.nodes[node].byte_size
    }

    fn is_declaration(&self, node: usize) -> bool {
        self.nodes[node].declaration
    }

    fn bit_size(&self, node: usize) -> Option<u32> {
        self.nodes[node].bit_size
    }

    fn member_offset(&self, node: usize) -> Option<u64> {
        self.nodes[node].member_offset
    }

    fn upper_bound(&self, node: usize) -> Option<u64> {
        self.nodes[node].upper_bound
    }

    fn referenced_type(&self, node: usize) -> Option<usize> {
        self.nodes[node].referenced
    }

    fn find_definition(&self, name: &str, kind: NodeKind) -> Option<usize> {
        self.nodes.iter().position(|node| {
            !node.declaration && node.kind == Some(kind) && node.name.as_deref() == Some(name)
        })
    }
}

fn field_names(layout: &NativeLayout) -> Vec<String> {
    layout
        .fields()
        .unwrap()
        .iter()
        .map(|field| field.name.clone().unwrap_or_default())
        .collect()
}

#[test]
fn test_base_types_struct_padding_and_size() {
    let mut src = TestSource::default();
    let t_char = src.base("char", 1);
    let t_uchar = src.base("unsigned char", 1);
    let t_short = src.base("short int", 2);
    let t_ushort = src.base("short unsigned int", 2);
    let t_int = src.base("int", 4);

    let members = vec![
        src.member(Some("f_char"), t_char, 0),
        src.member(Some("f_uchar"), t_uchar, 1),
        src.member(Some("f_short"), t_short, 2),
        src.member(Some("f_ushort"), t_ushort, 4),
        src.member(Some("f_int"), t_int, 8),
    ];
    let root = src.struct_def(Some("base_types"), 12, members);

    let session = Session::new();
    let id = convert(&src, &session, root).unwrap();
    let layout = session.table().get(id).unwrap();

    assert_eq!(
        field_names(&layout),
        vec![
            "f_char",
            "f_uchar",
            "f_short",
            "f_ushort",
            "__padding_0",
            "f_int"
        ]
    );

    let fields = layout.fields().unwrap();
    let offsets: Vec<u64> = fields.iter().map(|field| field.offset).collect();
    assert_eq!(offsets, vec![0, 1, 2, 4, 6, 8]);

    // The padding field covers exactly the gap before the aligned int.
    let padding = session.table().get(fields[4].layout).unwrap();
    assert_eq!(
        padding,
        NativeLayout::Array {
            element: fields[0].layout,
            count: 2
        }
    );
    assert_eq!(session.table().size_of(id).unwrap(), 12);

    let buf = [
        0x01, 0x02, 0x34, 0x12, 0x78, 0x56, 0x00, 0x00, 0xef, 0xbe, 0xad, 0xde,
    ];
    let value = session
        .table()
        .read_value(id, &buf, Endianness::Little)
        .unwrap();
    assert_eq!(value.field("f_char").unwrap(), &Value::Int(1));
    assert_eq!(value.field("f_short").unwrap(), &Value::Int(0x1234));
    assert_eq!(value.field("f_ushort").unwrap(), &Value::Int(0x5678));
    assert_eq!(
        value.field("f_int").unwrap(),
        &Value::Int(0xdeadbeefu32 as i32 as i128)
    );
}

#[test]
fn test_declared_size_reached_by_padding_alone() {
    let mut src = TestSource::default();
    let t_char = src.base("char", 1);
    let member = src.member(Some("f_char"), t_char, 0);
    let root = src.struct_def(Some("padded"), 8, vec![member]);

    let session = Session::new();
    let id = convert(&src, &session, root).unwrap();
    let layout = session.table().get(id).unwrap();

    assert_eq!(field_names(&layout), vec!["f_char", "__padding_0"]);
    assert_eq!(session.table().size_of(id).unwrap(), 8);
}

#[test]
fn test_member_overrunning_declared_size_fails() {
    let mut src = TestSource::default();
    let t_int = src.base("int", 4);
    let member = src.member(Some("f_int"), t_int, 4);
    let root = src.struct_def(Some("too_small"), 6, vec![member]);

    let session = Session::new();
    let error = convert(&src, &session, root).unwrap_err();
    assert!(matches!(
        error,
        ConvertError::SizeMismatch {
            declared: 6,
            actual: 8,
            ..
        }
    ));
}

#[test]
fn test_mutually_recursive_structs_share_handles() {
    let mut src = TestSource::default();
    let a = src.struct_def(Some("A"), 8, vec![]);
    let b = src.struct_def(Some("B"), 8, vec![]);
    let ptr_b = src.pointer(Some(b));
    let ptr_a = src.pointer(Some(a));
    let m_a = src.member(Some("b_ptr"), ptr_b, 0);
    let m_b = src.member(Some("a_ptr"), ptr_a, 0);
    src.nodes[a].children.push(m_a);
    src.nodes[b].children.push(m_b);

    let session = Session::new();
    let a_id = convert(&src, &session, a).unwrap();

    let a_layout = session.table().get(a_id).unwrap();
    let b_id = match session.table().get(a_layout.fields().unwrap()[0].layout) {
        Ok(NativeLayout::Pointer { target: Some(id) }) => id,
        other => panic!("expected pointer to B, got {:?}", other),
    };

    // B was completed, not left as a forward declaration.
    let b_layout = session.table().get(b_id).unwrap();
    assert_eq!(b_layout.name(), Some("B"));
    assert_eq!(b_layout.fields().unwrap().len(), 1);

    // B's pointer field resolves back to A's shared handle.
    let back = match session.table().get(b_layout.fields().unwrap()[0].layout) {
        Ok(NativeLayout::Pointer { target: Some(id) }) => id,
        other => panic!("expected pointer to A, got {:?}", other),
    };
    assert_eq!(back, a_id);

    // Converting B directly returns the same shared handle.
    assert_eq!(convert(&src, &session, b).unwrap(), b_id);
}

#[test]
fn test_self_referential_struct() {
    let mut src = TestSource::default();
    let t_int = src.base("int", 4);
    let node = src.struct_def(Some("list_node"), 16, vec![]);
    let ptr = src.pointer(Some(node));
    let m_next = src.member(Some("next"), ptr, 0);
    let m_value = src.member(Some("value"), t_int, 8);
    src.nodes[node].children.push(m_next);
    src.nodes[node].children.push(m_value);

    let session = Session::new();
    let id = convert(&src, &session, node).unwrap();
    let layout = session.table().get(id).unwrap();

    assert_eq!(
        field_names(&layout),
        vec!["next", "value", "__padding_0"]
    );
    let next = session
        .table()
        .get(layout.fields().unwrap()[0].layout)
        .unwrap();
    assert_eq!(next, NativeLayout::Pointer { target: Some(id) });
}

#[test]
fn test_converting_twice_returns_identical_handle() {
    let mut src = TestSource::default();
    let t_int = src.base("int", 4);
    let member = src.member(Some("f_int"), t_int, 0);
    let root = src.struct_def(Some("once"), 4, vec![member]);

    let session = Session::new();
    let first = convert(&src, &session, root).unwrap();
    let second = convert(&src, &session, root).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_embedded_value_cycle_is_detected() {
    let mut src = TestSource::default();
    let a = src.struct_def(Some("A"), 4, vec![]);
    let b = src.struct_def(Some("B"), 4, vec![]);
    let m_a = src.member(Some("b"), b, 0);
    let m_b = src.member(Some("a"), a, 0);
    src.nodes[a].children.push(m_a);
    src.nodes[b].children.push(m_b);

    let session = Session::new();
    let error = convert(&src, &session, a).unwrap_err();
    assert!(matches!(error, ConvertError::CycleDetected { .. }));
}

#[test]
fn test_anonymous_union_storage_aliases() {
    let mut src = TestSource::default();
    let t_char = src.base("char", 1);
    let t_short = src.base("short int", 2);
    let u_members = vec![
        src.member(Some("f_char"), t_char, 0),
        src.member(Some("f_short"), t_short, 0),
    ];
    let anon_union = src.union_def(None, 2, u_members);
    let anon_member = src.member(None, anon_union, 0);
    let root = src.struct_def(Some("anon_union_struct"), 2, vec![anon_member]);

    let session = Session::new();
    let id = convert(&src, &session, root).unwrap();

    let layout = session.table().get(id).unwrap();
    let fields = layout.fields().unwrap();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].name, None);
    let union_layout = session.table().get(fields[0].layout).unwrap();
    assert_eq!(union_layout.name(), Some("anon_union_1"));

    // Little-endian: the low byte of the short is visible through the char.
    let value = session
        .table()
        .read_value(id, &[0x34, 0x12], Endianness::Little)
        .unwrap();
    assert_eq!(value.field("f_short").unwrap(), &Value::Int(0x1234));
    assert_eq!(value.field("f_char").unwrap(), &Value::Int(0x34));
}

#[test]
fn test_nested_anonymous_unions_alias_through_both_levels() {
    let mut src = TestSource::default();
    let t_char = src.base("char", 1);
    let t_short = src.base("short int", 2);
    let t_int = src.base("int", 4);

    let inner_members = vec![
        src.member(Some("f_short"), t_short, 0),
        src.member(Some("f_int"), t_int, 0),
    ];
    let inner = src.union_def(None, 4, inner_members);
    let inner_member = src.member(None, inner, 0);
    let char_member = src.member(Some("f_char"), t_char, 0);
    let outer = src.union_def(None, 4, vec![char_member, inner_member]);
    let outer_member = src.member(None, outer, 0);
    let root = src.struct_def(Some("nested_anon_union_struct"), 4, vec![outer_member]);

    let session = Session::new();
    let id = convert(&src, &session, root).unwrap();

    let value = session
        .table()
        .read_value(id, &[0x34, 0x12, 0x00, 0x00], Endianness::Little)
        .unwrap();
    assert_eq!(value.field("f_short").unwrap(), &Value::Int(0x1234));
    assert_eq!(value.field("f_char").unwrap(), &Value::Int(0x34));
}

#[test]
fn test_named_union_is_a_singleton() {
    let mut src = TestSource::default();
    let t_char = src.base("char", 1);
    let t_short = src.base("short int", 2);
    let u_members = vec![
        src.member(Some("f_char"), t_char, 0),
        src.member(Some("f_short"), t_short, 0),
    ];
    let union = src.union_def(Some("u"), 2, u_members);
    let members = vec![
        src.member(Some("first"), union, 0),
        src.member(Some("second"), union, 2),
    ];
    let root = src.struct_def(Some("union_struct"), 4, vec![members[0], members[1]]);

    let session = Session::new();
    let id = convert(&src, &session, root).unwrap();
    let layout = session.table().get(id).unwrap();
    let fields = layout.fields().unwrap();
    assert_eq!(fields[0].layout, fields[1].layout);
}

#[test]
fn test_union_padded_to_declared_size() {
    let mut src = TestSource::default();
    let t_int = src.base("int", 4);
    let t_char = src.base("char", 1);
    let int_array = src.array(t_int, &[Some(0)]);
    let members = vec![
        src.member(Some("bytes"), t_char, 0),
        src.member(Some("word"), int_array, 0),
    ];
    let root = src.union_def(Some("padded_union"), 8, members);

    let session = Session::new();
    let id = convert(&src, &session, root).unwrap();
    assert_eq!(session.table().size_of(id).unwrap(), 8);
    let layout = session.table().get(id).unwrap();
    assert_eq!(
        field_names(&layout),
        vec!["bytes", "word", "__padding_0"]
    );
}

#[test]
fn test_pointer_to_undefined_type_degrades_to_opaque() {
    let mut src = TestSource::default();
    let decl = src.struct_decl("missing_type");
    let ptr = src.pointer(Some(decl));
    let member = src.member(Some("p"), ptr, 0);
    let root = src.struct_def(Some("holder"), 8, vec![member]);

    let session = Session::new();
    let id = convert(&src, &session, root).unwrap();
    let layout = session.table().get(id).unwrap();
    let p = session
        .table()
        .get(layout.fields().unwrap()[0].layout)
        .unwrap();
    assert_eq!(p, NativeLayout::Pointer { target: None });
}

#[test]
fn test_missing_definition_is_fatal_for_the_root() {
    let mut src = TestSource::default();
    let decl = src.struct_decl("missing_type");

    let session = Session::new();
    let error = convert(&src, &session, decl).unwrap_err();
    match error {
        ConvertError::MissingDefinition { name } => assert_eq!(name, "missing_type"),
        other => panic!("expected MissingDefinition, got {}", other),
    }
}

#[test]
fn test_declaration_resolves_to_definition_in_another_unit() {
    let mut src = TestSource::default();
    let t_int = src.base("int", 4);
    let member = src.member(Some("f_int"), t_int, 0);
    let definition = src.struct_def(Some("elsewhere"), 4, vec![member]);
    let decl = src.struct_decl("elsewhere");
    let ptr = src.pointer(Some(decl));
    let holder_member = src.member(Some("p"), ptr, 0);
    let root = src.struct_def(Some("holder"), 8, vec![holder_member]);

    let session = Session::new();
    let id = convert(&src, &session, root).unwrap();
    let layout = session.table().get(id).unwrap();
    let target = match session.table().get(layout.fields().unwrap()[0].layout) {
        Ok(NativeLayout::Pointer { target: Some(id) }) => id,
        other => panic!("expected resolved pointer, got {:?}", other),
    };

    // The pending declaration was completed after the ordered pass.
    let resolved = session.table().get(target).unwrap();
    assert_eq!(resolved.name(), Some("elsewhere"));
    assert_eq!(field_names(&resolved), vec!["f_int"]);
    assert_eq!(convert(&src, &session, definition).unwrap(), target);
}

#[test]
fn test_flexible_trailing_array() {
    let mut src = TestSource::default();
    let t_int = src.base("int", 4);
    let t_char = src.base("char", 1);
    let data = src.array(t_char, &[None]);
    let members = vec![
        src.member(Some("len"), t_int, 0),
        src.member(Some("data"), data, 4),
    ];
    let root = src.struct_def(Some("flexible"), 4, vec![members[0], members[1]]);

    let session = Session::new();
    let id = convert(&src, &session, root).unwrap();
    let layout = session.table().get(id).unwrap();
    assert_eq!(field_names(&layout), vec!["len", "data"]);
    let data_layout = session
        .table()
        .get(layout.fields().unwrap()[1].layout)
        .unwrap();
    assert!(matches!(data_layout, NativeLayout::Array { count: 0, .. }));
    assert_eq!(session.table().size_of(id).unwrap(), 4);
}

#[test]
fn test_array_count_is_upper_bound_plus_one() {
    let mut src = TestSource::default();
    let t_int = src.base("int", 4);
    let array = src.array(t_int, &[Some(9)]);

    let session = Session::new();
    let id = convert(&src, &session, array).unwrap();
    assert!(matches!(
        session.table().get(id).unwrap(),
        NativeLayout::Array { count: 10, .. }
    ));
    assert_eq!(session.table().size_of(id).unwrap(), 40);
}

#[test]
fn test_multi_dimensional_array_nests_innermost_first() {
    let mut src = TestSource::default();
    let t_int = src.base("int", 4);
    let array = src.array(t_int, &[Some(1), Some(2)]);

    let session = Session::new();
    let id = convert(&src, &session, array).unwrap();
    let outer = session.table().get(id).unwrap();
    let inner = match outer {
        NativeLayout::Array { element, count: 2 } => session.table().get(element).unwrap(),
        other => panic!("expected outer array of 2, got {}", other),
    };
    assert!(matches!(inner, NativeLayout::Array { count: 3, .. }));
    assert_eq!(session.table().size_of(id).unwrap(), 24);
}

#[test]
fn test_enum_reduces_to_underlying_int() {
    let mut src = TestSource::default();
    let t_uint = src.base("unsigned int", 4);
    let enum_node = src.add(TestNode {
        kind: Some(NodeKind::Enumeration),
        name: Some("color".to_string()),
        byte_size: Some(4),
        referenced: Some(t_uint),
        ..Default::default()
    });

    let session = Session::new();
    let id = convert(&src, &session, enum_node).unwrap();
    let layout = session.table().get(id).unwrap();
    let underlying = match layout {
        NativeLayout::Enum { underlying } => session.table().get(underlying).unwrap(),
        other => panic!("expected enum, got {}", other),
    };
    assert_eq!(underlying, NativeLayout::Base(BaseType::Int(IntType::U32)));
    assert_eq!(session.table().size_of(id).unwrap(), 4);
}

#[test]
fn test_function_pointer_is_opaque() {
    let mut src = TestSource::default();
    let subroutine = src.add(TestNode {
        kind: Some(NodeKind::Subroutine),
        ..Default::default()
    });
    let ptr = src.pointer(Some(subroutine));
    let member = src.member(Some("handler"), ptr, 0);
    let root = src.struct_def(Some("callbacks"), 8, vec![member]);

    let session = Session::new();
    let id = convert(&src, &session, root).unwrap();
    let layout = session.table().get(id).unwrap();
    let handler = match session.table().get(layout.fields().unwrap()[0].layout) {
        Ok(NativeLayout::Pointer { target: Some(id) }) => session.table().get(id).unwrap(),
        other => panic!("expected pointer, got {:?}", other),
    };
    assert_eq!(handler, NativeLayout::Pointer { target: None });
}

#[test]
fn test_const_void_pointer_is_opaque() {
    let mut src = TestSource::default();
    let bare_const = src.qualifier(NodeKind::Const, None);
    let ptr = src.pointer(Some(bare_const));
    let member = src.member(Some("f_const_void"), ptr, 0);
    let root = src.struct_def(Some("pointers_struct"), 8, vec![member]);

    let session = Session::new();
    let id = convert(&src, &session, root).unwrap();
    let layout = session.table().get(id).unwrap();
    let p = session
        .table()
        .get(layout.fields().unwrap()[0].layout)
        .unwrap();
    assert_eq!(p, NativeLayout::Pointer { target: None });
}

#[test]
fn test_qualifiers_unwrap_transparently() {
    let mut src = TestSource::default();
    let t_int = src.base("int", 4);
    let volat = src.qualifier(NodeKind::Volatile, Some(t_int));
    let konst = src.qualifier(NodeKind::Const, Some(volat));
    let typedef = src.add(TestNode {
        kind: Some(NodeKind::Typedef),
        name: Some("counter_t".to_string()),
        referenced: Some(konst),
        ..Default::default()
    });
    let member = src.member(Some("count"), typedef, 0);
    let root = src.struct_def(Some("wrapped"), 4, vec![member]);

    let session = Session::new();
    let id = convert(&src, &session, root).unwrap();
    let layout = session.table().get(id).unwrap();
    let field = session
        .table()
        .get(layout.fields().unwrap()[0].layout)
        .unwrap();
    assert_eq!(field, NativeLayout::Base(BaseType::Int(IntType::S32)));
}

#[test]
fn test_bit_fields_share_a_storage_unit() {
    let mut src = TestSource::default();
    let t_ulong = src.base("long unsigned int", 8);
    let t_int = src.base("int", 4);

    let members = vec![
        src.member(Some("flags"), t_ulong, 0),
        src.member(Some("count"), t_int, 8),
        src.bit_member("stopped", t_ulong, 16, 1),
        src.bit_member("flow_stopped", t_ulong, 16, 1),
        src.bit_member("unused", t_ulong, 16, 62),
        src.member(Some("hw_stopped"), t_int, 24),
    ];
    let root = src.struct_def(Some("tty_struct"), 32, members);

    let session = Session::new();
    let id = convert(&src, &session, root).unwrap();
    let layout = session.table().get(id).unwrap();

    assert_eq!(
        field_names(&layout),
        vec![
            "flags",
            "count",
            "__padding_0",
            "stopped",
            "hw_stopped",
            "__padding_1"
        ]
    );
    let stopped = &layout.fields().unwrap()[3];
    assert_eq!(stopped.offset, 16);
    assert_eq!(stopped.bit_size, Some(1));
    assert_eq!(session.table().size_of(id).unwrap(), 32);

    // The first bit of the storage unit reads back through the field.
    let mut buf = [0u8; 32];
    buf[16] = 0b11;
    let value = session
        .table()
        .read_value(id, &buf, Endianness::Little)
        .unwrap();
    assert_eq!(value.field("stopped").unwrap(), &Value::Int(1));
}

#[test]
fn test_unknown_base_type_name_fails() {
    let mut src = TestSource::default();
    let t_float = src.base("float", 4);
    let member = src.member(Some("f_float"), t_float, 0);
    let root = src.struct_def(Some("floats"), 4, vec![member]);

    let session = Session::new();
    let error = convert(&src, &session, root).unwrap_err();
    match error {
        ConvertError::UnsupportedBaseType { name } => assert_eq!(name, "float"),
        other => panic!("expected UnsupportedBaseType, got {}", other),
    }
}

#[test]
fn test_struct_definition_without_size_fails() {
    let mut src = TestSource::default();
    let t_int = src.base("int", 4);
    let member = src.member(Some("f_int"), t_int, 0);
    let root = src.add(TestNode {
        kind: Some(NodeKind::Structure),
        name: Some("sizeless".to_string()),
        children: vec![member],
        ..Default::default()
    });

    let session = Session::new();
    let error = convert(&src, &session, root).unwrap_err();
    assert!(matches!(error, ConvertError::MissingAttribute { .. }));
}

#[test]
fn test_anonymous_aggregates_get_unique_names() {
    let mut src = TestSource::default();
    let t_int = src.base("int", 4);
    let inner_member_a = src.member(Some("x"), t_int, 0);
    let inner_a = src.struct_def(None, 4, vec![inner_member_a]);
    let inner_member_b = src.member(Some("y"), t_int, 0);
    let inner_b = src.struct_def(None, 4, vec![inner_member_b]);
    let members = vec![
        src.member(Some("first"), inner_a, 0),
        src.member(Some("second"), inner_b, 4),
    ];
    let root = src.struct_def(Some("outer"), 8, members);

    let session = Session::new();
    let id = convert(&src, &session, root).unwrap();
    let layout = session.table().get(id).unwrap();
    let fields = layout.fields().unwrap();

    let first = session.table().get(fields[0].layout).unwrap();
    let second = session.table().get(fields[1].layout).unwrap();
    assert_ne!(fields[0].layout, fields[1].layout);
    assert_eq!(first.name(), Some("anon_struct_1"));
    assert_eq!(second.name(), Some("anon_struct_2"));
}

#[test]
fn test_anonymous_declaration_is_invalid() {
    let mut src = TestSource::default();
    let decl = src.add(TestNode {
        kind: Some(NodeKind::Structure),
        declaration: true,
        ..Default::default()
    });

    let session = Session::new();
    let error = convert(&src, &session, decl).unwrap_err();
    assert!(matches!(error, ConvertError::InvalidDeclaration { .. }));
}

#[test]
fn test_concurrent_conversions_share_one_session() {
    let mut src = TestSource::default();
    let a = src.struct_def(Some("A"), 8, vec![]);
    let b = src.struct_def(Some("B"), 8, vec![]);
    let ptr_b = src.pointer(Some(b));
    let ptr_a = src.pointer(Some(a));
    let m_a = src.member(Some("b_ptr"), ptr_b, 0);
    let m_b = src.member(Some("a_ptr"), ptr_a, 0);
    src.nodes[a].children.push(m_a);
    src.nodes[b].children.push(m_b);

    let session = Session::new();
    let (a_id, b_id) = std::thread::scope(|scope| {
        let a_handle = scope.spawn(|| convert(&src, &session, a).unwrap());
        let b_handle = scope.spawn(|| convert(&src, &session, b).unwrap());
        (a_handle.join().unwrap(), b_handle.join().unwrap())
    });

    // Whatever the interleaving, both names resolved to single completed
    // layouts and converting again agrees with the originals.
    assert_ne!(a_id, b_id);
    assert_eq!(convert(&src, &session, a).unwrap(), a_id);
    assert_eq!(convert(&src, &session, b).unwrap(), b_id);
    assert_eq!(session.table().get(a_id).unwrap().fields().unwrap().len(), 1);
    assert_eq!(session.table().get(b_id).unwrap().fields().unwrap().len(), 1);
}
