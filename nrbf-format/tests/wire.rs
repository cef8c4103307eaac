//! Byte-exact stream vectors and the errors malformed input produces.

use nrbf_format::{
    decode, encode, Array, ClassInstance, Error, Graph, MemberType, Object, PrimitiveType,
    Record, Value,
};

const HEADER: [u8; 17] = [
    0x00, 0x01, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00,
];

fn stream(body: &[u8]) -> Vec<u8> {
    let mut bytes = HEADER.to_vec();
    bytes.extend_from_slice(body);
    bytes
}

fn lps(s: &str) -> Vec<u8> {
    assert!(s.len() < 128);
    let mut out = vec![s.len() as u8];
    out.extend_from_slice(s.as_bytes());
    out
}

fn object_array_of_nulls(count: usize) -> Graph {
    let mut graph = Graph::new();
    let root = graph.add_array(Array::new(MemberType::Object, vec![Value::Null; count]));
    graph.set_root(root);
    graph
}

#[test]
fn null_root() {
    let graph = Graph::new();
    let bytes = encode(&graph).unwrap();
    assert_eq!(bytes, stream(&[0x0a, 0x0b]));
    assert_eq!(decode(&bytes).unwrap(), graph);
}

#[test]
fn string_root() {
    let mut graph = Graph::new();
    let root = graph.add_string("x");
    graph.set_root(root);

    let bytes = encode(&graph).unwrap();
    assert_eq!(bytes, stream(&[0x06, 0x01, 0x00, 0x00, 0x00, 0x01, b'x', 0x0b]));
    assert_eq!(decode(&bytes).unwrap(), graph);
}

#[test]
fn shared_string_is_referenced() {
    let mut graph = Graph::new();
    let x = graph.add_string("x");
    let root = graph.add_array(Array::new(MemberType::Object, vec![x.into(), x.into()]));
    graph.set_root(root);

    let bytes = encode(&graph).unwrap();
    assert_eq!(
        bytes,
        stream(&[
            0x10, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, // object[2], id 1
            0x06, 0x02, 0x00, 0x00, 0x00, 0x01, b'x', // "x", id 2
            0x09, 0x02, 0x00, 0x00, 0x00, // reference to id 2
            0x0b,
        ])
    );

    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded, graph);
    let array = decoded
        .get(decoded.root().as_handle().unwrap())
        .and_then(Object::as_array)
        .unwrap();
    assert_eq!(array.items[0], array.items[1]);
}

#[test]
fn class_with_library() {
    let mut graph = Graph::new();
    let root = graph.add_class(
        ClassInstance::new("Demo.Pair", "Demo")
            .with_member("A", Value::primitive(1))
            .with_member("B", Value::Null),
    );
    graph.set_root(root);

    let mut body = vec![0x0c, 0x02, 0x00, 0x00, 0x00];
    body.extend(lps("Demo"));
    body.extend([0x05, 0x01, 0x00, 0x00, 0x00]);
    body.extend(lps("Demo.Pair"));
    body.extend([0x02, 0x00, 0x00, 0x00]);
    body.extend(lps("A"));
    body.extend(lps("B"));
    body.extend([0x00, 0x02, 0x08]); // Primitive, Object; Int32
    body.extend([0x02, 0x00, 0x00, 0x00]); // library id
    body.extend([0x01, 0x00, 0x00, 0x00]); // A
    body.push(0x0a); // B
    body.push(0x0b);

    let bytes = encode(&graph).unwrap();
    assert_eq!(bytes, stream(&body));

    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded, graph);
    let class = decoded
        .get(decoded.root().as_handle().unwrap())
        .and_then(Object::as_class)
        .unwrap();
    assert_eq!(class.library.as_deref(), Some("Demo"));
    assert_eq!(
        class.members[0].member_type,
        Some(MemberType::Primitive(PrimitiveType::Int32))
    );
    assert_eq!(class.members[1].member_type, Some(MemberType::Object));
}

#[test]
fn primitive_array() {
    let mut graph = Graph::new();
    let root = graph.add_array(Array::new(
        MemberType::Primitive(PrimitiveType::Int16),
        vec![Value::primitive(1i16), Value::primitive(-1i16)],
    ));
    graph.set_root(root);

    let bytes = encode(&graph).unwrap();
    assert_eq!(
        bytes,
        stream(&[
            0x0f, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x07, 0x01, 0x00, 0xff, 0xff,
            0x0b,
        ])
    );
    assert_eq!(decode(&bytes).unwrap(), graph);
}

#[test]
fn null_run_thresholds() {
    let prefix = |len: u8| vec![0x10, 0x01, 0x00, 0x00, 0x00, len, 0x00, 0x00, 0x00];

    let mut one = prefix(1);
    one.extend([0x0a, 0x0b]);
    assert_eq!(encode(&object_array_of_nulls(1)).unwrap(), stream(&one));

    let mut run = prefix(255);
    run.extend([0x0d, 0xff, 0x0b]);
    assert_eq!(encode(&object_array_of_nulls(255)).unwrap(), stream(&run));

    let mut long = vec![0x10, 0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00];
    long.extend([0x0e, 0x00, 0x01, 0x00, 0x00, 0x0b]);
    assert_eq!(encode(&object_array_of_nulls(256)).unwrap(), stream(&long));

    for count in [1, 255, 256] {
        let graph = object_array_of_nulls(count);
        assert_eq!(decode(&encode(&graph).unwrap()).unwrap(), graph);
    }
}

#[test]
fn null_runs_decode_like_single_nulls() {
    let mut single = vec![0x10, 0x01, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00];
    single.extend([0x0a, 0x0a, 0x0a, 0x0b]);
    let mut run = vec![0x10, 0x01, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00];
    run.extend([0x0d, 0x03, 0x0b]);
    let mut wide = vec![0x10, 0x01, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00];
    wide.extend([0x0e, 0x03, 0x00, 0x00, 0x00, 0x0b]);

    let expected = object_array_of_nulls(3);
    assert_eq!(decode(&stream(&single)).unwrap(), expected);
    assert_eq!(decode(&stream(&run)).unwrap(), expected);
    assert_eq!(decode(&stream(&wide)).unwrap(), expected);
}

#[test]
fn null_run_overflow_and_zero_are_malformed() {
    let mut over = vec![0x10, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00];
    over.extend([0x0d, 0x03, 0x0b]);
    assert!(matches!(
        decode(&stream(&over)),
        Err(Error::MalformedStream { offset: 26, .. })
    ));

    let mut zero = vec![0x10, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00];
    zero.extend([0x0d, 0x00, 0x0b]);
    assert!(matches!(decode(&stream(&zero)), Err(Error::MalformedStream { .. })));
}

fn holder_with_reference() -> Vec<u8> {
    // SystemClassWithMembersAndTypes "Holder", id 1, one Object member
    let mut body = vec![0x04, 0x01, 0x00, 0x00, 0x00];
    body.extend(lps("Holder"));
    body.extend([0x01, 0x00, 0x00, 0x00]);
    body.extend(lps("Item"));
    body.push(0x02);
    body.extend([0x09, 0x02, 0x00, 0x00, 0x00]);
    body
}

#[test]
fn forward_reference_is_resolved() {
    let mut body = holder_with_reference();
    body.extend([0x06, 0x02, 0x00, 0x00, 0x00]);
    body.extend(lps("late"));
    body.push(0x0b);

    let graph = decode(&stream(&body)).unwrap();
    let holder = graph
        .get(graph.root().as_handle().unwrap())
        .and_then(Object::as_class)
        .unwrap();
    let item = holder.member("Item").and_then(Value::as_handle).unwrap();
    assert_eq!(graph.get(item).and_then(Object::as_str), Some("late"));
    assert_eq!(graph.handle_for_id(2), Some(item));
}

#[test]
fn unresolved_reference_is_dangling() {
    let mut body = holder_with_reference();
    body.push(0x0b);
    assert!(matches!(
        decode(&stream(&body)),
        Err(Error::DanglingReference { id: 2 })
    ));
}

#[test]
fn reference_to_id_zero_is_dangling() {
    let body = [
        0x10, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x09, 0x00, 0x00, 0x00, 0x00, 0x0b,
    ];
    assert!(matches!(
        decode(&stream(&body)),
        Err(Error::DanglingReference { id: 0 })
    ));
}

#[test]
fn redefined_id_is_malformed() {
    let body = [
        0x10, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, // object[1], id 1
        0x06, 0x01, 0x00, 0x00, 0x00, 0x00, // "" also claiming id 1
        0x0b,
    ];
    assert!(matches!(
        decode(&stream(&body)),
        Err(Error::MalformedStream { offset: 26, .. })
    ));
}

#[test]
fn defining_id_zero_is_malformed() {
    let body = [0x06, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0b];
    assert!(matches!(
        decode(&stream(&body)),
        Err(Error::MalformedStream { offset: 17, .. })
    ));
}

#[test]
fn unknown_record_type() {
    assert!(matches!(
        decode(&stream(&[0x12])),
        Err(Error::UnknownRecordType { tag: 0x12, offset: 17 })
    ));
    assert!(matches!(
        Record::read(&[0xff][..]),
        Err(Error::UnknownRecordType { tag: 0xff, offset: 0 })
    ));
}

#[test]
fn header_must_come_first() {
    assert!(matches!(decode(&[]), Err(Error::InvalidHeader(_))));
    assert!(matches!(decode(&[0x0a, 0x0b]), Err(Error::InvalidHeader(_))));

    let mut old = stream(&[0x0a, 0x0b]);
    old[13] = 1; // minor version 1
    assert!(matches!(decode(&old), Err(Error::InvalidHeader(_))));
}

#[test]
fn trailing_bytes_are_malformed() {
    let bytes = stream(&[0x0a, 0x0b, 0x00]);
    assert!(matches!(
        decode(&bytes),
        Err(Error::MalformedStream { offset: 19, .. })
    ));
}

#[test]
fn missing_message_end_is_truncation() {
    let bytes = stream(&[0x0a]);
    let err = decode(&bytes).unwrap_err();
    assert!(err.is_truncation(), "{:?}", err);
}

#[test]
fn every_truncation_fails() {
    let mut graph = Graph::new();
    let name = graph.add_string("name");
    let numbers = graph.add_array(Array::new(
        MemberType::Primitive(PrimitiveType::Int32),
        vec![Value::primitive(1), Value::primitive(2)],
    ));
    let root = graph.add_class(
        ClassInstance::new("Demo.Item", "Demo")
            .with_member("Name", name)
            .with_member("Numbers", numbers)
            .with_member("Flag", Value::primitive(true)),
    );
    graph.set_root(root);

    let bytes = encode(&graph).unwrap();
    assert_eq!(decode(&bytes).unwrap(), graph);

    for len in 0..bytes.len() {
        let err = decode(&bytes[..len]).unwrap_err();
        if len < HEADER.len() {
            assert!(matches!(err, Error::InvalidHeader(_)), "len {}: {:?}", len, err);
        } else {
            assert!(err.is_truncation(), "len {}: {:?}", len, err);
        }
    }
}

#[test]
fn method_call_is_unsupported() {
    assert!(matches!(
        decode(&stream(&[0x15, 0x00, 0x00, 0x00, 0x00])),
        Err(Error::MalformedStream { offset: 17, .. })
    ));
}
