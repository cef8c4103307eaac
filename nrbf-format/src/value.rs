//! The decoded object graph.
//!
//! Objects live in an arena owned by [`Graph`] and refer to each other
//! through [`Handle`]s, so shared and cyclic structures need no reference
//! counting. Two `Value::Object`s holding the same handle are the same
//! instance, which is what the writer turns back into a `MemberReference`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::types::{MemberType, PrimitiveValue};

/// Index of an object in its [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub(crate) usize);

impl Handle {
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Primitive(PrimitiveValue),
    Object(Handle),
}

impl Value {
    pub fn primitive(value: impl Into<PrimitiveValue>) -> Value {
        Value::Primitive(value.into())
    }

    #[inline(always)]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_handle(&self) -> Option<Handle> {
        match self {
            Value::Object(handle) => Some(*handle),
            _ => None,
        }
    }

    pub fn as_primitive(&self) -> Option<&PrimitiveValue> {
        match self {
            Value::Primitive(value) => Some(value),
            _ => None,
        }
    }
}

impl From<Handle> for Value {
    fn from(handle: Handle) -> Self {
        Value::Object(handle)
    }
}

impl From<PrimitiveValue> for Value {
    fn from(value: PrimitiveValue) -> Self {
        Value::Primitive(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    String(String),
    Array(Array),
    Class(ClassInstance),
}

impl Object {
    pub fn kind(&self) -> &'static str {
        match self {
            Object::String(_) => "string",
            Object::Array(_) => "array",
            Object::Class(_) => "class",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Object::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassInstance> {
        match self {
            Object::Class(class) => Some(class),
            _ => None,
        }
    }
}

/// A single-dimension array.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    pub element_type: MemberType,
    pub lower_bound: i32,
    pub items: Vec<Value>,
}

impl Array {
    pub fn new(element_type: MemberType, items: Vec<Value>) -> Array {
        Array {
            element_type,
            lower_bound: 0,
            items,
        }
    }

    pub fn with_lower_bound(mut self, lower_bound: i32) -> Array {
        self.lower_bound = lower_bound;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    /// `None` when the type was not on the wire, or should be inferred from
    /// the value when written.
    pub member_type: Option<MemberType>,
    pub value: Value,
}

/// An instance of a named class. `library` is `None` for classes of the
/// core library.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassInstance {
    pub name: String,
    pub library: Option<String>,
    pub members: Vec<Member>,
}

impl ClassInstance {
    pub fn new(name: impl Into<String>, library: impl Into<String>) -> ClassInstance {
        ClassInstance {
            name: name.into(),
            library: Some(library.into()),
            members: Vec::new(),
        }
    }

    pub fn system(name: impl Into<String>) -> ClassInstance {
        ClassInstance {
            name: name.into(),
            library: None,
            members: Vec::new(),
        }
    }

    pub fn with_member(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.members.push(Member {
            name: name.into(),
            member_type: None,
            value: value.into(),
        });
        self
    }

    pub fn with_typed_member(
        mut self,
        name: impl Into<String>,
        member_type: MemberType,
        value: impl Into<Value>,
    ) -> Self {
        self.members.push(Member {
            name: name.into(),
            member_type: Some(member_type),
            value: value.into(),
        });
        self
    }

    /// First member called `name`.
    pub fn member(&self, name: &str) -> Option<&Value> {
        self.members.iter().find(|m| m.name == name).map(|m| &m.value)
    }

    pub fn is_system(&self) -> bool {
        self.library.is_none()
    }
}

/// An object graph: an arena of objects and the root value.
///
/// Graphs produced by the decoder also remember the stream's root id and
/// which wire id each object was defined under.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    objects: Vec<Object>,
    root: Value,
    root_id: Option<i32>,
    ids: BTreeMap<i32, Handle>,
}

impl Graph {
    pub fn new() -> Graph {
        Graph::default()
    }

    pub(crate) fn from_parts(
        objects: Vec<Object>,
        root: Value,
        root_id: Option<i32>,
        ids: BTreeMap<i32, Handle>,
    ) -> Graph {
        Graph {
            objects,
            root,
            root_id,
            ids,
        }
    }

    pub fn add(&mut self, object: Object) -> Handle {
        self.objects.push(object);
        Handle(self.objects.len() - 1)
    }

    pub fn add_string(&mut self, value: impl Into<String>) -> Handle {
        self.add(Object::String(value.into()))
    }

    pub fn add_array(&mut self, array: Array) -> Handle {
        self.add(Object::Array(array))
    }

    pub fn add_class(&mut self, class: ClassInstance) -> Handle {
        self.add(Object::Class(class))
    }

    pub fn get(&self, handle: Handle) -> Option<&Object> {
        self.objects.get(handle.0)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut Object> {
        self.objects.get_mut(handle.0)
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn set_root(&mut self, root: impl Into<Value>) {
        self.root = root.into();
    }

    /// The root id from the stream header, for decoded graphs.
    pub fn root_id(&self) -> Option<i32> {
        self.root_id
    }

    /// The object a decoded stream defined under `id`.
    pub fn handle_for_id(&self, id: i32) -> Option<Handle> {
        self.ids.get(&id).copied()
    }

    /// Wire ids of a decoded graph in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = (i32, Handle)> + '_ {
        self.ids.iter().map(|(id, handle)| (*id, *handle))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &Object)> + '_ {
        self.objects
            .iter()
            .enumerate()
            .map(|(index, object)| (Handle(index), object))
    }
}

impl PartialEq for Graph {
    /// Isomorphism of the parts reachable from the root. Handles are paired
    /// up as they are first met and every later meeting must agree, so
    /// sharing and cycles have to match, not just contents.
    fn eq(&self, other: &Self) -> bool {
        let mut forward: HashMap<Handle, Handle> = HashMap::new();
        let mut backward: HashMap<Handle, Handle> = HashMap::new();
        let mut stack: Vec<(&Value, &Value)> = vec![(&self.root, &other.root)];

        while let Some(pair) = stack.pop() {
            let (a, b) = match pair {
                (Value::Null, Value::Null) => continue,
                (Value::Primitive(x), Value::Primitive(y)) if x == y => continue,
                (Value::Object(a), Value::Object(b)) => (*a, *b),
                _ => return false,
            };

            match (forward.get(&a), backward.get(&b)) {
                (Some(mapped_a), Some(mapped_b)) if *mapped_a == b && *mapped_b == a => continue,
                (None, None) => {
                    forward.insert(a, b);
                    backward.insert(b, a);
                }
                _ => return false,
            }

            let (left, right) = match (self.get(a), other.get(b)) {
                (Some(left), Some(right)) => (left, right),
                _ => return false,
            };

            match (left, right) {
                (Object::String(x), Object::String(y)) => {
                    if x != y {
                        return false;
                    }
                }
                (Object::Array(x), Object::Array(y)) => {
                    if x.element_type != y.element_type
                        || x.lower_bound != y.lower_bound
                        || x.items.len() != y.items.len()
                    {
                        return false;
                    }
                    stack.extend(x.items.iter().zip(&y.items));
                }
                (Object::Class(x), Object::Class(y)) => {
                    if x.name != y.name
                        || x.library != y.library
                        || x.members.len() != y.members.len()
                    {
                        return false;
                    }
                    for (m, n) in x.members.iter().zip(&y.members) {
                        if m.name != n.name {
                            return false;
                        }
                        // An untyped side matches any declared type.
                        if let (Some(s), Some(t)) = (&m.member_type, &n.member_type) {
                            if s != t {
                                return false;
                            }
                        }
                        stack.push((&m.value, &n.value));
                    }
                }
                _ => return false,
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrimitiveType;

    fn pair(shared: bool) -> Graph {
        let mut graph = Graph::new();
        let first = graph.add_string("x");
        let second = if shared { first } else { graph.add_string("x") };
        let root = graph.add_array(Array::new(
            MemberType::Object,
            vec![first.into(), second.into()],
        ));
        graph.set_root(root);
        graph
    }

    #[test]
    fn equality_ignores_arena_order() {
        let mut a = Graph::new();
        let s = a.add_string("hi");
        let root = a.add_class(ClassInstance::system("Box").with_member("v", s));
        a.set_root(root);

        let mut b = Graph::new();
        let root = b.add_class(ClassInstance::system("Box"));
        let s = b.add_string("hi");
        if let Some(Object::Class(class)) = b.get_mut(root) {
            class.members.push(Member {
                name: "v".into(),
                member_type: None,
                value: s.into(),
            });
        }
        b.set_root(root);

        assert_eq!(a, b);
    }

    #[test]
    fn equality_respects_sharing() {
        assert_eq!(pair(true), pair(true));
        assert_eq!(pair(false), pair(false));
        assert_ne!(pair(true), pair(false));
        assert_ne!(pair(false), pair(true));
    }

    #[test]
    fn equality_handles_cycles() {
        fn cycle() -> Graph {
            let mut graph = Graph::new();
            let node = graph.add_class(ClassInstance::new("Node", "Lib"));
            if let Some(Object::Class(class)) = graph.get_mut(node) {
                class.members.push(Member {
                    name: "next".into(),
                    member_type: None,
                    value: node.into(),
                });
            }
            graph.set_root(node);
            graph
        }
        assert_eq!(cycle(), cycle());
    }

    #[test]
    fn member_types_match_when_one_side_is_untyped() {
        let mut a = Graph::new();
        let root = a.add_class(ClassInstance::system("P").with_typed_member(
            "n",
            MemberType::Primitive(PrimitiveType::Int32),
            Value::primitive(3),
        ));
        a.set_root(root);

        let mut b = Graph::new();
        let root = b.add_class(ClassInstance::system("P").with_member("n", Value::primitive(3)));
        b.set_root(root);

        assert_eq!(a, b);
    }

    #[test]
    fn primitive_roots() {
        let mut a = Graph::new();
        a.set_root(Value::primitive(7i64));
        let mut b = Graph::new();
        b.set_root(Value::primitive(7i32));
        assert_ne!(a, b);
        assert_eq!(Graph::new(), Graph::new());
    }

    #[test]
    fn class_member_lookup() {
        let class = ClassInstance::new("Demo.Pair", "Demo")
            .with_member("A", Value::primitive(1))
            .with_member("B", Value::Null);
        assert_eq!(class.member("A"), Some(&Value::primitive(1)));
        assert_eq!(class.member("B"), Some(&Value::Null));
        assert_eq!(class.member("C"), None);
        assert!(!class.is_system());
    }
}
