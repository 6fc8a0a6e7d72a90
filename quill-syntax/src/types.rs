// quill-syntax - Type tags, type definitions and definition records
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Type definitions shared by the analyser, the compiler and the VM.
//!
//! A [`TypeDef`] describes a value or a slot: a primary [`Tag`], an optional
//! array shape (either resolved constant dimensions or dimension expressions
//! still to be proven constant), and a qualified `(namespace, name)` pair for
//! struct and class types. Matching between two type definitions is the
//! relation used for assignments, argument binding and overload resolution.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::{BlockNode, Expr};

/// Primary type tags.
///
/// `Object` is a parse-time superset resolved by the analyser into either
/// `Struct` or `Class`. `Undefined` is the compile-time "no value yet"
/// marker; `Void` is the runtime null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tag {
    #[default]
    Undefined,
    Void,
    Bool,
    Int,
    Float,
    Char,
    String,
    Object,
    Struct,
    Class,
    Function,
    Any,
}

impl Tag {
    /// Human-readable tag name used in messages and `typeof`.
    pub fn name(self) -> &'static str {
        match self {
            Tag::Undefined => "undefined",
            Tag::Void => "void",
            Tag::Bool => "bool",
            Tag::Int => "int",
            Tag::Float => "float",
            Tag::Char => "char",
            Tag::String => "string",
            Tag::Object => "object",
            Tag::Struct => "struct",
            Tag::Class => "class",
            Tag::Function => "function",
            Tag::Any => "any",
        }
    }

    /// Stable numeric id, used by `typeid` on primitive types.
    pub fn ordinal(self) -> i64 {
        match self {
            Tag::Undefined => 0,
            Tag::Void => 1,
            Tag::Bool => 2,
            Tag::Int => 3,
            Tag::Float => 4,
            Tag::Char => 5,
            Tag::String => 6,
            Tag::Object => 7,
            Tag::Struct => 8,
            Tag::Class => 9,
            Tag::Function => 10,
            Tag::Any => 11,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A value-or-slot type description.
#[derive(Debug, Clone, Default)]
pub struct TypeDef {
    /// Primary tag.
    pub tag: Tag,
    /// Declaring namespace for struct/class types.
    pub type_ns: String,
    /// Type name for struct/class types.
    pub type_name: String,
    /// Resolved constant array dimensions. A dimension of 0 is a wildcard.
    pub dims: Vec<usize>,
    /// Unresolved dimension expressions, proven constant by the analyser.
    pub expr_dims: Vec<Rc<Expr>>,
}

impl TypeDef {
    /// A plain scalar type.
    pub fn new(tag: Tag) -> Self {
        TypeDef {
            tag,
            ..Default::default()
        }
    }

    /// A struct or class type with its qualified name.
    pub fn object(tag: Tag, type_ns: impl Into<String>, type_name: impl Into<String>) -> Self {
        TypeDef {
            tag,
            type_ns: type_ns.into(),
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    /// An array type with resolved constant dimensions.
    pub fn array(tag: Tag, dims: Vec<usize>) -> Self {
        TypeDef {
            tag,
            dims,
            ..Default::default()
        }
    }

    /// An array type with unresolved dimension expressions.
    pub fn array_expr(tag: Tag, expr_dims: Vec<Rc<Expr>>) -> Self {
        TypeDef {
            tag,
            expr_dims,
            ..Default::default()
        }
    }

    /// The element type of this array type (same tag, no shape).
    pub fn element_type(&self) -> TypeDef {
        TypeDef {
            tag: self.tag,
            type_ns: self.type_ns.clone(),
            type_name: self.type_name.clone(),
            dims: Vec::new(),
            expr_dims: Vec::new(),
        }
    }

    pub fn is_undefined(&self) -> bool {
        self.tag == Tag::Undefined
    }

    pub fn is_void(&self) -> bool {
        self.tag == Tag::Void
    }

    pub fn is_bool(&self) -> bool {
        self.tag == Tag::Bool
    }

    pub fn is_int(&self) -> bool {
        self.tag == Tag::Int
    }

    pub fn is_float(&self) -> bool {
        self.tag == Tag::Float
    }

    pub fn is_char(&self) -> bool {
        self.tag == Tag::Char
    }

    pub fn is_string(&self) -> bool {
        self.tag == Tag::String
    }

    pub fn is_any(&self) -> bool {
        self.tag == Tag::Any
    }

    pub fn is_object(&self) -> bool {
        self.tag == Tag::Object
    }

    pub fn is_struct(&self) -> bool {
        self.tag == Tag::Struct
    }

    pub fn is_class(&self) -> bool {
        self.tag == Tag::Class
    }

    pub fn is_function(&self) -> bool {
        self.tag == Tag::Function
    }

    pub fn is_textual(&self) -> bool {
        self.is_char() || self.is_string()
    }

    pub fn is_numeric(&self) -> bool {
        self.is_int() || self.is_float()
    }

    /// An array is any type definition with a declared shape.
    pub fn is_array(&self) -> bool {
        !self.dims.is_empty() || !self.expr_dims.is_empty()
    }

    pub fn is_collection(&self) -> bool {
        self.is_string() || self.is_array()
    }

    pub fn is_iterable(&self) -> bool {
        self.is_collection() || self.is_struct()
    }

    /// The relation used for assignments and argument compatibility:
    /// `Any` (non-array) on either side matches, `Void` on either side
    /// matches, otherwise the two definitions must match.
    pub fn is_any_or_match(&self, rtype: &TypeDef, strict: bool) -> bool {
        if (self.is_any() && !self.is_array())
            || (rtype.is_any() && !rtype.is_array())
            || self.is_void()
            || rtype.is_void()
        {
            return true;
        }
        self.matches(rtype, strict)
    }

    /// Full matching over the tag families, arrays first.
    pub fn matches(&self, rtype: &TypeDef, strict: bool) -> bool {
        if self.matches_array(rtype, strict) {
            return true;
        }
        if self.is_bool() && rtype.is_bool() {
            return true;
        }
        if self.is_int() && (if strict { rtype.is_int() } else { rtype.is_numeric() }) {
            return true;
        }
        if self.is_float() && (if strict { rtype.is_float() } else { rtype.is_numeric() }) {
            return true;
        }
        if self.is_char() && rtype.is_char() {
            return true;
        }
        if self.is_string() && (if strict { rtype.is_string() } else { rtype.is_textual() }) {
            return true;
        }
        if self.is_struct()
            && rtype.is_struct()
            && self.type_ns == rtype.type_ns
            && self.type_name == rtype.type_name
        {
            return true;
        }
        if self.is_class()
            && rtype.is_class()
            && self.type_ns == rtype.type_ns
            && self.type_name == rtype.type_name
        {
            return true;
        }
        self.is_function() && rtype.is_function()
    }

    fn matches_array(&self, rtype: &TypeDef, strict: bool) -> bool {
        if self.is_array() && rtype.is_array() && self.matches_dims(rtype) {
            return self
                .element_type()
                .is_any_or_match(&rtype.element_type(), strict);
        }
        false
    }

    /// Shape compatibility: a dimension of 0 is a wildcard, and a
    /// single-dimension shape of size 0 or 1 matches any shape.
    pub fn matches_dims(&self, rtype: &TypeDef) -> bool {
        let ldims = &self.dims;
        let rdims = &rtype.dims;

        if (ldims.len() == 1 && ldims[0] <= 1)
            || (rdims.len() == 1 && rdims[0] <= 1)
            || ldims.is_empty()
            || rdims.is_empty()
        {
            return true;
        }

        if ldims.len() != rdims.len() {
            return false;
        }

        ldims
            .iter()
            .zip(rdims.iter())
            .all(|(l, r)| *l == 0 || l == r)
    }

    /// Tag-only equality, used by null comparisons.
    pub fn match_tag(&self, rtype: &TypeDef) -> bool {
        self.tag == rtype.tag
    }

    /// Qualified struct/class type name, `ns::name`.
    pub fn qualified_name(&self) -> String {
        if self.type_ns.is_empty() {
            self.type_name.clone()
        } else {
            format!("{}::{}", self.type_ns, self.type_name)
        }
    }
}

impl fmt::Display for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_struct() || self.is_class() || self.is_object() {
            write!(f, "{}", self.qualified_name())?;
        } else {
            write!(f, "{}", self.tag)?;
        }
        for d in &self.dims {
            write!(f, "[{}]", d)?;
        }
        if self.dims.is_empty() {
            for _ in &self.expr_dims {
                write!(f, "[?]")?;
            }
        }
        Ok(())
    }
}

/// The default value attached to a parameter or a field.
///
/// The analyser sees the expression form; the VM sees the program counter of
/// the compiled default-value snippet.
#[derive(Debug, Clone, Default)]
pub enum DefaultValue {
    #[default]
    None,
    Expr(Rc<Expr>),
    Pc(usize),
}

impl DefaultValue {
    pub fn is_none(&self) -> bool {
        matches!(self, DefaultValue::None)
    }
}

/// A named, typed slot: a parameter, a struct field or a class field.
#[derive(Debug, Clone)]
pub struct VarDef {
    pub name: String,
    pub ty: std::cell::RefCell<TypeDef>,
    pub default: DefaultValue,
    pub is_rest: bool,
    pub is_const: bool,
}

impl VarDef {
    pub fn new(name: impl Into<String>, ty: TypeDef) -> Self {
        VarDef {
            name: name.into(),
            ty: std::cell::RefCell::new(ty),
            default: DefaultValue::None,
            is_rest: false,
            is_const: false,
        }
    }

    pub fn with_default(name: impl Into<String>, ty: TypeDef, default: DefaultValue) -> Self {
        VarDef {
            name: name.into(),
            ty: std::cell::RefCell::new(ty),
            default,
            is_rest: false,
            is_const: false,
        }
    }

    pub fn rest(name: impl Into<String>, ty: TypeDef) -> Self {
        VarDef {
            name: name.into(),
            ty: std::cell::RefCell::new(ty),
            default: DefaultValue::None,
            is_rest: true,
            is_const: false,
        }
    }

    pub fn ty(&self) -> TypeDef {
        self.ty.borrow().clone()
    }
}

/// A destructuring parameter group: binds fields of one struct argument.
#[derive(Debug, Clone)]
pub struct UnpackGroup {
    pub ty: std::cell::RefCell<TypeDef>,
    pub vars: Vec<VarDef>,
}

impl UnpackGroup {
    pub fn new(ty: TypeDef, vars: Vec<VarDef>) -> Self {
        UnpackGroup {
            ty: std::cell::RefCell::new(ty),
            vars,
        }
    }
}

/// A function parameter: a single slot or a destructuring group.
#[derive(Debug, Clone)]
pub enum Param {
    Single(VarDef),
    Unpack(UnpackGroup),
}

impl Param {
    /// The declared type used when matching this parameter in a signature.
    pub fn ty(&self) -> TypeDef {
        match self {
            Param::Single(v) => v.ty(),
            Param::Unpack(u) => u.ty.borrow().clone(),
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, Param::Single(v) if v.is_rest)
    }

    pub fn has_default(&self) -> bool {
        matches!(self, Param::Single(v) if !v.default.is_none())
    }
}

/// A function overload: identifier, return type, parameter list, and either
/// an AST body (analysis side) or an entry program counter (runtime side).
#[derive(Debug, Clone)]
pub struct FunDef {
    pub name: String,
    pub ret: TypeDef,
    pub params: Vec<Param>,
    /// Entry program counter of the compiled body; 0 means native or bodyless.
    pub entry: usize,
    /// AST body, present on the analysis side when the function has one.
    pub block: Option<Rc<BlockNode>>,
}

impl FunDef {
    pub fn new(name: impl Into<String>, ret: TypeDef, params: Vec<Param>) -> Self {
        FunDef {
            name: name.into(),
            ret,
            params,
            entry: 0,
            block: None,
        }
    }

    /// Render `name(t1, t2, ...)` for messages.
    pub fn signature_string(&self) -> String {
        signature_string(&self.name, &self.params.iter().map(Param::ty).collect::<Vec<_>>())
    }
}

/// Render a call or declaration signature for messages.
pub fn signature_string(name: &str, types: &[TypeDef]) -> String {
    let params: Vec<String> = types.iter().map(|t| t.to_string()).collect();
    format!("{}({})", name, params.join(", "))
}

/// A struct shape: ordered named fields.
#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub fields: IndexMap<String, Rc<VarDef>>,
}

impl StructDef {
    pub fn new(name: impl Into<String>) -> Self {
        StructDef {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn with_fields(name: impl Into<String>, fields: Vec<VarDef>) -> Self {
        let mut map = IndexMap::new();
        for f in fields {
            map.insert(f.name.clone(), Rc::new(f));
        }
        StructDef {
            name: name.into(),
            fields: map,
        }
    }
}

/// A class shape: ordered fields plus method overloads.
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub vars: IndexMap<String, Rc<VarDef>>,
    pub funs: Vec<Rc<std::cell::RefCell<FunDef>>>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        ClassDef {
            name: name.into(),
            vars: IndexMap::new(),
            funs: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_match_strict() {
        let int = TypeDef::new(Tag::Int);
        let float = TypeDef::new(Tag::Float);

        assert!(int.matches(&int, true));
        assert!(!int.matches(&float, true));
        assert!(int.matches(&float, false));
        assert!(float.matches(&int, false));
    }

    #[test]
    fn test_textual_match() {
        let s = TypeDef::new(Tag::String);
        let c = TypeDef::new(Tag::Char);

        assert!(!s.matches(&c, true));
        assert!(s.matches(&c, false));
        assert!(!c.matches(&s, false)); // char never widens to string
    }

    #[test]
    fn test_any_matches_non_array() {
        let any = TypeDef::new(Tag::Any);
        let int = TypeDef::new(Tag::Int);
        let arr = TypeDef::array(Tag::Int, vec![3]);

        assert!(any.is_any_or_match(&int, true));
        assert!(int.is_any_or_match(&any, true));
        assert!(!any.is_any_or_match(&arr, true));
    }

    #[test]
    fn test_array_dims_wildcard() {
        let any_shape = TypeDef::array(Tag::Int, vec![0]);
        let concrete = TypeDef::array(Tag::Int, vec![5]);

        assert!(any_shape.matches(&concrete, true));
        assert!(concrete.matches(&any_shape, true));
    }

    #[test]
    fn test_array_dims_mismatch() {
        let two = TypeDef::array(Tag::Int, vec![2, 2]);
        let three = TypeDef::array(Tag::Int, vec![3, 3]);

        assert!(!two.matches(&three, true));
        assert!(two.matches(&two, true));
    }

    #[test]
    fn test_single_dim_one_matches_any_shape() {
        let one = TypeDef::array(Tag::Int, vec![1]);
        let grid = TypeDef::array(Tag::Int, vec![4, 4]);

        assert!(one.matches(&grid, true));
    }

    #[test]
    fn test_struct_match_by_qualified_name() {
        let a = TypeDef::object(Tag::Struct, "main", "Point");
        let b = TypeDef::object(Tag::Struct, "main", "Point");
        let c = TypeDef::object(Tag::Struct, "other", "Point");

        assert!(a.matches(&b, true));
        assert!(!a.matches(&c, true));
    }
}
