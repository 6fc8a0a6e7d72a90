// quill-core - Symbol table scopes
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! A single-level symbol table for a given `(namespace, module)`.
//!
//! A scope owns four tables: variables, struct definitions, class
//! definitions (all unique by name) and functions (a multimap - overloads
//! share a name). The variable payload is generic so the analyser and the VM
//! share one implementation with different symbol kinds.
//!
//! Function lookup is overload-aware. Candidates are scanned in insertion
//! order, in three shapes of decreasing priority: exact arity, rest
//! broadcast, default filled. The caller runs the whole lookup twice, first
//! with strict tag matching and then relaxed.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use quill_syntax::types::{ClassDef, FunDef, Param, StructDef, TypeDef};

/// Shared, mutable function definition. Forward declarations are completed
/// in place when the body arrives.
pub type FunRef = Rc<RefCell<FunDef>>;

/// Shared class definition.
pub type ClassRef = Rc<RefCell<ClassDef>>;

/// Shared struct definition.
pub type StructRef = Rc<StructDef>;

/// A single-level symbol table.
#[derive(Debug, Clone)]
pub struct Scope<V> {
    pub namespace: String,
    pub module: String,
    pub is_class: bool,
    variables: IndexMap<String, V>,
    structs: IndexMap<String, StructRef>,
    classes: IndexMap<String, ClassRef>,
    functions: Vec<(String, FunRef)>,
}

impl<V: Clone> Scope<V> {
    pub fn new(namespace: impl Into<String>, module: impl Into<String>) -> Self {
        Scope {
            namespace: namespace.into(),
            module: module.into(),
            is_class: false,
            variables: IndexMap::new(),
            structs: IndexMap::new(),
            classes: IndexMap::new(),
            functions: Vec::new(),
        }
    }

    pub fn class_scope(namespace: impl Into<String>, module: impl Into<String>) -> Self {
        let mut scope = Self::new(namespace, module);
        scope.is_class = true;
        scope
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Declare or shadow a variable in this scope.
    pub fn declare_variable(&mut self, name: impl Into<String>, variable: V) {
        self.variables.insert(name.into(), variable);
    }

    pub fn find_variable(&self, name: &str) -> Option<V> {
        self.variables.get(name).cloned()
    }

    pub fn variables(&self) -> impl Iterator<Item = (&String, &V)> {
        self.variables.iter()
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    // ------------------------------------------------------------------
    // Struct and class definitions
    // ------------------------------------------------------------------

    pub fn has_struct(&self, name: &str) -> bool {
        self.structs.contains_key(name)
    }

    pub fn declare_struct(&mut self, def: StructRef) {
        self.structs.insert(def.name.clone(), def);
    }

    pub fn find_struct(&self, name: &str) -> Option<StructRef> {
        self.structs.get(name).cloned()
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn declare_class(&mut self, def: ClassRef) {
        let name = def.borrow().name.clone();
        self.classes.insert(name, def);
    }

    pub fn find_class(&self, name: &str) -> Option<ClassRef> {
        self.classes.get(name).cloned()
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    /// Register an overload. Insertion order is the dispatch tiebreaker.
    pub fn declare_function(&mut self, name: impl Into<String>, fun: FunRef) {
        self.functions.push((name.into(), fun));
    }

    pub fn has_function(&self, name: &str, signature: Option<&[TypeDef]>, strict: bool) -> bool {
        self.find_function(name, signature, strict).is_some()
    }

    /// Overload-aware lookup.
    ///
    /// With no signature, the first overload with the name wins. With one,
    /// candidates are scanned in three passes: exact arity, then rest
    /// broadcast, then default filled; insertion order breaks ties inside
    /// each pass.
    pub fn find_function(
        &self,
        name: &str,
        signature: Option<&[TypeDef]>,
        strict: bool,
    ) -> Option<FunRef> {
        let candidates: Vec<&FunRef> = self
            .functions
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, f)| f)
            .collect();

        if candidates.is_empty() {
            return None;
        }

        let signature = match signature {
            Some(sig) => sig,
            None => return Some(candidates[0].clone()),
        };

        for fun in &candidates {
            if matches_exact(&fun.borrow(), signature, strict) {
                return Some((*fun).clone());
            }
        }
        for fun in &candidates {
            if matches_rest(&fun.borrow(), signature, strict) {
                return Some((*fun).clone());
            }
        }
        for fun in &candidates {
            if matches_defaults(&fun.borrow(), signature, strict) {
                return Some((*fun).clone());
            }
        }

        None
    }

    pub fn functions(&self) -> impl Iterator<Item = (&String, &FunRef)> {
        self.functions.iter().map(|(n, f)| (n, f))
    }
}

/// Find an overload with the identical parameter type list, the relation
/// used for redefinition and forward-declaration completion.
pub fn find_same_signature<V: Clone>(
    scope: &Scope<V>,
    name: &str,
    signature: &[TypeDef],
) -> Option<FunRef> {
    for (fun_name, fun) in scope.functions() {
        if fun_name != name {
            continue;
        }
        let f = fun.borrow();
        if f.params.len() != signature.len() {
            continue;
        }
        let same = f
            .params
            .iter()
            .zip(signature.iter())
            .all(|(p, t)| p.ty().matches(t, true) && t.matches(&p.ty(), true));
        if same {
            return Some(fun.clone());
        }
    }
    None
}

/// Whether one overload satisfies a call signature in any of the three
/// shapes (exact, rest broadcast, default filled).
pub fn signature_matches(fun: &FunDef, signature: &[TypeDef], strict: bool) -> bool {
    matches_exact(fun, signature, strict)
        || matches_rest(fun, signature, strict)
        || matches_defaults(fun, signature, strict)
}

/// Exact arity: every declared parameter matches its argument.
fn matches_exact(fun: &FunDef, signature: &[TypeDef], strict: bool) -> bool {
    if fun.params.len() != signature.len() {
        return false;
    }
    fun.params
        .iter()
        .zip(signature.iter())
        .all(|(p, arg)| p.ty().is_any_or_match(arg, strict))
}

/// Fewer parameters than arguments, last parameter is rest: the rest
/// parameter's element type is broadcast over the tail.
fn matches_rest(fun: &FunDef, signature: &[TypeDef], strict: bool) -> bool {
    let n = fun.params.len();
    if n == 0 || n > signature.len() {
        return false;
    }
    let last = &fun.params[n - 1];
    if !last.is_rest() {
        return false;
    }

    for (i, arg) in signature.iter().enumerate() {
        let declared = if i < n - 1 {
            fun.params[i].ty()
        } else {
            // Broadcast the rest element type over the remaining arguments.
            last.ty().element_type()
        };
        if !declared.is_any_or_match(arg, strict) {
            return false;
        }
    }
    true
}

/// More parameters than arguments: the surplus must all carry defaults.
fn matches_defaults(fun: &FunDef, signature: &[TypeDef], strict: bool) -> bool {
    if fun.params.len() <= signature.len() {
        return false;
    }
    for (i, param) in fun.params.iter().enumerate() {
        if i < signature.len() {
            if !param.ty().is_any_or_match(&signature[i], strict) {
                return false;
            }
        } else if !param.has_default() {
            return false;
        }
    }
    true
}

/// Shorthand used by tests and the module registries.
pub fn fun_ref(fun: FunDef) -> FunRef {
    Rc::new(RefCell::new(fun))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_syntax::types::{DefaultValue, Tag, VarDef};

    fn int() -> TypeDef {
        TypeDef::new(Tag::Int)
    }

    fn float() -> TypeDef {
        TypeDef::new(Tag::Float)
    }

    fn fun(name: &str, params: Vec<Param>) -> FunRef {
        fun_ref(FunDef::new(name, TypeDef::new(Tag::Void), params))
    }

    fn single(name: &str, ty: TypeDef) -> Param {
        Param::Single(VarDef::new(name, ty))
    }

    #[test]
    fn test_exact_overload_wins() {
        let mut scope: Scope<()> = Scope::new("main", "main");
        scope.declare_function("f", fun("f", vec![single("a", int())]));
        scope.declare_function("f", fun("f", vec![single("a", float())]));

        let found = scope.find_function("f", Some(&[float()]), true).unwrap();
        assert!(found.borrow().params[0].ty().is_float());
    }

    #[test]
    fn test_insertion_order_breaks_ties() {
        let mut scope: Scope<()> = Scope::new("main", "main");
        let first = fun("f", vec![single("a", TypeDef::new(Tag::Any))]);
        scope.declare_function("f", first.clone());
        scope.declare_function("f", fun("f", vec![single("a", TypeDef::new(Tag::Any))]));

        let found = scope.find_function("f", Some(&[int()]), true).unwrap();
        assert!(Rc::ptr_eq(&found, &first));
    }

    #[test]
    fn test_exact_beats_rest() {
        let mut scope: Scope<()> = Scope::new("main", "main");
        let rest = fun(
            "f",
            vec![Param::Single(VarDef::rest(
                "xs",
                TypeDef::array(Tag::Int, vec![0]),
            ))],
        );
        let exact = fun("f", vec![single("a", int()), single("b", int())]);
        scope.declare_function("f", rest);
        scope.declare_function("f", exact.clone());

        let found = scope.find_function("f", Some(&[int(), int()]), true).unwrap();
        assert!(Rc::ptr_eq(&found, &exact));
    }

    #[test]
    fn test_rest_beats_default_filled() {
        let mut scope: Scope<()> = Scope::new("main", "main");
        let defaulted = fun(
            "f",
            vec![
                single("a", int()),
                single("b", int()),
                Param::Single(VarDef::with_default("c", int(), DefaultValue::Pc(1))),
            ],
        );
        let rest = fun(
            "f",
            vec![Param::Single(VarDef::rest(
                "xs",
                TypeDef::array(Tag::Int, vec![0]),
            ))],
        );
        scope.declare_function("f", defaulted);
        scope.declare_function("f", rest.clone());

        let found = scope.find_function("f", Some(&[int(), int()]), true).unwrap();
        assert!(Rc::ptr_eq(&found, &rest));
    }

    #[test]
    fn test_default_filled_candidate() {
        let mut scope: Scope<()> = Scope::new("main", "main");
        scope.declare_function(
            "f",
            fun(
                "f",
                vec![
                    single("a", int()),
                    Param::Single(VarDef::with_default("b", int(), DefaultValue::Pc(7))),
                ],
            ),
        );

        assert!(scope.find_function("f", Some(&[int()]), true).is_some());
        assert!(scope.find_function("f", Some(&[]), true).is_none());
    }

    #[test]
    fn test_relaxed_match() {
        let mut scope: Scope<()> = Scope::new("main", "main");
        scope.declare_function("f", fun("f", vec![single("a", int())]));

        assert!(scope.find_function("f", Some(&[float()]), true).is_none());
        assert!(scope.find_function("f", Some(&[float()]), false).is_some());
    }
}
