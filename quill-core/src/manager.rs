// quill-core - Scope manager
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Stacked scopes indexed three ways.
//!
//! The manager keeps, per namespace, the stack of live scopes; per module,
//! the stack of live scopes (the head is the module's global scope); and per
//! namespace, the list of module global scopes, which live for the whole
//! program. Each module also records an ordered list of included
//! namespaces.
//!
//! Unqualified resolution searches the current module's stack innermost
//! first, then each included namespace in inclusion order. Resolution
//! through an explicit namespace searches only that namespace.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use quill_syntax::types::TypeDef;

use crate::scope::{ClassRef, FunRef, Scope, StructRef};

/// Shared handle to one scope.
pub type ScopeRef<V> = Rc<RefCell<Scope<V>>>;

/// Wrap a scope into its shared handle.
pub fn scope_ref<V>(scope: Scope<V>) -> ScopeRef<V> {
    Rc::new(RefCell::new(scope))
}

/// Stacked symbol tables per `(namespace, module)`.
#[derive(Debug, Default)]
pub struct ScopeManager<V> {
    /// namespace -> stack of live scopes.
    scopes: HashMap<String, Vec<ScopeRef<V>>>,
    /// module -> stack of live scopes; the head is the module's global scope.
    module_scopes: HashMap<String, Vec<ScopeRef<V>>>,
    /// namespace -> global scope of each module, never popped.
    global_module_scopes: HashMap<String, Vec<ScopeRef<V>>>,
    /// module -> ordered included namespaces.
    included: HashMap<String, Vec<String>>,
}

impl<V: Clone> ScopeManager<V> {
    pub fn new() -> Self {
        ScopeManager {
            scopes: HashMap::new(),
            module_scopes: HashMap::new(),
            global_module_scopes: HashMap::new(),
            included: HashMap::new(),
        }
    }

    // ------------------------------------------------------------------
    // Stack maintenance
    // ------------------------------------------------------------------

    /// Push a scope. The first scope of a module becomes its global scope
    /// and is additionally indexed by namespace for cross-module lookup.
    pub fn push_scope(&mut self, scope: Scope<V>) -> ScopeRef<V> {
        let ns = scope.namespace.clone();
        let module = scope.module.clone();
        let scope = scope_ref(scope);
        self.push_scope_ref(ns, module, scope.clone());
        scope
    }

    /// Push an existing scope handle (used for class instance scopes).
    pub fn push_scope_handle(&mut self, scope: ScopeRef<V>) {
        let (ns, module) = {
            let s = scope.borrow();
            (s.namespace.clone(), s.module.clone())
        };
        self.push_scope_ref(ns, module, scope);
    }

    fn push_scope_ref(&mut self, ns: String, module: String, scope: ScopeRef<V>) {
        let module_stack = self.module_scopes.entry(module).or_default();
        module_stack.push(scope.clone());
        if module_stack.len() == 1 {
            self.global_module_scopes
                .entry(ns.clone())
                .or_default()
                .push(scope.clone());
        }
        self.scopes.entry(ns).or_default().push(scope);
    }

    pub fn pop_scope(&mut self, namespace: &str, module: &str) {
        if let Some(stack) = self.module_scopes.get_mut(module) {
            stack.pop();
        }
        if let Some(stack) = self.scopes.get_mut(namespace) {
            stack.pop();
        }
    }

    /// The innermost live scope of a namespace.
    pub fn back_scope(&self, namespace: &str) -> Option<ScopeRef<V>> {
        self.scopes.get(namespace).and_then(|s| s.last()).cloned()
    }

    /// The global (first) scope of a module.
    pub fn global_scope(&self, module: &str) -> Option<ScopeRef<V>> {
        self.module_scopes
            .get(module)
            .and_then(|s| s.first())
            .cloned()
    }

    // ------------------------------------------------------------------
    // Included namespaces
    // ------------------------------------------------------------------

    pub fn include_namespace(&mut self, module: &str, namespace: &str) {
        let list = self.included.entry(module.to_string()).or_default();
        if !list.iter().any(|n| n == namespace) {
            list.push(namespace.to_string());
        }
    }

    pub fn exclude_namespace(&mut self, module: &str, namespace: &str) {
        if let Some(list) = self.included.get_mut(module) {
            list.retain(|n| n != namespace);
        }
    }

    pub fn included_namespaces(&self, module: &str) -> Vec<String> {
        self.included.get(module).cloned().unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    fn find_in_namespace(
        &self,
        namespace: &str,
        visited: &mut Vec<String>,
        map: &HashMap<String, Vec<ScopeRef<V>>>,
        pred: impl Fn(&Scope<V>) -> bool,
    ) -> Option<ScopeRef<V>> {
        if visited.iter().any(|n| n == namespace) {
            return None;
        }
        visited.push(namespace.to_string());

        let stack = map.get(namespace)?;
        stack
            .iter()
            .rev()
            .find(|scope| pred(&scope.borrow()))
            .cloned()
    }

    fn innermost_scope(
        &self,
        module_ns: &str,
        module: &str,
        access_ns: &str,
        pred: impl Fn(&Scope<V>) -> bool + Copy,
    ) -> Option<ScopeRef<V>> {
        let mut visited = Vec::new();

        if !access_ns.is_empty() && access_ns != module_ns {
            return self.find_in_namespace(access_ns, &mut visited, &self.scopes, pred);
        }

        if let Some(scope) = self.find_in_namespace(module, &mut visited, &self.module_scopes, pred)
        {
            return Some(scope);
        }

        for included in self.included_namespaces(module) {
            if let Some(scope) = self.find_in_namespace(&included, &mut visited, &self.scopes, pred)
            {
                return Some(scope);
            }
        }

        None
    }

    /// Innermost scope declaring a variable with this name.
    pub fn variable_scope(
        &self,
        module_ns: &str,
        module: &str,
        access_ns: &str,
        name: &str,
    ) -> Option<ScopeRef<V>> {
        self.innermost_scope(module_ns, module, access_ns, |s| s.has_variable(name))
    }

    /// Innermost scope declaring a struct with this name.
    pub fn struct_scope(
        &self,
        module_ns: &str,
        module: &str,
        access_ns: &str,
        name: &str,
    ) -> Option<ScopeRef<V>> {
        self.innermost_scope(module_ns, module, access_ns, |s| s.has_struct(name))
    }

    /// Innermost scope declaring a class with this name.
    pub fn class_scope(
        &self,
        module_ns: &str,
        module: &str,
        access_ns: &str,
        name: &str,
    ) -> Option<ScopeRef<V>> {
        self.innermost_scope(module_ns, module, access_ns, |s| s.has_class(name))
    }

    /// Resolve a variable through the standard search order.
    pub fn find_variable(
        &self,
        module_ns: &str,
        module: &str,
        access_ns: &str,
        name: &str,
    ) -> Option<V> {
        self.variable_scope(module_ns, module, access_ns, name)
            .and_then(|s| s.borrow().find_variable(name))
    }

    /// Resolve a struct definition through the standard search order.
    pub fn find_struct(
        &self,
        module_ns: &str,
        module: &str,
        access_ns: &str,
        name: &str,
    ) -> Option<StructRef> {
        self.struct_scope(module_ns, module, access_ns, name)
            .and_then(|s| s.borrow().find_struct(name))
    }

    /// Resolve a class definition through the standard search order.
    pub fn find_class(
        &self,
        module_ns: &str,
        module: &str,
        access_ns: &str,
        name: &str,
    ) -> Option<ClassRef> {
        self.class_scope(module_ns, module, access_ns, name)
            .and_then(|s| s.borrow().find_class(name))
    }

    /// Scope holding a function overload satisfying the call signature.
    ///
    /// Function resolution differs from the others: only module global
    /// scopes take part, because functions always live at module level.
    pub fn function_scope(
        &self,
        module_ns: &str,
        module: &str,
        access_ns: &str,
        name: &str,
        signature: Option<&[TypeDef]>,
        strict: bool,
    ) -> Option<ScopeRef<V>> {
        let mut visited = Vec::new();
        let pred = |s: &Scope<V>| s.has_function(name, signature, strict);

        if !access_ns.is_empty() && access_ns != module_ns {
            return self.find_in_namespace(access_ns, &mut visited, &self.global_module_scopes, pred);
        }

        if let Some(global) = self.global_scope(module) {
            if pred(&global.borrow()) {
                return Some(global);
            }
        }

        for included in self.included_namespaces(module) {
            if let Some(scope) =
                self.find_in_namespace(&included, &mut visited, &self.global_module_scopes, pred)
            {
                return Some(scope);
            }
        }

        None
    }

    /// Strict lookup first, relaxed on failure. Returns the scope and
    /// whether the match was strict.
    pub fn function_scope_strict_then_relaxed(
        &self,
        module_ns: &str,
        module: &str,
        access_ns: &str,
        name: &str,
        signature: &[TypeDef],
    ) -> Option<(ScopeRef<V>, bool)> {
        if let Some(scope) =
            self.function_scope(module_ns, module, access_ns, name, Some(signature), true)
        {
            return Some((scope, true));
        }
        self.function_scope(module_ns, module, access_ns, name, Some(signature), false)
            .map(|scope| (scope, false))
    }

    /// Resolve a function overload through the standard search order.
    pub fn find_function(
        &self,
        module_ns: &str,
        module: &str,
        access_ns: &str,
        name: &str,
        signature: Option<&[TypeDef]>,
        strict: bool,
    ) -> Option<FunRef> {
        self.function_scope(module_ns, module, access_ns, name, signature, strict)
            .and_then(|s| s.borrow().find_function(name, signature, strict))
    }

    /// Every live scope, for GC rooting.
    pub fn live_scopes(&self) -> Vec<ScopeRef<V>> {
        let mut all = Vec::new();
        for stack in self.scopes.values() {
            all.extend(stack.iter().cloned());
        }
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_syntax::types::Tag;

    fn manager() -> ScopeManager<i32> {
        ScopeManager::new()
    }

    #[test]
    fn test_module_stack_shadows() {
        let mut m = manager();
        m.include_namespace("main", "main_ns");
        m.push_scope(Scope::new("main_ns", "main"));
        m.back_scope("main_ns")
            .unwrap()
            .borrow_mut()
            .declare_variable("x", 1);

        m.push_scope(Scope::new("main_ns", "main"));
        m.back_scope("main_ns")
            .unwrap()
            .borrow_mut()
            .declare_variable("x", 2);

        let found = m.find_variable("main_ns", "main", "", "x").unwrap();
        assert_eq!(found, 2);

        m.pop_scope("main_ns", "main");
        let found = m.find_variable("main_ns", "main", "", "x").unwrap();
        assert_eq!(found, 1);
    }

    #[test]
    fn test_included_namespace_search_order() {
        let mut m = manager();
        m.include_namespace("main", "main_ns");
        m.include_namespace("main", "lib_ns");

        m.push_scope(Scope::new("main_ns", "main"));
        m.push_scope(Scope::new("lib_ns", "lib"));
        m.back_scope("lib_ns")
            .unwrap()
            .borrow_mut()
            .declare_variable("y", 7);

        let found = m.find_variable("main_ns", "main", "", "y").unwrap();
        assert_eq!(found, 7);
    }

    #[test]
    fn test_explicit_namespace_only() {
        let mut m = manager();
        m.include_namespace("main", "main_ns");

        m.push_scope(Scope::new("main_ns", "main"));
        m.back_scope("main_ns")
            .unwrap()
            .borrow_mut()
            .declare_variable("z", 1);

        // Explicit access to a namespace that never declared z.
        assert!(m.find_variable("main_ns", "main", "other_ns", "z").is_none());
    }

    #[test]
    fn test_function_lookup_uses_global_scopes() {
        use crate::scope::fun_ref;
        use quill_syntax::types::FunDef;

        let mut m = manager();
        m.include_namespace("main", "default");
        m.push_scope(Scope::new("main_ns", "main"));
        m.push_scope(Scope::new("default", "builtin"));
        m.global_scope("builtin")
            .unwrap()
            .borrow_mut()
            .declare_function(
                "print",
                fun_ref(FunDef::new("print", TypeDef::new(Tag::Void), Vec::new())),
            );

        let found = m.function_scope("main_ns", "main", "", "print", None, true);
        assert!(found.is_some());
    }
}
