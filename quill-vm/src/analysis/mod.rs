// quill-vm - Semantic analyser
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Semantic analysis pass.
//!
//! A single tree walk over each module, starting from the main one, that:
//!
//! 1. Resolves namespaces, type names and overload signatures
//! 2. Proves return coverage of every non-void function
//! 3. Folds constant expressions bottom-up
//! 4. Normalises the implicit numeric and textual coercions
//!
//! The first semantic error of a module is wrapped with the node's
//! `(module, row, col)` and re-raised as fatal; analysis never continues
//! past it.

mod expr;
mod functions;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use quill_core::constants::{self, DEFAULT_NAMESPACE, STD_NAMESPACE};
use quill_core::manager::{ScopeManager, ScopeRef};
use quill_core::scope::Scope;
use quill_core::semantic::{self, Constant, SemVarRef, SemanticValue, SemanticVariable};
use quill_syntax::ast::{DeclNode, Expr, ModuleNode, Pos, Stmt};
use quill_syntax::types::{Tag, TypeDef};

use crate::debug::DebugInfo;
use crate::modules::NativeModule;

/// A fatal analysis error, carrying the node's location.
#[derive(Debug, Clone)]
pub struct SemanticError {
    pub message: String,
    pub info: DebugInfo,
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.info.build_error_message("SemanticError", &self.message))
    }
}

impl std::error::Error for SemanticError {}

/// Result type for analysis.
pub type Result<T> = std::result::Result<T, SemanticError>;

/// The semantic analyser.
pub struct Analyser {
    /// Stacked compile-time scopes.
    pub scopes: ScopeManager<SemVarRef>,
    /// Function names the VM will honour at call time without a
    /// scope-declared signature.
    pub builtin_functions: HashSet<String>,
    modules: IndexMap<String, Rc<ModuleNode>>,
    main_module: String,
    module_stack: Vec<(String, String)>,
    analysed: HashSet<String>,
    registered_libs: HashSet<String>,
    core_libs: HashMap<String, Rc<dyn NativeModule>>,
    /// Enclosing class names and their scopes, innermost last.
    class_stack: Vec<(String, ScopeRef<SemVarRef>)>,
    /// Enclosing function definitions, innermost last.
    function_stack: Vec<quill_core::FunRef>,
    /// Bodyless declarations of the current module.
    forward_decls: Vec<quill_core::FunRef>,
    loop_depth: usize,
    switch_depth: usize,
}

impl Analyser {
    /// Create an analyser over an ordered module collection. `main` must
    /// name one of them.
    pub fn new(modules: Vec<Rc<ModuleNode>>, main: impl Into<String>) -> Self {
        let mut map = IndexMap::new();
        for m in modules {
            map.insert(m.name.clone(), m);
        }
        Analyser {
            scopes: ScopeManager::new(),
            builtin_functions: HashSet::new(),
            modules: map,
            main_module: main.into(),
            module_stack: Vec::new(),
            analysed: HashSet::new(),
            registered_libs: HashSet::new(),
            core_libs: HashMap::new(),
            class_stack: Vec::new(),
            function_stack: Vec::new(),
            forward_decls: Vec::new(),
            loop_depth: 0,
            switch_depth: 0,
        }
    }

    /// Make a core library available to `using` directives.
    pub fn add_core_lib(&mut self, name: impl Into<String>, lib: Rc<dyn NativeModule>) {
        self.core_libs.insert(name.into(), lib);
    }

    /// Analyse the whole program starting from the main module.
    pub fn analyse(&mut self) -> Result<()> {
        let main = self
            .modules
            .get(&self.main_module)
            .cloned()
            .ok_or_else(|| SemanticError {
                message: format!("main module '{}' not found", self.main_module),
                info: DebugInfo::default(),
            })?;
        self.analyse_module(main)
    }

    fn analyse_module(&mut self, module: Rc<ModuleNode>) -> Result<()> {
        if self.analysed.contains(&module.name) {
            return Ok(());
        }
        self.analysed.insert(module.name.clone());
        debug!(module = %module.name, namespace = %module.namespace, "analysing module");

        self.module_stack
            .push((module.namespace.clone(), module.name.clone()));
        self.scopes.include_namespace(&module.name, &module.namespace);
        self.scopes.include_namespace(&module.name, DEFAULT_NAMESPACE);
        self.scopes
            .push_scope(Scope::new(module.namespace.clone(), module.name.clone()));

        let forwards_outside = std::mem::take(&mut self.forward_decls);

        for stmt in &module.statements {
            self.visit_stmt(stmt)?;
        }

        // Forward-declared functions must have been implemented by now.
        if let Some(fun) = self.forward_decls.first() {
            let signature = fun.borrow().signature_string();
            return Err(self.err(
                "function-definition",
                &fun.borrow().name.clone(),
                Pos::default(),
                format!("function '{}' was declared but never implemented", signature),
            ));
        }
        self.forward_decls = forwards_outside;

        self.module_stack.pop();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Context helpers
    // ------------------------------------------------------------------

    pub(crate) fn current_ns(&self) -> String {
        self.module_stack
            .last()
            .map(|(ns, _)| ns.clone())
            .unwrap_or_default()
    }

    pub(crate) fn current_module(&self) -> String {
        self.module_stack
            .last()
            .map(|(_, m)| m.clone())
            .unwrap_or_default()
    }

    pub(crate) fn current_scope(&self) -> Option<ScopeRef<SemVarRef>> {
        self.scopes.back_scope(&self.current_ns())
    }

    pub(crate) fn current_class(&self) -> Option<&(String, ScopeRef<SemVarRef>)> {
        self.class_stack.last()
    }

    pub(crate) fn current_function(&self) -> Option<quill_core::FunRef> {
        self.function_stack.last().cloned()
    }

    pub(crate) fn class_stack_mut(&mut self) -> &mut Vec<(String, ScopeRef<SemVarRef>)> {
        &mut self.class_stack
    }

    pub(crate) fn function_stack_mut(&mut self) -> &mut Vec<quill_core::FunRef> {
        &mut self.function_stack
    }

    pub(crate) fn forward_decls_mut(&mut self) -> &mut Vec<quill_core::FunRef> {
        &mut self.forward_decls
    }

    /// Wrap a message with the current module and node position.
    pub(crate) fn err(
        &self,
        kind: &str,
        identifier: &str,
        pos: Pos,
        message: impl Into<String>,
    ) -> SemanticError {
        let mut info = DebugInfo::new(
            self.current_ns(),
            self.current_module(),
            kind,
            identifier,
            pos.row,
            pos.col,
        );
        info.access_ns = String::new();
        SemanticError {
            message: message.into(),
            info,
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    pub(crate) fn visit_stmt(&mut self, stmt: &Rc<Stmt>) -> Result<()> {
        match &**stmt {
            Stmt::Using { library, pos } => self.visit_using(library, *pos),
            Stmt::IncludeNamespace { namespace, .. } => {
                let module = self.current_module();
                self.scopes.include_namespace(&module, namespace);
                Ok(())
            }
            Stmt::ExcludeNamespace { namespace, .. } => {
                let module = self.current_module();
                self.scopes.exclude_namespace(&module, namespace);
                Ok(())
            }
            Stmt::Declaration(decl) => self.visit_declaration(decl),
            Stmt::UnpackedDeclaration(node) => self.visit_unpacked_declaration(node),
            Stmt::Return { expr, pos } => self.visit_return(expr.as_ref(), *pos),
            Stmt::Block(block) => {
                self.push_block_scope();
                let result = block
                    .statements
                    .iter()
                    .try_for_each(|s| self.visit_stmt(s));
                self.pop_block_scope();
                result
            }
            Stmt::Continue { pos } => {
                if self.loop_depth == 0 {
                    Err(self.err("continue", "", *pos, "'continue' outside of a loop"))
                } else {
                    Ok(())
                }
            }
            Stmt::Break { pos } => {
                if self.loop_depth == 0 && self.switch_depth == 0 {
                    Err(self.err("break", "", *pos, "'break' outside of a loop or switch"))
                } else {
                    Ok(())
                }
            }
            Stmt::Exit { code, pos } => {
                let value = self.analyse_expr(code)?;
                if !value.ty.is_numeric() && !value.ty.is_any() {
                    return Err(self.err(
                        "exit",
                        "",
                        *pos,
                        format!("exit code must be numeric, got '{}'", value.ty),
                    ));
                }
                Ok(())
            }
            Stmt::Switch(node) => self.visit_switch(node),
            Stmt::If(node) => self.visit_if(node),
            Stmt::Enum { names, pos } => self.visit_enum(names, *pos),
            Stmt::TryCatch(node) => self.visit_try_catch(node),
            Stmt::Throw { error, pos } => self.visit_throw(error, *pos),
            Stmt::Ellipsis { .. } => Ok(()),
            Stmt::For(node) => {
                self.push_block_scope();
                let result = (|| {
                    if let Some(init) = &node.init {
                        self.visit_stmt(init)?;
                    }
                    if let Some(cond) = &node.condition {
                        self.check_condition(cond)?;
                    }
                    if let Some(step) = &node.step {
                        self.visit_stmt(step)?;
                    }
                    self.loop_depth += 1;
                    let r = self.visit_block(&node.block);
                    self.loop_depth -= 1;
                    r
                })();
                self.pop_block_scope();
                result
            }
            Stmt::ForEach(node) => self.visit_foreach(node),
            Stmt::While(node) | Stmt::DoWhile(node) => {
                self.check_condition(&node.condition)?;
                self.loop_depth += 1;
                let result = self.visit_block(&node.block);
                self.loop_depth -= 1;
                result
            }
            Stmt::FunctionDefinition(node) => self.analyse_function(node).map(|_| ()),
            Stmt::StructDefinition(node) => self.analyse_struct(node),
            Stmt::ClassDefinition(node) => self.analyse_class(node),
            Stmt::Expr(expr) => self.analyse_expr(expr).map(|_| ()),
        }
    }

    fn visit_using(&mut self, library: &[String], pos: Pos) -> Result<()> {
        let name = library.last().cloned().unwrap_or_default();

        if constants::CORE_LIB_NAMES.contains(&name.as_str()) {
            if self.registered_libs.insert(name.clone()) {
                let lib = self.core_libs.get(&name).cloned().ok_or_else(|| {
                    self.err(
                        "using",
                        &name,
                        pos,
                        format!("core library '{}' is not available", name),
                    )
                })?;
                lib.register_analysis(self);
            }
            let module = self.current_module();
            self.scopes.include_namespace(&module, STD_NAMESPACE);
            return Ok(());
        }

        let module = self.modules.get(&name).cloned().ok_or_else(|| {
            self.err(
                "using",
                &name,
                pos,
                format!("module '{}' was not provided to the analyser", name),
            )
        })?;
        self.analyse_module(module)
    }

    pub(crate) fn visit_block(&mut self, block: &quill_syntax::ast::BlockNode) -> Result<()> {
        self.push_block_scope();
        let result = block
            .statements
            .iter()
            .try_for_each(|s| self.visit_stmt(s));
        self.pop_block_scope();
        result
    }

    pub(crate) fn push_block_scope(&mut self) {
        self.scopes
            .push_scope(Scope::new(self.current_ns(), self.current_module()));
    }

    pub(crate) fn pop_block_scope(&mut self) {
        self.scopes
            .pop_scope(&self.current_ns(), &self.current_module());
    }

    fn visit_return(&mut self, expr: Option<&Rc<Expr>>, pos: Pos) -> Result<()> {
        let fun = self
            .current_function()
            .ok_or_else(|| self.err("return", "", pos, "'return' outside of a function"))?;
        let ret = fun.borrow().ret.clone();

        match expr {
            Some(expr) => {
                let mut value = self.analyse_expr(expr)?;
                if ret.is_void() {
                    return Err(self.err(
                        "return",
                        &fun.borrow().name.clone(),
                        pos,
                        "void function cannot return a value",
                    ));
                }
                if !ret.is_any_or_match(&value.ty, false) {
                    return Err(self.err(
                        "return",
                        &fun.borrow().name.clone(),
                        pos,
                        format!(
                            "cannot return '{}' from a function declared to return '{}'",
                            value.ty, ret
                        ),
                    ));
                }
                semantic::normalize(&ret, &mut value);
                Ok(())
            }
            None => {
                if !ret.is_void() && !ret.is_undefined() {
                    return Err(self.err(
                        "return",
                        &fun.borrow().name.clone(),
                        pos,
                        "non-void function must return a value",
                    ));
                }
                Ok(())
            }
        }
    }

    fn visit_switch(&mut self, node: &quill_syntax::ast::SwitchNode) -> Result<()> {
        let condition = self.analyse_expr(&node.condition)?;

        let mut parsed: Vec<(i64, usize)> = Vec::new();
        for (case_expr, block_ix) in &node.cases {
            let value = self.analyse_expr(case_expr)?;
            if !condition.ty.is_any_or_match(&value.ty, false) {
                return Err(self.err(
                    "switch",
                    "",
                    case_expr.pos(),
                    format!(
                        "case type '{}' does not match switch expression type '{}'",
                        value.ty, condition.ty
                    ),
                ));
            }
            let constant = value.constant.ok_or_else(|| {
                self.err(
                    "switch",
                    "",
                    case_expr.pos(),
                    "case value must be a constant expression",
                )
            })?;
            let key = constant.hash_key();
            if parsed.iter().any(|(k, _)| *k == key) {
                return Err(self.err("switch", "", case_expr.pos(), "duplicate case value"));
            }
            parsed.push((key, *block_ix));
        }
        *node.parsed_cases.borrow_mut() = parsed;

        self.push_block_scope();
        self.switch_depth += 1;
        let result = node
            .statements
            .iter()
            .try_for_each(|s| self.visit_stmt(s));
        self.switch_depth -= 1;
        self.pop_block_scope();
        result
    }

    fn visit_if(&mut self, node: &quill_syntax::ast::IfNode) -> Result<()> {
        self.check_condition(&node.condition)?;
        self.visit_block(&node.if_block)?;
        for else_if in &node.else_ifs {
            self.check_condition(&else_if.condition)?;
            self.visit_block(&else_if.block)?;
        }
        if let Some(else_block) = &node.else_block {
            self.visit_block(else_block)?;
        }
        Ok(())
    }

    fn visit_enum(&mut self, names: &[String], pos: Pos) -> Result<()> {
        for (i, name) in names.iter().enumerate() {
            let scope = self.current_scope().expect("module scope");
            if scope.borrow().has_variable(name) {
                return Err(self.err(
                    "enum",
                    name,
                    pos,
                    format!("identifier '{}' is already declared", name),
                ));
            }
            let var = SemanticVariable::new(name.clone(), TypeDef::new(Tag::Int), true);
            var.set_value(SemanticValue::constant(
                TypeDef::new(Tag::Int),
                Constant::Int(i as i64),
            ));
            scope.borrow_mut().declare_variable(name.clone(), var);
        }
        Ok(())
    }

    fn visit_try_catch(&mut self, node: &quill_syntax::ast::TryCatchNode) -> Result<()> {
        self.visit_block(&node.try_block)?;

        self.push_block_scope();
        let result = (|| {
            if let Some(decl) = &node.decl {
                self.resolve_type_in_place(&decl.ty, decl.pos)?;
                let ty = decl.ty.borrow().clone();
                let valid = ty.is_string()
                    || ty.is_any()
                    || (ty.is_struct()
                        && ty.type_ns == DEFAULT_NAMESPACE
                        && ty.type_name == constants::EXCEPTION_STRUCT);
                if !valid {
                    return Err(self.err(
                        "try-catch",
                        &decl.name,
                        decl.pos,
                        format!(
                            "catch binding must be 'string' or '{}', got '{}'",
                            constants::exception_type(),
                            ty
                        ),
                    ));
                }
                let scope = self.current_scope().expect("catch scope");
                scope
                    .borrow_mut()
                    .declare_variable(decl.name.clone(), SemanticVariable::new(decl.name.clone(), ty, false));
            }
            self.visit_block(&node.catch_block)
        })();
        self.pop_block_scope();
        result
    }

    fn visit_throw(&mut self, error: &Rc<Expr>, pos: Pos) -> Result<()> {
        let value = self.analyse_expr(error)?;
        let ty = &value.ty;
        let valid = ty.is_string()
            || ty.is_any()
            || (ty.is_struct()
                && ty.type_ns == DEFAULT_NAMESPACE
                && ty.type_name == constants::EXCEPTION_STRUCT);
        if !valid {
            return Err(self.err(
                "throw",
                "",
                pos,
                format!(
                    "throw requires 'string' or '{}', got '{}'",
                    constants::exception_type(),
                    ty
                ),
            ));
        }
        Ok(())
    }

    fn visit_foreach(&mut self, node: &quill_syntax::ast::ForEachNode) -> Result<()> {
        self.push_block_scope();
        let result = (|| {
            let collection = self.analyse_expr(&node.collection)?;
            let cty = &collection.ty;
            if !cty.is_iterable() && !cty.is_any() {
                return Err(self.err(
                    "foreach",
                    "",
                    node.pos,
                    format!("'{}' is not iterable", cty),
                ));
            }

            match &*node.decl {
                Stmt::Declaration(decl) => {
                    self.resolve_type_in_place(&decl.ty, decl.pos)?;
                    let declared = decl.ty.borrow().clone();
                    let element = element_type_of(cty);
                    if !declared.is_any_or_match(&element, false) {
                        return Err(self.err(
                            "foreach",
                            &decl.name,
                            decl.pos,
                            format!(
                                "iteration variable type '{}' does not match element type '{}'",
                                declared, element
                            ),
                        ));
                    }
                    let scope = self.current_scope().expect("foreach scope");
                    scope.borrow_mut().declare_variable(
                        decl.name.clone(),
                        SemanticVariable::new(decl.name.clone(), declared, false),
                    );
                }
                Stmt::UnpackedDeclaration(unpack) => {
                    // `[key, value]` destructuring requires a struct
                    // collection and binds key: String, value: Any.
                    if !cty.is_struct() && !cty.is_any() {
                        return Err(self.err(
                            "foreach",
                            "",
                            node.pos,
                            "destructuring iteration requires a struct collection",
                        ));
                    }
                    if unpack.decls.len() != 2 {
                        return Err(self.err(
                            "foreach",
                            "",
                            node.pos,
                            "destructuring iteration binds exactly [key, value]",
                        ));
                    }
                    let scope = self.current_scope().expect("foreach scope");
                    let bindings = [
                        (unpack.decls[0].name.clone(), TypeDef::new(Tag::String)),
                        (unpack.decls[1].name.clone(), TypeDef::new(Tag::Any)),
                    ];
                    for (name, ty) in bindings {
                        scope
                            .borrow_mut()
                            .declare_variable(name.clone(), SemanticVariable::new(name, ty, false));
                    }
                }
                Stmt::Expr(expr) => {
                    // Existing identifier binding.
                    let target = self.analyse_expr(expr)?;
                    let element = element_type_of(cty);
                    if !target.ty.is_any_or_match(&element, false) {
                        return Err(self.err(
                            "foreach",
                            "",
                            node.pos,
                            format!(
                                "iteration target type '{}' does not match element type '{}'",
                                target.ty, element
                            ),
                        ));
                    }
                }
                other => {
                    return Err(self.err(
                        "foreach",
                        "",
                        other.pos(),
                        "invalid iteration binding",
                    ));
                }
            }

            self.loop_depth += 1;
            let r = self.visit_block(&node.block);
            self.loop_depth -= 1;
            r
        })();
        self.pop_block_scope();
        result
    }

    pub(crate) fn check_condition(&mut self, expr: &Rc<Expr>) -> Result<()> {
        let value = self.analyse_expr(expr)?;
        if !value.ty.is_bool() && !value.ty.is_any() {
            return Err(self.err(
                "condition",
                "",
                expr.pos(),
                format!("condition must be 'bool', got '{}'", value.ty),
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn visit_declaration(&mut self, decl: &Rc<DeclNode>) -> Result<()> {
        self.resolve_type_in_place(&decl.ty, decl.pos)?;
        let declared = decl.ty.borrow().clone();

        if declared.is_void() && !declared.is_array() {
            return Err(self.err(
                "declaration",
                &decl.name,
                decl.pos,
                "variable cannot be declared void",
            ));
        }

        {
            let scope = self.current_scope().expect("declaration scope");
            let scope = scope.borrow();
            if scope.has_variable(&decl.name)
                || scope.has_struct(&decl.name)
                || scope.has_class(&decl.name)
            {
                return Err(self.err(
                    "declaration",
                    &decl.name,
                    decl.pos,
                    format!("identifier '{}' is already declared", decl.name),
                ));
            }
        }

        let expr = decl.expr.borrow().clone();
        let mut value = match &expr {
            Some(expr) => {
                self.annotate_array_ctor(expr, &declared, decl)?;
                self.analyse_expr(expr)?
            }
            None => SemanticValue::typed(TypeDef::new(Tag::Undefined)),
        };

        if !value.ty.is_undefined() && !declared.is_any_or_match(&value.ty, false) {
            return Err(self.err(
                "declaration",
                &decl.name,
                decl.pos,
                format!(
                    "cannot initialise '{}' of type '{}' with a value of type '{}'",
                    decl.name, declared, value.ty
                ),
            ));
        }
        semantic::normalize(&declared, &mut value);

        if decl.is_constexpr && !value.is_constexpr() {
            return Err(self.err(
                "declaration",
                &decl.name,
                decl.pos,
                format!(
                    "constexpr '{}' requires a constant initialiser",
                    decl.name
                ),
            ));
        }

        let var = SemanticVariable::new(decl.name.clone(), declared, decl.is_const);
        if decl.is_const || decl.is_constexpr {
            var.set_value(value);
        }
        self.current_scope()
            .expect("declaration scope")
            .borrow_mut()
            .declare_variable(decl.name.clone(), var);
        Ok(())
    }

    /// Annotate an array-constructor initialiser with the declared element
    /// type and shape, and rewrite underfull constructors to the declared
    /// length when the shape is a known one-dimensional constant.
    fn annotate_array_ctor(
        &mut self,
        expr: &Rc<Expr>,
        declared: &TypeDef,
        decl: &DeclNode,
    ) -> Result<()> {
        let Expr::ArrayCtor { ty, values, .. } = &**expr else {
            return Ok(());
        };
        if !declared.is_array() {
            return Ok(());
        }

        *ty.borrow_mut() = declared.clone();

        let dims = &declared.dims;
        let len = values.borrow().len();
        if dims.len() == 1 && dims[0] > 1 {
            if len <= 1 {
                let fill: Rc<Expr> = values.borrow().first().cloned().unwrap_or_else(|| {
                    Rc::new(Expr::Null {
                        pos: decl.pos,
                    })
                });
                let mut filled = Vec::with_capacity(dims[0]);
                for _ in 0..dims[0] {
                    filled.push(fill.clone());
                }
                *values.borrow_mut() = filled;
                decl.static_dim.set(true);
            } else if len == dims[0] {
                decl.static_dim.set(true);
            }
        }
        Ok(())
    }

    fn visit_unpacked_declaration(&mut self, node: &Rc<quill_syntax::ast::UnpackNode>) -> Result<()> {
        self.resolve_type_in_place(&node.ty, node.pos)?;
        let group_ty = node.ty.borrow().clone();
        if !group_ty.is_struct() && !group_ty.is_any() {
            return Err(self.err(
                "unpacked-declaration",
                "",
                node.pos,
                format!("cannot destructure a value of type '{}'", group_ty),
            ));
        }

        let value = self.analyse_expr(&node.expr)?;
        if !group_ty.is_any_or_match(&value.ty, false) {
            return Err(self.err(
                "unpacked-declaration",
                "",
                node.pos,
                format!(
                    "cannot destructure '{}' into bindings of type '{}'",
                    value.ty, group_ty
                ),
            ));
        }

        let def = if group_ty.is_struct() {
            self.scopes.find_struct(
                &self.current_ns(),
                &self.current_module(),
                &group_ty.type_ns,
                &group_ty.type_name,
            )
        } else {
            None
        };

        for decl in &node.decls {
            self.resolve_type_in_place(&decl.ty, decl.pos)?;
            let declared = decl.ty.borrow().clone();
            if let Some(def) = &def {
                let field = def.fields.get(&decl.name).ok_or_else(|| {
                    self.err(
                        "unpacked-declaration",
                        &decl.name,
                        decl.pos,
                        format!(
                            "'{}' is not a field of '{}'",
                            decl.name,
                            group_ty.qualified_name()
                        ),
                    )
                })?;
                if !declared.is_any_or_match(&field.ty(), false) {
                    return Err(self.err(
                        "unpacked-declaration",
                        &decl.name,
                        decl.pos,
                        format!(
                            "binding '{}' of type '{}' does not match field type '{}'",
                            decl.name,
                            declared,
                            field.ty()
                        ),
                    ));
                }
            }
            let scope = self.current_scope().expect("declaration scope");
            scope.borrow_mut().declare_variable(
                decl.name.clone(),
                SemanticVariable::new(decl.name.clone(), declared, false),
            );
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Type resolution
    // ------------------------------------------------------------------

    /// Resolve a declared type in place: `Object` becomes `Struct` or
    /// `Class`, and constant dimension expressions collapse to shape
    /// constants.
    pub(crate) fn resolve_type_in_place(
        &mut self,
        ty: &std::cell::RefCell<TypeDef>,
        pos: Pos,
    ) -> Result<()> {
        let mut resolved = ty.borrow().clone();
        self.resolve_type(&mut resolved, pos)?;
        *ty.borrow_mut() = resolved;
        Ok(())
    }

    pub(crate) fn resolve_type(&mut self, ty: &mut TypeDef, pos: Pos) -> Result<()> {
        if ty.is_object() {
            let ns = self.current_ns();
            let module = self.current_module();
            if self
                .scopes
                .find_struct(&ns, &module, &ty.type_ns, &ty.type_name)
                .is_some()
            {
                ty.tag = Tag::Struct;
            } else if self
                .scopes
                .find_class(&ns, &module, &ty.type_ns, &ty.type_name)
                .is_some()
            {
                ty.tag = Tag::Class;
            } else {
                return Err(self.err(
                    "declaration",
                    &ty.type_name.clone(),
                    pos,
                    format!("type '{}' was not declared", ty.qualified_name()),
                ));
            }
            if ty.type_ns.is_empty() {
                // Record where the type actually lives.
                let scope = if ty.is_struct() {
                    self.scopes.struct_scope(&ns, &module, "", &ty.type_name)
                } else {
                    self.scopes.class_scope(&ns, &module, "", &ty.type_name)
                };
                if let Some(scope) = scope {
                    ty.type_ns = scope.borrow().namespace.clone();
                }
            }
        }

        if !ty.expr_dims.is_empty() {
            let mut dims = Vec::with_capacity(ty.expr_dims.len());
            let mut all_const = true;
            for dim in ty.expr_dims.clone() {
                let value = self.analyse_expr(&dim)?;
                if !value.ty.is_int() && !value.ty.is_any() {
                    return Err(self.err(
                        "declaration",
                        "",
                        pos,
                        format!("array dimension must be 'int', got '{}'", value.ty),
                    ));
                }
                match value.constant.as_ref().and_then(Constant::as_int) {
                    Some(n) if n >= 0 => dims.push(n as usize),
                    Some(_) => {
                        return Err(self.err(
                            "declaration",
                            "",
                            pos,
                            "array dimension cannot be negative",
                        ));
                    }
                    None => {
                        all_const = false;
                        break;
                    }
                }
            }
            if all_const {
                ty.dims = dims;
                ty.expr_dims.clear();
            }
        }
        Ok(())
    }
}

/// The element type an iteration over `collection_ty` yields.
pub(crate) fn element_type_of(collection_ty: &TypeDef) -> TypeDef {
    if collection_ty.is_array() {
        collection_ty.element_type()
    } else if collection_ty.is_string() {
        TypeDef::new(Tag::Char)
    } else if collection_ty.is_struct() {
        constants::entry_type()
    } else {
        TypeDef::new(Tag::Any)
    }
}
