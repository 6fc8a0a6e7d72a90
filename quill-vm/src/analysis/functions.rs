// quill-vm - Function, struct and class analysis
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Definition analysis: overload registration and legality, forward
//! declarations, return-coverage proof, struct and class shapes.

use std::rc::Rc;

use quill_core::fun_ref;
use quill_core::scope::Scope;
use quill_core::semantic::SemanticVariable;
use quill_syntax::ast::{ClassDeclNode, FunDeclNode, Stmt, StructDeclNode, SwitchNode};
use quill_syntax::types::{ClassDef, DefaultValue, FunDef, Param, StructDef, TypeDef};

use super::{Analyser, Result};

impl Analyser {
    /// Analyse a function definition and register its overload.
    pub(crate) fn analyse_function(&mut self, node: &Rc<FunDeclNode>) -> Result<quill_core::FunRef> {
        self.resolve_type_in_place(&node.ret, node.pos)?;

        // Resolve every parameter type in place.
        for param in &node.params {
            match param {
                Param::Single(var) => self.resolve_type_in_place(&var.ty, node.pos)?,
                Param::Unpack(group) => {
                    self.resolve_type_in_place(&group.ty, node.pos)?;
                    for var in &group.vars {
                        self.resolve_type_in_place(&var.ty, node.pos)?;
                    }
                }
            }
        }
        self.check_signature(node)?;

        let signature: Vec<TypeDef> = node.params.iter().map(Param::ty).collect();
        let scope = self.current_scope().expect("definition scope");

        let existing =
            quill_core::scope::find_same_signature(&scope.borrow(), &node.name, &signature);
        let fun = match existing {
            Some(existing) => {
                let has_block = existing.borrow().block.is_some();
                if has_block || node.block.is_none() {
                    return Err(self.err(
                        "function-definition",
                        &node.name,
                        node.pos,
                        format!(
                            "function '{}' is already defined",
                            existing.borrow().signature_string()
                        ),
                    ));
                }
                // A forward declaration gains its body.
                existing.borrow_mut().block = node.block.clone();
                let forwards = self.forward_decls_mut();
                forwards.retain(|f| !Rc::ptr_eq(f, &existing));
                existing
            }
            None => {
                let mut def = FunDef::new(
                    node.name.clone(),
                    node.ret.borrow().clone(),
                    node.params.clone(),
                );
                def.block = node.block.clone();
                let fun = fun_ref(def);
                scope
                    .borrow_mut()
                    .declare_function(node.name.clone(), fun.clone());
                if node.block.is_none() {
                    self.forward_decls_mut().push(fun.clone());
                }
                fun
            }
        };

        if let Some(block) = &node.block {
            self.push_block_scope();
            self.declare_parameters(node)?;
            self.function_stack_mut().push(fun.clone());
            let body = self.visit_block(block);
            self.function_stack_mut().pop();
            self.pop_block_scope();
            body?;

            let ret = fun.borrow().ret.clone();
            if !ret.is_void() && !block_returns(block) {
                return Err(self.err(
                    "function-definition",
                    &node.name,
                    node.pos,
                    format!(
                        "function '{}' does not return a value on every path",
                        fun.borrow().signature_string()
                    ),
                ));
            }
        }

        Ok(fun)
    }

    /// Signature legality: at most one rest parameter in last position,
    /// default-valued parameters form a contiguous suffix.
    fn check_signature(&mut self, node: &Rc<FunDeclNode>) -> Result<()> {
        let mut seen_default = false;
        for (i, param) in node.params.iter().enumerate() {
            if param.is_rest() && i + 1 != node.params.len() {
                return Err(self.err(
                    "function-definition",
                    &node.name,
                    node.pos,
                    "rest parameter must be the last parameter",
                ));
            }
            if param.has_default() {
                seen_default = true;
            } else if seen_default && !param.is_rest() {
                return Err(self.err(
                    "function-definition",
                    &node.name,
                    node.pos,
                    "parameters after a default value must also have defaults",
                ));
            }
        }
        Ok(())
    }

    /// Declare parameters in the function's scope and type-check defaults.
    fn declare_parameters(&mut self, node: &Rc<FunDeclNode>) -> Result<()> {
        for param in &node.params {
            match param {
                Param::Single(var) => {
                    let mut ty = var.ty();
                    if var.is_rest {
                        // A rest parameter binds the collected tail array.
                        if !ty.is_array() {
                            ty.dims = vec![0];
                        }
                    }
                    if let DefaultValue::Expr(default) = &var.default {
                        let mut value = self.analyse_expr(default)?;
                        if !ty.is_any_or_match(&value.ty, false) {
                            return Err(self.err(
                                "function-definition",
                                &var.name,
                                node.pos,
                                format!(
                                    "default value of type '{}' does not match parameter type '{}'",
                                    value.ty, ty
                                ),
                            ));
                        }
                        quill_core::semantic::normalize(&ty, &mut value);
                    }
                    let scope = self.current_scope().expect("function scope");
                    scope.borrow_mut().declare_variable(
                        var.name.clone(),
                        SemanticVariable::new(var.name.clone(), ty, var.is_const),
                    );
                }
                Param::Unpack(group) => {
                    for var in &group.vars {
                        let scope = self.current_scope().expect("function scope");
                        scope.borrow_mut().declare_variable(
                            var.name.clone(),
                            SemanticVariable::new(var.name.clone(), var.ty(), false),
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Analyse a struct definition and register its shape.
    pub(crate) fn analyse_struct(&mut self, node: &Rc<StructDeclNode>) -> Result<()> {
        {
            let scope = self.current_scope().expect("definition scope");
            let scope = scope.borrow();
            if scope.has_struct(&node.name) || scope.has_class(&node.name) {
                return Err(self.err(
                    "struct-definition",
                    &node.name,
                    node.pos,
                    format!("type '{}' is already declared", node.name),
                ));
            }
        }

        let mut def = StructDef::new(node.name.clone());
        for field in &node.fields {
            self.resolve_type_in_place(&field.ty, node.pos)?;
            if field.ty.borrow().is_void() {
                return Err(self.err(
                    "struct-definition",
                    &field.name,
                    node.pos,
                    "struct field cannot be declared void",
                ));
            }
            if def.fields.contains_key(&field.name) {
                return Err(self.err(
                    "struct-definition",
                    &field.name,
                    node.pos,
                    format!("duplicate field '{}'", field.name),
                ));
            }
            def.fields.insert(field.name.clone(), field.clone());
        }

        self.current_scope()
            .expect("definition scope")
            .borrow_mut()
            .declare_struct(Rc::new(def));
        Ok(())
    }

    /// Analyse a class definition: fields, then methods with the class
    /// scope open so `self` and bare members resolve.
    pub(crate) fn analyse_class(&mut self, node: &Rc<ClassDeclNode>) -> Result<()> {
        {
            let scope = self.current_scope().expect("definition scope");
            let scope = scope.borrow();
            if scope.has_struct(&node.name) || scope.has_class(&node.name) {
                return Err(self.err(
                    "class-definition",
                    &node.name,
                    node.pos,
                    format!("type '{}' is already declared", node.name),
                ));
            }
        }

        let ns = self.current_ns();
        let module = self.current_module();

        let def = Rc::new(std::cell::RefCell::new(ClassDef::new(node.name.clone())));
        self.current_scope()
            .expect("definition scope")
            .borrow_mut()
            .declare_class(def.clone());

        let class_scope = self
            .scopes
            .push_scope(Scope::class_scope(ns.clone(), module.clone()));

        let result = (|| {
            for decl in &node.declarations {
                self.resolve_type_in_place(&decl.ty, decl.pos)?;
                let ty = decl.ty.borrow().clone();
                if ty.is_void() && !ty.is_array() {
                    return Err(self.err(
                        "class-definition",
                        &decl.name,
                        decl.pos,
                        "class field cannot be declared void",
                    ));
                }
                if let Some(default) = decl.expr.borrow().clone() {
                    let value = self.analyse_expr(&default)?;
                    if !ty.is_any_or_match(&value.ty, false) {
                        return Err(self.err(
                            "class-definition",
                            &decl.name,
                            decl.pos,
                            format!(
                                "field default of type '{}' does not match field type '{}'",
                                value.ty, ty
                            ),
                        ));
                    }
                }

                let field = quill_syntax::types::VarDef::with_default(
                    decl.name.clone(),
                    ty.clone(),
                    match decl.expr.borrow().clone() {
                        Some(e) => DefaultValue::Expr(e),
                        None => DefaultValue::None,
                    },
                );
                def.borrow_mut()
                    .vars
                    .insert(decl.name.clone(), Rc::new(field));
                class_scope.borrow_mut().declare_variable(
                    decl.name.clone(),
                    SemanticVariable::new(decl.name.clone(), ty, decl.is_const),
                );
            }

            self.class_stack_mut()
                .push((node.name.clone(), class_scope.clone()));
            let methods = (|| {
                for fun_node in &node.functions {
                    fun_node.is_class_member.set(true);
                    let fun = self.analyse_function(fun_node)?;
                    def.borrow_mut().funs.push(fun);
                }
                Ok(())
            })();
            self.class_stack_mut().pop();
            methods
        })();

        self.scopes.pop_scope(&ns, &module);
        result
    }
}

// ----------------------------------------------------------------------
// Return coverage
// ----------------------------------------------------------------------

/// Structural proof that a block returns (or throws) on every path.
pub(crate) fn block_returns(block: &quill_syntax::ast::BlockNode) -> bool {
    block.statements.iter().any(|s| stmt_returns(s))
}

fn stmt_returns(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Return { .. } | Stmt::Throw { .. } | Stmt::Exit { .. } => true,
        Stmt::Block(block) => block_returns(block),
        Stmt::If(node) => {
            node.else_block.as_deref().map(block_returns).unwrap_or(false)
                && block_returns(&node.if_block)
                && node.else_ifs.iter().all(|e| block_returns(&e.block))
        }
        Stmt::TryCatch(node) => block_returns(&node.try_block) && block_returns(&node.catch_block),
        Stmt::Switch(node) => switch_returns(node),
        _ => false,
    }
}

/// Every case block and the default must cover. A case without `break`
/// falls through, so a later block's return covers earlier cases.
fn switch_returns(node: &SwitchNode) -> bool {
    let Some(default) = node.default_block else {
        return false;
    };
    let mut starts: Vec<usize> = node.cases.iter().map(|(_, ix)| *ix).collect();
    starts.push(default);
    starts.iter().all(|&ix| covers_from(&node.statements, ix))
}

fn covers_from(stmts: &[Rc<Stmt>], start: usize) -> bool {
    for stmt in stmts.iter().skip(start) {
        if matches!(&**stmt, Stmt::Break { .. }) {
            return false;
        }
        if stmt_returns(stmt) {
            return true;
        }
    }
    false
}
