// quill-vm - Expression analysis
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Expression typing and constant propagation.

use std::rc::Rc;

use quill_core::constants;
use quill_core::semantic::{self, Constant, SemanticValue};
use quill_syntax::ast::{CallNode, Expr, Identifier, Pos};
use quill_syntax::ops as tokens;
use quill_syntax::types::{signature_string, Tag, TypeDef};

use super::{Analyser, Result};

impl Analyser {
    /// Analyse one expression, returning its type and folded constant.
    pub(crate) fn analyse_expr(&mut self, expr: &Rc<Expr>) -> Result<SemanticValue> {
        match &**expr {
            Expr::BoolLit { value, .. } => Ok(SemanticValue::constant(
                TypeDef::new(Tag::Bool),
                Constant::Bool(*value),
            )),
            Expr::IntLit { value, .. } => Ok(SemanticValue::constant(
                TypeDef::new(Tag::Int),
                Constant::Int(*value),
            )),
            Expr::FloatLit { value, .. } => Ok(SemanticValue::constant(
                TypeDef::new(Tag::Float),
                Constant::Float(*value),
            )),
            Expr::CharLit { value, .. } => Ok(SemanticValue::constant(
                TypeDef::new(Tag::Char),
                Constant::Char(*value),
            )),
            Expr::StringLit { value, .. } => Ok(SemanticValue::constant(
                TypeDef::new(Tag::String),
                Constant::Str(value.clone()),
            )),
            Expr::Null { .. } => Ok(SemanticValue::typed(TypeDef::new(Tag::Void))),

            Expr::Lambda { fun, .. } => {
                self.analyse_function(fun)?;
                Ok(SemanticValue::typed(TypeDef::new(Tag::Function)))
            }

            Expr::ArrayCtor { ty, values, pos } => self.analyse_array_ctor(ty, values, *pos),

            Expr::StructCtor {
                type_ns,
                type_name,
                values,
                pos,
            } => self.analyse_struct_ctor(type_ns, type_name, values, *pos),

            Expr::Binary {
                op, left, right, ..
            } => self.analyse_binary(op, left, right, expr.pos()),

            Expr::Unary { op, expr: inner, .. } => {
                let value = self.analyse_expr(inner)?;
                semantic::unary(op, &value)
                    .map_err(|msg| self.err("unary-expression", op, expr.pos(), msg))
            }

            Expr::Ident {
                parts, access_ns, pos,
            } => self.resolve_identifier(parts, access_ns, *pos),

            Expr::Ternary {
                condition,
                if_true,
                if_false,
                ..
            } => {
                self.check_condition(condition)?;
                let t = self.analyse_expr(if_true)?;
                let f = self.analyse_expr(if_false)?;
                if t.ty.matches(&f.ty, true) {
                    Ok(SemanticValue::typed(t.ty))
                } else {
                    Ok(SemanticValue::typed(TypeDef::new(Tag::Any)))
                }
            }

            Expr::Call(call) => self.analyse_call(call),

            Expr::TypeCast { tag, expr: inner, .. } => {
                let value = self.analyse_expr(inner)?;
                if value.ty.is_array() {
                    return Err(self.err(
                        "type-cast",
                        "",
                        expr.pos(),
                        format!("cannot cast an array to '{}'", tag),
                    ));
                }
                // Constant casts fold through the runtime rule.
                if let Some(c) = &value.constant {
                    if let Ok(folded) = quill_core::ops::type_parse(*tag, &c.to_value()) {
                        if let Some(constant) = Constant::from_value(&folded) {
                            return Ok(SemanticValue::constant(folded.ty, constant));
                        }
                    }
                }
                Ok(SemanticValue::typed(TypeDef::new(*tag)))
            }

            Expr::TypeExpr { ty, .. } => Ok(SemanticValue::typed(ty.clone())),

            Expr::This { access, pos } => {
                // `this` always resolves: it describes the enclosing class,
                // function or module.
                let value = SemanticValue::typed(constants::context_type());
                self.apply_access_path(value, access, true, *pos)
            }

            Expr::TypeOf { expr: inner, .. } => {
                self.analyse_expr(inner)?;
                Ok(SemanticValue::typed(TypeDef::new(Tag::String)))
            }
            Expr::TypeId { expr: inner, .. } | Expr::RefId { expr: inner, .. } => {
                self.analyse_expr(inner)?;
                Ok(SemanticValue::typed(TypeDef::new(Tag::Int)))
            }
            Expr::IsStruct { expr: inner, .. }
            | Expr::IsArray { expr: inner, .. }
            | Expr::IsAny { expr: inner, .. } => {
                self.analyse_expr(inner)?;
                Ok(SemanticValue::typed(TypeDef::new(Tag::Bool)))
            }
        }
    }

    fn analyse_binary(
        &mut self,
        op: &str,
        left: &Rc<Expr>,
        right: &Rc<Expr>,
        pos: Pos,
    ) -> Result<SemanticValue> {
        if tokens::is_assignment(op) {
            let assignable = matches!(&**left, Expr::Ident { .. } | Expr::This { .. });
            if !assignable {
                return Err(self.err(
                    "binary-expression",
                    op,
                    pos,
                    "left side of an assignment must be assignable",
                ));
            }
            let target = self.analyse_expr(left)?;
            let mut value = self.analyse_expr(right)?;

            if !target.ty.is_any_or_match(&value.ty, false) {
                return Err(self.err(
                    "binary-expression",
                    op,
                    pos,
                    format!(
                        "cannot assign a value of type '{}' to a target of type '{}'",
                        value.ty, target.ty
                    ),
                ));
            }
            if op != "=" {
                semantic::binary(tokens::assignment_core(op), &target, &value)
                    .map_err(|msg| self.err("binary-expression", op, pos, msg))?;
            }
            semantic::normalize(&target.ty, &mut value);
            return Ok(SemanticValue::typed(target.ty));
        }

        let l = self.analyse_expr(left)?;
        let r = self.analyse_expr(right)?;
        semantic::binary(op, &l, &r).map_err(|msg| self.err("binary-expression", op, pos, msg))
    }

    fn analyse_array_ctor(
        &mut self,
        ty: &std::cell::RefCell<TypeDef>,
        values: &std::cell::RefCell<Vec<Rc<Expr>>>,
        pos: Pos,
    ) -> Result<SemanticValue> {
        let exprs = values.borrow().clone();
        let mut element: Option<TypeDef> = None;

        for value_expr in &exprs {
            let value = self.analyse_expr(value_expr)?;
            element = Some(match element {
                None => value.ty,
                Some(prev) if prev.matches(&value.ty, true) => prev,
                Some(_) => TypeDef::new(Tag::Any),
            });
        }

        let mut annotated = ty.borrow().clone();
        if annotated.is_undefined() || annotated.tag == Tag::Any {
            let elem = element.unwrap_or_else(|| TypeDef::new(Tag::Any));
            annotated = TypeDef {
                tag: elem.tag,
                type_ns: elem.type_ns.clone(),
                type_name: elem.type_name.clone(),
                dims: vec![exprs.len()],
                expr_dims: Vec::new(),
            };
        } else if annotated.dims.is_empty() && annotated.expr_dims.is_empty() {
            annotated.dims = vec![exprs.len()];
        }
        self.resolve_type(&mut annotated, pos)?;
        *ty.borrow_mut() = annotated.clone();

        Ok(SemanticValue::typed(annotated))
    }

    fn analyse_struct_ctor(
        &mut self,
        type_ns: &std::cell::RefCell<String>,
        type_name: &str,
        values: &[(String, Rc<Expr>)],
        pos: Pos,
    ) -> Result<SemanticValue> {
        let ns = self.current_ns();
        let module = self.current_module();
        let access_ns = type_ns.borrow().clone();

        let scope = self
            .scopes
            .struct_scope(&ns, &module, &access_ns, type_name)
            .ok_or_else(|| {
                self.err(
                    "struct-constructor",
                    type_name,
                    pos,
                    format!("struct '{}' was not declared", type_name),
                )
            })?;
        let def = scope
            .borrow()
            .find_struct(type_name)
            .expect("scope vouched for the struct");
        let declared_ns = scope.borrow().namespace.clone();
        *type_ns.borrow_mut() = declared_ns.clone();

        for (field, value_expr) in values {
            let field_def = def.fields.get(field).ok_or_else(|| {
                self.err(
                    "struct-constructor",
                    field,
                    pos,
                    format!("'{}' is not a member of '{}'", field, type_name),
                )
            })?;
            let mut value = self.analyse_expr(value_expr)?;
            if !field_def.ty().is_any_or_match(&value.ty, false) {
                return Err(self.err(
                    "struct-constructor",
                    field,
                    pos,
                    format!(
                        "cannot initialise field '{}' of type '{}' with a value of type '{}'",
                        field,
                        field_def.ty(),
                        value.ty
                    ),
                ));
            }
            semantic::normalize(&field_def.ty(), &mut value);
        }

        Ok(SemanticValue::typed(TypeDef::object(
            Tag::Struct,
            declared_ns,
            type_name,
        )))
    }

    // ------------------------------------------------------------------
    // Identifiers
    // ------------------------------------------------------------------

    pub(crate) fn resolve_identifier(
        &mut self,
        parts: &[Identifier],
        access_ns: &str,
        pos: Pos,
    ) -> Result<SemanticValue> {
        let ns = self.current_ns();
        let module = self.current_module();

        let (head_value, rest) = if parts[0].name == "self" {
            let (_, class_scope) = self
                .current_class()
                .cloned()
                .ok_or_else(|| self.err("identifier", "self", pos, "'self' outside of a class"))?;
            if parts.len() < 2 {
                return Err(self.err("identifier", "self", pos, "'self' requires a member access"));
            }
            let member = &parts[1];
            let value = self.class_member_value(&class_scope, &member.name, pos)?;
            let value = self.apply_indexes(value, member.access.len(), pos)?;
            (value, &parts[2..])
        } else {
            let head = &parts[0];
            let value = self.plain_identifier_value(&ns, &module, access_ns, &head.name, pos)?;
            let value = self.apply_indexes(value, head.access.len(), pos)?;
            (value, &parts[1..])
        };

        self.apply_access_path(head_value, rest, false, pos)
    }

    fn plain_identifier_value(
        &mut self,
        ns: &str,
        module: &str,
        access_ns: &str,
        name: &str,
        pos: Pos,
    ) -> Result<SemanticValue> {
        if let Some(var) = self.scopes.find_variable(ns, module, access_ns, name) {
            let mut value = SemanticValue::typed(var.ty());
            if var.is_const {
                let stored = var.value();
                if stored.is_constexpr() {
                    value = stored;
                }
            }
            return Ok(value);
        }
        if let Some(scope) = self.scopes.struct_scope(ns, module, access_ns, name) {
            let declared_ns = scope.borrow().namespace.clone();
            return Ok(SemanticValue::typed(TypeDef::object(
                Tag::Struct,
                declared_ns,
                name,
            )));
        }
        if self
            .scopes
            .function_scope(ns, module, access_ns, name, None, true)
            .is_some()
        {
            return Ok(SemanticValue::typed(TypeDef::new(Tag::Function)));
        }
        Err(self.err(
            "identifier",
            name,
            pos,
            format!("identifier '{}' was not declared", name),
        ))
    }

    fn class_member_value(
        &self,
        class_scope: &quill_core::ScopeRef<quill_core::SemVarRef>,
        member: &str,
        pos: Pos,
    ) -> Result<SemanticValue> {
        let scope = class_scope.borrow();
        if let Some(var) = scope.find_variable(member) {
            return Ok(SemanticValue::typed(var.ty()));
        }
        if scope.find_function(member, None, true).is_some() {
            return Ok(SemanticValue::typed(TypeDef::new(Tag::Function)));
        }
        Err(self.err(
            "identifier",
            member,
            pos,
            format!("'{}' is not a member of the enclosing class", member),
        ))
    }

    /// Type the remaining member/index accesses of an identifier path.
    pub(crate) fn apply_access_path(
        &mut self,
        mut value: SemanticValue,
        parts: &[Identifier],
        _on_this: bool,
        pos: Pos,
    ) -> Result<SemanticValue> {
        for part in parts {
            value = self.apply_sub_id(value, &part.name, pos)?;
            value = self.apply_indexes(value, part.access.len(), pos)?;
        }
        Ok(value)
    }

    fn apply_sub_id(&mut self, value: SemanticValue, member: &str, pos: Pos) -> Result<SemanticValue> {
        let ty = &value.ty;
        if ty.is_any() {
            return Ok(SemanticValue::typed(TypeDef::new(Tag::Any)));
        }
        if ty.is_struct() && !ty.is_array() {
            let ns = self.current_ns();
            let module = self.current_module();
            let def = self
                .scopes
                .find_struct(&ns, &module, &ty.type_ns, &ty.type_name)
                .ok_or_else(|| {
                    self.err(
                        "identifier",
                        member,
                        pos,
                        format!("struct '{}' was not declared", ty.qualified_name()),
                    )
                })?;
            let field = def.fields.get(member).ok_or_else(|| {
                self.err(
                    "identifier",
                    member,
                    pos,
                    format!("'{}' is not a member of '{}'", member, ty.qualified_name()),
                )
            })?;
            return Ok(SemanticValue::typed(field.ty()));
        }
        if ty.is_class() && !ty.is_array() {
            let ns = self.current_ns();
            let module = self.current_module();
            let def = self
                .scopes
                .find_class(&ns, &module, &ty.type_ns, &ty.type_name)
                .ok_or_else(|| {
                    self.err(
                        "identifier",
                        member,
                        pos,
                        format!("class '{}' was not declared", ty.qualified_name()),
                    )
                })?;
            let def = def.borrow();
            if let Some(var) = def.vars.get(member) {
                return Ok(SemanticValue::typed(var.ty()));
            }
            if def.funs.iter().any(|f| f.borrow().name == member) {
                return Ok(SemanticValue::typed(TypeDef::new(Tag::Function)));
            }
            return Err(self.err(
                "identifier",
                member,
                pos,
                format!("'{}' is not a member of '{}'", member, ty.qualified_name()),
            ));
        }
        Err(self.err(
            "identifier",
            member,
            pos,
            format!("invalid '{}' access, member access needs an object value", ty),
        ))
    }

    fn apply_indexes(&mut self, value: SemanticValue, count: usize, pos: Pos) -> Result<SemanticValue> {
        let mut value = value;
        for _ in 0..count {
            let ty = &value.ty;
            if ty.is_array() {
                let mut elem = ty.clone();
                if !elem.dims.is_empty() {
                    elem.dims.pop();
                } else {
                    elem.expr_dims.pop();
                }
                value = SemanticValue::typed(elem);
            } else if ty.is_string() {
                value = SemanticValue::typed(TypeDef::new(Tag::Char));
            } else if ty.is_any() {
                value = SemanticValue::typed(TypeDef::new(Tag::Any));
            } else {
                return Err(self.err(
                    "identifier",
                    "",
                    pos,
                    format!("invalid '{}' index access, expected an array or string", ty),
                ));
            }
        }
        Ok(value)
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    pub(crate) fn analyse_call(&mut self, call: &Rc<CallNode>) -> Result<SemanticValue> {
        let mut signature = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            signature.push(self.analyse_expr(arg)?.ty);
        }

        let result = self.resolve_call_target(call, &signature)?;
        let result = self.apply_access_path(result, &call.post_access, false, call.pos)?;

        if let Some(chained) = &call.chained {
            // A chained call invokes the function value the call returned.
            for arg in &chained.args {
                self.analyse_expr(arg)?;
            }
            return Ok(SemanticValue::typed(TypeDef::new(Tag::Any)));
        }
        Ok(result)
    }

    fn resolve_call_target(
        &mut self,
        call: &Rc<CallNode>,
        signature: &[TypeDef],
    ) -> Result<SemanticValue> {
        let ns = self.current_ns();
        let module = self.current_module();
        let pos = call.pos;

        // `self.method(...)`
        if call.callee.len() > 1 && call.callee[0].name == "self" {
            let (_, class_scope) = self.current_class().cloned().ok_or_else(|| {
                self.err("function-call", "self", pos, "'self' outside of a class")
            })?;
            let method = &call.callee[1].name;
            let found = {
                let scope = class_scope.borrow();
                scope
                    .find_function(method, Some(signature), true)
                    .or_else(|| scope.find_function(method, Some(signature), false))
            };
            let fun = found.ok_or_else(|| {
                self.err(
                    "function-call",
                    method,
                    pos,
                    format!(
                        "function '{}' was not declared",
                        signature_string(method, signature)
                    ),
                )
            })?;
            let ret = fun.borrow().ret.clone();
            return Ok(SemanticValue::typed(ret));
        }

        // `obj.method(...)`: resolve the object path, dispatch on its class.
        if call.callee.len() > 1 {
            let target = self.resolve_identifier(
                &call.callee[..call.callee.len() - 1],
                &call.access_ns,
                pos,
            )?;
            let method = &call.callee.last().expect("non-empty path").name;
            if target.ty.is_any() {
                return Ok(SemanticValue::typed(TypeDef::new(Tag::Any)));
            }
            if !target.ty.is_class() {
                return Err(self.err(
                    "function-call",
                    method,
                    pos,
                    format!("cannot call a method on a value of type '{}'", target.ty),
                ));
            }
            let def = self
                .scopes
                .find_class(&ns, &module, &target.ty.type_ns, &target.ty.type_name)
                .ok_or_else(|| {
                    self.err(
                        "function-call",
                        method,
                        pos,
                        format!("class '{}' was not declared", target.ty.qualified_name()),
                    )
                })?;
            let fun = find_method(&def, method, signature).ok_or_else(|| {
                self.err(
                    "function-call",
                    method,
                    pos,
                    format!(
                        "function '{}' was not declared",
                        signature_string(method, signature)
                    ),
                )
            })?;
            let ret = fun.borrow().ret.clone();
            return Ok(SemanticValue::typed(ret));
        }

        let name = call.name();

        // 1. Overloads, strict then relaxed.
        if let Some((scope, strict)) = self.scopes.function_scope_strict_then_relaxed(
            &ns,
            &module,
            &call.access_ns,
            name,
            signature,
        ) {
            let fun = scope
                .borrow()
                .find_function(name, Some(signature), strict)
                .expect("scope vouched for the overload");
            let ret = fun.borrow().ret.clone();
            return Ok(SemanticValue::typed(ret));
        }

        // 2. A variable of function type: dynamic call producing Any.
        if let Some(var) = self.scopes.find_variable(&ns, &module, &call.access_ns, name) {
            if var.ty().is_function() || var.ty().is_any() {
                return Ok(SemanticValue::typed(TypeDef::new(Tag::Any)));
            }
        }

        // 3. A class name: constructor interpretation.
        if let Some(scope) = self.scopes.class_scope(&ns, &module, &call.access_ns, name) {
            let declared_ns = scope.borrow().namespace.clone();
            let def = scope
                .borrow()
                .find_class(name)
                .expect("scope vouched for the class");
            if find_method(&def, "init", signature).is_none() {
                return Err(self.err(
                    "function-call",
                    name,
                    pos,
                    format!(
                        "no constructor '{}' declared for class '{}'",
                        signature_string("init", signature),
                        name
                    ),
                ));
            }
            return Ok(SemanticValue::typed(TypeDef::object(
                Tag::Class,
                declared_ns,
                name,
            )));
        }

        // 4. Names the VM honours natively.
        if self.builtin_functions.contains(name) {
            return Ok(SemanticValue::typed(TypeDef::new(Tag::Any)));
        }

        Err(self.err(
            "function-call",
            name,
            pos,
            format!(
                "function '{}' was not declared",
                signature_string(name, signature)
            ),
        ))
    }
}

/// Find a method overload on a class definition, strict first.
pub(crate) fn find_method(
    def: &quill_core::ClassRef,
    name: &str,
    signature: &[TypeDef],
) -> Option<quill_core::FunRef> {
    let def = def.borrow();
    for strict in [true, false] {
        for fun in &def.funs {
            let matches = {
                let f = fun.borrow();
                f.name == name && quill_core::scope::signature_matches(&f, signature, strict)
            };
            if matches {
                return Some(fun.clone());
            }
        }
    }
    None
}
