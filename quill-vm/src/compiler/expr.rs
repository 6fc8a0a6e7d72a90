// quill-vm - Expression lowering
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Expression lowering: literals, constructors, operators with
//! short-circuiting, identifier access chains and calls.

use std::rc::Rc;

use quill_core::constants::{self, DEFAULT_NAMESPACE};
use quill_syntax::ast::{CallNode, Expr, Identifier};
use quill_syntax::ops as tokens;

use super::{CompileError, Compiler, Result};
use crate::opcode::Instruction;

impl Compiler {
    pub(crate) fn visit_expr(&mut self, expr: &Rc<Expr>) -> Result<()> {
        match &**expr {
            Expr::BoolLit { value, .. } => {
                self.emit(Instruction::PushBool(*value));
                Ok(())
            }
            Expr::IntLit { value, .. } => {
                self.emit(Instruction::PushInt(*value));
                Ok(())
            }
            Expr::FloatLit { value, .. } => {
                self.emit(Instruction::PushFloat(*value));
                Ok(())
            }
            Expr::CharLit { value, .. } => {
                self.emit(Instruction::PushChar(*value));
                Ok(())
            }
            Expr::StringLit { value, .. } => {
                self.emit(Instruction::PushString(value.clone()));
                Ok(())
            }
            Expr::Null { .. } => {
                self.emit(Instruction::PushVoid);
                Ok(())
            }

            Expr::Lambda { fun, .. } => {
                self.visit_function_definition(fun)?;
                let ns = self.current_ns();
                self.emit(Instruction::PushFunction {
                    ns,
                    name: fun.name.clone(),
                });
                Ok(())
            }

            Expr::ArrayCtor { ty, values, .. } => {
                let values = values.borrow().clone();
                self.emit_type_definition(&ty.borrow())?;
                self.emit(Instruction::InitArray { size: values.len() });
                for (i, value) in values.iter().enumerate() {
                    self.visit_expr(value)?;
                    self.emit(Instruction::SetElement { index: i });
                }
                self.emit(Instruction::PushArray);
                Ok(())
            }

            Expr::StructCtor {
                type_ns,
                type_name,
                values,
                ..
            } => {
                let ns = self.current_ns();
                let module = self.current_module();
                self.emit(Instruction::InitStruct {
                    ns: ns.clone(),
                    module: module.clone(),
                    type_ns: type_ns.borrow().clone(),
                    name: type_name.clone(),
                });
                for (field, value) in values {
                    self.visit_expr(value)?;
                    self.emit(Instruction::SetField {
                        ns: ns.clone(),
                        module: module.clone(),
                        name: field.clone(),
                    });
                }
                self.emit(Instruction::PushStruct);
                Ok(())
            }

            Expr::Binary {
                op, left, right, pos,
            } => {
                self.set_debug("binary-expression", op, *pos);
                self.emit(Instruction::PushVarRef(tokens::is_assignment(op)));
                self.visit_expr(left)?;
                self.emit(Instruction::PopVarRef);

                match op.as_str() {
                    // Short-circuit: the left value is the result when it
                    // decides the operation.
                    "and" => {
                        self.emit(Instruction::DupConstant);
                        let skip = self.emit(Instruction::JumpIfFalse { target: 0 });
                        self.emit(Instruction::PopConstant);
                        self.visit_expr(right)?;
                        let after = self.pc();
                        self.patch_jump(skip, after);
                    }
                    "or" => {
                        self.emit(Instruction::DupConstant);
                        let skip = self.emit(Instruction::JumpIfTrue { target: 0 });
                        self.emit(Instruction::PopConstant);
                        self.visit_expr(right)?;
                        let after = self.pc();
                        self.patch_jump(skip, after);
                    }
                    _ => {
                        self.visit_expr(right)?;
                        let ins = Instruction::for_binary_op(op)
                            .ok_or_else(|| CompileError::UnknownOperator(op.clone()))?;
                        self.emit(ins);
                    }
                }
                Ok(())
            }

            Expr::Unary { op, expr: inner, .. } => {
                self.visit_expr(inner)?;
                let ins = Instruction::for_unary_op(op)
                    .ok_or_else(|| CompileError::UnknownOperator(op.clone()))?;
                self.emit(ins);
                Ok(())
            }

            Expr::Ident {
                parts, access_ns, pos,
            } => {
                self.set_debug(
                    "identifier",
                    &parts.first().map(|p| p.name.clone()).unwrap_or_default(),
                    *pos,
                );
                self.emit_identifier(parts, access_ns)
            }

            Expr::Ternary {
                condition,
                if_true,
                if_false,
                ..
            } => {
                self.visit_expr(condition)?;
                let skip_true = self.emit(Instruction::JumpIfFalse { target: 0 });
                self.visit_expr(if_true)?;
                let skip_false = self.emit(Instruction::Jump { target: 0 });
                let here = self.pc();
                self.patch_jump(skip_true, here);
                self.visit_expr(if_false)?;
                let end = self.pc();
                self.patch_jump(skip_false, end);
                Ok(())
            }

            Expr::Call(call) => self.visit_call(call),

            Expr::TypeCast { tag, expr: inner, .. } => {
                self.visit_expr(inner)?;
                self.emit(Instruction::TypeParse { tag: *tag });
                Ok(())
            }

            Expr::TypeExpr { ty, .. } => {
                self.emit_type_definition(ty)?;
                self.emit(Instruction::PushType);
                Ok(())
            }

            Expr::This { access, pos } => {
                // `this` builds a Context struct describing the enclosing
                // class, function or module.
                self.set_debug("this", "", *pos);
                let (kind, name) = self.this_name();
                let ns = self.current_ns();
                let module = self.current_module();
                self.emit(Instruction::InitStruct {
                    ns: ns.clone(),
                    module: module.clone(),
                    type_ns: DEFAULT_NAMESPACE.to_string(),
                    name: constants::CONTEXT_STRUCT.to_string(),
                });
                self.emit(Instruction::PushString(name));
                self.emit(Instruction::SetField {
                    ns: ns.clone(),
                    module: module.clone(),
                    name: constants::CONTEXT_NAME.to_string(),
                });
                self.emit(Instruction::PushString(ns.clone()));
                self.emit(Instruction::SetField {
                    ns: ns.clone(),
                    module: module.clone(),
                    name: constants::CONTEXT_NS.to_string(),
                });
                self.emit(Instruction::PushString(kind));
                self.emit(Instruction::SetField {
                    ns: ns.clone(),
                    module,
                    name: constants::CONTEXT_TYPE.to_string(),
                });
                self.emit(Instruction::PushStruct);
                self.emit_access_tail(access)
            }

            Expr::TypeOf { expr: inner, .. } => {
                self.visit_expr(inner)?;
                self.emit(Instruction::TypeOf);
                Ok(())
            }
            Expr::TypeId { expr: inner, .. } => {
                self.visit_expr(inner)?;
                self.emit(Instruction::TypeId);
                Ok(())
            }
            Expr::RefId { expr: inner, .. } => {
                self.visit_expr(inner)?;
                self.emit(Instruction::RefId);
                Ok(())
            }
            Expr::IsStruct { expr: inner, .. } => {
                self.visit_expr(inner)?;
                self.emit(Instruction::IsStruct);
                Ok(())
            }
            Expr::IsArray { expr: inner, .. } => {
                self.visit_expr(inner)?;
                self.emit(Instruction::IsArray);
                Ok(())
            }
            Expr::IsAny { expr: inner, .. } => {
                self.visit_expr(inner)?;
                self.emit(Instruction::IsAny);
                Ok(())
            }
        }
    }

    /// Load an identifier path: the head variable, then member and index
    /// accesses. `self.x` routes the lookup at the enclosing class scope.
    fn emit_identifier(&mut self, parts: &[Identifier], access_ns: &str) -> Result<()> {
        let (head, rest) = if parts[0].name == "self" && parts.len() > 1 {
            self.emit(Instruction::SelfInvoke);
            (&parts[1], &parts[2..])
        } else {
            (&parts[0], &parts[1..])
        };

        let ns = self.current_ns();
        let module = self.current_module();
        self.emit(Instruction::LoadVar {
            ns,
            module,
            access_ns: access_ns.to_string(),
            name: head.name.clone(),
        });
        for index in &head.access {
            self.visit_expr(index)?;
            self.emit(Instruction::LoadSubIx);
        }
        self.emit_access_tail(rest)
    }

    /// Member and index accesses applied to whatever is on the stack.
    fn emit_access_tail(&mut self, parts: &[Identifier]) -> Result<()> {
        for part in parts {
            if !part.name.is_empty() {
                self.emit(Instruction::LoadSubId {
                    name: part.name.clone(),
                });
            }
            for index in &part.access {
                self.visit_expr(index)?;
                self.emit(Instruction::LoadSubIx);
            }
        }
        Ok(())
    }

    fn visit_call(&mut self, call: &Rc<CallNode>) -> Result<()> {
        self.set_debug("function-call", call.name(), call.pos);
        let self_call = call.callee.len() > 1 && call.callee[0].name == "self";

        let mut name = call.name().to_string();

        // Member calls load the callee value first, so the function sits
        // beneath its arguments; the empty name tells the VM to take the
        // callee from the stack.
        if call.callee.len() > 1 && !self_call {
            self.emit_identifier(&call.callee, &call.access_ns)?;
            name = String::new();
        }

        for arg in &call.args {
            self.visit_expr(arg)?;
        }

        if self_call {
            self.emit(Instruction::SelfInvoke);
            name = call.callee[1].name.clone();
        }

        let ns = self.current_ns();
        let module = self.current_module();
        self.emit(Instruction::Call {
            ns,
            module,
            access_ns: call.access_ns.clone(),
            name,
            argc: call.args.len(),
        });

        self.emit_access_tail(&call.post_access)?;

        if let Some(chained) = &call.chained {
            // The returned function value is called in place.
            self.visit_chained_call(chained)?;
        }
        Ok(())
    }

    /// A call on the value the previous call returned: either a member
    /// call on the result or an invocation of a returned function value.
    fn visit_chained_call(&mut self, call: &Rc<CallNode>) -> Result<()> {
        self.emit_access_tail(&call.callee)?;
        for arg in &call.args {
            self.visit_expr(arg)?;
        }
        let ns = self.current_ns();
        let module = self.current_module();
        self.emit(Instruction::Call {
            ns,
            module,
            access_ns: call.access_ns.clone(),
            name: String::new(),
            argc: call.args.len(),
        });
        self.emit_access_tail(&call.post_access)?;
        if let Some(next) = &call.chained {
            self.visit_chained_call(next)?;
        }
        Ok(())
    }
}
