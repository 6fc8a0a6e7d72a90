// quill-vm - Bytecode compiler
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Tree to bytecode lowering.
//!
//! The compiler walks the checked tree and emits one flat instruction list.
//! Forward jumps are emitted with a placeholder target, kept on a patch
//! stack, and rewritten once the jump destination is known. Loops maintain
//! two patch stacks, continue targets and break targets, resolved when the
//! loop closes. Every instruction records a debug-table entry.

mod expr;

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use quill_core::constants::{self, DEFAULT_NAMESPACE, STD_NAMESPACE};
use quill_syntax::ast::{DeclNode, ModuleNode, Pos, Stmt};
use quill_syntax::types::{DefaultValue, Param, TypeDef, VarDef};

use crate::debug::{DebugInfo, DebugTable};
use crate::opcode::Instruction;

/// Error during lowering. The analyser rejects every malformed tree, so
/// these only fire on trees that skipped analysis.
#[derive(Debug, Clone)]
pub enum CompileError {
    /// Operator with no instruction mapping.
    UnknownOperator(String),
    /// `break` or `continue` with no enclosing loop.
    OutsideLoop(&'static str),
    /// `using` of a module the compiler was not given.
    UnknownModule(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::UnknownOperator(op) => write!(f, "unknown operator '{}'", op),
            CompileError::OutsideLoop(what) => write!(f, "'{}' outside of a loop", what),
            CompileError::UnknownModule(name) => write!(f, "unknown module '{}'", name),
        }
    }
}

impl std::error::Error for CompileError {}

/// Result type for compilation.
pub type Result<T> = std::result::Result<T, CompileError>;

/// The compiled program: instructions plus the debug table.
#[derive(Debug)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub debug: DebugTable,
}

/// The bytecode compiler.
pub struct Compiler {
    instructions: Vec<Instruction>,
    debug: DebugTable,
    modules: IndexMap<String, Rc<ModuleNode>>,
    main_module: String,
    module_stack: Vec<Rc<ModuleNode>>,
    compiled: HashSet<String>,
    /// Continue-target patch lists, one per open loop.
    start_targets: Vec<Vec<usize>>,
    /// Break/end patch lists, one per open loop or switch.
    end_targets: Vec<Vec<usize>>,
    /// End-of-if patch lists, one per open if chain.
    if_end_targets: Vec<Vec<usize>>,
    /// Enclosing `(kind, name)` for `this`.
    this_names: Vec<(String, String)>,
    current_info: DebugInfo,
}

impl Compiler {
    pub fn new(modules: Vec<Rc<ModuleNode>>, main: impl Into<String>) -> Self {
        let mut map = IndexMap::new();
        for m in modules {
            map.insert(m.name.clone(), m);
        }
        Compiler {
            instructions: Vec::new(),
            debug: DebugTable::new(),
            modules: map,
            main_module: main.into(),
            module_stack: Vec::new(),
            compiled: HashSet::new(),
            start_targets: Vec::new(),
            end_targets: Vec::new(),
            if_end_targets: Vec::new(),
            this_names: Vec::new(),
            current_info: DebugInfo::default(),
        }
    }

    /// Lower the whole program. The result ends with an exit code of 0 and
    /// a halt, so a program that runs off the end exits cleanly.
    pub fn compile(mut self) -> Result<Program> {
        let main = self
            .modules
            .get(&self.main_module)
            .cloned()
            .ok_or_else(|| CompileError::UnknownModule(self.main_module.clone()))?;
        self.compile_module(main)?;

        self.emit(Instruction::PushInt(0));
        self.emit(Instruction::Halt);

        Ok(Program {
            instructions: self.instructions,
            debug: self.debug,
        })
    }

    fn compile_module(&mut self, module: Rc<ModuleNode>) -> Result<()> {
        if self.compiled.contains(&module.name) {
            return Ok(());
        }
        self.compiled.insert(module.name.clone());
        self.module_stack.push(module.clone());

        self.set_debug("module", "", Pos::default());
        self.emit(Instruction::IncludeNamespace {
            module: module.name.clone(),
            ns: module.namespace.clone(),
        });
        self.emit(Instruction::IncludeNamespace {
            module: module.name.clone(),
            ns: DEFAULT_NAMESPACE.to_string(),
        });
        self.emit(Instruction::PushScope {
            ns: module.namespace.clone(),
            module: module.name.clone(),
        });

        for stmt in &module.statements {
            self.visit_stmt(stmt)?;
            self.discard_unused(stmt);
        }

        self.module_stack.pop();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Emission helpers
    // ------------------------------------------------------------------

    pub(crate) fn pc(&self) -> usize {
        self.instructions.len()
    }

    pub(crate) fn emit(&mut self, instruction: Instruction) -> usize {
        let pc = self.instructions.len();
        self.debug.record(pc, &self.current_info);
        self.instructions.push(instruction);
        pc
    }

    /// Rewrite the jump target of a previously emitted instruction.
    pub(crate) fn patch_jump(&mut self, at: usize, target: usize) {
        match &mut self.instructions[at] {
            Instruction::Jump { target: t }
            | Instruction::JumpIfFalse { target: t }
            | Instruction::JumpIfTrue { target: t }
            | Instruction::Try { handler: t } => *t = target,
            other => debug_assert!(false, "patch_jump on non-jump: {:?}", other),
        }
    }

    pub(crate) fn set_debug(&mut self, kind: &str, identifier: &str, pos: Pos) {
        self.current_info = DebugInfo::new(
            self.current_ns(),
            self.current_module(),
            kind,
            identifier,
            pos.row,
            pos.col,
        );
    }

    pub(crate) fn current_ns(&self) -> String {
        self.module_stack
            .last()
            .map(|m| m.namespace.clone())
            .unwrap_or_default()
    }

    pub(crate) fn current_module(&self) -> String {
        self.module_stack
            .last()
            .map(|m| m.name.clone())
            .unwrap_or_default()
    }

    pub(crate) fn this_name(&self) -> (String, String) {
        self.this_names.last().cloned().unwrap_or_else(|| {
            ("module".to_string(), self.current_module())
        })
    }

    fn push_scope_ins(&mut self) {
        let ns = self.current_ns();
        let module = self.current_module();
        self.emit(Instruction::PushScope { ns, module });
    }

    fn pop_scope_ins(&mut self) {
        let ns = self.current_ns();
        let module = self.current_module();
        self.emit(Instruction::PopScope { ns, module });
    }

    /// Statements that are bare expressions leave a value; drop it.
    fn discard_unused(&mut self, stmt: &Stmt) {
        if matches!(stmt, Stmt::Expr(_)) {
            self.emit(Instruction::PopConstant);
        }
    }

    /// Emit the pending-type-definition sequence for a declared type:
    /// dimension pushes followed by the type itself.
    pub(crate) fn emit_type_definition(&mut self, ty: &TypeDef) -> Result<()> {
        if !ty.dims.is_empty() {
            for dim in &ty.dims {
                self.emit(Instruction::PushInt(*dim as i64));
                self.emit(Instruction::SetArraySize);
            }
        } else {
            for dim in ty.expr_dims.clone() {
                self.visit_expr(&dim)?;
                self.emit(Instruction::SetArraySize);
            }
        }
        self.emit(Instruction::PushTypeDef {
            tag: ty.tag,
            type_ns: ty.type_ns.clone(),
            type_name: ty.type_name.clone(),
        });
        Ok(())
    }

    /// Emit a slot definition: the default-value snippet (jumped over,
    /// ended by `Trap`, registered with `SetDefaultValue`) and the type.
    pub(crate) fn emit_variable_definition(&mut self, var: &VarDef) -> Result<()> {
        if let DefaultValue::Expr(default) = &var.default {
            let over = self.emit(Instruction::Jump { target: 0 });
            let snippet = self.pc();
            self.visit_expr(default)?;
            self.emit(Instruction::Trap);
            let after = self.pc();
            self.patch_jump(over, after);
            self.emit(Instruction::SetDefaultValue { pc: snippet });
        }
        self.emit_type_definition(&var.ty())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    pub(crate) fn visit_stmt(&mut self, stmt: &Rc<Stmt>) -> Result<()> {
        self.set_debug(stmt.kind(), "", stmt.pos());
        match &**stmt {
            Stmt::Using { library, pos } => self.visit_using(library, *pos),
            Stmt::IncludeNamespace { namespace, .. } => {
                let module = self.current_module();
                self.emit(Instruction::IncludeNamespace {
                    module,
                    ns: namespace.clone(),
                });
                Ok(())
            }
            Stmt::ExcludeNamespace { namespace, .. } => {
                let module = self.current_module();
                self.emit(Instruction::ExcludeNamespace {
                    module,
                    ns: namespace.clone(),
                });
                Ok(())
            }
            Stmt::Declaration(decl) => self.visit_declaration(decl),
            Stmt::UnpackedDeclaration(node) => {
                self.visit_expr(&node.expr)?;
                for decl in &node.decls {
                    self.emit(Instruction::PushValueFromStruct {
                        name: decl.name.clone(),
                    });
                    self.emit_type_definition(&decl.ty.borrow())?;
                    let ns = self.current_ns();
                    self.emit(Instruction::StoreVar {
                        ns,
                        name: decl.name.clone(),
                    });
                }
                self.emit(Instruction::PopConstant);
                Ok(())
            }
            Stmt::Return { expr, .. } => {
                match expr {
                    Some(expr) => self.visit_expr(expr)?,
                    None => {
                        self.emit(Instruction::PushUndefined);
                    }
                }
                self.emit(Instruction::Return);
                Ok(())
            }
            Stmt::Block(block) => {
                self.push_scope_ins();
                for stmt in &block.statements {
                    self.visit_stmt(stmt)?;
                    self.discard_unused(stmt);
                }
                self.pop_scope_ins();
                Ok(())
            }
            Stmt::Continue { .. } => {
                self.emit(Instruction::Unwind);
                let jump = self.emit(Instruction::Jump { target: 0 });
                self.start_targets
                    .last_mut()
                    .ok_or(CompileError::OutsideLoop("continue"))?
                    .push(jump);
                Ok(())
            }
            Stmt::Break { .. } => {
                self.emit(Instruction::Unwind);
                let jump = self.emit(Instruction::Jump { target: 0 });
                self.end_targets
                    .last_mut()
                    .ok_or(CompileError::OutsideLoop("break"))?
                    .push(jump);
                Ok(())
            }
            Stmt::Exit { code, .. } => {
                self.visit_expr(code)?;
                self.emit(Instruction::Halt);
                Ok(())
            }
            Stmt::Switch(node) => self.visit_switch(node),
            Stmt::If(node) => self.visit_if(node),
            Stmt::Enum { names, .. } => {
                for (i, name) in names.iter().enumerate() {
                    self.emit(Instruction::PushInt(i as i64));
                    self.emit_type_definition(&TypeDef::new(quill_syntax::types::Tag::Int))?;
                    let ns = self.current_ns();
                    self.emit(Instruction::StoreVar {
                        ns,
                        name: name.clone(),
                    });
                }
                Ok(())
            }
            Stmt::TryCatch(node) => self.visit_try_catch(node),
            Stmt::Throw { error, .. } => {
                self.visit_expr(error)?;
                self.emit(Instruction::Throw);
                Ok(())
            }
            Stmt::Ellipsis { .. } => Ok(()),
            Stmt::For(node) => self.visit_for(node),
            Stmt::ForEach(node) => self.visit_foreach(node),
            Stmt::While(node) => self.visit_while(node),
            Stmt::DoWhile(node) => self.visit_do_while(node),
            Stmt::FunctionDefinition(node) => self.visit_function_definition(node),
            Stmt::StructDefinition(node) => {
                self.emit(Instruction::StructStart {
                    name: node.name.clone(),
                });
                for field in &node.fields {
                    self.emit_variable_definition(field)?;
                    self.emit(Instruction::StructSetVar {
                        name: field.name.clone(),
                    });
                }
                let ns = self.current_ns();
                self.emit(Instruction::StructEnd { ns });
                Ok(())
            }
            Stmt::ClassDefinition(node) => {
                self.this_names
                    .push(("class".to_string(), node.name.clone()));
                let ns = self.current_ns();
                let module = self.current_module();
                self.emit(Instruction::ClassStart {
                    ns: ns.clone(),
                    module: module.clone(),
                    name: node.name.clone(),
                });
                for decl in &node.declarations {
                    let var = VarDef::with_default(
                        decl.name.clone(),
                        decl.ty.borrow().clone(),
                        match decl.expr.borrow().clone() {
                            Some(e) => DefaultValue::Expr(e),
                            None => DefaultValue::None,
                        },
                    );
                    self.emit_variable_definition(&var)?;
                    self.emit(Instruction::ClassSetVar {
                        name: decl.name.clone(),
                    });
                }
                for fun in &node.functions {
                    self.visit_function_definition(fun)?;
                }
                self.emit(Instruction::ClassEnd { ns, module });
                self.this_names.pop();
                Ok(())
            }
            Stmt::Expr(expr) => self.visit_expr(expr),
        }
    }

    fn visit_using(&mut self, library: &[String], _pos: Pos) -> Result<()> {
        let name = library.last().cloned().unwrap_or_default();

        if constants::CORE_LIB_NAMES.contains(&name.as_str()) {
            self.emit(Instruction::BuiltinLib { name });
            let module = self.current_module();
            self.emit(Instruction::IncludeNamespace {
                module,
                ns: STD_NAMESPACE.to_string(),
            });
            return Ok(());
        }

        let module = self
            .modules
            .get(&name)
            .cloned()
            .ok_or(CompileError::UnknownModule(name))?;
        self.compile_module(module)
    }

    fn visit_declaration(&mut self, decl: &Rc<DeclNode>) -> Result<()> {
        self.set_debug("declaration", &decl.name, decl.pos);
        match decl.expr.borrow().clone() {
            Some(expr) => self.visit_expr(&expr)?,
            None => {
                self.emit(Instruction::PushUndefined);
            }
        }

        if !decl.static_dim.get() {
            self.emit(Instruction::SetCheckBuildArr);
        }

        self.emit_type_definition(&decl.ty.borrow())?;
        let ns = self.current_ns();
        self.emit(Instruction::StoreVar {
            ns,
            name: decl.name.clone(),
        });
        Ok(())
    }

    fn visit_if(&mut self, node: &quill_syntax::ast::IfNode) -> Result<()> {
        self.if_end_targets.push(Vec::new());

        self.visit_expr(&node.condition)?;
        let mut skip = self.emit(Instruction::JumpIfFalse { target: 0 });
        self.visit_stmt(&Rc::new(Stmt::Block(node.if_block.clone())))?;
        let jump = self.emit(Instruction::Jump { target: 0 });
        self.if_end_targets.last_mut().unwrap().push(jump);
        let after = self.pc();
        self.patch_jump(skip, after);

        for else_if in &node.else_ifs {
            self.visit_expr(&else_if.condition)?;
            skip = self.emit(Instruction::JumpIfFalse { target: 0 });
            self.visit_stmt(&Rc::new(Stmt::Block(else_if.block.clone())))?;
            let jump = self.emit(Instruction::Jump { target: 0 });
            self.if_end_targets.last_mut().unwrap().push(jump);
            let after = self.pc();
            self.patch_jump(skip, after);
        }

        if let Some(else_block) = &node.else_block {
            self.visit_stmt(&Rc::new(Stmt::Block(else_block.clone())))?;
        }

        let end = self.pc();
        for jump in self.if_end_targets.pop().unwrap() {
            self.patch_jump(jump, end);
        }
        Ok(())
    }

    fn visit_switch(&mut self, node: &quill_syntax::ast::SwitchNode) -> Result<()> {
        self.push_scope_ins();
        self.end_targets.push(Vec::new());
        self.emit(Instruction::PushDeep);

        self.visit_expr(&node.condition)?;

        // One compare-and-jump per case against the duplicated condition.
        let mut case_jumps: Vec<(usize, usize)> = Vec::new();
        for (case_expr, block_ix) in &node.cases {
            self.emit(Instruction::DupConstant);
            self.visit_expr(case_expr)?;
            self.emit(Instruction::Eql);
            let jump = self.emit(Instruction::JumpIfTrue { target: 0 });
            case_jumps.push((jump, *block_ix));
        }

        let default_jump = node
            .default_block
            .map(|ix| (self.emit(Instruction::Jump { target: 0 }), ix));
        let end_jump = self.emit(Instruction::Jump { target: 0 });
        self.end_targets.last_mut().unwrap().push(end_jump);

        for (i, stmt) in node.statements.iter().enumerate() {
            let here = self.pc();
            for (jump, target_ix) in &case_jumps {
                if *target_ix == i {
                    self.patch_jump(*jump, here);
                }
            }
            if let Some((jump, target_ix)) = default_jump {
                if target_ix == i {
                    self.patch_jump(jump, here);
                }
            }
            self.visit_stmt(stmt)?;
            self.discard_unused(stmt);
        }

        let end = self.pc();
        for jump in self.end_targets.pop().unwrap() {
            self.patch_jump(jump, end);
        }
        self.emit(Instruction::PopDeep);
        self.pop_scope_ins();
        Ok(())
    }

    fn visit_try_catch(&mut self, node: &quill_syntax::ast::TryCatchNode) -> Result<()> {
        let try_ip = self.emit(Instruction::Try { handler: 0 });
        self.emit(Instruction::PushDeep);

        self.visit_stmt(&Rc::new(Stmt::Block(node.try_block.clone())))?;

        self.emit(Instruction::PopDeep);
        self.emit(Instruction::TryEnd);
        let end_jump = self.emit(Instruction::Jump { target: 0 });

        // Handler entry: unwind whatever the try body left open, then bind
        // the error and run the catch block.
        let handler = self.pc();
        self.patch_jump(try_ip, handler);
        self.emit(Instruction::PopDeep);
        self.push_scope_ins();

        if let Some(decl) = &node.decl {
            let ns = self.current_ns();
            let module = self.current_module();
            if decl.ty.borrow().is_string() {
                self.emit(Instruction::PushErrorDesc);
                self.emit_type_definition(&decl.ty.borrow())?;
                self.emit(Instruction::StoreVar {
                    ns,
                    name: decl.name.clone(),
                });
            } else {
                self.emit(Instruction::InitStruct {
                    ns: ns.clone(),
                    module: module.clone(),
                    type_ns: DEFAULT_NAMESPACE.to_string(),
                    name: constants::EXCEPTION_STRUCT.to_string(),
                });
                self.emit(Instruction::PushErrorCode);
                self.emit(Instruction::SetField {
                    ns: ns.clone(),
                    module: module.clone(),
                    name: constants::EXCEPTION_CODE.to_string(),
                });
                self.emit(Instruction::PushErrorDesc);
                self.emit(Instruction::SetField {
                    ns: ns.clone(),
                    module,
                    name: constants::EXCEPTION_ERROR.to_string(),
                });
                self.emit(Instruction::PushStruct);
                self.emit_type_definition(&decl.ty.borrow())?;
                self.emit(Instruction::StoreVar {
                    ns,
                    name: decl.name.clone(),
                });
            }
        }
        self.emit(Instruction::PopError);

        self.visit_stmt(&Rc::new(Stmt::Block(node.catch_block.clone())))?;

        self.pop_scope_ins();
        let end = self.pc();
        self.patch_jump(end_jump, end);
        Ok(())
    }

    fn visit_while(&mut self, node: &quill_syntax::ast::WhileNode) -> Result<()> {
        self.push_scope_ins();
        self.start_targets.push(Vec::new());
        self.end_targets.push(Vec::new());
        self.emit(Instruction::PushDeep);

        let start = self.pc();
        self.visit_expr(&node.condition)?;
        let exit = self.emit(Instruction::JumpIfFalse { target: 0 });

        self.visit_stmt(&Rc::new(Stmt::Block(node.block.clone())))?;
        self.emit(Instruction::Jump { target: start });

        let end = self.pc();
        self.patch_jump(exit, end);
        self.close_loop_targets(start, end);

        self.emit(Instruction::PopDeep);
        self.pop_scope_ins();
        Ok(())
    }

    fn visit_do_while(&mut self, node: &quill_syntax::ast::WhileNode) -> Result<()> {
        self.push_scope_ins();
        self.start_targets.push(Vec::new());
        self.end_targets.push(Vec::new());
        self.emit(Instruction::PushDeep);

        let start = self.pc();
        self.visit_stmt(&Rc::new(Stmt::Block(node.block.clone())))?;

        let continue_target = self.pc();
        self.visit_expr(&node.condition)?;
        self.emit(Instruction::JumpIfTrue { target: start });

        let end = self.pc();
        self.close_loop_targets(continue_target, end);

        self.emit(Instruction::PopDeep);
        self.pop_scope_ins();
        Ok(())
    }

    fn visit_for(&mut self, node: &quill_syntax::ast::ForNode) -> Result<()> {
        self.push_scope_ins();
        self.start_targets.push(Vec::new());
        self.end_targets.push(Vec::new());

        if let Some(init) = &node.init {
            self.visit_stmt(init)?;
            self.discard_unused(init);
        }
        self.emit(Instruction::PushDeep);

        let start = self.pc();
        match &node.condition {
            Some(cond) => self.visit_expr(cond)?,
            None => {
                self.emit(Instruction::PushBool(true));
            }
        }
        let exit = self.emit(Instruction::JumpIfFalse { target: 0 });

        self.visit_stmt(&Rc::new(Stmt::Block(node.block.clone())))?;

        let step_target = self.pc();
        if let Some(step) = &node.step {
            self.visit_stmt(step)?;
            self.discard_unused(step);
        }
        self.emit(Instruction::Jump { target: start });

        let end = self.pc();
        self.patch_jump(exit, end);
        self.close_loop_targets(step_target, end);

        self.emit(Instruction::PopDeep);
        self.pop_scope_ins();
        Ok(())
    }

    fn visit_foreach(&mut self, node: &quill_syntax::ast::ForEachNode) -> Result<()> {
        self.push_scope_ins();
        self.start_targets.push(Vec::new());
        self.end_targets.push(Vec::new());
        self.emit(Instruction::PushDeep);

        self.visit_expr(&node.collection)?;
        self.emit(Instruction::GetIterator);

        let start = self.pc();
        self.emit(Instruction::HasNextElement);
        let exit = self.emit(Instruction::JumpIfFalse { target: 0 });

        match &*node.decl {
            Stmt::UnpackedDeclaration(unpack) => {
                // Struct iteration: the element is an Entry struct whose
                // fields feed the destructured bindings.
                self.emit(Instruction::NextElement);
                for decl in &unpack.decls {
                    self.emit(Instruction::PushValueFromStruct {
                        name: decl.name.clone(),
                    });
                    self.emit_type_definition(&decl.ty.borrow())?;
                    let ns = self.current_ns();
                    self.emit(Instruction::StoreVar {
                        ns,
                        name: decl.name.clone(),
                    });
                }
                self.emit(Instruction::PopConstant);
            }
            Stmt::Declaration(decl) => {
                // Declare the binding, then assign each element through it.
                self.emit(Instruction::NextElement);
                self.emit_type_definition(&decl.ty.borrow())?;
                let ns = self.current_ns();
                self.emit(Instruction::StoreVar {
                    ns,
                    name: decl.name.clone(),
                });
            }
            Stmt::Expr(expr) => {
                self.emit(Instruction::PushVarRef(true));
                self.visit_expr(expr)?;
                self.emit(Instruction::PopVarRef);
                self.emit(Instruction::NextElement);
                self.emit(Instruction::Assign);
                self.emit(Instruction::PopConstant);
            }
            other => {
                self.visit_stmt(&Rc::new(Stmt::Ellipsis { pos: other.pos() }))?;
            }
        }

        self.visit_stmt(&Rc::new(Stmt::Block(node.block.clone())))?;
        self.emit(Instruction::Jump { target: start });

        let end = self.pc();
        self.patch_jump(exit, end);
        self.close_loop_targets(start, end);

        self.emit(Instruction::PopDeep);
        self.pop_scope_ins();
        Ok(())
    }

    fn close_loop_targets(&mut self, continue_target: usize, end: usize) {
        for jump in self.start_targets.pop().unwrap_or_default() {
            self.patch_jump(jump, continue_target);
        }
        for jump in self.end_targets.pop().unwrap_or_default() {
            self.patch_jump(jump, end);
        }
    }

    pub(crate) fn visit_function_definition(
        &mut self,
        node: &Rc<quill_syntax::ast::FunDeclNode>,
    ) -> Result<()> {
        self.set_debug("function-definition", &node.name, node.pos);
        self.this_names
            .push(("function".to_string(), node.name.clone()));

        self.emit_type_definition(&node.ret.borrow())?;
        self.emit(Instruction::FunStart {
            name: node.name.clone(),
        });

        for param in &node.params {
            match param {
                Param::Single(var) => {
                    self.emit_variable_definition(var)?;
                    self.emit(Instruction::FunSetParam {
                        is_rest: var.is_rest,
                        name: var.name.clone(),
                    });
                }
                Param::Unpack(group) => {
                    self.emit_type_definition(&group.ty.borrow())?;
                    self.emit(Instruction::FunStartUnpackParam);
                    for var in &group.vars {
                        self.emit_variable_definition(var)?;
                        self.emit(Instruction::FunSetSubParam {
                            is_rest: var.is_rest,
                            name: var.name.clone(),
                        });
                    }
                    self.emit(Instruction::FunSetUnpackParam);
                }
            }
        }

        let ns = self.current_ns();
        let module = self.current_module();
        self.emit(Instruction::FunEnd {
            ns,
            module,
            has_block: node.block.is_some(),
        });

        if let Some(block) = &node.block {
            // Top-level execution skips the body; calls enter at the
            // instruction after this jump.
            let over = self.emit(Instruction::Jump { target: 0 });
            self.visit_stmt(&Rc::new(Stmt::Block(block.clone())))?;
            self.emit(Instruction::PushUndefined);
            self.emit(Instruction::Return);
            let after = self.pc();
            self.patch_jump(over, after);
        }

        self.this_names.pop();
        Ok(())
    }
}
