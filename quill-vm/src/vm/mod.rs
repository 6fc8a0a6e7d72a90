// quill-vm - Bytecode virtual machine
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Stack-based virtual machine.
//!
//! A single-threaded cooperative machine. `run` executes until `Halt` or
//! the instruction list is exhausted; nested sub-runs happen only for class
//! constructors, default-argument snippets and field-default snippets, and
//! return control through `Trap` or a sentinel return address.
//!
//! Unwinding is explicit: loops, `try` bodies and calls open deep frames
//! recording the scopes and stack entries to discard; `break`, `continue`,
//! `return` and exception dispatch pop them instead of relying on any host
//! unwinding.

mod calls;
mod defs;
mod iter;
mod stack;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use quill_core::gc::GarbageCollector;
use quill_core::manager::ScopeManager;
use quill_core::ops;
use quill_core::scope::Scope;
use quill_core::value::{GcRef, GcValue, GcVariable, Payload, Value};
use quill_core::{RuntimeError, RuntimeResult};
use quill_syntax::ops as tokens;
use quill_syntax::types::{ClassDef, FunDef, StructDef, TypeDef, UnpackGroup};

use crate::compiler::Program;
use crate::debug::DebugTable;
use crate::modules::NativeModule;
use crate::opcode::Instruction;

pub use stack::{SlotRef, StackSlot};

/// Return address marking a frame entered through a sub-run.
const SUB_RUN_RETURN: usize = usize::MAX;

/// A native function: reads its arguments from the scope the call pushed
/// and pushes exactly one return value.
pub type NativeFn = Rc<dyn Fn(&mut Vm) -> RuntimeResult<()>>;

/// An unrecoverable execution failure: the formatted message carries the
/// failing instruction's debug info plus one line per call-stack frame.
#[derive(Debug, Clone)]
pub struct VmError {
    pub message: String,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for VmError {}

/// A call frame: where to resume, which scope to drop, how many deep
/// frames the callee opened.
#[derive(Debug)]
struct CallFrame {
    /// The call instruction, for stack traces.
    call_pc: usize,
    /// Where `Return` resumes; `SUB_RUN_RETURN` ends a sub-run instead.
    return_pc: usize,
    /// `(namespace, module)` of the callee's parameter scope.
    return_ns: (String, String),
    /// Class instance scope to pop after the return (method calls and
    /// constructors).
    class_scope: Option<quill_core::value::ClassHandle>,
    /// Deep frames opened by the callee and not yet closed.
    deep_count: usize,
}

/// One structured-unwind frame.
#[derive(Debug, Default)]
struct DeepFrame {
    /// Scopes opened while this frame was innermost.
    scopes: Vec<(String, String)>,
    /// Evaluation-stack entries pushed while this frame was innermost.
    eval_count: usize,
    /// Open iterator frames at the time this frame opened.
    iter_depth: usize,
}

/// An armed exception handler and the depths to unwind back to.
#[derive(Debug)]
struct TryFrame {
    handler: usize,
    deep_depth: usize,
    frame_depth: usize,
    class_depth: usize,
    iter_depth: usize,
}

/// Progress over an array, string or struct.
#[derive(Debug)]
pub(crate) struct IteratorFrame {
    pub value: GcValue,
    pub index: usize,
}

/// The virtual machine.
pub struct Vm {
    /// Runtime scopes, indexed by namespace and module.
    pub scopes: ScopeManager<GcVariable>,
    /// The collector; all values and variables live here.
    pub gc: GarbageCollector,
    /// Native callables by name.
    pub builtin_functions: HashMap<String, NativeFn>,
    core_libs: HashMap<String, Rc<dyn NativeModule>>,
    registered_libs: HashSet<String>,

    instructions: Vec<Instruction>,
    debug: DebugTable,
    next_pc: usize,
    stack: Vec<StackSlot>,

    // Builder stacks.
    value_build: Vec<Value>,
    struct_build: Vec<StructDef>,
    class_build: Vec<ClassDef>,
    fun_build: Vec<FunDef>,
    unpack_build: Vec<UnpackGroup>,
    type_defs: Vec<TypeDef>,
    pending_dims: Vec<usize>,
    pending_default_pc: usize,
    check_build_array: bool,

    use_var_ref: Vec<bool>,
    self_invoke: bool,
    pub(crate) class_stack: Vec<quill_core::value::ClassHandle>,
    pub(crate) iterators: Vec<IteratorFrame>,

    deep_frames: Vec<DeepFrame>,
    frames: Vec<CallFrame>,
    try_frames: Vec<TryFrame>,
    catch_errors: Vec<(i64, String)>,

    halted: bool,
    sub_run_return: bool,
    fatal: Option<String>,
}

impl Vm {
    /// Create a VM over a compiled program.
    pub fn new(program: Program) -> Self {
        Vm {
            scopes: ScopeManager::new(),
            gc: GarbageCollector::new(),
            builtin_functions: HashMap::new(),
            core_libs: HashMap::new(),
            registered_libs: HashSet::new(),
            instructions: program.instructions,
            debug: program.debug,
            next_pc: 0,
            stack: Vec::with_capacity(64),
            value_build: Vec::new(),
            struct_build: Vec::new(),
            class_build: Vec::new(),
            fun_build: Vec::new(),
            unpack_build: Vec::new(),
            type_defs: Vec::new(),
            pending_dims: Vec::new(),
            pending_default_pc: 0,
            check_build_array: false,
            use_var_ref: Vec::new(),
            self_invoke: false,
            class_stack: Vec::new(),
            iterators: Vec::new(),
            deep_frames: Vec::new(),
            frames: Vec::new(),
            try_frames: Vec::new(),
            catch_errors: Vec::new(),
            halted: false,
            sub_run_return: false,
            fatal: None,
        }
    }

    /// Make a core library available to the `BuiltinLib` instruction.
    pub fn add_core_lib(&mut self, name: impl Into<String>, lib: Rc<dyn NativeModule>) {
        self.core_libs.insert(name.into(), lib);
    }

    /// Execute until `Halt` or the end of the instruction list.
    ///
    /// The result is the integer on top of the evaluation stack, or -1 when
    /// the stack is empty. Unhandled runtime errors surface as [`VmError`]
    /// with the full trace.
    pub fn run(&mut self) -> Result<i64, VmError> {
        let outcome = self.execute(false);

        if let Some(message) = self.fatal.take() {
            return Err(VmError { message });
        }
        if let Err(err) = outcome {
            // Errors without a recorded trace come from the machinery
            // itself, not user code.
            return Err(VmError {
                message: format!("RuntimeError: {}", err),
            });
        }

        let code = self
            .stack
            .last()
            .and_then(|slot| slot.value.borrow().as_int())
            .unwrap_or(-1);

        let roots = self.roots();
        self.gc.collect(&roots);
        Ok(code)
    }

    /// The dispatch loop. With `sub` set, a `Trap` or sentinel return ends
    /// the loop instead of the program.
    fn execute(&mut self, sub: bool) -> RuntimeResult<()> {
        loop {
            if self.halted || self.next_pc >= self.instructions.len() {
                return Ok(());
            }
            let pc = self.next_pc;
            self.next_pc += 1;

            if let Err(err) = self.step(pc) {
                if !self.divert_to_handler(&err) {
                    if self.fatal.is_none() {
                        self.fatal = Some(self.build_trace(pc, &err));
                    }
                    self.halted = true;
                    return Err(err);
                }
                continue;
            }

            if self.sub_run_return {
                self.sub_run_return = false;
                if sub {
                    return Ok(());
                }
            }
        }
    }

    /// Run a nested snippet or constructor body to completion.
    pub(crate) fn sub_execute(&mut self) -> RuntimeResult<()> {
        self.execute(true)
    }

    /// Offer an error to the innermost handler. Unwinds deep frames, call
    /// frames and iterator frames back to the handler's depths.
    fn divert_to_handler(&mut self, err: &RuntimeError) -> bool {
        if self.fatal.is_some() || !err.is_catchable() {
            return false;
        }
        let Some(frame) = self.try_frames.pop() else {
            return false;
        };

        // The `try` keeps its own deep frame open for the handler's
        // `PopDeep`; everything above it goes.
        let keep = frame.deep_depth + 1;
        while self.deep_frames.len() > keep {
            if self.pop_deep().is_err() {
                return false;
            }
        }
        self.frames.truncate(frame.frame_depth);
        self.class_stack.truncate(frame.class_depth);
        self.iterators.truncate(frame.iter_depth);

        let (code, message) = err.catch_payload();
        self.catch_errors.push((code, message));
        self.next_pc = frame.handler;
        true
    }

    fn build_trace(&self, pc: usize, err: &RuntimeError) -> String {
        let mut message = self
            .debug
            .info_at(pc)
            .build_error_message("RuntimeError", &err.to_string());
        for frame in self.frames.iter().rev() {
            message.push_str(&self.debug.info_at(frame.call_pc).build_error_tail());
        }
        message
    }

    // ------------------------------------------------------------------
    // Stack and scope plumbing
    // ------------------------------------------------------------------

    pub(crate) fn push_slot(&mut self, slot: StackSlot) {
        if let Some(frame) = self.deep_frames.last_mut() {
            frame.eval_count += 1;
        }
        self.stack.push(slot);
    }

    pub(crate) fn push_value(&mut self, value: GcValue) {
        self.push_slot(StackSlot::plain(value));
    }

    pub(crate) fn alloc_push(&mut self, value: Value) {
        let cell = self.gc.alloc(value);
        self.push_value(cell);
    }

    pub(crate) fn pop_slot(&mut self) -> RuntimeResult<StackSlot> {
        let slot = self
            .stack
            .pop()
            .ok_or_else(|| RuntimeError::internal("evaluation stack underflow"))?;
        if let Some(frame) = self.deep_frames.last_mut() {
            frame.eval_count = frame.eval_count.saturating_sub(1);
        }
        Ok(slot)
    }

    pub(crate) fn peek_slot(&self) -> RuntimeResult<&StackSlot> {
        self.stack
            .last()
            .ok_or_else(|| RuntimeError::internal("evaluation stack underflow"))
    }

    pub(crate) fn use_variable_ref(&self) -> bool {
        self.use_var_ref.last().copied().unwrap_or(false)
    }

    pub(crate) fn take_self_invoke(&mut self) -> bool {
        std::mem::replace(&mut self.self_invoke, false)
    }

    pub(crate) fn push_vm_scope(&mut self, scope: Scope<GcVariable>) {
        let key = (scope.namespace.clone(), scope.module.clone());
        if let Some(frame) = self.deep_frames.last_mut() {
            frame.scopes.push(key);
        }
        self.scopes.push_scope(scope);
    }

    pub(crate) fn push_vm_scope_handle(&mut self, scope: quill_core::ScopeRef<GcVariable>) {
        let key = {
            let s = scope.borrow();
            (s.namespace.clone(), s.module.clone())
        };
        if let Some(frame) = self.deep_frames.last_mut() {
            frame.scopes.push(key);
        }
        self.scopes.push_scope_handle(scope);
    }

    pub(crate) fn pop_vm_scope(&mut self, ns: &str, module: &str) -> RuntimeResult<()> {
        if let Some(frame) = self.deep_frames.last_mut() {
            frame.scopes.pop();
        }
        self.scopes.pop_scope(ns, module);
        let roots = self.roots();
        self.gc.maybe_collect(&roots)
    }

    pub(crate) fn push_deep(&mut self) {
        let iter_depth = self.iterators.len();
        self.deep_frames.push(DeepFrame {
            scopes: Vec::new(),
            eval_count: 0,
            iter_depth,
        });
        if let Some(frame) = self.frames.last_mut() {
            frame.deep_count += 1;
        }
    }

    pub(crate) fn pop_deep(&mut self) -> RuntimeResult<()> {
        if let Some(frame) = self.frames.last_mut() {
            frame.deep_count = frame.deep_count.saturating_sub(1);
        }
        self.unwind()?;
        if let Some(frame) = self.deep_frames.pop() {
            self.iterators.truncate(frame.iter_depth);
        }
        Ok(())
    }

    /// Discard the scopes and stack entries of the innermost deep frame.
    pub(crate) fn unwind(&mut self) -> RuntimeResult<()> {
        let (scopes, eval_count) = match self.deep_frames.last_mut() {
            Some(frame) => (
                std::mem::take(&mut frame.scopes),
                std::mem::replace(&mut frame.eval_count, 0),
            ),
            None => return Ok(()),
        };

        for _ in 0..eval_count {
            self.stack.pop();
        }
        for (ns, module) in scopes.iter().rev() {
            self.scopes.pop_scope(ns, module);
        }

        let roots = self.roots();
        self.gc.maybe_collect(&roots)
    }

    /// All GC roots currently reachable from VM state.
    pub(crate) fn roots(&self) -> Vec<GcRef> {
        let mut roots = Vec::new();
        for slot in &self.stack {
            roots.push(GcRef::Value(slot.value.clone()));
            if let Some(SlotRef::CharAt { target, .. }) = &slot.reference {
                roots.push(GcRef::Value(target.clone()));
            }
        }
        for scope in self.scopes.live_scopes() {
            for (_, var) in scope.borrow().variables() {
                roots.push(GcRef::Variable(var.clone()));
            }
        }
        for frame in &self.iterators {
            roots.push(GcRef::Value(frame.value.clone()));
        }
        for value in &self.value_build {
            match &value.payload {
                Payload::Array(arr) => {
                    roots.extend(arr.borrow().iter().cloned().map(GcRef::Value));
                }
                Payload::Struct(fields) => {
                    roots.extend(fields.borrow().values().cloned().map(GcRef::Variable));
                }
                _ => {}
            }
        }
        roots
    }

    pub(crate) fn take_type_def(&mut self) -> RuntimeResult<TypeDef> {
        self.type_defs
            .pop()
            .ok_or_else(|| RuntimeError::internal("no pending type definition"))
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    fn step(&mut self, pc: usize) -> RuntimeResult<()> {
        let instruction = self.instructions[pc].clone();
        trace!(pc, ?instruction, "dispatch");

        if let Some(op) = instruction.binary_op() {
            return self.binary_operation(op);
        }
        if let Some(op) = instruction.assignment_op() {
            return self.assignment_operation(op);
        }
        if let Some(op) = instruction.unary_op() {
            return self.unary_operation(op);
        }

        match instruction {
            // Scopes
            Instruction::PushScope { ns, module } => {
                self.push_vm_scope(Scope::new(ns, module));
                Ok(())
            }
            Instruction::PopScope { ns, module } => self.pop_vm_scope(&ns, &module),
            Instruction::PushDeep => {
                self.push_deep();
                Ok(())
            }
            Instruction::PopDeep => self.pop_deep(),
            Instruction::Unwind => self.unwind(),

            // Namespaces
            Instruction::IncludeNamespace { module, ns } => {
                self.scopes.include_namespace(&module, &ns);
                Ok(())
            }
            Instruction::ExcludeNamespace { module, ns } => {
                self.scopes.exclude_namespace(&module, &ns);
                Ok(())
            }
            Instruction::BuiltinLib { name } => self.handle_builtin_lib(&name),

            // Constants
            Instruction::PushUndefined => {
                self.alloc_push(Value::undefined());
                Ok(())
            }
            Instruction::PushVoid => {
                self.alloc_push(Value::void());
                Ok(())
            }
            Instruction::PushBool(b) => {
                self.alloc_push(Value::bool(b));
                Ok(())
            }
            Instruction::PushInt(i) => {
                self.alloc_push(Value::int(i));
                Ok(())
            }
            Instruction::PushFloat(f) => {
                self.alloc_push(Value::float(f));
                Ok(())
            }
            Instruction::PushChar(c) => {
                self.alloc_push(Value::char(c));
                Ok(())
            }
            Instruction::PushString(s) => {
                self.alloc_push(Value::string(s));
                Ok(())
            }
            Instruction::PushFunction { ns, name } => {
                self.alloc_push(Value::function(ns, name));
                Ok(())
            }
            Instruction::PushType => {
                let ty = self.take_type_def()?;
                self.alloc_push(Value {
                    ty,
                    payload: Payload::Undefined,
                });
                Ok(())
            }
            Instruction::DupConstant => {
                let top = self.peek_slot()?.clone();
                self.push_slot(top);
                Ok(())
            }
            Instruction::PopConstant => self.pop_slot().map(|_| ()),

            // Arrays
            Instruction::InitArray { size } => self.handle_init_array(size),
            Instruction::SetElement { index } => self.handle_set_element(index),
            Instruction::PushArray => self.handle_push_array(),
            Instruction::SetArraySize => {
                let slot = self.pop_slot()?;
                let n = slot
                    .value
                    .borrow()
                    .as_int()
                    .ok_or_else(|| RuntimeError::internal("array dimension must be an int"))?;
                if n < 0 {
                    return Err(RuntimeError::internal("array dimension cannot be negative"));
                }
                self.pending_dims.push(n as usize);
                Ok(())
            }
            Instruction::SetCheckBuildArr => {
                self.check_build_array = true;
                Ok(())
            }

            // Structs
            Instruction::InitStruct {
                ns,
                module,
                type_ns,
                name,
            } => self.handle_init_struct(&ns, &module, &type_ns, &name),
            Instruction::SetField { name, .. } => self.handle_set_field(&name),
            Instruction::PushStruct => self.handle_push_struct(),
            Instruction::PushValueFromStruct { name } => self.handle_push_value_from_struct(&name),

            // Definitions
            Instruction::StructStart { name } => {
                self.struct_build.push(StructDef::new(name));
                Ok(())
            }
            Instruction::StructSetVar { name } => self.handle_struct_set_var(&name),
            Instruction::StructEnd { ns } => self.handle_struct_end(&ns),
            Instruction::ClassStart { name, .. } => {
                self.class_build.push(ClassDef::new(name));
                Ok(())
            }
            Instruction::ClassSetVar { name } => self.handle_class_set_var(&name),
            Instruction::ClassEnd { ns, .. } => self.handle_class_end(&ns),
            Instruction::SelfInvoke => {
                self.self_invoke = true;
                Ok(())
            }

            // Typing
            Instruction::PushTypeDef {
                tag,
                type_ns,
                type_name,
            } => {
                let dims = std::mem::take(&mut self.pending_dims);
                self.type_defs.push(TypeDef {
                    tag,
                    type_ns,
                    type_name,
                    dims,
                    expr_dims: Vec::new(),
                });
                Ok(())
            }

            // Variables
            Instruction::LoadVar {
                ns,
                module,
                access_ns,
                name,
            } => self.handle_load_var(&ns, &module, &access_ns, &name),
            Instruction::StoreVar { ns, name } => self.handle_store_var(&ns, &name),
            Instruction::LoadSubId { name } => self.handle_load_sub_id(&name),
            Instruction::LoadSubIx => self.handle_load_sub_ix(),
            Instruction::PushVarRef(flag) => {
                self.use_var_ref.push(flag);
                Ok(())
            }
            Instruction::PopVarRef => {
                self.use_var_ref.pop();
                Ok(())
            }

            // Functions
            Instruction::FunStart { name } => {
                let ret = self.take_type_def()?;
                self.fun_build.push(FunDef::new(name, ret, Vec::new()));
                Ok(())
            }
            Instruction::SetDefaultValue { pc } => {
                self.pending_default_pc = pc;
                Ok(())
            }
            Instruction::FunSetParam { is_rest, name } => self.handle_fun_set_param(is_rest, &name),
            Instruction::FunStartUnpackParam => {
                let ty = self.take_type_def()?;
                self.unpack_build.push(UnpackGroup::new(ty, Vec::new()));
                Ok(())
            }
            Instruction::FunSetSubParam { is_rest, name } => {
                self.handle_fun_set_sub_param(is_rest, &name)
            }
            Instruction::FunSetUnpackParam => self.handle_fun_set_unpack_param(),
            Instruction::FunEnd {
                ns,
                module,
                has_block,
            } => self.handle_fun_end(pc, &ns, &module, has_block),
            Instruction::Call {
                ns,
                module,
                access_ns,
                name,
                argc,
            } => self.handle_call(pc, &ns, &module, &access_ns, &name, argc),
            Instruction::Return => self.handle_return(),

            // Exceptions
            Instruction::Try { handler } => {
                self.try_frames.push(TryFrame {
                    handler,
                    deep_depth: self.deep_frames.len(),
                    frame_depth: self.frames.len(),
                    class_depth: self.class_stack.len(),
                    iter_depth: self.iterators.len(),
                });
                Ok(())
            }
            Instruction::TryEnd => {
                self.try_frames.pop();
                Ok(())
            }
            Instruction::Throw => self.handle_throw(),
            Instruction::PushErrorDesc => {
                let (_, message) = self
                    .catch_errors
                    .last()
                    .cloned()
                    .ok_or_else(|| RuntimeError::internal("no pending error"))?;
                self.alloc_push(Value::string(message));
                Ok(())
            }
            Instruction::PushErrorCode => {
                let (code, _) = self
                    .catch_errors
                    .last()
                    .cloned()
                    .ok_or_else(|| RuntimeError::internal("no pending error"))?;
                self.alloc_push(Value::int(code));
                Ok(())
            }
            Instruction::PopError => {
                self.catch_errors.pop();
                Ok(())
            }

            // Iteration
            Instruction::GetIterator => self.handle_get_iterator(),
            Instruction::HasNextElement => self.handle_has_next_element(),
            Instruction::NextElement => self.handle_next_element(),

            // Branching
            Instruction::Jump { target } => {
                self.next_pc = target;
                Ok(())
            }
            Instruction::JumpIfFalse { target } => {
                if !self.pop_condition()? {
                    self.next_pc = target;
                }
                Ok(())
            }
            Instruction::JumpIfTrue { target } => {
                if self.pop_condition()? {
                    self.next_pc = target;
                }
                Ok(())
            }

            // Type operators
            Instruction::IsStruct => {
                let slot = self.pop_slot()?;
                let is = matches!(slot.value.borrow().payload, Payload::Struct(_));
                self.alloc_push(Value::bool(is));
                Ok(())
            }
            Instruction::IsArray => {
                let slot = self.pop_slot()?;
                let is = slot.value.borrow().is_array();
                self.alloc_push(Value::bool(is));
                Ok(())
            }
            Instruction::IsAny => {
                let slot = self.pop_slot()?;
                let is = {
                    let v = slot.value.borrow();
                    v.ty.is_any() && !v.ty.is_array()
                };
                self.alloc_push(Value::bool(is));
                Ok(())
            }
            Instruction::RefId => {
                let slot = self.pop_slot()?;
                let id = slot.value.id() as i64;
                self.alloc_push(Value::int(id));
                Ok(())
            }
            Instruction::TypeId => {
                let slot = self.pop_slot()?;
                let id = ops::type_id(&slot.value.borrow().ty);
                self.alloc_push(Value::int(id));
                Ok(())
            }
            Instruction::TypeOf => {
                let slot = self.pop_slot()?;
                let name = slot.value.borrow().ty.to_string();
                self.alloc_push(Value::string(name));
                Ok(())
            }
            Instruction::TypeParse { tag } => {
                let slot = self.pop_slot()?;
                let parsed = ops::type_parse(tag, &slot.value.borrow())?;
                self.alloc_push(parsed);
                Ok(())
            }

            // Misc
            Instruction::Skip => Ok(()),
            Instruction::Halt => {
                self.halted = true;
                Ok(())
            }
            Instruction::Trap => {
                self.sub_run_return = true;
                Ok(())
            }
            Instruction::Error { message } => Err(RuntimeError::internal(message)),

            // Operator variants are handled above.
            other => Err(RuntimeError::internal(format!(
                "unhandled instruction {:?}",
                other
            ))),
        }
    }

    fn pop_condition(&mut self) -> RuntimeResult<bool> {
        let slot = self.pop_slot()?;
        let value = slot.value.borrow();
        value.as_bool().ok_or_else(|| {
            RuntimeError::invalid_unary("condition", value.type_name())
        })
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    fn binary_operation(&mut self, op: &str) -> RuntimeResult<()> {
        let rhs = self.pop_slot()?;
        let lhs = self.pop_slot()?;
        let result = {
            let l = lhs.value.borrow();
            let r = rhs.value.borrow();
            ops::binary_operation(op, &l, &r)?
        };
        self.alloc_push(result);
        Ok(())
    }

    fn unary_operation(&mut self, op: &str) -> RuntimeResult<()> {
        let slot = self.pop_slot()?;
        let result = {
            let v = slot.value.borrow();
            ops::unary_operation(op, &v)?
        };
        self.alloc_push(result);
        Ok(())
    }

    /// Assignment: rewrite the recorded owner in place and produce the
    /// assigned value as the expression result.
    fn assignment_operation(&mut self, op: &str) -> RuntimeResult<()> {
        let rhs = self.pop_slot()?;
        let lhs = self.pop_slot()?;
        let target = lhs.reference.clone().ok_or(RuntimeError::NotAssignable)?;

        let mut assigned: GcValue = if op == "=" {
            rhs.value.clone()
        } else {
            let result = {
                let l = lhs.value.borrow();
                let r = rhs.value.borrow();
                ops::binary_operation(tokens::assignment_core(op), &l, &r)?
            };
            self.gc.alloc(result)
        };

        match target {
            SlotRef::Variable(var) => {
                let ty = var.ty();
                {
                    let v = assigned.borrow();
                    if !v.is_undefined() && !ty.is_any_or_match(&v.ty, false) {
                        return Err(RuntimeError::invalid_operands(
                            op,
                            ty.to_string(),
                            v.type_name(),
                        ));
                    }
                }
                assigned = self.owned_value(&ty, assigned);
                var.set_value(assigned.clone());
            }
            SlotRef::Element { array, index } => {
                let element_ty = lhs.value.borrow().ty.clone();
                {
                    let v = assigned.borrow();
                    if !element_ty.is_any_or_match(&v.ty, false) {
                        return Err(RuntimeError::invalid_operands(
                            op,
                            element_ty.to_string(),
                            v.type_name(),
                        ));
                    }
                }
                assigned = self.owned_value(&element_ty, assigned);
                let len = array.borrow().len();
                if index >= len {
                    return Err(RuntimeError::ArrayIndexOutOfRange {
                        index: index as i64,
                        len,
                    });
                }
                array.borrow_mut()[index] = assigned.clone();
            }
            SlotRef::CharAt { target, index } => {
                let ch = assigned
                    .borrow()
                    .as_char()
                    .ok_or_else(|| {
                        RuntimeError::invalid_operands(
                            op,
                            "char",
                            assigned.borrow().type_name(),
                        )
                    })?;
                let mut value = target.borrow_mut();
                let Payload::String(s) = &mut value.payload else {
                    return Err(RuntimeError::internal("character owner is not a string"));
                };
                let len = s.chars().count();
                if index >= len {
                    return Err(RuntimeError::StringIndexOutOfRange {
                        index: index as i64,
                        len,
                    });
                }
                *s = s
                    .chars()
                    .enumerate()
                    .map(|(i, c)| if i == index { ch } else { c })
                    .collect();
            }
        }

        self.push_value(assigned);
        Ok(())
    }

    /// Coerce the assigned value to the owner's type and copy scalars so
    /// the owner never aliases another scalar cell.
    pub(crate) fn owned_value(&mut self, owner: &TypeDef, value: GcValue) -> GcValue {
        if let Some(coerced) = ops::coerced(owner, &value.borrow()) {
            return self.gc.alloc(coerced);
        }
        let copy = {
            let v = value.borrow();
            if v.is_scalar() {
                Some(v.clone())
            } else {
                None
            }
        };
        match copy {
            Some(v) => self.gc.alloc(v),
            None => value,
        }
    }

    // ------------------------------------------------------------------
    // Exceptions
    // ------------------------------------------------------------------

    fn handle_throw(&mut self) -> RuntimeResult<()> {
        let slot = self.pop_slot()?;
        let value = slot.value.borrow();

        if let Payload::Struct(fields) = &value.payload {
            if value.ty.type_ns == quill_core::constants::DEFAULT_NAMESPACE
                && value.ty.type_name == quill_core::constants::EXCEPTION_STRUCT
            {
                let fields = fields.borrow();
                let message = fields
                    .get(quill_core::constants::EXCEPTION_ERROR)
                    .and_then(|v| v.value())
                    .and_then(|v| v.borrow().as_str().map(str::to_string))
                    .unwrap_or_default();
                let code = fields
                    .get(quill_core::constants::EXCEPTION_CODE)
                    .and_then(|v| v.value())
                    .and_then(|v| v.borrow().as_int())
                    .unwrap_or(0);
                return Err(RuntimeError::thrown(message, code));
            }
        }
        if let Some(message) = value.as_str() {
            return Err(RuntimeError::thrown(message.to_string(), 0));
        }
        Err(RuntimeError::internal(format!(
            "expected {} or string in throw",
            quill_core::constants::exception_type()
        )))
    }

    fn handle_builtin_lib(&mut self, name: &str) -> RuntimeResult<()> {
        if !self.registered_libs.insert(name.to_string()) {
            return Ok(());
        }
        let lib = self
            .core_libs
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::internal(format!("core library '{}' is not available", name)))?;
        lib.register_runtime(self);
        Ok(())
    }

    /// Force a collection over the current roots.
    pub fn collect_garbage(&mut self) {
        let roots = self.roots();
        self.gc.collect(&roots);
    }

    /// Collect when the heap is past the high-water mark.
    pub fn maybe_collect_garbage(&mut self) -> RuntimeResult<()> {
        let roots = self.roots();
        self.gc.maybe_collect(&roots)
    }

    /// Look up a native argument variable in the callee scope.
    pub fn native_arg(&self, ns: &str, name: &str) -> RuntimeResult<GcValue> {
        let scope = self
            .scopes
            .back_scope(ns)
            .ok_or_else(|| RuntimeError::internal(format!("no live scope in namespace '{}'", ns)))?;
        let var = scope
            .borrow()
            .find_variable(name)
            .ok_or_else(|| RuntimeError::UndeclaredIdentifier(name.to_string()))?;
        var.value()
            .ok_or_else(|| RuntimeError::NullTarget(format!("argument '{}'", name)))
    }

    /// Whether a native argument was bound at all (optional rest args).
    pub fn has_native_arg(&self, ns: &str, name: &str) -> bool {
        self.scopes
            .back_scope(ns)
            .map(|scope| scope.borrow().has_variable(name))
            .unwrap_or(false)
    }
}
