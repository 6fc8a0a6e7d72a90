// quill-embed - Engine implementation
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The Engine struct - main entry point for embedding Quill.

use std::fmt;
use std::rc::Rc;

use quill_syntax::ast::ModuleNode;
use quill_vm::modules::{ModuleBuiltin, ModuleGc, NativeModule};
use quill_vm::{Analyser, Compiler, Vm};

/// Any failure of the pipeline, with the stage that produced it.
#[derive(Debug, Clone)]
pub enum EngineError {
    Semantic(String),
    Compile(String),
    Runtime(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Semantic(msg) | EngineError::Compile(msg) | EngineError::Runtime(msg) => {
                write!(f, "{}", msg)
            }
        }
    }
}

impl std::error::Error for EngineError {}

/// Result type for engine runs.
pub type Result<T> = std::result::Result<T, EngineError>;

/// The Quill execution engine.
///
/// `Engine` wires the full pipeline: parsed modules go through semantic
/// analysis, the checked tree is lowered to bytecode, and the VM executes
/// it. The built-in module is always registered; other core libraries
/// attach when a module pulls them in with `using`.
///
/// # Thread Safety
///
/// **`Engine` is NOT thread-safe.** The runtime uses `Rc` and `RefCell`
/// internally. Create one engine per thread if you need parallel runs.
///
/// # Example
///
/// Modules come from an external parser; tests build them directly.
///
/// ```text
/// let engine = Engine::new(modules, "main");
/// let exit_code = engine.run()?;
/// ```
pub struct Engine {
    modules: Vec<Rc<ModuleNode>>,
    main: String,
    libs: Vec<(String, Rc<dyn NativeModule>)>,
}

impl Engine {
    /// Create an engine over parsed modules. `main` names the entry
    /// module.
    pub fn new(modules: Vec<Rc<ModuleNode>>, main: impl Into<String>) -> Self {
        Engine {
            modules,
            main: main.into(),
            libs: vec![("gc".to_string(), Rc::new(ModuleGc::new()) as Rc<dyn NativeModule>)],
        }
    }

    /// Attach an additional core library under a `using` name.
    pub fn add_core_lib(&mut self, name: impl Into<String>, lib: Rc<dyn NativeModule>) {
        self.libs.push((name.into(), lib));
    }

    /// Analyse only; useful to surface semantic errors without running.
    pub fn check(&self) -> Result<()> {
        let mut analyser = Analyser::new(self.modules.clone(), self.main.clone());
        ModuleBuiltin::new().register_analysis(&mut analyser);
        for (name, lib) in &self.libs {
            analyser.add_core_lib(name.clone(), lib.clone());
        }
        analyser
            .analyse()
            .map_err(|e| EngineError::Semantic(e.to_string()))
    }

    /// Analyse, compile and execute. The result is the program's exit
    /// code: the evaluation-stack top at halt, or -1 if the stack was
    /// empty.
    pub fn run(&self) -> Result<i64> {
        self.check()?;

        let compiler = Compiler::new(self.modules.clone(), self.main.clone());
        let program = compiler
            .compile()
            .map_err(|e| EngineError::Compile(e.to_string()))?;

        let mut vm = Vm::new(program);
        ModuleBuiltin::new().register_runtime(&mut vm);
        for (name, lib) in &self.libs {
            vm.add_core_lib(name.clone(), lib.clone());
        }
        vm.run().map_err(|e| EngineError::Runtime(e.to_string()))
    }
}
