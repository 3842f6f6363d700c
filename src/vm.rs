//! The interpreter: bytecode dispatch loop, method/class dispatch, fiber scheduling
//! and module loading.
//!
//! Grounded on `isolate.rs`'s "one `op_*` method per opcode, cached dispatch locals"
//! shape, generalized from register+accumulator addressing to the stack machine
//! spec.md §4.4 specifies, and from a single flat call stack to a `Fiber` object so
//! multiple fibers can coexist (spec.md §4.5).

pub mod class_ops;
pub mod dispatch;
pub mod fiber_ops;
pub mod module_loader;

use indexmap::IndexMap;

use crate::builtins::CoreClasses;
use crate::error::{Error, Result};
use crate::heap::{Context, GcConfig, RawObj};
use crate::object::fiber::FiberObj;
use crate::object::module::ModuleLoader;
use crate::object::Handle;
use crate::value::Value;

pub struct Config {
  pub gc: GcConfig,
  pub module_loader: Box<dyn ModuleLoader>,
  pub stdout: Box<dyn std::io::Write>,
  /// Collects on every allocation; ambient test-tooling knob, not user-visible.
  pub gc_stress: bool,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      gc: GcConfig::default(),
      module_loader: Box::new(crate::object::module::NoopModuleLoader),
      stdout: Box::new(std::io::stdout()),
      gc_stress: false,
    }
  }
}

pub struct Vm {
  pub ctx: Context,
  pub classes: CoreClasses,
  pub modules: IndexMap<Option<Box<str>>, RawObj>,
  pub module_loader: Box<dyn ModuleLoader>,
  pub stdout: Box<dyn std::io::Write>,
  pub current_fiber: RawObj,
  /// Set by `module_loader::load_module`; consumed by the following `IMPORT_VARIABLE`.
  pub last_module: Option<RawObj>,
}

impl Vm {
  pub fn new(config: Config) -> Self {
    let ctx = Context::new(config.gc);
    ctx.set_gc_stress(config.gc_stress);
    let core_module = ctx.alloc(
      crate::object::module::ModuleObj::new(None),
      None,
    );
    ctx.register_module(core_module);
    let mut modules = IndexMap::new();
    modules.insert(None, core_module);
    let classes = crate::builtins::bootstrap(&ctx, core_module);
    // The first fiber is a placeholder until `interpret` installs a real one; it
    // exists so `Vm` never has a dangling `current_fiber`.
    let placeholder_fn = crate::builtins::empty_function(&ctx, core_module);
    ctx.push_temp_root(placeholder_fn);
    let placeholder_closure = ctx.alloc(
      crate::object::closure::ClosureObj::new(placeholder_fn, Box::new([])),
      Some(classes.fn_.raw()),
    );
    ctx.pop_temp_root();
    ctx.push_temp_root(placeholder_closure);
    let placeholder_fiber = ctx.alloc(FiberObj::new(placeholder_closure), Some(classes.fiber.raw()));
    ctx.pop_temp_root();
    ctx.set_current_fiber(Some(placeholder_fiber));
    Vm {
      ctx,
      classes,
      modules,
      module_loader: config.module_loader,
      stdout: config.stdout,
      current_fiber: placeholder_fiber,
      last_module: None,
    }
  }

  pub fn current_fiber(&self) -> Handle<FiberObj> {
    unsafe { Handle::from_raw_unchecked(self.current_fiber) }
  }

  pub fn set_current_fiber(&mut self, fiber: RawObj) {
    self.current_fiber = fiber;
    self.ctx.set_current_fiber(Some(fiber));
  }

  /// Compiles `source` as module `path`, runs it on a fresh fiber, and returns its
  /// result (the entry point used by `interpret`/`Hebi::eval`-equivalent callers).
  pub fn interpret(&mut self, path: &str, source: &str) -> Result<Value> {
    let module = module_loader::get_or_create_module(self, Some(path));
    let function = crate::emit::compile(self, module, path, source)?;
    let closure = self.ctx.alloc(
      crate::object::closure::ClosureObj::new(function, Box::new([])),
      Some(self.classes.fn_.raw()),
    );
    let fiber = self.ctx.alloc(
      FiberObj::new(closure),
      Some(self.classes.fiber.raw()),
    );
    let previous = self.current_fiber;
    self.set_current_fiber(fiber);
    let result = dispatch::run(self);
    self.set_current_fiber(previous);
    result
  }

  pub fn class_of(&self, value: Value) -> RawObj {
    if let Some(obj) = value.as_object() {
      unsafe { obj.as_ref().class.get() }.expect("heap object missing class pointer")
    } else if value.is_null() {
      self.classes.null.raw()
    } else if value.is_bool() {
      self.classes.bool_.raw()
    } else {
      self.classes.num.raw()
    }
  }

  /// Looks up and invokes `symbol` on `receiver`, matching the runtime-error wording
  /// required by spec.md §6 when no method is bound.
  pub fn call_method(&mut self, receiver: Value, symbol: crate::symbol::SymbolId, args: &[Value]) -> Result<Value> {
    class_ops::dispatch(self, self.class_of(receiver), receiver, symbol, args)
  }
}

pub fn runtime_error_with_trace(vm: &Vm, message: impl Into<String>) -> Error {
  let fiber = vm.current_fiber();
  let mut trace = Vec::new();
  for frame in fiber.get().frames.iter().rev() {
    let closure = unsafe { Handle::<crate::object::closure::ClosureObj>::from_raw_unchecked(frame.closure) };
    let function = unsafe { Handle::<crate::object::function::FunctionObj>::from_raw_unchecked(closure.get().function) };
    trace.push((function.get().name.to_string(), function.get().line_for(frame.ip)));
  }
  Error::Runtime(crate::error::RuntimeError {
    message: message.into(),
    trace,
  })
}
