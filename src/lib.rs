//! Ember: a small class-based, dynamically typed scripting language runtime.
//!
//! [`Ember`] is the single entry point both the CLS and host embedders use: it owns a
//! [`Vm`] and exposes the surface a caller needs without requiring direct use of
//! `vm::Vm`'s lower-level pieces. Use [`Ember::builder`] to configure GC tuning, the
//! module loader or the stdout sink before running any source.

mod builtins;
pub mod disasm;
mod emit;
pub mod error;
mod heap;
pub mod object;
mod opcode;
pub mod public;
mod symbol;
pub mod value;
pub mod vm;

pub use error::{Error, Result};
pub use heap::GcConfig;
pub use object::module::ModuleLoader;
pub use public::{
  bind_foreign_method, get_variable, make_call_handle, CallHandle, FromEmber, Handle, IntoEmber,
  Slots,
};
pub use value::Value;
pub use vm::Vm;

use object::module::NoopModuleLoader;
use vm::Config;

/// Owns a [`Vm`] and drives it through a source string or file.
///
/// The teacher wraps its VM in `RefCell` because several `Value<'a>` conversions need
/// to re-borrow it while a caller still holds a borrowed result; here a `Value` is a
/// plain `Copy` tagged word traced by the GC rather than an `Rc`-backed handle
/// borrowing from the VM, so `Ember` can hand out `&mut Vm` directly with no interior
/// mutability needed.
pub struct Ember {
  vm: Vm,
}

impl Ember {
  pub fn builder() -> Builder {
    Builder::new()
  }

  /// Compiles and runs `source` as an anonymous module, returning its last expression
  /// value (spec.md §6 `interpret`/`call`).
  pub fn eval(&mut self, source: &str) -> Result<Value> {
    self.vm.interpret("<eval>", source)
  }

  /// Compiles and runs `source` as the module named `path`, the way the module loader
  /// names a file passed to `getVariable`/`LOAD_MODULE`.
  pub fn run(&mut self, path: &str, source: &str) -> Result<Value> {
    self.vm.interpret(path, source)
  }

  pub fn vm(&self) -> &Vm {
    &self.vm
  }

  pub fn vm_mut(&mut self) -> &mut Vm {
    &mut self.vm
  }

  /// Reads a variable out of the implicit core module (spec.md §6 `getVariable` with
  /// `module = None`).
  pub fn get_global(&self, name: &str) -> Option<Value> {
    public::get_variable(&self.vm, None, name)
  }

  /// Binds `f` as a foreign method on `class_name`, a class already visible as a core
  /// or loaded-module variable (spec.md §4.7 `bindForeignMethodFn`).
  pub fn bind_foreign_method(
    &mut self,
    module: Option<&str>,
    class_name: &str,
    signature: &str,
    is_static: bool,
    f: impl Fn(&mut Slots) -> Result<()> + 'static,
  ) -> Result<()> {
    public::bind_foreign_method(&mut self.vm, module, class_name, signature, is_static, f)
  }
}

impl Default for Ember {
  fn default() -> Self {
    Self::builder().build()
  }
}

impl std::fmt::Debug for Ember {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Ember")
      .field("bytes_allocated", &self.vm.ctx.bytes_allocated())
      .finish()
  }
}

/// Configures and constructs an [`Ember`], mirroring the teacher's `HebiBuilder`.
pub struct Builder {
  gc: GcConfig,
  module_loader: Option<Box<dyn ModuleLoader>>,
  stdout: Option<Box<dyn std::io::Write>>,
  gc_stress: bool,
}

impl Builder {
  fn new() -> Self {
    Builder {
      gc: GcConfig::default(),
      module_loader: None,
      stdout: None,
      gc_stress: false,
    }
  }

  pub fn with_gc_config(mut self, gc: GcConfig) -> Self {
    self.gc = gc;
    self
  }

  pub fn with_io<T: std::io::Write + 'static>(mut self, stdout: T) -> Self {
    self.stdout = Some(Box::new(stdout));
    self
  }

  pub fn with_module_loader<T: ModuleLoader + 'static>(mut self, loader: T) -> Self {
    self.module_loader = Some(Box::new(loader));
    self
  }

  /// Collects on every allocation instead of only once the heap grows past its
  /// threshold; a test/fuzzing knob for flushing out missing roots quickly.
  pub fn with_gc_stress(mut self, enabled: bool) -> Self {
    self.gc_stress = enabled;
    self
  }

  pub fn build(self) -> Ember {
    let vm = Vm::new(Config {
      gc: self.gc,
      module_loader: self
        .module_loader
        .unwrap_or_else(|| Box::new(NoopModuleLoader)),
      stdout: self.stdout.unwrap_or_else(|| Box::new(std::io::stdout())),
      gc_stress: self.gc_stress,
    });
    Ember { vm }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn eval_returns_last_expression() {
    let mut ember = Ember::default();
    let result = ember.eval("1 + 2").unwrap();
    assert_eq!(result.as_float(), Some(3.0));
  }

  #[test]
  fn builder_defaults_match_default_ember() {
    let mut a = Ember::default();
    let mut b = Ember::builder().build();
    assert_eq!(a.eval("40 + 2").unwrap().as_float(), b.eval("40 + 2").unwrap().as_float());
  }

  #[test]
  fn get_global_finds_core_class() {
    let ember = Ember::default();
    assert!(ember.get_global("Object").is_some());
  }

  #[test]
  fn class_constructor_and_method_dispatch() {
    let mut ember = Ember::default();
    let source = indoc::indoc! {"
      class Point:
        x = 0
        y = 0

        fn init(self, x, y):
          self.x = x
          self.y = y

        fn sum(self):
          return self.x + self.y

      p = Point.new(1, 2)
      p.sum()
    "};
    let result = ember.eval(source).unwrap();
    assert_eq!(result.as_float(), Some(3.0));
  }

  #[test]
  fn class_inherits_method_from_superclass() {
    let mut ember = Ember::default();
    let source = indoc::indoc! {"
      class Animal:
        fn speak(self):
          return \"...\"

      class Dog(Animal):
        fn bark(self):
          return self.speak()

      Dog.new().bark()
    "};
    let result = ember.eval(source).unwrap();
    assert!(result.as_object().is_some());
  }

  #[test]
  fn field_default_applies_when_init_omits_it() {
    let mut ember = Ember::default();
    let source = indoc::indoc! {"
      class Counter:
        count = 0

        fn get(self):
          return self.count

      Counter.new().get()
    "};
    let result = ember.eval(source).unwrap();
    assert_eq!(result.as_float(), Some(0.0));
  }

  #[test]
  fn cannot_subclass_a_sealed_core_class() {
    let mut ember = Ember::default();
    let err = ember.eval("class Oops(String):\n  pass\n").unwrap_err();
    assert!(err.to_string().contains("String"));
  }

  #[test]
  fn closure_captures_outer_local_by_reference() {
    let mut ember = Ember::default();
    let source = indoc::indoc! {"
      fn make_counter():
        count = 0
        fn increment():
          count = count + 1
          return count
        return increment

      counter = make_counter()
      counter()
      counter()
      counter()
    "};
    let result = ember.eval(source).unwrap();
    assert_eq!(result.as_float(), Some(3.0));
  }

  #[test]
  fn fiber_yields_suspend_and_resume_across_calls() {
    let mut ember = Ember::default();
    let source = indoc::indoc! {"
      fn gen():
        yield 1
        yield 2

      f = Fiber.new(gen)
      a = f.call()
      b = f.call()
      a + b
    "};
    let result = ember.eval(source).unwrap();
    assert_eq!(result.as_float(), Some(3.0));
  }

  struct MapLoader(std::collections::HashMap<&'static str, &'static str>);

  impl ModuleLoader for MapLoader {
    fn load(&mut self, name: &str) -> Result<String> {
      self
        .0
        .get(name)
        .map(|s| s.to_string())
        .ok_or_else(|| crate::error::module_not_found(name))
    }
  }

  #[test]
  fn import_pulls_a_variable_out_of_a_loaded_module() {
    let loader = MapLoader(std::collections::HashMap::from([("pkg", "value = 42\n")]));
    let mut ember = Ember::builder().with_module_loader(loader).build();
    let result = ember.eval("import pkg.value\nvalue\n").unwrap();
    assert_eq!(result.as_float(), Some(42.0));
  }

  #[test]
  fn importing_an_unknown_module_fails() {
    let loader = MapLoader(std::collections::HashMap::new());
    let mut ember = Ember::builder().with_module_loader(loader).build();
    assert!(ember.eval("import pkg.value\n").is_err());
  }

  struct CountingLoader {
    source: &'static str,
    loads: std::rc::Rc<std::cell::Cell<u32>>,
  }

  impl ModuleLoader for CountingLoader {
    fn load(&mut self, name: &str) -> Result<String> {
      assert_eq!(name, "pkg");
      self.loads.set(self.loads.get() + 1);
      Ok(self.source.to_string())
    }
  }

  #[test]
  fn re_importing_the_same_module_does_not_reload_it() {
    let loads = std::rc::Rc::new(std::cell::Cell::new(0));
    let loader = CountingLoader { source: "value = 42\n", loads: loads.clone() };
    let mut ember = Ember::builder().with_module_loader(loader).build();
    let result = ember.eval("import pkg.value\nimport pkg.value\nvalue\n").unwrap();
    assert_eq!(result.as_float(), Some(42.0));
    assert_eq!(loads.get(), 1);
  }
}
