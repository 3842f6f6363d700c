//! The `Module` object and the registry that owns all loaded modules.
//!
//! Grounded on `value/object/module.rs::{Module, ModuleRegistry, ModuleLoader}`: a
//! module owns a variable-name symbol table and a parallel value vector; an
//! `undefined` slot marks a forward declaration not yet resolved (spec.md §4.6).

use crate::heap::{RawObj, Trace};
use crate::object::{trace_values, ObjectKind};
use crate::symbol::{SymbolId, SymbolTable};
use crate::value::Value;

pub struct ModuleObj {
  /// `None` for the implicitly-imported core module.
  pub name: Option<Box<str>>,
  pub variable_names: SymbolTable,
  pub variables: Vec<Value>,
}

impl ModuleObj {
  pub fn new(name: Option<Box<str>>) -> Self {
    ModuleObj {
      name,
      variable_names: SymbolTable::new(),
      variables: Vec::new(),
    }
  }

  /// Forward-declares `name` if it is not already known, leaving its slot
  /// `Value::UNDEFINED` until `define_variable` resolves it.
  pub fn declare_variable(&mut self, name: &str) -> SymbolId {
    if let Some(id) = self.variable_names.find(name) {
      return id;
    }
    let id = self.variable_names.ensure(name);
    self.variables.push(Value::UNDEFINED);
    id
  }

  /// Defines `name` with `value`. Returns `false` if `name` was already defined
  /// (not merely forward-declared) — the caller turns that into a compile error.
  pub fn define_variable(&mut self, name: &str, value: Value) -> bool {
    if let Some(id) = self.variable_names.find(name) {
      let slot = &mut self.variables[id.index()];
      if !slot.is_undefined() {
        return false;
      }
      *slot = value;
      return true;
    }
    self.variable_names.ensure(name);
    self.variables.push(value);
    true
  }

  pub fn variable(&self, id: SymbolId) -> Option<Value> {
    self.variables.get(id.index()).copied()
  }

  pub fn find_variable(&self, name: &str) -> Option<Value> {
    let id = self.variable_names.find(name)?;
    self.variable(id)
  }

  pub fn set_variable(&mut self, id: SymbolId, value: Value) {
    self.variables[id.index()] = value;
  }

  pub fn display_name(&self) -> &str {
    self.name.as_deref().unwrap_or("core")
  }
}

impl Trace for ModuleObj {
  const KIND: ObjectKind = ObjectKind::Module;
  fn trace(&self, mark: &mut dyn FnMut(RawObj)) {
    trace_values(&self.variables, mark);
  }
}

/// Maps a module path to the already-loaded module, so `LOAD_MODULE` re-imports are
/// idempotent and order-preserving (spec.md §4.6).
pub trait ModuleLoader {
  /// Returns the module's source text, or an error if it cannot be found.
  fn load(&mut self, name: &str) -> Result<String, crate::error::Error>;
}

pub struct NoopModuleLoader;

impl ModuleLoader for NoopModuleLoader {
  fn load(&mut self, name: &str) -> Result<String, crate::error::Error> {
    Err(crate::error::module_not_found(name))
  }
}
