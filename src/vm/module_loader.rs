//! Module creation, lazy loading and cross-module variable import (spec.md §4.6).
//!
//! A module is created (and seeded with every core-module name) the first time it is
//! referenced; its body only actually runs the first time `LOAD_MODULE` names it,
//! keeping re-imports idempotent and preserving load order.

use crate::error::{variable_not_found, Result};
use crate::heap::RawObj;
use crate::object::closure::ClosureObj;
use crate::object::module::ModuleObj;
use crate::object::Handle;
use crate::symbol::SymbolId;
use crate::value::Value;
use crate::vm::Vm;

/// Returns the module at `path` (`None` for the core module), creating and
/// core-seeding it if this is the first reference.
pub fn get_or_create_module(vm: &mut Vm, path: Option<&str>) -> RawObj {
  let key: Option<Box<str>> = path.map(Into::into);
  if let Some(existing) = vm.modules.get(&key) {
    return *existing;
  }
  let mut module = ModuleObj::new(key.clone());
  seed_from_core(vm, &mut module);
  let raw = vm.ctx.alloc(module, None);
  vm.ctx.register_module(raw);
  vm.modules.insert(key, raw);
  raw
}

/// Every module implicitly sees the core module's names (`Object`, `Num`, `print`,
/// ...) without an explicit import.
fn seed_from_core(vm: &Vm, module: &mut ModuleObj) {
  let Some(&core_raw) = vm.modules.get(&None) else {
    return;
  };
  let core = unsafe { Handle::<ModuleObj>::from_raw_unchecked(core_raw) };
  for i in 0..core.get().variable_names.len() {
    let name = core.get().variable_names.name(SymbolId(i as u32)).to_string();
    let value = core.get().variables[i];
    module.declare_variable(&name);
    module.define_variable(&name, value);
  }
}

/// Handles the `LOAD_MODULE` opcode: compiles and runs `name`'s body the first time
/// it's seen, then records it so the following `IMPORT_VARIABLE` can read from it.
pub fn load_module(vm: &mut Vm, name: &str) -> Result<()> {
  let key = Some(Box::<str>::from(name));
  if let Some(&existing) = vm.modules.get(&key) {
    vm.last_module = Some(existing);
    return Ok(());
  }
  let source = vm.module_loader.load(name)?;
  let module_raw = get_or_create_module(vm, Some(name));
  let function = crate::emit::compile(vm, module_raw, name, &source)?;
  let closure_raw = vm.ctx.alloc(ClosureObj::new(function, Box::new([])), Some(vm.classes.fn_.raw()));
  let closure = unsafe { Handle::from_raw_unchecked(closure_raw) };
  crate::vm::dispatch::call_closure(vm, closure, Value::NULL, &[])?;
  vm.last_module = Some(module_raw);
  Ok(())
}

/// Handles `IMPORT_VARIABLE`, reading `name` out of whichever module the preceding
/// `LOAD_MODULE` named.
pub fn import_variable(vm: &mut Vm, name: &str) -> Result<Value> {
  let module_raw = vm
    .last_module
    .expect("IMPORT_VARIABLE must follow a LOAD_MODULE");
  let module = unsafe { Handle::<ModuleObj>::from_raw_unchecked(module_raw) };
  module
    .get()
    .find_variable(name)
    .ok_or_else(|| variable_not_found(name, module.get().display_name()))
}
