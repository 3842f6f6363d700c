//! Native ("foreign") method registration (spec.md §4.7 `bindForeignMethodFn`) and
//! cross-module variable lookup (§6 `getVariable`).
//!
//! Grounded on the teacher's `public/module.rs::NativeModuleBuilder`, simplified from
//! its `Arc`-shared async builder down to binding directly onto an already-created
//! class: this grammar has no `foreign` method syntax (`ember_syntax::ast::Func` always
//! carries a body), so there is no compile-time hook to resolve against the way Wren's
//! C API does when it hits an empty method body. Instead a foreign method is attached
//! post-hoc to any class reachable as a module variable, which covers the same
//! embedding use case (exposing host functionality as script-callable methods) without
//! inventing surface syntax the spec doesn't call for.

use crate::error::{runtime, Result};
use crate::object::class::Method;
use crate::object::module::ModuleObj;
use crate::object::{Handle, ObjectKind};
use crate::public::slots::Slots;
use crate::value::Value;
use crate::vm::{class_ops, Vm};

/// Reads a module-level variable by name (spec.md §6 `getVariable`). `module` is the
/// module path used to load it (`None` for the implicit core module).
pub fn get_variable(vm: &Vm, module: Option<&str>, name: &str) -> Option<Value> {
  let key: Option<Box<str>> = module.map(Into::into);
  let module_raw = *vm.modules.get(&key)?;
  let module = unsafe { Handle::<ModuleObj>::from_raw_unchecked(module_raw) };
  module.get().find_variable(name)
}

/// Binds `f` as a foreign method on the class named `class_name` (found as a variable
/// of `module`), under `signature` (e.g. `"distanceTo(_)"`). `is_static` targets the
/// class's metaclass instead of the class itself, matching `METHOD_STATIC`'s binding
/// target.
pub fn bind_foreign_method(
  vm: &mut Vm,
  module: Option<&str>,
  class_name: &str,
  signature: &str,
  is_static: bool,
  f: impl Fn(&mut Slots) -> Result<()> + 'static,
) -> Result<()> {
  let class_value = get_variable(vm, module, class_name).ok_or_else(|| {
    runtime(format!(
      "Could not find a variable named '{class_name}' in module '{}'.",
      module.unwrap_or("core")
    ))
  })?;
  let class_raw = class_value
    .as_object()
    .filter(|o| unsafe { o.as_ref() }.kind == ObjectKind::Class)
    .ok_or_else(|| runtime(format!("'{class_name}' is not a class.")))?;
  let target_raw = if is_static {
    unsafe { class_raw.as_ref() }.class.get().expect("class missing metaclass")
  } else {
    class_raw
  };
  let symbol = vm.ctx.method_names_ensure(signature);
  let f = std::rc::Rc::new(f);
  let method = Method::Foreign(std::rc::Rc::new(move |vm: &mut Vm, receiver: Value, args: &[Value]| {
    let mut slots = Slots::for_call(vm, receiver, args);
    f(&mut slots)?;
    Ok(slots.into_result())
  }));
  class_ops::bind_method(vm, target_raw, symbol, method);
  Ok(())
}
