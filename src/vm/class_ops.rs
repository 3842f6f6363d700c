//! Method dispatch and class/metaclass construction (spec.md §4.3).

use crate::error::{does_not_implement, Result};
use crate::object::class::{ClassObj, Method};
use crate::object::Handle;
use crate::symbol::SymbolId;
use crate::value::Value;
use crate::heap::RawObj;
use crate::vm::Vm;

/// Finds `symbol` in `class_raw`'s method vector, without invoking it. Does not walk a
/// superclass chain itself — every class's method vector already has its
/// superclass's methods copied in at construction time (`inherit_methods_from`), so a
/// single vector index is enough (spec.md §4.3: "a class's method vector index `i`
/// means no such method iff the slot is empty or out of range").
pub fn lookup(class_raw: RawObj, symbol: SymbolId) -> Option<Method> {
  let class = unsafe { Handle::<ClassObj>::from_raw_unchecked(class_raw) };
  class.get().method(symbol).cloned()
}

/// Invokes an already-looked-up `method` (or raises `does_not_implement` if `None`).
/// A `Method::Fiber` here runs to completion synchronously, via a nested interpreter
/// loop à la `call_closure` — the hot `CALL`/`SUPER` path in `vm::dispatch` bypasses
/// this and handles fiber switches inline instead, but callers that just want "the
/// result" (e.g. `Vm::call_method`) can go through here uniformly.
pub fn invoke(
  vm: &mut Vm,
  class_raw: RawObj,
  method: Option<Method>,
  receiver: Value,
  symbol: SymbolId,
  args: &[Value],
) -> Result<Value> {
  match method {
    Some(Method::Primitive(f)) => f(vm, receiver, args),
    Some(Method::Foreign(f)) => f(vm, receiver, args),
    Some(Method::Block(closure)) => super::dispatch::call_closure(vm, closure, receiver, args),
    Some(Method::Fiber(f)) => {
      let original = vm.current_fiber;
      match f(vm, receiver, args)? {
        crate::vm::fiber_ops::FiberOutcome::Value(v) => Ok(v),
        crate::vm::fiber_ops::FiberOutcome::Switched => super::dispatch::drain_until_fiber_current(vm, original),
      }
    }
    None => {
      let class = unsafe { Handle::<ClassObj>::from_raw_unchecked(class_raw) };
      let sig = vm.ctx.method_name(symbol);
      Err(does_not_implement(&class.get().name, &sig))
    }
  }
}

/// Looks up and invokes `symbol` starting at `class_raw` in one call.
pub fn dispatch(
  vm: &mut Vm,
  class_raw: RawObj,
  receiver: Value,
  symbol: SymbolId,
  args: &[Value],
) -> Result<Value> {
  let method = lookup(class_raw, symbol);
  invoke(vm, class_raw, method, receiver, symbol, args)
}

/// Like `dispatch`, but starts at a statically-known superclass (`SUPER_n`),
/// bypassing whatever the receiver's actual runtime class overrides.
pub fn dispatch_super(
  vm: &mut Vm,
  superclass_raw: RawObj,
  receiver: Value,
  symbol: SymbolId,
  args: &[Value],
) -> Result<Value> {
  dispatch(vm, superclass_raw, receiver, symbol, args)
}

pub fn bind_method(vm: &mut Vm, class_raw: RawObj, symbol: SymbolId, method: Method) {
  let _ = vm;
  let class = unsafe { Handle::<ClassObj>::from_raw_unchecked(class_raw) };
  class.get_mut().bind(symbol, method);
}

/// Resolves the `CLASS` opcode's superclass operand, enforcing spec.md §6's exact
/// error wordings.
pub fn resolve_superclass(value: Value) -> Result<RawObj> {
  let obj = value
    .as_object()
    .filter(|o| unsafe { o.as_ref() }.kind == crate::object::ObjectKind::Class)
    .ok_or_else(crate::error::must_inherit_from_class)?;
  Ok(obj)
}

/// Builds a new class plus its metaclass. `superclass` must already have been
/// validated by `resolve_superclass` (or be `None` for a root class during
/// bootstrap).
pub fn create_class(vm: &mut Vm, name: &str, superclass: Option<RawObj>, num_fields: usize) -> Result<RawObj> {
  if let Some(sup_raw) = superclass {
    let sup = unsafe { Handle::<ClassObj>::from_raw_unchecked(sup_raw) };
    if sup.get().is_sealed {
      let sup_name = sup.get().name.to_string();
      return Err(crate::error::cannot_inherit(name, &sup_name));
    }
  }
  let super_fields = superclass
    .map(|s| unsafe { Handle::<ClassObj>::from_raw_unchecked(s) }.get().num_fields)
    .unwrap_or(0);
  let mut class_obj = ClassObj::new(name, superclass, super_fields + num_fields);
  if let Some(sup_raw) = superclass {
    let sup = unsafe { Handle::<ClassObj>::from_raw_unchecked(sup_raw) };
    class_obj.inherit_methods_from(sup.get());
  }
  let class_raw = vm.ctx.alloc(class_obj, None);
  vm.ctx.push_temp_root(class_raw);

  let root_class = vm.classes.class_.raw();
  let mut meta = ClassObj::new(format!("{name} metaclass"), Some(root_class), 0);
  {
    let root = unsafe { Handle::<ClassObj>::from_raw_unchecked(root_class) };
    meta.inherit_methods_from(root.get());
  }
  let meta_raw = vm.ctx.alloc(meta, Some(root_class));
  unsafe { class_raw.as_ref() }.class.set(Some(meta_raw));
  vm.ctx.pop_temp_root();

  Ok(class_raw)
}
