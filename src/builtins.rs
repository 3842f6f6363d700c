//! The core module: bootstraps `Object`/`Class` and every other core class, binding
//! their primitive methods directly in Rust rather than compiling them from source
//! (spec.md §4.2/§4.3 "core classes").
//!
//! Grounded on `vm/builtin.rs` + `value/object/class.rs`'s primitive-method tables,
//! reworked around this crate's global method-symbol dispatch instead of the
//! teacher's per-class closure map.

use std::io::Write as _;

use crate::error::{runtime, Result};
use crate::heap::{Context, RawObj};
use crate::object::class::{ClassObj, Method};
use crate::object::closure::ClosureObj;
use crate::object::fiber::FiberObj;
use crate::object::function::FunctionObj;
use crate::object::instance::InstanceObj;
use crate::object::list::ListObj;
use crate::object::map::MapObj;
use crate::object::module::ModuleObj;
use crate::object::range::RangeObj;
use crate::object::string::{format_number, StringObj};
use crate::object::{Handle, ObjectKind};
use crate::opcode::Instruction;
use crate::value::Value;
use crate::vm::fiber_ops;
use crate::vm::Vm;

pub struct CoreClasses {
  pub object: Handle<ClassObj>,
  pub class_: Handle<ClassObj>,
  pub bool_: Handle<ClassObj>,
  pub null: Handle<ClassObj>,
  pub num: Handle<ClassObj>,
  pub string: Handle<ClassObj>,
  pub list: Handle<ClassObj>,
  pub map: Handle<ClassObj>,
  pub range: Handle<ClassObj>,
  pub fn_: Handle<ClassObj>,
  pub fiber: Handle<ClassObj>,
  pub system: Handle<ClassObj>,
}

fn class(raw: RawObj) -> Handle<ClassObj> {
  unsafe { Handle::from_raw_unchecked(raw) }
}

fn bind(ctx: &Context, class_raw: RawObj, name: &str, method: Method) {
  let symbol = ctx.method_names_ensure(name);
  class(class_raw).get_mut().bind(symbol, method);
}

fn declare(ctx: &Context, module: RawObj, name: &str, value: Value) {
  let module = unsafe { Handle::<ModuleObj>::from_raw_unchecked(module) };
  module.get_mut().declare_variable(name);
  module.get_mut().define_variable(name, value);
}

/// Allocates `name` as a fresh core class (instance superclass `Object`, metaclass
/// superclass the root `Class`), inheriting both chains' already-bound methods.
/// Mirrors `vm::class_ops::create_class`, minus the `vm.classes` dependency that
/// function needs (which doesn't exist yet while bootstrapping).
fn define_core_class(ctx: &Context, object_raw: RawObj, class_raw: RawObj, name: &str, sealed: bool) -> RawObj {
  let mut obj = ClassObj::new(name, Some(object_raw), 0);
  obj.inherit_methods_from(class(object_raw).get());
  if sealed {
    obj = obj.sealed();
  }
  let new_class = ctx.alloc(obj, None);
  ctx.push_temp_root(new_class);

  let mut meta = ClassObj::new(format!("{name} metaclass"), Some(class_raw), 0);
  meta.inherit_methods_from(class(class_raw).get());
  let meta_raw = ctx.alloc(meta, Some(class_raw));
  unsafe { new_class.as_ref() }.class.set(Some(meta_raw));
  ctx.pop_temp_root();
  new_class
}

pub fn bootstrap(ctx: &Context, core_module: RawObj) -> CoreClasses {
  // `Object` has no superclass; `Class` (every class's class) inherits from `Object`
  // like any other instance, and is its own metaclass, terminating the regress
  // (spec.md §4.3).
  let object_raw = ctx.alloc(ClassObj::new("Object", None, 0), None);
  ctx.push_temp_root(object_raw);
  let class_raw = ctx.alloc(ClassObj::new("Class", Some(object_raw), 0), None);
  ctx.push_temp_root(class_raw);
  let object_meta = ctx.alloc(ClassObj::new("Object metaclass", Some(class_raw), 0), Some(class_raw));
  unsafe { object_raw.as_ref() }.class.set(Some(object_meta));
  unsafe { class_raw.as_ref() }.class.set(Some(class_raw));
  // kept rooted for the rest of bootstrap: every core class below is built with
  // `object_raw`/`class_raw` as superclass/metaclass-superclass before either one is
  // reachable from `core_module` (only the `declare` loop at the end makes that true).

  bind(ctx, object_raw, "==(_)", Method::Primitive(object_eq));
  bind(ctx, object_raw, "!=(_)", Method::Primitive(object_neq));
  bind(ctx, object_raw, "!()", Method::Primitive(object_not));
  bind(ctx, object_raw, "toString()", Method::Primitive(object_to_string));

  // `Class` is itself an `Object` (every class value supports `==`/`toString`/...),
  // plus the statics every metaclass needs.
  class(class_raw).get_mut().inherit_methods_from(class(object_raw).get());
  bind(ctx, class_raw, "name()", Method::Primitive(class_name));
  bind(ctx, class_raw, "toString()", Method::Primitive(class_name));
  bind(ctx, class_raw, "allocate()", Method::Primitive(class_allocate));
  class(object_meta).get_mut().inherit_methods_from(class(class_raw).get());

  let bool_raw = define_core_class(ctx, object_raw, class_raw, "Bool", false);
  bind(ctx, bool_raw, "toString()", Method::Primitive(bool_to_string));

  let null_raw = define_core_class(ctx, object_raw, class_raw, "Null", false);
  bind(ctx, null_raw, "toString()", Method::Primitive(null_to_string));

  let num_raw = define_core_class(ctx, object_raw, class_raw, "Num", false);
  bind(ctx, num_raw, "+(_)", Method::Primitive(num_add));
  bind(ctx, num_raw, "-(_)", Method::Primitive(num_sub));
  bind(ctx, num_raw, "*(_)", Method::Primitive(num_mul));
  bind(ctx, num_raw, "/(_)", Method::Primitive(num_div));
  bind(ctx, num_raw, "%(_)", Method::Primitive(num_rem));
  bind(ctx, num_raw, "**(_)", Method::Primitive(num_pow));
  bind(ctx, num_raw, ">(_)", Method::Primitive(num_gt));
  bind(ctx, num_raw, ">=(_)", Method::Primitive(num_ge));
  bind(ctx, num_raw, "<(_)", Method::Primitive(num_lt));
  bind(ctx, num_raw, "<=(_)", Method::Primitive(num_le));
  bind(ctx, num_raw, "-()", Method::Primitive(num_neg));
  bind(ctx, num_raw, "toString()", Method::Primitive(num_to_string));

  let string_raw = define_core_class(ctx, object_raw, class_raw, "String", true);
  bind(ctx, string_raw, "+(_)", Method::Primitive(string_add));
  bind(ctx, string_raw, "length()", Method::Primitive(string_length));
  bind(ctx, string_raw, "[](_)", Method::Primitive(string_index));
  bind(ctx, string_raw, "iterate(_)", Method::Primitive(string_iterate));
  bind(ctx, string_raw, "iteratorValue(_)", Method::Primitive(string_iterator_value));
  bind(ctx, string_raw, "toString()", Method::Primitive(identity));

  let list_raw = define_core_class(ctx, object_raw, class_raw, "List", true);
  bind(ctx, list_raw, "add(_)", Method::Primitive(list_add));
  bind(ctx, list_raw, "length()", Method::Primitive(list_length));
  bind(ctx, list_raw, "[](_)", Method::Primitive(list_index));
  bind(ctx, list_raw, "[]=(_,_)", Method::Primitive(list_index_set));
  bind(ctx, list_raw, "remove(_)", Method::Primitive(list_remove));
  bind(ctx, list_raw, "iterate(_)", Method::Primitive(list_iterate));
  bind(ctx, list_raw, "iteratorValue(_)", Method::Primitive(list_iterator_value));
  bind(ctx, list_raw, "toString()", Method::Primitive(list_to_string));
  bind(ctx, list_raw, "addAll(_)", Method::Primitive(list_add_all));
  bind_static(ctx, list_raw, "new()", Method::Primitive(list_new));

  let map_raw = define_core_class(ctx, object_raw, class_raw, "Map", true);
  bind(ctx, map_raw, "[](_)", Method::Primitive(map_index));
  bind(ctx, map_raw, "[]=(_,_)", Method::Primitive(map_index_set));
  bind(ctx, map_raw, "length()", Method::Primitive(map_length));
  bind(ctx, map_raw, "containsKey(_)", Method::Primitive(map_contains_key));
  bind(ctx, map_raw, "remove(_)", Method::Primitive(map_remove));
  bind(ctx, map_raw, "iterate(_)", Method::Primitive(map_iterate));
  bind(ctx, map_raw, "iteratorValue(_)", Method::Primitive(map_iterator_value));
  bind_static(ctx, map_raw, "new()", Method::Primitive(map_new));

  let range_raw = define_core_class(ctx, object_raw, class_raw, "Range", true);
  bind(ctx, range_raw, "iterate(_)", Method::Primitive(range_iterate));
  bind(ctx, range_raw, "iteratorValue(_)", Method::Primitive(identity));
  bind(ctx, range_raw, "toString()", Method::Primitive(range_to_string));
  bind_static(ctx, range_raw, "new(_,_,_)", Method::Primitive(range_new));

  let fn_raw = define_core_class(ctx, object_raw, class_raw, "Fn", true);
  for arity in 0..=8u8 {
    bind(ctx, fn_raw, &signature("call", arity as usize), Method::Primitive(fn_call));
  }
  bind_static(ctx, fn_raw, "new(_)", Method::Primitive(fn_new));

  let fiber_raw = define_core_class(ctx, object_raw, class_raw, "Fiber", true);
  bind(ctx, fiber_raw, "call()", Method::Fiber(fiber_ops::call0));
  bind(ctx, fiber_raw, "call(_)", Method::Fiber(fiber_ops::call1));
  bind(ctx, fiber_raw, "run()", Method::Fiber(fiber_ops::run0));
  bind(ctx, fiber_raw, "run(_)", Method::Fiber(fiber_ops::run1));
  bind(ctx, fiber_raw, "try()", Method::Fiber(fiber_ops::try0));
  bind(ctx, fiber_raw, "isDone()", Method::Fiber(fiber_ops::is_done));
  bind(ctx, fiber_raw, "error()", Method::Fiber(fiber_ops::error_getter));
  bind_static(ctx, fiber_raw, "new(_)", Method::Fiber(fiber_ops::new));
  bind_static(ctx, fiber_raw, "yield()", Method::Fiber(fiber_ops::yield0));
  bind_static(ctx, fiber_raw, "yield(_)", Method::Fiber(fiber_ops::yield1));
  bind_static(ctx, fiber_raw, "current()", Method::Fiber(fiber_ops::current));
  bind_static(ctx, fiber_raw, "abort(_)", Method::Fiber(fiber_ops::abort));

  let system_raw = define_core_class(ctx, object_raw, class_raw, "System", true);
  bind_static(ctx, system_raw, "print()", Method::Primitive(system_print0));
  bind_static(ctx, system_raw, "print(_)", Method::Primitive(system_print1));
  bind_static(ctx, system_raw, "write(_)", Method::Primitive(system_write));

  for (name, raw) in [
    ("Object", object_raw),
    ("Class", class_raw),
    ("Bool", bool_raw),
    ("Null", null_raw),
    ("Num", num_raw),
    ("String", string_raw),
    ("List", list_raw),
    ("Map", map_raw),
    ("Range", range_raw),
    ("Fn", fn_raw),
    ("Fiber", fiber_raw),
    ("System", system_raw),
  ] {
    declare(ctx, core_module, name, Value::object(raw));
  }
  ctx.pop_temp_root(); // class_raw
  ctx.pop_temp_root(); // object_raw

  CoreClasses {
    object: class(object_raw),
    class_: class(class_raw),
    bool_: class(bool_raw),
    null: class(null_raw),
    num: class(num_raw),
    string: class(string_raw),
    list: class(list_raw),
    map: class(map_raw),
    range: class(range_raw),
    fn_: class(fn_raw),
    fiber: class(fiber_raw),
    system: class(system_raw),
  }
}

/// Binds a static method: the metaclass is `class_raw`'s `Header.class`, always set by
/// `define_core_class` before this runs.
fn bind_static(ctx: &Context, class_raw: RawObj, name: &str, method: Method) {
  let meta = unsafe { class_raw.as_ref() }.class.get().expect("metaclass not wired yet");
  bind(ctx, meta, name, method);
}

/// `name(arity)`, e.g. `signature("call", 2) == "call(_,_)"` (spec.md §4.4 symbol
/// convention, same shape Wren's `wren_utils.c` uses).
pub fn signature(name: &str, arity: usize) -> String {
  if arity == 0 {
    format!("{name}()")
  } else {
    let placeholders = std::iter::repeat("_").take(arity).collect::<Vec<_>>().join(",");
    format!("{name}({placeholders})")
  }
}

/// A single `END` instruction, just enough for the placeholder fiber installed before
/// `Vm::interpret` runs for the first time; it is replaced before ever being stepped.
pub fn empty_function(ctx: &Context, module: RawObj) -> RawObj {
  ctx.alloc(
    FunctionObj {
      name: "<bootstrap>".into(),
      arity: 0,
      upvalue_count: 0,
      code: Box::new([Instruction::Null, Instruction::End]),
      constants: Box::new([]),
      lines: Box::new([0, 0]),
      module: Some(module),
      source_path: "<bootstrap>".into(),
      max_stack: 1,
    },
    None,
  )
}

// --- Object -----------------------------------------------------------------------

fn object_eq(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  Ok(Value::bool(receiver.eq(args[0])))
}

fn object_neq(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  Ok(Value::bool(!receiver.eq(args[0])))
}

fn object_not(_vm: &mut Vm, receiver: Value, _args: &[Value]) -> Result<Value> {
  Ok(Value::bool(!receiver.is_truthy()))
}

fn object_to_string(vm: &mut Vm, receiver: Value, _args: &[Value]) -> Result<Value> {
  let class_raw = vm.class_of(receiver);
  let name = class(class_raw).get().name.to_string();
  Ok(alloc_string(vm, format!("instance of {name}")))
}

fn identity(_vm: &mut Vm, receiver: Value, _args: &[Value]) -> Result<Value> {
  Ok(receiver)
}

// --- Class ---------------------------------------------------------------------

fn class_name(vm: &mut Vm, receiver: Value, _args: &[Value]) -> Result<Value> {
  let class_raw = as_class(receiver)?;
  let name = class(class_raw).get().name.to_string();
  Ok(alloc_string(vm, name))
}

fn class_allocate(vm: &mut Vm, receiver: Value, _args: &[Value]) -> Result<Value> {
  let class_raw = as_class(receiver)?;
  let num_fields = class(class_raw).get().num_fields;
  let instance_raw = vm.ctx.alloc(InstanceObj::new(num_fields), Some(class_raw));
  Ok(Value::object(instance_raw))
}

fn as_class(value: Value) -> Result<RawObj> {
  value
    .as_object()
    .filter(|o| unsafe { o.as_ref() }.kind == ObjectKind::Class)
    .ok_or_else(|| runtime("Expected a class."))
}

// --- Bool / Null ---------------------------------------------------------------

fn bool_to_string(vm: &mut Vm, receiver: Value, _args: &[Value]) -> Result<Value> {
  let s = if receiver.as_bool().unwrap_or(false) { "true" } else { "false" };
  Ok(alloc_string(vm, s))
}

fn null_to_string(vm: &mut Vm, _receiver: Value, _args: &[Value]) -> Result<Value> {
  Ok(alloc_string(vm, "null"))
}

// --- Num -------------------------------------------------------------------------

fn as_num(value: Value) -> Result<f64> {
  value.as_float().ok_or_else(|| runtime("Right operand must be a number."))
}

/// Validates `value` is an integer, raising `"<arg> must be a number."`/`"<arg> must
/// be an integer."` by name.
fn validate_int_arg(value: Value, arg_name: &str) -> Result<i64> {
  let n = value.as_float().ok_or_else(|| crate::error::must_be_number(arg_name))?;
  if n.fract() != 0.0 {
    return Err(crate::error::must_be_integer(arg_name));
  }
  Ok(n as i64)
}

/// Like `validate_int_arg`, plus a `0 <= n < len` bounds check raising
/// `"<arg> out of bounds."`.
fn validate_index(value: Value, len: usize, arg_name: &str) -> Result<usize> {
  let n = validate_int_arg(value, arg_name)?;
  if n < 0 || n as usize >= len {
    return Err(crate::error::out_of_bounds(arg_name));
  }
  Ok(n as usize)
}

/// A `[]` subscript accepts a number or a range; only the "wrong type entirely" case
/// gets the dual-type wording, everything else matches `validate_index`.
fn validate_subscript(value: Value, len: usize) -> Result<usize> {
  let n = value.as_float().ok_or_else(crate::error::subscript_must_be_number_or_range)?;
  if n.fract() != 0.0 {
    return Err(crate::error::must_be_integer("Subscript"));
  }
  if n < 0.0 || n as usize >= len {
    return Err(crate::error::out_of_bounds("Subscript"));
  }
  Ok(n as usize)
}

fn as_range_opt(value: Value) -> Option<RangeObj> {
  value
    .as_object()
    .filter(|o| unsafe { o.as_ref() }.kind == ObjectKind::Range)
    .map(|raw| *unsafe { Handle::<RangeObj>::from_raw_unchecked(raw) }.get())
}

/// Null, bool, number, string, range and class all compare/hash by content
/// (`Value::eq`/`hash_value`); everything else is reference-identity-only and cannot
/// be a `Map` key.
fn is_value_type(value: Value) -> bool {
  if value.is_null() || value.is_bool() || value.as_float().is_some() {
    return true;
  }
  matches!(
    value.object_kind(),
    Some(ObjectKind::String) | Some(ObjectKind::Range) | Some(ObjectKind::Class)
  )
}

fn num_add(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  Ok(Value::float(as_num(receiver)? + as_num(args[0])?))
}
fn num_sub(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  Ok(Value::float(as_num(receiver)? - as_num(args[0])?))
}
fn num_mul(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  Ok(Value::float(as_num(receiver)? * as_num(args[0])?))
}
fn num_div(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  Ok(Value::float(as_num(receiver)? / as_num(args[0])?))
}
fn num_rem(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  Ok(Value::float(as_num(receiver)? % as_num(args[0])?))
}
fn num_pow(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  Ok(Value::float(as_num(receiver)?.powf(as_num(args[0])?)))
}
fn num_gt(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  Ok(Value::bool(as_num(receiver)? > as_num(args[0])?))
}
fn num_ge(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  Ok(Value::bool(as_num(receiver)? >= as_num(args[0])?))
}
fn num_lt(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  Ok(Value::bool(as_num(receiver)? < as_num(args[0])?))
}
fn num_le(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  Ok(Value::bool(as_num(receiver)? <= as_num(args[0])?))
}
fn num_neg(_vm: &mut Vm, receiver: Value, _args: &[Value]) -> Result<Value> {
  Ok(Value::float(-as_num(receiver)?))
}
fn num_to_string(vm: &mut Vm, receiver: Value, _args: &[Value]) -> Result<Value> {
  Ok(alloc_string(vm, format_number(as_num(receiver)?)))
}

// --- String ------------------------------------------------------------------------

fn as_string(value: Value) -> Result<Handle<StringObj>> {
  value
    .as_object()
    .filter(|o| unsafe { o.as_ref() }.kind == ObjectKind::String)
    .map(|raw| unsafe { Handle::from_raw_unchecked(raw) })
    .ok_or_else(|| runtime("Expected a string."))
}

fn alloc_string(vm: &mut Vm, s: impl Into<Box<str>>) -> Value {
  let raw = vm.ctx.alloc(StringObj::new(s), Some(vm.classes.string.raw()));
  Value::object(raw)
}

fn string_add(vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  let lhs = as_string(receiver)?;
  let rhs = args[0]
    .as_object()
    .filter(|o| unsafe { o.as_ref() }.kind == ObjectKind::String)
    .map(|raw| unsafe { Handle::<StringObj>::from_raw_unchecked(raw) })
    .ok_or_else(|| crate::error::must_be_string("Right operand"))?;
  Ok(alloc_string(vm, format!("{}{}", lhs.get().as_str(), rhs.get().as_str())))
}

fn string_length(_vm: &mut Vm, receiver: Value, _args: &[Value]) -> Result<Value> {
  Ok(Value::float(as_string(receiver)?.get().as_str().chars().count() as f64))
}

/// Walks `n` codepoints from the start, returning the byte offset the `n`th one
/// starts at.
fn codepoint_byte_offset(s: &StringObj, n: usize) -> Option<usize> {
  let mut index = 0usize;
  for _ in 0..n {
    index = s.next_index(index)?;
  }
  Some(index)
}

fn string_index(vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  let s = as_string(receiver)?;
  let char_count = s.get().as_str().chars().count();
  if let Some(range) = as_range_opt(args[0]) {
    let mut result = String::new();
    let mut cur = None;
    while let Some(n) = range.iterate(cur) {
      let i = n as i64;
      if i < 0 || i as usize >= char_count {
        return Err(crate::error::out_of_bounds("Subscript"));
      }
      let offset = codepoint_byte_offset(s.get(), i as usize).expect("bounds already checked");
      result.push_str(s.get().codepoint_at(offset).expect("bounds already checked"));
      cur = Some(n);
    }
    return Ok(alloc_string(vm, result));
  }
  let n = validate_subscript(args[0], char_count)?;
  let index = codepoint_byte_offset(s.get(), n).ok_or_else(|| crate::error::out_of_bounds("Subscript"))?;
  let ch = s.get().codepoint_at(index).ok_or_else(|| crate::error::out_of_bounds("Subscript"))?;
  Ok(alloc_string(vm, ch.to_string()))
}

fn string_iterate(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  let s = as_string(receiver)?;
  let next = match args[0].as_float() {
    None => {
      if s.get().is_empty() {
        None
      } else {
        Some(0usize)
      }
    }
    Some(n) => s.get().next_index(n as usize),
  };
  Ok(next.map(|i| Value::float(i as f64)).unwrap_or(Value::NULL))
}

fn string_iterator_value(vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  let s = as_string(receiver)?;
  let index = validate_int_arg(args[0], "Iterator")?;
  if index < 0 {
    return Err(crate::error::out_of_bounds("Iterator"));
  }
  let ch = s.get().codepoint_at(index as usize).ok_or_else(|| crate::error::out_of_bounds("Iterator"))?;
  Ok(alloc_string(vm, ch.to_string()))
}

// --- List --------------------------------------------------------------------------

fn as_list(value: Value) -> Result<Handle<ListObj>> {
  value
    .as_object()
    .filter(|o| unsafe { o.as_ref() }.kind == ObjectKind::List)
    .map(|raw| unsafe { Handle::from_raw_unchecked(raw) })
    .ok_or_else(|| runtime("Expected a list."))
}

fn list_new(vm: &mut Vm, _receiver: Value, _args: &[Value]) -> Result<Value> {
  let raw = vm.ctx.alloc(ListObj::new(), Some(vm.classes.list.raw()));
  Ok(Value::object(raw))
}

fn list_add(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  as_list(receiver)?.get_mut().push(args[0]);
  Ok(receiver)
}

fn list_length(_vm: &mut Vm, receiver: Value, _args: &[Value]) -> Result<Value> {
  Ok(Value::float(as_list(receiver)?.get().len() as f64))
}

fn list_index(vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  let list = as_list(receiver)?;
  let len = list.get().len();
  if let Some(range) = as_range_opt(args[0]) {
    let mut values = Vec::new();
    let mut cur = None;
    while let Some(n) = range.iterate(cur) {
      let i = n as i64;
      if i < 0 || i as usize >= len {
        return Err(crate::error::out_of_bounds("Subscript"));
      }
      values.push(list.get().get(i as usize).expect("bounds already checked"));
      cur = Some(n);
    }
    let raw = vm.ctx.alloc(ListObj::with_values(values), Some(vm.classes.list.raw()));
    return Ok(Value::object(raw));
  }
  let index = validate_subscript(args[0], len)?;
  Ok(list.get().get(index).expect("bounds already checked"))
}

fn list_index_set(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  let list = as_list(receiver)?;
  let index = validate_index(args[0], list.get().len(), "Index")?;
  list.get_mut().set(index, args[1]);
  Ok(args[1])
}

fn list_remove(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  let list = as_list(receiver)?;
  let index = validate_index(args[0], list.get().len(), "Index")?;
  Ok(list.get_mut().remove(index).expect("bounds already checked"))
}

fn list_iterate(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  let list = as_list(receiver)?;
  let next = match args[0].as_float() {
    None => 0usize,
    Some(n) => n as usize + 1,
  };
  Ok(if next < list.get().len() { Value::float(next as f64) } else { Value::NULL })
}

fn list_iterator_value(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  let list = as_list(receiver)?;
  let index = validate_index(args[0], list.get().len(), "Iterator")?;
  Ok(list.get().get(index).expect("bounds already checked"))
}

fn list_to_string(vm: &mut Vm, receiver: Value, _args: &[Value]) -> Result<Value> {
  let list = as_list(receiver)?;
  let mut parts = Vec::with_capacity(list.get().len());
  for v in list.get().as_slice() {
    parts.push(stringify(vm, *v)?);
  }
  Ok(alloc_string(vm, format!("[{}]", parts.join(", "))))
}

fn list_add_all(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  let other_values: Vec<Value> = as_list(args[0])?.get().as_slice().to_vec();
  as_list(receiver)?.get_mut().add_all(&ListObj::with_values(other_values));
  Ok(receiver)
}

// --- Map ---------------------------------------------------------------------------

fn as_map(value: Value) -> Result<Handle<MapObj>> {
  value
    .as_object()
    .filter(|o| unsafe { o.as_ref() }.kind == ObjectKind::Map)
    .map(|raw| unsafe { Handle::from_raw_unchecked(raw) })
    .ok_or_else(|| runtime("Expected a map."))
}

fn map_new(vm: &mut Vm, _receiver: Value, _args: &[Value]) -> Result<Value> {
  let raw = vm.ctx.alloc(MapObj::new(), Some(vm.classes.map.raw()));
  Ok(Value::object(raw))
}

fn map_index(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  Ok(as_map(receiver)?.get().get(args[0]).unwrap_or(Value::NULL))
}

fn map_index_set(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  if !is_value_type(args[0]) {
    return Err(crate::error::key_must_be_value_type());
  }
  as_map(receiver)?.get_mut().insert(args[0], args[1]);
  Ok(args[1])
}

fn map_length(_vm: &mut Vm, receiver: Value, _args: &[Value]) -> Result<Value> {
  Ok(Value::float(as_map(receiver)?.get().len() as f64))
}

fn map_contains_key(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  Ok(Value::bool(as_map(receiver)?.get().get(args[0]).is_some()))
}

fn map_remove(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  Ok(as_map(receiver)?.get_mut().remove(args[0]).unwrap_or(Value::NULL))
}

fn map_iterate(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  let map = as_map(receiver)?;
  let from = match args[0].as_float() {
    None => 0usize,
    Some(n) => n as usize + 1,
  };
  Ok(map.get().next_index(from).map(|i| Value::float(i as f64)).unwrap_or(Value::NULL))
}

fn map_iterator_value(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  let map = as_map(receiver)?;
  let index = validate_int_arg(args[0], "Iterator")?;
  if index < 0 {
    return Err(crate::error::out_of_bounds("Iterator"));
  }
  map.get().key_at(index as usize).ok_or_else(|| crate::error::out_of_bounds("Iterator"))
}

// --- Range ---------------------------------------------------------------------------

fn as_range(value: Value) -> Result<RangeObj> {
  value
    .as_object()
    .filter(|o| unsafe { o.as_ref() }.kind == ObjectKind::Range)
    .map(|raw| *unsafe { Handle::<RangeObj>::from_raw_unchecked(raw) }.get())
    .ok_or_else(|| runtime("Expected a range."))
}

fn range_new(vm: &mut Vm, _receiver: Value, args: &[Value]) -> Result<Value> {
  let from = as_num(args[0])?;
  let to = as_num(args[1])?;
  let inclusive = args[2].is_truthy();
  let raw = vm.ctx.alloc(RangeObj::new(from, to, inclusive), Some(vm.classes.range.raw()));
  Ok(Value::object(raw))
}

fn range_iterate(_vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  let range = as_range(receiver)?;
  Ok(range.iterate(args[0].as_float()).map(Value::float).unwrap_or(Value::NULL))
}

fn range_to_string(vm: &mut Vm, receiver: Value, _args: &[Value]) -> Result<Value> {
  let range = as_range(receiver)?;
  let op = if range.inclusive { "..=" } else { ".." };
  Ok(alloc_string(vm, format!("{}{op}{}", format_number(range.from), format_number(range.to))))
}

// --- Fn ------------------------------------------------------------------------------

/// `Fn.new(fn)` validates and returns its argument unchanged: a function value is
/// already a first-class `Closure`, so there is nothing to construct, only to check.
fn fn_new(_vm: &mut Vm, _receiver: Value, args: &[Value]) -> Result<Value> {
  args[0]
    .as_object()
    .filter(|o| unsafe { o.as_ref() }.kind == ObjectKind::Closure)
    .ok_or_else(|| runtime("Fn.new expects a function."))?;
  Ok(args[0])
}

fn fn_call(vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<Value> {
  let closure_raw = receiver
    .as_object()
    .filter(|o| unsafe { o.as_ref() }.kind == ObjectKind::Closure)
    .ok_or_else(|| runtime("Expected a function."))?;
  let closure = unsafe { Handle::<ClosureObj>::from_raw_unchecked(closure_raw) };
  let function = unsafe { Handle::<FunctionObj>::from_raw_unchecked(closure.get().function) };
  let arity = function.get().arity as usize;
  let mut padded = args.to_vec();
  padded.resize(arity, Value::NULL);
  crate::vm::dispatch::call_closure(vm, closure, Value::NULL, &padded)
}

// --- System --------------------------------------------------------------------------

/// Formats a value the way `print`/string interpolation observe it: primitives
/// directly, containers recursively, everything else via a `toString()` dispatch so
/// user overrides are honored (spec.md §4.2).
pub fn stringify(vm: &mut Vm, value: Value) -> Result<String> {
  if value.is_null() {
    return Ok("null".to_string());
  }
  if let Some(b) = value.as_bool() {
    return Ok(if b { "true".to_string() } else { "false".to_string() });
  }
  if let Some(n) = value.as_float() {
    return Ok(format_number(n));
  }
  let symbol = vm.ctx.method_names_ensure("toString()");
  let result = vm.call_method(value, symbol, &[])?;
  let s = as_string(result)?;
  Ok(s.get().as_str().to_string())
}

fn system_print0(vm: &mut Vm, _receiver: Value, _args: &[Value]) -> Result<Value> {
  writeln!(vm.stdout).ok();
  Ok(Value::NULL)
}

fn system_print1(vm: &mut Vm, _receiver: Value, args: &[Value]) -> Result<Value> {
  let line = stringify(vm, args[0])?;
  writeln!(vm.stdout, "{line}").ok();
  Ok(args[0])
}

fn system_write(vm: &mut Vm, _receiver: Value, args: &[Value]) -> Result<Value> {
  let text = stringify(vm, args[0])?;
  write!(vm.stdout, "{text}").ok();
  Ok(args[0])
}
