//! The slot API (spec.md §4.7): a small window of values the host reads and writes by
//! index, used both to drive a `Slots::call` from outside the VM and to hand arguments
//! to a registered foreign method.
//!
//! Grounded on the teacher's `public.rs::Scope::param`/`param`-style typed accessors,
//! but kept as a flat indexable window (rather than a `'cx`-bound `Value<'cx>`) since
//! spec.md §6 specifies the slot API itself as the embedding surface, not a richer
//! value wrapper.

use crate::error::{runtime, Result};
use crate::heap::RawObj;
use crate::object::list::ListObj;
use crate::object::map::MapObj;
use crate::object::string::StringObj;
use crate::object::{Handle as ObjHandle, ObjectKind};
use crate::public::handle::{CallHandle, Handle};
use crate::value::Value;
use crate::vm::Vm;

pub struct Slots<'vm> {
  vm: &'vm mut Vm,
  values: Vec<Value>,
}

impl<'vm> Slots<'vm> {
  /// A fresh window for a host-driven call, starting with one null slot (slot 0, the
  /// eventual receiver/return value).
  pub fn new(vm: &'vm mut Vm) -> Self {
    Slots {
      vm,
      values: vec![Value::NULL],
    }
  }

  pub(crate) fn for_call(vm: &'vm mut Vm, receiver: Value, args: &[Value]) -> Self {
    let mut values = Vec::with_capacity(1 + args.len());
    values.push(receiver);
    values.extend_from_slice(args);
    Slots { vm, values }
  }

  pub(crate) fn into_result(self) -> Value {
    self.values[0]
  }

  pub fn vm(&mut self) -> &mut Vm {
    self.vm
  }

  pub fn slot_count(&self) -> usize {
    self.values.len()
  }

  pub fn set_slot_count(&mut self, n: usize) {
    self.values.resize(n.max(1), Value::NULL);
  }

  fn slot(&self, index: usize) -> Value {
    self.values[index]
  }

  pub fn get_bool(&self, slot: usize) -> Option<bool> {
    self.slot(slot).as_bool()
  }

  pub fn get_double(&self, slot: usize) -> Option<f64> {
    self.slot(slot).as_float()
  }

  pub fn get_string(&self, slot: usize) -> Option<&str> {
    object_of::<StringObj>(self.slot(slot), ObjectKind::String).map(|s| s.as_str())
  }

  /// Alias for `get_string`: the language's `String` object is UTF-8 only, so there is
  /// no separate binary-safe representation to back a literal `getSlotBytes`.
  pub fn get_bytes(&self, slot: usize) -> Option<&[u8]> {
    self.get_string(slot).map(str::as_bytes)
  }

  pub fn get_handle(&self, slot: usize) -> Handle {
    Handle::new(self.vm.ctx.clone(), self.slot(slot))
  }

  pub fn set_null(&mut self, slot: usize) {
    self.values[slot] = Value::NULL;
  }

  pub fn set_bool(&mut self, slot: usize, value: bool) {
    self.values[slot] = Value::bool(value);
  }

  pub fn set_double(&mut self, slot: usize, value: f64) {
    self.values[slot] = Value::float(value);
  }

  pub fn set_string(&mut self, slot: usize, value: &str) {
    let raw = self.vm.ctx.alloc(StringObj::new(value), Some(self.vm.classes.string.raw()));
    self.values[slot] = Value::object(raw);
  }

  pub fn set_bytes(&mut self, slot: usize, value: &[u8]) -> Result<()> {
    let s = std::str::from_utf8(value).map_err(|_| runtime("setSlotBytes requires valid UTF-8."))?;
    self.set_string(slot, s);
    Ok(())
  }

  pub fn set_new_list(&mut self, slot: usize) {
    let raw = self.vm.ctx.alloc(ListObj::new(), Some(self.vm.classes.list.raw()));
    self.values[slot] = Value::object(raw);
  }

  pub fn set_new_map(&mut self, slot: usize) {
    let raw = self.vm.ctx.alloc(MapObj::new(), Some(self.vm.classes.map.raw()));
    self.values[slot] = Value::object(raw);
  }

  pub fn set_handle(&mut self, slot: usize, handle: &Handle) {
    self.values[slot] = handle.value();
  }

  pub fn copy_slot(&mut self, from: usize, to: usize) {
    self.values[to] = self.values[from];
  }

  /// Invokes `handle` with slot 0 as receiver and the remaining slots as arguments,
  /// truncating the window to just slot 0 (the result) on success — spec.md §4.7
  /// `call(fiber, handle)`. Skips the teacher's literal `CALL_n; RETURN; END` stub:
  /// `Vm::call_method` already provides the direct dispatch path a stub would compile
  /// down to.
  pub fn call(&mut self, handle: &CallHandle) -> Result<()> {
    let receiver = self.values[0];
    let args = self.values[1..].to_vec();
    let result = self.vm.call_method(receiver, handle.symbol, &args)?;
    self.values.truncate(1);
    self.values[0] = result;
    Ok(())
  }

  /// Reads `slot` as the error message and builds the `Err` a foreign method should
  /// return to abort its fiber (spec.md §4.7 `abortFiber`). Returning `Err` from a
  /// foreign closure already drives the same `callerIsTrying` recovery path a runtime
  /// error does, so there is no separate VM-level abort call to make.
  pub fn abort(&self, slot: usize) -> crate::error::Error {
    let message = self.get_string(slot).unwrap_or("(non-string error)").to_string();
    runtime(message)
  }
}

fn object_of<T: crate::heap::Trace>(value: Value, kind: ObjectKind) -> Option<ObjHandle<T>> {
  let obj: RawObj = value.as_object()?;
  (unsafe { obj.as_ref() }.kind == kind).then(|| unsafe { ObjHandle::from_raw_unchecked(obj) })
}
