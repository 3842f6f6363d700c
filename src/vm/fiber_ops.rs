//! Fiber control operations bound onto `Fiber`/`Fiber metaclass` by `builtins.rs`
//! (spec.md §4.5).
//!
//! Each of these runs on the interpreter's own call stack rather than recursing: a
//! `call`/`run`/`try` just reassigns `vm.current_fiber` and returns `Switched`, and
//! `vm::dispatch::step`'s `CALL` handling sees that and simply lets the main loop
//! continue decoding whichever fiber is current now. `yield` is symmetric, switching
//! back to the caller. Only the *creation* of a fiber (`Fiber.new`) and read-only
//! queries (`isDone`, `error`, `current`) produce an ordinary value.

use crate::error::{runtime, Result};
use crate::object::fiber::{FiberObj, FiberState};
use crate::object::{Handle, ObjectKind};
use crate::value::Value;
use crate::vm::Vm;

pub enum FiberOutcome {
  Value(Value),
  /// `vm.current_fiber` has already been reassigned; the caller must not push
  /// anything onto the stack itself.
  Switched,
}

fn as_fiber(value: Value) -> Result<Handle<FiberObj>> {
  value
    .as_object()
    .filter(|o| unsafe { o.as_ref() }.kind == ObjectKind::Fiber)
    .map(|raw| unsafe { Handle::from_raw_unchecked(raw) })
    .ok_or_else(|| runtime("Expected a fiber."))
}

pub fn new(vm: &mut Vm, _receiver: Value, args: &[Value]) -> Result<FiberOutcome> {
  let closure_raw = args
    .first()
    .and_then(|v| v.as_object())
    .filter(|o| unsafe { o.as_ref() }.kind == ObjectKind::Closure)
    .ok_or_else(|| runtime("Fiber.new expects a function."))?;
  let fiber_raw = vm.ctx.alloc(FiberObj::new(closure_raw), Some(vm.classes.fiber.raw()));
  Ok(FiberOutcome::Value(Value::object(fiber_raw)))
}

fn switch_into(vm: &mut Vm, target: Handle<FiberObj>, arg: Option<Value>, is_try: bool) -> Result<FiberOutcome> {
  if target.get().is_done() {
    return Err(runtime("Cannot call a finished fiber."));
  }
  if target.get().state == FiberState::Running {
    return Err(runtime("Cannot call a fiber that is already running."));
  }
  target.get_mut().caller = Some(vm.current_fiber);
  target.get_mut().caller_is_trying = is_try;
  target.get_mut().state = FiberState::Running;
  if let Some(v) = arg {
    target.get_mut().push(v);
  }
  vm.set_current_fiber(target.raw());
  Ok(FiberOutcome::Switched)
}

/// Like `switch_into`, but for a coroutine transfer rather than a call: `target.caller`
/// is left as whatever it already was, so a later `yield` from `target` returns to its
/// original caller (if any), not to whoever happened to `run` it.
fn transfer_into(vm: &mut Vm, target: Handle<FiberObj>, arg: Option<Value>) -> Result<FiberOutcome> {
  if target.get().is_done() {
    return Err(runtime("Cannot run a finished fiber."));
  }
  if target.get().state == FiberState::Running {
    return Err(runtime("Cannot run a fiber that is already running."));
  }
  target.get_mut().state = FiberState::Running;
  if let Some(v) = arg {
    target.get_mut().push(v);
  }
  vm.set_current_fiber(target.raw());
  Ok(FiberOutcome::Switched)
}

pub fn call0(vm: &mut Vm, receiver: Value, _args: &[Value]) -> Result<FiberOutcome> {
  let target = as_fiber(receiver)?;
  switch_into(vm, target, None, false)
}

pub fn call1(vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<FiberOutcome> {
  let target = as_fiber(receiver)?;
  switch_into(vm, target, Some(args[0]), false)
}

pub fn run0(vm: &mut Vm, receiver: Value, _args: &[Value]) -> Result<FiberOutcome> {
  let target = as_fiber(receiver)?;
  transfer_into(vm, target, None)
}

pub fn run1(vm: &mut Vm, receiver: Value, args: &[Value]) -> Result<FiberOutcome> {
  let target = as_fiber(receiver)?;
  transfer_into(vm, target, Some(args[0]))
}

pub fn try0(vm: &mut Vm, receiver: Value, _args: &[Value]) -> Result<FiberOutcome> {
  let target = as_fiber(receiver)?;
  switch_into(vm, target, None, true)
}

fn do_yield(vm: &mut Vm, value: Option<Value>) -> Result<FiberOutcome> {
  let current = vm.current_fiber();
  let caller = current.get_mut().caller.take();
  match caller {
    None => Err(runtime("Cannot yield from the root fiber.")),
    Some(caller_raw) => {
      current.get_mut().state = FiberState::Suspended;
      vm.set_current_fiber(caller_raw);
      let caller_h = vm.current_fiber();
      caller_h.get_mut().push(value.unwrap_or(Value::NULL));
      Ok(FiberOutcome::Switched)
    }
  }
}

pub fn yield0(vm: &mut Vm, _receiver: Value, _args: &[Value]) -> Result<FiberOutcome> {
  do_yield(vm, None)
}

pub fn yield1(vm: &mut Vm, _receiver: Value, args: &[Value]) -> Result<FiberOutcome> {
  do_yield(vm, Some(args[0]))
}

pub fn current(vm: &mut Vm, _receiver: Value, _args: &[Value]) -> Result<FiberOutcome> {
  Ok(FiberOutcome::Value(Value::object(vm.current_fiber)))
}

pub fn is_done(_vm: &mut Vm, receiver: Value, _args: &[Value]) -> Result<FiberOutcome> {
  let fiber = as_fiber(receiver)?;
  Ok(FiberOutcome::Value(Value::bool(fiber.get().is_done())))
}

pub fn error_getter(_vm: &mut Vm, receiver: Value, _args: &[Value]) -> Result<FiberOutcome> {
  let fiber = as_fiber(receiver)?;
  Ok(FiberOutcome::Value(fiber.get().error.unwrap_or(Value::NULL)))
}

/// Aborts the current fiber with `args[0]` as the error payload, propagated like any
/// other runtime error (spec.md §4.5: `Fiber.abort`, caught by an ancestor's `try`).
pub fn abort(vm: &mut Vm, _receiver: Value, args: &[Value]) -> Result<FiberOutcome> {
  let message = match args.first().and_then(|v| v.as_object()) {
    Some(obj) if unsafe { obj.as_ref() }.kind == ObjectKind::String => {
      let s = unsafe { Handle::<crate::object::string::StringObj>::from_raw_unchecked(obj) };
      s.get().as_str().to_string()
    }
    _ => "Fiber aborted.".to_string(),
  };
  let _ = vm;
  Err(runtime(message))
}
