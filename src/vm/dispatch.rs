//! The decode/execute loop (spec.md §4.4).
//!
//! One instruction is handled per `step`; `run` drives `step` until the root-most
//! fiber (the one with no caller) finishes, recovering from errors along the way by
//! walking the caller chain for a `try`-invoked ancestor (spec.md §4.5/§7). Ordinary
//! (non-fiber) method calls on a block recurse into `step` from `call_closure` so the
//! Rust call stack mirrors the script call stack one level per nested call — fiber
//! switches are handled without recursion by simply changing which fiber `step` reads
//! its next instruction from.

use crate::error::{Error, Result};
use crate::object::class::Method;
use crate::object::closure::ClosureObj;
use crate::object::fiber::{FiberObj, FiberState};
use crate::object::function::FunctionObj;
use crate::object::instance::InstanceObj;
use crate::object::upvalue::UpvalueObj;
use crate::object::Handle;
use crate::opcode::{Instruction, JumpTarget, UpvalueSource};
use crate::symbol::SymbolId;
use crate::value::Value;
use crate::vm::{class_ops, fiber_ops, module_loader, Vm};

enum StepOutcome {
  Continue,
  /// The root fiber (no caller) has returned; execution is over.
  Done(Value),
}

pub fn run(vm: &mut Vm) -> Result<Value> {
  loop {
    match step(vm) {
      Ok(StepOutcome::Continue) => continue,
      Ok(StepOutcome::Done(value)) => return Ok(value),
      Err(e) => {
        if let Some(e) = recover_or_propagate(vm, e) {
          return Err(e);
        }
      }
    }
  }
}

/// On error, marks the current fiber done and walks its caller chain looking for one
/// that invoked it via `try` (spec.md §4.5: `callerIsTrying`). Returns `None` if some
/// ancestor caught it (execution should continue from there), `Some(error)` if it
/// reached the root fiber uncaught.
fn recover_or_propagate(vm: &mut Vm, error: Error) -> Option<Error> {
  let message_value = error_to_value(vm, &error);
  let mut current = vm.current_fiber();
  loop {
    current.get_mut().state = FiberState::Done;
    current.get_mut().error = Some(message_value);
    let caller = current.get_mut().caller.take();
    let was_trying = current.get().caller_is_trying;
    match caller {
      None => return Some(error),
      Some(caller_raw) => {
        if was_trying {
          vm.set_current_fiber(caller_raw);
          let caller_h = vm.current_fiber();
          caller_h.get_mut().push(message_value);
          return None;
        }
        current = unsafe { Handle::from_raw_unchecked(caller_raw) };
      }
    }
  }
}

fn error_to_value(vm: &mut Vm, error: &Error) -> Value {
  let text = error.to_string();
  let obj = vm.ctx.alloc(
    crate::object::string::StringObj::new(text),
    Some(vm.classes.string.raw()),
  );
  Value::object(obj)
}

/// Runs a block method synchronously from Rust code (the generic `CALL`/`SUPER`
/// handler, and any builtin that needs to invoke a script callback, e.g. `List.sort`).
pub fn call_closure(vm: &mut Vm, closure: Handle<ClosureObj>, receiver: Value, args: &[Value]) -> Result<Value> {
  let fiber_raw = vm.current_fiber;
  let fiber = vm.current_fiber();
  fiber.get_mut().push(receiver);
  for a in args {
    fiber.get_mut().push(*a);
  }
  let stack_start = fiber.get().stack.len() - 1 - args.len();
  fiber.get_mut().push_frame(closure.raw(), stack_start)?;
  let target_depth = fiber.get().frames.len() - 1;
  loop {
    let at_target = vm.current_fiber == fiber_raw
      && unsafe { Handle::<FiberObj>::from_raw_unchecked(fiber_raw) }
        .get()
        .frames
        .len()
        <= target_depth;
    if at_target {
      break;
    }
    match step(vm) {
      Ok(StepOutcome::Continue) => {}
      Ok(StepOutcome::Done(_)) => break,
      Err(e) => {
        if let Some(e) = recover_or_propagate(vm, e) {
          return Err(e);
        }
      }
    }
  }
  let result_fiber = unsafe { Handle::<FiberObj>::from_raw_unchecked(fiber_raw) };
  Ok(result_fiber.get_mut().pop())
}

fn current_function(vm: &Vm) -> (Handle<FiberObj>, Handle<ClosureObj>, Handle<FunctionObj>, usize, usize) {
  let fiber = vm.current_fiber();
  let (closure_raw, ip, stack_start) = {
    let frame = fiber.get().current_frame();
    (frame.closure, frame.ip, frame.stack_start)
  };
  let closure = unsafe { Handle::<ClosureObj>::from_raw_unchecked(closure_raw) };
  let function = unsafe { Handle::<FunctionObj>::from_raw_unchecked(closure.get().function) };
  (fiber, closure, function, ip, stack_start)
}

fn step(vm: &mut Vm) -> Result<StepOutcome> {
  let (fiber, closure, function, ip, stack_start) = current_function(vm);
  let instruction = function.get().code[ip].clone();
  fiber.get_mut().current_frame_mut().ip += 1;

  match instruction {
    Instruction::Constant(id) => fiber.get_mut().push(function.get().constant(id.0).to_value()),
    Instruction::Null => fiber.get_mut().push(Value::NULL),
    Instruction::False => fiber.get_mut().push(Value::FALSE),
    Instruction::True => fiber.get_mut().push(Value::TRUE),
    Instruction::LoadLocal(index) => {
      let v = fiber.get().stack[stack_start + index as usize];
      fiber.get_mut().push(v);
    }
    Instruction::StoreLocal(index) => {
      let v = *fiber.get().stack.last().expect("store with empty stack");
      fiber.get_mut().stack[stack_start + index as usize] = v;
    }
    Instruction::LoadUpvalue(index) => {
      let up = closure.get().upvalues[index as usize];
      fiber.get_mut().push(read_upvalue(vm, up));
    }
    Instruction::StoreUpvalue(index) => {
      let v = *fiber.get().stack.last().expect("store with empty stack");
      let up = closure.get().upvalues[index as usize];
      write_upvalue(vm, up, v);
    }
    Instruction::LoadModuleVar(index) => {
      let module = unsafe { Handle::<crate::object::module::ModuleObj>::from_raw_unchecked(function.get().module.expect("function has no module")) };
      let v = module.get().variable(SymbolId(index as u32)).unwrap_or(Value::NULL);
      fiber.get_mut().push(v);
    }
    Instruction::StoreModuleVar(index) => {
      let v = *fiber.get().stack.last().expect("store with empty stack");
      let module = unsafe { Handle::<crate::object::module::ModuleObj>::from_raw_unchecked(function.get().module.expect("function has no module")) };
      module.get_mut().set_variable(SymbolId(index as u32), v);
    }
    Instruction::LoadFieldThis(field) => {
      let this = fiber.get().stack[stack_start];
      fiber.get_mut().push(instance_field(this, field));
    }
    Instruction::StoreFieldThis(field) => {
      let v = *fiber.get().stack.last().expect("store with empty stack");
      let this = fiber.get().stack[stack_start];
      set_instance_field(this, field, v);
    }
    Instruction::LoadField(field) => {
      // `this` reached through an upvalue capture, by the convention that a method's
      // nested block always captures it as upvalue 0.
      let up = closure.get().upvalues[0];
      let this = read_upvalue(vm, up);
      fiber.get_mut().push(instance_field(this, field));
    }
    Instruction::StoreField(field) => {
      let v = *fiber.get().stack.last().expect("store with empty stack");
      let up = closure.get().upvalues[0];
      let this = read_upvalue(vm, up);
      set_instance_field(this, field, v);
    }
    Instruction::Pop => {
      fiber.get_mut().pop();
    }
    Instruction::Dup => {
      let v = *fiber.get().stack.last().expect("dup with empty stack");
      fiber.get_mut().push(v);
    }
    Instruction::Call { symbol, arg_count } => {
      do_call(vm, symbol, arg_count as usize, None)?;
    }
    Instruction::Super { symbol, arg_count, superclass } => {
      let superclass_value = function.get().constant(superclass.0).to_value();
      let superclass_raw = superclass_value.as_object().expect("super constant must be a class");
      do_call(vm, symbol, arg_count as usize, Some(superclass_raw))?;
    }
    Instruction::Jump(target) => jump_to(vm, target),
    Instruction::Loop(target) => jump_to(vm, target),
    Instruction::JumpIfFalse(target) => {
      let v = fiber.get_mut().pop();
      if !v.is_truthy() {
        jump_to(vm, target);
      }
    }
    Instruction::And(target) => {
      let v = *fiber.get().stack.last().expect("and with empty stack");
      if !v.is_truthy() {
        jump_to(vm, target);
      } else {
        fiber.get_mut().pop();
      }
    }
    Instruction::Or(target) => {
      let v = *fiber.get().stack.last().expect("or with empty stack");
      if v.is_truthy() {
        jump_to(vm, target);
      } else {
        fiber.get_mut().pop();
      }
    }
    Instruction::Class { name, num_fields, has_superclass } => {
      let name_value = function.get().constant(name.0).to_value();
      let name_obj = unsafe { Handle::<crate::object::string::StringObj>::from_raw_unchecked(name_value.as_object().unwrap()) };
      let superclass = if has_superclass {
        let v = fiber.get_mut().pop();
        Some(class_ops::resolve_superclass(v)?)
      } else {
        Some(vm.classes.object.raw())
      };
      let class_raw = class_ops::create_class(vm, name_obj.get().as_str(), superclass, num_fields as usize)?;
      fiber.get_mut().push(Value::object(class_raw));
    }
    Instruction::MethodInstance(symbol) => bind_method_from_stack(vm, symbol)?,
    Instruction::MethodStatic(symbol) => bind_static_method_from_stack(vm, symbol)?,
    Instruction::Closure { function: fn_id, upvalues } => {
      let fn_value = function.get().constant(fn_id.0).to_value();
      let fn_raw = fn_value.as_object().expect("CLOSURE constant must be a function");
      let mut built = Vec::with_capacity(upvalues.len());
      for source in upvalues.iter() {
        let up = match *source {
          UpvalueSource::Local(index) => {
            let abs_index = stack_start + index as usize;
            fiber.get_mut().find_or_open_upvalue(fiber.raw(), abs_index, || {
              let raw = vm.ctx.alloc(UpvalueObj::open(fiber.raw(), abs_index), None);
              unsafe { Handle::from_raw_unchecked(raw) }
            })
          }
          UpvalueSource::Upvalue(index) => closure.get().upvalues[index as usize],
        };
        built.push(up);
      }
      let closure_obj = ClosureObj::new(fn_raw, built.into_boxed_slice());
      let raw = vm.ctx.alloc(closure_obj, Some(vm.classes.fn_.raw()));
      fiber.get_mut().push(Value::object(raw));
    }
    Instruction::LoadModule(name) => {
      let name_value = function.get().constant(name.0).to_value();
      let name_obj = unsafe { Handle::<crate::object::string::StringObj>::from_raw_unchecked(name_value.as_object().unwrap()) };
      module_loader::load_module(vm, name_obj.get().as_str())?;
    }
    Instruction::ImportVariable(name) => {
      let name_value = function.get().constant(name.0).to_value();
      let name_obj = unsafe { Handle::<crate::object::string::StringObj>::from_raw_unchecked(name_value.as_object().unwrap()) };
      let v = module_loader::import_variable(vm, name_obj.get().as_str())?;
      fiber.get_mut().push(v);
    }
    Instruction::CloseUpvalue => {
      let from = fiber.get().stack.len() - 1;
      fiber.get_mut().close_upvalues_from(from);
      fiber.get_mut().pop();
    }
    Instruction::Return => {
      let value = fiber.get_mut().pop();
      fiber.get_mut().close_upvalues_from(stack_start);
      fiber.get_mut().stack.truncate(stack_start);
      fiber.get_mut().pop_frame();
      if fiber.get().frames.is_empty() {
        let caller = fiber.get_mut().caller.take();
        fiber.get_mut().state = FiberState::Done;
        match caller {
          None => return Ok(StepOutcome::Done(value)),
          Some(caller_raw) => {
            vm.set_current_fiber(caller_raw);
            let caller_h = vm.current_fiber();
            caller_h.get_mut().push(value);
          }
        }
      } else {
        fiber.get_mut().push(value);
      }
    }
    Instruction::Is => {
      let class_value = fiber.get_mut().pop();
      let value = fiber.get_mut().pop();
      let class_raw = class_value
        .as_object()
        .filter(|o| unsafe { o.as_ref() }.kind == crate::object::ObjectKind::Class)
        .ok_or_else(crate::error::right_operand_must_be_class)?;
      fiber.get_mut().push(Value::bool(is_instance_of(vm, value, class_raw)));
    }
    Instruction::End => {
      let value = fiber.get().stack.last().copied().unwrap_or(Value::NULL);
      return Ok(StepOutcome::Done(value));
    }
  }
  Ok(StepOutcome::Continue)
}

fn jump_to(vm: &Vm, target: JumpTarget) {
  let fiber = vm.current_fiber();
  fiber.get_mut().current_frame_mut().ip = target.0 as usize;
}

fn read_upvalue(_vm: &Vm, up: Handle<UpvalueObj>) -> Value {
  match &*up.get() {
    UpvalueObj::Open(fiber_raw, index) => {
      let fiber = unsafe { Handle::<FiberObj>::from_raw_unchecked(*fiber_raw) };
      fiber.get().stack[*index]
    }
    UpvalueObj::Closed(value) => *value,
  }
}

fn write_upvalue(_vm: &Vm, up: Handle<UpvalueObj>, value: Value) {
  match &mut *up.get_mut() {
    UpvalueObj::Open(fiber_raw, index) => {
      let fiber = unsafe { Handle::<FiberObj>::from_raw_unchecked(*fiber_raw) };
      fiber.get_mut().stack[*index] = value;
    }
    UpvalueObj::Closed(slot) => *slot = value,
  }
}

fn instance_field(value: Value, field: u8) -> Value {
  let obj = value.as_object().expect("field access on non-object");
  let instance = unsafe { Handle::<InstanceObj>::from_raw_unchecked(obj) };
  instance.get().field(field as usize)
}

fn set_instance_field(value: Value, field: u8, new_value: Value) {
  let obj = value.as_object().expect("field access on non-object");
  let instance = unsafe { Handle::<InstanceObj>::from_raw_unchecked(obj) };
  instance.get_mut().set_field(field as usize, new_value);
}

fn do_call(vm: &mut Vm, symbol: u16, arg_count: usize, explicit_class: Option<crate::heap::RawObj>) -> Result<()> {
  let fiber = vm.current_fiber();
  let base = fiber.get().stack.len() - 1 - arg_count;
  let receiver = fiber.get().stack[base];
  let args: Vec<Value> = fiber.get().stack[base + 1..].to_vec();
  let symbol_id = SymbolId(symbol as u32);
  let class_raw = explicit_class.unwrap_or_else(|| vm.class_of(receiver));
  let method = class_ops::lookup(class_raw, symbol_id);

  if let Some(Method::Fiber(f)) = method {
    match f(vm, receiver, &args)? {
      fiber_ops::FiberOutcome::Value(v) => {
        let fiber = vm.current_fiber();
        fiber.get_mut().stack.truncate(base);
        fiber.get_mut().push(v);
      }
      fiber_ops::FiberOutcome::Switched => {
        fiber.get_mut().stack.truncate(base);
      }
    }
    return Ok(());
  }

  let value = class_ops::invoke(vm, class_raw, method, receiver, symbol_id, &args)?;
  let fiber = vm.current_fiber();
  fiber.get_mut().stack.truncate(base);
  fiber.get_mut().push(value);
  Ok(())
}

fn bind_method_from_stack(vm: &mut Vm, symbol: u16) -> Result<()> {
  let fiber = vm.current_fiber();
  let method_value = fiber.get_mut().pop();
  let class_value = *fiber.get().stack.last().expect("CLASS must precede METHOD_INSTANCE");
  let class_raw = class_value.as_object().expect("method target must be a class");
  let closure_raw = method_value.as_object().expect("method body must be a closure");
  let closure = unsafe { Handle::<ClosureObj>::from_raw_unchecked(closure_raw) };
  class_ops::bind_method(vm, class_raw, SymbolId(symbol as u32), Method::Block(closure));
  Ok(())
}

fn bind_static_method_from_stack(vm: &mut Vm, symbol: u16) -> Result<()> {
  let fiber = vm.current_fiber();
  let method_value = fiber.get_mut().pop();
  let class_value = *fiber.get().stack.last().expect("CLASS must precede METHOD_STATIC");
  let class_raw = class_value.as_object().expect("method target must be a class");
  let metaclass_raw = unsafe { class_raw.as_ref() }.class.get().expect("class missing metaclass");
  let closure_raw = method_value.as_object().expect("method body must be a closure");
  let closure = unsafe { Handle::<ClosureObj>::from_raw_unchecked(closure_raw) };
  class_ops::bind_method(vm, metaclass_raw, SymbolId(symbol as u32), Method::Block(closure));
  Ok(())
}

/// Steps the interpreter until `target` is the current fiber again (used when a
/// synchronous caller, e.g. `Vm::call_method`, invokes a fiber op directly rather than
/// through the normal `CALL` hot path). Returns the value sitting on top of its stack,
/// which is exactly what a resumed `call`/`run`/`try` pushes there.
pub fn drain_until_fiber_current(vm: &mut Vm, target: crate::heap::RawObj) -> Result<Value> {
  loop {
    if vm.current_fiber == target {
      let fiber = vm.current_fiber();
      return Ok(fiber.get_mut().pop());
    }
    match step(vm) {
      Ok(StepOutcome::Continue) => {}
      Ok(StepOutcome::Done(_)) => {
        if vm.current_fiber == target {
          let fiber = vm.current_fiber();
          return Ok(fiber.get_mut().pop());
        }
      }
      Err(e) => {
        if let Some(e) = recover_or_propagate(vm, e) {
          return Err(e);
        }
      }
    }
  }
}

fn is_instance_of(vm: &Vm, value: Value, class_raw: crate::heap::RawObj) -> bool {
  let mut current = Some(vm.class_of(value));
  while let Some(c) = current {
    if c == class_raw {
      return true;
    }
    current = unsafe { Handle::<crate::object::class::ClassObj>::from_raw_unchecked(c) }.get().superclass;
  }
  false
}
