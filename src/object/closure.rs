//! The `Closure` object: a `Function` paired with the upvalues it captured.

use crate::heap::{RawObj, Trace};
use crate::object::upvalue::UpvalueObj;
use crate::object::ObjectKind;
use crate::object::Handle;

pub struct ClosureObj {
  pub function: RawObj,
  pub upvalues: Box<[Handle<UpvalueObj>]>,
}

impl ClosureObj {
  pub fn new(function: RawObj, upvalues: Box<[Handle<UpvalueObj>]>) -> Self {
    ClosureObj { function, upvalues }
  }
}

impl Trace for ClosureObj {
  const KIND: ObjectKind = ObjectKind::Closure;
  fn trace(&self, mark: &mut dyn FnMut(RawObj)) {
    mark(self.function);
    for up in self.upvalues.iter() {
      mark(up.raw());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::object::function::FunctionObj;
  use crate::object::upvalue::UpvalueObj;
  use crate::value::Value;
  use crate::vm::{Config, Vm};

  fn dummy_function(vm: &Vm) -> RawObj {
    vm.ctx.alloc(
      FunctionObj {
        name: "f".into(),
        arity: 0,
        upvalue_count: 1,
        code: Box::new([]),
        constants: Box::new([]),
        lines: Box::new([]),
        module: None,
        source_path: "<test>".into(),
        max_stack: 0,
      },
      Some(vm.classes.fn_.raw()),
    )
  }

  #[test]
  fn trace_marks_the_function_and_every_upvalue() {
    let vm = Vm::new(Config::default());
    let function = dummy_function(&vm);
    let up_raw = vm.ctx.alloc(UpvalueObj::Closed(Value::bool(true)), None);
    let up = unsafe { Handle::from_raw_unchecked(up_raw) };
    let closure = ClosureObj::new(function, Box::new([up]));

    let mut marked = vec![];
    closure.trace(&mut |raw| marked.push(raw));
    assert_eq!(marked, vec![function, up_raw]);
  }
}
