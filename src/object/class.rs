//! The `Class` object: name, optional superclass, field count, and a dense method
//! vector indexed by global method-symbol id.
//!
//! Every class is itself an object whose `Header.class` points at its metaclass (also
//! a `ClassObj`) — the same field used to find an *instance's* class does double duty
//! here, so no separate metaclass pointer is needed. A metaclass's superclass is always
//! the root `Class` class, never the instance-superclass's metaclass, which is what
//! keeps statics from forming a parallel inheritance hierarchy (spec.md §4.3).
//!
//! Grounded on `value/object/class.rs::{Class, ClassSuperProxy, Method}`.

use std::rc::Rc;

use crate::heap::{RawObj, Trace};
use crate::object::closure::ClosureObj;
use crate::object::{Handle, ObjectKind};
use crate::symbol::SymbolId;
use crate::value::Value;

pub type PrimitiveFn = fn(&mut crate::vm::Vm, Value, &[Value]) -> crate::error::Result<Value>;
/// Host-registered native methods (embedding API `bindForeignMethodFn`). Same calling
/// convention as [`PrimitiveFn`] but boxed, since host closures may capture state;
/// `public::slots` translates the slot-window surface the embedding API promises
/// (spec.md §6) to/from this representation at registration time.
pub type ForeignFn = Rc<dyn Fn(&mut crate::vm::Vm, Value, &[Value]) -> crate::error::Result<Value>>;
/// Fiber control operations (`new`/`call`/`run`/`try`/`yield`/...) get their own
/// calling convention because, unlike an ordinary method, they may switch which fiber
/// the interpreter loop is currently decoding instead of simply returning a value
/// (spec.md §4.5). See `vm::fiber_ops::FiberOutcome`.
pub type FiberPrimitiveFn = fn(&mut crate::vm::Vm, Value, &[Value]) -> crate::error::Result<crate::vm::fiber_ops::FiberOutcome>;

#[derive(Clone)]
pub enum Method {
  Primitive(PrimitiveFn),
  Foreign(ForeignFn),
  Block(Handle<ClosureObj>),
  Fiber(FiberPrimitiveFn),
}

pub struct ClassObj {
  pub name: Box<str>,
  pub superclass: Option<RawObj>,
  pub num_fields: usize,
  methods: Vec<Option<Method>>,
  /// Core types (Class, Fiber, Fn, List, Map, Range, String) cannot be subclassed.
  pub is_sealed: bool,
}

impl ClassObj {
  pub fn new(name: impl Into<Box<str>>, superclass: Option<RawObj>, num_fields: usize) -> Self {
    ClassObj {
      name: name.into(),
      superclass,
      num_fields,
      methods: Vec::new(),
      is_sealed: false,
    }
  }

  pub fn sealed(mut self) -> Self {
    self.is_sealed = true;
    self
  }

  pub fn method(&self, symbol: SymbolId) -> Option<&Method> {
    self.methods.get(symbol.index())?.as_ref()
  }

  pub fn bind(&mut self, symbol: SymbolId, method: Method) {
    let index = symbol.index();
    if index >= self.methods.len() {
      self.methods.resize(index + 1, None);
    }
    self.methods[index] = Some(method);
  }

  /// Copies every bound method from `superclass`'s table, the starting point for a new
  /// subclass before its own `METHOD_INSTANCE`/`METHOD_STATIC` opcodes run.
  pub fn inherit_methods_from(&mut self, superclass: &ClassObj) {
    self.methods = superclass.methods.clone();
  }
}

impl Trace for ClassObj {
  const KIND: ObjectKind = ObjectKind::Class;
  fn trace(&self, mark: &mut dyn FnMut(RawObj)) {
    if let Some(superclass) = self.superclass {
      mark(superclass);
    }
    for method in self.methods.iter().flatten() {
      if let Method::Block(closure) = method {
        mark(closure.raw());
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn dummy(_vm: &mut crate::vm::Vm, receiver: Value, _args: &[Value]) -> crate::error::Result<Value> {
    Ok(receiver)
  }

  #[test]
  fn bind_grows_the_method_vector_to_fit_high_symbol_ids() {
    let mut class = ClassObj::new("Thing", None, 0);
    assert!(class.method(SymbolId(3)).is_none());
    class.bind(SymbolId(3), Method::Primitive(dummy));
    assert!(class.method(SymbolId(0)).is_none());
    assert!(matches!(class.method(SymbolId(3)), Some(Method::Primitive(_))));
  }

  #[test]
  fn inherit_methods_from_copies_the_superclass_table() {
    let mut base = ClassObj::new("Base", None, 0);
    base.bind(SymbolId(0), Method::Primitive(dummy));

    let mut derived = ClassObj::new("Derived", None, 0);
    derived.inherit_methods_from(&base);
    assert!(matches!(derived.method(SymbolId(0)), Some(Method::Primitive(_))));

    // overriding in the subclass does not affect the superclass's own table
    derived.bind(SymbolId(1), Method::Primitive(dummy));
    assert!(base.method(SymbolId(1)).is_none());
  }

  #[test]
  fn sealed_defaults_to_false() {
    assert!(!ClassObj::new("Thing", None, 0).is_sealed);
    assert!(ClassObj::new("Thing", None, 0).sealed().is_sealed);
  }
}
