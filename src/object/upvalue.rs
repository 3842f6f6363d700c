//! The `Upvalue` object: a closure's capture of a variable outside its own frame.
//!
//! Open while the captured local is still live on some fiber's stack; closed (owning
//! the value outright) once that frame returns. New relative to the teacher, which
//! inlines captured values by copy into `Function::captures` — that cannot express
//! "close over a local that is still being mutated," which spec.md §8 property 6
//! requires.

use crate::heap::{RawObj, Trace};
use crate::object::ObjectKind;
use crate::value::Value;

pub enum UpvalueObj {
  /// `(fiber, stack index)` — resolved through the fiber every access, so a growing
  /// stack never invalidates it (spec.md §9 Open Question b).
  Open(RawObj, usize),
  Closed(Value),
}

impl UpvalueObj {
  pub fn open(fiber: RawObj, index: usize) -> Self {
    UpvalueObj::Open(fiber, index)
  }

  pub fn points_at(&self, fiber: RawObj, index: usize) -> bool {
    matches!(self, UpvalueObj::Open(f, i) if *f == fiber && *i == index)
  }
}

impl Trace for UpvalueObj {
  const KIND: ObjectKind = ObjectKind::Upvalue;
  fn trace(&self, mark: &mut dyn FnMut(RawObj)) {
    match self {
      UpvalueObj::Open(fiber, _) => mark(*fiber),
      UpvalueObj::Closed(value) => {
        if let Some(obj) = value.as_object() {
          mark(obj);
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::object::string::StringObj;
  use crate::vm::{Config, Vm};

  #[test]
  fn open_points_at_matches_object_identity_and_index() {
    let vm = Vm::new(Config::default());
    let fiber_a = vm.ctx.alloc(StringObj::new("a"), None);
    let fiber_b = vm.ctx.alloc(StringObj::new("b"), None);
    let up = UpvalueObj::open(fiber_a, 2);
    assert!(up.points_at(fiber_a, 2));
    assert!(!up.points_at(fiber_a, 3));
    assert!(!up.points_at(fiber_b, 2));
  }

  #[test]
  fn closed_holds_its_value() {
    let closed = UpvalueObj::Closed(Value::bool(true));
    assert!(matches!(closed, UpvalueObj::Closed(v) if v.as_bool() == Some(true)));
  }
}
