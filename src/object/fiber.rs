//! The `Fiber` object: one coroutine's value stack, call frames and open upvalues.
//!
//! Grounded on `value/object/frame.rs::{Frame, Stack}`, generalized from the teacher's
//! single flat per-`Isolate` call stack into a GC object so many fibers can coexist and
//! be captured by closures, handles, or each other via the caller link (spec.md §4.5).

use crate::heap::{RawObj, Trace};
use crate::object::upvalue::UpvalueObj;
use crate::object::{trace_values, Handle, ObjectKind};
use crate::value::Value;

/// Hard cap on call depth; exceeding it is a runtime error, not a panic (spec.md §5,
/// SPEC_FULL.md §9 "Recursion overflow" redesign note).
pub const MAX_FRAMES: usize = 512;

pub struct Frame {
  pub closure: RawObj,
  pub ip: usize,
  pub stack_start: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum FiberState {
  /// Never started.
  New,
  Running,
  /// Suspended at a `yield`, `call`'s boundary, or a foreign call.
  Suspended,
  Done,
}

pub struct FiberObj {
  pub stack: Vec<Value>,
  pub frames: Vec<Frame>,
  /// Sorted by descending `stack index` so the first upvalue whose index is `<=` a
  /// new capture's index can be found with a linear scan from the front.
  open_upvalues: Vec<Handle<UpvalueObj>>,
  pub caller: Option<RawObj>,
  pub caller_is_trying: bool,
  pub state: FiberState,
  pub error: Option<Value>,
}

impl FiberObj {
  pub fn new(initial_closure: RawObj) -> Self {
    FiberObj {
      stack: Vec::new(),
      frames: vec![Frame {
        closure: initial_closure,
        ip: 0,
        stack_start: 0,
      }],
      open_upvalues: Vec::new(),
      caller: None,
      caller_is_trying: false,
      state: FiberState::New,
      error: None,
    }
  }

  pub fn is_done(&self) -> bool {
    self.state == FiberState::Done
  }

  pub fn push(&mut self, value: Value) {
    self.stack.push(value);
  }

  pub fn pop(&mut self) -> Value {
    self.stack.pop().expect("fiber value stack underflow")
  }

  pub fn push_frame(&mut self, closure: RawObj, stack_start: usize) -> Result<(), crate::error::Error> {
    if self.frames.len() >= MAX_FRAMES {
      return Err(crate::error::runtime("Stack overflow."));
    }
    self.frames.push(Frame {
      closure,
      ip: 0,
      stack_start,
    });
    Ok(())
  }

  pub fn pop_frame(&mut self) -> Frame {
    self.frames.pop().expect("fiber call frame underflow")
  }

  pub fn current_frame(&self) -> &Frame {
    self.frames.last().expect("fiber has no active frame")
  }

  pub fn current_frame_mut(&mut self) -> &mut Frame {
    self.frames.last_mut().expect("fiber has no active frame")
  }

  /// Finds an existing open upvalue for `index`, creating a new one (via `make`) and
  /// inserting it in descending-index order otherwise. Mirrors the teacher's
  /// insertion-sorted open-upvalue list used for `CLOSURE` capture-by-local.
  pub fn find_or_open_upvalue(
    &mut self,
    fiber: RawObj,
    index: usize,
    make: impl FnOnce() -> Handle<UpvalueObj>,
  ) -> Handle<UpvalueObj> {
    let pos = self
      .open_upvalues
      .iter()
      .position(|up| up.points_at(fiber, index));
    if let Some(pos) = pos {
      return self.open_upvalues[pos];
    }
    let insert_at = self
      .open_upvalues
      .iter()
      .position(|up| match &**up {
        crate::object::upvalue::UpvalueObj::Open(_, i) => *i < index,
        _ => false,
      })
      .unwrap_or(self.open_upvalues.len());
    let upvalue = make();
    self.open_upvalues.insert(insert_at, upvalue);
    upvalue
  }

  /// Closes every open upvalue whose stack index is `>= from`, copying the current
  /// stack value into it. Called on block exit and `RETURN`.
  pub fn close_upvalues_from(&mut self, from: usize) {
    self.open_upvalues.retain(|up| {
      if let crate::object::upvalue::UpvalueObj::Open(_, index) = &*up.get() {
        if *index >= from {
          let value = self.stack[*index];
          *up.get_mut() = crate::object::upvalue::UpvalueObj::Closed(value);
          return false;
        }
      }
      true
    });
  }
}

impl Trace for FiberObj {
  const KIND: ObjectKind = ObjectKind::Fiber;
  fn trace(&self, mark: &mut dyn FnMut(RawObj)) {
    trace_values(&self.stack, mark);
    for frame in &self.frames {
      mark(frame.closure);
    }
    for up in &self.open_upvalues {
      mark(up.raw());
    }
    if let Some(caller) = self.caller {
      mark(caller);
    }
    if let Some(error) = self.error.and_then(|e| e.as_object()) {
      mark(error);
    }
  }
}
