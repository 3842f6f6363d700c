//! Embedder-held references into the heap (spec.md §4.7).
//!
//! A [`Handle`] pins a [`Value`] as a GC root (`Context::alloc_handle`/`release_handle`,
//! see DESIGN.md) so host code can hold a script value across calls without it being
//! collected. A [`CallHandle`] is lighter: it just interns a method signature once so
//! repeated `Slots::call` don't re-hash the signature string. The teacher's `public.rs`
//! ties both to a `'cx` lifetime borrowed from the VM; here a `Handle` instead carries
//! its own `Context` clone (an `Rc` bump, see `heap::Context`) so it can outlive any
//! particular `&mut Vm` borrow, matching `releaseHandle` being a host-timed operation
//! rather than one scoped to a single call.

use crate::heap::Context;
use crate::symbol::SymbolId;
use crate::value::Value;

/// A GC-protected reference to a value, released by dropping it (or calling
/// [`Handle::release`] for symmetry with the wire API's `releaseHandle`).
pub struct Handle {
  ctx: Context,
  id: usize,
}

impl Handle {
  pub(crate) fn new(ctx: Context, value: Value) -> Self {
    let id = ctx.alloc_handle(value);
    Handle { ctx, id }
  }

  pub fn value(&self) -> Value {
    self.ctx.handle_value(self.id)
  }

  pub fn release(self) {
    drop(self);
  }
}

impl Drop for Handle {
  fn drop(&mut self) {
    self.ctx.release_handle(self.id);
  }
}

/// A method signature interned once, ready to drive repeated `Slots::call`s without
/// re-hashing the name each time (spec.md §4.7 `makeCallHandle`).
#[derive(Clone, Copy)]
pub struct CallHandle {
  pub(crate) symbol: SymbolId,
  pub(crate) arity: u8,
}

impl CallHandle {
  pub fn arity(&self) -> u8 {
    self.arity
  }
}
