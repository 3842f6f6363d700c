//! The memory manager: a single allocation gate plus a tracing mark-sweep collector.
//!
//! Every heap object is a [`Header`] followed by its payload (an [`Allocation<T>`]),
//! threaded into one intrusive linked list so sweep can walk every live allocation
//! without a separate registry. This replaces the teacher's `Rc<UnsafeCell<T>>`-based
//! `Ptr<T>` (see DESIGN.md) because spec.md calls for a real tracing collector: cycles
//! between closures, upvalues, classes and fibers cannot be reclaimed by refcounting
//! alone.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::object::ObjectKind;
use crate::symbol::SymbolTable;

/// Pointer to a live heap object's header. Never null, never dangling while reachable.
pub type RawObj = NonNull<Header>;

/// Maximum depth of the embedder-visible temporary root stack (spec.md §3 invariant).
pub const MAX_TEMP_ROOTS: usize = 8;

pub struct Header {
  pub kind: ObjectKind,
  marked: Cell<bool>,
  pub class: Cell<Option<RawObj>>,
  next: Cell<Option<RawObj>>,
  size: usize,
  trace_fn: unsafe fn(RawObj, &mut dyn FnMut(RawObj)),
  drop_fn: unsafe fn(RawObj),
}

#[repr(C)]
struct Allocation<T> {
  header: Header,
  data: T,
}

/// Implemented by every object payload type so the collector can find its children
/// without knowing the concrete type at the call site (a hand-rolled vtable, in the
/// spirit of the teacher's `declare_object_trait!` dynamic dispatch, but trimmed to
/// just the one operation GC needs).
pub trait Trace: 'static {
  const KIND: ObjectKind;
  fn trace(&self, mark: &mut dyn FnMut(RawObj));
}

unsafe fn trace_shim<T: Trace>(obj: RawObj, mark: &mut dyn FnMut(RawObj)) {
  let alloc = obj.cast::<Allocation<T>>();
  (*alloc.as_ptr()).data.trace(mark);
}

unsafe fn drop_shim<T: Trace>(obj: RawObj) {
  drop(Box::from_raw(obj.cast::<Allocation<T>>().as_ptr()));
}

impl Header {
  /// Safety: caller must ensure `obj` was allocated as an `Allocation<T>` with this
  /// exact `T`, i.e. `obj.kind` matches `T::KIND` (debug-checked by `Handle`).
  pub unsafe fn data<T>(obj: RawObj) -> &'static T {
    &(*obj.cast::<Allocation<T>>().as_ptr()).data
  }

  /// Safety: see [`Header::data`]; additionally requires no other live `&T` borrow.
  #[allow(clippy::mut_from_ref)]
  pub unsafe fn data_mut<T>(obj: RawObj) -> &'static mut T {
    &mut (*obj.cast::<Allocation<T>>().as_ptr()).data
  }
}

pub struct Heap {
  head: Option<RawObj>,
  bytes_allocated: usize,
  next_gc: usize,
  min_heap_size: usize,
  heap_growth_factor: usize, // percent, e.g. 150 means "grow by 50%"
  pub stress: bool,
}

impl Heap {
  pub fn new(initial_heap_size: usize, min_heap_size: usize, heap_growth_percent: usize) -> Self {
    Heap {
      head: None,
      bytes_allocated: 0,
      next_gc: initial_heap_size,
      min_heap_size,
      heap_growth_factor: 100 + heap_growth_percent,
      stress: false,
    }
  }

  pub fn bytes_allocated(&self) -> usize {
    self.bytes_allocated
  }

  fn alloc_raw<T: Trace>(&mut self, data: T, class: Option<RawObj>) -> RawObj {
    let size = std::mem::size_of::<Allocation<T>>();
    let boxed = Box::new(Allocation {
      header: Header {
        kind: T::KIND,
        marked: Cell::new(false),
        class: Cell::new(class),
        next: Cell::new(self.head),
        size,
        trace_fn: trace_shim::<T>,
        drop_fn: drop_shim::<T>,
      },
      data,
    });
    let ptr = NonNull::from(Box::leak(boxed)).cast::<Header>();
    self.head = Some(ptr);
    self.bytes_allocated += size;
    ptr
  }

  fn should_collect(&self) -> bool {
    self.stress || self.bytes_allocated > self.next_gc
  }

  /// Mark-sweep per spec.md §4.1: mark every root and everything reachable from it,
  /// then free every unmarked object, then grow `next_gc`.
  fn collect(&mut self, roots: impl Iterator<Item = RawObj>) {
    let mut gray = Vec::new();
    for root in roots {
      mark_one(root, &mut gray);
    }
    while let Some(obj) = gray.pop() {
      let header = unsafe { obj.as_ref() };
      let trace_fn = header.trace_fn;
      unsafe { trace_fn(obj, &mut |child| mark_one(child, &mut gray)) };
    }
    self.sweep();
    self.next_gc = (self.bytes_allocated * self.heap_growth_factor / 100).max(self.min_heap_size);
  }

  fn sweep(&mut self) {
    let mut prev: Option<RawObj> = None;
    let mut cursor = self.head;
    while let Some(obj) = cursor {
      let header = unsafe { obj.as_ref() };
      let next = header.next.get();
      if header.marked.replace(false) {
        prev = Some(obj);
        cursor = next;
      } else {
        match prev {
          Some(p) => unsafe { p.as_ref().next.set(next) },
          None => self.head = next,
        }
        self.bytes_allocated -= header.size;
        let drop_fn = header.drop_fn;
        unsafe { drop_fn(obj) };
        cursor = next;
      }
    }
  }
}

fn mark_one(obj: RawObj, gray: &mut Vec<RawObj>) {
  let header = unsafe { obj.as_ref() };
  if !header.marked.replace(true) {
    if let Some(class) = header.class.get() {
      mark_one(class, gray);
    }
    gray.push(obj);
  }
}

impl Drop for Heap {
  fn drop(&mut self) {
    let mut cursor = self.head;
    while let Some(obj) = cursor {
      let header = unsafe { obj.as_ref() };
      let next = header.next.get();
      let drop_fn = header.drop_fn;
      unsafe { drop_fn(obj) };
      cursor = next;
    }
  }
}

/// Shared handle around the heap plus the state the collector needs to find its own
/// roots: the method-name symbol table (shared by every class), the module registry,
/// the embedder's temporary-root stack, and whichever fiber is currently running.
/// Cloning is cheap (`Rc` bump) and mirrors the teacher's `ctx.rs::Context`.
#[derive(Clone)]
pub struct Context(Rc<RefCell<Inner>>);

struct Inner {
  heap: Heap,
  pub method_names: SymbolTable,
  modules: Vec<RawObj>,
  temp_roots: Vec<RawObj>,
  current_fiber: Option<RawObj>,
  /// Embedder-held handles (spec.md §4.7); a released slot becomes `None` and is
  /// reused by the next `alloc_handle` rather than shifting every later id.
  handles: Vec<Option<crate::value::Value>>,
}

pub struct GcConfig {
  pub initial_heap_size: usize,
  pub min_heap_size: usize,
  pub heap_growth_percent: usize,
}

impl Default for GcConfig {
  fn default() -> Self {
    GcConfig {
      initial_heap_size: 10 * 1024 * 1024,
      min_heap_size: 1024 * 1024,
      heap_growth_percent: 50,
    }
  }
}

impl Context {
  pub fn new(config: GcConfig) -> Self {
    Context(Rc::new(RefCell::new(Inner {
      heap: Heap::new(
        config.initial_heap_size,
        config.min_heap_size,
        config.heap_growth_percent,
      ),
      method_names: SymbolTable::new(),
      modules: Vec::new(),
      temp_roots: Vec::new(),
      current_fiber: None,
      handles: Vec::new(),
    })))
  }

  pub fn set_gc_stress(&self, stress: bool) {
    self.0.borrow_mut().heap.stress = stress;
  }

  pub fn bytes_allocated(&self) -> usize {
    self.0.borrow().heap.bytes_allocated()
  }

  pub fn alloc<T: Trace>(&self, data: T, class: Option<RawObj>) -> RawObj {
    self.maybe_collect();
    self.0.borrow_mut().heap.alloc_raw(data, class)
  }

  pub fn maybe_collect(&self) {
    let should = self.0.borrow().heap.should_collect();
    if should {
      self.collect();
    }
  }

  pub fn collect(&self) {
    let mut inner = self.0.borrow_mut();
    let roots: Vec<RawObj> = inner
      .modules
      .iter()
      .copied()
      .chain(inner.temp_roots.iter().copied())
      .chain(inner.current_fiber)
      .chain(inner.handles.iter().flatten().filter_map(|v| v.as_object()))
      .collect();
    inner.heap.collect(roots.into_iter());
  }

  pub fn register_module(&self, module: RawObj) {
    self.0.borrow_mut().modules.push(module);
  }

  pub fn set_current_fiber(&self, fiber: Option<RawObj>) {
    self.0.borrow_mut().current_fiber = fiber;
  }

  /// Pins `obj` so it survives collections triggered while the embedder holds only a
  /// bare pointer outside any traced structure (spec.md §3: bounded at
  /// [`MAX_TEMP_ROOTS`], exceeding it is a host bug, not a user-triggerable error).
  pub fn push_temp_root(&self, obj: RawObj) {
    let mut inner = self.0.borrow_mut();
    debug_assert!(
      inner.temp_roots.len() < MAX_TEMP_ROOTS,
      "temporary root stack overflow"
    );
    inner.temp_roots.push(obj);
  }

  pub fn pop_temp_root(&self) {
    self.0.borrow_mut().temp_roots.pop();
  }

  pub fn method_names_ensure(&self, name: &str) -> crate::symbol::SymbolId {
    self.0.borrow_mut().method_names.ensure(name)
  }

  pub fn method_names_find(&self, name: &str) -> Option<crate::symbol::SymbolId> {
    self.0.borrow().method_names.find(name)
  }

  pub fn method_name(&self, id: crate::symbol::SymbolId) -> String {
    self.0.borrow().method_names.name(id).to_string()
  }

  /// Registers `value` as a new embedder handle (spec.md §4.7), reusing a released
  /// slot if one is free. The returned id stays valid (and keeps `value` alive as a
  /// GC root) until `release_handle`.
  pub fn alloc_handle(&self, value: crate::value::Value) -> usize {
    let mut inner = self.0.borrow_mut();
    if let Some((id, slot)) = inner.handles.iter_mut().enumerate().find(|(_, s)| s.is_none()) {
      *slot = Some(value);
      return id;
    }
    inner.handles.push(Some(value));
    inner.handles.len() - 1
  }

  pub fn handle_value(&self, id: usize) -> crate::value::Value {
    self.0.borrow().handles[id].expect("use of a released handle")
  }

  pub fn release_handle(&self, id: usize) {
    self.0.borrow_mut().handles[id] = None;
  }
}

impl fmt::Debug for Context {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Context")
      .field("bytes_allocated", &self.bytes_allocated())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Leaf(u32);
  impl Trace for Leaf {
    const KIND: ObjectKind = ObjectKind::String;
    fn trace(&self, _mark: &mut dyn FnMut(RawObj)) {}
  }

  #[test]
  fn unreachable_objects_are_collected() {
    let ctx = Context::new(GcConfig::default());
    let kept = ctx.alloc(Leaf(1), None);
    let _dropped = ctx.alloc(Leaf(2), None);
    ctx.push_temp_root(kept);
    assert!(ctx.bytes_allocated() > 0);
    ctx.collect();
    // `kept` survives because it is a temp root; `_dropped` does not because nothing
    // refers to it. We can't directly observe the second allocation's death without
    // a finalizer, so this mainly checks collect() does not corrupt the live object.
    let data = unsafe { Header::data::<Leaf>(kept) };
    assert_eq!(data.0, 1);
  }
}
