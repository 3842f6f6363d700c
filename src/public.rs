//! The embedding API (spec.md §4.7/§6): handles, the slot window, call handles and
//! foreign method registration.
//!
//! Grounded on the teacher's `public.rs`/`public/*`, with the wire-level names §6 lists
//! (`getSlotDouble`, `makeCallHandle`, `bindForeignMethodFn`, ...) mapped to idiomatic
//! Rust methods the way the teacher's own `public.rs` turns `hebi_*`-shaped names into
//! plain methods on `Hebi`/`Scope`/`Global`. `newVM`/`freeVM` collapse into ordinary
//! construction/`Drop` (`Vm::new`, no `freeVM` needed); `errorFn` collapses into the
//! `Result` a caller already gets back from `interpret`, rather than a callback — the
//! one remaining consumer of error formatting is the CLI in `src/bin/main.rs`.

pub mod conv;
pub mod foreign;
pub mod handle;
pub mod slots;

pub use conv::{FromEmber, IntoEmber};
pub use foreign::{bind_foreign_method, get_variable};
pub use handle::{CallHandle, Handle};
pub use slots::Slots;

use crate::vm::Vm;

/// Interns `signature` as a method symbol and records its arity (the number of `_`
/// placeholders in it, e.g. `"+(_)"` is arity 1, `"toString()"` is arity 0) — spec.md
/// §4.7 `makeCallHandle`.
pub fn make_call_handle(vm: &mut Vm, signature: &str) -> CallHandle {
  let arity = signature.matches('_').count() as u8;
  let symbol = vm.ctx.method_names_ensure(signature);
  CallHandle { symbol, arity }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::value::Value;
  use crate::vm::Config;

  #[test]
  fn call_handle_records_arity_from_placeholders() {
    let mut vm = Vm::new(Config::default());
    assert_eq!(make_call_handle(&mut vm, "distanceTo(_)").arity(), 1);
    assert_eq!(make_call_handle(&mut vm, "toString()").arity(), 0);
    assert_eq!(make_call_handle(&mut vm, "+(_)").arity(), 1);
  }

  #[test]
  fn handle_keeps_value_alive_across_collection() {
    let mut vm = Vm::new(Config::default());
    let handle = {
      let mut slots = Slots::new(&mut vm);
      slots.set_string(0, "hello");
      slots.get_handle(0)
    };
    vm.ctx.collect();
    assert_eq!(handle.value().as_object().is_some(), true);
  }

  #[test]
  fn released_handle_is_not_a_root() {
    let mut vm = Vm::new(Config::default());
    let id = vm.ctx.alloc_handle(Value::bool(true));
    vm.ctx.release_handle(id);
    let next = vm.ctx.alloc_handle(Value::bool(false));
    // the freed slot is reused rather than growing the registry
    assert_eq!(id, next);
  }
}
