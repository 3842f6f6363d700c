//! Conversions between Rust values and script [`Value`]s (spec.md §4.7 "native function
//! ergonomics"), grounded on the teacher's `public/conv.rs`: a sealed pair of traits plus
//! `macro_rules!`-generated impls for the numeric types, so no proc-macro crate is
//! needed on either side. Like the teacher's own file, container conversions
//! (`Vec<T>`, `HashMap<K, V>`) are left out — the teacher keeps them commented out
//! rather than wired in, and nothing here calls for them either.

use crate::error::{runtime, Result};
use crate::heap::RawObj;
use crate::object::string::StringObj;
use crate::object::ObjectKind;
use crate::value::Value;
use crate::vm::Vm;

mod private {
  pub trait Sealed {}
}

/// Extracts a Rust value out of a script [`Value`]; the reverse of [`IntoEmber`].
pub trait FromEmber: Sized + private::Sealed {
  fn from_ember(value: Value) -> Result<Self>;
}

/// Builds a script [`Value`] out of a Rust value. Takes `&Vm` (not just the heap
/// `Context`) because an allocated object needs its class pointer set from
/// `vm.classes`, unlike the teacher's classless `Context::alloc`.
pub trait IntoEmber: Sized + private::Sealed {
  fn into_ember(self, vm: &Vm) -> Value;
}

fn as_string(value: Value) -> Option<&'static str> {
  let obj: RawObj = value.as_object()?;
  (unsafe { obj.as_ref() }.kind == ObjectKind::String)
    .then(|| unsafe { crate::heap::Header::data::<StringObj>(obj) }.as_str())
}

macro_rules! impl_int {
  ($($T:ident),*) => {$(
    impl private::Sealed for $T {}
    impl FromEmber for $T {
      fn from_ember(value: Value) -> Result<Self> {
        let value = value.as_float().ok_or_else(|| runtime("value is not a number."))?;
        Ok(value as $T)
      }
    }
    impl IntoEmber for $T {
      fn into_ember(self, _vm: &Vm) -> Value {
        Value::float(self as f64)
      }
    }
  )*};
}
impl_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl private::Sealed for f32 {}
impl FromEmber for f32 {
  fn from_ember(value: Value) -> Result<Self> {
    value.as_float().map(|v| v as f32).ok_or_else(|| runtime("value is not a number."))
  }
}
impl IntoEmber for f32 {
  fn into_ember(self, _vm: &Vm) -> Value {
    Value::float(self as f64)
  }
}

impl private::Sealed for f64 {}
impl FromEmber for f64 {
  fn from_ember(value: Value) -> Result<Self> {
    value.as_float().ok_or_else(|| runtime("value is not a number."))
  }
}
impl IntoEmber for f64 {
  fn into_ember(self, _vm: &Vm) -> Value {
    Value::float(self)
  }
}

impl private::Sealed for bool {}
impl FromEmber for bool {
  fn from_ember(value: Value) -> Result<Self> {
    value.as_bool().ok_or_else(|| runtime("value is not a bool."))
  }
}
impl IntoEmber for bool {
  fn into_ember(self, _vm: &Vm) -> Value {
    Value::bool(self)
  }
}

impl private::Sealed for () {}
impl FromEmber for () {
  fn from_ember(_value: Value) -> Result<Self> {
    Ok(())
  }
}
impl IntoEmber for () {
  fn into_ember(self, _vm: &Vm) -> Value {
    Value::NULL
  }
}

impl private::Sealed for String {}
impl FromEmber for String {
  fn from_ember(value: Value) -> Result<Self> {
    as_string(value)
      .map(str::to_string)
      .ok_or_else(|| runtime("value is not a string."))
  }
}
impl IntoEmber for String {
  fn into_ember(self, vm: &Vm) -> Value {
    Value::object(vm.ctx.alloc(StringObj::new(self), Some(vm.classes.string.raw())))
  }
}

impl<'a> private::Sealed for &'a str {}
impl<'a> IntoEmber for &'a str {
  fn into_ember(self, vm: &Vm) -> Value {
    Value::object(vm.ctx.alloc(StringObj::new(self), Some(vm.classes.string.raw())))
  }
}

impl private::Sealed for Value {}
impl FromEmber for Value {
  fn from_ember(value: Value) -> Result<Self> {
    Ok(value)
  }
}
impl IntoEmber for Value {
  fn into_ember(self, _vm: &Vm) -> Value {
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::vm::Config;

  #[test]
  fn numeric_round_trip() {
    let vm = Vm::new(Config::default());
    let value = 42i32.into_ember(&vm);
    assert_eq!(i32::from_ember(value).unwrap(), 42);
    assert_eq!(f64::from_ember(value).unwrap(), 42.0);
  }

  #[test]
  fn string_round_trip() {
    let vm = Vm::new(Config::default());
    let value = String::from("hi").into_ember(&vm);
    assert_eq!(String::from_ember(value).unwrap(), "hi");
  }

  #[test]
  fn from_ember_rejects_wrong_shape() {
    assert!(bool::from_ember(Value::float(1.0)).is_err());
  }
}
