//! The `List` object: a dense, growable sequence of values.

use crate::heap::{RawObj, Trace};
use crate::object::{trace_values, ObjectKind};
use crate::value::Value;

pub struct ListObj {
  values: Vec<Value>,
}

impl ListObj {
  pub fn new() -> Self {
    ListObj { values: Vec::new() }
  }

  pub fn with_values(values: Vec<Value>) -> Self {
    ListObj { values }
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<Value> {
    self.values.get(index).copied()
  }

  pub fn set(&mut self, index: usize, value: Value) -> bool {
    if let Some(slot) = self.values.get_mut(index) {
      *slot = value;
      true
    } else {
      false
    }
  }

  pub fn push(&mut self, value: Value) {
    self.values.push(value);
  }

  pub fn insert(&mut self, index: usize, value: Value) {
    self.values.insert(index, value);
  }

  pub fn remove(&mut self, index: usize) -> Option<Value> {
    (index < self.values.len()).then(|| self.values.remove(index))
  }

  pub fn add_all(&mut self, other: &ListObj) {
    self.values.extend_from_slice(&other.values);
  }

  pub fn as_slice(&self) -> &[Value] {
    &self.values
  }
}

impl Default for ListObj {
  fn default() -> Self {
    Self::new()
  }
}

impl Trace for ListObj {
  const KIND: ObjectKind = ObjectKind::List;
  fn trace(&self, mark: &mut dyn FnMut(RawObj)) {
    trace_values(&self.values, mark);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn push_and_index() {
    let mut list = ListObj::new();
    list.push(Value::float(1.0));
    list.push(Value::float(2.0));
    assert_eq!(list.len(), 2);
    assert_eq!(list.get(0).unwrap().as_float(), Some(1.0));
  }

  #[test]
  fn remove_shifts_down() {
    let mut list = ListObj::with_values(vec![Value::float(1.0), Value::float(2.0), Value::float(3.0)]);
    list.remove(0);
    assert_eq!(list.len(), 2);
    assert_eq!(list.get(0).unwrap().as_float(), Some(2.0));
  }
}
