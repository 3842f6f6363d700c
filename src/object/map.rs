//! The `Map` object: an open-addressed table from value keys to values.
//!
//! Keys are restricted to value types (null, bool, number, string, range, class) per
//! spec.md §3. An empty bucket is marked by storing [`Value::UNDEFINED`] as its key, so
//! iteration can resume from a raw bucket index without a parallel occupancy bitmap —
//! the same trick the teacher's `value/object/dict.rs` uses.

use crate::heap::{RawObj, Trace};
use crate::object::string::StringObj;
use crate::object::ObjectKind;
use crate::value::Value;

struct Entry {
  key: Value,
  value: Value,
}

pub struct MapObj {
  buckets: Vec<Entry>,
  count: usize,
}

const INITIAL_CAPACITY: usize = 8;

impl MapObj {
  pub fn new() -> Self {
    MapObj {
      buckets: Vec::new(),
      count: 0,
    }
  }

  pub fn len(&self) -> usize {
    self.count
  }

  pub fn is_empty(&self) -> bool {
    self.count == 0
  }

  fn capacity(&self) -> usize {
    self.buckets.len()
  }

  fn find_slot(buckets: &[Entry], key: Value) -> usize {
    let mask = buckets.len() - 1;
    let mut index = (hash_value(key) as usize) & mask;
    loop {
      let entry = &buckets[index];
      if entry.key.is_undefined() || entry.key.eq(key) {
        return index;
      }
      index = (index + 1) & mask;
    }
  }

  fn grow(&mut self) {
    let new_capacity = (self.capacity().max(INITIAL_CAPACITY / 2)) * 2;
    let mut new_buckets: Vec<Entry> = (0..new_capacity)
      .map(|_| Entry {
        key: Value::UNDEFINED,
        value: Value::NULL,
      })
      .collect();
    for entry in &self.buckets {
      if !entry.key.is_undefined() {
        let slot = Self::find_slot(&new_buckets, entry.key);
        new_buckets[slot] = Entry {
          key: entry.key,
          value: entry.value,
        };
      }
    }
    self.buckets = new_buckets;
  }

  pub fn get(&self, key: Value) -> Option<Value> {
    if self.buckets.is_empty() {
      return None;
    }
    let slot = Self::find_slot(&self.buckets, key);
    let entry = &self.buckets[slot];
    (!entry.key.is_undefined()).then_some(entry.value)
  }

  pub fn insert(&mut self, key: Value, value: Value) -> Option<Value> {
    if self.buckets.is_empty() || (self.count + 1) * 4 >= self.capacity() * 3 {
      self.grow();
    }
    let slot = Self::find_slot(&self.buckets, key);
    let entry = &mut self.buckets[slot];
    let previous = (!entry.key.is_undefined()).then_some(entry.value);
    if previous.is_none() {
      self.count += 1;
    }
    entry.key = key;
    entry.value = value;
    previous
  }

  pub fn remove(&mut self, key: Value) -> Option<Value> {
    if self.buckets.is_empty() {
      return None;
    }
    let slot = Self::find_slot(&self.buckets, key);
    if self.buckets[slot].key.is_undefined() {
      return None;
    }
    let removed = self.buckets[slot].value;
    self.buckets[slot].key = Value::UNDEFINED;
    self.count -= 1;
    // Re-insert every entry in the probe run after `slot` so searches for keys that
    // originally probed past the removed entry still terminate correctly.
    let mask = self.capacity() - 1;
    let mut index = (slot + 1) & mask;
    while !self.buckets[index].key.is_undefined() {
      let key = self.buckets[index].key;
      let value = self.buckets[index].value;
      self.buckets[index].key = Value::UNDEFINED;
      self.count -= 1;
      self.insert(key, value);
      index = (index + 1) & mask;
    }
    Some(removed)
  }

  /// Returns the first occupied bucket index at or after `from`, for resumable
  /// iteration (spec.md §3).
  pub fn next_index(&self, from: usize) -> Option<usize> {
    (from..self.buckets.len()).find(|&i| !self.buckets[i].key.is_undefined())
  }

  pub fn key_at(&self, index: usize) -> Option<Value> {
    self.buckets.get(index).map(|e| e.key)
  }

  pub fn value_at(&self, index: usize) -> Option<Value> {
    self.buckets.get(index).map(|e| e.value)
  }
}

impl Default for MapObj {
  fn default() -> Self {
    Self::new()
  }
}

impl Trace for MapObj {
  const KIND: ObjectKind = ObjectKind::Map;
  fn trace(&self, mark: &mut dyn FnMut(RawObj)) {
    for entry in &self.buckets {
      if !entry.key.is_undefined() {
        if let Some(obj) = entry.key.as_object() {
          mark(obj);
        }
        if let Some(obj) = entry.value.as_object() {
          mark(obj);
        }
      }
    }
  }
}

/// Consistent with `Value::eq`: strings and ranges hash by content, numbers by IEEE
/// bit pattern (NaN is canonicalized to one bit pattern in `Value::float`), everything
/// else by identity (raw bits).
fn hash_value(value: Value) -> u64 {
  use std::hash::{Hash, Hasher};
  let mut hasher = std::collections::hash_map::DefaultHasher::new();
  if let Some(obj) = value.as_object() {
    match unsafe { obj.as_ref().kind } {
      ObjectKind::String => {
        let s = unsafe { crate::heap::Header::data::<StringObj>(obj) };
        s.as_str().hash(&mut hasher);
        return hasher.finish();
      }
      ObjectKind::Range => {
        let r = unsafe { crate::heap::Header::data::<crate::object::range::RangeObj>(obj) };
        r.from.to_bits().hash(&mut hasher);
        r.to.to_bits().hash(&mut hasher);
        r.inclusive.hash(&mut hasher);
        return hasher.finish();
      }
      _ => {}
    }
  }
  value_bits(value).hash(&mut hasher);
  hasher.finish()
}

fn value_bits(value: Value) -> u64 {
  // `Value` intentionally does not expose its raw bits publicly; reuse `as_float`
  // for numbers and fall back to identity via the object pointer/tag otherwise.
  // Strings and ranges never reach here: `hash_value` returns early for them above.
  if let Some(f) = value.as_float() {
    return f.to_bits();
  }
  if let Some(obj) = value.as_object() {
    return obj.as_ptr() as u64;
  }
  if value.is_null() {
    0
  } else if value.is_truthy() {
    1
  } else {
    2
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn insert_and_get() {
    let mut map = MapObj::new();
    map.insert(Value::float(1.0), Value::float(100.0));
    map.insert(Value::float(2.0), Value::float(200.0));
    assert_eq!(map.get(Value::float(1.0)).unwrap().as_float(), Some(100.0));
    assert_eq!(map.len(), 2);
  }

  #[test]
  fn distinct_equal_ranges_hash_and_compare_equal_as_map_keys() {
    use crate::heap::{Context, GcConfig};
    use crate::object::range::RangeObj;

    let ctx = Context::new(GcConfig::default());
    // Two separate heap allocations of the same range, as two evaluations of a `1..5`
    // range literal would produce.
    let a = Value::object(ctx.alloc(RangeObj::new(1.0, 5.0, false), None));
    let b = Value::object(ctx.alloc(RangeObj::new(1.0, 5.0, false), None));
    assert!(a.eq(b));
    assert_eq!(hash_value(a), hash_value(b));

    let mut map = MapObj::new();
    map.insert(a, Value::float(1.0));
    assert_eq!(map.get(b).unwrap().as_float(), Some(1.0));
  }

  #[test]
  fn remove_then_lookup_past_probe_run() {
    let mut map = MapObj::new();
    for i in 0..20 {
      map.insert(Value::float(i as f64), Value::float(i as f64 * 10.0));
    }
    map.remove(Value::float(5.0));
    assert_eq!(map.get(Value::float(5.0)), None);
    for i in 0..20 {
      if i != 5 {
        assert_eq!(map.get(Value::float(i as f64)).unwrap().as_float(), Some(i as f64 * 10.0));
      }
    }
  }
}
