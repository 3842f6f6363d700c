//! Interning tables mapping names to dense integer ids.
//!
//! Used for two distinct purposes: the VM-wide method-name table (every class's
//! method vector is indexed by the same ids) and per-module variable-name tables.

use indexmap::IndexSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(pub u32);

impl SymbolId {
  pub fn index(self) -> usize {
    self.0 as usize
  }
}

#[derive(Default, Debug)]
pub struct SymbolTable {
  names: IndexSet<Box<str>>,
}

impl SymbolTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Interns `name`, returning its existing id or allocating a new one.
  pub fn ensure(&mut self, name: &str) -> SymbolId {
    if let Some(index) = self.names.get_index_of(name) {
      return SymbolId(index as u32);
    }
    let (index, _) = self.names.insert_full(name.into());
    SymbolId(index as u32)
  }

  pub fn find(&self, name: &str) -> Option<SymbolId> {
    self.names.get_index_of(name).map(|i| SymbolId(i as u32))
  }

  pub fn name(&self, id: SymbolId) -> &str {
    &self.names[id.index()]
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ensure_interns_once() {
    let mut table = SymbolTable::new();
    let a = table.ensure("foo");
    let b = table.ensure("bar");
    let c = table.ensure("foo");
    assert_eq!(a, c);
    assert_ne!(a, b);
    assert_eq!(table.name(a), "foo");
    assert_eq!(table.name(b), "bar");
  }

  #[test]
  fn find_does_not_insert() {
    let mut table = SymbolTable::new();
    table.ensure("foo");
    assert_eq!(table.find("bar"), None);
    assert_eq!(table.len(), 1);
  }
}
