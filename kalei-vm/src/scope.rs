//! Variable bindings visible while generating one function.

use kalei_value::ir::SlotId;
use std::collections::HashMap;

/// The binding a name had before [`ScopeTable::bind`] replaced it.
#[must_use = "a shadowed binding must be restored when its scope closes"]
#[derive(Debug, PartialEq, Eq)]
pub struct Shadowed {
    name: String,
    previous: Option<SlotId>,
}

/// Maps variable names to the stack slot holding them.
///
/// This is a flat table, not a stack of scopes. Shadowing is done by pairing each
/// [`ScopeTable::bind`] with a [`ScopeTable::restore`], in reverse order of binding.
#[derive(Debug, Default)]
pub struct ScopeTable {
    bindings: HashMap<String, SlotId>,
}

impl ScopeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<SlotId> {
        self.bindings.get(name).copied()
    }

    /// Binds `name` to `slot`. The returned value must be passed to [`ScopeTable::restore`] when
    /// the binding goes out of scope.
    pub fn bind(&mut self, name: &str, slot: SlotId) -> Shadowed {
        let previous = self.bindings.insert(name.to_string(), slot);
        Shadowed {
            name: name.to_string(),
            previous,
        }
    }

    /// Binds a function parameter. Parameters are never restored; they live as long as the table.
    pub fn bind_param(&mut self, name: &str, slot: SlotId) {
        self.bindings.insert(name.to_string(), slot);
    }

    /// Undoes a [`ScopeTable::bind`]: reinstalls the previous binding, or removes the name.
    pub fn restore(&mut self, shadowed: Shadowed) {
        match shadowed.previous {
            Some(slot) => {
                self.bindings.insert(shadowed.name, slot);
            }
            None => {
                self.bindings.remove(&shadowed.name);
            }
        }
    }

    /// Restores a batch of bindings, most recent last in `shadowed`.
    pub fn restore_all(&mut self, shadowed: Vec<Shadowed>) {
        for binding in shadowed.into_iter().rev() {
            self.restore(binding);
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadow_and_restore() {
        let mut scope = ScopeTable::new();
        let outer = scope.bind("x", SlotId(0));
        let inner = scope.bind("x", SlotId(1));
        assert_eq!(scope.get("x"), Some(SlotId(1)));
        scope.restore(inner);
        assert_eq!(scope.get("x"), Some(SlotId(0)));
        scope.restore(outer);
        assert_eq!(scope.get("x"), None);
        assert!(scope.is_empty());
    }

    #[test]
    fn test_restore_all_is_lifo() {
        let mut scope = ScopeTable::new();
        let param = scope.bind("a", SlotId(0));
        // `var a = 1, a = 2 in ...` binds the same name twice
        let batch = vec![scope.bind("a", SlotId(1)), scope.bind("a", SlotId(2)), scope.bind("b", SlotId(3))];
        assert_eq!(scope.get("a"), Some(SlotId(2)));
        scope.restore_all(batch);
        assert_eq!(scope.get("a"), Some(SlotId(0)));
        assert_eq!(scope.get("b"), None);
        assert_eq!(scope.len(), 1);
        scope.restore(param);
    }

    #[test]
    fn test_params_outlive_shadowing() {
        let mut scope = ScopeTable::new();
        scope.bind_param("x", SlotId(0));
        // `def f(x x)` binds the last parameter
        scope.bind_param("x", SlotId(1));
        let local = scope.bind("x", SlotId(2));
        scope.restore(local);
        assert_eq!(scope.get("x"), Some(SlotId(1)));
        assert_eq!(scope.len(), 1);
    }
}
