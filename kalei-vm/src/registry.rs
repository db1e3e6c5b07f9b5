//! Prototypes that outlive compilation units.

use kalei_parser::ast::Prototype;
use std::collections::HashMap;

/// Every function signature seen so far in a session, by name.
///
/// A later unit calls a function compiled into an earlier one by re-declaring the signature found
/// here. The JIT resolves the declaration at link time.
#[derive(Debug, Clone, Default)]
pub struct PrototypeRegistry {
    prototypes: HashMap<String, Prototype>,
}

impl PrototypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Prototype> {
        self.prototypes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.prototypes.contains_key(name)
    }

    /// Records `proto`, returning the prototype it replaces.
    pub fn insert(&mut self, proto: Prototype) -> Option<Prototype> {
        self.prototypes.insert(proto.name.clone(), proto)
    }

    /// Undoes an [`PrototypeRegistry::insert`] of `name`.
    pub fn rollback(&mut self, name: &str, previous: Option<Prototype>) {
        match previous {
            Some(proto) => {
                self.prototypes.insert(name.to_string(), proto);
            }
            None => {
                self.prototypes.remove(name);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.prototypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prototypes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_rollback() {
        let mut registry = PrototypeRegistry::new();
        assert_eq!(registry.insert(Prototype::new("f", vec!["x".to_string()])), None);
        let previous = registry.insert(Prototype::new("f", vec![]));
        assert_eq!(registry.get("f").unwrap().arity(), 0);

        registry.rollback("f", previous);
        assert_eq!(registry.get("f").unwrap().arity(), 1);
        registry.rollback("f", None);
        assert!(!registry.contains("f"));
        assert!(registry.is_empty());
    }
}
