use std::{borrow::Borrow, collections::HashMap, hash::Hash};

/// Stack of lexical scopes, innermost last.
pub struct Scope<K, V> {
    stack: Vec<HashMap<K, V>>,
}

impl<K, V> Default for Scope<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::with_empty_scope()
    }
}

impl<K, V> Scope<K, V>
where
    K: Eq + Hash,
{
    pub fn with_empty_scope() -> Self {
        Self {
            stack: vec![HashMap::new()],
        }
    }

    pub fn new_scope(&mut self) {
        self.stack.push(HashMap::new());
    }

    /// Pops the innermost scope returning its bindings.
    pub fn pop_scope(&mut self) -> HashMap<K, V> {
        self.stack.pop().unwrap_or_default()
    }

    pub fn add(&mut self, key: K, value: V) {
        if self.stack.is_empty() {
            self.stack.push(HashMap::new());
        }
        if let Some(scope) = self.stack.last_mut() {
            scope.insert(key, value);
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.stack.iter().rev().find_map(|scope| scope.get(key))
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.stack
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(key))
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.get(key).is_some()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::Scope;

    #[test]
    fn inner_scope_shadows_and_pops() {
        let mut scope = Scope::default();
        scope.add("a", 1);
        scope.new_scope();
        scope.add("a", 2);
        scope.add("b", 3);
        assert_eq!(scope.get("a"), Some(&2));
        let popped = scope.pop_scope();
        assert_eq!(popped.len(), 2);
        assert_eq!(scope.get("a"), Some(&1));
        assert!(!scope.contains("b"));
    }

    #[test]
    fn get_mut_finds_outer_binding() {
        let mut scope = Scope::default();
        scope.add("x", 1);
        scope.new_scope();
        *scope.get_mut("x").unwrap() += 10;
        scope.pop_scope();
        assert_eq!(scope.get("x"), Some(&11));
        assert_eq!(scope.depth(), 1);
    }
}
