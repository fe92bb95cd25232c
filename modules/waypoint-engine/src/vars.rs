//! Rule variables.
//!
//! A [`Var`] is a small integer token. Ids come from a process-wide counter,
//! so two rule instantiations never share a variable even when they use the
//! same names. Names are interned once per instantiation in [`Vars`] and only
//! consulted for diagnostics.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_VAR: AtomicU32 = AtomicU32::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(u32);

impl Var {
    fn fresh() -> Self {
        Var(NEXT_VAR.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

/// The variable scope of one rule instantiation.
#[derive(Debug, Default)]
pub struct Vars {
    by_name: HashMap<String, Var>,
    names: HashMap<Var, String>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    /// The variable called `name` in this scope, created on first use.
    pub fn var(&mut self, name: &str) -> Var {
        if let Some(var) = self.by_name.get(name) {
            return *var;
        }
        let var = Var::fresh();
        self.by_name.insert(name.to_string(), var);
        self.names.insert(var, name.to_string());
        var
    }

    /// Several variables at once, in the order given.
    ///
    /// ```ignore
    /// let [request, owner, trip_id] = vars.many(["request", "owner", "tripId"]);
    /// ```
    pub fn many<const N: usize>(&mut self, names: [&str; N]) -> [Var; N] {
        names.map(|name| self.var(name))
    }

    pub fn name(&self, var: Var) -> Option<&str> {
        self.names.get(&var).map(String::as_str)
    }

    /// Human-readable name, falling back to the raw token.
    pub fn describe(&self, var: Var) -> String {
        self.name(var)
            .map(str::to_string)
            .unwrap_or_else(|| var.to_string())
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_same_scope_is_interned() {
        let mut vars = Vars::new();
        let a = vars.var("trip");
        let b = vars.var("trip");
        assert_eq!(a, b);
        assert_eq!(vars.len(), 1);
        assert_eq!(vars.name(a), Some("trip"));
    }

    #[test]
    fn scopes_never_share_variables() {
        let mut first = Vars::new();
        let mut second = Vars::new();
        assert_ne!(first.var("trip"), second.var("trip"));
    }

    #[test]
    fn many_preserves_order() {
        let mut vars = Vars::new();
        let [a, b] = vars.many(["a", "b"]);
        assert_eq!(vars.describe(a), "a");
        assert_eq!(vars.describe(b), "b");
        assert_ne!(a, b);
    }
}
