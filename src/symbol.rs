//! Name resolution across nested lexical scopes.
//!
//! Each compilation scope owns a table; resolving a name through one or
//! more enclosing non-global scopes reclassifies it as a free variable
//! and appends it to this scope's capture list, which is exactly the
//! order `OpGetFree` indexes at runtime.

use crate::types::Attribute;
use crate::utils::FxHashMap;

/// The storage class of a resolved name.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
    Free,
    /// The self-reference of a named function literal, loaded with
    /// `OpCurrentClosure`.
    Function,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    /// Global slot, local slot, builtin ordinal, or free-list position,
    /// depending on `scope`. Always 0 for `Function`.
    pub index: usize,
    pub attribute: Attribute,
}

#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    store: FxHashMap<String, Symbol>,
    num_definitions: usize,
    pub free_symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enclosed(outer: SymbolTable) -> Self {
        Self {
            outer: Some(Box::new(outer)),
            ..Self::default()
        }
    }

    /// Unwraps back to the enclosing table when this scope ends.
    pub fn into_outer(self) -> Option<SymbolTable> {
        self.outer.map(|outer| *outer)
    }

    /// The number of slots this scope needs at runtime.
    pub fn num_definitions(&self) -> usize {
        self.num_definitions
    }

    /// Defines `name` in this scope, allocating the next slot. Shadows
    /// any same-named symbol already present.
    pub fn define(&mut self, name: impl Into<String>, attribute: Attribute) -> Symbol {
        let name = name.into();
        let scope = if self.outer.is_none() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };

        let symbol = Symbol {
            name: name.clone(),
            scope,
            index: self.num_definitions,
            attribute,
        };

        self.store.insert(name, symbol.clone());
        self.num_definitions += 1;
        symbol
    }

    /// Registers a host builtin at a caller-chosen ordinal. Only called
    /// against the root table when the compiler is constructed.
    pub fn define_builtin(
        &mut self,
        index: usize,
        name: impl Into<String>,
        attribute: Attribute,
    ) -> Symbol {
        let name = name.into();
        let symbol = Symbol {
            name: name.clone(),
            scope: SymbolScope::Builtin,
            index,
            attribute,
        };

        self.store.insert(name, symbol.clone());
        symbol
    }

    /// Registers the self-reference of a named function literal. A later
    /// `define` for the same name (a parameter or `let` shadowing it)
    /// simply overwrites this entry.
    pub fn define_function_name(
        &mut self,
        name: impl Into<String>,
        attribute: Attribute,
    ) -> Symbol {
        let name = name.into();
        let symbol = Symbol {
            name: name.clone(),
            scope: SymbolScope::Function,
            index: 0,
            attribute,
        };

        self.store.insert(name, symbol.clone());
        symbol
    }

    /// Replaces the recorded attribute of a symbol in this scope, once
    /// inference has produced a better one.
    pub fn set_attribute(&mut self, name: &str, attribute: Attribute) {
        if let Some(symbol) = self.store.get_mut(name) {
            symbol.attribute = attribute;
        }
    }

    /// Resolves `name`, promoting captures: a hit in an enclosing
    /// non-global scope is appended to this scope's free list and
    /// re-registered here as a `Free` symbol.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }

        let symbol = self.outer.as_mut()?.resolve(name)?;
        if matches!(symbol.scope, SymbolScope::Global | SymbolScope::Builtin) {
            return Some(symbol);
        }

        Some(self.define_free(symbol))
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        let name = original.name.clone();
        let attribute = original.attribute.clone();

        self.free_symbols.push(original);

        let symbol = Symbol {
            name: name.clone(),
            scope: SymbolScope::Free,
            index: self.free_symbols.len() - 1,
            attribute,
        };

        self.store.insert(name, symbol.clone());
        symbol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn define_any(table: &mut SymbolTable, name: &str) -> Symbol {
        table.define(name, Attribute::default())
    }

    fn assert_symbol(symbol: &Symbol, name: &str, scope: SymbolScope, index: usize) {
        assert_eq!(symbol.name, name);
        assert_eq!(symbol.scope, scope, "scope of {name}");
        assert_eq!(symbol.index, index, "index of {name}");
    }

    #[test]
    fn define_allocates_indices_per_scope() {
        let mut global = SymbolTable::new();
        assert_symbol(&define_any(&mut global, "a"), "a", SymbolScope::Global, 0);
        assert_symbol(&define_any(&mut global, "b"), "b", SymbolScope::Global, 1);

        let mut first_local = SymbolTable::enclosed(global);
        assert_symbol(&define_any(&mut first_local, "c"), "c", SymbolScope::Local, 0);
        assert_symbol(&define_any(&mut first_local, "d"), "d", SymbolScope::Local, 1);

        let mut second_local = SymbolTable::enclosed(first_local);
        assert_symbol(&define_any(&mut second_local, "e"), "e", SymbolScope::Local, 0);
        assert_symbol(&define_any(&mut second_local, "f"), "f", SymbolScope::Local, 1);
    }

    #[test]
    fn resolve_global() {
        let mut global = SymbolTable::new();
        define_any(&mut global, "a");
        define_any(&mut global, "b");

        let a = global.resolve("a").unwrap();
        assert_symbol(&a, "a", SymbolScope::Global, 0);
        let b = global.resolve("b").unwrap();
        assert_symbol(&b, "b", SymbolScope::Global, 1);
        assert!(global.resolve("c").is_none());
    }

    #[test]
    fn resolve_local_and_global_through_nesting() {
        let mut global = SymbolTable::new();
        define_any(&mut global, "a");
        define_any(&mut global, "b");

        let mut local = SymbolTable::enclosed(global);
        define_any(&mut local, "c");
        define_any(&mut local, "d");

        assert_symbol(&local.resolve("a").unwrap(), "a", SymbolScope::Global, 0);
        assert_symbol(&local.resolve("b").unwrap(), "b", SymbolScope::Global, 1);
        assert_symbol(&local.resolve("c").unwrap(), "c", SymbolScope::Local, 0);
        assert_symbol(&local.resolve("d").unwrap(), "d", SymbolScope::Local, 1);
    }

    #[test]
    fn resolve_promotes_free_variables() {
        let mut global = SymbolTable::new();
        define_any(&mut global, "a");
        define_any(&mut global, "b");

        let mut first_local = SymbolTable::enclosed(global);
        define_any(&mut first_local, "c");
        define_any(&mut first_local, "d");

        let mut second_local = SymbolTable::enclosed(first_local);
        define_any(&mut second_local, "e");
        define_any(&mut second_local, "f");

        // globals pass through untouched
        assert_symbol(&second_local.resolve("a").unwrap(), "a", SymbolScope::Global, 0);
        assert_symbol(&second_local.resolve("b").unwrap(), "b", SymbolScope::Global, 1);

        // locals of the enclosing scope become free here
        assert_symbol(&second_local.resolve("c").unwrap(), "c", SymbolScope::Free, 0);
        assert_symbol(&second_local.resolve("d").unwrap(), "d", SymbolScope::Free, 1);
        assert_symbol(&second_local.resolve("e").unwrap(), "e", SymbolScope::Local, 0);
        assert_symbol(&second_local.resolve("f").unwrap(), "f", SymbolScope::Local, 1);

        assert_eq!(second_local.free_symbols.len(), 2);
        assert_symbol(&second_local.free_symbols[0], "c", SymbolScope::Local, 0);
        assert_symbol(&second_local.free_symbols[1], "d", SymbolScope::Local, 1);

        // a second resolve reuses the existing free slot
        assert_symbol(&second_local.resolve("c").unwrap(), "c", SymbolScope::Free, 0);
        assert_eq!(second_local.free_symbols.len(), 2);
    }

    #[test]
    fn resolve_builtins_from_any_depth() {
        let mut global = SymbolTable::new();
        global.define_builtin(0, "len", Attribute::default());
        global.define_builtin(1, "push", Attribute::default());

        let mut nested = SymbolTable::enclosed(SymbolTable::enclosed(global));

        assert_symbol(&nested.resolve("len").unwrap(), "len", SymbolScope::Builtin, 0);
        assert_symbol(&nested.resolve("push").unwrap(), "push", SymbolScope::Builtin, 1);
        assert!(nested.free_symbols.is_empty());
    }

    #[test]
    fn function_name_resolves_and_can_be_shadowed() {
        let mut table = SymbolTable::enclosed(SymbolTable::new());
        table.define_function_name("outer", Attribute::default());

        assert_symbol(&table.resolve("outer").unwrap(), "outer", SymbolScope::Function, 0);

        // a user-level shadow wins over the self-reference
        define_any(&mut table, "outer");
        assert_symbol(&table.resolve("outer").unwrap(), "outer", SymbolScope::Local, 0);
    }

    #[test]
    fn into_outer_returns_the_enclosing_table() {
        let mut global = SymbolTable::new();
        define_any(&mut global, "a");

        let local = SymbolTable::enclosed(global);
        let mut unwrapped = local.into_outer().unwrap();
        assert!(unwrapped.resolve("a").is_some());
        assert!(unwrapped.into_outer().is_none());
    }
}
