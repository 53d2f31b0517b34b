//! Symbol interning.
//!
//! The intern table is an ordinary hash table, keyed by the symbol's name
//! string, pinned for the life of the store. Interned symbols are never
//! collected.

use super::compare::hash_bytes;
use super::objects::{Object, Symbol, Value};
use super::table::Table;
use super::Storage;
use crate::error::Result;

impl Storage {
    fn intern_table(&self) -> Result<Value> {
        if let Some(pin) = self.symbols.get() {
            return Ok(self.pinned(pin));
        }
        let table = self.alloc(Object::Table(Table::new()))?;
        self.symbols.set(Some(self.pin(table)));
        Ok(table)
    }

    /// The symbol with this name, created if needed.
    pub fn intern(&self, name: &[u8]) -> Result<Value> {
        let table = self.intern_table()?;
        let found = {
            let heap = self.heap();
            let hash = hash_bytes(name);
            heap.table(table)?
                .get(hash, |k| Ok(heap.string(k)?.as_slice() == name))?
        };
        if let Some(sym) = found {
            return Ok(sym);
        }

        let s = self.root(self.put_string(name)?);
        let sym = self.alloc(Object::Symbol(Symbol { name: s.get() }))?;
        self.table_set(table, s.get(), sym)?;
        Ok(sym)
    }

    pub fn intern_str(&self, name: &str) -> Result<Value> {
        self.intern(name.as_bytes())
    }

    /// A fresh symbol that is not in the intern table.
    pub fn gensym(&self, prefix: &str) -> Result<Value> {
        let n = self.gensym_counter.get();
        self.gensym_counter.set(n + 1);
        let s = self.put_string(format!("{prefix}{n}").as_bytes())?;
        self.alloc(Object::Symbol(Symbol { name: s }))
    }

    /// The string object naming a symbol.
    pub fn symbol_name(&self, sym: Value) -> Result<Value> {
        Ok(self.heap().symbol(sym)?.name)
    }

    pub fn symbol_bytes(&self, sym: Value) -> Result<Vec<u8>> {
        let heap = self.heap();
        let name = heap.symbol(sym)?.name;
        Ok(heap.string(name)?.as_slice().to_vec())
    }

    /// Number of interned symbols.
    pub fn symbol_count(&self) -> usize {
        match self.symbols.get() {
            Some(pin) => self.table_count(self.pinned(pin)).unwrap_or(0),
            None => 0,
        }
    }
}
