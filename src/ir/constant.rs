//! Per-proc constant pool.
//!
//! Interning hashes on (type, value); floats are keyed by their bit pattern so
//! `0.0` and `-0.0` stay distinct and NaN can be pooled at all.

use hashbrown::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstantValue<'a> {
    Integer(i64),
    Number(f64),
    String(&'a str),
}

impl ConstantValue<'_> {
    fn type_name(&self) -> &'static str {
        match self {
            ConstantValue::Integer(_) => "Kint",
            ConstantValue::Number(_) => "Kflt",
            ConstantValue::String(_) => "Ks",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ConstantKey<'a> {
    Integer(i64),
    Number(u64),
    String(&'a str),
}

impl<'a> From<ConstantValue<'a>> for ConstantKey<'a> {
    fn from(value: ConstantValue<'a>) -> Self {
        match value {
            ConstantValue::Integer(i) => ConstantKey::Integer(i),
            ConstantValue::Number(n) => ConstantKey::Number(n.to_bits()),
            ConstantValue::String(s) => ConstantKey::String(s),
        }
    }
}

/// Deduplicated constants with stable sequential indices.
#[derive(Debug, Default)]
pub struct ConstantPool<'a> {
    entries: Vec<ConstantValue<'a>>,
    lookup: HashMap<ConstantKey<'a>, u32>,
}

impl<'a> ConstantPool<'a> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    /// Index of `value`, inserting it if needed. The flag is true for a new entry.
    pub fn intern(&mut self, value: ConstantValue<'a>) -> (u32, bool) {
        let key = ConstantKey::from(value);
        if let Some(&index) = self.lookup.get(&key) {
            return (index, false);
        }
        let index = self.entries.len() as u32;
        self.entries.push(value);
        self.lookup.insert(key, index);
        (index, true)
    }

    pub fn get(&self, index: u32) -> Option<ConstantValue<'a>> {
        self.entries.get(index as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, ConstantValue<'a>)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, v)| (i as u32, *v))
    }
}

/// Constant pseudo printed with its value, e.g. `1 Kint(0)`.
pub struct ConstantDisplay<'a> {
    pub index: u32,
    pub value: ConstantValue<'a>,
}

impl fmt::Display for ConstantDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            ConstantValue::Integer(i) => write!(f, "{}", i)?,
            ConstantValue::Number(n) => write!(f, "{:?}", n)?,
            ConstantValue::String(s) => write!(f, "'{}'", s)?,
        }
        write!(f, " {}({})", self.value.type_name(), self.index)
    }
}
