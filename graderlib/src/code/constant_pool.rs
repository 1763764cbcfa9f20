use std::collections::HashMap;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstantPoolError {
    #[error("constant pool index {index} out of bounds, the pool has {len} entries")]
    OutOfBounds { index: usize, len: usize },
    #[error("constant pool entry had unexpected type {actual:?}. Expected type {expected:?}")]
    TypeMismatched {
        expected: EntryType,
        actual: EntryType,
    },
}

/// Type of the entry in the constant pool.
/// The discriminant is the entry's tag in the class file.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
#[repr(u8)]
pub enum EntryType {
    Int = 1,
    Char = 2,
    /// Also used for symbolic references, like method refs.
    String = 3,
}

impl EntryType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Int),
            2 => Some(Self::Char),
            3 => Some(Self::String),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypedEntry {
    Int(i64),
    Char(char),
    String(String),
}

impl TypedEntry {
    pub fn typ(&self) -> EntryType {
        match self {
            TypedEntry::Int(_) => EntryType::Int,
            TypedEntry::Char(_) => EntryType::Char,
            TypedEntry::String(_) => EntryType::String,
        }
    }
}

impl From<i64> for TypedEntry {
    fn from(val: i64) -> Self {
        Self::Int(val)
    }
}

impl From<char> for TypedEntry {
    fn from(val: char) -> Self {
        Self::Char(val)
    }
}

impl From<String> for TypedEntry {
    fn from(val: String) -> Self {
        Self::String(val)
    }
}

impl From<&str> for TypedEntry {
    fn from(val: &str) -> Self {
        Self::String(val.to_owned())
    }
}

/// Retrieves a typed value out of an entry.
pub trait Tagged: Sized {
    fn tag() -> EntryType;

    fn from_entry(entry: &TypedEntry) -> Option<Self>;
}

impl Tagged for i64 {
    fn tag() -> EntryType {
        EntryType::Int
    }

    fn from_entry(entry: &TypedEntry) -> Option<Self> {
        match entry {
            TypedEntry::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl Tagged for char {
    fn tag() -> EntryType {
        EntryType::Char
    }

    fn from_entry(entry: &TypedEntry) -> Option<Self> {
        match entry {
            TypedEntry::Char(c) => Some(*c),
            _ => None,
        }
    }
}

impl Tagged for String {
    fn tag() -> EntryType {
        EntryType::String
    }

    fn from_entry(entry: &TypedEntry) -> Option<Self> {
        match entry {
            TypedEntry::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

/// Constants of one class. Equal entries are interned and share an index.
#[derive(Clone, Debug, Default)]
pub struct ConstantPool {
    entries: Vec<TypedEntry>,
    interned: HashMap<TypedEntry, usize>,
}

impl PartialEq for ConstantPool {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for ConstantPool {}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, entry: impl Into<TypedEntry>) -> usize {
        let entry = entry.into();
        if let Some(id) = self.interned.get(&entry) {
            return *id;
        }
        let id = self.entries.len();
        self.interned.insert(entry.clone(), id);
        self.entries.push(entry);
        id
    }

    pub fn get<T: Tagged>(&self, index: usize) -> Result<T, ConstantPoolError> {
        let entry = self.entry(index)?;
        T::from_entry(entry).ok_or(ConstantPoolError::TypeMismatched {
            expected: T::tag(),
            actual: entry.typ(),
        })
    }

    pub fn entry(&self, index: usize) -> Result<&TypedEntry, ConstantPoolError> {
        self.entries
            .get(index)
            .ok_or(ConstantPoolError::OutOfBounds {
                index,
                len: self.entries.len(),
            })
    }

    pub fn entries(&self) -> &[TypedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<TypedEntry> for ConstantPool {
    /// Builds a pool keeping the order of the entries,
    /// duplicates keep their own indices.
    fn from_iter<T: IntoIterator<Item = TypedEntry>>(iter: T) -> Self {
        let mut pool = ConstantPool::new();
        for entry in iter {
            let id = pool.entries.len();
            pool.interned.entry(entry.clone()).or_insert(id);
            pool.entries.push(entry);
        }
        pool
    }
}
