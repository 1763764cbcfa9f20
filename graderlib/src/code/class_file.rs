//! Binary encoding of a compiled class.
//!
//! ```text
//! magic "GRDR" | version u16 | name | flags u8 | source name if flags & 1
//! interfaces: u16 count, names
//! constants:  u32 count, tag u8 + value
//! methods:    u16 count, name | descriptor | locals u32 | code u32 len + bytes
//!             | line table (version >= 2): u32 count, (offset u32, line u32)
//! ```
//! Integers are little endian, strings are a u32 byte length followed by utf-8.

use thiserror::Error;

use crate::signature::{DescriptorError, MethodDescriptor};

use super::constant_pool::{ConstantPool, EntryType, TypedEntry};

pub const MAGIC: [u8; 4] = *b"GRDR";
pub const MIN_VERSION: u16 = 1;
/// Highest format version produced and accepted.
pub const CURRENT_VERSION: u16 = 2;
/// First version carrying line tables.
pub const LINE_TABLE_VERSION: u16 = 2;

const FLAG_SOURCE_FILE: u8 = 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassFormatError {
    #[error("bad magic number, not a class file")]
    BadMagic,
    #[error("unexpected end of class file at byte {offset}")]
    Truncated { offset: usize },
    #[error("invalid utf-8 string at byte {offset}")]
    InvalidUtf8 { offset: usize },
    #[error("unknown constant tag {tag} at byte {offset}")]
    UnknownConstantTag { tag: u8, offset: usize },
    #[error("invalid char constant {0:#x}")]
    InvalidChar(u32),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("{0} trailing bytes after the class")]
    TrailingBytes(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineEntry {
    /// Offset of the first instruction of the line.
    pub offset: u32,
    pub line: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodInfo {
    pub name: String,
    pub descriptor: MethodDescriptor,
    pub max_locals: u32,
    pub code: Vec<u8>,
    pub line_table: Vec<LineEntry>,
}

impl MethodInfo {
    /// Source line of the instruction at `offset`, if the method has a line table.
    pub fn line_of(&self, offset: usize) -> Option<u32> {
        self.line_table
            .iter()
            .take_while(|e| e.offset as usize <= offset)
            .last()
            .map(|e| e.line)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassFile {
    pub version: u16,
    pub name: String,
    pub source_file: Option<String>,
    pub interfaces: Vec<String>,
    pub constant_pool: ConstantPool,
    pub methods: Vec<MethodInfo>,
}

impl ClassFile {
    /// Reads only the header so that unsupported versions can be
    /// rejected before the rest of the file is interpreted.
    pub fn peek_version(bytes: &[u8]) -> Result<u16, ClassFormatError> {
        let mut reader = Reader::new(bytes);
        reader.magic()?;
        reader.u16()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::default();
        w.bytes(&MAGIC);
        w.u16(self.version);
        w.str(&self.name);
        match &self.source_file {
            Some(source) => {
                w.u8(FLAG_SOURCE_FILE);
                w.str(source);
            }
            None => w.u8(0),
        }
        w.u16(self.interfaces.len() as u16);
        for iface in &self.interfaces {
            w.str(iface);
        }
        w.u32(self.constant_pool.len() as u32);
        for entry in self.constant_pool.entries() {
            w.u8(entry.typ() as u8);
            match entry {
                TypedEntry::Int(i) => w.bytes(&i.to_le_bytes()),
                TypedEntry::Char(c) => w.u32(*c as u32),
                TypedEntry::String(s) => w.str(s),
            }
        }
        w.u16(self.methods.len() as u16);
        for method in &self.methods {
            w.str(&method.name);
            w.str(&method.descriptor.to_string());
            w.u32(method.max_locals);
            w.u32(method.code.len() as u32);
            w.bytes(&method.code);
            if self.version >= LINE_TABLE_VERSION {
                w.u32(method.line_table.len() as u32);
                for entry in &method.line_table {
                    w.u32(entry.offset);
                    w.u32(entry.line);
                }
            }
        }
        w.buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<ClassFile, ClassFormatError> {
        let mut r = Reader::new(bytes);
        r.magic()?;
        let version = r.u16()?;
        let name = r.str()?;
        let flags = r.u8()?;
        let source_file = if flags & FLAG_SOURCE_FILE != 0 {
            Some(r.str()?)
        } else {
            None
        };
        let interfaces = (0..r.u16()?)
            .map(|_| r.str())
            .collect::<Result<Vec<_>, _>>()?;

        let constants = r.u32()?;
        let mut entries = Vec::new();
        for _ in 0..constants {
            let offset = r.offset;
            let tag = r.u8()?;
            let entry = match EntryType::from_tag(tag) {
                Some(EntryType::Int) => TypedEntry::Int(i64::from_le_bytes(r.array()?)),
                Some(EntryType::Char) => {
                    let code = r.u32()?;
                    TypedEntry::Char(char::from_u32(code).ok_or(ClassFormatError::InvalidChar(code))?)
                }
                Some(EntryType::String) => TypedEntry::String(r.str()?),
                None => return Err(ClassFormatError::UnknownConstantTag { tag, offset }),
            };
            entries.push(entry);
        }
        let constant_pool = entries.into_iter().collect();

        let mut methods = Vec::new();
        for _ in 0..r.u16()? {
            let name = r.str()?;
            let descriptor = MethodDescriptor::parse(&r.str()?)?;
            let max_locals = r.u32()?;
            let len = r.u32()? as usize;
            let code = r.take(len)?.to_vec();
            let mut line_table = Vec::new();
            if version >= LINE_TABLE_VERSION {
                for _ in 0..r.u32()? {
                    line_table.push(LineEntry {
                        offset: r.u32()?,
                        line: r.u32()?,
                    });
                }
            }
            methods.push(MethodInfo {
                name,
                descriptor,
                max_locals,
                code,
                line_table,
            });
        }
        if r.remaining() > 0 {
            return Err(ClassFormatError::TrailingBytes(r.remaining()));
        }
        Ok(ClassFile {
            version,
            name,
            source_file,
            interfaces,
            constant_pool,
            methods,
        })
    }

    pub fn method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.name == name)
    }
}

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.bytes(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.bytes(&v.to_le_bytes());
    }

    fn str(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.bytes(s.as_bytes());
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ClassFormatError> {
        let end = self
            .offset
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(ClassFormatError::Truncated {
                offset: self.bytes.len(),
            })?;
        let res = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(res)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ClassFormatError> {
        let mut res = [0; N];
        res.copy_from_slice(self.take(N)?);
        Ok(res)
    }

    fn magic(&mut self) -> Result<(), ClassFormatError> {
        match self.take(MAGIC.len()) {
            Ok(magic) if magic == MAGIC => Ok(()),
            _ => Err(ClassFormatError::BadMagic),
        }
    }

    fn u8(&mut self) -> Result<u8, ClassFormatError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, ClassFormatError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, ClassFormatError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn str(&mut self) -> Result<String, ClassFormatError> {
        let len = self.u32()? as usize;
        let offset = self.offset;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ClassFormatError::InvalidUtf8 { offset })
    }
}
