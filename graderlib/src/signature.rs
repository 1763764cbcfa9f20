use std::fmt::Display;

use thiserror::Error;

/// Value types of the unit language.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Unit,
    Int,
    Bool,
    Char,
    String,
}

impl Type {
    pub fn from_name(name: &str) -> Option<Type> {
        match name {
            "Unit" => Some(Type::Unit),
            "Int" => Some(Type::Int),
            "Bool" => Some(Type::Bool),
            "Char" => Some(Type::Char),
            "String" => Some(Type::String),
            _ => None,
        }
    }

    pub fn descriptor(&self) -> char {
        match self {
            Type::Unit => 'V',
            Type::Int => 'I',
            Type::Bool => 'Z',
            Type::Char => 'C',
            Type::String => 'S',
        }
    }

    pub fn from_descriptor(c: char) -> Option<Type> {
        match c {
            'V' => Some(Type::Unit),
            'I' => Some(Type::Int),
            'Z' => Some(Type::Bool),
            'C' => Some(Type::Char),
            'S' => Some(Type::String),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Char)
    }

    /// Value of type `from` can be stored where `self` is expected.
    /// The only implicit conversion is `Char` to `Int`.
    pub fn accepts(&self, from: Type) -> bool {
        *self == from || (*self == Type::Int && from == Type::Char)
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Type::Unit => "Unit",
            Type::Int => "Int",
            Type::Bool => "Bool",
            Type::Char => "Char",
            Type::String => "String",
        };
        write!(f, "{name}")
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed descriptor `{0}`")]
pub struct DescriptorError(pub String);

/// Parameter and return types of a method, written as `(IC)Z`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    pub params: Vec<Type>,
    pub ret: Type,
}

impl MethodDescriptor {
    pub fn new(params: Vec<Type>, ret: Type) -> Self {
        Self { params, ret }
    }

    pub fn parse(s: &str) -> Result<Self, DescriptorError> {
        let err = || DescriptorError(s.to_owned());
        let rest = s.strip_prefix('(').ok_or_else(err)?;
        let (params, ret) = rest.split_once(')').ok_or_else(err)?;
        let params = params
            .chars()
            .map(|c| match Type::from_descriptor(c) {
                Some(Type::Unit) | None => Err(err()),
                Some(t) => Ok(t),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut ret_chars = ret.chars();
        let ret = ret_chars
            .next()
            .and_then(Type::from_descriptor)
            .ok_or_else(err)?;
        if ret_chars.next().is_some() {
            return Err(err());
        }
        Ok(Self { params, ret })
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl Display for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for p in &self.params {
            write!(f, "{}", p.descriptor())?;
        }
        write!(f, "){}", self.ret.descriptor())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSignature {
    pub name: String,
    pub descriptor: MethodDescriptor,
    /// Type of the receiver for instance methods of platform classes.
    /// Methods of compiled classes are called without one.
    pub receiver: Option<Type>,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>, params: Vec<Type>, ret: Type) -> Self {
        Self {
            name: name.into(),
            descriptor: MethodDescriptor::new(params, ret),
            receiver: None,
        }
    }

    pub fn instance(name: impl Into<String>, receiver: Type, params: Vec<Type>, ret: Type) -> Self {
        Self {
            receiver: Some(receiver),
            ..Self::new(name, params, ret)
        }
    }

    /// Human readable form used in diagnostics, `solution(Int)`.
    pub fn display_params(&self) -> String {
        let params = self
            .descriptor
            .params
            .iter()
            .map(Type::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({params})", self.name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassKind {
    /// Compiled from source, instantiable.
    Class,
    /// Provided by the runtime, only static or receiver methods.
    Native,
}

/// Compile time view of a class visible on the class path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassSignature {
    pub name: String,
    pub kind: ClassKind,
    pub interfaces: Vec<String>,
    pub methods: Vec<MethodSignature>,
}

impl ClassSignature {
    pub fn method(&self, name: &str) -> Option<(usize, &MethodSignature)> {
        self.methods
            .iter()
            .enumerate()
            .find(|(_, m)| m.name == name)
    }
}

/// A capability contract that compiled classes can declare with `implements`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub methods: Vec<MethodSignature>,
}

impl Interface {
    pub fn new(name: impl Into<String>, methods: Vec<MethodSignature>) -> Self {
        Self {
            name: name.into(),
            methods,
        }
    }

    pub fn simple_name(&self) -> &str {
        simple_name(&self.name)
    }
}

/// Symbolic reference to a method of another class, stored in the
/// constant pool as `pkg.Cls::name(I)I`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub class: String,
    pub name: String,
    pub descriptor: MethodDescriptor,
}

impl MethodRef {
    pub fn parse(s: &str) -> Result<Self, DescriptorError> {
        let err = || DescriptorError(s.to_owned());
        let (class, rest) = s.split_once("::").ok_or_else(err)?;
        let paren = rest.find('(').ok_or_else(err)?;
        let (name, descriptor) = rest.split_at(paren);
        if class.is_empty() || name.is_empty() {
            return Err(err());
        }
        Ok(Self {
            class: class.to_owned(),
            name: name.to_owned(),
            descriptor: MethodDescriptor::parse(descriptor)?,
        })
    }
}

impl Display for MethodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}{}", self.class, self.name, self.descriptor)
    }
}

pub fn simple_name(qualified: &str) -> &str {
    qualified.rsplit('.').next().unwrap_or(qualified)
}

/// Compile time lookup of classes not defined in the compiled unit.
pub trait ClassPath {
    fn class_signature(&self, name: &str) -> Option<ClassSignature>;
}

/// Class path that knows no classes.
pub struct EmptyClassPath;

impl ClassPath for EmptyClassPath {
    fn class_signature(&self, _name: &str) -> Option<ClassSignature> {
        None
    }
}
