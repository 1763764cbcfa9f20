//! Type checked tree handed to the emitter.
//! Names are already resolved to local slots and call targets.

use grader_syntax::ast::BinOp;

use crate::signature::{MethodDescriptor, MethodRef, Type};

#[derive(Debug, Clone, PartialEq)]
pub struct TypedClass {
    /// Qualified name.
    pub name: String,
    pub interfaces: Vec<String>,
    pub methods: Vec<TypedMethod>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedMethod {
    pub name: String,
    pub descriptor: MethodDescriptor,
    /// Number of local slots, parameters included.
    pub locals: usize,
    pub body: Block,
    /// Line of the closing brace, attributed to the implicit return.
    pub end_line: usize,
}

pub type Block = Vec<Expr>;

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub typ: Type,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Unit,
    Int(i64),
    Bool(bool),
    Char(char),
    Str(String),
    Local(usize),
    Store {
        slot: usize,
        value: Box<Expr>,
    },
    /// Arithmetic and comparisons, both operands have the same type.
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Concat {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `Char` used where an `Int` is expected.
    Widen(Box<Expr>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    And {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Or {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        target: CallTarget,
        receiver: Option<Box<Expr>>,
        args: Vec<Expr>,
    },
    If {
        cond: Box<Expr>,
        body: Block,
        else_body: Option<Block>,
    },
    While {
        cond: Box<Expr>,
        body: Block,
    },
    /// Iteration over the characters of a string using two hidden slots.
    ForEach {
        binding: usize,
        string_slot: usize,
        index_slot: usize,
        iterable: Box<Expr>,
        body: Block,
    },
    Return(Box<Expr>),
    Break,
    Continue,
    /// Call used as a statement, its value is dropped.
    Discard(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    /// Method of the calling class, by index.
    Local(usize),
    Static(MethodRef),
    Virtual(MethodRef),
}

impl Expr {
    pub fn new(kind: ExprKind, typ: Type, line: usize) -> Self {
        Self { kind, typ, line }
    }
}
