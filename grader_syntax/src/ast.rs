use std::ops::Range;

pub type Span = Range<usize>;

#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub package: Option<Path>,
    pub classes: Vec<ClassDefinition>,
}

impl SourceFile {
    pub fn package_name(&self) -> Option<String> {
        self.package.as_ref().map(Path::dotted)
    }
}

/// Dot separated name, like `com.getman.grader.Solution`.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub segments: Vec<String>,
    pub span: Span,
}

impl Path {
    pub fn dotted(&self) -> String {
        self.segments.join(".")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDefinition {
    pub name: String,
    pub implements: Vec<Path>,
    pub methods: Vec<MethodDefinition>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDefinition {
    pub name: String,
    pub parameters: Vec<TypedName>,
    pub ret: Typ,
    pub body: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedName {
    pub name: String,
    pub typ: Typ,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Typ {
    Unit,
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Unit,
    IntConst(i64),
    BoolConst(bool),
    CharConst(char),
    StringConst(String),
    Name(String),
    Sequence(Vec<Expr>),
    Let {
        name: String,
        typ: Option<Typ>,
        init: Box<Expr>,
    },
    Assignment {
        lval: Box<Expr>,
        rval: Box<Expr>,
    },
    BinOp {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    UnOp {
        op: UnOp,
        expr: Box<Expr>,
    },
    FunctionCall {
        func: String,
        args: Vec<Expr>,
    },
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    Access {
        val: Box<Expr>,
        field: String,
    },
    If {
        cond: Box<Expr>,
        body: Box<Expr>,
        else_body: Option<Box<Expr>>,
    },
    While {
        cond: Box<Expr>,
        body: Box<Expr>,
    },
    For {
        binding: String,
        iterable: Box<Expr>,
        body: Box<Expr>,
    },
    Return(Box<Expr>),
    Break,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Less => "<",
            BinOp::LessEq => "<=",
            BinOp::Greater => ">",
            BinOp::GreaterEq => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

impl UnOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Not => "!",
        }
    }
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Compact s-expression rendering of the tree, spans omitted.
    /// Used by the parser tests and the `--print-ast` debugging output.
    pub fn to_sexpr(&self) -> String {
        fn list(head: &str, items: impl IntoIterator<Item = String>) -> String {
            let mut res = format!("({head}");
            for item in items {
                res.push(' ');
                res.push_str(&item);
            }
            res.push(')');
            res
        }
        fn args(args: &[Expr]) -> String {
            list("args", args.iter().map(Expr::to_sexpr))
        }

        match &self.kind {
            ExprKind::Unit => "unit".to_owned(),
            ExprKind::IntConst(i) => i.to_string(),
            ExprKind::BoolConst(b) => b.to_string(),
            ExprKind::CharConst(c) => format!("{c:?}"),
            ExprKind::StringConst(s) => format!("{s:?}"),
            ExprKind::Name(n) => n.clone(),
            ExprKind::Sequence(items) => list("seq", items.iter().map(Expr::to_sexpr)),
            ExprKind::Let { name, typ, init } => {
                let mut items = vec![name.clone()];
                if let Some(typ) = typ {
                    items.push(typ.to_string());
                }
                items.push(init.to_sexpr());
                list("let", items)
            }
            ExprKind::Assignment { lval, rval } => {
                list("=", [lval.to_sexpr(), rval.to_sexpr()])
            }
            ExprKind::BinOp { op, lhs, rhs } => list(op.symbol(), [lhs.to_sexpr(), rhs.to_sexpr()]),
            ExprKind::UnOp { op, expr } => list(op.symbol(), [expr.to_sexpr()]),
            ExprKind::FunctionCall { func, args: a } => list("call", [func.clone(), args(a)]),
            ExprKind::MethodCall {
                receiver,
                method,
                args: a,
            } => list("mcall", [receiver.to_sexpr(), method.clone(), args(a)]),
            ExprKind::Access { val, field } => list("access", [val.to_sexpr(), field.clone()]),
            ExprKind::If {
                cond,
                body,
                else_body,
            } => {
                let mut items = vec![cond.to_sexpr(), body.to_sexpr()];
                if let Some(else_body) = else_body {
                    items.push(else_body.to_sexpr());
                }
                list("if", items)
            }
            ExprKind::While { cond, body } => list("while", [cond.to_sexpr(), body.to_sexpr()]),
            ExprKind::For {
                binding,
                iterable,
                body,
            } => list(
                "for",
                [binding.clone(), iterable.to_sexpr(), body.to_sexpr()],
            ),
            ExprKind::Return(e) => list("return", [e.to_sexpr()]),
            ExprKind::Break => "break".to_owned(),
            ExprKind::Continue => "continue".to_owned(),
        }
    }

    /// Returns true if this expression is a statement that cannot
    /// complete normally.
    pub fn diverges(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Return(_) | ExprKind::Break | ExprKind::Continue
        )
    }
}

impl std::fmt::Display for Typ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Typ::Unit => write!(f, "Unit"),
            Typ::Name(name) => write!(f, "{name}"),
        }
    }
}

impl MethodDefinition {
    pub fn to_sexpr(&self) -> String {
        let params = self
            .parameters
            .iter()
            .map(|p| format!("({} {})", p.name, p.typ))
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "(method {} ({}) {} {})",
            self.name,
            params,
            self.ret,
            self.body.to_sexpr()
        )
    }
}

impl ClassDefinition {
    pub fn to_sexpr(&self) -> String {
        let implements = self
            .implements
            .iter()
            .map(Path::dotted)
            .collect::<Vec<_>>()
            .join(" ");
        let mut res = format!("(class {} [{}]", self.name, implements);
        for method in &self.methods {
            res.push(' ');
            res.push_str(&method.to_sexpr());
        }
        res.push(')');
        res
    }
}
