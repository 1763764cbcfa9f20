use std::ops::Range;

use grader_syntax::ast::{self, BinOp, UnOp};

use crate::{
    diagnostics::Reporter,
    scope::Scope,
    signature::{ClassSignature, MethodRef, MethodSignature, Type},
};

use super::{
    flow,
    typed::{Block, CallTarget, Expr, ExprKind, TypedMethod},
    UnitEnv,
};

/// The error has already been reported, the enclosing statement is dropped.
struct Reported;

type CheckRes<T> = Result<T, Reported>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum LocalKind {
    /// Parameters and loop variables.
    Bound,
    Let,
    /// Slots introduced by lowering, not nameable.
    Hidden,
}

struct Local {
    name: String,
    /// None if the declaration had errors, uses are then silently rejected.
    typ: Option<Type>,
    kind: LocalKind,
    used: bool,
    span: Range<usize>,
}

struct MethodChecker<'a, 'r, 's> {
    env: &'a UnitEnv<'a>,
    class: &'a ClassSignature,
    method: &'a MethodSignature,
    reporter: &'r mut Reporter<'s>,
    scope: Scope<String, usize>,
    locals: Vec<Local>,
    loops: usize,
}

pub fn check_method(
    env: &UnitEnv,
    class: &ClassSignature,
    method: &MethodSignature,
    def: &ast::MethodDefinition,
    reporter: &mut Reporter,
) -> TypedMethod {
    let mut checker = MethodChecker {
        env,
        class,
        method,
        reporter,
        scope: Scope::default(),
        locals: Vec::new(),
        loops: 0,
    };
    for (param, typ) in def.parameters.iter().zip(&method.descriptor.params) {
        checker.declare(&param.name, Some(*typ), LocalKind::Bound, param.span.clone());
    }
    let body = checker.check_block(&def.body);
    let closing_brace = def.span.end.saturating_sub(1);
    if method.descriptor.ret != Type::Unit && flow::block_completes_normally(&body) {
        checker
            .reporter
            .error(closing_brace..def.span.end, "missing return statement");
    }
    TypedMethod {
        name: method.name.clone(),
        descriptor: method.descriptor.clone(),
        locals: checker.locals.len(),
        body,
        end_line: checker.reporter.line(closing_brace),
    }
}

/// Segments of a dotted name used as a call receiver, `a.b.C`.
fn receiver_path(expr: &ast::Expr) -> Option<Vec<&str>> {
    match &expr.kind {
        ast::ExprKind::Name(name) => Some(vec![name.as_str()]),
        ast::ExprKind::Access { val, field } => {
            let mut path = receiver_path(val)?;
            path.push(field.as_str());
            Some(path)
        }
        _ => None,
    }
}

impl<'a, 'r, 's> MethodChecker<'a, 'r, 's> {
    fn line(&self, span: &Range<usize>) -> usize {
        self.reporter.line(span.start)
    }

    fn error<T>(&mut self, span: Range<usize>, msg: impl Into<String>) -> CheckRes<T> {
        self.reporter.error(span, msg);
        Err(Reported)
    }

    fn declare(&mut self, name: &str, typ: Option<Type>, kind: LocalKind, span: Range<usize>) -> usize {
        let slot = self.locals.len();
        self.locals.push(Local {
            name: name.to_owned(),
            typ,
            kind,
            used: false,
            span,
        });
        if kind != LocalKind::Hidden {
            self.scope.add(name.to_owned(), slot);
        }
        slot
    }

    fn hidden_slot(&mut self) -> usize {
        self.declare("", None, LocalKind::Hidden, 0..0)
    }

    fn check_not_defined(&mut self, name: &str, span: Range<usize>) -> CheckRes<()> {
        if self.scope.contains(name) {
            let msg = format!(
                "variable `{name}` is already defined in method `{}`",
                self.method.name
            );
            return self.error(span, msg);
        }
        Ok(())
    }

    fn lookup_local(&mut self, name: &str, span: Range<usize>) -> CheckRes<usize> {
        match self.scope.get(name) {
            Some(slot) => Ok(*slot),
            None => self.error(span, format!("cannot find symbol: variable `{name}`")),
        }
    }

    fn local_type(&self, slot: usize) -> CheckRes<Type> {
        self.locals[slot].typ.ok_or(Reported)
    }

    fn check_block(&mut self, block: &ast::Expr) -> Block {
        let stmts = match &block.kind {
            ast::ExprKind::Sequence(stmts) => stmts.as_slice(),
            // else if
            _ => std::slice::from_ref(block),
        };
        self.scope.new_scope();
        let mut res = Vec::with_capacity(stmts.len());
        let mut diverged = false;
        let mut warned = false;
        for stmt in stmts {
            if diverged && !warned {
                self.reporter.warning(stmt.span.clone(), "unreachable statement");
                warned = true;
            }
            if let Ok(typed) = self.check_statement(stmt) {
                diverged |= !flow::completes_normally(&typed);
                res.push(typed);
            }
        }
        let mut popped = self.scope.pop_scope().into_values().collect::<Vec<_>>();
        popped.sort_unstable();
        for slot in popped {
            let local = &self.locals[slot];
            if local.kind == LocalKind::Let && !local.used {
                let msg = format!("variable `{}` is never used", local.name);
                self.reporter.warning(local.span.clone(), msg);
            }
        }
        res
    }

    fn check_statement(&mut self, stmt: &ast::Expr) -> CheckRes<Expr> {
        let line = self.line(&stmt.span);
        let kind = match &stmt.kind {
            ast::ExprKind::Let { name, typ, init } => {
                let init_span = init.span.clone();
                let init = self.check_expr(init);
                let annotated = match typ {
                    Some(typ) => {
                        super::resolve_type(typ, stmt.span.clone(), self.reporter).ok_or(Reported)
                    }
                    None => init.as_ref().map(|init| init.typ).map_err(|_| Reported),
                };
                self.check_not_defined(name, stmt.span.clone())?;
                let value = match (init, annotated) {
                    (Ok(_), Ok(Type::Unit)) => self.error(
                        stmt.span.clone(),
                        format!("variable `{name}` cannot have type Unit"),
                    ),
                    (Ok(init), Ok(typ)) => self.coerce(init, typ, init_span),
                    _ => Err(Reported),
                };
                let typ = value.as_ref().ok().map(|v| v.typ);
                let slot = self.declare(name, typ, LocalKind::Let, stmt.span.clone());
                ExprKind::Store {
                    slot,
                    value: Box::new(value?),
                }
            }
            ast::ExprKind::Assignment { lval, rval } => {
                let ast::ExprKind::Name(name) = &lval.kind else {
                    self.check_expr(rval)?;
                    return self.error(lval.span.clone(), "cannot assign to this expression");
                };
                let value = self.check_expr(rval);
                let slot = self.lookup_local(name, lval.span.clone())?;
                let typ = self.local_type(slot)?;
                let value = self.coerce(value?, typ, rval.span.clone())?;
                ExprKind::Store {
                    slot,
                    value: Box::new(value),
                }
            }
            ast::ExprKind::If {
                cond,
                body,
                else_body,
            } => {
                let cond = self.check_condition(cond);
                let body = self.check_block(body);
                let else_body = else_body.as_ref().map(|e| self.check_block(e));
                ExprKind::If {
                    cond: Box::new(cond?),
                    body,
                    else_body,
                }
            }
            ast::ExprKind::While { cond, body } => {
                let cond = self.check_condition(cond);
                self.loops += 1;
                let body = self.check_block(body);
                self.loops -= 1;
                ExprKind::While {
                    cond: Box::new(cond?),
                    body,
                }
            }
            ast::ExprKind::For {
                binding,
                iterable,
                body,
            } => {
                let iterable = self.check_expr(iterable).and_then(|it| match it.typ {
                    Type::String => Ok(it),
                    typ => self.error(
                        iterable.span.clone(),
                        format!("for-each not applicable to expression of type `{typ}`"),
                    ),
                });
                let string_slot = self.hidden_slot();
                let index_slot = self.hidden_slot();
                let defined = self.check_not_defined(binding, stmt.span.clone());
                self.scope.new_scope();
                let binding = self.declare(binding, Some(Type::Char), LocalKind::Bound, stmt.span.clone());
                self.loops += 1;
                let body = self.check_block(body);
                self.loops -= 1;
                self.scope.pop_scope();
                defined?;
                ExprKind::ForEach {
                    binding,
                    string_slot,
                    index_slot,
                    iterable: Box::new(iterable?),
                    body,
                }
            }
            ast::ExprKind::Return(value) => {
                let ret = self.method.descriptor.ret;
                let checked = self.check_expr(value).and_then(|checked| match (ret, checked.typ) {
                    (Type::Unit, Type::Unit) => Ok(checked),
                    (Type::Unit, _) => self.error(
                        value.span.clone(),
                        "incompatible types: unexpected return value",
                    ),
                    (_, Type::Unit) if matches!(value.kind, ast::ExprKind::Unit) => {
                        self.error(stmt.span.clone(), "missing return value")
                    }
                    _ => self.coerce(checked, ret, value.span.clone()),
                });
                // an ill-typed return still ends the block
                let checked = checked.unwrap_or_else(|_| Expr::new(ExprKind::Unit, ret, line));
                ExprKind::Return(Box::new(checked))
            }
            ast::ExprKind::Break | ast::ExprKind::Continue if self.loops == 0 => {
                let keyword = if matches!(stmt.kind, ast::ExprKind::Break) {
                    "break"
                } else {
                    "continue"
                };
                return self.error(stmt.span.clone(), format!("`{keyword}` outside of a loop"));
            }
            ast::ExprKind::Break => ExprKind::Break,
            ast::ExprKind::Continue => ExprKind::Continue,
            ast::ExprKind::FunctionCall { .. } | ast::ExprKind::MethodCall { .. } => {
                ExprKind::Discard(Box::new(self.check_expr(stmt)?))
            }
            _ => {
                let _ = self.check_expr(stmt);
                return self.error(stmt.span.clone(), "not a statement");
            }
        };
        Ok(Expr::new(kind, Type::Unit, line))
    }

    fn check_condition(&mut self, cond: &ast::Expr) -> CheckRes<Expr> {
        let checked = self.check_expr(cond)?;
        self.coerce(checked, Type::Bool, cond.span.clone())
    }

    /// Converts the expression to the expected type if it is assignable.
    fn coerce(&mut self, expr: Expr, expected: Type, span: Range<usize>) -> CheckRes<Expr> {
        if expr.typ == expected {
            return Ok(expr);
        }
        if expected.accepts(expr.typ) {
            return Ok(widen(expr));
        }
        let msg = format!(
            "incompatible types: `{}` cannot be converted to `{expected}`",
            expr.typ
        );
        self.error(span, msg)
    }

    fn check_expr(&mut self, expr: &ast::Expr) -> CheckRes<Expr> {
        let line = self.line(&expr.span);
        let (kind, typ) = match &expr.kind {
            ast::ExprKind::Unit => (ExprKind::Unit, Type::Unit),
            ast::ExprKind::IntConst(i) => (ExprKind::Int(*i), Type::Int),
            ast::ExprKind::BoolConst(b) => (ExprKind::Bool(*b), Type::Bool),
            ast::ExprKind::CharConst(c) => (ExprKind::Char(*c), Type::Char),
            ast::ExprKind::StringConst(s) => (ExprKind::Str(s.clone()), Type::String),
            ast::ExprKind::Name(name) => {
                let slot = self.lookup_local(name, expr.span.clone())?;
                self.locals[slot].used = true;
                (ExprKind::Local(slot), self.local_type(slot)?)
            }
            ast::ExprKind::BinOp { op, lhs, rhs } => {
                return self.check_binary(*op, lhs, rhs, expr.span.clone(), line)
            }
            ast::ExprKind::UnOp { op, expr: operand } => {
                let checked = self.check_expr(operand)?;
                match (op, checked.typ) {
                    (UnOp::Neg, t) if t.is_numeric() => {
                        (ExprKind::Neg(Box::new(widen(checked))), Type::Int)
                    }
                    (UnOp::Not, Type::Bool) => (ExprKind::Not(Box::new(checked)), Type::Bool),
                    (op, t) => {
                        let msg = format!(
                            "bad operand type `{t}` for unary operator `{}`",
                            op.symbol()
                        );
                        return self.error(expr.span.clone(), msg);
                    }
                }
            }
            ast::ExprKind::FunctionCall { func, args } => {
                let class = self.class;
                let Some((index, sig)) = class.method(func) else {
                    let msg = format!(
                        "cannot find symbol: method `{func}` in class `{}`",
                        class.name
                    );
                    return self.error(expr.span.clone(), msg);
                };
                let args = self.check_args(sig, &class.name, args, expr.span.clone())?;
                (
                    ExprKind::Call {
                        target: CallTarget::Local(index),
                        receiver: None,
                        args,
                    },
                    sig.descriptor.ret,
                )
            }
            ast::ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => return self.check_method_call(receiver, method, args, expr.span.clone(), line),
            ast::ExprKind::Access { .. } => {
                let name = receiver_path(expr)
                    .map(|p| p.join("."))
                    .unwrap_or_else(|| "field".to_owned());
                return self.error(expr.span.clone(), format!("cannot find symbol: `{name}`"));
            }
            _ => return self.error(expr.span.clone(), "illegal start of expression"),
        };
        Ok(Expr::new(kind, typ, line))
    }

    fn check_method_call(
        &mut self,
        receiver: &ast::Expr,
        method: &str,
        args: &[ast::Expr],
        span: Range<usize>,
        line: usize,
    ) -> CheckRes<Expr> {
        let is_local =
            matches!(&receiver.kind, ast::ExprKind::Name(n) if self.scope.contains(n.as_str()));
        let path = if is_local { None } else { receiver_path(receiver) };

        if let Some(path) = path {
            let Some(class) = self.env.resolve_class(&path) else {
                let msg = format!("cannot find symbol: `{}`", path.join("."));
                return self.error(receiver.span.clone(), msg);
            };
            let found = class
                .methods
                .iter()
                .enumerate()
                .find(|(_, m)| m.name == method && m.receiver.is_none());
            let Some((index, sig)) = found else {
                let msg = format!(
                    "cannot find symbol: method `{method}` in class `{}`",
                    class.name
                );
                return self.error(span, msg);
            };
            let args = self.check_args(sig, &class.name, args, span)?;
            let target = if class.name == self.class.name {
                CallTarget::Local(index)
            } else {
                CallTarget::Static(MethodRef {
                    class: class.name.clone(),
                    name: sig.name.clone(),
                    descriptor: sig.descriptor.clone(),
                })
            };
            let kind = ExprKind::Call {
                target,
                receiver: None,
                args,
            };
            return Ok(Expr::new(kind, sig.descriptor.ret, line));
        }

        let recv = self.check_expr(receiver)?;
        let typ = recv.typ;
        let class = match typ {
            Type::String => self.env.class_path.class_signature("String"),
            _ => None,
        };
        let found = class.as_ref().and_then(|c| {
            c.methods
                .iter()
                .find(|m| m.name == method && m.receiver == Some(typ))
        });
        let (Some(class), Some(sig)) = (&class, found) else {
            let msg = match typ {
                Type::String => format!("cannot find symbol: method `{method}` in type `String`"),
                typ => format!("`{typ}` cannot be dereferenced"),
            };
            return self.error(span, msg);
        };
        let args = self.check_args(sig, &class.name, args, span)?;
        let kind = ExprKind::Call {
            target: CallTarget::Virtual(MethodRef {
                class: class.name.clone(),
                name: sig.name.clone(),
                descriptor: sig.descriptor.clone(),
            }),
            receiver: Some(Box::new(recv)),
            args,
        };
        Ok(Expr::new(kind, sig.descriptor.ret, line))
    }

    fn check_args(
        &mut self,
        sig: &MethodSignature,
        owner: &str,
        args: &[ast::Expr],
        span: Range<usize>,
    ) -> CheckRes<Vec<Expr>> {
        let checked = args.iter().map(|a| self.check_expr(a)).collect::<Vec<_>>();
        if args.len() != sig.descriptor.arity() {
            let required = sig
                .descriptor
                .params
                .iter()
                .map(Type::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            let msg = format!(
                "method `{}` in class `{owner}` cannot be applied to given types; required: ({required}), found: {} argument(s)",
                sig.name,
                args.len()
            );
            return self.error(span, msg);
        }
        let mut res = Vec::with_capacity(args.len());
        let mut failed = false;
        for ((arg, checked), param) in args.iter().zip(checked).zip(&sig.descriptor.params) {
            match checked.and_then(|c| self.coerce(c, *param, arg.span.clone())) {
                Ok(c) => res.push(c),
                Err(_) => failed = true,
            }
        }
        if failed {
            return Err(Reported);
        }
        Ok(res)
    }

    fn check_binary(
        &mut self,
        op: BinOp,
        lhs: &ast::Expr,
        rhs: &ast::Expr,
        span: Range<usize>,
        line: usize,
    ) -> CheckRes<Expr> {
        let lhs = self.check_expr(lhs);
        let rhs = self.check_expr(rhs);
        let (lhs, rhs) = (lhs?, rhs?);
        let (lt, rt) = (lhs.typ, rhs.typ);
        let (lhs, rhs) = (Box::new(lhs), Box::new(rhs));
        let (kind, typ) = match op {
            BinOp::Add if (lt == Type::String || rt == Type::String) && lt != Type::Unit && rt != Type::Unit => {
                (ExprKind::Concat { lhs, rhs }, Type::String)
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem
                if lt.is_numeric() && rt.is_numeric() =>
            {
                (
                    ExprKind::Binary {
                        op,
                        lhs: Box::new(widen(*lhs)),
                        rhs: Box::new(widen(*rhs)),
                    },
                    Type::Int,
                )
            }
            BinOp::Less | BinOp::LessEq | BinOp::Greater | BinOp::GreaterEq | BinOp::Eq | BinOp::NotEq
                if lt == Type::Char && rt == Type::Char =>
            {
                (ExprKind::Binary { op, lhs, rhs }, Type::Bool)
            }
            BinOp::Less | BinOp::LessEq | BinOp::Greater | BinOp::GreaterEq | BinOp::Eq | BinOp::NotEq
                if lt.is_numeric() && rt.is_numeric() =>
            {
                (
                    ExprKind::Binary {
                        op,
                        lhs: Box::new(widen(*lhs)),
                        rhs: Box::new(widen(*rhs)),
                    },
                    Type::Bool,
                )
            }
            BinOp::Eq | BinOp::NotEq if lt == rt && matches!(lt, Type::Bool | Type::String) => {
                (ExprKind::Binary { op, lhs, rhs }, Type::Bool)
            }
            BinOp::Eq | BinOp::NotEq => {
                return self.error(span, format!("incomparable types: `{lt}` and `{rt}`"));
            }
            BinOp::And if lt == Type::Bool && rt == Type::Bool => {
                (ExprKind::And { lhs, rhs }, Type::Bool)
            }
            BinOp::Or if lt == Type::Bool && rt == Type::Bool => {
                (ExprKind::Or { lhs, rhs }, Type::Bool)
            }
            _ => {
                let msg = format!(
                    "bad operand types for binary operator `{}`: `{lt}` and `{rt}`",
                    op.symbol()
                );
                return self.error(span, msg);
            }
        };
        Ok(Expr::new(kind, typ, line))
    }
}

fn widen(expr: Expr) -> Expr {
    match expr.typ {
        Type::Char => {
            let line = expr.line;
            Expr::new(ExprKind::Widen(Box::new(expr)), Type::Int, line)
        }
        _ => expr,
    }
}

#[cfg(test)]
mod tests {
    use grader_syntax::parser::parse_source;

    use crate::{
        diagnostics::{Diagnostics, Reporter, Severity},
        signature::{ClassKind, ClassPath, ClassSignature, MethodSignature, Type},
        typecheck::{check_unit, typed::TypedClass},
    };

    struct StringOnly;

    impl ClassPath for StringOnly {
        fn class_signature(&self, name: &str) -> Option<ClassSignature> {
            let methods = match name {
                "String" => vec![
                    MethodSignature::instance("length", Type::String, vec![], Type::Int),
                    MethodSignature::instance("charAt", Type::String, vec![Type::Int], Type::Char),
                ],
                "Math" => vec![MethodSignature::new(
                    "max",
                    vec![Type::Int, Type::Int],
                    Type::Int,
                )],
                _ => return None,
            };
            Some(ClassSignature {
                name: name.to_owned(),
                kind: ClassKind::Native,
                interfaces: vec![],
                methods,
            })
        }
    }

    fn check_body(ret: &str, body: &str) -> (Vec<TypedClass>, Diagnostics) {
        let source = format!("package p\nclass T {{\nrun(N: Int) -> {ret} {{\n{body}\n}}\n}}");
        let file = parse_source(&source).expect("test sources parse");
        let mut reporter = Reporter::new(&source, "p.T");
        let classes = check_unit(&file, &StringOnly, &[], &mut reporter, false);
        (classes, reporter.into_diagnostics())
    }

    fn errors(ret: &str, body: &str) -> Vec<String> {
        let (_, diags) = check_body(ret, body);
        diags
            .with_severity(Severity::Error)
            .map(|d| d.message.clone())
            .collect()
    }

    fn warnings(ret: &str, body: &str) -> Vec<String> {
        let (_, diags) = check_body(ret, body);
        diags
            .with_severity(Severity::Warning)
            .map(|d| d.message.clone())
            .collect()
    }

    macro_rules! assert_messages {
        ($actual:expr, [$($msg:expr),*$(,)?]) => {
            similar_asserts::assert_eq!(
                expected: vec![$($msg.to_owned()),*] as Vec<String>,
                actual: $actual,
            )
        };
    }

    #[test]
    fn reference_fragment_checks_cleanly() {
        let (_, diags) = check_body(
            "Int",
            "let binary = Integer.toBinaryString(N)",
        );
        // Integer is not on this class path
        assert!(diags.has_errors());

        let (classes, diags) = check_body(
            "Int",
            "let binary = \"1000\"\n\
             let max = 0\n\
             let temp = 0\n\
             for (c in binary) {\n\
                 if (c == '0') {\n\
                     temp += 1\n\
                 } else {\n\
                     max = Math.max(max, temp)\n\
                     temp = 0\n\
                 }\n\
             }\n\
             return max",
        );
        assert!(diags.is_empty(), "{diags}");
        let method = &classes[0].methods[0];
        // N, binary, max, temp, two hidden slots and c
        assert_eq!(method.locals, 7);
    }

    #[test]
    fn missing_return_statement() {
        assert_messages!(errors("Int", "let a = N"), ["missing return statement"]);
        assert_messages!(
            errors("Int", "if (N > 0) { return 1 }"),
            ["missing return statement"]
        );
        assert_messages!(
            errors("Int", "if (N > 0) { return 1 } else { return 2 }"),
            []
        );
        assert_messages!(errors("Int", "while (true) { }"), []);
        assert_messages!(
            errors("Int", "while (true) { break }"),
            ["missing return statement"]
        );
    }

    #[test]
    fn statements_after_return_are_unreachable() {
        assert_messages!(
            warnings("Int", "return 1\nlet x = 2\nreturn x"),
            ["unreachable statement"]
        );
    }

    #[test]
    fn unused_locals_are_warnings() {
        assert_messages!(
            warnings("Unit", "let a = 1\nlet b = 2\nb = 3"),
            ["variable `a` is never used", "variable `b` is never used"]
        );
        assert_messages!(warnings("Int", "let a = 1\nreturn a"), []);
    }

    #[test]
    fn locals_are_declared_once_per_method() {
        assert_messages!(
            errors("Unit", "let a = 1\nif (true) { let a = 2 }"),
            ["variable `a` is already defined in method `run`"]
        );
        assert_messages!(
            errors("Unit", "let N = 1"),
            ["variable `N` is already defined in method `run`"]
        );
        assert_messages!(
            errors("Unit", "if (true) { let a = 1\nMath.max(a, a) } else { let a = 2\nMath.max(a, a) }"),
            []
        );
    }

    #[test]
    fn undeclared_names() {
        assert_messages!(
            errors("Int", "return x"),
            ["cannot find symbol: variable `x`"]
        );
        assert_messages!(
            errors("Int", "return Nope.f(1)"),
            ["cannot find symbol: `Nope`"]
        );
        assert_messages!(
            errors("Int", "return helper()"),
            ["cannot find symbol: method `helper` in class `p.T`"]
        );
    }

    #[test]
    fn char_promotes_to_int() {
        assert_messages!(errors("Int", "return 'a' + 1"), []);
        assert_messages!(errors("Int", "let x: Int = 'a'\nreturn x"), []);
        assert_messages!(
            errors("Char", "return 1"),
            ["incompatible types: `Int` cannot be converted to `Char`"]
        );
    }

    #[test]
    fn string_concatenation_and_methods() {
        assert_messages!(errors("String", "return \"n=\" + N + 'c'"), []);
        assert_messages!(errors("Int", "return \"abc\".length()"), []);
        assert_messages!(
            errors("Int", "return N.length()"),
            ["`Int` cannot be dereferenced"]
        );
        assert_messages!(
            errors("Int", "return \"abc\".size()"),
            ["cannot find symbol: method `size` in type `String`"]
        );
    }

    #[test]
    fn operand_types_are_checked() {
        assert_messages!(
            errors("Int", "return true + 1"),
            ["bad operand types for binary operator `+`: `Bool` and `Int`"]
        );
        assert_messages!(
            errors("Bool", "return \"a\" == 1"),
            ["incomparable types: `String` and `Int`"]
        );
        assert_messages!(
            errors("Unit", "if (N) { }"),
            ["incompatible types: `Int` cannot be converted to `Bool`"]
        );
        assert_messages!(
            errors("Bool", "return !N"),
            ["bad operand type `Int` for unary operator `!`"]
        );
    }

    #[test]
    fn calls_check_arity_and_argument_types() {
        assert_messages!(
            errors("Int", "return Math.max(1)"),
            ["method `max` in class `Math` cannot be applied to given types; required: (Int, Int), found: 1 argument(s)"]
        );
        assert_messages!(
            errors("Int", "return Math.max(1, true)"),
            ["incompatible types: `Bool` cannot be converted to `Int`"]
        );
        assert_messages!(errors("Int", "return run(N - 1)"), []);
        assert_messages!(errors("Int", "return T.run(N - 1)"), []);
    }

    #[test]
    fn only_calls_are_statements() {
        assert_messages!(errors("Unit", "N + 1"), ["not a statement"]);
        assert_messages!(errors("Unit", "Math.max(1, 2)"), []);
        assert_messages!(
            errors("Unit", "1 = 2"),
            ["cannot assign to this expression"]
        );
    }

    #[test]
    fn break_and_continue_need_a_loop() {
        assert_messages!(
            errors("Unit", "break\ncontinue"),
            ["`break` outside of a loop", "`continue` outside of a loop"]
        );
        assert_messages!(
            errors("Unit", "while (true) { if (N > 1) { continue }\nbreak }"),
            []
        );
    }

    #[test]
    fn return_values_match_the_method() {
        assert_messages!(
            errors("Unit", "return 1"),
            ["incompatible types: unexpected return value"]
        );
        assert_messages!(errors("Int", "return"), ["missing return value"]);
        assert_messages!(
            errors("Int", "for (c in N) { }\nreturn 0"),
            ["for-each not applicable to expression of type `Int`"]
        );
    }
}
