use std::rc::Rc;

use graderlib::code::{constant_pool::Tagged, read_word, OpCode};

use crate::value::Value;

use super::{
    class::{CompiledClass, Link, LoadedType},
    ErrorKind, ExecutionError, StackFrame, MAX_CALL_DEPTH,
};

struct Frame {
    class: Rc<LoadedType>,
    method: usize,
    ip: usize,
    /// Offset of the instruction being executed.
    pc: usize,
    locals: Vec<Value>,
    stack: Vec<Value>,
}

enum Step {
    Next,
    Call {
        class: Rc<LoadedType>,
        method: usize,
        args: Vec<Value>,
    },
    Return(Value),
}

/// Executes linked code on an explicit frame stack.
pub struct Thread {
    frames: Vec<Frame>,
    max_depth: usize,
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

impl Thread {
    pub fn new() -> Self {
        Self::with_max_depth(MAX_CALL_DEPTH)
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            frames: Vec::new(),
            max_depth,
        }
    }

    /// Runs the method until it returns. The arguments are not checked
    /// against the method's descriptor.
    pub fn invoke(
        &mut self,
        class: &Rc<LoadedType>,
        method: usize,
        args: Vec<Value>,
    ) -> Result<Value, ExecutionError> {
        tracing::trace!(class = class.name(), method, "invoking");
        self.frames.clear();
        if let Err(kind) = self.push_frame(Rc::clone(class), method, args) {
            return Err(self.error(kind));
        }
        self.run()
    }

    fn run(&mut self) -> Result<Value, ExecutionError> {
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Ok(Value::Unit);
            };
            let step = match frame.step() {
                Ok(step) => step,
                Err(kind) => return Err(self.error(kind)),
            };
            match step {
                Step::Next => {}
                Step::Call {
                    class,
                    method,
                    args,
                } => {
                    if let Err(kind) = self.push_frame(class, method, args) {
                        return Err(self.error(kind));
                    }
                }
                Step::Return(value) => {
                    self.frames.pop();
                    match self.frames.last_mut() {
                        Some(caller) => caller.stack.push(value),
                        None => return Ok(value),
                    }
                }
            }
        }
    }

    fn push_frame(
        &mut self,
        class: Rc<LoadedType>,
        method: usize,
        args: Vec<Value>,
    ) -> Result<(), ErrorKind> {
        if self.frames.len() >= self.max_depth {
            return Err(ErrorKind::StackOverflow(self.max_depth));
        }
        let max_locals = class
            .as_compiled()
            .and_then(|c| c.methods.get(method))
            .map(|m| m.max_locals as usize)
            .ok_or_else(|| {
                ErrorKind::MalformedCode(format!("no method {method} in `{}`", class.name()))
            })?;
        if args.len() > max_locals {
            return Err(ErrorKind::MalformedCode(format!(
                "{} arguments passed to a method with {max_locals} locals",
                args.len()
            )));
        }
        let mut locals = args;
        locals.resize(max_locals, Value::Unit);
        self.frames.push(Frame {
            class,
            method,
            ip: 0,
            pc: 0,
            locals,
            stack: Vec::new(),
        });
        Ok(())
    }

    fn error(&self, kind: ErrorKind) -> ExecutionError {
        let backtrace = self
            .frames
            .iter()
            .rev()
            .map(|frame| {
                let method = frame
                    .class
                    .as_compiled()
                    .and_then(|c| c.methods.get(frame.method));
                StackFrame {
                    class: frame.class.name().to_owned(),
                    method: method.map_or_else(|| "?".to_owned(), |m| m.name.clone()),
                    line: method.and_then(|m| m.line_of(frame.pc)),
                }
            })
            .collect();
        ExecutionError::new(kind, backtrace)
    }
}

impl Frame {
    fn step(&mut self) -> Result<Step, ErrorKind> {
        let class = match self.class.as_compiled() {
            Some(class) => class,
            None => return Err(ErrorKind::MalformedCode("native frame".to_owned())),
        };
        let code = match class.code(self.method) {
            Some(code) => code,
            None if !class.is_linked() => {
                return Err(ErrorKind::MalformedCode(format!(
                    "class `{}` is not linked",
                    self.class.name()
                )))
            }
            None => return Err(ErrorKind::MalformedCode("missing method".to_owned())),
        };
        let byte = *code
            .get(self.ip)
            .ok_or_else(|| ErrorKind::MalformedCode("execution fell off the code".to_owned()))?;
        let op = OpCode::try_from(byte).map_err(|e| ErrorKind::MalformedCode(e.to_string()))?;
        self.pc = self.ip;
        let arg = if op.argument_size() > 0 {
            read_word(code, self.ip)
                .ok_or_else(|| ErrorKind::MalformedCode("truncated argument".to_owned()))?
                as usize
        } else {
            0
        };
        self.ip += 1 + op.argument_size();

        let stack = &mut self.stack;
        match op {
            OpCode::ConstLoadInteger => stack.push(Value::Int(constant::<i64>(class, arg)?)),
            OpCode::ConstLoadChar => stack.push(Value::Char(constant::<char>(class, arg)?)),
            OpCode::ConstLoadString => stack.push(Value::from(constant::<String>(class, arg)?)),
            OpCode::PushTrue => stack.push(Value::Bool(true)),
            OpCode::PushFalse => stack.push(Value::Bool(false)),
            OpCode::PushUnit => stack.push(Value::Unit),
            OpCode::StackCopyBottom => {
                let value = self.locals.get(arg).cloned().ok_or_else(|| bad_slot(arg))?;
                stack.push(value);
            }
            OpCode::StackAssign => {
                let value = pop(stack)?;
                *self.locals.get_mut(arg).ok_or_else(|| bad_slot(arg))? = value;
            }
            OpCode::AddInteger => arithmetic(stack, "+", |a, b| Ok(a.wrapping_add(b)))?,
            OpCode::SubInteger => arithmetic(stack, "-", |a, b| Ok(a.wrapping_sub(b)))?,
            OpCode::MulInteger => arithmetic(stack, "*", |a, b| Ok(a.wrapping_mul(b)))?,
            OpCode::DivInteger => arithmetic(stack, "/", |a, b| match b {
                0 => Err(ErrorKind::DivisionByZero),
                b => Ok(a.wrapping_div(b)),
            })?,
            OpCode::RemInteger => arithmetic(stack, "%", |a, b| match b {
                0 => Err(ErrorKind::DivisionByZero),
                b => Ok(a.wrapping_rem(b)),
            })?,
            OpCode::NegInteger => {
                let value = pop(stack)?
                    .as_int()
                    .ok_or(ErrorKind::InvalidOperands("-"))?;
                stack.push(Value::Int(value.wrapping_neg()));
            }
            OpCode::CharToInt => match pop(stack)? {
                Value::Char(c) => stack.push(Value::Int(c as i64)),
                _ => return Err(ErrorKind::InvalidOperands("char to int")),
            },
            OpCode::Concat => {
                let rhs = pop(stack)?;
                let lhs = pop(stack)?;
                stack.push(Value::from(format!("{lhs}{rhs}")));
            }
            OpCode::Eq | OpCode::NotEq => {
                let rhs = pop(stack)?;
                let lhs = pop(stack)?;
                stack.push(Value::Bool((lhs == rhs) == (op == OpCode::Eq)));
            }
            OpCode::Less | OpCode::LessEq | OpCode::Greater | OpCode::GreaterEq => {
                compare(stack, op)?
            }
            OpCode::Not => {
                let value = pop(stack)?
                    .as_bool()
                    .ok_or(ErrorKind::InvalidOperands("!"))?;
                stack.push(Value::Bool(!value));
            }
            OpCode::JumpFront => self.ip = self.pc + arg,
            OpCode::JumpBack => {
                self.ip = self
                    .pc
                    .checked_sub(arg)
                    .ok_or_else(|| ErrorKind::MalformedCode("jump before the code".to_owned()))?
            }
            OpCode::JumpFrontIfFalse => {
                let cond = pop(stack)?
                    .as_bool()
                    .ok_or(ErrorKind::InvalidOperands("condition"))?;
                if !cond {
                    self.ip = self.pc + arg;
                }
            }
            OpCode::InvokeLocal => {
                let arity = class
                    .methods
                    .get(arg)
                    .map(|m| m.descriptor.arity())
                    .ok_or_else(|| ErrorKind::MalformedCode(format!("no method {arg}")))?;
                return Ok(Step::Call {
                    class: Rc::clone(&self.class),
                    method: arg,
                    args: pop_n(stack, arity)?,
                });
            }
            OpCode::InvokeStatic | OpCode::InvokeVirtual => {
                return invoke_link(class, stack, arg);
            }
            OpCode::Pop => {
                pop(stack)?;
            }
            OpCode::Return => return Ok(Step::Return(pop(stack)?)),
            OpCode::Unreachable => return Err(ErrorKind::MissingReturn),
        }
        Ok(Step::Next)
    }
}

fn invoke_link(
    class: &CompiledClass,
    stack: &mut Vec<Value>,
    link: usize,
) -> Result<Step, ErrorKind> {
    match class.links().get(link) {
        Some(Link::Method { class, index }) => call(Rc::clone(class), *index, stack, link),
        Some(Link::BackEdge { name, class, index }) => {
            let class = class
                .upgrade()
                .ok_or_else(|| ErrorKind::Unloaded(name.clone()))?;
            call(class, *index, stack, link)
        }
        Some(Link::Native(native)) => {
            let receiver = native.signature.receiver.is_some() as usize;
            let args = pop_n(stack, native.signature.descriptor.arity() + receiver)?;
            stack.push((native.func)(&args)?);
            Ok(Step::Next)
        }
        None => Err(ErrorKind::MalformedCode(format!("unknown link {link}"))),
    }
}

fn call(
    class: Rc<LoadedType>,
    method: usize,
    stack: &mut Vec<Value>,
    link: usize,
) -> Result<Step, ErrorKind> {
    let arity = class
        .as_compiled()
        .and_then(|c| c.methods.get(method))
        .map(|m| m.descriptor.arity())
        .ok_or_else(|| ErrorKind::MalformedCode(format!("bad link {link}")))?;
    Ok(Step::Call {
        class,
        method,
        args: pop_n(stack, arity)?,
    })
}

fn constant<T: Tagged>(class: &CompiledClass, index: usize) -> Result<T, ErrorKind> {
    class
        .constant_pool
        .get::<T>(index)
        .map_err(|e| ErrorKind::MalformedCode(e.to_string()))
}

fn bad_slot(slot: usize) -> ErrorKind {
    ErrorKind::MalformedCode(format!("local slot {slot} out of range"))
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, ErrorKind> {
    stack.pop().ok_or(ErrorKind::StackUnderflow)
}

/// Pops `n` values keeping their push order.
fn pop_n(stack: &mut Vec<Value>, n: usize) -> Result<Vec<Value>, ErrorKind> {
    let at = stack.len().checked_sub(n).ok_or(ErrorKind::StackUnderflow)?;
    Ok(stack.split_off(at))
}

fn arithmetic(
    stack: &mut Vec<Value>,
    op: &'static str,
    f: impl FnOnce(i64, i64) -> Result<i64, ErrorKind>,
) -> Result<(), ErrorKind> {
    let rhs = pop(stack)?;
    let lhs = pop(stack)?;
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => {
            stack.push(Value::Int(f(a, b)?));
            Ok(())
        }
        _ => Err(ErrorKind::InvalidOperands(op)),
    }
}

fn compare(stack: &mut Vec<Value>, op: OpCode) -> Result<(), ErrorKind> {
    let rhs = pop(stack)?;
    let lhs = pop(stack)?;
    let ordering = match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Char(a), Value::Char(b)) => a.cmp(b),
        _ => return Err(ErrorKind::InvalidOperands("comparison")),
    };
    let res = match op {
        OpCode::Less => ordering.is_lt(),
        OpCode::LessEq => ordering.is_le(),
        OpCode::Greater => ordering.is_gt(),
        _ => ordering.is_ge(),
    };
    stack.push(Value::Bool(res));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::load_unit;

    fn run(body: &str, arg: i64) -> Result<Value, ExecutionError> {
        let source = format!("package t\nclass Main {{\n f(n: Int) -> Int {{\n{body}\n }}\n}}");
        let (_registry, class) = load_unit(&source, "t.Main", false);
        Thread::new().invoke(&class, 0, vec![Value::Int(arg)])
    }

    #[test]
    fn arithmetic_wraps() {
        assert_eq!(run("return n + 1", i64::MAX), Ok(Value::Int(i64::MIN)));
        assert_eq!(run("return n * 3 - 1", 5), Ok(Value::Int(14)));
        assert_eq!(run("return -n / 2 % 3", 10), Ok(Value::Int(-2)));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let err = run("return 10 / n", 0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
        assert_eq!(err.backtrace.len(), 1);
        assert_eq!(err.backtrace[0].method, "f");
        assert_eq!(err.backtrace[0].line, None);
    }

    #[test]
    fn loops_and_strings() {
        let body = "let s = \"\"\n\
                    let i = 0\n\
                    while (i < n) {\n\
                        s = s + i\n\
                        i += 1\n\
                    }\n\
                    let count = 0\n\
                    for (c in s) {\n\
                        if (c == '1' || c == '3') { count += 10 } else { count += 1 }\n\
                    }\n\
                    return count + s.length()";
        // s = "01234": two digits count 10, three count 1, plus the length.
        assert_eq!(run(body, 5), Ok(Value::Int(28)));
    }

    #[test]
    fn char_arithmetic_uses_code_points() {
        assert_eq!(run("let c = 'a'\nreturn c + n", 1), Ok(Value::Int(98)));
    }

    #[test]
    fn runaway_recursion_overflows() {
        let source = "class Rec {\n f(n: Int) -> Int { return f(n + 1) }\n}";
        let (_registry, class) = load_unit(source, "Rec", false);
        let err = Thread::new()
            .invoke(&class, 0, vec![Value::Int(0)])
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::StackOverflow(MAX_CALL_DEPTH));
        assert_eq!(err.backtrace.len(), MAX_CALL_DEPTH);
    }

    #[test]
    fn errors_carry_lines_with_debug_info() {
        let source = "class Lines {\n\
                      f(n: Int) -> Int {\n\
                          return g(n)\n\
                      }\n\
                      g(n: Int) -> Int {\n\
                          let s = \"ab\"\n\
                          return s.charAt(n)\n\
                      }\n\
                      }";
        let (_registry, class) = load_unit(source, "Lines", true);
        let err = Thread::new()
            .invoke(&class, 0, vec![Value::Int(5)])
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::IndexOutOfBounds { index: 5, len: 2 });
        let frames = err
            .backtrace
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        similar_asserts::assert_eq!(
            expected: vec![
                "at Lines.g(line 7)".to_owned(),
                "at Lines.f(line 3)".to_owned(),
            ],
            actual: frames,
        );
    }
}
