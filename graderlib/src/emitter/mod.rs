pub mod backpatch;

use std::collections::HashMap;

use grader_syntax::ast::BinOp;

use crate::{
    code::{
        class_file::{ClassFile, LineEntry, MethodInfo},
        constant_pool::ConstantPool,
        OpCode, Word,
    },
    signature::{MethodDescriptor, MethodRef, Type},
    typecheck::typed::{Block, CallTarget, Expr, ExprKind, TypedClass, TypedMethod},
};

use backpatch::{BackpatchError, Backpatcher, LABEL_BACKPATCH_MASK};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Label(pub usize);

#[derive(Clone, Debug)]
pub struct EmitOptions {
    pub version: u16,
    pub debug_info: bool,
    pub source_name: Option<String>,
}

pub fn emit_class(class: &TypedClass, options: &EmitOptions) -> Result<ClassFile, BackpatchError> {
    let mut constant_pool = ConstantPool::new();
    let mut methods = Vec::with_capacity(class.methods.len());
    for method in &class.methods {
        let emitter = FunctionEmitter::new(&mut constant_pool, options.debug_info);
        methods.push(emitter.emit_method(method)?);
    }
    Ok(ClassFile {
        version: options.version,
        name: class.name.clone(),
        source_file: options.source_name.clone().filter(|_| options.debug_info),
        interfaces: class.interfaces.clone(),
        constant_pool,
        methods,
    })
}

enum ContinueTarget {
    /// Loop condition, already emitted.
    Back(usize),
    /// Increment step of a for-each loop, emitted after the body.
    Front(Label),
}

struct LoopLabels {
    continue_to: ContinueTarget,
    break_to: Label,
}

pub struct FunctionEmitter<'cp> {
    code: Vec<u8>,
    constant_pool: &'cp mut ConstantPool,
    /// Maps label to the offset it points to.
    /// This is later used for backpatching.
    label_lines: HashMap<Label, usize>,
    next_label: usize,
    loops: Vec<LoopLabels>,
    line_table: Vec<LineEntry>,
    debug_info: bool,
}

impl<'cp> FunctionEmitter<'cp> {
    pub fn new(constant_pool: &'cp mut ConstantPool, debug_info: bool) -> Self {
        Self {
            code: Vec::new(),
            constant_pool,
            label_lines: HashMap::new(),
            next_label: 0,
            loops: Vec::new(),
            line_table: Vec::new(),
            debug_info,
        }
    }

    pub fn emit_method(mut self, method: &TypedMethod) -> Result<MethodInfo, BackpatchError> {
        self.emit_block(&method.body);
        self.mark_line(method.end_line);
        if method.descriptor.ret == Type::Unit {
            self.emit_instr(OpCode::PushUnit);
            self.emit_instr(OpCode::Return);
        } else {
            self.emit_instr(OpCode::Unreachable);
        }
        let code = Backpatcher::new(&self.label_lines).backpatch_code(self.code)?;
        tracing::trace!(method = %method.name, len = code.len(), "emitted method");
        Ok(MethodInfo {
            name: method.name.clone(),
            descriptor: method.descriptor.clone(),
            max_locals: method.locals as u32,
            code,
            line_table: self.line_table,
        })
    }

    fn emit_instr(&mut self, op: OpCode) {
        self.code.push(op as u8);
    }

    fn emit_word(&mut self, word: Word) {
        self.code.extend_from_slice(&word.to_le_bytes());
    }

    fn emit_with_arg(&mut self, op: OpCode, arg: usize) {
        self.emit_instr(op);
        self.emit_word(arg as Word);
    }

    fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    fn place_label(&mut self, label: Label) {
        self.label_lines.insert(label, self.code.len());
    }

    fn emit_jump_front(&mut self, op: OpCode, label: Label) {
        self.emit_instr(op);
        self.emit_word(label.0 as Word | LABEL_BACKPATCH_MASK);
    }

    fn emit_jump_back(&mut self, target: usize) {
        let offset = self.code.len() - target;
        self.emit_with_arg(OpCode::JumpBack, offset);
    }

    fn mark_line(&mut self, line: usize) {
        if !self.debug_info {
            return;
        }
        let offset = self.code.len() as u32;
        let line = line as u32;
        match self.line_table.last_mut() {
            Some(last) if last.line == line => {}
            Some(last) if last.offset == offset => last.line = line,
            _ => self.line_table.push(LineEntry { offset, line }),
        }
    }

    fn emit_method_ref(&mut self, op: OpCode, method: &MethodRef) {
        let index = self.constant_pool.add_entry(method.to_string());
        self.emit_with_arg(op, index);
    }

    fn emit_block(&mut self, block: &Block) {
        for stmt in block {
            self.emit_stmt(stmt);
        }
    }

    fn emit_stmt(&mut self, stmt: &Expr) {
        self.mark_line(stmt.line);
        match &stmt.kind {
            ExprKind::Store { slot, value } => {
                self.emit_expr(value);
                self.emit_with_arg(OpCode::StackAssign, *slot);
            }
            ExprKind::If {
                cond,
                body,
                else_body,
            } => {
                let else_label = self.new_label();
                self.emit_expr(cond);
                self.emit_jump_front(OpCode::JumpFrontIfFalse, else_label);
                self.emit_block(body);
                match else_body {
                    Some(else_body) => {
                        let end = self.new_label();
                        self.emit_jump_front(OpCode::JumpFront, end);
                        self.place_label(else_label);
                        self.emit_block(else_body);
                        self.place_label(end);
                    }
                    None => self.place_label(else_label),
                }
            }
            ExprKind::While { cond, body } => {
                let start = self.code.len();
                let end = self.new_label();
                self.emit_expr(cond);
                self.emit_jump_front(OpCode::JumpFrontIfFalse, end);
                self.loops.push(LoopLabels {
                    continue_to: ContinueTarget::Back(start),
                    break_to: end,
                });
                self.emit_block(body);
                self.loops.pop();
                self.emit_jump_back(start);
                self.place_label(end);
            }
            ExprKind::ForEach {
                binding,
                string_slot,
                index_slot,
                iterable,
                body,
            } => self.emit_for_each(*binding, *string_slot, *index_slot, iterable, body),
            ExprKind::Return(value) => {
                self.emit_expr(value);
                self.emit_instr(OpCode::Return);
            }
            ExprKind::Break => {
                if let Some(target) = self.loops.last().map(|l| l.break_to) {
                    self.emit_jump_front(OpCode::JumpFront, target);
                }
            }
            ExprKind::Continue => match self.loops.last().map(|l| &l.continue_to) {
                Some(ContinueTarget::Back(start)) => {
                    let start = *start;
                    self.emit_jump_back(start);
                }
                Some(ContinueTarget::Front(label)) => {
                    let label = *label;
                    self.emit_jump_front(OpCode::JumpFront, label);
                }
                None => {}
            },
            ExprKind::Discard(value) => {
                self.emit_expr(value);
                self.emit_instr(OpCode::Pop);
            }
            _ => {
                self.emit_expr(stmt);
                self.emit_instr(OpCode::Pop);
            }
        }
    }

    /// ```text
    ///         <iterable>; assign str; loadi 0; assign idx
    /// cond:   copy idx; copy str; String.length; lt; cjump_front end
    ///         copy str; copy idx; String.charAt; assign binding
    ///         <body>
    /// next:   copy idx; loadi 1; addi; assign idx; jump_back cond
    /// end:
    /// ```
    fn emit_for_each(
        &mut self,
        binding: usize,
        string_slot: usize,
        index_slot: usize,
        iterable: &Expr,
        body: &Block,
    ) {
        let string_method = |name: &str, params, ret| MethodRef {
            class: "String".to_owned(),
            name: name.to_owned(),
            descriptor: MethodDescriptor::new(params, ret),
        };
        let length = string_method("length", vec![], Type::Int);
        let char_at = string_method("charAt", vec![Type::Int], Type::Char);

        self.emit_expr(iterable);
        self.emit_with_arg(OpCode::StackAssign, string_slot);
        self.emit_int(0);
        self.emit_with_arg(OpCode::StackAssign, index_slot);

        let cond = self.code.len();
        let next = self.new_label();
        let end = self.new_label();
        self.emit_with_arg(OpCode::StackCopyBottom, index_slot);
        self.emit_with_arg(OpCode::StackCopyBottom, string_slot);
        self.emit_method_ref(OpCode::InvokeVirtual, &length);
        self.emit_instr(OpCode::Less);
        self.emit_jump_front(OpCode::JumpFrontIfFalse, end);
        self.emit_with_arg(OpCode::StackCopyBottom, string_slot);
        self.emit_with_arg(OpCode::StackCopyBottom, index_slot);
        self.emit_method_ref(OpCode::InvokeVirtual, &char_at);
        self.emit_with_arg(OpCode::StackAssign, binding);

        self.loops.push(LoopLabels {
            continue_to: ContinueTarget::Front(next),
            break_to: end,
        });
        self.emit_block(body);
        self.loops.pop();

        self.place_label(next);
        self.emit_with_arg(OpCode::StackCopyBottom, index_slot);
        self.emit_int(1);
        self.emit_instr(OpCode::AddInteger);
        self.emit_with_arg(OpCode::StackAssign, index_slot);
        self.emit_jump_back(cond);
        self.place_label(end);
    }

    fn emit_int(&mut self, value: i64) {
        let index = self.constant_pool.add_entry(value);
        self.emit_with_arg(OpCode::ConstLoadInteger, index);
    }

    fn emit_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Unit => self.emit_instr(OpCode::PushUnit),
            ExprKind::Int(i) => self.emit_int(*i),
            ExprKind::Bool(true) => self.emit_instr(OpCode::PushTrue),
            ExprKind::Bool(false) => self.emit_instr(OpCode::PushFalse),
            ExprKind::Char(c) => {
                let index = self.constant_pool.add_entry(*c);
                self.emit_with_arg(OpCode::ConstLoadChar, index);
            }
            ExprKind::Str(s) => {
                let index = self.constant_pool.add_entry(s.as_str());
                self.emit_with_arg(OpCode::ConstLoadString, index);
            }
            ExprKind::Local(slot) => self.emit_with_arg(OpCode::StackCopyBottom, *slot),
            ExprKind::Binary { op, lhs, rhs } => {
                self.emit_expr(lhs);
                self.emit_expr(rhs);
                self.emit_instr(binary_opcode(*op));
            }
            ExprKind::Concat { lhs, rhs } => {
                self.emit_expr(lhs);
                self.emit_expr(rhs);
                self.emit_instr(OpCode::Concat);
            }
            ExprKind::Widen(inner) => {
                self.emit_expr(inner);
                self.emit_instr(OpCode::CharToInt);
            }
            ExprKind::Neg(inner) => {
                self.emit_expr(inner);
                self.emit_instr(OpCode::NegInteger);
            }
            ExprKind::Not(inner) => {
                self.emit_expr(inner);
                self.emit_instr(OpCode::Not);
            }
            ExprKind::And { lhs, rhs } => {
                let short = self.new_label();
                let end = self.new_label();
                self.emit_expr(lhs);
                self.emit_jump_front(OpCode::JumpFrontIfFalse, short);
                self.emit_expr(rhs);
                self.emit_jump_front(OpCode::JumpFront, end);
                self.place_label(short);
                self.emit_instr(OpCode::PushFalse);
                self.place_label(end);
            }
            ExprKind::Or { lhs, rhs } => {
                let rhs_label = self.new_label();
                let end = self.new_label();
                self.emit_expr(lhs);
                self.emit_jump_front(OpCode::JumpFrontIfFalse, rhs_label);
                self.emit_instr(OpCode::PushTrue);
                self.emit_jump_front(OpCode::JumpFront, end);
                self.place_label(rhs_label);
                self.emit_expr(rhs);
                self.place_label(end);
            }
            ExprKind::Call {
                target,
                receiver,
                args,
            } => {
                if let Some(receiver) = receiver {
                    self.emit_expr(receiver);
                }
                for arg in args {
                    self.emit_expr(arg);
                }
                match target {
                    CallTarget::Local(index) => self.emit_with_arg(OpCode::InvokeLocal, *index),
                    CallTarget::Static(method) => self.emit_method_ref(OpCode::InvokeStatic, method),
                    CallTarget::Virtual(method) => {
                        self.emit_method_ref(OpCode::InvokeVirtual, method)
                    }
                }
            }
            // statements never appear in value position
            _ => {
                self.emit_stmt(expr);
                self.emit_instr(OpCode::PushUnit);
            }
        }
    }
}

fn binary_opcode(op: BinOp) -> OpCode {
    match op {
        BinOp::Add => OpCode::AddInteger,
        BinOp::Sub => OpCode::SubInteger,
        BinOp::Mul => OpCode::MulInteger,
        BinOp::Div => OpCode::DivInteger,
        BinOp::Rem => OpCode::RemInteger,
        BinOp::Eq => OpCode::Eq,
        BinOp::NotEq => OpCode::NotEq,
        BinOp::Less => OpCode::Less,
        BinOp::LessEq => OpCode::LessEq,
        BinOp::Greater => OpCode::Greater,
        BinOp::GreaterEq => OpCode::GreaterEq,
        // lowered to jumps before reaching here
        BinOp::And | BinOp::Or => OpCode::Unreachable,
    }
}

#[cfg(test)]
mod tests {
    use grader_syntax::parser::parse_source;

    use super::*;
    use crate::{
        code::debug::decode,
        diagnostics::Reporter,
        signature::EmptyClassPath,
        typecheck::check_unit,
    };

    fn compile(body: &str, ret: &str, debug_info: bool) -> ClassFile {
        let source = format!("class T {{\nrun(N: Int) -> {ret} {{\n{body}\n}}\n}}");
        let file = parse_source(&source).expect("test sources parse");
        let mut reporter = Reporter::new(&source, "T");
        let classes = check_unit(&file, &EmptyClassPath, &[], &mut reporter, false);
        assert!(!reporter.has_errors(), "{}", reporter.diagnostics());
        let options = EmitOptions {
            version: 2,
            debug_info,
            source_name: Some("T".to_owned()),
        };
        emit_class(&classes[0], &options).unwrap()
    }

    fn listing(class: &ClassFile) -> Vec<String> {
        decode(&class.methods[0].code, &class.constant_pool)
            .unwrap()
            .into_iter()
            .map(|i| {
                let mut line = i.mnemonic.to_owned();
                for arg in i.args {
                    line.push(' ');
                    line.push_str(&arg);
                }
                line
            })
            .collect()
    }

    #[test]
    fn arithmetic_with_char_promotion() {
        let class = compile("return N + 'a'", "Int", false);
        similar_asserts::assert_eq!(
            expected: vec!["copy_bottom 0", "loadc 'a'", "c2i", "addi", "ret", "unreachable"],
            actual: listing(&class),
        );
    }

    #[test]
    fn unit_methods_end_with_an_implicit_return() {
        let class = compile("let a = N\nrun(a)", "Unit", false);
        similar_asserts::assert_eq!(
            expected: vec![
                "copy_bottom 0",
                "assign 1",
                "copy_bottom 1",
                "invoke_local 0",
                "pop",
                "unit",
                "ret",
            ],
            actual: listing(&class),
        );
    }

    #[test]
    fn if_else_jumps_over_branches() {
        let class = compile("if (N > 1) { return 1 } else { return 2 }", "Int", false);
        similar_asserts::assert_eq!(
            expected: vec![
                "copy_bottom 0",
                "loadi 1",
                "gt",
                "cjump_front +28 (-> 47)",
                "loadi 1",
                "ret",
                "jump_front +19 (-> 57)",
                "loadi 2",
                "ret",
                "unreachable",
            ],
            actual: listing(&class),
        );
    }

    #[test]
    fn while_loop_jumps_back_to_the_condition() {
        let class = compile("while (N > 0) { N = N - 1 }", "Unit", false);
        similar_asserts::assert_eq!(
            expected: vec![
                "copy_bottom 0",
                "loadi 0",
                "gt",
                "cjump_front +46 (-> 65)",
                "copy_bottom 0",
                "loadi 1",
                "subi",
                "assign 0",
                "jump_back -56 (-> 0)",
                "unit",
                "ret",
            ],
            actual: listing(&class),
        );
    }

    #[test]
    fn short_circuit_and() {
        let class = compile("return N > 0 && N < 9", "Bool", false);
        let listing = listing(&class);
        assert_eq!(listing[3], "cjump_front +37 (-> 56)");
        assert_eq!(listing[7], "jump_front +10 (-> 57)");
        assert_eq!(listing[8], "false");
        assert_eq!(listing[9], "ret");
    }

    #[test]
    fn for_each_uses_string_methods() {
        let class = compile("for (c in \"ab\") { if (c == 'a') { continue } }", "Unit", false);
        let listing = listing(&class);
        assert!(listing.contains(&"invoke_virtual \"String::length()I\"".to_owned()));
        assert!(listing.contains(&"invoke_virtual \"String::charAt(I)C\"".to_owned()));
        assert_eq!(class.methods[0].max_locals, 4);
        assert_eq!(class.methods[0].code.last(), Some(&(OpCode::Return as u8)));
    }

    #[test]
    fn line_table_is_emitted_only_with_debug_info() {
        let body = "let a = N\nlet b = a\nreturn b";
        let with = compile(body, "Int", true);
        let lines = with.methods[0]
            .line_table
            .iter()
            .map(|e| e.line)
            .collect::<Vec<_>>();
        assert_eq!(lines, vec![3, 4, 5, 6]);
        assert_eq!(with.source_file.as_deref(), Some("T"));
        let without = compile(body, "Int", false);
        assert!(without.methods[0].line_table.is_empty());
        assert_eq!(without.source_file, None);
    }
}
