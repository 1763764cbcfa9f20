//! Structural checks of method code run before a class is linked.
//!
//! The verifier does not track operand types. It makes sure that every
//! instruction decodes, that arguments point at existing locals, constants
//! and methods, that jumps land on instruction boundaries and that
//! execution cannot run past the end of the code.

use bitvec::prelude::*;
use thiserror::Error;

use graderlib::{
    code::{
        class_file::{ClassFile, MethodInfo},
        constant_pool::{ConstantPoolError, EntryType},
        read_word, OpCode,
    },
    signature::{DescriptorError, MethodRef},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("verification of `{class}::{method}` failed at offset {offset}: {kind}")]
pub struct VerifyError {
    pub class: String,
    pub method: String,
    pub offset: usize,
    pub kind: VerifyErrorKind,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyErrorKind {
    #[error("empty code")]
    EmptyCode,
    #[error("unknown opcode {0:#04x}")]
    UnknownOpCode(u8),
    #[error("truncated instruction argument")]
    TruncatedArgument,
    #[error("jump target {target} is outside of the code")]
    JumpOutOfBounds { target: i128 },
    #[error("jump target {target} is inside an instruction")]
    JumpIntoInstruction { target: usize },
    #[error("local slot {slot} exceeds the {max_locals} declared locals")]
    LocalOutOfRange { slot: u64, max_locals: u32 },
    #[error("method declares {max_locals} locals but takes {arity} arguments")]
    TooFewLocals { max_locals: u32, arity: usize },
    #[error("method declares {max_locals} locals but uses only {used}")]
    TooManyLocals { max_locals: u32, used: u64 },
    #[error("bad constant: {0}")]
    Constant(#[from] ConstantPoolError),
    #[error("bad method reference: {0}")]
    MethodRef(#[from] DescriptorError),
    #[error("no local method with index {0}")]
    UnknownLocalMethod(u64),
    #[error("execution can run past the end of the code")]
    FallsOffEnd,
}

pub fn verify_class(class: &ClassFile) -> Result<(), VerifyError> {
    for method in &class.methods {
        verify_method(class, method)?;
    }
    Ok(())
}

pub fn verify_method(class: &ClassFile, method: &MethodInfo) -> Result<(), VerifyError> {
    let err = |offset, kind| VerifyError {
        class: class.name.clone(),
        method: method.name.clone(),
        offset,
        kind,
    };
    let code = &method.code;
    if code.is_empty() {
        return Err(err(0, VerifyErrorKind::EmptyCode));
    }
    if (method.max_locals as usize) < method.descriptor.arity() {
        return Err(err(
            0,
            VerifyErrorKind::TooFewLocals {
                max_locals: method.max_locals,
                arity: method.descriptor.arity(),
            },
        ));
    }

    // First pass decodes instructions and marks where they start.
    let mut starts = bitvec![0; code.len()];
    let mut instructions = Vec::new();
    let mut offset = 0;
    while offset < code.len() {
        let op = OpCode::try_from(code[offset])
            .map_err(|e| err(offset, VerifyErrorKind::UnknownOpCode(e.0)))?;
        let arg = if op.argument_size() > 0 {
            Some(read_word(code, offset).ok_or_else(|| err(offset, VerifyErrorKind::TruncatedArgument))?)
        } else {
            None
        };
        starts.set(offset, true);
        instructions.push((offset, op, arg.unwrap_or(0)));
        offset += 1 + op.argument_size();
    }

    for &(offset, op, arg) in &instructions {
        check_instruction(class, method, &starts, offset, op, arg).map_err(|kind| err(offset, kind))?;
    }

    // locals beyond the arguments and the touched slots would only inflate frames
    let used = instructions
        .iter()
        .filter(|(_, op, _)| matches!(op, OpCode::StackCopyBottom | OpCode::StackAssign))
        .map(|(_, _, slot)| slot + 1)
        .max()
        .unwrap_or(0)
        .max(method.descriptor.arity() as u64);
    if method.max_locals as u64 > used {
        return Err(err(
            0,
            VerifyErrorKind::TooManyLocals {
                max_locals: method.max_locals,
                used,
            },
        ));
    }

    match instructions.last() {
        Some((_, op, _)) if op.is_terminal() => Ok(()),
        _ => Err(err(code.len(), VerifyErrorKind::FallsOffEnd)),
    }
}

fn check_instruction(
    class: &ClassFile,
    method: &MethodInfo,
    starts: &BitSlice,
    offset: usize,
    op: OpCode,
    arg: u64,
) -> Result<(), VerifyErrorKind> {
    let cp = &class.constant_pool;
    match op {
        OpCode::ConstLoadInteger => expect_constant(class, arg, EntryType::Int),
        OpCode::ConstLoadChar => expect_constant(class, arg, EntryType::Char),
        OpCode::ConstLoadString => expect_constant(class, arg, EntryType::String),
        OpCode::StackCopyBottom | OpCode::StackAssign => {
            if arg >= method.max_locals as u64 {
                return Err(VerifyErrorKind::LocalOutOfRange {
                    slot: arg,
                    max_locals: method.max_locals,
                });
            }
            Ok(())
        }
        OpCode::JumpFront | OpCode::JumpFrontIfFalse | OpCode::JumpBack => {
            let target = if op == OpCode::JumpBack {
                offset as i128 - arg as i128
            } else {
                offset as i128 + arg as i128
            };
            if target < 0 || target >= starts.len() as i128 {
                return Err(VerifyErrorKind::JumpOutOfBounds { target });
            }
            let target = target as usize;
            if !starts[target] {
                return Err(VerifyErrorKind::JumpIntoInstruction { target });
            }
            Ok(())
        }
        OpCode::InvokeLocal => {
            if arg as usize >= class.methods.len() {
                return Err(VerifyErrorKind::UnknownLocalMethod(arg));
            }
            Ok(())
        }
        OpCode::InvokeStatic | OpCode::InvokeVirtual => {
            let text = cp.get::<String>(arg as usize)?;
            MethodRef::parse(&text)?;
            Ok(())
        }
        _ => Ok(()),
    }
}

fn expect_constant(class: &ClassFile, index: u64, expected: EntryType) -> Result<(), VerifyErrorKind> {
    let actual = class.constant_pool.entry(index as usize)?.typ();
    if actual != expected {
        return Err(ConstantPoolError::TypeMismatched { expected, actual }.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use graderlib::{
        code::{class_file::CURRENT_VERSION, constant_pool::ConstantPool, Word},
        signature::{MethodDescriptor, Type},
    };

    use super::*;

    fn class_with(code: Vec<u8>, cp: ConstantPool, max_locals: u32) -> ClassFile {
        ClassFile {
            version: CURRENT_VERSION,
            name: "t.Bad".to_owned(),
            source_file: None,
            interfaces: Vec::new(),
            constant_pool: cp,
            methods: vec![MethodInfo {
                name: "f".to_owned(),
                descriptor: MethodDescriptor::new(vec![Type::Int], Type::Int),
                max_locals,
                code,
                line_table: Vec::new(),
            }],
        }
    }

    fn instr(code: &mut Vec<u8>, op: OpCode, arg: Option<Word>) {
        code.push(op as u8);
        if let Some(arg) = arg {
            code.extend_from_slice(&arg.to_le_bytes());
        }
    }

    fn verify(class: &ClassFile) -> Result<(), VerifyErrorKind> {
        verify_class(class).map_err(|e| e.kind)
    }

    #[test]
    fn well_formed_code_passes() {
        let mut code = Vec::new();
        instr(&mut code, OpCode::StackCopyBottom, Some(0));
        instr(&mut code, OpCode::Return, None);
        assert_eq!(verify(&class_with(code, ConstantPool::new(), 1)), Ok(()));
    }

    #[test]
    fn jumps_must_land_on_instructions() {
        let mut code = Vec::new();
        instr(&mut code, OpCode::JumpFront, Some(3));
        instr(&mut code, OpCode::PushUnit, None);
        instr(&mut code, OpCode::Return, None);
        assert_eq!(
            verify(&class_with(code.clone(), ConstantPool::new(), 1)),
            Err(VerifyErrorKind::JumpIntoInstruction { target: 3 })
        );

        code[1..9].copy_from_slice(&20u64.to_le_bytes());
        assert_eq!(
            verify(&class_with(code, ConstantPool::new(), 1)),
            Err(VerifyErrorKind::JumpOutOfBounds { target: 20 })
        );

        let mut code = Vec::new();
        instr(&mut code, OpCode::JumpBack, Some(1));
        assert_eq!(
            verify(&class_with(code, ConstantPool::new(), 1)),
            Err(VerifyErrorKind::JumpOutOfBounds { target: -1 })
        );
    }

    #[test]
    fn operands_are_checked() {
        let mut code = Vec::new();
        instr(&mut code, OpCode::StackAssign, Some(4));
        instr(&mut code, OpCode::Return, None);
        assert_eq!(
            verify(&class_with(code, ConstantPool::new(), 1)),
            Err(VerifyErrorKind::LocalOutOfRange {
                slot: 4,
                max_locals: 1
            })
        );

        let mut cp = ConstantPool::new();
        let index = cp.add_entry('x');
        let mut code = Vec::new();
        instr(&mut code, OpCode::ConstLoadInteger, Some(index as Word));
        instr(&mut code, OpCode::Return, None);
        assert_eq!(
            verify(&class_with(code, cp, 1)),
            Err(VerifyErrorKind::Constant(ConstantPoolError::TypeMismatched {
                expected: EntryType::Int,
                actual: EntryType::Char
            }))
        );

        let mut cp = ConstantPool::new();
        let index = cp.add_entry("not a method");
        let mut code = Vec::new();
        instr(&mut code, OpCode::InvokeStatic, Some(index as Word));
        instr(&mut code, OpCode::Return, None);
        assert!(matches!(
            verify(&class_with(code, cp, 1)),
            Err(VerifyErrorKind::MethodRef(_))
        ));
    }

    #[test]
    fn code_must_end_with_a_terminal_instruction() {
        let mut code = Vec::new();
        instr(&mut code, OpCode::PushUnit, None);
        assert_eq!(
            verify(&class_with(code, ConstantPool::new(), 1)),
            Err(VerifyErrorKind::FallsOffEnd)
        );
        assert_eq!(
            verify(&class_with(vec![OpCode::Return as u8, 0xee], ConstantPool::new(), 1)),
            Err(VerifyErrorKind::UnknownOpCode(0xee))
        );
        assert_eq!(
            verify(&class_with(vec![OpCode::JumpFront as u8, 1, 0], ConstantPool::new(), 1)),
            Err(VerifyErrorKind::TruncatedArgument)
        );
        assert_eq!(
            verify(&class_with(vec![OpCode::Return as u8], ConstantPool::new(), 0)),
            Err(VerifyErrorKind::TooFewLocals {
                max_locals: 0,
                arity: 1
            })
        );
    }

    #[test]
    fn declared_locals_are_bounded_by_their_use() {
        let mut code = Vec::new();
        instr(&mut code, OpCode::StackCopyBottom, Some(0));
        instr(&mut code, OpCode::StackAssign, Some(2));
        instr(&mut code, OpCode::StackCopyBottom, Some(2));
        instr(&mut code, OpCode::Return, None);
        assert_eq!(verify(&class_with(code.clone(), ConstantPool::new(), 3)), Ok(()));
        assert_eq!(
            verify(&class_with(code, ConstantPool::new(), u32::MAX)),
            Err(VerifyErrorKind::TooManyLocals {
                max_locals: u32::MAX,
                used: 3
            })
        );

        let code = vec![OpCode::PushUnit as u8, OpCode::Return as u8];
        assert_eq!(
            verify(&class_with(code, ConstantPool::new(), 2)),
            Err(VerifyErrorKind::TooManyLocals {
                max_locals: 2,
                used: 1
            })
        );
    }
}
