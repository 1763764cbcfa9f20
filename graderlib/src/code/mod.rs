use thiserror::Error;

pub mod class_file;
pub mod constant_pool;
pub mod debug;

/// Instruction arguments are little endian words following the opcode.
pub type Word = u64;

pub const WORD_SIZE: usize = std::mem::size_of::<Word>();

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unknown opcode {0:#04x}")]
pub struct UnknownOpCode(pub u8);

macro_rules! opcodes {
    ($($(#[$doc:meta])* $name:ident = $args:expr),* $(,)?) => {
        /// Bytecode instruction.
        ///
        /// Some instructions have arguments that follow them directly
        /// in the bytecode. The enum only holds the operation's type
        /// to keep the bytecode compact.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum OpCode {
            $($(#[$doc])* $name),*
        }

        impl OpCode {
            pub const ALL: &'static [OpCode] = &[$(OpCode::$name),*];

            /// Size in bytes of the arguments following the instruction.
            pub fn argument_size(&self) -> usize {
                match self {
                    $(OpCode::$name => $args),*
                }
            }
        }
    };
}

opcodes! {
    /// Push the integer constant with the index given as a word.
    ConstLoadInteger = WORD_SIZE,
    ConstLoadChar = WORD_SIZE,
    ConstLoadString = WORD_SIZE,
    PushTrue = 0,
    PushFalse = 0,
    PushUnit = 0,
    /// Push a copy of the local slot given as a word.
    StackCopyBottom = WORD_SIZE,
    /// Pop the top of the stack into the local slot given as a word.
    StackAssign = WORD_SIZE,
    AddInteger = 0,
    SubInteger = 0,
    MulInteger = 0,
    DivInteger = 0,
    RemInteger = 0,
    NegInteger = 0,
    /// Replace the char on top of the stack with its code point.
    CharToInt = 0,
    /// Pop two values and push their string representations joined.
    Concat = 0,
    Eq = 0,
    NotEq = 0,
    Less = 0,
    LessEq = 0,
    Greater = 0,
    GreaterEq = 0,
    Not = 0,
    /// Increase the instruction pointer by the offset given as a word.
    /// The offset is relative to the jump instruction.
    JumpFront = WORD_SIZE,
    /// Decrease the instruction pointer by the offset given as a word.
    JumpBack = WORD_SIZE,
    /// Pop a bool and jump front if it is false.
    JumpFrontIfFalse = WORD_SIZE,
    /// Call a method of the same class by its index.
    InvokeLocal = WORD_SIZE,
    /// Call a method of another class. The word is the index of
    /// a string constant holding the method reference.
    InvokeStatic = WORD_SIZE,
    /// Like `InvokeStatic` but the receiver is passed below the arguments.
    InvokeVirtual = WORD_SIZE,
    Pop = 0,
    /// Return from the method with the value on top of the stack.
    Return = 0,
    /// Marks the end of a method that must return a value explicitly.
    Unreachable = 0,
}

impl TryFrom<u8> for OpCode {
    type Error = UnknownOpCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        OpCode::ALL
            .get(value as usize)
            .copied()
            .ok_or(UnknownOpCode(value))
    }
}

impl OpCode {
    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            OpCode::JumpFront | OpCode::JumpBack | OpCode::JumpFrontIfFalse
        )
    }

    /// Execution never falls through to the next instruction.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OpCode::Return | OpCode::Unreachable | OpCode::JumpFront | OpCode::JumpBack
        )
    }
}

/// Reads the word argument of the instruction at `index`.
pub fn read_word(code: &[u8], index: usize) -> Option<Word> {
    let bytes = code.get(index + 1..index + 1 + WORD_SIZE)?;
    let bytes: [u8; WORD_SIZE] = bytes.try_into().ok()?;
    Some(Word::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes_round_trip_through_bytes() {
        for (i, op) in OpCode::ALL.iter().enumerate() {
            assert_eq!(*op as u8 as usize, i);
            assert_eq!(OpCode::try_from(*op as u8), Ok(*op));
        }
        let past = OpCode::ALL.len() as u8;
        assert_eq!(OpCode::try_from(past), Err(UnknownOpCode(past)));
    }

    #[test]
    fn reading_words() {
        let mut code = vec![OpCode::JumpFront as u8];
        code.extend_from_slice(&17u64.to_le_bytes());
        assert_eq!(read_word(&code, 0), Some(17));
        assert_eq!(read_word(&code[..5], 0), None);
    }
}
