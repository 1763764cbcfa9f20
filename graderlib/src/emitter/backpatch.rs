use std::collections::HashMap;

use thiserror::Error;

use crate::code::{read_word, OpCode, Word, WORD_SIZE};

use super::Label;

/// Set on jump arguments that still hold a label instead of an offset.
pub const LABEL_BACKPATCH_MASK: Word = 1 << (Word::BITS - 1);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackpatchError {
    #[error("label {0:?} was never placed")]
    UnknownLabel(Label),
    #[error("jump at {0} is truncated")]
    Truncated(usize),
    #[error("jump at {from} to label placed before it at {to}")]
    BackwardLabel { from: usize, to: usize },
    #[error("unknown opcode {0:#04x} while backpatching")]
    UnknownOpCode(u8),
}

/// Replaces labels in forward jumps with relative offsets.
pub struct Backpatcher<'a> {
    labels: &'a HashMap<Label, usize>,
}

impl<'a> Backpatcher<'a> {
    pub fn new(labels: &'a HashMap<Label, usize>) -> Self {
        Self { labels }
    }

    pub fn backpatch_code(&self, mut instrs: Vec<u8>) -> Result<Vec<u8>, BackpatchError> {
        let mut index = 0;
        while index < instrs.len() {
            let instr = OpCode::try_from(instrs[index])
                .map_err(|_| BackpatchError::UnknownOpCode(instrs[index]))?;
            if matches!(instr, OpCode::JumpFront | OpCode::JumpFrontIfFalse) {
                let label_val =
                    read_word(&instrs, index).ok_or(BackpatchError::Truncated(index))?;
                if label_val & LABEL_BACKPATCH_MASK != 0 {
                    let label = Label((label_val & !LABEL_BACKPATCH_MASK) as usize);
                    let target = *self
                        .labels
                        .get(&label)
                        .ok_or(BackpatchError::UnknownLabel(label))?;
                    if target < index {
                        return Err(BackpatchError::BackwardLabel {
                            from: index,
                            to: target,
                        });
                    }
                    let offset = (target - index) as Word;
                    instrs[index + 1..index + 1 + WORD_SIZE].copy_from_slice(&offset.to_le_bytes());
                }
            }
            index += 1 + instr.argument_size();
        }
        Ok(instrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jump(op: OpCode, arg: Word) -> Vec<u8> {
        let mut code = vec![op as u8];
        code.extend_from_slice(&arg.to_le_bytes());
        code
    }

    #[test]
    fn labels_become_relative_offsets() {
        let mut code = vec![OpCode::PushTrue as u8];
        code.extend(jump(OpCode::JumpFrontIfFalse, LABEL_BACKPATCH_MASK | 3));
        code.push(OpCode::PushUnit as u8);
        code.push(OpCode::Return as u8);
        let labels = HashMap::from([(Label(3), 11)]);
        let patched = Backpatcher::new(&labels).backpatch_code(code).unwrap();
        assert_eq!(read_word(&patched, 1), Some(10));
    }

    #[test]
    fn resolved_offsets_are_left_alone() {
        let code = jump(OpCode::JumpFront, 9);
        let labels = HashMap::new();
        let patched = Backpatcher::new(&labels).backpatch_code(code.clone()).unwrap();
        assert_eq!(patched, code);
    }

    #[test]
    fn missing_label_is_an_error() {
        let code = jump(OpCode::JumpFront, LABEL_BACKPATCH_MASK | 1);
        let labels = HashMap::new();
        assert_eq!(
            Backpatcher::new(&labels).backpatch_code(code),
            Err(BackpatchError::UnknownLabel(Label(1)))
        );
    }
}
