use colored::Colorize;

use super::{
    class_file::ClassFile, constant_pool::ConstantPool, read_word, OpCode, UnknownOpCode,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstr {
    pub offset: usize,
    pub op: OpCode,
    pub mnemonic: &'static str,
    pub args: Vec<String>,
}

pub fn mnemonic(op: OpCode) -> &'static str {
    match op {
        OpCode::ConstLoadInteger => "loadi",
        OpCode::ConstLoadChar => "loadc",
        OpCode::ConstLoadString => "loads",
        OpCode::PushTrue => "true",
        OpCode::PushFalse => "false",
        OpCode::PushUnit => "unit",
        OpCode::StackCopyBottom => "copy_bottom",
        OpCode::StackAssign => "assign",
        OpCode::AddInteger => "addi",
        OpCode::SubInteger => "subi",
        OpCode::MulInteger => "muli",
        OpCode::DivInteger => "divi",
        OpCode::RemInteger => "remi",
        OpCode::NegInteger => "negi",
        OpCode::CharToInt => "c2i",
        OpCode::Concat => "concat",
        OpCode::Eq => "eq",
        OpCode::NotEq => "neq",
        OpCode::Less => "lt",
        OpCode::LessEq => "le",
        OpCode::Greater => "gt",
        OpCode::GreaterEq => "ge",
        OpCode::Not => "not",
        OpCode::JumpFront => "jump_front",
        OpCode::JumpBack => "jump_back",
        OpCode::JumpFrontIfFalse => "cjump_front",
        OpCode::InvokeLocal => "invoke_local",
        OpCode::InvokeStatic => "invoke_static",
        OpCode::InvokeVirtual => "invoke_virtual",
        OpCode::Pop => "pop",
        OpCode::Return => "ret",
        OpCode::Unreachable => "unreachable",
    }
}

/// Decodes the instructions, resolving constants where possible.
/// Arguments that cannot be resolved are shown raw.
pub fn decode(code: &[u8], cp: &ConstantPool) -> Result<Vec<DecodedInstr>, UnknownOpCode> {
    let mut res = Vec::new();
    let mut index = 0;
    while index < code.len() {
        let op = OpCode::try_from(code[index])?;
        let word = read_word(code, index);
        let args = match (op, word) {
            (_, None) if op.argument_size() > 0 => vec!["<truncated>".to_owned()],
            (OpCode::ConstLoadInteger, Some(i)) => vec![cp
                .get::<i64>(i as usize)
                .map(|v| v.to_string())
                .unwrap_or_else(|_| format!("#{i}"))],
            (OpCode::ConstLoadChar, Some(i)) => vec![cp
                .get::<char>(i as usize)
                .map(|v| format!("{v:?}"))
                .unwrap_or_else(|_| format!("#{i}"))],
            (OpCode::ConstLoadString | OpCode::InvokeStatic | OpCode::InvokeVirtual, Some(i)) => {
                vec![cp
                    .get::<String>(i as usize)
                    .map(|v| format!("{v:?}"))
                    .unwrap_or_else(|_| format!("#{i}"))]
            }
            (OpCode::JumpFront | OpCode::JumpFrontIfFalse, Some(offset)) => {
                vec![format!("+{offset}"), format!("(-> {})", index as u64 + offset)]
            }
            (OpCode::JumpBack, Some(offset)) => vec![
                format!("-{offset}"),
                format!("(-> {})", (index as u64).wrapping_sub(offset) as i64),
            ],
            (_, Some(word)) if op.argument_size() > 0 => vec![word.to_string()],
            _ => vec![],
        };
        res.push(DecodedInstr {
            offset: index,
            op,
            mnemonic: mnemonic(op),
            args,
        });
        index += 1 + op.argument_size();
    }
    Ok(res)
}

pub fn disassemble_code(code: &[u8], cp: &ConstantPool) -> String {
    let mut out = String::new();
    let instrs = match decode(code, cp) {
        Ok(instrs) => instrs,
        Err(err) => return format!("{}\n", err.to_string().red()),
    };
    for instr in instrs {
        out.push_str(&format!(
            "{:>6}: {:<15} {}\n",
            instr.offset.to_string().dimmed(),
            instr.mnemonic.bright_blue(),
            instr.args.join(" ")
        ));
    }
    out
}

pub fn disassemble_class(class: &ClassFile) -> String {
    let mut out = format!(
        "{} {} (version {})\n",
        "class".bold(),
        class.name.bold().green(),
        class.version
    );
    if !class.interfaces.is_empty() {
        out.push_str(&format!("  implements {}\n", class.interfaces.join(", ")));
    }
    for method in &class.methods {
        out.push_str(&format!(
            "  {}{} locals={}\n",
            method.name.yellow(),
            method.descriptor,
            method.max_locals
        ));
        out.push_str(&disassemble_code(&method.code, &class.constant_pool));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::Word;

    fn emit(code: &mut Vec<u8>, op: OpCode, arg: Option<Word>) {
        code.push(op as u8);
        if let Some(arg) = arg {
            code.extend_from_slice(&arg.to_le_bytes());
        }
    }

    #[test]
    fn decoding_resolves_constants_and_jump_targets() {
        let mut cp = ConstantPool::new();
        let seven = cp.add_entry(7i64);
        let max = cp.add_entry("Math::max(II)I");
        let mut code = Vec::new();
        emit(&mut code, OpCode::ConstLoadInteger, Some(seven as Word));
        emit(&mut code, OpCode::JumpFront, Some(10));
        emit(&mut code, OpCode::InvokeStatic, Some(max as Word));
        emit(&mut code, OpCode::Return, None);

        let decoded = decode(&code, &cp).unwrap();
        let summary = decoded
            .iter()
            .map(|i| format!("{} {} {}", i.offset, i.mnemonic, i.args.join(" ")))
            .collect::<Vec<_>>();
        similar_asserts::assert_eq!(
            expected: vec![
                "0 loadi 7".to_owned(),
                "9 jump_front +10 (-> 19)".to_owned(),
                "18 invoke_static \"Math::max(II)I\"".to_owned(),
                "27 ret ".to_owned(),
            ],
            actual: summary,
        );
    }

    #[test]
    fn unknown_opcode_stops_decoding() {
        let cp = ConstantPool::new();
        assert_eq!(decode(&[0xff], &cp), Err(UnknownOpCode(0xff)));
    }
}
