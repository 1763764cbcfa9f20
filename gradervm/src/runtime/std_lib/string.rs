//! Instance methods of `String`. Indices count characters, not bytes.

use graderlib::signature::{MethodSignature, Type};

use crate::{runtime::ErrorKind, value::Value};

use super::{NativeFn, NativeMethod};

fn method(name: &str, params: Vec<Type>, ret: Type, func: NativeFn) -> NativeMethod {
    NativeMethod {
        signature: MethodSignature::instance(name, Type::String, params, ret),
        func,
    }
}

pub(super) fn methods() -> Vec<NativeMethod> {
    vec![
        method("length", vec![], Type::Int, length),
        method("charAt", vec![Type::Int], Type::Char, char_at),
        method("substring", vec![Type::Int, Type::Int], Type::String, substring),
        method("isEmpty", vec![], Type::Bool, is_empty),
        method("indexOf", vec![Type::Char], Type::Int, index_of),
    ]
}

fn length(args: &[Value]) -> Result<Value, ErrorKind> {
    match args {
        [Value::String(s)] => Ok(Value::Int(s.chars().count() as i64)),
        _ => Err(ErrorKind::InvalidOperands("String::length")),
    }
}

fn check_index(index: i64, len: usize) -> Result<usize, ErrorKind> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i < len)
        .ok_or(ErrorKind::IndexOutOfBounds { index, len })
}

fn char_at(args: &[Value]) -> Result<Value, ErrorKind> {
    let [Value::String(s), Value::Int(index)] = args else {
        return Err(ErrorKind::InvalidOperands("String::charAt"));
    };
    let len = s.chars().count();
    let index = check_index(*index, len)?;
    s.chars()
        .nth(index)
        .map(Value::Char)
        .ok_or(ErrorKind::IndexOutOfBounds {
            index: index as i64,
            len,
        })
}

fn substring(args: &[Value]) -> Result<Value, ErrorKind> {
    let [Value::String(s), Value::Int(begin), Value::Int(end)] = args else {
        return Err(ErrorKind::InvalidOperands("String::substring"));
    };
    let len = s.chars().count();
    // `end` may equal the length.
    let end_index = check_index(*end, len + 1)?;
    let begin_index = check_index(*begin, end_index + 1)?;
    Ok(Value::from(
        s.chars()
            .skip(begin_index)
            .take(end_index - begin_index)
            .collect::<String>(),
    ))
}

fn is_empty(args: &[Value]) -> Result<Value, ErrorKind> {
    match args {
        [Value::String(s)] => Ok(Value::Bool(s.is_empty())),
        _ => Err(ErrorKind::InvalidOperands("String::isEmpty")),
    }
}

fn index_of(args: &[Value]) -> Result<Value, ErrorKind> {
    let [Value::String(s), Value::Char(c)] = args else {
        return Err(ErrorKind::InvalidOperands("String::indexOf"));
    };
    let index = s.chars().position(|x| x == *c).map_or(-1, |i| i as i64);
    Ok(Value::Int(index))
}
