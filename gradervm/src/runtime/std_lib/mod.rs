//! Platform classes, implemented natively and visible to every registry.

use std::collections::HashMap;

use lazy_static::lazy_static;

use graderlib::signature::{ClassKind, ClassSignature, MethodSignature, Type};

use crate::value::Value;

use super::ErrorKind;

mod string;

/// Receives the receiver first for instance methods, then the arguments.
pub type NativeFn = fn(&[Value]) -> Result<Value, ErrorKind>;

pub struct NativeMethod {
    pub signature: MethodSignature,
    pub func: NativeFn,
}

pub struct PlatformClass {
    pub name: &'static str,
    pub methods: Vec<NativeMethod>,
}

impl PlatformClass {
    pub fn method(&self, name: &str) -> Option<&NativeMethod> {
        self.methods.iter().find(|m| m.signature.name == name)
    }

    pub fn signature(&self) -> ClassSignature {
        ClassSignature {
            name: self.name.to_owned(),
            kind: ClassKind::Native,
            interfaces: Vec::new(),
            methods: self.methods.iter().map(|m| m.signature.clone()).collect(),
        }
    }
}

fn native(name: &str, params: Vec<Type>, ret: Type, func: NativeFn) -> NativeMethod {
    NativeMethod {
        signature: MethodSignature::new(name, params, ret),
        func,
    }
}

fn class(name: &'static str, methods: Vec<NativeMethod>) -> (&'static str, PlatformClass) {
    (name, PlatformClass { name, methods })
}

lazy_static! {
    static ref PLATFORM_CLASSES: HashMap<&'static str, PlatformClass> = HashMap::from([
        class(
            "Math",
            vec![
                native("max", vec![Type::Int, Type::Int], Type::Int, math_max),
                native("min", vec![Type::Int, Type::Int], Type::Int, math_min),
                native("abs", vec![Type::Int], Type::Int, math_abs),
                native("pow", vec![Type::Int, Type::Int], Type::Int, math_pow),
            ],
        ),
        class(
            "Integer",
            vec![
                native("toBinaryString", vec![Type::Int], Type::String, to_binary_string),
                native("toString", vec![Type::Int], Type::String, int_to_string),
                native("parseInt", vec![Type::String], Type::Int, parse_int),
                native("bitCount", vec![Type::Int], Type::Int, bit_count),
            ],
        ),
        class(
            "Character",
            vec![
                native("isDigit", vec![Type::Char], Type::Bool, is_digit),
                native("isLetter", vec![Type::Char], Type::Bool, is_letter),
            ],
        ),
        class("String", string::methods()),
    ]);
}

pub fn platform_class(name: &str) -> Option<&'static PlatformClass> {
    PLATFORM_CLASSES.get(name)
}

/// Names of all platform classes, sorted.
pub fn platform_class_names() -> Vec<&'static str> {
    let mut names = PLATFORM_CLASSES.keys().copied().collect::<Vec<_>>();
    names.sort_unstable();
    names
}

fn ints<const N: usize>(args: &[Value], op: &'static str) -> Result<[i64; N], ErrorKind> {
    let mut res = [0; N];
    if args.len() != N {
        return Err(ErrorKind::InvalidOperands(op));
    }
    for (slot, arg) in res.iter_mut().zip(args) {
        *slot = arg.as_int().ok_or(ErrorKind::InvalidOperands(op))?;
    }
    Ok(res)
}

fn char_arg(args: &[Value], op: &'static str) -> Result<char, ErrorKind> {
    match args {
        [Value::Char(c)] => Ok(*c),
        _ => Err(ErrorKind::InvalidOperands(op)),
    }
}

fn math_max(args: &[Value]) -> Result<Value, ErrorKind> {
    let [a, b] = ints(args, "Math::max")?;
    Ok(Value::Int(a.max(b)))
}

fn math_min(args: &[Value]) -> Result<Value, ErrorKind> {
    let [a, b] = ints(args, "Math::min")?;
    Ok(Value::Int(a.min(b)))
}

fn math_abs(args: &[Value]) -> Result<Value, ErrorKind> {
    let [a] = ints(args, "Math::abs")?;
    Ok(Value::Int(a.wrapping_abs()))
}

fn math_pow(args: &[Value]) -> Result<Value, ErrorKind> {
    let [base, exp] = ints(args, "Math::pow")?;
    let exp = u32::try_from(exp)
        .map_err(|_| ErrorKind::IllegalArgument(format!("exponent {exp} is out of range")))?;
    Ok(Value::Int(base.wrapping_pow(exp)))
}

fn to_binary_string(args: &[Value]) -> Result<Value, ErrorKind> {
    let [n] = ints(args, "Integer::toBinaryString")?;
    Ok(Value::from(format!("{n:b}")))
}

fn int_to_string(args: &[Value]) -> Result<Value, ErrorKind> {
    let [n] = ints(args, "Integer::toString")?;
    Ok(Value::from(n.to_string()))
}

fn parse_int(args: &[Value]) -> Result<Value, ErrorKind> {
    match args {
        [Value::String(s)] => s
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| ErrorKind::NumberFormat(s.to_string())),
        _ => Err(ErrorKind::InvalidOperands("Integer::parseInt")),
    }
}

fn bit_count(args: &[Value]) -> Result<Value, ErrorKind> {
    let [n] = ints(args, "Integer::bitCount")?;
    Ok(Value::Int(n.count_ones() as i64))
}

fn is_digit(args: &[Value]) -> Result<Value, ErrorKind> {
    Ok(Value::Bool(char_arg(args, "Character::isDigit")?.is_ascii_digit()))
}

fn is_letter(args: &[Value]) -> Result<Value, ErrorKind> {
    Ok(Value::Bool(char_arg(args, "Character::isLetter")?.is_alphabetic()))
}
