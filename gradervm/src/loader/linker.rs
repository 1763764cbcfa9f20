use std::collections::HashMap;

use thiserror::Error;

use std::rc::Rc;

use graderlib::{
    code::{read_word, OpCode, Word, WORD_SIZE},
    signature::MethodRef,
};

use crate::runtime::{
    class::{CompiledClass, Link, LinkedCode, TypeKind},
    std_lib::PlatformClass,
};

use super::{resolver::ClassResolver, LoadError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("`{class}` references class `{reference}` which cannot be loaded: {cause}")]
    Unresolved {
        class: String,
        reference: String,
        cause: Box<LoadError>,
    },
    #[error("`{class}` references missing method `{reference}`")]
    NoSuchMethod { class: String, reference: String },
    #[error("`{class}` uses the wrong kind of invocation for `{reference}`")]
    InvocationKind { class: String, reference: String },
    #[error("`{class}` has a malformed method reference: {message}")]
    BadReference { class: String, message: String },
}

/// Replaces symbolic method references in the code of a verified class.
///
/// The constant pool index following `InvokeStatic` and `InvokeVirtual`
/// is overwritten with an index into the class' link table. References to
/// the class itself become `InvokeLocal`. A referenced class that is not
/// linked yet is part of a reference cycle and gets a weak link.
pub struct Linker<'r> {
    resolver: &'r dyn ClassResolver,
    name: &'r str,
    class: &'r CompiledClass,
    links: Vec<Link>,
    interned: HashMap<(String, OpCode), usize>,
}

enum Target {
    Local(usize),
    Linked(usize),
}

impl<'r> Linker<'r> {
    pub fn new(resolver: &'r dyn ClassResolver, name: &'r str, class: &'r CompiledClass) -> Self {
        Self {
            resolver,
            name,
            class,
            links: Vec::new(),
            interned: HashMap::new(),
        }
    }

    pub fn link(mut self) -> Result<LinkedCode, LinkError> {
        let class = self.class;
        let mut code = Vec::with_capacity(class.methods.len());
        for method in &class.methods {
            let mut method_code = method.code.clone();
            self.link_code(&mut method_code)?;
            code.push(method_code);
        }
        Ok(LinkedCode {
            code,
            links: self.links,
        })
    }

    fn link_code(&mut self, code: &mut [u8]) -> Result<(), LinkError> {
        let mut index = 0;
        while index < code.len() {
            let Ok(op) = OpCode::try_from(code[index]) else {
                return Err(self.bad_reference(format!("unknown opcode at {index}")));
            };
            if matches!(op, OpCode::InvokeStatic | OpCode::InvokeVirtual) {
                let cp_index = read_word(code, index)
                    .ok_or_else(|| self.bad_reference(format!("truncated call at {index}")))?;
                let (op, arg) = match self.resolve(cp_index as usize, op)? {
                    Target::Local(method) => (OpCode::InvokeLocal, method),
                    Target::Linked(link) => (op, link),
                };
                code[index] = op as u8;
                code[index + 1..index + 1 + WORD_SIZE].copy_from_slice(&(arg as Word).to_le_bytes());
            }
            index += 1 + op.argument_size();
        }
        Ok(())
    }

    fn resolve(&mut self, cp_index: usize, op: OpCode) -> Result<Target, LinkError> {
        let text = self
            .class
            .constant_pool
            .get::<String>(cp_index)
            .map_err(|e| self.bad_reference(e.to_string()))?;
        let reference = MethodRef::parse(&text).map_err(|e| self.bad_reference(e.to_string()))?;
        let virtual_call = op == OpCode::InvokeVirtual;

        if reference.class == self.name && !virtual_call {
            return self
                .class
                .methods
                .iter()
                .position(|m| m.name == reference.name && m.descriptor == reference.descriptor)
                .map(Target::Local)
                .ok_or_else(|| self.no_such_method(&text));
        }
        if let Some(link) = self.interned.get(&(text.clone(), op)) {
            return Ok(Target::Linked(*link));
        }

        tracing::debug!(class = %self.name, reference = %text, "linking");
        let target = match self.resolver.find_class(&reference.class) {
            Ok(target) => target,
            Err(cause) => {
                return Err(LinkError::Unresolved {
                    class: self.name.to_owned(),
                    reference: reference.class.clone(),
                    cause: Box::new(cause),
                })
            }
        };
        let index = target
            .method_index(&reference.name, &reference.descriptor)
            .ok_or_else(|| self.no_such_method(&text))?;
        let link = match target.kind() {
            TypeKind::Compiled(class) if !virtual_call && !class.is_linked() => Link::BackEdge {
                name: target.name().to_owned(),
                class: Rc::downgrade(&target),
                index,
            },
            TypeKind::Compiled(_) if !virtual_call => Link::Method {
                class: target.clone(),
                index,
            },
            TypeKind::Platform(platform) => {
                let platform: &'static PlatformClass = *platform;
                let native = &platform.methods[index];
                if native.signature.receiver.is_some() != virtual_call {
                    return Err(self.wrong_invocation(&text));
                }
                Link::Native(native)
            }
            TypeKind::Compiled(_) => return Err(self.wrong_invocation(&text)),
        };
        let id = self.links.len();
        self.links.push(link);
        self.interned.insert((text, op), id);
        Ok(Target::Linked(id))
    }

    fn bad_reference(&self, message: String) -> LinkError {
        LinkError::BadReference {
            class: self.name.to_owned(),
            message,
        }
    }

    fn no_such_method(&self, reference: &str) -> LinkError {
        LinkError::NoSuchMethod {
            class: self.name.to_owned(),
            reference: reference.to_owned(),
        }
    }

    fn wrong_invocation(&self, reference: &str) -> LinkError {
        LinkError::InvocationKind {
            class: self.name.to_owned(),
            reference: reference.to_owned(),
        }
    }
}
