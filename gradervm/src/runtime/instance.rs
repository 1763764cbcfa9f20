use std::rc::Rc;

use thiserror::Error;

use graderlib::signature::{MethodDescriptor, MethodSignature, Type};

use crate::{contract::InstantiationError, value::Value};

use super::{class::LoadedType, thread::Thread, ExecutionError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    #[error("method of `{expected}` invoked on an instance of `{actual}`, the classes come from different loaders or differ")]
    IncompatibleClass { expected: String, actual: String },
    #[error("`{method}{descriptor}` cannot be applied to ({found})")]
    BadArguments {
        method: String,
        descriptor: MethodDescriptor,
        found: String,
    },
    #[error("expected `{expected}` to be returned, got `{found}`")]
    BadReturn { expected: Type, found: Type },
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Live object of a compiled class. Units carry no fields,
/// the instance is only its type.
#[derive(Debug, Clone)]
pub struct Instance {
    class: Rc<LoadedType>,
}

impl Instance {
    /// Creates the instance with the implicit no argument constructor.
    pub fn new(class: &Rc<LoadedType>) -> Result<Self, InstantiationError> {
        if !class.is_instantiable() {
            return Err(InstantiationError::NotInstantiable(class.name().to_owned()));
        }
        Ok(Self {
            class: Rc::clone(class),
        })
    }

    pub fn class(&self) -> &Rc<LoadedType> {
        &self.class
    }
}

/// A method of one loaded type, looked up once.
#[derive(Debug, Clone)]
pub struct MethodHandle {
    class: Rc<LoadedType>,
    index: usize,
    name: String,
    descriptor: MethodDescriptor,
}

impl MethodHandle {
    pub fn bind(class: &Rc<LoadedType>, signature: &MethodSignature) -> Option<Self> {
        let index = class.method_index(&signature.name, &signature.descriptor)?;
        Some(Self {
            class: Rc::clone(class),
            index,
            name: signature.name.clone(),
            descriptor: signature.descriptor.clone(),
        })
    }

    pub fn class(&self) -> &Rc<LoadedType> {
        &self.class
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    /// Calls the method on the instance. The instance has to be of the very
    /// type the handle was bound to.
    pub fn invoke(&self, instance: &Instance, args: Vec<Value>) -> Result<Value, InvocationError> {
        if !LoadedType::same(&self.class, &instance.class) {
            return Err(InvocationError::IncompatibleClass {
                expected: self.class.to_string(),
                actual: instance.class.to_string(),
            });
        }
        let matches = args.len() == self.descriptor.arity()
            && args
                .iter()
                .zip(&self.descriptor.params)
                .all(|(arg, param)| arg.typ() == *param);
        if !matches {
            return Err(InvocationError::BadArguments {
                method: self.name.clone(),
                descriptor: self.descriptor.clone(),
                found: args
                    .iter()
                    .map(|a| a.typ().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
        let res = Thread::new().invoke(&self.class, self.index, args)?;
        if res.typ() != self.descriptor.ret {
            return Err(InvocationError::BadReturn {
                expected: self.descriptor.ret,
                found: res.typ(),
            });
        }
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::load_unit;

    const UNIT: &str = "package p\nclass Twice {\n f(n: Int) -> Int { return n * 2 }\n}";

    fn f() -> MethodSignature {
        MethodSignature::new("f", vec![Type::Int], Type::Int)
    }

    #[test]
    fn handles_invoke_methods_of_their_type() {
        let (_registry, class) = load_unit(UNIT, "p.Twice", false);
        let instance = Instance::new(&class).unwrap();
        let handle = MethodHandle::bind(&class, &f()).unwrap();
        assert_eq!(handle.invoke(&instance, vec![Value::Int(21)]), Ok(Value::Int(42)));
        assert!(MethodHandle::bind(&class, &MethodSignature::new("f", vec![], Type::Int)).is_none());
    }

    #[test]
    fn handles_reject_instances_of_other_loaders() {
        let (_a, class_a) = load_unit(UNIT, "p.Twice", false);
        let (_b, class_b) = load_unit(UNIT, "p.Twice", false);
        let handle = MethodHandle::bind(&class_a, &f()).unwrap();
        let other = Instance::new(&class_b).unwrap();
        assert!(matches!(
            handle.invoke(&other, vec![Value::Int(1)]),
            Err(InvocationError::IncompatibleClass { .. })
        ));
    }

    #[test]
    fn arguments_are_checked() {
        let (_registry, class) = load_unit(UNIT, "p.Twice", false);
        let instance = Instance::new(&class).unwrap();
        let handle = MethodHandle::bind(&class, &f()).unwrap();
        assert_eq!(
            handle
                .invoke(&instance, vec![Value::from("1")])
                .unwrap_err()
                .to_string(),
            "`f(I)I` cannot be applied to (String)"
        );
    }
}
