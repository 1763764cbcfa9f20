//! Binding loaded types to statically declared capability contracts.

use std::rc::Rc;

use thiserror::Error;

use graderlib::signature::Interface;

use crate::runtime::{
    class::LoadedType,
    instance::{Instance, MethodHandle},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstantiationError {
    #[error("class `{0}` cannot be instantiated")]
    NotInstantiable(String),
    #[error("class `{class}` does not implement `{interface}`")]
    MissingInterface { class: String, interface: String },
    #[error("class `{class}` has no method `{method}` required by `{interface}`")]
    MissingMethod {
        class: String,
        interface: String,
        method: String,
    },
}

/// A Rust view of an interface compiled classes can implement.
pub trait Contract: Sized {
    fn interface() -> Interface;

    /// Builds the adapter. `handles` follow the order of the
    /// interface's methods.
    fn adapt(instance: Instance, handles: Vec<MethodHandle>) -> Self;
}

/// Creates an instance of the type and adapts it to the contract.
/// Every contract method is bound once, here.
pub fn instantiate<C: Contract>(class: &Rc<LoadedType>) -> Result<C, InstantiationError> {
    let instance = Instance::new(class)?;
    let interface = C::interface();
    if !class.implements(&interface.name) {
        return Err(InstantiationError::MissingInterface {
            class: class.name().to_owned(),
            interface: interface.name,
        });
    }
    let handles = interface
        .methods
        .iter()
        .map(|m| {
            MethodHandle::bind(class, m).ok_or_else(|| InstantiationError::MissingMethod {
                class: class.name().to_owned(),
                interface: interface.name.clone(),
                method: format!("{}{}", m.name, m.descriptor),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(class = class.name(), contract = %interface.name, "instantiated");
    Ok(C::adapt(instance, handles))
}

#[cfg(test)]
mod tests {
    use graderlib::signature::{MethodSignature, Type};

    use super::*;
    use crate::{
        loader::{registry::ClassRegistry, resolver::ClassResolver},
        testing::load_unit,
        value::Value,
    };

    struct Doubler {
        instance: Instance,
        double: MethodHandle,
    }

    impl Contract for Doubler {
        fn interface() -> Interface {
            Interface::new(
                "Doubler",
                vec![MethodSignature::new("double", vec![Type::Int], Type::Int)],
            )
        }

        fn adapt(instance: Instance, mut handles: Vec<MethodHandle>) -> Self {
            Self {
                instance,
                double: handles.remove(0),
            }
        }
    }

    fn load_declaring(implements: Option<&str>) -> Rc<LoadedType> {
        let (registry, class) = load_unit(
            "class D {\n double(n: Int) -> Int { return n + n }\n}",
            "D",
            false,
        );
        let Some(implements) = implements else {
            return class;
        };
        // The test compiler knows no contracts, the declaration is added
        // to the class file instead.
        let mut file = graderlib::code::class_file::ClassFile::from_bytes(
            &registry.find_resource("D").unwrap(),
        )
        .unwrap();
        file.interfaces.push(implements.to_owned());
        let patched = ClassRegistry::standalone();
        patched.register("D", file.to_bytes()).unwrap();
        patched.find_class("D").unwrap()
    }

    #[test]
    fn contract_methods_are_bound() {
        let class = load_declaring(Some("Doubler"));
        let doubler = instantiate::<Doubler>(&class).unwrap();
        assert_eq!(
            doubler
                .double
                .invoke(&doubler.instance, vec![Value::Int(4)]),
            Ok(Value::Int(8))
        );
    }

    #[test]
    fn undeclared_contract_is_rejected() {
        let class = load_declaring(None);
        assert_eq!(
            instantiate::<Doubler>(&class).err(),
            Some(InstantiationError::MissingInterface {
                class: "D".to_owned(),
                interface: "Doubler".to_owned()
            })
        );
    }

    #[test]
    fn platform_classes_cannot_be_instantiated() {
        let math = ClassRegistry::standalone().find_class("Math").unwrap();
        assert_eq!(
            instantiate::<Doubler>(&math).err(),
            Some(InstantiationError::NotInstantiable("Math".to_owned()))
        );
    }
}
