use std::{fmt::Display, rc::Rc};

use graderlib::signature::ClassSignature;

use crate::runtime::class::LoadedType;

use super::{ClassNotFound, LoadError};

/// Something that can hand out runtime types by qualified name.
pub trait ClassResolver {
    fn find_class(&self, name: &str) -> Result<Rc<LoadedType>, LoadError>;

    /// Raw bytes of a class, by qualified name or resource path
    /// (`pkg/Cls.class`).
    fn find_resource(&self, name: &str) -> Option<Vec<u8>>;

    /// Compile time view of a class, without linking it if possible.
    fn class_signature(&self, name: &str) -> Option<ClassSignature> {
        self.find_class(name).ok().map(|c| c.signature())
    }
}

/// Root of every resolution chain. Owns no classes.
#[derive(Debug, Default, Clone, Copy)]
pub struct BootstrapResolver;

impl ClassResolver for BootstrapResolver {
    fn find_class(&self, name: &str) -> Result<Rc<LoadedType>, LoadError> {
        Err(ClassNotFound(name.to_owned()).into())
    }

    fn find_resource(&self, _name: &str) -> Option<Vec<u8>> {
        None
    }

    fn class_signature(&self, _name: &str) -> Option<ClassSignature> {
        None
    }
}

/// Stages of a registry lookup, tried in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResolutionStep {
    /// Classes registered in the registry itself.
    Local,
    /// Classes provided by the runtime.
    Platform,
    /// The enclosing resolver.
    Parent,
}

impl ResolutionStep {
    pub const ORDER: [ResolutionStep; 3] = [
        ResolutionStep::Local,
        ResolutionStep::Platform,
        ResolutionStep::Parent,
    ];
}

impl Display for ResolutionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResolutionStep::Local => "local",
            ResolutionStep::Platform => "platform",
            ResolutionStep::Parent => "parent",
        };
        write!(f, "{name}")
    }
}

/// Qualified class name for a resource path, `a/b/C.class` is `a.b.C`.
/// Names that are not resource paths are returned unchanged.
pub fn resource_to_class_name(name: &str) -> String {
    match name.strip_suffix(".class") {
        Some(path) => path.replace('/', "."),
        None => name.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_owns_nothing() {
        assert_eq!(
            BootstrapResolver.find_class("Math").unwrap_err(),
            LoadError::NotFound(ClassNotFound("Math".to_owned()))
        );
        assert_eq!(BootstrapResolver.find_resource("a/B.class"), None);
    }

    #[test]
    fn resource_paths_map_to_class_names() {
        assert_eq!(
            resource_to_class_name("com/getman/grader/SolutionImpl.class"),
            "com.getman.grader.SolutionImpl"
        );
        assert_eq!(resource_to_class_name("a.B"), "a.B");
    }
}
