//! Static checks of a parsed compilation unit.
//!
//! Checking happens in two steps. First the signatures of every class in
//! the unit are collected so that classes can call each other regardless
//! of their order. Then each method body is checked against them producing
//! the typed tree in [`typed`].

pub mod checker;
pub mod flow;
pub mod typed;

use grader_syntax::ast;

use crate::{
    diagnostics::Reporter,
    signature::{ClassKind, ClassPath, ClassSignature, Interface, MethodSignature, Type},
};

use typed::TypedClass;

/// Everything visible to the method bodies of one compilation unit.
pub struct UnitEnv<'a> {
    pub package: Option<String>,
    /// Signatures of the classes defined in the unit.
    pub classes: Vec<ClassSignature>,
    pub class_path: &'a dyn ClassPath,
}

impl<'a> UnitEnv<'a> {
    pub fn qualify(&self, name: &str) -> String {
        match &self.package {
            Some(pkg) => format!("{pkg}.{name}"),
            None => name.to_owned(),
        }
    }

    /// Resolves a class name as written in the source.
    /// A simple name is looked up in the unit's package first.
    /// Classes of the unit shadow the ones on the class path.
    pub fn resolve_class(&self, path: &[&str]) -> Option<ClassSignature> {
        let dotted = path.join(".");
        let mut candidates = Vec::with_capacity(2);
        if let (1, Some(pkg)) = (path.len(), &self.package) {
            candidates.push(format!("{pkg}.{dotted}"));
        }
        candidates.push(dotted);
        candidates.iter().find_map(|name| {
            self.classes
                .iter()
                .find(|c| &c.name == name)
                .cloned()
                .or_else(|| {
                    tracing::debug!(class = %name, "looking up class path");
                    self.class_path.class_signature(name)
                })
        })
    }
}

/// Checks the whole unit. Errors and warnings go to the reporter,
/// the returned classes are only meaningful if no error was reported.
pub fn check_unit(
    file: &ast::SourceFile,
    class_path: &dyn ClassPath,
    contracts: &[Interface],
    reporter: &mut Reporter,
    verbose: bool,
) -> Vec<TypedClass> {
    let mut env = UnitEnv {
        package: file.package_name(),
        classes: Vec::new(),
        class_path,
    };

    let mut defined = Vec::new();
    for class in &file.classes {
        let name = env.qualify(&class.name);
        if env.classes.iter().any(|c| c.name == name) {
            reporter.error(class.span.clone(), format!("duplicate class `{name}`"));
            continue;
        }
        let signature = collect_signature(&name, class, contracts, reporter);
        env.classes.push(signature);
        defined.push(class);
    }

    let mut typed_classes = Vec::new();
    for (class, signature) in defined.iter().zip(&env.classes) {
        if verbose {
            reporter.note(format!("[checking {}]", signature.name));
        }
        tracing::debug!(class = %signature.name, "checking class");
        let methods = signature
            .methods
            .iter()
            .zip(defined_methods(class, signature))
            .map(|(sig, def)| checker::check_method(&env, signature, sig, def, reporter))
            .collect();
        typed_classes.push(TypedClass {
            name: signature.name.clone(),
            interfaces: signature.interfaces.clone(),
            methods,
        });
    }
    typed_classes
}

/// Method definitions that made it into the signature, in the same order.
fn defined_methods<'c>(
    class: &'c ast::ClassDefinition,
    signature: &ClassSignature,
) -> Vec<&'c ast::MethodDefinition> {
    let mut res: Vec<&ast::MethodDefinition> = Vec::with_capacity(signature.methods.len());
    for method in &class.methods {
        if !res.iter().any(|m| m.name == method.name) {
            res.push(method);
        }
    }
    res
}

fn collect_signature(
    name: &str,
    class: &ast::ClassDefinition,
    contracts: &[Interface],
    reporter: &mut Reporter,
) -> ClassSignature {
    let mut methods: Vec<MethodSignature> = Vec::new();
    for method in &class.methods {
        if methods.iter().any(|m| m.name == method.name) {
            reporter.error(
                method.span.clone(),
                format!("method `{}` is already defined in class `{}`", method.name, class.name),
            );
            continue;
        }
        let mut params = Vec::with_capacity(method.parameters.len());
        for (i, param) in method.parameters.iter().enumerate() {
            if method.parameters[..i].iter().any(|p| p.name == param.name) {
                reporter.error(
                    param.span.clone(),
                    format!(
                        "variable `{}` is already defined in method `{}`",
                        param.name, method.name
                    ),
                );
            }
            let typ = match resolve_type(&param.typ, param.span.clone(), reporter) {
                Some(Type::Unit) => {
                    reporter.error(
                        param.span.clone(),
                        format!("parameter `{}` cannot have type Unit", param.name),
                    );
                    Type::Int
                }
                Some(typ) => typ,
                None => Type::Int,
            };
            params.push(typ);
        }
        let ret = resolve_type(&method.ret, method.span.clone(), reporter).unwrap_or(Type::Unit);
        methods.push(MethodSignature::new(&method.name, params, ret));
    }

    let mut signature = ClassSignature {
        name: name.to_owned(),
        kind: ClassKind::Class,
        interfaces: Vec::new(),
        methods,
    };

    for path in &class.implements {
        let dotted = path.dotted();
        let Some(contract) = contracts
            .iter()
            .find(|c| c.name == dotted || c.simple_name() == dotted)
        else {
            reporter.error(
                path.span.clone(),
                format!("cannot find symbol: interface `{dotted}`"),
            );
            continue;
        };
        if signature.interfaces.contains(&contract.name) {
            continue;
        }
        for required in &contract.methods {
            let implemented = signature
                .methods
                .iter()
                .any(|m| m.name == required.name && m.descriptor == required.descriptor);
            if !implemented {
                reporter.error(
                    class.span.clone(),
                    format!(
                        "class `{}` does not implement method `{} -> {}` of `{}`",
                        class.name,
                        required.display_params(),
                        required.descriptor.ret,
                        contract.simple_name()
                    ),
                );
            }
        }
        signature.interfaces.push(contract.name.clone());
    }
    signature
}

pub(crate) fn resolve_type(
    typ: &ast::Typ,
    span: std::ops::Range<usize>,
    reporter: &mut Reporter,
) -> Option<Type> {
    match typ {
        ast::Typ::Unit => Some(Type::Unit),
        ast::Typ::Name(name) => {
            let res = Type::from_name(name);
            if res.is_none() {
                reporter.error(span, format!("cannot find symbol: class `{name}`"));
            }
            res
        }
    }
}
