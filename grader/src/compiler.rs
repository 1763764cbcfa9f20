//! Compilation straight into a private class registry.

use std::rc::Rc;

use graderlib::{
    compile::OptionsError, signature::Interface, Compilation, CompilationError, Compiler,
    CompilerOptions, Diagnostic, Diagnostics, Severity,
};
use gradervm::{ClassRegistry, ClassResolver, LoadedType};

/// The loaded unit together with the warnings of its compilation.
#[derive(Debug)]
pub struct CompiledUnit {
    pub class: Rc<LoadedType>,
    pub diagnostics: Diagnostics,
}

/// A compiler paired with the registry it loads into.
///
/// One pair serves one grading session. Compiling the same source with
/// another pair produces a type that is not interchangeable with this one.
pub struct SourceCompiler {
    compiler: Compiler,
    registry: Rc<ClassRegistry>,
}

impl SourceCompiler {
    pub fn new(options: CompilerOptions, parent: Rc<dyn ClassResolver>) -> Result<Self, OptionsError> {
        let compiler = Compiler::new(options)?;
        let registry = ClassRegistry::new(parent).with_max_version(compiler.options().target);
        Ok(Self {
            compiler,
            registry: Rc::new(registry),
        })
    }

    pub fn options(&self) -> &CompilerOptions {
        self.compiler.options()
    }

    pub fn registry(&self) -> &Rc<ClassRegistry> {
        &self.registry
    }

    /// Compiles `source`, registers every produced class and loads
    /// `qualified_name`. Registration and loading failures are reported as
    /// error diagnostics next to the ones of the compiler.
    #[tracing::instrument(skip(self, source, contracts), fields(loader = %self.registry.id()))]
    pub fn compile(
        &self,
        qualified_name: &str,
        source: &str,
        contracts: &[Interface],
    ) -> Result<CompiledUnit, CompilationError> {
        let Compilation {
            artifacts,
            mut diagnostics,
        } = self
            .compiler
            .compile(qualified_name, source, self.registry.as_ref(), contracts)?;

        for artifact in &artifacts {
            if let Err(err) = self.registry.register(artifact.name(), artifact.bytes()) {
                diagnostics.push(error(qualified_name, err));
            }
        }
        if diagnostics.has_errors() {
            return Err(CompilationError { diagnostics });
        }

        match self.registry.locate(qualified_name) {
            Ok((step, class)) => {
                tracing::debug!(class = %class, %step, "resolved compiled unit");
                Ok(CompiledUnit { class, diagnostics })
            }
            Err(err) => {
                diagnostics.push(error(qualified_name, err));
                Err(CompilationError { diagnostics })
            }
        }
    }
}

fn error(unit: &str, err: impl ToString) -> Diagnostic {
    Diagnostic::new(Severity::Error, err.to_string()).in_source(unit)
}

#[cfg(test)]
mod tests {
    use gradervm::{BootstrapResolver, ResolutionStep};

    use super::*;
    use crate::solution::solution_interface;

    const UNIT: &str = "package p\n\
        class Impl implements Solution {\n\
            solution(N: Int) -> Int { return Helper.twice(N) }\n\
        }\n\
        class Helper {\n\
            twice(n: Int) -> Int { return n + n }\n\
        }";

    fn compiler() -> SourceCompiler {
        SourceCompiler::new(CompilerOptions::default(), Rc::new(BootstrapResolver)).unwrap()
    }

    #[test]
    fn every_class_of_the_unit_is_registered() {
        let compiler = compiler();
        let unit = compiler
            .compile("p.Impl", UNIT, &[solution_interface()])
            .unwrap();
        assert_eq!(unit.class.name(), "p.Impl");
        assert_eq!(unit.class.loader(), compiler.registry().id());
        similar_asserts::assert_eq!(
            expected: vec!["p.Helper".to_owned(), "p.Impl".to_owned()],
            actual: compiler.registry().names(),
        );
        let (step, helper) = compiler.registry().locate("p.Helper").unwrap();
        assert_eq!(step, ResolutionStep::Local);
        assert_eq!(helper.loader(), compiler.registry().id());
    }

    #[test]
    fn recompiling_into_the_same_registry_is_an_error() {
        let compiler = compiler();
        let first = compiler
            .compile("p.Impl", UNIT, &[solution_interface()])
            .unwrap();
        let err = compiler
            .compile("p.Impl", UNIT, &[solution_interface()])
            .unwrap_err();
        let messages: Vec<_> = err
            .diagnostics
            .with_severity(Severity::Error)
            .map(|d| d.message.clone())
            .collect();
        similar_asserts::assert_eq!(
            expected: vec![
                "class `p.Impl` is already registered".to_owned(),
                "class `p.Helper` is already registered".to_owned(),
            ],
            actual: messages,
        );
        let (_, class) = compiler.registry().locate("p.Impl").unwrap();
        assert!(LoadedType::same(&class, &first.class));
    }

    #[test]
    fn compile_errors_keep_the_registry_empty() {
        let compiler = compiler();
        let err = compiler
            .compile(
                "p.Impl",
                "package p\nclass Impl implements Solution {\n solution(N: Int) -> Int { return true }\n}",
                &[solution_interface()],
            )
            .unwrap_err();
        assert!(err.diagnostics.has_errors());
        assert!(compiler.registry().names().is_empty());
    }

    #[test]
    fn unsupported_targets_are_rejected_at_construction() {
        let options = CompilerOptions {
            target: 9,
            ..Default::default()
        };
        assert_eq!(
            SourceCompiler::new(options, Rc::new(BootstrapResolver)).err(),
            Some(OptionsError::UnsupportedTarget("9".to_owned()))
        );
    }

    #[test]
    fn older_targets_load_into_registries_of_that_target() {
        let options = CompilerOptions {
            target: 1,
            ..Default::default()
        };
        let compiler = SourceCompiler::new(options, Rc::new(BootstrapResolver)).unwrap();
        let unit = compiler
            .compile("p.Impl", UNIT, &[solution_interface()])
            .unwrap();
        assert_eq!(unit.class.as_compiled().map(|c| c.version), Some(1));
    }
}
