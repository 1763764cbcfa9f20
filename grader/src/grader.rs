//! The render, compile, load, instantiate and test pipeline.

use std::rc::Rc;

use serde::Serialize;

use graderlib::{
    compile::OptionsError, CompilerOptions, Diagnostic, Diagnostics, Severity, Template,
};
use gradervm::{BootstrapResolver, ClassRegistry, ClassResolver, LoadedType};

use crate::{
    compiler::SourceCompiler,
    harness::{Harness, Report},
    solution::{instantiate_solution, solution_interface, FallbackSolution, Solution},
};

/// Template the fragment is rendered into unless another one is given.
pub const SOLUTION_TEMPLATE: &str = include_str!("../resources/Solution.template");

/// Longest zero gap in the binary representation of `N`.
pub const REFERENCE_FRAGMENT: &str = "        let binary = Integer.toBinaryString(N)
        let max = 0
        let temp = 0
        for (c in binary) {
            if (c == '0') {
                temp += 1
            } else {
                max = Math.max(max, temp)
                temp = 0
            }
        }
        return max";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraderConfig {
    pub package_name: String,
    pub class_name: String,
    pub options: CompilerOptions,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            package_name: "com.getman.grader".to_owned(),
            class_name: "SolutionImpl".to_owned(),
            options: CompilerOptions::default(),
        }
    }
}

impl GraderConfig {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.package_name, self.class_name)
    }
}

/// Result of turning one fragment into a solution.
pub struct Submission {
    pub solution: Box<dyn Solution>,
    /// Warnings of a successful compilation, or every error that led to
    /// the fallback.
    pub diagnostics: Diagnostics,
    /// Registry of the session, it holds whatever was compiled.
    pub registry: Rc<ClassRegistry>,
    /// The loaded unit, if compilation succeeded.
    pub class: Option<Rc<LoadedType>>,
}

impl Submission {
    pub fn is_fallback(&self) -> bool {
        self.solution.is_fallback()
    }

    fn fallback(diagnostics: Diagnostics, registry: Rc<ClassRegistry>, class: Option<Rc<LoadedType>>) -> Self {
        Self {
            solution: Box::new(FallbackSolution),
            diagnostics,
            registry,
            class,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Grade {
    pub report: Report,
    pub diagnostics: Diagnostics,
}

/// Grades source fragments.
///
/// Each fragment is compiled by a fresh [`SourceCompiler`], so no two
/// submissions share a registry.
pub struct Grader {
    config: GraderConfig,
    template: Template,
    parent: Rc<dyn ClassResolver>,
}

impl Grader {
    pub fn new(config: GraderConfig) -> Result<Self, OptionsError> {
        config.options.validate()?;
        Ok(Self {
            config,
            template: Template::new(SOLUTION_TEMPLATE),
            parent: Rc::new(BootstrapResolver),
        })
    }

    pub fn with_template(mut self, template: Template) -> Self {
        self.template = template;
        self
    }

    /// Resolver consulted for names that are neither compiled in the
    /// session nor platform classes.
    pub fn with_parent(mut self, parent: Rc<dyn ClassResolver>) -> Self {
        self.parent = parent;
        self
    }

    pub fn config(&self) -> &GraderConfig {
        &self.config
    }

    pub fn render(&self, fragment: &str) -> String {
        self.template
            .render(&self.config.package_name, &self.config.class_name, fragment)
    }

    /// Compiles the fragment and instantiates it. Failures never escape,
    /// they produce the fallback solution and are kept as diagnostics.
    #[tracing::instrument(skip_all, fields(class = %self.config.qualified_name()))]
    pub fn new_impl(&self, fragment: &str) -> Submission {
        let qualified_name = self.config.qualified_name();
        let source = self.render(fragment);
        let compiler = match SourceCompiler::new(self.config.options.clone(), Rc::clone(&self.parent)) {
            Ok(compiler) => compiler,
            Err(err) => {
                tracing::warn!(%err, "invalid compiler options, using the fallback solution");
                let diagnostics = Diagnostics::from_iter([error(&qualified_name, err)]);
                let registry = Rc::new(ClassRegistry::new(Rc::clone(&self.parent)));
                return Submission::fallback(diagnostics, registry, None);
            }
        };
        let registry = Rc::clone(compiler.registry());

        let unit = match compiler.compile(&qualified_name, &source, &[solution_interface()]) {
            Ok(unit) => unit,
            Err(err) => {
                tracing::warn!(errors = err.diagnostics.error_count(), "compilation failed, using the fallback solution");
                return Submission::fallback(err.diagnostics, registry, None);
            }
        };
        let mut diagnostics = unit.diagnostics;
        match instantiate_solution(&unit.class) {
            Ok(solution) => Submission {
                solution: Box::new(solution),
                diagnostics,
                registry,
                class: Some(unit.class),
            },
            Err(err) => {
                tracing::warn!(%err, "instantiation failed, using the fallback solution");
                diagnostics.push(error(&qualified_name, err));
                Submission::fallback(diagnostics, registry, Some(unit.class))
            }
        }
    }

    pub fn grade(&self, fragment: &str, harness: &Harness) -> Grade {
        let submission = self.new_impl(fragment);
        let report = harness.run(submission.solution.as_ref());
        tracing::info!(
            passed = report.passed,
            total = report.total,
            fallback = report.fallback,
            "graded fragment"
        );
        Grade {
            report,
            diagnostics: submission.diagnostics,
        }
    }
}

fn error(unit: &str, err: impl ToString) -> Diagnostic {
    Diagnostic::new(Severity::Error, err.to_string()).in_source(unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_is_rendered_with_the_configured_names() {
        let grader = Grader::new(GraderConfig::default()).unwrap();
        similar_asserts::assert_eq!(
            expected: "package com.getman.grader\n\n\
                       class SolutionImpl implements Solution {\n    \
                       solution(N: Int) -> Int {\n\
                       return N\n    \
                       }\n\
                       }\n",
            actual: grader.render("return N").as_str(),
        );
    }

    #[test]
    fn reference_fragment_passes() {
        let grader = Grader::new(GraderConfig::default()).unwrap();
        let grade = grader.grade(REFERENCE_FRAGMENT, &Harness::default());
        assert!(grade.report.all_passed(), "{:?}", grade.report);
        assert!(!grade.diagnostics.has_errors(), "{}", grade.diagnostics);
    }

    #[test]
    fn unsupported_targets_are_rejected() {
        let config = GraderConfig {
            options: CompilerOptions {
                target: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(Grader::new(config).is_err());
    }

    #[test]
    fn template_without_the_contract_falls_back() {
        let grader = Grader::new(GraderConfig::default())
            .unwrap()
            .with_template(Template::new(
                "package $packageName\nclass $className {\n solution(N: Int) -> Int {\n$expression\n }\n}",
            ));
        let submission = grader.new_impl("return N");
        assert!(submission.is_fallback());
        assert!(submission.class.is_none());
        let messages: Vec<_> = submission
            .diagnostics
            .with_severity(Severity::Error)
            .map(|d| d.message.as_str())
            .collect();
        assert_eq!(
            messages,
            ["class `com.getman.grader.SolutionImpl` does not implement `Solution`"]
        );
    }
}
