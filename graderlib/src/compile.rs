use grader_syntax::{lexer::Lexer, parser::Parser};
use thiserror::Error;

use crate::{
    code::class_file::{CURRENT_VERSION, LINE_TABLE_VERSION, MIN_VERSION},
    diagnostics::{Diagnostics, Reporter},
    emitter::{emit_class, EmitOptions},
    signature::{ClassPath, Interface},
    typecheck::check_unit,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionsError {
    #[error("unsupported target `{0}`, supported targets are {MIN_VERSION} to {CURRENT_VERSION}")]
    UnsupportedTarget(String),
    #[error("flag `{0}` requires a value")]
    MissingValue(String),
    #[error("unknown flag `{0}`")]
    UnknownFlag(String),
}

/// Compiler configuration, fixed when the compiler is constructed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Class file format version to produce.
    pub target: u16,
    /// Report compilation phases as notes.
    pub verbose: bool,
    /// Include the source name and line tables.
    pub debug_info: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            target: CURRENT_VERSION,
            verbose: false,
            debug_info: false,
        }
    }
}

impl CompilerOptions {
    /// Parses javac style flags: `-target N`, `-verbose`, `-g`.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self, OptionsError> {
        let mut options = Self::default();
        let mut args = args.iter().map(AsRef::as_ref);
        while let Some(arg) = args.next() {
            match arg {
                "-target" | "--target" | "-release" | "--release" => {
                    let value = args
                        .next()
                        .ok_or_else(|| OptionsError::MissingValue(arg.to_owned()))?;
                    options.target = parse_target(value)?;
                }
                "-verbose" => options.verbose = true,
                "-g" => options.debug_info = true,
                "-g:none" => options.debug_info = false,
                other => return Err(OptionsError::UnknownFlag(other.to_owned())),
            }
        }
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if !(MIN_VERSION..=CURRENT_VERSION).contains(&self.target) {
            return Err(OptionsError::UnsupportedTarget(self.target.to_string()));
        }
        Ok(())
    }
}

fn parse_target(value: &str) -> Result<u16, OptionsError> {
    value
        .parse::<u16>()
        .ok()
        .filter(|t| (MIN_VERSION..=CURRENT_VERSION).contains(t))
        .ok_or_else(|| OptionsError::UnsupportedTarget(value.to_owned()))
}

/// Bytecode of one compiled class. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledArtifact {
    name: String,
    bytes: Box<[u8]>,
}

impl CompiledArtifact {
    pub fn new(name: impl Into<String>, bytes: impl Into<Box<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Qualified class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Successful compilation, the diagnostics hold only warnings and notes.
#[derive(Clone, Debug)]
pub struct Compilation {
    pub artifacts: Vec<CompiledArtifact>,
    pub diagnostics: Diagnostics,
}

#[derive(Error, Debug, Clone)]
#[error("compilation failed with {} error(s)", diagnostics.error_count())]
pub struct CompilationError {
    pub diagnostics: Diagnostics,
}

pub struct Compiler {
    options: CompilerOptions,
}

impl Compiler {
    pub fn new(options: CompilerOptions) -> Result<Self, OptionsError> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Compiles the unit entirely in memory.
    ///
    /// `unit_name` is the qualified name of the class the unit must define,
    /// it has to implement every one of `contracts`. Other classes of the
    /// unit are compiled too and returned as separate artifacts.
    #[tracing::instrument(skip(self, source, class_path, contracts), fields(target = self.options.target))]
    pub fn compile(
        &self,
        unit_name: &str,
        source: &str,
        class_path: &dyn ClassPath,
        contracts: &[Interface],
    ) -> Result<Compilation, CompilationError> {
        let mut parser = Parser::new(Lexer::new(source));
        let parsed = parser.parse();
        let mut reporter = Reporter::with_lines(parser.into_line_map(), unit_name);
        let file = match parsed {
            Ok(file) => file,
            Err(errors) => {
                for err in errors {
                    reporter.error(err.span, err.msg);
                }
                return Err(CompilationError {
                    diagnostics: reporter.into_diagnostics(),
                });
            }
        };
        if self.options.verbose {
            reporter.note("[parsing completed]");
        }
        tracing::debug!(classes = file.classes.len(), "parsed compilation unit");

        let classes = check_unit(&file, class_path, contracts, &mut reporter, self.options.verbose);

        match classes.iter().find(|c| c.name == unit_name) {
            None => reporter.error(
                0..0,
                format!("class `{unit_name}` is not defined in the compilation unit"),
            ),
            Some(unit) => {
                for contract in contracts {
                    if !unit.interfaces.contains(&contract.name) {
                        reporter.error(
                            0..0,
                            format!(
                                "class `{unit_name}` does not implement `{}`",
                                contract.name
                            ),
                        );
                    }
                }
            }
        }

        if reporter.has_errors() {
            return Err(CompilationError {
                diagnostics: reporter.into_diagnostics(),
            });
        }

        let debug_info = self.options.debug_info && self.options.target >= LINE_TABLE_VERSION;
        if self.options.debug_info && !debug_info {
            reporter.warning(
                0..0,
                format!(
                    "debug information requires target {LINE_TABLE_VERSION} or later, ignoring -g"
                ),
            );
        }
        let options = EmitOptions {
            version: self.options.target,
            debug_info,
            source_name: Some(unit_name.to_owned()),
        };

        let mut artifacts = Vec::with_capacity(classes.len());
        for class in &classes {
            match emit_class(class, &options) {
                Ok(class_file) => {
                    let bytes = class_file.to_bytes();
                    if self.options.verbose {
                        reporter.note(format!("[wrote {} ({} bytes)]", class.name, bytes.len()));
                    }
                    artifacts.push(CompiledArtifact::new(&class.name, bytes));
                }
                Err(err) => reporter.error(0..0, format!("internal compiler error: {err}")),
            }
        }
        let diagnostics = reporter.into_diagnostics();
        if diagnostics.has_errors() {
            return Err(CompilationError { diagnostics });
        }
        tracing::info!(
            artifacts = artifacts.len(),
            warnings = diagnostics.count(crate::diagnostics::Severity::Warning),
            "compiled unit"
        );
        Ok(Compilation {
            artifacts,
            diagnostics,
        })
    }
}
