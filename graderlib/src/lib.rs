pub mod code;
pub mod compile;
pub mod diagnostics;
pub mod emitter;
pub mod scope;
pub mod signature;
pub mod template;
pub mod typecheck;

pub use compile::{CompilationError, CompiledArtifact, Compilation, Compiler, CompilerOptions};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use template::{Template, TemplateError};
