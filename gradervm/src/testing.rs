use std::rc::Rc;

use graderlib::{signature::ClassPath, CompiledArtifact, Compiler, CompilerOptions};

use crate::{
    loader::{registry::ClassRegistry, resolver::ClassResolver},
    runtime::class::LoadedType,
};

pub(crate) fn compile(
    source: &str,
    unit: &str,
    debug_info: bool,
    class_path: &dyn ClassPath,
) -> Vec<CompiledArtifact> {
    let options = CompilerOptions {
        debug_info,
        ..Default::default()
    };
    match Compiler::new(options)
        .unwrap()
        .compile(unit, source, class_path, &[])
    {
        Ok(compilation) => compilation.artifacts,
        Err(err) => panic!("test unit does not compile:\n{}", err.diagnostics),
    }
}

/// Compiles the unit into a fresh registry and loads `unit`.
pub(crate) fn load_unit(
    source: &str,
    unit: &str,
    debug_info: bool,
) -> (Rc<ClassRegistry>, Rc<LoadedType>) {
    let registry = Rc::new(ClassRegistry::standalone());
    for artifact in compile(source, unit, debug_info, registry.as_ref()) {
        registry
            .register(artifact.name(), artifact.bytes())
            .unwrap();
    }
    let class = registry.find_class(unit).unwrap();
    (registry, class)
}
