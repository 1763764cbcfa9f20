use std::{
    cell::RefCell,
    collections::HashMap,
    fmt::Debug,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use thiserror::Error;

use graderlib::{
    code::class_file::{ClassFile, CURRENT_VERSION, MIN_VERSION},
    signature::{ClassKind, ClassPath, ClassSignature, MethodSignature},
};

use crate::runtime::{
    class::{CompiledClass, LoadedType, LoaderId},
    std_lib,
};

use super::{
    linker::{LinkError, Linker},
    resolver::{resource_to_class_name, BootstrapResolver, ClassResolver, ResolutionStep},
    verifier::verify_class,
    ClassNotFound, LoadError,
};

/// Ids of platform classes are reserved, registries start at 1.
static NEXT_LOADER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("class `{0}` is already registered")]
    Duplicate(String),
}

/// Private class loader of one grading session.
///
/// Holds the bytes of compiled classes and resolves names in the order
/// given by [`ResolutionStep::ORDER`]: classes registered here, then
/// platform classes, then the parent. Entries are never replaced and every
/// class is materialized at most once, so all lookups of a name through
/// the same registry observe the same type.
pub struct ClassRegistry {
    id: LoaderId,
    parent: Rc<dyn ClassResolver>,
    max_version: u16,
    artifacts: RefCell<HashMap<String, Rc<[u8]>>>,
    loaded: RefCell<HashMap<String, Rc<LoadedType>>>,
    platform: RefCell<HashMap<&'static str, Rc<LoadedType>>>,
    /// Classes defined by the load in progress. They are visible to the
    /// classes they reference before their own links are resolved, and are
    /// dropped again if any class of the load fails to link.
    pending: RefCell<Vec<String>>,
}

impl ClassRegistry {
    pub fn new(parent: Rc<dyn ClassResolver>) -> Self {
        let id = LoaderId(NEXT_LOADER_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(loader = %id, "created class registry");
        Self {
            id,
            parent,
            max_version: CURRENT_VERSION,
            artifacts: RefCell::new(HashMap::new()),
            loaded: RefCell::new(HashMap::new()),
            platform: RefCell::new(HashMap::new()),
            pending: RefCell::new(Vec::new()),
        }
    }

    /// Registry whose parent is the [`BootstrapResolver`].
    pub fn standalone() -> Self {
        Self::new(Rc::new(BootstrapResolver))
    }

    /// Limits the class file versions this registry accepts.
    pub fn with_max_version(mut self, max_version: u16) -> Self {
        self.max_version = max_version;
        self
    }

    pub fn id(&self) -> LoaderId {
        self.id
    }

    pub fn parent(&self) -> &Rc<dyn ClassResolver> {
        &self.parent
    }

    /// Adds the bytes of a class. An already registered name is an error
    /// and leaves the existing entry untouched.
    pub fn register(&self, name: impl Into<String>, bytes: impl Into<Rc<[u8]>>) -> Result<(), RegistryError> {
        let name = name.into();
        let mut artifacts = self.artifacts.borrow_mut();
        if artifacts.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        let bytes = bytes.into();
        tracing::debug!(loader = %self.id, class = %name, bytes = bytes.len(), "registered class");
        artifacts.insert(name, bytes);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.artifacts.borrow().contains_key(name)
    }

    /// Names of the registered classes, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names = self.artifacts.borrow().keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Resolves the name and reports which step found it.
    pub fn locate(&self, name: &str) -> Result<(ResolutionStep, Rc<LoadedType>), LoadError> {
        for step in ResolutionStep::ORDER {
            let found = match step {
                ResolutionStep::Local => self.find_local(name)?,
                ResolutionStep::Platform => self.platform_type(name),
                ResolutionStep::Parent => match self.parent.find_class(name) {
                    Ok(typ) => Some(typ),
                    Err(err) if err.is_not_found() => None,
                    Err(err) => return Err(err),
                },
            };
            if let Some(typ) = found {
                tracing::debug!(loader = %self.id, class = name, %step, "resolved class");
                return Ok((step, typ));
            }
        }
        Err(ClassNotFound(name.to_owned()).into())
    }

    fn find_local(&self, name: &str) -> Result<Option<Rc<LoadedType>>, LoadError> {
        if let Some(typ) = self.loaded.borrow().get(name) {
            return Ok(Some(Rc::clone(typ)));
        }
        let bytes = match self.artifacts.borrow().get(name) {
            Some(bytes) => Rc::clone(bytes),
            None => return Ok(None),
        };
        self.define(name, &bytes).map(Some)
    }

    fn define(&self, name: &str, bytes: &[u8]) -> Result<Rc<LoadedType>, LoadError> {
        let format_error = |source| LoadError::Format {
            name: name.to_owned(),
            source,
        };
        let version = ClassFile::peek_version(bytes).map_err(format_error)?;
        if !(MIN_VERSION..=self.max_version).contains(&version) {
            return Err(LoadError::UnsupportedVersion {
                name: name.to_owned(),
                version,
                max: self.max_version,
            });
        }
        let file = ClassFile::from_bytes(bytes).map_err(format_error)?;
        if file.name != name {
            return Err(LoadError::NameMismatch {
                name: name.to_owned(),
                defined: file.name,
            });
        }
        verify_class(&file)?;

        let typ = Rc::new(LoadedType::compiled(
            name,
            self.id,
            CompiledClass::new(
                file.version,
                file.source_file,
                file.interfaces,
                file.constant_pool,
                file.methods,
            ),
        ));
        let outermost = self.pending.borrow().is_empty();
        self.pending.borrow_mut().push(name.to_owned());
        self.loaded
            .borrow_mut()
            .insert(name.to_owned(), Rc::clone(&typ));
        tracing::debug!(loader = %self.id, class = name, "defined class");

        let linked = self.link(&typ);
        if outermost {
            let pending = std::mem::take(&mut *self.pending.borrow_mut());
            if linked.is_err() {
                let mut loaded = self.loaded.borrow_mut();
                for name in &pending {
                    loaded.remove(name);
                }
                tracing::debug!(loader = %self.id, classes = ?pending, "rolled back failed load");
            }
        }
        linked?;
        Ok(typ)
    }

    fn link(&self, typ: &Rc<LoadedType>) -> Result<(), LinkError> {
        if let Some(class) = typ.as_compiled() {
            let linked = Linker::new(self, typ.name(), class).link()?;
            class.set_linked(linked);
        }
        Ok(())
    }

    fn platform_type(&self, name: &str) -> Option<Rc<LoadedType>> {
        let class = std_lib::platform_class(name)?;
        let typ = self
            .platform
            .borrow_mut()
            .entry(class.name)
            .or_insert_with(|| Rc::new(LoadedType::platform(class)))
            .clone();
        Some(typ)
    }

    fn local_signature(&self, name: &str) -> Option<ClassSignature> {
        if let Some(typ) = self.loaded.borrow().get(name) {
            return Some(typ.signature());
        }
        let bytes = self.artifacts.borrow().get(name).cloned()?;
        match ClassFile::from_bytes(&bytes) {
            Ok(file) => Some(signature_of(&file)),
            Err(err) => {
                tracing::debug!(class = name, %err, "registered class is malformed");
                None
            }
        }
    }
}

/// Signature read straight from a class file, without linking.
fn signature_of(file: &ClassFile) -> ClassSignature {
    ClassSignature {
        name: file.name.clone(),
        kind: ClassKind::Class,
        interfaces: file.interfaces.clone(),
        methods: file
            .methods
            .iter()
            .map(|m| MethodSignature::new(&m.name, m.descriptor.params.clone(), m.descriptor.ret))
            .collect(),
    }
}

impl ClassResolver for ClassRegistry {
    fn find_class(&self, name: &str) -> Result<Rc<LoadedType>, LoadError> {
        self.locate(name).map(|(_, typ)| typ)
    }

    fn find_resource(&self, name: &str) -> Option<Vec<u8>> {
        let class_name = resource_to_class_name(name);
        match self.artifacts.borrow().get(&class_name) {
            Some(bytes) => Some(bytes.to_vec()),
            None => self.parent.find_resource(name),
        }
    }

    fn class_signature(&self, name: &str) -> Option<ClassSignature> {
        ResolutionStep::ORDER.iter().find_map(|step| match step {
            ResolutionStep::Local => self.local_signature(name),
            ResolutionStep::Platform => std_lib::platform_class(name).map(|c| c.signature()),
            ResolutionStep::Parent => self.parent.class_signature(name),
        })
    }
}

impl ClassPath for ClassRegistry {
    fn class_signature(&self, name: &str) -> Option<ClassSignature> {
        ClassResolver::class_signature(self, name)
    }
}

impl Debug for ClassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("id", &self.id)
            .field("classes", &self.names())
            .finish_non_exhaustive()
    }
}
