use std::{
    cell::OnceCell,
    fmt::Debug,
    fmt::Display,
    rc::{Rc, Weak},
};

use graderlib::{
    code::{class_file::MethodInfo, constant_pool::ConstantPool},
    signature::{ClassKind, ClassSignature, MethodDescriptor, MethodSignature},
};

use super::std_lib::{NativeMethod, PlatformClass};

/// Identity of the loader that defined a type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoaderId(pub u64);

impl LoaderId {
    /// Reserved for platform classes.
    pub const PLATFORM: LoaderId = LoaderId(0);
}

impl Display for LoaderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == LoaderId::PLATFORM {
            write!(f, "platform")
        } else {
            write!(f, "loader#{}", self.0)
        }
    }
}

/// Resolved target of a call instruction.
/// Call arguments in linked code are indices into the class' links.
#[derive(Clone)]
pub enum Link {
    Method { class: Rc<LoadedType>, index: usize },
    /// Call into a class that was still being linked, which closes a
    /// cycle of references. The target is kept alive by its registry
    /// or by the frames executing it.
    BackEdge {
        name: String,
        class: Weak<LoadedType>,
        index: usize,
    },
    Native(&'static NativeMethod),
}

/// Code of every method with call instructions pointing at `links`.
pub struct LinkedCode {
    pub code: Vec<Vec<u8>>,
    pub links: Vec<Link>,
}

pub struct CompiledClass {
    pub version: u16,
    pub source_file: Option<String>,
    pub interfaces: Vec<String>,
    pub constant_pool: ConstantPool,
    /// Methods as decoded, their call instructions still refer to the
    /// constant pool.
    pub methods: Vec<MethodInfo>,
    linked: OnceCell<LinkedCode>,
}

impl CompiledClass {
    pub fn new(
        version: u16,
        source_file: Option<String>,
        interfaces: Vec<String>,
        constant_pool: ConstantPool,
        methods: Vec<MethodInfo>,
    ) -> Self {
        Self {
            version,
            source_file,
            interfaces,
            constant_pool,
            methods,
            linked: OnceCell::new(),
        }
    }

    pub fn is_linked(&self) -> bool {
        self.linked.get().is_some()
    }

    /// Linking happens once, later attempts are ignored.
    pub(crate) fn set_linked(&self, linked: LinkedCode) {
        if self.linked.set(linked).is_err() {
            tracing::warn!("class linked twice, keeping the first result");
        }
    }

    pub fn links(&self) -> &[Link] {
        match self.linked.get() {
            Some(linked) => &linked.links,
            None => &[],
        }
    }

    /// Linked code of the method, `None` before the class is linked.
    pub fn code(&self, method: usize) -> Option<&[u8]> {
        self.linked.get()?.code.get(method).map(Vec::as_slice)
    }
}

pub enum TypeKind {
    Compiled(CompiledClass),
    Platform(&'static PlatformClass),
}

/// A class materialized by a loader.
///
/// Types are compared by identity. The same bytes defined by two
/// loaders result in two distinct types.
pub struct LoadedType {
    name: String,
    loader: LoaderId,
    kind: TypeKind,
}

impl LoadedType {
    pub fn compiled(name: impl Into<String>, loader: LoaderId, class: CompiledClass) -> Self {
        Self {
            name: name.into(),
            loader,
            kind: TypeKind::Compiled(class),
        }
    }

    pub fn platform(class: &'static PlatformClass) -> Self {
        Self {
            name: class.name.to_owned(),
            loader: LoaderId::PLATFORM,
            kind: TypeKind::Platform(class),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn loader(&self) -> LoaderId {
        self.loader
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn as_compiled(&self) -> Option<&CompiledClass> {
        match &self.kind {
            TypeKind::Compiled(class) => Some(class),
            TypeKind::Platform(_) => None,
        }
    }

    pub fn is_instantiable(&self) -> bool {
        matches!(self.kind, TypeKind::Compiled(_))
    }

    pub fn interfaces(&self) -> &[String] {
        match &self.kind {
            TypeKind::Compiled(class) => &class.interfaces,
            TypeKind::Platform(_) => &[],
        }
    }

    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces().iter().any(|i| i == interface)
    }

    /// Index of the method with the given name and descriptor.
    pub fn method_index(&self, name: &str, descriptor: &MethodDescriptor) -> Option<usize> {
        match &self.kind {
            TypeKind::Compiled(class) => class
                .methods
                .iter()
                .position(|m| m.name == name && &m.descriptor == descriptor),
            TypeKind::Platform(class) => class
                .methods
                .iter()
                .position(|m| m.signature.name == name && &m.signature.descriptor == descriptor),
        }
    }

    pub fn signature(&self) -> ClassSignature {
        match &self.kind {
            TypeKind::Compiled(class) => ClassSignature {
                name: self.name.clone(),
                kind: ClassKind::Class,
                interfaces: class.interfaces.clone(),
                methods: class
                    .methods
                    .iter()
                    .map(|m| MethodSignature::new(&m.name, m.descriptor.params.clone(), m.descriptor.ret))
                    .collect(),
            },
            TypeKind::Platform(class) => class.signature(),
        }
    }

    /// Same type, not merely the same name.
    pub fn same(a: &Rc<LoadedType>, b: &Rc<LoadedType>) -> bool {
        Rc::ptr_eq(a, b)
    }
}

impl Debug for LoadedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedType")
            .field("name", &self.name)
            .field("loader", &self.loader)
            .finish_non_exhaustive()
    }
}

impl Display for LoadedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.loader)
    }
}
