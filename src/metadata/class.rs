use super::{FieldMetaData, MethodMetaData, RESERVED_PREFIX};
use crate::jvm::model::BinaryClass;
use crate::jvm::{ClassAccessFlags, Error};
use std::sync::Arc;

/// Structural snapshot of a class and, through `superclass`, of its ancestors
///
/// Members added by earlier weaving (reserved names) and the static initializer are left out, so
/// the snapshot of a woven class matches the snapshot of the class before weaving.
#[derive(Debug)]
pub struct ClassMetaData {
    name: String,
    modifiers: ClassAccessFlags,
    methods: Vec<MethodMetaData>,
    fields: Vec<FieldMetaData>,
    interfaces: Vec<Arc<InterfaceMetaData>>,
    superclass: Option<Arc<ClassMetaData>>,
}

impl ClassMetaData {
    /// Build from a parsed class and its already resolved supertypes
    pub fn from_class(
        class: &BinaryClass,
        superclass: Option<Arc<ClassMetaData>>,
        interfaces: Vec<Arc<InterfaceMetaData>>,
    ) -> Result<ClassMetaData, Error> {
        let methods = class
            .methods()
            .iter()
            .filter(|method| {
                !method.is_static_initializer() && !method.name().starts_with(RESERVED_PREFIX)
            })
            .map(|method| MethodMetaData::from_method(method, &class.constants))
            .collect::<Result<_, _>>()?;
        let fields = class
            .fields()
            .iter()
            .filter(|field| !field.name().starts_with(RESERVED_PREFIX))
            .map(FieldMetaData::from_field)
            .collect::<Result<_, _>>()?;
        Ok(ClassMetaData {
            name: class.name().replace('/', "."),
            modifiers: class.access_flags,
            methods,
            fields,
            interfaces,
            superclass,
        })
    }

    /// Metadata for a class that could not be resolved: no members and no supertypes
    pub fn leaf(name: impl Into<String>) -> ClassMetaData {
        ClassMetaData {
            name: name.into(),
            modifiers: ClassAccessFlags::PUBLIC,
            methods: vec![],
            fields: vec![],
            interfaces: vec![],
            superclass: None,
        }
    }

    /// Dotted name (`com.acme.Widget`)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn modifiers(&self) -> ClassAccessFlags {
        self.modifiers
    }

    pub fn methods(&self) -> &[MethodMetaData] {
        &self.methods
    }

    pub fn fields(&self) -> &[FieldMetaData] {
        &self.fields
    }

    pub fn interfaces(&self) -> &[Arc<InterfaceMetaData>] {
        &self.interfaces
    }

    pub fn superclass(&self) -> Option<&Arc<ClassMetaData>> {
        self.superclass.as_ref()
    }

    /// Does the class, one of its superclasses, or one of their interfaces satisfy `matches`?
    pub fn any_in_hierarchy(&self, matches: &mut impl FnMut(&str) -> bool) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if matches(&class.name)
                || class
                    .interfaces
                    .iter()
                    .any(|interface| interface.any_in_hierarchy(matches))
            {
                return true;
            }
            current = class.superclass.as_deref();
        }
        false
    }
}

/// Structural snapshot of an interface and its super-interfaces
#[derive(Debug)]
pub struct InterfaceMetaData {
    name: String,
    interfaces: Vec<Arc<InterfaceMetaData>>,
    methods: Vec<MethodMetaData>,
}

impl InterfaceMetaData {
    pub fn from_class(
        class: &BinaryClass,
        interfaces: Vec<Arc<InterfaceMetaData>>,
    ) -> Result<InterfaceMetaData, Error> {
        let methods = class
            .methods()
            .iter()
            .filter(|method| !method.is_static_initializer())
            .map(|method| MethodMetaData::from_method(method, &class.constants))
            .collect::<Result<_, _>>()?;
        Ok(InterfaceMetaData {
            name: class.name().replace('/', "."),
            interfaces,
            methods,
        })
    }

    pub fn leaf(name: impl Into<String>) -> InterfaceMetaData {
        InterfaceMetaData {
            name: name.into(),
            interfaces: vec![],
            methods: vec![],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interfaces(&self) -> &[Arc<InterfaceMetaData>] {
        &self.interfaces
    }

    pub fn methods(&self) -> &[MethodMetaData] {
        &self.methods
    }

    pub fn any_in_hierarchy(&self, matches: &mut impl FnMut(&str) -> bool) -> bool {
        matches(&self.name)
            || self
                .interfaces
                .iter()
                .any(|interface| interface.any_in_hierarchy(matches))
    }
}
