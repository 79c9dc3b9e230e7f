use crate::jvm::class_file::{Attribute, ClassFile, Code, Exceptions, Serialize, Version};
use crate::jvm::code::{Frame, MethodBody};
use crate::jvm::model::{FieldInfo, FieldSpec, MethodInfo, MethodSpec};
use crate::jvm::{ClassAccessFlags, ClassConstantIndex, ConstantsPool, Error, MethodAccessFlags};
use log::debug;
use std::fs;
use std::path::Path;

/// Editable class
///
/// Wraps a parsed class file and keeps the names of the class, its superclass, interfaces, and
/// members decoded so they can be queried without going back to the constant pool. Additions
/// are no-ops when an identical member already exists, so applying them twice leaves the class
/// as applying them once.
#[derive(Debug)]
pub struct BinaryClass {
    pub version: Version,
    pub constants: ConstantsPool,
    pub access_flags: ClassAccessFlags,
    this_class: ClassConstantIndex,
    super_class: Option<ClassConstantIndex>,
    interfaces: Vec<ClassConstantIndex>,
    fields: Vec<FieldInfo>,
    methods: Vec<MethodInfo>,
    pub attributes: Vec<Attribute>,

    name: String,
    super_name: Option<String>,
    interface_names: Vec<String>,

    modified: bool,
}

impl BinaryClass {
    /// Parse a class from its bytes
    pub fn parse(bytes: &[u8]) -> Result<BinaryClass, Error> {
        let file = ClassFile::parse(bytes)?;
        let constants = file.constants;
        let name = constants.class_name(file.this_class)?.to_owned();
        let super_name = file
            .super_class
            .map(|class| constants.class_name(class).map(str::to_owned))
            .transpose()?;
        let interface_names = file
            .interfaces
            .iter()
            .map(|class| constants.class_name(*class).map(str::to_owned))
            .collect::<Result<_, _>>()?;
        let fields = file
            .fields
            .into_iter()
            .map(|field| FieldInfo::from_raw(field, &constants))
            .collect::<Result<_, _>>()?;
        let methods = file
            .methods
            .into_iter()
            .map(|method| MethodInfo::from_raw(method, &constants))
            .collect::<Result<_, _>>()?;

        Ok(BinaryClass {
            version: file.version,
            constants,
            access_flags: file.access_flags,
            this_class: file.this_class,
            super_class: file.super_class,
            interfaces: file.interfaces,
            fields,
            methods,
            attributes: file.attributes,
            name,
            super_name,
            interface_names,
            modified: false,
        })
    }

    /// Make a fresh empty class
    pub fn new(
        version: Version,
        access_flags: ClassAccessFlags,
        name: &str,
        super_name: Option<&str>,
    ) -> Result<BinaryClass, Error> {
        let mut constants = ConstantsPool::new();
        let this_class = constants.get_class(name)?;
        let super_class = super_name
            .map(|super_name| constants.get_class(super_name))
            .transpose()?;
        Ok(BinaryClass {
            version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
            name: name.to_owned(),
            super_name: super_name.map(str::to_owned),
            interface_names: vec![],
            modified: true,
        })
    }

    /// Binary name of the class (`com/acme/Widget`)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn super_name(&self) -> Option<&str> {
        self.super_name.as_deref()
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interface_names
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn methods(&self) -> &[MethodInfo] {
        &self.methods
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    /// Has anything been changed since the class was parsed?
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Is the interface in the class's interface table?
    pub fn has_interface(&self, name: &str) -> bool {
        self.interfaces
            .iter()
            .any(|class| {
                matches!(self.constants.class_name(*class), Ok(existing) if existing == name)
            })
    }

    /// Add an interface, returning `false` if it was already there
    pub fn add_interface(&mut self, name: &str) -> Result<bool, Error> {
        if self.has_interface(name) {
            return Ok(false);
        }
        let class = self.constants.get_class(name)?;
        self.interfaces.push(class);
        self.interface_names.push(name.to_owned());
        self.modified = true;
        Ok(true)
    }

    pub fn find_field(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|field| field.name() == name && field.descriptor() == descriptor)
    }

    pub fn find_field_named(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|field| field.name() == name)
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.methods
            .iter()
            .position(|method| method.name() == name && method.descriptor() == descriptor)
    }

    /// Add a field, returning `false` if one with the same name and descriptor exists
    pub fn add_field(&mut self, spec: FieldSpec) -> Result<bool, Error> {
        if self.find_field(&spec.name, &spec.descriptor).is_some() {
            return Ok(false);
        }
        debug!("Adding field {}.{}:{}", self.name, spec.name, spec.descriptor);
        let field = FieldInfo::from_spec(spec, &mut self.constants)?;
        self.fields.push(field);
        self.modified = true;
        Ok(true)
    }

    /// Add a method, returning `false` if one with the same name and descriptor exists
    pub fn add_method(&mut self, spec: MethodSpec) -> Result<bool, Error> {
        if self.find_method(&spec.name, &spec.descriptor).is_some() {
            return Ok(false);
        }
        debug!("Adding method {}.{}{}", self.name, spec.name, spec.descriptor);
        let method = MethodInfo::from_spec(spec, &mut self.constants)?;
        self.methods.push(method);
        self.modified = true;
        Ok(true)
    }

    /// Move a method to the end of the table under a new name and access flags, putting a new
    /// method in its place
    ///
    /// The new method keeps the attributes of the moved one that don't describe its body or its
    /// `throws` clause (annotations, generic signature, deprecation). Returns the new index of
    /// the moved method.
    pub fn displace_method(
        &mut self,
        index: usize,
        name: String,
        access_flags: MethodAccessFlags,
        replacement: MethodSpec,
    ) -> Result<usize, Error> {
        let mut moved = self.methods.get(index).ok_or(Error::NoSuchMethod(index))?.clone();
        debug!("Moving method {}.{} to {}", self.name, moved.name(), name);
        let carried: Vec<Attribute> = moved
            .attributes
            .iter()
            .filter(|attr| {
                !attr.is::<Code>(&self.constants) && !attr.is::<Exceptions>(&self.constants)
            })
            .cloned()
            .collect();
        moved.set_name(name, &mut self.constants)?;
        moved.access_flags = access_flags;
        let mut replacement = MethodInfo::from_spec(replacement, &mut self.constants)?;
        replacement.attributes.extend(carried);
        self.methods[index] = replacement;
        self.methods.push(moved);
        self.modified = true;
        Ok(self.methods.len() - 1)
    }

    /// Decode the body of a method (`None` for abstract and native methods)
    pub fn instructions_of(&self, index: usize) -> Result<Option<MethodBody>, Error> {
        let method = self.methods.get(index).ok_or(Error::NoSuchMethod(index))?;
        let code = match method.code(&self.constants)? {
            None => return Ok(None),
            Some(code) => code,
        };
        let entry = Frame::entry(
            &self.name,
            method.is_static(),
            method.is_constructor(),
            &method.parsed_descriptor()?,
        );
        MethodBody::decode(&code, &self.constants, &entry).map(Some)
    }

    /// Replace the body of a method
    ///
    /// The maximum stack depth and number of locals are recomputed from the new body.
    pub fn set_instructions(&mut self, index: usize, mut body: MethodBody) -> Result<(), Error> {
        let method = self.methods.get(index).ok_or(Error::NoSuchMethod(index))?;
        let parameter_slots = method.parsed_descriptor()?.parameter_length(!method.is_static());
        body.compute_maxs(&self.constants, parameter_slots)?;
        let code = body.encode(&mut self.constants)?;
        let code = self.constants.get_attribute(code)?;
        self.methods[index].set_code(code, &self.constants);
        self.modified = true;
        Ok(())
    }

    /// Attach an attribute this crate doesn't interpret (annotations, signatures) to a method
    pub fn add_method_attribute(
        &mut self,
        index: usize,
        name: &str,
        info: Vec<u8>,
    ) -> Result<(), Error> {
        if index >= self.methods.len() {
            return Err(Error::NoSuchMethod(index));
        }
        let name_index = self.constants.get_utf8(name)?;
        self.methods[index]
            .attributes
            .push(Attribute { name_index, info });
        self.modified = true;
        Ok(())
    }

    /// Serialize the class
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![];
        self.write(&mut bytes)?;
        Ok(bytes)
    }

    fn write(&self, writer: &mut Vec<u8>) -> std::io::Result<()> {
        writer.extend_from_slice(&ClassFile::MAGIC);
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        match self.super_class {
            None => 0u16.serialize(writer)?,
            Some(super_class) => super_class.serialize(writer)?,
        }
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }

    /// Save the serialized class to disk
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.serialize()?)?;
        Ok(())
    }
}
