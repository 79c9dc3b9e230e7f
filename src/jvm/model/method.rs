use crate::jvm::class_file::{Attribute, Code, Exceptions, Serialize};
use crate::jvm::code::MethodBody;
use crate::jvm::{
    parse_method_descriptor, BinaryName, ConstantsPool, Error, MethodAccessFlags,
    MethodDescriptor, Utf8ConstantIndex,
};
use byteorder::WriteBytesExt;

/// Method of a [`BinaryClass`](super::BinaryClass)
///
/// Attributes are kept raw. A method whose body is never replaced is written back with exactly
/// the `Code` attribute it was read with.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub access_flags: MethodAccessFlags,
    name: String,
    descriptor: String,
    name_index: Utf8ConstantIndex,
    descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl MethodInfo {
    pub(crate) fn from_raw(
        method: crate::jvm::class_file::Method,
        constants: &ConstantsPool,
    ) -> Result<MethodInfo, Error> {
        Ok(MethodInfo {
            access_flags: method.access_flags,
            name: constants.utf8(method.name_index)?.to_owned(),
            descriptor: constants.utf8(method.descriptor_index)?.to_owned(),
            name_index: method.name_index,
            descriptor_index: method.descriptor_index,
            attributes: method.attributes,
        })
    }

    /// Build a method record, encoding the body (if any) after sizing its stack and locals
    pub(crate) fn from_spec(
        spec: MethodSpec,
        constants: &mut ConstantsPool,
    ) -> Result<MethodInfo, Error> {
        let mut attributes = vec![];
        if let Some(mut body) = spec.body {
            let descriptor = parse_method_descriptor(&spec.descriptor)?;
            let is_static = spec.access_flags.contains(MethodAccessFlags::STATIC);
            body.compute_maxs(constants, descriptor.parameter_length(!is_static))?;
            let code = body.encode(constants)?;
            attributes.push(constants.get_attribute(code)?);
        }
        if !spec.exceptions.is_empty() {
            let exceptions = spec
                .exceptions
                .iter()
                .map(|exception| constants.get_class(exception))
                .collect::<Result<_, _>>()?;
            attributes.push(constants.get_attribute(Exceptions(exceptions))?);
        }
        Ok(MethodInfo {
            access_flags: spec.access_flags,
            name_index: constants.get_utf8(spec.name.as_str())?,
            descriptor_index: constants.get_utf8(spec.descriptor.as_str())?,
            name: spec.name,
            descriptor: spec.descriptor,
            attributes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn parsed_descriptor(&self) -> Result<MethodDescriptor, Error> {
        parse_method_descriptor(&self.descriptor)
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn is_static_initializer(&self) -> bool {
        self.name == "<clinit>"
    }

    /// Methods with no body to rewrite
    pub fn is_abstract_or_native(&self) -> bool {
        self.access_flags
            .intersects(MethodAccessFlags::ABSTRACT | MethodAccessFlags::NATIVE)
    }

    /// Binary names of the checked exceptions the method declares
    pub fn exceptions(&self, constants: &ConstantsPool) -> Result<Vec<String>, Error> {
        match Attribute::find::<Exceptions>(&self.attributes, constants)? {
            None => Ok(vec![]),
            Some(Exceptions(classes)) => classes
                .into_iter()
                .map(|class| constants.class_name(class).map(str::to_owned))
                .collect(),
        }
    }

    pub(crate) fn code(&self, constants: &ConstantsPool) -> Result<Option<Code>, Error> {
        Attribute::find::<Code>(&self.attributes, constants)
    }

    /// Replace the `Code` attribute, keeping its position among the other attributes
    pub(crate) fn set_code(&mut self, code: Attribute, constants: &ConstantsPool) {
        match self.attributes.iter_mut().find(|attr| attr.is::<Code>(constants)) {
            Some(existing) => *existing = code,
            None => self.attributes.push(code),
        }
    }

    pub(crate) fn set_name(
        &mut self,
        name: String,
        constants: &mut ConstantsPool,
    ) -> Result<(), Error> {
        self.name_index = constants.get_utf8(name.as_str())?;
        self.name = name;
        Ok(())
    }
}

impl Serialize for MethodInfo {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

/// Method to add to a class
#[derive(Debug, Clone)]
pub struct MethodSpec {
    pub access_flags: MethodAccessFlags,
    pub name: String,
    pub descriptor: String,

    /// `None` for abstract and native methods
    pub body: Option<MethodBody>,

    /// Binary names of declared checked exceptions
    pub exceptions: Vec<String>,
}
