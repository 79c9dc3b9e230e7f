use super::{Context, InterfaceTransformer, Transformer};
use crate::jvm::class_file::encode_modified_utf8;
use crate::jvm::model::{BinaryClass, FieldSpec};
use crate::jvm::{
    BinaryName, ClassAccessFlags, FieldAccessFlags, MethodAccessFlags, UnqualifiedName,
};
use crate::Error;
use byteorder::{BigEndian, WriteBytesExt};
use log::debug;
use sha1::{Digest, Sha1};

/// Pins the default `serialVersionUID` of serializable classes
///
/// Later passes add members, which would change the identifier the JVM computes. Adding the
/// field, with the value computed from the class as it was compiled, keeps woven and unwoven
/// instances serialization compatible.
pub struct SerialVersionUid;

impl Transformer for SerialVersionUid {
    fn name(&self) -> &'static str {
        "serial-version-uid"
    }

    fn interface_stage(&self) -> Option<&dyn InterfaceTransformer> {
        Some(self)
    }
}

impl InterfaceTransformer for SerialVersionUid {
    fn transform_interface(
        &self,
        context: &mut Context<'_>,
        class: &mut BinaryClass,
    ) -> Result<(), Error> {
        if class.is_interface() || !context.has_advice() {
            return Ok(());
        }
        let serializable = BinaryName::SERIALIZABLE.to_dotted();
        if !context
            .class_metadata()
            .any_in_hierarchy(&mut |name| name == serializable)
        {
            return Ok(());
        }
        let field_name = UnqualifiedName::SERIALVERSIONUID;
        if class.find_field_named(field_name.as_str()).is_some() {
            return Ok(());
        }

        let uid = default_serial_version_uid(class)?;
        debug!("{}: serialVersionUID of '{}' is {}", self.name(), class.name(), uid);
        let value = class.constants.get_long(uid)?;
        class.add_field(FieldSpec {
            access_flags: FieldAccessFlags::PRIVATE
                | FieldAccessFlags::STATIC
                | FieldAccessFlags::FINAL,
            name: field_name.as_str().to_owned(),
            descriptor: String::from("J"),
            constant_value: Some(value),
        })?;
        context.mark_advised();
        Ok(())
    }
}

/// `serialVersionUID` the JVM would compute for a class that doesn't declare one
///
/// SHA-1 over the class name, modifiers, sorted interfaces, and the sorted non-private members,
/// the first eight bytes of which are read as a little endian `long`.
pub fn default_serial_version_uid(class: &BinaryClass) -> Result<i64, Error> {
    let mut stream: Vec<u8> = vec![];
    write_utf(&mut stream, &class.name().replace('/', "."))?;

    let class_mask = ClassAccessFlags::PUBLIC
        | ClassAccessFlags::FINAL
        | ClassAccessFlags::INTERFACE
        | ClassAccessFlags::ABSTRACT;
    let mut class_modifiers = class.access_flags & class_mask;
    if class.is_interface() {
        class_modifiers.set(ClassAccessFlags::ABSTRACT, !class.methods().is_empty());
    }
    stream.write_u32::<BigEndian>(u32::from(class_modifiers.bits()))?;

    let mut interfaces: Vec<String> = class
        .interfaces()
        .iter()
        .map(|interface| interface.replace('/', "."))
        .collect();
    interfaces.sort();
    for interface in &interfaces {
        write_utf(&mut stream, interface)?;
    }

    let field_mask = FieldAccessFlags::PUBLIC
        | FieldAccessFlags::PRIVATE
        | FieldAccessFlags::PROTECTED
        | FieldAccessFlags::STATIC
        | FieldAccessFlags::FINAL
        | FieldAccessFlags::VOLATILE
        | FieldAccessFlags::TRANSIENT;
    let mut fields: Vec<_> = class
        .fields()
        .iter()
        .filter(|field| {
            let flags = field.access_flags;
            !(flags.contains(FieldAccessFlags::PRIVATE)
                && flags.intersects(FieldAccessFlags::STATIC | FieldAccessFlags::TRANSIENT))
        })
        .collect();
    fields.sort_by(|a, b| a.name().cmp(b.name()));
    for field in fields {
        write_utf(&mut stream, field.name())?;
        stream.write_u32::<BigEndian>(u32::from((field.access_flags & field_mask).bits()))?;
        write_utf(&mut stream, field.descriptor())?;
    }

    let method_mask = MethodAccessFlags::PUBLIC
        | MethodAccessFlags::PRIVATE
        | MethodAccessFlags::PROTECTED
        | MethodAccessFlags::STATIC
        | MethodAccessFlags::FINAL
        | MethodAccessFlags::SYNCHRONIZED
        | MethodAccessFlags::NATIVE
        | MethodAccessFlags::ABSTRACT
        | MethodAccessFlags::STRICT;
    if class.methods().iter().any(|method| method.is_static_initializer()) {
        write_utf(&mut stream, UnqualifiedName::CLINIT.as_str())?;
        stream.write_u32::<BigEndian>(u32::from(MethodAccessFlags::STATIC.bits()))?;
        write_utf(&mut stream, "()V")?;
    }

    let visible: Vec<_> = class
        .methods()
        .iter()
        .filter(|method| {
            !method.access_flags.contains(MethodAccessFlags::PRIVATE)
                && !method.is_static_initializer()
        })
        .collect();
    let mut constructors: Vec<_> = visible.iter().filter(|m| m.is_constructor()).collect();
    constructors.sort_by(|a, b| a.descriptor().cmp(b.descriptor()));
    let mut methods: Vec<_> = visible.iter().filter(|m| !m.is_constructor()).collect();
    methods.sort_by(|a, b| {
        a.name()
            .cmp(b.name())
            .then_with(|| a.descriptor().cmp(b.descriptor()))
    });
    for method in constructors.into_iter().chain(methods) {
        write_utf(&mut stream, method.name())?;
        stream.write_u32::<BigEndian>(u32::from((method.access_flags & method_mask).bits()))?;
        write_utf(&mut stream, &method.descriptor().replace('/', "."))?;
    }

    let hash = Sha1::digest(&stream);
    Ok(hash[..8]
        .iter()
        .rev()
        .fold(0i64, |uid, byte| (uid << 8) | i64::from(*byte)))
}

/// `DataOutputStream.writeUTF`
fn write_utf(stream: &mut Vec<u8>, string: &str) -> std::io::Result<()> {
    let bytes = encode_modified_utf8(string);
    stream.write_u16::<BigEndian>(bytes.len() as u16)?;
    stream.extend_from_slice(&bytes);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::Version;
    use crate::jvm::model::MethodSpec;

    fn serializable(extra_field: bool) -> BinaryClass {
        let mut class = BinaryClass::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            "com/acme/Order",
            Some("java/lang/Object"),
        )
        .unwrap();
        class.add_interface("java/io/Serializable").unwrap();
        class
            .add_method(MethodSpec {
                access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
                name: String::from("total"),
                descriptor: String::from("()J"),
                body: None,
                exceptions: vec![],
            })
            .unwrap();
        if extra_field {
            class
                .add_field(FieldSpec {
                    access_flags: FieldAccessFlags::PRIVATE | FieldAccessFlags::TRANSIENT,
                    name: String::from("cache"),
                    descriptor: String::from("Ljava/lang/Object;"),
                    constant_value: None,
                })
                .unwrap();
        }
        class
    }

    #[test]
    fn private_transient_fields_are_ignored() {
        let plain = default_serial_version_uid(&serializable(false)).unwrap();
        let with_cache = default_serial_version_uid(&serializable(true)).unwrap();
        assert_eq!(plain, with_cache);
    }

    #[test]
    fn members_change_the_uid() {
        let before = default_serial_version_uid(&serializable(false)).unwrap();
        let mut class = serializable(false);
        class
            .add_field(FieldSpec {
                access_flags: FieldAccessFlags::PUBLIC,
                name: String::from("count"),
                descriptor: String::from("I"),
                constant_value: None,
            })
            .unwrap();
        assert_ne!(before, default_serial_version_uid(&class).unwrap());
    }
}
