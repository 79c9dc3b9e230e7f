use crate::jvm::class_file::Version;
use crate::jvm::code::{BranchInstruction, CodeElement, Instruction, InvokeType, Label, MethodBody};
use crate::jvm::model::{BinaryClass, MethodSpec};
use crate::jvm::{
    parse_method_descriptor, BaseType, BinaryName, ConstantsPool, Error, FieldType,
    MethodAccessFlags, RefType, UnqualifiedName,
};
use crate::util::Width;

/// Field reference, by names
#[derive(Clone, Copy, Debug)]
pub struct FieldRef<'b> {
    pub class: &'b str,
    pub name: &'b str,
    pub descriptor: &'b str,
    pub is_static: bool,
}

/// Appends instructions to a method body, interning constants as it goes
///
/// Used both for whole generated methods and for snippets spliced into existing bodies.
pub struct CodeBuilder<'a> {
    pub constants: &'a mut ConstantsPool,
    pub body: MethodBody,
}

impl<'a> CodeBuilder<'a> {
    pub fn new(constants: &'a mut ConstantsPool) -> CodeBuilder<'a> {
        CodeBuilder {
            constants,
            body: MethodBody::new(),
        }
    }

    pub fn into_body(self) -> MethodBody {
        self.body
    }

    /// Elements for splicing (snippets must not contain labels)
    pub fn into_elements(self) -> Vec<CodeElement> {
        self.body.elements
    }

    pub fn push(&mut self, insn: Instruction) {
        self.body.push_instruction(insn);
    }

    pub fn branch(&mut self, branch: BranchInstruction<Label>) {
        self.body.push_branch(branch);
    }

    pub fn fresh_label(&mut self) -> Label {
        self.body.fresh_label()
    }

    pub fn place_label(&mut self, label: Label) {
        self.body.place_label(label);
    }

    /// Push an integer constant, using the shortest encoding
    pub fn const_int(&mut self, integer: i32) -> Result<(), Error> {
        let insn = match integer {
            -1 => Instruction::IConstM1,
            0 => Instruction::IConst0,
            1 => Instruction::IConst1,
            2 => Instruction::IConst2,
            3 => Instruction::IConst3,
            4 => Instruction::IConst4,
            5 => Instruction::IConst5,
            -128..=127 => Instruction::BiPush(integer as i8),
            -32768..=32767 => Instruction::SiPush(integer as i16),
            _ => Instruction::Ldc(self.constants.get_integer(integer)?),
        };
        self.push(insn);
        Ok(())
    }

    pub fn const_string(&mut self, string: &str) -> Result<(), Error> {
        let string = self.constants.get_string(string)?;
        self.push(Instruction::Ldc(string.into()));
        Ok(())
    }

    pub fn const_string_or_null(&mut self, string: Option<&str>) -> Result<(), Error> {
        match string {
            Some(string) => self.const_string(string),
            None => {
                self.push(Instruction::AConstNull);
                Ok(())
            }
        }
    }

    /// Push the `java/lang/Class` of a class
    ///
    /// Class files older than 49 can't `ldc` a class, so those go through `Class.forName`.
    pub fn const_class(&mut self, class: &str, version: Version) -> Result<(), Error> {
        if version.supports_class_literals() {
            let class = self.constants.get_class(class)?;
            self.push(Instruction::Ldc(class.into()));
        } else {
            self.const_string(&class.replace('/', "."))?;
            self.invoke(
                InvokeType::Static,
                BinaryName::CLASS.as_str(),
                UnqualifiedName::FORNAME.as_str(),
                "(Ljava/lang/String;)Ljava/lang/Class;",
            )?;
        }
        Ok(())
    }

    /// Invoke a method (the argument count of interface calls is filled in)
    pub fn invoke(
        &mut self,
        typ: InvokeType,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<(), Error> {
        let (typ, is_interface) = match typ {
            InvokeType::Interface(_) => {
                let count = parse_method_descriptor(descriptor)?.parameter_length(true);
                (InvokeType::Interface(count as u8), true)
            }
            other => (other, false),
        };
        let method = self
            .constants
            .get_method_ref(class, name, descriptor, is_interface)?;
        self.push(Instruction::Invoke(typ, method));
        Ok(())
    }

    pub fn get_field(&mut self, field: FieldRef<'_>) -> Result<(), Error> {
        let index = self
            .constants
            .get_field_ref(field.class, field.name, field.descriptor)?;
        self.push(if field.is_static {
            Instruction::GetStatic(index)
        } else {
            Instruction::GetField(index)
        });
        Ok(())
    }

    pub fn put_field(&mut self, field: FieldRef<'_>) -> Result<(), Error> {
        let index = self
            .constants
            .get_field_ref(field.class, field.name, field.descriptor)?;
        self.push(if field.is_static {
            Instruction::PutStatic(index)
        } else {
            Instruction::PutField(index)
        });
        Ok(())
    }

    /// `new class; dup; <arguments>; invokespecial class.<init>`
    pub fn new_object(
        &mut self,
        class: &str,
        init_descriptor: &str,
        arguments: impl FnOnce(&mut Self) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let class_index = self.constants.get_class(class)?;
        self.push(Instruction::New(class_index));
        self.push(Instruction::Dup);
        arguments(self)?;
        self.invoke(
            InvokeType::Special,
            class,
            UnqualifiedName::INIT.as_str(),
            init_descriptor,
        )
    }

    pub fn check_cast(&mut self, class: &str) -> Result<(), Error> {
        let class = self.constants.get_class(class)?;
        self.push(Instruction::CheckCast(class));
        Ok(())
    }

    pub fn load(&mut self, field_type: &FieldType, slot: u16) {
        self.push(match field_type {
            FieldType::Base(BaseType::Long) => Instruction::LLoad(slot),
            FieldType::Base(BaseType::Float) => Instruction::FLoad(slot),
            FieldType::Base(BaseType::Double) => Instruction::DLoad(slot),
            FieldType::Base(_) => Instruction::ILoad(slot),
            FieldType::Ref(_) => Instruction::ALoad(slot),
        });
    }

    /// Load a local as an object, boxing primitives through their wrapper constructor
    pub fn load_boxed(
        &mut self,
        field_type: &FieldType,
        slot: u16,
    ) -> Result<(), Error> {
        match field_type {
            FieldType::Base(base_type) => {
                let wrapper = Wrapper::of(*base_type);
                let descriptor = format!("({})V", wrapper.primitive);
                self.new_object(wrapper.class.as_str(), &descriptor, |code| {
                    code.load(field_type, slot);
                    Ok(())
                })
            }
            FieldType::Ref(_) => {
                self.load(field_type, slot);
                Ok(())
            }
        }
    }

    /// Turn the object on top of the stack into a value of the return type (popping it for
    /// `void`)
    pub fn unbox_or_cast(
        &mut self,
        return_type: Option<&FieldType>,
    ) -> Result<(), Error> {
        match return_type {
            None => self.push(Instruction::Pop),
            Some(FieldType::Base(base_type)) => {
                let wrapper = Wrapper::of(*base_type);
                self.check_cast(wrapper.class.as_str())?;
                let descriptor = format!("(){}", wrapper.primitive);
                self.invoke(
                    InvokeType::Virtual,
                    wrapper.class.as_str(),
                    wrapper.unbox.as_str(),
                    &descriptor,
                )?;
            }
            Some(FieldType::Ref(RefType::Object(class))) if *class == BinaryName::OBJECT => (),
            Some(field_type) => {
                if let Some(class) = field_type.class_constant_name() {
                    self.check_cast(&class)?;
                }
            }
        }
        Ok(())
    }

    pub fn return_value(&mut self, return_type: Option<&FieldType>) {
        self.branch(match return_type {
            None => BranchInstruction::Return,
            Some(FieldType::Base(BaseType::Long)) => BranchInstruction::LReturn,
            Some(FieldType::Base(BaseType::Float)) => BranchInstruction::FReturn,
            Some(FieldType::Base(BaseType::Double)) => BranchInstruction::DReturn,
            Some(FieldType::Base(_)) => BranchInstruction::IReturn,
            Some(FieldType::Ref(_)) => BranchInstruction::AReturn,
        });
    }

    /// Push an `Object[]` holding the (boxed) parameters, the first of which is in `first_slot`
    pub fn parameter_array(
        &mut self,
        parameters: &[FieldType],
        first_slot: u16,
    ) -> Result<(), Error> {
        self.const_int(parameters.len() as i32)?;
        let object = self.constants.get_class(BinaryName::OBJECT.as_str())?;
        self.push(Instruction::ANewArray(object));
        let mut slot = first_slot;
        for (idx, parameter) in parameters.iter().enumerate() {
            self.push(Instruction::Dup);
            self.const_int(idx as i32)?;
            self.load_boxed(parameter, slot)?;
            self.push(Instruction::AAStore);
            slot += parameter.width() as u16;
        }
        Ok(())
    }
}

/// Wrapper class of a primitive
struct Wrapper {
    class: BinaryName,
    unbox: UnqualifiedName,
    primitive: char,
}

impl Wrapper {
    fn of(base_type: BaseType) -> Wrapper {
        let (class, unbox) = match base_type {
            BaseType::Boolean => (BinaryName::BOOLEAN, UnqualifiedName::BOOLEANVALUE),
            BaseType::Byte => (BinaryName::BYTE, UnqualifiedName::BYTEVALUE),
            BaseType::Char => (BinaryName::CHARACTER, UnqualifiedName::CHARVALUE),
            BaseType::Short => (BinaryName::SHORT, UnqualifiedName::SHORTVALUE),
            BaseType::Int => (BinaryName::INTEGER, UnqualifiedName::INTVALUE),
            BaseType::Long => (BinaryName::LONG, UnqualifiedName::LONGVALUE),
            BaseType::Float => (BinaryName::FLOAT, UnqualifiedName::FLOATVALUE),
            BaseType::Double => (BinaryName::DOUBLE, UnqualifiedName::DOUBLEVALUE),
        };
        Wrapper {
            class,
            unbox,
            primitive: base_type.descriptor_char(),
        }
    }
}

/// Where a constructor hands `this` over to another constructor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstructorStart {
    /// Calls a superclass constructor; the element index is just after the call
    Super(usize),

    /// Delegates to another constructor of the same class
    Delegating,

    /// No constructor call found
    Missing,
}

/// Find the `super(...)` or `this(...)` call of a constructor body
///
/// Objects created while computing the arguments (`super(new Foo())`) have their own `new`
/// before their `<init>` call, so those calls are matched up and skipped.
pub fn constructor_start(
    body: &MethodBody,
    constants: &ConstantsPool,
    class_name: &str,
) -> Result<ConstructorStart, Error> {
    let mut pending_news = 0usize;
    for (idx, element) in body.elements.iter().enumerate() {
        match element {
            CodeElement::Instruction(Instruction::New(_)) => pending_news += 1,
            CodeElement::Instruction(Instruction::Invoke(InvokeType::Special, method)) => {
                let method = constants.member_ref((*method).into())?;
                if method.name != UnqualifiedName::INIT.as_str() {
                    continue;
                }
                if pending_news > 0 {
                    pending_news -= 1;
                } else if method.class == class_name {
                    return Ok(ConstructorStart::Delegating);
                } else {
                    return Ok(ConstructorStart::Super(idx + 1));
                }
            }
            _ => (),
        }
    }
    Ok(ConstructorStart::Missing)
}

/// Insert the same code into every constructor, just after its superclass constructor call
///
/// Constructors delegating to `this(...)` are skipped since the constructor they call runs the
/// code. Returns the constructors without any constructor call, which are left alone.
pub fn insert_in_constructors(
    class: &mut BinaryClass,
    mut emit: impl FnMut(&mut CodeBuilder<'_>) -> Result<(), Error>,
) -> Result<Vec<String>, Error> {
    let constructors: Vec<usize> = class
        .methods()
        .iter()
        .enumerate()
        .filter(|(_, method)| method.is_constructor())
        .map(|(idx, _)| idx)
        .collect();

    let mut missing = vec![];
    for index in constructors {
        let mut body = match class.instructions_of(index)? {
            Some(body) => body,
            None => continue,
        };
        match constructor_start(&body, &class.constants, class.name())? {
            ConstructorStart::Super(position) => {
                let mut code = CodeBuilder::new(&mut class.constants);
                emit(&mut code)?;
                let elements = code.into_elements();
                body.elements.splice(position..position, elements);
                class.set_instructions(index, body)?;
            }
            ConstructorStart::Delegating => (),
            ConstructorStart::Missing => {
                missing.push(class.methods()[index].descriptor().to_owned());
            }
        }
    }
    Ok(missing)
}

/// Insert code at the start of the static initializer, adding one if there is none
pub fn insert_in_static_initializer(
    class: &mut BinaryClass,
    emit: impl FnOnce(&mut CodeBuilder<'_>) -> Result<(), Error>,
) -> Result<(), Error> {
    let clinit = UnqualifiedName::CLINIT;
    match class.find_method(clinit.as_str(), "()V") {
        Some(index) => {
            let mut body = class.instructions_of(index)?.unwrap_or_default();
            let mut code = CodeBuilder::new(&mut class.constants);
            emit(&mut code)?;
            let elements = code.into_elements();
            body.elements.splice(0..0, elements);
            class.set_instructions(index, body)
        }
        None => {
            let mut code = CodeBuilder::new(&mut class.constants);
            emit(&mut code)?;
            code.return_value(None);
            let body = code.into_body();
            class.add_method(MethodSpec {
                access_flags: MethodAccessFlags::STATIC,
                name: clinit.as_str().to_owned(),
                descriptor: String::from("()V"),
                body: Some(body),
                exceptions: vec![],
            })?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::Version;
    use crate::jvm::ClassAccessFlags;

    fn class() -> BinaryClass {
        BinaryClass::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            "com/acme/Account",
            Some("com/acme/Base"),
        )
        .unwrap()
    }

    fn init_call(code: &mut CodeBuilder<'_>, class: &str, descriptor: &str) {
        code.invoke(InvokeType::Special, class, "<init>", descriptor)
            .unwrap();
    }

    #[test]
    fn integer_constants() {
        let mut class = class();
        let mut code = CodeBuilder::new(&mut class.constants);
        for integer in [-1, 5, 100, -200, 40000] {
            code.const_int(integer).unwrap();
        }
        let elements = code.into_elements();
        assert_eq!(elements[0], CodeElement::Instruction(Instruction::IConstM1));
        assert_eq!(elements[1], CodeElement::Instruction(Instruction::IConst5));
        assert_eq!(elements[2], CodeElement::Instruction(Instruction::BiPush(100)));
        assert_eq!(elements[3], CodeElement::Instruction(Instruction::SiPush(-200)));
        assert!(matches!(elements[4], CodeElement::Instruction(Instruction::Ldc(_))));
    }

    #[test]
    fn boxed_parameters() {
        let mut class = class();
        let descriptor = parse_method_descriptor("(JLjava/lang/String;I)V").unwrap();
        let mut code = CodeBuilder::new(&mut class.constants);
        code.parameter_array(&descriptor.parameters, 1).unwrap();
        let loads: Vec<_> = code
            .into_elements()
            .into_iter()
            .filter_map(|element| match element {
                CodeElement::Instruction(insn) => insn.local_access().map(|(slot, _)| slot),
                _ => None,
            })
            .collect();
        assert_eq!(loads, vec![1, 3, 4]);
    }

    #[test]
    fn constructor_calls() {
        let mut class = class();
        let mut code = CodeBuilder::new(&mut class.constants);
        code.push(Instruction::ALoad(0));
        code.new_object("com/acme/Money", "()V", |_| Ok(())).unwrap();
        init_call(&mut code, "com/acme/Base", "(Lcom/acme/Money;)V");
        code.return_value(None);
        let body = code.into_body();
        assert_eq!(
            constructor_start(&body, &class.constants, "com/acme/Account").unwrap(),
            ConstructorStart::Super(5)
        );

        let mut code = CodeBuilder::new(&mut class.constants);
        code.push(Instruction::ALoad(0));
        init_call(&mut code, "com/acme/Account", "(I)V");
        let body = code.into_body();
        assert_eq!(
            constructor_start(&body, &class.constants, "com/acme/Account").unwrap(),
            ConstructorStart::Delegating
        );
        assert_eq!(
            constructor_start(&MethodBody::new(), &class.constants, "com/acme/Account").unwrap(),
            ConstructorStart::Missing
        );
    }

    #[test]
    fn static_initializer_is_created_then_extended() {
        let mut class = class();
        insert_in_static_initializer(&mut class, |code| {
            code.push(Instruction::Nop);
            Ok(())
        })
        .unwrap();
        insert_in_static_initializer(&mut class, |code| {
            code.push(Instruction::AConstNull);
            code.push(Instruction::Pop);
            Ok(())
        })
        .unwrap();
        let index = class.find_method("<clinit>", "()V").unwrap();
        let body = class.instructions_of(index).unwrap().unwrap();
        assert_eq!(
            body.elements,
            vec![
                CodeElement::Instruction(Instruction::AConstNull),
                CodeElement::Instruction(Instruction::Pop),
                CodeElement::Instruction(Instruction::Nop),
                CodeElement::Branch(BranchInstruction::Return),
            ]
        );
    }
}
