use crate::jvm;
use crate::model::DefinitionError;

/// Failure to weave one class
#[derive(Debug)]
pub enum Error {
    /// The input bytes are not a valid class file
    ClassFormat(jvm::Error),

    /// The weave definition is inconsistent with the class being woven
    Definition(DefinitionError),

    /// Reading, editing, or writing the class failed inside a pass
    Jvm(jvm::Error),

    /// A pass hit a condition it could not handle
    Fault { pass: &'static str, message: String },

    Io(std::io::Error),
}

impl Error {
    /// Fatal errors are surfaced to the caller, the others only cost the class its weaving
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ClassFormat(_) | Error::Definition(_))
    }
}

impl From<jvm::Error> for Error {
    fn from(err: jvm::Error) -> Error {
        Error::Jvm(err)
    }
}

impl From<DefinitionError> for Error {
    fn from(err: DefinitionError) -> Error {
        Error::Definition(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}
