/// Defects in a weave definition
///
/// These are configuration errors: they are reported as soon as they are found and are never
/// retried.
#[derive(Debug)]
pub enum DefinitionError {
    /// An expression refers to a pointcut that is not declared in the aspect
    UnknownPointcut {
        aspect: String,
        pointcut: String,
    },
    UnknownAdvice {
        aspect: String,
        advice: String,
    },
    UnknownIntroduction(String),

    /// Two definitions of the same kind share a name
    DuplicateName {
        kind: &'static str,
        name: String,
    },

    MalformedPattern {
        pattern: String,
        reason: String,
    },
    MalformedExpression {
        expression: String,
        reason: String,
    },

    /// An advice expression combines pointcuts of different kinds
    MixedPointcutKinds {
        aspect: String,
        expression: String,
    },

    /// A control flow expression refers to a pointcut that is not a control flow pointcut
    NotControlFlow {
        aspect: String,
        pointcut: String,
    },

    /// A pointcut kind that this expression position does not accept
    UnsupportedPointcutKind {
        aspect: String,
        expression: String,
    },

    InvalidControllerClass(String),

    /// An introduction implementation class that can't be loaded or read
    UnresolvableImplementation {
        introduction: String,
        class: String,
        reason: String,
    },

    /// No weave model is registered or can be found for a uuid
    ModelNotFound(String),

    Io(std::io::Error),
}

impl From<std::io::Error> for DefinitionError {
    fn from(err: std::io::Error) -> DefinitionError {
        DefinitionError::Io(err)
    }
}
