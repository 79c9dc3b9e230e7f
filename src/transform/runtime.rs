//! Call shapes of the runtime library
//!
//! Generated code only ever touches the runtime through the classes and descriptors below. The
//! argument order of the join point constructors is fixed: the weave model uuid first, then the
//! owning class or instance, then the signature string, then (for method join points only) the
//! controller class name or `null`.
//!
//!  - `MemberMethodJoinPoint(String uuid, Object this, String signature, String controller)`,
//!    called through `setParameters(Object[])` then `proceed()`
//!  - `StaticMethodJoinPoint(String uuid, Class owner, String signature, String controller)`,
//!    same entry points
//!  - `MemberFieldGetJoinPoint` and `MemberFieldSetJoinPoint`
//!    `(String uuid, Object this, String signature)`, called through `pre()` and `post()`
//!  - `StaticFieldGetJoinPoint` and `StaticFieldSetJoinPoint`
//!    `(String uuid, Class owner, String signature)`, same entry points
//!  - `CallerSideJoinPoint(String uuid, Class caller, String signature)`, called through
//!    `invokePreAdvices()` and `invokePostAdvices()`
//!
//! Signature strings are `name` + method descriptor for methods (the name being the one the
//! original body was renamed to), `name:descriptor` for fields, and `callee/Class.name` +
//! descriptor for calls.

/// Package of the runtime library, in binary form
pub const PACKAGE: &str = "org/jweave/runtime";

pub const MEMBER_METHOD_JOIN_POINT: &str = "org/jweave/runtime/MemberMethodJoinPoint";
pub const STATIC_METHOD_JOIN_POINT: &str = "org/jweave/runtime/StaticMethodJoinPoint";
pub const MEMBER_FIELD_GET_JOIN_POINT: &str = "org/jweave/runtime/MemberFieldGetJoinPoint";
pub const MEMBER_FIELD_SET_JOIN_POINT: &str = "org/jweave/runtime/MemberFieldSetJoinPoint";
pub const STATIC_FIELD_GET_JOIN_POINT: &str = "org/jweave/runtime/StaticFieldGetJoinPoint";
pub const STATIC_FIELD_SET_JOIN_POINT: &str = "org/jweave/runtime/StaticFieldSetJoinPoint";
pub const CALLER_SIDE_JOIN_POINT: &str = "org/jweave/runtime/CallerSideJoinPoint";
pub const INTRODUCTION_REGISTRY: &str = "org/jweave/runtime/IntroductionRegistry";
pub const IDENTITY: &str = "org/jweave/runtime/Identity";

/// Interface added to classes carrying attachable metadata
pub const METADATA_ENHANCEABLE: &str = "org/jweave/runtime/MetaDataEnhanceable";

/// Interface added to classes carrying a per-instance identity
pub const IDENTIFIABLE: &str = "org/jweave/runtime/Identifiable";

pub const MEMBER_METHOD_JOIN_POINT_INIT: &str =
    "(Ljava/lang/String;Ljava/lang/Object;Ljava/lang/String;Ljava/lang/String;)V";
pub const STATIC_METHOD_JOIN_POINT_INIT: &str =
    "(Ljava/lang/String;Ljava/lang/Class;Ljava/lang/String;Ljava/lang/String;)V";
pub const MEMBER_FIELD_JOIN_POINT_INIT: &str =
    "(Ljava/lang/String;Ljava/lang/Object;Ljava/lang/String;)V";
pub const STATIC_JOIN_POINT_INIT: &str = "(Ljava/lang/String;Ljava/lang/Class;Ljava/lang/String;)V";

pub const SET_PARAMETERS: (&str, &str) = ("setParameters", "([Ljava/lang/Object;)V");
pub const PROCEED: (&str, &str) = ("proceed", "()Ljava/lang/Object;");
pub const PRE: (&str, &str) = ("pre", "()V");
pub const POST: (&str, &str) = ("post", "()V");
pub const INVOKE_PRE_ADVICES: (&str, &str) = ("invokePreAdvices", "()V");
pub const INVOKE_POST_ADVICES: (&str, &str) = ("invokePostAdvices", "()V");

/// `IntroductionRegistry.invoke(uuid, introduction index, method index, this, arguments)`
pub const INVOKE_INTRODUCTION: (&str, &str) = (
    "invoke",
    "(Ljava/lang/String;IILjava/lang/Object;[Ljava/lang/Object;)Ljava/lang/Object;",
);

/// `Identity.generate(this)`
pub const GENERATE_IDENTITY: (&str, &str) = ("generate", "(Ljava/lang/Object;)Ljava/lang/String;");

/// Is the binary class name part of the runtime library?
pub fn is_runtime_class(class: &str) -> bool {
    class
        .strip_prefix(PACKAGE)
        .map_or(false, |rest| rest.starts_with('/'))
}

/// Signature string passed to field join points
pub fn field_signature(name: &str, descriptor: &str) -> String {
    format!("{}:{}", name, descriptor)
}

/// Signature string passed to method join points
pub fn method_signature(name: &str, descriptor: &str) -> String {
    format!("{}{}", name, descriptor)
}

/// Signature string passed to caller side join points
pub fn call_signature(callee_class: &str, name: &str, descriptor: &str) -> String {
    format!("{}.{}{}", callee_class, name, descriptor)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn runtime_classes() {
        assert!(is_runtime_class(CALLER_SIDE_JOIN_POINT));
        assert!(!is_runtime_class("org/jweave/runtimes/Other"));
        assert!(!is_runtime_class("com/acme/Widget"));
    }

    #[test]
    fn signatures() {
        assert_eq!(field_signature("count", "I"), "count:I");
        assert_eq!(method_signature("run", "()V"), "run()V");
        assert_eq!(
            call_signature("com/acme/Bank", "transfer", "(J)V"),
            "com/acme/Bank.transfer(J)V"
        );
    }
}
