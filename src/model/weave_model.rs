use super::expression::Expression;
use super::pattern::{ClassPattern, FieldPattern, MethodPattern};
use super::{
    DefinitionError, DeploymentModel, IntroductionDefinition, PointcutDefinition, PointcutKind,
    WeaveDefinition,
};
use crate::jvm::BinaryName;
use crate::metadata::{ClassMetaData, FieldMetaData, MethodMetaData};
use log::debug;
use std::collections::{HashMap, HashSet};

/// Compiled member part of a pointcut
#[derive(Debug)]
enum MemberPattern {
    Method(MethodPattern),
    Field(FieldPattern),

    /// Exceptions are filtered when they are thrown, so only the signature takes part in weaving
    Throws {
        method: MethodPattern,
        exception: ClassPattern,
    },
    CallerSide {
        callee_class: ClassPattern,
        method: MethodPattern,
    },
}

#[derive(Debug)]
struct Pointcut {
    kind: PointcutKind,
    class: ClassPattern,
    member: MemberPattern,
}

impl Pointcut {
    fn compile(definition: &PointcutDefinition) -> Result<Pointcut, DefinitionError> {
        let class = ClassPattern::parse(&definition.class_pattern, definition.hierarchical)?;
        let signature = definition.signature_pattern.as_str();
        let split = |separator: char| {
            signature
                .split_once(separator)
                .ok_or_else(|| DefinitionError::MalformedPattern {
                    pattern: signature.to_owned(),
                    reason: format!("expected '{}'", separator),
                })
        };
        let member = match definition.kind {
            PointcutKind::Method | PointcutKind::ControlFlow => {
                MemberPattern::Method(MethodPattern::parse(signature)?)
            }
            PointcutKind::GetField | PointcutKind::SetField => {
                MemberPattern::Field(FieldPattern::parse(signature)?)
            }
            PointcutKind::Throws => {
                let (method, exception) = split('#')?;
                MemberPattern::Throws {
                    method: MethodPattern::parse(method)?,
                    exception: ClassPattern::parse(exception, false)?,
                }
            }
            PointcutKind::CallerSide => {
                let (callee_class, method) = split('#')?;
                MemberPattern::CallerSide {
                    callee_class: ClassPattern::parse(callee_class, false)?,
                    method: MethodPattern::parse(method)?,
                }
            }
        };
        Ok(Pointcut {
            kind: definition.kind,
            class,
            member,
        })
    }

    fn matches_method(&self, class: &ClassMetaData, method: &MethodMetaData) -> bool {
        match &self.member {
            MemberPattern::Method(pattern) | MemberPattern::Throws { method: pattern, .. } => {
                pattern.matches(method) && self.class.matches_class(class)
            }
            _ => false,
        }
    }

    fn matches_field(&self, class: &ClassMetaData, field: &FieldMetaData) -> bool {
        match &self.member {
            MemberPattern::Field(pattern) => {
                pattern.matches(field) && self.class.matches_class(class)
            }
            _ => false,
        }
    }

    fn matches_call(
        &self,
        caller: &ClassMetaData,
        callee_class: &str,
        callee: &MethodMetaData,
    ) -> bool {
        match &self.member {
            MemberPattern::CallerSide {
                callee_class: callee_pattern,
                method,
            } => {
                method.matches(callee)
                    && callee_pattern.matches_name(callee_class)
                    && self.class.matches_class(caller)
            }
            _ => false,
        }
    }

    fn exception_pattern(&self) -> Option<&ClassPattern> {
        match &self.member {
            MemberPattern::Throws { exception, .. } => Some(exception),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct AdviceRule {
    kind: PointcutKind,
    expression: Expression,
    advices: Vec<String>,
    cflow: Option<Expression>,
}

#[derive(Debug)]
struct ResolvedAspect {
    name: String,
    deployment_model: DeploymentModel,
    pointcuts: HashMap<String, Pointcut>,
    rules: Vec<AdviceRule>,
    introductions: Vec<(ClassPattern, Vec<String>)>,
    controllers: Vec<(Expression, String)>,
}

impl ResolvedAspect {
    fn pointcut(&self, name: &str, kind: PointcutKind) -> Option<&Pointcut> {
        self.pointcuts.get(name).filter(|pointcut| pointcut.kind == kind)
    }

    /// Does any rule of this kind select the member?
    fn evaluate(&self, kind: PointcutKind, matches: impl Fn(&Pointcut) -> bool) -> bool {
        self.rules.iter().filter(|rule| rule.kind == kind).any(|rule| {
            rule.expression
                .evaluate(&mut |name| self.pointcut(name, kind).map_or(false, &matches))
        })
    }

    /// Could any rule of this kind select a member of the class?
    fn may_select_class(&self, kind: PointcutKind, class: &ClassMetaData) -> bool {
        self.rules.iter().filter(|rule| rule.kind == kind).any(|rule| {
            rule.expression.may_match(&mut |name| {
                self.pointcut(name, kind)
                    .map_or(false, |pointcut| pointcut.class.matches_class(class))
            })
        })
    }

    /// Methods that delimit a control flow referenced by one of the rules
    fn is_cflow_method(&self, class: &ClassMetaData, method: &MethodMetaData) -> bool {
        self.rules
            .iter()
            .filter_map(|rule| rule.cflow.as_ref())
            .flat_map(|cflow| cflow.pointcut_names())
            .filter_map(|name| self.pointcut(name, PointcutKind::ControlFlow))
            .any(|pointcut| pointcut.matches_method(class, method))
    }

    fn may_have_cflow_method(&self, class: &ClassMetaData) -> bool {
        self.rules
            .iter()
            .filter_map(|rule| rule.cflow.as_ref())
            .flat_map(|cflow| cflow.pointcut_names())
            .filter_map(|name| self.pointcut(name, PointcutKind::ControlFlow))
            .any(|pointcut| pointcut.class.matches_class(class))
    }
}

/// Resolved, read-only answer to "what is advised where"
///
/// Every query comes in two flavours: a precise per-member one, and a cheap class-wide one that
/// only consults the class patterns. The class-wide answer can be `true` when no member actually
/// matches, but never `false` when one does.
#[derive(Debug)]
pub struct WeaveModel {
    uuid: String,
    aspects: Vec<ResolvedAspect>,
    introductions: Vec<IntroductionDefinition>,
    include_packages: Vec<String>,
    exclude_packages: Vec<String>,
}

impl WeaveModel {
    /// Check every reference in a definition and compile its patterns
    pub fn resolve(definition: &WeaveDefinition) -> Result<WeaveModel, DefinitionError> {
        let advices = unique_names("advice", definition.advices.iter().map(|a| a.name.as_str()))?;
        let introductions = unique_names(
            "introduction",
            definition.introductions.iter().map(|i| i.name.as_str()),
        )?;
        unique_names("aspect", definition.aspects.iter().map(|a| a.name.as_str()))?;

        let mut aspects = vec![];
        for aspect in &definition.aspects {
            let mut pointcuts = HashMap::new();
            for pointcut in &aspect.pointcuts {
                let compiled = Pointcut::compile(pointcut)?;
                if pointcuts.insert(pointcut.name.clone(), compiled).is_some() {
                    return Err(DefinitionError::DuplicateName {
                        kind: "pointcut",
                        name: format!("{}.{}", aspect.name, pointcut.name),
                    });
                }
            }
            let kind_of = |name: &str| {
                pointcuts
                    .get(name)
                    .map(|pointcut: &Pointcut| pointcut.kind)
                    .ok_or_else(|| DefinitionError::UnknownPointcut {
                        aspect: aspect.name.clone(),
                        pointcut: name.to_owned(),
                    })
            };

            let mut rules = vec![];
            for rule in &aspect.advice_rules {
                let expression = Expression::parse(&rule.expression)?;
                let kind = common_kind(&expression, &kind_of, &aspect.name, &rule.expression)?;
                if kind == PointcutKind::ControlFlow {
                    return Err(DefinitionError::UnsupportedPointcutKind {
                        aspect: aspect.name.clone(),
                        expression: rule.expression.clone(),
                    });
                }
                for advice in &rule.advice_refs {
                    if !advices.contains(advice.as_str()) {
                        return Err(DefinitionError::UnknownAdvice {
                            aspect: aspect.name.clone(),
                            advice: advice.clone(),
                        });
                    }
                }
                let cflow = match &rule.cflow_expression {
                    None => None,
                    Some(text) => {
                        let cflow = Expression::parse(text)?;
                        for name in cflow.pointcut_names() {
                            if kind_of(name)? != PointcutKind::ControlFlow {
                                return Err(DefinitionError::NotControlFlow {
                                    aspect: aspect.name.clone(),
                                    pointcut: name.to_owned(),
                                });
                            }
                        }
                        Some(cflow)
                    }
                };
                rules.push(AdviceRule {
                    kind,
                    expression,
                    advices: rule.advice_refs.clone(),
                    cflow,
                });
            }

            let mut bound_introductions = vec![];
            for rule in &aspect.introduction_rules {
                for name in &rule.introduction_refs {
                    if !introductions.contains(name.as_str()) {
                        return Err(DefinitionError::UnknownIntroduction(name.clone()));
                    }
                }
                bound_introductions.push((
                    ClassPattern::parse(&rule.class_pattern, false)?,
                    rule.introduction_refs.clone(),
                ));
            }

            let mut controllers = vec![];
            for controller in &aspect.controllers {
                let expression = Expression::parse(&controller.expression)?;
                let kind =
                    common_kind(&expression, &kind_of, &aspect.name, &controller.expression)?;
                if kind != PointcutKind::Method {
                    return Err(DefinitionError::UnsupportedPointcutKind {
                        aspect: aspect.name.clone(),
                        expression: controller.expression.clone(),
                    });
                }
                if BinaryName::from_dotted(&controller.class_name).is_err() {
                    return Err(DefinitionError::InvalidControllerClass(
                        controller.class_name.clone(),
                    ));
                }
                controllers.push((expression, controller.class_name.clone()));
            }

            aspects.push(ResolvedAspect {
                name: aspect.name.clone(),
                deployment_model: aspect.deployment_model,
                pointcuts,
                rules,
                introductions: bound_introductions,
                controllers,
            });
        }

        for introduction in &definition.introductions {
            let names = std::iter::once(&introduction.interface)
                .chain(introduction.implementation.as_ref());
            for name in names {
                if BinaryName::from_dotted(name).is_err() {
                    return Err(DefinitionError::UnresolvableImplementation {
                        introduction: introduction.name.clone(),
                        class: name.clone(),
                        reason: String::from("not a valid class name"),
                    });
                }
            }
        }

        debug!(
            "Resolved weave model '{}' with {} aspect(s)",
            definition.uuid,
            aspects.len()
        );
        Ok(WeaveModel {
            uuid: definition.uuid.clone(),
            aspects,
            introductions: definition.introductions.clone(),
            include_packages: definition.include_packages.clone(),
            exclude_packages: definition.exclude_packages.clone(),
        })
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Is the class (dotted name) inside the packages this model weaves?
    pub fn in_transformation_scope(&self, class_name: &str) -> bool {
        let included = self.include_packages.is_empty()
            || self
                .include_packages
                .iter()
                .any(|package| in_package(class_name, package));
        included
            && !self
                .exclude_packages
                .iter()
                .any(|package| in_package(class_name, package))
    }

    /// Is the execution of the method advised?
    ///
    /// Methods selected by throws pointcuts or by control flow pointcuts count as well: both are
    /// tracked by intercepting the method's execution.
    pub fn has_method_pointcut(&self, class: &ClassMetaData, method: &MethodMetaData) -> bool {
        self.aspects.iter().any(|aspect| {
            aspect.evaluate(PointcutKind::Method, |pc| pc.matches_method(class, method))
                || aspect.evaluate(PointcutKind::Throws, |pc| pc.matches_method(class, method))
                || aspect.is_cflow_method(class, method)
        })
    }

    pub fn has_method_pointcut_in_class(&self, class: &ClassMetaData) -> bool {
        self.aspects.iter().any(|aspect| {
            aspect.may_select_class(PointcutKind::Method, class)
                || aspect.may_select_class(PointcutKind::Throws, class)
                || aspect.may_have_cflow_method(class)
        })
    }

    pub fn has_get_field_pointcut(&self, class: &ClassMetaData, field: &FieldMetaData) -> bool {
        self.aspects.iter().any(|aspect| {
            aspect.evaluate(PointcutKind::GetField, |pc| pc.matches_field(class, field))
        })
    }

    pub fn has_get_field_pointcut_in_class(&self, class: &ClassMetaData) -> bool {
        self.aspects
            .iter()
            .any(|aspect| aspect.may_select_class(PointcutKind::GetField, class))
    }

    pub fn has_set_field_pointcut(&self, class: &ClassMetaData, field: &FieldMetaData) -> bool {
        self.aspects.iter().any(|aspect| {
            aspect.evaluate(PointcutKind::SetField, |pc| pc.matches_field(class, field))
        })
    }

    pub fn has_set_field_pointcut_in_class(&self, class: &ClassMetaData) -> bool {
        self.aspects
            .iter()
            .any(|aspect| aspect.may_select_class(PointcutKind::SetField, class))
    }

    pub fn has_throws_pointcut(&self, class: &ClassMetaData, method: &MethodMetaData) -> bool {
        self.aspects.iter().any(|aspect| {
            aspect.evaluate(PointcutKind::Throws, |pc| pc.matches_method(class, method))
        })
    }

    pub fn has_throws_pointcut_in_class(&self, class: &ClassMetaData) -> bool {
        self.aspects
            .iter()
            .any(|aspect| aspect.may_select_class(PointcutKind::Throws, class))
    }

    /// Exception class patterns of the throws pointcuts selecting the method
    pub fn throws_exception_patterns(
        &self,
        class: &ClassMetaData,
        method: &MethodMetaData,
    ) -> Vec<&str> {
        let kind = PointcutKind::Throws;
        let mut patterns = vec![];
        for aspect in &self.aspects {
            let selects = |name: &str| {
                aspect.pointcut(name, kind).filter(|pc| pc.matches_method(class, method))
            };
            for rule in aspect.rules.iter().filter(|rule| rule.kind == kind) {
                if !rule.expression.evaluate(&mut |name| selects(name).is_some()) {
                    continue;
                }
                let selected = rule.expression.pointcut_names().into_iter().filter_map(selects);
                for pattern in selected.filter_map(Pointcut::exception_pattern) {
                    if !patterns.contains(&pattern.as_str()) {
                        patterns.push(pattern.as_str());
                    }
                }
            }
        }
        patterns
    }

    /// Is a call from a method of `caller` to `callee_class` (dotted) `callee` advised?
    pub fn has_caller_side_pointcut(
        &self,
        caller: &ClassMetaData,
        callee_class: &str,
        callee: &MethodMetaData,
    ) -> bool {
        self.aspects.iter().any(|aspect| {
            aspect.evaluate(PointcutKind::CallerSide, |pc| {
                pc.matches_call(caller, callee_class, callee)
            })
        })
    }

    pub fn has_caller_side_pointcut_in_class(&self, caller: &ClassMetaData) -> bool {
        self.aspects
            .iter()
            .any(|aspect| aspect.may_select_class(PointcutKind::CallerSide, caller))
    }

    /// Names of the advices bound to the execution of a method, in definition order
    pub fn method_advices(&self, class: &ClassMetaData, method: &MethodMetaData) -> Vec<&str> {
        let mut advices = vec![];
        for aspect in &self.aspects {
            for rule in aspect.rules.iter().filter(|rule| rule.kind == PointcutKind::Method) {
                let selected = rule.expression.evaluate(&mut |name| {
                    aspect
                        .pointcut(name, PointcutKind::Method)
                        .map_or(false, |pc| pc.matches_method(class, method))
                });
                if selected {
                    advices.extend(rule.advices.iter().map(String::as_str));
                }
            }
        }
        advices
    }

    pub fn has_introductions(&self, class: &ClassMetaData) -> bool {
        self.aspects.iter().any(|aspect| {
            aspect
                .introductions
                .iter()
                .any(|(pattern, names)| !names.is_empty() && pattern.matches_class(class))
        })
    }

    /// Introductions bound to the class, in definition order and without repeats
    pub fn introduction_names(&self, class: &ClassMetaData) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.aspects
            .iter()
            .flat_map(|aspect| aspect.introductions.iter())
            .filter(|(pattern, _)| pattern.matches_class(class))
            .flat_map(|(_, names)| names.iter().map(String::as_str))
            .filter(|name| seen.insert(*name))
            .collect()
    }

    pub fn introduction(&self, name: &str) -> Option<&IntroductionDefinition> {
        self.introductions
            .iter()
            .find(|introduction| introduction.name == name)
    }

    /// Position of the introduction in the definition, as passed to the runtime registry
    pub fn introduction_index(&self, name: &str) -> Option<usize> {
        self.introductions
            .iter()
            .position(|introduction| introduction.name == name)
    }

    /// Controller class (dotted) for the method's join point, if an aspect binds one
    pub fn join_point_controller(
        &self,
        class: &ClassMetaData,
        method: &MethodMetaData,
    ) -> Option<&str> {
        self.aspects.iter().find_map(|aspect| {
            aspect
                .controllers
                .iter()
                .find(|(expression, _)| {
                    expression.evaluate(&mut |name| {
                        aspect
                            .pointcut(name, PointcutKind::Method)
                            .map_or(false, |pc| pc.matches_method(class, method))
                    })
                })
                .map(|(_, controller)| controller.as_str())
        })
    }

    /// Deployment model of an aspect, by name
    pub fn deployment_model(&self, aspect: &str) -> Option<DeploymentModel> {
        self.aspects
            .iter()
            .find(|resolved| resolved.name == aspect)
            .map(|resolved| resolved.deployment_model)
    }
}

fn unique_names<'a>(
    kind: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<HashSet<&'a str>, DefinitionError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(DefinitionError::DuplicateName {
                kind,
                name: name.to_owned(),
            });
        }
    }
    Ok(seen)
}

/// Kind shared by every pointcut in the expression
fn common_kind(
    expression: &Expression,
    kind_of: &impl Fn(&str) -> Result<PointcutKind, DefinitionError>,
    aspect: &str,
    text: &str,
) -> Result<PointcutKind, DefinitionError> {
    let mut kinds = expression.pointcut_names().into_iter().map(kind_of);
    let first = match kinds.next() {
        Some(kind) => kind?,
        None => {
            return Err(DefinitionError::MalformedExpression {
                expression: text.to_owned(),
                reason: String::from("no pointcuts"),
            })
        }
    };
    for kind in kinds {
        if kind? != first {
            return Err(DefinitionError::MixedPointcutKinds {
                aspect: aspect.to_owned(),
                expression: text.to_owned(),
            });
        }
    }
    Ok(first)
}

fn in_package(class_name: &str, package: &str) -> bool {
    let package = package.trim_end_matches(|c| c == '.' || c == '*');
    class_name
        .strip_prefix(package)
        .map_or(false, |rest| rest.is_empty() || rest.starts_with('.'))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::MethodAccessFlags;
    use crate::metadata::TypeName;
    use crate::model::AspectDefinition;

    fn void_method(name: &str, parameters: &[&str]) -> MethodMetaData {
        MethodMetaData::new(
            name,
            TypeName::void(),
            parameters
                .iter()
                .map(|typ| TypeName::from_source(typ).unwrap())
                .collect(),
            vec![],
            MethodAccessFlags::PUBLIC,
        )
    }

    fn definition(aspect: AspectDefinition) -> WeaveDefinition {
        WeaveDefinition::new("test")
            .advice("log", "com.acme.aspects.LogAdvice")
            .advice("audit", "com.acme.aspects.AuditAdvice")
            .aspect(aspect)
    }

    #[test]
    fn method_patterns_respect_packages() {
        let model = definition(
            AspectDefinition::new("logging")
                .pointcut("foo", PointcutKind::Method, "com.acme.*", "void foo()")
                .advise("foo", &["log"]),
        )
        .resolve()
        .unwrap();
        let foo = void_method("foo", &[]);
        let widget = ClassMetaData::leaf("com.acme.Widget");
        let nested = ClassMetaData::leaf("com.acme.sub.Widget");
        let other = ClassMetaData::leaf("com.other.Widget");
        assert!(model.has_method_pointcut(&widget, &foo));
        assert!(!model.has_method_pointcut(&nested, &foo));
        assert!(!model.has_method_pointcut(&other, &foo));
        assert!(!model.has_method_pointcut(&widget, &void_method("foo", &["int"])));
        assert!(model.has_method_pointcut_in_class(&widget));
        assert!(!model.has_method_pointcut_in_class(&other));
        assert_eq!(model.method_advices(&widget, &foo), vec!["log"]);
    }

    #[test]
    fn expressions_combine_pointcuts() {
        let model = definition(
            AspectDefinition::new("logging")
                .pointcut("setters", PointcutKind::Method, "com.acme.*", "void set*(int)")
                .pointcut("setId", PointcutKind::Method, "com.acme.*", "void setId(int)")
                .advise("setters && !setId", &["log", "audit"]),
        )
        .resolve()
        .unwrap();
        let widget = ClassMetaData::leaf("com.acme.Widget");
        assert!(model.has_method_pointcut(&widget, &void_method("setSize", &["int"])));
        assert!(!model.has_method_pointcut(&widget, &void_method("setId", &["int"])));
        assert_eq!(
            model.method_advices(&widget, &void_method("setSize", &["int"])),
            vec!["log", "audit"]
        );
    }

    #[test]
    fn cflow_and_throws_methods_are_advised() {
        let model = definition(
            AspectDefinition::new("tracing")
                .pointcut(
                    "calls",
                    PointcutKind::CallerSide,
                    "com.acme.*",
                    "com.acme.Dao#void save()",
                )
                .pointcut(
                    "inTx",
                    PointcutKind::ControlFlow,
                    "com.acme.Service",
                    "void commit()",
                )
                .pointcut(
                    "fails",
                    PointcutKind::Throws,
                    "com.acme.*",
                    "void run()#java.io.IOException",
                )
                .advise_in_cflow("calls", "inTx", &["log"])
                .advise("fails", &["audit"]),
        )
        .resolve()
        .unwrap();
        let service = ClassMetaData::leaf("com.acme.Service");
        assert!(model.has_method_pointcut(&service, &void_method("commit", &[])));
        assert!(model.has_method_pointcut(&service, &void_method("run", &[])));
        assert!(model.has_throws_pointcut(&service, &void_method("run", &[])));
        assert_eq!(
            model.throws_exception_patterns(&service, &void_method("run", &[])),
            vec!["java.io.IOException"]
        );
        let save = void_method("save", &[]);
        assert!(model.has_caller_side_pointcut(&service, "com.acme.Dao", &save));
        assert!(!model.has_caller_side_pointcut(&service, "com.acme.Cache", &save));
        assert!(model.has_caller_side_pointcut_in_class(&service));
    }

    #[test]
    fn unbound_throws_pointcuts_contribute_no_exceptions() {
        let model = definition(
            AspectDefinition::new("failures")
                .pointcut(
                    "io",
                    PointcutKind::Throws,
                    "com.acme.*",
                    "void run()#java.io.IOException",
                )
                .pointcut(
                    "sql",
                    PointcutKind::Throws,
                    "com.acme.*",
                    "void run()#java.sql.SQLException",
                )
                .pointcut(
                    "state",
                    PointcutKind::Throws,
                    "com.acme.*",
                    "void run()#java.lang.IllegalStateException",
                )
                .advise("io", &["audit"])
                .advise("io || state", &["log"]),
        )
        .resolve()
        .unwrap();
        let service = ClassMetaData::leaf("com.acme.Service");
        assert_eq!(
            model.throws_exception_patterns(&service, &void_method("run", &[])),
            vec!["java.io.IOException", "java.lang.IllegalStateException"]
        );
        assert!(model
            .throws_exception_patterns(&service, &void_method("stop", &[]))
            .is_empty());
    }

    #[test]
    fn introductions_and_controllers() {
        let model = WeaveDefinition::new("test")
            .introduction("tagged", "com.acme.Tagged", Some("com.acme.TaggedImpl"))
            .introduction("marked", "com.acme.Marked", None)
            .aspect(
                AspectDefinition::new("mixins")
                    .pointcut("run", PointcutKind::Method, "com.acme.*", "void run()")
                    .introduce("com.acme.*", &["tagged", "marked"])
                    .introduce("com.acme.Widget", &["tagged"])
                    .controller("run", "com.acme.Controller"),
            )
            .resolve()
            .unwrap();
        let widget = ClassMetaData::leaf("com.acme.Widget");
        assert!(model.has_introductions(&widget));
        assert_eq!(model.introduction_names(&widget), vec!["tagged", "marked"]);
        assert_eq!(model.introduction_index("marked"), Some(1));
        assert_eq!(model.introduction("tagged").unwrap().interface, "com.acme.Tagged");
        assert_eq!(
            model.join_point_controller(&widget, &void_method("run", &[])),
            Some("com.acme.Controller")
        );
        assert_eq!(model.join_point_controller(&widget, &void_method("stop", &[])), None);
        assert!(!model.has_introductions(&ClassMetaData::leaf("org.other.Widget")));
        assert_eq!(model.deployment_model("mixins"), Some(DeploymentModel::PerJvm));
        assert_eq!(model.deployment_model("missing"), None);
    }

    #[test]
    fn definition_errors() {
        let unknown_advice = definition(
            AspectDefinition::new("a")
                .pointcut("p", PointcutKind::Method, "*", "void f()")
                .advise("p", &["missing"]),
        );
        assert!(matches!(unknown_advice.resolve(), Err(DefinitionError::UnknownAdvice { .. })));

        let unknown_pointcut = definition(AspectDefinition::new("a").advise("q", &["log"]));
        assert!(matches!(
            unknown_pointcut.resolve(),
            Err(DefinitionError::UnknownPointcut { .. })
        ));

        let mixed = definition(
            AspectDefinition::new("a")
                .pointcut("p", PointcutKind::Method, "*", "void f()")
                .pointcut("q", PointcutKind::GetField, "*", "int x")
                .advise("p || q", &["log"]),
        );
        assert!(matches!(mixed.resolve(), Err(DefinitionError::MixedPointcutKinds { .. })));

        let bad_cflow = definition(
            AspectDefinition::new("a")
                .pointcut("p", PointcutKind::Method, "*", "void f()")
                .advise_in_cflow("p", "p", &["log"]),
        );
        assert!(matches!(bad_cflow.resolve(), Err(DefinitionError::NotControlFlow { .. })));

        let duplicate = definition(AspectDefinition::new("a")).advice("log", "com.acme.Other");
        assert!(matches!(duplicate.resolve(), Err(DefinitionError::DuplicateName { .. })));

        let unknown_introduction = definition(AspectDefinition::new("a").introduce("*", &["x"]));
        assert!(matches!(
            unknown_introduction.resolve(),
            Err(DefinitionError::UnknownIntroduction(_))
        ));

        let bad_pattern = definition(
            AspectDefinition::new("a")
                .pointcut("p", PointcutKind::CallerSide, "*", "void f()")
                .advise("p", &["log"]),
        );
        assert!(matches!(bad_pattern.resolve(), Err(DefinitionError::MalformedPattern { .. })));
    }

    #[test]
    fn transformation_scope() {
        let mut definition = WeaveDefinition::new("test");
        definition.include_packages = vec![String::from("com.acme")];
        definition.exclude_packages = vec![String::from("com.acme.internal.*")];
        let model = definition.resolve().unwrap();
        assert!(model.in_transformation_scope("com.acme.Widget"));
        assert!(model.in_transformation_scope("com.acme.sub.Widget"));
        assert!(!model.in_transformation_scope("com.acme.internal.Widget"));
        assert!(!model.in_transformation_scope("com.acmex.Widget"));
        assert!(!model.in_transformation_scope("org.other.Widget"));
    }
}
