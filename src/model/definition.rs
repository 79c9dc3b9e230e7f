use super::{DefinitionError, WeaveModel};
use std::fmt;
use std::str::FromStr;

/// What a pointcut selects
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum PointcutKind {
    /// Execution of a method
    Method,
    GetField,
    SetField,

    /// A method throwing an exception
    Throws,

    /// Call to a method, seen from the calling method
    CallerSide,

    /// Methods whose execution delimits a control flow
    ControlFlow,
}

impl FromStr for PointcutKind {
    type Err = String;

    fn from_str(kind: &str) -> Result<PointcutKind, String> {
        match kind {
            "method" => Ok(PointcutKind::Method),
            "getField" | "get-field" => Ok(PointcutKind::GetField),
            "setField" | "set-field" => Ok(PointcutKind::SetField),
            "throws" => Ok(PointcutKind::Throws),
            "callerSide" | "caller-side" => Ok(PointcutKind::CallerSide),
            "cflow" | "control-flow" => Ok(PointcutKind::ControlFlow),
            other => Err(format!("Unknown pointcut kind '{}'", other)),
        }
    }
}

/// How many instances of an aspect or introduction implementation the runtime creates
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum DeploymentModel {
    PerJvm,
    PerClass,
    PerInstance,
    PerThread,
}

impl Default for DeploymentModel {
    fn default() -> DeploymentModel {
        DeploymentModel::PerJvm
    }
}

impl FromStr for DeploymentModel {
    type Err = String;

    fn from_str(model: &str) -> Result<DeploymentModel, String> {
        match model {
            "perJVM" => Ok(DeploymentModel::PerJvm),
            "perClass" => Ok(DeploymentModel::PerClass),
            "perInstance" => Ok(DeploymentModel::PerInstance),
            "perThread" => Ok(DeploymentModel::PerThread),
            other => Err(format!("Unknown deployment model '{}'", other)),
        }
    }
}

impl fmt::Display for DeploymentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeploymentModel::PerJvm => "perJVM",
            DeploymentModel::PerClass => "perClass",
            DeploymentModel::PerInstance => "perInstance",
            DeploymentModel::PerThread => "perThread",
        })
    }
}

/// Named pattern selecting join points
///
/// The signature pattern's shape depends on the kind:
///
///   - method, throws, and control flow: `<return> <name>(<param>, ...)`, with throws adding
///     `#<exception class pattern>`
///   - field access: `<type> <name>`
///   - caller side: `<callee class pattern>#<return> <name>(<param>, ...)`
#[derive(Clone, Debug)]
pub struct PointcutDefinition {
    pub name: String,
    pub kind: PointcutKind,
    pub class_pattern: String,
    pub signature_pattern: String,

    /// Match the class and all of its descendants (same as a trailing `+` on the class pattern)
    pub hierarchical: bool,
}

/// Binds advices to the join points selected by a pointcut expression
#[derive(Clone, Debug)]
pub struct AdviceWeavingRule {
    pub expression: String,
    pub advice_refs: Vec<String>,

    /// Only advise inside the control flow selected by this expression
    pub cflow_expression: Option<String>,
}

/// Binds introductions to the classes selected by a class pattern
#[derive(Clone, Debug)]
pub struct BindIntroductionRule {
    pub class_pattern: String,
    pub introduction_refs: Vec<String>,
}

/// Join point controller used for the methods a pointcut expression selects
#[derive(Clone, Debug)]
pub struct ControllerDefinition {
    pub expression: String,

    /// Dotted name of the controller class
    pub class_name: String,
}

#[derive(Clone, Debug)]
pub struct AdviceDefinition {
    pub name: String,
    pub class_name: String,
    pub deployment_model: DeploymentModel,
}

#[derive(Clone, Debug)]
pub struct IntroductionDefinition {
    pub name: String,

    /// Dotted name of the introduced interface
    pub interface: String,

    /// Dotted name of the class implementing the interface, if any
    pub implementation: Option<String>,
    pub deployment_model: DeploymentModel,
}

#[derive(Clone, Debug, Default)]
pub struct AspectDefinition {
    pub name: String,
    pub deployment_model: DeploymentModel,
    pub pointcuts: Vec<PointcutDefinition>,
    pub advice_rules: Vec<AdviceWeavingRule>,
    pub introduction_rules: Vec<BindIntroductionRule>,
    pub controllers: Vec<ControllerDefinition>,
}

impl AspectDefinition {
    pub fn new(name: impl Into<String>) -> AspectDefinition {
        AspectDefinition {
            name: name.into(),
            ..AspectDefinition::default()
        }
    }

    pub fn pointcut(
        mut self,
        name: &str,
        kind: PointcutKind,
        class_pattern: &str,
        signature_pattern: &str,
    ) -> AspectDefinition {
        self.pointcuts.push(PointcutDefinition {
            name: name.to_owned(),
            kind,
            class_pattern: class_pattern.to_owned(),
            signature_pattern: signature_pattern.to_owned(),
            hierarchical: false,
        });
        self
    }

    pub fn advise(mut self, expression: &str, advices: &[&str]) -> AspectDefinition {
        self.advice_rules.push(AdviceWeavingRule {
            expression: expression.to_owned(),
            advice_refs: advices.iter().map(|advice| advice.to_string()).collect(),
            cflow_expression: None,
        });
        self
    }

    pub fn advise_in_cflow(
        mut self,
        expression: &str,
        cflow_expression: &str,
        advices: &[&str],
    ) -> AspectDefinition {
        self.advice_rules.push(AdviceWeavingRule {
            expression: expression.to_owned(),
            advice_refs: advices.iter().map(|advice| advice.to_string()).collect(),
            cflow_expression: Some(cflow_expression.to_owned()),
        });
        self
    }

    pub fn introduce(mut self, class_pattern: &str, introductions: &[&str]) -> AspectDefinition {
        self.introduction_rules.push(BindIntroductionRule {
            class_pattern: class_pattern.to_owned(),
            introduction_refs: introductions.iter().map(|name| name.to_string()).collect(),
        });
        self
    }

    pub fn controller(mut self, expression: &str, class_name: &str) -> AspectDefinition {
        self.controllers.push(ControllerDefinition {
            expression: expression.to_owned(),
            class_name: class_name.to_owned(),
        });
        self
    }
}

/// Everything one weave model is built from
///
/// The `uuid` scopes the model: it is threaded through every generated name and runtime call so
/// that independently woven systems can share a process.
#[derive(Clone, Debug)]
pub struct WeaveDefinition {
    pub uuid: String,
    pub aspects: Vec<AspectDefinition>,
    pub advices: Vec<AdviceDefinition>,
    pub introductions: Vec<IntroductionDefinition>,

    /// Package prefixes to weave (empty means every package)
    pub include_packages: Vec<String>,
    pub exclude_packages: Vec<String>,
}

impl WeaveDefinition {
    pub fn new(uuid: impl Into<String>) -> WeaveDefinition {
        WeaveDefinition {
            uuid: uuid.into(),
            aspects: vec![],
            advices: vec![],
            introductions: vec![],
            include_packages: vec![],
            exclude_packages: vec![],
        }
    }

    /// Definition with a freshly generated identifier
    pub fn with_generated_uuid() -> WeaveDefinition {
        WeaveDefinition::new(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn aspect(mut self, aspect: AspectDefinition) -> WeaveDefinition {
        self.aspects.push(aspect);
        self
    }

    pub fn advice(mut self, name: &str, class_name: &str) -> WeaveDefinition {
        self.advices.push(AdviceDefinition {
            name: name.to_owned(),
            class_name: class_name.to_owned(),
            deployment_model: DeploymentModel::PerJvm,
        });
        self
    }

    pub fn introduction(
        mut self,
        name: &str,
        interface: &str,
        implementation: Option<&str>,
    ) -> WeaveDefinition {
        self.introductions.push(IntroductionDefinition {
            name: name.to_owned(),
            interface: interface.to_owned(),
            implementation: implementation.map(str::to_owned),
            deployment_model: DeploymentModel::PerJvm,
        });
        self
    }

    /// Check every reference and compile every pattern
    pub fn resolve(&self) -> Result<WeaveModel, DefinitionError> {
        WeaveModel::resolve(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn kinds_and_models_parse() {
        assert_eq!("getField".parse::<PointcutKind>(), Ok(PointcutKind::GetField));
        assert_eq!("cflow".parse::<PointcutKind>(), Ok(PointcutKind::ControlFlow));
        assert!("around".parse::<PointcutKind>().is_err());
        assert_eq!("perThread".parse::<DeploymentModel>(), Ok(DeploymentModel::PerThread));
        assert_eq!(DeploymentModel::PerJvm.to_string(), "perJVM");
    }

    #[test]
    fn generated_uuids_are_distinct() {
        let first = WeaveDefinition::with_generated_uuid();
        let second = WeaveDefinition::with_generated_uuid();
        assert_ne!(first.uuid, second.uuid);
        assert_eq!(first.uuid.len(), 32);
    }
}
