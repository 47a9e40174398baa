use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Number;

use crate::bundle::ordered::OrderedMap;

/// A single scalar value, used for list elements and scheduler resources
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(Number),
    Text(String),
}

impl Scalar {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Scalar::Number(_))
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Number(value.into())
    }
}

/// Value of one script argument
///
/// Each variant has exactly one rendering rule in the generated submission script, see
/// [`crate::slurm::script`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Null,
    Flag(bool),
    Number(Number),
    Text(String),
    List(Vec<Scalar>),
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Text(value.to_string())
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Flag(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Number(value.into())
    }
}

impl From<Vec<Scalar>> for ArgValue {
    fn from(value: Vec<Scalar>) -> Self {
        ArgValue::List(value)
    }
}

/// One unit of work in a bundle
///
/// `name` is taken from the job's key in the bundle document; the copy stored inside the job
/// object is informational only.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Job {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, alias = "script_args")]
    pub args: OrderedMap<ArgValue>,
    #[serde(default)]
    pub dependencies: Option<Vec<String>>,
    #[serde(default, alias = "pre-commands")]
    pub pre_commands: Option<Vec<String>>,
    #[serde(default, rename = "slurm")]
    pub resources: OrderedMap<Option<Scalar>>,
    #[serde(default)]
    pub name: String,
}

impl Job {
    pub fn new(name: impl Into<String>, script: impl Into<String>) -> Self {
        Job {
            script: Some(script.into()),
            args: OrderedMap::new(),
            dependencies: None,
            pre_commands: None,
            resources: OrderedMap::new(),
            name: name.into(),
        }
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.args.push(key, value.into());
        self
    }

    pub fn resource(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.resources.push(key, Some(value.into()));
        self
    }

    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .get_or_insert_with(Vec::new)
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn pre_command(mut self, command: impl Into<String>) -> Self {
        self.pre_commands.get_or_insert_with(Vec::new).push(command.into());
        self
    }

    /// Declared dependencies, treating a `null` list as empty
    pub fn dependency_names(&self) -> &[String] {
        self.dependencies.as_deref().unwrap_or(&[])
    }
}
