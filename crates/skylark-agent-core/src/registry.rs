use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use skylark_ai::{AiError, ToolDecl};
use tracing::warn;

use crate::flights::SearchOutcome;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateTool(String),
    UnknownTool(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicateTool(name) => {
                write!(f, "Tool {name} is already registered")
            }
            RegistryError::UnknownTool(name) => write!(f, "Tool {name} is not registered"),
        }
    }
}

impl std::error::Error for RegistryError {}

pub type ToolFuture = Pin<Box<dyn Future<Output = Result<SearchOutcome, AiError>> + Send>>;

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn invoke(&self, args: Value) -> Result<SearchOutcome, AiError>;
}

#[async_trait]
impl<F> ToolExecutor for F
where
    F: Fn(Value) -> ToolFuture + Send + Sync + 'static,
{
    async fn invoke(&self, args: Value) -> Result<SearchOutcome, AiError> {
        (self)(args).await
    }
}

pub type ToolExecuteFn = Arc<dyn ToolExecutor>;

/// One registered capability: advisory schema plus the function that backs it.
/// Immutable after registration.
#[derive(Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub execute: ToolExecuteFn,
}

impl ToolSpec {
    pub fn to_decl(&self) -> ToolDecl {
        ToolDecl {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }

    /// Invokes the executor and folds transport-level failures into an
    /// `{error}` outcome, so adapter failures travel back through the
    /// conversation instead of aborting the run.
    pub async fn run(&self, args: Value) -> SearchOutcome {
        match self.execute.invoke(args).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(
                    tool = self.name.as_str(),
                    error = error.message.as_str(),
                    "tool execution failed"
                );
                SearchOutcome::error(error.message)
            }
        }
    }
}

/// Process-wide dispatch table, built once before the first dialogue and
/// never mutated afterwards.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ToolSpec) -> Result<(), RegistryError> {
        if self.lookup(&spec.name).is_some() {
            return Err(RegistryError::DuplicateTool(spec.name));
        }
        self.tools.push(spec);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    /// Declarations for the subset of tools offered on one upcoming turn.
    /// Fails if any name is unregistered.
    pub fn offer(&self, names: &[&str]) -> Result<Vec<ToolDecl>, RegistryError> {
        names
            .iter()
            .map(|name| {
                self.lookup(name)
                    .map(ToolSpec::to_decl)
                    .ok_or_else(|| RegistryError::UnknownTool((*name).to_string()))
            })
            .collect()
    }
}
