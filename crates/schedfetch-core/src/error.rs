use std::fmt;

use thiserror::Error;

use crate::aggregate::AggregateError;
use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::extract::ResponseError;
use crate::gateway::GatewayError;
use crate::output::StorageError;
use crate::template::TemplateError;

/// Classification attached to failed outcomes and error log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Catalog,
    Template,
    Gateway { retriable: bool },
    Response,
    Storage,
    Aggregate,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "ConfigError",
            ErrorKind::Catalog => "CatalogError",
            ErrorKind::Template => "TemplateError",
            ErrorKind::Gateway { .. } => "GatewayError",
            ErrorKind::Response => "ResponseError",
            ErrorKind::Storage => "StorageError",
            ErrorKind::Aggregate => "AggregateError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Gateway { retriable } => {
                write!(f, "{}(retriable={})", self.as_str(), retriable)
            }
            _ => f.write_str(self.as_str()),
        }
    }
}

/// Failure of a single topic. Never propagates past the topic boundary.
#[derive(Debug, Error)]
pub enum TopicError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Response(#[from] ResponseError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TopicError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TopicError::Template(_) => ErrorKind::Template,
            TopicError::Gateway(err) => ErrorKind::Gateway {
                retriable: err.retriable,
            },
            TopicError::Response(_) => ErrorKind::Response,
            TopicError::Storage(_) => ErrorKind::Storage,
        }
    }
}

/// Errors that end a run in the `Failed` state.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("output directory unavailable: {0}")]
    Storage(#[from] StorageError),
    #[error("aggregate build failed: {0}")]
    Aggregate(#[from] AggregateError),
}

impl RunError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunError::Config(_) => ErrorKind::Config,
            RunError::Catalog(_) => ErrorKind::Catalog,
            RunError::Storage(_) => ErrorKind::Storage,
            RunError::Aggregate(_) => ErrorKind::Aggregate,
        }
    }
}
