use thiserror::Error;

use crate::application::repos::{ConflictDetails, RepoError};
use crate::config::LoadError;
use crate::domain::entities::ItemId;
use crate::infra::error::InfraError;

/// Why a mutation did not settle. The cache has been rolled back in every case.
#[derive(Debug, Error)]
pub enum MutationError {
    #[error("write failed: {0}")]
    TransientWriteFailure(#[source] RepoError),
    #[error("version conflict on `{}`", .id.as_ref().map_or("<new>", ItemId::as_str))]
    VersionConflict {
        id: Option<ItemId>,
        details: ConflictDetails,
    },
    #[error("mutation task was shut down before it settled")]
    Interrupted,
}

impl MutationError {
    /// Classify a write failure. Conflicts keep the server payload untouched.
    pub fn from_repo(id: Option<&ItemId>, error: RepoError) -> Self {
        match error {
            RepoError::Conflict(details) => Self::VersionConflict {
                id: id.cloned(),
                details,
            },
            other => Self::TransientWriteFailure(other),
        }
    }

    pub fn outcome_label(&self) -> &'static str {
        match self {
            MutationError::TransientWriteFailure(_) => "failed",
            MutationError::VersionConflict { .. } => "conflict",
            MutationError::Interrupted => "interrupted",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error("validation failed: {0}")]
    Validation(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
