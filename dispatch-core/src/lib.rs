pub mod events;
pub mod language;
pub mod money;
pub mod notification;
pub mod repository;
pub mod validation;

pub use language::Language;
pub use money::{Amount, AmountInput};
pub use repository::RepoError;
pub use validation::{ValidationError, ValidationErrors};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("Repository error: {0}")]
    Repository(#[from] RepoError),
    #[error("Internal service error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
