/// Stackwise Error Types
#[derive(Debug, thiserror::Error)]
pub enum StackwiseError {
    /// Git-related errors
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bad arguments or values supplied by the user
    #[error("Validation error: {0}")]
    Validation(String),

    /// The repository is not in a state where the operation may start
    #[error("{0}")]
    Precondition(String),

    /// The recorded branch relationships are malformed
    #[error("Structural error: {0}")]
    Structural(String),

    /// A branch or record could not be found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rebase operation errors
    #[error("Rebase error: {0}")]
    Rebase(String),

    /// Push operation errors
    #[error("Push error: {0}")]
    Push(String),

    /// An external operation failed while working on a specific branch
    #[error("Failed to {action} branch '{branch}': {source}")]
    BranchOperation {
        action: &'static str,
        branch: String,
        #[source]
        source: Box<StackwiseError>,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StackwiseError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        StackwiseError::Config(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        StackwiseError::Validation(msg.into())
    }

    pub fn precondition<S: Into<String>>(msg: S) -> Self {
        StackwiseError::Precondition(msg.into())
    }

    pub fn structural<S: Into<String>>(msg: S) -> Self {
        StackwiseError::Structural(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        StackwiseError::NotFound(msg.into())
    }

    pub fn rebase<S: Into<String>>(msg: S) -> Self {
        StackwiseError::Rebase(msg.into())
    }

    pub fn push<S: Into<String>>(msg: S) -> Self {
        StackwiseError::Push(msg.into())
    }

    /// Wrap an external failure with the branch it happened on
    pub fn on_branch<S: Into<String>>(action: &'static str, branch: S, source: StackwiseError) -> Self {
        StackwiseError::BranchOperation {
            action,
            branch: branch.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error (or the error it wraps) is a dirty-workspace or
    /// other precondition refusal
    pub fn is_precondition(&self) -> bool {
        match self {
            StackwiseError::Precondition(_) => true,
            StackwiseError::BranchOperation { source, .. } => source.is_precondition(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StackwiseError>;
