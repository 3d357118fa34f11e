use thiserror::Error;

/// Failure talking to the Resource Store or the Blob Store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("failed to serialize collection: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A mutation was rejected before touching persisted state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("id must not be empty")]
    EmptyId,
    #[error("name must not be empty")]
    EmptyName,
    #[error("expected positions for {expected} plans, found {found}")]
    PlanCount { expected: usize, found: usize },
    #[error("plan {plan} has {found} vertices, an area needs at least 3")]
    TooFewVertices { plan: usize, found: usize },
    #[error("plan {plan} has no position")]
    MissingPosition { plan: usize },
    #[error("coordinate ({dx}, {dy}) on plan {plan} is outside the plan")]
    OutOfBounds { plan: usize, dx: f64, dy: f64 },
    #[error("plan index {0} does not exist")]
    UnknownPlan(usize),
    #[error("username {0} is already taken")]
    DuplicateUsername(String),
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("{0} is the last admin")]
    LastAdmin(String),
}

/// Error returned by repository and user directory operations.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("not allowed to {action}")]
    Unauthorized { action: &'static str },
    #[error("{0} not found")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: invalid plan size {value:?}, expected <width>x<height>")]
    InvalidPlanSize { var: &'static str, value: String },
    #[error("{0}: at least one plan is required")]
    NoPlans(&'static str),
}
