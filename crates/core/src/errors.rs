use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("arithmetic guard tripped: {reason}")]
    ArithmeticGuard { reason: String },
    #[error("unknown order status `{0}`")]
    UnknownStatus(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("financing plan not found: {reference}")]
    PlanNotFound { reference: String },
    #[error("product not found: {0}")]
    ProductNotFound(String),
    #[error("order not found: {0}")]
    OrderNotFound(String),
    #[error("group not found: {0}")]
    GroupNotFound(String),
    #[error("repository unavailable: {0}")]
    Repository(String),
}

impl ApplicationError {
    /// Whether a caller may recover by retrying or by falling back to the
    /// local quote table. Only transient repository failures qualify; quote
    /// previews may substitute the fallback for these, order creation never
    /// does.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Repository(_))
    }
}
