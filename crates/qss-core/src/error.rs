use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Invalid tolerance: {what} = {value} (must be finite and >= 0)")]
    InvalidTolerance { what: &'static str, value: f64 },

    #[error("Index out of bounds: {what} (index={index}, len={len})")]
    IndexOob {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Unsupported operation: {operation} is not defined for {type_name}")]
    UnsupportedOperation {
        operation: &'static str,
        type_name: &'static str,
    },

    #[error("Invariant violated: {what}")]
    Invariant { what: &'static str },
}
