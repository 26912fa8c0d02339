/// Errors raised while fitting, resampling or inferring kinetic parameters.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("insufficient data: {valid} valid observations, at least {required} required")]
    InsufficientData { valid: usize, required: usize },

    #[error("principal axis has no extent along x, the slope is undefined")]
    DegenerateAxis,

    #[error("kinetic record is incomplete, missing: {}", missing.join(", "))]
    IncompleteRecord { missing: Vec<&'static str> },

    #[error("required field `{0}` is missing")]
    MissingField(String),

    #[error("paired inputs differ in length: {left} != {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("solver failed: {0}")]
    Solver(String),

    #[error("distribution could not be constructed: {0}")]
    Distribution(String),

    #[error(transparent)]
    Linalg(#[from] ndarray_linalg::error::LinalgError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub(crate) const fn insufficient(valid: usize) -> Self {
        Self::InsufficientData { valid, required: 2 }
    }
}
