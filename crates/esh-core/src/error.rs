use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown {quantity} unit: '{unit}'")]
    UnknownUnit { unit: String, quantity: &'static str },

    #[error("Currency '{native}' cannot be mapped onto declared currency '{declared}'")]
    CurrencyMismatch { native: String, declared: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
