use thiserror::Error;
use crate::drivers::units::Kind;
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeneratorError {
    #[error("unit '{unit}' is not a {kind:?} unit")]
    InvalidUnit { unit: String, kind: Kind },
    #[error("harmonic order {0} is outside 2..=8")]
    InvalidHarmonicOrder(u8),
    #[error("{mode} must be greater than zero, got {value}")]
    NonPositiveRate { value: f64, mode: &'static str },
    #[error("cannot parse '{0}' as a number")]
    Unparsable(String),
    #[error("device communication failed: {0}")]
    Transport(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}
impl GeneratorError {
    /// True for the errors a caller recovers from by keeping its last good value.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            GeneratorError::InvalidUnit { .. }
                | GeneratorError::InvalidHarmonicOrder(_)
                | GeneratorError::NonPositiveRate { .. }
                | GeneratorError::Unparsable(_)
        )
    }
}
impl From<std::io::Error> for GeneratorError {
    fn from(value: std::io::Error) -> Self {
        GeneratorError::Transport(value.to_string())
    }
}
impl From<serialport::Error> for GeneratorError {
    fn from(value: serialport::Error) -> Self {
        GeneratorError::Transport(value.to_string())
    }
}
