use std::fmt::{Debug, Display, Formatter};

use pbhub_core::error::BuildError;

pub struct RpiI2cError {
    pub message: String,
}

impl Debug for RpiI2cError {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        fmt.write_str(&self.message)
    }
}

impl Display for RpiI2cError {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        fmt.write_str(&self.message)
    }
}

impl From<String> for RpiI2cError {
    fn from(s: String) -> Self {
        Self { message: s }
    }
}

impl From<rppal::i2c::Error> for RpiI2cError {
    fn from(err: rppal::i2c::Error) -> Self {
        Self {
            message: format!("RpiI2cError - Cause: {}", err),
        }
    }
}

impl From<RpiI2cError> for BuildError {
    fn from(err: RpiI2cError) -> Self {
        BuildError::from_string(err.message)
    }
}
