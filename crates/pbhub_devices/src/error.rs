//!Errors returned by the PbHub driver.
use embedded_hal::i2c::ErrorKind;
use pbhub_core::error::BuildError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PbHubError {
    ///A slot, pin, address or LED count outside what the hub supports. Detected before any bus access.
    #[error("{what} {value} is out of range (max {max})")]
    OutOfRange {
        what: &'static str,
        value: u32,
        max: u32,
    },

    ///A GPIO operation before a mode was configured, or an invalid mode combination.
    #[error("invalid mode: {0}")]
    InvalidMode(String),

    ///An operation that does not match the configured mode, e.g. writing an input pin.
    #[error("pin {pin} is configured as {mode}, cannot {operation}")]
    WrongMode {
        pin: u8,
        mode: &'static str,
        operation: &'static str,
    },

    ///An RGB buffer whose length differs from the LED count configured for the slot.
    #[error("expected {expected} colors, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    ///The transport failed. Possibly transient.
    #[error("bus error talking to 0x{address:02X} register 0x{register:02X}: {kind}")]
    Bus {
        address: u8,
        register: u8,
        kind: ErrorKind,
    },

    ///The ADC reported that no sample was ready.
    #[error("slot {slot} ADC returned a not-ready marker")]
    StaleData { slot: u8 },
}

impl PbHubError {
    ///Errors worth retrying. Everything else is a configuration problem.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Bus { .. } | Self::StaleData { .. })
    }
}

impl From<PbHubError> for BuildError {
    fn from(err: PbHubError) -> Self {
        BuildError::from_string(format!("PbHub: {}", err))
    }
}
