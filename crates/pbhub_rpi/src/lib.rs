//!Raspberry Pi I2C buses for PbHub modules. A wrapper around the rppal library.
//!
//! `get_bus` opens a bus that can be handed to `pbhub_devices::pbhub::PbHubDevice`.

//internal error type for rpi buses
pub mod error;

use error::RpiI2cError;
use tracing::debug;

pub use rppal::i2c::I2c;

//get i2c bus by id
pub fn get_bus(bus: u8) -> Result<I2c, RpiI2cError> {
    let i2c = I2c::with_bus(bus)?;
    debug!("opened i2c bus {} at {} Hz", bus, i2c.clock_speed()?);
    Ok(i2c)
}

//get default i2c bus
pub fn get_default_bus() -> Result<I2c, RpiI2cError> {
    Ok(I2c::new()?)
}
