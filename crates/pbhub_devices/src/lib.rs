//!Drivers for I2C devices used with the PbHub workspace.
//!
//! Drivers talk to hardware through the `embedded_hal::i2c::I2c` trait, so any bus that implements it
//! (rppal on a Raspberry Pi, the simulated hub in `pbhub_sims`, a test fake) can be used.

pub mod error;

///The M5Stack PbHub is an I2C expansion hub with six slots. Each slot exposes two digital/PWM/servo
///channels, an ADC input and an addressable LED strip output.
pub mod pbhub;
