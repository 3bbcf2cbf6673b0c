mod adc;
mod gpio;
mod hub;
mod module;
mod output;
pub mod registers;
mod rgb;

#[cfg(test)]
mod mock;

pub use adc::{AdcChannel, AdcFilter, AdcHealth, AdcPoller, DEFAULT_FAILURE_THRESHOLD};
pub use gpio::{spawn_gpio_input_task, spawn_gpio_output_task, GpioPinBinding, PinModeConfig};
pub use hub::{encode_duty, HubDevice, PinMode, SERVO_MAX_ANGLE, SERVO_MAX_PULSE_US, SERVO_MIN_PULSE_US};
pub use module::{PbHubDevice, PbHubDeviceBuilder, PbHubDeviceConfig, PbHubItemConfig};
pub use output::{spawn_float_output_task, FloatWrite, PwmChannel, ServoChannel};
pub use registers::{HubAddress, PinNumber, SlotIndex};
pub use rgb::{spawn_rgb_output_task, RgbChannel};
