use std::sync::{Mutex, MutexGuard};

use embedded_hal::i2c::{self, Error as _};
use pbhub_core::Rgb;
use tracing::{debug, warn};

use super::registers::{
    global_register, pin_register, slot_register, GlobalFunction, HubAddress, PinFunction, PinNumber, Register,
    SlotFunction, SlotIndex, ADC_NOT_READY, MAX_LED_COUNT, SLOT_COUNT,
};
use crate::error::PbHubError;

pub const SERVO_MAX_ANGLE: u8 = 180;
pub const SERVO_MIN_PULSE_US: u16 = 500;
pub const SERVO_MAX_PULSE_US: u16 = 2500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

impl PinMode {
    ///Exactly one of `input` and `output` must be set.
    pub fn from_flags(input: bool, output: bool) -> Result<Self, PbHubError> {
        match (input, output) {
            (true, false) => Ok(Self::Input),
            (false, true) => Ok(Self::Output),
            (true, true) => Err(PbHubError::InvalidMode(
                "only one of 'input' or 'output' can be set".to_string(),
            )),
            (false, false) => Err(PbHubError::InvalidMode(
                "one of 'input' or 'output' must be set".to_string(),
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

struct Bus<I2C> {
    i2c: I2C,
    led_counts: [Option<u16>; SLOT_COUNT as usize],
}

///One PbHub on an I2C bus.
///
/// Every register access locks the hub, so pins, pollers and LED writers that share an `Arc<HubDevice>` never
/// interleave their transactions. Multi-transaction operations (an RGB frame, an ADC retry) hold the lock for
/// their whole sequence.
pub struct HubDevice<I2C> {
    address: HubAddress,
    bus: Mutex<Bus<I2C>>,
}

impl<I2C> HubDevice<I2C>
where
    I2C: i2c::I2c,
{
    pub fn new(i2c: I2C, address: HubAddress) -> Self {
        Self {
            address,
            bus: Mutex::new(Bus {
                i2c,
                led_counts: [None; SLOT_COUNT as usize],
            }),
        }
    }

    pub fn address(&self) -> HubAddress {
        self.address
    }

    fn lock(&self) -> MutexGuard<'_, Bus<I2C>> {
        match self.bus.lock() {
            Ok(bus) => bus,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_locked(&self, bus: &mut Bus<I2C>, register: Register, payload: &[u8]) -> Result<(), PbHubError> {
        debug_assert_eq!(payload.len(), register.len);
        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.push(register.address);
        frame.extend_from_slice(payload);
        bus.i2c
            .write(self.address.get(), &frame)
            .map_err(|err| self.bus_error(register, err))
    }

    fn read_locked(&self, bus: &mut Bus<I2C>, register: Register, buffer: &mut [u8]) -> Result<(), PbHubError> {
        debug_assert_eq!(buffer.len(), register.len);
        bus.i2c
            .write_read(self.address.get(), &[register.address], buffer)
            .map_err(|err| self.bus_error(register, err))
    }

    fn bus_error(&self, register: Register, err: I2C::Error) -> PbHubError {
        PbHubError::Bus {
            address: self.address.get(),
            register: register.address,
            kind: err.kind(),
        }
    }

    fn write(&self, register: Register, payload: &[u8]) -> Result<(), PbHubError> {
        let mut bus = self.lock();
        self.write_locked(&mut bus, register, payload)
    }

    fn read<const N: usize>(&self, register: Register) -> Result<[u8; N], PbHubError> {
        let mut buffer = [0u8; N];
        let mut bus = self.lock();
        self.read_locked(&mut bus, register, &mut buffer)?;
        Ok(buffer)
    }

    // -------- GPIO --------

    ///Selects the direction of a channel. The hub switches direction on access: writing the inactive level makes
    ///the channel an output, reading it makes it an input.
    pub fn configure_mode(&self, pin: PinNumber, mode: PinMode, inverted: bool) -> Result<(), PbHubError> {
        debug!(
            "pin_mode pin {} (slot={} idx={}) -> {} inverted={}",
            pin.get(),
            pin.slot().get(),
            pin.index(),
            mode.as_str(),
            inverted
        );
        match mode {
            PinMode::Output => self.digital_write(pin, inverted),
            PinMode::Input => self.digital_read(pin).map(|_| ()),
        }
    }

    ///Raw wire level. Inversion is the caller's concern.
    pub fn digital_read(&self, pin: PinNumber) -> Result<bool, PbHubError> {
        let register = pin_register(pin, PinFunction::DigitalRead);
        let [value] = self.read::<1>(register)?;
        let state = value & 0x01 != 0;
        debug!(
            "DREAD pin {} (slot={} idx={}) <- {} (reg=0x{:02X} val=0x{:02X})",
            pin.get(),
            pin.slot().get(),
            pin.index(),
            if state { "ON" } else { "OFF" },
            register.address,
            value
        );
        Ok(state)
    }

    ///Raw wire level. Inversion is the caller's concern.
    pub fn digital_write(&self, pin: PinNumber, value: bool) -> Result<(), PbHubError> {
        let register = pin_register(pin, PinFunction::DigitalWrite);
        debug!(
            "DWRITE pin {} (slot={} idx={}) -> {} (reg=0x{:02X})",
            pin.get(),
            pin.slot().get(),
            pin.index(),
            if value { "ON" } else { "OFF" },
            register.address
        );
        self.write(register, &[value as u8])
    }

    // -------- ADC --------

    ///Reads the slot's 12-bit sample. A bus failure or a not-ready answer is retried once before it is returned.
    pub fn adc_read(&self, slot: SlotIndex) -> Result<u16, PbHubError> {
        let register = slot_register(slot, SlotFunction::AnalogRead);
        let mut bus = self.lock();
        match self.adc_read_once(&mut bus, slot, register) {
            Err(err) if err.is_transient() => {
                debug!("AREAD slot={} failed ({}), retrying once", slot.get(), err);
                self.adc_read_once(&mut bus, slot, register)
            }
            res => res,
        }
    }

    fn adc_read_once(&self, bus: &mut Bus<I2C>, slot: SlotIndex, register: Register) -> Result<u16, PbHubError> {
        let mut buffer = [0u8; 2];
        self.read_locked(bus, register, &mut buffer)?;
        let value = u16::from_le_bytes(buffer);
        if value == ADC_NOT_READY {
            return Err(PbHubError::StaleData { slot: slot.get() });
        }
        debug!(
            "AREAD slot={} <- {} (reg=0x{:02X} raw={:02X} {:02X})",
            slot.get(),
            value,
            register.address,
            buffer[0],
            buffer[1]
        );
        Ok(value)
    }

    // -------- PWM / servo --------

    ///Writes a duty cycle, clamped to [0, 1], as one byte. Returns the encoded byte.
    pub fn pwm_write(&self, pin: PinNumber, duty_cycle: f64) -> Result<u8, PbHubError> {
        let duty = encode_duty(duty_cycle);
        let register = pin_register(pin, PinFunction::Pwm);
        debug!(
            "PWM pin {} (slot={} idx={}) duty={} (reg=0x{:02X})",
            pin.get(),
            pin.slot().get(),
            pin.index(),
            duty,
            register.address
        );
        self.write(register, &[duty])?;
        Ok(duty)
    }

    pub fn servo_write_angle(&self, pin: PinNumber, angle: u8) -> Result<u8, PbHubError> {
        let angle = angle.min(SERVO_MAX_ANGLE);
        let register = pin_register(pin, PinFunction::ServoAngle);
        debug!("SERVO pin {} angle={} (reg=0x{:02X})", pin.get(), angle, register.address);
        self.write(register, &[angle])?;
        Ok(angle)
    }

    pub fn servo_write_pulse(&self, pin: PinNumber, micros: u16) -> Result<u16, PbHubError> {
        let micros = micros.clamp(SERVO_MIN_PULSE_US, SERVO_MAX_PULSE_US);
        let register = pin_register(pin, PinFunction::ServoPulse);
        debug!("SERVO pin {} pulse={}us (reg=0x{:02X})", pin.get(), micros, register.address);
        self.write(register, &micros.to_le_bytes())?;
        Ok(micros)
    }

    // -------- RGB --------

    ///Sets the number of LEDs on a slot's strip and remembers it for `rgb_write`.
    pub fn set_led_count(&self, slot: SlotIndex, count: u16) -> Result<(), PbHubError> {
        check_led_count(count)?;
        let register = slot_register(slot, SlotFunction::LedCount);
        let mut bus = self.lock();
        self.write_locked(&mut bus, register, &count.to_le_bytes())?;
        bus.led_counts[slot.get() as usize] = Some(count);
        debug!("LED_NUM slot={} count={} (reg=0x{:02X})", slot.get(), count, register.address);
        Ok(())
    }

    pub fn led_count(&self, slot: SlotIndex) -> Option<u16> {
        self.lock().led_counts[slot.get() as usize]
    }

    ///Writes a whole frame. `colors` must hold exactly one color per configured LED.
    pub fn rgb_write(&self, slot: SlotIndex, colors: &[Rgb]) -> Result<(), PbHubError> {
        let mut bus = self.lock();
        let expected = match bus.led_counts[slot.get() as usize] {
            Some(count) => count as usize,
            None => {
                return Err(PbHubError::InvalidMode(format!(
                    "slot {} has no LED count configured",
                    slot.get()
                )))
            }
        };
        if colors.len() != expected {
            return Err(PbHubError::LengthMismatch {
                expected,
                actual: colors.len(),
            });
        }

        let first = colors[0];
        if colors.iter().all(|c| *c == first) {
            return self.fill_locked(&mut bus, slot, 0, expected as u16, first);
        }

        let register = slot_register(slot, SlotFunction::LedColor);
        for (index, color) in colors.iter().enumerate() {
            let [lo, hi] = (index as u16).to_le_bytes();
            self.write_locked(&mut bus, register, &[lo, hi, color.r, color.g, color.b])?;
        }
        debug!("LED_COLOR slot={} wrote {} colors (reg=0x{:02X})", slot.get(), expected, register.address);
        Ok(())
    }

    pub fn fill_led_color(&self, slot: SlotIndex, start: u16, count: u16, color: Rgb) -> Result<(), PbHubError> {
        let mut bus = self.lock();
        self.fill_locked(&mut bus, slot, start, count, color)
    }

    fn fill_locked(
        &self,
        bus: &mut Bus<I2C>,
        slot: SlotIndex,
        start: u16,
        count: u16,
        color: Rgb,
    ) -> Result<(), PbHubError> {
        let end = start as u32 + count as u32;
        if end > MAX_LED_COUNT as u32 {
            return Err(PbHubError::OutOfRange {
                what: "led range end",
                value: end,
                max: MAX_LED_COUNT as u32,
            });
        }
        let register = slot_register(slot, SlotFunction::LedFill);
        let [start_lo, start_hi] = start.to_le_bytes();
        let [count_lo, count_hi] = count.to_le_bytes();
        debug!(
            "LED_FILL slot={} start={} count={} color=({},{},{}) (reg=0x{:02X})",
            slot.get(),
            start,
            count,
            color.r,
            color.g,
            color.b,
            register.address
        );
        self.write_locked(
            bus,
            register,
            &[start_lo, start_hi, count_lo, count_hi, color.r, color.g, color.b],
        )
    }

    pub fn set_led_brightness(&self, slot: SlotIndex, value: u8) -> Result<(), PbHubError> {
        let register = slot_register(slot, SlotFunction::LedBrightness);
        debug!("LED_BRIGHTNESS slot={} value={} (reg=0x{:02X})", slot.get(), value, register.address);
        self.write(register, &[value])
    }

    pub fn set_led_show_mode(&self, mode: u8) -> Result<(), PbHubError> {
        let register = global_register(GlobalFunction::LedShowMode);
        debug!("LED_SHOW_MODE mode={} (reg=0x{:02X})", mode, register.address);
        self.write(register, &[mode])
    }

    pub fn led_show_mode(&self) -> Result<u8, PbHubError> {
        let [mode] = self.read::<1>(global_register(GlobalFunction::LedShowMode))?;
        Ok(mode)
    }

    // -------- device --------

    pub fn firmware_version(&self) -> Result<u8, PbHubError> {
        let register = global_register(GlobalFunction::FirmwareVersion);
        match self.read::<1>(register) {
            Ok([version]) => {
                debug!("firmware version {} (reg=0x{:02X})", version, register.address);
                Ok(version)
            }
            Err(err) => {
                warn!("FW_VERSION read failed: {}", err);
                Err(err)
            }
        }
    }
}

pub(crate) fn check_led_count(count: u16) -> Result<(), PbHubError> {
    if count == 0 || count > MAX_LED_COUNT {
        Err(PbHubError::OutOfRange {
            what: "led count",
            value: count as u32,
            max: MAX_LED_COUNT as u32,
        })
    } else {
        Ok(())
    }
}

///Clamps to [0, 1] and scales to a byte. NaN encodes as 0.
pub fn encode_duty(duty_cycle: f64) -> u8 {
    if duty_cycle.is_nan() {
        0
    } else {
        (duty_cycle.clamp(0.0, 1.0) * 255.0).round() as u8
    }
}
