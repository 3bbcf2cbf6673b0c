//!An in-memory PbHub. `SimulatedPbHub` implements `embedded_hal::i2c::I2c` and answers the hub's register map, so
//! the driver and the application can run without hardware.
//!
//! Digital outputs loop back to the matching digital input unless a level was forced with `set_digital_input`.
//! Analog inputs random-walk within the 12-bit range on every read.

use std::sync::{Arc, Mutex, MutexGuard};

use embedded_hal::i2c::{self, ErrorKind, ErrorType, NoAcknowledgeSource, Operation};
use pbhub_core::Rgb;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Deserialize;
use tracing::{debug, trace};

const SLOT_COUNT: usize = 6;
const ADC_MAX: u16 = 0x0FFF;
const MAX_LEDS: usize = 1024;

const LED_SHOW_MODE: u8 = 0xFA;
const FW_VERSION: u8 = 0xFE;

fn default_address() -> u8 {
    0x61
}

fn default_firmware_version() -> u8 {
    2
}

fn default_analog_step() -> u16 {
    8
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulatedPbHubConfig {
    #[serde(default = "default_address")]
    pub address: u8,
    #[serde(default = "default_firmware_version")]
    pub firmware_version: u8,
    ///Largest change of an analog value between two reads.
    #[serde(default = "default_analog_step")]
    pub analog_step: u16,
    ///Fixes the random walk. Seeded from the OS when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulatedPbHubConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            firmware_version: default_firmware_version(),
            analog_step: default_analog_step(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimError(pub ErrorKind);

impl i2c::Error for SimError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

#[derive(Debug, Clone, Default)]
struct SimChannel {
    digital_out: bool,
    digital_in: Option<bool>,
    pwm: u8,
    servo_angle: u8,
    servo_pulse: u16,
}

#[derive(Debug, Clone)]
struct SimSlot {
    channels: [SimChannel; 2],
    analog: u16,
    led_count: u16,
    leds: Vec<Rgb>,
    brightness: u8,
}

impl Default for SimSlot {
    fn default() -> Self {
        Self {
            channels: Default::default(),
            analog: ADC_MAX / 2,
            led_count: 0,
            leds: Vec::new(),
            brightness: 0,
        }
    }
}

struct SimState {
    cfg: SimulatedPbHubConfig,
    slots: [SimSlot; SLOT_COUNT],
    led_show_mode: u8,
    rng: StdRng,
}

enum Target {
    Slot { slot: usize, channel: usize, offset: u8 },
    Global(u8),
}

fn decode(register: u8) -> Option<Target> {
    let slot = match register & 0xF0 {
        0x40 => 0,
        0x50 => 1,
        0x60 => 2,
        0x70 => 3,
        0x80 => 4,
        0xA0 => 5,
        _ => {
            return match register {
                LED_SHOW_MODE | FW_VERSION => Some(Target::Global(register)),
                _ => None,
            }
        }
    };
    let offset = register & 0x0F;
    let channel = match offset {
        //per-channel registers come in A/B pairs
        0x00..=0x05 | 0x0C..=0x0F => (offset & 0x01) as usize,
        _ => 0,
    };
    Some(Target::Slot { slot, channel, offset })
}

impl SimState {
    fn write(&mut self, register: u8, data: &[u8]) -> Result<(), ErrorKind> {
        match decode(register).ok_or(ErrorKind::Other)? {
            Target::Global(LED_SHOW_MODE) => {
                self.led_show_mode = *data.first().ok_or(ErrorKind::Other)?;
            }
            Target::Global(_) => return Err(ErrorKind::Other),
            Target::Slot { slot, channel, offset } => {
                let slot = &mut self.slots[slot];
                match (offset, data) {
                    (0x00 | 0x01, [level]) => slot.channels[channel].digital_out = *level & 0x01 != 0,
                    (0x02 | 0x03, [duty]) => slot.channels[channel].pwm = *duty,
                    (0x08, [lo, hi]) => {
                        let count = u16::from_le_bytes([*lo, *hi]);
                        if count as usize > MAX_LEDS {
                            return Err(ErrorKind::Other);
                        }
                        slot.led_count = count;
                        slot.leds.resize(count as usize, Rgb::BLACK);
                    }
                    (0x09, [lo, hi, r, g, b]) => {
                        let index = u16::from_le_bytes([*lo, *hi]) as usize;
                        let led = slot.leds.get_mut(index).ok_or(ErrorKind::Other)?;
                        *led = Rgb::new(*r, *g, *b);
                    }
                    (0x0A, [start_lo, start_hi, count_lo, count_hi, r, g, b]) => {
                        let start = u16::from_le_bytes([*start_lo, *start_hi]) as usize;
                        let count = u16::from_le_bytes([*count_lo, *count_hi]) as usize;
                        let end = (start + count).min(slot.leds.len());
                        for led in slot.leds.iter_mut().take(end).skip(start) {
                            *led = Rgb::new(*r, *g, *b);
                        }
                    }
                    (0x0B, [value]) => slot.brightness = *value,
                    (0x0C | 0x0D, [angle]) => slot.channels[channel].servo_angle = (*angle).min(180),
                    (0x0E | 0x0F, [lo, hi]) => slot.channels[channel].servo_pulse = u16::from_le_bytes([*lo, *hi]),
                    _ => return Err(ErrorKind::Other),
                }
            }
        }
        Ok(())
    }

    fn read(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), ErrorKind> {
        let bytes: Vec<u8> = match decode(register).ok_or(ErrorKind::Other)? {
            Target::Global(LED_SHOW_MODE) => vec![self.led_show_mode],
            Target::Global(_) => vec![self.cfg.firmware_version],
            Target::Slot { slot: index, channel, offset } => {
                let step = self.cfg.analog_step as i32;
                let slot = &mut self.slots[index];
                match offset {
                    0x04 | 0x05 => {
                        let ch = &slot.channels[channel];
                        vec![ch.digital_in.unwrap_or(ch.digital_out) as u8]
                    }
                    0x06 => {
                        let delta = self.rng.gen_range(-step..=step);
                        slot.analog = (slot.analog as i32 + delta).clamp(0, ADC_MAX as i32) as u16;
                        trace!("sim slot {} analog -> {}", index, slot.analog);
                        slot.analog.to_le_bytes().to_vec()
                    }
                    0x08 => slot.led_count.to_le_bytes().to_vec(),
                    0x0B => vec![slot.brightness],
                    _ => return Err(ErrorKind::Other),
                }
            }
        };
        if bytes.len() != buffer.len() {
            return Err(ErrorKind::Other);
        }
        buffer.copy_from_slice(&bytes);
        Ok(())
    }
}

///Clones share one register file, so a test or a UI can inspect and drive the hub the driver is using.
#[derive(Clone)]
pub struct SimulatedPbHub {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedPbHub {
    pub fn new(cfg: SimulatedPbHubConfig) -> Self {
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        debug!("simulated PbHub at 0x{:02X}, firmware {}", cfg.address, cfg.firmware_version);
        Self {
            state: Arc::new(Mutex::new(SimState {
                cfg,
                slots: Default::default(),
                led_show_mode: 0,
                rng,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn with_slot<R>(&self, slot: usize, f: impl FnOnce(&mut SimSlot) -> R) -> Option<R> {
        self.lock().slots.get_mut(slot).map(f)
    }

    fn with_channel<R>(&self, slot: usize, channel: usize, f: impl FnOnce(&mut SimChannel) -> R) -> Option<R> {
        self.with_slot(slot, |s| s.channels.get_mut(channel).map(f)).flatten()
    }

    pub fn address(&self) -> u8 {
        self.lock().cfg.address
    }

    ///Forces the level seen by digital reads of a channel. `None` restores loopback. Returns false when the slot or
    ///channel does not exist.
    pub fn set_digital_input(&self, slot: usize, channel: usize, level: Option<bool>) -> bool {
        self.with_channel(slot, channel, |c| c.digital_in = level).is_some()
    }

    pub fn digital_output(&self, slot: usize, channel: usize) -> Option<bool> {
        self.with_channel(slot, channel, |c| c.digital_out)
    }

    pub fn pwm(&self, slot: usize, channel: usize) -> Option<u8> {
        self.with_channel(slot, channel, |c| c.pwm)
    }

    pub fn servo_angle(&self, slot: usize, channel: usize) -> Option<u8> {
        self.with_channel(slot, channel, |c| c.servo_angle)
    }

    ///Moves the analog value; the random walk continues from here. Returns false for a missing slot.
    pub fn set_analog(&self, slot: usize, value: u16) -> bool {
        self.with_slot(slot, |s| s.analog = value.min(ADC_MAX)).is_some()
    }

    pub fn leds(&self, slot: usize) -> Option<Vec<Rgb>> {
        self.with_slot(slot, |s| s.leds.clone())
    }

    pub fn led_brightness(&self, slot: usize) -> Option<u8> {
        self.with_slot(slot, |s| s.brightness)
    }
}

impl ErrorType for SimulatedPbHub {
    type Error = SimError;
}

impl i2c::I2c for SimulatedPbHub {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        let mut state = self.lock();
        if address != state.cfg.address {
            return Err(SimError(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)));
        }
        let mut register = None;
        for op in operations {
            match op {
                Operation::Write(bytes) => {
                    let (reg, data) = bytes
                        .split_first()
                        .ok_or(SimError(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data)))?;
                    register = Some(*reg);
                    if !data.is_empty() {
                        state.write(*reg, data).map_err(SimError)?;
                    }
                }
                Operation::Read(buffer) => {
                    let reg = register.ok_or(SimError(ErrorKind::Other))?;
                    state.read(reg, buffer).map_err(SimError)?;
                }
            }
        }
        Ok(())
    }
}
