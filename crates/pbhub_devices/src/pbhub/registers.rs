//! Register map of the PbHub (firmware v1.1).
//!
//! Every slot has a base register (`0x40`, `0x50`, `0x60`, `0x70`, `0x80`, `0xA0`). A function
//! offset is ORed into the base. Functions that exist once per slot use channel A's offset.

use crate::error::PbHubError;

pub const DEFAULT_ADDRESS: u8 = 0x61;

pub const SLOT_COUNT: u8 = 6;
pub const MAX_PIN_NUMBER: u8 = 51;
pub const MAX_LED_COUNT: u16 = 1024;

///ADC samples are 12 bits. The firmware answers `0xFFFF` while a conversion is pending.
pub const ADC_MAX: u16 = 0x0FFF;
pub const ADC_NOT_READY: u16 = 0xFFFF;

const SLOT_BASES: [u8; SLOT_COUNT as usize] = [0x40, 0x50, 0x60, 0x70, 0x80, 0xA0];

const LED_SHOW_MODE_REGISTER: u8 = 0xFA;
const FW_VERSION_REGISTER: u8 = 0xFE;

///7-bit I2C address of one hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HubAddress(u8);

impl HubAddress {
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for HubAddress {
    fn default() -> Self {
        Self(DEFAULT_ADDRESS)
    }
}

impl TryFrom<u8> for HubAddress {
    type Error = PbHubError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value > 0x7F {
            Err(PbHubError::OutOfRange {
                what: "i2c address",
                value: value as u32,
                max: 0x7F,
            })
        } else {
            Ok(Self(value))
        }
    }
}

///One of the six physical connectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIndex(u8);

impl SlotIndex {
    pub fn get(self) -> u8 {
        self.0
    }

    pub fn base(self) -> u8 {
        SLOT_BASES[self.0 as usize]
    }
}

impl TryFrom<u8> for SlotIndex {
    type Error = PbHubError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value >= SLOT_COUNT {
            Err(PbHubError::OutOfRange {
                what: "slot",
                value: value as u32,
                max: (SLOT_COUNT - 1) as u32,
            })
        } else {
            Ok(Self(value))
        }
    }
}

///A pin number as written in configuration: `slot * 10 + index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PinNumber(u8);

impl PinNumber {
    pub fn from_parts(slot: SlotIndex, index: u8) -> Result<Self, PbHubError> {
        if index > 9 {
            return Err(PbHubError::OutOfRange {
                what: "pin index",
                value: index as u32,
                max: 9,
            });
        }
        Self::try_from(slot.get() * 10 + index)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn slot(self) -> SlotIndex {
        SlotIndex(self.0 / 10)
    }

    pub fn index(self) -> u8 {
        self.0 % 10
    }

    ///Index 0 is channel A. The hub has two channels per slot, any other index addresses channel B.
    pub fn channel(self) -> Channel {
        if self.index() == 0 {
            Channel::A
        } else {
            Channel::B
        }
    }
}

impl TryFrom<u8> for PinNumber {
    type Error = PbHubError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value > MAX_PIN_NUMBER {
            Err(PbHubError::OutOfRange {
                what: "pin number",
                value: value as u32,
                max: MAX_PIN_NUMBER as u32,
            })
        } else {
            Ok(Self(value))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    A,
    B,
}

///Functions addressed per pin (channel A or B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinFunction {
    DigitalWrite,
    Pwm,
    DigitalRead,
    ServoAngle,
    ServoPulse,
}

impl PinFunction {
    fn offset(self, channel: Channel) -> u8 {
        let a = match self {
            Self::DigitalWrite => 0x00,
            Self::Pwm => 0x02,
            Self::DigitalRead => 0x04,
            Self::ServoAngle => 0x0C,
            Self::ServoPulse => 0x0E,
        };
        match channel {
            Channel::A => a,
            Channel::B => a + 1,
        }
    }

    fn len(self) -> usize {
        match self {
            Self::ServoPulse => 2,
            _ => 1,
        }
    }
}

///Functions addressed per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotFunction {
    AnalogRead,
    LedCount,
    LedColor,
    LedFill,
    LedBrightness,
}

impl SlotFunction {
    fn offset(self) -> u8 {
        match self {
            Self::AnalogRead => 0x06,
            Self::LedCount => 0x08,
            Self::LedColor => 0x09,
            Self::LedFill => 0x0A,
            Self::LedBrightness => 0x0B,
        }
    }

    fn len(self) -> usize {
        match self {
            Self::AnalogRead | Self::LedCount => 2,
            Self::LedColor => 5,
            Self::LedFill => 7,
            Self::LedBrightness => 1,
        }
    }
}

///Registers that are not tied to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalFunction {
    LedShowMode,
    FirmwareVersion,
}

///A wire register and the number of payload bytes it takes or returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    pub address: u8,
    pub len: usize,
}

pub fn pin_register(pin: PinNumber, function: PinFunction) -> Register {
    Register {
        address: pin.slot().base() | function.offset(pin.channel()),
        len: function.len(),
    }
}

pub fn slot_register(slot: SlotIndex, function: SlotFunction) -> Register {
    Register {
        address: slot.base() | function.offset(),
        len: function.len(),
    }
}

pub fn global_register(function: GlobalFunction) -> Register {
    match function {
        GlobalFunction::LedShowMode => Register {
            address: LED_SHOW_MODE_REGISTER,
            len: 1,
        },
        GlobalFunction::FirmwareVersion => Register {
            address: FW_VERSION_REGISTER,
            len: 1,
        },
    }
}

///Raw-number entry point for callers holding unvalidated values.
pub fn register_for_pin(pin: u8, function: PinFunction) -> Result<Register, PbHubError> {
    Ok(pin_register(PinNumber::try_from(pin)?, function))
}

///Raw-number entry point for callers holding unvalidated values.
pub fn register_for_slot(slot: u8, function: SlotFunction) -> Result<Register, PbHubError> {
    Ok(slot_register(SlotIndex::try_from(slot)?, function))
}
