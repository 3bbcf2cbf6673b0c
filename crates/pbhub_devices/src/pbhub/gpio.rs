use std::{sync::Arc, time::Duration};

use embedded_hal::i2c;
use serde::Deserialize;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::hub::{HubDevice, PinMode};
use super::registers::PinNumber;
use crate::error::PbHubError;

///Mode flags as they appear in configuration. Exactly one must be true.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct PinModeConfig {
    #[serde(default)]
    pub input: bool,
    #[serde(default)]
    pub output: bool,
}

impl TryFrom<PinModeConfig> for PinMode {
    type Error = PbHubError;

    fn try_from(cfg: PinModeConfig) -> Result<Self, Self::Error> {
        PinMode::from_flags(cfg.input, cfg.output)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PinState {
    Unconfigured,
    Input,
    //last logical value written
    Output(bool),
}

///A single digital pin on a hub.
///
/// Values seen by callers are always logical. When `inverted` is set the wire carries the opposite level, in both
/// directions.
pub struct GpioPinBinding<I2C> {
    hub: Arc<HubDevice<I2C>>,
    pin: PinNumber,
    inverted: bool,
    state: PinState,
}

impl<I2C> GpioPinBinding<I2C>
where
    I2C: i2c::I2c,
{
    ///Creates an unconfigured pin. No bus access happens until `configure_mode`.
    pub fn new(hub: Arc<HubDevice<I2C>>, pin: PinNumber, inverted: bool) -> Self {
        Self {
            hub,
            pin,
            inverted,
            state: PinState::Unconfigured,
        }
    }

    ///Creates a pin and configures it from mode flags.
    pub fn try_build(
        hub: Arc<HubDevice<I2C>>,
        pin: PinNumber,
        mode: PinModeConfig,
        inverted: bool,
    ) -> Result<Self, PbHubError> {
        let mode = PinMode::try_from(mode)?;
        let mut binding = Self::new(hub, pin, inverted);
        binding.configure_mode(mode)?;
        Ok(binding)
    }

    pub fn pin(&self) -> PinNumber {
        self.pin
    }

    pub fn inverted(&self) -> bool {
        self.inverted
    }

    pub fn mode(&self) -> Option<PinMode> {
        match self.state {
            PinState::Unconfigured => None,
            PinState::Input => Some(PinMode::Input),
            PinState::Output(_) => Some(PinMode::Output),
        }
    }

    ///Switches the pin to `mode`. An output starts logically low.
    pub fn configure_mode(&mut self, mode: PinMode) -> Result<(), PbHubError> {
        self.hub.configure_mode(self.pin, mode, self.inverted)?;
        self.state = match mode {
            PinMode::Input => PinState::Input,
            PinMode::Output => PinState::Output(false),
        };
        Ok(())
    }

    ///Inputs read the wire. Outputs return the last value written.
    pub fn read(&self) -> Result<bool, PbHubError> {
        match self.state {
            PinState::Unconfigured => Err(self.unconfigured("read")),
            PinState::Input => Ok(self.hub.digital_read(self.pin)? != self.inverted),
            PinState::Output(last) => Ok(last),
        }
    }

    pub fn write(&mut self, value: bool) -> Result<(), PbHubError> {
        match self.state {
            PinState::Unconfigured => Err(self.unconfigured("write")),
            PinState::Input => Err(PbHubError::WrongMode {
                pin: self.pin.get(),
                mode: PinMode::Input.as_str(),
                operation: "write",
            }),
            PinState::Output(_) => {
                self.hub.digital_write(self.pin, value != self.inverted)?;
                self.state = PinState::Output(value);
                Ok(())
            }
        }
    }

    fn unconfigured(&self, operation: &str) -> PbHubError {
        PbHubError::InvalidMode(format!(
            "pin {} has no mode configured, cannot {}",
            self.pin.get(),
            operation
        ))
    }
}

///Reads an input pin every `period` and publishes changes. Read failures are logged and the pin keeps its last
///value. Stops when cancelled or once every receiver of `tx` is gone.
pub fn spawn_gpio_input_task<I2C>(
    name: String,
    gpio: GpioPinBinding<I2C>,
    period: Duration,
    tx: watch::Sender<bool>,
    cancel_token: CancellationToken,
) -> JoinHandle<()>
where
    I2C: i2c::I2c + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = tx.closed() => break,
                _ = ticker.tick() => {}
            }
            match gpio.read() {
                Ok(value) => {
                    tx.send_if_modified(|current| {
                        let changed = *current != value;
                        *current = value;
                        changed
                    });
                }
                Err(err) => warn!("PbHub input {} read failed: {}", name, err),
            }
        }
        debug!("PbHub input task for {} shutting down.", name)
    })
}

pub fn spawn_gpio_output_task<I2C>(
    name: String,
    mut gpio: GpioPinBinding<I2C>,
    mut rx: mpsc::Receiver<bool>,
) -> JoinHandle<()>
where
    I2C: i2c::I2c + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(value) = rx.recv().await {
            if let Err(err) = gpio.write(value) {
                error!("error setting PbHub output {}! {}", name, err);
            }
        }
        debug!("PbHub output task for {} shutting down.", name)
    })
}
