//!Configuration and construction of a whole hub as one module.
use std::{collections::HashMap, sync::Arc, time::Duration};

use embedded_hal::i2c;
use futures::future::join_all;
use pbhub_core::{error::BuildError, Input, InputKind, ModuleBuilder, ModuleIO, Output, OutputKind, Rgb};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
    adc::{AdcChannel, AdcFilter, DEFAULT_FAILURE_THRESHOLD},
    gpio::{spawn_gpio_input_task, spawn_gpio_output_task, GpioPinBinding, PinModeConfig},
    hub::{HubDevice, PinMode},
    output::{spawn_float_output_task, PwmChannel, ServoChannel},
    registers::{HubAddress, PinNumber, SlotIndex, ADC_MAX, DEFAULT_ADDRESS},
    rgb::{spawn_rgb_output_task, RgbChannel},
};

fn default_bus() -> u8 {
    1
}

fn default_address() -> u8 {
    DEFAULT_ADDRESS
}

fn default_gpio_poll_ms() -> u64 {
    50
}

fn default_adc_period_ms() -> u64 {
    1000
}

fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}

///One hub on one bus.
#[derive(Debug, Deserialize)]
pub struct PbHubDeviceConfig {
    #[serde(default = "default_bus")]
    pub bus: u8,
    #[serde(default = "default_address")]
    pub address: u8,
    #[serde(default)]
    pub items: HashMap<String, PbHubItemConfig>,
}

///Something connected to the hub. Each item becomes one named input or output of the module.
#[derive(Debug, Deserialize)]
pub enum PbHubItemConfig {
    Gpio {
        number: u8,
        mode: PinModeConfig,
        #[serde(default)]
        inverted: bool,
        ///How often an input pin is read. Ignored for outputs.
        #[serde(default = "default_gpio_poll_ms")]
        poll_ms: u64,
    },
    ///Published as a fraction of full scale, 0.0 - 1.0.
    Adc {
        slot: u8,
        #[serde(default = "default_adc_period_ms")]
        period_ms: u64,
        #[serde(default = "default_failure_threshold")]
        failure_threshold: u32,
    },
    Pwm {
        number: u8,
    },
    Servo {
        number: u8,
    },
    Rgb {
        slot: u8,
        led_count: u16,
        #[serde(default)]
        brightness: Option<u8>,
        ///Written to every LED when the hub is set up.
        #[serde(default)]
        color: Option<Rgb>,
    },
}

pub struct PbHubDevice {
    pub join_handle: JoinHandle<()>,
    pub firmware_version: u8,
    pub inputs: HashMap<String, InputKind>,
    pub outputs: HashMap<String, OutputKind>,
}

impl From<PbHubDevice> for ModuleIO {
    fn from(dev: PbHubDevice) -> Self {
        ModuleIO {
            join_handle: dev.join_handle,
            inputs: dev.inputs,
            outputs: dev.outputs,
        }
    }
}

//items are constructed (and touch the bus) before any task is spawned
enum BuiltItem<I2C> {
    GpioIn(GpioPinBinding<I2C>, Duration),
    GpioOut(GpioPinBinding<I2C>),
    Adc(AdcChannel<I2C>, u32),
    Pwm(PwmChannel<I2C>),
    Servo(ServoChannel<I2C>),
    Rgb(RgbChannel<I2C>),
}

fn build_item<I2C>(hub: &Arc<HubDevice<I2C>>, cfg: &PbHubItemConfig) -> Result<BuiltItem<I2C>, BuildError>
where
    I2C: i2c::I2c + Send + 'static,
{
    let item = match cfg {
        PbHubItemConfig::Gpio {
            number,
            mode,
            inverted,
            poll_ms,
        } => {
            let gpio = GpioPinBinding::try_build(hub.clone(), PinNumber::try_from(*number)?, *mode, *inverted)?;
            match gpio.mode() {
                Some(PinMode::Input) => BuiltItem::GpioIn(gpio, Duration::from_millis((*poll_ms).max(1))),
                _ => BuiltItem::GpioOut(gpio),
            }
        }
        PbHubItemConfig::Adc {
            slot,
            period_ms,
            failure_threshold,
        } => {
            let adc = AdcChannel::new(
                hub.clone(),
                SlotIndex::try_from(*slot)?,
                Duration::from_millis(*period_ms),
            )?;
            BuiltItem::Adc(adc, *failure_threshold)
        }
        PbHubItemConfig::Pwm { number } => BuiltItem::Pwm(PwmChannel::new(hub.clone(), PinNumber::try_from(*number)?)),
        PbHubItemConfig::Servo { number } => {
            BuiltItem::Servo(ServoChannel::new(hub.clone(), PinNumber::try_from(*number)?))
        }
        PbHubItemConfig::Rgb {
            slot,
            led_count,
            brightness,
            color,
        } => {
            let mut rgb = RgbChannel::new(hub.clone(), SlotIndex::try_from(*slot)?, *led_count)?;
            if let Some(brightness) = brightness {
                rgb.set_brightness(*brightness)?;
            }
            if let Some(color) = color {
                rgb.fill(*color)?;
            }
            BuiltItem::Rgb(rgb)
        }
    };
    Ok(item)
}

impl PbHubDevice {
    ///Probes the hub, builds every configured item and spawns their tasks. Fails without spawning anything if the
    ///hub does not answer or any item is invalid; all item errors are reported together.
    pub fn try_build<I2C>(
        cfg: &PbHubDeviceConfig,
        i2c: I2C,
        cancel_token: CancellationToken,
    ) -> Result<PbHubDevice, BuildError>
    where
        I2C: i2c::I2c + Send + 'static,
    {
        let address = HubAddress::try_from(cfg.address)?;
        let hub = Arc::new(HubDevice::new(i2c, address));

        let firmware_version = hub.firmware_version().map_err(|err| {
            BuildError::from_string(format!(
                "no PbHub answering at 0x{:02X} on bus {}: {}",
                address.get(),
                cfg.bus,
                err
            ))
        })?;
        info!(
            "PbHub at 0x{:02X} on bus {}, firmware version {}",
            address.get(),
            cfg.bus,
            firmware_version
        );

        let mut items = Vec::with_capacity(cfg.items.len());
        let mut errs = Vec::new();
        for (name, item_cfg) in &cfg.items {
            match build_item(&hub, item_cfg) {
                Ok(item) => items.push((name.clone(), item)),
                Err(err) => errs.push(BuildError::from_string(format!("item '{}': {}", name, err))),
            }
        }
        if !errs.is_empty() {
            return Err(BuildError::from_errs(errs));
        }

        let mut inputs = HashMap::new();
        let mut outputs = HashMap::new();
        let mut join_handles = Vec::with_capacity(items.len());
        for (name, item) in items {
            let handle = match item {
                BuiltItem::GpioIn(gpio, period) => {
                    let (input, tx) = Input::new(false);
                    inputs.insert(name.clone(), InputKind::Bool(input));
                    spawn_gpio_input_task(name, gpio, period, tx, cancel_token.clone())
                }
                BuiltItem::GpioOut(gpio) => {
                    let (output, rx) = Output::new();
                    outputs.insert(name.clone(), OutputKind::Bool(output));
                    spawn_gpio_output_task(name, gpio, rx)
                }
                BuiltItem::Adc(adc, failure_threshold) => {
                    let normalize: AdcFilter = Box::new(|raw: u16| raw as f64 / ADC_MAX as f64);
                    let poller = adc.spawn_poller(Some(normalize), failure_threshold, cancel_token.clone());
                    inputs.insert(name, InputKind::Float(poller.value));
                    poller.join_handle
                }
                BuiltItem::Pwm(pwm) => {
                    let (output, rx) = Output::new();
                    outputs.insert(name.clone(), OutputKind::Float(output));
                    spawn_float_output_task(name, pwm, rx)
                }
                BuiltItem::Servo(servo) => {
                    let (output, rx) = Output::new();
                    outputs.insert(name.clone(), OutputKind::Float(output));
                    spawn_float_output_task(name, servo, rx)
                }
                BuiltItem::Rgb(rgb) => {
                    let (output, rx) = Output::new();
                    outputs.insert(name.clone(), OutputKind::Color(output));
                    spawn_rgb_output_task(name, rgb, rx)
                }
            };
            join_handles.push(handle);
        }

        let join_handle = tokio::spawn(async move {
            join_all(join_handles).await;
            debug!("PbHub 0x{:02X} tasks all done!", address.get())
        });

        Ok(PbHubDevice {
            join_handle,
            firmware_version,
            inputs,
            outputs,
        })
    }
}

///Builds hubs from configuration, opening buses with `i2c_bus_provider`.
pub struct PbHubDeviceBuilder<I2C, F>
where
    I2C: i2c::I2c + Send + 'static,
    F: Fn(u8, u8) -> Result<I2C, BuildError>,
{
    i2c_bus_provider: F,
}

impl<I2C, F> PbHubDeviceBuilder<I2C, F>
where
    I2C: i2c::I2c + Send + 'static,
    F: Fn(u8, u8) -> Result<I2C, BuildError>,
{
    ///`i2c_bus_provider` is called with the configured bus number and hub address.
    pub fn new(i2c_bus_provider: F) -> Self {
        PbHubDeviceBuilder { i2c_bus_provider }
    }
}

impl<I2C, F> ModuleBuilder for PbHubDeviceBuilder<I2C, F>
where
    I2C: i2c::I2c + Send + 'static,
    F: Fn(u8, u8) -> Result<I2C, BuildError>,
{
    type Config = PbHubDeviceConfig;
    type Module = PbHubDevice;

    async fn try_build(
        &self,
        cfg: &PbHubDeviceConfig,
        cancel_token: CancellationToken,
    ) -> Result<PbHubDevice, BuildError> {
        let i2c = (self.i2c_bus_provider)(cfg.bus, cfg.address)?;
        PbHubDevice::try_build(cfg, i2c, cancel_token)
    }
}

#[cfg(test)]
mod tests {
    use embedded_hal::i2c::ErrorKind;

    use super::*;
    use crate::pbhub::mock::{BusOp, MockI2c};

    fn config(json: &str) -> PbHubDeviceConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn config_defaults() {
        let cfg = config(
            r#"{ "items": {
                "led": { "Gpio": { "number": 23, "mode": { "output": true } } },
                "knob": { "Adc": { "slot": 2 } },
                "strip": { "Rgb": { "slot": 5, "led_count": 10 } }
            } }"#,
        );
        assert_eq!(cfg.bus, 1);
        assert_eq!(cfg.address, 0x61);
        match &cfg.items["led"] {
            PbHubItemConfig::Gpio { number, mode, inverted, poll_ms } => {
                assert_eq!(*number, 23);
                assert!(mode.output && !mode.input);
                assert!(!inverted);
                assert_eq!(*poll_ms, 50);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &cfg.items["knob"] {
            PbHubItemConfig::Adc { period_ms, failure_threshold, .. } => {
                assert_eq!(*period_ms, 1000);
                assert_eq!(*failure_threshold, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn builds_named_inputs_and_outputs() {
        let mock = MockI2c::new();
        mock.push_read(&[0x02]);
        let cfg = config(
            r#"{ "address": 97, "items": {
                "led": { "Gpio": { "number": 23, "mode": { "output": true } } },
                "button": { "Gpio": { "number": 0, "mode": { "input": true } } },
                "knob": { "Adc": { "slot": 2 } },
                "fan": { "Pwm": { "number": 30 } },
                "arm": { "Servo": { "number": 31 } },
                "strip": { "Rgb": { "slot": 5, "led_count": 4, "brightness": 40 } }
            } }"#,
        );
        let cancel = CancellationToken::new();
        let dev = PbHubDevice::try_build(&cfg, mock.clone(), cancel.clone()).unwrap();
        assert_eq!(dev.firmware_version, 2);
        assert!(matches!(dev.inputs["button"], InputKind::Bool(_)));
        assert!(matches!(dev.inputs["knob"], InputKind::Float(_)));
        assert!(matches!(dev.outputs["led"], OutputKind::Bool(_)));
        assert!(matches!(dev.outputs["fan"], OutputKind::Float(_)));
        assert!(matches!(dev.outputs["arm"], OutputKind::Float(_)));

        let strip = match &dev.outputs["strip"] {
            OutputKind::Color(output) => output.sink(),
            other => panic!("unexpected {:?}", other),
        };
        mock.clear();
        strip.send(Rgb::new(0, 0, 255)).await.unwrap();

        let io: ModuleIO = dev.into();
        drop(strip);
        drop(io.outputs);
        drop(io.inputs);
        cancel.cancel();
        io.join_handle.await.unwrap();

        assert!(mock
            .writes()
            .contains(&BusOp::Write { address: 0x61, register: 0xAA, data: vec![0, 0, 4, 0, 0, 0, 255] }));
    }

    #[tokio::test]
    async fn rgb_initial_color_is_filled_at_build() {
        let mock = MockI2c::new();
        let cfg = config(
            r#"{ "items": {
                "strip": { "Rgb": { "slot": 5, "led_count": 3, "color": { "r": 255, "g": 16, "b": 0 } } }
            } }"#,
        );
        let cancel = CancellationToken::new();
        let dev = PbHubDevice::try_build(&cfg, mock.clone(), cancel.clone()).unwrap();
        assert!(mock
            .writes()
            .contains(&BusOp::Write { address: 0x61, register: 0xAA, data: vec![0, 0, 3, 0, 255, 16, 0] }));

        let io: ModuleIO = dev.into();
        drop(io.outputs);
        cancel.cancel();
        io.join_handle.await.unwrap();
    }

    #[tokio::test]
    async fn missing_hub_fails_build() {
        let mock = MockI2c::new();
        mock.push_read_error(ErrorKind::NoAcknowledge(embedded_hal::i2c::NoAcknowledgeSource::Address));
        let cfg = config(r#"{ "items": {} }"#);
        let res = PbHubDevice::try_build(&cfg, mock, CancellationToken::new());
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn item_errors_are_collected() {
        let mock = MockI2c::new();
        let cfg = config(
            r#"{ "items": {
                "a": { "Gpio": { "number": 52, "mode": { "output": true } } },
                "b": { "Gpio": { "number": 1, "mode": { "input": true, "output": true } } },
                "c": { "Rgb": { "slot": 0, "led_count": 0 } }
            } }"#,
        );
        match PbHubDevice::try_build(&cfg, mock, CancellationToken::new()) {
            Err(BuildError::Messages(messages)) => assert_eq!(messages.len(), 3),
            Err(other) => panic!("unexpected {:?}", other),
            Ok(_) => panic!("build should fail"),
        }
    }

    #[tokio::test]
    async fn builder_uses_bus_provider() {
        let mock = MockI2c::new();
        let builder = PbHubDeviceBuilder::new(|bus, address| {
            assert_eq!((bus, address), (3, 0x62));
            Ok(mock.clone())
        });
        let cfg = config(r#"{ "bus": 3, "address": 98 }"#);
        let dev = builder.try_build(&cfg, CancellationToken::new()).await.unwrap();
        assert!(dev.inputs.is_empty() && dev.outputs.is_empty());
    }
}
