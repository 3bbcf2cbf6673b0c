//! Float outputs: PWM duty cycle and servo position.
//!
//! Every write goes to the bus, even when the value did not change. The hub may have been reset since.

use std::sync::Arc;

use embedded_hal::i2c;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error};

use super::hub::{HubDevice, SERVO_MAX_ANGLE};
use super::registers::PinNumber;
use crate::error::PbHubError;

pub struct PwmChannel<I2C> {
    hub: Arc<HubDevice<I2C>>,
    pin: PinNumber,
    duty_cycle: f64,
}

impl<I2C> PwmChannel<I2C>
where
    I2C: i2c::I2c,
{
    pub fn new(hub: Arc<HubDevice<I2C>>, pin: PinNumber) -> Self {
        Self {
            hub,
            pin,
            duty_cycle: 0.0,
        }
    }

    pub fn pin(&self) -> PinNumber {
        self.pin
    }

    ///The last duty cycle written, after clamping.
    pub fn duty_cycle(&self) -> f64 {
        self.duty_cycle
    }

    pub fn write(&mut self, duty_cycle: f64) -> Result<(), PbHubError> {
        let clamped = if duty_cycle.is_nan() {
            0.0
        } else {
            duty_cycle.clamp(0.0, 1.0)
        };
        self.hub.pwm_write(self.pin, clamped)?;
        self.duty_cycle = clamped;
        Ok(())
    }
}

///A hobby servo on a hub channel. Positions are given in [0, 1] and mapped to 0 - 180 degrees.
pub struct ServoChannel<I2C> {
    hub: Arc<HubDevice<I2C>>,
    pin: PinNumber,
    angle: u8,
}

impl<I2C> ServoChannel<I2C>
where
    I2C: i2c::I2c,
{
    pub fn new(hub: Arc<HubDevice<I2C>>, pin: PinNumber) -> Self {
        Self { hub, pin, angle: 0 }
    }

    pub fn angle(&self) -> u8 {
        self.angle
    }

    pub fn write(&mut self, position: f64) -> Result<(), PbHubError> {
        let position = if position.is_nan() { 0.0 } else { position.clamp(0.0, 1.0) };
        let angle = (position * SERVO_MAX_ANGLE as f64).round() as u8;
        self.angle = self.hub.servo_write_angle(self.pin, angle)?;
        Ok(())
    }

    pub fn write_pulse_us(&mut self, micros: u16) -> Result<u16, PbHubError> {
        self.hub.servo_write_pulse(self.pin, micros)
    }
}

///Anything a float output task can drive.
pub trait FloatWrite: Send + 'static {
    fn write_float(&mut self, value: f64) -> Result<(), PbHubError>;
}

impl<I2C> FloatWrite for PwmChannel<I2C>
where
    I2C: i2c::I2c + Send + 'static,
{
    fn write_float(&mut self, value: f64) -> Result<(), PbHubError> {
        self.write(value)
    }
}

impl<I2C> FloatWrite for ServoChannel<I2C>
where
    I2C: i2c::I2c + Send + 'static,
{
    fn write_float(&mut self, value: f64) -> Result<(), PbHubError> {
        self.write(value)
    }
}

///Receives values and writes each one. Errors are logged and the task keeps going; the caller decides whether to
///send the value again.
pub fn spawn_float_output_task<W: FloatWrite>(
    name: String,
    mut writer: W,
    mut rx: mpsc::Receiver<f64>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(new_value) = rx.recv().await {
            if let Err(err) = writer.write_float(new_value) {
                error!("error setting PbHub output {}! {}", name, err);
            }
        }
        debug!("PbHub output task for {} shutting down.", name)
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::pbhub::{
        mock::{BusOp, MockI2c},
        registers::HubAddress,
    };
    use pbhub_core::Output;

    fn setup() -> (Arc<HubDevice<MockI2c>>, MockI2c) {
        let mock = MockI2c::new();
        (Arc::new(HubDevice::new(mock.clone(), HubAddress::default())), mock)
    }

    #[test]
    fn pwm_clamps_and_rewrites_same_value() {
        let (hub, mock) = setup();
        let mut pwm = PwmChannel::new(hub, PinNumber::try_from(20).unwrap());
        pwm.write(1.5).unwrap();
        assert_eq!(pwm.duty_cycle(), 1.0);
        pwm.write(1.0).unwrap();

        let expected = BusOp::Write { address: 0x61, register: 0x62, data: vec![255] };
        assert_eq!(mock.writes(), vec![expected.clone(), expected]);
    }

    #[test]
    fn servo_maps_position_to_angle() {
        let (hub, mock) = setup();
        let mut servo = ServoChannel::new(hub, PinNumber::try_from(0).unwrap());
        servo.write(0.5).unwrap();
        assert_eq!(servo.angle(), 90);
        servo.write(3.0).unwrap();
        assert_eq!(servo.angle(), 180);
        assert_eq!(
            mock.writes()[0],
            BusOp::Write { address: 0x61, register: 0x4C, data: vec![90] }
        );
    }

    #[test]
    fn servo_pulse_is_clamped_and_little_endian() {
        let (hub, mock) = setup();
        let mut high = ServoChannel::new(hub.clone(), PinNumber::try_from(31).unwrap());
        assert_eq!(high.write_pulse_us(3000).unwrap(), 2500);
        let mut low = ServoChannel::new(hub, PinNumber::try_from(0).unwrap());
        assert_eq!(low.write_pulse_us(100).unwrap(), 500);

        assert_eq!(
            mock.writes(),
            vec![
                BusOp::Write { address: 0x61, register: 0x7F, data: vec![0xC4, 0x09] },
                BusOp::Write { address: 0x61, register: 0x4E, data: vec![0xF4, 0x01] },
            ]
        );
    }

    #[tokio::test]
    async fn output_task_writes_received_values() {
        let (hub, mock) = setup();
        let pwm = PwmChannel::new(hub, PinNumber::try_from(1).unwrap());
        let (output, rx) = Output::new();
        let handle = spawn_float_output_task("pwm".to_string(), pwm, rx);

        output.sink().send(0.0).await.unwrap();
        output.sink().send(1.0).await.unwrap();
        drop(output);
        handle.await.unwrap();

        assert_eq!(
            mock.writes(),
            vec![
                BusOp::Write { address: 0x61, register: 0x43, data: vec![0] },
                BusOp::Write { address: 0x61, register: 0x43, data: vec![255] },
            ]
        );
    }
}
