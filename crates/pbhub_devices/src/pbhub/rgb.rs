use std::sync::Arc;

use embedded_hal::i2c;
use pbhub_core::Rgb;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error};

use super::hub::{check_led_count, HubDevice};
use super::registers::SlotIndex;
use crate::error::PbHubError;

///An addressable LED strip on one slot.
pub struct RgbChannel<I2C> {
    hub: Arc<HubDevice<I2C>>,
    slot: SlotIndex,
    led_count: u16,
    colors: Vec<Rgb>,
}

impl<I2C> RgbChannel<I2C>
where
    I2C: i2c::I2c,
{
    ///Tells the hub how many LEDs are on the strip. The count must be in 1..=1024.
    pub fn new(hub: Arc<HubDevice<I2C>>, slot: SlotIndex, led_count: u16) -> Result<Self, PbHubError> {
        check_led_count(led_count)?;
        hub.set_led_count(slot, led_count)?;
        Ok(Self {
            hub,
            slot,
            led_count,
            colors: vec![Rgb::BLACK; led_count as usize],
        })
    }

    pub fn slot(&self) -> SlotIndex {
        self.slot
    }

    pub fn led_count(&self) -> u16 {
        self.led_count
    }

    ///The last frame that reached the hub.
    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }

    ///Writes one color per LED. Nothing is sent if the frame has the wrong length.
    pub fn write(&mut self, colors: &[Rgb]) -> Result<(), PbHubError> {
        self.hub.rgb_write(self.slot, colors)?;
        self.colors.clear();
        self.colors.extend_from_slice(colors);
        Ok(())
    }

    pub fn fill(&mut self, color: Rgb) -> Result<(), PbHubError> {
        self.hub.fill_led_color(self.slot, 0, self.led_count, color)?;
        self.colors.fill(color);
        Ok(())
    }

    ///Sets every LED from unit-interval components.
    pub fn write_light(&mut self, r: f64, g: f64, b: f64) -> Result<(), PbHubError> {
        self.fill(Rgb::from_unit(r, g, b))
    }

    pub fn set_brightness(&self, value: u8) -> Result<(), PbHubError> {
        self.hub.set_led_brightness(self.slot, value)
    }
}

///Fills the strip with every color received.
pub fn spawn_rgb_output_task<I2C>(
    name: String,
    mut channel: RgbChannel<I2C>,
    mut rx: mpsc::Receiver<Rgb>,
) -> JoinHandle<()>
where
    I2C: i2c::I2c + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(color) = rx.recv().await {
            if let Err(err) = channel.fill(color) {
                error!("error setting PbHub LEDs {}! {}", name, err);
            }
        }
        debug!("PbHub RGB task for {} shutting down.", name)
    })
}
