use pbhub_core::{error::BuildError, ModuleBuilder, ModuleIO};
use pbhub_devices::pbhub::{PbHubDeviceBuilder, PbHubDeviceConfig};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

//rpi (for i2c source)
#[cfg(feature = "rpi")]
use pbhub_rpi::I2c;

#[cfg(feature = "sims")]
use pbhub_sims::{SimulatedPbHub, SimulatedPbHubConfig};

#[cfg(feature = "rpi")]
fn i2c_bus_provider(bus: u8, _address: u8) -> Result<I2c, BuildError> {
    Ok(pbhub_rpi::get_bus(bus)?)
}

///Simulator settings. The address always comes from the hub config.
#[cfg(feature = "sims")]
#[derive(Deserialize, Debug, Default)]
pub struct SimSettings {
    pub firmware_version: Option<u8>,
    pub analog_step: Option<u16>,
    pub seed: Option<u64>,
}

#[cfg(feature = "sims")]
#[derive(Deserialize, Debug)]
pub struct SimulatedPbHubModuleConfig {
    pub hub: PbHubDeviceConfig,
    #[serde(default)]
    pub sim: SimSettings,
}

#[cfg(feature = "sims")]
impl SimulatedPbHubModuleConfig {
    fn sim_config(&self, address: u8) -> SimulatedPbHubConfig {
        let defaults = SimulatedPbHubConfig::default();
        SimulatedPbHubConfig {
            address,
            firmware_version: self.sim.firmware_version.unwrap_or(defaults.firmware_version),
            analog_step: self.sim.analog_step.unwrap_or(defaults.analog_step),
            seed: self.sim.seed,
        }
    }
}

/// Modules are collections of Inputs and/or Outputs provided by some black-box system. Here, one hub each.
#[derive(Deserialize, Debug)]
pub enum PbHubModuleConfig {
    #[cfg(feature = "rpi")]
    PbHub(PbHubDeviceConfig),

    #[cfg(feature = "sims")]
    SimulatedPbHub(SimulatedPbHubModuleConfig),
}

impl PbHubModuleConfig {
    pub fn hub(&self) -> &PbHubDeviceConfig {
        match self {
            #[cfg(feature = "rpi")]
            Self::PbHub(hub_cfg) => hub_cfg,
            #[cfg(feature = "sims")]
            Self::SimulatedPbHub(sim_cfg) => &sim_cfg.hub,
        }
    }

    pub async fn build(&self, cancel_token: CancellationToken) -> Result<ModuleIO, BuildError> {
        match self {
            #[cfg(feature = "rpi")]
            Self::PbHub(hub_cfg) => PbHubDeviceBuilder::new(i2c_bus_provider)
                .try_build(hub_cfg, cancel_token)
                .await
                .map(|hub| hub.into()),

            #[cfg(feature = "sims")]
            Self::SimulatedPbHub(sim_cfg) => {
                PbHubDeviceBuilder::new(|_bus, address| Ok(SimulatedPbHub::new(sim_cfg.sim_config(address))))
                    .try_build(&sim_cfg.hub, cancel_token)
                    .await
                    .map(|hub| hub.into())
            }
        }
    }
}
