pub mod module;
pub mod pipe;

use std::collections::HashMap;

use config_rs::{Config, ConfigError, File};
use futures::future::join_all;
use module::PbHubModuleConfig;
use pbhub_core::{error::BuildError, InputKind, OutputKind};
use pipe::PipeConfig;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Deserialize, Debug, Default)]
pub struct Metadata {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct PbHubAppConfig {
    #[serde(default)]
    pub metadata: Metadata,
    pub modules: HashMap<String, PbHubModuleConfig>,
    #[serde(default)]
    pub pipes: Vec<PipeConfig>,
}

impl PbHubAppConfig {
    pub fn new(config: &str) -> Result<Self, ConfigError> {
        let cfg = Config::builder().add_source(File::with_name(config)).build()?;

        cfg.try_deserialize()
    }

    ///A bus can carry one hub per address.
    pub fn validate(&self) -> Result<(), BuildError> {
        let mut seen: HashMap<(u8, u8), &str> = HashMap::with_capacity(self.modules.len());
        let mut errs = Vec::new();
        for (name, module) in &self.modules {
            let hub = module.hub();
            if let Some(other) = seen.insert((hub.bus, hub.address), name) {
                errs.push(BuildError::from_string(format!(
                    "modules {} and {} both use address 0x{:02X} on bus {}",
                    other, name, hub.address, hub.bus
                )));
            }
        }
        if errs.is_empty() {
            Ok(())
        } else {
            Err(BuildError::from_errs(errs))
        }
    }

    ///Builds every module and pipe, then runs until `cancel_token` fires and every task has finished. Nothing is
    ///left running if any module or pipe fails to build.
    pub async fn start(self, cancel_token: CancellationToken) -> Result<(), BuildError> {
        self.validate()?;

        let mut inputs: HashMap<String, InputKind> = HashMap::new();
        let mut outputs: HashMap<String, OutputKind> = HashMap::new();
        let mut handles = Vec::with_capacity(self.modules.len() + self.pipes.len());
        let mut errs = Vec::new();

        for (module_name, module) in &self.modules {
            match module.build(cancel_token.clone()).await {
                Ok(io) => {
                    info!("built module {} ({} inputs, {} outputs)", module_name, io.inputs.len(), io.outputs.len());
                    handles.push(io.join_handle);
                    for (k, input) in io.inputs {
                        inputs.insert(format!("{}.{}", module_name, k), input);
                    }
                    for (k, output) in io.outputs {
                        outputs.insert(format!("{}.{}", module_name, k), output);
                    }
                }
                Err(err) => errs.push(BuildError::from_string(format!("module {}: {}", module_name, err))),
            }
        }

        for pipe_cfg in &self.pipes {
            match pipe_cfg.try_build(&inputs, &outputs) {
                Ok(pipe) => handles.push(pipe.handle),
                Err(err) => errs.push(err),
            }
        }

        if !errs.is_empty() {
            warn!("build failed, stopping everything that started");
            cancel_token.cancel();
            drop(inputs);
            drop(outputs);
            join_all(handles).await;
            return Err(BuildError::from_errs(errs));
        }

        //pipes hold their own ends, unconnected outputs close here
        drop(inputs);
        drop(outputs);

        join_all(handles).await;
        debug!("all modules and pipes done");
        Ok(())
    }
}

#[cfg(all(test, feature = "sims"))]
mod tests {
    use std::time::Duration;

    use config_rs::FileFormat;

    use super::*;

    fn parse(yaml: &str) -> PbHubAppConfig {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .unwrap()
    }

    const DEMO: &str = r#"
metadata:
  name: bench
  description: knob drives a fan
modules:
  hub:
    SimulatedPbHub:
      sim:
        seed: 4
      hub:
        bus: 1
        address: 97
        items:
          knob:
            Adc:
              slot: 2
              period_ms: 20
          fan:
            Pwm:
              number: 30
          button:
            Gpio:
              number: 0
              mode:
                input: true
          lamp:
            Gpio:
              number: 1
              mode:
                output: true
pipes:
  - from: hub.knob
    to: hub.fan
  - from: hub.button
    to: hub.lamp
"#;

    #[test]
    fn parses_modules_and_pipes() {
        let cfg = parse(DEMO);
        assert_eq!(cfg.metadata.name.as_deref(), Some("bench"));
        assert_eq!(cfg.modules.len(), 1);
        assert_eq!(cfg.pipes.len(), 2);
        let hub = cfg.modules["hub"].hub();
        assert_eq!((hub.bus, hub.address), (1, 0x61));
        assert_eq!(hub.items.len(), 4);
    }

    #[test]
    fn duplicate_bus_address_is_rejected() {
        let cfg = parse(
            r#"
modules:
  left:
    SimulatedPbHub:
      hub:
        address: 97
  right:
    SimulatedPbHub:
      hub:
        address: 97
"#,
        );
        match cfg.validate() {
            Err(BuildError::Messages(errs)) => assert_eq!(errs.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn runs_until_cancelled() {
        let cfg = parse(DEMO);
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stop.cancel();
        });
        assert!(cfg.start(cancel).await.is_ok());
    }

    #[tokio::test]
    async fn bad_pipe_stops_everything() {
        let mut cfg = parse(DEMO);
        cfg.pipes.push(PipeConfig {
            from: "hub.knob".to_string(),
            to: "hub.lamp".to_string(),
        });
        let cancel = CancellationToken::new();
        assert!(cfg.start(cancel.clone()).await.is_err());
        assert!(cancel.is_cancelled());
    }
}
