use std::collections::HashMap;

use pbhub_core::{error::BuildError, pipe::Pipe, InputKind, OutputKind};
use serde::Deserialize;

///A `Pipe` forwards values from a module input to a module output. Names are `module.item`.
#[derive(Deserialize, Debug)]
pub struct PipeConfig {
    pub from: String,
    pub to: String,
}

impl PipeConfig {
    pub fn try_build(
        &self,
        inputs: &HashMap<String, InputKind>,
        outputs: &HashMap<String, OutputKind>,
    ) -> Result<Pipe, BuildError> {
        let input = inputs.get(&self.from);
        let output = outputs.get(&self.to);

        match (input, output) {
            (Some(InputKind::Float(input)), Some(OutputKind::Float(output))) => Ok(Pipe::new(input, output)),
            (Some(InputKind::Bool(input)), Some(OutputKind::Bool(output))) => Ok(Pipe::new(input, output)),
            (Some(input), Some(output)) => Err(BuildError::from_string(format!(
                "can't build Pipe from {} ({}) to {} ({}), the types differ.",
                self.from,
                input.type_name(),
                self.to,
                output.type_name()
            ))),
            (input, output) => {
                let mut errs = Vec::with_capacity(2);
                if input.is_none() {
                    errs.push(BuildError::from_string(format!(
                        "can't build Pipe from {} to {}. input {} not found.",
                        self.from, self.to, self.from
                    )));
                }
                if output.is_none() {
                    errs.push(BuildError::from_string(format!(
                        "can't build Pipe from {} to {}. output {} not found.",
                        self.from, self.to, self.to
                    )));
                }
                Err(BuildError::from_errs(errs))
            }
        }
    }
}
