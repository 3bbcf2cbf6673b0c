//!Shared plumbing for the PbHub workspace: typed value channels exposed by hardware modules, and the trait used to
//! build modules from configuration. The driver crates and the application depend on this one.

use std::{collections::HashMap, fmt, future::Future};

use error::BuildError;
use serde::Deserialize;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

pub mod error;
pub mod pipe;

///Writes queue at most this many values per output before senders wait.
pub const OUTPUT_CAPACITY: usize = 1;

///A value published by a module, such as a polled pin level or an ADC sample.
///
/// The module keeps the `watch::Sender` returned by `new`; readers take `source()` and see the latest value only.
pub struct Input<T> {
    rx: watch::Receiver<T>,
}

impl<T> Input<T> {
    pub fn new(start: T) -> (Self, watch::Sender<T>) {
        let (tx, rx) = watch::channel(start);
        (Self { rx }, tx)
    }

    pub fn source(&self) -> watch::Receiver<T> {
        self.rx.clone()
    }
}

impl<T: Clone> Input<T> {
    pub fn current(&self) -> T {
        self.rx.borrow().clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for Input<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Input").field("current", &*self.rx.borrow()).finish()
    }
}

///A value accepted by a module, such as a PWM duty cycle. Every value sent is applied in order.
///
/// The module keeps the `mpsc::Receiver` returned by `new`; writers take `sink()`. The module's task ends once
/// every sink and the `Output` itself are dropped.
pub struct Output<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Output<T> {
    pub fn new() -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(OUTPUT_CAPACITY);
        (Self { tx }, rx)
    }

    pub fn sink(&self) -> mpsc::Sender<T> {
        self.tx.clone()
    }
}

impl<T> fmt::Debug for Output<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output").field("closed", &self.tx.is_closed()).finish()
    }
}

///An 8-bit per channel color, as written to addressable LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    ///Converts unit-range channel intensities (0.0 - 1.0) to bytes. Out of range values are clamped.
    pub fn from_unit(r: f64, g: f64, b: f64) -> Self {
        fn to_byte(v: f64) -> u8 {
            (v.clamp(0.0, 1.0) * 255.0).round() as u8
        }
        Self {
            r: to_byte(r),
            g: to_byte(g),
            b: to_byte(b),
        }
    }
}

///The value types a module can publish, so configuration can refer to inputs by name.
#[derive(Debug)]
pub enum InputKind {
    Bool(Input<bool>),
    Float(Input<f64>),
}

impl InputKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "Bool",
            Self::Float(_) => "Float",
        }
    }
}

///The value types a module can accept, so configuration can refer to outputs by name.
#[derive(Debug)]
pub enum OutputKind {
    Bool(Output<bool>),
    Float(Output<f64>),
    Color(Output<Rgb>),
}

impl OutputKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "Bool",
            Self::Float(_) => "Float",
            Self::Color(_) => "Color",
        }
    }
}

///Everything a built module hands to the application: named inputs and outputs, and one handle that finishes
///when all of the module's tasks have.
pub struct ModuleIO {
    pub join_handle: JoinHandle<()>,
    pub inputs: HashMap<String, InputKind>,
    pub outputs: HashMap<String, OutputKind>,
}

///Builds a module from its configuration.
///
/// A PbHub is one module: each configured pin, sensor or LED strip on it becomes one named input or output.
/// The builder carries what does not come from configuration, such as a way to open an I2C bus. Long-running
/// tasks of the module stop when `cancel_token` fires.
pub trait ModuleBuilder {
    type Config;
    type Module: Into<ModuleIO>;

    fn try_build(
        &self,
        cfg: &Self::Config,
        cancel_token: CancellationToken,
    ) -> impl Future<Output = Result<Self::Module, BuildError>>;
}
