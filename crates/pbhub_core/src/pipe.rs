//! `Pipe` connects an `Input` to an `Output`.

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::debug;

use crate::{Input, Output};

///A running connection. Sends the input's current value, then every change, until either end closes.
pub struct Pipe {
    pub handle: JoinHandle<()>,
}

impl Pipe {
    pub fn new<T>(input: &Input<T>, output: &Output<T>) -> Pipe
    where
        T: Clone + Send + Sync + 'static,
    {
        let handle = tokio::spawn(forward(input.source(), output.sink()));
        Pipe { handle }
    }
}

async fn forward<T: Clone>(mut source: watch::Receiver<T>, sink: mpsc::Sender<T>) {
    loop {
        let value = source.borrow_and_update().clone();
        if sink.send(value).await.is_err() {
            debug!("pipe stopping, its output closed");
            return;
        }
        if source.changed().await.is_err() {
            debug!("pipe stopping, its input closed");
            return;
        }
    }
}
