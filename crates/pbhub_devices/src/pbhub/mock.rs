//! Recording I2C fake used by the driver tests.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use embedded_hal::i2c::{self, ErrorKind, ErrorType, I2c, Operation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    Write { address: u8, register: u8, data: Vec<u8> },
    Read { address: u8, register: u8, len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError(pub ErrorKind);

impl i2c::Error for MockError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

#[derive(Default)]
struct State {
    log: Vec<BusOp>,
    reads: VecDeque<Result<Vec<u8>, ErrorKind>>,
    fail_writes: Option<ErrorKind>,
}

///Clones share state, so a test can keep one handle while the hub owns another.
#[derive(Clone, Default)]
pub struct MockI2c {
    state: Arc<Mutex<State>>,
}

impl MockI2c {
    pub fn new() -> Self {
        Self::default()
    }

    ///Queue the bytes returned by the next read. Reads with nothing queued return zeros.
    pub fn push_read(&self, bytes: &[u8]) {
        self.state.lock().unwrap().reads.push_back(Ok(bytes.to_vec()));
    }

    pub fn push_read_error(&self, kind: ErrorKind) {
        self.state.lock().unwrap().reads.push_back(Err(kind));
    }

    pub fn fail_writes(&self, kind: Option<ErrorKind>) {
        self.state.lock().unwrap().fail_writes = kind;
    }

    pub fn log(&self) -> Vec<BusOp> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn writes(&self) -> Vec<BusOp> {
        self.log()
            .into_iter()
            .filter(|op| matches!(op, BusOp::Write { .. }))
            .collect()
    }

    pub fn read_count(&self) -> usize {
        self.log()
            .iter()
            .filter(|op| matches!(op, BusOp::Read { .. }))
            .count()
    }

    pub fn clear(&self) {
        self.state.lock().unwrap().log.clear();
    }
}

impl ErrorType for MockI2c {
    type Error = MockError;
}

impl I2c for MockI2c {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        // give concurrent callers a chance to interleave if the driver ever lets them
        std::thread::yield_now();
        let mut state = self.state.lock().unwrap();
        match operations {
            [Operation::Write(bytes)] => {
                state.log.push(BusOp::Write {
                    address,
                    register: bytes[0],
                    data: bytes[1..].to_vec(),
                });
                match state.fail_writes {
                    Some(kind) => Err(MockError(kind)),
                    None => Ok(()),
                }
            }
            [Operation::Write(register), Operation::Read(buffer)] => {
                state.log.push(BusOp::Read {
                    address,
                    register: register[0],
                    len: buffer.len(),
                });
                match state.reads.pop_front() {
                    Some(Ok(bytes)) => {
                        let n = bytes.len().min(buffer.len());
                        buffer[..n].copy_from_slice(&bytes[..n]);
                        Ok(())
                    }
                    Some(Err(kind)) => Err(MockError(kind)),
                    None => {
                        buffer.fill(0);
                        Ok(())
                    }
                }
            }
            other => panic!("unexpected transaction with {} operations", other.len()),
        }
    }
}
