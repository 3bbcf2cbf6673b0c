use std::{sync::Arc, time::Duration};

use embedded_hal::i2c;
use futures::{
    stream::{self, BoxStream},
    StreamExt,
};
use pbhub_core::Input;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval_at, Instant, Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::hub::HubDevice;
use super::registers::SlotIndex;
use crate::error::PbHubError;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

///Maps a raw sample to the published value.
pub type AdcFilter = Box<dyn FnMut(u16) -> f64 + Send>;

///Poller health, published next to the sampled value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdcHealth {
    ///No tick has completed yet.
    Waiting,
    Ok,
    ///The last ticks failed but fewer than the failure threshold.
    Degraded { consecutive_failures: u32 },
    Failing { consecutive_failures: u32 },
}

///The ADC input of one slot, sampled every `interval`.
pub struct AdcChannel<I2C> {
    hub: Arc<HubDevice<I2C>>,
    slot: SlotIndex,
    interval: Duration,
}

impl<I2C> AdcChannel<I2C>
where
    I2C: i2c::I2c + Send + 'static,
{
    pub fn new(hub: Arc<HubDevice<I2C>>, slot: SlotIndex, interval: Duration) -> Result<Self, PbHubError> {
        if interval.is_zero() {
            return Err(PbHubError::OutOfRange {
                what: "poll interval ms",
                value: 0,
                max: u32::MAX,
            });
        }
        Ok(Self { hub, slot, interval })
    }

    pub fn slot(&self) -> SlotIndex {
        self.slot
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    ///One sample, outside the polling cadence.
    pub fn read(&self) -> Result<u16, PbHubError> {
        self.hub.adc_read(self.slot)
    }

    ///An endless stream with one item per tick. Nothing happens until it is first polled; the first sample is
    ///taken one interval after that. Every call starts a fresh stream.
    pub fn readings(&self) -> BoxStream<'static, Result<u16, PbHubError>> {
        let hub = self.hub.clone();
        let slot = self.slot;
        let period = self.interval;

        stream::unfold(None, move |ticker: Option<Interval>| {
            let hub = hub.clone();
            async move {
                let mut ticker = ticker.unwrap_or_else(|| {
                    let mut ticker = interval_at(Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    ticker
                });
                ticker.tick().await;
                Some((hub.adc_read(slot), Some(ticker)))
            }
        })
        .boxed()
    }

    ///Spawns the polling task. See `AdcPoller`.
    pub fn spawn_poller(
        &self,
        filter: Option<AdcFilter>,
        failure_threshold: u32,
        cancel_token: CancellationToken,
    ) -> AdcPoller {
        let (value, value_tx) = Input::new(f64::NAN);
        let (health, health_tx) = Input::new(AdcHealth::Waiting);
        let filter = filter.unwrap_or_else(|| Box::new(|raw: u16| raw as f64));

        let join_handle = spawn_adc_poll_task(
            self.readings(),
            self.slot,
            filter,
            failure_threshold.max(1),
            value_tx,
            health_tx,
            cancel_token,
        );

        AdcPoller {
            join_handle,
            value,
            health,
        }
    }
}

///A running poller. Failed ticks are skipped and reported through `health`; the task only stops when cancelled
///or when `value` is dropped.
pub struct AdcPoller {
    pub join_handle: JoinHandle<()>,
    pub value: Input<f64>,
    pub health: Input<AdcHealth>,
}

fn spawn_adc_poll_task(
    mut readings: BoxStream<'static, Result<u16, PbHubError>>,
    slot: SlotIndex,
    mut filter: AdcFilter,
    failure_threshold: u32,
    value_tx: watch::Sender<f64>,
    health_tx: watch::Sender<AdcHealth>,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut consecutive_failures = 0u32;
        loop {
            let reading = tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = value_tx.closed() => {
                    debug!("slot {} ADC value dropped, stopping poller", slot.get());
                    break;
                }
                reading = readings.next() => reading,
            };
            match reading {
                Some(Ok(raw)) => {
                    if consecutive_failures > 0 {
                        debug!("slot {} ADC recovered after {} failed ticks", slot.get(), consecutive_failures);
                    }
                    consecutive_failures = 0;
                    health_tx.send_replace(AdcHealth::Ok);
                    if let Err(err) = value_tx.send(filter(raw)) {
                        warn!("error publishing slot {} ADC value, shutting down poller. {:?}", slot.get(), err);
                        break;
                    }
                }
                Some(Err(err)) => {
                    consecutive_failures += 1;
                    let health = if consecutive_failures >= failure_threshold {
                        error!(
                            "slot {} ADC failed {} ticks in a row: {}",
                            slot.get(),
                            consecutive_failures,
                            err
                        );
                        AdcHealth::Failing { consecutive_failures }
                    } else {
                        warn!("slot {} ADC tick skipped: {}", slot.get(), err);
                        AdcHealth::Degraded { consecutive_failures }
                    };
                    health_tx.send_replace(health);
                }
                None => break,
            }
        }
        debug!("slot {} ADC poller shutting down", slot.get());
    })
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use embedded_hal::i2c::ErrorKind;
    use futures::StreamExt;
    use tokio::time::{sleep, Instant};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::pbhub::{mock::MockI2c, registers::HubAddress};

    fn channel(interval_ms: u64) -> (AdcChannel<MockI2c>, MockI2c) {
        let mock = MockI2c::new();
        let hub = Arc::new(HubDevice::new(mock.clone(), HubAddress::default()));
        let slot = SlotIndex::try_from(1).unwrap();
        (AdcChannel::new(hub, slot, Duration::from_millis(interval_ms)).unwrap(), mock)
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mock = MockI2c::new();
        let hub = Arc::new(HubDevice::new(mock, HubAddress::default()));
        let slot = SlotIndex::try_from(0).unwrap();
        assert!(matches!(
            AdcChannel::new(hub, slot, Duration::ZERO),
            Err(PbHubError::OutOfRange { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn readings_are_lazy() {
        let (adc, mock) = channel(1000);
        let readings = adc.readings();
        sleep(Duration::from_secs(5)).await;
        assert_eq!(mock.read_count(), 0);
        drop(readings);
    }

    #[tokio::test(start_paused = true)]
    async fn poller_reads_once_per_interval() {
        let (adc, mock) = channel(1000);
        let cancel = CancellationToken::new();
        let poller = adc.spawn_poller(None, DEFAULT_FAILURE_THRESHOLD, cancel.clone());

        sleep(Duration::from_millis(3500)).await;
        assert_eq!(mock.read_count(), 3);

        cancel.cancel();
        poller.join_handle.await.unwrap();
        sleep(Duration::from_secs(2)).await;
        assert_eq!(mock.read_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_is_skipped() {
        let (adc, mock) = channel(1000);
        mock.push_read(&[0x10, 0x00]);
        // both attempts of tick two fail
        mock.push_read_error(ErrorKind::Bus);
        mock.push_read_error(ErrorKind::Bus);
        mock.push_read(&[0x30, 0x00]);

        let start = Instant::now();
        let ticks: Vec<_> = adc.readings().take(3).collect().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_millis(3100));

        assert_eq!(ticks[0], Ok(0x10));
        assert!(matches!(ticks[1], Err(PbHubError::Bus { .. })));
        assert_eq!(ticks[2], Ok(0x30));
    }

    #[tokio::test(start_paused = true)]
    async fn poller_stops_when_value_dropped_while_reads_fail() {
        let (adc, mock) = channel(10);
        for _ in 0..1000 {
            mock.push_read_error(ErrorKind::Bus);
        }

        let poller = adc.spawn_poller(None, DEFAULT_FAILURE_THRESHOLD, CancellationToken::new());
        drop(poller.value);

        tokio::time::timeout(Duration::from_secs(5), poller.join_handle)
            .await
            .expect("poller kept polling")
            .unwrap();
        assert_eq!(mock.read_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn poller_keeps_running_and_escalates() {
        let (adc, mock) = channel(100);
        mock.push_read(&[0x01, 0x00]);
        for _ in 0..4 {
            mock.push_read_error(ErrorKind::Other);
        }
        mock.push_read(&[0x02, 0x00]);

        let cancel = CancellationToken::new();
        let poller = adc.spawn_poller(Some(Box::new(|raw: u16| raw as f64 * 2.0)), 2, cancel.clone());
        let value = poller.value.source();
        let health = poller.health.source();

        sleep(Duration::from_millis(150)).await;
        assert_eq!(*value.borrow(), 2.0);
        assert_eq!(*health.borrow(), AdcHealth::Ok);

        sleep(Duration::from_millis(100)).await;
        assert_eq!(*health.borrow(), AdcHealth::Degraded { consecutive_failures: 1 });

        sleep(Duration::from_millis(100)).await;
        assert_eq!(*health.borrow(), AdcHealth::Failing { consecutive_failures: 2 });

        sleep(Duration::from_millis(100)).await;
        assert_eq!(*value.borrow(), 4.0);
        assert_eq!(*health.borrow(), AdcHealth::Ok);

        cancel.cancel();
        poller.join_handle.await.unwrap();
    }
}
