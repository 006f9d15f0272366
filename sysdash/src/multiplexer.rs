//! Per-connection event loop: samples each metric family on its own timer and
//! streams the results to one client until it disconnects or the server stops.

use crate::config::Config;
use crate::encoder::EventWriter;
use crate::metrics::{storage_usage, MetricSource};
use crate::probe::ServiceProbe;
use crate::rate::{format_uptime, RateTracker};
use crate::types::{CpuLoad, MetricSample, NetworkThroughput, ServiceStatus, Uptime};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior};
use tracing::debug;

/// How often each metric family is re-sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub cpu: Duration,
    pub memory: Duration,
    pub network: Duration,
    pub storage: Duration,
    pub uptime: Duration,
    pub services: Duration,
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            cpu: Duration::from_secs(1),
            memory: Duration::from_secs(1),
            network: Duration::from_secs(1),
            storage: Duration::from_secs(5),
            uptime: Duration::from_secs(60),
            services: Duration::from_secs(300),
        }
    }
}

// First tick one full period after start: the snapshot already covered t=0.
fn ticker(period: Duration) -> Interval {
    let mut t = interval_at(Instant::now() + period, period);
    t.set_missed_tick_behavior(MissedTickBehavior::Skip);
    t
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Resolves once shutdown is requested or the sender is gone.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

pub struct TelemetryMultiplexer<S> {
    source: S,
    config: Arc<Config>,
    probe: ServiceProbe,
    cadence: Cadence,
    writer: EventWriter,
    shutdown: watch::Receiver<bool>,
    rates: RateTracker,
    boot_time: Option<u64>,
}

impl<S: MetricSource> TelemetryMultiplexer<S> {
    pub fn new(
        source: S,
        config: Arc<Config>,
        probe: ServiceProbe,
        writer: EventWriter,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            config,
            probe,
            cadence: Cadence::default(),
            writer,
            shutdown,
            rates: RateTracker::new(),
            boot_time: None,
        }
    }

    pub fn with_cadence(mut self, cadence: Cadence) -> Self {
        self.cadence = cadence;
        self
    }

    /// Streams until the client goes away or shutdown is signalled. Returns the
    /// number of frames written.
    pub async fn run(mut self) -> u64 {
        if self.send_snapshot().await.is_continue() {
            self.periodic().await;
        }
        let written = self.writer.written();
        debug!(frames = written, "telemetry stream closed");
        written
    }

    async fn send_snapshot(&mut self) -> ControlFlow<()> {
        let host = self.source.host_info();
        self.emit(MetricSample::SystemInfo { data: host }).await?;
        let services = self.config.services.clone();
        self.emit(MetricSample::ServiceList { data: services }).await?;
        self.tick_uptime().await?;
        self.tick_storage().await?;
        self.settle_cpu().await?;
        self.tick_cpu().await?;
        self.tick_memory().await?;
        // Seeds the rate tracker; rates read zero here.
        self.tick_network().await?;
        self.probe_services().await
    }

    async fn periodic(&mut self) {
        let mut cpu = ticker(self.cadence.cpu);
        let mut memory = ticker(self.cadence.memory);
        let mut network = ticker(self.cadence.network);
        let mut storage = ticker(self.cadence.storage);
        let mut uptime = ticker(self.cadence.uptime);
        let mut services = ticker(self.cadence.services);

        loop {
            let flow = tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => ControlFlow::Break(()),
                _ = self.writer.closed() => ControlFlow::Break(()),
                _ = cpu.tick() => self.tick_cpu().await,
                _ = memory.tick() => self.tick_memory().await,
                _ = network.tick() => self.tick_network().await,
                _ = storage.tick() => self.tick_storage().await,
                _ = uptime.tick() => self.tick_uptime().await,
                _ = services.tick() => self.probe_services().await,
            };
            if flow.is_break() {
                break;
            }
        }
        // Intervals drop here, stopping all periodic work for this client.
    }

    /// Writes one event unless shutdown wins the race.
    async fn emit(&mut self, sample: MetricSample) -> ControlFlow<()> {
        tokio::select! {
            biased;
            _ = shutdown_requested(&mut self.shutdown) => ControlFlow::Break(()),
            flow = self.writer.write(&sample) => flow,
        }
    }

    /// Holds the first cpu reading until the source can measure a real interval.
    async fn settle_cpu(&mut self) -> ControlFlow<()> {
        let wait = self.source.cpu_settle();
        if wait.is_zero() {
            return ControlFlow::Continue(());
        }
        tokio::select! {
            biased;
            _ = shutdown_requested(&mut self.shutdown) => ControlFlow::Break(()),
            _ = self.writer.closed() => ControlFlow::Break(()),
            _ = sleep(wait) => ControlFlow::Continue(()),
        }
    }

    async fn tick_cpu(&mut self) -> ControlFlow<()> {
        match self.source.cpu_percent() {
            Ok(cpu) => {
                self.emit(MetricSample::CpuLoad {
                    data: CpuLoad { cpu },
                })
                .await
            }
            Err(e) => {
                debug!("cpu sample skipped: {e}");
                ControlFlow::Continue(())
            }
        }
    }

    async fn tick_memory(&mut self) -> ControlFlow<()> {
        match self.source.memory() {
            Ok(data) => self.emit(MetricSample::MemoryUsage { data }).await,
            Err(e) => {
                debug!("memory sample skipped: {e}");
                ControlFlow::Continue(())
            }
        }
    }

    async fn tick_network(&mut self) -> ControlFlow<()> {
        let (rx, tx) = match self.source.net_counters() {
            Ok(v) => v,
            Err(e) => {
                debug!("network sample skipped: {e}");
                return ControlFlow::Continue(());
            }
        };
        let rates = self.rates.observe(rx, tx);
        self.emit(MetricSample::NetworkThroughput {
            data: NetworkThroughput {
                rx,
                tx,
                rate_rx: rates.rx,
                rate_tx: rates.tx,
            },
        })
        .await
    }

    async fn tick_storage(&mut self) -> ControlFlow<()> {
        let data = storage_usage(self.source.mounts());
        self.emit(MetricSample::StorageUsage { data }).await
    }

    async fn tick_uptime(&mut self) -> ControlFlow<()> {
        let boot = match self.boot_time {
            Some(b) => b,
            None => match self.source.boot_time() {
                Ok(b) => *self.boot_time.insert(b),
                Err(e) => {
                    debug!("uptime sample skipped: {e}");
                    return ControlFlow::Continue(());
                }
            },
        };
        let uptime = format_uptime(unix_now().saturating_sub(boot));
        self.emit(MetricSample::Uptime {
            data: Uptime { uptime },
        })
        .await
    }

    /// Probes every configured service in order, one frame each. The other
    /// timers wait while this runs, up to the probe timeout per service.
    async fn probe_services(&mut self) -> ControlFlow<()> {
        let config = Arc::clone(&self.config);
        for svc in &config.services {
            let status = tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => return ControlFlow::Break(()),
                status = self.probe.check(&svc.url) => status,
            };
            self.emit(MetricSample::ServiceStatus {
                name: svc.name.clone(),
                data: ServiceStatus { status },
            })
            .await?;
        }
        ControlFlow::Continue(())
    }
}
