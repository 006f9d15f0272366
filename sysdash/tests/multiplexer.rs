//! Event loop behaviour against a scripted metric source.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde_json::Value;
use sysdash::config::Config;
use sysdash::encoder::EventWriter;
use sysdash::metrics::{MetricSource, MountStat, SampleError};
use sysdash::multiplexer::TelemetryMultiplexer;
use sysdash::probe::ServiceProbe;
use sysdash::types::{MemoryUsage, ServiceEntry, SysInfo};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

const CAPACITY: usize = 8;

#[derive(Default)]
struct FakeSource {
    fail_memory: bool,
    cpu_settle: Duration,
    rx: u64,
    tx: u64,
}

impl MetricSource for FakeSource {
    fn host_info(&mut self) -> SysInfo {
        SysInfo {
            hostname: "testhost".into(),
            platform: "linux x86_64".into(),
            cpu_model: "Test CPU".into(),
        }
    }

    fn boot_time(&mut self) -> Result<u64, SampleError> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        Ok(now - 90_061)
    }

    fn cpu_percent(&mut self) -> Result<f32, SampleError> {
        Ok(12.5)
    }

    fn cpu_settle(&self) -> Duration {
        self.cpu_settle
    }

    fn memory(&mut self) -> Result<MemoryUsage, SampleError> {
        if self.fail_memory {
            return Err(SampleError::Unavailable("memory"));
        }
        Ok(MemoryUsage {
            mem: 50.0,
            used: 4,
            total: 8,
        })
    }

    fn mounts(&mut self) -> Vec<Result<MountStat, SampleError>> {
        vec![
            Ok(MountStat {
                mount: "/proc".into(),
                used: 0,
                total: 0,
            }),
            Ok(MountStat {
                mount: "/".into(),
                used: 40,
                total: 100,
            }),
            Err(SampleError::Mount {
                mount: "/mnt/gone".into(),
                reason: "io error".into(),
            }),
        ]
    }

    fn net_counters(&mut self) -> Result<(u64, u64), SampleError> {
        self.rx += 100;
        self.tx += 200;
        Ok((self.rx, self.tx))
    }
}

struct Harness {
    mux: TelemetryMultiplexer<FakeSource>,
    frames: mpsc::Receiver<Bytes>,
    shutdown: watch::Sender<bool>,
}

fn harness(source: FakeSource, services: Vec<ServiceEntry>) -> Harness {
    let (tx, frames) = mpsc::channel(CAPACITY);
    let (shutdown, shutdown_rx) = watch::channel(false);
    let config = Arc::new(Config {
        services,
        ..Config::default()
    });
    let probe = ServiceProbe::new(Duration::from_secs(2)).expect("http client");
    let mux = TelemetryMultiplexer::new(source, config, probe, EventWriter::new(tx), shutdown_rx);
    Harness {
        mux,
        frames,
        shutdown,
    }
}

fn parse(frame: &Bytes) -> Value {
    let text = std::str::from_utf8(frame).expect("utf8 frame");
    let json = text
        .strip_prefix("data: ")
        .and_then(|t| t.strip_suffix("\n\n"))
        .expect("sse framing");
    serde_json::from_str(json).expect("json payload")
}

async fn next_event(rx: &mut mpsc::Receiver<Bytes>) -> Value {
    parse(&rx.recv().await.expect("stream still open"))
}

#[tokio::test]
async fn initial_snapshot_order() {
    let h = harness(
        FakeSource::default(),
        vec![ServiceEntry {
            name: "api".into(),
            url: "http://127.0.0.1:1/".into(),
        }],
    );
    let mut frames = h.frames;
    let task = tokio::spawn(h.mux.run());

    let mut types = Vec::new();
    let mut events = Vec::new();
    for _ in 0..8 {
        let ev = next_event(&mut frames).await;
        types.push(ev["type"].as_str().unwrap().to_string());
        events.push(ev);
    }
    assert_eq!(
        types,
        ["sysinfo", "services", "uptime", "storage", "cpu", "mem", "network", "service"]
    );

    assert_eq!(events[0]["data"]["hostname"], "testhost");
    assert_eq!(events[0]["data"]["cpu_model"], "Test CPU");
    assert_eq!(events[1]["data"][0]["name"], "api");
    assert_eq!(events[2]["data"]["uptime"], "1d 1h 1m");
    let storage = events[3]["data"].as_array().unwrap();
    assert_eq!(storage.len(), 1);
    assert_eq!(storage[0]["mount"], "/");
    assert_eq!(storage[0]["percent"], 40.0);
    assert_eq!(events[4]["data"]["cpu"], 12.5);
    assert_eq!(events[6]["data"]["rateRx"], 0);
    assert_eq!(events[6]["data"]["rateTx"], 0);
    assert_eq!(events[7]["name"], "api");
    assert_eq!(events[7]["data"]["status"], "down");

    h.shutdown.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn network_ticks_report_per_interval_rates() {
    let h = harness(FakeSource::default(), vec![]);
    let mut frames = h.frames;
    let task = tokio::spawn(h.mux.run());

    let mut network = Vec::new();
    while network.len() < 3 {
        let ev = next_event(&mut frames).await;
        if ev["type"] == "network" {
            network.push(ev);
        }
    }
    assert_eq!(network[0]["data"]["rx"], 100);
    assert_eq!(network[0]["data"]["rateRx"], 0);
    for ev in &network[1..] {
        assert_eq!(ev["data"]["rateRx"], 100);
        assert_eq!(ev["data"]["rateTx"], 200);
    }
    assert_eq!(network[2]["data"]["tx"], 600);

    h.shutdown.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failing_memory_leaves_other_metrics_running() {
    let source = FakeSource {
        fail_memory: true,
        ..FakeSource::default()
    };
    let h = harness(source, vec![]);
    let mut frames = h.frames;
    let task = tokio::spawn(h.mux.run());

    let mut counts: HashMap<String, usize> = HashMap::new();
    // Run until the 60s uptime tick has fired once after the snapshot.
    while counts.get("uptime").copied().unwrap_or(0) < 2 {
        let ev = next_event(&mut frames).await;
        *counts.entry(ev["type"].as_str().unwrap().to_string()).or_default() += 1;
    }
    h.shutdown.send(true).unwrap();
    task.await.unwrap();

    assert_eq!(counts.get("mem"), None);
    assert!(counts["cpu"] >= 60, "cpu ticks: {}", counts["cpu"]);
    assert!(counts["network"] >= 60, "network ticks: {}", counts["network"]);
    assert!(counts["storage"] >= 12, "storage ticks: {}", counts["storage"]);
    assert_eq!(counts["sysinfo"], 1);
    assert_eq!(counts["services"], 1);
}

#[tokio::test(start_paused = true)]
async fn no_frames_after_shutdown() {
    let h = harness(FakeSource::default(), vec![]);
    let mut frames = h.frames;
    let task = tokio::spawn(h.mux.run());

    let mut received = 0u64;
    while received < 20 {
        frames.recv().await.expect("stream open");
        received += 1;
    }
    h.shutdown.send(true).unwrap();
    let written = task.await.unwrap();

    // Only frames queued before shutdown remain; then the stream ends.
    while frames.recv().await.is_some() {
        received += 1;
    }
    assert_eq!(received, written);

    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(matches!(
        frames.try_recv(),
        Err(mpsc::error::TryRecvError::Disconnected)
    ));
}

#[tokio::test(start_paused = true)]
async fn client_disconnect_ends_the_loop() {
    let h = harness(FakeSource::default(), vec![]);
    let mut frames = h.frames;
    let task = tokio::spawn(h.mux.run());

    next_event(&mut frames).await;
    drop(frames);

    let written = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("loop exits after disconnect")
        .unwrap();
    assert!(written >= 1);
    drop(h.shutdown);
}

#[tokio::test(start_paused = true)]
async fn dropped_shutdown_sender_stops_the_loop() {
    let h = harness(FakeSource::default(), vec![]);
    let task = tokio::spawn(h.mux.run());
    drop(h.shutdown);

    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("loop exits when the server goes away")
        .unwrap();
    drop(h.frames);
}

#[tokio::test(start_paused = true)]
async fn first_cpu_reading_waits_for_a_full_interval() {
    let source = FakeSource {
        cpu_settle: Duration::from_millis(200),
        ..FakeSource::default()
    };
    let h = harness(source, vec![]);
    let mut frames = h.frames;
    let started = tokio::time::Instant::now();
    let task = tokio::spawn(h.mux.run());

    let mut before_cpu = Vec::new();
    loop {
        let ev = next_event(&mut frames).await;
        if ev["type"] == "cpu" {
            break;
        }
        before_cpu.push(ev["type"].as_str().unwrap().to_string());
    }
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(200), "cpu after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(1), "cpu after {elapsed:?}");
    assert_eq!(before_cpu, ["sysinfo", "services", "uptime", "storage"]);

    h.shutdown.send(true).unwrap();
    task.await.unwrap();
}

// Accepts connections and never answers them.
async fn spawn_silent_target() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

#[tokio::test]
async fn shutdown_cuts_an_in_flight_service_check() {
    let addr = spawn_silent_target().await;
    let h = harness(
        FakeSource::default(),
        vec![ServiceEntry {
            name: "stuck".into(),
            url: format!("http://{addr}/health"),
        }],
    );
    let mut frames = h.frames;
    let task = tokio::spawn(h.mux.run());

    // The seven snapshot frames precede the service check.
    for _ in 0..7 {
        next_event(&mut frames).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    let started = std::time::Instant::now();
    h.shutdown.send(true).unwrap();

    let written = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("loop exits before the check times out")
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(written, 7);
    assert!(frames.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn services_are_checked_again_every_five_minutes() {
    let h = harness(
        FakeSource::default(),
        vec![
            ServiceEntry {
                name: "api".into(),
                url: "http://127.0.0.1:1/".into(),
            },
            ServiceEntry {
                name: "web".into(),
                url: "http://127.0.0.1:1/index".into(),
            },
        ],
    );
    let mut frames = h.frames;
    let started = tokio::time::Instant::now();
    let task = tokio::spawn(h.mux.run());

    let mut checks = Vec::new();
    while checks.len() < 4 {
        let ev = next_event(&mut frames).await;
        if ev["type"] == "service" {
            assert_eq!(ev["data"]["status"], "down");
            checks.push((ev["name"].as_str().unwrap().to_string(), started.elapsed()));
        }
    }
    h.shutdown.send(true).unwrap();
    task.await.unwrap();

    let names: Vec<_> = checks.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["api", "web", "api", "web"]);
    assert!(checks[1].1 < Duration::from_secs(300), "first round at {:?}", checks[1].1);
    assert!(checks[2].1 >= Duration::from_secs(300), "second round at {:?}", checks[2].1);
}
