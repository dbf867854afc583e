//! Print Schedule Integration Tests
//!
//! Runs the ingest consumer and the print scheduler together on a paused
//! clock and checks what reaches the sink on each tick.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use aggregate_window::{
    IngestService, LineFormatter, MemorySink, PrintScheduler, SharedWindow, WindowAggregator,
};

const INTERVAL: Duration = Duration::from_secs(30);

fn frame(start_secs: u64) -> String {
    let start = start_secs * 1_000;
    format!(
        r#"[{{"ev":"XA","pair":"BTC-USD","s":{start},"e":{},"o":10,"c":11,"h":12,"l":9,"vw":10.5}}]"#,
        start + 60_000
    )
}

struct Pipeline {
    window: SharedWindow,
    sink: Arc<MemorySink>,
    frames: mpsc::Sender<String>,
    cancel: CancellationToken,
    ingest: tokio::task::JoinHandle<aggregate_window::IngestTotals>,
    scheduler: tokio::task::JoinHandle<Result<(), aggregate_window::SinkError>>,
}

impl Pipeline {
    fn start() -> Self {
        let window = WindowAggregator::default().into_shared();
        let sink = Arc::new(MemorySink::new());
        let cancel = CancellationToken::new();
        let (frames, rx) = mpsc::channel(64);

        let ingest = tokio::spawn(IngestService::new(Arc::clone(&window), rx).run());
        let scheduler = tokio::spawn(
            PrintScheduler::new(
                Arc::clone(&window),
                sink.clone(),
                LineFormatter::utc(),
                INTERVAL,
                cancel.clone(),
            )
            .run(),
        );

        Self {
            window,
            sink,
            frames,
            cancel,
            ingest,
            scheduler,
        }
    }

    async fn send(&self, start_secs: u64) {
        self.frames.send(frame(start_secs)).await.unwrap();
    }

    async fn stop(self) -> aggregate_window::IngestTotals {
        self.cancel.cancel();
        drop(self.frames);
        self.scheduler.await.unwrap().unwrap();
        self.ingest.await.unwrap()
    }
}

#[tokio::test(start_paused = true)]
async fn nothing_printed_before_first_interval() {
    let pipeline = Pipeline::start();
    pipeline.send(1_000).await;
    pipeline.send(940).await;

    sleep(INTERVAL - Duration::from_secs(1)).await;
    assert!(pipeline.sink.batch_sizes().is_empty());

    sleep(Duration::from_secs(2)).await;
    assert_eq!(pipeline.sink.batch_sizes(), vec![1]);

    pipeline.stop().await;
}

#[tokio::test(start_paused = true)]
async fn mode_follows_arrival_order_across_ticks() {
    let pipeline = Pipeline::start();

    // Tick 1: empty window prints nothing.
    sleep(INTERVAL + Duration::from_secs(1)).await;
    assert!(pipeline.sink.batch_sizes().is_empty());

    // Tick 2: in-order bars, latest only.
    pipeline.send(1_200).await;
    pipeline.send(1_140).await;
    sleep(INTERVAL).await;
    assert_eq!(pipeline.sink.batch_sizes(), vec![1]);
    assert_eq!(
        pipeline.sink.lines(),
        vec!["\"1970-01-01T00:20:00Z\" - open: 10, close: 11, high: 12, low: 9, volume: 10.5"]
    );

    // Tick 3: a late bar, whole window.
    pipeline.send(1_170).await;
    sleep(INTERVAL).await;
    assert_eq!(pipeline.sink.batch_sizes(), vec![1, 3]);

    // Tick 4: nothing new, flag unchanged, whole window again.
    sleep(INTERVAL).await;
    assert_eq!(pipeline.sink.batch_sizes(), vec![1, 3, 3]);

    // Tick 5: an older bar lands at the tail untouched, head only again.
    pipeline.send(1_110).await;
    sleep(INTERVAL).await;
    assert_eq!(pipeline.sink.batch_sizes(), vec![1, 3, 3, 1]);
    assert_eq!(
        pipeline.sink.lines().last().unwrap(),
        "\"1970-01-01T00:20:00Z\" - open: 10, close: 11, high: 12, low: 9, volume: 10.5"
    );

    // Tick 6: a newer bar moves to the head, which is a reorder.
    pipeline.send(1_260).await;
    sleep(INTERVAL).await;
    assert_eq!(pipeline.sink.batch_sizes(), vec![1, 3, 3, 1, 5]);

    let totals = pipeline.stop().await;
    assert_eq!(totals.accepted, 5);
}

#[tokio::test(start_paused = true)]
async fn full_window_is_printed_newest_first() {
    let pipeline = Pipeline::start();
    for start in [60, 180, 120] {
        pipeline.send(start).await;
    }

    sleep(INTERVAL + Duration::from_secs(1)).await;

    let lines = pipeline.sink.lines();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("\"1970-01-01T00:03:00Z\""));
    assert!(lines[1].starts_with("\"1970-01-01T00:02:00Z\""));
    assert!(lines[2].starts_with("\"1970-01-01T00:01:00Z\""));

    pipeline.stop().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_drains_queued_frames() {
    let pipeline = Pipeline::start();
    for start in [300, 240, 180, 120] {
        pipeline.send(start).await;
    }
    pipeline.frames.send("{not json".to_string()).await.unwrap();

    let window = Arc::clone(&pipeline.window);
    let totals = pipeline.stop().await;

    assert_eq!(totals.frames, 5);
    assert_eq!(totals.invalid_frames, 1);
    assert_eq!(totals.accepted, 4);
    assert_eq!(window.read().len(), 4);
    assert!(window.read().is_order_preserved());
}
