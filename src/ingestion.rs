//! Ingestion - single consumer of the feed channel
//!
//! The socket task only forwards frames. Everything that mutates state
//! (ledger updates, sink appends) happens here, one message at a time, so
//! the channel is the only serialization point between the two tasks.
//!
//! ```text
//! ws_client (socket task) --mpsc<FeedMessage>--> Ingestion --> decoder --> EventRouter
//! ```

use crate::decoder::{decode, split_records, Decoded};
use crate::feed::ws_client::{ClientError, FeedHandler};
use crate::router::EventRouter;
use crate::sink::SinkError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Debug)]
pub enum FeedMessage {
    Connected,
    Frame {
        payload: Vec<u8>,
        received_at: DateTime<Utc>,
    },
    Disconnected(String),
}

/// Forwards feed callbacks into the ingestion channel
pub struct ChannelHandler {
    tx: mpsc::Sender<FeedMessage>,
}

impl ChannelHandler {
    pub fn new(tx: mpsc::Sender<FeedMessage>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl FeedHandler for ChannelHandler {
    async fn on_connect(&mut self) {
        let _ = self.tx.send(FeedMessage::Connected).await;
    }

    async fn on_frame(&mut self, payload: Vec<u8>, received_at: DateTime<Utc>) -> ControlFlow<()> {
        let capacity = self.tx.max_capacity();
        let used = capacity - self.tx.capacity();
        if used > capacity / 2 {
            log::warn!("⚠️  Ingestion channel usage high: {}/{}", used, capacity);
        }

        // Blocking send: a full channel slows the socket rather than dropping rows
        match self
            .tx
            .send(FeedMessage::Frame {
                payload,
                received_at,
            })
            .await
        {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(()),
        }
    }

    async fn on_disconnect(&mut self, reason: &str) {
        let _ = self
            .tx
            .send(FeedMessage::Disconnected(reason.to_string()))
            .await;
    }

    async fn on_error(&mut self, err: &ClientError) {
        log::debug!("Feed error forwarded to ingestion: {}", err);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionReport {
    pub frames: u64,
    pub events: u64,
    pub ignored: u64,
    pub disconnects: u64,
}

pub struct Ingestion {
    router: EventRouter,
    report: IngestionReport,
}

impl Ingestion {
    pub fn new(router: EventRouter) -> Self {
        Self {
            router,
            report: IngestionReport::default(),
        }
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn report(&self) -> IngestionReport {
        self.report
    }

    /// Handle one channel message. A sink error is fatal to ingestion.
    pub async fn handle(&mut self, message: FeedMessage) -> Result<(), SinkError> {
        match message {
            FeedMessage::Connected => {
                log::info!(
                    "### opened ### ({} open rounds carried over)",
                    self.router.ledger().len()
                );
            }
            FeedMessage::Frame {
                payload,
                received_at,
            } => {
                self.report.frames += 1;
                for record in split_records(&payload) {
                    match decode(record) {
                        Decoded::Event(event) => {
                            self.report.events += 1;
                            self.router.route(event, received_at).await?;
                        }
                        Decoded::Ignored(_) => self.report.ignored += 1,
                    }
                }
            }
            FeedMessage::Disconnected(reason) => {
                self.report.disconnects += 1;
                log::warn!(
                    "Feed disconnected ({}), keeping {} open rounds until reconnect",
                    reason,
                    self.router.ledger().len()
                );
            }
        }
        Ok(())
    }

    fn log_throughput(&self, elapsed: Duration) {
        let stats = self.router.stats();
        let secs = elapsed.as_secs_f64().max(1.0);
        log::info!(
            "📊 {} frames ({:.1}/s), {} events, {} ignored | {} rows, {} rounds closed, {} open",
            self.report.frames,
            self.report.frames as f64 / secs,
            self.report.events,
            self.report.ignored,
            stats.rows_written,
            stats.rounds_closed,
            self.router.ledger().len()
        );
    }

    /// Consume the channel until every sender is gone or the sink fails.
    ///
    /// Open rounds are discarded at the end; they are logged so the loss is
    /// visible.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<FeedMessage>,
        stats_interval: Duration,
    ) -> Result<IngestionReport, SinkError> {
        log::info!("🚀 Ingestion started ({} backend)", self.router.backend_type());

        let started = std::time::Instant::now();
        let mut stats_timer = interval(stats_interval);
        stats_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        stats_timer.tick().await;

        loop {
            tokio::select! {
                message = rx.recv() => {
                    let Some(message) = message else { break };
                    if let Err(e) = self.handle(message).await {
                        log::error!("❌ Sink write failed, stopping ingestion: {}", e);
                        let _ = self.router.flush().await;
                        return Err(e);
                    }
                }
                _ = stats_timer.tick() => {
                    if self.report.frames > 0 {
                        self.log_throughput(started.elapsed());
                    }
                }
            }
        }

        let open = self.router.ledger().open_rounds();
        if !open.is_empty() {
            log::warn!(
                "Discarding {} open rounds without summary: {:?}",
                open.len(),
                open.iter().map(|r| r.as_str()).collect::<Vec<_>>()
            );
        }

        self.router.flush().await?;
        self.log_throughput(started.elapsed());
        log::info!("✅ Ingestion stopped");

        Ok(self.report)
    }
}
