//! Serialized event loop around a [`JourneyTracker`].
//!
//! The tracker has exactly two event sources: the raw fix stream and the
//! periodic staleness tick. This loop owns the tracker and `select!`s over
//! both, so every mutation happens on one task in arrival order. Snapshots
//! go out on a watch channel (consumers only ever want the latest); alerts
//! go out on an unbounded channel the loop never awaits, so a slow or dead
//! notification consumer cannot stall location processing.

use chrono::Utc;
use futures_core::Stream;
use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::alert::AlertEvent;
use crate::journey::{JourneySnapshot, JourneyTracker};
use crate::location::PositionFix;

enum RuntimeCommand {
    Stop,
}

/// Control surface for a spawned journey loop.
pub struct RuntimeHandle {
    snapshots: watch::Receiver<Option<JourneySnapshot>>,
    alerts: Option<mpsc::UnboundedReceiver<AlertEvent>>,
    commands: mpsc::Sender<RuntimeCommand>,
    task: JoinHandle<()>,
}

impl RuntimeHandle {
    /// Watch the latest snapshot. Each subscriber sees only the newest
    /// state, never a backlog.
    pub fn snapshots(&self) -> watch::Receiver<Option<JourneySnapshot>> {
        self.snapshots.clone()
    }

    /// Take the alert receiver. Yields each fired alert exactly once;
    /// callable once.
    pub fn take_alerts(&mut self) -> Option<mpsc::UnboundedReceiver<AlertEvent>> {
        self.alerts.take()
    }

    /// Ask the loop to stop and wait for it to wind down. The tracker's
    /// smoothing and inference buffers are discarded before the task exits.
    pub async fn stop(self) {
        let _ = self.commands.send(RuntimeCommand::Stop).await;
        let _ = self.task.await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the single-writer loop for `tracker`, consuming `fixes` until the
/// stream ends or [`RuntimeHandle::stop`] is called.
pub fn spawn<S>(tracker: JourneyTracker, fixes: S) -> RuntimeHandle
where
    S: Stream<Item = PositionFix> + Send + 'static,
{
    let tick_period = tracker.staleness_check_period();
    let (snapshot_tx, snapshot_rx) = watch::channel(None);
    let (alert_tx, alert_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::channel(1);

    let task = tokio::spawn(run(tracker, fixes, tick_period, snapshot_tx, alert_tx, command_rx));

    RuntimeHandle {
        snapshots: snapshot_rx,
        alerts: Some(alert_rx),
        commands: command_tx,
        task,
    }
}

/// A buffered channel whose receiving half is a fix stream, for hosts that
/// push fixes imperatively (platform callbacks, tests).
pub fn fix_channel(buffer: usize) -> (mpsc::Sender<PositionFix>, impl Stream<Item = PositionFix>) {
    let (tx, rx) = mpsc::channel(buffer);
    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|fix| (fix, rx))
    });
    (tx, stream)
}

async fn run<S>(
    mut tracker: JourneyTracker,
    fixes: S,
    tick_period: std::time::Duration,
    snapshot_tx: watch::Sender<Option<JourneySnapshot>>,
    alert_tx: mpsc::UnboundedSender<AlertEvent>,
    mut command_rx: mpsc::Receiver<RuntimeCommand>,
) where
    S: Stream<Item = PositionFix> + Send + 'static,
{
    debug!("journey runtime started");
    tokio::pin!(fixes);

    let mut tick = tokio::time::interval(tick_period);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first interval tick completes immediately; consume it so the
    // staleness check starts one period from now.
    tick.tick().await;

    loop {
        tokio::select! {
            command = command_rx.recv() => {
                match command {
                    Some(RuntimeCommand::Stop) | None => break,
                }
            }

            maybe_fix = fixes.next() => {
                match maybe_fix {
                    Some(fix) => {
                        if let Some(snapshot) = tracker.handle_fix(fix) {
                            if let Some(alert) = snapshot.alert.clone() {
                                // Fire-and-forget: a closed consumer must
                                // not stall the loop.
                                let _ = alert_tx.send(alert);
                            }
                            let _ = snapshot_tx.send(Some(snapshot));
                        }
                    }
                    None => {
                        debug!("fix stream ended");
                        break;
                    }
                }
            }

            _ = tick.tick() => {
                let snapshot = tracker.handle_tick(Utc::now());
                let _ = snapshot_tx.send(Some(snapshot));
            }
        }
    }

    tracker.stop();
    debug!("journey runtime stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeZone;
    use geo::Point;
    use next_stop_transit::{RouteCatalog, RouteDirection, Station, StationIdentifier};
    use tokio::time::{timeout, Duration};

    use crate::config::{JourneyConfig, TrackerConfig};
    use crate::location::PositionSource;

    struct AlwaysOn;

    impl PositionSource for AlwaysOn {
        fn service_enabled(&self) -> bool {
            true
        }

        fn permission_granted(&self) -> bool {
            true
        }
    }

    fn catalog() -> Arc<RouteCatalog> {
        let stations = (0u32..3)
            .map(|i| {
                Station::new(
                    StationIdentifier::new(format!("s{i}")),
                    format!("Station {i}"),
                    Point::new(0.0, 40.0 + i as f64 * 0.01),
                    i,
                    2 - i,
                    i == 0 || i == 2,
                )
            })
            .collect();
        Arc::new(RouteCatalog::from_stations(stations).unwrap())
    }

    fn fix(seconds: i64, lat: f64) -> PositionFix {
        PositionFix {
            latitude: lat,
            longitude: 0.0,
            speed: Some(10.0),
            accuracy: 5.0,
            timestamp: chrono::Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap(),
        }
    }

    fn ready_tracker() -> JourneyTracker {
        let mut tracker = JourneyTracker::new(catalog(), TrackerConfig::default());
        assert!(tracker.start(&AlwaysOn));
        let config = JourneyConfig::new(StationIdentifier::new("s2"))
            .with_direction(RouteDirection::Northbound);
        tracker
            .initialize_journey(&config, chrono::Utc.timestamp_opt(1_700_000_000, 0).unwrap())
            .unwrap();
        tracker
    }

    #[tokio::test]
    async fn test_snapshots_and_alerts_flow() {
        let (fix_tx, fixes) = fix_channel(16);
        let mut handle = spawn(ready_tracker(), fixes);
        let mut snapshots = handle.snapshots();
        let mut alerts = handle.take_alerts().unwrap();

        // Drive to the destination
        for (i, lat) in [40.0, 40.005, 40.01, 40.015, 40.02].iter().enumerate() {
            fix_tx.send(fix(i as i64 * 5, *lat)).await.unwrap();
        }

        // The proximity alert fires first, then the arrival, both through
        // the fire-and-forget channel
        let alert = timeout(Duration::from_secs(5), alerts.recv())
            .await
            .expect("alert in time")
            .expect("alert channel open");
        assert!(matches!(
            alert,
            AlertEvent::Proximity { stations_away: 2, .. }
        ));

        let alert = timeout(Duration::from_secs(5), alerts.recv())
            .await
            .expect("alert in time")
            .expect("alert channel open");
        assert!(matches!(alert, AlertEvent::Arrival { .. }));

        // The watch channel holds the latest snapshot
        timeout(Duration::from_secs(5), snapshots.changed())
            .await
            .expect("snapshot in time")
            .unwrap();
        let progression = snapshots
            .borrow()
            .as_ref()
            .expect("snapshot present")
            .progression
            .clone()
            .expect("journey active");
        assert!(progression.has_arrived || progression.passed_count > 0);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_halts_the_loop() {
        let (_fix_tx, fixes) = fix_channel(4);
        let handle = spawn(ready_tracker(), fixes);

        assert!(!handle.is_finished());
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_closing_the_fix_stream_stops_the_loop() {
        let (fix_tx, fixes) = fix_channel(4);
        let handle = spawn(ready_tracker(), fixes);

        drop(fix_tx);
        timeout(Duration::from_secs(5), handle.stop())
            .await
            .expect("loop winds down");
    }
}
