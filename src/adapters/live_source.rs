//! Live event source over a [`LiveStreamAdapter`].
//!
//! Each subscribed feed is forwarded by its own task into one channel, so
//! events reach the runner in arrival order. Every stream keeps its own
//! clock: ticks per instrument, candle closes per instrument and timeframe.
//! An event older than the last one delivered on its stream is dropped with
//! a warning instead of being delivered out of order. A candle close that is
//! published after the next bar's first tick is still delivered.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::error::TickloomError;
use crate::domain::market::{MarketEvent, Timeframe};
use crate::domain::subscription::Subscription;
use crate::ports::event_source::EventSource;
use crate::ports::stream_port::LiveStreamAdapter;

/// Ticks carry no timeframe; candle closes are ordered per timeframe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    instrument: String,
    timeframe: Option<Timeframe>,
}

impl StreamKey {
    fn of(event: &MarketEvent) -> Self {
        let timeframe = match event {
            MarketEvent::Tick(_) => None,
            MarketEvent::CandleClose(c) => Some(c.timeframe),
        };
        Self {
            instrument: event.instrument().to_string(),
            timeframe,
        }
    }
}

pub struct LiveEventSource {
    adapter: Arc<dyn LiveStreamAdapter>,
    subscribed: Vec<Subscription>,
    events: mpsc::Receiver<MarketEvent>,
    forwarders: Vec<JoinHandle<()>>,
    last_seen: HashMap<StreamKey, DateTime<Utc>>,
    dropped: u64,
    closed: bool,
}

impl LiveEventSource {
    /// Subscribe every feed in `subscriptions`. If one subscription fails the
    /// feeds already opened are released before the error is returned.
    pub async fn connect(
        adapter: Arc<dyn LiveStreamAdapter>,
        subscriptions: Vec<Subscription>,
        capacity: usize,
    ) -> Result<Self, TickloomError> {
        let (tx, events) = mpsc::channel(capacity.max(1));
        let mut subscribed = Vec::with_capacity(subscriptions.len());
        let mut forwarders: Vec<JoinHandle<()>> = Vec::with_capacity(subscriptions.len());

        for sub in subscriptions {
            let mut feed = match adapter.subscribe(&sub).await {
                Ok(feed) => feed,
                Err(e) => {
                    warn!(instrument = %sub.instrument, feed = %sub, error = %e, "subscribe failed");
                    for task in &forwarders {
                        task.abort();
                    }
                    for opened in &subscribed {
                        if let Err(e) = adapter.unsubscribe(opened).await {
                            warn!(feed = %opened, error = %e, "unsubscribe failed");
                        }
                    }
                    return Err(e);
                }
            };
            debug!(feed = %sub, "subscribed");
            let tx = tx.clone();
            forwarders.push(tokio::spawn(async move {
                while let Some(event) = feed.recv().await {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
            }));
            subscribed.push(sub);
        }
        info!(feeds = subscribed.len(), "live source connected");

        Ok(Self {
            adapter,
            subscribed,
            events,
            forwarders,
            last_seen: HashMap::new(),
            dropped: 0,
            closed: false,
        })
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscribed
    }

    /// Events discarded for arriving behind their stream's clock.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[async_trait]
impl EventSource for LiveEventSource {
    async fn next_event(&mut self) -> Result<Option<MarketEvent>, TickloomError> {
        while let Some(event) = self.events.recv().await {
            let ts = event.timestamp();
            let key = StreamKey::of(&event);
            match self.last_seen.get(&key) {
                Some(&last) if ts < last => {
                    self.dropped += 1;
                    let err = TickloomError::data(
                        event.instrument(),
                        Some(ts),
                        format!("event older than last delivered {}", last.to_rfc3339()),
                    );
                    warn!(error = %err, "out-of-order live event dropped");
                }
                _ => {
                    self.last_seen.insert(key, ts);
                    return Ok(Some(event));
                }
            }
        }
        Ok(None)
    }

    async fn close(&mut self) -> Result<(), TickloomError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        for task in self.forwarders.drain(..) {
            task.abort();
        }
        self.events.close();

        let mut first_error = None;
        for sub in &self.subscribed {
            match self.adapter.unsubscribe(sub).await {
                Ok(()) => debug!(feed = %sub, "unsubscribed"),
                Err(e) => {
                    warn!(feed = %sub, error = %e, "unsubscribe failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        info!(feeds = self.subscribed.len(), dropped = self.dropped, "live source closed");
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorKind;
    use crate::domain::market::{Candle, CandleClose, Tick};
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedStream {
        feeds: Mutex<HashMap<Subscription, Vec<MarketEvent>>>,
        failing: Option<Subscription>,
        subscribed: Mutex<Vec<Subscription>>,
        unsubscribed: Mutex<Vec<Subscription>>,
    }

    #[async_trait]
    impl LiveStreamAdapter for ScriptedStream {
        async fn subscribe(
            &self,
            subscription: &Subscription,
        ) -> Result<mpsc::Receiver<MarketEvent>, TickloomError> {
            if self.failing.as_ref() == Some(subscription) {
                return Err(TickloomError::data(
                    &subscription.instrument,
                    None,
                    "epic not found",
                ));
            }
            let events = self
                .feeds
                .lock()
                .unwrap()
                .remove(subscription)
                .unwrap_or_default();
            let (tx, rx) = mpsc::channel(events.len() + 1);
            for event in events {
                tx.try_send(event).unwrap();
            }
            self.subscribed.lock().unwrap().push(subscription.clone());
            Ok(rx)
        }

        async fn unsubscribe(&self, subscription: &Subscription) -> Result<(), TickloomError> {
            self.unsubscribed.lock().unwrap().push(subscription.clone());
            Ok(())
        }
    }

    fn tick(instrument: &str, second: i64) -> MarketEvent {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + Duration::seconds(second);
        MarketEvent::Tick(Tick {
            instrument: instrument.into(),
            bid: 1.0,
            offer: 1.0002,
            timestamp: ts,
        })
    }

    fn close(instrument: &str, timeframe: Timeframe, second: i64) -> MarketEvent {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + Duration::seconds(second);
        MarketEvent::CandleClose(CandleClose {
            instrument: instrument.into(),
            timeframe,
            candle: Candle {
                timestamp: ts,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 0.0,
                tick_count: 0,
            },
        })
    }

    fn stream(feeds: Vec<(Subscription, Vec<MarketEvent>)>) -> ScriptedStream {
        ScriptedStream {
            feeds: Mutex::new(feeds.into_iter().collect()),
            ..Default::default()
        }
    }

    async fn drain(source: &mut LiveEventSource) -> Vec<MarketEvent> {
        let mut out = Vec::new();
        while let Some(event) = source.next_event().await.unwrap() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn forwards_until_feeds_end() {
        let sub = Subscription::market("EURUSD");
        let adapter = Arc::new(stream(vec![(
            sub.clone(),
            vec![tick("EURUSD", 0), tick("EURUSD", 1), tick("EURUSD", 1)],
        )]));
        let mut source = LiveEventSource::connect(adapter, vec![sub], 8).await.unwrap();
        assert_eq!(drain(&mut source).await.len(), 3);
        assert_eq!(source.dropped(), 0);
    }

    #[tokio::test]
    async fn drops_events_behind_instrument_clock() {
        let sub = Subscription::market("EURUSD");
        let adapter = Arc::new(stream(vec![(
            sub.clone(),
            vec![tick("EURUSD", 5), tick("EURUSD", 3), tick("EURUSD", 6)],
        )]));
        let mut source = LiveEventSource::connect(adapter, vec![sub], 8).await.unwrap();
        let events = drain(&mut source).await;
        let seconds: Vec<i64> = events
            .iter()
            .map(|e| (e.timestamp() - tick("X", 0).timestamp()).num_seconds())
            .collect();
        assert_eq!(seconds, vec![5, 6]);
        assert_eq!(source.dropped(), 1);
    }

    #[tokio::test]
    async fn late_candle_close_is_ordered_on_its_own_stream() {
        let sub = Subscription::chart("EURUSD", Timeframe::OneMinute);
        let adapter = Arc::new(stream(vec![(
            sub.clone(),
            vec![
                tick("EURUSD", 62),
                close("EURUSD", Timeframe::OneMinute, 60),
                close("EURUSD", Timeframe::Hour, 0),
                close("EURUSD", Timeframe::OneMinute, 0),
                tick("EURUSD", 61),
            ],
        )]));
        let mut source = LiveEventSource::connect(adapter, vec![sub], 8).await.unwrap();
        let events = drain(&mut source).await;
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[1], MarketEvent::CandleClose(c) if c.timeframe == Timeframe::OneMinute));
        assert!(matches!(&events[2], MarketEvent::CandleClose(c) if c.timeframe == Timeframe::Hour));
        assert_eq!(source.dropped(), 2);
    }

    #[tokio::test]
    async fn close_unsubscribes_every_feed_once() {
        let subs = vec![
            Subscription::chart("EURUSD", Timeframe::Hour),
            Subscription::market("GBPUSD"),
        ];
        let adapter = Arc::new(stream(Vec::new()));
        let mut source = LiveEventSource::connect(adapter.clone(), subs.clone(), 8)
            .await
            .unwrap();
        assert_eq!(source.subscriptions(), &subs[..]);
        source.close().await.unwrap();
        source.close().await.unwrap();
        assert_eq!(*adapter.unsubscribed.lock().unwrap(), subs);
        assert!(source.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_subscribe_releases_opened_feeds() {
        let good = Subscription::market("EURUSD");
        let bad = Subscription::market("XXXYYY");
        let adapter = Arc::new(ScriptedStream {
            failing: Some(bad.clone()),
            ..Default::default()
        });
        let err = LiveEventSource::connect(adapter.clone(), vec![good.clone(), bad], 8)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Data);
        assert_eq!(*adapter.unsubscribed.lock().unwrap(), vec![good]);
    }
}
