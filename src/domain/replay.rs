//! Deterministic historical replay.
//!
//! Streams are registered through [`ReplayBuilder`] in a fixed order and
//! merged lazily by [`ReplaySource`]. The merge key is
//! `(timestamp, class, stream index, position in stream)` with class 0 for
//! real ticks and close-boundary synthetic ticks, 1 for candle closes and 2
//! for open-boundary synthetic ticks. A tick therefore always precedes the
//! candle close it contributes to, and equal keys never occur.

use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, VecDeque};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::domain::error::TickloomError;
use crate::domain::market::{Candle, CandleClose, MarketEvent, Tick, Timeframe};

/// Boundary ticks synthesized for instruments that only have candles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyntheticTicks {
    #[default]
    None,
    /// bid = offer = candle open, at the bar's open instant.
    Open,
    /// bid = offer = candle close, at the bar's close instant.
    Close,
}

impl SyntheticTicks {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyntheticTicks::None => "none",
            SyntheticTicks::Open => "open",
            SyntheticTicks::Close => "close",
        }
    }
}

impl fmt::Display for SyntheticTicks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyntheticTicks {
    type Err = TickloomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(SyntheticTicks::None),
            "open" => Ok(SyntheticTicks::Open),
            "close" => Ok(SyntheticTicks::Close),
            other => Err(TickloomError::configuration(format!(
                "unknown synthetic tick mode '{other}' (expected none, open or close)"
            ))),
        }
    }
}

/// Facts about how a replay was assembled, carried into the run report.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReplayProperties {
    pub synthetic_ticks: SyntheticTicks,
    /// Instruments that received synthetic ticks.
    pub synthesized_instruments: Vec<String>,
    /// Stream labels in merge order.
    pub streams: Vec<String>,
    pub evaluation_start: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
enum Stream {
    Candles {
        instrument: String,
        timeframe: Timeframe,
        candles: Vec<Candle>,
    },
    Ticks {
        instrument: String,
        ticks: Vec<Tick>,
    },
}

impl Stream {
    fn label(&self) -> String {
        match self {
            Stream::Candles {
                instrument,
                timeframe,
                ..
            } => format!("{instrument}:{timeframe}"),
            Stream::Ticks { instrument, .. } => format!("{instrument}:TICKS"),
        }
    }

    fn instrument(&self) -> &str {
        match self {
            Stream::Candles { instrument, .. } | Stream::Ticks { instrument, .. } => instrument,
        }
    }
}

#[derive(Debug, Default)]
pub struct ReplayBuilder {
    streams: Vec<Stream>,
    synthetic_ticks: SyntheticTicks,
}

impl ReplayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn synthetic_ticks(mut self, mode: SyntheticTicks) -> Self {
        self.synthetic_ticks = mode;
        self
    }

    /// Register a candle stream. Timestamps must be strictly increasing; on
    /// error nothing is registered.
    pub fn add_candles(
        &mut self,
        instrument: impl Into<String>,
        timeframe: Timeframe,
        candles: Vec<Candle>,
    ) -> Result<(), TickloomError> {
        let instrument = instrument.into();
        if self.streams.iter().any(|s| {
            matches!(s, Stream::Candles { instrument: i, timeframe: tf, .. } if *i == instrument && *tf == timeframe)
        }) {
            return Err(TickloomError::data(
                &instrument,
                None,
                format!("{timeframe} candles registered twice"),
            ));
        }
        for pair in candles.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(TickloomError::data(
                    &instrument,
                    Some(pair[1].timestamp),
                    format!(
                        "{timeframe} candle timestamp not after previous {}",
                        pair[0].timestamp.to_rfc3339()
                    ),
                ));
            }
        }
        debug!(%instrument, %timeframe, candles = candles.len(), "registered candle stream");
        self.streams.push(Stream::Candles {
            instrument,
            timeframe,
            candles,
        });
        Ok(())
    }

    /// Register a tick stream. Timestamps must be non-decreasing.
    pub fn add_ticks(
        &mut self,
        instrument: impl Into<String>,
        ticks: Vec<Tick>,
    ) -> Result<(), TickloomError> {
        let instrument = instrument.into();
        if self
            .streams
            .iter()
            .any(|s| matches!(s, Stream::Ticks { instrument: i, .. } if *i == instrument))
        {
            return Err(TickloomError::data(
                &instrument,
                None,
                "tick stream registered twice",
            ));
        }
        if let Some(stray) = ticks.iter().find(|t| t.instrument != instrument) {
            return Err(TickloomError::data(
                &instrument,
                Some(stray.timestamp),
                format!("tick for {} in {instrument} tick stream", stray.instrument),
            ));
        }
        for pair in ticks.windows(2) {
            if pair[1].timestamp < pair[0].timestamp {
                return Err(TickloomError::data(
                    &instrument,
                    Some(pair[1].timestamp),
                    format!(
                        "tick timestamp before previous {}",
                        pair[0].timestamp.to_rfc3339()
                    ),
                ));
            }
        }
        debug!(%instrument, ticks = ticks.len(), "registered tick stream");
        self.streams.push(Stream::Ticks { instrument, ticks });
        Ok(())
    }

    pub fn build(self) -> ReplayData {
        ReplayData {
            streams: self.streams,
            synthetic_ticks: self.synthetic_ticks,
        }
    }
}

/// Validated replay input.
#[derive(Debug, Clone)]
pub struct ReplayData {
    streams: Vec<Stream>,
    synthetic_ticks: SyntheticTicks,
}

impl ReplayData {
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Every event, merged.
    pub fn source(&self) -> ReplaySource {
        self.split(None).1
    }

    /// Candles strictly before `evaluation_start` become warmup history; the
    /// replay starts at the first event at or after it.
    pub fn split(&self, evaluation_start: Option<DateTime<Utc>>) -> (CandleHistory, ReplaySource) {
        let mut history = CandleHistory::default();
        if let Some(start) = evaluation_start {
            for stream in &self.streams {
                if let Stream::Candles {
                    instrument,
                    timeframe,
                    candles,
                } = stream
                {
                    let before: Vec<Candle> = candles
                        .iter()
                        .take_while(|c| c.timestamp < start)
                        .cloned()
                        .collect();
                    history.insert(instrument, *timeframe, before);
                }
            }
        }

        let synthesize_for = self.synthesis_targets();
        let mut expanded = Vec::with_capacity(self.streams.len());
        for (index, stream) in self.streams.iter().enumerate() {
            let synth = if synthesize_for.contains(&index) {
                self.synthetic_ticks
            } else {
                SyntheticTicks::None
            };
            let events: VecDeque<(u8, MarketEvent)> = expand(stream, synth)
                .into_iter()
                .filter(|(_, e)| evaluation_start.is_none_or(|s| e.timestamp() >= s))
                .collect();
            expanded.push(events);
        }

        let mut synthesized_instruments: Vec<String> = synthesize_for
            .iter()
            .map(|&i| self.streams[i].instrument().to_string())
            .collect();
        synthesized_instruments.dedup();

        let properties = ReplayProperties {
            synthetic_ticks: self.synthetic_ticks,
            synthesized_instruments,
            streams: self.streams.iter().map(Stream::label).collect(),
            evaluation_start,
        };
        info!(
            streams = properties.streams.len(),
            synthetic_ticks = %properties.synthetic_ticks,
            warmup_series = history.len(),
            "replay prepared"
        );
        (history, ReplaySource::new(expanded, properties))
    }

    /// Indices of candle streams that get synthetic ticks: the first candle
    /// stream of each instrument with no real tick stream.
    fn synthesis_targets(&self) -> Vec<usize> {
        if self.synthetic_ticks == SyntheticTicks::None {
            return Vec::new();
        }
        let mut chosen: Vec<usize> = Vec::new();
        for (index, stream) in self.streams.iter().enumerate() {
            let Stream::Candles { instrument, .. } = stream else {
                continue;
            };
            let has_ticks = self
                .streams
                .iter()
                .any(|s| matches!(s, Stream::Ticks { instrument: i, .. } if i == instrument));
            let already = chosen
                .iter()
                .any(|&c| self.streams[c].instrument() == instrument.as_str());
            if !has_ticks && !already {
                chosen.push(index);
            }
        }
        chosen
    }
}

fn expand(stream: &Stream, synth: SyntheticTicks) -> Vec<(u8, MarketEvent)> {
    match stream {
        Stream::Ticks { ticks, .. } => ticks
            .iter()
            .map(|t| (0, MarketEvent::Tick(t.clone())))
            .collect(),
        Stream::Candles {
            instrument,
            timeframe,
            candles,
        } => {
            let mut out = Vec::with_capacity(candles.len() * 2);
            let mut prev_close: Option<DateTime<Utc>> = None;
            for candle in candles {
                let close_event = MarketEvent::CandleClose(CandleClose {
                    instrument: instrument.clone(),
                    timeframe: *timeframe,
                    candle: candle.clone(),
                });
                match synth {
                    SyntheticTicks::None => out.push((1, close_event)),
                    SyntheticTicks::Close => {
                        out.push((0, synthetic_tick(instrument, candle.close, candle.timestamp)));
                        out.push((1, close_event));
                    }
                    SyntheticTicks::Open => {
                        let mut at = candle.timestamp - timeframe.duration();
                        if let Some(prev) = prev_close {
                            at = at.max(prev);
                        }
                        out.push((2, synthetic_tick(instrument, candle.open, at)));
                        out.push((1, close_event));
                    }
                }
                prev_close = Some(candle.timestamp);
            }
            out
        }
    }
}

fn synthetic_tick(instrument: &str, price: f64, timestamp: DateTime<Utc>) -> MarketEvent {
    MarketEvent::Tick(Tick {
        instrument: instrument.to_string(),
        bid: price,
        offer: price,
        timestamp,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct MergeKey {
    timestamp: DateTime<Utc>,
    class: u8,
    stream: usize,
    seq: usize,
}

/// Lazily merged, deterministic event stream.
#[derive(Debug)]
pub struct ReplaySource {
    streams: Vec<VecDeque<(u8, MarketEvent)>>,
    next_seq: Vec<usize>,
    heap: BinaryHeap<Reverse<MergeKey>>,
    properties: ReplayProperties,
    delivered: usize,
}

impl ReplaySource {
    fn new(streams: Vec<VecDeque<(u8, MarketEvent)>>, properties: ReplayProperties) -> Self {
        let mut source = Self {
            next_seq: vec![0; streams.len()],
            streams,
            heap: BinaryHeap::new(),
            properties,
            delivered: 0,
        };
        for index in 0..source.streams.len() {
            source.push_front_key(index);
        }
        source
    }

    fn push_front_key(&mut self, stream: usize) {
        if let Some((class, event)) = self.streams[stream].front() {
            self.heap.push(Reverse(MergeKey {
                timestamp: event.timestamp(),
                class: *class,
                stream,
                seq: self.next_seq[stream],
            }));
        }
    }

    pub fn properties(&self) -> &ReplayProperties {
        &self.properties
    }

    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn remaining(&self) -> usize {
        self.streams.iter().map(VecDeque::len).sum()
    }
}

impl Iterator for ReplaySource {
    type Item = MarketEvent;

    fn next(&mut self) -> Option<MarketEvent> {
        let Reverse(key) = self.heap.pop()?;
        let (_, event) = self.streams[key.stream].pop_front()?;
        self.next_seq[key.stream] += 1;
        self.push_front_key(key.stream);
        self.delivered += 1;
        Some(event)
    }
}

/// Historical candles per (instrument, timeframe), oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandleHistory {
    series: BTreeMap<(String, Timeframe), Vec<Candle>>,
}

impl CandleHistory {
    pub fn insert(&mut self, instrument: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        self.series
            .insert((instrument.to_string(), timeframe), candles);
    }

    /// Up to `count` most recent candles, oldest first.
    pub fn last(&self, instrument: &str, timeframe: Timeframe, count: usize) -> Vec<Candle> {
        self.series
            .get(&(instrument.to_string(), timeframe))
            .map(|c| c[c.len().saturating_sub(count)..].to_vec())
            .unwrap_or_default()
    }

    pub fn contains(&self, instrument: &str, timeframe: Timeframe) -> bool {
        self.series
            .contains_key(&(instrument.to_string(), timeframe))
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorKind;
    use chrono::{Duration, TimeZone};

    fn t(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn candle(minute: i64, close: f64) -> Candle {
        Candle {
            timestamp: t(minute),
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
            tick_count: 0,
        }
    }

    fn tick(instrument: &str, minute: i64, mid: f64) -> Tick {
        Tick {
            instrument: instrument.into(),
            bid: mid - 0.1,
            offer: mid + 0.1,
            timestamp: t(minute),
        }
    }

    fn describe(e: &MarketEvent) -> String {
        match e {
            MarketEvent::Tick(t) => format!("T:{}:{}", t.instrument, t.timestamp.format("%M")),
            MarketEvent::CandleClose(c) => {
                format!("C:{}:{}", c.instrument, c.candle.timestamp.format("%M"))
            }
        }
    }

    #[test]
    fn tick_before_candle_close_at_same_timestamp() {
        let mut builder = ReplayBuilder::new();
        builder
            .add_candles("EURUSD", Timeframe::OneMinute, vec![candle(1, 1.0)])
            .unwrap();
        builder.add_ticks("EURUSD", vec![tick("EURUSD", 1, 1.0)]).unwrap();
        let events: Vec<String> = builder.build().source().map(|e| describe(&e)).collect();
        assert_eq!(events, vec!["T:EURUSD:01", "C:EURUSD:01"]);
    }

    #[test]
    fn equal_timestamps_across_instruments_keep_insertion_order() {
        let mut builder = ReplayBuilder::new();
        builder
            .add_candles("GBPUSD", Timeframe::OneMinute, vec![candle(1, 1.0), candle(2, 1.0)])
            .unwrap();
        builder
            .add_candles("EURUSD", Timeframe::OneMinute, vec![candle(1, 1.0), candle(2, 1.0)])
            .unwrap();
        let events: Vec<String> = builder.build().source().map(|e| describe(&e)).collect();
        assert_eq!(
            events,
            vec!["C:GBPUSD:01", "C:EURUSD:01", "C:GBPUSD:02", "C:EURUSD:02"]
        );
    }

    #[test]
    fn non_monotonic_candles_rejected_without_touching_other_streams() {
        let mut builder = ReplayBuilder::new();
        builder
            .add_candles("GBPUSD", Timeframe::OneMinute, vec![candle(1, 1.0)])
            .unwrap();
        let err = builder
            .add_candles("EURUSD", Timeframe::OneMinute, vec![candle(2, 1.0), candle(2, 1.0)])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Data);
        assert_eq!(err.context(), Some(("EURUSD", Some(t(2)))));
        assert_eq!(builder.build().source().count(), 1);
    }

    #[test]
    fn backwards_tick_rejected() {
        let mut builder = ReplayBuilder::new();
        let err = builder
            .add_ticks("EURUSD", vec![tick("EURUSD", 3, 1.0), tick("EURUSD", 2, 1.0)])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Data);
    }

    #[test]
    fn equal_tick_timestamps_allowed() {
        let mut builder = ReplayBuilder::new();
        builder
            .add_ticks("EURUSD", vec![tick("EURUSD", 3, 1.0), tick("EURUSD", 3, 2.0)])
            .unwrap();
        let mids: Vec<f64> = builder.build().source().map(|e| e.mark_price()).collect();
        assert_eq!(mids, vec![1.0, 2.0]);
    }

    #[test]
    fn close_synthetic_ticks_precede_their_candle() {
        let mut builder = ReplayBuilder::new().synthetic_ticks(SyntheticTicks::Close);
        builder
            .add_candles("EURUSD", Timeframe::OneMinute, vec![candle(1, 5.0), candle(2, 6.0)])
            .unwrap();
        let data = builder.build();
        let source = data.source();
        assert_eq!(source.properties().synthesized_instruments, vec!["EURUSD"]);
        let events: Vec<MarketEvent> = source.collect();
        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0], MarketEvent::Tick(tk) if tk.mid() == 5.0 && tk.timestamp == t(1)));
        assert!(matches!(&events[1], MarketEvent::CandleClose(_)));
    }

    #[test]
    fn open_synthetic_ticks_follow_previous_close() {
        let mut builder = ReplayBuilder::new().synthetic_ticks(SyntheticTicks::Open);
        builder
            .add_candles("EURUSD", Timeframe::OneMinute, vec![candle(1, 5.0), candle(2, 6.0)])
            .unwrap();
        let events: Vec<String> = builder.build().source().map(|e| describe(&e)).collect();
        assert_eq!(
            events,
            vec!["T:EURUSD:00", "C:EURUSD:01", "T:EURUSD:01", "C:EURUSD:02"]
        );
    }

    #[test]
    fn no_synthesis_when_real_ticks_exist() {
        let mut builder = ReplayBuilder::new().synthetic_ticks(SyntheticTicks::Close);
        builder
            .add_candles("EURUSD", Timeframe::OneMinute, vec![candle(1, 5.0)])
            .unwrap();
        builder.add_ticks("EURUSD", vec![tick("EURUSD", 1, 5.0)]).unwrap();
        let source = builder.build().source();
        assert!(source.properties().synthesized_instruments.is_empty());
        assert_eq!(source.count(), 2);
    }

    #[test]
    fn split_partitions_at_evaluation_start() {
        let mut builder = ReplayBuilder::new();
        builder
            .add_candles(
                "EURUSD",
                Timeframe::OneMinute,
                (1..=5).map(|m| candle(m, m as f64)).collect(),
            )
            .unwrap();
        let (history, source) = builder.build().split(Some(t(4)));
        let warm = history.last("EURUSD", Timeframe::OneMinute, 10);
        assert_eq!(warm.len(), 3);
        assert_eq!(history.last("EURUSD", Timeframe::OneMinute, 2)[0].close, 2.0);
        let replayed: Vec<f64> = source.map(|e| e.mark_price()).collect();
        assert_eq!(replayed, vec![4.0, 5.0]);
    }

    #[test]
    fn two_sources_are_identical() {
        let mut builder = ReplayBuilder::new().synthetic_ticks(SyntheticTicks::Close);
        builder
            .add_candles("A", Timeframe::OneMinute, vec![candle(1, 1.0), candle(3, 2.0)])
            .unwrap();
        builder
            .add_ticks("B", vec![tick("B", 1, 1.0), tick("B", 2, 1.5)])
            .unwrap();
        let data = builder.build();
        let a: Vec<MarketEvent> = data.source().collect();
        let b: Vec<MarketEvent> = data.source().collect();
        assert_eq!(a, b);
        assert!(a.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
    }
}
