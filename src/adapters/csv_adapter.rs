//! CSV candle and tick loader.
//!
//! Files live in one directory: `{instrument}_{TIMEFRAME}.csv` for candles
//! (`timestamp,open,high,low,close[,volume][,tick_count]`) and
//! `{instrument}_TICKS.csv` for ticks (`timestamp,bid,offer`). Header names
//! are matched case-insensitively with a few common aliases. Timestamps must
//! be strictly increasing for candles and non-decreasing for ticks; a
//! violation fails the whole file.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::domain::config_validation::{parse_timestamp, BarTimestamps};
use crate::domain::error::TickloomError;
use crate::domain::market::{Candle, Tick, Timeframe};
use crate::domain::replay::{ReplayBuilder, ReplayData, SyntheticTicks};
use crate::domain::subscription::{FeedKind, Subscription};
use crate::ports::history_port::HistoricalDataProvider;

const TIMESTAMP_ALIASES: &[&str] = &["timestamp", "time", "datetime", "date"];

pub struct CsvAdapter {
    base_path: PathBuf,
    bar_timestamps: BarTimestamps,
}

impl CsvAdapter {
    pub fn new(base_path: impl Into<PathBuf>, bar_timestamps: BarTimestamps) -> Self {
        Self {
            base_path: base_path.into(),
            bar_timestamps,
        }
    }

    fn candle_path(&self, instrument: &str, timeframe: Timeframe) -> PathBuf {
        self.base_path.join(format!("{instrument}_{timeframe}.csv"))
    }

    fn tick_path(&self, instrument: &str) -> PathBuf {
        self.base_path.join(format!("{instrument}_TICKS.csv"))
    }

    pub fn has_ticks(&self, instrument: &str) -> bool {
        self.tick_path(instrument).is_file()
    }

    pub fn load_candles(&self, instrument: &str, timeframe: Timeframe) -> Result<Vec<Candle>, TickloomError> {
        let path = self.candle_path(instrument, timeframe);
        let file = File::open(&path).map_err(|e| {
            TickloomError::data(instrument, None, format!("failed to read {}: {e}", path.display()))
        })?;
        let candles = read_candles(file, instrument, timeframe, self.bar_timestamps)?;
        debug!(%instrument, %timeframe, count = candles.len(), path = %path.display(), "candles loaded");
        Ok(candles)
    }

    pub fn load_ticks(&self, instrument: &str) -> Result<Vec<Tick>, TickloomError> {
        let path = self.tick_path(instrument);
        let file = File::open(&path).map_err(|e| {
            TickloomError::data(instrument, None, format!("failed to read {}: {e}", path.display()))
        })?;
        let ticks = read_ticks(file, instrument)?;
        debug!(%instrument, count = ticks.len(), path = %path.display(), "ticks loaded");
        Ok(ticks)
    }

    /// Load every feed in `subscriptions` into a replay. Market feeds read
    /// the tick file when there is one; otherwise they rely on synthetic
    /// ticks from the instrument's candles.
    pub fn replay_data(
        &self,
        subscriptions: &[Subscription],
        synthetic_ticks: SyntheticTicks,
    ) -> Result<ReplayData, TickloomError> {
        let mut builder = ReplayBuilder::new().synthetic_ticks(synthetic_ticks);
        for sub in subscriptions {
            match sub.kind {
                FeedKind::Chart(timeframe) => {
                    let candles = self.load_candles(&sub.instrument, timeframe)?;
                    builder.add_candles(sub.instrument.clone(), timeframe, candles)?;
                }
                FeedKind::Market if self.has_ticks(&sub.instrument) => {
                    let ticks = self.load_ticks(&sub.instrument)?;
                    builder.add_ticks(sub.instrument.clone(), ticks)?;
                }
                FeedKind::Market => {
                    let has_candles = subscriptions
                        .iter()
                        .any(|s| s.is_chart() && s.instrument == sub.instrument);
                    if synthetic_ticks == SyntheticTicks::None || !has_candles {
                        warn!(
                            instrument = %sub.instrument,
                            "no tick file and no synthetic ticks, market subscription will be silent"
                        );
                    }
                }
            }
        }
        info!(
            feeds = subscriptions.len(),
            dir = %self.base_path.display(),
            "replay data loaded"
        );
        Ok(builder.build())
    }
}

#[async_trait]
impl HistoricalDataProvider for CsvAdapter {
    async fn get_candles(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, TickloomError> {
        let mut candles = self.load_candles(instrument, timeframe)?;
        let skip = candles.len().saturating_sub(count);
        Ok(candles.split_off(skip))
    }
}

/// Parse a candle CSV. Bar-open timestamps are shifted to the bar close.
pub fn read_candles<R: Read>(
    reader: R,
    instrument: &str,
    timeframe: Timeframe,
    bar_timestamps: BarTimestamps,
) -> Result<Vec<Candle>, TickloomError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let columns = Columns::new(&mut rdr, instrument)?;
    let ts_col = columns.require(instrument, TIMESTAMP_ALIASES)?;
    let open_col = columns.require(instrument, &["open", "o"])?;
    let high_col = columns.require(instrument, &["high", "h"])?;
    let low_col = columns.require(instrument, &["low", "l"])?;
    let close_col = columns.require(instrument, &["close", "c"])?;
    let volume_col = columns.find(&["volume", "vol", "v"]);
    let ticks_col = columns.find(&["tick_count", "ticks", "tickcount"]);

    let shift = match bar_timestamps {
        BarTimestamps::Close => chrono::Duration::zero(),
        BarTimestamps::Open => timeframe.duration(),
    };

    let mut candles: Vec<Candle> = Vec::new();
    for result in rdr.records() {
        let record = result
            .map_err(|e| TickloomError::data(instrument, None, format!("CSV parse error: {e}")))?;
        let line = record.position().map_or(0, |p| p.line());
        let timestamp = timestamp_field(&record, ts_col, instrument, line)? + shift;

        let number = |col: usize, name: &str| {
            number_field(&record, col, name, instrument, timestamp, line)
        };
        let optional = |col: Option<usize>, name: &str| -> Result<f64, TickloomError> {
            match col {
                Some(c) if record.get(c).is_some_and(|s| !s.is_empty()) => number(c, name),
                _ => Ok(0.0),
            }
        };

        let candle = Candle {
            timestamp,
            open: number(open_col, "open")?,
            high: number(high_col, "high")?,
            low: number(low_col, "low")?,
            close: number(close_col, "close")?,
            volume: optional(volume_col, "volume")?,
            tick_count: optional(ticks_col, "tick_count")? as u64,
        };

        if let Some(prev) = candles.last() {
            if candle.timestamp <= prev.timestamp {
                return Err(TickloomError::data(
                    instrument,
                    Some(candle.timestamp),
                    format!(
                        "line {line}: {timeframe} candle timestamp not after previous {}",
                        prev.timestamp.to_rfc3339()
                    ),
                ));
            }
        }
        candles.push(candle);
    }
    Ok(candles)
}

/// Parse a tick CSV.
pub fn read_ticks<R: Read>(reader: R, instrument: &str) -> Result<Vec<Tick>, TickloomError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let columns = Columns::new(&mut rdr, instrument)?;
    let ts_col = columns.require(instrument, TIMESTAMP_ALIASES)?;
    let bid_col = columns.require(instrument, &["bid"])?;
    let offer_col = columns.require(instrument, &["offer", "ask"])?;

    let mut ticks: Vec<Tick> = Vec::new();
    for result in rdr.records() {
        let record = result
            .map_err(|e| TickloomError::data(instrument, None, format!("CSV parse error: {e}")))?;
        let line = record.position().map_or(0, |p| p.line());
        let timestamp = timestamp_field(&record, ts_col, instrument, line)?;
        let price = |col: usize, name: &str| {
            number_field(&record, col, name, instrument, timestamp, line)
        };
        let tick = Tick {
            instrument: instrument.to_string(),
            bid: price(bid_col, "bid")?,
            offer: price(offer_col, "offer")?,
            timestamp,
        };
        if let Some(prev) = ticks.last() {
            if tick.timestamp < prev.timestamp {
                return Err(TickloomError::data(
                    instrument,
                    Some(tick.timestamp),
                    format!("line {line}: tick timestamp went backwards"),
                ));
            }
        }
        ticks.push(tick);
    }
    Ok(ticks)
}

struct Columns(HashMap<String, usize>);

impl Columns {
    fn new<R: Read>(rdr: &mut csv::Reader<R>, instrument: &str) -> Result<Self, TickloomError> {
        let headers = rdr
            .headers()
            .map_err(|e| TickloomError::data(instrument, None, format!("CSV header error: {e}")))?;
        Ok(Self(
            headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.trim().to_lowercase(), i))
                .collect(),
        ))
    }

    fn find(&self, aliases: &[&str]) -> Option<usize> {
        aliases.iter().find_map(|a| self.0.get(*a).copied())
    }

    fn require(&self, instrument: &str, aliases: &[&str]) -> Result<usize, TickloomError> {
        self.find(aliases).ok_or_else(|| {
            TickloomError::data(instrument, None, format!("CSV missing column '{}'", aliases[0]))
        })
    }
}

fn timestamp_field(
    record: &csv::StringRecord,
    col: usize,
    instrument: &str,
    line: u64,
) -> Result<DateTime<Utc>, TickloomError> {
    let raw = record.get(col).unwrap_or("");
    parse_timestamp(raw).ok_or_else(|| {
        TickloomError::data(
            instrument,
            None,
            format!("line {line}: invalid timestamp '{raw}'"),
        )
    })
}

/// A finite number; `NaN` and infinities are rejected like unparsable text.
fn number_field(
    record: &csv::StringRecord,
    col: usize,
    name: &str,
    instrument: &str,
    timestamp: DateTime<Utc>,
    line: u64,
) -> Result<f64, TickloomError> {
    let raw = record.get(col).unwrap_or("");
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(TickloomError::data(
            instrument,
            Some(timestamp),
            format!("line {line}: invalid {name} value '{raw}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorKind;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    fn setup_test_data() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("EURUSD_HOUR.csv"),
            "timestamp,open,high,low,close,volume\n\
             2024-01-15T10:00:00Z,1.10,1.12,1.09,1.11,500\n\
             2024-01-15T11:00:00Z,1.11,1.13,1.10,1.12,600\n\
             2024-01-15T12:00:00Z,1.12,1.14,1.11,1.13,550\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("EURUSD_TICKS.csv"),
            "Time,Bid,Offer\n\
             2024-01-15T10:30:00Z,1.1050,1.1052\n\
             2024-01-15T10:30:00Z,1.1051,1.1053\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn loads_candles() {
        let dir = setup_test_data();
        let adapter = CsvAdapter::new(dir.path(), BarTimestamps::Close);
        let candles = adapter.load_candles("EURUSD", Timeframe::Hour).unwrap();
        assert_eq!(candles.len(), 3);
        assert_eq!(
            candles[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
        );
        assert!((candles[0].high - 1.12).abs() < f64::EPSILON);
        assert!((candles[2].volume - 550.0).abs() < f64::EPSILON);
        assert_eq!(candles[0].tick_count, 0);
    }

    #[test]
    fn open_timestamps_shift_to_close() {
        let dir = setup_test_data();
        let adapter = CsvAdapter::new(dir.path(), BarTimestamps::Open);
        let candles = adapter.load_candles("EURUSD", Timeframe::Hour).unwrap();
        assert_eq!(
            candles[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 15, 11, 0, 0).unwrap()
        );
    }

    #[test]
    fn non_monotonic_candles_are_data_error() {
        let data = "timestamp,open,high,low,close\n\
                    2024-01-15T11:00:00Z,1,1,1,1\n\
                    2024-01-15T10:00:00Z,1,1,1,1\n";
        let err = read_candles(data.as_bytes(), "EURUSD", Timeframe::Hour, BarTimestamps::Close)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Data);
        assert_eq!(
            err.context(),
            Some((
                "EURUSD",
                Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap())
            ))
        );
    }

    #[test]
    fn duplicate_candle_timestamp_is_data_error() {
        let data = "timestamp,open,high,low,close\n\
                    2024-01-15T10:00:00Z,1,1,1,1\n\
                    2024-01-15T10:00:00Z,1,1,1,1\n";
        assert!(read_candles(data.as_bytes(), "X", Timeframe::Hour, BarTimestamps::Close).is_err());
    }

    #[test]
    fn bad_number_reports_line() {
        let data = "timestamp,open,high,low,close\n2024-01-15T10:00:00Z,1,abc,1,1\n";
        let err = read_candles(data.as_bytes(), "X", Timeframe::Hour, BarTimestamps::Close)
            .unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
        assert!(err.to_string().contains("high"));
    }

    #[test]
    fn non_finite_numbers_are_data_errors() {
        let data = "timestamp,open,high,low,close\n2024-01-15T10:00:00Z,1,1,1,NaN\n";
        let err = read_candles(data.as_bytes(), "X", Timeframe::Hour, BarTimestamps::Close)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Data);
        assert!(err.to_string().contains("invalid close value 'NaN'"), "{err}");

        let data = "timestamp,open,high,low,close,volume\n2024-01-15T10:00:00Z,1,1,1,1,inf\n";
        assert!(read_candles(data.as_bytes(), "X", Timeframe::Hour, BarTimestamps::Close).is_err());

        let data = "timestamp,bid,offer\n2024-01-15T10:00:00Z,1,-inf\n";
        let err = read_ticks(data.as_bytes(), "X").unwrap_err();
        assert!(err.to_string().contains("offer"), "{err}");
    }

    #[test]
    fn missing_column_is_data_error() {
        let data = "timestamp,open,high,close\n";
        let err = read_candles(data.as_bytes(), "X", Timeframe::Hour, BarTimestamps::Close)
            .unwrap_err();
        assert!(err.to_string().contains("'low'"));
    }

    #[test]
    fn ticks_allow_equal_timestamps_but_not_backwards() {
        let dir = setup_test_data();
        let adapter = CsvAdapter::new(dir.path(), BarTimestamps::Close);
        let ticks = adapter.load_ticks("EURUSD").unwrap();
        assert_eq!(ticks.len(), 2);
        assert!((ticks[1].mid() - 1.1052).abs() < 1e-9);

        let data = "timestamp,bid,offer\n2024-01-15T10:00:01Z,1,1\n2024-01-15T10:00:00Z,1,1\n";
        assert_eq!(read_ticks(data.as_bytes(), "X").unwrap_err().kind(), ErrorKind::Data);
    }

    #[test]
    fn missing_file_is_data_error() {
        let dir = setup_test_data();
        let adapter = CsvAdapter::new(dir.path(), BarTimestamps::Close);
        let err = adapter.load_candles("GBPUSD", Timeframe::Day).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Data);
    }

    #[test]
    fn replay_data_merges_ticks_before_candles() {
        let dir = setup_test_data();
        let adapter = CsvAdapter::new(dir.path(), BarTimestamps::Close);
        let data = adapter
            .replay_data(
                &[
                    Subscription::chart("EURUSD", Timeframe::Hour),
                    Subscription::market("EURUSD"),
                ],
                SyntheticTicks::None,
            )
            .unwrap();
        let events: Vec<_> = data.source().collect();
        assert_eq!(events.len(), 5);
        assert_eq!(
            events[0].timestamp(),
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
        );
        assert!(matches!(events[1], crate::domain::market::MarketEvent::Tick(_)));
    }

    #[tokio::test]
    async fn provider_returns_most_recent() {
        let dir = setup_test_data();
        let adapter = CsvAdapter::new(dir.path(), BarTimestamps::Close);
        let candles = adapter.get_candles("EURUSD", Timeframe::Hour, 2).await.unwrap();
        assert_eq!(candles.len(), 2);
        assert!((candles[1].close - 1.13).abs() < f64::EPSILON);
    }
}
