//! CSV market data adapter: one `<SYMBOL>.csv` per instrument.
//!
//! Expected header: `date,open,high,low,close,volume`.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::str::FromStr;

use crate::domain::error::PaperError;
use crate::domain::ohlcv::Bar;
use crate::ports::config_port::ConfigPort;
use crate::ports::market_data_port::MarketDataPort;

const PORT: &str = "market data";

pub struct CsvMarketData {
    base_path: PathBuf,
}

fn unavailable(reason: String) -> PaperError {
    PaperError::UpstreamUnavailable {
        port: PORT.to_string(),
        reason,
    }
}

fn column<'a>(record: &'a csv::StringRecord, index: usize, name: &str) -> Result<&'a str, PaperError> {
    record
        .get(index)
        .map(str::trim)
        .ok_or_else(|| unavailable(format!("missing {name} column")))
}

fn price(record: &csv::StringRecord, index: usize, name: &str) -> Result<Decimal, PaperError> {
    let raw = column(record, index, name)?;
    Decimal::from_str(raw).map_err(|e| unavailable(format!("invalid {name} value {raw:?}: {e}")))
}

impl CsvMarketData {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PaperError> {
        let dir = config
            .get_string("market_data", "csv_dir")
            .ok_or_else(|| PaperError::ConfigMissing {
                section: "market_data".into(),
                key: "csv_dir".into(),
            })?;
        Ok(Self::new(PathBuf::from(dir)))
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }

    fn read_all(&self, symbol: &str) -> Result<Vec<Bar>, PaperError> {
        let path = self.csv_path(symbol);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(unavailable(format!("failed to read {}: {e}", path.display()))),
        };

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| unavailable(format!("CSV parse error in {symbol}: {e}")))?;

            let date_str = column(&record, 0, "date")?;
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
                .map_err(|e| unavailable(format!("invalid date {date_str:?}: {e}")))?;
            let volume_str = column(&record, 5, "volume")?;
            let volume = volume_str
                .parse::<i64>()
                .map_err(|e| unavailable(format!("invalid volume value {volume_str:?}: {e}")))?;

            bars.push(Bar {
                date,
                open: price(&record, 1, "open")?,
                high: price(&record, 2, "high")?,
                low: price(&record, 3, "low")?,
                close: price(&record, 4, "close")?,
                volume,
            });
        }

        bars.sort_by_key(|b| b.date);
        if let Some(pair) = bars.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(unavailable(format!(
                "duplicate bar for {} in {symbol}",
                pair[0].date
            )));
        }
        Ok(bars)
    }
}

impl MarketDataPort for CsvMarketData {
    fn last_bars(&self, symbol: &str, count: usize) -> Result<Vec<Bar>, PaperError> {
        let mut bars = self.read_all(symbol)?;
        let skip = bars.len().saturating_sub(count);
        Ok(bars.split_off(skip))
    }
}
