//! Configuration access port trait.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::domain::error::PaperError;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    /// Exact lookup for money values. Unlike the numeric getters above, a
    /// present but unparseable value is an error rather than the default.
    fn get_decimal(&self, section: &str, key: &str, default: Decimal) -> Result<Decimal, PaperError> {
        match self.get_string(section, key) {
            None => Ok(default),
            Some(raw) => Decimal::from_str(raw.trim()).map_err(|e| PaperError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("{raw:?} is not a decimal: {e}"),
            }),
        }
    }
}
