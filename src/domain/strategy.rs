//! Strategy registry and trailing-window replay.
//!
//! Strategies are registered explicitly at startup from a fixed list; there
//! is no discovery. The registry is also the built-in implementation of the
//! strategy evaluation port.

use std::collections::{BTreeMap, HashMap};

use super::error::PaperError;
use super::ohlcv::{Bar, is_chronological};
use super::order::OrderIntent;
use super::strategies;
use crate::ports::config_port::ConfigPort;
use crate::ports::strategy_port::StrategyEvaluationPort;

/// Named numeric strategy parameters.
pub type StrategyParams = BTreeMap<String, f64>;

/// A bar-by-bar signal source. Implementations keep their own state
/// (e.g. whether they are in the market) across calls.
pub trait SignalGenerator {
    /// Called once per bar in order; `bars[..=index]` is visible.
    fn on_bar(&mut self, bars: &[Bar], index: usize) -> Option<OrderIntent>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub default: f64,
    pub description: &'static str,
}

pub type BuildFn = fn(&StrategyParams) -> Result<Box<dyn SignalGenerator>, PaperError>;

#[derive(Debug, Clone)]
pub struct StrategyDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    pub build: BuildFn,
}

impl StrategyDescriptor {
    pub fn default_params(&self) -> StrategyParams {
        self.params
            .iter()
            .map(|p| (p.name.to_string(), p.default))
            .collect()
    }
}

/// Replay every bar through `generator` and keep only the final bar's intent.
pub fn replay_final_intent(
    generator: &mut dyn SignalGenerator,
    bars: &[Bar],
) -> Option<OrderIntent> {
    (0..bars.len())
        .map(|index| generator.on_bar(bars, index))
        .last()
        .flatten()
}

/// Read a whole-number parameter that must be at least `min`.
pub fn param_count(params: &StrategyParams, name: &str, min: usize) -> Result<usize, PaperError> {
    let value = params
        .get(name)
        .copied()
        .ok_or_else(|| PaperError::InvalidRequest {
            reason: format!("missing strategy parameter {name}"),
        })?;
    if value.fract() != 0.0 || value < min as f64 {
        return Err(PaperError::InvalidRequest {
            reason: format!("strategy parameter {name} must be an integer >= {min}, got {value}"),
        });
    }
    Ok(value as usize)
}

pub struct StrategyRegistry {
    descriptors: BTreeMap<&'static str, StrategyDescriptor>,
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        StrategyRegistry {
            descriptors: BTreeMap::new(),
        }
    }

    /// Registry populated with every built-in strategy.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for descriptor in strategies::all() {
            registry.register(descriptor);
        }
        registry
    }

    pub fn register(&mut self, descriptor: StrategyDescriptor) {
        self.descriptors.insert(descriptor.id, descriptor);
    }

    pub fn get(&self, strategy_id: &str) -> Option<&StrategyDescriptor> {
        self.descriptors.get(strategy_id)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &StrategyDescriptor> {
        self.descriptors.values()
    }

    fn require(&self, strategy_id: &str) -> Result<&StrategyDescriptor, PaperError> {
        self.get(strategy_id)
            .ok_or_else(|| PaperError::StrategyNotFound {
                strategy_id: strategy_id.to_string(),
            })
    }

    /// Defaults overridden by keys in the `[strategy.<id>]` config section.
    pub fn resolve_params(
        &self,
        strategy_id: &str,
        config: &dyn ConfigPort,
    ) -> Result<StrategyParams, PaperError> {
        let descriptor = self.require(strategy_id)?;
        let section = format!("strategy.{strategy_id}");
        Ok(descriptor
            .params
            .iter()
            .map(|p| {
                (
                    p.name.to_string(),
                    config.get_double(&section, p.name, p.default),
                )
            })
            .collect())
    }

    /// Resolved parameters for every registered strategy.
    pub fn catalog(&self, config: &dyn ConfigPort) -> Result<StrategyCatalog, PaperError> {
        let mut catalog = StrategyCatalog::default();
        for id in self.descriptors.keys() {
            catalog.insert(id, self.resolve_params(id, config)?);
        }
        Ok(catalog)
    }
}

impl StrategyEvaluationPort for StrategyRegistry {
    fn evaluate(
        &self,
        _symbol: &str,
        bars: &[Bar],
        strategy_id: &str,
        params: &StrategyParams,
    ) -> Result<Option<OrderIntent>, PaperError> {
        let descriptor = self.require(strategy_id)?;
        if !is_chronological(bars) {
            return Err(PaperError::InvalidRequest {
                reason: "bars must be strictly ascending by date".into(),
            });
        }

        let mut merged = descriptor.default_params();
        merged.extend(params.iter().map(|(k, v)| (k.clone(), *v)));

        let mut generator = (descriptor.build)(&merged)?;
        Ok(replay_final_intent(generator.as_mut(), bars))
    }
}

/// Strategy id to resolved parameters, fixed for the life of a scheduler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyCatalog {
    entries: HashMap<String, StrategyParams>,
}

impl StrategyCatalog {
    pub fn insert(&mut self, strategy_id: &str, params: StrategyParams) {
        self.entries.insert(strategy_id.to_string(), params);
    }

    pub fn resolve(&self, strategy_id: &str) -> Result<&StrategyParams, PaperError> {
        self.entries
            .get(strategy_id)
            .ok_or_else(|| PaperError::StrategyNotFound {
                strategy_id: strategy_id.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
