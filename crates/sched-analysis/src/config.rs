//! Experiment run configuration.
//!
//! A run config file holds one `--flag=value` or bare `--flag` token per line. Repeated flags accumulate their
//! values in order. The flags relevant to the analysis are validated into a typed [`RunConfig`].

use std::fs;
use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::error::{AnalysisError, ConfigError};

pub const ARRIVAL_RATES: &str = "--override_poisson_arrival_rates";
pub const NUM_INVOCATIONS: &str = "--override_num_invocations";
pub const SCHEDULER: &str = "--scheduler";
pub const RANDOM_SEED: &str = "--random_seed";

pub struct FlagSpec {
    pub key: &'static str,
    pub required: bool,
}

/// Flags read into [`RunConfig`].
pub const SCHEMA: [FlagSpec; 4] = [
    FlagSpec {
        key: ARRIVAL_RATES,
        required: true,
    },
    FlagSpec {
        key: NUM_INVOCATIONS,
        required: false,
    },
    FlagSpec {
        key: SCHEDULER,
        required: false,
    },
    FlagSpec {
        key: RANDOM_SEED,
        required: false,
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    /// Bare `--flag` without a value.
    Present,
    Value(String),
}

impl FlagValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FlagValue::Present => None,
            FlagValue::Value(value) => Some(value.as_str()),
        }
    }
}

/// All flags of a config file in the order they first appear.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags {
    values: IndexMap<String, Vec<FlagValue>>,
}

impl Flags {
    pub fn parse(text: &str) -> Self {
        let mut values: IndexMap<String, Vec<FlagValue>> = IndexMap::new();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (key, value) = match line.split_once('=') {
                Some((key, value)) => (key, FlagValue::Value(value.to_string())),
                None => (line, FlagValue::Present),
            };
            values.entry(key.to_string()).or_default().push(value);
        }
        Self { values }
    }

    pub fn get(&self, key: &str) -> &[FlagValue] {
        self.values.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[FlagValue])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// First value of a flag; a bare flag where a value is expected is malformed.
    fn first_value(&self, key: &'static str) -> Result<Option<&str>, ConfigError> {
        match self.get(key).first() {
            None => Ok(None),
            Some(FlagValue::Value(value)) => Ok(Some(value.as_str())),
            Some(FlagValue::Present) => Err(ConfigError::Malformed {
                key,
                value: String::new(),
            }),
        }
    }
}

fn parse_list<T: FromStr>(key: &'static str, value: &str) -> Result<Vec<T>, ConfigError> {
    value
        .split(',')
        .map(|part| {
            part.trim().parse().map_err(|_| ConfigError::Malformed {
                key,
                value: value.to_string(),
            })
        })
        .collect()
}

/// Typed view of the flags used by the analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Per-class Poisson arrival rates.
    pub arrival_rates: Vec<f64>,
    /// Per-class number of task graph invocations.
    pub num_invocations: Option<Vec<u64>>,
    pub scheduler: Option<String>,
    pub random_seed: Option<u64>,
    pub flags: Flags,
}

impl RunConfig {
    pub fn from_flags(flags: Flags) -> Result<Self, ConfigError> {
        for entry in SCHEMA.iter().filter(|s| s.required) {
            if !flags.contains(entry.key) {
                return Err(ConfigError::MissingKey(entry.key));
            }
        }
        let arrival_rates = match flags.first_value(ARRIVAL_RATES)? {
            Some(value) => parse_list(ARRIVAL_RATES, value)?,
            None => return Err(ConfigError::MissingKey(ARRIVAL_RATES)),
        };
        let num_invocations = flags
            .first_value(NUM_INVOCATIONS)?
            .map(|value| parse_list(NUM_INVOCATIONS, value))
            .transpose()?;
        let scheduler = flags.first_value(SCHEDULER)?.map(str::to_string);
        let random_seed = flags
            .first_value(RANDOM_SEED)?
            .map(|value| {
                value.trim().parse().map_err(|_| ConfigError::Malformed {
                    key: RANDOM_SEED,
                    value: value.to_string(),
                })
            })
            .transpose()?;
        Ok(Self {
            arrival_rates,
            num_invocations,
            scheduler,
            random_seed,
            flags,
        })
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Self::from_flags(Flags::parse(text))
    }

    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let text = fs::read_to_string(path).map_err(|e| AnalysisError::io(path, e))?;
        Ok(Self::parse(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONF: &str = "--scheduler=TetriSched\n\
        --release_taskgraphs\n\
        --override_poisson_arrival_rates=0.01,0.02,0.005\n\
        \n\
        --opt_passes=CRITICAL_PATH_PASS\n\
        --opt_passes=DYNAMIC_DISCRETIZATION_PASS\n\
        --override_num_invocations=10,20,30\n";

    #[test]
    fn repeated_flags_accumulate() {
        let flags = Flags::parse(CONF);
        assert_eq!(
            flags.get("--opt_passes"),
            &[
                FlagValue::Value("CRITICAL_PATH_PASS".to_string()),
                FlagValue::Value("DYNAMIC_DISCRETIZATION_PASS".to_string()),
            ]
        );
        assert_eq!(flags.get("--release_taskgraphs"), &[FlagValue::Present]);
        assert!(flags.get("--unknown").is_empty());
        let keys: Vec<_> = flags.iter().map(|(k, _)| k).collect();
        assert_eq!(keys[0], "--scheduler");
        assert_eq!(keys.len(), 5);
    }

    #[test]
    fn typed_config() {
        let config = RunConfig::parse(CONF).unwrap();
        assert_eq!(config.arrival_rates, vec![0.01, 0.02, 0.005]);
        assert_eq!(config.num_invocations, Some(vec![10, 20, 30]));
        assert_eq!(config.scheduler.as_deref(), Some("TetriSched"));
        assert_eq!(config.random_seed, None);
    }

    #[test]
    fn value_keeps_extra_equals_signs() {
        let flags = Flags::parse("--properties=a=b");
        assert_eq!(flags.get("--properties"), &[FlagValue::Value("a=b".to_string())]);
    }

    #[test]
    fn missing_required_flag() {
        assert_eq!(
            RunConfig::parse("--scheduler=EDF").unwrap_err(),
            ConfigError::MissingKey(ARRIVAL_RATES)
        );
    }

    #[test]
    fn malformed_values() {
        assert!(matches!(
            RunConfig::parse("--override_poisson_arrival_rates=0.1,fast"),
            Err(ConfigError::Malformed { key: ARRIVAL_RATES, .. })
        ));
        assert!(matches!(
            RunConfig::parse("--override_poisson_arrival_rates"),
            Err(ConfigError::Malformed { key: ARRIVAL_RATES, .. })
        ));
        assert!(matches!(
            RunConfig::parse("--override_poisson_arrival_rates=1\n--random_seed=-4"),
            Err(ConfigError::Malformed { key: RANDOM_SEED, .. })
        ));
    }
}
