//! Hyperparameter configuration spaces
//!
//! A [`ConfigSpace`] declares the hyperparameters of one workflow together
//! with the conditions that activate them. It provides the default
//! configuration, seeded random samples (used by the `create` command) and
//! validation of hand-written configurations.
//!
//! Conditions activate a child hyperparameter when its parent takes one of
//! a set of values. A parent must be declared before its children.

use super::Hyperparameters;
use crate::{Error, Result};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One hyperparameter of a configuration space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Hyperparameter {
    /// Real value in `[lower, upper]`
    Float {
        /// Name
        name: String,
        /// Lower bound, inclusive
        lower: f64,
        /// Upper bound, inclusive
        upper: f64,
        /// Default value
        default: f64,
        /// Sample on a log scale
        log: bool,
    },
    /// Integer value in `[lower, upper]`
    Integer {
        /// Name
        name: String,
        /// Lower bound, inclusive
        lower: i64,
        /// Upper bound, inclusive
        upper: i64,
        /// Default value
        default: i64,
        /// Sample on a log scale
        log: bool,
    },
    /// One of a fixed set of choices
    Categorical {
        /// Name
        name: String,
        /// Allowed values
        choices: Vec<Value>,
        /// Default value, one of `choices`
        default: Value,
    },
    /// Fixed value
    Constant {
        /// Name
        name: String,
        /// The value
        value: Value,
    },
}

impl Hyperparameter {
    /// Float hyperparameter on a linear scale
    #[must_use]
    pub fn float(name: &str, lower: f64, upper: f64, default: f64) -> Self {
        Self::Float {
            name: name.to_string(),
            lower,
            upper,
            default,
            log: false,
        }
    }

    /// Float hyperparameter on a log scale
    #[must_use]
    pub fn log_float(name: &str, lower: f64, upper: f64, default: f64) -> Self {
        Self::Float {
            name: name.to_string(),
            lower,
            upper,
            default,
            log: true,
        }
    }

    /// Integer hyperparameter
    #[must_use]
    pub fn integer(name: &str, lower: i64, upper: i64, default: i64, log: bool) -> Self {
        Self::Integer {
            name: name.to_string(),
            lower,
            upper,
            default,
            log,
        }
    }

    /// Categorical hyperparameter over string choices
    #[must_use]
    pub fn categorical(name: &str, choices: &[&str], default: &str) -> Self {
        Self::Categorical {
            name: name.to_string(),
            choices: choices.iter().map(|c| json!(c)).collect(),
            default: json!(default),
        }
    }

    /// Constant hyperparameter
    #[must_use]
    pub fn constant(name: &str, value: Value) -> Self {
        Self::Constant {
            name: name.to_string(),
            value,
        }
    }

    /// Name
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Float { name, .. }
            | Self::Integer { name, .. }
            | Self::Categorical { name, .. }
            | Self::Constant { name, .. } => name,
        }
    }

    /// Default value
    #[must_use]
    pub fn default_value(&self) -> Value {
        match self {
            Self::Float { default, .. } => json!(default),
            Self::Integer { default, .. } => json!(default),
            Self::Categorical { default, .. } => default.clone(),
            Self::Constant { value, .. } => value.clone(),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Value {
        match self {
            Self::Float {
                lower, upper, log, ..
            } => {
                let v = if *log {
                    rng.gen_range(lower.ln()..=upper.ln()).exp()
                } else {
                    rng.gen_range(*lower..=*upper)
                };
                json!(v.clamp(*lower, *upper))
            }
            Self::Integer {
                lower, upper, log, ..
            } => {
                let v = if *log {
                    let lo = (*lower as f64 - 0.5).max(0.5).ln();
                    let hi = (*upper as f64 + 0.5).ln();
                    (rng.gen_range(lo..hi).exp().round() as i64).clamp(*lower, *upper)
                } else {
                    rng.gen_range(*lower..=*upper)
                };
                json!(v)
            }
            Self::Categorical { choices, default, .. } => {
                choices.choose(rng).cloned().unwrap_or_else(|| default.clone())
            }
            Self::Constant { value, .. } => value.clone(),
        }
    }

    fn check(&self, value: &Value) -> Result<()> {
        let ok = match self {
            Self::Float { lower, upper, .. } => value
                .as_f64()
                .is_some_and(|v| v >= *lower && v <= *upper),
            Self::Integer { lower, upper, .. } => value
                .as_i64()
                .is_some_and(|v| v >= *lower && v <= *upper),
            Self::Categorical { choices, .. } => choices.contains(value),
            Self::Constant { value: expected, .. } => expected == value,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::InvalidHyperparameter(format!(
                "{} = {value} is outside its domain",
                self.name()
            )))
        }
    }

    fn validate_definition(&self) -> Result<()> {
        let ok = match self {
            Self::Float {
                lower,
                upper,
                default,
                log,
                ..
            } => lower <= upper && (lower..=upper).contains(&default) && (!log || *lower > 0.0),
            Self::Integer {
                lower,
                upper,
                default,
                log,
                ..
            } => lower <= upper && (lower..=upper).contains(&default) && (!log || *lower > 0),
            Self::Categorical { choices, default, .. } => choices.contains(default),
            Self::Constant { .. } => true,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::InvalidHyperparameter(format!(
                "hyperparameter '{}' has an inconsistent definition",
                self.name()
            )))
        }
    }
}

/// Activates `child` when `parent` takes one of `values`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Conditional hyperparameter
    pub child: String,
    /// Hyperparameter it depends on
    pub parent: String,
    /// Parent values that activate the child (a single value is an equality condition)
    pub values: Vec<Value>,
}

impl Condition {
    /// `child` is active iff `parent == value`
    #[must_use]
    pub fn equals(child: &str, parent: &str, value: Value) -> Self {
        Self {
            child: child.to_string(),
            parent: parent.to_string(),
            values: vec![value],
        }
    }

    /// `child` is active iff `parent` is any of `values`
    #[must_use]
    pub fn any_of(child: &str, parent: &str, values: Vec<Value>) -> Self {
        Self {
            child: child.to_string(),
            parent: parent.to_string(),
            values,
        }
    }
}

/// Hyperparameters of one workflow and the conditions between them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSpace {
    /// Space name, usually the workflow name
    pub name: String,
    /// Hyperparameters in declaration order
    pub hyperparameters: Vec<Hyperparameter>,
    /// Activation conditions
    pub conditions: Vec<Condition>,
}

impl ConfigSpace {
    /// Create an empty space
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Add a hyperparameter
    #[must_use]
    pub fn with(mut self, hyperparameter: Hyperparameter) -> Self {
        self.hyperparameters.push(hyperparameter);
        self
    }

    /// Add a condition
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Number of hyperparameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.hyperparameters.len()
    }

    /// Check if the space has no hyperparameters
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hyperparameters.is_empty()
    }

    /// Look up a hyperparameter by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Hyperparameter> {
        self.hyperparameters.iter().find(|h| h.name() == name)
    }

    /// Check definitions and condition references
    ///
    /// # Errors
    /// Returns `InvalidHyperparameter` on inconsistent bounds or dangling conditions
    pub fn check(&self) -> Result<()> {
        for hp in &self.hyperparameters {
            hp.validate_definition()?;
        }
        for condition in &self.conditions {
            let position = |name: &str| self.hyperparameters.iter().position(|h| h.name() == name);
            match (position(&condition.parent), position(&condition.child)) {
                (Some(p), Some(c)) if p < c => {}
                _ => {
                    return Err(Error::InvalidHyperparameter(format!(
                        "condition {} <- {} references an unknown or later-declared hyperparameter",
                        condition.child, condition.parent
                    )))
                }
            }
        }
        Ok(())
    }

    fn is_active(&self, name: &str, config: &Hyperparameters) -> bool {
        self.conditions
            .iter()
            .filter(|c| c.child == name)
            .all(|c| config.get(&c.parent).is_some_and(|v| c.values.contains(v)))
    }

    /// Default configuration, restricted to active hyperparameters
    #[must_use]
    pub fn default_configuration(&self) -> Hyperparameters {
        self.resolve(Hyperparameter::default_value)
    }

    /// Draw one configuration
    pub fn sample_configuration<R: Rng + ?Sized>(&self, rng: &mut R) -> Hyperparameters {
        self.resolve(|hp| hp.sample(rng))
    }

    /// Default configuration followed by `n - 1` configurations seeded by `seed`
    #[must_use]
    pub fn sample(&self, n: usize, seed: u64) -> Vec<Hyperparameters> {
        if n == 0 {
            return Vec::new();
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut configs = Vec::with_capacity(n);
        configs.push(self.default_configuration());
        configs.extend((1..n).map(|_| self.sample_configuration(&mut rng)));
        configs
    }

    fn resolve<F: FnMut(&Hyperparameter) -> Value>(&self, mut value_of: F) -> Hyperparameters {
        let mut config = Hyperparameters::new();
        for hp in &self.hyperparameters {
            // parents come first, so their values are already in `config`
            if self.is_active(hp.name(), &config) {
                config.insert(hp.name().to_string(), value_of(hp));
            }
        }
        config
    }

    /// Check that a configuration belongs to the space
    ///
    /// Missing active hyperparameters are allowed (the workflow falls back
    /// to its defaults); unknown names, out-of-domain values and values for
    /// inactive hyperparameters are not.
    ///
    /// # Errors
    /// Returns `InvalidHyperparameter` describing the first violation
    pub fn validate(&self, config: &Hyperparameters) -> Result<()> {
        for (name, value) in config {
            let hp = self.get(name).ok_or_else(|| {
                Error::InvalidHyperparameter(format!(
                    "'{name}' is not a hyperparameter of {}",
                    self.name
                ))
            })?;
            hp.check(value)?;
            if !self.is_active(name, config) {
                return Err(Error::InvalidHyperparameter(format!(
                    "'{name}' is inactive in this configuration"
                )));
            }
        }
        Ok(())
    }
}
