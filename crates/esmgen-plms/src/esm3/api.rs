//! Client-facing generation API.
//!
//! `GenerationConfig` names a track (sequence or structure), an iterative
//! refinement budget, and a sampling temperature. `Esm3InferenceClient` is
//! the seam between the workflow and a loaded model: the handle is created
//! once and generation takes `&self`, so one handle serves any number of
//! calls.
use crate::esm3::protein::ESMProtein;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Generation mode requested from the model.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Track {
    Sequence,
    Structure,
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("num_steps must be greater than zero")]
    InvalidNumSteps,
    #[error("temperature must be finite and non-negative, got {0}")]
    InvalidTemperature(f64),
    #[error("top_p must be in (0, 1], got {0}")]
    InvalidTopP(f64),
    #[error("{0} generation requires an input sequence")]
    MissingSequence(Track),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub track: Track,
    pub num_steps: usize,
    pub temperature: f64,
    pub top_p: f64,
}

impl GenerationConfig {
    pub fn new(track: Track) -> Self {
        Self {
            track,
            num_steps: 1,
            temperature: 1.0,
            top_p: 1.0,
        }
    }

    pub fn with_num_steps(mut self, num_steps: usize) -> Self {
        self.num_steps = num_steps;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), GenerationError> {
        if self.num_steps == 0 {
            return Err(GenerationError::InvalidNumSteps);
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(GenerationError::InvalidTemperature(self.temperature));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(GenerationError::InvalidTopP(self.top_p));
        }
        Ok(())
    }
}

pub trait Esm3InferenceClient {
    fn generate(&self, protein: ESMProtein, config: &GenerationConfig) -> Result<ESMProtein>;
}
