//! Generation request value object.

use crate::adapters::veo::ReferenceType;
use crate::media::PreparedMedia;
use serde_json::{Map, Value};

/// Everything a node sends to a provider, built fresh per invocation.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub seed: Option<u64>,
    pub sample_count: Option<u32>,
    pub aspect_ratio: Option<String>,
    pub temperature: Option<f64>,
    /// Provider-specific parameters, merged into the request as-is.
    pub extra_params: Map<String, Value>,
    pub inputs: Vec<PreparedMedia>,
    /// Send inputs as video reference images instead of a start frame.
    pub reference_type: Option<ReferenceType>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        let negative_prompt = negative_prompt.into();
        self.negative_prompt = (!negative_prompt.trim().is_empty()).then_some(negative_prompt);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.sample_count = Some(count);
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: impl Into<String>) -> Self {
        self.aspect_ratio = Some(aspect_ratio.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra_params.insert(key.into(), value);
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<PreparedMedia>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_reference_type(mut self, reference_type: ReferenceType) -> Self {
        self.reference_type = Some(reference_type);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_negative_prompt_is_dropped() {
        let r = GenerationRequest::new("m", "p").with_negative_prompt("  ");
        assert!(r.negative_prompt.is_none());
        let r = GenerationRequest::new("m", "p").with_negative_prompt("blurry");
        assert_eq!(r.negative_prompt.as_deref(), Some("blurry"));
    }
}
