use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::Result;
use crate::pipeline::{classify, colorize, flood};
use crate::registry::{Backbone, PipelineKey, TaskSpec};
use crate::traits::ScoringSession;
use ndarray::prelude::*;

/// Stub scoring session that answers every call with a canned tensor.
#[derive(Debug)]
pub struct StubSession {
    name: String,
    declared_input: Vec<Option<usize>>,
    output: Option<ArrayD<f32>>,
    calls: AtomicUsize,
}

impl StubSession {
    pub fn new(name: &str, input_shape: &[usize], output: ArrayD<f32>) -> Self {
        Self {
            name: name.to_string(),
            declared_input: input_shape.iter().copied().map(Some).collect(),
            output: Some(output),
            calls: AtomicUsize::new(0),
        }
    }

    /// Echoes its input back.
    pub fn identity(input_shape: &[usize]) -> Self {
        Self {
            name: "identity".to_string(),
            declared_input: input_shape.iter().copied().map(Some).collect(),
            output: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn classifier(logits: [f32; 5]) -> Self {
        let output = Array::from_shape_vec(IxDyn(&classify::OUTPUT_SHAPE), logits.to_vec())
            .expect("logits match the classifier output shape");
        Self::new("stub-classifier", &classify::INPUT_SHAPE, output)
    }

    pub fn flood(probability: f32) -> Self {
        let output = ArrayD::from_elem(IxDyn(&flood::OUTPUT_SHAPE), probability);
        Self::new("stub-flood", &flood::INPUT_SHAPE, output)
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_declared_input(mut self, dims: Vec<Option<usize>>) -> Self {
        self.declared_input = dims;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ScoringSession for StubSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_input(&self) -> Vec<Option<usize>> {
        self.declared_input.clone()
    }

    fn declared_output(&self) -> Vec<Option<usize>> {
        match &self.output {
            Some(output) => output.shape().iter().copied().map(Some).collect(),
            None => self.declared_input.clone(),
        }
    }

    fn run(&self, input: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(match &self.output {
            Some(output) => output.clone(),
            None => input.to_owned(),
        })
    }
}

/// Scoring session that panics on every call.
#[derive(Debug, Default)]
pub struct PanickingSession;

impl ScoringSession for PanickingSession {
    fn name(&self) -> &str {
        "panicking"
    }

    fn declared_input(&self) -> Vec<Option<usize>> {
        Vec::new()
    }

    fn declared_output(&self) -> Vec<Option<usize>> {
        Vec::new()
    }

    fn run(&self, _input: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        panic!("scoring session fault")
    }
}

/// Registry with every key bound to a stub: both classifiers answer `logits`, the
/// colorizer is the identity and the flood segmenter answers `flood_probability`
/// everywhere.
pub fn create_mock_spec(logits: [f32; 5], flood_probability: f32) -> TaskSpec {
    let register = || -> Result<TaskSpec> {
        Ok(TaskSpec::builder()
            .register(
                PipelineKey::Classify(Backbone::Vgg16),
                Arc::new(StubSession::classifier(logits).named("stub-vgg16")),
            )?
            .register(
                PipelineKey::Classify(Backbone::Vit),
                Arc::new(StubSession::classifier(logits).named("stub-vit")),
            )?
            .register(
                PipelineKey::Colorize,
                Arc::new(StubSession::identity(&colorize::INPUT_SHAPE)),
            )?
            .register(
                PipelineKey::FloodSegment,
                Arc::new(StubSession::flood(flood_probability)),
            )?
            .build())
    };
    register().expect("stub sessions satisfy every pipeline contract")
}
