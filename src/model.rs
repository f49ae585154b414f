use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    errors::{GatewayError, Result},
    traits::ScoringSession,
};
use ndarray::prelude::*;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;

/// Session construction knobs shared by every model.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub device_id: i32,
    pub intra_threads: usize,
    pub pool_size: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            device_id: 0,
            intra_threads: 1,
            pool_size: 1,
        }
    }
}

/// ONNX Runtime scoring session.
///
/// Holds `pool_size` independent sessions over the same artifact. Calls are spread
/// round-robin so concurrent requests rarely contend on the same session lock.
pub struct OrtSession {
    name: String,
    input_name: String,
    output_name: String,
    input_shape: Vec<Option<usize>>,
    output_shape: Vec<Option<usize>>,
    sessions: Vec<Mutex<Session>>,
    next_idx: AtomicUsize,
}

impl OrtSession {
    pub fn load(name: &str, model_path: &Path, options: SessionOptions) -> Result<Self> {
        if !model_path.is_file() {
            return Err(GatewayError::FileSystem {
                path: model_path.to_path_buf(),
                operation: format!("loading model artifact `{name}`"),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "model file does not exist",
                ),
            });
        }

        let sessions = (0..options.pool_size.max(1))
            .map(|_| build_session(name, model_path, options))
            .collect::<Result<Vec<_>>>()?;

        let (input_name, input_shape, output_name, output_shape) = {
            let first = &sessions[0];
            let input = first.inputs.first().ok_or_else(|| GatewayError::Configuration {
                message: format!("model `{name}` declares no inputs"),
            })?;
            let output = first.outputs.first().ok_or_else(|| GatewayError::Configuration {
                message: format!("model `{name}` declares no outputs"),
            })?;
            (
                input.name.clone(),
                declared_dims(input.input_type.tensor_shape().map(|s| &s[..])),
                output.name.clone(),
                declared_dims(output.output_type.tensor_shape().map(|s| &s[..])),
            )
        };

        let model = Self {
            name: name.to_string(),
            input_name,
            output_name,
            input_shape,
            output_shape,
            sessions: sessions.into_iter().map(Mutex::new).collect(),
            next_idx: AtomicUsize::new(0),
        };
        model.warm_up()?;

        tracing::info!(
            model = name,
            path = %model_path.display(),
            input = ?model.input_shape,
            output = ?model.output_shape,
            pool = model.sessions.len(),
            "model loaded"
        );
        Ok(model)
    }

    /// Push a zero tensor through every pooled session so first-run allocation happens
    /// before traffic arrives.
    fn warm_up(&self) -> Result<()> {
        let dims = self
            .input_shape
            .iter()
            .map(|d| d.unwrap_or(1))
            .collect::<Vec<_>>();
        let data = ArrayD::<f32>::zeros(IxDyn(&dims));
        for slot in &self.sessions {
            let mut session = slot.lock();
            self.run_on(&mut session, data.view())
                .map_err(|e| GatewayError::ModelLoad {
                    model: self.name.clone(),
                    operation: "warm-up run".to_string(),
                    source: Box::new(e),
                })?;
        }
        Ok(())
    }

    fn run_on(&self, session: &mut Session, input: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let input = input.as_standard_layout();
        let tensor = TensorRef::from_array_view(&input)
            .map_err(|e| self.inference_error("tensor conversion", e))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| self.inference_error("session run", e))?;
        let output = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(|e| self.inference_error("output extraction", e))?
            .to_owned();
        Ok(output)
    }

    fn inference_error(&self, operation: &str, err: ort::Error) -> GatewayError {
        GatewayError::Inference {
            model: self.name.clone(),
            operation: operation.to_string(),
            source: Box::new(err),
        }
    }
}

impl ScoringSession for OrtSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_input(&self) -> Vec<Option<usize>> {
        self.input_shape.clone()
    }

    fn declared_output(&self) -> Vec<Option<usize>> {
        self.output_shape.clone()
    }

    fn run(&self, input: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let idx = self.next_idx.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[idx].lock();
        self.run_on(&mut session, input)
    }
}

fn build_session(name: &str, model_path: &Path, options: SessionOptions) -> Result<Session> {
    let load_error = |operation: &str, e: ort::Error| GatewayError::ModelLoad {
        model: name.to_string(),
        operation: operation.to_string(),
        source: Box::new(e),
    };

    SessionBuilder::new()
        .map_err(|e| load_error("session builder init", e))?
        .with_execution_providers([
            TensorRTExecutionProvider::default()
                .with_device_id(options.device_id)
                .build(),
            CUDAExecutionProvider::default()
                .with_device_id(options.device_id)
                .build(),
        ])
        .map_err(|e| load_error("execution provider setup", e))?
        .with_intra_threads(options.intra_threads.max(1))
        .map_err(|e| load_error("intra-op thread setup", e))?
        .with_memory_pattern(true)
        .map_err(|e| load_error("memory pattern setup", e))?
        .commit_from_file(model_path)
        .map_err(|e| load_error(&format!("reading {}", model_path.display()), e))
}

/// Negative or zero dimensions in ONNX metadata mean "dynamic".
fn declared_dims(dims: Option<&[i64]>) -> Vec<Option<usize>> {
    dims.map(|dims| {
        dims.iter()
            .map(|&d| usize::try_from(d).ok().filter(|&d| d > 0))
            .collect()
    })
    .unwrap_or_default()
}
