use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{
    config::Config,
    errors::{GatewayError, Result},
    model::OrtSession,
    pipeline::{classify, colorize, flood, PostprocessFn, PreprocessFn, Tensor},
    traits::ScoringSession,
};

/// Classification backbones sharing one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backbone {
    Vgg16,
    Vit,
}

impl Backbone {
    pub const fn from_vit_flag(use_vit: bool) -> Self {
        if use_vit {
            Self::Vit
        } else {
            Self::Vgg16
        }
    }
}

/// Closed set of (task, variant) pairs the gateway can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKey {
    Classify(Backbone),
    Colorize,
    FloodSegment,
}

impl PipelineKey {
    pub const ALL: [Self; 4] = [
        Self::Classify(Backbone::Vgg16),
        Self::Classify(Backbone::Vit),
        Self::Colorize,
        Self::FloodSegment,
    ];

    pub const fn model_name(self) -> &'static str {
        match self {
            Self::Classify(Backbone::Vgg16) => "vgg16",
            Self::Classify(Backbone::Vit) => "vit",
            Self::Colorize => "colorizer",
            Self::FloodSegment => "flood-segmenter",
        }
    }

    pub fn preprocess(self) -> PreprocessFn {
        match self {
            Self::Classify(Backbone::Vgg16) => classify::preprocess_vgg16,
            Self::Classify(Backbone::Vit) => classify::preprocess_vit,
            Self::Colorize => colorize::preprocess,
            Self::FloodSegment => flood::preprocess,
        }
    }

    pub fn postprocess(self) -> PostprocessFn {
        match self {
            Self::Classify(_) => classify::postprocess,
            Self::Colorize => colorize::postprocess,
            Self::FloodSegment => flood::postprocess,
        }
    }

    pub const fn input_shape(self) -> &'static [usize] {
        match self {
            Self::Classify(_) => &classify::INPUT_SHAPE,
            Self::Colorize => &colorize::INPUT_SHAPE,
            Self::FloodSegment => &flood::INPUT_SHAPE,
        }
    }

    pub const fn output_shape(self) -> &'static [usize] {
        match self {
            Self::Classify(_) => &classify::OUTPUT_SHAPE,
            Self::Colorize => &colorize::OUTPUT_SHAPE,
            Self::FloodSegment => &flood::OUTPUT_SHAPE,
        }
    }
}

impl fmt::Display for PipelineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classify(_) => write!(f, "classify/{}", self.model_name()),
            Self::Colorize => f.write_str("colorize"),
            Self::FloodSegment => f.write_str("flood-segment"),
        }
    }
}

/// One loaded scoring session, shared by every request that resolves to it.
#[derive(Clone)]
pub struct ModelHandle {
    session: Arc<dyn ScoringSession>,
    input_shape: &'static [usize],
}

impl ModelHandle {
    pub fn name(&self) -> &str {
        self.session.name()
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("name", &self.session.name())
            .finish()
    }
}

/// The (preprocess, model, postprocess) triple bound to one key.
#[derive(Clone)]
pub struct Pipeline {
    pub key: PipelineKey,
    pub preprocess: PreprocessFn,
    pub model: ModelHandle,
    pub postprocess: PostprocessFn,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("key", &self.key)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Immutable registry of every pipeline, built once at startup.
#[derive(Debug, Default)]
pub struct TaskSpec {
    pipelines: HashMap<PipelineKey, Pipeline>,
}

impl TaskSpec {
    pub fn builder() -> TaskSpecBuilder {
        TaskSpecBuilder::default()
    }

    /// Load every configured artifact. Any failure aborts startup.
    pub fn load(config: &Config) -> Result<Self> {
        let options = config.session_options();
        PipelineKey::ALL
            .into_iter()
            .try_fold(Self::builder(), |builder, key| {
                let session = OrtSession::load(key.model_name(), config.model_path(key), options)?;
                builder.register(key, Arc::new(session))
            })
            .map(TaskSpecBuilder::build)
    }

    pub fn resolve(&self, key: PipelineKey) -> Result<&Pipeline> {
        self.pipelines
            .get(&key)
            .ok_or_else(|| GatewayError::UnknownModel {
                key: key.to_string(),
            })
    }

    /// Run one forward pass. The tensor must already have the model's input shape.
    pub fn infer(&self, handle: &ModelHandle, tensor: &Tensor) -> Result<Tensor> {
        if tensor.shape() != handle.input_shape {
            return Err(GatewayError::Inference {
                model: handle.name().to_string(),
                operation: "input shape check".to_string(),
                source: format!(
                    "tensor shape {:?} does not match {:?}",
                    tensor.shape(),
                    handle.input_shape
                )
                .into(),
            });
        }
        handle.session.run(tensor.view())
    }

    pub fn keys(&self) -> impl Iterator<Item = PipelineKey> + '_ {
        self.pipelines.keys().copied()
    }
}

#[derive(Debug, Default)]
pub struct TaskSpecBuilder {
    pipelines: HashMap<PipelineKey, Pipeline>,
}

impl TaskSpecBuilder {
    /// Bind a session to a key after checking its declared shapes against the pipeline
    /// contract. Dynamic dimensions are accepted as-is.
    pub fn register(mut self, key: PipelineKey, session: Arc<dyn ScoringSession>) -> Result<Self> {
        check_declared(&*session, "input", &session.declared_input(), key.input_shape())?;
        check_declared(&*session, "output", &session.declared_output(), key.output_shape())?;

        self.pipelines.insert(
            key,
            Pipeline {
                key,
                preprocess: key.preprocess(),
                model: ModelHandle {
                    session,
                    input_shape: key.input_shape(),
                },
                postprocess: key.postprocess(),
            },
        );
        Ok(self)
    }

    pub fn build(self) -> TaskSpec {
        TaskSpec {
            pipelines: self.pipelines,
        }
    }
}

fn check_declared(
    session: &dyn ScoringSession,
    side: &str,
    declared: &[Option<usize>],
    contract: &[usize],
) -> Result<()> {
    if declared.is_empty() {
        return Ok(());
    }

    let compatible = declared.len() == contract.len()
        && declared
            .iter()
            .zip(contract)
            .all(|(declared, expected)| declared.map_or(true, |d| d == *expected));

    if compatible {
        Ok(())
    } else {
        Err(GatewayError::Configuration {
            message: format!(
                "model `{}` declares {side} shape {declared:?}, pipeline requires {contract:?}",
                session.name()
            ),
        })
    }
}
