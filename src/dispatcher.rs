use std::sync::Arc;

use serde::Serialize;

use crate::{
    codec,
    errors::Result,
    lifecycle::RequestContext,
    pipeline::Prediction,
    registry::{PipelineKey, TaskSpec},
};

/// JSON body of a successful classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub predicted_class_index: usize,
    pub predicted_class_name: &'static str,
}

/// Encoded result of one task, ready to be shaped into an HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultPayload {
    Classification(Classification),
    Colorized {
        png: Vec<u8>,
    },
    Flood {
        mask_png: Vec<u8>,
        overlay_png: Vec<u8>,
        flood_detected: bool,
    },
}

impl ResultPayload {
    fn encode(prediction: Prediction) -> Result<Self> {
        Ok(match prediction {
            Prediction::Label { index, name } => Self::Classification(Classification {
                predicted_class_index: index,
                predicted_class_name: name,
            }),
            Prediction::Colorized(image) => Self::Colorized {
                png: codec::encode_png(&image)?,
            },
            Prediction::Flood {
                mask,
                overlay,
                flood_detected,
            } => Self::Flood {
                mask_png: codec::encode_png(&mask)?,
                overlay_png: codec::encode_png(&overlay)?,
                flood_detected,
            },
        })
    }
}

/// Runs one image through the pipeline bound to a key.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    spec: Arc<TaskSpec>,
}

impl Dispatcher {
    pub fn new(spec: Arc<TaskSpec>) -> Self {
        Self { spec }
    }

    /// decode → preprocess → infer → postprocess → encode. Blocking; callers on the async
    /// runtime must move this onto a blocking thread.
    pub fn dispatch(
        &self,
        ctx: &RequestContext,
        key: PipelineKey,
        image_bytes: &[u8],
    ) -> Result<ResultPayload> {
        let pipeline = self.spec.resolve(key)?;

        let image = codec::decode(image_bytes)?;
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            "image decoded"
        );

        let tensor = (pipeline.preprocess)(&image)?;
        let output = self.spec.infer(&pipeline.model, &tensor)?;
        let prediction = (pipeline.postprocess)(output.view(), &image)?;
        let payload = ResultPayload::encode(prediction)?;

        tracing::info!(
            correlation_id = %ctx.correlation_id,
            pipeline = %key,
            model = pipeline.model.name(),
            elapsed_ms = ctx.elapsed_ms(),
            "dispatch complete"
        );
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GatewayError;
    use crate::mocks::create_mock_spec;
    use crate::registry::Backbone;
    use axum::http::Method;
    use image::{Rgb, RgbImage};

    fn png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        codec::encode_png(&RgbImage::from_pixel(width, height, Rgb(color)))
            .expect("png encoding")
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Method::POST, "/classify_crop")
    }

    #[test]
    fn test_classification_payload() -> Result<()> {
        let spec = create_mock_spec([0.0, 0.0, 0.0, 5.0, 0.0], 0.0);
        let dispatcher = Dispatcher::new(Arc::new(spec));
        let payload = dispatcher.dispatch(
            &ctx(),
            PipelineKey::Classify(Backbone::Vgg16),
            &png(10, 10, [0, 0, 0]),
        )?;
        assert_eq!(
            payload,
            ResultPayload::Classification(Classification {
                predicted_class_index: 3,
                predicted_class_name: "Sugarcane",
            })
        );
        Ok(())
    }

    #[test]
    fn test_flood_payload_decodes() -> Result<()> {
        let dispatcher = Dispatcher::new(Arc::new(create_mock_spec([0.0; 5], 0.0)));
        let ResultPayload::Flood {
            mask_png,
            overlay_png,
            flood_detected,
        } = dispatcher.dispatch(&ctx(), PipelineKey::FloodSegment, &png(300, 200, [9, 9, 9]))?
        else {
            panic!("flood pipeline must produce a bundle");
        };

        assert!(!flood_detected);
        assert_eq!(codec::decode(&mask_png)?.dimensions(), (256, 256));
        assert_eq!(codec::decode(&overlay_png)?.dimensions(), (256, 256));
        Ok(())
    }

    #[test]
    fn test_garbage_bytes_are_a_decode_error() {
        let dispatcher = Dispatcher::new(Arc::new(create_mock_spec([0.0; 5], 0.0)));
        assert!(matches!(
            dispatcher.dispatch(&ctx(), PipelineKey::Colorize, b"not an image"),
            Err(GatewayError::Decode { .. })
        ));
    }

    #[test]
    fn test_unregistered_key() {
        let dispatcher = Dispatcher::new(Arc::new(TaskSpec::default()));
        assert!(matches!(
            dispatcher.dispatch(&ctx(), PipelineKey::Colorize, &png(4, 4, [0, 0, 0])),
            Err(GatewayError::UnknownModel { .. })
        ));
    }
}
