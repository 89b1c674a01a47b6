use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::ImagePipeline;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<ImagePipeline>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let pipeline = ImagePipeline::new(&config);
        Self::with_pipeline(config, pipeline)
    }

    /// Build state around an already assembled pipeline, e.g. one with a
    /// substituted recognition engine.
    pub fn with_pipeline(config: Config, pipeline: ImagePipeline) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        }
    }
}
