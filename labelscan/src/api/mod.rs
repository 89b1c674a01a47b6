mod handlers;
mod routes;
mod state;
mod upload;

pub use handlers::{HealthData, OcrStatus, VisionStatus};
pub use routes::create_router;
pub use state::AppState;
pub use upload::save_upload;
