pub mod extract;
pub mod handlers;
pub mod render;
pub mod routes;

pub use extract::CreateLinkPayload;
pub use handlers::AppState;
pub use render::{JsonRenderer, ViewRenderer};
pub use routes::create_api_router;
