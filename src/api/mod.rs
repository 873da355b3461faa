mod handlers;
mod routes;
mod sse;
mod state;

pub use routes::create_router;
pub use state::AppState;
