mod handlers;
mod models;
mod request;
mod state;
mod util;

pub use handlers::{router, run_server};
pub use state::ServerState;
