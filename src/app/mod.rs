mod routes;
mod server;
pub mod state;

pub use routes::create_router;
pub use server::start_server;
