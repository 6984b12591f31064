pub mod app;
pub mod config;

pub use app::build_router;
pub use config::ServerConfig;
