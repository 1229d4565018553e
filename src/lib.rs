pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod logging;
pub mod server;
pub mod translate;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use gateway::SessionGateway;
pub use guard::AccessGuard;
pub use logging::SharedLogger;
pub use server::{build_router, AppState};
