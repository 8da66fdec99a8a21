pub mod app;
pub mod backend;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod memory_backend;
pub mod models;
pub mod period;
pub mod session;
pub mod state;
pub mod stats;
pub mod storage;
pub mod store;
pub mod sync;
pub mod ui;

pub use app::router;
pub use config::Config;
pub use errors::SyncError;
pub use memory_backend::MemoryBackend;
pub use session::{Session, SessionDeps};
pub use state::AppState;
pub use storage::LocalStore;
