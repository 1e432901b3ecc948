pub mod config;
pub mod error;
pub mod rl;
pub mod sim;
pub mod task;
#[cfg(feature = "viewer")]
pub mod viewer;

// Re-export commonly used types for convenience
pub use error::{Error, Result};
pub use rl::{Agent, TrainConfig};
pub use sim::{PlanarBody, SimState, Simulation};
pub use task::{Session, TaskController};
