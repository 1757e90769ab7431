//! Utility modules

mod guarded_read;
mod tracing_setup;

pub use guarded_read::read_all;
pub use tracing_setup::init_tracing;
