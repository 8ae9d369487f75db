//! Logger initialization.
//!
//! Library code only uses the `log` facade. Targets worth filtering on:
//! - `orrery::state`: resource state transitions (with `SceneConfig::log_state_changes`)
//! - `orrery::alloc`: device object allocation and destruction

mod init;

pub use init::{init_logging, LoggingConfig};
