//! CLI subcommands for zcio-cli.
//!
//! ## Usage
//!
//! ```bash
//! zcio-cli load a.bin b.bin   # Load files through a file cache, print stats
//! zcio-cli config show        # Effective configuration as JSON
//! zcio-cli config validate    # Exit 2 on an invalid ZCIO_* variable
//! ```

pub mod config_cmd;
pub mod load_cmd;

pub use load_cmd::{load_exit_code, run_load, LoadReport};

/// Exit code for success.
pub const EXIT_OK: i32 = 0;
/// Exit code for a failed operation.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for a configuration error.
pub const EXIT_CONFIG: i32 = 2;
