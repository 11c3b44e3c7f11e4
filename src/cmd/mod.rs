//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled                              |
//! |------------|-----------------------------------------------|
//! | `session`  | `New`, `Status`, `Pause`, `Abandon`           |
//! | `run`      | `Run`, `Resume`                               |
//! | `capsule`  | `Capsules`                                    |
//! | `recover`  | `Recover`                                     |

pub mod capsule;
pub mod recover;
pub mod run;
pub mod session;

pub use capsule::cmd_capsules;
pub use recover::cmd_recover;
pub use run::{cmd_resume, cmd_run};
pub use session::{NewArgs, cmd_abandon, cmd_new, cmd_pause, cmd_status};
