//! Exit codes of the `marketplace` binary.
//!
//! Registry failures exit with `RegistryError::exit_code`, part of the
//! public contract:
//!
//! | Code | Meaning |
//! |------|---------|
//! | 1 | Unknown integration or malformed request |
//! | 2 | Missing or invalid publish token |
//! | 3 | Verify workflow did not pass, or claim mismatch |
//! | 4 | `listen_path` or name held by another integration |
//! | 5 | Key set / run history unavailable or not configured |
//! | 6 | Storage failure |

pub const SUCCESS: i32 = 0;
pub const INTERNAL_ERROR: i32 = 7; // I/O, unreadable input, runtime failures
