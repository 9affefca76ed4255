//! Platform abstraction layer
//!
//! This module provides platform-specific implementations for:
//! - Preparing the frpc child so its whole process tree can be signalled
//! - Graceful termination requests
//! - Forced process-tree termination

#[cfg(unix)]
pub mod unix;

#[cfg(target_os = "windows")]
pub mod windows;

// Re-export the current platform's modules
#[cfg(unix)]
pub use unix as current;

#[cfg(target_os = "windows")]
pub use windows as current;

/// Result of a signal or termination request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KillOutcome {
    Success,
    AlreadyExited,
    PermissionDenied,
    Failed(i32),
}
