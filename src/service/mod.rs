//! Native background-service registration for frpc.
//!
//! One [`ServiceManager`] implementation per service manager:
//! - macOS: launchd ([`Launchd`])
//! - Linux: systemd ([`Systemd`])
//! - Windows: Service Control Manager ([`WindowsScm`])
//!
//! The implementation is chosen once by [`for_current_platform`]. None of
//! these calls spawn frpc under our own PID; the OS owns the process.

pub mod launchd;
pub mod runner;
pub mod systemd;
pub mod windows_scm;

pub use launchd::Launchd;
pub use runner::{CommandOutput, CommandRunner, SystemRunner};
pub use systemd::Systemd;
pub use windows_scm::WindowsScm;

use crate::error::Result;
use crate::model::{ServiceConfig, ServiceScope, ServiceStatus};

pub trait ServiceManager: Send + Sync {
    /// Short name of the backing service manager, for messages.
    fn manager_name(&self) -> &'static str;

    /// Whether a definition for `name` exists in either scope.
    fn is_installed(&self, name: &str) -> bool;

    /// Write the native definition and register it with the OS.
    fn install(&self, config: &ServiceConfig) -> Result<()>;

    /// Best-effort stop, unregister and delete, in both scopes.
    fn uninstall(&self, name: &str) -> Result<()>;

    fn start(&self, name: &str, scope: ServiceScope) -> Result<()>;

    fn stop(&self, name: &str, scope: ServiceScope) -> Result<()>;

    fn is_running(&self, name: &str, scope: ServiceScope) -> bool;

    fn is_auto_start_enabled(&self, name: &str, scope: ServiceScope) -> bool;

    fn set_auto_start(&self, name: &str, enabled: bool, scope: ServiceScope) -> Result<()>;

    /// Fresh snapshot of the service; nothing is cached between calls.
    fn status(&self, name: &str, scope: ServiceScope) -> ServiceStatus {
        if !self.is_installed(name) {
            return ServiceStatus {
                state: "not-installed".to_string(),
                message: Some(format!(
                    "{} is not registered with {}",
                    name,
                    self.manager_name()
                )),
                ..ServiceStatus::default()
            };
        }

        let is_running = self.is_running(name, scope);
        ServiceStatus {
            is_installed: true,
            is_running,
            is_auto_start_enabled: self.is_auto_start_enabled(name, scope),
            state: if is_running { "running" } else { "stopped" }.to_string(),
            message: None,
        }
    }
}

/// Pick the service manager of the OS we are running on.
pub fn for_current_platform() -> Box<dyn ServiceManager> {
    #[cfg(target_os = "macos")]
    {
        Box::new(Launchd::new())
    }
    #[cfg(target_os = "windows")]
    {
        Box::new(WindowsScm::new())
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Box::new(Systemd::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    /// Minimal in-memory manager to exercise the default `status`.
    struct Stub {
        installed: bool,
        running: bool,
        auto_start: bool,
    }

    impl ServiceManager for Stub {
        fn manager_name(&self) -> &'static str {
            "stub"
        }
        fn is_installed(&self, _name: &str) -> bool {
            self.installed
        }
        fn install(&self, _config: &ServiceConfig) -> Result<()> {
            Ok(())
        }
        fn uninstall(&self, name: &str) -> Result<()> {
            Err(Error::NotInstalled(name.to_string()))
        }
        fn start(&self, _name: &str, _scope: ServiceScope) -> Result<()> {
            Ok(())
        }
        fn stop(&self, _name: &str, _scope: ServiceScope) -> Result<()> {
            Ok(())
        }
        fn is_running(&self, _name: &str, _scope: ServiceScope) -> bool {
            self.running
        }
        fn is_auto_start_enabled(&self, _name: &str, _scope: ServiceScope) -> bool {
            self.auto_start
        }
        fn set_auto_start(&self, _name: &str, _enabled: bool, _scope: ServiceScope) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn status_of_missing_service() {
        let stub = Stub {
            installed: false,
            running: true,
            auto_start: true,
        };
        let status = stub.status("frpc", ServiceScope::User);
        assert!(!status.is_installed);
        assert!(!status.is_running);
        assert_eq!(status.state, "not-installed");
        assert!(status.message.unwrap().contains("stub"));
    }

    #[test]
    fn status_composes_queries() {
        let stub = Stub {
            installed: true,
            running: false,
            auto_start: true,
        };
        let status = stub.status("frpc", ServiceScope::System);
        assert!(status.is_installed);
        assert!(!status.is_running);
        assert!(status.is_auto_start_enabled);
        assert_eq!(status.state, "stopped");
        assert!(status.message.is_none());
    }
}
