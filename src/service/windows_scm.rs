//! Windows services through sc.exe
//!
//! SCM services are machine-wide, so the scope argument is accepted for
//! interface parity and otherwise ignored.

use std::sync::Arc;

use log::{info, warn};

use crate::error::{Error, Result};
use crate::model::{ServiceConfig, ServiceScope};
use crate::service::ServiceManager;
use crate::service::runner::{CommandOutput, CommandRunner, SystemRunner, run_checked, try_run};

pub struct WindowsScm {
    runner: Arc<dyn CommandRunner>,
}

impl Default for WindowsScm {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowsScm {
    pub fn new() -> Self {
        Self::with_runner(Arc::new(SystemRunner))
    }

    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn sc(&self, args: &[&str]) -> Result<CommandOutput> {
        run_checked(self.runner.as_ref(), "sc", args)
    }

    fn sc_query_ok(&self, args: &[&str]) -> Option<CommandOutput> {
        try_run(self.runner.as_ref(), "sc", args).filter(CommandOutput::success)
    }
}

/// Value for `binPath=`, quoting both paths so spaces survive.
pub fn bin_path(config: &ServiceConfig) -> String {
    format!(
        "\"{}\" -c \"{}\"",
        config.binary_path.display(),
        config.config_path.display()
    )
}

fn start_type(auto_start: bool) -> &'static str {
    if auto_start { "auto" } else { "demand" }
}

impl ServiceManager for WindowsScm {
    fn manager_name(&self) -> &'static str {
        "the Service Control Manager"
    }

    fn is_installed(&self, name: &str) -> bool {
        self.sc_query_ok(&["query", name]).is_some()
    }

    fn install(&self, config: &ServiceConfig) -> Result<()> {
        let bin = bin_path(config);
        self.sc(&[
            "create",
            &config.service_name,
            "binPath=",
            &bin,
            "start=",
            start_type(config.auto_start),
            "DisplayName=",
            &config.description,
        ])?;
        if let Err(e) = self.sc(&["description", &config.service_name, &config.description]) {
            warn!("Could not set description of {}: {}", config.service_name, e);
        }
        info!("Installed Windows service {}", config.service_name);
        Ok(())
    }

    fn uninstall(&self, name: &str) -> Result<()> {
        if !self.is_installed(name) {
            warn!("Windows service {} does not exist", name);
            return Err(Error::NotInstalled(name.to_string()));
        }
        if self.is_running(name, ServiceScope::System)
            && let Err(e) = self.sc(&["stop", name])
        {
            warn!("Ignoring failed stop of {} during uninstall: {}", name, e);
        }
        self.sc(&["delete", name])?;
        info!("Uninstalled Windows service {}", name);
        Ok(())
    }

    fn start(&self, name: &str, _scope: ServiceScope) -> Result<()> {
        self.sc(&["start", name]).map(|_| ())
    }

    fn stop(&self, name: &str, _scope: ServiceScope) -> Result<()> {
        self.sc(&["stop", name]).map(|_| ())
    }

    fn is_running(&self, name: &str, _scope: ServiceScope) -> bool {
        self.sc_query_ok(&["query", name])
            .is_some_and(|out| out.stdout.contains("RUNNING"))
    }

    fn is_auto_start_enabled(&self, name: &str, _scope: ServiceScope) -> bool {
        self.sc_query_ok(&["qc", name])
            .is_some_and(|out| out.stdout.contains("AUTO_START"))
    }

    fn set_auto_start(&self, name: &str, enabled: bool, _scope: ServiceScope) -> Result<()> {
        self.sc(&["config", name, "start=", start_type(enabled)])
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use super::*;
    use crate::service::runner::fake::{FakeRunner, fail, ok};

    #[derive(Default)]
    struct Scm {
        installed: bool,
        running: bool,
        auto: bool,
    }

    fn fake_sc() -> Arc<FakeRunner> {
        let scm = Arc::new(Mutex::new(Scm::default()));
        Arc::new(FakeRunner::new().respond("sc", move |args| {
            let mut scm = scm.lock().unwrap();
            let missing = || fail(1060, "[SC] OpenService FAILED 1060");
            match args[0].as_str() {
                "create" if scm.installed => return fail(1073, "[SC] CreateService FAILED 1073"),
                "create" => {
                    scm.installed = true;
                    scm.auto = args.iter().any(|a| a == "auto");
                }
                _ if !scm.installed => return missing(),
                "start" => scm.running = true,
                "stop" => scm.running = false,
                "delete" => *scm = Scm::default(),
                "config" => scm.auto = args.iter().any(|a| a == "auto"),
                "query" => {
                    let state = if scm.running { "4  RUNNING" } else { "1  STOPPED" };
                    return ok(&format!("SERVICE_NAME: frpc\n        STATE              : {}\n", state));
                }
                "qc" => {
                    let start = if scm.auto { "2   AUTO_START" } else { "3   DEMAND_START" };
                    return ok(&format!("[SC] QueryServiceConfig SUCCESS\n        START_TYPE         : {}\n", start));
                }
                _ => {}
            }
            ok("[SC] SUCCESS")
        }))
    }

    fn config() -> ServiceConfig {
        ServiceConfig {
            service_name: "frpc".into(),
            binary_path: PathBuf::from(r"C:\Program Files\frp\frpc.exe"),
            config_path: PathBuf::from(r"C:\frp\frpc.toml"),
            scope: ServiceScope::System,
            auto_start: true,
            description: "frp reverse proxy client".into(),
        }
    }

    #[test]
    fn create_arguments() {
        let runner = fake_sc();
        let scm = WindowsScm::with_runner(runner.clone());
        scm.install(&config()).unwrap();

        assert!(runner.called_with(&[
            "create",
            "frpc",
            "binPath=",
            r#""C:\Program Files\frp\frpc.exe" -c "C:\frp\frpc.toml""#,
            "start=",
            "auto",
            "DisplayName=",
            "frp reverse proxy client",
        ]));
    }

    #[test]
    fn lifecycle() {
        let scm = WindowsScm::with_runner(fake_sc());
        assert!(!scm.is_installed("frpc"));

        scm.install(&config()).unwrap();
        assert!(scm.is_installed("frpc"));
        assert!(scm.is_auto_start_enabled("frpc", ServiceScope::System));
        assert_eq!(scm.status("frpc", ServiceScope::System).state, "stopped");

        scm.start("frpc", ServiceScope::System).unwrap();
        assert!(scm.is_running("frpc", ServiceScope::User));

        scm.set_auto_start("frpc", false, ServiceScope::System)
            .unwrap();
        assert!(!scm.is_auto_start_enabled("frpc", ServiceScope::System));

        scm.uninstall("frpc").unwrap();
        assert!(!scm.is_installed("frpc"));
    }

    #[test]
    fn duplicate_create_fails() {
        let scm = WindowsScm::with_runner(fake_sc());
        scm.install(&config()).unwrap();
        assert!(matches!(
            scm.install(&config()),
            Err(Error::CommandFailed { code: Some(1073), .. })
        ));
        assert!(matches!(
            WindowsScm::with_runner(fake_sc()).uninstall("frpc"),
            Err(Error::NotInstalled(name)) if name == "frpc"
        ));
    }
}
