//! systemd units for Linux, user or system scope

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::model::{ServiceConfig, ServiceScope};
use crate::service::ServiceManager;
use crate::service::runner::{CommandOutput, CommandRunner, SystemRunner, run_checked, try_run};

const SYSTEM_UNIT_DIR: &str = "/etc/systemd/system";

pub struct Systemd {
    runner: Arc<dyn CommandRunner>,
    user_dir: PathBuf,
    system_dir: PathBuf,
}

impl Default for Systemd {
    fn default() -> Self {
        Self::new()
    }
}

impl Systemd {
    pub fn new() -> Self {
        let user_dir = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("systemd")
            .join("user");
        Self::with_paths(Arc::new(SystemRunner), user_dir, PathBuf::from(SYSTEM_UNIT_DIR))
    }

    pub fn with_paths(runner: Arc<dyn CommandRunner>, user_dir: PathBuf, system_dir: PathBuf) -> Self {
        Self {
            runner,
            user_dir,
            system_dir,
        }
    }

    pub fn unit_path(&self, name: &str, scope: ServiceScope) -> PathBuf {
        let dir = match scope {
            ServiceScope::User => &self.user_dir,
            ServiceScope::System => &self.system_dir,
        };
        dir.join(unit_name(name))
    }

    fn systemctl(&self, scope: ServiceScope, args: &[&str]) -> Result<CommandOutput> {
        let full = scoped_args(scope, args);
        run_checked(self.runner.as_ref(), "systemctl", &full)
    }

    /// Reload units and apply the enablement; a reinstall may flip it either way.
    fn register(&self, scope: ServiceScope, unit: &str, auto_start: bool) -> Result<()> {
        self.systemctl(scope, &["daemon-reload"])?;
        let verb = if auto_start { "enable" } else { "disable" };
        self.systemctl(scope, &[verb, unit]).map(|_| ())
    }

    fn systemctl_ok(&self, scope: ServiceScope, args: &[&str]) -> bool {
        let full = scoped_args(scope, args);
        try_run(self.runner.as_ref(), "systemctl", &full).is_some_and(|out| out.success())
    }
}

fn unit_name(name: &str) -> String {
    format!("{}.service", name)
}

fn scoped_args<'a>(scope: ServiceScope, args: &[&'a str]) -> Vec<&'a str> {
    let mut full = Vec::with_capacity(args.len() + 1);
    if scope == ServiceScope::User {
        full.push("--user");
    }
    full.extend_from_slice(args);
    full
}

/// systemd expands `%` specifiers in most settings.
fn escape_specifiers(s: &str) -> String {
    s.replace('%', "%%")
}

/// Quote one ExecStart word.
fn quote(path: &Path) -> String {
    let escaped = path
        .to_string_lossy()
        .replace('\\', "\\\\")
        .replace('"', "\\\"");
    format!("\"{}\"", escape_specifiers(&escaped))
}

pub fn render_unit(config: &ServiceConfig) -> String {
    format!(
        "[Unit]\n\
         Description={description}\n\
         After=network.target\n\
         \n\
         [Service]\n\
         Type=simple\n\
         ExecStart={binary} -c {config}\n\
         Restart=always\n\
         RestartSec=5\n\
         \n\
         [Install]\n\
         WantedBy=default.target\n",
        description = escape_specifiers(&config.description.replace('\n', " ")),
        binary = quote(&config.binary_path),
        config = quote(&config.config_path),
    )
}

impl ServiceManager for Systemd {
    fn manager_name(&self) -> &'static str {
        "systemd"
    }

    fn is_installed(&self, name: &str) -> bool {
        ServiceScope::ALL
            .iter()
            .any(|scope| self.unit_path(name, *scope).is_file())
    }

    fn install(&self, config: &ServiceConfig) -> Result<()> {
        let scope = config.scope;
        let path = self.unit_path(&config.service_name, scope);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).inspect_err(|e| {
                error!("Failed to create {}: {}", dir.display(), e);
            })?;
        }
        fs::write(&path, render_unit(config)).inspect_err(|e| {
            error!("Failed to write {}: {}", path.display(), e);
        })?;
        info!("Wrote systemd unit {}", path.display());

        let unit = unit_name(&config.service_name);
        if let Err(e) = self.register(scope, &unit, config.auto_start) {
            if let Err(rm) = fs::remove_file(&path) {
                warn!("Could not remove {} after failed install: {}", path.display(), rm);
            } else if let Err(reload) = self.systemctl(scope, &["daemon-reload"]) {
                debug!("daemon-reload after removing {} failed: {}", unit, reload);
            }
            return Err(e);
        }
        info!("Installed {} ({} scope)", unit, scope);
        Ok(())
    }

    fn uninstall(&self, name: &str) -> Result<()> {
        let unit = unit_name(name);
        let mut found = false;
        for scope in ServiceScope::ALL {
            let path = self.unit_path(name, scope);
            if !path.exists() {
                continue;
            }
            found = true;

            if let Err(e) = self.systemctl(scope, &["stop", &unit]) {
                warn!("Ignoring failed stop of {} during uninstall: {}", unit, e);
            }
            if let Err(e) = self.systemctl(scope, &["disable", &unit]) {
                warn!("Ignoring failed disable of {} during uninstall: {}", unit, e);
            }
            fs::remove_file(&path).inspect_err(|e| {
                error!("Failed to remove {}: {}", path.display(), e);
            })?;
            if let Err(e) = self.systemctl(scope, &["daemon-reload"]) {
                warn!("daemon-reload after removing {} failed: {}", unit, e);
            }
            info!("Uninstalled {} ({} scope)", unit, scope);
        }

        if found {
            Ok(())
        } else {
            warn!("{} is not installed in any scope", unit);
            Err(Error::NotInstalled(name.to_string()))
        }
    }

    fn start(&self, name: &str, scope: ServiceScope) -> Result<()> {
        self.systemctl(scope, &["start", &unit_name(name)]).map(|_| ())
    }

    fn stop(&self, name: &str, scope: ServiceScope) -> Result<()> {
        self.systemctl(scope, &["stop", &unit_name(name)]).map(|_| ())
    }

    fn is_running(&self, name: &str, scope: ServiceScope) -> bool {
        self.systemctl_ok(scope, &["is-active", "--quiet", &unit_name(name)])
    }

    fn is_auto_start_enabled(&self, name: &str, scope: ServiceScope) -> bool {
        self.systemctl_ok(scope, &["is-enabled", "--quiet", &unit_name(name)])
    }

    fn set_auto_start(&self, name: &str, enabled: bool, scope: ServiceScope) -> Result<()> {
        let verb = if enabled { "enable" } else { "disable" };
        self.systemctl(scope, &[verb, &unit_name(name)]).map(|_| ())
    }
}
