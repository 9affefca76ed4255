//! launchd jobs for macOS: LaunchAgents (user) or LaunchDaemons (system)
//!
//! Jobs carry `KeepAlive`, so a loaded job is a running job. Autostart is the
//! plist's `Disabled` key: launchd skips disabled jobs at boot/login, and
//! `start` force-loads past it with `launchctl load -F`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info, warn};

use crate::error::{Error, Result};
use crate::model::{ServiceConfig, ServiceScope};
use crate::service::ServiceManager;
use crate::service::runner::{CommandRunner, SystemRunner, run_checked, try_run};

const SYSTEM_DAEMON_DIR: &str = "/Library/LaunchDaemons";
const LOG_DIR: &str = "/tmp";
const RUN_AT_LOAD: &str = "RunAtLoad";
const DISABLED: &str = "Disabled";

pub struct Launchd {
    runner: Arc<dyn CommandRunner>,
    user_dir: PathBuf,
    system_dir: PathBuf,
    log_dir: PathBuf,
}

impl Default for Launchd {
    fn default() -> Self {
        Self::new()
    }
}

impl Launchd {
    pub fn new() -> Self {
        let user_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Library")
            .join("LaunchAgents");
        Self::with_paths(
            Arc::new(SystemRunner),
            user_dir,
            PathBuf::from(SYSTEM_DAEMON_DIR),
            PathBuf::from(LOG_DIR),
        )
    }

    pub fn with_paths(
        runner: Arc<dyn CommandRunner>,
        user_dir: PathBuf,
        system_dir: PathBuf,
        log_dir: PathBuf,
    ) -> Self {
        Self {
            runner,
            user_dir,
            system_dir,
            log_dir,
        }
    }

    pub fn plist_path(&self, label: &str, scope: ServiceScope) -> PathBuf {
        let dir = match scope {
            ServiceScope::User => &self.user_dir,
            ServiceScope::System => &self.system_dir,
        };
        dir.join(format!("{}.plist", label))
    }

    fn launchctl(&self, args: &[&str]) -> Result<()> {
        run_checked(self.runner.as_ref(), "launchctl", args).map(|_| ())
    }

    /// Whether launchd currently has the job loaded.
    fn is_loaded(&self, label: &str) -> bool {
        try_run(self.runner.as_ref(), "launchctl", &["list", label]).is_some_and(|out| out.success())
    }

    fn installed_plist(&self, label: &str, scope: ServiceScope) -> Result<PathBuf> {
        let path = self.plist_path(label, scope);
        if path.is_file() {
            Ok(path)
        } else {
            warn!("No launchd plist at {}", path.display());
            Err(Error::NotInstalled(label.to_string()))
        }
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

pub fn render_plist(config: &ServiceConfig, log_dir: &Path) -> String {
    let label = xml_escape(&config.service_name);
    let stdout_log = log_dir.join(format!("{}.out.log", config.service_name));
    let stderr_log = log_dir.join(format!("{}.err.log", config.service_name));
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{label}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{binary}</string>
        <string>-c</string>
        <string>{config}</string>
    </array>
    <key>RunAtLoad</key>
    {run_at_load}
    <key>Disabled</key>
    {disabled}
    <key>KeepAlive</key>
    <true/>
    <key>StandardOutPath</key>
    <string>{stdout_log}</string>
    <key>StandardErrorPath</key>
    <string>{stderr_log}</string>
</dict>
</plist>
"#,
        label = label,
        binary = xml_escape(&config.binary_path.to_string_lossy()),
        config = xml_escape(&config.config_path.to_string_lossy()),
        run_at_load = bool_tag(config.auto_start),
        disabled = bool_tag(!config.auto_start),
        stdout_log = xml_escape(&stdout_log.to_string_lossy()),
        stderr_log = xml_escape(&stderr_log.to_string_lossy()),
    )
}

fn bool_tag(value: bool) -> &'static str {
    if value { "<true/>" } else { "<false/>" }
}

/// Byte range and value of the boolean that follows `<key>{key}</key>`.
fn find_bool(plist: &str, key: &str) -> Option<(usize, usize, bool)> {
    let tag = format!("<key>{}</key>", key);
    let key_end = plist.find(&tag)? + tag.len();
    let rest = &plist[key_end..];
    let start = key_end + (rest.len() - rest.trim_start().len());
    let tail = &plist[start..];
    if tail.starts_with("<true/>") {
        Some((start, start + "<true/>".len(), true))
    } else if tail.starts_with("<false/>") {
        Some((start, start + "<false/>".len(), false))
    } else {
        None
    }
}

pub fn read_plist_bool(plist: &str, key: &str) -> Option<bool> {
    find_bool(plist, key).map(|(_, _, value)| value)
}

/// Rewrite a boolean value, or `None` if the plist has no such key.
pub fn with_plist_bool(plist: &str, key: &str, value: bool) -> Option<String> {
    let (start, end, _) = find_bool(plist, key)?;
    let mut out = String::with_capacity(plist.len());
    out.push_str(&plist[..start]);
    out.push_str(bool_tag(value));
    out.push_str(&plist[end..]);
    Some(out)
}

/// Autostart as recorded in the plist; plists without `Disabled` fall back
/// to `RunAtLoad`.
fn auto_start_of(plist: &str) -> bool {
    match read_plist_bool(plist, DISABLED) {
        Some(disabled) => !disabled,
        None => read_plist_bool(plist, RUN_AT_LOAD).unwrap_or(false),
    }
}

impl ServiceManager for Launchd {
    fn manager_name(&self) -> &'static str {
        "launchd"
    }

    fn is_installed(&self, label: &str) -> bool {
        ServiceScope::ALL
            .iter()
            .any(|scope| self.plist_path(label, *scope).is_file())
    }

    fn install(&self, config: &ServiceConfig) -> Result<()> {
        let path = self.plist_path(&config.service_name, config.scope);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).inspect_err(|e| {
                error!("Failed to create {}: {}", dir.display(), e);
            })?;
        }
        fs::write(&path, render_plist(config, &self.log_dir)).inspect_err(|e| {
            error!("Failed to write {}: {}", path.display(), e);
        })?;
        info!("Wrote launchd plist {}", path.display());

        if config.auto_start {
            let path_str = path.to_string_lossy();
            if let Err(e) = self.launchctl(&["load", &path_str]) {
                if let Err(rm) = fs::remove_file(&path) {
                    warn!("Could not remove {} after failed load: {}", path.display(), rm);
                }
                return Err(e);
            }
        } else {
            info!("{} stays unloaded until started", config.service_name);
        }
        info!(
            "Installed {} ({} scope)",
            config.service_name, config.scope
        );
        Ok(())
    }

    fn uninstall(&self, label: &str) -> Result<()> {
        let mut found = false;
        for scope in ServiceScope::ALL {
            let path = self.plist_path(label, scope);
            if !path.exists() {
                continue;
            }
            found = true;

            if self.is_loaded(label) {
                let path_str = path.to_string_lossy();
                if let Err(e) = self.launchctl(&["unload", &path_str]) {
                    warn!("Ignoring failed unload of {} during uninstall: {}", label, e);
                }
            }
            fs::remove_file(&path).inspect_err(|e| {
                error!("Failed to remove {}: {}", path.display(), e);
            })?;
            info!("Uninstalled {} ({} scope)", label, scope);
        }

        if found {
            Ok(())
        } else {
            warn!("{} is not installed in any scope", label);
            Err(Error::NotInstalled(label.to_string()))
        }
    }

    fn start(&self, label: &str, scope: ServiceScope) -> Result<()> {
        let path = self.installed_plist(label, scope)?;
        if !self.is_loaded(label) {
            let path_str = path.to_string_lossy();
            self.launchctl(&["load", "-F", &path_str])?;
        }
        self.launchctl(&["start", label])
    }

    /// Unloads the job; a plain `launchctl stop` would be undone by KeepAlive.
    fn stop(&self, label: &str, scope: ServiceScope) -> Result<()> {
        let path = self.installed_plist(label, scope)?;
        if !self.is_loaded(label) {
            warn!("{} is not loaded, nothing to stop", label);
            return Ok(());
        }
        let path_str = path.to_string_lossy();
        self.launchctl(&["unload", &path_str])
    }

    fn is_running(&self, label: &str, _scope: ServiceScope) -> bool {
        try_run(self.runner.as_ref(), "launchctl", &["list", label])
            .is_some_and(|out| out.success() && out.stdout.contains("\"PID\" = "))
    }

    fn is_auto_start_enabled(&self, label: &str, scope: ServiceScope) -> bool {
        let path = self.plist_path(label, scope);
        fs::read_to_string(&path)
            .map(|plist| auto_start_of(&plist))
            .unwrap_or(false)
    }

    /// Only the plist changes; a loaded job keeps running, a stopped one stays stopped.
    fn set_auto_start(&self, label: &str, enabled: bool, scope: ServiceScope) -> Result<()> {
        let path = self.installed_plist(label, scope)?;
        let plist = fs::read_to_string(&path)?;
        let updated = with_plist_bool(&plist, DISABLED, !enabled)
            .and_then(|p| with_plist_bool(&p, RUN_AT_LOAD, enabled));
        let Some(updated) = updated else {
            error!("{} lacks the Disabled or RunAtLoad key", path.display());
            return Err(Error::Settings(format!(
                "{} lacks the Disabled or RunAtLoad key; reinstall the service",
                path.display()
            )));
        };
        fs::write(&path, updated)?;
        info!("Set autostart of {} to {} in {}", label, enabled, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::service::runner::fake::{FakeRunner, fail, ok};

    fn config(auto_start: bool) -> ServiceConfig {
        ServiceConfig {
            service_name: "io.frpdeck.frpc".into(),
            binary_path: PathBuf::from("/opt/homebrew/bin/frpc"),
            config_path: PathBuf::from("/Users/me/frp & co/frpc.toml"),
            scope: ServiceScope::User,
            auto_start,
            description: "frp reverse proxy client".into(),
        }
    }

    /// Fake launchctl keeping track of which job is loaded.
    fn fake_launchctl() -> Arc<FakeRunner> {
        let loaded = Arc::new(Mutex::new(false));
        Arc::new(FakeRunner::new().respond("launchctl", move |args| {
            let mut loaded = loaded.lock().unwrap();
            match args.first().map(String::as_str) {
                Some("load") => *loaded = true,
                Some("unload") => *loaded = false,
                Some("list") if *loaded => {
                    return ok("{\n\t\"PID\" = 4242;\n\t\"Label\" = \"io.frpdeck.frpc\";\n};")
                }
                Some("list") => return fail(113, "Could not find service"),
                _ => {}
            }
            ok("")
        }))
    }

    fn manager(runner: Arc<FakeRunner>, root: &Path) -> Launchd {
        Launchd::with_paths(
            runner,
            root.join("LaunchAgents"),
            root.join("LaunchDaemons"),
            PathBuf::from("/tmp"),
        )
    }

    #[test]
    fn plist_contents() {
        let plist = render_plist(&config(true), Path::new("/tmp"));
        assert!(plist.contains("<key>Label</key>\n    <string>io.frpdeck.frpc</string>"));
        assert!(plist.contains(
            "<string>/opt/homebrew/bin/frpc</string>\n        <string>-c</string>\n        <string>/Users/me/frp &amp; co/frpc.toml</string>"
        ));
        assert!(plist.contains("<key>KeepAlive</key>\n    <true/>"));
        assert!(plist.contains("<string>/tmp/io.frpdeck.frpc.out.log</string>"));
        assert!(plist.contains("<string>/tmp/io.frpdeck.frpc.err.log</string>"));
        assert_eq!(read_plist_bool(&plist, RUN_AT_LOAD), Some(true));
        assert_eq!(read_plist_bool(&plist, DISABLED), Some(false));

        let manual = render_plist(&config(false), Path::new("/tmp"));
        assert_eq!(read_plist_bool(&manual, RUN_AT_LOAD), Some(false));
        assert_eq!(read_plist_bool(&manual, DISABLED), Some(true));
        assert!(!auto_start_of(&manual));
    }

    #[test]
    fn bool_rewrite_touches_only_its_key() {
        let plist = render_plist(&config(true), Path::new("/tmp"));
        let off = with_plist_bool(&plist, DISABLED, true).unwrap();
        assert_eq!(read_plist_bool(&off, DISABLED), Some(true));
        assert_eq!(read_plist_bool(&off, RUN_AT_LOAD), Some(true));
        assert!(off.contains("<key>KeepAlive</key>\n    <true/>"));
        assert_eq!(with_plist_bool(&off, DISABLED, false).unwrap(), plist);
        assert!(with_plist_bool("<dict></dict>", DISABLED, true).is_none());
        // Older plists without Disabled
        assert!(auto_start_of("<key>RunAtLoad</key>\n<true/>"));
    }

    fn load_calls(runner: &FakeRunner) -> usize {
        runner
            .calls()
            .iter()
            .filter(|c| matches!(c.get(1).map(String::as_str), Some("load" | "unload")))
            .count()
    }

    #[test]
    fn install_start_stop_uninstall() {
        let dir = tempfile::tempdir().unwrap();
        let runner = fake_launchctl();
        let launchd = manager(runner.clone(), dir.path());
        let label = "io.frpdeck.frpc";

        launchd.install(&config(true)).unwrap();
        assert!(launchd.is_installed(label));
        assert!(dir.path().join("LaunchAgents/io.frpdeck.frpc.plist").is_file());
        assert!(launchd.is_running(label, ServiceScope::User));
        assert!(launchd.is_auto_start_enabled(label, ServiceScope::User));

        launchd.stop(label, ServiceScope::User).unwrap();
        assert!(!launchd.is_running(label, ServiceScope::User));
        assert_eq!(launchd.status(label, ServiceScope::User).state, "stopped");

        launchd.start(label, ServiceScope::User).unwrap();
        assert!(launchd.is_running(label, ServiceScope::User));
        assert!(runner.called_with(&["load", "-F"]));
        assert!(runner.called_with(&["start", label]));

        launchd.uninstall(label).unwrap();
        assert!(!launchd.is_installed(label));
        assert!(runner.called_with(&["unload"]));
    }

    #[test]
    fn manual_job_is_not_loaded_on_install() {
        let dir = tempfile::tempdir().unwrap();
        let runner = fake_launchctl();
        let launchd = manager(runner.clone(), dir.path());
        let label = "io.frpdeck.frpc";

        launchd.install(&config(false)).unwrap();
        assert!(launchd.is_installed(label));
        assert_eq!(load_calls(&runner), 0);
        assert!(!launchd.is_running(label, ServiceScope::User));
        assert!(!launchd.is_auto_start_enabled(label, ServiceScope::User));

        // A disabled job still starts on request
        launchd.start(label, ServiceScope::User).unwrap();
        assert!(launchd.is_running(label, ServiceScope::User));
    }

    #[test]
    fn auto_start_toggle_leaves_running_state_alone() {
        let dir = tempfile::tempdir().unwrap();
        let runner = fake_launchctl();
        let launchd = manager(runner.clone(), dir.path());
        let label = "io.frpdeck.frpc";

        launchd.install(&config(true)).unwrap();
        let loads_before = load_calls(&runner);

        launchd
            .set_auto_start(label, false, ServiceScope::User)
            .unwrap();
        assert!(!launchd.is_auto_start_enabled(label, ServiceScope::User));
        let plist = fs::read_to_string(launchd.plist_path(label, ServiceScope::User)).unwrap();
        assert_eq!(read_plist_bool(&plist, DISABLED), Some(true));
        assert!(launchd.is_running(label, ServiceScope::User));

        launchd
            .set_auto_start(label, true, ServiceScope::User)
            .unwrap();
        assert!(launchd.is_auto_start_enabled(label, ServiceScope::User));
        assert_eq!(load_calls(&runner), loads_before);
    }

    #[test]
    fn failed_load_leaves_nothing_installed() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(
            FakeRunner::new().respond("launchctl", |_| fail(5, "Load failed: 5: Input/output error")),
        );
        let launchd = manager(runner, dir.path());

        assert!(matches!(
            launchd.install(&config(true)),
            Err(Error::CommandFailed { .. })
        ));
        assert!(!launchd.is_installed("io.frpdeck.frpc"));
    }

    #[test]
    fn operations_on_missing_job() {
        let dir = tempfile::tempdir().unwrap();
        let launchd = manager(fake_launchctl(), dir.path());
        assert!(matches!(
            launchd.start("missing", ServiceScope::User),
            Err(Error::NotInstalled(_))
        ));
        assert!(matches!(
            launchd.set_auto_start("missing", true, ServiceScope::System),
            Err(Error::NotInstalled(_))
        ));
        assert_eq!(
            launchd.status("missing", ServiceScope::User).state,
            "not-installed"
        );
    }
}
