//! Package-manager detection for installing frpc
//!
//! Checks which of the common package managers are on PATH and knows the
//! command each one needs to install frp.

use crate::model::Feedback;
use crate::service::runner::CommandRunner;
use crate::utils::command_exists;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PackageManager {
    Homebrew,
    Apt,
    Dnf,
    Pacman,
    Winget,
    Scoop,
    Chocolatey,
}

impl PackageManager {
    pub const ALL: [PackageManager; 7] = [
        PackageManager::Homebrew,
        PackageManager::Apt,
        PackageManager::Dnf,
        PackageManager::Pacman,
        PackageManager::Winget,
        PackageManager::Scoop,
        PackageManager::Chocolatey,
    ];

    pub fn command(&self) -> &'static str {
        match self {
            PackageManager::Homebrew => "brew",
            PackageManager::Apt => "apt-get",
            PackageManager::Dnf => "dnf",
            PackageManager::Pacman => "pacman",
            PackageManager::Winget => "winget",
            PackageManager::Scoop => "scoop",
            PackageManager::Chocolatey => "choco",
        }
    }

    pub fn install_args(&self) -> &'static [&'static str] {
        match self {
            PackageManager::Homebrew => &["install", "frpc"],
            PackageManager::Apt => &["install", "-y", "frp"],
            PackageManager::Dnf => &["install", "-y", "frp"],
            PackageManager::Pacman => &["-S", "--noconfirm", "frp"],
            PackageManager::Winget => &["install", "--exact", "--id", "fatedier.frp"],
            PackageManager::Scoop => &["install", "frp"],
            PackageManager::Chocolatey => &["install", "frp", "-y"],
        }
    }

    /// System package managers that write outside the user's home.
    pub fn needs_elevation(&self) -> bool {
        matches!(
            self,
            PackageManager::Apt
                | PackageManager::Dnf
                | PackageManager::Pacman
                | PackageManager::Chocolatey
        )
    }

    /// Human-readable command line, e.g. for a "run this yourself" hint.
    pub fn install_command_line(&self) -> String {
        let prefix = if self.needs_elevation() && !cfg!(target_os = "windows") {
            "sudo "
        } else {
            ""
        };
        format!("{}{} {}", prefix, self.command(), self.install_args().join(" "))
    }
}

/// Package managers available on PATH, in preference order.
pub fn detect_package_managers() -> Vec<PackageManager> {
    detect_with(command_exists)
}

pub fn detect_with<F: Fn(&str) -> bool>(exists: F) -> Vec<PackageManager> {
    PackageManager::ALL
        .into_iter()
        .filter(|pm| {
            let found = exists(pm.command());
            log::debug!("Package manager {}: {}", pm.command(), found);
            found
        })
        .collect()
}

pub fn run_install(runner: &dyn CommandRunner, pm: PackageManager) -> Feedback {
    match runner.run(pm.command(), pm.install_args()) {
        Ok(out) if out.success() => Feedback::info(format!("Installed frp with {}.", pm.command())),
        Ok(out) => {
            let output = if out.stderr.trim().is_empty() {
                out.stdout
            } else {
                out.stderr
            };
            let lc = output.to_lowercase();
            if pm.needs_elevation()
                && (lc.contains("permission denied") || lc.contains("are you root"))
            {
                Feedback::error(format!(
                    "{} needs elevated rights. Run: {}",
                    pm.command(),
                    pm.install_command_line()
                ))
            } else {
                Feedback::error(format!(
                    "Failed to install frp with {}: {}",
                    pm.command(),
                    output.trim()
                ))
            }
        }
        Err(err) => Feedback::error(format!("{} error: {}", pm.command(), err)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::model::FeedbackSeverity;
    use crate::service::runner::fake::{FakeRunner, fail, ok};

    #[test]
    fn detection_keeps_preference_order() {
        let present: HashSet<&str> = ["scoop", "brew", "apt-get"].into_iter().collect();
        assert_eq!(
            detect_with(|cmd| present.contains(cmd)),
            vec![
                PackageManager::Homebrew,
                PackageManager::Apt,
                PackageManager::Scoop
            ]
        );
        assert!(detect_with(|_| false).is_empty());
    }

    #[test]
    fn command_lines() {
        assert_eq!(
            PackageManager::Homebrew.install_command_line(),
            "brew install frpc"
        );
        #[cfg(not(target_os = "windows"))]
        assert_eq!(
            PackageManager::Apt.install_command_line(),
            "sudo apt-get install -y frp"
        );
        assert!(!PackageManager::Scoop.needs_elevation());
    }

    #[test]
    fn install_feedback() {
        let runner = FakeRunner::new()
            .respond("brew", |_| ok("==> Pouring frpc"))
            .respond("apt-get", |_| {
                fail(100, "E: Could not open lock file - open (13: Permission denied)")
            })
            .respond("scoop", |_| fail(1, "Couldn't find manifest for 'frp'"));

        assert_eq!(
            run_install(&runner, PackageManager::Homebrew).severity,
            FeedbackSeverity::Info
        );
        let apt = run_install(&runner, PackageManager::Apt);
        assert_eq!(apt.severity, FeedbackSeverity::Error);
        assert!(apt.message.contains("elevated rights"));
        assert!(
            run_install(&runner, PackageManager::Scoop)
                .message
                .contains("Couldn't find manifest")
        );
        assert!(runner.called_with(&["apt-get", "install", "-y", "frp"]));
    }
}
