use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::model::ServiceScope;

/// frpdeck - run and supervise the frp client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// Settings file (defaults to ~/.frpdeck.json)
    #[arg(long, env = "FRPDECK_SETTINGS", global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run frpc in the foreground and stream its output
    Run {
        /// frpc config file
        #[arg(short, long, env = "FRPC_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Check a config file with `frpc verify`
    Verify {
        #[arg(short, long, env = "FRPC_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Manage frpc as a background service
    Service {
        /// Override the scope from the settings file
        #[arg(long, value_enum)]
        scope: Option<ScopeArg>,

        #[command(subcommand)]
        action: ServiceAction,
    },
    /// Run frpc with docker compose
    Docker {
        #[command(subcommand)]
        action: DockerAction,
    },
    /// Report where frpc, docker and package managers were found
    Doctor {
        /// Install frp with the first package manager found if frpc is missing
        #[arg(long)]
        install: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ServiceAction {
    Install {
        #[arg(short, long, env = "FRPC_CONFIG")]
        config: Option<PathBuf>,
    },
    Uninstall,
    Start,
    Stop,
    Status,
    /// Turn start-at-boot/login on or off
    Autostart {
        #[arg(value_enum)]
        state: Toggle,
    },
}

#[derive(Subcommand, Debug)]
pub enum DockerAction {
    Up {
        #[arg(short, long, env = "FRPC_CONFIG")]
        config: Option<PathBuf>,
    },
    Down,
    Status,
}

#[derive(ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScopeArg {
    User,
    System,
}

impl From<ScopeArg> for ServiceScope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::User => ServiceScope::User,
            ScopeArg::System => ServiceScope::System,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum Toggle {
    On,
    Off,
}

impl From<Toggle> for bool {
    fn from(toggle: Toggle) -> Self {
        toggle == Toggle::On
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_service_autostart() {
        let args = CommandArgs::try_parse_from([
            "frpdeck", "service", "--scope", "system", "autostart", "off",
        ])
        .unwrap();
        match args.command {
            Commands::Service { scope, action } => {
                assert_eq!(scope, Some(ScopeArg::System));
                assert!(matches!(action, ServiceAction::Autostart { state: Toggle::Off }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_run_with_config_and_settings() {
        let args = CommandArgs::try_parse_from([
            "frpdeck",
            "run",
            "-c",
            "/etc/frp/frpc.toml",
            "--settings",
            "/tmp/s.json",
        ])
        .unwrap();
        assert_eq!(args.settings, Some(PathBuf::from("/tmp/s.json")));
        assert!(matches!(
            args.command,
            Commands::Run { config: Some(ref c) } if c == &PathBuf::from("/etc/frp/frpc.toml")
        ));
    }

    #[test]
    fn doctor_install_flag() {
        let args = CommandArgs::try_parse_from(["frpdeck", "doctor", "--install"]).unwrap();
        assert!(matches!(args.command, Commands::Doctor { install: true }));
    }

    #[test]
    fn rejects_unknown_scope() {
        assert!(
            CommandArgs::try_parse_from(["frpdeck", "service", "--scope", "root", "status"])
                .is_err()
        );
    }
}
