use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use crossbeam_channel::{Receiver, Sender, select};
use log::info;

use crate::cli::{CommandArgs, Commands, DockerAction, ServiceAction};
use crate::config::{
    Settings, load_and_validate_settings, load_settings_from, save_settings, save_settings_to,
};
use crate::integrations::docker::{
    COMPOSE_FILE, query_container_status, run_compose_down, run_compose_up, write_compose,
};
use crate::integrations::packages::{detect_package_managers, run_install};
use crate::model::*;
use crate::platform::current::interrupt::spawn_interrupt_listener;
use crate::service::{self, ServiceManager, SystemRunner};
use crate::supervisor::Supervisor;
use crate::utils::{command_exists, locate_frpc};
use crate::verify::verify_config;

const EXIT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Load settings from `path`, or from the default location (creating it).
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => {
            let settings = load_settings_from(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            settings.validate().context("invalid settings")?;
            Ok(settings)
        }
        None => load_and_validate_settings().context("failed to load settings"),
    }
}

pub fn run(args: CommandArgs, settings: Settings) -> Result<()> {
    match args.command {
        Commands::Run { config } => {
            let config = resolve_config(config, &settings)?;
            run_foreground(&settings, &config)
        }
        Commands::Verify { config } => {
            let config = resolve_config(config, &settings)?;
            let binary = locate_frpc(settings.frpc.binary_path.as_deref())?;
            let message = verify_config(&SystemRunner, &binary, &config)
                .with_context(|| format!("{} did not verify", config.display()))?;
            report(&Feedback::info(message))
        }
        Commands::Service { scope, action } => {
            let scope = scope.map(ServiceScope::from).unwrap_or(settings.service.scope);
            let manager = service::for_current_platform();
            run_service(manager.as_ref(), settings, args.settings.as_deref(), scope, action)
        }
        Commands::Docker { action } => run_docker(&settings, action),
        Commands::Doctor { install } => doctor(&settings, install),
    }
}

/// The config path from the command line, else from settings; made absolute
/// since services and containers do not share our working directory.
fn resolve_config(arg: Option<PathBuf>, settings: &Settings) -> Result<PathBuf> {
    let path = arg
        .or_else(|| settings.frpc.config_path.clone())
        .ok_or_else(|| anyhow!("no frpc config given; pass --config or set frpc.config_path"))?;
    if !path.is_file() {
        bail!("frpc config file not found: {}", path.display());
    }
    path.canonicalize()
        .with_context(|| format!("failed to resolve {}", path.display()))
}

fn report(feedback: &Feedback) -> Result<()> {
    match feedback.severity {
        FeedbackSeverity::Info => {
            println!("{}", feedback.message);
            Ok(())
        }
        FeedbackSeverity::Warning => {
            eprintln!("warning: {}", feedback.message);
            Ok(())
        }
        FeedbackSeverity::Error => Err(anyhow!(feedback.message.clone())),
    }
}

fn run_foreground(settings: &Settings, config: &Path) -> Result<()> {
    // Before any other thread exists, see spawn_interrupt_listener
    let (interrupt_tx, interrupt_rx) = crossbeam_channel::bounded(1);
    spawn_interrupt_listener(interrupt_tx).context("failed to install Ctrl-C handler")?;

    let (console_tx, console_rx) = crossbeam_channel::unbounded();
    let _console = spawn_console_reader(console_tx);

    let (supervisor, events) = Supervisor::new(settings.frpc.binary_path.clone());
    supervisor
        .start(config)
        .with_context(|| format!("failed to start frpc with {}", config.display()))?;
    println!("frpc is running. Commands: r = restart, s = status, q = quit");

    let outcome = supervise(&supervisor, config, &events, console_rx, interrupt_rx);
    supervisor.stop().context("failed to stop frpc")?;
    outcome
}

/// Event loop of a foreground session; returns when asked to quit or when
/// frpc exits on its own.
fn supervise(
    supervisor: &Supervisor,
    config: &Path,
    events: &Receiver<SupervisorEvent>,
    mut console: Receiver<ConsoleCommand>,
    mut interrupt: Receiver<()>,
) -> Result<()> {
    let ticker = crossbeam_channel::tick(EXIT_POLL_INTERVAL);
    loop {
        select! {
            recv(events) -> event => {
                let Ok(event) = event else { return Ok(()) };
                log_event(&event);
                // A restart also reports Exited, but leaves a new child behind
                if let SupervisorEvent::Exited { exit_code, .. } = event
                    && !supervisor.is_running()
                {
                    bail!("frpc exited with code {:?}", exit_code);
                }
            },
            recv(console) -> command => match command {
                Ok(ConsoleCommand::Quit) => return Ok(()),
                Ok(ConsoleCommand::Restart) => {
                    supervisor.restart(config).context("restart failed")?;
                }
                Ok(ConsoleCommand::Status) => match supervisor.poll() {
                    Some(handle) if !handle.has_exited => {
                        println!("{} running as PID {}", handle.process_name, handle.pid)
                    }
                    _ => println!("frpc is not running"),
                },
                // stdin closed, keep supervising
                Err(_) => console = crossbeam_channel::never(),
            },
            recv(interrupt) -> signal => match signal {
                Ok(()) => return Ok(()),
                Err(_) => interrupt = crossbeam_channel::never(),
            },
            recv(ticker) -> _ => {
                // Exit events are raised by the poll itself
                supervisor.poll();
            }
        }
    }
}

/// Output lines already went through the logger; only state changes are logged here.
fn log_event(event: &SupervisorEvent) {
    match event {
        SupervisorEvent::StateChanged { running: true, pid } => {
            info!("frpc started (PID {})", pid.unwrap_or_default())
        }
        SupervisorEvent::StateChanged { running: false, .. } => info!("frpc stopped"),
        SupervisorEvent::Exited { pid, exit_code } => {
            info!("frpc (PID {}) exited with {:?}", pid, exit_code)
        }
        SupervisorEvent::Output(_) => {}
    }
}

fn spawn_console_reader(tx: Sender<ConsoleCommand>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let command = match line.trim() {
                "q" | "quit" => ConsoleCommand::Quit,
                "r" | "restart" => ConsoleCommand::Restart,
                "s" | "status" => ConsoleCommand::Status,
                "" => continue,
                other => {
                    eprintln!("unknown command `{}` (r, s or q)", other);
                    continue;
                }
            };
            if tx.send(command).is_err() {
                break;
            }
        }
    })
}

fn run_service(
    manager: &dyn ServiceManager,
    mut settings: Settings,
    settings_path: Option<&Path>,
    scope: ServiceScope,
    action: ServiceAction,
) -> Result<()> {
    let name = settings.service.name.clone();
    match action {
        ServiceAction::Install { config } => {
            let config_path = resolve_config(config, &settings)?;
            let binary_path = locate_frpc(settings.frpc.binary_path.as_deref())?;
            let service_config = ServiceConfig {
                service_name: name.clone(),
                binary_path,
                config_path,
                scope,
                auto_start: settings.service.auto_start,
                description: settings.service.description.clone(),
            };
            manager
                .install(&service_config)
                .with_context(|| format!("failed to install {}", name))?;
            report(&Feedback::info(format!(
                "Installed {} with {} ({} scope).",
                name,
                manager.manager_name(),
                scope
            )))
        }
        ServiceAction::Uninstall => {
            manager
                .uninstall(&name)
                .with_context(|| format!("failed to uninstall {}", name))?;
            report(&Feedback::info(format!("Uninstalled {}.", name)))
        }
        ServiceAction::Start => {
            manager
                .start(&name, scope)
                .with_context(|| format!("failed to start {}", name))?;
            report(&Feedback::info(format!("Started {}.", name)))
        }
        ServiceAction::Stop => {
            manager
                .stop(&name, scope)
                .with_context(|| format!("failed to stop {}", name))?;
            report(&Feedback::info(format!("Stopped {}.", name)))
        }
        ServiceAction::Status => {
            let status = manager.status(&name, scope);
            println!("{}: {}", name, status.state);
            if status.is_installed {
                println!(
                    "  autostart: {}",
                    if status.is_auto_start_enabled { "on" } else { "off" }
                );
            }
            if let Some(message) = status.message {
                println!("  {}", message);
            }
            Ok(())
        }
        ServiceAction::Autostart { state } => {
            let enabled = bool::from(state);
            manager
                .set_auto_start(&name, enabled, scope)
                .with_context(|| format!("failed to change autostart of {}", name))?;
            settings.service.auto_start = enabled;
            match settings_path {
                Some(path) => save_settings_to(&settings, path)?,
                None => save_settings(&settings)?,
            }
            report(&Feedback::info(format!(
                "Autostart of {} is now {}.",
                name,
                if enabled { "on" } else { "off" }
            )))
        }
    }
}

fn run_docker(settings: &Settings, action: DockerAction) -> Result<()> {
    let compose_dir = settings.compose_dir();
    match action {
        DockerAction::Up { config } => {
            let config_path = resolve_config(config, settings)?;
            let compose_file = write_compose(&compose_dir, &settings.docker, &config_path)
                .context("failed to write compose file")?;
            report(&run_compose_up(&SystemRunner, &compose_file))
        }
        DockerAction::Down => {
            let compose_file = compose_dir.join(COMPOSE_FILE);
            if !compose_file.is_file() {
                bail!("no compose file at {}", compose_file.display());
            }
            report(&run_compose_down(&SystemRunner, &compose_file))
        }
        DockerAction::Status => {
            let container = &settings.docker.container_name;
            match query_container_status(&SystemRunner, container) {
                Some(status) => println!("{}: {}", container, status),
                None => println!("{}: not found", container),
            }
            Ok(())
        }
    }
}

fn doctor(settings: &Settings, install: bool) -> Result<()> {
    match locate_frpc(settings.frpc.binary_path.as_deref()) {
        Ok(path) => println!("frpc: {}", path.display()),
        Err(e) => {
            println!("frpc: {}", e);
            let managers = detect_package_managers();
            if managers.is_empty() {
                println!("  no supported package manager found");
            }
            for pm in &managers {
                println!("  install with: {}", pm.install_command_line());
            }
            if install && let Some(pm) = managers.first() {
                report(&run_install(&SystemRunner, *pm))?;
            }
        }
    }

    println!(
        "docker: {}",
        if command_exists("docker") { "available" } else { "not found" }
    );

    let manager = service::for_current_platform();
    let status = manager.status(&settings.service.name, settings.service.scope);
    println!(
        "service ({}): {} {}",
        manager.manager_name(),
        settings.service.name,
        status.state
    );
    Ok(())
}
