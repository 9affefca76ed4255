use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::DockerSettings;
use crate::error::Result;
use crate::model::Feedback;
use crate::service::runner::CommandRunner;

pub const COMPOSE_FILE: &str = "docker-compose.yml";
/// Where the config is mounted inside the container.
const CONTAINER_CONFIG_PATH: &str = "/etc/frp/frpc.toml";

/// Find docker executable in common locations
pub fn find_docker_command() -> &'static str {
    const DOCKER_PATHS: &[&str] = &[
        "/opt/homebrew/bin/docker", // Apple Silicon
        "/usr/local/bin/docker",    // Intel Mac
        "/usr/bin/docker",          // Linux packages
    ];

    for path in DOCKER_PATHS {
        if Path::new(path).exists() {
            return path;
        }
    }
    "docker" // Fallback to PATH
}

/// Single-quoted YAML scalar.
fn yaml_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

pub fn render_compose(settings: &DockerSettings, config_path: &Path) -> String {
    let volume = format!(
        "{}:{}:ro",
        config_path.to_string_lossy(),
        CONTAINER_CONFIG_PATH
    );
    format!(
        "services:\n\
         \x20 frpc:\n\
         \x20   image: {image}\n\
         \x20   container_name: {name}\n\
         \x20   restart: unless-stopped\n\
         \x20   network_mode: host\n\
         \x20   volumes:\n\
         \x20     - {volume}\n\
         \x20   command: [\"-c\", \"{target}\"]\n",
        image = yaml_quote(&settings.image),
        name = yaml_quote(&settings.container_name),
        volume = yaml_quote(&volume),
        target = CONTAINER_CONFIG_PATH,
    )
}

/// Write docker-compose.yml into `dir`, creating it if needed.
pub fn write_compose(dir: &Path, settings: &DockerSettings, config_path: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(COMPOSE_FILE);
    fs::write(&path, render_compose(settings, config_path))?;
    info!("Wrote {}", path.display());
    Ok(path)
}

fn run_compose(runner: &dyn CommandRunner, compose_file: &Path, verb: &[&str]) -> Feedback {
    let file = compose_file.to_string_lossy();
    let mut args = vec!["compose", "-f", &*file];
    args.extend_from_slice(verb);

    match runner.run(find_docker_command(), &args) {
        Ok(out) if out.success() => {
            Feedback::info(format!("docker compose {} finished.", verb.join(" ")))
        }
        Ok(out) => Feedback::error(format!(
            "docker compose {} failed: {}",
            verb.join(" "),
            out.stderr.trim()
        )),
        Err(err) => Feedback::error(format!("docker error (is docker installed?): {}", err)),
    }
}

pub fn run_compose_up(runner: &dyn CommandRunner, compose_file: &Path) -> Feedback {
    run_compose(runner, compose_file, &["up", "-d"])
}

pub fn run_compose_down(runner: &dyn CommandRunner, compose_file: &Path) -> Feedback {
    run_compose(runner, compose_file, &["down"])
}

/// Status column of `docker ps` for `container`, or `None` if it does not exist.
pub fn query_container_status(runner: &dyn CommandRunner, container: &str) -> Option<String> {
    let out = runner.run(
        find_docker_command(),
        &["ps", "-a", "--format", "{{.Names}}\t{{.Status}}"],
    );
    let out = match out {
        Ok(o) => o,
        Err(err) => {
            warn!("Docker command failed (docker not installed?): {}", err);
            return None;
        }
    };
    if !out.success() {
        warn!("Docker ps command failed: {}", out.stderr.trim());
        return None;
    }
    parse_container_status(&out.stdout, container)
}

fn parse_container_status(stdout: &str, container: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        let (name, status) = line.split_once('\t')?;
        (name.trim() == container).then(|| status.trim().to_string())
    })
}
