use anyhow::{bail, Result};
use std::{
    env,
    os::unix::net::UnixStream,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::OnceLock,
    thread,
    time::Duration,
};

const SOCKET_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Ensure a container runtime socket is available for testcontainers.
///
/// testcontainers talks to the Docker API; we prefer Podman and point
/// `DOCKER_HOST` at the Podman socket when available.
///
/// # Errors
/// Returns an error if no Docker/Podman socket can be found or configured.
pub fn ensure_container_runtime() -> Result<()> {
    static INIT: OnceLock<Result<(), String>> = OnceLock::new();
    match INIT.get_or_init(init_container_runtime) {
        Ok(()) => Ok(()),
        Err(message) => bail!("{message}"),
    }
}

fn init_container_runtime() -> Result<(), String> {
    if let Ok(docker_host) = env::var("DOCKER_HOST") {
        return validate_docker_host(&docker_host);
    }

    let docker_socket = Path::new("/var/run/docker.sock");
    if wait_for_socket(docker_socket, SOCKET_WAIT_TIMEOUT) {
        return Ok(());
    }

    if let Some(path) = find_podman_socket() {
        if wait_for_socket(&path, SOCKET_WAIT_TIMEOUT) {
            set_docker_host(&path);
            return Ok(());
        }
        return Err(format!(
            "Podman socket found at `{}`, but it is not accepting connections. Start `podman.socket` or run `podman system service`.",
            path.display()
        ));
    }

    match start_podman_service() {
        Ok(Some(path)) => {
            if wait_for_socket(&path, SOCKET_WAIT_TIMEOUT) {
                set_docker_host(&path);
                return Ok(());
            }
            Err("podman system service did not become ready".to_string())
        }
        Ok(None) => Err(
            "No container runtime socket found or reachable. Start the Docker daemon, start `podman.socket`, or set `DOCKER_HOST` (for example: unix:///run/user/<uid>/podman/podman.sock)."
                .to_string(),
        ),
        Err(err) => Err(format!(
            "Podman service failed to start: {err}. Start `podman.socket`, run `podman system service`, or set `DOCKER_HOST`."
        )),
    }
}

fn find_podman_socket() -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(runtime_dir) = env::var("XDG_RUNTIME_DIR") {
        candidates.push(PathBuf::from(runtime_dir).join("podman/podman.sock"));
    }
    if let Some(uid) = read_uid() {
        candidates.push(PathBuf::from(format!("/run/user/{uid}/podman/podman.sock")));
    }
    candidates.push(PathBuf::from("/var/run/podman/podman.sock"));
    candidates.push(PathBuf::from("/run/podman/podman.sock"));

    candidates.into_iter().find(|path| path.exists())
}

fn validate_docker_host(docker_host: &str) -> Result<(), String> {
    let path = docker_host
        .strip_prefix("unix://")
        .or_else(|| docker_host.starts_with('/').then_some(docker_host));
    match path {
        Some(path) if wait_for_socket(Path::new(path), SOCKET_WAIT_TIMEOUT) => Ok(()),
        Some(_) => Err(format!(
            "`DOCKER_HOST` points to `{docker_host}`, but the socket is not accepting connections. Start `podman.socket` or the Docker daemon."
        )),
        // Non-socket transports (tcp://) are left to testcontainers.
        None => Ok(()),
    }
}

fn socket_connectable(path: &Path) -> bool {
    path.exists() && UnixStream::connect(path).is_ok()
}

fn wait_for_socket(path: &Path, timeout: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if socket_connectable(path) {
            return true;
        }
        thread::sleep(Duration::from_millis(200));
    }
    false
}

fn set_docker_host(path: &Path) {
    env::set_var("DOCKER_HOST", format!("unix://{}", path.display()));
}

fn start_podman_service() -> Result<Option<PathBuf>, String> {
    let socket_path = env::temp_dir().join(format!("gatehouse-podman-{}.sock", std::process::id()));
    if socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
    }

    let socket_arg = format!("unix://{}", socket_path.display());
    let mut child = match Command::new("podman")
        .args(["system", "service", "--time=300", &socket_arg])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(format!("Failed to start podman system service: {err}"));
        }
    };

    for _ in 0..20 {
        if socket_connectable(&socket_path) {
            thread::spawn(move || {
                let _ = child.wait();
            });
            return Ok(Some(socket_path));
        }
        match child.try_wait() {
            Ok(Some(status)) => {
                return Err(format!("podman system service exited with {status}"));
            }
            Ok(None) => {}
            Err(err) => {
                return Err(format!(
                    "Failed to check podman system service status: {err}"
                ));
            }
        }
        thread::sleep(Duration::from_millis(200));
    }

    let _ = child.kill();
    let _ = child.wait();
    Err("podman system service did not become ready".to_string())
}

fn read_uid() -> Option<u32> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("Uid:") {
            let uid = rest.split_whitespace().next()?;
            return uid.parse::<u32>().ok();
        }
    }
    None
}
