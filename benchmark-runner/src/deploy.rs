use crate::Launcher;
use crate::Profiling;
use rand::thread_rng;
use rand::Rng;
use std::error::Error;
use std::fmt::Display;
use std::fs;
use std::fs::File;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::process::Child;
use tokio::time::sleep;
use tokio::time::timeout;
use tokio::time::Instant;
use tracing::info;
use tracing::warn;

/*

# Local deployment

A deployment is one set of storage servers and metadata servers running on contiguous local ports for the duration of a single scenario. Each server gets its own temporary directory holding its data and its captured standard error.

Servers are spawned with `kill_on_drop` and directories are `TempDir`s, so dropping a `Deployment` on an early return still reclaims both. The explicit `stop_all` + `cleanup` path exists to stop servers gracefully and surface what they printed.

Metadata servers form a single cluster. Client ports start at the base port; peer ports start at the base port plus `PEER_PORT_OFFSET`.

*/

pub const LOCAL_HOST: &str = "127.0.0.1";
pub const PEER_PORT_OFFSET: u16 = 100;
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);
const STDERR_FILE: &str = "stderr.log";

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ShardKind {
  Data,
  Metadata,
}

impl Display for ShardKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ShardKind::Data => write!(f, "storage server"),
      ShardKind::Metadata => write!(f, "metadata server"),
    }
  }
}

#[derive(Debug)]
pub enum DeployError {
  AlreadyActive { kind: ShardKind },
  PortOverflow { base: u16, count: usize },
  Io { path: PathBuf, source: io::Error },
  Spawn { program: String, source: io::Error },
  /// Some servers never accepted connections.
  Timeout { pending: Vec<String>, waited: Duration },
}

impl Display for DeployError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      DeployError::AlreadyActive { kind } => write!(
        f,
        "{kind}s are already deployed; stop and clean up the previous deployment first"
      ),
      DeployError::PortOverflow { base, count } => {
        write!(f, "{count} ports starting at {base} do not fit in the port range")
      }
      DeployError::Io { path, source } => {
        write!(f, "failed to prepare {}: {source}", path.display())
      }
      DeployError::Spawn { program, source } => write!(f, "failed to start {program}: {source}"),
      DeployError::Timeout { pending, waited } => write!(
        f,
        "servers at {} were not listening after {:?}",
        pending.join(", "),
        waited
      ),
    }
  }
}

impl Error for DeployError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    match self {
      DeployError::Io { source, .. } => Some(source),
      DeployError::Spawn { source, .. } => Some(source),
      _ => None,
    }
  }
}

#[derive(Clone, Debug)]
pub struct DeployOptions {
  pub storage_server: Launcher,
  pub metadata_server: Launcher,
  /// Worker count handed to each storage server.
  pub jobs: usize,
  pub stop_grace: Duration,
  pub profiling: Option<Profiling>,
}

impl Default for DeployOptions {
  fn default() -> Self {
    Self {
      storage_server: Launcher::new("zstordb"),
      metadata_server: Launcher::new("etcd"),
      jobs: 0,
      stop_grace: DEFAULT_STOP_GRACE,
      profiling: None,
    }
  }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum StopIssue {
  ExitCode(i32),
  GraceExceeded(Duration),
  Wait(String),
}

/// A server that did not stop cleanly. Never fatal.
#[derive(Clone, Debug)]
pub struct StopWarning {
  pub kind: ShardKind,
  pub index: usize,
  pub address: String,
  pub issue: StopIssue,
  pub stderr: String,
}

struct Server {
  kind: ShardKind,
  index: usize,
  address: String,
  child: Child,
  stderr_path: PathBuf,
}

fn ports(base: u16, count: usize) -> Result<Vec<u16>, DeployError> {
  (0..count)
    .map(|i| u16::try_from(usize::from(base) + i))
    .collect::<Result<Vec<_>, _>>()
    .map_err(|_| DeployError::PortOverflow { base, count })
}

fn local_address(port: u16) -> String {
  format!("{LOCAL_HOST}:{port}")
}

fn create_dir(path: &Path) -> Result<(), DeployError> {
  fs::create_dir_all(path).map_err(|source| DeployError::Io {
    path: path.to_path_buf(),
    source,
  })
}

pub fn storage_server_args(
  index: usize,
  port: u16,
  data_dir: &Path,
  meta_dir: &Path,
  jobs: usize,
  profiling: Option<&Profiling>,
) -> Vec<String> {
  let mut args = vec![
    "--listen".to_string(),
    format!(":{port}"),
    "--data-dir".to_string(),
    data_dir.display().to_string(),
    "--meta-dir".to_string(),
    meta_dir.display().to_string(),
    "--jobs".to_string(),
    jobs.to_string(),
  ];
  if let Some(p) = profiling {
    args.push("--profile-mode".to_string());
    args.push(p.mode.as_str().to_string());
    args.push("--profile-output".to_string());
    args.push(p.dir.join(format!("zstordb{index}")).display().to_string());
  };
  args.push("--no-auth".to_string());
  args
}

pub fn metadata_server_args(
  index: usize,
  client_port: u16,
  peer_port: u16,
  cluster_token: &str,
  initial_cluster: &str,
  data_dir: &Path,
) -> Vec<String> {
  let client_url = format!("http://{LOCAL_HOST}:{client_port}");
  let peer_url = format!("http://{LOCAL_HOST}:{peer_port}");
  vec![
    "--name".to_string(),
    format!("node{index}"),
    "--initial-advertise-peer-urls".to_string(),
    peer_url.clone(),
    "--listen-peer-urls".to_string(),
    peer_url,
    "--listen-client-urls".to_string(),
    client_url.clone(),
    "--advertise-client-urls".to_string(),
    client_url,
    "--initial-cluster-token".to_string(),
    cluster_token.to_string(),
    "--initial-cluster".to_string(),
    initial_cluster.to_string(),
    "--data-dir".to_string(),
    data_dir.display().to_string(),
  ]
}

/// `node0=http://127.0.0.1:<peer0>,node1=...`
pub fn initial_cluster(peer_ports: &[u16]) -> String {
  peer_ports
    .iter()
    .enumerate()
    .map(|(i, port)| format!("node{i}=http://{LOCAL_HOST}:{port}"))
    .collect::<Vec<_>>()
    .join(",")
}

/// Polls until every address accepts a TCP connection. The deadline is wall-clock; a single probe never outlives it.
pub async fn wait_until_ready(addresses: &[String], limit: Duration) -> Result<(), DeployError> {
  let started = Instant::now();
  let deadline = started + limit;
  let mut pending = addresses.to_vec();
  loop {
    let mut still_pending = Vec::new();
    for address in pending {
      let probe = deadline
        .saturating_duration_since(Instant::now())
        .min(READY_POLL_INTERVAL);
      match timeout(probe, TcpStream::connect(address.as_str())).await {
        Ok(Ok(_)) => info!(address = %address, "server is listening"),
        _ => still_pending.push(address),
      };
    }
    pending = still_pending;
    if pending.is_empty() {
      return Ok(());
    };
    if Instant::now() >= deadline {
      return Err(DeployError::Timeout {
        pending,
        waited: started.elapsed(),
      });
    };
    sleep(READY_POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now()))).await;
  }
}

async fn stop_server(server: &mut Server, grace: Duration) -> Option<StopWarning> {
  if let Some(pid) = server.child.id() {
    unsafe {
      libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
  };
  let issue = match timeout(grace, server.child.wait()).await {
    // A server terminated by our signal has no exit code.
    Ok(Ok(status)) => match status.code() {
      Some(code) if code != 0 => Some(StopIssue::ExitCode(code)),
      _ => None,
    },
    Ok(Err(err)) => Some(StopIssue::Wait(err.to_string())),
    Err(_) => {
      let _ = server.child.kill().await;
      Some(StopIssue::GraceExceeded(grace))
    }
  };
  let issue = issue?;
  let stderr = tokio::fs::read(&server.stderr_path)
    .await
    .map(|raw| String::from_utf8_lossy(&raw).trim().to_string())
    .unwrap_or_default();
  Some(StopWarning {
    kind: server.kind,
    index: server.index,
    address: server.address.clone(),
    issue,
    stderr,
  })
}

pub struct Deployment {
  options: DeployOptions,
  servers: Vec<Server>,
  dirs: Vec<TempDir>,
  data_started: bool,
  meta_started: bool,
}

impl Deployment {
  pub fn new(options: DeployOptions) -> Self {
    Self {
      options,
      servers: Vec::new(),
      dirs: Vec::new(),
      data_started: false,
      meta_started: false,
    }
  }

  /// Addresses of all running servers, in start order.
  pub fn addresses(&self) -> Vec<String> {
    self.servers.iter().map(|s| s.address.clone()).collect()
  }

  pub fn directories(&self) -> Vec<PathBuf> {
    self.dirs.iter().map(|d| d.path().to_path_buf()).collect()
  }

  fn server_dir(&mut self, prefix: &str) -> Result<PathBuf, DeployError> {
    let dir = tempfile::Builder::new()
      .prefix(prefix)
      .tempdir()
      .map_err(|source| DeployError::Io {
        path: std::env::temp_dir(),
        source,
      })?;
    let path = dir.path().to_path_buf();
    self.dirs.push(dir);
    Ok(path)
  }

  fn spawn(
    &mut self,
    kind: ShardKind,
    index: usize,
    address: String,
    dir: &Path,
    args: Vec<String>,
  ) -> Result<(), DeployError> {
    let launcher = match kind {
      ShardKind::Data => &self.options.storage_server,
      ShardKind::Metadata => &self.options.metadata_server,
    };
    let stderr_path = dir.join(STDERR_FILE);
    let stderr = File::create(&stderr_path).map_err(|source| DeployError::Io {
      path: stderr_path.clone(),
      source,
    })?;
    let child = launcher
      .command()
      .args(&args)
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::from(stderr))
      .kill_on_drop(true)
      .spawn()
      .map_err(|source| DeployError::Spawn {
        program: launcher.program.clone(),
        source,
      })?;
    info!(%kind, index, address = %address, pid = ?child.id(), "started server");
    self.servers.push(Server {
      kind,
      index,
      address,
      child,
      stderr_path,
    });
    Ok(())
  }

  /// Starts `count` storage servers listening on `base_port + i`. Returns their addresses in shard order.
  pub fn start_data_shards(&mut self, count: usize, base_port: u16) -> Result<Vec<String>, DeployError> {
    if self.data_started {
      return Err(DeployError::AlreadyActive {
        kind: ShardKind::Data,
      });
    };
    let ports = ports(base_port, count)?;
    self.data_started = true;
    if let Some(p) = &self.options.profiling {
      create_dir(&p.dir)?;
    };
    let mut addresses = Vec::with_capacity(count);
    for (index, port) in ports.into_iter().enumerate() {
      let dir = self.server_dir(&format!("zstordb{index}-"))?;
      let data_dir = dir.join("data");
      let meta_dir = dir.join("meta");
      create_dir(&data_dir)?;
      create_dir(&meta_dir)?;
      if let Some(p) = &self.options.profiling {
        create_dir(&p.dir.join(format!("zstordb{index}")))?;
      };
      let args = storage_server_args(
        index,
        port,
        &data_dir,
        &meta_dir,
        self.options.jobs,
        self.options.profiling.as_ref(),
      );
      let address = local_address(port);
      self.spawn(ShardKind::Data, index, address.clone(), &dir, args)?;
      addresses.push(address);
    }
    Ok(addresses)
  }

  /// Starts `count` metadata servers as one freshly named cluster. Returns their client addresses in shard order.
  pub fn start_metadata_shards(
    &mut self,
    count: usize,
    base_port: u16,
  ) -> Result<Vec<String>, DeployError> {
    if self.meta_started {
      return Err(DeployError::AlreadyActive {
        kind: ShardKind::Metadata,
      });
    };
    let client_ports = ports(base_port, count)?;
    let peer_base = base_port
      .checked_add(PEER_PORT_OFFSET)
      .ok_or(DeployError::PortOverflow { base: base_port, count })?;
    let peer_ports = ports(peer_base, count)?;
    self.meta_started = true;

    let token = format!("etcd-cluster-{}", thread_rng().gen::<u32>());
    let cluster = initial_cluster(&peer_ports);
    info!(cluster_token = %token, members = count, "starting metadata cluster");
    let mut addresses = Vec::with_capacity(count);
    for (index, (client_port, peer_port)) in client_ports.into_iter().zip(peer_ports).enumerate() {
      let dir = self.server_dir(&format!("etcd{index}-"))?;
      let data_dir = dir.join("data");
      let args = metadata_server_args(index, client_port, peer_port, &token, &cluster, &data_dir);
      let address = local_address(client_port);
      self.spawn(ShardKind::Metadata, index, address.clone(), &dir, args)?;
      addresses.push(address);
    }
    Ok(addresses)
  }

  pub async fn wait_until_ready(&self, limit: Duration) -> Result<(), DeployError> {
    wait_until_ready(&self.addresses(), limit).await
  }

  /// Stops every server, most recently started first. Servers that exit with a non-zero code or ignore the termination signal are reported, not propagated.
  pub async fn stop_all(&mut self) -> Vec<StopWarning> {
    let grace = self.options.stop_grace;
    let mut warnings = Vec::new();
    while let Some(mut server) = self.servers.pop() {
      match stop_server(&mut server, grace).await {
        Some(w) => {
          warn!(
            kind = %w.kind,
            index = w.index,
            address = %w.address,
            issue = ?w.issue,
            stderr = %w.stderr,
            "server did not stop cleanly"
          );
          warnings.push(w);
        }
        None => info!(kind = %server.kind, index = server.index, "stopped server"),
      };
    }
    warnings
  }

  /// Removes every temporary directory of this deployment. Safe to call repeatedly.
  /// Does nothing while servers are still tracked: `stop_all` must run first, and the deployment stays active until it has.
  pub fn cleanup(&mut self) {
    if !self.servers.is_empty() {
      warn!(running = self.servers.len(), "servers still running, keeping deployment");
      return;
    };
    for dir in self.dirs.drain(..) {
      let path = dir.path().to_path_buf();
      if let Err(err) = dir.close() {
        warn!(path = %path.display(), error = %err, "failed to remove server directory");
      };
    }
    self.data_started = false;
    self.meta_started = false;
  }
}

#[cfg(test)]
mod tests {
  use super::initial_cluster;
  use super::metadata_server_args;
  use super::ports;
  use super::storage_server_args;
  use super::DeployError;
  use super::DeployOptions;
  use super::Deployment;
  use super::ShardKind;
  use super::StopIssue;
  use super::STDERR_FILE;
  use crate::Launcher;
  use crate::ProfileMode;
  use crate::Profiling;
  use std::path::Path;
  use std::time::Duration;
  use tokio::time::sleep;
  use tracing_test::traced_test;

  fn scripted(script: &str, grace: Duration) -> DeployOptions {
    DeployOptions {
      storage_server: Launcher::with_args("sh", vec!["-c".into(), script.into(), "sh".into()]),
      stop_grace: grace,
      ..DeployOptions::default()
    }
  }

  // Waits until the server has printed `marker`, so signal handling is set up.
  async fn wait_for_stderr(deployment: &Deployment, marker: &str) {
    let log = deployment.directories()[0].join(STDERR_FILE);
    for _ in 0..100 {
      if std::fs::read_to_string(&log).unwrap_or_default().contains(marker) {
        return;
      };
      sleep(Duration::from_millis(50)).await;
    }
    panic!("server never printed {marker:?}");
  }

  #[test]
  fn test_storage_server_args() {
    let args = storage_server_args(2, 1202, Path::new("/d"), Path::new("/m"), 4, None);
    assert_eq!(
      args,
      vec![
        "--listen", ":1202", "--data-dir", "/d", "--meta-dir", "/m", "--jobs", "4", "--no-auth"
      ]
    );

    let profiling = Profiling {
      mode: ProfileMode::Cpu,
      dir: "profile".into(),
    };
    let args = storage_server_args(1, 1201, Path::new("/d"), Path::new("/m"), 0, Some(&profiling));
    let tail = &args[8..];
    assert_eq!(
      tail,
      ["--profile-mode", "cpu", "--profile-output", "profile/zstordb1", "--no-auth"]
    );
  }

  #[test]
  fn test_metadata_server_args() {
    let cluster = initial_cluster(&[1400, 1401]);
    assert_eq!(
      cluster,
      "node0=http://127.0.0.1:1400,node1=http://127.0.0.1:1401"
    );
    let args = metadata_server_args(1, 1301, 1401, "etcd-cluster-7", &cluster, Path::new("/e"));
    let pairs = args.chunks(2).map(|c| (c[0].as_str(), c[1].as_str())).collect::<Vec<_>>();
    assert_eq!(
      pairs,
      vec![
        ("--name", "node1"),
        ("--initial-advertise-peer-urls", "http://127.0.0.1:1401"),
        ("--listen-peer-urls", "http://127.0.0.1:1401"),
        ("--listen-client-urls", "http://127.0.0.1:1301"),
        ("--advertise-client-urls", "http://127.0.0.1:1301"),
        ("--initial-cluster-token", "etcd-cluster-7"),
        ("--initial-cluster", cluster.as_str()),
        ("--data-dir", "/e"),
      ]
    );
  }

  #[test]
  fn test_ports() {
    assert_eq!(ports(1200, 3).unwrap(), vec![1200, 1201, 1202]);
    assert!(ports(1200, 0).unwrap().is_empty());
    assert_eq!(ports(65534, 2).unwrap(), vec![65534, 65535]);
    assert!(matches!(
      ports(65535, 2),
      Err(DeployError::PortOverflow { base: 65535, count: 2 })
    ));
  }

  #[tokio::test]
  #[traced_test]
  async fn test_non_zero_exit_is_a_warning_with_stderr() {
    let mut deployment = Deployment::new(scripted(
      "trap '' TERM; echo boom >&2; exit 3",
      Duration::from_secs(5),
    ));
    deployment.start_data_shards(1, 1200).unwrap();
    wait_for_stderr(&deployment, "boom").await;

    let warnings = deployment.stop_all().await;
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, ShardKind::Data);
    assert_eq!(warnings[0].address, "127.0.0.1:1200");
    assert_eq!(warnings[0].issue, StopIssue::ExitCode(3));
    assert_eq!(warnings[0].stderr, "boom");
    assert!(logs_contain("server did not stop cleanly"));
    deployment.cleanup();
  }

  #[tokio::test]
  #[traced_test]
  async fn test_ignored_termination_is_killed_after_grace() {
    let mut deployment = Deployment::new(scripted(
      "trap '' TERM; echo ready >&2; while :; do sleep 0.1; done",
      Duration::from_millis(300),
    ));
    deployment.start_data_shards(1, 1200).unwrap();
    wait_for_stderr(&deployment, "ready").await;

    let warnings = deployment.stop_all().await;
    assert_eq!(warnings.len(), 1);
    assert_eq!(
      warnings[0].issue,
      StopIssue::GraceExceeded(Duration::from_millis(300))
    );
    assert!(logs_contain("GraceExceeded"));
    deployment.cleanup();
  }

  #[tokio::test]
  #[traced_test]
  async fn test_cleanup_waits_for_stop() {
    let mut deployment = Deployment::new(scripted("exec sleep 30", Duration::from_secs(5)));
    deployment.start_data_shards(1, 1200).unwrap();
    let dirs = deployment.directories();

    deployment.cleanup();
    assert!(logs_contain("servers still running"));
    assert!(dirs.iter().all(|d| d.is_dir()));
    assert!(matches!(
      deployment.start_data_shards(1, 1200),
      Err(DeployError::AlreadyActive {
        kind: ShardKind::Data
      })
    ));

    assert!(deployment.stop_all().await.is_empty());
    deployment.cleanup();
    assert!(dirs.iter().all(|d| !d.exists()));
    deployment.start_data_shards(0, 1200).unwrap();
  }
}
