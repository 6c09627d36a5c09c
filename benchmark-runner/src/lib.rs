use clap::ValueEnum;
use std::path::PathBuf;
use tokio::process::Command;

pub mod deploy;
pub mod driver;
pub mod orchestrator;
pub mod plan;

/// An external program plus the arguments that precede any the runner appends.
#[derive(Clone, Debug)]
pub struct Launcher {
  pub program: String,
  pub args: Vec<String>,
}

impl Launcher {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
    }
  }

  pub fn with_args(program: impl Into<String>, args: Vec<String>) -> Self {
    Self {
      program: program.into(),
      args,
    }
  }

  pub(crate) fn command(&self) -> Command {
    let mut cmd = Command::new(&self.program);
    cmd.args(&self.args);
    cmd
  }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
pub enum ProfileMode {
  Cpu,
  Mem,
  Block,
  Trace,
}

impl ProfileMode {
  pub fn as_str(self) -> &'static str {
    match self {
      ProfileMode::Cpu => "cpu",
      ProfileMode::Mem => "mem",
      ProfileMode::Block => "block",
      ProfileMode::Trace => "trace",
    }
  }
}

/// Profiles are written under `dir` and survive deployment cleanup.
#[derive(Clone, Debug)]
pub struct Profiling {
  pub mode: ProfileMode,
  pub dir: PathBuf,
}
