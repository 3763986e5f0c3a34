use std::{net::IpAddr, path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand, ValueEnum};
use jobpack_core::{CommandEncoding, ManagerConfig, Timings};
use jobpack_exec::{ClusterConfig, LocalConfig};
use jobpack_observe::{LoggerConfig, LoggerFormat, LoggerLevel};

use crate::client::{DEFAULT_PORT, PORT_ENV};

/// Batch individually submitted commands into cluster or local jobs
#[derive(Debug, Parser)]
#[command(name = "jobpackd")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Accept tasks over HTTP and run them in batches
    Serve(ServeArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// One Slurm job per batch
    Slurm,
    /// One local GNU parallel process per batch
    Parallel,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[arg(long, value_enum)]
    pub backend: BackendKind,

    #[arg(long, env = PORT_ENV, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    #[arg(long, default_value = "127.0.0.1")]
    pub bind: IpAddr,

    /// Listen backlog
    #[arg(long, default_value_t = 1024)]
    pub backlog: u32,

    /// Linger window after the last arrival before a partial batch is cut
    #[arg(long)]
    pub queue_delay_ms: Option<u64>,

    /// Maximum time between two status polls
    #[arg(long)]
    pub reaper_period_ms: Option<u64>,

    /// Tasks per batch (defaults to the backend's optimum)
    #[arg(long)]
    pub job_size: Option<usize>,

    /// Consecutive failed status queries before pending jobs are failed
    #[arg(long, default_value_t = 5)]
    pub max_poll_failures: u32,

    /// How argv is turned into a command line: joined or quoted
    #[arg(long, default_value = "joined")]
    pub encoding: CommandEncoding,

    /// Log filter directive, e.g. `info,jobpack.core=debug`
    #[arg(long, env = "JOBPACK_LOG", default_value = "info")]
    pub log_level: LoggerLevel,

    /// text, json or journald
    #[arg(long, default_value = "text")]
    pub log_format: LoggerFormat,

    /// Serve Prometheus metrics on /metrics
    #[arg(long)]
    pub metrics: bool,

    #[command(flatten)]
    pub slurm: SlurmArgs,

    #[command(flatten)]
    pub parallel: ParallelArgs,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Slurm")]
pub struct SlurmArgs {
    #[arg(long)]
    pub account: Option<String>,
    #[arg(long)]
    pub partition: Option<String>,
    /// Nodes requested for a full batch
    #[arg(long)]
    pub job_nodes: Option<usize>,
    /// Wall-clock limit, `HH:MM:SS`
    #[arg(long)]
    pub time_limit: Option<String>,
    /// Launcher run by `srun` with the tasks file
    #[arg(long)]
    pub step_script: Option<String>,
    /// Submission directory for tasks files and job output
    #[arg(long)]
    pub workdir: Option<PathBuf>,
    #[arg(long)]
    pub sbatch: Option<PathBuf>,
    #[arg(long)]
    pub sacct: Option<PathBuf>,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Local")]
pub struct ParallelArgs {
    /// Runner fed the command lines on stdin
    #[arg(long = "parallel-program")]
    pub program: Option<PathBuf>,
}

impl ServeArgs {
    /// `base` with any timing given on the command line applied.
    pub fn timings(&self, base: Timings) -> Timings {
        Timings {
            queue_delay: self
                .queue_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(base.queue_delay),
            reaper_period: self
                .reaper_period_ms
                .map(Duration::from_millis)
                .unwrap_or(base.reaper_period),
        }
    }

    pub fn manager_config(&self, backend_timings: Timings) -> ManagerConfig {
        ManagerConfig {
            timings: Some(self.timings(backend_timings)),
            job_size: self.job_size,
            max_poll_failures: self.max_poll_failures,
            encoding: self.encoding,
            ..Default::default()
        }
    }

    pub fn cluster_config(&self) -> ClusterConfig {
        let mut cfg = ClusterConfig::default();
        let s = &self.slurm;
        if let Some(v) = &s.account {
            cfg.account = v.clone();
        }
        if let Some(v) = &s.partition {
            cfg.partition = v.clone();
        }
        if let Some(v) = s.job_nodes {
            cfg.job_nodes = v.max(1);
        }
        if let Some(v) = &s.time_limit {
            cfg.time_limit = v.clone();
        }
        if let Some(v) = &s.step_script {
            cfg.step_script = v.clone();
        }
        if let Some(v) = &s.workdir {
            cfg.workdir = v.clone();
        }
        if let Some(v) = &s.sbatch {
            cfg.sbatch = v.clone();
        }
        if let Some(v) = &s.sacct {
            cfg.sacct = v.clone();
        }
        cfg
    }

    pub fn local_config(&self) -> LocalConfig {
        let mut cfg = LocalConfig::default();
        if let Some(program) = &self.parallel.program {
            cfg.program = program.clone();
        }
        cfg
    }

    pub fn logger_config(&self) -> LoggerConfig {
        LoggerConfig {
            format: self.log_format,
            level: self.log_level.clone(),
            ..Default::default()
        }
    }
}
