use std::fmt::Write as _;

use super::ClusterConfig;

/// Allocation requested for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceShape {
    pub nodes: usize,
    pub tasks_per_gpu: usize,
}

impl ResourceShape {
    /// Total task slots the allocation provides.
    pub fn total_tasks(&self, gpus_per_node: usize) -> usize {
        self.nodes * gpus_per_node * self.tasks_per_gpu
    }
}

impl ClusterConfig {
    pub fn jobs_per_node(&self) -> usize {
        self.jobs_per_gpu * self.gpus_per_node
    }

    /// Smallest allocation that fits `n` tasks.
    ///
    /// A full batch gets the configured shape. Fewer tasks than one node holds stay on a single
    /// node and spread over its GPUs; anything larger takes whole nodes.
    pub fn optimal_config(&self, n: usize) -> ResourceShape {
        let gpus = self.gpus_per_node.max(1);
        if n == self.optimal_job_size() {
            return ResourceShape {
                nodes: self.job_nodes,
                tasks_per_gpu: self.jobs_per_gpu,
            };
        }
        if n < self.jobs_per_node() {
            return ResourceShape {
                nodes: 1,
                tasks_per_gpu: n.div_ceil(gpus).max(1),
            };
        }
        ResourceShape {
            nodes: n.div_ceil(self.jobs_per_node().max(1)),
            tasks_per_gpu: self.jobs_per_gpu,
        }
    }

    pub fn optimal_job_size(&self) -> usize {
        self.job_nodes * self.jobs_per_node()
    }
}

/// Render the `sbatch` script for one batch whose command lines are in `task_list`.
///
/// `task_list` is resolved against the submission directory.
pub fn render_job_script(cfg: &ClusterConfig, shape: ResourceShape, task_list: &str) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "#!/bin/bash");
    let _ = writeln!(s, "#SBATCH --account={}", cfg.account);
    let _ = writeln!(s, "#SBATCH --nodes={}", shape.nodes);
    let _ = writeln!(s, "#SBATCH --ntasks={}", shape.total_tasks(cfg.gpus_per_node));
    let _ = writeln!(s, "#SBATCH --ntasks-per-gpu={}", shape.tasks_per_gpu);
    let _ = writeln!(s, "#SBATCH --output=out.%j");
    let _ = writeln!(s, "#SBATCH --error=err.%j");
    let _ = writeln!(s, "#SBATCH --time={}", cfg.time_limit);
    let _ = writeln!(s, "#SBATCH --partition={}", cfg.partition);
    let _ = writeln!(s);
    let _ = writeln!(
        s,
        "srun -A {} --cpu-bind=none,v --accel-bind=gn --job-name=interactive \\",
        cfg.account
    );
    let _ = writeln!(s, "    {} {}", cfg.step_script, task_list);
    s
}
