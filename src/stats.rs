//! Worker resource snapshots, collected with sysinfo and served at
//! `GET /stats`.

use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAvg {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Whole-machine CPU usage as a fraction in [0, 1].
    pub cpu_usage: f64,
    pub mem_total: u64,
    pub mem_used: u64,
    pub disk_total: u64,
    pub disk_used: u64,
    pub load: LoadAvg,
    pub cpu_cores: u64,
    pub task_count: u64,
}

impl Stats {
    /// Refresh the system view and take a snapshot.
    pub fn collect(system: &mut System, task_count: u64) -> Stats {
        system.refresh_all();
        let disks = Disks::new_with_refreshed_list();
        let disk_total: u64 = disks.iter().map(|d| d.total_space()).sum();
        let disk_used: u64 = disks
            .iter()
            .map(|d| d.total_space().saturating_sub(d.available_space()))
            .sum();
        let load = System::load_average();

        Stats {
            cpu_usage: (system.global_cpu_usage() as f64 / 100.0).clamp(0.0, 1.0),
            mem_total: system.total_memory(),
            mem_used: system.used_memory(),
            disk_total,
            disk_used,
            load: LoadAvg {
                one: load.one,
                five: load.five,
                fifteen: load.fifteen,
            },
            cpu_cores: system.cpus().len() as u64,
            task_count,
        }
    }
}
