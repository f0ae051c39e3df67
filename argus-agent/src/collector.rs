use argus_metrics::MetricDto;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// A pluggable metric producer.
///
/// `collect` samples the source synchronously and must stay cheap (local
/// system calls only). A collector that cannot sample one of its sub-metrics
/// omits it instead of failing the call; partial results are acceptable and
/// sampling never returns an error.
pub trait Collector: Send {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    /// Samples the source into a snapshot of wire records.
    fn collect(&mut self) -> Vec<MetricDto>;
}

/// Samples the agent's own process: resident and virtual memory, uptime, a
/// random jitter gauge and the `PollCount` invocation counter.
///
/// The invocation counter is the only state that persists across calls. Its
/// running total is reported as the counter delta each cycle, so the stored
/// total on the server grows by the cumulative count per delivery; the
/// delivery contract is at-least-once and this mirrors the upstream wire
/// behavior.
pub struct RuntimeCollector {
    system: System,
    pid: Option<Pid>,
    poll_count: i64,
}

impl RuntimeCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
            poll_count: 0,
        }
    }
}

impl Default for RuntimeCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for RuntimeCollector {
    fn name(&self) -> &'static str {
        "runtime"
    }

    fn collect(&mut self) -> Vec<MetricDto> {
        self.poll_count += 1;
        let poll_count = self.poll_count;

        let mut metrics = Vec::with_capacity(6);
        if let Some(pid) = self.pid {
            self.system
                .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            // If the process lookup fails the memory gauges are omitted for
            // this cycle; the counter and the jitter gauge are still emitted.
            if let Some(process) = self.system.process(pid) {
                metrics.push(MetricDto::gauge("Alloc", process.memory() as f64));
                metrics.push(MetricDto::gauge("Sys", process.virtual_memory() as f64));
                metrics.push(MetricDto::gauge("RunTime", process.run_time() as f64));
            }
        }

        metrics.push(MetricDto::gauge("RandomValue", rand::random::<f64>()));
        metrics.push(MetricDto::counter("PollCount", poll_count));
        metrics
    }
}

/// Samples host resources: total and free memory plus one utilization gauge
/// per logical core.
///
/// The metric set varies with the core count, so consumers must not assume a
/// fixed cardinality.
pub struct SystemCollector {
    system: System,
}

impl SystemCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SystemCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for SystemCollector {
    fn name(&self) -> &'static str {
        "system"
    }

    fn collect(&mut self) -> Vec<MetricDto> {
        self.system.refresh_memory();
        self.system.refresh_cpu_usage();

        let mut metrics = vec![
            MetricDto::gauge("TotalMemory", self.system.total_memory() as f64),
            MetricDto::gauge("FreeMemory", self.system.free_memory() as f64),
        ];

        for (index, cpu) in self.system.cpus().iter().enumerate() {
            metrics.push(MetricDto::gauge(
                format!("CPUutilization{}", index + 1),
                f64::from(cpu.cpu_usage()),
            ));
        }

        metrics
    }
}
