use serde::Serialize;
use std::time::{Duration, Instant};

#[cfg(feature = "cli")]
use std::sync::{Arc, Mutex};
#[cfg(feature = "cli")]
use sysinfo::{Pid, RefreshKind, System};

/// 行程資源快照，供 analytics 與 agent metrics 使用
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceSnapshot {
    pub cpu_usage: f32,
    pub memory_usage_mb: u64,
    pub memory_usage_percent: f32,
    pub peak_memory_mb: u64,
    pub uptime_seconds: u64,
}

#[cfg(feature = "cli")]
#[derive(Clone)]
pub struct SystemMonitor {
    system: Arc<Mutex<System>>,
    pid: Option<Pid>,
    start_time: Instant,
    peak_memory: Arc<Mutex<u64>>,
}

#[cfg(feature = "cli")]
impl SystemMonitor {
    pub fn new() -> Self {
        let mut system = System::new_with_specifics(RefreshKind::everything());

        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!("⚠️ Process monitoring unavailable: {}", e);
                None
            }
        };

        // 初始刷新
        system.refresh_all();

        Self {
            system: Arc::new(Mutex::new(system)),
            pid,
            start_time: Instant::now(),
            peak_memory: Arc::new(Mutex::new(0)),
        }
    }

    pub fn snapshot(&self) -> Option<ResourceSnapshot> {
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        system.refresh_all();

        let process = system.process(pid)?;
        let memory_mb = process.memory() / 1024 / 1024;
        let total_memory = system.total_memory() / 1024 / 1024;
        let memory_percent = if total_memory > 0 {
            (memory_mb as f32 / total_memory as f32) * 100.0
        } else {
            0.0
        };

        // 更新峰值記憶體
        let mut peak = self.peak_memory.lock().ok()?;
        if memory_mb > *peak {
            *peak = memory_mb;
        }

        Some(ResourceSnapshot {
            cpu_usage: process.cpu_usage(),
            memory_usage_mb: memory_mb,
            memory_usage_percent: memory_percent,
            peak_memory_mb: *peak,
            uptime_seconds: self.start_time.elapsed().as_secs(),
        })
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

// 非 CLI 環境只提供 uptime
#[cfg(not(feature = "cli"))]
#[derive(Clone)]
pub struct SystemMonitor {
    start_time: Instant,
}

#[cfg(not(feature = "cli"))]
impl SystemMonitor {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> Option<ResourceSnapshot> {
        Some(ResourceSnapshot {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            ..Default::default()
        })
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}
