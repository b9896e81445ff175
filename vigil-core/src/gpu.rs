//! GPU monitoring and the memory-pressure signal
//!
//! Samples VRAM utilization on an interval and publishes a discrete
//! pressure level. Sources are tried in order: the nvidia-smi CLI, the AI
//! container's reported metrics, then deterministic mock values for dev
//! environments without a GPU. Any sampling error resolves to NORMAL and
//! fires no callbacks (fail-safe).

use crate::config::Settings;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// VRAM percentage at which pressure becomes WARNING
pub const MEMORY_PRESSURE_WARNING_THRESHOLD: f64 = 85.0;
/// VRAM percentage at which pressure becomes CRITICAL
pub const MEMORY_PRESSURE_CRITICAL_THRESHOLD: f64 = 95.0;

/// Stats history ring capacity
const HISTORY_CAPACITY: usize = 1000;

/// Discrete memory-pressure level derived from VRAM utilization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPressureLevel {
    Normal,
    Warning,
    Critical,
}

impl std::fmt::Display for MemoryPressureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MemoryPressureLevel::Normal => "normal",
            MemoryPressureLevel::Warning => "warning",
            MemoryPressureLevel::Critical => "critical",
        };
        write!(f, "{name}")
    }
}

/// One GPU sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuStats {
    pub name: Option<String>,
    pub temperature_c: Option<f64>,
    pub power_draw_w: Option<f64>,
    pub utilization_pct: Option<f64>,
    pub memory_used_mb: f64,
    pub memory_total_mb: f64,
    pub sampled_at: DateTime<Utc>,
}

impl GpuStats {
    /// VRAM utilization percentage
    pub fn memory_used_pct(&self) -> f64 {
        if self.memory_total_mb <= 0.0 {
            return 0.0;
        }
        self.memory_used_mb / self.memory_total_mb * 100.0
    }
}

/// Classify a VRAM percentage; boundaries are inclusive
pub fn classify_memory_pressure(
    used_pct: f64,
    warning_threshold: f64,
    critical_threshold: f64,
) -> MemoryPressureLevel {
    if used_pct >= critical_threshold {
        MemoryPressureLevel::Critical
    } else if used_pct >= warning_threshold {
        MemoryPressureLevel::Warning
    } else {
        MemoryPressureLevel::Normal
    }
}

/// Counters and timestamps published by the monitor
#[derive(Debug, Clone, Serialize)]
pub struct MemoryPressureMetrics {
    pub current_level: MemoryPressureLevel,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    pub total_warning_events: u64,
    pub total_critical_events: u64,
    pub last_warning_event_at: Option<DateTime<Utc>>,
    pub last_critical_event_at: Option<DateTime<Utc>>,
}

type PressureCallback = Box<dyn Fn(MemoryPressureLevel, MemoryPressureLevel) + Send + Sync>;

/// Monitors GPU state and publishes the memory-pressure signal
pub struct GpuMonitor {
    poll_interval: Duration,
    warning_threshold: f64,
    critical_threshold: f64,
    /// Metrics endpoint of the AI container, used when nvidia-smi fails
    container_metrics_url: Option<String>,
    client: reqwest::Client,
    nvidia_smi_unavailable: AtomicBool,
    history: Mutex<VecDeque<GpuStats>>,
    last_level: RwLock<MemoryPressureLevel>,
    callbacks: Mutex<Vec<PressureCallback>>,
    total_warning_events: AtomicU64,
    total_critical_events: AtomicU64,
    last_warning_event_at: Mutex<Option<DateTime<Utc>>>,
    last_critical_event_at: Mutex<Option<DateTime<Utc>>>,
    shutdown: watch::Sender<bool>,
}

impl GpuMonitor {
    /// Build a monitor from settings
    pub fn new(settings: &Settings, container_metrics_url: Option<String>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            poll_interval: Duration::from_secs_f64(settings.gpu_poll_interval_seconds.max(0.1)),
            warning_threshold: settings.gpu_memory_warning_threshold,
            critical_threshold: settings.gpu_memory_critical_threshold,
            container_metrics_url,
            client: reqwest::Client::new(),
            nvidia_smi_unavailable: AtomicBool::new(false),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
            last_level: RwLock::new(MemoryPressureLevel::Normal),
            callbacks: Mutex::new(Vec::new()),
            total_warning_events: AtomicU64::new(0),
            total_critical_events: AtomicU64::new(0),
            last_warning_event_at: Mutex::new(None),
            last_critical_event_at: Mutex::new(None),
            shutdown,
        }
    }

    /// Register a callback fired on every pressure level transition
    ///
    /// Callbacks receive `(new_level, old_level)`. Unchanged levels do not
    /// fire.
    pub fn register_memory_pressure_callback(&self, callback: PressureCallback) {
        self.callbacks.lock().push(callback);
    }

    /// Current pressure level as of the last check
    pub fn current_pressure_level(&self) -> MemoryPressureLevel {
        *self.last_level.read()
    }

    /// Snapshot of the pressure metrics
    pub fn memory_pressure_metrics(&self) -> MemoryPressureMetrics {
        MemoryPressureMetrics {
            current_level: self.current_pressure_level(),
            warning_threshold: self.warning_threshold,
            critical_threshold: self.critical_threshold,
            total_warning_events: self.total_warning_events.load(Ordering::SeqCst),
            total_critical_events: self.total_critical_events.load(Ordering::SeqCst),
            last_warning_event_at: *self.last_warning_event_at.lock(),
            last_critical_event_at: *self.last_critical_event_at.lock(),
        }
    }

    /// Recent samples, newest last
    pub fn stats_history(&self) -> Vec<GpuStats> {
        self.history.lock().iter().cloned().collect()
    }

    /// Sample once and update the pressure level, firing callbacks on change
    pub async fn check_memory_pressure(&self) -> MemoryPressureLevel {
        let stats = match self.sample().await {
            Ok(stats) => stats,
            Err(e) => {
                debug!("GPU sampling failed, treating as NORMAL: {e}");
                return MemoryPressureLevel::Normal;
            }
        };

        let used_pct = stats.memory_used_pct();
        self.record_history(stats);

        let new_level =
            classify_memory_pressure(used_pct, self.warning_threshold, self.critical_threshold);
        self.transition_to(new_level);
        new_level
    }

    fn record_history(&self, stats: GpuStats) {
        let mut history = self.history.lock();
        if history.len() == HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(stats);
    }

    pub(crate) fn transition_to(&self, new_level: MemoryPressureLevel) {
        let old_level = {
            let mut last = self.last_level.write();
            let old = *last;
            *last = new_level;
            old
        };
        if old_level == new_level {
            return;
        }

        let now = Utc::now();
        match new_level {
            MemoryPressureLevel::Warning => {
                self.total_warning_events.fetch_add(1, Ordering::SeqCst);
                *self.last_warning_event_at.lock() = Some(now);
                warn!("GPU memory pressure WARNING (was {old_level})");
            }
            MemoryPressureLevel::Critical => {
                self.total_critical_events.fetch_add(1, Ordering::SeqCst);
                *self.last_critical_event_at.lock() = Some(now);
                warn!("GPU memory pressure CRITICAL (was {old_level})");
            }
            MemoryPressureLevel::Normal => {
                info!("GPU memory pressure back to NORMAL (was {old_level})");
            }
        }

        for callback in self.callbacks.lock().iter() {
            callback(new_level, old_level);
        }
    }

    /// Sample GPU state from the first working source
    pub async fn sample(&self) -> Result<GpuStats> {
        if !self.nvidia_smi_unavailable.load(Ordering::Relaxed) {
            match self.sample_nvidia_smi().await {
                Ok(stats) => return Ok(stats),
                Err(e) => {
                    debug!("nvidia-smi unavailable, falling back: {e}");
                    self.nvidia_smi_unavailable.store(true, Ordering::Relaxed);
                }
            }
        }
        if let Some(url) = &self.container_metrics_url {
            match self.sample_container(url).await {
                Ok(stats) => return Ok(stats),
                Err(e) => debug!("container metrics unavailable, using mock: {e}"),
            }
        }
        Ok(Self::mock_stats())
    }

    async fn sample_nvidia_smi(&self) -> Result<GpuStats> {
        let output = tokio::time::timeout(
            Duration::from_secs(5),
            tokio::process::Command::new("nvidia-smi")
                .args([
                    "--query-gpu=temperature.gpu,power.draw,utilization.gpu,memory.used,memory.total,name",
                    "--format=csv,noheader,nounits",
                ])
                .output(),
        )
        .await
        .map_err(|_| Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "nvidia-smi timed out")))??;

        if !output.status.success() {
            return Err(Error::InvalidInput(format!(
                "nvidia-smi exited with {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .next()
            .ok_or_else(|| Error::Parse("empty nvidia-smi output".to_string()))?;
        Self::parse_nvidia_smi_line(line)
    }

    /// Parse one CSV line like `39, 29.61, 35, 175, 24576, NVIDIA RTX A5500`
    fn parse_nvidia_smi_line(line: &str) -> Result<GpuStats> {
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts.len() < 5 {
            return Err(Error::Parse(format!(
                "unexpected nvidia-smi output format: {line}"
            )));
        }
        let memory_used_mb: f64 = parts[3]
            .parse()
            .map_err(|_| Error::Parse(format!("bad memory.used: {}", parts[3])))?;
        let memory_total_mb: f64 = parts[4]
            .parse()
            .map_err(|_| Error::Parse(format!("bad memory.total: {}", parts[4])))?;
        Ok(GpuStats {
            name: parts.get(5).map(|s| (*s).to_string()),
            temperature_c: parts[0].parse().ok(),
            power_draw_w: parts[1].parse().ok(),
            utilization_pct: parts[2].parse().ok(),
            memory_used_mb,
            memory_total_mb,
            sampled_at: Utc::now(),
        })
    }

    async fn sample_container(&self, url: &str) -> Result<GpuStats> {
        #[derive(Deserialize)]
        struct ContainerGpuMetrics {
            gpu_name: Option<String>,
            memory_used_mb: f64,
            memory_total_mb: f64,
            utilization_pct: Option<f64>,
        }

        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| Error::DetectorUnavailable(format!("container metrics: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::DetectorUnavailable(format!(
                "container metrics returned {}",
                response.status()
            )));
        }
        let metrics: ContainerGpuMetrics = response
            .json()
            .await
            .map_err(|e| Error::Parse(format!("container metrics body: {e}")))?;
        Ok(GpuStats {
            name: metrics.gpu_name,
            temperature_c: None,
            power_draw_w: None,
            utilization_pct: metrics.utilization_pct,
            memory_used_mb: metrics.memory_used_mb,
            memory_total_mb: metrics.memory_total_mb,
            sampled_at: Utc::now(),
        })
    }

    /// Deterministic stand-in values for dev environments without a GPU
    fn mock_stats() -> GpuStats {
        GpuStats {
            name: Some("Mock GPU".to_string()),
            temperature_c: Some(45.0),
            power_draw_w: Some(30.0),
            utilization_pct: Some(12.0),
            memory_used_mb: 2048.0,
            memory_total_mb: 24576.0,
            sampled_at: Utc::now(),
        }
    }

    /// Start the polling loop; idempotent stop via [`GpuMonitor::stop`]
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let monitor = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            info!(
                interval_s = monitor.poll_interval.as_secs_f64(),
                "GPU monitor started"
            );
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(monitor.poll_interval) => {
                        monitor.check_memory_pressure().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("GPU monitor stopped");
        })
    }

    /// Signal the polling loop to stop
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_boundaries_are_inclusive() {
        let classify = |pct| {
            classify_memory_pressure(
                pct,
                MEMORY_PRESSURE_WARNING_THRESHOLD,
                MEMORY_PRESSURE_CRITICAL_THRESHOLD,
            )
        };
        assert_eq!(classify(84.9), MemoryPressureLevel::Normal);
        assert_eq!(classify(85.0), MemoryPressureLevel::Warning);
        assert_eq!(classify(94.9), MemoryPressureLevel::Warning);
        assert_eq!(classify(95.0), MemoryPressureLevel::Critical);
        assert_eq!(classify(97.9), MemoryPressureLevel::Critical);
        assert_eq!(classify(0.0), MemoryPressureLevel::Normal);
    }

    #[test]
    fn nvidia_smi_line_parses() {
        let stats = GpuMonitor::parse_nvidia_smi_line("39, 29.61, 35, 175, 24576, NVIDIA RTX A5500")
            .unwrap();
        assert_eq!(stats.temperature_c, Some(39.0));
        assert_eq!(stats.memory_used_mb, 175.0);
        assert_eq!(stats.memory_total_mb, 24576.0);
        assert_eq!(stats.name.as_deref(), Some("NVIDIA RTX A5500"));
        assert!(stats.memory_used_pct() < 1.0);
    }

    #[test]
    fn short_nvidia_smi_line_is_rejected() {
        assert!(GpuMonitor::parse_nvidia_smi_line("39, 29.61").is_err());
    }

    #[test]
    fn used_pct_handles_zero_total() {
        let stats = GpuStats {
            name: None,
            temperature_c: None,
            power_draw_w: None,
            utilization_pct: None,
            memory_used_mb: 100.0,
            memory_total_mb: 0.0,
            sampled_at: Utc::now(),
        };
        assert_eq!(stats.memory_used_pct(), 0.0);
    }

    fn test_monitor() -> GpuMonitor {
        GpuMonitor::new(&Settings::default(), None)
    }

    fn stats_with_pct(pct: f64) -> GpuStats {
        GpuStats {
            name: None,
            temperature_c: None,
            power_draw_w: None,
            utilization_pct: None,
            memory_used_mb: pct * 240.0,
            memory_total_mb: 24000.0,
            sampled_at: Utc::now(),
        }
    }

    #[test]
    fn callbacks_fire_only_on_transitions() {
        let monitor = test_monitor();
        let fired = Arc::new(Mutex::new(Vec::new()));
        let fired_clone = Arc::clone(&fired);
        monitor.register_memory_pressure_callback(Box::new(move |new, old| {
            fired_clone.lock().push((new, old));
        }));

        monitor.transition_to(MemoryPressureLevel::Critical);
        monitor.transition_to(MemoryPressureLevel::Critical);
        monitor.transition_to(MemoryPressureLevel::Normal);

        let calls = fired.lock().clone();
        assert_eq!(
            calls,
            vec![
                (MemoryPressureLevel::Critical, MemoryPressureLevel::Normal),
                (MemoryPressureLevel::Normal, MemoryPressureLevel::Critical),
            ]
        );
    }

    #[test]
    fn transition_counters_track_events() {
        let monitor = test_monitor();
        monitor.transition_to(MemoryPressureLevel::Warning);
        monitor.transition_to(MemoryPressureLevel::Critical);
        monitor.transition_to(MemoryPressureLevel::Normal);
        monitor.transition_to(MemoryPressureLevel::Warning);

        let metrics = monitor.memory_pressure_metrics();
        assert_eq!(metrics.total_warning_events, 2);
        assert_eq!(metrics.total_critical_events, 1);
        assert!(metrics.last_warning_event_at.is_some());
        assert!(metrics.last_critical_event_at.is_some());
        assert_eq!(metrics.warning_threshold, 85.0);
        assert_eq!(metrics.critical_threshold, 95.0);
    }

    #[test]
    fn history_ring_is_bounded() {
        let monitor = test_monitor();
        for _ in 0..(HISTORY_CAPACITY + 10) {
            monitor.record_history(stats_with_pct(10.0));
        }
        assert_eq!(monitor.stats_history().len(), HISTORY_CAPACITY);
    }
}
