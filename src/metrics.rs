//! Prometheus-compatible metrics endpoint
//!
//! Exposes engine frame pacing and AI dispatch metrics in Prometheus format.
//! Served only when METRICS_PORT is set: http://localhost:<port>/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::ai::manager::AiStats;
use crate::core::performance::PerformanceStatus;
use crate::core::thread_pool::PoolStats;

const HISTORY_SAMPLES: usize = 1000;

/// Metrics registry for the engine
#[derive(Debug)]
pub struct Metrics {
    // Frame pacing
    pub frame_count: AtomicU64,
    pub fps_x100: AtomicU64, // Stored as fps * 100 (e.g., 59.94 = 5994)
    pub frame_time_us: AtomicU64,

    // Update timing (microseconds)
    pub update_time_us: AtomicU64,
    pub update_time_p95_us: AtomicU64,
    pub update_time_p99_us: AtomicU64,
    pub update_time_max_us: AtomicU64,
    pub update_count: AtomicU64,

    pub render_time_us: AtomicU64,

    // AI
    pub ai_entities: AtomicU64,
    pub ai_behaviors: AtomicU64,
    pub ai_messages_delivered: AtomicU64,
    pub ai_expired_pruned: AtomicU64,
    pub ai_parallel_ticks: AtomicU64,

    // Worker pool
    pub tasks_submitted: AtomicU64,
    pub tasks_failed: AtomicU64,
    pub tasks_pending: AtomicU64,

    // Performance status (0=Excellent, 1=Good, 2=Warning, 3=Critical, 4=Overloaded)
    pub performance_status: AtomicU64,
    pub budget_usage_percent: AtomicU64,

    start_time: Instant,

    // Rolling update times for percentile calculation
    update_history: RwLock<VecDeque<u64>>,
}

fn status_name(level: u64) -> &'static str {
    match level {
        0 => "excellent",
        1 => "good",
        2 => "warning",
        3 => "critical",
        _ => "overloaded",
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            frame_count: AtomicU64::new(0),
            fps_x100: AtomicU64::new(0),
            frame_time_us: AtomicU64::new(0),
            update_time_us: AtomicU64::new(0),
            update_time_p95_us: AtomicU64::new(0),
            update_time_p99_us: AtomicU64::new(0),
            update_time_max_us: AtomicU64::new(0),
            update_count: AtomicU64::new(0),
            render_time_us: AtomicU64::new(0),
            ai_entities: AtomicU64::new(0),
            ai_behaviors: AtomicU64::new(0),
            ai_messages_delivered: AtomicU64::new(0),
            ai_expired_pruned: AtomicU64::new(0),
            ai_parallel_ticks: AtomicU64::new(0),
            tasks_submitted: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            tasks_pending: AtomicU64::new(0),
            performance_status: AtomicU64::new(0),
            budget_usage_percent: AtomicU64::new(0),
            start_time: Instant::now(),
            update_history: RwLock::new(VecDeque::with_capacity(HISTORY_SAMPLES)),
        }
    }

    /// Record an update phase duration and refresh percentiles
    pub fn record_update_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.update_time_us.store(us, Ordering::Relaxed);
        self.update_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.update_history.write();
        history.push_back(us);
        while history.len() > HISTORY_SAMPLES {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.update_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.update_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.update_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    pub fn record_render_time(&self, duration: Duration) {
        self.render_time_us.store(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record one completed frame
    pub fn record_frame(&self, fps: f32, frame_time: Duration) {
        self.frame_count.fetch_add(1, Ordering::Relaxed);
        self.fps_x100.store((fps.max(0.0) * 100.0) as u64, Ordering::Relaxed);
        self.frame_time_us.store(frame_time.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_ai(&self, stats: &AiStats) {
        self.ai_entities.store(stats.managed_entities as u64, Ordering::Relaxed);
        self.ai_behaviors.store(stats.behaviors as u64, Ordering::Relaxed);
        self.ai_messages_delivered.store(stats.messages_delivered, Ordering::Relaxed);
        self.ai_expired_pruned.store(stats.expired_pruned, Ordering::Relaxed);
        self.ai_parallel_ticks.store(stats.parallel_ticks, Ordering::Relaxed);
    }

    pub fn record_pool(&self, stats: &PoolStats) {
        self.tasks_submitted.store(stats.submitted, Ordering::Relaxed);
        self.tasks_failed.store(stats.failed, Ordering::Relaxed);
        self.tasks_pending.store(stats.pending as u64, Ordering::Relaxed);
    }

    pub fn record_performance(&self, status: PerformanceStatus, budget_percent: f32) {
        self.performance_status.store(status.level(), Ordering::Relaxed);
        self.budget_usage_percent.store(budget_percent.max(0.0) as u64, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        // Frame pacing
        metric!("forge_sim_frames_total", "Total frames completed", "counter",
            self.frame_count.load(Ordering::Relaxed));
        metric!("forge_sim_fps", "Measured frames per second", "gauge",
            self.fps_x100.load(Ordering::Relaxed) as f64 / 100.0);
        metric!("forge_sim_frame_time_microseconds", "Last frame time in microseconds", "gauge",
            self.frame_time_us.load(Ordering::Relaxed));

        // Update phase
        metric!("forge_sim_update_time_microseconds", "Current update time in microseconds", "gauge",
            self.update_time_us.load(Ordering::Relaxed));
        metric!("forge_sim_update_time_p95_microseconds", "95th percentile update time", "gauge",
            self.update_time_p95_us.load(Ordering::Relaxed));
        metric!("forge_sim_update_time_p99_microseconds", "99th percentile update time", "gauge",
            self.update_time_p99_us.load(Ordering::Relaxed));
        metric!("forge_sim_update_time_max_microseconds", "Maximum update time", "gauge",
            self.update_time_max_us.load(Ordering::Relaxed));
        metric!("forge_sim_updates_total", "Total update phases run", "counter",
            self.update_count.load(Ordering::Relaxed));
        metric!("forge_sim_render_time_microseconds", "Last render time in microseconds", "gauge",
            self.render_time_us.load(Ordering::Relaxed));

        // AI
        metric!("forge_sim_ai_entities", "Entities with an assigned behavior", "gauge",
            self.ai_entities.load(Ordering::Relaxed));
        metric!("forge_sim_ai_behaviors", "Registered behavior prototypes", "gauge",
            self.ai_behaviors.load(Ordering::Relaxed));
        metric!("forge_sim_ai_messages_delivered_total", "Behavior messages delivered", "counter",
            self.ai_messages_delivered.load(Ordering::Relaxed));
        metric!("forge_sim_ai_expired_pruned_total", "Expired entities pruned from the assignment table", "counter",
            self.ai_expired_pruned.load(Ordering::Relaxed));
        metric!("forge_sim_ai_parallel_ticks_total", "AI ticks dispatched in parallel", "counter",
            self.ai_parallel_ticks.load(Ordering::Relaxed));

        // Worker pool
        metric!("forge_sim_tasks_submitted_total", "Tasks submitted to the worker pool", "counter",
            self.tasks_submitted.load(Ordering::Relaxed));
        metric!("forge_sim_tasks_failed_total", "Worker tasks that panicked", "counter",
            self.tasks_failed.load(Ordering::Relaxed));
        metric!("forge_sim_tasks_pending", "Tasks queued or running", "gauge",
            self.tasks_pending.load(Ordering::Relaxed));

        // Budget
        metric!("forge_sim_performance_status", "Performance status (0=Excellent, 4=Overloaded)", "gauge",
            self.performance_status.load(Ordering::Relaxed));
        metric!("forge_sim_budget_usage_percent", "Frame budget usage percentage", "gauge",
            self.budget_usage_percent.load(Ordering::Relaxed));

        output.push_str(&format!(
            "# HELP forge_sim_performance_state Human-readable performance state\n# TYPE forge_sim_performance_state gauge\nforge_sim_performance_state{{state=\"{}\"}} 1\n",
            status_name(self.performance_status.load(Ordering::Relaxed))
        ));

        metric!("forge_sim_uptime_seconds", "Engine uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON format metrics
    pub fn to_json(&self) -> String {
        let status = self.performance_status.load(Ordering::Relaxed);
        let value = json!({
            "frames": {
                "total": self.frame_count.load(Ordering::Relaxed),
                "fps": self.fps_x100.load(Ordering::Relaxed) as f64 / 100.0,
                "frame_time_us": self.frame_time_us.load(Ordering::Relaxed),
                "render_time_us": self.render_time_us.load(Ordering::Relaxed),
            },
            "update": {
                "time_us": self.update_time_us.load(Ordering::Relaxed),
                "time_p95_us": self.update_time_p95_us.load(Ordering::Relaxed),
                "time_p99_us": self.update_time_p99_us.load(Ordering::Relaxed),
                "time_max_us": self.update_time_max_us.load(Ordering::Relaxed),
                "count": self.update_count.load(Ordering::Relaxed),
            },
            "ai": {
                "entities": self.ai_entities.load(Ordering::Relaxed),
                "behaviors": self.ai_behaviors.load(Ordering::Relaxed),
                "messages_delivered": self.ai_messages_delivered.load(Ordering::Relaxed),
                "expired_pruned": self.ai_expired_pruned.load(Ordering::Relaxed),
                "parallel_ticks": self.ai_parallel_ticks.load(Ordering::Relaxed),
            },
            "tasks": {
                "submitted": self.tasks_submitted.load(Ordering::Relaxed),
                "failed": self.tasks_failed.load(Ordering::Relaxed),
                "pending": self.tasks_pending.load(Ordering::Relaxed),
            },
            "performance": {
                "status": status,
                "status_name": status_name(status),
                "budget_percent": self.budget_usage_percent.load(Ordering::Relaxed),
            },
            "uptime_seconds": self.uptime_seconds(),
        });
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Route a raw request to a full HTTP response
fn respond(metrics: &Metrics, request: &str) -> String {
    let path = request
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("GET "))
        .and_then(|rest| rest.split_whitespace().next());

    match path {
        Some("/metrics/json") | Some("/json") => http_response("application/json", &metrics.to_json()),
        Some("/metrics") => http_response("text/plain; version=0.0.4", &metrics.to_prometheus()),
        Some("/health") | Some("/") => http_response("text/plain", "OK"),
        _ => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = respond(&metrics, &request);

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.frame_count.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.update_count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_update_time() {
        let metrics = Metrics::new();

        for i in 0..100 {
            metrics.record_update_time(Duration::from_micros(100 + i * 10));
        }

        assert_eq!(metrics.update_count.load(Ordering::Relaxed), 100);
        assert!(metrics.update_time_p95_us.load(Ordering::Relaxed) > 0);
        assert!(metrics.update_time_p99_us.load(Ordering::Relaxed) > 0);
        assert_eq!(metrics.update_time_max_us.load(Ordering::Relaxed), 1090);
    }

    #[test]
    fn test_record_frame() {
        let metrics = Metrics::new();
        metrics.record_frame(59.94, Duration::from_micros(16_683));
        assert_eq!(metrics.frame_count.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.fps_x100.load(Ordering::Relaxed), 5994);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.ai_entities.store(50, Ordering::Relaxed);
        metrics.ai_behaviors.store(4, Ordering::Relaxed);
        metrics.record_performance(PerformanceStatus::Warning, 75.0);

        let output = metrics.to_prometheus();

        assert!(output.contains("forge_sim_ai_entities 50"));
        assert!(output.contains("forge_sim_ai_behaviors 4"));
        assert!(output.contains("forge_sim_performance_status 2"));
        assert!(output.contains("state=\"warning\""));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.ai_entities.store(100, Ordering::Relaxed);

        let value: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(value["ai"]["entities"], 100);
        assert_eq!(value["performance"]["status_name"], "excellent");
    }

    #[test]
    fn test_routing() {
        let metrics = Metrics::new();
        assert!(respond(&metrics, "GET /metrics HTTP/1.1\r\n\r\n").contains("forge_sim_frames_total"));
        assert!(respond(&metrics, "GET /metrics/json HTTP/1.1\r\n\r\n").contains("application/json"));
        assert!(respond(&metrics, "GET /health HTTP/1.1\r\n\r\n").ends_with("OK"));
        assert!(respond(&metrics, "GET /nope HTTP/1.1\r\n\r\n").starts_with("HTTP/1.1 404"));
    }
}
