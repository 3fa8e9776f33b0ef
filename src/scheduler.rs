//! Cooperative single-threaded periodic task runner (C5).
//!
//! One background thread scans the task table, collects tasks whose
//! `now - last_run >= period` under a short-held lock, updates
//! `last_run`, releases the lock, then runs each collected callback with
//! no lock held. A task that errors out on 10 consecutive invocations is
//! auto-disabled; this never interrupts the other tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::metrics::Metrics;

const AUTO_DISABLE_THRESHOLD: u32 = 10;
const MAX_SLEEP: Duration = Duration::from_millis(1);
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The callback a periodic task runs; errors are signalled by returning
/// `Err`, which never propagates past the scheduler (§7 — counted, not
/// thrown).
pub type TaskCallback = Box<dyn FnMut() -> Result<(), String> + Send>;

struct Task {
    name: String,
    callback: Mutex<TaskCallback>,
    period: Duration,
    last_run: Mutex<Instant>,
    enabled: AtomicBool,
    error_count: std::sync::atomic::AtomicU32,
}

/// A periodic task runner. Construct one per facade; `start` spawns the
/// background thread, `stop` joins it with a 5 s bound.
pub struct Scheduler {
    tasks: Arc<Mutex<Vec<Arc<Task>>>>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<Metrics>,
}

/// A snapshot of one task's bookkeeping, for diagnostics.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: String,
    pub period: Duration,
    pub enabled: bool,
    pub error_count: u32,
}

impl Scheduler {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
            metrics,
        }
    }

    /// Adds a task with a period in milliseconds.
    pub fn add_task_ms(&self, name: &str, period_ms: u64, callback: TaskCallback) {
        self.add_task(name, Duration::from_millis(period_ms), callback);
    }

    pub fn add_task(&self, name: &str, period: Duration, callback: TaskCallback) {
        let task = Arc::new(Task {
            name: name.to_string(),
            callback: Mutex::new(callback),
            period,
            last_run: Mutex::new(Instant::now()),
            enabled: AtomicBool::new(true),
            error_count: std::sync::atomic::AtomicU32::new(0),
        });
        self.tasks.lock().unwrap().push(task);
    }

    pub fn remove_task(&self, name: &str) {
        self.tasks.lock().unwrap().retain(|t| t.name != name);
    }

    pub fn enable_task(&self, name: &str) {
        if let Some(task) = self.find(name) {
            task.enabled.store(true, Ordering::SeqCst);
            task.error_count.store(0, Ordering::SeqCst);
        }
    }

    pub fn disable_task(&self, name: &str) {
        if let Some(task) = self.find(name) {
            task.enabled.store(false, Ordering::SeqCst);
        }
    }

    pub fn task_info(&self, name: &str) -> Option<TaskInfo> {
        self.find(name).map(|t| TaskInfo {
            name: t.name.clone(),
            period: t.period,
            enabled: t.enabled.load(Ordering::SeqCst),
            error_count: t.error_count.load(Ordering::SeqCst),
        })
    }

    fn find(&self, name: &str) -> Option<Arc<Task>> {
        self.tasks.lock().unwrap().iter().find(|t| t.name == name).cloned()
    }

    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let running = Arc::clone(&self.running);
        let task_list = Arc::clone(&self.tasks);
        let metrics = Arc::clone(&self.metrics);
        let handle = std::thread::spawn(move || run_loop(&running, &task_list, &metrics));
        *self.handle.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let (tx, rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let _ = handle.join();
                let _ = tx.send(());
            });
            if rx.recv_timeout(JOIN_TIMEOUT).is_err() {
                warn!("scheduler thread did not stop within 5s");
            }
        }
    }
}

fn run_loop(running: &AtomicBool, tasks: &Mutex<Vec<Arc<Task>>>, metrics: &Metrics) {
    while running.load(Ordering::SeqCst) {
        let due: Vec<Arc<Task>> = {
            let guard = tasks.lock().unwrap();
            let now = Instant::now();
            guard
                .iter()
                .filter(|t| t.enabled.load(Ordering::SeqCst))
                .filter(|t| {
                    let mut last_run = t.last_run.lock().unwrap();
                    if now.duration_since(*last_run) >= t.period {
                        *last_run = now;
                        true
                    } else {
                        false
                    }
                })
                .cloned()
                .collect()
        };

        for task in &due {
            let result = (task.callback.lock().unwrap())();
            match result {
                Ok(()) => task.error_count.store(0, Ordering::SeqCst),
                Err(e) => {
                    let count = task.error_count.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!(task = %task.name, error = %e, count, "periodic task callback failed");
                    if count >= AUTO_DISABLE_THRESHOLD {
                        task.enabled.store(false, Ordering::SeqCst);
                        warn!(task = %task.name, "auto-disabled after {AUTO_DISABLE_THRESHOLD} consecutive errors");
                        metrics.mark_task_auto_disabled();
                    }
                }
            }
        }

        let sleep = {
            let guard = tasks.lock().unwrap();
            guard
                .iter()
                .filter(|t| t.enabled.load(Ordering::SeqCst))
                .map(|t| t.period / 10)
                .min()
                .unwrap_or(MAX_SLEEP)
                .min(MAX_SLEEP)
        };
        std::thread::sleep(sleep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn auto_disables_after_ten_consecutive_errors() {
        let scheduler = Scheduler::new(Arc::new(Metrics::new()));
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        scheduler.add_task_ms(
            "always-fails",
            1,
            Box::new(move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Err("boom".to_string())
            }),
        );
        scheduler.start();
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if scheduler.task_info("always-fails").map(|t| !t.enabled).unwrap_or(false) {
                break;
            }
            assert!(Instant::now() < deadline, "task was never auto-disabled");
            std::thread::sleep(Duration::from_millis(5));
        }
        scheduler.stop();
        let info = scheduler.task_info("always-fails").unwrap();
        assert!(!info.enabled);
        assert!(info.error_count >= AUTO_DISABLE_THRESHOLD);
    }

    #[test]
    fn successful_task_runs_repeatedly() {
        let scheduler = Scheduler::new(Arc::new(Metrics::new()));
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        scheduler.add_task_ms(
            "heartbeat",
            1,
            Box::new(move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        scheduler.start();
        std::thread::sleep(Duration::from_millis(50));
        scheduler.stop();
        assert!(calls.load(Ordering::SeqCst) > 1);
    }

    #[test]
    fn disable_and_enable_task_resets_error_count() {
        let scheduler = Scheduler::new(Arc::new(Metrics::new()));
        scheduler.add_task_ms("noop", 1000, Box::new(|| Ok(())));
        scheduler.disable_task("noop");
        assert!(!scheduler.task_info("noop").unwrap().enabled);
        scheduler.enable_task("noop");
        assert!(scheduler.task_info("noop").unwrap().enabled);
        assert_eq!(scheduler.task_info("noop").unwrap().error_count, 0);
    }
}
