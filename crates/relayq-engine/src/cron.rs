//! Cron registrar: in-process periodic enqueue of template tasks.

use crate::engine::QueueEngine;
use crate::error::{QueueError, QueueResult};
use crate::task::{Task, TaskId};
use chrono::{DateTime, Utc};
use cron::Schedule;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{error, info, warn};

/// Identifier of a registered cron entry.
pub type EntryId = u64;

/// Tick resolution of the registrar loop.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// A parsed schedule specification.
///
/// Accepts standard 5-field cron expressions (a seconds field is
/// prepended), 6-field expressions with seconds, the `@daily`-style
/// shorthands of the cron grammar, and `@every <duration>` intervals.
#[derive(Debug, Clone)]
enum Trigger {
    Cron(Schedule),
    Every(Duration),
}

impl Trigger {
    /// Next firing time strictly after `after`.
    fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Cron(schedule) => schedule.after(&after).next(),
            Trigger::Every(period) => {
                Some(after + chrono::Duration::from_std(*period).unwrap_or_default())
            }
        }
    }
}

impl FromStr for Trigger {
    type Err = QueueError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(QueueError::InvalidSchedule("empty spec".to_string()));
        }

        if let Some(rest) = spec.strip_prefix("@every") {
            let period = parse_duration(rest.trim())?;
            if period.is_zero() {
                return Err(QueueError::InvalidSchedule(
                    "@every period must be positive".to_string(),
                ));
            }
            return Ok(Trigger::Every(period));
        }

        let normalized = if !spec.starts_with('@') && spec.split_whitespace().count() == 5 {
            format!("0 {}", spec)
        } else {
            spec.to_string()
        };

        let schedule = Schedule::from_str(&normalized)
            .map_err(|e| QueueError::InvalidSchedule(format!("{}: {}", spec, e)))?;
        Ok(Trigger::Cron(schedule))
    }
}

/// Parses a Go-style duration string: integer value plus unit, repeated,
/// e.g. `1s`, `90s`, `500ms`, `1h2m3s`.
fn parse_duration(input: &str) -> QueueResult<Duration> {
    if input.is_empty() {
        return Err(QueueError::InvalidSchedule("missing duration".to_string()));
    }

    let mut total = Duration::ZERO;
    let mut digits = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }

        let value: u64 = digits
            .parse()
            .map_err(|_| QueueError::InvalidSchedule(format!("invalid duration: {}", input)))?;
        digits.clear();

        let unit = match c {
            'h' => Duration::from_secs(3600),
            's' => Duration::from_secs(1),
            'm' => {
                if chars.peek() == Some(&'s') {
                    chars.next();
                    Duration::from_millis(1)
                } else {
                    Duration::from_secs(60)
                }
            }
            _ => {
                return Err(QueueError::InvalidSchedule(format!(
                    "unknown duration unit in: {}",
                    input
                )))
            }
        };

        total += unit * value as u32;
    }

    if !digits.is_empty() {
        return Err(QueueError::InvalidSchedule(format!(
            "duration missing unit: {}",
            input
        )));
    }

    Ok(total)
}

struct CronEntry {
    spec: String,
    trigger: Trigger,
    template: Task,
    next_run: DateTime<Utc>,
}

/// Builds the task for one firing of a template.
///
/// Each firing is a distinct task: fresh UUID (result records must not
/// collide across firings), `created_at` stamped now, and `retry_count`
/// reset in case the template carried history.
fn firing_task(template: &Task) -> Task {
    let mut task = template.clone();
    task.id = TaskId::new();
    task.created_at = Utc::now();
    task.retry_count = 0;
    task
}

/// In-process cron trigger that re-enters the engine at enqueue.
///
/// Process-local: in multi-replica deployments run the registrar in one
/// process only, or accept duplicate firings.
pub struct CronRegistrar {
    engine: Arc<QueueEngine>,
    entries: Arc<RwLock<HashMap<EntryId, CronEntry>>>,
    next_id: AtomicU64,
    shutdown_tx: broadcast::Sender<()>,
    running: Arc<AtomicBool>,
}

impl CronRegistrar {
    /// Creates a registrar over the given engine.
    pub fn new(engine: Arc<QueueEngine>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            engine,
            entries: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            shutdown_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Registers a template to be enqueued on every firing of `spec`.
    pub fn schedule(&self, spec: &str, template: Task) -> QueueResult<EntryId> {
        let trigger: Trigger = spec.parse()?;
        let next_run = trigger.next_after(Utc::now()).ok_or_else(|| {
            QueueError::InvalidSchedule(format!("spec never fires: {}", spec))
        })?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.entries.write().insert(
            id,
            CronEntry {
                spec: spec.to_string(),
                trigger,
                template,
                next_run,
            },
        );

        info!(entry_id = id, spec = spec, "Registered cron entry");
        Ok(id)
    }

    /// Removes a cron entry. Returns whether it existed.
    pub fn unschedule(&self, id: EntryId) -> bool {
        self.entries.write().remove(&id).is_some()
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true when no entries are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Spawns the tick loop. Subsequent calls are no-ops until `stop`.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let registrar = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Cron registrar started");
            let mut ticker = interval(TICK_INTERVAL);

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        info!("Cron registrar shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        registrar.fire_due().await;
                    }
                }
            }
        });
    }

    /// Signals the tick loop to stop. In-flight firings finish first.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            let _ = self.shutdown_tx.send(());
        }
    }

    /// Enqueues one task per due entry and advances its next firing time.
    async fn fire_due(&self) {
        let now = Utc::now();

        // Collect firings under the lock, enqueue outside it.
        let due: Vec<(EntryId, String, Task)> = {
            let mut entries = self.entries.write();
            let mut due = Vec::new();
            let mut exhausted = Vec::new();

            for (id, entry) in entries.iter_mut() {
                if entry.next_run > now {
                    continue;
                }
                due.push((*id, entry.spec.clone(), firing_task(&entry.template)));
                match entry.trigger.next_after(now) {
                    Some(next) => entry.next_run = next,
                    None => exhausted.push(*id),
                }
            }

            for id in exhausted {
                warn!(entry_id = id, "Cron entry will never fire again, removing");
                entries.remove(&id);
            }

            due
        };

        for (id, spec, task) in due {
            match self.engine.enqueue(&task).await {
                Ok(()) => {
                    info!(
                        entry_id = id,
                        spec = %spec,
                        task_id = %task.id,
                        task_type = %task.task_type,
                        "Cron entry fired"
                    );
                }
                Err(e) => {
                    error!(entry_id = id, spec = %spec, error = %e, "Cron enqueue failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Priority;
    use serde_json::json;

    #[test]
    fn test_parse_five_field_spec() {
        let trigger: Trigger = "* * * * *".parse().unwrap();
        assert!(matches!(trigger, Trigger::Cron(_)));
        assert!(trigger.next_after(Utc::now()).is_some());
    }

    #[test]
    fn test_parse_six_field_spec() {
        let trigger: Trigger = "*/5 * * * * *".parse().unwrap();
        assert!(matches!(trigger, Trigger::Cron(_)));
    }

    #[test]
    fn test_parse_daily_shorthand() {
        let trigger: Trigger = "@daily".parse().unwrap();
        let next = trigger.next_after(Utc::now()).unwrap();
        assert!(next > Utc::now());
    }

    #[test]
    fn test_parse_every_shorthand() {
        let trigger: Trigger = "@every 1s".parse().unwrap();
        match trigger {
            Trigger::Every(d) => assert_eq!(d, Duration::from_secs(1)),
            _ => panic!("expected interval trigger"),
        }
    }

    #[test]
    fn test_parse_invalid_spec() {
        assert!("definitely not cron".parse::<Trigger>().is_err());
        assert!("".parse::<Trigger>().is_err());
        assert!("@every".parse::<Trigger>().is_err());
        assert!("@every 0s".parse::<Trigger>().is_err());
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(
            parse_duration("1h2m3s").unwrap(),
            Duration::from_secs(3723)
        );
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_every_trigger_advances() {
        let trigger: Trigger = "@every 1m".parse().unwrap();
        let now = Utc::now();
        let next = trigger.next_after(now).unwrap();
        assert_eq!(next - now, chrono::Duration::seconds(60));
    }

    #[test]
    fn test_firing_task_gets_fresh_identity() {
        let mut template = Task::new("report", json!({"period": "daily"}), Priority::Low);
        template.retry_count = 2;
        let before = Utc::now();

        let fired = firing_task(&template);

        assert_ne!(fired.id, template.id);
        assert_eq!(fired.retry_count, 0);
        assert!(fired.created_at >= before);
        assert_eq!(fired.task_type, template.task_type);
        assert_eq!(fired.payload, template.payload);
        assert_eq!(fired.priority, template.priority);
    }

    #[test]
    fn test_entry_ids_are_sequential() {
        use crate::redis::Broker;
        use deadpool_redis::{Config, Runtime};

        let pool = Config::from_url("redis://127.0.0.1:1")
            .create_pool(Some(Runtime::Tokio1))
            .unwrap();
        let engine = Arc::new(QueueEngine::new(Broker::new(pool)));
        let registrar = CronRegistrar::new(engine);

        let template = Task::new("tick", json!(null), Priority::Default);
        let first = registrar.schedule("@every 1m", template.clone()).unwrap();
        let second = registrar.schedule("@every 1m", template).unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(registrar.len(), 2);
        assert!(registrar.unschedule(first));
        assert!(!registrar.unschedule(first));
    }
}
