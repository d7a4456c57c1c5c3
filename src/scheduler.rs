//! `EventScheduler` and `DumbEventScheduler`, spec §4.3.
//!
//! Drives a single replay forward, enforcing per-event deadlines against
//! `event.proceed`, and yields exclusively through
//! [`crate::io::IoMultiplexer::select`] — never a system sleep, per the
//! cooperative-I/O design note in spec §9.

use std::{collections::HashMap, fmt, time::Duration};

use log::{debug, info, warn};

use crate::{
    error::{EngineError, Result},
    event::Event,
    io::IoMultiplexer,
    sim::Simulation,
    time::{as_duration, Timestamp, WallClock},
};

/// A recorded inter-event gap this sparse can't be real; guards against a
/// corrupt trace silently turning into an hours-long replay (spec §4.3).
const MAX_WAIT_SECONDS: f64 = 10_000.0;

/// Small wall/recorded-time dual renderer used only in log lines, matching
/// `EventSchedulerStats.time()` in the original.
fn format_time(secs: f64) -> String {
    let secs = secs.max(0.0);
    let mins = (secs / 60.0) as u64;
    let s = (secs % 60.0) as u64;
    let ms = ((secs * 1000.0) % 1000.0) as u64;
    format!("{mins:02}:{s:02}.{ms:03}")
}

#[derive(Debug, Default, Clone)]
pub struct EventSchedulerStats {
    matched: HashMap<String, u64>,
    timed_out: HashMap<String, u64>,
    replay_start_wall: Option<f64>,
    replay_start_recorded: Option<f64>,
}

impl EventSchedulerStats {
    pub fn new() -> EventSchedulerStats {
        EventSchedulerStats::default()
    }

    fn start_replay(&mut self, event: &Event, wall_now: f64) {
        self.replay_start_wall = Some(wall_now);
        self.replay_start_recorded = Some(event.recorded_time().as_float());
    }

    fn render_time(&self, event: &Event, wall_now: f64) -> String {
        let wall = self.replay_start_wall.map(|s| wall_now - s).unwrap_or(0.0);
        let rec = self
            .replay_start_recorded
            .map(|s| event.recorded_time().as_float() - s)
            .unwrap_or(0.0);
        format!("{} {}", format_time(wall), format_time(rec))
    }

    fn event_matched(&mut self, event: &Event, wall_now: f64) {
        info!(
            "{} matched event {}",
            self.render_time(event, wall_now),
            event.label()
        );
        *self.matched.entry(event.class_name().to_string()).or_insert(0) += 1;
    }

    fn event_timed_out(&mut self, event: &Event, wall_now: f64) {
        warn!(
            "{} event {} timed out",
            self.render_time(event, wall_now),
            event.label()
        );
        *self.timed_out.entry(event.class_name().to_string()).or_insert(0) += 1;
    }

    pub fn matched_counts(&self) -> &HashMap<String, u64> {
        &self.matched
    }

    pub fn timeout_counts(&self) -> &HashMap<String, u64> {
        &self.timed_out
    }

    pub fn total_matched(&self) -> u64 {
        self.matched.values().sum()
    }

    pub fn total_timed_out(&self) -> u64 {
        self.timed_out.values().sum()
    }
}

impl fmt::Display for EventSchedulerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Events matched: {}, timed out: {}",
            self.total_matched(),
            self.total_timed_out()
        )?;
        writeln!(f, "Matches per event type:")?;
        let mut matched: Vec<_> = self.matched.iter().collect();
        matched.sort_by_key(|(_, n)| **n);
        for (class, n) in matched {
            writeln!(f, "  {class} {n}")?;
        }
        writeln!(f, "Timeouts per event type:")?;
        let mut timed_out: Vec<_> = self.timed_out.iter().collect();
        timed_out.sort_by_key(|(_, n)| **n);
        for (class, n) in timed_out {
            writeln!(f, "  {class} {n}")?;
        }
        Ok(())
    }
}

/// Scheduler knobs, spec §4.3.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub speedup: f64,
    pub delay_input_events: bool,
    pub initial_wait: f64,
    pub epsilon_seconds: f64,
    pub sleep_interval_seconds: f64,
    /// How long `Replayer::replay` waits after the last scheduled event,
    /// in case the violation takes a moment to surface (spec §5's
    /// `sleep(endWaitSeconds)`, the one other legal blocking point besides
    /// the scheduler's own polling).
    pub end_wait_seconds: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            speedup: 1.0,
            delay_input_events: true,
            initial_wait: 0.5,
            epsilon_seconds: 0.5,
            sleep_interval_seconds: 0.2,
            end_wait_seconds: 0.5,
        }
    }
}

pub struct EventScheduler {
    config: SchedulerConfig,
    last_wall_time: Option<f64>,
    last_recorded_time: Option<Timestamp>,
    started: bool,
    wall: WallClock,
    pub stats: EventSchedulerStats,
}

impl EventScheduler {
    pub fn new(config: SchedulerConfig) -> EventScheduler {
        EventScheduler {
            config,
            last_wall_time: None,
            last_recorded_time: None,
            started: false,
            wall: WallClock::start(),
            stats: EventSchedulerStats::new(),
        }
    }

    /// How long to wait, in seconds, before this event should fire, scaled
    /// by `speedup` and corrected for wall-time already spent (spec §4.3).
    fn wait_time(&self, event: &Event) -> Result<f64> {
        let (last_wall, last_recorded) = match (self.last_wall_time, self.last_recorded_time) {
            (Some(w), Some(r)) => (w, r),
            _ => return Ok(self.config.initial_wait),
        };
        let rec_delta = (event.recorded_time() - last_recorded) / self.config.speedup;
        let real_delta = self.wall.now() - last_wall;
        let to_wait = rec_delta - real_delta;
        if to_wait > MAX_WAIT_SECONDS {
            return Err(EngineError::TraceCorrupt(format!(
                "wait time {to_wait:.0}s for event {} exceeds {MAX_WAIT_SECONDS:.0}s; no recorded sequence is that sparse",
                event.label()
            )));
        }
        Ok(to_wait.max(0.0))
    }

    fn poll(
        &self,
        event: &Event,
        deadline: f64,
        io: &mut IoMultiplexer,
        simulation: &mut dyn Simulation,
    ) -> Result<bool> {
        loop {
            if event.proceed(simulation) {
                return Ok(true);
            }
            if self.wall.now() > deadline {
                return Ok(false);
            }
            io.select(as_duration(self.config.sleep_interval_seconds))
                .map_err(|e| EngineError::Resource(e.to_string()))?;
        }
    }

    /// Processes one event in trace order: waits up to a per-event deadline
    /// for `proceed` to become true, records statistics (spec §4.3). Returns
    /// whether the event matched (for `Replayer`'s causality bookkeeping).
    pub fn schedule(
        &mut self,
        event: &Event,
        io: &mut IoMultiplexer,
        simulation: &mut dyn Simulation,
    ) -> Result<bool> {
        if !self.started {
            self.stats.start_replay(event, self.wall.now());
            self.started = true;
        }

        let wait_time = self.wait_time(event)?;
        let deadline = match event {
            Event::Input(_) => {
                if self.config.delay_input_events && wait_time > 0.01 {
                    debug!("delaying input event {} for {:.0}ms", event.label(), wait_time * 1000.0);
                    io.sleep(as_duration(wait_time))
                        .map_err(|e| EngineError::Resource(e.to_string()))?;
                }
                debug!("injecting {}", event.label());
                // Intentional per spec §4.3/§9: the deadline for an input
                // event is its own recorded time, already in replay's past,
                // so `poll` effectively makes one attempt.
                event.recorded_time().as_float()
            }
            Event::Internal(_) => {
                if event.timeout_disallowed() {
                    debug!("waiting for {} forever", event.label());
                    f64::INFINITY
                } else {
                    debug!(
                        "waiting for {} (maximum wait: {:.0}ms)",
                        event.label(),
                        self.config.epsilon_seconds * 1000.0
                    );
                    self.wall.now() + wait_time - 0.01 + self.config.epsilon_seconds
                }
            }
        };

        let matched = self.poll(event, deadline, io, simulation)?;
        let wall_now = self.wall.now();
        if matched {
            self.stats.event_matched(event, wall_now);
            self.last_wall_time = Some(wall_now);
            self.last_recorded_time = Some(event.recorded_time());
        } else {
            self.stats.event_timed_out(event, wall_now);
        }
        Ok(matched)
    }
}

/// Ignores the input/internal distinction and always sleeps the raw
/// recorded delta (spec §4.3). The original's deadline computation for this
/// variant references a variable before it is defined; per spec §9 that is
/// dead code, so here the deadline is simply "now plus epsilon" — enough
/// wait budget to observe a `proceed` without blocking forever.
pub struct DumbEventScheduler {
    epsilon_seconds: f64,
    sleep_interval_seconds: f64,
    last_event_time: Option<Timestamp>,
    wall: WallClock,
    pub stats: EventSchedulerStats,
}

impl DumbEventScheduler {
    pub fn new(epsilon_seconds: f64, sleep_interval_seconds: f64) -> DumbEventScheduler {
        DumbEventScheduler {
            epsilon_seconds,
            sleep_interval_seconds,
            last_event_time: None,
            wall: WallClock::start(),
            stats: EventSchedulerStats::new(),
        }
    }

    pub fn schedule(
        &mut self,
        event: &Event,
        io: &mut IoMultiplexer,
        simulation: &mut dyn Simulation,
    ) -> Result<bool> {
        if let Some(last) = self.last_event_time {
            let rec_delta = event.recorded_time() - last;
            if rec_delta > 0.0 {
                io.sleep(as_duration(rec_delta))
                    .map_err(|e| EngineError::Resource(e.to_string()))?;
            }
        } else {
            self.stats.start_replay(event, self.wall.now());
        }

        let deadline = self.wall.now() + self.epsilon_seconds;
        let mut matched = false;
        loop {
            if event.proceed(simulation) {
                matched = true;
                break;
            }
            if self.wall.now() > deadline {
                break;
            }
            io.select(Duration::from_secs_f64(self.sleep_interval_seconds))
                .map_err(|e| EngineError::Resource(e.to_string()))?;
        }
        let wall_now = self.wall.now();
        if matched {
            self.stats.event_matched(event, wall_now);
        } else {
            self.stats.event_timed_out(event, wall_now);
        }
        self.last_event_time = Some(event.recorded_time());
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        event::{InputEvent, InputKind},
        sim::MockSimulation,
    };

    fn switch_failure(label: &str, sec: i64) -> Event {
        Event::Input(InputEvent {
            label: label.to_string(),
            recorded_time: Timestamp::new(sec, 0),
            round: 0,
            dependent_labels: vec![],
            kind: InputKind::SwitchFailure { dpid: 1 },
        })
    }

    #[test]
    fn matching_input_event_increments_matched_counter() {
        let mut io = IoMultiplexer::new().unwrap();
        let mut sim = MockSimulation::new();
        let mut sched = EventScheduler::new(SchedulerConfig {
            initial_wait: 0.0,
            ..Default::default()
        });
        let ev = switch_failure("e1", 0);
        sched.schedule(&ev, &mut io, &mut sim).unwrap();
        assert_eq!(sched.stats.matched_counts().get("SwitchFailure"), Some(&1));
        assert_eq!(sched.stats.total_timed_out(), 0);
    }

    #[test]
    fn wait_time_over_budget_is_trace_corrupt() {
        let mut sched = EventScheduler::new(SchedulerConfig::default());
        let first = switch_failure("e1", 0);
        sched.last_wall_time = Some(0.0);
        sched.last_recorded_time = Some(first.recorded_time());
        let far_future = switch_failure("e2", 20_000);
        let err = sched.wait_time(&far_future).unwrap_err();
        assert!(matches!(err, EngineError::TraceCorrupt(_)));
    }

    #[test]
    fn display_lists_matched_and_timeout_counts() {
        let mut stats = EventSchedulerStats::new();
        let ev = switch_failure("e1", 0);
        stats.event_matched(&ev, 0.0);
        let s = stats.to_string();
        assert!(s.contains("Events matched: 1, timed out: 0"));
        assert!(s.contains("SwitchFailure 1"));
    }
}
