//! Pure restart state machine for a single worker slot
//!
//! [`Machine::handle`] takes one event and the current wall-clock time and
//! returns the side effects the runtime has to carry out. It never spawns,
//! sleeps or logs, which keeps every restart decision testable on its own.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{Backoff, RestartPolicy, SupervisorConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    RestartPending,
    Failed,
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SupervisorState::Stopped => "stopped",
            SupervisorState::Starting => "starting",
            SupervisorState::Running => "running",
            SupervisorState::RestartPending => "restart_pending",
            SupervisorState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessIdentity {
    pub name: String,
    /// Incremented on every launch attempt; 0 before the first one
    pub instance: u64,
    pub pid: Option<u32>,
}

/// Book-keeping for the supervised worker. Lives only as long as the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupervisedProcess {
    pub identity: ProcessIdentity,
    /// `None` after a signal death or before the first exit
    pub last_exit_code: Option<i32>,
    pub last_exit_time: Option<DateTime<Utc>>,
    pub restart_count: u32,
    /// Delay used for the most recently scheduled restart
    pub restart_backoff: Duration,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start,
    Launched { instance: u64, pid: Option<u32> },
    LaunchFailed { instance: u64, reason: String },
    Exited { instance: u64, code: Option<i32> },
    RestartTimer { generation: u64 },
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Launch { instance: u64 },
    ScheduleRestart { generation: u64, delay: Duration },
    CancelRestart,
    Terminate { instance: u64 },
}

#[derive(Debug, Clone)]
pub struct Machine {
    state: SupervisorState,
    process: SupervisedProcess,
    restart: RestartPolicy,
    backoff: Backoff,
    base_delay: Duration,
    max_delay: Duration,
    /// Bumped whenever a pending timer must be invalidated
    generation: u64,
    timer_pending: bool,
    consecutive_restarts: u32,
    /// When the current instance reached `Running`
    running_since: Option<DateTime<Utc>>,
}

impl Machine {
    pub fn new(name: impl Into<String>, config: &SupervisorConfig) -> Self {
        let base_delay = Duration::from_secs(config.restart_delay_seconds);
        Self {
            state: SupervisorState::Stopped,
            process: SupervisedProcess {
                identity: ProcessIdentity {
                    name: name.into(),
                    instance: 0,
                    pid: None,
                },
                last_exit_code: None,
                last_exit_time: None,
                restart_count: 0,
                restart_backoff: base_delay,
                last_error: None,
            },
            restart: config.restart,
            backoff: config.backoff,
            base_delay,
            max_delay: Duration::from_secs(config.max_restart_delay_seconds).max(base_delay),
            generation: 0,
            timer_pending: false,
            consecutive_restarts: 0,
            running_since: None,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn process(&self) -> &SupervisedProcess {
        &self.process
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn timer_pending(&self) -> bool {
        self.timer_pending
    }

    /// Apply one event. Events that no longer match the current instance or
    /// timer generation are ignored and yield no actions.
    pub fn handle(&mut self, event: Event, now: DateTime<Utc>) -> Vec<Action> {
        match event {
            Event::Start => self.on_start(),
            Event::Launched { instance, pid } => {
                if self.state == SupervisorState::Starting && instance == self.current_instance() {
                    self.state = SupervisorState::Running;
                    self.process.identity.pid = pid;
                    self.process.last_error = None;
                    self.running_since = Some(now);
                }
                Vec::new()
            }
            Event::LaunchFailed { instance, reason } => {
                if self.state != SupervisorState::Starting || instance != self.current_instance() {
                    return Vec::new();
                }
                self.state = SupervisorState::Failed;
                self.process.identity.pid = None;
                self.process.last_error = Some(reason);

                if self.restart.retries_launch() {
                    vec![self.schedule_restart()]
                } else {
                    Vec::new()
                }
            }
            Event::Exited { instance, code } => self.on_exit(instance, code, now),
            Event::RestartTimer { generation } => {
                let waiting = matches!(
                    self.state,
                    SupervisorState::RestartPending | SupervisorState::Failed
                );
                if !waiting || !self.timer_pending || generation != self.generation {
                    return Vec::new();
                }
                self.timer_pending = false;
                self.process.restart_count += 1;
                vec![self.begin_launch()]
            }
            Event::Stop => self.on_stop(),
        }
    }

    fn current_instance(&self) -> u64 {
        self.process.identity.instance
    }

    fn on_start(&mut self) -> Vec<Action> {
        match self.state {
            SupervisorState::Starting | SupervisorState::Running => Vec::new(),
            SupervisorState::Stopped | SupervisorState::Failed | SupervisorState::RestartPending => {
                let mut actions = Vec::new();
                if self.timer_pending {
                    actions.push(self.cancel_timer());
                }
                self.consecutive_restarts = 0;
                actions.push(self.begin_launch());
                actions
            }
        }
    }

    fn on_exit(&mut self, instance: u64, code: Option<i32>, now: DateTime<Utc>) -> Vec<Action> {
        if self.state != SupervisorState::Running || instance != self.current_instance() {
            return Vec::new();
        }

        self.process.last_exit_code = code;
        self.process.last_exit_time = Some(now);
        self.process.identity.pid = None;

        // A run that outlived the delay it would now get ends the crash streak
        if let Some(since) = self.running_since.take() {
            let uptime = (now - since).to_std().unwrap_or_default();
            if uptime >= self.next_delay() {
                self.consecutive_restarts = 0;
            }
        }

        if self.restart.restarts_after(code) {
            self.state = SupervisorState::RestartPending;
            vec![self.schedule_restart()]
        } else {
            self.state = SupervisorState::Stopped;
            Vec::new()
        }
    }

    fn on_stop(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();

        if self.timer_pending {
            actions.push(self.cancel_timer());
        } else {
            // Invalidate anything still in flight
            self.generation += 1;
        }

        if matches!(
            self.state,
            SupervisorState::Starting | SupervisorState::Running
        ) {
            actions.push(Action::Terminate {
                instance: self.current_instance(),
            });
        }

        self.state = SupervisorState::Stopped;
        self.process.identity.pid = None;
        self.consecutive_restarts = 0;
        self.running_since = None;
        actions
    }

    fn begin_launch(&mut self) -> Action {
        self.state = SupervisorState::Starting;
        self.process.identity.instance += 1;
        self.process.identity.pid = None;
        Action::Launch {
            instance: self.current_instance(),
        }
    }

    fn cancel_timer(&mut self) -> Action {
        self.timer_pending = false;
        self.generation += 1;
        Action::CancelRestart
    }

    fn schedule_restart(&mut self) -> Action {
        let delay = self.next_delay();
        self.consecutive_restarts = self.consecutive_restarts.saturating_add(1);
        self.generation += 1;
        self.timer_pending = true;
        self.process.restart_backoff = delay;

        Action::ScheduleRestart {
            generation: self.generation,
            delay,
        }
    }

    fn next_delay(&self) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(self.consecutive_restarts.min(31));
                self.base_delay
                    .checked_mul(factor)
                    .unwrap_or(self.max_delay)
                    .min(self.max_delay)
            }
        }
    }
}
