//! Async driver around [`Machine`]
//!
//! One task owns the state machine and drains a single channel, so commands,
//! worker exits and timer wake-ups are handled strictly in arrival order.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::launcher::{ProcessLauncher, WorkerHandle};
use super::state::{Action, Event, Machine, SupervisedProcess, SupervisorState};
use crate::clock::{Clock, SystemClock};
use crate::config::SupervisorConfig;
use crate::observability::Metrics;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("supervisor task is no longer running")]
    Closed,
}

/// Point-in-time view published after every event
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorStatus {
    pub state: SupervisorState,
    pub process: SupervisedProcess,
}

enum Message {
    Start(oneshot::Sender<()>),
    Stop(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
    Exited { instance: u64, code: Option<i32> },
    RestartTimer { generation: u64 },
}

/// Cheap, cloneable handle to a running supervisor task
#[derive(Clone)]
pub struct Supervisor {
    commands: mpsc::UnboundedSender<Message>,
    status: watch::Receiver<SupervisorStatus>,
}

impl Supervisor {
    /// Spawn the supervisor loop; the worker is not started until [`start`](Self::start)
    pub fn spawn(
        name: impl Into<String>,
        config: &SupervisorConfig,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        Self::spawn_with(name, config, launcher, Arc::new(SystemClock), Arc::new(Metrics::new()))
    }

    pub fn spawn_with(
        name: impl Into<String>,
        config: &SupervisorConfig,
        launcher: Arc<dyn ProcessLauncher>,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let machine = Machine::new(name, config);
        let (status_tx, status_rx) = watch::channel(snapshot(&machine));
        let (tx, rx) = mpsc::unbounded_channel();

        let runner = Runner {
            machine,
            launcher,
            clock,
            metrics,
            mailbox: tx.downgrade(),
            status: status_tx,
            timer: None,
            worker: None,
        };
        tokio::spawn(runner.run(rx));

        Self {
            commands: tx,
            status: status_rx,
        }
    }

    /// Launch the worker. Returns once the launch attempt has been decided.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        self.request(Message::Start).await
    }

    /// Stop the worker and cancel any pending restart. Once this returns no
    /// restart will happen until the next [`start`](Self::start).
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        self.request(Message::Stop).await
    }

    /// Stop the worker and end the supervisor task
    pub async fn shutdown(&self) -> Result<(), SupervisorError> {
        self.request(Message::Shutdown).await
    }

    pub fn status(&self) -> SupervisorStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every status change
    pub fn subscribe(&self) -> watch::Receiver<SupervisorStatus> {
        self.status.clone()
    }

    async fn request(&self, make: fn(oneshot::Sender<()>) -> Message) -> Result<(), SupervisorError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.commands
            .send(make(ack_tx))
            .map_err(|_| SupervisorError::Closed)?;
        ack_rx.await.map_err(|_| SupervisorError::Closed)
    }
}

fn snapshot(machine: &Machine) -> SupervisorStatus {
    SupervisorStatus {
        state: machine.state(),
        process: machine.process().clone(),
    }
}

struct RunningWorker {
    instance: u64,
    kill: oneshot::Sender<()>,
    watcher: JoinHandle<()>,
}

struct Runner {
    machine: Machine,
    launcher: Arc<dyn ProcessLauncher>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    mailbox: mpsc::WeakUnboundedSender<Message>,
    status: watch::Sender<SupervisorStatus>,
    timer: Option<JoinHandle<()>>,
    worker: Option<RunningWorker>,
}

impl Runner {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Message>) {
        while let Some(message) = rx.recv().await {
            match message {
                Message::Start(ack) => {
                    self.dispatch(Event::Start).await;
                    let _ = ack.send(());
                }
                Message::Stop(ack) => {
                    self.dispatch(Event::Stop).await;
                    let _ = ack.send(());
                }
                Message::Shutdown(ack) => {
                    self.dispatch(Event::Stop).await;
                    let _ = ack.send(());
                    break;
                }
                Message::Exited { instance, code } => {
                    self.dispatch(Event::Exited { instance, code }).await;
                }
                Message::RestartTimer { generation } => {
                    self.dispatch(Event::RestartTimer { generation }).await;
                }
            }
        }

        self.cancel_timer();
        self.terminate_worker().await;
        info!(worker = %self.machine.process().identity.name, "Supervisor loop finished");
    }

    /// Feed one event through the machine, executing actions until quiet
    async fn dispatch(&mut self, event: Event) {
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            let before = self.machine.state();
            let exit = match &event {
                Event::Exited { instance, code } => Some((*instance, *code)),
                _ => None,
            };

            let actions = self.machine.handle(event, self.clock.now());
            let after = self.machine.state();

            if let Some((instance, code)) = exit {
                if before == SupervisorState::Running && after != SupervisorState::Running {
                    self.metrics.worker_exited();
                    self.reap(instance);
                    warn!(
                        kind = "unexpected_exit",
                        worker = %self.machine.process().identity.name,
                        instance,
                        code = ?code,
                        next = %after,
                        "Worker exited"
                    );
                }
            }

            if before != after {
                info!(from = %before, to = %after, "Supervisor state changed");
            }
            self.publish();

            for action in actions {
                if let Some(follow_up) = self.execute(action).await {
                    queue.push_back(follow_up);
                }
            }
        }
    }

    async fn execute(&mut self, action: Action) -> Option<Event> {
        match action {
            Action::Launch { instance } => match self.launcher.launch(instance).await {
                Ok(handle) => {
                    let pid = handle.pid();
                    self.metrics.worker_launched();
                    info!(
                        worker = %self.machine.process().identity.name,
                        instance,
                        pid = ?pid,
                        "Worker launched"
                    );
                    self.watch_worker(instance, handle);
                    Some(Event::Launched { instance, pid })
                }
                Err(e) => {
                    self.metrics.launch_failed();
                    error!(
                        kind = "launch_failure",
                        worker = %self.machine.process().identity.name,
                        instance,
                        cause = %e,
                        "Worker could not be launched"
                    );
                    Some(Event::LaunchFailed {
                        instance,
                        reason: e.to_string(),
                    })
                }
            },
            Action::ScheduleRestart { generation, delay } => {
                self.cancel_timer();
                self.metrics.restart_scheduled();
                info!(generation, delay_secs = delay.as_secs(), "Restart scheduled");

                let mailbox = self.mailbox.clone();
                self.timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(tx) = mailbox.upgrade() {
                        let _ = tx.send(Message::RestartTimer { generation });
                    }
                }));
                None
            }
            Action::CancelRestart => {
                self.cancel_timer();
                info!("Pending restart cancelled");
                None
            }
            Action::Terminate { instance } => {
                info!(instance, "Terminating worker");
                self.terminate_worker().await;
                None
            }
        }
    }

    fn watch_worker(&mut self, instance: u64, mut handle: Box<dyn WorkerHandle>) {
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        let mailbox = self.mailbox.clone();

        let watcher = tokio::spawn(async move {
            let exited = tokio::select! {
                code = handle.wait() => Some(code),
                _ = &mut kill_rx => None,
            };

            let code = match exited {
                Some(code) => code,
                None => {
                    handle.terminate().await;
                    None
                }
            };

            if let Some(tx) = mailbox.upgrade() {
                let _ = tx.send(Message::Exited { instance, code });
            }
        });

        self.worker = Some(RunningWorker {
            instance,
            kill: kill_tx,
            watcher,
        });
    }

    /// Forget the watcher of a worker that has already exited on its own
    fn reap(&mut self, instance: u64) {
        if self.worker.as_ref().map(|w| w.instance) == Some(instance) {
            self.worker = None;
        }
    }

    async fn terminate_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.kill.send(());
            if let Err(e) = worker.watcher.await {
                warn!(instance = worker.instance, error = %e, "Worker watcher ended abnormally");
            }
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn publish(&self) {
        let status = snapshot(&self.machine);
        self.status.send_replace(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RestartPolicy;
    use crate::supervisor::launcher::LaunchError;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Launcher whose workers exit only when the test says so
    #[derive(Default)]
    struct FakeLauncher {
        launches: AtomicUsize,
        fail: AtomicBool,
        exits: Mutex<Vec<oneshot::Sender<Option<i32>>>>,
    }

    impl FakeLauncher {
        fn launches(&self) -> usize {
            self.launches.load(Ordering::SeqCst)
        }

        fn exit_current(&self, code: Option<i32>) {
            let sender = self.exits.lock().unwrap().pop().expect("no running worker");
            sender.send(code).unwrap();
        }
    }

    struct FakeWorker {
        exit: oneshot::Receiver<Option<i32>>,
    }

    #[async_trait]
    impl WorkerHandle for FakeWorker {
        fn pid(&self) -> Option<u32> {
            Some(1000)
        }

        async fn wait(&mut self) -> Option<i32> {
            (&mut self.exit).await.unwrap_or(None)
        }

        async fn terminate(&mut self) {}
    }

    #[async_trait]
    impl ProcessLauncher for FakeLauncher {
        async fn launch(&self, _instance: u64) -> Result<Box<dyn WorkerHandle>, LaunchError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(LaunchError::MissingWorkingDir(PathBuf::from("/missing")));
            }
            let (tx, rx) = oneshot::channel();
            self.exits.lock().unwrap().push(tx);
            Ok(Box::new(FakeWorker { exit: rx }))
        }
    }

    fn config(restart: RestartPolicy) -> SupervisorConfig {
        SupervisorConfig {
            restart,
            restart_delay_seconds: 5,
            ..SupervisorConfig::default()
        }
    }

    async fn wait_for_state(supervisor: &Supervisor, state: SupervisorState) {
        let mut rx = supervisor.subscribe();
        rx.wait_for(|s| s.state == state).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_reaches_running() {
        let launcher = Arc::new(FakeLauncher::default());
        let supervisor = Supervisor::spawn("listener", &config(RestartPolicy::Always), launcher.clone());

        supervisor.start().await.unwrap();

        let status = supervisor.status();
        assert_eq!(status.state, SupervisorState::Running);
        assert_eq!(status.process.identity.pid, Some(1000));
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_policy_restarts_within_delay() {
        let launcher = Arc::new(FakeLauncher::default());
        let supervisor = Supervisor::spawn("listener", &config(RestartPolicy::Always), launcher.clone());
        supervisor.start().await.unwrap();

        for (round, code) in [Some(0), Some(1), None, Some(2)].into_iter().enumerate() {
            let exited_at = Instant::now();
            launcher.exit_current(code);
            wait_for_state(&supervisor, SupervisorState::RestartPending).await;
            wait_for_state(&supervisor, SupervisorState::Running).await;

            let waited = exited_at.elapsed();
            assert!(waited >= Duration::from_secs(5), "round {}: {:?}", round, waited);
            assert!(waited < Duration::from_millis(5_100), "round {}: {:?}", round, waited);
            assert_eq!(supervisor.status().process.restart_count, round as u32 + 1);
            assert_eq!(supervisor.status().process.last_exit_code, code);
        }

        assert_eq!(launcher.launches(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_policy_stays_stopped() {
        let launcher = Arc::new(FakeLauncher::default());
        let supervisor = Supervisor::spawn("listener", &config(RestartPolicy::Never), launcher.clone());
        supervisor.start().await.unwrap();

        launcher.exit_current(Some(1));
        wait_for_state(&supervisor, SupervisorState::Stopped).await;

        tokio::time::sleep(Duration::from_secs(3_600)).await;
        assert_eq!(supervisor.status().state, SupervisorState::Stopped);
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_restart_pending_prevents_restart() {
        let launcher = Arc::new(FakeLauncher::default());
        let supervisor = Supervisor::spawn("listener", &config(RestartPolicy::Always), launcher.clone());
        supervisor.start().await.unwrap();

        launcher.exit_current(Some(1));
        wait_for_state(&supervisor, SupervisorState::RestartPending).await;

        let mut states = supervisor.subscribe();
        supervisor.stop().await.unwrap();
        assert_eq!(supervisor.status().state, SupervisorState::Stopped);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_ne!(states.borrow_and_update().state, SupervisorState::Starting);
        assert_eq!(supervisor.status().state, SupervisorState::Stopped);
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_terminates_running_worker() {
        let launcher = Arc::new(FakeLauncher::default());
        let supervisor = Supervisor::spawn("listener", &config(RestartPolicy::Always), launcher.clone());
        supervisor.start().await.unwrap();

        supervisor.stop().await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(supervisor.status().state, SupervisorState::Stopped);
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_is_retried() {
        let launcher = Arc::new(FakeLauncher::default());
        launcher.fail.store(true, Ordering::SeqCst);
        let supervisor = Supervisor::spawn("listener", &config(RestartPolicy::Always), launcher.clone());

        supervisor.start().await.unwrap();
        let status = supervisor.status();
        assert_eq!(status.state, SupervisorState::Failed);
        assert!(status.process.last_error.is_some());

        launcher.fail.store(false, Ordering::SeqCst);
        wait_for_state(&supervisor, SupervisorState::Running).await;
        assert_eq!(launcher.launches(), 2);
        assert!(supervisor.status().process.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_with_never_stays_failed() {
        let launcher = Arc::new(FakeLauncher::default());
        launcher.fail.store(true, Ordering::SeqCst);
        let supervisor = Supervisor::spawn("listener", &config(RestartPolicy::Never), launcher.clone());

        supervisor.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(supervisor.status().state, SupervisorState::Failed);
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_handle() {
        let launcher = Arc::new(FakeLauncher::default());
        let supervisor = Supervisor::spawn("listener", &config(RestartPolicy::Always), launcher);
        supervisor.start().await.unwrap();

        supervisor.shutdown().await.unwrap();
        assert_eq!(supervisor.status().state, SupervisorState::Stopped);

        // Give the loop a moment to drop its receiver
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(matches!(supervisor.start().await, Err(SupervisorError::Closed)));
    }
}
