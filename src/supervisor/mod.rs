//! Keeps exactly one worker process alive according to the restart policy
//!
//! - [`state`]: pure state machine, no I/O
//! - [`runtime`]: tokio task that drives the machine, owns timers and the child
//! - [`launcher`]: process boundary (`tokio::process` in production)
//! - [`sink`]: destinations for worker stdout/stderr lines
//!
//! ```rust,ignore
//! let launcher = CommandLauncher::new(config.worker.clone()).with_sink(Arc::new(TracingSink));
//! let supervisor = Supervisor::spawn(&config.worker.name, &config.supervisor, Arc::new(launcher));
//! supervisor.start().await?;
//! ```

pub mod launcher;
pub mod runtime;
pub mod sink;
pub mod state;

pub use launcher::{CommandLauncher, LaunchError, ProcessLauncher, WorkerHandle};
pub use runtime::{Supervisor, SupervisorError, SupervisorStatus};
pub use sink::{LedgerSink, LogSink, TracingSink};
pub use state::{Action, Event, Machine, ProcessIdentity, SupervisedProcess, SupervisorState};
