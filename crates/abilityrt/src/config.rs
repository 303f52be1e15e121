//! Runtime tunables.
//!
//! One `RuntimeConfig` is built at startup and shared (`Arc`) with every
//! component that needs a timeout, a budget, or a capacity.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Minimum time between restarts once the restart budget is spent.
    pub restart_interval: Duration,
    /// Restart attempts granted to a resident (keep-alive) ability.
    pub resident_restart_max: i32,
    /// Restart attempts granted to the root launcher.
    pub root_launcher_restart_max: i32,
    /// Time an ability has to attach its scheduler after a load request.
    pub load_timeout: Duration,
    pub foreground_timeout: Duration,
    pub background_timeout: Duration,
    pub terminate_timeout: Duration,
    /// Time a service has to acknowledge a start command.
    pub command_timeout: Duration,
    /// Time `start_ability_by_call` waits for the callee.
    pub caller_timeout: Duration,
    /// Capacity of each bounded task queue.
    pub task_queue_capacity: usize,
    /// Bound on a synchronous request over a byte transport.
    pub request_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl RuntimeConfig {
    pub fn standard() -> Self {
        Self {
            restart_interval: Duration::from_secs(120),
            resident_restart_max: 3,
            root_launcher_restart_max: 15,
            load_timeout: Duration::from_secs(10),
            foreground_timeout: Duration::from_secs(5),
            background_timeout: Duration::from_secs(3),
            terminate_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(10),
            caller_timeout: Duration::from_secs(10),
            task_queue_capacity: 1024,
            request_timeout: ipc::peer::DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_restart_interval(mut self, interval: Duration) -> Self {
        self.restart_interval = interval;
        self
    }

    pub fn with_restart_max(mut self, resident: i32, root_launcher: i32) -> Self {
        self.resident_restart_max = resident;
        self.root_launcher_restart_max = root_launcher;
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn with_lifecycle_timeouts(mut self, foreground: Duration, background: Duration, terminate: Duration) -> Self {
        self.foreground_timeout = foreground;
        self.background_timeout = background;
        self.terminate_timeout = terminate;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_caller_timeout(mut self, timeout: Duration) -> Self {
        self.caller_timeout = timeout;
        self
    }

    pub fn with_task_queue_capacity(mut self, capacity: usize) -> Self {
        self.task_queue_capacity = capacity;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
