//! Tunables read from the `[listener]` and `[command]` sections of cabinet.conf

use cabinetconfig::{define_options, Count, Duration, FleetConfig, Size};

define_options! {
    /// Event loop settings
    pub struct ListenerOptions {
        /// Upper bound on establishing one cabinet connection
        cabinet_connect_timeout: Duration = Duration(std::time::Duration::from_secs(10)),

        /// Readiness wait per loop iteration
        cabinet_poll_timeout: Duration = Duration(std::time::Duration::from_secs(1)),

        /// Sleep taken when no connection is open
        cabinet_idle_sleep: Duration = Duration(std::time::Duration::from_secs(1)),

        /// A reconnect sweep runs on every Nth loop iteration
        cabinet_reconnect_every: Count = Count(10),

        /// Bytes read per readable socket per iteration
        cabinet_read_chunk: Size = Size(1024),

        /// Treat connections closed by the peer as dead and reopen them
        cabinet_revive_closed: bool = true,
    }
}

define_options! {
    /// Outbound command settings
    pub struct CommandOptions {
        /// Upper bound on establishing a command connection
        cabinet_command_timeout: Duration = Duration(std::time::Duration::from_secs(30)),

        /// Send attempts before giving up
        cabinet_command_attempts: Count = Count(3),

        /// Delay before retry N is N times this value
        cabinet_command_retry_delay: Duration = Duration(std::time::Duration::from_millis(500)),

        /// Connect timeout used by connectivity probes
        cabinet_probe_timeout: Duration = Duration(std::time::Duration::from_secs(5)),
    }
}

impl ListenerOptions {
    pub fn from_config(config: &FleetConfig) -> Self {
        Self::from_fleet_config(config, &["listener", "global"])
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        self.cabinet_connect_timeout.0
    }

    pub fn poll_timeout(&self) -> std::time::Duration {
        self.cabinet_poll_timeout.0
    }

    pub fn idle_sleep(&self) -> std::time::Duration {
        self.cabinet_idle_sleep.0
    }

    /// Sweep cadence, never below one iteration
    pub fn reconnect_every(&self) -> u64 {
        self.cabinet_reconnect_every.0.max(1)
    }

    pub fn read_chunk(&self) -> usize {
        usize::try_from(self.cabinet_read_chunk.0)
            .unwrap_or(usize::MAX)
            .max(1)
    }
}

impl CommandOptions {
    pub fn from_config(config: &FleetConfig) -> Self {
        Self::from_fleet_config(config, &["command", "global"])
    }

    pub fn command_timeout(&self) -> std::time::Duration {
        self.cabinet_command_timeout.0
    }

    pub fn attempts(&self) -> u32 {
        u32::try_from(self.cabinet_command_attempts.0)
            .unwrap_or(u32::MAX)
            .max(1)
    }

    pub fn retry_delay(&self) -> std::time::Duration {
        self.cabinet_command_retry_delay.0
    }

    pub fn probe_timeout(&self) -> std::time::Duration {
        self.cabinet_probe_timeout.0
    }
}
