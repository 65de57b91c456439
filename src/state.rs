//! Device mode state machine
//!
//! [`AssistantState`] is the single source of truth for what the device is
//! doing. All transitions are guard-checked here and requested only from
//! the cooperative loop; the wake listener thread never touches mode.

/// What the assistant is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    /// Powered up but not yet accepting commands
    Idle,
    /// Wake word listener active, waiting for a trigger
    Listening,
    /// Wake word heard, capturing a spoken command
    AwaitingCommand,
    /// A reply or response clip is playing
    Playing,
    /// Farewell clip playing, process about to exit
    ShuttingDown,
}

/// Guarded device mode holder
#[derive(Debug)]
pub struct AssistantState {
    mode: DeviceMode,
    command_enabled: bool,
}

impl Default for AssistantState {
    fn default() -> Self {
        Self::new()
    }
}

impl AssistantState {
    /// A freshly powered device: idle, commands disabled
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mode: DeviceMode::Idle,
            command_enabled: false,
        }
    }

    /// Current device mode
    #[must_use]
    pub const fn mode(&self) -> DeviceMode {
        self.mode
    }

    /// Whether command handling has been enabled since power-up
    #[must_use]
    pub const fn command_enabled(&self) -> bool {
        self.command_enabled
    }

    /// Power-up complete: `Idle -> Listening`, commands enabled
    ///
    /// Returns false if the device is not idle.
    pub fn enable_commands(&mut self) -> bool {
        if self.mode != DeviceMode::Idle {
            return false;
        }
        self.command_enabled = true;
        self.mode = DeviceMode::Listening;
        true
    }

    /// Wake word heard: `Listening -> AwaitingCommand`
    ///
    /// Rejected unless the device is listening with commands enabled, which
    /// covers "not already awaiting a command" and "not currently playing".
    pub fn wake_detected(&mut self) -> bool {
        if self.mode != DeviceMode::Listening || !self.command_enabled {
            return false;
        }
        self.mode = DeviceMode::AwaitingCommand;
        true
    }

    /// A reply clip starts: `AwaitingCommand -> Playing`
    pub fn begin_playback(&mut self) -> bool {
        if self.mode != DeviceMode::AwaitingCommand {
            return false;
        }
        self.mode = DeviceMode::Playing;
        true
    }

    /// Playback ended: `Playing -> Listening` (or `Idle` when commands are
    /// disabled)
    pub fn playback_finished(&mut self) -> bool {
        if self.mode != DeviceMode::Playing {
            return false;
        }
        self.mode = if self.command_enabled {
            DeviceMode::Listening
        } else {
            DeviceMode::Idle
        };
        true
    }

    /// Power-down requested: any mode `-> ShuttingDown`, commands disabled
    pub fn begin_shutdown(&mut self) {
        self.command_enabled = false;
        self.mode = DeviceMode::ShuttingDown;
    }

    /// Farewell clip done: `ShuttingDown -> Idle`
    pub fn shutdown_complete(&mut self) -> bool {
        if self.mode != DeviceMode::ShuttingDown {
            return false;
        }
        self.mode = DeviceMode::Idle;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_up_enables_listening() {
        let mut state = AssistantState::new();
        assert_eq!(state.mode(), DeviceMode::Idle);
        assert!(!state.command_enabled());

        assert!(state.enable_commands());
        assert_eq!(state.mode(), DeviceMode::Listening);
        assert!(state.command_enabled());

        // Second enable is rejected; device is no longer idle
        assert!(!state.enable_commands());
    }

    #[test]
    fn wake_requires_listening_mode() {
        let mut state = AssistantState::new();

        // Idle, commands disabled
        assert!(!state.wake_detected());

        state.enable_commands();
        assert!(state.wake_detected());
        assert_eq!(state.mode(), DeviceMode::AwaitingCommand);

        // Already awaiting: a second wake is rejected
        assert!(!state.wake_detected());
    }

    #[test]
    fn wake_rejected_while_playing() {
        let mut state = AssistantState::new();
        state.enable_commands();
        state.wake_detected();
        state.begin_playback();
        assert_eq!(state.mode(), DeviceMode::Playing);

        assert!(!state.wake_detected());
        assert_eq!(state.mode(), DeviceMode::Playing);
    }

    #[test]
    fn playback_round_trip_returns_to_listening() {
        let mut state = AssistantState::new();
        state.enable_commands();
        assert!(state.wake_detected());
        assert!(state.begin_playback());
        assert!(state.playback_finished());
        assert_eq!(state.mode(), DeviceMode::Listening);
    }

    #[test]
    fn playback_finished_goes_idle_when_commands_disabled() {
        let mut state = AssistantState::new();
        state.enable_commands();
        state.wake_detected();
        state.begin_playback();

        state.command_enabled = false;
        assert!(state.playback_finished());
        assert_eq!(state.mode(), DeviceMode::Idle);
    }

    #[test]
    fn shutdown_from_any_mode() {
        let mut state = AssistantState::new();
        state.enable_commands();
        state.wake_detected();
        state.begin_playback();

        state.begin_shutdown();
        assert_eq!(state.mode(), DeviceMode::ShuttingDown);
        assert!(!state.command_enabled());

        // No wake events are honored while shutting down
        assert!(!state.wake_detected());

        assert!(state.shutdown_complete());
        assert_eq!(state.mode(), DeviceMode::Idle);
    }

    #[test]
    fn begin_playback_requires_awaiting_command() {
        let mut state = AssistantState::new();
        assert!(!state.begin_playback());

        state.enable_commands();
        assert!(!state.begin_playback());
    }
}
