//! Output connection state machine
//!
//! The machine is a plain value: every method applies one transition and
//! returns a [`Transition`] record describing it. Callers perform logging
//! once the lock guarding the machine has been released.

use std::io;

use super::id::OutputId;

/// Connection state of an output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    /// Not connected, eligible for automatic restart
    Disconnected,
    /// Dial attempts in progress
    Connecting,
    /// Socket open and writable
    Connected,
    /// Manually stopped, never restarted by a write
    Stopped,
}

impl OutputState {
    /// Human-readable status message
    pub fn message(&self) -> &'static str {
        match self {
            OutputState::Disconnected => "Disconnected",
            OutputState::Connecting => "Connecting",
            OutputState::Connected => "Connected",
            OutputState::Stopped => "Manual Stopped",
        }
    }
}

/// Last observed failure of an output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputError {
    /// No failure since the last start, stop or disconnect
    NoError,
    /// Name resolution failed (not retried within a start)
    HostNotFound,
    /// Dial timed out
    Timeout,
    /// Peer refused the connection
    ConnectionRefused,
    /// Peer reset or aborted the connection
    ConnectionReset,
    /// No route to host
    HostUnreachable,
    /// Network is unreachable
    NetworkUnreachable,
    /// Socket rejected an argument (bad address, port)
    InvalidArgument,
    /// Permission denied by the OS
    AccessDenied,
    /// Other I/O failure while writing
    IOError,
    /// Unclassified failure
    Unknown,
}

impl OutputError {
    /// Map a socket error onto the closed classification
    ///
    /// Kinds without a dedicated class map to `fallback`.
    pub fn classify(err: &io::Error, fallback: OutputError) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => OutputError::ConnectionRefused,
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                OutputError::ConnectionReset
            }
            io::ErrorKind::TimedOut => OutputError::Timeout,
            io::ErrorKind::HostUnreachable => OutputError::HostUnreachable,
            io::ErrorKind::NetworkUnreachable => OutputError::NetworkUnreachable,
            io::ErrorKind::InvalidInput | io::ErrorKind::AddrNotAvailable => {
                OutputError::InvalidArgument
            }
            io::ErrorKind::PermissionDenied => OutputError::AccessDenied,
            _ => fallback,
        }
    }

    /// Whether retrying within the same start can succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, OutputError::NoError | OutputError::HostNotFound)
    }

    /// Human-readable error message
    pub fn message(&self) -> &'static str {
        match self {
            OutputError::NoError => "No Error",
            OutputError::HostNotFound => "Host not found",
            OutputError::Timeout => "Connection timed out",
            OutputError::ConnectionRefused => "Connection refused",
            OutputError::ConnectionReset => "Connection reset",
            OutputError::HostUnreachable => "Host is unreachable",
            OutputError::NetworkUnreachable => "Network is unreachable",
            OutputError::InvalidArgument => "Invalid argument used for socket",
            OutputError::AccessDenied => "Access Denied",
            OutputError::IOError => "IO Error",
            OutputError::Unknown => "Unknown Error",
        }
    }
}

/// Record of one applied transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before the transition
    pub from: OutputState,
    /// State after the transition
    pub to: OutputState,
    /// Failure recorded by this transition, if any
    pub failure: Option<OutputError>,
}

impl Transition {
    /// Whether the state changed
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// Status message of the new state
    pub fn message(&self) -> &'static str {
        self.to.message()
    }
}

/// State and error of one output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Machine {
    state: OutputState,
    error: OutputError,
}

impl Machine {
    /// Fresh machine: `Disconnected`, no error
    pub fn new() -> Self {
        Self {
            state: OutputState::Disconnected,
            error: OutputError::NoError,
        }
    }

    pub fn state(&self) -> OutputState {
        self.state
    }

    pub fn error(&self) -> OutputError {
        self.error
    }

    /// Whether a start would begin dialing
    pub fn can_start(&self) -> bool {
        !matches!(self.state, OutputState::Connecting | OutputState::Connected)
    }

    /// A fresh start: enter `Connecting`, clear the error
    pub fn begin_connect(&mut self) -> Transition {
        self.apply(OutputState::Connecting, OutputError::NoError, None)
    }

    /// Dial succeeded
    pub fn connected(&mut self) -> Transition {
        self.apply(OutputState::Connected, OutputError::NoError, None)
    }

    /// A dial attempt failed and another may follow
    pub fn attempt_failed(&mut self, error: OutputError) -> Transition {
        self.apply(self.state, error, Some(error))
    }

    /// Name resolution failed: no further attempts this start
    pub fn host_not_found(&mut self) -> Transition {
        let error = OutputError::HostNotFound;
        self.apply(OutputState::Disconnected, error, Some(error))
    }

    /// All attempts used up; the last failure is kept
    pub fn exhausted(&mut self) -> Transition {
        self.apply(OutputState::Disconnected, self.error, None)
    }

    /// A start was cut short by shutdown; the last failure is kept
    pub fn interrupted(&mut self) -> Transition {
        self.apply(OutputState::Disconnected, self.error, None)
    }

    /// Write to a connected socket failed
    pub fn write_failed(&mut self, error: OutputError) -> Transition {
        self.apply(OutputState::Disconnected, error, Some(error))
    }

    /// Manual stop
    pub fn stopped(&mut self) -> Transition {
        self.apply(OutputState::Stopped, OutputError::NoError, None)
    }

    /// Deliberate disconnect, restartable
    pub fn disconnected(&mut self) -> Transition {
        self.apply(OutputState::Disconnected, OutputError::NoError, None)
    }

    fn apply(
        &mut self,
        to: OutputState,
        error: OutputError,
        failure: Option<OutputError>,
    ) -> Transition {
        let from = self.state;
        self.state = to;
        self.error = error;
        Transition { from, to, failure }
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time status of an output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputStatus {
    /// Output identity
    pub id: OutputId,
    /// Current state
    pub state: OutputState,
    /// Current error classification
    pub error: OutputError,
    /// Message for `state`
    pub status_message: &'static str,
    /// Message for `error`
    pub error_message: &'static str,
    /// Dial attempts made since creation
    pub connect_attempts: u64,
    /// Bytes successfully written since creation
    pub bytes_written: u64,
    /// Chunks dropped: dispatch queue full, or output not connected
    pub dropped_chunks: u64,
}
