//! Session lifecycle state machine shared by both stream ends.
//!
//! ```text
//!  Idle ──► Starting ──► Running ──► Stopping ──► Idle
//!    ▲          │
//!    └──────────┘  (start failure)
//! ```
//!
//! The sender's broadcast engine and the receiver's stream client both
//! publish their phase through [`SharedPhase`], an atomic wrapper that
//! can be read from any task. Stopping an already-stopped session is a
//! no-op, never a fault.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::BeamError;

// ── SessionPhase ─────────────────────────────────────────────────

/// The current phase of a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SessionPhase {
    /// No active session. Initial / terminal state.
    #[default]
    Idle = 0,
    /// Acquiring the transport resource (bind or connect).
    Starting = 1,
    /// Engine loops are live.
    Running = 2,
    /// Cooperative shutdown in progress.
    Stopping = 3,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::Stopping => write!(f, "Stopping"),
        }
    }
}

impl SessionPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Idle,
        }
    }
}

// ── SharedPhase ──────────────────────────────────────────────────

/// Atomic, task-shareable holder of a [`SessionPhase`].
#[derive(Debug, Default)]
pub struct SharedPhase(AtomicU8);

impl SharedPhase {
    /// Start out `Idle`.
    pub fn new() -> Self {
        Self(AtomicU8::new(SessionPhase::Idle as u8))
    }

    /// The current phase.
    pub fn get(&self) -> SessionPhase {
        SessionPhase::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Whether the session is fully up.
    pub fn is_running(&self) -> bool {
        self.get() == SessionPhase::Running
    }

    /// Transition `Idle → Starting`.
    ///
    /// Fails when a session is already starting, running, or stopping.
    pub fn begin_start(&self) -> Result<(), BeamError> {
        self.0
            .compare_exchange(
                SessionPhase::Idle as u8,
                SessionPhase::Starting as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(|_| BeamError::InvalidTransition("cannot start: session not idle"))
    }

    /// Transition `Starting → Running`.
    pub fn mark_running(&self) -> Result<(), BeamError> {
        self.0
            .compare_exchange(
                SessionPhase::Starting as u8,
                SessionPhase::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(|_| BeamError::InvalidTransition("cannot run: session not starting"))
    }

    /// Transition `Running → Stopping` (or `Starting → Stopping`).
    ///
    /// Returns `false` when the session is already stopping or idle, so
    /// repeated stop calls collapse into a no-op.
    pub fn begin_stop(&self) -> bool {
        for from in [SessionPhase::Running, SessionPhase::Starting] {
            if self
                .0
                .compare_exchange(
                    from as u8,
                    SessionPhase::Stopping as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
            {
                return true;
            }
        }
        false
    }

    /// Force-reset to `Idle` regardless of current phase.
    ///
    /// Used on start failure and at the end of every teardown path.
    pub fn force_idle(&self) {
        self.0.store(SessionPhase::Idle as u8, Ordering::SeqCst);
    }
}

// ── Tests ────────────────────────────────────────────────────────
