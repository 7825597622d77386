//! Host-side registration tracking an agent through its lifecycle.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde::Serialize;

use crate::agent::{ActivationReport, FetchOutcome, LifecycleHandler};
use crate::error::{Error, Result};
use crate::request::Request;

/// Lifecycle states of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Registered, install not yet attempted.
    Uninstalled,
    /// Install signal delivered, pre-caching in progress.
    Installing,
    /// Installed and waiting to activate.
    Installed,
    /// Activate signal delivered, stale stores being purged.
    Activating,
    /// Handling fetches.
    Active,
    /// Install failed. Terminal.
    Redundant,
}

impl LifecycleState {
    /// Whether fetch signals are handled in this state.
    #[must_use]
    pub const fn can_intercept_fetch(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Redundant)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninstalled => "uninstalled",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

/// An agent plus the lifecycle state the host has driven it to.
///
/// Install and activate must each be awaited to completion before the next
/// phase may start. A failed install makes the registration redundant; a
/// failed activation leaves it installed so activation can be retried.
pub struct Registration<H: LifecycleHandler> {
    handler: H,
    state: RwLock<LifecycleState>,
}

impl<H: LifecycleHandler> Registration<H> {
    #[must_use]
    pub const fn new(handler: H) -> Self {
        Self {
            handler,
            state: RwLock::new(LifecycleState::Uninstalled),
        }
    }

    #[must_use]
    pub const fn handler(&self) -> &H {
        &self.handler
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: LifecycleState) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        log::debug!("Lifecycle {} -> {next}", *state);
        *state = next;
    }

    /// Atomically moves from `expected` to `next`, or reports the mismatch.
    fn transition(&self, expected: LifecycleState, next: LifecycleState) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state != expected {
            return Err(Error::InvalidState {
                expected,
                actual: *state,
            });
        }
        log::debug!("Lifecycle {expected} -> {next}");
        *state = next;
        Ok(())
    }

    /// Delivers the install signal and waits for it to settle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless uninstalled, or the handler's
    /// error, in which case the registration becomes redundant.
    pub async fn install(&self) -> Result<()> {
        self.transition(LifecycleState::Uninstalled, LifecycleState::Installing)?;
        match self.handler.on_install().await {
            Ok(()) => {
                self.set_state(LifecycleState::Installed);
                log::info!("Agent installed");
                Ok(())
            }
            Err(e) => {
                self.set_state(LifecycleState::Redundant);
                log::error!("Agent failed to install: {e}");
                Err(e)
            }
        }
    }

    /// Delivers the activate signal and waits for it to settle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless installed, or the handler's
    /// error, in which case the registration returns to installed.
    pub async fn activate(&self) -> Result<ActivationReport> {
        self.transition(LifecycleState::Installed, LifecycleState::Activating)?;
        match self.handler.on_activate().await {
            Ok(report) => {
                self.set_state(LifecycleState::Active);
                log::info!("Agent active on cache {}", report.current);
                Ok(report)
            }
            Err(e) => {
                self.set_state(LifecycleState::Installed);
                log::error!("Agent failed to activate: {e}");
                Err(e)
            }
        }
    }

    /// Routes a request through the agent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless active, or the handler's error.
    pub async fn fetch(&self, request: Request) -> Result<FetchOutcome> {
        let state = self.state();
        if !state.can_intercept_fetch() {
            return Err(Error::InvalidState {
                expected: LifecycleState::Active,
                actual: state,
            });
        }
        self.handler.on_fetch(request).await
    }
}
