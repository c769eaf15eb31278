//! Scoped publication of trust store settings
//!
//! While a management channel is in use the configured trust store is
//! published to the session's [`TrustEnv`], and the previous values are
//! restored afterwards. Scopes nest: only the outermost stash captures and
//! only the outermost revert restores.
//!
//! The process environment is only read, once, to seed the session. Child
//! processes receive the applied values through their own environment
//! (`SSL_CERT_FILE` and `SSL_CERT_PASSWORD`).

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::errors::DeployerError;
use crate::security::context::SecurityContext;

/// Environment variable holding the trust store location
pub const TRUST_STORE_ENV: &str = "SSL_CERT_FILE";

/// Environment variable holding the trust store password
pub const TRUST_STORE_PASSWORD_ENV: &str = "SSL_CERT_PASSWORD";

/// Trust store settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustStoreState {
    pub location: Option<String>,
    pub password: Option<String>,
}

/// Where trust store settings live
pub trait TrustEnv: Send + Sync {
    fn read(&self) -> TrustStoreState;

    fn write(&self, state: &TrustStoreState) -> Result<(), DeployerError>;
}

/// Trust store settings held in memory for one deployer session
#[derive(Debug, Default)]
pub struct SessionTrustEnv {
    state: Mutex<TrustStoreState>,
}

impl SessionTrustEnv {
    pub fn new(state: TrustStoreState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Seed from the trust store variables inherited by the process
    pub fn from_process() -> Self {
        Self::new(TrustStoreState {
            location: std::env::var(TRUST_STORE_ENV).ok(),
            password: std::env::var(TRUST_STORE_PASSWORD_ENV).ok(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, TrustStoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TrustEnv for SessionTrustEnv {
    fn read(&self) -> TrustStoreState {
        self.lock().clone()
    }

    fn write(&self, state: &TrustStoreState) -> Result<(), DeployerError> {
        *self.lock() = state.clone();
        Ok(())
    }
}

impl TrustStoreState {
    /// Environment variables handing these settings to a child process
    pub fn child_env(&self) -> Vec<(String, String)> {
        let mut vars = Vec::new();
        if let Some(location) = self.location.as_ref() {
            vars.push((TRUST_STORE_ENV.to_string(), location.clone()));
        }
        if let Some(password) = self.password.as_ref() {
            vars.push((TRUST_STORE_PASSWORD_ENV.to_string(), password.clone()));
        }
        vars
    }
}

#[derive(Debug, Default)]
struct Stash {
    depth: usize,
    saved: Option<TrustStoreState>,
}

/// Stashes, applies and reverts trust store settings
pub struct TrustGuard {
    env: Arc<dyn TrustEnv>,
    stash: Mutex<Stash>,
}

impl TrustGuard {
    pub fn new(env: Arc<dyn TrustEnv>) -> Self {
        Self {
            env,
            stash: Mutex::new(Stash::default()),
        }
    }

    /// Guard over a session seeded from the process environment
    pub fn process() -> Self {
        Self::new(Arc::new(SessionTrustEnv::from_process()))
    }

    /// The settings currently published
    pub fn current(&self) -> TrustStoreState {
        self.env.read()
    }

    fn lock(&self) -> MutexGuard<'_, Stash> {
        self.stash.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Capture the current settings. Nested calls only deepen the scope.
    pub fn stash(&self) {
        let mut stash = self.lock();
        if stash.depth == 0 {
            stash.saved = Some(self.env.read());
            debug!("Stashed trust store settings");
        }
        stash.depth += 1;
    }

    /// Whether a stash is held
    pub fn is_stashed(&self) -> bool {
        self.lock().depth > 0
    }

    /// Publish the context's trust store, if it configures one
    pub fn apply(&self, security: &SecurityContext) -> Result<(), DeployerError> {
        let Some(wanted) = security.trust_store_state() else {
            return Ok(());
        };
        let current = self.env.read();
        let next = TrustStoreState {
            location: wanted.location.or(current.location),
            password: wanted.password.or(current.password),
        };
        self.env.write(&next)
    }

    /// Restore what the outermost stash captured and clear it
    pub fn revert(&self) -> Result<(), DeployerError> {
        let mut stash = self.lock();
        match stash.depth {
            0 => Ok(()),
            1 => {
                stash.depth = 0;
                let saved = stash.saved.take().unwrap_or_default();
                self.env
                    .write(&saved)
                    .map_err(|e| DeployerError::GuardCleanup(e.to_string()))?;
                debug!("Restored trust store settings");
                Ok(())
            }
            _ => {
                stash.depth -= 1;
                Ok(())
            }
        }
    }

    /// Stash and apply in one step. The returned scope reverts.
    pub fn enter(self: &Arc<Self>, security: &SecurityContext) -> Result<TrustScope, DeployerError> {
        self.stash();
        let scope = TrustScope {
            guard: Arc::clone(self),
            active: true,
        };
        if let Err(e) = self.apply(security) {
            return Err(match scope.revert() {
                Ok(()) => e,
                Err(cleanup) => e.with_suppressed(vec![cleanup]),
            });
        }
        Ok(scope)
    }
}

/// A stashed-and-applied trust scope
pub struct TrustScope {
    guard: Arc<TrustGuard>,
    active: bool,
}

impl TrustScope {
    /// Revert the scope, reporting failure to restore
    pub fn revert(mut self) -> Result<(), DeployerError> {
        self.active = false;
        self.guard.revert()
    }
}

impl Drop for TrustScope {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = self.guard.revert() {
                warn!("Trust store settings were not restored: {}", e);
            }
        }
    }
}
