//! Scoped release of the session and connection of one execution call.
//!
//! Executors put every resource into a [`ResourceScope`] the moment it is
//! acquired and call [`ResourceScope::release`] exactly once on the way out,
//! whatever the outcome:
//!
//! ```ignore
//! let mut scope = ResourceScope::new();
//! let outcome = run(&mut scope).await;
//! scope.release().await;
//! outcome
//! ```
//!
//! Close failures are logged and never returned. A scope dropped without
//! `release` closes its resources on a spawned task.

use tokio::runtime::Handle;

use crate::backend::{ChannelControl, Connection};

/// Owns the live resources of one execution call.
pub struct ResourceScope<C: Connection> {
    connection: Option<C>,
    control: Option<C::Control>,
    close_stdin: bool,
}

impl<C: Connection> Default for ResourceScope<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connection> ResourceScope<C> {
    /// Create an empty scope.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connection: None,
            control: None,
            close_stdin: false,
        }
    }

    /// Take ownership of a connection.
    pub fn adopt_connection(&mut self, connection: C) -> &mut C {
        self.connection.insert(connection)
    }

    /// Take ownership of a session's control half.
    pub fn adopt_session(&mut self, control: C::Control) -> &mut C::Control {
        self.control.insert(control)
    }

    /// Also close the session's standard input on release.
    pub fn close_stdin_on_release(&mut self) {
        self.close_stdin = true;
    }

    /// The owned connection, if any.
    pub fn connection_mut(&mut self) -> Option<&mut C> {
        self.connection.as_mut()
    }

    /// The owned session, if any.
    pub fn session_mut(&mut self) -> Option<&mut C::Control> {
        self.control.as_mut()
    }

    /// Whether anything is still owned.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.connection.is_none() && self.control.is_none()
    }

    /// Close standard input (if requested), then the session, then the
    /// connection. Each close is attempted regardless of the others.
    pub async fn release(mut self) {
        close_all(self.control.take(), self.connection.take(), self.close_stdin).await;
    }
}

/// A scope dropped before `release` (the owning future was cancelled) hands
/// its resources to a background task on the current runtime.
impl<C: Connection> Drop for ResourceScope<C> {
    fn drop(&mut self) {
        if self.is_empty() {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!("Resource scope dropped outside a runtime; resources not closed");
            return;
        };
        tracing::debug!("Resource scope dropped without release; closing in background");
        runtime.spawn(close_all(
            self.control.take(),
            self.connection.take(),
            self.close_stdin,
        ));
    }
}

async fn close_all<C: Connection>(
    control: Option<C::Control>,
    connection: Option<C>,
    close_stdin: bool,
) {
    if let Some(mut control) = control {
        if close_stdin {
            if let Err(e) = control.close_stdin().await {
                tracing::debug!(error = %e, "Failed to close session input");
            }
        }
        if let Err(e) = control.close().await {
            tracing::debug!(error = %e, "Failed to close SSH session");
        }
    }
    if let Some(mut connection) = connection {
        if let Err(e) = connection.close().await {
            tracing::warn!(error = %e, "Failed to close SSH connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Connector;
    use crate::config::SessionConfig;
    use crate::mock::MockServer;

    #[tokio::test]
    async fn release_closes_session_and_connection_once() {
        let server = MockServer::new();
        let probe = server.probe();
        let mut scope = ResourceScope::new();
        let connection = scope.adopt_connection(
            server
                .connect(&SessionConfig::new("mock"))
                .await
                .unwrap(),
        );
        let (control, _source) = connection.open_session().await.unwrap();
        scope.adopt_session(control);
        scope.close_stdin_on_release();
        scope.release().await;

        let snapshot = probe.snapshot();
        assert_eq!(snapshot.session_closes, 1);
        assert_eq!(snapshot.stdin_closes, 1);
        assert_eq!(snapshot.connection_closes, 1);
    }

    #[tokio::test]
    async fn close_failures_are_swallowed() {
        let server = MockServer::new().fail_close();
        let probe = server.probe();
        let mut scope = ResourceScope::new();
        scope.adopt_connection(server.connect(&SessionConfig::new("mock")).await.unwrap());
        scope.release().await;
        assert_eq!(probe.snapshot().connection_closes, 1);
    }

    #[tokio::test]
    async fn empty_scope_releases_quietly() {
        let scope: ResourceScope<crate::mock::MockConnection> = ResourceScope::new();
        assert!(scope.is_empty());
        scope.release().await;
    }

    #[tokio::test]
    async fn dropped_scope_closes_in_background() {
        let server = MockServer::new();
        let probe = server.probe();
        let mut scope = ResourceScope::new();
        let connection =
            scope.adopt_connection(server.connect(&SessionConfig::new("mock")).await.unwrap());
        let (control, _source) = connection.open_session().await.unwrap();
        scope.adopt_session(control);
        drop(scope);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let snapshot = probe.snapshot();
        assert_eq!(snapshot.session_closes, 1);
        assert_eq!(snapshot.connection_closes, 1);
    }
}
