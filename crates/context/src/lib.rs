//! Per-request ambient context: correlation, user, and session identifiers.
//!
//! Values are scoped with a task-local rather than thread-local storage so
//! they survive suspension points and task migration across runtime threads.
//! Entering a nested scope shadows the parent; leaving it restores the
//! parent's values. Workers install the scope from the task envelope before
//! execution, and it is dropped with the scope regardless of outcome.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ambient identifiers for one logical request or task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestScope {
    pub correlation_id: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

impl RequestScope {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            user_id: None,
            session_id: None,
        }
    }

    /// Scope with a freshly generated correlation id.
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Snapshot of the current ambient scope, or a fresh one when called
    /// outside any scope (e.g. a task submitted from a CLI).
    pub fn current_or_generate() -> Self {
        SCOPE
            .try_with(|s| s.clone())
            .unwrap_or_else(|_| Self::generate())
    }
}

tokio::task_local! {
    static SCOPE: RequestScope;
}

/// Run `fut` with `scope` installed as the ambient request scope.
pub async fn scope<F>(scope: RequestScope, fut: F) -> F::Output
where
    F: Future,
{
    SCOPE.scope(scope, fut).await
}

/// Correlation id of the ambient scope, if any.
pub fn correlation_id() -> Option<String> {
    SCOPE.try_with(|s| s.correlation_id.clone()).ok()
}

pub fn user_id() -> Option<String> {
    SCOPE.try_with(|s| s.user_id.clone()).ok().flatten()
}

pub fn session_id() -> Option<String> {
    SCOPE.try_with(|s| s.session_id.clone()).ok().flatten()
}

/// Correlation id rendered for log fields; `"-"` outside a scope.
pub fn correlation_id_or_dash() -> String {
    correlation_id().unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn values_visible_inside_scope_and_cleared_outside() {
        assert!(correlation_id().is_none());

        let ctx = RequestScope::new("cid-1").with_user(Some("u1".into()));
        scope(ctx, async {
            assert_eq!(correlation_id().as_deref(), Some("cid-1"));
            assert_eq!(user_id().as_deref(), Some("u1"));
            assert!(session_id().is_none());
        })
        .await;

        assert!(correlation_id().is_none());
    }

    #[tokio::test]
    async fn nested_scope_shadows_then_restores_parent() {
        scope(RequestScope::new("outer"), async {
            assert_eq!(correlation_id().as_deref(), Some("outer"));

            scope(RequestScope::new("inner"), async {
                assert_eq!(correlation_id().as_deref(), Some("inner"));
            })
            .await;

            assert_eq!(correlation_id().as_deref(), Some("outer"));
        })
        .await;
    }

    #[tokio::test]
    async fn scope_survives_suspension_points() {
        scope(RequestScope::new("across-await"), async {
            tokio::task::yield_now().await;
            assert_eq!(correlation_id().as_deref(), Some("across-await"));
        })
        .await;
    }

    #[tokio::test]
    async fn concurrent_tasks_do_not_leak_between_scopes() {
        let a = tokio::spawn(scope(RequestScope::new("task-a"), async {
            tokio::task::yield_now().await;
            correlation_id()
        }));
        let b = tokio::spawn(scope(RequestScope::new("task-b"), async {
            tokio::task::yield_now().await;
            correlation_id()
        }));

        assert_eq!(a.await.unwrap().as_deref(), Some("task-a"));
        assert_eq!(b.await.unwrap().as_deref(), Some("task-b"));
    }
}
