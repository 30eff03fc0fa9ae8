//! Per-job "current acting user".
//!
//! Helper code that runs inside a workflow step sometimes needs to know which
//! user it is acting for (to attribute external calls or log lines). The
//! context lives in task-local storage installed by [`scope`], so two jobs
//! running concurrently on the same runtime each see only their own
//! [`JobContext`].

use std::future::Future;

use crate::job_context::JobContext;
use crate::types::UserId;

tokio::task_local! {
    static ACTING_JOB: JobContext;
}

/// Run `fut` with `ctx` installed as the acting job.
///
/// Scopes nest; the innermost one wins. Tasks spawned from inside the scope
/// do not inherit it and must open their own.
pub async fn scope<F>(ctx: JobContext, fut: F) -> F::Output
where
    F: Future,
{
    ACTING_JOB.scope(ctx, fut).await
}

/// The job context of the surrounding [`scope`], if any.
pub fn current() -> Option<JobContext> {
    ACTING_JOB.try_with(Clone::clone).ok()
}

/// The user the surrounding job acts for, if any.
pub fn current_user_id() -> Option<UserId> {
    ACTING_JOB.try_with(JobContext::user_id).ok()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn no_scope_means_no_user() {
        assert!(current().is_none());
        assert!(current_user_id().is_none());
    }

    #[tokio::test]
    async fn scope_exposes_context() {
        let ctx = JobContext::new(Some(11), 90).unwrap();
        let seen = scope(ctx.clone(), async { current() }).await;
        assert_eq!(seen, Some(ctx));
        assert!(current_user_id().is_none(), "scope must not leak");
    }

    #[tokio::test]
    async fn nested_scope_overrides_outer() {
        let outer = JobContext::new(Some(1), 1).unwrap();
        let inner = JobContext::new(Some(2), 2).unwrap();

        let (in_inner, after_inner) = scope(outer, async move {
            let in_inner = scope(inner, async { current_user_id() }).await;
            (in_inner, current_user_id())
        })
        .await;

        assert_eq!(in_inner, Some(2));
        assert_eq!(after_inner, Some(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_jobs_keep_their_own_user() {
        let mut handles = Vec::new();
        for user in 1..=16 {
            let ctx = JobContext::new(Some(user), user * 10).unwrap();
            handles.push(tokio::spawn(scope(ctx, async move {
                let mut seen = Vec::new();
                for _ in 0..5 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    seen.push(current_user_id());
                }
                (user, seen)
            })));
        }

        for handle in handles {
            let (user, seen) = handle.await.unwrap();
            assert!(seen.iter().all(|s| *s == Some(user)));
        }
    }
}
