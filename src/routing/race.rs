/// First-success race over independently spawned branches
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;

/// Run every branch on its own task and return the first `Ok`.
///
/// Branches that lose the race are not cancelled; they run to completion in
/// the background. If every branch fails, all errors are returned in
/// completion order. A branch that panics counts as neither.
pub async fn first_success<I, F, T, E>(branches: I) -> Result<T, Vec<E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let mut pending: FuturesUnordered<_> = branches.into_iter().map(tokio::spawn).collect();
    let mut errors = Vec::new();

    while let Some(joined) = pending.next().await {
        match joined {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => errors.push(e),
            Err(join_error) => log::error!("Race branch aborted: {}", join_error),
        }
    }

    Err(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    async fn after(ms: u64, result: Result<&'static str, &'static str>) -> Result<&'static str, &'static str> {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        result
    }

    #[tokio::test]
    async fn test_fastest_success_wins() {
        let winner = first_success(vec![
            after(80, Ok("slow")),
            after(10, Ok("fast")),
            after(40, Ok("medium")),
        ])
        .await;
        assert_eq!(winner, Ok("fast"));
    }

    #[tokio::test]
    async fn test_early_failure_does_not_win() {
        let winner = first_success(vec![after(5, Err("refused")), after(30, Ok("late"))]).await;
        assert_eq!(winner, Ok("late"));
    }

    #[tokio::test]
    async fn test_all_failures_are_collected() {
        let outcome = first_success(vec![after(20, Err("b")), after(5, Err("a"))]).await;
        assert_eq!(outcome, Err(vec!["a", "b"]));
    }

    #[tokio::test]
    async fn test_losers_keep_running() {
        let finished = Arc::new(AtomicUsize::new(0));
        let branch = |ms: u64, value: &'static str| {
            let finished = Arc::clone(&finished);
            async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(value)
            }
        };

        let winner = first_success(vec![branch(5, "a"), branch(50, "b")]).await;
        assert_eq!(winner, Ok("a"));
        assert_eq!(finished.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    async fn explode() -> Result<u8, ()> {
        panic!("member exploded")
    }

    #[tokio::test]
    async fn test_panicking_branch_is_skipped() {
        let branches: Vec<std::pin::Pin<Box<dyn Future<Output = Result<u8, ()>> + Send>>> = vec![
            Box::pin(explode()),
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(7)
            }),
        ];
        assert_eq!(first_success(branches).await, Ok(7));
    }

    #[tokio::test]
    async fn test_empty_race_fails() {
        let outcome = first_success(Vec::<std::future::Ready<Result<(), ()>>>::new()).await;
        assert_eq!(outcome, Err(vec![]));
    }
}
