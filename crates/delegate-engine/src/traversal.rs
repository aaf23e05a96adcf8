//! Chain traversal strategies
//!
//! ADD and CHECK stop at the first failure; DEL and rollback visit every
//! element in reverse and collect the failures.

use std::future::Future;

/// Where a fail-fast traversal stopped
#[derive(Debug)]
pub struct Halted<T, E> {
    /// Index of the failing element
    pub index: usize,
    pub error: E,
    /// Outputs of elements `0..index`
    pub completed: Vec<T>,
}

/// Run `step` over `items` in order, stopping at the first error
pub async fn fail_fast<'a, D, T, E, F, Fut>(items: &'a [D], mut step: F) -> Result<Vec<T>, Halted<T, E>>
where
    F: FnMut(usize, &'a D) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut completed = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match step(index, item).await {
            Ok(output) => completed.push(output),
            Err(error) => {
                return Err(Halted {
                    index,
                    error,
                    completed,
                });
            }
        }
    }
    Ok(completed)
}

/// Run `step` over `items` from last to first, attempting every element
///
/// Failures are returned with their index, in visiting order.
pub async fn best_effort_reverse<'a, D, E, F, Fut>(items: &'a [D], mut step: F) -> Vec<(usize, E)>
where
    F: FnMut(usize, &'a D) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let mut failures = Vec::new();
    for (index, item) in items.iter().enumerate().rev() {
        if let Err(error) = step(index, item).await {
            failures.push((index, error));
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::ready;

    #[tokio::test]
    async fn test_fail_fast_reports_completed_prefix() {
        let items = [1, 2, 3, 4];
        let mut visited = Vec::new();
        let halted = fail_fast(&items, |i, n| {
            visited.push(i);
            ready(if *n == 3 { Err("three") } else { Ok(n * 10) })
        })
        .await
        .unwrap_err();
        assert_eq!(halted.index, 2);
        assert_eq!(halted.error, "three");
        assert_eq!(halted.completed, [10, 20]);
        assert_eq!(visited, [0, 1, 2]);
    }

    #[tokio::test]
    async fn test_fail_fast_all_ok() {
        let items = ["a", "b"];
        let out = fail_fast(&items, |_, s| ready(Ok::<_, ()>(s.len()))).await.unwrap();
        assert_eq!(out, [1, 1]);
    }

    #[tokio::test]
    async fn test_best_effort_visits_everything_in_reverse() {
        let items = [0, 1, 2, 3];
        let mut visited = Vec::new();
        let failures = best_effort_reverse(&items, |i, n| {
            visited.push(i);
            ready(if n % 2 == 1 { Err(*n) } else { Ok(()) })
        })
        .await;
        assert_eq!(visited, [3, 2, 1, 0]);
        assert_eq!(failures, [(3, 3), (1, 1)]);
    }

    #[tokio::test]
    async fn test_best_effort_empty_prefix() {
        let items: [u8; 0] = [];
        let failures = best_effort_reverse(&items, |_, _| ready(Err::<(), _>("never"))).await;
        assert!(failures.is_empty());
    }
}
