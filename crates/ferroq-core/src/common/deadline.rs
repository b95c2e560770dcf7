use crate::{Error, Result};
use core::{future::Future, time::Duration};

/// Runs `fut` under `deadline`.
///
/// On expiry the future is dropped and [`Error::Timeout`] naming `operation`
/// is returned. Nothing is retried here.
pub async fn with_deadline<F, T>(operation: &'static str, deadline: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(res) => res,
        Err(_) => {
            tracing::warn!(operation, ?deadline, "operation exceeded its deadline");
            Err(Error::Timeout { operation })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expires_slow_operations() {
        let res: Result<()> = with_deadline("slow", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;
        assert!(matches!(res, Err(Error::Timeout { operation: "slow" })));
    }

    #[tokio::test]
    async fn passes_through_results() {
        let res = with_deadline("fast", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(res.unwrap(), 7);
    }
}
