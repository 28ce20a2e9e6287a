use crate::config::EnrichConfig;
use crate::pipeline::PipelineError;
use std::{future::Future, time::Duration};
use tokio::time::timeout;
use tracing::warn;

/// Wall-clock deadline around one whole enrichment, with a fresh attempt on
/// expiry. Lives at the invocation boundary; the pipeline never sees it.
#[derive(Debug, Clone, Copy)]
pub struct DeadlinePolicy {
    pub deadline: Duration,
    pub retries: u32,
}

impl DeadlinePolicy {
    pub fn from_config(config: &EnrichConfig) -> Self {
        Self {
            deadline: config.deadline,
            retries: config.deadline_retries,
        }
    }

    /// Only a deadline expiry is retried; any result the attempt produces,
    /// error or not, is returned as-is.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let mut tries = 0u32;
        loop {
            tries += 1;
            match timeout(self.deadline, attempt()).await {
                Ok(result) => return result,
                Err(_) if tries <= self.retries => {
                    warn!(
                        target = "enrich.pipeline",
                        attempt = tries,
                        deadline_ms = self.deadline.as_millis() as u64,
                        "deadline_exceeded_retrying"
                    );
                }
                Err(_) => {
                    return Err(PipelineError::timeout(
                        "deadline",
                        format!(
                            "no result within {}ms after {tries} attempt(s)",
                            self.deadline.as_millis()
                        ),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::sleep;

    fn policy(retries: u32) -> DeadlinePolicy {
        DeadlinePolicy {
            deadline: Duration::from_millis(20),
            retries,
        }
    }

    #[tokio::test]
    async fn second_attempt_after_deadline_succeeds() {
        let calls = AtomicU32::new(0);
        let result = policy(1)
            .run(|| {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call == 0 {
                        sleep(Duration::from_secs(5)).await;
                    }
                    Ok::<_, PipelineError>(call)
                }
            })
            .await;
        assert_eq!(result.expect("second attempt"), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_with_timeout_at_deadline_phase() {
        let calls = AtomicU32::new(0);
        let err = policy(1)
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    sleep(Duration::from_secs(5)).await;
                    Ok::<(), PipelineError>(())
                }
            })
            .await
            .expect_err("must time out");
        assert_eq!(err.kind(), PipelineErrorKind::Timeout);
        assert_eq!(err.phase(), "deadline");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = policy(3)
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(PipelineError::not_found("load_product", "gone")) }
            })
            .await
            .expect_err("not found");
        assert_eq!(err.kind(), PipelineErrorKind::NotFound);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reads_deadline_from_config() {
        let config = EnrichConfig::from_lookup(|key| match key {
            "ENRICH_DEADLINE_SECS" => Some("30".into()),
            "ENRICH_DEADLINE_RETRIES" => Some("0".into()),
            _ => None,
        });
        let policy = DeadlinePolicy::from_config(&config);
        assert_eq!(policy.deadline, Duration::from_secs(30));
        assert_eq!(policy.retries, 0);
    }
}
