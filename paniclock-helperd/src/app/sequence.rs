use crate::domain::sequence::{SequenceRun, SequenceSettings, SequenceState, SequenceTransition};
use crate::ports::executor::PrivilegedExecutor;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    #[error("panic sequence already running")]
    AlreadyRunning,
    #[error("failed to lower biometric timeout: {0}")]
    LowerFailed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Outcome of a run that got past lowering the timeout.
#[derive(Clone, Debug)]
pub struct SequenceReport {
    pub run_id: Uuid,
    pub original_timeout: u32,
    pub read_error: Option<String>,
    pub lock_error: Option<String>,
    pub restore_error: Option<String>,
    pub transitions: Vec<SequenceTransition>,
}

impl SequenceReport {
    pub fn final_state(&self) -> Option<SequenceState> {
        self.transitions.last().map(|transition| transition.to)
    }

    /// Non-fatal problems worth surfacing to the requester.
    pub fn warning(&self) -> Option<String> {
        let parts: Vec<String> = [
            self.lock_error.as_ref().map(|err| format!("lock: {err}")),
            self.restore_error
                .as_ref()
                .map(|err| format!("restore of {}s: {err}", self.original_timeout)),
        ]
        .into_iter()
        .flatten()
        .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}

/// Drives read, lower, lock, wait and restore against a [`PrivilegedExecutor`].
///
/// Clones share the executor and the single-flight guard.
pub struct PanicSequenceEngine<E: PrivilegedExecutor> {
    executor: Arc<E>,
    settings: SequenceSettings,
    in_flight: Arc<Mutex<()>>,
}

impl<E: PrivilegedExecutor> Clone for PanicSequenceEngine<E> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            settings: self.settings,
            in_flight: self.in_flight.clone(),
        }
    }
}

impl<E: PrivilegedExecutor> PanicSequenceEngine<E> {
    pub fn new(executor: Arc<E>, settings: SequenceSettings) -> Self {
        Self {
            executor,
            settings,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    pub fn settings(&self) -> &SequenceSettings {
        &self.settings
    }

    /// Wait for any in-flight run and refuse new ones while the guard lives.
    pub async fn quiesce(&self) -> OwnedMutexGuard<()> {
        self.in_flight.clone().lock_owned().await
    }

    pub async fn execute(&self) -> Result<SequenceReport, SequenceError> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| SequenceError::AlreadyRunning)?;

        let mut run = SequenceRun::start();
        let mut transitions = Vec::new();
        info!(run_id = %run.id(), "panic sequence started");

        step(&mut run, &mut transitions, SequenceState::ReadingTimeout)?;
        let (original, read_error) = match self.executor.read_timeout().await {
            Ok(seconds) => (seconds, None),
            Err(err) => {
                warn!(
                    run_id = %run.id(),
                    error = %err,
                    default = self.settings.default_timeout,
                    "could not read biometric timeout; restoring default afterwards"
                );
                (self.settings.default_timeout, Some(err.to_string()))
            }
        };
        run.capture_original(original)
            .map_err(SequenceError::Internal)?;

        step(&mut run, &mut transitions, SequenceState::LoweringTimeout)?;
        if let Err(err) = self.executor.set_timeout(self.settings.minimum_timeout).await {
            error!(run_id = %run.id(), error = %err, "could not lower biometric timeout; not locking");
            step(&mut run, &mut transitions, SequenceState::Failed)?;
            return Err(SequenceError::LowerFailed(err.to_string()));
        }

        // From here on the timeout is lowered: every path ends in a restore.
        record(&mut run, &mut transitions, SequenceState::Locking);
        let lock_error = match self.executor.trigger_lock().await {
            Ok(()) => None,
            Err(err) => {
                error!(run_id = %run.id(), error = %err, "screen lock failed");
                Some(err.to_string())
            }
        };

        record(&mut run, &mut transitions, SequenceState::Waiting);
        tokio::time::sleep(self.settings.wait).await;

        record(&mut run, &mut transitions, SequenceState::Restoring);
        let restore_error = match self.executor.set_timeout(original).await {
            Ok(()) => None,
            Err(err) => {
                warn!(run_id = %run.id(), original, error = %err, "could not restore biometric timeout");
                Some(err.to_string())
            }
        };
        record(&mut run, &mut transitions, SequenceState::Completed);
        info!(run_id = %run.id(), original, "panic sequence completed");

        Ok(SequenceReport {
            run_id: run.id(),
            original_timeout: original,
            read_error,
            lock_error,
            restore_error,
            transitions,
        })
    }
}

fn step(
    run: &mut SequenceRun,
    transitions: &mut Vec<SequenceTransition>,
    next: SequenceState,
) -> Result<(), SequenceError> {
    let transition = run.advance(next).map_err(SequenceError::Internal)?;
    info!(run_id = %transition.run_id, from = %transition.from, to = %transition.to, "sequence transition");
    transitions.push(transition);
    Ok(())
}

/// Like [`step`], for the stretch where aborting would skip the restore.
fn record(run: &mut SequenceRun, transitions: &mut Vec<SequenceTransition>, next: SequenceState) {
    if let Err(err) = step(run, transitions, next) {
        error!(run_id = %run.id(), error = %err, "sequence bookkeeping failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::executor::ExecutorError;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Call {
        Read,
        Set(u32),
        Lock,
    }

    #[derive(Default)]
    struct FakeExecutor {
        stored: StdMutex<u32>,
        calls: StdMutex<Vec<Call>>,
        fail_read: bool,
        fail_lower: bool,
        fail_lock: bool,
        fail_restore: bool,
    }

    impl FakeExecutor {
        fn with_timeout(seconds: u32) -> Self {
            Self {
                stored: StdMutex::new(seconds),
                ..Self::default()
            }
        }

        fn stored(&self) -> u32 {
            *self.stored.lock().unwrap()
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PrivilegedExecutor for FakeExecutor {
        async fn read_timeout(&self) -> Result<u32, ExecutorError> {
            self.calls.lock().unwrap().push(Call::Read);
            if self.fail_read {
                return Err(ExecutorError::Parse("garbage".into()));
            }
            Ok(self.stored())
        }

        async fn set_timeout(&self, seconds: u32) -> Result<(), ExecutorError> {
            let restoring = self.calls.lock().unwrap().contains(&Call::Set(1));
            self.calls.lock().unwrap().push(Call::Set(seconds));
            let fail = if restoring { self.fail_restore } else { self.fail_lower };
            if fail {
                return Err(ExecutorError::Exit {
                    program: "bioutil".into(),
                    status: "1".into(),
                    output: "denied".into(),
                });
            }
            *self.stored.lock().unwrap() = seconds;
            Ok(())
        }

        async fn trigger_lock(&self) -> Result<(), ExecutorError> {
            self.calls.lock().unwrap().push(Call::Lock);
            if self.fail_lock {
                return Err(ExecutorError::LockUnavailable {
                    preferred: "pmset".into(),
                    fallback: "CGSession".into(),
                });
            }
            Ok(())
        }
    }

    fn engine(executor: FakeExecutor) -> (Arc<FakeExecutor>, PanicSequenceEngine<FakeExecutor>) {
        let executor = Arc::new(executor);
        let engine = PanicSequenceEngine::new(executor.clone(), SequenceSettings::default());
        (executor, engine)
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_restores_original() {
        let (executor, engine) = engine(FakeExecutor::with_timeout(1800));
        let started = tokio::time::Instant::now();
        let report = engine.execute().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(
            executor.calls(),
            vec![Call::Read, Call::Set(1), Call::Lock, Call::Set(1800)]
        );
        assert_eq!(executor.stored(), 1800);
        assert_eq!(report.final_state(), Some(SequenceState::Completed));
        assert_eq!(report.transitions.len(), 6);
        assert!(report.warning().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_timeout_falls_back_to_default() {
        let (executor, engine) = engine(FakeExecutor {
            fail_read: true,
            ..FakeExecutor::with_timeout(600)
        });
        let report = engine.execute().await.unwrap();
        assert_eq!(report.original_timeout, 172_800);
        assert!(report.read_error.is_some());
        assert_eq!(report.transitions[1].to, SequenceState::LoweringTimeout);
        assert_eq!(executor.stored(), 172_800);
    }

    #[tokio::test(start_paused = true)]
    async fn lowering_failure_never_locks() {
        let (executor, engine) = engine(FakeExecutor {
            fail_lower: true,
            ..FakeExecutor::with_timeout(600)
        });
        let err = engine.execute().await.unwrap_err();
        assert!(matches!(err, SequenceError::LowerFailed(_)));
        assert!(!executor.calls().contains(&Call::Lock));
        assert_eq!(executor.stored(), 600);
    }

    #[tokio::test(start_paused = true)]
    async fn lock_failure_still_restores() {
        let (executor, engine) = engine(FakeExecutor {
            fail_lock: true,
            ..FakeExecutor::with_timeout(600)
        });
        let report = engine.execute().await.unwrap();
        assert_eq!(executor.calls().last(), Some(&Call::Set(600)));
        assert_eq!(executor.stored(), 600);
        assert!(report.warning().unwrap().starts_with("lock:"));
    }

    #[tokio::test(start_paused = true)]
    async fn restore_failure_completes_with_warning() {
        let (_executor, engine) = engine(FakeExecutor {
            fail_restore: true,
            ..FakeExecutor::with_timeout(600)
        });
        let report = engine.execute().await.unwrap();
        assert_eq!(report.final_state(), Some(SequenceState::Completed));
        assert!(report.warning().unwrap().contains("restore of 600s"));
    }

    #[tokio::test(start_paused = true)]
    async fn second_concurrent_run_is_refused() {
        let (executor, engine) = engine(FakeExecutor::with_timeout(900));
        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.execute().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            engine.execute().await.unwrap_err(),
            SequenceError::AlreadyRunning
        );
        first.await.unwrap().unwrap();
        assert_eq!(executor.stored(), 900);
        engine.execute().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn quiesce_waits_for_running_sequence() {
        let (executor, engine) = engine(FakeExecutor::with_timeout(42));
        let run = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.execute().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let guard = engine.quiesce().await;
        assert_eq!(executor.stored(), 42);
        assert_eq!(executor.calls().len(), 4);
        assert_eq!(
            engine.execute().await.unwrap_err(),
            SequenceError::AlreadyRunning
        );
        drop(guard);
        run.await.unwrap().unwrap();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]
        #[test]
        fn timeout_round_trips(original in 0u32..(1u32 << 31)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            let (executor, engine) = engine(FakeExecutor::with_timeout(original));
            runtime.block_on(engine.execute()).unwrap();
            prop_assert_eq!(executor.stored(), original);
        }
    }
}
