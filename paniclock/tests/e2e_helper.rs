//! Controller against a real helper listener on a temporary socket.

use async_trait::async_trait;
use paniclock::adapters::{ReplyTimeouts, UnixSocketConnector};
use paniclock::app::{ChannelManager, LifecycleSupervisor, PanicController};
use paniclock::domain::{ActionOutcome, ChannelState, RetryPolicy, WorkerReadiness};
use paniclock::ports::{InstallerError, LocalActions, Notifier, SettingsSource, WorkerInstaller};
use paniclock_helperd::adapters::identity::StaticIdentityTable;
use paniclock_helperd::app::{CodeSignatureAuthenticator, OperationDispatcher, PanicSequenceEngine};
use paniclock_helperd::domain::identity::{ApplicationId, SigningAuthorityId, TrustRequirement};
use paniclock_helperd::domain::sequence::SequenceSettings;
use paniclock_helperd::ports::{ExecutorError, PrivilegedExecutor};
use paniclock_helperd::{bind, serve};
use paniclock_ipc::identifiers::{CONTROLLER_APPLICATION_ID, SIGNING_AUTHORITY_ID};
use paniclock_ipc::{RemoteOperation, RemoteReply};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::UnixListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Default)]
struct MemoryExecutor {
    stored: Mutex<u32>,
    history: Mutex<Vec<u32>>,
    locks: Mutex<u32>,
}

#[async_trait]
impl PrivilegedExecutor for MemoryExecutor {
    async fn read_timeout(&self) -> Result<u32, ExecutorError> {
        Ok(*self.stored.lock().unwrap())
    }

    async fn set_timeout(&self, seconds: u32) -> Result<(), ExecutorError> {
        *self.stored.lock().unwrap() = seconds;
        self.history.lock().unwrap().push(seconds);
        Ok(())
    }

    async fn trigger_lock(&self) -> Result<(), ExecutorError> {
        *self.locks.lock().unwrap() += 1;
        Ok(())
    }
}

struct Helper {
    executor: Arc<MemoryExecutor>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl Helper {
    async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.task.await.unwrap().unwrap();
    }
}

fn start_helper(socket: &Path) -> Helper {
    let executor = Arc::new(MemoryExecutor::default());
    *executor.stored.lock().unwrap() = 600;
    let engine = PanicSequenceEngine::new(
        executor.clone(),
        SequenceSettings {
            wait: Duration::from_millis(20),
            ..SequenceSettings::default()
        },
    );
    let dispatcher = OperationDispatcher::new(executor.clone(), engine);
    let table = StaticIdentityTable::new().allow(
        std::process::id() as i32,
        ApplicationId::new(CONTROLLER_APPLICATION_ID).unwrap(),
        SigningAuthorityId::new(SIGNING_AUTHORITY_ID).unwrap(),
    );
    let authenticator = Arc::new(CodeSignatureAuthenticator::new(
        table,
        TrustRequirement::compiled_in(),
    ));
    let listener = bind(socket, 0o600).unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(serve(listener, authenticator, dispatcher, async move {
        let _ = stopped.await;
    }));
    Helper {
        executor,
        stop: Some(stop),
        task,
    }
}

#[derive(Default)]
struct NoopInstaller;

#[async_trait]
impl WorkerInstaller for NoopInstaller {
    async fn is_installed(&self) -> bool {
        true
    }

    async fn install(&self) -> Result<(), InstallerError> {
        Err(InstallerError::Spawn("not available in tests".into()))
    }

    async fn uninstall(&self) -> Result<(), InstallerError> {
        Ok(())
    }
}

#[derive(Default)]
struct CountingLocal {
    locks: Mutex<u32>,
}

#[async_trait]
impl LocalActions for CountingLocal {
    async fn lock_screen_only(&self) -> anyhow::Result<()> {
        *self.locks.lock().unwrap() += 1;
        Ok(())
    }

    async fn ensure_immediate_lock(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

struct Silent;

#[async_trait]
impl Notifier for Silent {
    async fn play_confirmation(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl SettingsSource for Silent {
    fn confirmation_sound_enabled(&self) -> bool {
        false
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(20), 2.0)
}

struct Rig {
    _dir: TempDir,
    socket: PathBuf,
    channels: Arc<ChannelManager<UnixSocketConnector>>,
    local: Arc<CountingLocal>,
    controller: PanicController<UnixSocketConnector, NoopInstaller>,
}

fn rig() -> Rig {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("helper.sock");
    let channels = Arc::new(ChannelManager::new(UnixSocketConnector::new(
        &socket,
        Duration::from_secs(1),
        ReplyTimeouts {
            reply: Duration::from_secs(1),
            sequence: Duration::from_secs(5),
        },
    )));
    let local = Arc::new(CountingLocal::default());
    let controller = PanicController::new(
        channels.clone(),
        Arc::new(NoopInstaller),
        local.clone(),
        Arc::new(Silent),
        Arc::new(Silent),
        fast_policy(),
    );
    Rig {
        _dir: dir,
        socket,
        channels,
        local,
        controller,
    }
}

#[tokio::test]
async fn trigger_runs_full_sequence_through_helper() {
    let rig = rig();
    let helper = start_helper(&rig.socket);

    let outcome = rig.controller.trigger_panic_lock().await;
    assert_eq!(outcome, ActionOutcome::succeeded());
    assert_eq!(*rig.local.locks.lock().unwrap(), 0);
    assert_eq!(*helper.executor.locks.lock().unwrap(), 1);
    assert_eq!(*helper.executor.history.lock().unwrap(), vec![1, 600]);

    rig.controller.set_timeout(900).await.unwrap();
    assert_eq!(rig.controller.read_timeout().await.unwrap(), 900);
    assert_eq!(rig.channels.snapshot().await.generation, 1);

    helper.stop().await;
}

#[tokio::test]
async fn missing_helper_degrades_to_local_lock_then_recovers() {
    let rig = rig();

    let outcome = rig.controller.trigger_panic_lock().await;
    assert!(outcome.success);
    assert!(outcome.degraded);
    assert_eq!(*rig.local.locks.lock().unwrap(), 1);

    let helper = start_helper(&rig.socket);
    let outcome = rig.controller.trigger_panic_lock().await;
    assert_eq!(outcome, ActionOutcome::succeeded());
    assert_eq!(*rig.local.locks.lock().unwrap(), 1);
    assert_eq!(*helper.executor.locks.lock().unwrap(), 1);

    helper.stop().await;
}

#[tokio::test]
async fn dropped_link_is_replaced_on_next_call() {
    let rig = rig();
    let impostor = UnixListener::bind(&rig.socket).unwrap();
    let first = rig.channels.get_channel().await.unwrap();
    let (stream, _) = impostor.accept().await.unwrap();
    drop(stream);
    drop(impostor);

    let helper = start_helper(&rig.socket);
    let reply = rig
        .channels
        .invoke_with_retry(RemoteOperation::Ping, &fast_policy())
        .await
        .unwrap();
    assert_eq!(reply, RemoteReply::Ping { alive: true });
    let snapshot = rig.channels.snapshot().await;
    assert_eq!(snapshot.state, ChannelState::Connected);
    assert!(snapshot.generation > first.generation);

    helper.stop().await;
}

#[tokio::test]
async fn supervisor_reports_live_helper() {
    let rig = rig();
    let helper = start_helper(&rig.socket);
    let supervisor = LifecycleSupervisor::new(
        Arc::new(NoopInstaller),
        rig.channels.clone(),
        fast_policy(),
    );
    assert_eq!(supervisor.ensure_worker_ready().await, WorkerReadiness::Responsive);
    helper.stop().await;
}

#[tokio::test]
async fn mute_helper_is_declared_dead_within_the_liveness_budget() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("helper.sock");
    let listener = UnixListener::bind(&socket).unwrap();
    let _mute = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    let channels = Arc::new(ChannelManager::new(UnixSocketConnector::new(
        &socket,
        Duration::from_secs(1),
        ReplyTimeouts {
            reply: Duration::from_millis(100),
            sequence: Duration::from_secs(60),
        },
    )));
    let supervisor = LifecycleSupervisor::new(Arc::new(NoopInstaller), channels, fast_policy());

    let started = std::time::Instant::now();
    let readiness = supervisor.ensure_worker_ready().await;
    assert!(matches!(readiness, WorkerReadiness::InstallFailed(_)), "{readiness:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
}
