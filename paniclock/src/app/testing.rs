//! In-memory fakes shared by the app-layer tests.

use crate::ports::installer::{InstallerError, WorkerInstaller};
use crate::ports::local::{LocalActions, Notifier, SettingsSource};
use crate::ports::transport::{Connector, InvalidationHandle, Transport, TransportError};
use anyhow::anyhow;
use async_trait::async_trait;
use paniclock_ipc::{RemoteOperation, RemoteReply};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct HelperScript {
    pub reachable: bool,
    pub replies: VecDeque<Result<RemoteReply, TransportError>>,
    pub calls: Vec<RemoteOperation>,
    pub connects: u32,
}

/// Connector whose helper is either reachable or not, flipped by tests.
#[derive(Clone, Default)]
pub struct FakeHelper {
    pub script: Arc<Mutex<HelperScript>>,
}

impl FakeHelper {
    pub fn reachable() -> Self {
        let helper = Self::default();
        helper.set_reachable(true);
        helper
    }

    pub fn unreachable() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.script.lock().unwrap().reachable = reachable;
    }

    pub fn push_reply(&self, reply: Result<RemoteReply, TransportError>) {
        self.script.lock().unwrap().replies.push_back(reply);
    }

    pub fn calls(&self) -> Vec<RemoteOperation> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn connects(&self) -> u32 {
        self.script.lock().unwrap().connects
    }
}

struct FakeTransport {
    script: Arc<Mutex<HelperScript>>,
}

fn default_reply(operation: RemoteOperation) -> RemoteReply {
    match operation {
        RemoteOperation::Ping => RemoteReply::Ping { alive: true },
        RemoteOperation::ReadTimeout => RemoteReply::ReadTimeout {
            seconds: 172_800,
            error: None,
        },
        RemoteOperation::SetTimeout { .. } => RemoteReply::SetTimeout {
            ok: true,
            error: None,
        },
        RemoteOperation::ExecuteSequence => RemoteReply::ExecuteSequence {
            ok: true,
            error: None,
            warning: None,
        },
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn call(&mut self, operation: RemoteOperation) -> Result<RemoteReply, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(operation);
        if !script.reachable {
            return Err(TransportError::Interrupted("helper went away".into()));
        }
        script
            .replies
            .pop_front()
            .unwrap_or_else(|| Ok(default_reply(operation)))
    }
}

#[async_trait]
impl Connector for FakeHelper {
    async fn connect(
        &self,
        _invalidation: InvalidationHandle,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.connects += 1;
        if !script.reachable {
            return Err(TransportError::Unreachable("connection refused".into()));
        }
        Ok(Box::new(FakeTransport {
            script: self.script.clone(),
        }))
    }
}

/// Installer that records calls and optionally makes the helper reachable
/// once installed.
pub struct FakeInstaller {
    pub installed: Mutex<bool>,
    pub installs: Mutex<u32>,
    pub uninstalls: Mutex<u32>,
    pub failure: Mutex<Option<InstallerError>>,
    pub helper: Option<FakeHelper>,
}

impl FakeInstaller {
    pub fn new(installed: bool, helper: Option<FakeHelper>) -> Arc<Self> {
        Arc::new(Self {
            installed: Mutex::new(installed),
            installs: Mutex::new(0),
            uninstalls: Mutex::new(0),
            failure: Mutex::new(None),
            helper,
        })
    }

    pub fn fail_with(&self, error: InstallerError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn installs(&self) -> u32 {
        *self.installs.lock().unwrap()
    }

    pub fn uninstalls(&self) -> u32 {
        *self.uninstalls.lock().unwrap()
    }
}

#[async_trait]
impl WorkerInstaller for FakeInstaller {
    async fn is_installed(&self) -> bool {
        *self.installed.lock().unwrap()
    }

    async fn install(&self) -> Result<(), InstallerError> {
        *self.installs.lock().unwrap() += 1;
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        *self.installed.lock().unwrap() = true;
        if let Some(helper) = &self.helper {
            helper.set_reachable(true);
        }
        Ok(())
    }

    async fn uninstall(&self) -> Result<(), InstallerError> {
        *self.uninstalls.lock().unwrap() += 1;
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        *self.installed.lock().unwrap() = false;
        if let Some(helper) = &self.helper {
            helper.set_reachable(false);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingLocal {
    pub locks: Mutex<u32>,
    pub immediate: Mutex<u32>,
    pub lock_fails: bool,
    pub immediate_fails: bool,
    pub immediate_hangs: bool,
}

impl RecordingLocal {
    pub fn locks(&self) -> u32 {
        *self.locks.lock().unwrap()
    }
}

#[async_trait]
impl LocalActions for RecordingLocal {
    async fn lock_screen_only(&self) -> anyhow::Result<()> {
        *self.locks.lock().unwrap() += 1;
        if self.lock_fails {
            return Err(anyhow!("no graphical session"));
        }
        Ok(())
    }

    async fn ensure_immediate_lock(&self) -> anyhow::Result<()> {
        *self.immediate.lock().unwrap() += 1;
        if self.immediate_hangs {
            std::future::pending::<()>().await;
        }
        if self.immediate_fails {
            return Err(anyhow!("sysadminctl denied"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub plays: Mutex<u32>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn play_confirmation(&self) -> anyhow::Result<()> {
        *self.plays.lock().unwrap() += 1;
        Ok(())
    }
}

pub struct Sound(pub bool);

impl SettingsSource for Sound {
    fn confirmation_sound_enabled(&self) -> bool {
        self.0
    }
}
