//! Unix socket front door: authenticate every peer, then serve NDJSON
//! requests until the peer hangs up.

use crate::app::OperationDispatcher;
use crate::domain::identity::PeerCredentials;
use crate::ports::executor::PrivilegedExecutor;
use crate::ports::identity::PeerAuthenticator;
use anyhow::{bail, Context};
use paniclock_ipc::protocol::UNKNOWN_REQUEST_ID;
use paniclock_ipc::{read_frame, write_frame, RemoteReply, ReplyFrame, RequestFrame};
use std::future::Future;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::Path;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

/// Bind `path`, replacing a stale socket left by a previous run.
pub fn bind(path: &Path, mode: u32) -> anyhow::Result<UnixListener> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_socket() => {
            std::fs::remove_file(path)
                .with_context(|| format!("removing stale socket {}", path.display()))?;
        }
        Ok(_) => bail!("{} exists and is not a socket", path.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("inspecting {}", path.display()));
        }
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let listener =
        UnixListener::bind(path).with_context(|| format!("binding {}", path.display()))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("setting mode {mode:o} on {}", path.display()))?;
    info!(path = %path.display(), mode = %format!("{mode:o}"), "listening");
    Ok(listener)
}

/// Accept connections until `shutdown` resolves, then wait for any running
/// panic sequence to finish restoring before returning.
pub async fn serve<A, E, F>(
    listener: UnixListener,
    authenticator: Arc<A>,
    dispatcher: OperationDispatcher<E>,
    shutdown: F,
) -> anyhow::Result<()>
where
    A: PeerAuthenticator + 'static,
    E: PrivilegedExecutor + 'static,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let authenticator = authenticator.clone();
                    let dispatcher = dispatcher.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, authenticator, dispatcher).await;
                    });
                }
                Err(err) => warn!(error = %err, "accept failed"),
            },
        }
    }
    info!("listener stopped; waiting for in-flight sequence");
    let _idle = dispatcher.engine().quiesce().await;
    Ok(())
}

async fn handle_connection<A, E>(
    stream: UnixStream,
    authenticator: Arc<A>,
    dispatcher: OperationDispatcher<E>,
) where
    A: PeerAuthenticator + 'static,
    E: PrivilegedExecutor + 'static,
{
    let peer = match stream.peer_cred() {
        Ok(cred) => PeerCredentials {
            pid: cred.pid(),
            uid: cred.uid(),
            gid: cred.gid(),
        },
        Err(err) => {
            warn!(error = %err, "peer credentials unavailable; closing");
            return;
        }
    };
    // Identity resolution reads files or runs codesign.
    let accepted = tokio::task::spawn_blocking(move || authenticator.verify(&peer))
        .await
        .unwrap_or(false);
    if !accepted {
        return;
    }

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    loop {
        let value = match read_frame::<_, serde_json::Value>(&mut reader).await {
            Ok(Some(value)) => value,
            Ok(None) => break,
            Err(err) if err.is_recoverable() => {
                let reply = ReplyFrame {
                    id: UNKNOWN_REQUEST_ID,
                    reply: RemoteReply::ProtocolError {
                        message: err.to_string(),
                    },
                };
                if write_frame(&mut write_half, &reply).await.is_err() {
                    break;
                }
                continue;
            }
            Err(err) => {
                warn!(pid = ?peer.pid, error = %err, "dropping connection");
                break;
            }
        };
        let reply = match serde_json::from_value::<RequestFrame>(value.clone()) {
            Ok(request) => ReplyFrame {
                id: request.id,
                reply: dispatcher.dispatch(request.operation).await,
            },
            Err(err) => ReplyFrame {
                id: value
                    .get("id")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(UNKNOWN_REQUEST_ID),
                reply: RemoteReply::ProtocolError {
                    message: format!("malformed request: {err}"),
                },
            },
        };
        if let Err(err) = write_frame(&mut write_half, &reply).await {
            debug!(pid = ?peer.pid, error = %err, "peer went away before reply");
            break;
        }
    }
    debug!(pid = ?peer.pid, "connection closed");
}
