//! Unix socket transport for the control channel
//!
//! One JSON request per line, one reply line each. Client tasks forward
//! requests to the control loop and wait for its answer on a oneshot.

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{encode_reply, parse_request, ControlReply, ControlRequest};

/// Longest accepted request line
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// A request waiting for the control loop
#[derive(Debug)]
pub struct ControlCommand {
    pub request: ControlRequest,
    pub reply: oneshot::Sender<ControlReply>,
}

/// Environment that decides the socket path
struct SocketEnv {
    deckview_socket: Option<String>,
    xdg_runtime_dir: Option<String>,
}

impl SocketEnv {
    fn from_env() -> Self {
        Self {
            deckview_socket: std::env::var("DECKVIEW_SOCKET").ok(),
            xdg_runtime_dir: std::env::var("XDG_RUNTIME_DIR").ok(),
        }
    }
}

/// Socket path, in priority order:
/// 1. configured path
/// 2. `$DECKVIEW_SOCKET`
/// 3. `$XDG_RUNTIME_DIR/deckview/control.sock`
/// 4. `/tmp/deckview-$UID/control.sock`
///
/// The runtime directory is created owner-only when it is used.
pub fn socket_path(configured: Option<&Path>) -> PathBuf {
    if let Some(path) = configured {
        return path.to_path_buf();
    }
    let env = SocketEnv::from_env();
    let path = resolve_socket_path(&env);

    if env.deckview_socket.is_none() {
        let dir = resolve_runtime_dir(env.xdg_runtime_dir.as_deref());
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!("Failed to create socket directory {}: {}", dir.display(), e);
        } else {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700)) {
                warn!("Failed to restrict socket directory: {}", e);
            }
        }
    }
    path
}

fn resolve_socket_path(env: &SocketEnv) -> PathBuf {
    if let Some(ref path) = env.deckview_socket {
        return PathBuf::from(path);
    }
    resolve_runtime_dir(env.xdg_runtime_dir.as_deref()).join("control.sock")
}

fn resolve_runtime_dir(xdg_runtime_dir: Option<&str>) -> PathBuf {
    if let Some(xdg) = xdg_runtime_dir {
        return PathBuf::from(xdg).join("deckview");
    }
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/deckview-{uid}"))
}

/// Listening control socket. Dropping it stops accepting and removes the
/// socket file.
pub struct ControlServer {
    path: PathBuf,
    task: JoinHandle<()>,
}

impl ControlServer {
    /// Bind and start accepting. Must be called inside the runtime.
    pub fn bind(path: PathBuf, commands: mpsc::Sender<ControlCommand>) -> Result<Self> {
        // Stale socket from a previous run
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)
            .with_context(|| format!("Failed to bind {}", path.display()))?;

        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        info!("Control socket listening on {}", path.display());
        let task = tokio::spawn(accept_loop(listener, commands));
        Ok(Self { path, task })
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.task.abort();
        let _ = std::fs::remove_file(&self.path);
    }
}

async fn accept_loop(listener: UnixListener, commands: mpsc::Sender<ControlCommand>) {
    let my_uid = unsafe { libc::getuid() };
    loop {
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!("Control socket accept failed: {}", e);
                continue;
            }
        };

        match stream.peer_cred() {
            Ok(cred) if cred.uid() == my_uid || my_uid == 0 => {}
            Ok(cred) => {
                warn!("Rejected control client with UID {}", cred.uid());
                continue;
            }
            Err(e) => {
                warn!("Failed to get peer credentials: {}", e);
                continue;
            }
        }

        let commands = commands.clone();
        tokio::spawn(async move {
            match handle_client(stream, commands).await {
                Ok(()) => debug!("Control client disconnected"),
                Err(e) => debug!("Control client dropped: {}", e),
            }
        });
    }
}

async fn handle_client(stream: UnixStream, commands: mpsc::Sender<ControlCommand>) -> Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let reply = if line.len() > MAX_LINE_LENGTH {
            ControlReply::Nak {
                error: format!("request longer than {} bytes", MAX_LINE_LENGTH),
            }
        } else {
            match parse_request(line) {
                Ok(request) => forward(&commands, request).await?,
                Err(e) => ControlReply::Nak {
                    error: format!("invalid request: {}", e),
                },
            }
        };

        write.write_all(encode_reply(&reply)?.as_bytes()).await?;
    }
    Ok(())
}

async fn forward(
    commands: &mpsc::Sender<ControlCommand>,
    request: ControlRequest,
) -> Result<ControlReply> {
    let (reply, answer) = oneshot::channel();
    commands
        .send(ControlCommand { request, reply })
        .await
        .map_err(|_| anyhow!("control loop stopped"))?;
    answer.await.context("control loop dropped the request")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_env_override() {
        let env = SocketEnv {
            deckview_socket: Some("/custom/control.sock".into()),
            xdg_runtime_dir: Some("/run/user/1000".into()),
        };
        assert_eq!(resolve_socket_path(&env), PathBuf::from("/custom/control.sock"));
    }

    #[test]
    fn test_resolve_xdg_runtime_dir() {
        let env = SocketEnv {
            deckview_socket: None,
            xdg_runtime_dir: Some("/run/user/1000".into()),
        };
        assert_eq!(
            resolve_socket_path(&env),
            PathBuf::from("/run/user/1000/deckview/control.sock")
        );
    }

    #[test]
    fn test_runtime_dir_falls_back_to_tmp() {
        let uid = unsafe { libc::getuid() };
        assert_eq!(resolve_runtime_dir(None), PathBuf::from(format!("/tmp/deckview-{uid}")));
    }

    #[test]
    fn test_configured_path_wins() {
        let path = socket_path(Some(Path::new("/srv/deck.sock")));
        assert_eq!(path, PathBuf::from("/srv/deck.sock"));
    }

    #[tokio::test]
    async fn test_round_trip_over_socket() {
        let path = std::env::temp_dir().join(format!("deckview-test-{}.sock", std::process::id()));
        let (tx, mut rx) = mpsc::channel(4);
        let server = ControlServer::bind(path.clone(), tx).unwrap();

        // Answer like the control loop would
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                let reply = match command.request {
                    ControlRequest::GetHelp => ControlReply::ReturnHelp { help: "usage".into() },
                    _ => ControlReply::Ack,
                };
                let _ = command.reply.send(reply);
            }
        });

        let stream = UnixStream::connect(server.path()).await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        write.write_all(b"{\"type\":\"get_help\"}\n").await.unwrap();
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            r#"{"type":"return_help","help":"usage"}"#
        );

        write.write_all(b"garbage\n").await.unwrap();
        let nak = lines.next_line().await.unwrap().unwrap();
        assert!(nak.starts_with(r#"{"type":"nak","error":"invalid request"#));

        drop(server);
        assert!(!path.exists());
    }
}
