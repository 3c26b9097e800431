//! # stowaged
//!
//! Privileged store service for machine-wide implementation caches.
//!
//! Clients read the store directory themselves; only writes need to go
//! through this service. Every submitted tree is re-verified through
//! the normal store path, so the service never has to trust a client's
//! digest claim: mismatched content is rejected no matter who sent it.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info, warn};

use stowage_config::logging::init_logging;
use stowage_config::{log_service_debug, log_service_warn, Config};
use stowage_ipc::{read_frame, write_frame, ErrorKind, IpcError, Request, Response};
use stowage_manifest::ManifestDigest;
use stowage_store::{error_to_wire, AddProgress, DirectoryStore, Store, StoreError};

/// Store service daemon.
#[derive(Parser)]
#[command(name = "stowaged", version, about, long_about = None)]
struct Cli {
    /// Socket to listen on.
    #[arg(long, value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Store directory to manage.
    #[arg(long, value_name = "DIR")]
    store: Option<PathBuf>,

    /// Log verbosity: error, warn, info, debug or trace.
    #[arg(long, default_value = "info", value_name = "LEVEL")]
    log_level: String,

    /// Stay attached to the terminal instead of forking.
    #[arg(long)]
    foreground: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = Config::load().context("loading configuration")?;
    let socket = cli.socket.unwrap_or(config.service.socket);
    let store_dir = cli.store.unwrap_or(config.stores.system_dir);

    let store = DirectoryStore::new(&store_dir)
        .with_context(|| format!("opening store {}", store_dir.display()))?;
    let listener = bind_socket(&socket)?;
    info!(
        socket = %socket.display(),
        store = %store.path().display(),
        "stowaged listening"
    );

    if !cli.foreground {
        daemonize()?;
    }
    serve(listener, Arc::new(store));
    Ok(())
}

fn bind_socket(socket: &Path) -> Result<UnixListener> {
    if let Some(dir) = socket.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating socket directory {}", dir.display()))?;
    }
    match fs::remove_file(socket) {
        Ok(()) => debug!(socket = %socket.display(), "removed stale socket"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).context("removing stale socket"),
    }
    let listener =
        UnixListener::bind(socket).with_context(|| format!("binding {}", socket.display()))?;
    // any local user may submit; content is verified per request
    fs::set_permissions(socket, fs::Permissions::from_mode(0o666))?;
    Ok(listener)
}

/// Detach from the terminal: double fork, new session, stdio to
/// /dev/null. The socket is already bound, so clients never race the
/// fork.
fn daemonize() -> Result<()> {
    fork_and_exit_parent()?;
    if unsafe { libc::setsid() } == -1 {
        return Err(io::Error::last_os_error()).context("setsid");
    }
    fork_and_exit_parent()?;
    let devnull = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")?;
    unsafe {
        libc::dup2(devnull.as_raw_fd(), 0);
        libc::dup2(devnull.as_raw_fd(), 1);
        libc::dup2(devnull.as_raw_fd(), 2);
    }
    Ok(())
}

fn fork_and_exit_parent() -> Result<()> {
    match unsafe { libc::fork() } {
        -1 => Err(io::Error::last_os_error()).context("fork"),
        0 => Ok(()),
        _ => process::exit(0),
    }
}

fn serve(listener: UnixListener, store: Arc<DirectoryStore>) {
    let service_uid = unsafe { libc::getuid() };
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let store = store.clone();
                thread::spawn(move || handle_connection(stream, &store, service_uid));
            }
            Err(e) => error!(error = %e, "accept failed"),
        }
    }
}

fn handle_connection(mut stream: UnixStream, store: &DirectoryStore, service_uid: u32) {
    let peer = PeerCredentials::from_stream(&stream);
    match &peer {
        Some(peer) => {
            log_service_debug!("client connected", uid = peer.uid, gid = peer.gid, pid = peer.pid)
        }
        None => warn!("client connected without readable credentials"),
    }
    loop {
        let request: Request = match read_frame(&mut stream) {
            Ok(request) => request,
            Err(IpcError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => return,
            Err(e) => {
                warn!(error = %e, "dropping client after unreadable frame");
                return;
            }
        };
        let response = handle_request(store, &request, peer.as_ref(), service_uid);
        if let Err(e) = write_frame(&mut stream, &response) {
            warn!(error = %e, "failed to send response");
            return;
        }
    }
}

fn handle_request(
    store: &DirectoryStore,
    request: &Request,
    peer: Option<&PeerCredentials>,
    service_uid: u32,
) -> Response {
    match request {
        Request::Ping => Response::Pong {
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        Request::AddDirectory { source, digest_id } => {
            let Some(peer) = peer else {
                return denied("peer credentials unavailable");
            };
            info!(
                uid = peer.uid,
                pid = peer.pid,
                digest = %digest_id,
                source = %source.display(),
                "add requested"
            );
            let digest = ManifestDigest::parse(digest_id);
            match store.add_dir(source, &digest, &mut AddProgress::default()) {
                Ok(path) => Response::Added { path },
                Err(e) => error_response(e),
            }
        }
        Request::Remove { digest_id } => {
            let Some(peer) = peer else {
                return denied("peer credentials unavailable");
            };
            // anyone may add verified content; only root or the
            // service account may take it away from other users
            if peer.uid != 0 && peer.uid != service_uid {
                log_service_warn!("removal denied", uid = peer.uid, digest = digest_id.as_str());
                return denied("only root may remove system implementations");
            }
            info!(uid = peer.uid, digest = %digest_id, "remove requested");
            let digest = ManifestDigest::parse(digest_id);
            match store.remove(&digest) {
                Ok(()) => Response::Removed,
                Err(e) => error_response(e),
            }
        }
    }
}

fn error_response(error: StoreError) -> Response {
    let (kind, message) = error_to_wire(&error);
    Response::Error { kind, message }
}

fn denied(message: &str) -> Response {
    Response::Error {
        kind: ErrorKind::Unauthorized,
        message: message.to_string(),
    }
}

#[derive(Debug, Clone, Copy)]
struct PeerCredentials {
    uid: u32,
    gid: u32,
    pid: i32,
}

impl PeerCredentials {
    #[cfg(target_os = "linux")]
    fn from_stream(stream: &UnixStream) -> Option<Self> {
        let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockopt(
                stream.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                &mut cred as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };
        (ret == 0).then(|| PeerCredentials {
            uid: cred.uid,
            gid: cred.gid,
            pid: cred.pid,
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn from_stream(_stream: &UnixStream) -> Option<Self> {
        None
    }
}
