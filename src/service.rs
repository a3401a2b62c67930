//! Service lifecycle.
//!
//! [`Service`] owns the HTTP listener. A shell calls [`Service::start`] and
//! [`Service::stop`] and polls [`Service::status`] (or watches
//! [`Service::subscribe`]) to show whether sharing is on and where.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::auth::SessionGate;
use crate::config::Config;
use crate::error::ServiceError;
use crate::routes::create_router;
use crate::storage::{StorageRoots, discover};

/// How long `stop` waits for in-flight requests before aborting the listener.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Snapshot of the listener's state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceState {
    pub running: bool,
    /// Port of the current or most recent listener, 0 before the first start.
    pub port: u16,
    pub bound_address: Option<SocketAddr>,
}

struct Listener {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    port: u16,
}

/// The file-sharing service.
pub struct Service {
    config: Config,
    roots: StorageRoots,
    sessions: SessionGate,
    state: Arc<watch::Sender<ServiceState>>,
    listener: Mutex<Option<Listener>>,
    generation: Arc<AtomicU64>,
}

impl Service {
    /// Create a stopped service sharing `roots`.
    pub fn new(config: Config, roots: StorageRoots) -> Self {
        let sessions = SessionGate::new(config.username.clone(), config.password.clone());
        let (state, _) = watch::channel(ServiceState::default());
        Self {
            config,
            roots,
            sessions,
            state: Arc::new(state),
            listener: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a stopped service over the configured roots, or the discovered
    /// ones when none are configured.
    pub fn with_discovery(config: Config) -> Self {
        let roots = if config.roots.is_empty() {
            discover(&config.storage)
        } else {
            StorageRoots::from_specs(&config.roots)
        };
        Self::new(config, roots)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn roots(&self) -> &StorageRoots {
        &self.roots
    }

    pub fn sessions(&self) -> &SessionGate {
        &self.sessions
    }

    /// Bind `port` and serve on a background task.
    ///
    /// Returns once the socket is bound. On error nothing is left running
    /// and the state is unchanged.
    pub async fn start(&self, port: u16) -> Result<SocketAddr, ServiceError> {
        let mut listener = self.listener.lock().await;

        if let Some(current) = listener.as_ref() {
            if !current.task.is_finished() {
                return Err(ServiceError::AlreadyRunning(current.port));
            }
            *listener = None;
        }

        if port == 0 {
            return Err(ServiceError::InvalidPort("0".to_string()));
        }
        if self.roots.is_empty() {
            return Err(ServiceError::NoStorageRoots);
        }

        let ip: IpAddr = self.config.bind.parse().map_err(|_| {
            ServiceError::Bind(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid bind address {:?}", self.config.bind),
            ))
        })?;

        let tcp = TcpListener::bind(SocketAddr::new(ip, port))
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AddrInUse => ServiceError::PortInUse(port),
                _ => ServiceError::Bind(e),
            })?;
        let addr = tcp.local_addr().map_err(ServiceError::Bind)?;

        let app = create_router(AppState::with_sessions(
            self.config.clone(),
            self.roots.clone(),
            self.sessions.clone(),
        ));

        let cancel = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let task = {
            let shutdown = cancel.clone().cancelled_owned();
            let state = self.state.clone();
            let current_generation = self.generation.clone();
            tokio::spawn(async move {
                if let Err(e) = axum::serve(tcp, app)
                    .with_graceful_shutdown(shutdown)
                    .await
                {
                    error!("Listener on {} failed: {}", addr, e);
                }
                // A newer start owns the state now.
                if current_generation.load(Ordering::SeqCst) == generation {
                    state.send_replace(ServiceState {
                        running: false,
                        port,
                        bound_address: None,
                    });
                }
                debug!("Listener on {} exited", addr);
            })
        };

        self.state.send_replace(ServiceState {
            running: true,
            port,
            bound_address: Some(addr),
        });
        *listener = Some(Listener { cancel, task, port });

        info!("Sharing {} root(s) on http://{}", self.roots.len(), addr);
        Ok(addr)
    }

    /// Stop the listener. A no-op when already stopped.
    pub async fn stop(&self) {
        let mut listener = self.listener.lock().await;
        let Some(Listener {
            cancel,
            mut task,
            port,
        }) = listener.take()
        else {
            return;
        };

        self.generation.fetch_add(1, Ordering::SeqCst);
        cancel.cancel();

        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            warn!("Listener did not drain within {:?}, aborting", SHUTDOWN_GRACE);
            task.abort();
        }

        self.state.send_replace(ServiceState {
            running: false,
            port,
            bound_address: None,
        });
        info!("Stopped sharing on port {}", port);
    }

    /// Current state.
    pub fn status(&self) -> ServiceState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<ServiceState> {
        self.state.subscribe()
    }

    /// URL other devices on the network can open, while running.
    pub fn access_url(&self) -> Option<String> {
        let addr = self.status().bound_address?;
        let ip = if addr.ip().is_unspecified() {
            local_ipv4().map(IpAddr::V4).unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
        } else {
            addr.ip()
        };
        Some(format!("http://{}", SocketAddr::new(ip, addr.port())))
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.cancel.cancel();
        }
    }
}

/// The IPv4 address this host uses to reach other networks.
///
/// Connecting a UDP socket picks a route without sending anything.
pub fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}
