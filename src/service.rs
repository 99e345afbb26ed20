//! Accept loop, bounded work queue and worker pool.
//!
//! ```text
//! Acceptor --accept--> ThreatMonitor::classify --queue--> worker 0..N
//!                                                        SecureChannel::accept
//!                                                          |
//!                                                 spawn handler(channel)
//! ```
//!
//! Workers bound the number of concurrent handshakes. Established channels
//! run on their own tasks, so open connections never hold a worker.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::addr::{Address, Endpoint};
use crate::cancel::StopFlag;
use crate::channel::SecureChannel;
use crate::config::Config;
use crate::error::{Error, TransportError};
use crate::handshake::{ServerIdentity, SessionCache};
use crate::threat::{ThreatLevel, ThreatMonitor, ThreatRecord};
use crate::transport::{Acceptor, Socket, DEFAULT_BACKLOG};

/// Listener and worker pool settings.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    port: u16,
    bind_address: Option<Address>,
    workers: usize,
    queue_depth: usize,
    backlog: u32,
    reject_threshold: ThreatLevel,
}

impl ServiceConfig {
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            port: 0,
            bind_address: None,
            workers: 4,
            queue_depth: 64,
            backlog: DEFAULT_BACKLOG,
            reject_threshold: ThreatLevel::High,
        }
    }

    #[inline(always)]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `None` listens on every address of both families.
    #[inline(always)]
    pub fn bind_address(&self) -> Option<Address> {
        self.bind_address
    }

    #[inline(always)]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Accepted sockets waiting for a worker.
    #[inline(always)]
    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    #[inline(always)]
    pub fn backlog(&self) -> u32 {
        self.backlog
    }

    /// Peers classified at or above this level are dropped on accept.
    #[inline(always)]
    pub fn reject_threshold(&self) -> ThreatLevel {
        self.reject_threshold
    }
}

/// Builder for [`ServiceConfig`].
pub struct ServiceConfigBuilder {
    port: u16,
    bind_address: Option<Address>,
    workers: usize,
    queue_depth: usize,
    backlog: u32,
    reject_threshold: ThreatLevel,
}

impl ServiceConfigBuilder {
    /// Set the listen port.
    ///
    /// Defaults to 0, an ephemeral port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Bind one address instead of ANY.
    pub fn bind_address(mut self, address: Address) -> Self {
        self.bind_address = Some(address);
        self
    }

    /// Set the number of worker tasks.
    ///
    /// Defaults to 4.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the work queue capacity.
    ///
    /// Defaults to 64.
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Set the OS listen backlog.
    ///
    /// Defaults to 1024.
    pub fn backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Set the threat level at which peers are rejected.
    ///
    /// Defaults to `High`.
    pub fn reject_threshold(mut self, level: ThreatLevel) -> Self {
        self.reject_threshold = level;
        self
    }

    pub fn build(self) -> Result<ServiceConfig, Error> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".into()));
        }
        if self.queue_depth == 0 {
            return Err(Error::Config("queue_depth must be at least 1".into()));
        }
        if self.backlog == 0 {
            return Err(Error::Config("backlog must be at least 1".into()));
        }
        Ok(ServiceConfig {
            port: self.port,
            bind_address: self.bind_address,
            workers: self.workers,
            queue_depth: self.queue_depth,
            backlog: self.backlog,
            reject_threshold: self.reject_threshold,
        })
    }
}

/// Connection counters, updated by the acceptor and the workers.
#[derive(Debug, Default)]
pub struct ServiceStats {
    accepted: AtomicU64,
    rejected: AtomicU64,
    established: AtomicU64,
    failed: AtomicU64,
    active: AtomicU64,
}

impl ServiceStats {
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Dropped by the threat check.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn established(&self) -> u64 {
        self.established.load(Ordering::Relaxed)
    }

    /// Handshakes that did not complete.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Established sessions whose handler is still running.
    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }
}

/// A secure listener: everything needed to accept and establish sessions.
pub struct Service {
    config: ServiceConfig,
    handshake: Arc<Config>,
    identity: Arc<ServerIdentity>,
    cache: Arc<SessionCache>,
    threats: Arc<ThreatMonitor>,
}

impl Service {
    pub fn new(config: ServiceConfig, handshake: Arc<Config>, identity: Arc<ServerIdentity>) -> Self {
        Service {
            config,
            handshake,
            identity,
            cache: Arc::new(SessionCache::new()),
            threats: Arc::new(ThreatMonitor::default()),
        }
    }

    /// Share a session cache, e.g. across several listeners.
    pub fn with_session_cache(mut self, cache: Arc<SessionCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_threat_monitor(mut self, threats: Arc<ThreatMonitor>) -> Self {
        self.threats = threats;
        self
    }

    /// Bind, then spawn the acceptor and the workers.
    ///
    /// Bind and listen failures are returned here. Every established
    /// session is passed to `handler` on a task of its own. A panicking
    /// handler ends only its own session.
    pub fn start<F, Fut>(self, handler: F) -> Result<ServiceHandle, Error>
    where
        F: Fn(SecureChannel) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut acceptor = Acceptor::with_backlog(self.config.backlog);
        let local = acceptor.listen(self.config.port, self.config.bind_address)?;
        info!(
            "Service listening on {} (dual stack: {}, workers: {})",
            local,
            acceptor.dual_stack_enabled(),
            self.config.workers
        );

        let stop = StopFlag::new();
        let stats = Arc::new(ServiceStats::default());
        let (tx, rx) = mpsc::channel::<Socket>(self.config.queue_depth);
        let rx = Arc::new(Mutex::new(rx));
        let handler = Arc::new(handler);

        let mut tasks = Vec::with_capacity(self.config.workers + 1);

        tasks.push(tokio::spawn(accept_loop(
            acceptor,
            tx,
            self.threats.clone(),
            self.config.reject_threshold,
            stats.clone(),
            stop.clone(),
        )));

        for id in 0..self.config.workers {
            let worker = Worker {
                id,
                rx: rx.clone(),
                handshake: self.handshake.clone(),
                identity: self.identity.clone(),
                cache: self.cache.clone(),
                stats: stats.clone(),
                stop: stop.clone(),
            };
            tasks.push(tokio::spawn(worker.run(handler.clone())));
        }

        Ok(ServiceHandle {
            local,
            stats,
            stop,
            tasks,
        })
    }
}

/// Control of a running [`Service`].
pub struct ServiceHandle {
    local: Endpoint,
    stats: Arc<ServiceStats>,
    stop: StopFlag,
    tasks: Vec<JoinHandle<()>>,
}

impl ServiceHandle {
    pub fn local_endpoint(&self) -> Endpoint {
        self.local
    }

    pub fn stats(&self) -> &ServiceStats {
        &self.stats
    }

    /// The flag every task of this service watches.
    pub fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }

    /// Stop accepting. In-flight handshakes abort as cancelled. Idempotent.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Wait for the acceptor and every worker to finish. Handlers of
    /// established sessions are not waited for.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Service task failed: {}", e);
            }
        }
        info!("Service on {} stopped", self.local);
    }
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("local", &self.local)
            .field("stats", &self.stats)
            .field("stopped", &self.stop.is_stopped())
            .finish()
    }
}

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(ACCEPT_BACKOFF_MAX)
}

async fn accept_loop(
    mut acceptor: Acceptor,
    tx: mpsc::Sender<Socket>,
    threats: Arc<ThreatMonitor>,
    reject_threshold: ThreatLevel,
    stats: Arc<ServiceStats>,
    stop: StopFlag,
) {
    let mut backoff = ACCEPT_BACKOFF_MIN;
    loop {
        let accepted = tokio::select! {
            biased;
            _ = stop.wait() => break,
            r = acceptor.accept() => r,
        };

        let mut socket = match accepted {
            Ok(s) => {
                backoff = ACCEPT_BACKOFF_MIN;
                s
            }
            Err(TransportError::Closed) => break,
            Err(e) => {
                // EMFILE and friends persist until something is released.
                warn!("Accept failed, retrying in {:?}: {}", backoff, e);
                tokio::select! {
                    biased;
                    _ = stop.wait() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = next_backoff(backoff);
                continue;
            }
        };
        stats.accepted.fetch_add(1, Ordering::Relaxed);

        let Some(peer) = socket.peer_endpoint() else {
            continue;
        };
        let level = threats.classify(&peer.address());
        if level >= reject_threshold {
            stats.rejected.fetch_add(1, Ordering::Relaxed);
            threats.log_event(ThreatRecord::new(
                peer.address(),
                level,
                format!("rejected connection on port {}", peer.port()),
            ));
            socket.close().await;
            continue;
        }
        trace!("Accepted {} ({})", peer, level);

        tokio::select! {
            biased;
            _ = stop.wait() => break,
            r = tx.send(socket) => {
                if r.is_err() {
                    // Every worker is gone.
                    break;
                }
            }
        }
    }

    acceptor.stop_listening();
    debug!("Acceptor stopped");
}

struct Worker {
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Socket>>>,
    handshake: Arc<Config>,
    identity: Arc<ServerIdentity>,
    cache: Arc<SessionCache>,
    stats: Arc<ServiceStats>,
    stop: StopFlag,
}

impl Worker {
    async fn run<F, Fut>(self, handler: Arc<F>)
    where
        F: Fn(SecureChannel) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        loop {
            let next = {
                let mut rx = self.rx.lock().await;
                tokio::select! {
                    biased;
                    _ = self.stop.wait() => None,
                    s = rx.recv() => s,
                }
            };
            let Some(socket) = next else {
                break;
            };

            let channel = SecureChannel::accept(
                socket,
                self.handshake.clone(),
                self.identity.clone(),
                self.cache.clone(),
                &self.stop,
            )
            .await;

            match channel {
                Ok(channel) => {
                    self.stats.established.fetch_add(1, Ordering::Relaxed);
                    self.stats.active.fetch_add(1, Ordering::Relaxed);
                    let peer = channel.peer_endpoint();
                    let session = tokio::spawn(handler(channel));
                    let stats = self.stats.clone();
                    tokio::spawn(async move {
                        if let Err(e) = session.await {
                            warn!("Handler for {} failed: {}", peer, e);
                        }
                        stats.active.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                Err(_) => {
                    // Already logged with the peer by the channel.
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        trace!("Worker {} stopped", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let c = ServiceConfig::builder().build().unwrap();
        assert_eq!(c.port(), 0);
        assert_eq!(c.bind_address(), None);
        assert_eq!(c.workers(), 4);
        assert_eq!(c.queue_depth(), 64);
        assert_eq!(c.backlog(), DEFAULT_BACKLOG);
        assert_eq!(c.reject_threshold(), ThreatLevel::High);
    }

    #[test]
    fn accept_backoff_doubles_up_to_the_cap() {
        let mut d = ACCEPT_BACKOFF_MIN;
        let mut steps = Vec::new();
        for _ in 0..12 {
            d = next_backoff(d);
            steps.push(d);
        }
        assert_eq!(steps[0], Duration::from_millis(10));
        assert_eq!(steps[1], Duration::from_millis(20));
        assert!(steps.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*steps.last().unwrap(), ACCEPT_BACKOFF_MAX);
    }

    #[test]
    fn config_rejects_zero_sizes() {
        assert!(ServiceConfig::builder().workers(0).build().is_err());
        assert!(ServiceConfig::builder().queue_depth(0).build().is_err());
        assert!(ServiceConfig::builder().backlog(0).build().is_err());
    }
}
