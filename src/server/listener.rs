use crate::admin::Command;
use crate::cache::FileCache;
use crate::config::Config;
use crate::http::connection::Connection;
use crate::server::ServerCtx;
use crate::vhost::HostRegistry;
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// The accept loop and its shared state. Connections are driven as tasks
/// on the same current-thread runtime, so everything the server does
/// interleaves on one thread; the runtime's I/O driver is the socket
/// multiplexer.
pub struct Server {
    listener: TcpListener,
    ctx: Arc<ServerCtx>,
}

impl Server {
    /// Binds the listening socket. A failure here is fatal to the process;
    /// the caller maps it to its exit code.
    pub async fn bind(cfg: Config) -> anyhow::Result<Self> {
        let registry =
            HostRegistry::new(cfg.hosts).context("configuration defines no virtual hosts")?;
        let addr = SocketAddr::from(([0, 0, 0, 0], cfg.listen_port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("cannot bind {addr}"))?;

        let ctx = Arc::new(ServerCtx {
            registry,
            cache: FileCache::new(cfg.cache_budget),
            server_port: cfg.listen_port,
            max_load: cfg.max_load,
            active: AtomicUsize::new(0),
        });

        Ok(Self { listener, ctx })
    }

    /// The actually bound address; differs from the configured one when
    /// the config asked for an ephemeral port.
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Runs until a shutdown command arrives and every accepted connection
    /// has finished.
    ///
    /// One loop iteration handles whichever of these is ready first: a new
    /// connection to accept, an administrative command, or a finished
    /// connection task to reap. A failure on any one connection is
    /// contained to that connection; only listener-level failures escape.
    pub async fn run(self, mut admin_rx: mpsc::Receiver<Command>) -> anyhow::Result<()> {
        let listener = self.listener;
        let ctx = self.ctx;
        let mut connections: JoinSet<()> = JoinSet::new();

        'serving: loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            info!(%peer, "accepted connection");
                            let conn = Connection::new(stream, peer, Arc::clone(&ctx));
                            connections.spawn(conn.run());
                        }
                        Err(e) => {
                            // One bad accept does not take the loop down.
                            warn!("accept failed: {e}");
                        }
                    }
                }

                // The branch disables itself once the admin thread is gone.
                Some(cmd) = admin_rx.recv() => {
                    match cmd {
                        Command::Shutdown => {
                            info!("shutdown requested, closing listener");
                            break 'serving;
                        }
                    }
                }

                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        warn!("connection task failed: {e}");
                    }
                }
            }
        }

        // The port closes the moment the listener drops; in-flight
        // connections drain to completion before the loop exits.
        drop(listener);
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                warn!("connection task failed: {e}");
            }
        }
        info!("server shut down");
        Ok(())
    }
}
