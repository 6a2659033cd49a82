//! Server bootstrap.
//!
//! [`Server`] wires the pieces together: it owns the session registry, the
//! dispatch worker with every file command registered, and the I/O pool.
//! The accept loop runs on the caller's runtime and moves each accepted
//! socket onto one of the pool's I/O loops.

pub mod io_pool;
pub mod signal;

pub use io_pool::IoPool;
pub use signal::{shutdown_signal, ShutdownSignal};

use crate::commands::CommandHandler;
use crate::config::{ConfigError, ServerConfig};
use crate::connection::{
    handle_connection, CloseReason, ConnectionStats, Session, SessionRegistry, SessionSettings,
};
use crate::dispatch::{Dispatcher, HandlerRegistry};
use crate::fs::{FileSystem, LocalFs};
use crate::protocol::FrameLimits;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

/// How long shutdown waits for sessions to write their final replies.
const FLUSH_GRACE: Duration = Duration::from_secs(2);

/// Errors raised while starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to start server: {0}")]
    Io(#[from] io::Error),
}

/// A configured FlashFTP server.
pub struct Server {
    config: ServerConfig,
    settings: SessionSettings,
    limits: FrameLimits,
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<Dispatcher>,
    io_pool: IoPool,
    stats: Arc<ConnectionStats>,
}

impl Server {
    /// Builds a server serving `config.root_dir` from the local disk.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let fs = Arc::new(LocalFs::new(&config.root_dir, &config.start_dir()));
        Self::with_filesystem(config, fs)
    }

    /// Builds a server over any filesystem implementation.
    pub fn with_filesystem(
        config: ServerConfig,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self, ServerError> {
        config.validate()?;

        let commands = Arc::new(CommandHandler::new(fs));
        let mut handlers = HandlerRegistry::new();
        commands.register_all(&mut handlers);

        let dispatcher = Dispatcher::start(handlers)?;
        let io_pool = IoPool::new(config.io_threads())?;

        Ok(Self {
            settings: config.session_settings(),
            limits: config.frame_limits(),
            config,
            registry: Arc::new(SessionRegistry::new()),
            dispatcher,
            io_pool,
            stats: Arc::new(ConnectionStats::new()),
        })
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> io::Result<TcpListener> {
        TcpListener::bind(self.config.bind_address()).await
    }

    /// Accepts connections until `shutdown` completes.
    pub async fn run(&self, listener: TcpListener, shutdown: impl Future<Output = ()>) {
        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, io_loops = self.io_pool.size(), "Accepting connections");
        }
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.serve(stream, peer),
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
                _ = &mut shutdown => break,
            }
        }

        info!("Stopped accepting connections");
    }

    /// Registers a session for `stream` and hands it to the next I/O loop.
    fn serve(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let session = Session::new(
            peer,
            &self.settings,
            Arc::downgrade(&self.registry),
            Arc::clone(&self.stats),
        );
        self.registry.insert(Arc::clone(&session));

        // Sockets are bound to the runtime that created them, so move it
        // through a std socket onto the target loop.
        let std_stream = match stream.into_std() {
            Ok(s) => s,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Failed to detach socket");
                session.close(CloseReason::ReadError);
                return;
            }
        };

        let dispatcher = Arc::clone(&self.dispatcher);
        let stats = Arc::clone(&self.stats);
        let limits = self.limits;
        self.io_pool.next().spawn(async move {
            match TcpStream::from_std(std_stream) {
                Ok(stream) => handle_connection(stream, session, dispatcher, limits, stats).await,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "Failed to attach socket to I/O loop");
                    session.close(CloseReason::ReadError);
                }
            }
        });
    }

    /// Stops the server in order: sessions stop reading, the dispatcher
    /// runs everything already posted, each session flushes its replies and
    /// closes, and finally the I/O loops stop.
    ///
    /// Sessions that have not flushed within the grace period are closed
    /// anyway. Blocks until the worker and loop threads have exited.
    pub fn shutdown(&self) {
        self.registry.stop_reading_all();
        self.dispatcher.shutdown();
        self.registry.close_all_after_flush(CloseReason::ServerShutdown);

        let deadline = Instant::now() + FLUSH_GRACE;
        while !self.registry.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        let forced = self.registry.close_all(CloseReason::ServerShutdown);
        if forced > 0 {
            warn!(sessions = forced, "Closed sessions that did not flush in time");
        }

        self.io_pool.shutdown();
        info!("Server stopped");
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode, FrameDecoder, Message, MessageType, Request, Response};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    fn test_config(root: &std::path::Path) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            root_dir: root.to_path_buf(),
            io_threads: 2,
            ..ServerConfig::default()
        }
    }

    /// Local disk with a slow LIST, to keep work queued on the dispatcher.
    struct SlowListFs(LocalFs);

    impl FileSystem for SlowListFs {
        fn resolve(&self, cwd: &str, requested: &str) -> String {
            self.0.resolve(cwd, requested)
        }
        fn list(&self, path: &str) -> io::Result<String> {
            thread::sleep(Duration::from_millis(100));
            self.0.list(path)
        }
        fn mkdir(&self, path: &str) -> io::Result<bool> {
            self.0.mkdir(path)
        }
        fn rmdir(&self, path: &str) -> io::Result<bool> {
            self.0.rmdir(path)
        }
        fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
            self.0.read_file(path)
        }
        fn write_file(&self, path: &str, data: &[u8]) -> io::Result<()> {
            self.0.write_file(path, data)
        }
        fn is_dir(&self, path: &str) -> bool {
            self.0.is_dir(path)
        }
    }

    async fn read_until_closed(client: &mut TcpStream) -> Vec<Message> {
        let mut decoder = FrameDecoder::new();
        let mut messages = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf))
                .await
                .unwrap()
                .unwrap_or(0);
            if n == 0 {
                return messages;
            }
            messages.extend(decoder.feed(&buf[..n]).unwrap());
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ServerConfig {
            max_send_queue: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(Server::new(config), Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn test_serves_and_shuts_down() {
        let dir = tempfile::tempdir().unwrap();
        let server = Arc::new(Server::new(test_config(dir.path())).unwrap());
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let accept = {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                server
                    .run(listener, async {
                        let _ = stop_rx.await;
                    })
                    .await
            })
        };

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(&encode(MessageType::Pwd.as_u16(), b"{}").unwrap())
            .await
            .unwrap();

        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 256];
        let reply = loop {
            let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert!(n > 0);
            if let Some(message) = decoder.feed(&buf[..n]).unwrap().pop() {
                break message;
            }
        };
        let response = Response::from_slice(&reply.payload).unwrap();
        assert_eq!(response.data.as_deref(), Some("/"));
        assert_eq!(server.registry().len(), 1);

        stop_tx.send(()).unwrap();
        accept.await.unwrap();

        let stopping = Arc::clone(&server);
        tokio::task::spawn_blocking(move || stopping.shutdown())
            .await
            .unwrap();
        assert!(server.registry().is_empty());
        assert!(!server.dispatcher().is_accepting());

        let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_shutdown_delivers_replies_for_queued_work() {
        let dir = tempfile::tempdir().unwrap();
        let fs = Arc::new(SlowListFs(LocalFs::new(dir.path(), "/")));
        let server = Arc::new(Server::with_filesystem(test_config(dir.path()), fs).unwrap());
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let accept = {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                server
                    .run(listener, async {
                        let _ = stop_rx.await;
                    })
                    .await
            })
        };

        let mut client = TcpStream::connect(addr).await.unwrap();
        let list = Request::new(MessageType::List).to_vec().unwrap();
        let mut batch = Vec::new();
        for _ in 0..4 {
            batch.extend_from_slice(&encode(MessageType::List.as_u16(), &list).unwrap());
        }
        client.write_all(&batch).await.unwrap();

        // Every request is posted before shutdown starts
        for _ in 0..200 {
            if server.stats().messages_received.load(std::sync::atomic::Ordering::Relaxed) == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(
            server.stats().messages_received.load(std::sync::atomic::Ordering::Relaxed),
            4
        );

        stop_tx.send(()).unwrap();
        accept.await.unwrap();
        let stopping = Arc::clone(&server);
        tokio::task::spawn_blocking(move || stopping.shutdown())
            .await
            .unwrap();

        let replies = read_until_closed(&mut client).await;
        assert_eq!(replies.len(), 4);
        for reply in replies {
            let response = Response::from_slice(&reply.payload).unwrap();
            assert_eq!(response.msg_id, MessageType::List.as_u16());
            assert!(!response.is_error());
        }
        assert!(server.registry().is_empty());
    }
}
