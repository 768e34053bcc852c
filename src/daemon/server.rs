//! Name server: wires the broker, service core and dispatcher together

use flume::Sender;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::core::ServiceCore;
use super::dispatcher::ConnectionDispatcher;
use super::lifecycle::PidFile;
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::mailbox::{MailboxBroker, ProbeKind, QueueHandle, QueueProbe, SysvQueues};
use crate::transport::{ListenAddr, Listener};

/// Stops a running `NameServer`; cheap to clone
#[derive(Clone)]
pub struct ShutdownHandle {
    sender: Sender<()>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        // The receiver is gone once the server has already stopped.
        let _ = self.sender.send(());
    }
}

pub struct NameServer {
    broker: MailboxBroker,
    core: ServiceCore,
    dispatcher: ConnectionDispatcher,
    local_addr: ListenAddr,
    core_shutdown: Sender<()>,
    dispatcher_shutdown: Sender<()>,
    requests: Arc<AtomicU64>,
    pid_file: Option<PidFile>,
}

impl NameServer {
    /// Bind the listener and create the core mailbox
    ///
    /// Every resource failure surfaces here, before any client is served.
    pub async fn bind(config: &Config) -> AppResult<Self> {
        config.validate()?;

        let broker = MailboxBroker::new(config.mailbox);
        let probe: Arc<dyn QueueProbe> = match config.registry.queue_probe {
            ProbeKind::Sysv => Arc::new(SysvQueues::new()),
            ProbeKind::Local => Arc::new(broker.clone()),
        };
        info!("Validating queue handles with the {:?} probe", config.registry.queue_probe);

        let (core_shutdown, core_shutdown_receiver) = flume::unbounded();
        let core = ServiceCore::new(broker.clone(), probe, core_shutdown_receiver)?;
        let requests = core.requests_counter();

        if let Some(parent) = config.server.listen.unix_path().and_then(|p| p.parent()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::io_with_source(parent, "create socket directory", e))?;
        }
        let mut listener = Listener::new(config.server.listen.clone());
        listener.init().await?;
        let local_addr = listener.local_addr()?;

        let (dispatcher_sender, dispatcher_receiver) = flume::unbounded();
        let dispatcher = ConnectionDispatcher::new(
            listener,
            broker.clone(),
            core.handle(),
            config.server.handler_timeout(),
            dispatcher_receiver,
        );

        Ok(Self {
            broker,
            core,
            dispatcher,
            local_addr,
            core_shutdown,
            dispatcher_shutdown: dispatcher_sender,
            requests,
            pid_file: None,
        })
    }

    /// Hold the PID file for as long as the server runs
    pub fn with_pid_file(mut self, pid_file: PidFile) -> Self {
        self.pid_file = Some(pid_file);
        self
    }

    /// Bound address; carries the real port when configured with port 0
    pub fn local_addr(&self) -> &ListenAddr {
        &self.local_addr
    }

    pub fn broker(&self) -> &MailboxBroker {
        &self.broker
    }

    pub fn core_handle(&self) -> QueueHandle {
        self.core.handle()
    }

    /// Count of well-formed requests the core has applied
    pub fn requests_handled(&self) -> Arc<AtomicU64> {
        self.requests.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: self.dispatcher_shutdown.clone(),
        }
    }

    /// Serve until the shutdown handle fires or a component fails
    pub async fn run(self) -> AppResult<()> {
        let NameServer {
            broker,
            core,
            dispatcher,
            local_addr,
            core_shutdown,
            dispatcher_shutdown,
            requests,
            pid_file,
        } = self;
        // A disconnected channel reads as a shutdown request.
        let _dispatcher_shutdown = dispatcher_shutdown;

        info!("Name server running on {}", local_addr);
        let core_handle = core.handle();
        let mut core_task = tokio::spawn(core.run());

        let result = tokio::select! {
            result = dispatcher.run() => result,
            joined = &mut core_task => {
                error!("Service core stopped unexpectedly");
                return Err(match joined {
                    Ok(Ok(())) => AppError::internal("service core exited"),
                    Ok(Err(e)) => e,
                    Err(e) => AppError::internal(format!("service core task failed: {e}")),
                });
            }
        };

        let _ = core_shutdown.send(());
        broker.remove(core_handle);
        match tokio::time::timeout(Duration::from_secs(2), core_task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!("Service core ended with error: {}", e),
            Ok(Err(e)) => warn!("Service core task failed: {}", e),
            Err(_) => warn!("Service core did not stop in time"),
        }

        drop(pid_file);
        info!(
            "Name server stopped after {} requests",
            requests.load(Ordering::Relaxed)
        );
        result
    }
}
