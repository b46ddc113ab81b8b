//! The node lifecycle wrapper: starts the reactor on a background task,
//! hands the front-end a [`CommandSender`], and joins the reactor on an
//! orderly shutdown.

use crate::command::CommandSender;
use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::reactor::Reactor;
use kadnet_proto::{NodeId, Peer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// A kadnet node: one identity, one reactor, one command queue.
///
/// Construct with [`Node::new`], call [`Node::start`] once to spin up the
/// reactor task, submit work through the [`CommandSender`] returned by
/// [`Node::commands`], then [`Node::stop`] to request orderly shutdown and
/// join the reactor task.
pub struct Node {
    id: NodeId,
    config: NodeConfig,
    command_sender: CommandSender,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<()>>>,
    commands_for_start: Option<(Peer, NodeConfig)>,
}

impl Node {
    /// Build a node identity and configuration, without starting the
    /// reactor yet.
    #[must_use]
    pub fn new(config: NodeConfig) -> Self {
        let id = NodeId::random();
        let local = Peer::new(id, config.bind_addr);
        // A throwaway sender is replaced once `start` builds the real
        // reactor; this lets `commands()` be callable (if confusingly,
        // before a command is ever drained) prior to `start`.
        let (command_sender, _rx) = crate::command::channel(config.max_pending);
        Self {
            id,
            config: config.clone(),
            command_sender,
            shutdown: Arc::new(AtomicBool::new(false)),
            handle: None,
            commands_for_start: Some((local, config)),
        }
    }

    /// This node's own identifier.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// A handle for submitting commands to this node. Valid to call before
    /// or after [`Node::start`]; commands submitted before `start` simply
    /// queue until the reactor drains them.
    #[must_use]
    pub fn commands(&self) -> CommandSender {
        self.command_sender.clone()
    }

    /// Start the reactor on a background task.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::AlreadyRunning`] if called more than once, or
    /// whatever fatal I/O error the reactor hit binding its sockets
    /// (propagated once [`Node::stop`] joins the task).
    pub async fn start(&mut self) -> Result<()> {
        let Some((local, config)) = self.commands_for_start.take() else {
            return Err(NodeError::AlreadyRunning);
        };
        let reactor = Reactor::new(local, config).await?;
        self.command_sender = reactor.command_sender();
        self.shutdown = reactor.shutdown_flag();
        self.handle = Some(tokio::spawn(reactor.run()));
        info!(id = %self.id, "node started");
        Ok(())
    }

    /// Request orderly shutdown and wait for the reactor task to exit.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::NotRunning`] if [`Node::start`] was never
    /// called, or propagates whatever error the reactor task returned or
    /// panicked with.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Err(NodeError::NotRunning);
        };
        self.shutdown.store(true, Ordering::Release);
        match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(NodeError::Io(std::io::Error::other(join_err))),
        }
    }

    /// This node's configuration, as constructed.
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }
}
