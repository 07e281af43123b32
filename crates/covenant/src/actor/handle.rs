//! # Actor Handle
//!
//! The cloneable front of an actor lane. Every method is a message to the
//! lane; the lane owns the state machine, so a handle can never observe a
//! half-applied transition.

use std::time::Duration;

use covenant_chain::{ActorId, CommitRecord};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error};

use super::types::{
    ActorControl, ActorError, ActorInfo, ActorOperation, ActorStatus, HttpResponse,
};
use crate::metrics::ActorMetrics;

#[derive(Clone, Debug)]
pub struct ActorHandle {
    id: ActorId,
    operation_tx: mpsc::Sender<ActorOperation>,
    info_tx: mpsc::Sender<ActorInfo>,
    control_tx: mpsc::Sender<ActorControl>,
    send_timeout: Duration,
}

impl ActorHandle {
    pub fn new(
        id: ActorId,
        operation_tx: mpsc::Sender<ActorOperation>,
        info_tx: mpsc::Sender<ActorInfo>,
        control_tx: mpsc::Sender<ActorControl>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            id,
            operation_tx,
            info_tx,
            control_tx,
            send_timeout,
        }
    }

    pub fn id(&self) -> &ActorId {
        &self.id
    }

    /// Delivers a message and waits for the resulting commit.
    ///
    /// Only the wait for mailbox space is bounded by the send timeout. Once
    /// the lane has taken the message, the transition runs to completion.
    pub async fn send_message(
        &self,
        message: impl Into<Vec<u8>>,
    ) -> Result<CommitRecord, ActorError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(ActorOperation::HandleMessage {
            message: message.into(),
            response_tx: tx,
        })
        .await?;
        rx.await.map_err(|_| {
            error!("actor [{}]: lane dropped a message response", self.id);
            ActorError::ChannelClosed
        })?
    }

    pub async fn handle_http(
        &self,
        request: impl Into<Vec<u8>>,
    ) -> Result<HttpResponse, ActorError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(ActorOperation::HandleHttp {
            request: request.into(),
            response_tx: tx,
        })
        .await?;
        rx.await.map_err(|_| {
            error!("actor [{}]: lane dropped an http response", self.id);
            ActorError::ChannelClosed
        })?
    }

    /// Queues an operation, waiting for mailbox space until `deadline`.
    /// On failure the operation is handed back so the caller can answer it.
    pub(crate) async fn enqueue_until(
        &self,
        operation: ActorOperation,
        deadline: Instant,
    ) -> Result<(), (ActorOperation, ActorError)> {
        match timeout_at(deadline, self.operation_tx.reserve()).await {
            Ok(Ok(permit)) => {
                permit.send(operation);
                Ok(())
            }
            Ok(Err(_)) => Err((operation, ActorError::ShuttingDown)),
            Err(_) => {
                debug!("actor [{}]: mailbox still full at its deadline", self.id);
                Err((operation, ActorError::MailboxFull))
            }
        }
    }

    async fn enqueue(&self, operation: ActorOperation) -> Result<(), ActorError> {
        self.enqueue_until(operation, Instant::now() + self.send_timeout)
            .await
            .map_err(|(_, error)| error)
    }

    pub async fn get_state(&self) -> Result<Option<Vec<u8>>, ActorError> {
        self.query(|response_tx| ActorInfo::GetState { response_tx })
            .await
    }

    pub async fn get_chain(&self) -> Result<Vec<CommitRecord>, ActorError> {
        self.query(|response_tx| ActorInfo::GetChain { response_tx })
            .await
    }

    /// Audits this actor's chain. An integrity failure comes back as
    /// [`ActorError::ChainIntegrity`] naming the offending record.
    pub async fn verify_chain(&self) -> Result<(), ActorError> {
        self.query(|response_tx| ActorInfo::VerifyChain { response_tx })
            .await
    }

    pub async fn status(&self) -> Result<ActorStatus, ActorError> {
        self.query(|response_tx| ActorInfo::GetStatus { response_tx })
            .await
    }

    pub async fn metrics(&self) -> Result<ActorMetrics, ActorError> {
        self.query(|response_tx| ActorInfo::GetMetrics { response_tx })
            .await
    }

    /// Stops the lane after its current transition.
    pub async fn shutdown(&self) -> Result<(), ActorError> {
        let (tx, rx) = oneshot::channel();
        self.control_tx
            .send(ActorControl::Shutdown { response_tx: tx })
            .await
            .map_err(|_| ActorError::ChannelClosed)?;
        rx.await.map_err(|_| ActorError::ChannelClosed)?
    }

    async fn query<T, F>(&self, make: F) -> Result<T, ActorError>
    where
        F: FnOnce(oneshot::Sender<Result<T, ActorError>>) -> ActorInfo,
    {
        let (tx, rx) = oneshot::channel();
        self.info_tx
            .send(make(tx))
            .await
            .map_err(|_| ActorError::ChannelClosed)?;
        rx.await.map_err(|_| ActorError::ChannelClosed)?
    }
}
