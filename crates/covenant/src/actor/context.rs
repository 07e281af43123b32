//! # Actor Context
//!
//! The only capabilities a handler has: logging and sending messages.
//! Sends are buffered here and handed to the dispatcher after the
//! transition that produced them commits; a rejected or faulted transition
//! discards them.

use std::sync::{Mutex, PoisonError};

use covenant_chain::ActorId;

use crate::logging::ChainLogger;
use crate::messages::Envelope;

#[derive(Debug)]
pub struct ActorContext {
    actor_id: ActorId,
    logger: ChainLogger,
    outbox: Mutex<Vec<Envelope>>,
}

impl ActorContext {
    pub fn new(actor_id: ActorId, logger: ChainLogger) -> Self {
        Self {
            actor_id,
            logger,
            outbox: Mutex::new(Vec::new()),
        }
    }

    pub fn actor_id(&self) -> &ActorId {
        &self.actor_id
    }

    /// Emits an INFO line tagged with this actor on the supplementary stream.
    pub fn log(&self, message: impl AsRef<str>) {
        self.logger.log_actor(&self.actor_id, message.as_ref());
    }

    /// Queues `message` for `target`. Delivery happens after commit.
    pub fn send(&self, target: impl Into<ActorId>, message: impl Into<Vec<u8>>) {
        let envelope = Envelope::new(self.actor_id.clone(), target.into(), message.into());
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(envelope);
    }

    pub(crate) fn take_outbox(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.outbox.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn discard_outbox(&self) {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sends_are_buffered_until_taken() {
        let ctx = ActorContext::new(ActorId::from("a"), ChainLogger::disabled());
        ctx.send("b", b"one".to_vec());
        ctx.send("c", b"two".to_vec());

        let outbox = ctx.take_outbox();
        assert_eq!(outbox.len(), 2);
        assert_eq!(outbox[0].from, ActorId::from("a"));
        assert_eq!(outbox[0].to, ActorId::from("b"));
        assert_eq!(outbox[1].message, b"two".to_vec());
        assert!(ctx.take_outbox().is_empty());
    }

    #[test]
    fn test_discard_clears_outbox() {
        let ctx = ActorContext::new(ActorId::from("a"), ChainLogger::disabled());
        ctx.send("b", b"x".to_vec());
        ctx.discard_outbox();
        assert!(ctx.take_outbox().is_empty());
    }
}
