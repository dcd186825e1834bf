use super::RelayError;
use crate::broker::{Delivery, Listener, Message};
use crate::cancel::{CancelToken, Cancelled, WAIT_SLICE};
use crossbeam_channel::{
    bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError,
};

/// Default capacity of a hand-off queue
pub const DEFAULT_HANDOFF_CAPACITY: usize = 1024;

/// Create a hand-off queue for rows of `table`.
///
/// The sender is registered on the parent's topic; the receiver is owned by
/// the consuming strategy.
pub fn handoff(table: &str, capacity: usize) -> (HandoffSender, HandoffReceiver) {
    let (sender, receiver) = bounded(capacity.max(1));
    (
        HandoffSender { sender },
        HandoffReceiver {
            table: table.to_string(),
            receiver,
        },
    )
}

/// Topic-side end of a hand-off queue
pub struct HandoffSender {
    sender: Sender<Message>,
}

impl Listener for HandoffSender {
    fn try_deliver(&self, message: &Message) -> Delivery {
        match self.sender.try_send(message.clone()) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Disconnected(_)) => Delivery::Detached,
        }
    }

    fn deliver(&self, message: &Message, cancel: &CancelToken) -> Result<Delivery, Cancelled> {
        let mut message = message.clone();
        loop {
            cancel.check()?;
            match self.sender.send_timeout(message, WAIT_SLICE) {
                Ok(()) => return Ok(Delivery::Delivered),
                Err(SendTimeoutError::Timeout(m)) => message = m,
                Err(SendTimeoutError::Disconnected(_)) => return Ok(Delivery::Detached),
            }
        }
    }
}

/// Consumer-side end of a hand-off queue
pub struct HandoffReceiver {
    table: String,
    receiver: Receiver<Message>,
}

impl HandoffReceiver {
    /// Parent table this queue is fed from
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Block until the next upstream message arrives.
    ///
    /// Returns [`Message::Poison`] once the parent has finished.
    pub fn take(&self, cancel: &CancelToken) -> Result<Message, RelayError> {
        loop {
            cancel.check()?;
            match self.receiver.recv_timeout(WAIT_SLICE) {
                Ok(message) => return Ok(message),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(RelayError::Disconnected {
                        table: self.table.clone(),
                    })
                }
            }
        }
    }

    /// Underlying channel, for multiplexing several queues with `Select`
    pub fn channel(&self) -> &Receiver<Message> {
        &self.receiver
    }
}
