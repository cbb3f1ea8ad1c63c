//! Bounded sensor message pipe.
//!
//! External publishers push [`BusMessage`]s; the control worker is the single
//! consumer. In sun acquisition the worker pends on the pipe, otherwise it
//! drains whatever is queued without blocking.

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use shared::sensor_tlm::{BusMessage, MessageError, SensorTlm};
use tracing::warn;

/// Publishing side of the sensor pipe. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SensorPublisher {
    tx: Sender<BusMessage>,
    topic_id: u32,
}

impl SensorPublisher {
    /// Queue a message, returning `false` if the pipe was full or closed.
    pub fn publish(&self, msg: BusMessage) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(msg)) => {
                warn!("Sensor pipe full, dropped message on topic 0x{:04X}", msg.topic_id);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Publish a sensor sample on the pipe's sensor topic.
    pub fn publish_sensor(&self, tlm: &SensorTlm) -> Result<bool, MessageError> {
        Ok(self.publish(BusMessage::sensor(self.topic_id, tlm)?))
    }

    /// Publish a raw JSON payload on the sensor topic.
    pub fn publish_payload(&self, payload: impl Into<String>) -> bool {
        self.publish(BusMessage::new(self.topic_id, payload))
    }
}

/// Result of pending on the pipe.
#[derive(Debug)]
pub enum Pend {
    Message(BusMessage),
    /// Woken without a message, e.g. after a command
    Woken,
    /// Shutdown was requested or every publisher is gone
    Closed,
}

/// Consuming side of the sensor pipe.
#[derive(Debug)]
pub struct SensorPipe {
    rx: Receiver<BusMessage>,
}

/// Create a sensor pipe holding at most `depth` messages.
pub fn sensor_pipe(depth: usize, topic_id: u32) -> (SensorPublisher, SensorPipe) {
    let (tx, rx) = bounded(depth.max(1));
    (SensorPublisher { tx, topic_id }, SensorPipe { rx })
}

impl SensorPipe {
    /// Block until a message arrives, `wake` fires, or `shutdown` closes.
    pub fn pend(&self, wake: &Receiver<()>, shutdown: &Receiver<()>) -> Pend {
        select! {
            recv(self.rx) -> msg => match msg {
                Ok(msg) => Pend::Message(msg),
                Err(_) => Pend::Closed,
            },
            recv(wake) -> _ => Pend::Woken,
            recv(shutdown) -> _ => Pend::Closed,
        }
    }

    /// Take everything queued without blocking.
    pub fn drain(&self) -> Vec<BusMessage> {
        self.rx.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    const TOPIC: u32 = 0x10;

    #[test]
    fn test_publish_respects_depth() {
        let (publisher, pipe) = sensor_pipe(2, TOPIC);
        assert!(publisher.publish_payload("{}"));
        assert!(publisher.publish_payload("{}"));
        assert!(!publisher.publish_payload("{}"));
        assert_eq!(pipe.len(), 2);

        let drained = pipe.drain();
        assert_eq!(drained.len(), 2);
        assert!(drained.iter().all(|m| m.topic_id == TOPIC));
        assert!(pipe.is_empty());
    }

    #[test]
    fn test_pend_receives_message() {
        let (publisher, pipe) = sensor_pipe(4, TOPIC);
        let (_wake_tx, wake_rx) = bounded::<()>(1);
        let (_stop_tx, stop_rx) = bounded::<()>(0);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            publisher
                .publish_sensor(&SensorTlm::new(0.1, 0.2, 3, 4))
                .unwrap()
        });

        match pipe.pend(&wake_rx, &stop_rx) {
            Pend::Message(msg) => {
                assert_eq!(msg.decode_sensor(TOPIC).unwrap().lux.b, 4);
            }
            other => panic!("unexpected pend result {other:?}"),
        }
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_pend_wakes_and_closes() {
        let (_publisher, pipe) = sensor_pipe(4, TOPIC);
        let (wake_tx, wake_rx) = bounded::<()>(1);
        let (stop_tx, stop_rx) = bounded::<()>(0);

        wake_tx.send(()).unwrap();
        assert!(matches!(pipe.pend(&wake_rx, &stop_rx), Pend::Woken));

        drop(stop_tx);
        assert!(matches!(pipe.pend(&wake_rx, &stop_rx), Pend::Closed));
    }
}
