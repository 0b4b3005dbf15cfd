use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::Arc;

/// Destination for finished impulse responses, typically a convolution reverb.
///
/// Uploads are fire-and-forget: the pipeline never waits for or inspects an
/// acknowledgement.
pub trait IrSink: Send + Sync {
    fn upload(&self, samples: &[f32], slot: usize, label: &str);
}

impl<S: IrSink + ?Sized> IrSink for Arc<S> {
    fn upload(&self, samples: &[f32], slot: usize, label: &str) {
        (**self).upload(samples, slot, label);
    }
}

/// An impulse response handed to a [`ChannelSink`]
#[derive(Debug, Clone, PartialEq)]
pub struct IrUpload {
    pub slot: usize,
    pub label: String,
    pub samples: Vec<f32>,
}

/// Sink that forwards every upload over a crossbeam channel.
///
/// The receiving end usually lives on the audio thread, which swaps the
/// impulse response into its convolver.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<IrUpload>,
    receiver: Receiver<IrUpload>,
}

impl ChannelSink {
    /// Creates a sink with an unbounded queue
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    /// Creates a sink that drops uploads once `capacity` are waiting
    pub fn bounded(capacity: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        Self { sender, receiver }
    }

    pub fn receiver(&self) -> Receiver<IrUpload> {
        self.receiver.clone()
    }

    /// Takes every upload currently waiting in the queue
    pub fn drain(&self) -> Vec<IrUpload> {
        self.receiver.try_iter().collect()
    }
}

impl Default for ChannelSink {
    fn default() -> Self {
        Self::new()
    }
}

impl IrSink for ChannelSink {
    fn upload(&self, samples: &[f32], slot: usize, label: &str) {
        let upload = IrUpload {
            slot,
            label: label.to_owned(),
            samples: samples.to_vec(),
        };
        match self.sender.try_send(upload) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                log::warn!("IR queue full, dropping upload for slot {}", dropped.slot);
            }
            Err(TrySendError::Disconnected(dropped)) => {
                log::debug!("IR receiver gone, dropping upload for slot {}", dropped.slot);
            }
        }
    }
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl IrSink for NullSink {
    fn upload(&self, _samples: &[f32], _slot: usize, _label: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink_forwards_uploads() {
        let sink = ChannelSink::new();
        sink.upload(&[1.0, 0.5], 3, "hall");
        sink.upload(&[0.25], 4, "corridor");

        let uploads = sink.drain();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[0].slot, 3);
        assert_eq!(uploads[0].label, "hall");
        assert_eq!(uploads[0].samples, vec![1.0, 0.5]);
        assert_eq!(uploads[1].label, "corridor");
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn test_bounded_sink_drops_when_full() {
        let sink = ChannelSink::bounded(1);
        sink.upload(&[1.0], 0, "a");
        sink.upload(&[2.0], 1, "b");

        let uploads = sink.drain();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].label, "a");
    }

    #[test]
    fn test_shared_sink() {
        let sink = Arc::new(ChannelSink::new());
        let shared: Arc<dyn IrSink> = sink.clone();
        shared.upload(&[0.0; 4], 2, "shared");
        assert_eq!(sink.receiver().try_recv().unwrap().samples.len(), 4);
        NullSink.upload(&[1.0], 0, "ignored");
    }
}
