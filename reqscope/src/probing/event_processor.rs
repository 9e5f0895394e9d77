//! # Event Processing
//!
//! Consumes raw records from the eBPF ring buffer, decodes them and hands
//! them to the presentation thread through the lossy channel.

use log::{debug, warn};

use super::event_channel::{LossySender, SendOutcome};
use super::event_decoder::{decode_event, DecodedRequest};

/// Userspace consumer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Records taken off the ring buffer
    pub records: u64,
    /// Records shorter than the wire size
    pub short_records: u64,
    /// Fields whose declared length exceeded their capacity
    pub truncated_fields: u64,
}

/// Encapsulates decoding and the hand-off to the sink
pub struct EventProcessor {
    sink: LossySender<DecodedRequest>,
    sink_closed: bool,
    pub stats: ConsumerStats,
}

impl EventProcessor {
    #[must_use]
    pub fn new(sink: LossySender<DecodedRequest>) -> Self {
        Self { sink, sink_closed: false, stats: ConsumerStats::default() }
    }

    /// Decode one record and forward it
    pub fn process_record(&mut self, bytes: &[u8]) {
        let request = decode_event(bytes);
        self.stats.records += 1;
        self.stats.truncated_fields += request.truncated_fields();
        if request.short_record {
            self.stats.short_records += 1;
            debug!("short record: {} bytes", bytes.len());
        }

        if self.sink.send(request) == SendOutcome::Disconnected && !self.sink_closed {
            self.sink_closed = true;
            warn!("Output thread stopped; further requests are discarded");
        }
    }

    /// Requests discarded because the sink fell behind
    #[must_use]
    pub fn sink_dropped(&self) -> u64 {
        self.sink.dropped()
    }

    /// Close the sending side so the sink drains and exits
    #[must_use]
    pub fn finish(self) -> (ConsumerStats, u64) {
        let dropped = self.sink.dropped();
        (self.stats, dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probing::event_channel::lossy_channel;
    use reqscope_common::RequestEvent;

    fn raw(method: &[u8], path: &[u8], path_len: u64) -> Vec<u8> {
        let mut event = RequestEvent::zeroed();
        event.method_len = (method.len() as u64).to_ne_bytes();
        event.path_len = path_len.to_ne_bytes();
        event.method[..method.len()].copy_from_slice(method);
        event.path[..path.len()].copy_from_slice(path);
        event.to_bytes().to_vec()
    }

    #[test]
    fn test_process_record_forwards_decoded_request() {
        let (tx, rx) = lossy_channel(8);
        let mut processor = EventProcessor::new(tx);

        processor.process_record(&raw(b"GET", b"/ping", 5));
        let (stats, dropped) = processor.finish();

        let received: Vec<_> = rx.iter().collect();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].path.text, "/ping");
        assert_eq!(stats.records, 1);
        assert_eq!(stats.truncated_fields, 0);
        assert_eq!(dropped, 0);
    }

    #[test]
    fn test_counts_short_and_truncated_records() {
        let (tx, _rx) = lossy_channel(8);
        let mut processor = EventProcessor::new(tx);

        processor.process_record(&raw(b"GET", &[b'a'; 128], 300));
        processor.process_record(&raw(b"GET", b"/", 1)[..40]);

        assert_eq!(processor.stats.records, 2);
        assert_eq!(processor.stats.truncated_fields, 1);
        assert_eq!(processor.stats.short_records, 1);
    }

    #[test]
    fn test_full_sink_drops_without_blocking() {
        let (tx, rx) = lossy_channel(1);
        let mut processor = EventProcessor::new(tx);
        for _ in 0..5 {
            processor.process_record(&raw(b"GET", b"/", 1));
        }
        assert_eq!(processor.sink_dropped(), 4);
        assert_eq!(processor.stats.records, 5);
        let (_, dropped) = processor.finish();
        assert_eq!(dropped, 4);
        assert_eq!(rx.iter().count(), 1);
    }

    #[test]
    fn test_closed_sink_does_not_panic() {
        let (tx, rx) = lossy_channel(1);
        drop(rx);
        let mut processor = EventProcessor::new(tx);
        processor.process_record(&raw(b"GET", b"/", 1));
        processor.process_record(&raw(b"GET", b"/", 1));
        assert_eq!(processor.stats.records, 2);
    }
}
