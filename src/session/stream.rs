use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::headers::StreamHeader;

/// Delivery progress of one server-push stream.
///
/// `response_id` is the id of the last frame accepted in sequence; it only
/// ever moves by exactly one, so gaps and duplicates on the wire are
/// detectable locally. Records are shared between the session registry and
/// the stream's reader task.
#[derive(Debug)]
pub struct StreamRecord {
    id: u64,
    response_id: RwLock<u64>,
}

impl StreamRecord {
    fn new(id: u64) -> Self {
        Self {
            id,
            response_id: RwLock::new(0),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Accepts `response_id` iff it is exactly the next frame in sequence.
    /// Anything else is the server resending or racing ahead, and the caller
    /// must drop the frame.
    pub fn advance(&self, response_id: u64) -> bool {
        let mut current = self.response_id.write();
        if response_id == *current + 1 {
            *current += 1;
            return true;
        }
        false
    }

    pub fn header(&self) -> StreamHeader {
        StreamHeader {
            stream_id: self.id,
            response_id: *self.response_id.read(),
        }
    }
}

/// Open streams of one session, keyed by the `request_id` assigned when the
/// stream was created. Mutated only under the session write lock; `advance`
/// goes through the per-record lock instead.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: AHashMap<u64, Arc<StreamRecord>>,
}

impl StreamRegistry {
    pub fn register(&mut self, stream_id: u64) -> Arc<StreamRecord> {
        let record = Arc::new(StreamRecord::new(stream_id));
        self.streams.insert(stream_id, record.clone());
        record
    }

    pub fn remove(&mut self, stream_id: u64) {
        self.streams.remove(&stream_id);
    }

    pub fn contains(&self, stream_id: u64) -> bool {
        self.streams.contains_key(&stream_id)
    }

    /// Headers for the streams the server already knows about, i.e. those
    /// whose creation command has been acknowledged (`stream_id` at or below
    /// the session's `response_id`). A stream opened after the last recorded
    /// response is deliberately left out until its creation response lands.
    pub fn snapshot(&self, response_id: u64) -> Vec<StreamHeader> {
        let mut headers: Vec<StreamHeader> = self
            .streams
            .values()
            .filter(|record| record.id() <= response_id)
            .map(|record| record.header())
            .collect();
        headers.sort_by_key(|h| h.stream_id);
        headers
    }
}
