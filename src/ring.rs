//! Lock-protected ring buffer staging interleaved I/Q doubles between the
//! ingest path and the DSP worker.
//!
//! Single writer (ingest), single reader (worker). The critical section is
//! bounded to index arithmetic and a bounded copy; the DSP exchange never
//! runs under this lock. Overflow drops the incoming pair rather than
//! blocking the transport callback; underflow is reported to the caller so
//! the worker can skip the cycle.

use std::sync::Mutex;

use crate::error::{Result, RxError};

struct RingInner {
    buf: Vec<f64>,
    head: usize,
    tail: usize,
    count: usize,
}

pub struct IqRing {
    inner: Mutex<RingInner>,
}

impl IqRing {
    /// Capacity is in doubles and must be an even nonzero value (I/Q pairs).
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity % 2 != 0 {
            return Err(RxError::RingCapacity(capacity));
        }
        Ok(Self {
            inner: Mutex::new(RingInner {
                buf: vec![0.0; capacity],
                head: 0,
                tail: 0,
                count: 0,
            }),
        })
    }

    /// Push one I/Q pair. A pair that would take `count` past
    /// `capacity - 2` is dropped and logged. Returns whether the buffer now
    /// holds at least one full frame, so the caller can decide whether to
    /// signal the worker.
    pub fn push(&self, i_sample: f64, q_sample: f64, frame_size: usize) -> bool {
        let mut rb = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let capacity = rb.buf.len();
        if rb.count >= capacity - 2 {
            log::warn!("iq ring full, dropping pair (count={})", rb.count);
            return false;
        }
        let head = rb.head;
        rb.buf[head] = i_sample;
        rb.buf[(head + 1) % capacity] = q_sample;
        rb.head = (head + 2) % capacity;
        rb.count += 2;
        rb.count >= frame_size * 2
    }

    /// Copy one frame (`frame_size` pairs) out of the buffer. Returns `None`
    /// without mutating any state when less than a full frame is available.
    pub fn drain(&self, frame_size: usize) -> Option<Vec<f64>> {
        let mut rb = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let needed = frame_size * 2;
        if rb.count < needed {
            return None;
        }
        let capacity = rb.buf.len();
        let mut frame = Vec::with_capacity(needed);
        for n in 0..needed {
            frame.push(rb.buf[(rb.tail + n) % capacity]);
        }
        rb.tail = (rb.tail + needed) % capacity;
        rb.count -= needed;
        Some(frame)
    }

    /// Reinstall an empty buffer of a new capacity. Used by the sample-rate
    /// change path while the channel mutex is also held, so the worker can
    /// never observe a torn buffer.
    pub fn reset(&self, capacity: usize) -> Result<()> {
        if capacity == 0 || capacity % 2 != 0 {
            return Err(RxError::RingCapacity(capacity));
        }
        let mut rb = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        rb.buf = vec![0.0; capacity];
        rb.head = 0;
        rb.tail = 0;
        rb.count = 0;
        Ok(())
    }

    /// Number of doubles currently buffered.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .buf
            .len()
    }
}
