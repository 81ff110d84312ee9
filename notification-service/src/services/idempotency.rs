//! In-process record of `Idempotency-Key` receipts.
//!
//! Each key gets its own async slot so concurrent requests with the same key
//! are serialized and only one of them reaches the provider. Failed sends
//! leave the slot empty so the caller may retry with the same key.

use crate::models::{Channel, DispatchReceipt};
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Receipts older than this no longer short-circuit a send.
const RECEIPT_TTL_HOURS: i64 = 24;

/// Above this many keys, expired slots are swept on insert.
const SWEEP_THRESHOLD: usize = 10_000;

pub type ReceiptSlot = Arc<Mutex<Option<DispatchReceipt>>>;

#[derive(Clone, Default)]
pub struct IdempotencyStore {
    slots: Arc<DashMap<String, ReceiptSlot>>,
}

impl IdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for `key` on `channel`. The same key on different channels is unrelated.
    pub fn slot(&self, channel: Channel, key: &str) -> ReceiptSlot {
        if self.slots.len() > SWEEP_THRESHOLD {
            self.sweep();
        }

        self.slots
            .entry(format!("{}:{}", channel, key))
            .or_default()
            .clone()
    }

    /// The stored receipt, if it is still fresh.
    pub fn fresh(receipt: &Option<DispatchReceipt>) -> Option<DispatchReceipt> {
        receipt
            .as_ref()
            .filter(|r| Utc::now() - r.sent_utc < Duration::hours(RECEIPT_TTL_HOURS))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn sweep(&self) {
        self.slots.retain(|_, slot| match slot.try_lock() {
            Ok(guard) => Self::fresh(&guard).is_some(),
            // Busy slots belong to an in-flight send.
            Err(_) => true,
        });
    }
}
