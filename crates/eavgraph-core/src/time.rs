//! Row timestamps

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// Current epoch milliseconds, strictly increasing within the process.
///
/// Two writes in the same millisecond still get distinct `updatedAt`
/// stamps, so a later write always orders after an earlier one.
pub fn now_millis() -> i64 {
    let wall = Utc::now().timestamp_millis();
    let mut last = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let next = wall.max(last + 1);
        match LAST_STAMP.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(current) => last = current,
        }
    }
}
