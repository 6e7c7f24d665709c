//! Process-wide Snowflake id generator for entity rows and alert events.

use snowflake::SnowflakeIdBucket;
use std::sync::{Mutex, MutexGuard};

/// Machine and node ids are 5-bit fields of the Snowflake layout.
const MAX_WORKER_ID: i32 = 31;

static GENERATOR: Mutex<Option<SnowflakeIdBucket>> = Mutex::new(None);

#[derive(Debug, thiserror::Error)]
#[error("snowflake {field} must be within 0..={MAX_WORKER_ID}, got {value}")]
pub struct IdConfigError {
    field: &'static str,
    value: i32,
}

fn generator() -> MutexGuard<'static, Option<SnowflakeIdBucket>> {
    GENERATOR.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Configures the generator for this process. Calling it again replaces the
/// bucket, which is what tests rely on.
pub fn init(machine_id: i32, node_id: i32) -> Result<(), IdConfigError> {
    for (field, value) in [("machine_id", machine_id), ("node_id", node_id)] {
        if !(0..=MAX_WORKER_ID).contains(&value) {
            return Err(IdConfigError { field, value });
        }
    }
    *generator() = Some(SnowflakeIdBucket::new(machine_id, node_id));
    Ok(())
}

/// Returns a fresh id in its decimal string form. Falls back to machine 1,
/// node 1 when [`init`] was never called.
pub fn next_id() -> String {
    let mut gen = generator();
    let bucket = gen.get_or_insert_with(|| SnowflakeIdBucket::new(1, 1));
    bucket.get_id().to_string()
}
