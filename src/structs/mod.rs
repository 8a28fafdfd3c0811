//! Data model shared with the control plane.
//!
//! - [`Allocation`] and the job definitions nested in it, as fetched from the
//!   server. The agent only ever reads these.
//! - [`NodeDescriptor`], the registration payload rebuilt on every start.
//!
//! The server encodes Go values: nil slices and maps arrive as MessagePack
//! nil and durations as nanosecond integers. [`nullable`] and
//! [`duration_nanos`] bridge those to plain Rust types.

pub mod alloc;
pub mod node;

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};

pub use alloc::{Allocation, Job, Resources, Task, TaskGroup};
pub use node::NodeDescriptor;

/// Desired allocation state: `{allocation ID -> ModifyIndex}`.
pub type AllocationIndex = HashMap<String, u64>;

/// Deserialize a value the server may send as nil, using its default instead.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// `Duration` as signed nanoseconds. Negative values clamp to zero.
pub mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = i64::try_from(d.as_nanos()).unwrap_or(i64::MAX);
        serializer.serialize_i64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let nanos = Option::<i64>::deserialize(deserializer)?.unwrap_or(0);
        Ok(Duration::from_nanos(nanos.max(0) as u64))
    }
}
