use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::codec::JsonCodec;
use crate::error::CoordError;
use crate::queue::DedupQueue;

/// Typed view over a [`DedupQueue`].
///
/// Serializes structured values through the instance's [`JsonCodec`] before
/// delegating to the string-keyed queue operations and deserializes on the
/// way out. Serialization failures propagate as
/// [`CoordError::Serialization`]; an empty queue stays `Ok(None)`.
///
/// Membership and dedup checks compare the serialized form, so two values
/// are duplicates exactly when their JSON renderings are byte-identical.
#[derive(Debug, Clone)]
pub struct TypedQueue<Q> {
    queue: Q,
    codec: JsonCodec,
}

impl<Q: DedupQueue> TypedQueue<Q> {
    /// Wrap a queue with the given codec.
    pub fn new(queue: Q, codec: JsonCodec) -> Self {
        Self { queue, codec }
    }

    /// Access the underlying string-keyed queue.
    pub fn inner(&self) -> &Q {
        &self.queue
    }

    /// Serialize `value` and append it. See [`DedupQueue::enqueue`].
    pub async fn enqueue<T>(
        &self,
        queue: &str,
        value: &T,
        check_duplicate: bool,
    ) -> Result<bool, CoordError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let raw = self.codec.encode(value)?;
        self.queue.enqueue(queue, &raw, check_duplicate).await
    }

    /// Pop the head and deserialize it. See [`DedupQueue::dequeue`].
    pub async fn dequeue<T: DeserializeOwned>(
        &self,
        queue: &str,
    ) -> Result<Option<T>, CoordError> {
        match self.queue.dequeue(queue).await? {
            Some(raw) => Ok(Some(self.codec.decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Remove occurrences of the serialized form of `value`. See
    /// [`DedupQueue::remove_value`].
    pub async fn remove_value<T>(
        &self,
        queue: &str,
        value: &T,
        count: i64,
    ) -> Result<u64, CoordError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let raw = self.codec.encode(value)?;
        self.queue.remove_value(queue, &raw, count).await
    }

    /// Membership check on the serialized form of `value`. See
    /// [`DedupQueue::exists`].
    pub async fn exists<T>(&self, queue: &str, value: &T) -> Result<bool, CoordError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let raw = self.codec.encode(value)?;
        self.queue.exists(queue, &raw).await
    }

    /// Current queue length. See [`DedupQueue::len`].
    pub async fn len(&self, queue: &str) -> Result<u64, CoordError> {
        self.queue.len(queue).await
    }
}
