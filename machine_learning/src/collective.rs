use crate::Result;

/// The set of cooperating workers taking part in gradient synchronization.
///
/// Every operation is a blocking collective: all ranks must call it, in the same order and with
/// buffers of the same length. A rank that never arrives stalls the whole group, there is no
/// timeout.
pub trait ProcessGroup: Send + Sync {
    /// The index of this worker inside the group.
    fn rank(&self) -> usize;

    /// The amount of workers in the group.
    fn world_size(&self) -> usize;

    /// Replaces `buf` with the element-wise mean of every rank's `buf`.
    ///
    /// # Errors
    /// If the buffers' lengths differ between ranks.
    fn all_reduce_mean(&self, buf: &mut [f32]) -> Result<()>;

    /// Replaces `buf` with the `root` rank's `buf`.
    ///
    /// # Errors
    /// If `root` is out of range or the buffers' lengths differ between ranks.
    fn broadcast(&self, buf: &mut [f32], root: usize) -> Result<()>;

    /// Blocks until every rank reaches this point.
    fn barrier(&self);
}
