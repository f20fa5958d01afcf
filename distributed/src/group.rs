use std::sync::{Arc, Barrier};

use log::info;
use machine_learning::{MlErr, Result, collective::ProcessGroup};
use parking_lot::Mutex;

#[derive(Default)]
struct Slot {
    buf: Vec<f32>,
    mismatch: bool,
}

struct Shared {
    world_size: usize,
    barrier: Barrier,
    slot: Mutex<Slot>,
}

/// A process group whose ranks are threads of the same process.
///
/// Collectives follow a barrier protocol: the leader prepares a shared slot, every rank writes
/// to it and, after everyone has written, every rank reads it back.
#[derive(Clone)]
pub struct LocalGroup {
    rank: usize,
    shared: Arc<Shared>,
}

impl LocalGroup {
    /// Creates a group of `world_size` ranks.
    ///
    /// # Returns
    /// One handle per rank, ordered by rank. Each must be moved to its own thread.
    pub fn new_group(world_size: usize) -> Vec<LocalGroup> {
        let world_size = world_size.max(1);
        let shared = Arc::new(Shared {
            world_size,
            barrier: Barrier::new(world_size),
            slot: Mutex::new(Slot::default()),
        });

        info!(world_size = world_size; "created local process group");

        (0..world_size)
            .map(|rank| LocalGroup {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    fn finish(&self, buf: &mut [f32], f: impl Fn(f32) -> f32) -> Result<()> {
        let slot = self.shared.slot.lock();
        if slot.mismatch {
            return Err(MlErr::Collective(format!(
                "rank {} took part in a collective with mismatched buffer lengths",
                self.rank
            )));
        }

        buf.iter_mut().zip(&slot.buf).for_each(|(b, &s)| *b = f(s));
        Ok(())
    }
}

impl ProcessGroup for LocalGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.shared.world_size
    }

    fn all_reduce_mean(&self, buf: &mut [f32]) -> Result<()> {
        let shared = &self.shared;

        if shared.barrier.wait().is_leader() {
            let mut slot = shared.slot.lock();
            slot.buf.clear();
            slot.buf.resize(buf.len(), 0.);
            slot.mismatch = false;
        }

        shared.barrier.wait();
        {
            let mut slot = shared.slot.lock();
            if slot.buf.len() == buf.len() {
                slot.buf.iter_mut().zip(buf.iter()).for_each(|(s, &b)| *s += b);
            } else {
                slot.mismatch = true;
            }
        }

        shared.barrier.wait();
        let n = shared.world_size as f32;
        self.finish(buf, |s| s / n)
    }

    fn broadcast(&self, buf: &mut [f32], root: usize) -> Result<()> {
        let shared = &self.shared;
        if root >= shared.world_size {
            return Err(MlErr::Collective(format!(
                "broadcast root {root} is out of a group of {}",
                shared.world_size
            )));
        }

        shared.barrier.wait();
        if self.rank == root {
            let mut slot = shared.slot.lock();
            slot.buf.clear();
            slot.buf.extend_from_slice(buf);
            slot.mismatch = false;
        }

        shared.barrier.wait();
        {
            let mut slot = shared.slot.lock();
            if slot.buf.len() != buf.len() {
                slot.mismatch = true;
            }
        }

        shared.barrier.wait();
        self.finish(buf, |s| s)
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn run<F, T>(world_size: usize, f: F) -> Vec<T>
    where
        F: Fn(LocalGroup) -> T + Send + Sync + 'static,
        T: Send + 'static,
    {
        let f = Arc::new(f);
        let handles: Vec<_> = LocalGroup::new_group(world_size)
            .into_iter()
            .map(|group| {
                let f = Arc::clone(&f);
                thread::spawn(move || f(group))
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn all_reduce_averages() {
        const WORLD: usize = 4;

        let results = run(WORLD, |group| {
            let mut buf = vec![group.rank() as f32; 3];
            group.all_reduce_mean(&mut buf).unwrap();

            // a second round must not see the first one's sums
            let mut again = vec![1.; 3];
            group.all_reduce_mean(&mut again).unwrap();
            (buf, again)
        });

        for (buf, again) in results {
            assert_eq!(buf, vec![1.5; 3]);
            assert_eq!(again, vec![1.; 3]);
        }
    }

    #[test]
    fn broadcast_from_root() {
        let results = run(3, |group| {
            let mut buf = vec![group.rank() as f32 * 10.; 2];
            group.broadcast(&mut buf, 2).unwrap();
            buf
        });

        assert!(results.iter().all(|buf| buf == &vec![20.; 2]));
    }

    #[test]
    fn mismatched_lengths_fail_everywhere() {
        let results = run(2, |group| {
            let mut buf = vec![0.; 2 + group.rank()];
            group.all_reduce_mean(&mut buf).is_err()
        });

        assert_eq!(results, vec![true, true]);
    }

    #[test]
    fn single_rank_is_identity() {
        let group = LocalGroup::new_group(1).remove(0);
        let mut buf = vec![3., 4.];

        group.all_reduce_mean(&mut buf).unwrap();
        assert_eq!(buf, vec![3., 4.]);
    }
}
