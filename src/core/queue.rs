// MedScan - core/queue.rs
//
// FIFO of images awaiting analysis. Insertion order is processing order;
// the image being analysed has always been popped already, so it is never
// a member of the queue.

use crate::core::model::RawImage;
use std::collections::VecDeque;

/// Pending images, oldest first.
#[derive(Debug, Default)]
pub struct ImageQueue {
    pending: VecDeque<RawImage>,
}

impl ImageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `images` in input order. Returns the new queue length.
    pub fn enqueue_batch<I>(&mut self, images: I) -> usize
    where
        I: IntoIterator<Item = RawImage>,
    {
        self.pending.extend(images);
        self.pending.len()
    }

    /// Pop the head. `None` means there is nothing left to analyse.
    pub fn dequeue_next(&mut self) -> Option<RawImage> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img(label: &str) -> RawImage {
        RawImage::new(label, vec![0u8; 4])
    }

    #[test]
    fn test_dequeue_preserves_insertion_order() {
        let mut q = ImageQueue::new();
        assert_eq!(q.enqueue_batch([img("a"), img("b")]), 2);
        assert_eq!(q.enqueue_batch([img("c")]), 3);

        let order: Vec<String> = std::iter::from_fn(|| q.dequeue_next())
            .map(|i| i.label)
            .collect();
        assert_eq!(order, ["a", "b", "c"]);
    }

    #[test]
    fn test_dequeue_on_empty_returns_none() {
        let mut q = ImageQueue::new();
        assert!(q.dequeue_next().is_none());
        assert!(q.is_empty());
    }
}
