// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Kernel heap accounting.
//!
//! Kernel objects are charged against a fixed budget of `CONFIG_TOTAL_HEAP_SIZE` bytes, the same
//! way a kernel with a static heap would run out of memory for control blocks and stacks.  The
//! objects themselves live in host memory; only the accounting is simulated.

use crate::kernel;

/// Bytes charged for a task control block, not counting the stack.
pub const TCB_SIZE: usize = 96;

/// Bytes charged per stack word.
pub const STACK_WORD_SIZE: usize = 4;

/// Bytes charged for a semaphore or mutex.
pub const SEM_SIZE: usize = 80;

/// Bytes charged for a software timer.
pub const TIMER_SIZE: usize = 48;

/// A fixed size allocation budget.
#[derive(Debug)]
pub(crate) struct Heap {
    capacity: usize,
    used: usize,
}

impl Heap {
    pub(crate) const fn new(capacity: usize) -> Self {
        Heap { capacity, used: 0 }
    }

    /// Charge `size` bytes.  Returns the amount charged, which must later be given to [`free`].
    ///
    /// [`free`]: Heap::free
    pub(crate) fn alloc(&mut self, size: usize) -> Option<usize> {
        let used = self.used.checked_add(size)?;
        if used > self.capacity {
            return None;
        }
        self.used = used;
        Some(size)
    }

    pub(crate) fn free(&mut self, size: usize) {
        debug_assert!(size <= self.used, "heap release larger than outstanding charges");
        self.used = self.used.saturating_sub(size);
    }

    pub(crate) fn free_bytes(&self) -> usize {
        self.capacity - self.used
    }
}

/// Return the number of bytes still available to kernel objects.
pub fn k_free_heap_size() -> usize {
    kernel::lock().heap.free_bytes()
}

#[cfg(test)]
mod tests {
    use super::Heap;

    #[test]
    fn charges_until_exhausted() {
        let mut heap = Heap::new(100);
        assert_eq!(heap.alloc(60), Some(60));
        assert_eq!(heap.alloc(41), None);
        assert_eq!(heap.free_bytes(), 40);
        assert_eq!(heap.alloc(40), Some(40));
        assert_eq!(heap.free_bytes(), 0);
    }

    #[test]
    fn release_restores_budget() {
        let mut heap = Heap::new(100);
        let a = heap.alloc(30).unwrap();
        let b = heap.alloc(70).unwrap();
        heap.free(a);
        assert_eq!(heap.free_bytes(), 30);
        heap.free(b);
        assert_eq!(heap.free_bytes(), 100);
    }

    #[test]
    fn overflowing_request_fails() {
        let mut heap = Heap::new(100);
        heap.alloc(1).unwrap();
        assert_eq!(heap.alloc(usize::MAX), None);
        assert_eq!(heap.free_bytes(), 99);
    }
}
