// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Semaphores and mutexes.
//!
//! Binary semaphores, counting semaphores and mutexes are one kind of kernel object, differing in
//! their limits and in whether a holder is tracked.  A give with tasks waiting hands the token
//! straight to the first waiter, so a task that takes later can't overtake it.

use std::ffi::c_int;

use crate::heap::SEM_SIZE;
use crate::kernel::{self, BlockedOn, Outcome, State, Wake};
use crate::task::TaskHandle;
use crate::tick::{self, Tick};
use crate::{EAGAIN, EBUSY, ENOSPC, EPERM, ESRCH};

/// Handle to a kernel semaphore or mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SemHandle(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Binary,
    Counting,
    Mutex,
}

pub(crate) struct Sem {
    flavor: Flavor,
    count: u32,
    max: u32,
    /// Task holding a mutex.  `None` when free, or when taken from an interrupt.
    holder: Option<TaskHandle>,
    /// Waiting tasks and their priorities, in release order.
    pub(crate) waiters: Vec<(TaskHandle, u32)>,
    charged: usize,
}

fn create(flavor: Flavor, max: u32, initial: u32) -> Option<SemHandle> {
    if max == 0 || initial > max {
        log::warn!("invalid {:?} semaphore: initial {} max {}", flavor, initial, max);
        return None;
    }

    let mut k = kernel::lock();
    let Some(charged) = k.heap.alloc(SEM_SIZE) else {
        log::warn!("kernel heap exhausted creating {:?} semaphore", flavor);
        return None;
    };
    let id = SemHandle(k.next_id());
    k.sems.insert(
        id,
        Sem {
            flavor,
            count: initial,
            max,
            holder: None,
            waiters: Vec::new(),
            charged,
        },
    );
    log::trace!("created {:?} {:?} ({}/{})", flavor, id, initial, max);
    Some(id)
}

/// Create a binary semaphore.  It starts empty.
pub fn k_sem_create_binary() -> Option<SemHandle> {
    create(Flavor::Binary, 1, 0)
}

/// Create a counting semaphore with the given maximum and initial count.
///
/// Returns `None` if the limits are invalid (`max` of zero, or `initial` above `max`), or the
/// kernel heap is exhausted.
pub fn k_sem_create_counting(max: u32, initial: u32) -> Option<SemHandle> {
    create(Flavor::Counting, max, initial)
}

/// Create a mutex.  It starts unlocked.
pub fn k_mutex_create() -> Option<SemHandle> {
    create(Flavor::Mutex, 1, 1)
}

/// Delete a semaphore or mutex.
///
/// Tasks blocked on it are released, and their take fails with `-ESRCH`.
pub fn k_sem_delete(sem: SemHandle) -> c_int {
    let mut k = kernel::enter();
    let Some(obj) = k.sems.remove(&sem) else {
        return -(ESRCH as c_int);
    };
    k.heap.free(obj.charged);
    for (waiter, _) in obj.waiters {
        kernel::wake_task(&mut k, waiter, Wake::ObjectDeleted);
    }
    log::trace!("deleted {:?}", sem);
    0
}

/// The number of tokens currently available, or `None` if the semaphore doesn't exist.
pub fn k_sem_count_get(sem: SemHandle) -> Option<u32> {
    kernel::lock().sems.get(&sem).map(|obj| obj.count)
}

/// Take a token, waiting up to `ticks` for one to become available.
///
/// A block time of zero never waits, and fails with `-EBUSY`.  An expired wait fails with
/// `-EAGAIN`.  [`MAX_DELAY`] waits forever.
///
/// [`MAX_DELAY`]: crate::MAX_DELAY
pub fn k_sem_take(sem: SemHandle, ticks: Tick) -> c_int {
    let (mut k, me) = kernel::enter_task();
    let priority = k.tasks.get(&me).map_or(0, |tcb| tcb.priority);

    let Some(obj) = k.sems.get_mut(&sem) else {
        return -(ESRCH as c_int);
    };
    if obj.count > 0 {
        obj.count -= 1;
        if obj.flavor == Flavor::Mutex {
            obj.holder = Some(me);
        }
        return 0;
    }
    if ticks == 0 {
        return -(EBUSY as c_int);
    }

    kernel::enqueue_waiter(&mut obj.waiters, me, priority);
    let (mut k, outcome) = kernel::block(k, me, BlockedOn::Sem(sem), tick::deadline(ticks));
    match outcome {
        // The giver has already accounted for the token, and the holder.
        Outcome::Woken(Wake::Given) => 0,
        Outcome::Woken(Wake::ObjectDeleted) => -(ESRCH as c_int),
        Outcome::TimedOut => {
            if let Some(obj) = k.sems.get_mut(&sem) {
                obj.waiters.retain(|&(id, _)| id != me);
            }
            // Off the wait list, so a suspension honored here can't be handed the token.
            drop(kernel::checkpoint(k, me));
            -(EAGAIN as c_int)
        }
    }
}

/// Take a suspended task off the wait list of `sem`, so that gives pass over it.
pub(crate) fn suspend_waiter(k: &mut State, sem: SemHandle, task: TaskHandle) {
    if let Some(obj) = k.sems.get_mut(&sem) {
        obj.waiters.retain(|&(id, _)| id != task);
    }
}

/// Put a resumed task back in line for `sem`.
///
/// A token that became available while it was suspended is handed over at once.  If the
/// semaphore was deleted meanwhile, the task is released with the deletion.
pub(crate) fn resume_waiter(k: &mut State, sem: SemHandle, task: TaskHandle, priority: u32) {
    let Some(obj) = k.sems.get_mut(&sem) else {
        kernel::wake_task(k, task, Wake::ObjectDeleted);
        return;
    };
    if obj.count > 0 {
        obj.count -= 1;
        if obj.flavor == Flavor::Mutex {
            obj.holder = Some(task);
        }
        kernel::wake_task(k, task, Wake::Given);
    } else {
        kernel::enqueue_waiter(&mut obj.waiters, task, priority);
    }
}

/// Take a token from an interrupt.  Never waits: fails with `-EBUSY` when none is available.
///
/// A take never readies a task, so `woken` is left untouched.
pub fn k_sem_take_from_isr(sem: SemHandle, _woken: &mut bool) -> c_int {
    let mut k = kernel::lock();
    let Some(obj) = k.sems.get_mut(&sem) else {
        return -(ESRCH as c_int);
    };
    if obj.count == 0 {
        return -(EBUSY as c_int);
    }
    obj.count -= 1;
    // An interrupt can't own a mutex.
    obj.holder = None;
    0
}

/// Give a token.  Never blocks.
///
/// Giving a semaphore already at its maximum fails with `-ENOSPC`, and leaves the count alone.
/// Only the holder of a mutex may give it back: anyone else gets `-EPERM`.
pub fn k_sem_give(sem: SemHandle) -> c_int {
    let mut k = kernel::enter();
    let caller = kernel::current_id();
    match give(&mut k, sem, caller, false) {
        Ok(_) => 0,
        Err(errno) => -(errno as c_int),
    }
}

/// Give a token from an interrupt.
///
/// `woken` is set when the give readied a task of higher priority than the interrupted one, in
/// which case the interrupt should end with [`k_yield_from_isr`].
///
/// [`k_yield_from_isr`]: crate::k_yield_from_isr
pub fn k_sem_give_from_isr(sem: SemHandle, woken: &mut bool) -> c_int {
    let mut k = kernel::lock();
    match give(&mut k, sem, None, true) {
        Ok(Some(priority)) => {
            if priority > kernel::caller_priority(&k) {
                *woken = true;
            }
            0
        }
        Ok(None) => 0,
        Err(errno) => -(errno as c_int),
    }
}

/// Give a token, handing it to the first waiter if there is one.  Returns the priority of the
/// task released.
fn give(
    k: &mut State,
    sem: SemHandle,
    caller: Option<TaskHandle>,
    from_isr: bool,
) -> Result<Option<u32>, u32> {
    let obj = k.sems.get_mut(&sem).ok_or(ESRCH)?;
    if obj.count >= obj.max {
        return Err(ENOSPC);
    }
    if obj.flavor == Flavor::Mutex && !from_isr && obj.holder.is_some() && obj.holder != caller {
        return Err(EPERM);
    }

    if obj.waiters.is_empty() {
        obj.count += 1;
        obj.holder = None;
        return Ok(None);
    }

    let (next, _) = obj.waiters.remove(0);
    if obj.flavor == Flavor::Mutex {
        obj.holder = Some(next);
    }
    Ok(kernel::wake_task(k, next, Wake::Given))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(errno: u32) -> c_int {
        -(errno as c_int)
    }

    #[test]
    fn counting_limits() {
        assert!(k_sem_create_counting(0, 0).is_none());
        assert!(k_sem_create_counting(2, 3).is_none());

        let sem = k_sem_create_counting(2, 1).unwrap();
        assert_eq!(k_sem_give(sem), 0);
        assert_eq!(k_sem_give(sem), err(ENOSPC));
        assert_eq!(k_sem_count_get(sem), Some(2));
        assert_eq!(k_sem_take(sem, 0), 0);
        assert_eq!(k_sem_take(sem, 0), 0);
        assert_eq!(k_sem_take(sem, 0), err(EBUSY));
        assert_eq!(k_sem_delete(sem), 0);
        assert_eq!(k_sem_count_get(sem), None);
        assert_eq!(k_sem_give(sem), err(ESRCH));
    }

    #[test]
    fn binary_starts_empty() {
        let sem = k_sem_create_binary().unwrap();
        let mut woken = false;
        assert_eq!(k_sem_take_from_isr(sem, &mut woken), err(EBUSY));
        assert_eq!(k_sem_give_from_isr(sem, &mut woken), 0);
        assert!(!woken);
        assert_eq!(k_sem_give(sem), err(ENOSPC));
        assert_eq!(k_sem_take(sem, 0), 0);
        assert_eq!(k_sem_delete(sem), 0);
    }

    #[test]
    fn mutex_holder_checks() {
        let mutex = k_mutex_create().unwrap();
        assert_eq!(k_sem_give(mutex), err(ENOSPC));
        assert_eq!(k_sem_take(mutex, 0), 0);

        let other = std::thread::spawn(move || k_sem_give(mutex)).join().unwrap();
        assert_eq!(other, err(EPERM));

        assert_eq!(k_sem_give(mutex), 0);
        assert_eq!(k_sem_delete(mutex), 0);
    }

    #[test]
    fn timed_take_expires() {
        let sem = k_sem_create_binary().unwrap();
        let start = std::time::Instant::now();
        assert_eq!(k_sem_take(sem, 20), err(EAGAIN));
        assert!(start.elapsed() >= tick::ticks_to_duration(20));
        assert!(kernel::lock().sems[&sem].waiters.is_empty());
        assert_eq!(k_sem_delete(sem), 0);
    }
}
