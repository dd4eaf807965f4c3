//! # Blocking primitives
//!
//! Everything the simulator blocks on is built here, on top of futex-like wait & wake from
//! the [atomic-wait](https://crates.io/crates/atomic-wait) crate:
//! - `wait(&AtomicU32, u32)` - sleeps while the atomic holds the given value, may wake up spuriously
//! - `wake_one(&AtomicU32)` - wakes a single thread waiting on the atomic
//! - `wake_all(&AtomicU32)` - wakes all of them
//!
//! From the bottom up: [mutex::Mutex], [broadcast::Broadcast], [semaphore::Semaphore],
//! [wait_queue::WaitQueue] and the [fair_lock::FairLock] made of the last one.

pub mod broadcast;
pub mod fair_lock;
pub mod mutex;
pub mod semaphore;
pub mod wait_queue;

pub use broadcast::Broadcast;
pub use fair_lock::{FairLock, FairLockGuard};
pub use mutex::{Mutex, MutexGuard, RawMutex};
pub use semaphore::Semaphore;
pub use wait_queue::{WaitQueue, WaitRecord};
