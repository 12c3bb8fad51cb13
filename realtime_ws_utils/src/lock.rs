//! 同步原语的小工具。

use std::sync::{Mutex, MutexGuard, PoisonError};

/// 获取互斥锁。回调中的 panic 可能使锁中毒，此时仍取回内部数据继续使用，
/// 连接状态本身在持锁期间不会调用任何使用方代码。
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
