//! Single-slot mailbox: the newest value overwrites any unconsumed one.

use parking_lot::{Condvar, Mutex};

struct Inner<T> {
    value: Option<T>,
    closed: bool,
    overwritten: u64,
}

pub struct LatestSlot<T> {
    inner: Mutex<Inner<T>>,
    ready: Condvar,
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                value: None,
                closed: false,
                overwritten: 0,
            }),
            ready: Condvar::new(),
        }
    }

    /// Store `value`, dropping the previous one if nobody took it.
    /// Returns false once the slot is closed.
    pub fn publish(&self, value: T) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        if inner.value.replace(value).is_some() {
            inner.overwritten += 1;
        }
        drop(inner);
        self.ready.notify_one();
        true
    }

    /// Block until a value arrives or the slot is closed.
    /// A value published before `close` is still delivered.
    pub fn take(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(v) = inner.value.take() {
                return Some(v);
            }
            if inner.closed {
                return None;
            }
            self.ready.wait(&mut inner);
        }
    }

    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.ready.notify_all();
    }

    /// Values replaced before anyone consumed them
    pub fn overwritten(&self) -> u64 {
        self.inner.lock().overwritten
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_latest_wins() {
        let slot = LatestSlot::new();
        assert!(slot.publish(1));
        assert!(slot.publish(2));
        assert!(slot.publish(3));
        assert_eq!(slot.take(), Some(3));
        assert_eq!(slot.overwritten(), 2);
        slot.close();
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_close_wakes_waiter() {
        let slot = Arc::new(LatestSlot::<u32>::new());
        let waiter = {
            let slot = slot.clone();
            thread::spawn(move || slot.take())
        };
        thread::sleep(Duration::from_millis(20));
        slot.close();
        assert_eq!(waiter.join().unwrap(), None);
        assert!(!slot.publish(5));
    }

    #[test]
    fn test_value_before_close_is_delivered() {
        let slot = LatestSlot::new();
        slot.publish("frame");
        slot.close();
        assert_eq!(slot.take(), Some("frame"));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_take_blocks_until_publish() {
        let slot = Arc::new(LatestSlot::new());
        let producer = {
            let slot = slot.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                slot.publish(42u32);
            })
        };
        assert_eq!(slot.take(), Some(42));
        producer.join().unwrap();
    }
}
