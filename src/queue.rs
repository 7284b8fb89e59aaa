//! 有界字节队列
//!
//! `_i` 结尾的方法要求调用者已持有临界区令牌，可在中断中使用；
//! 其余方法自行进入一个短临界区。

use core::cell::RefCell;

use critical_section::{CriticalSection, Mutex};
use heapless::Deque;

/// 队列由空变为非空时的回调
///
/// 在推入者的临界区内同步调用，推入操作返回前执行完毕。
pub trait QueueHook {
    fn on_wake(&self, cs: CriticalSection<'_>);
}

pub struct ByteQueue<const N: usize> {
    buf: Mutex<RefCell<Deque<u8, N>>>,
}

impl<const N: usize> Default for ByteQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ByteQueue<N> {
    pub const fn new() -> Self {
        Self {
            buf: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// 推入一个字节，队列满时返回该字节
    pub fn push_i(&self, cs: CriticalSection<'_>, byte: u8) -> Result<(), u8> {
        self.buf.borrow_ref_mut(cs).push_back(byte)
    }

    pub fn pop_i(&self, cs: CriticalSection<'_>) -> Option<u8> {
        self.buf.borrow_ref_mut(cs).pop_front()
    }

    pub fn is_empty_i(&self, cs: CriticalSection<'_>) -> bool {
        self.buf.borrow_ref(cs).is_empty()
    }

    pub fn len_i(&self, cs: CriticalSection<'_>) -> usize {
        self.buf.borrow_ref(cs).len()
    }

    /// 丢弃全部内容
    pub fn reset_i(&self, cs: CriticalSection<'_>) {
        self.buf.borrow_ref_mut(cs).clear();
    }

    /// 尽量推入 `bytes`，返回实际推入的字节数
    ///
    /// 若推入前队列为空且至少推入了一个字节，调用一次 `hook`。
    pub fn write_i<H: QueueHook + ?Sized>(
        &self,
        cs: CriticalSection<'_>,
        bytes: &[u8],
        hook: &H,
    ) -> usize {
        let (was_empty, written) = {
            let mut buf = self.buf.borrow_ref_mut(cs);
            let was_empty = buf.is_empty();
            let mut n = 0;
            for &b in bytes {
                if buf.push_back(b).is_err() {
                    break;
                }
                n += 1;
            }
            (was_empty, n)
        };

        // 回调会再次借用队列，必须在释放借用之后调用
        if was_empty && written > 0 {
            hook.on_wake(cs);
        }
        written
    }

    /// 逐个弹出到 `buf`，返回弹出的字节数
    pub fn read_i(&self, cs: CriticalSection<'_>, buf: &mut [u8]) -> usize {
        let mut q = self.buf.borrow_ref_mut(cs);
        let mut n = 0;
        for slot in buf.iter_mut() {
            match q.pop_front() {
                Some(b) => *slot = b,
                None => break,
            }
            n += 1;
        }
        n
    }

    pub fn pop(&self) -> Option<u8> {
        critical_section::with(|cs| self.pop_i(cs))
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.len_i(cs))
    }

    pub fn is_empty(&self) -> bool {
        critical_section::with(|cs| self.is_empty_i(cs))
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use super::*;

    struct Counter(Cell<usize>);

    impl QueueHook for Counter {
        fn on_wake(&self, _cs: CriticalSection<'_>) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn hook_fires_only_on_empty_to_non_empty() {
        let q = ByteQueue::<8>::new();
        let hook = Counter(Cell::new(0));

        critical_section::with(|cs| {
            assert_eq!(q.write_i(cs, b"ab", &hook), 2);
            assert_eq!(q.write_i(cs, b"c", &hook), 1);
        });
        assert_eq!(hook.0.get(), 1);

        while q.pop().is_some() {}

        critical_section::with(|cs| q.write_i(cs, b"d", &hook));
        assert_eq!(hook.0.get(), 2);
    }

    #[test]
    fn empty_write_does_not_wake() {
        let q = ByteQueue::<4>::new();
        let hook = Counter(Cell::new(0));
        critical_section::with(|cs| q.write_i(cs, &[], &hook));
        assert_eq!(hook.0.get(), 0);
    }

    #[test]
    fn bounded_capacity() {
        let q = ByteQueue::<4>::new();
        let hook = Counter(Cell::new(0));

        let n = critical_section::with(|cs| q.write_i(cs, b"123456", &hook));
        assert_eq!(n, 4);
        assert_eq!(q.len(), 4);
        assert_eq!(critical_section::with(|cs| q.push_i(cs, b'7')), Err(b'7'));

        let mut buf = [0u8; 8];
        let n = critical_section::with(|cs| q.read_i(cs, &mut buf));
        assert_eq!(&buf[..n], b"1234");
        assert!(q.is_empty());
    }

    #[test]
    fn reset_drops_contents() {
        let q = ByteQueue::<4>::new();
        critical_section::with(|cs| {
            q.push_i(cs, 1).unwrap();
            q.push_i(cs, 2).unwrap();
            q.reset_i(cs);
            assert!(q.is_empty_i(cs));
        });
    }
}
