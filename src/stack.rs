use std::sync::{Mutex, MutexGuard, PoisonError};

/// A shared stack of pending resume points.
///
/// The lock is only ever held while the list itself is mutated, never
/// across a blocking send or receive.
pub struct SuspendStack<P> {
    points: Mutex<Vec<P>>,
}

impl<P> Default for SuspendStack<P> {
    fn default() -> Self {
        SuspendStack::new()
    }
}

impl<P> SuspendStack<P> {
    pub fn new() -> SuspendStack<P> {
        SuspendStack {
            points: Mutex::new(Vec::new()),
        }
    }

    fn points(&self) -> MutexGuard<Vec<P>> {
        self.points.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, point: P) {
        self.points().push(point);
    }

    /// Removes the most recently pushed point.
    ///
    /// `None` means nobody is waiting to be yielded to.
    pub fn pop(&self) -> Option<P> {
        self.points().pop()
    }

    /// Removes the most recently pushed point satisfying `pred`.
    pub fn pop_where<F: Fn(&P) -> bool>(&self, pred: F) -> Option<P> {
        let mut points = self.points();
        let i = points.iter().rposition(|p| pred(p))?;
        Some(points.remove(i))
    }

    pub fn len(&self) -> usize {
        self.points().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<P: PartialEq> SuspendStack<P> {
    /// Removes the first point equal to `point`, keeping the others in order.
    pub fn delete_by_self(&self, point: &P) {
        let mut points = self.points();
        if let Some(i) = points.iter().position(|p| p == point) {
            points.remove(i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn push_and_pop_should_be_lifo() {
        let stack = SuspendStack::new();
        stack.push(42);
        stack.push(43);
        assert_eq!(stack.pop(), Some(43));
        assert_eq!(stack.pop(), Some(42));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn delete_by_self_should_keep_order() {
        let stack = SuspendStack::new();
        stack.push(1);
        stack.push(2);
        stack.push(3);
        stack.push(2);
        stack.delete_by_self(&2);
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), Some(1));
        assert!(stack.is_empty());
    }

    #[test]
    fn deleting_missing_point_should_do_nothing() {
        let stack = SuspendStack::new();
        stack.push(1);
        stack.delete_by_self(&7);
        assert_eq!(stack.pop(), Some(1));
    }

    #[test]
    fn pop_where_should_take_newest_match() {
        let stack = SuspendStack::new();
        stack.push(10);
        stack.push(21);
        stack.push(30);
        stack.push(41);
        assert_eq!(stack.pop_where(|p| p % 2 == 1), Some(41));
        assert_eq!(stack.pop_where(|p| p % 2 == 1), Some(21));
        assert_eq!(stack.pop_where(|p| p % 2 == 1), None);
        assert_eq!(stack.pop(), Some(30));
        assert_eq!(stack.pop(), Some(10));
    }

    #[test]
    fn concurrent_pushes_should_all_land() {
        let stack = Arc::new(SuspendStack::new());
        let workers: Vec<_> = (0..8)
            .map(|i| {
                let stack = stack.clone();
                thread::spawn(move || {
                    for j in 0..100 {
                        stack.push(i * 100 + j);
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let mut sum = 0;
        while let Some(v) = stack.pop() {
            sum += v;
        }
        assert_eq!(sum, (0..800).sum::<i32>());
    }

    #[test]
    fn concurrent_deletes_should_race_safely_with_pushes() {
        let stack = Arc::new(SuspendStack::new());
        for v in 0..100 {
            stack.push(v);
        }

        let deleter = {
            let stack = stack.clone();
            thread::spawn(move || {
                for v in (0..100).filter(|v| v % 2 == 0) {
                    stack.delete_by_self(&v);
                }
            })
        };
        let pusher = {
            let stack = stack.clone();
            thread::spawn(move || {
                for v in 100..150 {
                    stack.push(v);
                }
            })
        };
        deleter.join().unwrap();
        pusher.join().unwrap();

        let mut rest = Vec::new();
        while let Some(v) = stack.pop() {
            rest.push(v);
        }
        rest.reverse();

        let old: Vec<_> = rest.iter().cloned().filter(|v| *v < 100).collect();
        let new: Vec<_> = rest.iter().cloned().filter(|v| *v >= 100).collect();
        assert_eq!(old, (0..100).filter(|v| v % 2 == 1).collect::<Vec<_>>());
        assert_eq!(new, (100..150).collect::<Vec<_>>());
    }
}
