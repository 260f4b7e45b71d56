use std::ops::RangeInclusive;

/// Splits an inclusive block range into consecutive windows of at most `size` blocks.
///
/// The last window is clamped to the end of the range, so no block past `end` is ever requested.
#[derive(Debug, Clone)]
pub(crate) struct WindowIterator {
    current: u64,
    end: u64,
    size: u64,
    exhausted: bool,
}

impl WindowIterator {
    /// Creates an iterator yielding windows from `start` toward `end`, inclusive.
    ///
    /// A `size` of 0 is treated as 1.
    #[must_use]
    pub(crate) fn new(start: u64, end: u64, size: usize) -> Self {
        Self { current: start, end, size: (size as u64).max(1), exhausted: start > end }
    }
}

impl Iterator for WindowIterator {
    type Item = RangeInclusive<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let window_start = self.current;
        let window_end = window_start.saturating_add(self.size - 1).min(self.end);
        if window_end == self.end {
            self.exhausted = true;
        } else {
            self.current = window_end + 1;
        }

        Some(window_start..=window_end)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.exhausted {
            return (0, Some(0));
        }
        match usize::try_from((self.end - self.current) / self.size + 1) {
            Ok(remaining) => (remaining, Some(remaining)),
            Err(_) => (usize::MAX, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_of_blocks() {
        let windows: Vec<_> = WindowIterator::new(100, 105, 2).collect();

        assert_eq!(windows, vec![100..=101, 102..=103, 104..=105]);
    }

    #[test]
    fn last_window_is_clamped() {
        let mut iter = WindowIterator::new(100, 106, 5);
        assert_eq!(iter.next(), Some(100..=104));
        assert_eq!(iter.next(), Some(105..=106));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn single_block() {
        let mut iter = WindowIterator::new(100, 100, 5);
        assert_eq!(iter.size_hint(), (1, Some(1)));
        assert_eq!(iter.next(), Some(100..=100));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn inverted_range_is_empty() {
        let mut iter = WindowIterator::new(200, 100, 5);
        assert_eq!(iter.size_hint(), (0, Some(0)));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn zero_size_behaves_as_one() {
        let windows: Vec<_> = WindowIterator::new(0, 2, 0).collect();

        assert_eq!(windows, vec![0..=0, 1..=1, 2..=2]);
    }

    #[test]
    fn range_ending_at_u64_max_terminates() {
        let windows: Vec<_> = WindowIterator::new(u64::MAX - 2, u64::MAX, 2).collect();

        assert_eq!(windows, vec![u64::MAX - 2..=u64::MAX - 1, u64::MAX..=u64::MAX]);
    }

    #[test]
    fn size_hint_counts_remaining_windows() {
        let mut iter = WindowIterator::new(100, 250, 50);
        assert_eq!(iter.size_hint(), (4, Some(4)));
        iter.next();
        assert_eq!(iter.size_hint(), (3, Some(3)));
    }
}
