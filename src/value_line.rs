//! A value that changes over time, in MIDI ticks.

/// A single change of a [`ValueLine`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ValueChange<T> {
    /// Absolute time of the change, in ticks.
    pub time: u64,
    /// The value in effect from `time` on, until the next change.
    pub value: T,
}

/// A time-ordered list of value changes on top of a default value.
///
/// The line is always kept normalized:
/// - There is at most one change per tick. Setting a value at an already occupied tick
///   overwrites it.
/// - A change never repeats the value in effect right before it. Such changes are dropped.
///
/// Because of this, setting a value equal to the current one is a no-op, and setting a value and
/// then setting the previous value back at the same tick leaves the line untouched.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ValueLine<T> {
    default: T,
    changes: Vec<ValueChange<T>>,
}
impl<T: Clone + PartialEq> ValueLine<T> {
    /// Create a line that has the given value at every point in time.
    pub fn new(default: T) -> ValueLine<T> {
        ValueLine {
            default,
            changes: Vec::new(),
        }
    }

    /// The value in effect before the first change.
    #[inline]
    pub fn default_value(&self) -> &T {
        &self.default
    }

    /// All changes, sorted by time.
    #[inline]
    pub fn changes(&self) -> &[ValueChange<T>] {
        &self.changes
    }

    /// The value in effect at the given tick.
    pub fn value_at(&self, time: u64) -> &T {
        //Number of changes at or before `time`
        let idx = self.changes.partition_point(|change| change.time <= time);
        match idx {
            0 => &self.default,
            idx => &self.changes[idx - 1].value,
        }
    }

    /// The first change strictly after the given tick.
    pub fn next_change_after(&self, time: u64) -> Option<&ValueChange<T>> {
        let idx = self.changes.partition_point(|change| change.time <= time);
        self.changes.get(idx)
    }

    /// Changes with `start <= time < end`.
    pub fn changes_between(&self, start: u64, end: u64) -> &[ValueChange<T>] {
        let lo = self.changes.partition_point(|change| change.time < start);
        let hi = self.changes.partition_point(|change| change.time < end);
        &self.changes[lo..hi.max(lo)]
    }

    /// Set the value in effect from `time` until the next change.
    ///
    /// Returns whether the set of changes was modified.
    pub fn set(&mut self, time: u64, value: T) -> bool {
        let idx = match self
            .changes
            .binary_search_by_key(&time, |change| change.time)
        {
            Ok(idx) => {
                if self.changes[idx].value == value {
                    return false;
                }
                self.changes[idx].value = value;
                idx
            }
            Err(idx) => {
                if *self.value_before(idx) == value {
                    return false;
                }
                self.changes.insert(idx, ValueChange { time, value });
                idx
            }
        };
        //Only the neighbors of the touched change can have become redundant
        if self
            .changes
            .get(idx + 1)
            .map_or(false, |next| next.value == self.changes[idx].value)
        {
            self.changes.remove(idx + 1);
        }
        if *self.value_before(idx) == self.changes[idx].value {
            self.changes.remove(idx);
        }
        true
    }

    /// Remove every change, leaving only the default value.
    pub fn clear(&mut self) {
        self.changes.clear();
    }

    /// The value in effect right before the change at `idx`.
    fn value_before(&self, idx: usize) -> &T {
        match idx {
            0 => &self.default,
            idx => &self.changes[idx - 1].value,
        }
    }

    /// Mirror the line around the `center` tick.
    ///
    /// Tick `t` of the result holds the value of tick `2 * center - t - 1` of this line, so the
    /// tick right before `center` becomes the tick right at `center`. Walking forward from
    /// `center` in the flipped line is the same as walking backward from `center` in this one.
    /// Ticks that would map before zero take the value at tick zero.
    pub fn flip(&self, center: u64) -> ValueLine<T> {
        let span = center.saturating_mul(2);
        let mut flipped = ValueLine::new(self.value_at(span.saturating_sub(1)).clone());
        for change in self.changes.iter().rev() {
            if change.time == 0 || change.time >= span {
                continue;
            }
            flipped.set(span - change.time, self.value_at(change.time - 1).clone());
        }
        flipped
    }
}
impl<T: Clone + PartialEq + Default> Default for ValueLine<T> {
    fn default() -> ValueLine<T> {
        ValueLine::new(T::default())
    }
}
impl<'a, T> IntoIterator for &'a ValueLine<T> {
    type Item = &'a ValueChange<T>;
    type IntoIter = std::slice::Iter<'a, ValueChange<T>>;
    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}
