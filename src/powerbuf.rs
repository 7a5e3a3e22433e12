//! Power-profiling ring buffer (spec.md §3, §4.11, L6), grounded on
//! `original_source/util/powerbuf.c`.
//!
//! Two circular buffers: a session ring (bounded to
//! [`MAX_SESSIONS`]) and a sample ring of `(current_uA, mab)` pairs
//! bounded to the buffer's configured capacity. A lazily rebuilt
//! sorted-by-MAB index supports O(log n + k) lookup.

use crate::address::Address;

pub const MAX_SESSIONS: usize = 8;
pub const DEFAULT_SAMPLES: usize = 131_072;

/// A power-profiling session: wall-clock start time, the sample-ring
/// index its first sample lives at, and the running integral of current
/// over its live samples.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub wall_clock: u64,
    pub start_index: usize,
    pub total_ua: u64,
}

/// Fixed-capacity circular sample store plus a bounded ring of sessions
/// (spec.md §3 "Power buffer").
#[derive(Debug)]
pub struct PowerBuffer {
    interval_us: u32,
    max_samples: usize,

    sessions: [Session; MAX_SESSIONS],
    session_head: usize,
    session_tail: usize,

    current_ua: Vec<u32>,
    mab: Vec<Address>,
    current_head: usize,
    current_tail: usize,

    sort_valid: bool,
    sorted: Vec<usize>,
}

impl PowerBuffer {
    /// `max_samples` must be nonzero (spec.md: "fixed capacity").
    pub fn new(max_samples: usize, interval_us: u32) -> Self {
        assert!(max_samples > 0);
        PowerBuffer {
            interval_us,
            max_samples,
            sessions: [Session {
                wall_clock: 0,
                start_index: 0,
                total_ua: 0,
            }; MAX_SESSIONS],
            session_head: 0,
            session_tail: 0,
            current_ua: vec![0; max_samples],
            mab: vec![Address::new(0); max_samples],
            current_head: 0,
            current_tail: 0,
            sort_valid: false,
            sorted: vec![0; max_samples],
        }
    }

    pub fn interval_us(&self) -> u32 {
        self.interval_us
    }

    pub fn clear(&mut self) {
        self.session_head = 0;
        self.session_tail = 0;
        self.current_head = 0;
        self.current_tail = 0;
        self.sort_valid = false;
    }

    fn session_length(&self, idx: usize) -> usize {
        let next_idx = (idx + 1) % MAX_SESSIONS;
        let end_index = if next_idx != self.session_head {
            self.sessions[next_idx].start_index
        } else {
            self.current_head
        };
        (end_index + self.max_samples - self.sessions[idx].start_index) % self.max_samples
    }

    fn pop_oldest_session(&mut self) {
        let length = self.session_length(self.session_tail);
        self.current_tail = (self.current_tail + length) % self.max_samples;
        self.session_tail = (self.session_tail + 1) % MAX_SESSIONS;
    }

    /// `(head - 1 - n) mod MAX_SESSIONS`: the index of the nth most
    /// recent session.
    fn rev_index(&self, n: usize) -> usize {
        (self.session_head + MAX_SESSIONS - 1 - n) % MAX_SESSIONS
    }

    /// Pushes a new session head, first discarding the previous head if
    /// it was left empty by [`Self::end_session`].
    pub fn begin_session(&mut self, when: u64) {
        self.end_session();

        let next_head = (self.session_head + 1) % MAX_SESSIONS;
        if next_head == self.session_tail {
            self.pop_oldest_session();
        }

        let s = &mut self.sessions[self.session_head];
        s.wall_clock = when;
        s.start_index = self.current_head;
        s.total_ua = 0;

        self.session_head = next_head;
    }

    /// Discards the current session if no samples were added to it.
    pub fn end_session(&mut self) {
        if self.session_head == self.session_tail {
            return;
        }
        let last_idx = self.rev_index(0);
        if self.sessions[last_idx].start_index == self.current_head {
            self.session_head = last_idx;
        }
    }

    pub fn num_sessions(&self) -> usize {
        (self.session_head + MAX_SESSIONS - self.session_tail) % MAX_SESSIONS
    }

    /// `rev_idx = 0` is the most recent session.
    pub fn session_info(&self, rev_idx: usize) -> (Session, usize) {
        let idx = self.rev_index(rev_idx);
        (self.sessions[idx], self.session_length(idx))
    }

    fn ensure_room(&mut self, required: usize) {
        let mut room =
            (self.current_tail + self.max_samples - self.current_head - 1) % self.max_samples;

        while room < required && self.num_sessions() > 1 {
            let len = self.session_length(self.session_tail);
            if room + len > required {
                break;
            }
            self.pop_oldest_session();
            room += len;
        }

        while room < required {
            let tail = self.session_tail;
            let start_index = self.sessions[tail].start_index;
            let mut cont_len = self.max_samples - start_index;
            if cont_len + room > required {
                cont_len = required - room;
            }

            let mut removed = 0u64;
            for i in 0..cont_len {
                removed += self.current_ua[start_index + i] as u64;
            }
            self.sessions[tail].total_ua -= removed;
            self.sessions[tail].start_index = (start_index + cont_len) % self.max_samples;
            self.current_tail = (self.current_tail + cont_len) % self.max_samples;

            room += cont_len;
        }
    }

    /// Pushes `count` `(current_uA, mab)` samples, updating the current
    /// session's `total_uA` and evicting oldest sessions/samples if
    /// capacity would otherwise be exceeded. No-op if no session is
    /// active.
    pub fn add_samples(&mut self, current_ua: &[u32], mab: &[Address]) {
        if self.session_head == self.session_tail {
            return;
        }
        let mut current_ua = current_ua;
        let mut mab = mab;
        let mut count = current_ua.len();

        if count > self.max_samples - 1 {
            let extra = count - (self.max_samples - 1);
            current_ua = &current_ua[extra..];
            mab = &mab[extra..];
            count -= extra;
        }

        self.ensure_room(count);

        let cur_idx = self.rev_index(0);
        let sum: u64 = current_ua.iter().map(|&v| v as u64).sum();
        self.sessions[cur_idx].total_ua += sum;

        let mut remaining = count;
        let mut src_off = 0;
        while remaining > 0 {
            let mut cont_len = self.max_samples - self.current_head;
            if cont_len > remaining {
                cont_len = remaining;
            }
            self.current_ua[self.current_head..self.current_head + cont_len]
                .copy_from_slice(&current_ua[src_off..src_off + cont_len]);
            self.mab[self.current_head..self.current_head + cont_len]
                .copy_from_slice(&mab[src_off..src_off + cont_len]);
            self.current_head = (self.current_head + cont_len) % self.max_samples;
            src_off += cont_len;
            remaining -= cont_len;
        }

        self.sort_valid = false;
    }

    /// MAB of the most recent sample, or 0 if the current session is
    /// empty.
    pub fn last_mab(&self) -> Address {
        let s = self.sessions[self.rev_index(0)];
        if s.start_index == self.current_head {
            return Address::new(0);
        }
        let last = (self.current_head + self.max_samples - 1) % self.max_samples;
        self.mab[last]
    }

    fn num_samples(&self) -> usize {
        (self.current_head + self.max_samples - self.current_tail) % self.max_samples
    }

    fn sift_down(&mut self, start: usize, end: usize) {
        let mut root = start;
        while root * 2 + 1 <= end {
            let left_child = root * 2 + 1;
            let mut biggest = root;
            if self.mab[self.sorted[biggest]] < self.mab[self.sorted[left_child]] {
                biggest = left_child;
            }
            if left_child + 1 <= end
                && self.mab[self.sorted[biggest]] < self.mab[self.sorted[left_child + 1]]
            {
                biggest = left_child + 1;
            }
            if biggest == root {
                break;
            }
            self.sorted.swap(biggest, root);
            root = biggest;
        }
    }

    /// Rebuilds the MAB-sorted index via an in-place heap sort, only
    /// when the buffer has been mutated since the last sort.
    pub fn sort(&mut self) {
        if self.sort_valid {
            return;
        }
        let num_samples = self.num_samples();
        for i in 0..num_samples {
            self.sorted[i] = (self.current_tail + i) % self.max_samples;
        }
        if num_samples >= 2 {
            let mut start = (num_samples as isize - 2) / 2;
            while start >= 0 {
                self.sift_down(start as usize, num_samples - 1);
                start -= 1;
            }
            let mut end = num_samples - 1;
            while end > 0 {
                self.sorted.swap(0, end);
                end -= 1;
                self.sift_down(0, end);
            }
        }
        self.sort_valid = true;
    }

    fn find_mab_ge(&self, mab: Address) -> Option<usize> {
        let num_samples = self.num_samples();
        if num_samples == 0 {
            return None;
        }
        let mut low = 0isize;
        let mut high = num_samples as isize - 1;
        while low <= high {
            let mid = (low + high) / 2;
            if self.mab[self.sorted[mid as usize]] < mab {
                low = mid + 1;
            } else if mid <= 0 || self.mab[self.sorted[(mid - 1) as usize]] < mab {
                return Some(mid as usize);
            } else {
                high = mid - 1;
            }
        }
        None
    }

    /// Binary-searches for the first sample at `mab` then accumulates
    /// while the key matches, rebuilding the sort index first if stale.
    /// Returns `(count, sum_uA)`.
    pub fn get_by_mab(&mut self, mab: Address) -> (usize, u64) {
        if !self.sort_valid {
            self.sort();
        }
        let num_samples = self.num_samples();
        let Some(mut i) = self.find_mab_ge(mab) else {
            return (0, 0);
        };
        let mut count = 0;
        let mut sum = 0u64;
        while i < num_samples && self.mab[self.sorted[i]] == mab {
            sum += self.current_ua[self.sorted[i]] as u64;
            count += 1;
            i += 1;
        }
        (count, sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_profiling_session_scenario() {
        let mut pb = PowerBuffer::new(1024, 100);
        pb.begin_session(1_000_000);
        pb.add_samples(
            &[100, 200, 100, 200],
            &[
                Address::new(0x4000),
                Address::new(0x4002),
                Address::new(0x4000),
                Address::new(0x4002),
            ],
        );
        pb.end_session();

        assert_eq!(pb.get_by_mab(Address::new(0x4000)), (2, 200));
        assert_eq!(pb.get_by_mab(Address::new(0x4002)), (2, 400));

        let (session, _len) = pb.session_info(0);
        assert_eq!(session.total_ua, 600);
    }

    #[test]
    fn total_ua_matches_sum_of_live_samples() {
        let mut pb = PowerBuffer::new(8, 10);
        pb.begin_session(1);
        pb.add_samples(&[10, 20, 30], &[Address::new(1); 3]);
        let (session, _) = pb.session_info(0);
        assert_eq!(session.total_ua, 60);
    }

    #[test]
    fn sessions_stay_chronological_under_eviction() {
        let mut pb = PowerBuffer::new(4, 10);
        for t in 0..10u64 {
            pb.begin_session(t);
            pb.add_samples(&[t as u32], &[Address::new(t as u32)]);
        }
        // the buffer holds at most MAX_SESSIONS - 1 live sessions before
        // wraparound kicks in; whichever remain must still be ordered.
        let n = pb.num_sessions();
        let mut last = u64::MAX;
        for i in 0..n {
            let (s, _) = pb.session_info(i);
            assert!(s.wall_clock <= last);
            last = s.wall_clock;
        }
    }

    #[test]
    fn empty_session_is_discarded() {
        let mut pb = PowerBuffer::new(8, 10);
        pb.begin_session(1);
        pb.end_session();
        assert_eq!(pb.num_sessions(), 0);
    }

    #[test]
    fn last_mab_is_zero_when_empty() {
        let pb = PowerBuffer::new(8, 10);
        assert_eq!(pb.last_mab(), Address::new(0));
    }
}
