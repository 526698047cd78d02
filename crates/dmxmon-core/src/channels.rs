// ── DMX universe state ──

use std::collections::BTreeMap;

/// Number of channels in one DMX universe.
pub const CHANNEL_COUNT: usize = 512;

/// Decoded channel updates: channel index (0-based) to new value.
///
/// Indices are not validated here; the buffer drops anything out of range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet(BTreeMap<usize, u8>);

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, channel: usize, value: u8) {
        self.0.insert(channel, value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, u8)> + '_ {
        self.0.iter().map(|(&channel, &value)| (channel, value))
    }
}

impl FromIterator<(usize, u8)> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = (usize, u8)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Last-known value of every channel in the universe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelBuffer {
    values: Box<[u8; CHANNEL_COUNT]>,
}

impl Default for ChannelBuffer {
    fn default() -> Self {
        Self {
            values: Box::new([0; CHANNEL_COUNT]),
        }
    }
}

impl ChannelBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite every in-range channel named by `changes`.
    ///
    /// Indices `>= CHANNEL_COUNT` are skipped. Returns how many channels
    /// were written.
    pub fn apply(&mut self, changes: &ChangeSet) -> usize {
        let mut written = 0;
        for (channel, value) in changes.iter() {
            if let Some(slot) = self.values.get_mut(channel) {
                *slot = value;
                written += 1;
            }
        }
        written
    }

    /// Back to all-zero.
    pub fn reset(&mut self) {
        self.values.fill(0);
    }

    pub fn get(&self, channel: usize) -> Option<u8> {
        self.values.get(channel).copied()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.values.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_updates_exactly_the_named_channels() {
        let mut buffer = ChannelBuffer::new();
        let changes: ChangeSet = [(0, 10), (3, 200), (511, 255)].into_iter().collect();

        assert_eq!(buffer.apply(&changes), 3);

        for (i, &v) in buffer.as_slice().iter().enumerate() {
            let expected = match i {
                0 => 10,
                3 => 200,
                511 => 255,
                _ => 0,
            };
            assert_eq!(v, expected, "channel {i}");
        }
    }

    #[test]
    fn out_of_range_index_leaves_buffer_untouched() {
        let mut buffer = ChannelBuffer::new();
        buffer.apply(&[(7, 42)].into_iter().collect());
        let before = buffer.clone();

        let written = buffer.apply(&[(512, 99), (70_000, 1)].into_iter().collect());

        assert_eq!(written, 0);
        assert_eq!(buffer, before);
    }

    #[test]
    fn out_of_range_entries_do_not_block_valid_ones() {
        let mut buffer = ChannelBuffer::new();
        let written = buffer.apply(&[(1, 5), (600, 9)].into_iter().collect());
        assert_eq!(written, 1);
        assert_eq!(buffer.get(1), Some(5));
    }

    #[test]
    fn reset_zeroes_everything() {
        let mut buffer = ChannelBuffer::new();
        buffer.apply(&(0..CHANNEL_COUNT).map(|i| (i, 0xAA)).collect());
        buffer.reset();
        assert!(buffer.as_slice().iter().all(|&v| v == 0));
        assert_eq!(buffer.as_slice().len(), CHANNEL_COUNT);
    }
}
