/// Decides when a finished message should trigger a hardware refresh.
///
/// Clients usually send one message per channel, in ascending order, for every
/// frame. Refreshing after each one would redraw every strip `strips` times per
/// frame, so the refresh is deferred until a channel at least as high as any
/// seen on this connection completes. The first frame after connecting still
/// refreshes once per channel, because the channel count is not known yet.
///
/// This is a heuristic, not end-of-frame detection: a client that only ever
/// resends a channel lower than the highest seen will not trigger refreshes.
#[derive(Debug, Default)]
pub struct ChannelCoalescer {
    highest_channel_seen: u8,
    commit_pending: bool,
}

impl ChannelCoalescer {
    /// Record a freshly parsed header's channel
    pub fn observe(&mut self, channel: u8) {
        if channel >= self.highest_channel_seen {
            self.commit_pending = true;
            self.highest_channel_seen = channel;
        }
    }

    /// Consume the pending commit, if any
    pub fn take_commit(&mut self) -> bool {
        std::mem::take(&mut self.commit_pending)
    }

    pub fn commit_pending(&self) -> bool {
        self.commit_pending
    }

    pub fn highest_channel_seen(&self) -> u8 {
        self.highest_channel_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_commits_every_channel() {
        let mut coalescer = ChannelCoalescer::default();
        for channel in 1..=4 {
            coalescer.observe(channel);
            assert!(coalescer.take_commit());
        }
        assert_eq!(coalescer.highest_channel_seen(), 4);
    }

    #[test]
    fn test_later_frames_commit_on_highest_only() {
        let mut coalescer = ChannelCoalescer::default();
        for channel in 1..=4 {
            coalescer.observe(channel);
            coalescer.take_commit();
        }

        let commits: Vec<bool> = (1..=4)
            .map(|channel| {
                coalescer.observe(channel);
                coalescer.take_commit()
            })
            .collect();
        assert_eq!(commits, vec![false, false, false, true]);
    }

    #[test]
    fn test_pending_survives_until_taken() {
        let mut coalescer = ChannelCoalescer::default();
        coalescer.observe(2);
        coalescer.observe(1);
        assert!(coalescer.commit_pending());
        assert!(coalescer.take_commit());
        assert!(!coalescer.take_commit());
    }

    #[test]
    fn test_repeating_low_channel_never_commits() {
        let mut coalescer = ChannelCoalescer::default();
        coalescer.observe(5);
        coalescer.take_commit();
        for _ in 0..10 {
            coalescer.observe(1);
            assert!(!coalescer.take_commit());
        }
    }
}
