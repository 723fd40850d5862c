/// Channel pooling
///
/// Idle channels wait in a per-category queue. A channel is either idle in
/// its queue or owned by exactly one handle; the pool counts every channel it
/// has handed out that still exists.
use std::collections::{HashMap, VecDeque};
use std::fmt;

use super::category::AudioCategory;
use super::clip::AudioClip;
use super::output::{ChannelBackend, OutputChannel};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel#{}", self.0)
    }
}

/// Channel counts for one category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelStats {
    /// Channels that exist, idle or in use
    pub allocated: usize,
    /// Channels waiting in the pool
    pub idle: usize,
    /// Channels owned by a live handle
    pub in_use: usize,
}

pub(crate) struct Channel {
    id: ChannelId,
    category: AudioCategory,
    output: Box<dyn OutputChannel>,
}

impl Channel {
    pub(crate) fn id(&self) -> ChannelId {
        self.id
    }

    pub(crate) fn category(&self) -> AudioCategory {
        self.category
    }

    pub(crate) fn output(&self) -> &dyn OutputChannel {
        self.output.as_ref()
    }

    pub(crate) fn output_mut(&mut self) -> &mut dyn OutputChannel {
        self.output.as_mut()
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.output.is_alive()
    }
}

pub(crate) struct ChannelPool {
    backend: Box<dyn ChannelBackend>,
    idle: HashMap<AudioCategory, VecDeque<Channel>>,
    allocated: HashMap<AudioCategory, usize>,
    next_id: u64,
}

impl ChannelPool {
    pub(crate) fn new(backend: Box<dyn ChannelBackend>) -> Self {
        Self {
            backend,
            idle: HashMap::new(),
            allocated: HashMap::new(),
            next_id: 1,
        }
    }

    pub(crate) fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Take an idle channel or create one, fully reset and holding `clip`
    pub(crate) fn acquire(&mut self, category: AudioCategory, clip: AudioClip) -> Result<Channel> {
        let mut channel = match self.pop_live(category) {
            Some(channel) => {
                tracing::debug!("Reusing {} for {}", channel.id, category);
                channel
            }
            None => {
                let output = self.backend.create_channel(category)?;
                let id = ChannelId(self.next_id);
                self.next_id += 1;
                *self.allocated.entry(category).or_insert(0) += 1;
                tracing::debug!("Created {} for {} on {}", id, category, self.backend.name());
                Channel {
                    id,
                    category,
                    output,
                }
            }
        };

        channel.output.reset();
        channel.output.set_clip(Some(clip));
        Ok(channel)
    }

    fn pop_live(&mut self, category: AudioCategory) -> Option<Channel> {
        let queue = self.idle.get_mut(&category)?;
        while let Some(channel) = queue.pop_front() {
            if channel.is_alive() {
                return Some(channel);
            }
            tracing::debug!("Discarding destroyed {} from {} pool", channel.id, category);
            Self::forget(&mut self.allocated, category);
        }
        None
    }

    fn forget(allocated: &mut HashMap<AudioCategory, usize>, category: AudioCategory) {
        if let Some(count) = allocated.get_mut(&category) {
            *count = count.saturating_sub(1);
        }
    }

    /// Return a channel to its category queue. Returns false when the channel
    /// was not enqueued (already pooled or destroyed).
    pub(crate) fn release(&mut self, channel: Channel) -> bool {
        let category = channel.category;

        if !channel.is_alive() {
            tracing::debug!("Not pooling destroyed {}", channel.id);
            Self::forget(&mut self.allocated, category);
            return false;
        }

        let queue = self.idle.entry(category).or_default();
        if queue.iter().any(|idle| idle.id == channel.id) {
            tracing::warn!("{} released twice; ignoring", channel.id);
            return false;
        }

        tracing::debug!("Released {} to {} pool", channel.id, category);
        queue.push_back(channel);
        true
    }

    pub(crate) fn idle_count(&self, category: AudioCategory) -> usize {
        self.idle.get(&category).map_or(0, VecDeque::len)
    }

    pub(crate) fn allocated_count(&self, category: AudioCategory) -> usize {
        self.allocated.get(&category).copied().unwrap_or(0)
    }

    /// Drop every idle channel
    pub(crate) fn clear(&mut self) {
        for (category, queue) in self.idle.drain() {
            if let Some(count) = self.allocated.get_mut(&category) {
                *count = count.saturating_sub(queue.len());
            }
        }
    }
}
