use serde::{Deserialize, Serialize};

/// Longest channel name kept from the target, in bytes
pub const MAX_CHANNEL_NAME_LEN: usize = 31;

const MAX_PRESIZED_CHANNELS: u32 = 64;

/// Channel direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelDirection {
    /// Target to host
    Up,
    /// Host to target
    Down,
}

impl std::fmt::Display for ChannelDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelDirection::Up => write!(f, "up"),
            ChannelDirection::Down => write!(f, "down"),
        }
    }
}

/// One logical RTT byte stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub index: u32,
    pub direction: ChannelDirection,
    pub name: String,
    pub buffer_size: u32,
}

impl Channel {
    pub fn new(index: u32, direction: ChannelDirection, name: &str, buffer_size: u32) -> Self {
        Self {
            index,
            direction,
            name: truncate_name(name).to_string(),
            buffer_size,
        }
    }
}

fn truncate_name(name: &str) -> &str {
    if name.len() <= MAX_CHANNEL_NAME_LEN {
        return name;
    }
    let mut end = MAX_CHANNEL_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Channels discovered during one session start
///
/// Built once by [`ChannelRegistryBuilder`]; read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelRegistry {
    down: Vec<Channel>,
    up: Vec<Channel>,
}

impl ChannelRegistry {
    pub fn builder(down_count: u32, up_count: u32) -> ChannelRegistryBuilder {
        // counts are reported by the target
        ChannelRegistryBuilder {
            down: Vec::with_capacity(down_count.min(MAX_PRESIZED_CHANNELS) as usize),
            up: Vec::with_capacity(up_count.min(MAX_PRESIZED_CHANNELS) as usize),
        }
    }

    pub fn get(&self, direction: ChannelDirection, index: u32) -> Option<&Channel> {
        self.channels(direction).get(index as usize)
    }

    /// Channels of one direction in index order
    pub fn channels(&self, direction: ChannelDirection) -> &[Channel] {
        match direction {
            ChannelDirection::Down => &self.down,
            ChannelDirection::Up => &self.up,
        }
    }

    pub fn down_channels(&self) -> &[Channel] {
        &self.down
    }

    pub fn up_channels(&self) -> &[Channel] {
        &self.up
    }

    pub fn count(&self, direction: ChannelDirection) -> u32 {
        self.channels(direction).len() as u32
    }

    pub fn contains(&self, direction: ChannelDirection, index: u32) -> bool {
        index < self.count(direction)
    }

    pub fn is_empty(&self) -> bool {
        self.down.is_empty() && self.up.is_empty()
    }

    /// All channels, down first, each direction in index order
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.down.iter().chain(self.up.iter())
    }
}

/// Collects channels in index order while discovery runs
#[derive(Debug)]
pub struct ChannelRegistryBuilder {
    down: Vec<Channel>,
    up: Vec<Channel>,
}

impl ChannelRegistryBuilder {
    /// Append the next channel of `direction`; its index is its position
    pub fn push(&mut self, direction: ChannelDirection, name: &str, buffer_size: u32) -> &Channel {
        let list = match direction {
            ChannelDirection::Down => &mut self.down,
            ChannelDirection::Up => &mut self.up,
        };
        let index = list.len() as u32;
        list.push(Channel::new(index, direction, name, buffer_size));
        &list[list.len() - 1]
    }

    pub fn build(self) -> ChannelRegistry {
        ChannelRegistry {
            down: self.down,
            up: self.up,
        }
    }
}
