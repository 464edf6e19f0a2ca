//! Channel table and its partition among the nodes of the mesh.
use std::fmt;
use std::str::FromStr;

/// Radio channel number, as programmed into the transceiver.
pub type Channel = u8;

/// Number of nodes sharing the channel table.
pub const POPULATION: usize = 4;

/// Ordered set of channels used by the whole mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTable(Vec<Channel>);

impl ChannelTable {
    pub fn new(channels: Vec<Channel>) -> Self {
        Self(channels)
    }

    /// Channels 0 to 115 with a spacing of 5, 24 channels in total.
    pub fn standard() -> Self {
        Self((0..=115).step_by(5).collect())
    }

    pub fn channels(&self) -> &[Channel] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Identity of a physical node.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    Tan0,
    Tan1,
    Tbn0,
    Tbn1,
}

impl NodeId {
    pub const ALL: [NodeId; POPULATION] = [NodeId::Tan0, NodeId::Tan1, NodeId::Tbn0, NodeId::Tbn1];

    /// Position of the node in the population, which selects its channel slice.
    pub fn ordinal(&self) -> usize {
        match self {
            NodeId::Tan0 => 0,
            NodeId::Tan1 => 1,
            NodeId::Tbn0 => 2,
            NodeId::Tbn1 => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeId::Tan0 => "tan0",
            NodeId::Tan1 => "tan1",
            NodeId::Tbn0 => "tbn0",
            NodeId::Tbn1 => "tbn1",
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeId {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeId::ALL
            .into_iter()
            .find(|id| id.as_str() == s.trim())
            .ok_or_else(|| ChannelError::UnknownNode {
                name: s.trim().to_owned(),
            })
    }
}

/// Channels a node transmits on (`own`) and listens on (`other`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPartition {
    own: Vec<Channel>,
    other: Vec<Channel>,
}

impl ChannelPartition {
    /// Splits the table for the node at `ordinal`: every 4th channel starting at
    /// `ordinal` is owned, everything else is listened on.
    pub fn new(table: &ChannelTable, ordinal: usize) -> Result<Self, ChannelError> {
        if ordinal >= POPULATION {
            return Err(ChannelError::InvalidOrdinal { ordinal });
        }
        let (own, other): (Vec<_>, Vec<_>) = table
            .channels()
            .iter()
            .enumerate()
            .partition(|(i, _)| i % POPULATION == ordinal);
        let own: Vec<Channel> = own.into_iter().map(|(_, ch)| *ch).collect();
        let other: Vec<Channel> = other.into_iter().map(|(_, ch)| *ch).collect();
        if own.is_empty() || other.is_empty() {
            return Err(ChannelError::TableTooSmall { len: table.len() });
        }
        Ok(Self { own, other })
    }

    pub fn for_node(table: &ChannelTable, node: NodeId) -> Result<Self, ChannelError> {
        Self::new(table, node.ordinal())
    }

    pub fn own(&self) -> &[Channel] {
        &self.own
    }

    pub fn other(&self) -> &[Channel] {
        &self.other
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Unknown node identity '{}' (expected one of tan0, tan1, tbn0, tbn1).", .name)]
    UnknownNode { name: String },

    #[error("Invalid node ordinal {} (population: {}).", .ordinal, POPULATION)]
    InvalidOrdinal { ordinal: usize },

    #[error("Channel table of {} channels cannot be split between {} nodes.", .len, POPULATION)]
    TableTooSmall { len: usize },
}
