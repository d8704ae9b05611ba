use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The MTA subway real-time feeds, identified by their datamine `feed_id`.
///
/// Adding a feed means adding a variant here and listing it in [`FeedId::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "FeedKey")]
pub enum FeedId {
    /// 1 2 3 4 5 6 and the 42 St shuttle
    Numbered = 1,
    L = 2,
    StatenIsland = 11,
    Nqrw = 16,
    Bdfm = 21,
    Ace = 26,
    G = 31,
    Jz = 36,
    Seven = 51,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown feed id '{0}'")]
pub struct UnknownFeed(pub String);

impl FeedId {
    /// Fan-out order used when no feed is requested.
    pub const ALL: [FeedId; 9] = [
        FeedId::Numbered,
        FeedId::Ace,
        FeedId::Nqrw,
        FeedId::Bdfm,
        FeedId::L,
        FeedId::StatenIsland,
        FeedId::G,
        FeedId::Jz,
        FeedId::Seven,
    ];

    pub fn id(self) -> u32 {
        self as u32
    }

    /// Routes carried by the feed. Trips of any other route are ignored.
    pub fn routes(self) -> &'static [&'static str] {
        match self {
            FeedId::Numbered => &["1", "2", "3", "4", "5", "5X", "6", "6X", "GS"],
            FeedId::L => &["L"],
            FeedId::StatenIsland => &["SI"],
            FeedId::Nqrw => &["N", "Q", "R", "W"],
            FeedId::Bdfm => &["B", "D", "F", "FX", "M"],
            FeedId::Ace => &["A", "C", "E", "H", "FS"],
            FeedId::G => &["G"],
            FeedId::Jz => &["J", "Z"],
            FeedId::Seven => &["7", "7X"],
        }
    }

    /// Path segment of the feed on the API gateway.
    pub fn gateway_path(self) -> &'static str {
        match self {
            FeedId::Numbered | FeedId::Seven => "nyct%2Fgtfs",
            FeedId::L => "nyct%2Fgtfs-l",
            FeedId::StatenIsland => "nyct%2Fgtfs-si",
            FeedId::Nqrw => "nyct%2Fgtfs-nqrw",
            FeedId::Bdfm => "nyct%2Fgtfs-bdfm",
            FeedId::Ace => "nyct%2Fgtfs-ace",
            FeedId::G => "nyct%2Fgtfs-g",
            FeedId::Jz => "nyct%2Fgtfs-jz",
        }
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl From<FeedId> for u32 {
    fn from(feed: FeedId) -> Self {
        feed.id()
    }
}

impl TryFrom<u32> for FeedId {
    type Error = UnknownFeed;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        FeedId::ALL
            .into_iter()
            .find(|feed| feed.id() == id)
            .ok_or_else(|| UnknownFeed(id.to_string()))
    }
}

impl FromStr for FeedId {
    type Err = UnknownFeed;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id: u32 = s.trim().parse().map_err(|_| UnknownFeed(s.to_string()))?;
        FeedId::try_from(id)
    }
}

/// Feed ids arrive as numbers in values and as strings in JSON object keys.
#[derive(Deserialize)]
#[serde(untagged)]
enum FeedKey {
    Number(u32),
    Text(String),
}

impl TryFrom<FeedKey> for FeedId {
    type Error = UnknownFeed;

    fn try_from(key: FeedKey) -> Result<Self, Self::Error> {
        match key {
            FeedKey::Number(id) => FeedId::try_from(id),
            FeedKey::Text(text) => text.parse(),
        }
    }
}
