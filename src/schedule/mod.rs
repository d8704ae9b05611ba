//! Stop schedules: raw upstream arrivals, the public ETA shape, and the
//! aggregation that turns one into the other.

pub mod aggregator;
pub mod feed;
pub mod source;

pub use aggregator::{ScheduleAggregator, ScheduleQuery};
pub use feed::{FeedId, UnknownFeed};
pub use source::{FeedEndpoint, FeedSource, GtfsFeedClient, StopLookup};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Label used in place of a numeric ETA when the train is at the platform.
pub const AT_STATION: &str = "At the station";

/// One predicted arrival as reported upstream.
///
/// `arrival_time` is epoch seconds, or `None` when the train is currently at
/// the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrivalEntry {
    pub route_id: String,
    pub arrival_time: Option<i64>,
}

impl ArrivalEntry {
    pub fn new(route_id: impl Into<String>, arrival_time: Option<i64>) -> Self {
        Self {
            route_id: route_id.into(),
            arrival_time,
        }
    }
}

/// Arrivals at one stop from one feed, split by direction and sorted
/// ascending by arrival time. May contain predictions already in the past.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawStopSchedule {
    pub north: Vec<ArrivalEntry>,
    pub south: Vec<ArrivalEntry>,
}

/// Seconds until arrival, or the at-the-station sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "EtaRepr", try_from = "EtaRepr")]
pub enum Eta {
    Seconds(u64),
    AtStation,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum EtaRepr {
    Seconds(u64),
    Label(String),
}

impl From<Eta> for EtaRepr {
    fn from(eta: Eta) -> Self {
        match eta {
            Eta::Seconds(secs) => EtaRepr::Seconds(secs),
            Eta::AtStation => EtaRepr::Label(AT_STATION.to_string()),
        }
    }
}

impl TryFrom<EtaRepr> for Eta {
    type Error = String;

    fn try_from(repr: EtaRepr) -> Result<Self, Self::Error> {
        match repr {
            EtaRepr::Seconds(secs) => Ok(Eta::Seconds(secs)),
            EtaRepr::Label(label) if label.eq_ignore_ascii_case(AT_STATION) => Ok(Eta::AtStation),
            EtaRepr::Label(label) => Err(format!("unexpected eta label '{label}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrivalView {
    pub route_id: String,
    pub eta: Eta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionalArrivals {
    #[serde(rename = "N")]
    pub north: Vec<ArrivalView>,
    #[serde(rename = "S")]
    pub south: Vec<ArrivalView>,
}

/// The public schedule: one entry per feed serving the stop, or the bare
/// pair when a single feed was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregatedSchedule {
    ByFeed(BTreeMap<FeedId, DirectionalArrivals>),
    Single(DirectionalArrivals),
}

/// Outcome of a schedule request that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleResult {
    Schedule(AggregatedSchedule),
    /// The requested feed responded but does not serve this stop.
    NoDataForStop { feed: FeedId, stop_id: String },
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Missing {0} parameter")]
    MissingParameter(&'static str),
    #[error("Invalid {name} parameter: {value}")]
    InvalidParameter { name: &'static str, value: String },
    #[error("Feed {feed} is unavailable: {reason:#}")]
    UpstreamUnavailable { feed: FeedId, reason: anyhow::Error },
}

/// Which side of the platform to compute.
///
/// Exactly `"N"` or `"S"` selects one side; anything else selects both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DirectionFilter {
    North,
    South,
    #[default]
    Both,
}

impl DirectionFilter {
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some("N") => DirectionFilter::North,
            Some("S") => DirectionFilter::South,
            _ => DirectionFilter::Both,
        }
    }

    pub fn includes_north(self) -> bool {
        self != DirectionFilter::South
    }

    pub fn includes_south(self) -> bool {
        self != DirectionFilter::North
    }

    pub fn as_query(self) -> Option<&'static str> {
        match self {
            DirectionFilter::North => Some("N"),
            DirectionFilter::South => Some("S"),
            DirectionFilter::Both => None,
        }
    }
}
