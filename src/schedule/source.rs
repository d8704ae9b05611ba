//! Upstream feed access: fetch a GTFS-RT feed and cut out one stop.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::{ArrivalEntry, FeedId, RawStopSchedule};
use crate::fetch::{HttpClient, fetch_bytes};
use crate::gtfs_rt::FeedMessage;
use crate::gtfs_rt::trip_update::stop_time_update::ScheduleRelationship;
use crate::parser::parse_feed;

/// What a feed knows about a stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopLookup {
    /// No trip in the feed references the stop.
    NotServed,
    /// The feed serves the stop; the schedule may still hold only stale
    /// predictions.
    Served(RawStopSchedule),
}

/// Source of per-stop schedules for a feed.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn schedule(&self, feed: FeedId, stop_id: &str) -> Result<StopLookup>;
}

/// Where the feeds live and how a feed id becomes a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEndpoint {
    /// Legacy single endpoint selecting the feed with `?feed_id=`.
    Datamine { base_url: String },
    /// One path per feed under a common base.
    Gateway { base_url: String },
}

impl FeedEndpoint {
    pub fn url_for(&self, feed: FeedId) -> String {
        match self {
            FeedEndpoint::Datamine { base_url } => format!("{base_url}?feed_id={}", feed.id()),
            FeedEndpoint::Gateway { base_url } => {
                format!("{}/{}", base_url.trim_end_matches('/'), feed.gateway_path())
            }
        }
    }
}

/// [`FeedSource`] backed by live GTFS-RT feeds.
pub struct GtfsFeedClient<C> {
    client: C,
    endpoint: FeedEndpoint,
}

impl<C: HttpClient> GtfsFeedClient<C> {
    pub fn new(client: C, endpoint: FeedEndpoint) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl<C: HttpClient> FeedSource for GtfsFeedClient<C> {
    #[tracing::instrument(skip(self, feed), fields(feed = %feed))]
    async fn schedule(&self, feed: FeedId, stop_id: &str) -> Result<StopLookup> {
        let url = self.endpoint.url_for(feed);
        let bytes = fetch_bytes(&self.client, &url)
            .await
            .with_context(|| format!("fetching feed {feed}"))?;
        debug!(bytes = bytes.len(), "Feed bytes received, parsing");

        let message = parse_feed(&bytes)?;
        Ok(stop_schedule(&message, feed, stop_id))
    }
}

/// Collects the arrivals at `stop_id` from the trip updates in `message` that
/// run one of `feed`'s routes.
///
/// Feeds that share an upstream message only see their own trips. A bare stop
/// id such as `101` matches both platforms (`101N`, `101S`); an id that
/// already carries the suffix matches only that platform. Skipped stops are
/// ignored. Each direction is sorted by arrival time with trains at the
/// platform first.
pub fn stop_schedule(message: &FeedMessage, feed: FeedId, stop_id: &str) -> StopLookup {
    let north_id = platform_id(stop_id, 'N');
    let south_id = platform_id(stop_id, 'S');

    let mut served = false;
    let mut schedule = RawStopSchedule::default();

    let routes = feed.routes();
    let trip_updates = message
        .entity
        .iter()
        .filter(|e| !e.is_deleted())
        .filter_map(|e| e.trip_update.as_ref())
        .filter(|u| routes.iter().any(|r| *r == u.trip.route_id()));

    for update in trip_updates {
        let route_id = update.trip.route_id();
        for stop_time in &update.stop_time_update {
            let platform = stop_time.stop_id();
            let side = if north_id.as_deref() == Some(platform) {
                &mut schedule.north
            } else if south_id.as_deref() == Some(platform) {
                &mut schedule.south
            } else {
                continue;
            };
            served = true;

            if stop_time.schedule_relationship() == ScheduleRelationship::Skipped {
                continue;
            }

            let arrival_time = stop_time.arrival.as_ref().and_then(|a| a.time);
            side.push(ArrivalEntry::new(route_id, arrival_time));
        }
    }

    if !served {
        return StopLookup::NotServed;
    }

    schedule.north.sort_by_key(|e| e.arrival_time);
    schedule.south.sort_by_key(|e| e.arrival_time);
    StopLookup::Served(schedule)
}

fn platform_id(stop_id: &str, direction: char) -> Option<String> {
    match stop_id.strip_suffix(['N', 'S']) {
        Some(base) if !base.is_empty() => stop_id.ends_with(direction).then(|| stop_id.to_string()),
        _ => Some(format!("{stop_id}{direction}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs_rt::trip_update::{StopTimeEvent, StopTimeUpdate};
    use crate::gtfs_rt::{FeedEntity, FeedHeader, TripDescriptor, TripUpdate};

    fn stop_time(stop_id: &str, time: Option<i64>) -> StopTimeUpdate {
        StopTimeUpdate {
            stop_id: Some(stop_id.to_string()),
            arrival: time.map(|t| StopTimeEvent {
                time: Some(t),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn trip(id: &str, route: &str, stops: Vec<StopTimeUpdate>) -> FeedEntity {
        FeedEntity {
            id: id.to_string(),
            is_deleted: None,
            trip_update: Some(TripUpdate {
                trip: TripDescriptor {
                    trip_id: Some(id.to_string()),
                    route_id: Some(route.to_string()),
                    ..Default::default()
                },
                stop_time_update: stops,
                ..Default::default()
            }),
        }
    }

    fn feed(entity: Vec<FeedEntity>) -> FeedMessage {
        FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "1.0".to_string(),
                incrementality: None,
                timestamp: Some(1_700_000_000),
            },
            entity,
        }
    }

    #[test]
    fn test_splits_platforms_and_sorts() {
        let message = feed(vec![
            trip("t1", "4", vec![stop_time("101N", Some(300)), stop_time("102N", Some(400))]),
            trip("t2", "5", vec![stop_time("101N", Some(100))]),
            trip("t3", "4", vec![stop_time("101S", None)]),
            trip("t4", "6", vec![stop_time("101S", Some(50))]),
        ]);

        let StopLookup::Served(schedule) = stop_schedule(&message, FeedId::Numbered, "101") else {
            panic!("stop 101 should be served");
        };
        assert_eq!(
            schedule.north,
            vec![ArrivalEntry::new("5", Some(100)), ArrivalEntry::new("4", Some(300))]
        );
        assert_eq!(
            schedule.south,
            vec![ArrivalEntry::new("4", None), ArrivalEntry::new("6", Some(50))]
        );
    }

    #[test]
    fn test_suffixed_stop_matches_one_platform() {
        let message = feed(vec![trip(
            "t1",
            "4",
            vec![stop_time("101N", Some(300)), stop_time("101S", Some(400))],
        )]);

        let StopLookup::Served(schedule) = stop_schedule(&message, FeedId::Numbered, "101N") else {
            panic!("stop 101N should be served");
        };
        assert_eq!(schedule.north.len(), 1);
        assert!(schedule.south.is_empty());
    }

    #[test]
    fn test_unreferenced_stop_is_not_served() {
        let message = feed(vec![trip("t1", "L", vec![stop_time("L01N", Some(300))])]);
        assert_eq!(stop_schedule(&message, FeedId::Numbered, "101"), StopLookup::NotServed);
        assert_eq!(stop_schedule(&feed(vec![]), FeedId::Numbered, "101"), StopLookup::NotServed);
    }

    #[test]
    fn test_skipped_stop_still_counts_as_served() {
        let mut skipped = stop_time("101N", Some(300));
        skipped.schedule_relationship = Some(ScheduleRelationship::Skipped as i32);
        let message = feed(vec![trip("t1", "4", vec![skipped])]);

        assert_eq!(
            stop_schedule(&message, FeedId::Numbered, "101"),
            StopLookup::Served(RawStopSchedule::default())
        );
    }

    #[test]
    fn test_deleted_entities_are_ignored() {
        let mut deleted = trip("t1", "4", vec![stop_time("101N", Some(300))]);
        deleted.is_deleted = Some(true);
        assert_eq!(stop_schedule(&feed(vec![deleted]), FeedId::Numbered, "101"), StopLookup::NotServed);
    }

    #[test]
    fn test_trips_of_other_feeds_are_ignored() {
        let message = feed(vec![
            trip("t1", "1", vec![stop_time("101N", Some(300))]),
            trip("t2", "7", vec![stop_time("701N", Some(200))]),
        ]);

        assert_eq!(
            stop_schedule(&message, FeedId::Seven, "101"),
            StopLookup::NotServed
        );
        assert!(matches!(
            stop_schedule(&message, FeedId::Numbered, "101"),
            StopLookup::Served(_)
        ));
        assert!(matches!(
            stop_schedule(&message, FeedId::Seven, "701"),
            StopLookup::Served(_)
        ));
    }

    #[test]
    fn test_endpoint_urls() {
        let datamine = FeedEndpoint::Datamine {
            base_url: "http://datamine.mta.info/mta_esi.php".to_string(),
        };
        assert_eq!(
            datamine.url_for(FeedId::Ace),
            "http://datamine.mta.info/mta_esi.php?feed_id=26"
        );

        let gateway = FeedEndpoint::Gateway {
            base_url: "https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds/".to_string(),
        };
        assert_eq!(
            gateway.url_for(FeedId::L),
            "https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds/nyct%2Fgtfs-l"
        );
    }
}
