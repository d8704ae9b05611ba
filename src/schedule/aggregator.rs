use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{debug, error, info};

use super::{
    AggregatedSchedule, ArrivalEntry, ArrivalView, DirectionFilter, DirectionalArrivals, Eta,
    FeedId, FeedSource, RawStopSchedule, ScheduleError, ScheduleResult, StopLookup,
};

/// Arrivals returned per direction unless the query says otherwise.
pub const DEFAULT_COUNT_PER_DIR: usize = 5;

/// A schedule request for one stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleQuery {
    pub stop_id: String,
    pub feed: Option<FeedId>,
    pub direction: DirectionFilter,
    pub count_per_dir: usize,
}

impl ScheduleQuery {
    pub fn new(stop_id: impl Into<String>) -> Self {
        Self {
            stop_id: stop_id.into(),
            feed: None,
            direction: DirectionFilter::Both,
            count_per_dir: DEFAULT_COUNT_PER_DIR,
        }
    }

    pub fn feed(mut self, feed: FeedId) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn direction(mut self, direction: DirectionFilter) -> Self {
        self.direction = direction;
        self
    }

    pub fn count_per_dir(mut self, count: usize) -> Self {
        self.count_per_dir = count;
        self
    }
}

/// Current time in whole epoch seconds, the granularity of feed timestamps.
pub fn epoch_seconds() -> i64 {
    Utc::now().timestamp()
}

/// Queries feeds for a stop and shapes the answer into per-direction ETAs.
pub struct ScheduleAggregator {
    source: Box<dyn FeedSource>,
    feeds: Vec<FeedId>,
    clock: fn() -> i64,
}

impl ScheduleAggregator {
    pub fn new(source: Box<dyn FeedSource>) -> Self {
        Self {
            source,
            feeds: FeedId::ALL.to_vec(),
            clock: epoch_seconds,
        }
    }

    /// Restricts the fan-out to `feeds`, queried in the given order.
    pub fn with_feeds(mut self, feeds: Vec<FeedId>) -> Self {
        self.feeds = feeds;
        self
    }

    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the schedule for `query`.
    ///
    /// Without a feed, every configured feed is queried in turn; feeds that
    /// fail are logged and skipped, feeds that do not serve the stop are left
    /// out. With a feed, a stop it does not serve yields
    /// [`ScheduleResult::NoDataForStop`].
    #[tracing::instrument(skip_all, fields(stop_id = %query.stop_id, feed = ?query.feed))]
    pub async fn fetch(&self, query: &ScheduleQuery) -> Result<ScheduleResult, ScheduleError> {
        let stop_id = query.stop_id.trim();
        if stop_id.is_empty() {
            return Err(ScheduleError::MissingParameter("stopId"));
        }

        if let Some(feed) = query.feed {
            let lookup = self
                .source
                .schedule(feed, stop_id)
                .await
                .map_err(|reason| ScheduleError::UpstreamUnavailable { feed, reason })?;

            return Ok(match lookup {
                StopLookup::Served(raw) => ScheduleResult::Schedule(AggregatedSchedule::Single(
                    self.arrivals(&raw, query),
                )),
                StopLookup::NotServed => {
                    info!(%feed, "Feed does not serve stop");
                    ScheduleResult::NoDataForStop {
                        feed,
                        stop_id: stop_id.to_string(),
                    }
                }
            });
        }

        let mut results = BTreeMap::new();
        for &feed in &self.feeds {
            match self.source.schedule(feed, stop_id).await {
                Ok(StopLookup::Served(raw)) => {
                    results.insert(feed, self.arrivals(&raw, query));
                }
                Ok(StopLookup::NotServed) => {
                    debug!(%feed, "Feed does not serve stop");
                }
                Err(e) => {
                    error!(%feed, error = %format!("{e:#}"), "Feed unavailable, skipping");
                }
            }
        }

        info!(feeds = results.len(), "Schedule aggregated");
        Ok(ScheduleResult::Schedule(AggregatedSchedule::ByFeed(results)))
    }

    fn arrivals(&self, raw: &RawStopSchedule, query: &ScheduleQuery) -> DirectionalArrivals {
        let now = (self.clock)();
        let count = query.count_per_dir;

        DirectionalArrivals {
            north: if query.direction.includes_north() {
                upcoming(&raw.north, now, count)
            } else {
                Vec::new()
            },
            south: if query.direction.includes_south() {
                upcoming(&raw.south, now, count)
            } else {
                Vec::new()
            },
        }
    }
}

/// Takes the first `count` arrivals at or after `now`, in upstream order.
///
/// Predictions already in the past are dropped; a missing arrival time means
/// the train is at the platform.
pub fn upcoming(entries: &[ArrivalEntry], now: i64, count: usize) -> Vec<ArrivalView> {
    entries
        .iter()
        .filter(|e| e.arrival_time.is_none_or(|t| t >= now))
        .take(count)
        .map(|e| ArrivalView {
            route_id: e.route_id.clone(),
            eta: match e.arrival_time {
                None => Eta::AtStation,
                Some(t) => Eta::Seconds((t - now).unsigned_abs()),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    const NOW: i64 = 1_700_000_000;

    fn fixed_now() -> i64 {
        NOW
    }

    #[derive(Default)]
    struct FakeSource {
        feeds: HashMap<FeedId, Option<RawStopSchedule>>,
        failing: Vec<FeedId>,
        calls: Arc<Mutex<Vec<FeedId>>>,
    }

    impl FakeSource {
        fn serving(mut self, feed: FeedId, schedule: RawStopSchedule) -> Self {
            self.feeds.insert(feed, Some(schedule));
            self
        }

        fn not_serving(mut self, feed: FeedId) -> Self {
            self.feeds.insert(feed, None);
            self
        }

        fn failing(mut self, feed: FeedId) -> Self {
            self.failing.push(feed);
            self
        }
    }

    #[async_trait]
    impl FeedSource for FakeSource {
        async fn schedule(&self, feed: FeedId, _stop_id: &str) -> Result<StopLookup> {
            self.calls.lock().unwrap().push(feed);
            if self.failing.contains(&feed) {
                return Err(anyhow!("connection reset"));
            }
            Ok(match self.feeds.get(&feed) {
                Some(Some(schedule)) => StopLookup::Served(schedule.clone()),
                _ => StopLookup::NotServed,
            })
        }
    }

    fn aggregator(source: FakeSource, feeds: Vec<FeedId>) -> ScheduleAggregator {
        ScheduleAggregator::new(Box::new(source))
            .with_feeds(feeds)
            .with_clock(fixed_now)
    }

    fn entries(times: &[Option<i64>]) -> Vec<ArrivalEntry> {
        times
            .iter()
            .enumerate()
            .map(|(i, t)| ArrivalEntry::new(i.to_string(), *t))
            .collect()
    }

    #[test]
    fn test_upcoming_skips_stale_and_truncates() {
        let raw = entries(&[
            Some(NOW - 30),
            None,
            Some(NOW),
            Some(NOW + 60),
            Some(NOW - 1),
            Some(NOW + 90),
            Some(NOW + 120),
            Some(NOW + 150),
        ]);

        let views = upcoming(&raw, NOW, 5);
        let etas: Vec<Eta> = views.iter().map(|v| v.eta).collect();
        assert_eq!(
            etas,
            vec![
                Eta::AtStation,
                Eta::Seconds(0),
                Eta::Seconds(60),
                Eta::Seconds(90),
                Eta::Seconds(120),
            ]
        );
        let routes: Vec<&str> = views.iter().map(|v| v.route_id.as_str()).collect();
        assert_eq!(routes, vec!["1", "2", "3", "5", "6"]);
    }

    #[test]
    fn test_upcoming_trusts_upstream_order() {
        let raw = entries(&[Some(NOW + 300), Some(NOW + 10)]);
        let etas: Vec<Eta> = upcoming(&raw, NOW, 5).into_iter().map(|v| v.eta).collect();
        assert_eq!(etas, vec![Eta::Seconds(300), Eta::Seconds(10)]);
    }

    #[test]
    fn test_upcoming_never_negative_and_bounded() {
        let raw: Vec<ArrivalEntry> = (-20..20)
            .map(|offset| ArrivalEntry::new("A", Some(NOW + offset * 7)))
            .collect();
        for count in 0..8 {
            let views = upcoming(&raw, NOW, count);
            assert!(views.len() <= count);
            for view in views {
                match view.eta {
                    Eta::Seconds(secs) => assert!(secs < 200),
                    Eta::AtStation => panic!("no entry is at the station"),
                }
            }
        }
    }

    #[tokio::test]
    async fn test_failing_feed_does_not_abort_fan_out() {
        let source = FakeSource::default()
            .serving(
                FeedId::Numbered,
                RawStopSchedule {
                    north: vec![ArrivalEntry::new("4", Some(NOW + 120))],
                    south: vec![],
                },
            )
            .failing(FeedId::Ace);
        let agg = aggregator(source, vec![FeedId::Numbered, FeedId::Ace]);

        let result = agg.fetch(&ScheduleQuery::new("101N")).await.unwrap();

        let mut expected = BTreeMap::new();
        expected.insert(
            FeedId::Numbered,
            DirectionalArrivals {
                north: vec![ArrivalView {
                    route_id: "4".to_string(),
                    eta: Eta::Seconds(120),
                }],
                south: vec![],
            },
        );
        assert_eq!(
            result,
            ScheduleResult::Schedule(AggregatedSchedule::ByFeed(expected))
        );
    }

    #[tokio::test]
    async fn test_fan_out_queries_every_feed_in_order() {
        let source = FakeSource::default().failing(FeedId::Nqrw);
        let calls = Arc::clone(&source.calls);
        let agg = ScheduleAggregator::new(Box::new(source)).with_clock(fixed_now);

        agg.fetch(&ScheduleQuery::new("R01")).await.unwrap();

        assert_eq!(*calls.lock().unwrap(), FeedId::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_unserved_feeds_are_omitted_but_stale_served_feeds_kept() {
        let source = FakeSource::default()
            .not_serving(FeedId::L)
            .serving(
                FeedId::G,
                RawStopSchedule {
                    north: entries(&[Some(NOW - 10)]),
                    south: entries(&[Some(NOW - 5)]),
                },
            );
        let agg = aggregator(source, vec![FeedId::L, FeedId::G]);

        let ScheduleResult::Schedule(AggregatedSchedule::ByFeed(feeds)) =
            agg.fetch(&ScheduleQuery::new("G22")).await.unwrap()
        else {
            panic!("expected per-feed schedule");
        };
        assert!(!feeds.contains_key(&FeedId::L));
        assert_eq!(feeds[&FeedId::G], DirectionalArrivals::default());
    }

    #[tokio::test]
    async fn test_direction_filter_suppresses_other_side() {
        let raw = RawStopSchedule {
            north: entries(&[Some(NOW + 1), Some(NOW + 2)]),
            south: entries(&[Some(NOW + 3)]),
        };
        let source = FakeSource::default().serving(FeedId::Ace, raw);
        let agg = aggregator(source, vec![FeedId::Ace]);

        for (filter, north, south) in [
            (DirectionFilter::North, 2, 0),
            (DirectionFilter::South, 0, 1),
            (DirectionFilter::Both, 2, 1),
        ] {
            let query = ScheduleQuery::new("A02").feed(FeedId::Ace).direction(filter);
            let ScheduleResult::Schedule(AggregatedSchedule::Single(pair)) =
                agg.fetch(&query).await.unwrap()
            else {
                panic!("expected single-feed schedule");
            };
            assert_eq!(pair.north.len(), north, "{filter:?}");
            assert_eq!(pair.south.len(), south, "{filter:?}");
        }
    }

    #[tokio::test]
    async fn test_single_feed_not_serving_stop_is_no_data() {
        let agg = aggregator(FakeSource::default().not_serving(FeedId::Jz), vec![]);
        let result = agg
            .fetch(&ScheduleQuery::new("101").feed(FeedId::Jz))
            .await
            .unwrap();
        assert_eq!(
            result,
            ScheduleResult::NoDataForStop {
                feed: FeedId::Jz,
                stop_id: "101".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_single_feed_failure_is_upstream_unavailable() {
        let agg = aggregator(FakeSource::default().failing(FeedId::Seven), vec![]);
        let err = agg
            .fetch(&ScheduleQuery::new("701").feed(FeedId::Seven))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::UpstreamUnavailable {
                feed: FeedId::Seven,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_stop_is_rejected_before_any_call() {
        let source = FakeSource::default();
        let calls = Arc::clone(&source.calls);
        let agg = aggregator(source, vec![FeedId::Numbered]);

        let err = agg.fetch(&ScheduleQuery::new("  ")).await.unwrap_err();
        assert!(matches!(err, ScheduleError::MissingParameter("stopId")));
        assert!(calls.lock().unwrap().is_empty());
    }
}
