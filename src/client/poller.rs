use serde::Deserialize;
use std::fmt::Write as _;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::connectivity::Connectivity;
use super::retry::{RetryController, RetryError};
use super::status::{StatusBoard, StatusMessage, StatusSink};
use crate::fetch::{BasicClient, FetchError, HttpClient, send};
use crate::schedule::{AggregatedSchedule, DirectionalArrivals, Eta, FeedId, ScheduleQuery};

/// Result of one successful round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Schedule(AggregatedSchedule),
    /// The requested feed does not serve the stop.
    NoData { feed: FeedId, stop_id: String },
    /// The server asked us to slow down.
    RateLimited,
    /// The server refused the request itself, so asking again cannot help.
    Rejected {
        status: reqwest::StatusCode,
        message: String,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollError {
    #[error(transparent)]
    Retry(#[from] RetryError),
    #[error("server rejected the request: {0}")]
    Rejected(String),
}

/// Body of a 200 from `/schedule`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ScheduleReply {
    NoData {
        feed_id: FeedId,
        #[serde(rename = "stopId")]
        stop_id: String,
    },
    Schedule(AggregatedSchedule),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Polls `/schedule` for one stop and prints a countdown per direction.
pub struct Poller<N, C = BasicClient> {
    client: C,
    controller: RetryController<N>,
    status: StatusBoard,
    url: String,
    interval: Duration,
    max_attempts: u32,
}

impl<N: Connectivity> Poller<N> {
    pub fn new(
        server: &str,
        query: &ScheduleQuery,
        controller: RetryController<N>,
    ) -> anyhow::Result<Self> {
        Ok(Self::with_client(BasicClient::new()?, server, query, controller))
    }
}

impl<N: Connectivity, C: HttpClient> Poller<N, C> {
    pub fn with_client(
        client: C,
        server: &str,
        query: &ScheduleQuery,
        controller: RetryController<N>,
    ) -> Self {
        Self {
            client,
            controller,
            status: StatusBoard::new(),
            url: schedule_url(server, query),
            interval: Duration::from_secs(30),
            max_attempts: 5,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    /// Fetches the schedule once, retrying through the controller.
    ///
    /// Only transport failures and 5xx replies are retried. Anything else the
    /// server answered ends the chain and is shown as a notice.
    pub async fn poll_once(&self) -> Result<Fetched, RetryError> {
        let mut fetched = Fetched::RateLimited;
        self.controller
            .invoke(
                self.max_attempts,
                &self.status,
                || self.fetch(),
                |result| fetched = result,
            )
            .await?;

        let notice = match &fetched {
            Fetched::Schedule(_) => None,
            Fetched::NoData { feed, stop_id } => {
                Some(format!("Feed {feed} has no trains for stop {stop_id}"))
            }
            Fetched::RateLimited => Some("Too many requests, slowing down".to_string()),
            Fetched::Rejected { status, message } => {
                warn!(%status, %message, "Server rejected the request");
                Some(message.clone())
            }
        };
        if let Some(text) = notice {
            self.status.publish(StatusMessage::Notice(text));
        }
        Ok(fetched)
    }

    async fn fetch(&self) -> Result<Fetched, FetchError> {
        let resp = send(&self.client, &self.url).await?;
        let status = resp.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Ok(Fetched::RateLimited);
        }
        if status.is_client_error() {
            let message = match resp.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => status.to_string(),
            };
            return Ok(Fetched::Rejected { status, message });
        }
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        Ok(match resp.json::<ScheduleReply>().await? {
            ScheduleReply::NoData { feed_id, stop_id } => Fetched::NoData {
                feed: feed_id,
                stop_id,
            },
            ScheduleReply::Schedule(schedule) => Fetched::Schedule(schedule),
        })
    }

    /// Polls until the retry limit is hit or the server rejects the request,
    /// pausing while `enabled` is false.
    ///
    /// A shown status means an earlier round reported a problem; that round's
    /// slot is skipped instead of starting a second chain.
    pub async fn run(&self, mut enabled: watch::Receiver<bool>) -> Result<(), PollError> {
        loop {
            if enabled.wait_for(|on| *on).await.is_err() {
                info!("Visibility source gone, polling stopped");
                return Ok(());
            }

            if let Some(shown) = self.status.current() {
                debug!(status = %shown, "Status shown, skipping this round");
                self.status.clear();
            } else {
                match self.poll_once().await? {
                    Fetched::Schedule(schedule) => println!("{}", render(&schedule)),
                    Fetched::Rejected { message, .. } => return Err(PollError::Rejected(message)),
                    Fetched::NoData { .. } | Fetched::RateLimited => {
                        if let Some(shown) = self.status.current() {
                            println!("{shown}");
                        }
                    }
                }
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}

pub fn schedule_url(server: &str, query: &ScheduleQuery) -> String {
    let mut url = format!("{}/schedule/{}", server.trim_end_matches('/'), query.stop_id);
    let mut params = Vec::new();
    if let Some(direction) = query.direction.as_query() {
        params.push(format!("direction={direction}"));
    }
    if let Some(feed) = query.feed {
        params.push(format!("feed_id={feed}"));
    }
    if !params.is_empty() {
        url.push('?');
        url.push_str(&params.join("&"));
    }
    url
}

/// Whole minutes, rounded; anything under a minute reads `<1`.
pub fn minutes_label(eta: Eta) -> String {
    match eta {
        Eta::AtStation => "now".to_string(),
        Eta::Seconds(secs) => {
            let minutes = (secs as f64 / 60.0).round() as u64;
            if minutes < 1 {
                "<1 min".to_string()
            } else {
                format!("{minutes} min")
            }
        }
    }
}

pub fn render(schedule: &AggregatedSchedule) -> String {
    let mut out = String::new();
    match schedule {
        AggregatedSchedule::Single(pair) => render_pair(&mut out, pair),
        AggregatedSchedule::ByFeed(feeds) if feeds.is_empty() => {
            out.push_str("No feed serves this stop right now\n");
        }
        AggregatedSchedule::ByFeed(feeds) => {
            for (feed, pair) in feeds {
                let _ = writeln!(out, "Feed {feed}");
                render_pair(&mut out, pair);
            }
        }
    }
    out
}

fn render_pair(out: &mut String, pair: &DirectionalArrivals) {
    for (label, arrivals) in [("Uptown", &pair.north), ("Downtown", &pair.south)] {
        let line = if arrivals.is_empty() {
            "no trains".to_string()
        } else {
            arrivals
                .iter()
                .map(|a| format!("{} {}", a.route_id, minutes_label(a.eta)))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let _ = writeln!(out, "  {label:<8} {line}");
    }
}
