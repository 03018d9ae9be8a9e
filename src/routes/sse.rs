use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use chrono::Utc;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::AppState;
use crate::auth::bearer_token;
use crate::clients::metrics::Aggregator;
use crate::config::StreamConfig;
use crate::error::ApiError;
use crate::models::views::{ErrorFrame, MetricsFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Connecting,
    Streaming,
    Closed,
}

#[derive(Debug)]
pub enum FeedItem {
    Metrics(Box<MetricsFrame>),
    Error(ErrorFrame),
}

impl FeedItem {
    fn error(message: String) -> Self {
        Self::Error(ErrorFrame {
            ts: Utc::now(),
            message,
        })
    }

    fn into_event(self) -> Event {
        let encoded = match &self {
            Self::Metrics(frame) => Event::default().event("metrics").json_data(frame),
            Self::Error(frame) => Event::default().event("error").json_data(frame),
        };
        encoded.unwrap_or_else(|e| {
            Event::default()
                .event("error")
                .data(format!("encoding frame: {}", e))
        })
    }
}

/// One subscriber's ticker. Connecting until the first tick, Closed once the
/// server shuts down or the client goes away.
pub struct MetricsFeed {
    state: StreamState,
    ticks: IntervalStream,
    aggregator: Arc<Aggregator>,
    top_n: usize,
    cycle_timeout: Duration,
    shutdown: CancellationToken,
    subscriber: String,
}

impl MetricsFeed {
    pub fn new(
        aggregator: Arc<Aggregator>,
        cfg: &StreamConfig,
        shutdown: CancellationToken,
        subscriber: String,
    ) -> Self {
        let mut interval = time::interval(Duration::from_secs(cfg.interval_secs.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            state: StreamState::Connecting,
            ticks: IntervalStream::new(interval),
            aggregator,
            top_n: cfg.top_pods,
            cycle_timeout: Duration::from_secs(cfg.cycle_timeout_secs.max(1)),
            shutdown,
            subscriber,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    async fn next_item(&mut self) -> Option<FeedItem> {
        if self.state == StreamState::Closed {
            return None;
        }

        let ticked = tokio::select! {
            _ = self.shutdown.cancelled() => false,
            tick = self.ticks.next() => tick.is_some(),
        };
        if !ticked {
            self.close("server shutting down");
            return None;
        }
        self.state = StreamState::Streaming;
        Some(self.cycle().await)
    }

    async fn cycle(&self) -> FeedItem {
        match time::timeout(self.cycle_timeout, self.aggregator.frame(self.top_n)).await {
            Ok(Ok(frame)) => FeedItem::Metrics(Box::new(frame)),
            Ok(Err(e)) => {
                warn!(subscriber = %self.subscriber, "metrics cycle failed: {}", e);
                FeedItem::error(e.to_string())
            }
            Err(_) => {
                warn!(subscriber = %self.subscriber, "metrics cycle timed out");
                FeedItem::error(format!(
                    "metrics cycle timed out after {}s",
                    self.cycle_timeout.as_secs()
                ))
            }
        }
    }

    fn close(&mut self, reason: &str) {
        if self.state != StreamState::Closed {
            self.state = StreamState::Closed;
            info!(subscriber = %self.subscriber, "metrics stream closed: {}", reason);
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = FeedItem> + Send + 'static {
        stream::unfold(self, |mut feed| async move {
            let item = feed.next_item().await?;
            Some((item, feed))
        })
    }
}

impl Drop for MetricsFeed {
    fn drop(&mut self) {
        self.close("client disconnected");
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub token: Option<String>,
    pub access_token: Option<String>,
    pub role: Option<String>,
}

/// `GET /api/stream`. EventSource can't set headers, so the token may come in
/// the query string.
pub async fn handle_metrics_stream(
    State(state): State<AppState>,
    Query(q): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = q
        .token
        .as_deref()
        .or(q.access_token.as_deref())
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(&headers));
    let user = state.auth.authenticate(token, q.role.as_deref())?;

    if !state.config.auth.stream_roles.contains(&user.role) {
        return Err(ApiError::Forbidden(format!(
            "role {} may not open the metrics stream",
            user.role
        )));
    }

    info!(subscriber = %user.subject, role = %user.role, "metrics stream opened");
    let feed = MetricsFeed::new(
        state.aggregator.clone(),
        &state.config.stream,
        state.shutdown.clone(),
        user.subject,
    );
    debug!(state = ?feed.state(), "feed created");

    let events = feed
        .into_stream()
        .map(|item| Ok::<_, Infallible>(item.into_event()));

    Ok(Sse::new(events)
        .keep_alive(KeepAlive::default().interval(Duration::from_secs(15)))
        .into_response())
}
