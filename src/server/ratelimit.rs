//! Per-client token-bucket admission.
//!
//! One governor bucket per client address, kept in a bounded map. When the map
//! is full, idle buckets go first, then the least recently seen one. A recency
//! index keyed by a touch counter keeps eviction off a full scan.

use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorLimiter};
use parking_lot::Mutex;

use super::AppState;
use super::response::ApiError;
use crate::config::RateLimitConfig;
use crate::error::{Error, Result};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

struct ClientBucket {
    limiter: DirectLimiter,
    last_seen: Instant,
    touched: u64,
}

#[derive(Default)]
struct Clients {
    buckets: HashMap<IpAddr, ClientBucket>,
    /// Touch counter to client, oldest first.
    recency: BTreeMap<u64, IpAddr>,
    next_touch: u64,
}

pub struct RateLimiter {
    enabled: bool,
    quota: Quota,
    max_clients: usize,
    idle_ttl: Duration,
    trusted_proxies: Vec<IpAddr>,
    clients: Mutex<Clients>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN),
        )
        .allow_burst(NonZeroU32::new(config.burst).unwrap_or(NonZeroU32::MIN));

        Self {
            enabled: config.enabled,
            quota,
            max_clients: config.max_clients.max(1),
            idle_ttl: config.idle_ttl,
            trusted_proxies: config.trusted_proxies.clone(),
            clients: Mutex::new(Clients::default()),
        }
    }

    /// Admits or rejects one request from `client`.
    pub fn check(&self, client: IpAddr) -> Result<()> {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: IpAddr, now: Instant) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let mut guard = self.clients.lock();
        let clients = &mut *guard;

        if !clients.buckets.contains_key(&client) && clients.buckets.len() >= self.max_clients {
            self.evict(clients, now);
        }

        let touch = clients.next_touch;
        clients.next_touch += 1;

        let bucket = clients.buckets.entry(client).or_insert_with(|| ClientBucket {
            limiter: GovernorLimiter::direct(self.quota),
            last_seen: now,
            touched: touch,
        });
        clients.recency.remove(&bucket.touched);
        clients.recency.insert(touch, client);
        bucket.touched = touch;
        bucket.last_seen = now;

        bucket.limiter.check().map_err(|not_until| {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            Error::RateLimited {
                retry_after_secs: wait.as_secs() + 1,
            }
        })
    }

    /// Drops idle clients from the old end, then keeps dropping the least
    /// recently seen until there is room for one more.
    fn evict(&self, clients: &mut Clients, now: Instant) {
        while let Some((&touch, &oldest)) = clients.recency.first_key_value() {
            let idle = clients.buckets.get(&oldest).is_none_or(|bucket| {
                now.saturating_duration_since(bucket.last_seen) > self.idle_ttl
            });
            if !idle && clients.buckets.len() < self.max_clients {
                break;
            }
            clients.recency.remove(&touch);
            clients.buckets.remove(&oldest);
        }
    }

    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.clients.lock().buckets.len()
    }

    /// The address a request is charged to: the socket peer, or the first
    /// `X-Forwarded-For` hop when the peer is a trusted proxy.
    #[must_use]
    pub fn client_ip(&self, peer: Option<IpAddr>, headers: &HeaderMap) -> Option<IpAddr> {
        let peer = peer?;
        if !self.trusted_proxies.contains(&peer) {
            return Some(peer);
        }

        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|ip| ip.trim().parse().ok())
            .or(Some(peer))
    }
}

pub async fn rate_limit(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());

    let Some(client) = state.rate_limiter.client_ip(peer, request.headers()) else {
        tracing::debug!("No client address on request, skipping rate limit");
        return next.run(request).await;
    };

    if let Err(err) = state.rate_limiter.check(client) {
        tracing::warn!(%client, path = request.uri().path(), "Rate limit exceeded");
        return ApiError::from(err).into_response();
    }

    next.run(request).await
}
