use crate::error::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub type IpRateLimiter = DefaultKeyedRateLimiter<IpAddr>;

/// How often idle client entries are dropped from every limiter.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// A limiter allowing `per_minute` requests per client IP, replenished evenly
/// over the minute.
pub fn per_minute(per_minute: u32) -> Arc<IpRateLimiter> {
    let burst = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::keyed(Quota::per_minute(burst)))
}

/// Every limiter handed out to the router, kept so their per-IP state can be
/// pruned. A keyed limiter holds one entry per client it has ever seen.
#[derive(Clone, Default)]
pub struct RateLimiters {
    limiters: Vec<Arc<IpRateLimiter>>,
}

impl RateLimiters {
    /// Creates a limiter like [`per_minute`] and registers it for pruning.
    pub fn per_minute(&mut self, per_minute: u32) -> Arc<IpRateLimiter> {
        let limiter = self::per_minute(per_minute);
        self.limiters.push(limiter.clone());
        limiter
    }

    /// The number of client entries held across all limiters.
    pub fn tracked_clients(&self) -> usize {
        self.limiters.iter().map(|limiter| limiter.len()).sum()
    }

    /// Drops entries of clients whose quota has fully replenished.
    pub fn prune(&self) {
        for limiter in &self.limiters {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
    }

    /// Prunes every `every` for as long as the runtime lives.
    pub fn spawn_pruning(self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.prune();
                tracing::debug!(clients = self.tracked_clients(), "Pruned idle rate-limit entries.");
            }
        })
    }
}

/// Rejects the request with `429` once the client has used up its quota.
pub async fn limit_by_ip(
    State(limiter): State<Arc<IpRateLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let ip = addr.ip();
    if limiter.check_key(&ip).is_err() {
        tracing::warn!(client = %ip, path = %request.uri().path(), "Rate limit exceeded.");
        return AppError::RateLimited.into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_is_tracked_per_ip() {
        let limiter = per_minute(2);
        let first: IpAddr = "10.0.0.1".parse().unwrap();
        let second: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check_key(&first).is_ok());
        assert!(limiter.check_key(&first).is_ok());
        assert!(limiter.check_key(&first).is_err());
        assert!(limiter.check_key(&second).is_ok());
    }

    #[test]
    fn replenished_clients_are_pruned() {
        let mut limiters = RateLimiters::default();
        // One cell every millisecond, so an entry goes idle almost at once.
        let fast = limiters.per_minute(60_000);
        for n in 0..=255u8 {
            fast.check_key(&IpAddr::from([10, 0, 1, n])).unwrap();
        }
        assert_eq!(limiters.tracked_clients(), 256);

        std::thread::sleep(Duration::from_millis(50));
        limiters.prune();
        assert_eq!(limiters.tracked_clients(), 0);
    }

    #[test]
    fn throttled_clients_survive_pruning() {
        let mut limiters = RateLimiters::default();
        let slow = limiters.per_minute(1);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        slow.check_key(&ip).unwrap();

        limiters.prune();
        assert_eq!(limiters.tracked_clients(), 1);
        assert!(slow.check_key(&ip).is_err());
    }

    #[test]
    fn zero_quota_still_admits_one_request() {
        let limiter = per_minute(0);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(limiter.check_key(&ip).is_ok());
        assert!(limiter.check_key(&ip).is_err());
    }
}
