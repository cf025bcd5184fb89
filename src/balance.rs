use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tracing::warn;

use crate::exchange::{ExchangeClient, ExchangeError};

struct CachedBalance {
    value: Decimal,
    fetched_at: Instant,
    ttl: Duration,
}

impl CachedBalance {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < self.ttl
    }
}

/// Account balance with a TTL cache. On a rate-limited refresh the stale
/// value is served and its TTL stretched, so a throttling venue does not
/// take the status surface down with it.
pub struct BalanceCache {
    exchange: Arc<dyn ExchangeClient>,
    ttl: Duration,
    rate_limited_ttl: Duration,
    cache: Mutex<Option<CachedBalance>>,
}

impl BalanceCache {
    pub fn new(exchange: Arc<dyn ExchangeClient>, ttl: Duration, rate_limited_ttl: Duration) -> Self {
        Self {
            exchange,
            ttl,
            rate_limited_ttl,
            cache: Mutex::new(None),
        }
    }

    pub async fn get(&self) -> Result<Decimal, ExchangeError> {
        {
            let cache = self.cache.lock().unwrap();
            if let Some(entry) = cache.as_ref() {
                if entry.is_fresh() {
                    return Ok(entry.value);
                }
            }
        }

        match self.exchange.get_balance().await {
            Ok(value) => {
                let mut cache = self.cache.lock().unwrap();
                *cache = Some(CachedBalance {
                    value,
                    fetched_at: Instant::now(),
                    ttl: self.ttl,
                });
                Ok(value)
            }
            Err(e) if e.is_rate_limit() => {
                let mut cache = self.cache.lock().unwrap();
                if let Some(entry) = cache.as_mut() {
                    warn!(error = %e, "balance_refresh_rate_limited_serving_stale");
                    entry.fetched_at = Instant::now();
                    entry.ttl = self.rate_limited_ttl;
                    Ok(entry.value)
                } else {
                    Err(e)
                }
            }
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
