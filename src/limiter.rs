use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// 令牌桶限速器
///
/// 容量和补充速率都等于每秒发包数，令牌连续补充。
pub struct RateLimiter {
    rate: f64,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(packets_per_sec: u64) -> Self {
        let rate = packets_per_sec.max(1) as f64;
        RateLimiter {
            rate,
            capacity: rate,
            bucket: Mutex::new(Bucket {
                tokens: rate,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn rate(&self) -> u64 {
        self.rate as u64
    }

    /// 尝试取一个令牌，失败时返回需要等待的时间
    fn try_take(&self) -> Result<(), Duration> {
        let mut bucket = match self.bucket.lock() {
            Ok(bucket) => bucket,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate))
        }
    }

    /// 阻塞当前任务直到拿到令牌
    pub async fn acquire(&self) {
        while let Err(wait) = self.try_take() {
            sleep(wait).await;
        }
    }
}
