use rand::Rng;

/// Retry backoff policy, selected system-wide via `RETRY_POLICY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    Constant,
    Linear,
    #[default]
    Exponential,
}

impl std::str::FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "constant" => Ok(BackoffStrategy::Constant),
            "linear" => Ok(BackoffStrategy::Linear),
            "exponential" => Ok(BackoffStrategy::Exponential),
            other => Err(format!("unknown backoff policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub strategy: BackoffStrategy,
    pub base_ms: u64,
    pub cap_ms: u64,
}

/// Un-jittered delay before `attempt` (1-based: the delay preceding the
/// *next* attempt after `attempt` prior failures).
fn base_delay_ms(policy: &RetryPolicy, attempt: u32) -> u64 {
    let raw = match policy.strategy {
        BackoffStrategy::Constant => policy.base_ms,
        BackoffStrategy::Linear => policy.base_ms.saturating_mul(attempt as u64),
        BackoffStrategy::Exponential => {
            policy.base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
        }
    };
    raw.min(policy.cap_ms)
}

/// Delay before the next attempt, with a `[0.5, 1.5]` jitter multiplier
/// applied so that a fleet of simultaneously-failing deliveries doesn't
/// retry in lockstep.
pub fn next_delay_ms(policy: &RetryPolicy, attempt: u32) -> u64 {
    let base = base_delay_ms(policy, attempt.max(1));
    let jitter = rand::thread_rng().gen_range(0.5..=1.5);
    ((base as f64) * jitter).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(strategy: BackoffStrategy) -> RetryPolicy {
        RetryPolicy {
            strategy,
            base_ms: 1000,
            cap_ms: 30_000,
        }
    }

    #[test]
    fn constant_is_always_base() {
        let p = policy(BackoffStrategy::Constant);
        assert_eq!(base_delay_ms(&p, 1), 1000);
        assert_eq!(base_delay_ms(&p, 5), 1000);
    }

    #[test]
    fn linear_scales_with_attempt() {
        let p = policy(BackoffStrategy::Linear);
        assert_eq!(base_delay_ms(&p, 1), 1000);
        assert_eq!(base_delay_ms(&p, 3), 3000);
    }

    #[test]
    fn exponential_doubles_each_attempt() {
        let p = policy(BackoffStrategy::Exponential);
        assert_eq!(base_delay_ms(&p, 1), 1000);
        assert_eq!(base_delay_ms(&p, 2), 2000);
        assert_eq!(base_delay_ms(&p, 3), 4000);
        assert_eq!(base_delay_ms(&p, 4), 8000);
    }

    #[test]
    fn exponential_respects_cap() {
        let mut p = policy(BackoffStrategy::Exponential);
        p.cap_ms = 5000;
        assert_eq!(base_delay_ms(&p, 4), 5000);
        assert_eq!(base_delay_ms(&p, 10), 5000);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let p = policy(BackoffStrategy::Exponential);
        for _ in 0..200 {
            let d = next_delay_ms(&p, 2);
            assert!(d >= 1000 && d <= 3000, "delay {d} out of [0.5x,1.5x] bounds");
        }
    }

    #[test]
    fn from_str_parses_known_policies() {
        assert_eq!("constant".parse(), Ok(BackoffStrategy::Constant));
        assert_eq!("linear".parse(), Ok(BackoffStrategy::Linear));
        assert_eq!("exponential".parse(), Ok(BackoffStrategy::Exponential));
        assert!("bogus".parse::<BackoffStrategy>().is_err());
    }
}
