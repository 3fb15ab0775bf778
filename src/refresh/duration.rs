//! 采样时长与由其推导出的读超时。

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const MIN_DURATION_SECS: f64 = 0.5;
pub const MAX_DURATION_SECS: f64 = 30.0;

const TIMEOUT_MARGIN_SECS: f64 = 3.0;
const MIN_TIMEOUT_SECS: f64 = 6.0;
const MAX_TIMEOUT_SECS: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DurationError {
    #[error("duration {0}s out of range (0.5-30.0s)")]
    OutOfRange(f64),
    #[error("invalid duration: {0:?}")]
    Invalid(String),
}

/// 单个服务的采样时长，构造时即保证位于 0.5–30.0 秒之间。
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct SampleDuration(f64);

impl SampleDuration {
    pub fn new(secs: f64) -> Result<Self, DurationError> {
        if !secs.is_finite() || !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&secs) {
            return Err(DurationError::OutOfRange(secs));
        }
        Ok(Self(secs))
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_secs_f64(self.0)
    }

    /// 单次读取的停滞上限 `clamp(D + 3, 6, 20)`。
    ///
    /// D 超过 17 秒时该值小于 D，因此它不能作为整个请求的截止时间，
    /// 见 [`SampleDuration::request_deadline`]。
    pub fn read_timeout(self) -> Duration {
        let secs = (self.0 + TIMEOUT_MARGIN_SECS).clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS);
        Duration::from_secs_f64(secs)
    }

    /// 整个流请求（连接 + 读取）的截止时间 `D + read_timeout`，始终长于采样时长。
    pub fn request_deadline(self) -> Duration {
        self.as_duration() + self.read_timeout()
    }
}

impl FromStr for SampleDuration {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let secs: f64 = s
            .trim()
            .parse()
            .map_err(|_| DurationError::Invalid(s.to_string()))?;
        Self::new(secs)
    }
}

impl fmt::Display for SampleDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}s", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_timeout_is_clamped_across_the_whole_range() {
        let mut secs = MIN_DURATION_SECS;
        while secs <= MAX_DURATION_SECS {
            let d = SampleDuration::new(secs).unwrap();
            let t = d.read_timeout().as_secs_f64();
            let expected = (secs + 3.0).clamp(6.0, 20.0);
            assert!((t - expected).abs() < 1e-9, "D={secs} T={t}");
            if secs <= 17.0 {
                assert!(t >= secs, "D={secs} T={t}");
            }
            secs += 0.25;
        }
    }

    #[test]
    fn request_deadline_outlasts_every_duration() {
        let mut secs = MIN_DURATION_SECS;
        while secs <= MAX_DURATION_SECS {
            let d = SampleDuration::new(secs).unwrap();
            assert!(d.request_deadline() > d.as_duration(), "D={secs}");
            assert_eq!(d.request_deadline(), d.as_duration() + d.read_timeout());
            secs += 0.25;
        }
        let longest = SampleDuration::new(30.0).unwrap();
        assert_eq!(longest.request_deadline(), Duration::from_secs(50));
    }

    #[test]
    fn read_timeout_edges() {
        assert_eq!(SampleDuration::new(0.5).unwrap().read_timeout(), Duration::from_secs(6));
        assert_eq!(SampleDuration::new(4.0).unwrap().read_timeout(), Duration::from_secs(7));
        assert_eq!(SampleDuration::new(30.0).unwrap().read_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn rejects_out_of_range_and_garbage() {
        assert_eq!(
            "35.0".parse::<SampleDuration>(),
            Err(DurationError::OutOfRange(35.0))
        );
        assert!(SampleDuration::new(0.49).is_err());
        assert!(SampleDuration::new(f64::NAN).is_err());
        assert!(matches!(
            "fast".parse::<SampleDuration>(),
            Err(DurationError::Invalid(_))
        ));
        assert!(" 2.5 ".parse::<SampleDuration>().is_ok());
    }
}
