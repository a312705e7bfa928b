use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TtlError {
    #[error("ttl must not be negative, got {0}s")]
    Negative(f64),
    #[error("ttl must be finite, got {0}")]
    NotFinite(f64),
    #[error("ttl of {0}s does not fit in a duration")]
    OutOfRange(f64),
    #[error("invalid ttl {input:?}: {source}")]
    Parse {
        input: String,
        #[source]
        source: humantime::DurationError,
    },
}

/// How long an entry lives after its most recent write. Fixed for the lifetime of a container.
///
/// Any `Duration` is a valid TTL. The fallible constructors exist for TTLs that come from
/// floating point numbers or strings, and reject them before a container is ever built.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ttl(Duration);

impl Ttl {
    pub const fn new(duration: Duration) -> Ttl {
        Ttl(duration)
    }

    pub fn from_secs_f64(secs: f64) -> Result<Ttl, TtlError> {
        if !secs.is_finite() {
            return Err(TtlError::NotFinite(secs));
        }
        if secs < 0.0 {
            return Err(TtlError::Negative(secs));
        }
        Duration::try_from_secs_f64(secs)
            .map(Ttl)
            .map_err(|_| TtlError::OutOfRange(secs))
    }

    pub fn from_millis_f64(millis: f64) -> Result<Ttl, TtlError> {
        if !millis.is_finite() {
            return Err(TtlError::NotFinite(millis));
        }
        Ttl::from_secs_f64(millis / 1000.0)
    }

    pub const fn as_duration(self) -> Duration {
        self.0
    }
}

impl From<Duration> for Ttl {
    fn from(duration: Duration) -> Ttl {
        Ttl(duration)
    }
}

impl From<Ttl> for Duration {
    fn from(ttl: Ttl) -> Duration {
        ttl.0
    }
}

/// Parses `humantime` syntax, e.g. `"150ms"`, `"5s"` or `"1m 30s"`.
impl FromStr for Ttl {
    type Err = TtlError;

    fn from_str(s: &str) -> Result<Ttl, TtlError> {
        humantime::parse_duration(s.trim())
            .map(Ttl)
            .map_err(|source| TtlError::Parse {
                input: s.to_string(),
                source,
            })
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", humantime::format_duration(self.0))
    }
}
