use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

static LAST_EMITTED: Lazy<Mutex<HashMap<&'static str, Instant>>> =
    Lazy::new(|| Mutex::new(HashMap::default()));

/// Returns `true` at most once per `period` for every `key`
///
pub fn throttled(key: &'static str, period: Duration) -> bool {
    let mut last = LAST_EMITTED
        .lock()
        .expect("Access to throttle registry must always succeed");
    let now = Instant::now();
    match last.get(key) {
        Some(t) if now.duration_since(*t) < period => false,
        _ => {
            last.insert(key, now);
            true
        }
    }
}

/// `log::warn!` that fires at most once per period (in seconds) for the call site
///
#[macro_export]
macro_rules! warn_throttle {
    ($period:expr, $($arg:tt)+) => {
        if $crate::utils::throttle::throttled(
            concat!(file!(), ":", line!()),
            ::std::time::Duration::from_secs_f64($period as f64),
        ) {
            ::log::warn!($($arg)+);
        }
    };
}
