pub mod time;

pub use time::{millis_since, now_utc_millis};
