mod generator;

pub use generator::{render_message, AlertGenerator, GeneratorReport, MatchRadius, ALERT_TTL_HOURS};
