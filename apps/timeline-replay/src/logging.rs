//! Tracing bootstrap for the replay tool.

use std::env;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,timeline_replay=debug,timeline_core=info";

/// Filter sources, highest precedence first.
const FILTER_KEYS: [&str; 3] = ["RUST_LOG", "TIMELINE_REPLAY_LOG", "TIMELINE_LOG"];

/// Install the global subscriber, writing to stderr so stdout only carries
/// the replayed snapshot.
pub fn init() {
    let directives = select_directives(|key| env::var(key).ok());
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::new(directives))
        .try_init();
}

/// First non-blank, parseable directive string among [`FILTER_KEYS`].
fn select_directives<F>(mut lookup: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    FILTER_KEYS
        .iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_owned())
        .find(|value| !value.is_empty() && EnvFilter::try_new(value).is_ok())
        .unwrap_or_else(|| DEFAULT_FILTER.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn directives_from_pairs(pairs: &[(&str, &str)]) -> String {
        let map = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect::<HashMap<_, _>>();
        select_directives(|key| map.get(key).cloned())
    }

    #[test]
    fn falls_back_to_default_filter() {
        assert_eq!(directives_from_pairs(&[]), DEFAULT_FILTER);
    }

    #[test]
    fn rust_log_wins_over_app_specific_keys() {
        let directives = directives_from_pairs(&[
            ("RUST_LOG", "warn"),
            ("TIMELINE_REPLAY_LOG", "debug"),
            ("TIMELINE_LOG", "trace"),
        ]);
        assert_eq!(directives, "warn");
    }

    #[test]
    fn skips_blank_and_unparseable_values() {
        let directives = directives_from_pairs(&[
            ("RUST_LOG", "  "),
            ("TIMELINE_REPLAY_LOG", "timeline_core=loud"),
            ("TIMELINE_LOG", " timeline_core=trace "),
        ]);
        assert_eq!(directives, "timeline_core=trace");
    }
}
