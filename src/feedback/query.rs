//! Feedback conditions evaluated against the cache

use serde::Deserialize;
use tracing::{debug, warn};

use super::cache::FeedbackCache;
use super::compare::{evaluate, evaluate_sequence, Comparison};
use crate::osc::{parse_arguments, OscArg};

/// A boolean feedback condition on the last value received for a path
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FeedbackQuery {
    /// First argument compared as a number against an integer target
    Integer {
        path: String,
        value: String,
        #[serde(default)]
        comparison: Comparison,
    },
    /// First argument compared as a number against a float target
    Float {
        path: String,
        value: String,
        #[serde(default)]
        comparison: Comparison,
    },
    /// First argument is boolean true (or not)
    Boolean {
        path: String,
        value: bool,
        #[serde(default)]
        comparison: Comparison,
    },
    /// Every argument compared positionally
    Multi {
        path: String,
        arguments: String,
        #[serde(default)]
        comparison: Comparison,
    },
    /// True once per received message, then cleared
    NoArgs { path: String },
}

impl FeedbackQuery {
    pub fn path(&self) -> &str {
        match self {
            Self::Integer { path, .. }
            | Self::Float { path, .. }
            | Self::Boolean { path, .. }
            | Self::Multi { path, .. }
            | Self::NoArgs { path } => path,
        }
    }

    /// Evaluate against whatever the cache holds right now
    ///
    /// Invalid targets and absent paths evaluate to false.
    pub fn evaluate(&self, cache: &FeedbackCache) -> bool {
        let result = match self {
            Self::Integer {
                path,
                value,
                comparison,
            } => {
                let target = match value.trim().parse::<i32>() {
                    Ok(v) => OscArg::Int(v),
                    Err(_) => {
                        warn!("Invalid integer feedback target: {}", value);
                        return false;
                    },
                };
                compare_first_number(cache, path, &target, *comparison)
            },
            Self::Float {
                path,
                value,
                comparison,
            } => {
                let target = match value.trim().parse::<f32>().ok().filter(|v| v.is_finite()) {
                    Some(v) => OscArg::Float(v),
                    None => {
                        warn!("Invalid float feedback target: {}", value);
                        return false;
                    },
                };
                compare_first_number(cache, path, &target, *comparison)
            },
            Self::Boolean {
                path,
                value,
                comparison,
            } => match cache.lookup(path) {
                Some(args) => {
                    let received = matches!(args.first(), Some(OscArg::Bool(true)));
                    evaluate(&OscArg::Bool(received), &OscArg::Bool(*value), *comparison)
                },
                None => false,
            },
            Self::Multi {
                path,
                arguments,
                comparison,
            } => {
                let targets = match parse_arguments(arguments) {
                    Ok(targets) => targets,
                    Err(e) => {
                        warn!("Invalid feedback arguments '{}': {}", arguments, e);
                        return false;
                    },
                };
                match cache.lookup(path) {
                    Some(received) => evaluate_sequence(&received, &targets, *comparison).result,
                    None => false,
                }
            },
            Self::NoArgs { path } => cache.consume_once(path),
        };

        debug!("Feedback on {} evaluated to {}", self.path(), result);
        result
    }
}

/// Compare the first cached argument, read as a number, against `target`
fn compare_first_number(
    cache: &FeedbackCache,
    path: &str,
    target: &OscArg,
    comparison: Comparison,
) -> bool {
    let Some(args) = cache.lookup(path) else {
        debug!("No value received yet for {}", path);
        return false;
    };

    let received = match args.first() {
        Some(OscArg::String(text)) => match text.trim().parse::<f32>() {
            Ok(v) if v.is_finite() => OscArg::Float(v),
            _ => return false,
        },
        Some(arg) if arg.as_number().is_some() => arg.clone(),
        _ => return false,
    };

    evaluate(&received, target, comparison)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with(path: &str, args: Vec<OscArg>) -> FeedbackCache {
        let cache = FeedbackCache::new();
        cache.store(path, args);
        cache
    }

    #[test]
    fn test_integer_feedback() {
        let cache = cache_with("/ch/1/mute", vec![OscArg::Int(1)]);
        let query = FeedbackQuery::Integer {
            path: "/ch/1/mute".into(),
            value: "1".into(),
            comparison: Comparison::Equal,
        };
        assert!(query.evaluate(&cache));

        let bad_target = FeedbackQuery::Integer {
            path: "/ch/1/mute".into(),
            value: "one".into(),
            comparison: Comparison::Equal,
        };
        assert!(!bad_target.evaluate(&cache));
    }

    #[test]
    fn test_float_feedback_coerces_numeric_text() {
        let cache = cache_with("/fader", vec![OscArg::String("-10.5".into())]);
        let query = FeedbackQuery::Float {
            path: "/fader".into(),
            value: "-12".into(),
            comparison: Comparison::GreaterThan,
        };
        assert!(query.evaluate(&cache));

        let absent = FeedbackQuery::Float {
            path: "/other".into(),
            value: "0".into(),
            comparison: Comparison::LessThan,
        };
        assert!(!absent.evaluate(&cache));
    }

    #[test]
    fn test_boolean_feedback() {
        let cache = cache_with("/solo", vec![OscArg::Bool(true)]);
        let on = FeedbackQuery::Boolean {
            path: "/solo".into(),
            value: true,
            comparison: Comparison::Equal,
        };
        assert!(on.evaluate(&cache));

        // Non-boolean payloads read as false
        cache.store("/solo", vec![OscArg::Int(1)]);
        assert!(!on.evaluate(&cache));

        let ordered = FeedbackQuery::Boolean {
            path: "/solo".into(),
            value: false,
            comparison: Comparison::GreaterThan,
        };
        assert!(!ordered.evaluate(&cache));
    }

    #[test]
    fn test_multi_feedback() {
        let cache = cache_with(
            "/scene",
            vec![OscArg::Int(1), OscArg::String("test".into()), OscArg::Float(2.5)],
        );
        let matching = FeedbackQuery::Multi {
            path: "/scene".into(),
            arguments: r#"1 "test" 2.5"#.into(),
            comparison: Comparison::Equal,
        };
        assert!(matching.evaluate(&cache));

        let unterminated = FeedbackQuery::Multi {
            path: "/scene".into(),
            arguments: r#"1 "test"#.into(),
            comparison: Comparison::Equal,
        };
        assert!(!unterminated.evaluate(&cache));
    }

    #[test]
    fn test_noargs_feedback_debounces() {
        let cache = cache_with("/go", vec![OscArg::Int(1)]);
        let query = FeedbackQuery::NoArgs { path: "/go".into() };
        assert!(query.evaluate(&cache));
        assert!(!query.evaluate(&cache));
    }

    #[test]
    fn test_deserialize_query() {
        let query: FeedbackQuery = serde_json::from_str(
            r#"{"kind":"float","path":"/x","value":"1.5","comparison":"lessthanequal"}"#,
        )
        .unwrap();
        assert!(matches!(
            query,
            FeedbackQuery::Float {
                comparison: Comparison::LessThanEqual,
                ..
            }
        ));

        let noargs: FeedbackQuery = serde_json::from_str(r#"{"kind":"noargs","path":"/y"}"#).unwrap();
        assert_eq!(noargs.path(), "/y");
    }
}
