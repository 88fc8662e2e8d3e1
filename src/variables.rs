//! Per-channel variables derived from `/channel/{n}/...` traffic

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

use crate::osc::Message;

/// Highest channel number the console exposes
pub const MAX_CHANNEL: u16 = 120;

/// Parameter paths under `/channel/{n}/`; `{band}` expands to the EQ/dynamics bands
const PARAMETER_PATHS: &[&str] = &[
    "input/trim",
    "input/delay/time",
    "input/delay/enabled",
    "input/digitube/enabled",
    "input/digitube/bias",
    "input/digitube/drive",
    "input/width",
    "input/balance",
    "input/polarity",
    "input/gain_tracking",
    "input/name",
    "input/fader",
    "total/gain",
    "pan",
    "mute",
    "solo",
    "eq/enabled",
    "eq/highpass/frequency",
    "eq/highpass/enabled",
    "eq/lowpass/frequency",
    "eq/lowpass/enabled",
    "eq/{band}/frequency",
    "eq/{band}/gain",
    "eq/{band}/q",
    "eq/{band}/dyn/threshold",
    "eq/{band}/dyn/ratio",
    "eq/{band}/dyn/attack",
    "eq/{band}/dyn/release",
    "eq/{band}/dyn/enabled",
    "dyn1/enabled",
    "dyn1/mode",
    "dyn1/crossover_low",
    "dyn1/crossover_high",
    "dyn1/{band}/threshold",
    "dyn1/{band}/ratio",
    "dyn1/{band}/gain",
    "dyn1/{band}/attack",
    "dyn1/{band}/release",
    "dyn1/{band}/knee",
    "dyn1/{band}/listen",
    "dyn2/enabled",
    "dyn2/mode",
    "dyn2/gain",
    "dyn2/threshold",
    "dyn2/range",
    "dyn2/ratio",
    "dyn2/attack",
    "dyn2/hold",
    "dyn2/release",
    "dyn2/knee",
    "dyn2/listen",
    "dyn2/lowpass",
    "dyn2/highpass",
];

const EQ_BANDS: u8 = 4;
const DYN1_BANDS: u8 = 3;

/// A variable the gateway may publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableDefinition {
    pub id: String,
    pub name: String,
}

/// `channel_{n}_{rest}` with slashes turned into underscores
pub fn variable_id(channel: u16, rest: &str) -> String {
    format!("channel_{}_{}", channel, rest.trim_matches('/').replace('/', "_"))
}

fn variable_name(channel: u16, rest: &str) -> String {
    format!("Channel {} {}", channel, rest.replace(['/', '_'], " "))
}

/// Every known channel variable, channels 1..=120
pub fn variable_definitions() -> Vec<VariableDefinition> {
    let mut defs = Vec::new();
    for channel in 1..=MAX_CHANNEL {
        for path in PARAMETER_PATHS {
            if path.contains("{band}") {
                let bands = if path.starts_with("dyn1") { DYN1_BANDS } else { EQ_BANDS };
                for band in 1..=bands {
                    let rest = path.replace("{band}", &band.to_string());
                    defs.push(VariableDefinition {
                        id: variable_id(channel, &rest),
                        name: variable_name(channel, &rest),
                    });
                }
            } else {
                defs.push(VariableDefinition {
                    id: variable_id(channel, path),
                    name: variable_name(channel, path),
                });
            }
        }
    }
    defs
}

/// Split `/channel/{n}/{rest}` into its channel number and remainder
pub fn split_channel_path(path: &str) -> Option<(u16, &str)> {
    let tail = path.strip_prefix("/channel/")?;
    let (number, rest) = tail.split_once('/')?;
    let channel = number.parse::<u16>().ok()?;
    if rest.is_empty() {
        return None;
    }
    Some((channel, rest))
}

/// Current value of every channel variable seen so far
#[derive(Clone, Default)]
pub struct ChannelVariables {
    values: Arc<DashMap<String, String>>,
}

impl ChannelVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the first argument of a channel message; returns the variable id
    pub fn record(&self, message: &Message) -> Option<String> {
        let (channel, rest) = split_channel_path(&message.path)?;
        let value = message.args.first()?.to_text();
        let id = variable_id(channel, rest);
        trace!("{} = {}", id, value);
        self.values.insert(id.clone(), value);
        Some(id)
    }

    pub fn get(&self, id: &str) -> Option<String> {
        self.values.get(id).map(|v| v.value().clone())
    }

    /// Sorted copy of all values
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osc::OscArg;

    #[test]
    fn test_split_channel_path() {
        assert_eq!(split_channel_path("/channel/12/input/fader"), Some((12, "input/fader")));
        assert_eq!(split_channel_path("/channel/x/mute"), None);
        assert_eq!(split_channel_path("/channel/3/"), None);
        assert_eq!(split_channel_path("/console/resend"), None);
    }

    #[test]
    fn test_record_first_argument() {
        let vars = ChannelVariables::new();
        let id = vars.record(&Message::new("/channel/7/eq/2/gain", vec![OscArg::Float(-3.5), OscArg::Int(1)]));
        assert_eq!(id.as_deref(), Some("channel_7_eq_2_gain"));
        assert_eq!(vars.get("channel_7_eq_2_gain").as_deref(), Some("-3.5"));

        // No arguments, nothing to record
        assert_eq!(vars.record(&Message::new("/channel/7/mute", vec![])), None);
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn test_definitions() {
        let defs = variable_definitions();
        let ids: Vec<&str> = defs.iter().map(|d| d.id.as_str()).collect();

        assert!(ids.contains(&"channel_1_input_fader"));
        assert!(ids.contains(&"channel_120_eq_4_dyn_release"));
        assert!(ids.contains(&"channel_5_dyn1_3_knee"));
        assert!(!ids.contains(&"channel_5_dyn1_4_knee"));
        assert!(!ids.contains(&"channel_121_mute"));

        let tracking = defs.iter().find(|d| d.id == "channel_2_input_gain_tracking").unwrap();
        assert_eq!(tracking.name, "Channel 2 input gain tracking");

        // 8 EQ band paths x 4 + 7 dyn1 band paths x 3 + 38 flat paths
        assert_eq!(defs.len(), 120 * (8 * 4 + 7 * 3 + 38));
    }
}
