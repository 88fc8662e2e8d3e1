//! Console parameter actions
//!
//! Each action is a path template plus the wire type of its single argument.
//! Placeholders such as `{channel}` come from caller parameters; a parameter
//! holding comma-separated values (`band=1,3`) produces one message per value.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::UnitsConfig;
use crate::error::{ArgumentError, SessionError};
use crate::osc::{ArgType, BlobEncoding, Message, OscArg};

use ArgType::{Float as F, Int as I, String as S};

/// One console parameter that can be set
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ActionDef {
    pub id: &'static str,
    pub name: &'static str,
    pub path: &'static str,
    #[serde(serialize_with = "serialize_tag")]
    pub wire: ArgType,
    /// Value is a duration, converted between configured units
    pub time: bool,
}

fn serialize_tag<W: serde::Serializer>(ty: &ArgType, s: W) -> Result<W::Ok, W::Error> {
    s.serialize_char(ty.tag())
}

const fn act(id: &'static str, name: &'static str, path: &'static str, wire: ArgType) -> ActionDef {
    ActionDef {
        id,
        name,
        path,
        wire,
        time: false,
    }
}

const fn timed(id: &'static str, name: &'static str, path: &'static str) -> ActionDef {
    ActionDef {
        id,
        name,
        path,
        wire: ArgType::Float,
        time: true,
    }
}

/// Every action the gateway knows
pub static ACTIONS: &[ActionDef] = &[
    // Input EQ, per band
    act("eq.frequency", "EQ band frequency", "/channel/{channel}/eq/{band}/frequency", F),
    act("eq.gain", "EQ band gain", "/channel/{channel}/eq/{band}/gain", F),
    act("eq.q", "EQ band Q", "/channel/{channel}/eq/{band}/q", F),
    act("eq.enabled", "EQ band enable", "/channel/{channel}/eq/{band}/enabled", S),
    act("eq.dyn.enabled", "EQ band dynamics enable", "/channel/{channel}/eq/{band}/dyn/enabled", S),
    act("eq.dyn.threshold", "EQ band dynamics threshold", "/channel/{channel}/eq/{band}/dyn/threshold", F),
    act("eq.dyn.ratio", "EQ band dynamics ratio", "/channel/{channel}/eq/{band}/dyn/ratio", F),
    timed("eq.dyn.attack", "EQ band dynamics attack", "/channel/{channel}/eq/{band}/dyn/attack"),
    timed("eq.dyn.release", "EQ band dynamics release", "/channel/{channel}/eq/{band}/dyn/release"),
    // Dynamics 1 (multiband)
    act("dyn1.enabled", "Dynamics 1 enable", "/channel/{channel}/dyn1/enabled", S),
    act("dyn1.mode", "Dynamics 1 mode", "/channel/{channel}/dyn1/mode", I),
    act("dyn1.crossover_low", "Dynamics 1 low crossover", "/channel/{channel}/dyn1/crossover_low", F),
    act("dyn1.crossover_high", "Dynamics 1 high crossover", "/channel/{channel}/dyn1/crossover_high", F),
    act("dyn1.threshold", "Dynamics 1 band threshold", "/channel/{channel}/dyn1/{band}/threshold", F),
    act("dyn1.ratio", "Dynamics 1 band ratio", "/channel/{channel}/dyn1/{band}/ratio", F),
    act("dyn1.gain", "Dynamics 1 band gain", "/channel/{channel}/dyn1/{band}/gain", F),
    timed("dyn1.attack", "Dynamics 1 band attack", "/channel/{channel}/dyn1/{band}/attack"),
    timed("dyn1.release", "Dynamics 1 band release", "/channel/{channel}/dyn1/{band}/release"),
    act("dyn1.knee", "Dynamics 1 band knee", "/channel/{channel}/dyn1/{band}/knee", I),
    act("dyn1.listen", "Dynamics 1 band listen", "/channel/{channel}/dyn1/{band}/listen", S),
    // Dynamics 2
    act("dyn2.enabled", "Dynamics 2 enable", "/channel/{channel}/dyn2/enabled", S),
    act("dyn2.mode", "Dynamics 2 mode", "/channel/{channel}/dyn2/mode", I),
    act("dyn2.gain", "Dynamics 2 gain", "/channel/{channel}/dyn2/gain", F),
    act("dyn2.threshold", "Dynamics 2 threshold", "/channel/{channel}/dyn2/threshold", F),
    act("dyn2.range", "Dynamics 2 range", "/channel/{channel}/dyn2/range", F),
    act("dyn2.ratio", "Dynamics 2 ratio", "/channel/{channel}/dyn2/ratio", F),
    timed("dyn2.attack", "Dynamics 2 attack", "/channel/{channel}/dyn2/attack"),
    timed("dyn2.hold", "Dynamics 2 hold", "/channel/{channel}/dyn2/hold"),
    timed("dyn2.release", "Dynamics 2 release", "/channel/{channel}/dyn2/release"),
    act("dyn2.knee", "Dynamics 2 knee", "/channel/{channel}/dyn2/knee", I),
    act("dyn2.listen", "Dynamics 2 listen", "/channel/{channel}/dyn2/listen", S),
    act("dyn2.crossover_low", "Dynamics 2 sidechain low cut", "/channel/{channel}/dyn2/crossover_low", F),
    act("dyn2.crossover_high", "Dynamics 2 sidechain high cut", "/channel/{channel}/dyn2/crossover_high", F),
    // Channel
    act("channel.mute", "Channel mute", "/channel/{channel}/mute", S),
    act("channel.fader", "Channel fader", "/channel/{channel}/input/fader", F),
    act("channel.pan", "Channel pan", "/channel/{channel}/pan", F),
    act("channel.width", "Channel mono/stereo width", "/channel/{channel}/input/width", F),
    act("channel.name", "Channel name", "/channel/{channel}/input/name", S),
    act("delay.enabled", "Channel delay enable", "/channel/{channel}/delay/enabled", S),
    ActionDef {
        id: "delay.time",
        name: "Channel delay time",
        path: "/channel/{channel}/delay/time",
        wire: S,
        time: true,
    },
    act("digitube.enabled", "DiGiTube enable", "/channel/{channel}/digitube/enabled", S),
    act("digitube.bias", "DiGiTube bias", "/channel/{channel}/digitube/bias", I),
    act("digitube.drive", "DiGiTube drive", "/channel/{channel}/digitube/drive", S),
    act("gain.tracking", "Gain tracking", "/channel/{channel}/input/gain_tracking", S),
    act("gain.value", "Input gain", "/channel/{channel}/input/gain", S),
    // Aux / group / CG sends
    act("send.enabled", "Send assign", "/channel/{channel}/send/{output}/enabled", S),
    act("send.level", "Send level", "/channel/{channel}/send/{output}/level", F),
    act("send.pan", "Send pan", "/channel/{channel}/send/{output}/pan", F),
];

/// Look up an action by id
pub fn find(id: &str) -> Option<&'static ActionDef> {
    ACTIONS.iter().find(|def| def.id == id)
}

impl ActionDef {
    /// Placeholder names in template order
    pub fn placeholders(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let mut rest = self.path;
        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    names.push(&after[..close]);
                    rest = &after[close + 1..];
                },
                None => break,
            }
        }
        names
    }
}

/// Parameters and value for one action invocation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub params: HashMap<String, String>,
    pub value: String,
}

/// Expand an action into the messages it sends
pub fn build_messages(
    def: &ActionDef,
    params: &HashMap<String, String>,
    value: &str,
    units: &UnitsConfig,
) -> Result<Vec<Message>, SessionError> {
    let arg = encode_value(def, value, units)?;

    let mut paths = vec![String::new()];
    let mut rest = def.path;
    for name in def.placeholders() {
        let marker = format!("{{{}}}", name);
        let Some(at) = rest.find(&marker) else {
            break;
        };
        let literal = &rest[..at];
        rest = &rest[at + marker.len()..];

        let values = param_values(def, params, name)?;
        paths = paths
            .iter()
            .flat_map(|prefix| values.iter().map(move |v| format!("{}{}{}", prefix, literal, v)))
            .collect();
    }

    Ok(paths
        .into_iter()
        .map(|path| Message::new(format!("{}{}", path, rest), vec![arg.clone()]))
        .collect())
}

fn param_values<'a>(
    def: &ActionDef,
    params: &'a HashMap<String, String>,
    name: &str,
) -> Result<Vec<&'a str>, SessionError> {
    let values: Vec<&str> = params
        .get(name)
        .map(|raw| raw.split(',').map(str::trim).filter(|v| !v.is_empty()).collect())
        .unwrap_or_default();

    // Values land in the path; whitespace or slashes would change its shape
    if let Some(bad) = values.iter().find(|v| v.contains(|c: char| c == '/' || c.is_whitespace())) {
        return Err(ArgumentError::InvalidParameter {
            param: name.to_string(),
            value: (*bad).to_string(),
        }
        .into());
    }

    if values.is_empty() {
        return Err(SessionError::MissingParameter {
            action: def.id.to_string(),
            param: name.to_string(),
        });
    }
    Ok(values)
}

fn encode_value(def: &ActionDef, value: &str, units: &UnitsConfig) -> Result<OscArg, SessionError> {
    if !def.time {
        return Ok(OscArg::encode(value, def.wire, BlobEncoding::default())?);
    }

    let trimmed = value.trim();
    let input: f64 = trimmed
        .parse()
        .map_err(|_| ArgumentError::InvalidFloat(trimmed.to_string()))?;
    let converted = units.convert_time(input) as f32;
    Ok(OscArg::encode(&converted.to_string(), def.wire, BlobEncoding::default())?)
}
