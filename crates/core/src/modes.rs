use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SimError;

/// Transportation mode carried by a route.
///
/// `Any` is a query-side wildcard only; stored edges always carry a concrete
/// mode. Wire encoding is the integer discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "ModeRepr", into = "i64")]
pub enum TransportationMode {
    Truck = 0,
    Train = 1,
    Ship = 2,
    Any = 3,
}

/// Physical side of a terminal and the modes it can serve there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "ModeRepr", into = "i64")]
pub enum TerminalInterface {
    LandSide = 0,
    SeaSide = 1,
    RailSide = 2,
}

/// Accepts either the integer discriminant or the enum name from the wire.
#[derive(Deserialize)]
#[serde(untagged)]
enum ModeRepr {
    Int(i64),
    Name(String),
}

impl TransportationMode {
    pub fn from_i64(value: i64) -> Result<Self, SimError> {
        match value {
            0 => Ok(TransportationMode::Truck),
            1 => Ok(TransportationMode::Train),
            2 => Ok(TransportationMode::Ship),
            3 => Ok(TransportationMode::Any),
            other => Err(SimError::InvalidArgs(format!(
                "Unknown transportation mode: {other}"
            ))),
        }
    }

    pub fn from_name(name: &str) -> Result<Self, SimError> {
        match name {
            "Truck" | "truck" => Ok(TransportationMode::Truck),
            "Train" | "train" => Ok(TransportationMode::Train),
            "Ship" | "ship" => Ok(TransportationMode::Ship),
            "Any" | "any" => Ok(TransportationMode::Any),
            other => {
                if let Ok(value) = other.parse::<i64>() {
                    return Self::from_i64(value);
                }
                Err(SimError::InvalidArgs(format!(
                    "Unknown transportation mode: {other}"
                )))
            }
        }
    }

    /// Parses a JSON value holding either an integer or a string form.
    pub fn from_value(value: &Value) -> Result<Self, SimError> {
        match value {
            Value::Number(n) => {
                let int = n.as_i64().ok_or_else(|| {
                    SimError::InvalidArgs(format!("Non-integer transportation mode: {n}"))
                })?;
                Self::from_i64(int)
            }
            Value::String(s) => Self::from_name(s),
            other => Err(SimError::InvalidArgs(format!(
                "Transportation mode must be an int or string, got {other}"
            ))),
        }
    }

    /// Requires a concrete mode, rejecting the `Any` wildcard.
    pub fn concrete(self) -> Result<Self, SimError> {
        if self == TransportationMode::Any {
            return Err(SimError::InvalidArgs(
                "Transportation mode Any is not allowed here; specify a concrete mode".into(),
            ));
        }
        Ok(self)
    }
}

impl TerminalInterface {
    pub fn from_i64(value: i64) -> Result<Self, SimError> {
        match value {
            0 => Ok(TerminalInterface::LandSide),
            1 => Ok(TerminalInterface::SeaSide),
            2 => Ok(TerminalInterface::RailSide),
            other => Err(SimError::InvalidArgs(format!(
                "Unknown terminal interface: {other}"
            ))),
        }
    }

    pub fn from_name(name: &str) -> Result<Self, SimError> {
        match name {
            "LandSide" | "LAND_SIDE" | "land_side" => Ok(TerminalInterface::LandSide),
            "SeaSide" | "SEA_SIDE" | "sea_side" => Ok(TerminalInterface::SeaSide),
            "RailSide" | "RAIL_SIDE" | "rail_side" => Ok(TerminalInterface::RailSide),
            other => {
                if let Ok(value) = other.parse::<i64>() {
                    return Self::from_i64(value);
                }
                Err(SimError::InvalidArgs(format!(
                    "Unknown terminal interface: {other}"
                )))
            }
        }
    }
}

impl TryFrom<ModeRepr> for TransportationMode {
    type Error = SimError;

    fn try_from(repr: ModeRepr) -> Result<Self, SimError> {
        match repr {
            ModeRepr::Int(i) => Self::from_i64(i),
            ModeRepr::Name(s) => Self::from_name(&s),
        }
    }
}

impl TryFrom<ModeRepr> for TerminalInterface {
    type Error = SimError;

    fn try_from(repr: ModeRepr) -> Result<Self, SimError> {
        match repr {
            ModeRepr::Int(i) => Self::from_i64(i),
            ModeRepr::Name(s) => Self::from_name(&s),
        }
    }
}

impl From<TransportationMode> for i64 {
    fn from(mode: TransportationMode) -> i64 {
        mode as i64
    }
}

impl From<TerminalInterface> for i64 {
    fn from(interface: TerminalInterface) -> i64 {
        interface as i64
    }
}

impl std::fmt::Display for TransportationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportationMode::Truck => write!(f, "Truck"),
            TransportationMode::Train => write!(f, "Train"),
            TransportationMode::Ship => write!(f, "Ship"),
            TransportationMode::Any => write!(f, "Any"),
        }
    }
}

impl std::fmt::Display for TerminalInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalInterface::LandSide => write!(f, "LandSide"),
            TerminalInterface::SeaSide => write!(f, "SeaSide"),
            TerminalInterface::RailSide => write!(f, "RailSide"),
        }
    }
}

/// Parses a `{interface: [mode, …]}` JSON object (keys and modes as ints or
/// strings) into a typed interface map. Interfaces that end up with no modes
/// are dropped; an empty result is the caller's problem to reject.
pub fn parse_interface_map(
    value: &Value,
) -> Result<
    indexmap::IndexMap<TerminalInterface, std::collections::BTreeSet<TransportationMode>>,
    SimError,
> {
    let obj = value.as_object().ok_or_else(|| {
        SimError::InvalidArgs("terminal_interfaces must be a JSON object".into())
    })?;

    let mut interfaces = indexmap::IndexMap::new();
    for (key, modes_value) in obj {
        let interface = TerminalInterface::from_name(key)?;
        let modes_list = modes_value.as_array().ok_or_else(|| {
            SimError::InvalidArgs(format!(
                "Modes for interface {key} must be an array"
            ))
        })?;

        let mut modes = std::collections::BTreeSet::new();
        for mode_value in modes_list {
            modes.insert(TransportationMode::from_value(mode_value)?.concrete()?);
        }
        if !modes.is_empty() {
            interfaces.insert(interface, modes);
        }
    }
    Ok(interfaces)
}

/// Fixed mode/interface compatibility: trucks use the land side, trains the
/// rail side, ships the sea side.
pub fn mode_can_use_interface(mode: TransportationMode, interface: TerminalInterface) -> bool {
    matches!(
        (mode, interface),
        (TransportationMode::Truck, TerminalInterface::LandSide)
            | (TransportationMode::Train, TerminalInterface::RailSide)
            | (TransportationMode::Ship, TerminalInterface::SeaSide)
    )
}
