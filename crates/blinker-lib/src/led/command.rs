//! WLED JSON state payloads.

use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};

use super::color::{Color, channel};

/// WLED's built-in "Solid" effect.
pub const FX_SOLID: u8 = 0;

/// One segment of a state update. Only segment 0 is ever addressed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub id: u8,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub col: Vec<Color>,
    pub fx: u8,
    pub sx: u8,
    pub ix: u8,
}

/// A full state update sent to `/json/state`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedCommand {
    pub on: bool,
    pub bri: u8,
    /// Crossfade time; WLED expects units of 100 ms.
    #[serde(serialize_with = "as_deciseconds")]
    pub transition: Duration,
    pub seg: Vec<Segment>,
}

fn as_deciseconds<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    let ds = (d.as_millis() / 100).min(u128::from(u16::MAX)) as u16;
    s.serialize_u16(ds)
}

impl LedCommand {
    /// Solid color on segment 0.
    pub fn solid(color: Color, brightness: i64, transition: Duration) -> Self {
        LedCommand {
            on: true,
            bri: channel(brightness),
            transition,
            seg: vec![Segment {
                id: 0,
                col: vec![color],
                fx: FX_SOLID,
                sx: 0,
                ix: 0,
            }],
        }
    }

    /// Built-in effect by index, keeping the segment's current colors.
    pub fn effect(
        index: i64,
        speed: i64,
        intensity: i64,
        brightness: i64,
        transition: Duration,
    ) -> Self {
        LedCommand {
            on: true,
            bri: channel(brightness),
            transition,
            seg: vec![Segment {
                id: 0,
                col: Vec::new(),
                fx: channel(index),
                sx: channel(speed),
                ix: channel(intensity),
            }],
        }
    }

    /// The primary color of segment 0, if the command sets one.
    pub fn color(&self) -> Option<Color> {
        self.seg.first().and_then(|s| s.col.first().copied())
    }

    /// The effect index of segment 0.
    pub fn fx(&self) -> Option<u8> {
        self.seg.first().map(|s| s.fx)
    }
}

/// What the strip shows while no sequence is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleMode {
    /// Dedicated white channel at full level.
    White,
    /// The configured default effect.
    Effect,
}

impl std::fmt::Display for IdleMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdleMode::White => write!(f, "white"),
            IdleMode::Effect => write!(f, "effect"),
        }
    }
}

/// Parameters of the idle/default command.
#[derive(Debug, Clone, PartialEq)]
pub struct IdleSpec {
    pub mode: IdleMode,
    pub effect_index: i64,
    pub effect_speed: i64,
    pub effect_intensity: i64,
    pub brightness: i64,
    pub transition: Duration,
}

impl IdleSpec {
    pub fn command(&self) -> LedCommand {
        match self.mode {
            IdleMode::White => LedCommand::solid(Color::WHITE, self.brightness, self.transition),
            IdleMode::Effect => LedCommand::effect(
                self.effect_index,
                self.effect_speed,
                self.effect_intensity,
                self.brightness,
                self.transition,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn solid_payload_shape() {
        let cmd = LedCommand::solid(Color::Rgbw([0, 0, 255, 0]), 200, Duration::from_millis(700));
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({
                "on": true,
                "bri": 200,
                "transition": 7,
                "seg": [{"id": 0, "col": [[0, 0, 255, 0]], "fx": 0, "sx": 0, "ix": 0}]
            })
        );
    }

    #[test]
    fn effect_payload_omits_colors() {
        let cmd = LedCommand::effect(162, 128, 64, 255, Duration::ZERO);
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({
                "on": true,
                "bri": 255,
                "transition": 0,
                "seg": [{"id": 0, "fx": 162, "sx": 128, "ix": 64}]
            })
        );
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let cmd = LedCommand::effect(999, -1, 256, 1000, Duration::ZERO);
        assert_eq!(cmd.bri, 255);
        let seg = &cmd.seg[0];
        assert_eq!((seg.fx, seg.sx, seg.ix), (255, 0, 255));
    }

    #[test]
    fn accessors() {
        let cmd = LedCommand::solid(Color::OFF, 10, Duration::ZERO);
        assert_eq!(cmd.color(), Some(Color::OFF));
        assert_eq!(cmd.fx(), Some(FX_SOLID));
        assert_eq!(LedCommand::effect(5, 0, 0, 0, Duration::ZERO).color(), None);
    }

    #[test]
    fn idle_white_uses_w_channel() {
        let spec = IdleSpec {
            mode: IdleMode::White,
            effect_index: 162,
            effect_speed: 128,
            effect_intensity: 128,
            brightness: 255,
            transition: Duration::ZERO,
        };
        assert_eq!(spec.command().color(), Some(Color::WHITE));

        let effect = IdleSpec {
            mode: IdleMode::Effect,
            ..spec
        };
        assert_eq!(effect.command().fx(), Some(162));
    }

    #[test]
    fn idle_mode_serde_lowercase() {
        assert_eq!(serde_json::to_string(&IdleMode::Effect).unwrap(), "\"effect\"");
        let m: IdleMode = serde_json::from_str("\"white\"").unwrap();
        assert_eq!(m, IdleMode::White);
    }
}
