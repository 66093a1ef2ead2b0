//! Lighting rules evaluated by controllers on every tick.
//!
//! Two rules exist, checked in order and mutually exclusive per tick:
//!
//! 1. **Low light** — the light is not on and the level is below the
//!    darkness threshold: turn it on.
//! 2. **Auto-off** — the light is on, motion is older than the idle window,
//!    and the level is above the brightness threshold: turn it off and forget
//!    the motion timestamp.
//!
//! At exactly the threshold neither rule fires.

use std::time::Duration;

use serde::Deserialize;

use crate::message::Command;
use crate::time::Timestamp;

/// Device name of the light actuator in every unit.
pub const LIGHT_SWITCH: &str = "light_switch";

/// Reason attached to the reactive motion rule.
pub const REASON_MOTION: &str = "Motion Detected";
/// Reason attached to the low-light rule.
pub const REASON_LOW_LIGHT: &str = "Low Light Level";
/// Reason attached to the auto-off rule.
pub const REASON_AUTO_OFF: &str = "Auto-Off: Bright & No Motion";

/// Light level assumed when no reading has arrived yet.
///
/// Bright enough that the low-light rule never fires on missing data.
pub const DEFAULT_LIGHT_LEVEL: f64 = 1000.0;

/// Which rule set a controller runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleVariant {
    /// Low-light on plus auto-off after 30 s idle.
    #[default]
    Full,
    /// Auto-off only, after 10 s idle.
    AutoOffOnly,
}

/// Thresholds and switches for the periodic evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightingRules {
    /// Turn the light on below this level (lux).
    pub darkness_lux: f64,
    /// Allow auto-off only above this level (lux).
    pub brightness_lux: f64,
    /// Motion older than this counts as idle.
    pub idle_window: Duration,
    /// Whether the low-light rule runs.
    pub low_light_enabled: bool,
}

impl LightingRules {
    /// Low-light on and auto-off with a 30 s idle window.
    #[must_use]
    pub const fn full() -> Self {
        Self {
            darkness_lux: 400.0,
            brightness_lux: 400.0,
            idle_window: Duration::from_secs(30),
            low_light_enabled: true,
        }
    }

    /// Auto-off only, with a 10 s idle window.
    #[must_use]
    pub const fn auto_off_only() -> Self {
        Self {
            darkness_lux: 400.0,
            brightness_lux: 400.0,
            idle_window: Duration::from_secs(10),
            low_light_enabled: false,
        }
    }

    /// Decide what, if anything, to command for one unit at `now`.
    #[must_use]
    pub fn decide(&self, unit: &UnitSnapshot, now: Timestamp) -> Option<Decision> {
        let light_level = unit.light_level.unwrap_or(DEFAULT_LIGHT_LEVEL);

        if self.low_light_enabled && !unit.light_on && light_level < self.darkness_lux {
            return Some(Decision {
                command: Command::On,
                reason: REASON_LOW_LIGHT,
                clear_motion: false,
            });
        }

        if unit.light_on && self.is_idle(unit.last_motion, now) && light_level > self.brightness_lux
        {
            return Some(Decision {
                command: Command::Off,
                reason: REASON_AUTO_OFF,
                clear_motion: true,
            });
        }

        None
    }

    /// Motion never seen counts as idle.
    fn is_idle(&self, last_motion: Option<Timestamp>, now: Timestamp) -> bool {
        let Some(last) = last_motion else {
            return true;
        };
        (now - last)
            .to_std()
            .is_ok_and(|elapsed| elapsed > self.idle_window)
    }
}

impl Default for LightingRules {
    fn default() -> Self {
        Self::full()
    }
}

impl From<RuleVariant> for LightingRules {
    fn from(variant: RuleVariant) -> Self {
        match variant {
            RuleVariant::Full => Self::full(),
            RuleVariant::AutoOffOnly => Self::auto_off_only(),
        }
    }
}

/// What a controller knows about a unit at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UnitSnapshot {
    /// Last commanded light state is `ON`.
    pub light_on: bool,
    /// Latest light reading, if any.
    pub light_level: Option<f64>,
    /// Last time motion was detected, if any.
    pub last_motion: Option<Timestamp>,
}

/// Outcome of a rule evaluation for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub command: Command,
    pub reason: &'static str,
    /// Forget the motion timestamp once the command is recorded.
    pub clear_motion: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn now() -> Timestamp {
        crate::time::now()
    }

    #[test]
    fn should_turn_on_when_dark_and_off() {
        let unit = UnitSnapshot {
            light_on: false,
            light_level: Some(350.0),
            last_motion: None,
        };
        let decision = LightingRules::full().decide(&unit, now()).unwrap();
        assert_eq!(decision.command, Command::On);
        assert_eq!(decision.reason, REASON_LOW_LIGHT);
        assert!(!decision.clear_motion);
    }

    #[test]
    fn should_not_turn_on_when_already_on() {
        let t = now();
        let unit = UnitSnapshot {
            light_on: true,
            light_level: Some(100.0),
            last_motion: Some(t - TimeDelta::seconds(5)),
        };
        assert_eq!(LightingRules::full().decide(&unit, t), None);
    }

    #[test]
    fn should_turn_off_when_bright_and_idle() {
        let t = now();
        let unit = UnitSnapshot {
            light_on: true,
            light_level: Some(500.0),
            last_motion: Some(t - TimeDelta::seconds(40)),
        };
        let decision = LightingRules::full().decide(&unit, t).unwrap();
        assert_eq!(decision.command, Command::Off);
        assert_eq!(decision.reason, REASON_AUTO_OFF);
        assert!(decision.clear_motion);
    }

    #[test]
    fn should_keep_light_on_with_recent_motion() {
        let t = now();
        let unit = UnitSnapshot {
            light_on: true,
            light_level: Some(500.0),
            last_motion: Some(t - TimeDelta::seconds(20)),
        };
        assert_eq!(LightingRules::full().decide(&unit, t), None);
    }

    #[test]
    fn should_fire_neither_rule_at_exact_threshold() {
        let t = now();
        let off = UnitSnapshot {
            light_on: false,
            light_level: Some(400.0),
            last_motion: None,
        };
        let on = UnitSnapshot {
            light_on: true,
            light_level: Some(400.0),
            last_motion: None,
        };
        assert_eq!(LightingRules::full().decide(&off, t), None);
        assert_eq!(LightingRules::full().decide(&on, t), None);
    }

    #[test]
    fn should_treat_missing_motion_as_idle() {
        let unit = UnitSnapshot {
            light_on: true,
            light_level: None,
            last_motion: None,
        };
        let decision = LightingRules::full().decide(&unit, now()).unwrap();
        assert_eq!(decision.command, Command::Off);
    }

    #[test]
    fn should_not_turn_on_without_light_reading() {
        let unit = UnitSnapshot::default();
        assert_eq!(LightingRules::full().decide(&unit, now()), None);
    }

    #[test]
    fn should_skip_low_light_rule_in_auto_off_only_variant() {
        let unit = UnitSnapshot {
            light_on: false,
            light_level: Some(10.0),
            last_motion: None,
        };
        assert_eq!(LightingRules::auto_off_only().decide(&unit, now()), None);
    }

    #[test]
    fn should_use_ten_second_idle_window_in_auto_off_only_variant() {
        let t = now();
        let unit = UnitSnapshot {
            light_on: true,
            light_level: Some(800.0),
            last_motion: Some(t - TimeDelta::seconds(12)),
        };
        assert!(LightingRules::auto_off_only().decide(&unit, t).is_some());
        assert!(LightingRules::full().decide(&unit, t).is_none());
    }

    #[test]
    fn should_map_variant_to_rules() {
        assert_eq!(LightingRules::from(RuleVariant::Full), LightingRules::full());
        assert_eq!(
            LightingRules::from(RuleVariant::AutoOffOnly),
            LightingRules::auto_off_only()
        );
    }

    #[test]
    fn should_treat_future_motion_as_recent() {
        let t = now();
        let unit = UnitSnapshot {
            light_on: true,
            light_level: Some(900.0),
            last_motion: Some(t + TimeDelta::seconds(5)),
        };
        assert_eq!(LightingRules::full().decide(&unit, t), None);
    }
}
