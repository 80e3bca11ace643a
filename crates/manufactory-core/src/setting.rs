//! Post-production setting timer.
//!
//! A produced material stack "sets" while it sits outside powered
//! production storage: its per-stack counter climbs toward the rule's
//! duration, and on reaching it the stack degrades into a byproduct of
//! equal quantity. Inside powered production storage the counter is
//! frozen. Conversion is one-way; the transaction that performs it is the
//! container's responsibility (see `SlotStorage::convert_stack`) and must
//! roll back if the byproduct cannot be inserted.

use crate::fixed::{Fixed64, Ticks, unit_fraction};
use crate::material::MaterialStack;
use crate::registry::SettingRule;

/// Outcome of one setting tick for a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingTick {
    /// Held in powered production storage; progress frozen.
    Paused,
    /// Progress advanced and the threshold is still ahead.
    Advancing,
    /// The threshold was reached; the stack should now convert.
    Due,
}

/// Advance a stack's setting progress by one tick.
///
/// `paused` reflects the stack's current physical containment, re-evaluated
/// by the caller every tick. Progress is monotonic and never exceeds the
/// rule duration; a stack already at the threshold keeps reporting `Due`
/// until its container converts it.
pub fn tick_setting(stack: &mut MaterialStack, rule: &SettingRule, paused: bool) -> SettingTick {
    if paused {
        return SettingTick::Paused;
    }
    if stack.setting_ticks >= rule.duration {
        stack.setting_ticks = rule.duration;
        return SettingTick::Due;
    }
    stack.setting_ticks += 1;
    if stack.setting_ticks >= rule.duration {
        SettingTick::Due
    } else {
        SettingTick::Advancing
    }
}

/// Setting progress as a 0..1 fraction, for inspection.
pub fn setting_percent(stack: &MaterialStack, rule: &SettingRule) -> Fixed64 {
    unit_fraction(stack.setting_ticks, rule.duration)
}

/// Clamp a loaded setting counter into its valid range.
pub fn clamp_setting_ticks(ticks: i64, rule: Option<&SettingRule>) -> Ticks {
    let ticks = ticks.max(0) as Ticks;
    match rule {
        Some(rule) => ticks.min(rule.duration),
        None => 0,
    }
}
