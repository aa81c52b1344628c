//! Symbolic time resolution.
//!
//! A [`Resolver`] turns a [`TimeReference`] into a concrete instant on the
//! base instant's civil day, in the evaluation timezone, and then applies
//! the operand's offset. Ephemeris lookups go through the injected
//! [`Almanac`]; context-indirect references read the injected
//! [`ContextStore`]; randomized offsets draw from the injected
//! [`RandomSource`], so resolution is deterministic under test.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;
use serde_json::Value;
use tracing::trace;

use crate::condition::{parse_clock, OffsetSpec, TimeOperand, TimeReference, MS_PER_DAY};
use crate::error::{Result, RuleError, TimeFault};
use crate::providers::{Almanac, ContextStore, CustomEventRegistry, RandomSource, SolarEdge};

/// Fixed evaluation parameters shared by every condition in a rule set.
#[derive(Debug, Clone, Copy)]
pub struct EvalConfig {
    pub timezone: Tz,
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            latitude: 0.0,
            longitude: 0.0,
        }
    }
}

/// Resolves symbolic time references against a base instant.
#[derive(Clone)]
pub struct Resolver {
    pub(crate) config: EvalConfig,
    pub(crate) almanac: Arc<dyn Almanac>,
    pub(crate) custom: Arc<CustomEventRegistry>,
    pub(crate) store: Arc<dyn ContextStore>,
    pub(crate) random: Arc<dyn RandomSource>,
}

impl Resolver {
    pub fn new(
        config: EvalConfig,
        almanac: Arc<dyn Almanac>,
        custom: Arc<CustomEventRegistry>,
        store: Arc<dyn ContextStore>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            config,
            almanac,
            custom,
            store,
            random,
        }
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Resolve an operand on the base instant's day and apply its offset.
    ///
    /// With `randomize` unset the result is a pure function of the base day;
    /// with it set, the offset is redrawn on every call.
    pub fn resolve(&self, base: DateTime<Tz>, operand: &TimeOperand) -> Result<DateTime<Tz>> {
        let instant = self.resolve_reference(base, &operand.reference)?;
        let minutes = self.effective_offset(operand.offset);
        let shifted = instant + Duration::minutes(minutes);
        trace!(
            reference = %operand.reference.describe(),
            offset_minutes = minutes,
            resolved = %shifted,
            "resolved time reference"
        );
        Ok(shifted)
    }

    fn effective_offset(&self, offset: OffsetSpec) -> i64 {
        let minutes = i64::from(offset.minutes);
        if !offset.randomize {
            return minutes;
        }
        let jitter = self.random.offset_jitter(minutes.abs());
        if minutes < 0 {
            -jitter
        } else {
            jitter
        }
    }

    fn resolve_reference(
        &self,
        base: DateTime<Tz>,
        reference: &TimeReference,
    ) -> Result<DateTime<Tz>> {
        let day = base.date_naive();
        match reference {
            TimeReference::Clock(ms) => self.clock_instant(day, *ms, reference),
            TimeReference::Sun(name) => {
                let events =
                    self.almanac
                        .sun_events(day, self.config.latitude, self.config.longitude);
                match events.get(name) {
                    None => Err(unresolvable(reference, TimeFault::UnknownEvent)),
                    Some(None) => Err(unresolvable(
                        reference,
                        TimeFault::EventUnavailable {
                            always_up: false,
                            always_down: false,
                        },
                    )),
                    Some(Some(instant)) => Ok(instant.with_timezone(&self.config.timezone)),
                }
            }
            TimeReference::Moon(name) => {
                let moon =
                    self.almanac
                        .moon_events(day, self.config.latitude, self.config.longitude);
                match moon.events.get(name) {
                    None => Err(unresolvable(reference, TimeFault::UnknownEvent)),
                    Some(None) => Err(unresolvable(
                        reference,
                        TimeFault::EventUnavailable {
                            always_up: moon.always_up,
                            always_down: moon.always_down,
                        },
                    )),
                    Some(Some(instant)) => Ok(instant.with_timezone(&self.config.timezone)),
                }
            }
            TimeReference::Custom(name) => {
                let (angle, edge) = self
                    .custom
                    .lookup(name)
                    .ok_or_else(|| unresolvable(reference, TimeFault::UnknownEvent))?;
                let events = self.almanac.custom_events(
                    day,
                    self.config.latitude,
                    self.config.longitude,
                    angle,
                );
                let instant = match edge {
                    SolarEdge::Rise => events.rise,
                    SolarEdge::Set => events.set,
                };
                instant
                    .map(|utc| utc.with_timezone(&self.config.timezone))
                    .ok_or_else(|| {
                        unresolvable(
                            reference,
                            TimeFault::EventUnavailable {
                                always_up: false,
                                always_down: false,
                            },
                        )
                    })
            }
            TimeReference::Context { store, key } => {
                let ms = match self.store.get(*store, key) {
                    Some(Value::Number(number)) => {
                        let raw = number
                            .as_i64()
                            .ok_or_else(|| unresolvable(reference, TimeFault::BadContextType))?;
                        if !(0..MS_PER_DAY).contains(&raw) {
                            return Err(unresolvable(reference, TimeFault::BadClockNumber(raw)));
                        }
                        raw as u32
                    }
                    Some(Value::String(text)) => parse_clock(&text)
                        .ok_or_else(|| unresolvable(reference, TimeFault::BadClockString))?,
                    _ => return Err(unresolvable(reference, TimeFault::BadContextType)),
                };
                self.clock_instant(day, ms, reference)
            }
        }
    }

    /// Milliseconds since midnight on `day`, as a wall-clock instant.
    /// Ambiguous local times (DST fold) take the earlier instant; a time in
    /// a DST gap does not exist and is an error.
    fn clock_instant(
        &self,
        day: NaiveDate,
        ms: u32,
        reference: &TimeReference,
    ) -> Result<DateTime<Tz>> {
        let time = NaiveTime::from_num_seconds_from_midnight_opt(ms / 1000, (ms % 1000) * 1_000_000)
            .ok_or_else(|| unresolvable(reference, TimeFault::BadClockNumber(i64::from(ms))))?;
        self.config
            .timezone
            .from_local_datetime(&day.and_time(time))
            .earliest()
            .ok_or_else(|| unresolvable(reference, TimeFault::NonexistentLocalTime))
    }
}

fn unresolvable(reference: &TimeReference, fault: TimeFault) -> RuleError {
    RuleError::UnresolvableTime {
        reference: reference.describe(),
        fault,
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
