//! Derived unit state
//!
//! [`X10Monitor`] watches the event stream and infers the on/off and
//! brightness status of every house/unit pair. X10 functions apply to
//! "whatever is currently addressed", so the monitor also tracks the open
//! addressing group:
//!
//! - consecutive address events on one house code accumulate into a group;
//! - an address on a different house code, or any address that follows a
//!   function, starts a new group;
//! - functions act on the group without closing it until the next address.
//!
//! Unit status is materialized lazily with defaults (off, brightness 0,
//! light) the first time a unit is queried or updated.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use tracing::trace;

use crate::codes::{FunctionCode, HouseCode, OtherCode, UnitCode};
use crate::event::{EventKind, TransmitterEvent, X10Event, MAX_BRIGHTNESS_LEVEL, MIN_BRIGHTNESS_LEVEL};
use crate::listener::{TransmitterListener, X10Listener};

/// Recorded status of one unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitStatus {
    /// Unit is on
    pub on: bool,
    /// Brightness in `0.0..=1.0`
    pub brightness: f64,
    /// Unit responds to light-only functions (dim, brighten, all lights)
    pub light: bool,
}

impl Default for UnitStatus {
    fn default() -> Self {
        Self {
            on: false,
            brightness: MIN_BRIGHTNESS_LEVEL,
            light: true,
        }
    }
}

#[derive(Debug, Default)]
struct MonitorState {
    units: HashMap<(HouseCode, UnitCode), UnitStatus>,
    addressed_house_code: Option<HouseCode>,
    addressed_unit_codes: BTreeSet<UnitCode>,
    last_event_kind: Option<EventKind>,
}

impl MonitorState {
    fn status(&mut self, house: HouseCode, unit: UnitCode) -> &mut UnitStatus {
        self.units.entry((house, unit)).or_default()
    }

    fn clear_addressing(&mut self) {
        self.addressed_house_code = None;
        self.addressed_unit_codes.clear();
    }

    fn addressed(&self) -> Vec<(HouseCode, UnitCode)> {
        match self.addressed_house_code {
            Some(house) => self
                .addressed_unit_codes
                .iter()
                .map(|unit| (house, *unit))
                .collect(),
            None => Vec::new(),
        }
    }

    fn record(&mut self, event: &X10Event) {
        match event.other_code() {
            OtherCode::Unit(unit) => {
                if self.last_event_kind == Some(EventKind::Function)
                    || self.addressed_house_code != Some(event.house_code())
                {
                    self.clear_addressing();
                    self.addressed_house_code = Some(event.house_code());
                }
                self.addressed_unit_codes.insert(unit);
            }
            OtherCode::Function(FunctionCode::On) => {
                for (house, unit) in self.addressed() {
                    let status = self.status(house, unit);
                    if !status.on {
                        status.brightness = MAX_BRIGHTNESS_LEVEL;
                    }
                    status.on = true;
                }
            }
            OtherCode::Function(FunctionCode::Off) => {
                for (house, unit) in self.addressed() {
                    let status = self.status(house, unit);
                    status.on = false;
                    status.brightness = MIN_BRIGHTNESS_LEVEL;
                }
            }
            OtherCode::Function(func @ (FunctionCode::Dim | FunctionCode::Brighten)) => {
                let delta = match func {
                    FunctionCode::Dim => -event.brightness_level(),
                    _ => event.brightness_level(),
                };
                for (house, unit) in self.addressed() {
                    let status = self.status(house, unit);
                    if !status.light {
                        continue;
                    }
                    let level = if status.on {
                        status.brightness
                    } else {
                        MAX_BRIGHTNESS_LEVEL
                    };
                    status.brightness =
                        (level + delta).clamp(MIN_BRIGHTNESS_LEVEL, MAX_BRIGHTNESS_LEVEL);
                }
            }
            OtherCode::Function(FunctionCode::AllUnitsOff) => {
                for status in self.units.values_mut() {
                    status.on = false;
                    status.brightness = MIN_BRIGHTNESS_LEVEL;
                }
            }
            OtherCode::Function(FunctionCode::AllLightsOn) => self.all_lights(true),
            OtherCode::Function(FunctionCode::AllLightsOff) => self.all_lights(false),
            OtherCode::Function(_) => {}
        }
        self.last_event_kind = Some(event.kind());
    }

    fn all_lights(&mut self, on: bool) {
        for house in HouseCode::ALL {
            for unit in UnitCode::ALL {
                let status = self.status(house, unit);
                if !status.light {
                    continue;
                }
                if on && !status.on {
                    status.brightness = MAX_BRIGHTNESS_LEVEL;
                } else if !on {
                    status.brightness = MIN_BRIGHTNESS_LEVEL;
                }
                status.on = on;
            }
        }
    }
}

/// Tracks unit state by observing decoded and delivered events
#[derive(Debug, Default)]
pub struct X10Monitor {
    state: Mutex<MonitorState>,
}

impl X10Monitor {
    /// Create a monitor with no recorded state
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the recorded state
    pub fn record_event(&self, event: &X10Event) {
        trace!(%event, "Recording event");
        self.state.lock().record(event);
    }

    /// Fold a batch of events in order, as one atomic update
    pub fn record_events(&self, events: &[X10Event]) {
        let mut state = self.state.lock();
        for event in events {
            state.record(event);
        }
    }

    /// House code of the open addressing group
    pub fn addressed_house_code(&self) -> Option<HouseCode> {
        self.state.lock().addressed_house_code
    }

    /// Units in the open addressing group
    pub fn addressed_unit_codes(&self) -> BTreeSet<UnitCode> {
        self.state.lock().addressed_unit_codes.clone()
    }

    /// Snapshot of a unit's status
    pub fn status(&self, house: HouseCode, unit: UnitCode) -> UnitStatus {
        *self.state.lock().status(house, unit)
    }

    /// True if the unit is on
    pub fn is_on(&self, house: HouseCode, unit: UnitCode) -> bool {
        self.status(house, unit).on
    }

    /// True if the unit is off
    pub fn is_off(&self, house: HouseCode, unit: UnitCode) -> bool {
        !self.is_on(house, unit)
    }

    /// Brightness in `0.0..=1.0`
    pub fn brightness_level(&self, house: HouseCode, unit: UnitCode) -> f64 {
        self.status(house, unit).brightness
    }

    /// Mark whether a unit is a light
    pub fn set_light(&self, house: HouseCode, unit: UnitCode, light: bool) {
        self.state.lock().status(house, unit).light = light;
    }

    /// True if the unit is treated as a light
    pub fn is_light(&self, house: HouseCode, unit: UnitCode) -> bool {
        self.status(house, unit).light
    }
}

impl X10Listener for X10Monitor {
    fn address(&self, event: &X10Event) {
        self.record_event(event);
    }
    fn all_units_off(&self, event: &X10Event) {
        self.record_event(event);
    }
    fn all_lights_on(&self, event: &X10Event) {
        self.record_event(event);
    }
    fn all_lights_off(&self, event: &X10Event) {
        self.record_event(event);
    }
    fn on(&self, event: &X10Event) {
        self.record_event(event);
    }
    fn off(&self, event: &X10Event) {
        self.record_event(event);
    }
    fn dim(&self, event: &X10Event) {
        self.record_event(event);
    }
    fn brighten(&self, event: &X10Event) {
        self.record_event(event);
    }
    fn extended_code(&self, event: &X10Event) {
        self.record_event(event);
    }
    fn hail_request(&self, event: &X10Event) {
        self.record_event(event);
    }
    fn hail_acknowledge(&self, event: &X10Event) {
        self.record_event(event);
    }
    fn preset_dim_1(&self, event: &X10Event) {
        self.record_event(event);
    }
    fn preset_dim_2(&self, event: &X10Event) {
        self.record_event(event);
    }
    fn extended_data_transfer(&self, event: &X10Event) {
        self.record_event(event);
    }
    fn status_on(&self, event: &X10Event) {
        self.record_event(event);
    }
    fn status_off(&self, event: &X10Event) {
        self.record_event(event);
    }
    fn status_request(&self, event: &X10Event) {
        self.record_event(event);
    }
}

impl TransmitterListener for X10Monitor {
    fn event_delivered(&self, event: &TransmitterEvent) {
        if let Some(e) = event.x10_event() {
            self.record_event(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(house: HouseCode, unit: UnitCode) -> X10Event {
        X10Event::address(house, unit)
    }

    fn func(house: HouseCode, function: FunctionCode) -> X10Event {
        X10Event::function(house, function).unwrap()
    }

    fn dim(house: HouseCode, level: f64) -> X10Event {
        X10Event::brightness(house, FunctionCode::Dim, level).unwrap()
    }

    #[test]
    fn test_defaults() {
        let monitor = X10Monitor::new();
        assert!(monitor.is_off(HouseCode::C, UnitCode::Unit7));
        assert_eq!(monitor.brightness_level(HouseCode::C, UnitCode::Unit7), 0.0);
        assert!(monitor.is_light(HouseCode::C, UnitCode::Unit7));
        assert_eq!(monitor.addressed_house_code(), None);
    }

    #[test]
    fn test_addressing_group_and_on() {
        let monitor = X10Monitor::new();
        monitor.record_event(&addr(HouseCode::A, UnitCode::Unit1));
        monitor.record_event(&addr(HouseCode::A, UnitCode::Unit2));
        monitor.record_event(&func(HouseCode::A, FunctionCode::On));

        assert!(monitor.is_on(HouseCode::A, UnitCode::Unit1));
        assert!(monitor.is_on(HouseCode::A, UnitCode::Unit2));
        assert_eq!(monitor.brightness_level(HouseCode::A, UnitCode::Unit1), 1.0);
        assert_eq!(monitor.brightness_level(HouseCode::A, UnitCode::Unit2), 1.0);
        assert!(monitor.is_off(HouseCode::A, UnitCode::Unit3));
    }

    #[test]
    fn test_function_closes_group() {
        let monitor = X10Monitor::new();
        monitor.record_events(&[
            addr(HouseCode::A, UnitCode::Unit1),
            addr(HouseCode::A, UnitCode::Unit2),
            func(HouseCode::A, FunctionCode::On),
            addr(HouseCode::A, UnitCode::Unit1),
            dim(HouseCode::A, 0.3),
        ]);

        let unit1 = monitor.brightness_level(HouseCode::A, UnitCode::Unit1);
        assert!((unit1 - 0.7).abs() < 1e-9);
        assert_eq!(monitor.brightness_level(HouseCode::A, UnitCode::Unit2), 1.0);
        assert_eq!(
            monitor.addressed_unit_codes().into_iter().collect::<Vec<_>>(),
            vec![UnitCode::Unit1]
        );
    }

    #[test]
    fn test_house_change_starts_new_group() {
        let monitor = X10Monitor::new();
        monitor.record_event(&addr(HouseCode::A, UnitCode::Unit1));
        monitor.record_event(&addr(HouseCode::B, UnitCode::Unit5));
        assert_eq!(monitor.addressed_house_code(), Some(HouseCode::B));
        assert_eq!(monitor.addressed_unit_codes().len(), 1);

        monitor.record_event(&func(HouseCode::B, FunctionCode::On));
        assert!(monitor.is_on(HouseCode::B, UnitCode::Unit5));
        assert!(monitor.is_off(HouseCode::A, UnitCode::Unit1));
    }

    #[test]
    fn test_dim_clamps_and_skips_non_lights() {
        let monitor = X10Monitor::new();
        monitor.set_light(HouseCode::A, UnitCode::Unit2, false);
        monitor.record_events(&[
            addr(HouseCode::A, UnitCode::Unit1),
            addr(HouseCode::A, UnitCode::Unit2),
            func(HouseCode::A, FunctionCode::On),
            dim(HouseCode::A, 0.8),
            dim(HouseCode::A, 0.8),
        ]);

        assert_eq!(monitor.brightness_level(HouseCode::A, UnitCode::Unit1), 0.0);
        assert_eq!(monitor.brightness_level(HouseCode::A, UnitCode::Unit2), 1.0);
    }

    #[test]
    fn test_dim_off_unit_starts_from_full() {
        let monitor = X10Monitor::new();
        monitor.record_event(&addr(HouseCode::D, UnitCode::Unit4));
        monitor.record_event(&dim(HouseCode::D, 0.25));
        assert_eq!(monitor.brightness_level(HouseCode::D, UnitCode::Unit4), 0.75);
        assert!(monitor.is_off(HouseCode::D, UnitCode::Unit4));
    }

    #[test]
    fn test_brighten_clamps_at_full() {
        let monitor = X10Monitor::new();
        monitor.record_events(&[
            addr(HouseCode::A, UnitCode::Unit1),
            func(HouseCode::A, FunctionCode::On),
            dim(HouseCode::A, 0.5),
            X10Event::brightness(HouseCode::A, FunctionCode::Brighten, 0.9).unwrap(),
        ]);
        assert_eq!(monitor.brightness_level(HouseCode::A, UnitCode::Unit1), 1.0);
    }

    #[test]
    fn test_off_resets_brightness() {
        let monitor = X10Monitor::new();
        monitor.record_events(&[
            addr(HouseCode::A, UnitCode::Unit1),
            func(HouseCode::A, FunctionCode::On),
            func(HouseCode::A, FunctionCode::Off),
        ]);
        assert!(monitor.is_off(HouseCode::A, UnitCode::Unit1));
        assert_eq!(monitor.brightness_level(HouseCode::A, UnitCode::Unit1), 0.0);
    }

    #[test]
    fn test_all_lights_respects_light_flag() {
        let monitor = X10Monitor::new();
        monitor.set_light(HouseCode::P, UnitCode::Unit16, false);
        monitor.record_event(&func(HouseCode::A, FunctionCode::AllLightsOn));

        assert!(monitor.is_on(HouseCode::F, UnitCode::Unit3));
        assert!(monitor.is_off(HouseCode::P, UnitCode::Unit16));

        monitor.record_event(&func(HouseCode::A, FunctionCode::AllLightsOff));
        assert!(monitor.is_off(HouseCode::F, UnitCode::Unit3));
        assert_eq!(monitor.brightness_level(HouseCode::F, UnitCode::Unit3), 0.0);
    }

    #[test]
    fn test_all_lights_on_lights_at_full_brightness() {
        let monitor = X10Monitor::new();
        monitor.record_event(&func(HouseCode::A, FunctionCode::AllLightsOn));
        assert_eq!(monitor.brightness_level(HouseCode::A, UnitCode::Unit1), 1.0);

        monitor.record_events(&[
            addr(HouseCode::A, UnitCode::Unit1),
            func(HouseCode::A, FunctionCode::On),
        ]);
        assert!(monitor.is_on(HouseCode::A, UnitCode::Unit1));
        assert_eq!(monitor.brightness_level(HouseCode::A, UnitCode::Unit1), 1.0);

        monitor.record_event(&dim(HouseCode::A, 0.3));
        let level = monitor.brightness_level(HouseCode::A, UnitCode::Unit1);
        assert!((level - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_all_lights_on_keeps_dimmed_level() {
        let monitor = X10Monitor::new();
        monitor.record_events(&[
            addr(HouseCode::B, UnitCode::Unit2),
            func(HouseCode::B, FunctionCode::On),
            dim(HouseCode::B, 0.5),
            func(HouseCode::B, FunctionCode::AllLightsOn),
        ]);
        assert_eq!(monitor.brightness_level(HouseCode::B, UnitCode::Unit2), 0.5);
        assert_eq!(monitor.brightness_level(HouseCode::B, UnitCode::Unit3), 1.0);
    }

    #[test]
    fn test_all_units_off_clears_status_keeps_light_flag() {
        let monitor = X10Monitor::new();
        monitor.set_light(HouseCode::A, UnitCode::Unit3, false);
        monitor.record_events(&[
            addr(HouseCode::A, UnitCode::Unit1),
            addr(HouseCode::A, UnitCode::Unit3),
            func(HouseCode::A, FunctionCode::On),
            func(HouseCode::A, FunctionCode::AllUnitsOff),
        ]);

        assert!(monitor.is_off(HouseCode::A, UnitCode::Unit1));
        assert!(monitor.is_off(HouseCode::A, UnitCode::Unit3));
        assert_eq!(monitor.brightness_level(HouseCode::A, UnitCode::Unit1), 0.0);
        assert_eq!(monitor.brightness_level(HouseCode::A, UnitCode::Unit3), 0.0);
        assert!(!monitor.is_light(HouseCode::A, UnitCode::Unit3));
    }

    #[test]
    fn test_listener_hooks_record() {
        let monitor = X10Monitor::new();
        let a1 = addr(HouseCode::A, UnitCode::Unit1);
        X10Listener::address(&monitor, &a1);
        monitor.event_delivered(&TransmitterEvent::EventDelivered(func(
            HouseCode::A,
            FunctionCode::On,
        )));
        // Undelivered events are ignored
        monitor.event_undelivered(&TransmitterEvent::EventUndelivered(func(
            HouseCode::A,
            FunctionCode::Off,
        )));
        assert!(monitor.is_on(HouseCode::A, UnitCode::Unit1));
    }
}
