//! Observer traits for decoded events and queue lifecycle
//!
//! Every callback has an empty default body, so an implementor only
//! overrides what it cares about. [`route_event`] and
//! [`route_transmitter_event`] pick the callback for an event.

use crate::codes::{FunctionCode, OtherCode};
use crate::event::{TransmitterEvent, X10Event};

/// Receives X10 events, one callback per address/function kind
pub trait X10Listener: Send + Sync {
    /// A unit was addressed
    fn address(&self, _event: &X10Event) {}
    /// `ALL_UNITS_OFF`
    fn all_units_off(&self, _event: &X10Event) {}
    /// `ALL_LIGHTS_ON`
    fn all_lights_on(&self, _event: &X10Event) {}
    /// `ALL_LIGHTS_OFF`
    fn all_lights_off(&self, _event: &X10Event) {}
    /// `ON`
    fn on(&self, _event: &X10Event) {}
    /// `OFF`
    fn off(&self, _event: &X10Event) {}
    /// `DIM`
    fn dim(&self, _event: &X10Event) {}
    /// `BRIGHTEN`
    fn brighten(&self, _event: &X10Event) {}
    /// `EXTENDED_CODE`
    fn extended_code(&self, _event: &X10Event) {}
    /// `HAIL_REQUEST`
    fn hail_request(&self, _event: &X10Event) {}
    /// `HAIL_ACKNOWLEDGE`
    fn hail_acknowledge(&self, _event: &X10Event) {}
    /// `PRESET_DIM_1`
    fn preset_dim_1(&self, _event: &X10Event) {}
    /// `PRESET_DIM_2`
    fn preset_dim_2(&self, _event: &X10Event) {}
    /// `EXTENDED_DATA_TRANSFER`
    fn extended_data_transfer(&self, _event: &X10Event) {}
    /// `STATUS_ON`
    fn status_on(&self, _event: &X10Event) {}
    /// `STATUS_OFF`
    fn status_off(&self, _event: &X10Event) {}
    /// `STATUS_REQUEST`
    fn status_request(&self, _event: &X10Event) {}
}

/// Receives outbound queue notifications
pub trait TransmitterListener: Send + Sync {
    /// An event was queued
    fn queue_updated(&self, _event: &TransmitterEvent) {}
    /// The queue drained
    fn queue_emptied(&self, _event: &TransmitterEvent) {}
    /// An event could not be delivered
    fn event_undelivered(&self, _event: &TransmitterEvent) {}
    /// An event reached the bridge
    fn event_delivered(&self, _event: &TransmitterEvent) {}
}

/// Invoke the callback on `listener` that matches `event`
pub fn route_event(listener: &dyn X10Listener, event: &X10Event) {
    let function = match event.other_code() {
        OtherCode::Unit(_) => return listener.address(event),
        OtherCode::Function(f) => f,
    };
    match function {
        FunctionCode::AllUnitsOff => listener.all_units_off(event),
        FunctionCode::AllLightsOn => listener.all_lights_on(event),
        FunctionCode::On => listener.on(event),
        FunctionCode::Off => listener.off(event),
        FunctionCode::Dim => listener.dim(event),
        FunctionCode::Brighten => listener.brighten(event),
        FunctionCode::AllLightsOff => listener.all_lights_off(event),
        FunctionCode::ExtendedCode => listener.extended_code(event),
        FunctionCode::HailRequest => listener.hail_request(event),
        FunctionCode::HailAcknowledge => listener.hail_acknowledge(event),
        FunctionCode::PresetDim1 => listener.preset_dim_1(event),
        FunctionCode::PresetDim2 => listener.preset_dim_2(event),
        FunctionCode::ExtendedDataTransfer => listener.extended_data_transfer(event),
        FunctionCode::StatusOn => listener.status_on(event),
        FunctionCode::StatusOff => listener.status_off(event),
        FunctionCode::StatusRequest => listener.status_request(event),
    }
}

/// Invoke the callback on `listener` that matches `event`
pub fn route_transmitter_event(listener: &dyn TransmitterListener, event: &TransmitterEvent) {
    match event {
        TransmitterEvent::QueueUpdated(_) => listener.queue_updated(event),
        TransmitterEvent::QueueEmptied(_) => listener.queue_emptied(event),
        TransmitterEvent::EventUndelivered(_) => listener.event_undelivered(event),
        TransmitterEvent::EventDelivered(_) => listener.event_delivered(event),
    }
}
