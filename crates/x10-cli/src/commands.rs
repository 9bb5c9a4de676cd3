//! Subcommand implementations, generic over the bridge transport

use anyhow::bail;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use x10_cm11a::{Cm11a, X10Transport};
use x10_core::{
    HouseCode, TransmitterEvent, TransmitterListener, UnitCode, X10Event, X10Listener, X10Monitor,
};

/// Forwards delivery outcomes to the waiting command
struct Outcomes(mpsc::UnboundedSender<TransmitterEvent>);

impl TransmitterListener for Outcomes {
    fn event_undelivered(&self, event: &TransmitterEvent) {
        let _ = self.0.send(*event);
    }
    fn event_delivered(&self, event: &TransmitterEvent) {
        let _ = self.0.send(*event);
    }
}

/// Transmit `events` in order and wait for every outcome
pub async fn send<T: X10Transport + 'static>(
    cm11a: &Cm11a<T>,
    events: Vec<X10Event>,
) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = cm11a.add_transmitter_listener(Arc::new(Outcomes(tx)));

    for event in &events {
        cm11a.transmit(*event)?;
    }

    let mut failed = 0;
    for _ in 0..events.len() {
        match rx.recv().await {
            Some(TransmitterEvent::EventDelivered(e)) => info!("Delivered {}", e),
            Some(TransmitterEvent::EventUndelivered(e)) => {
                warn!("Failed to deliver {}", e);
                failed += 1;
            }
            Some(_) => {}
            None => break,
        }
    }
    cm11a.remove_transmitter_listener(id);

    if failed > 0 {
        bail!("{} of {} event(s) undelivered", failed, events.len());
    }
    Ok(())
}

/// Set the clock, then apply whichever resets were asked for
pub async fn clock<T: X10Transport + 'static>(
    cm11a: &Cm11a<T>,
    time: Option<NaiveDateTime>,
    house: Option<HouseCode>,
    reset_battery: bool,
    reset_monitor: bool,
    purge_macros: bool,
) -> anyhow::Result<()> {
    if let Some(house) = house {
        cm11a.set_monitored_house_code(house).await?;
        info!("Monitoring house {}", house);
    }

    let time = time.unwrap_or_else(|| cm11a.internal_clock());
    cm11a.set_internal_clock(time).await?;
    info!("Clock set to {}", time);

    if reset_battery {
        cm11a.reset_internal_battery_timer().await?;
        info!("Battery timer reset");
    }
    if reset_monitor && house.is_none() {
        cm11a.reset_internal_monitoring_info().await?;
        info!("Monitoring data cleared");
    }
    if purge_macros {
        cm11a.reset_internal_macro_timers().await?;
        info!("Timers and macros purged");
    }
    Ok(())
}

#[derive(Serialize)]
struct Line<'a> {
    received: String,
    #[serde(flatten)]
    event: &'a X10Event,
}

/// Writes every received event to stdout
struct Printer;

impl Printer {
    fn print(&self, event: &X10Event) {
        let line = Line {
            received: chrono::Local::now().to_rfc3339(),
            event,
        };
        match serde_json::to_string(&line) {
            Ok(json) => println!("{}", json),
            Err(e) => warn!("Cannot serialize {}: {}", event, e),
        }
    }
}

macro_rules! print_all {
    ($($callback:ident),* $(,)?) => {
        impl X10Listener for Printer {
            $(fn $callback(&self, event: &X10Event) {
                self.print(event);
            })*
        }
    };
}

print_all!(
    address,
    all_units_off,
    all_lights_on,
    all_lights_off,
    on,
    off,
    dim,
    brighten,
    extended_code,
    hail_request,
    hail_acknowledge,
    preset_dim_1,
    preset_dim_2,
    extended_data_transfer,
    status_on,
    status_off,
    status_request,
);

/// Print received events until `limit` elapses or Ctrl-C, then the units left on
pub async fn monitor<T: X10Transport + 'static>(
    cm11a: &Cm11a<T>,
    limit: Option<Duration>,
) -> anyhow::Result<()> {
    let state = Arc::new(X10Monitor::new());
    cm11a.add_listener(Arc::new(Printer));
    cm11a.add_listener(state.clone());
    info!("Listening for power-line traffic");

    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => tokio::signal::ctrl_c().await?,
    }

    for house in HouseCode::ALL {
        for unit in UnitCode::ALL {
            if state.is_on(house, unit) {
                info!(
                    "{}{} is on at {:.0}%",
                    house,
                    unit,
                    state.brightness_level(house, unit) * 100.0
                );
            }
        }
    }
    Ok(())
}
