//! CM11A handshake and recovery exchanges
//!
//! Every function here expects the caller to hold the transport for the
//! whole call (see [`crate::transport::SharedTransport::lock`]). Recovery
//! exchanges triggered mid-delivery run on the same borrowed transport, so
//! no second lock is ever taken.
//!
//! A delivery attempt goes:
//!
//! ```text
//! host: frame            bridge: checksum
//! host: ACKNOWLEDGE      bridge: READY
//! ```
//!
//! The bridge may answer either read with `POWER_FAILURE` (it wants its
//! clock set) or `EVENT_RECEIVED` (it has buffered traffic to upload). Both
//! are serviced and the attempt is retried. Any other disagreement is simply
//! retried until the attempt budget runs out.

use chrono::{Local, NaiveDateTime};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info, trace, warn};
use x10_core::{HouseCode, X10Event};

use crate::codec::{
    checksum, encode_clock_frame, encode_frame, ClockFlags, UploadDecoder, ACKNOWLEDGE,
    EVENT_RECEIVED, POWER_FAILURE, READY, REQUEST_BUFFER,
};
use crate::dispatch::Listeners;
use crate::error::{Cm11aError, Result};
use crate::transport::X10Transport;

/// Parameters shared by every exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeSettings {
    /// Attempts before an exchange is abandoned
    pub maximum_attempts: u32,
    /// House code written into recovery clock frames
    pub monitored_house_code: HouseCode,
}

/// Exchange settings that may change while the driver runs
#[derive(Debug)]
pub struct SettingsCell {
    maximum_attempts: AtomicU32,
    monitored_house_code: RwLock<HouseCode>,
}

impl SettingsCell {
    /// Start from `settings`
    pub fn new(settings: ExchangeSettings) -> Self {
        Self {
            maximum_attempts: AtomicU32::new(settings.maximum_attempts),
            monitored_house_code: RwLock::new(settings.monitored_house_code),
        }
    }

    /// Current values
    pub fn snapshot(&self) -> ExchangeSettings {
        ExchangeSettings {
            maximum_attempts: self.maximum_attempts.load(Ordering::Acquire),
            monitored_house_code: *self.monitored_house_code.read(),
        }
    }

    /// Change the attempt budget for exchanges started from now on
    pub fn set_maximum_attempts(&self, attempts: u32) {
        self.maximum_attempts.store(attempts, Ordering::Release);
    }

    /// Change the monitored house code
    pub fn set_monitored_house_code(&self, house: HouseCode) {
        *self.monitored_house_code.write() = house;
    }
}

/// Outcome of a single attempt
enum Attempt {
    Ready,
    Retry,
}

fn is_fatal(err: &Cm11aError) -> bool {
    matches!(err, Cm11aError::Closed | Cm11aError::Disconnected)
}

async fn send<T: X10Transport + ?Sized>(transport: &mut T, bytes: &[u8]) -> Result<()> {
    transport.write_all(bytes).await?;
    transport.flush().await
}

/// Deliver one event, retrying until the bridge answers READY
///
/// Returns the number of attempts used. Fails with
/// [`Cm11aError::DeliveryExhausted`] once `maximum_attempts` attempts have
/// failed, or immediately if the transport is closed.
pub async fn deliver<T: X10Transport + ?Sized>(
    transport: &mut T,
    event: &X10Event,
    settings: ExchangeSettings,
    listeners: &Listeners,
) -> Result<u32> {
    let frame = encode_frame(event);
    let expected = checksum(&frame);

    for attempt in 1..=settings.maximum_attempts {
        trace!(%event, attempt, frame = ?&frame[..], "Delivery attempt");
        match deliver_attempt(transport, &frame, expected, settings, listeners).await {
            Ok(Attempt::Ready) => {
                info!(%event, attempts = attempt, "Event delivered");
                return Ok(attempt);
            }
            Ok(Attempt::Retry) => {}
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => {
                debug!(
                    %event,
                    attempt,
                    error = %e,
                    code = e.error_code(),
                    "Delivery attempt failed"
                );
            }
        }
    }

    warn!(%event, attempts = settings.maximum_attempts, "Giving up on event");
    Err(Cm11aError::DeliveryExhausted {
        attempts: settings.maximum_attempts,
    })
}

async fn deliver_attempt<T: X10Transport + ?Sized>(
    transport: &mut T,
    frame: &[u8],
    expected: u8,
    settings: ExchangeSettings,
    listeners: &Listeners,
) -> Result<Attempt> {
    send(transport, frame).await?;
    let got = transport.read_byte().await?;

    if got == expected {
        send(transport, &[ACKNOWLEDGE]).await?;
        match transport.read_byte().await? {
            READY => return Ok(Attempt::Ready),
            POWER_FAILURE => recover_power_failure(transport, settings, listeners).await?,
            EVENT_RECEIVED => {
                fetch_upload(transport, listeners).await?;
            }
            reply => debug!(reply, "Unexpected reply to acknowledge"),
        }
    } else {
        match got {
            POWER_FAILURE => recover_power_failure(transport, settings, listeners).await?,
            EVENT_RECEIVED => {
                fetch_upload(transport, listeners).await?;
            }
            _ => {
                let mismatch = Cm11aError::ChecksumMismatch { expected, got };
                debug!(error = %mismatch, "Bridge rejected frame");
            }
        }
    }
    Ok(Attempt::Retry)
}

/// Set the bridge clock, retrying until the bridge answers READY
///
/// Input is cleared before every attempt. A `POWER_FAILURE` reply is just
/// retried: this call is itself the power-failure recovery.
pub async fn set_clock<T: X10Transport + ?Sized>(
    transport: &mut T,
    time: &NaiveDateTime,
    house: HouseCode,
    flags: ClockFlags,
    settings: ExchangeSettings,
    listeners: &Listeners,
) -> Result<u32> {
    let frame = encode_clock_frame(time, house, flags);
    let expected = checksum(&frame);

    for attempt in 1..=settings.maximum_attempts {
        trace!(%time, attempt, frame = ?frame, "Clock attempt");
        match clock_attempt(transport, &frame, expected, listeners).await {
            Ok(Attempt::Ready) => {
                info!(%time, %house, attempts = attempt, "Bridge clock set");
                return Ok(attempt);
            }
            Ok(Attempt::Retry) => {}
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => {
                debug!(attempt, error = %e, code = e.error_code(), "Clock attempt failed");
            }
        }
    }

    warn!(%time, attempts = settings.maximum_attempts, "Giving up on clock update");
    Err(Cm11aError::DeliveryExhausted {
        attempts: settings.maximum_attempts,
    })
}

async fn clock_attempt<T: X10Transport + ?Sized>(
    transport: &mut T,
    frame: &[u8],
    expected: u8,
    listeners: &Listeners,
) -> Result<Attempt> {
    transport.clear_input();
    send(transport, frame).await?;
    let got = transport.read_byte().await?;

    if got == expected {
        send(transport, &[ACKNOWLEDGE]).await?;
        match transport.read_byte().await? {
            READY => return Ok(Attempt::Ready),
            POWER_FAILURE => debug!("Power failure reported during clock update"),
            EVENT_RECEIVED => {
                fetch_upload(transport, listeners).await?;
            }
            reply => debug!(reply, "Unexpected reply to acknowledge"),
        }
    } else if got == EVENT_RECEIVED {
        fetch_upload(transport, listeners).await?;
    } else {
        debug!(expected, got, "Bridge rejected clock frame");
    }
    Ok(Attempt::Retry)
}

/// Resynchronize a bridge that reported a power failure
///
/// Sets the clock to the host's local time with no flags.
pub async fn recover_power_failure<T: X10Transport + ?Sized>(
    transport: &mut T,
    settings: ExchangeSettings,
    listeners: &Listeners,
) -> Result<()> {
    info!(transport = transport.name(), "Recovering bridge from power failure");
    transport.clear_input();
    let now = Local::now().naive_local();
    set_clock(
        transport,
        &now,
        settings.monitored_house_code,
        ClockFlags::NONE,
        settings,
        listeners,
    )
    .await
    .map(|_| ())
}

/// Fetch and dispatch the bridge's buffered power-line traffic
///
/// Events are handed to `listeners` in buffer order. Returns how many were
/// dispatched. A buffer shorter than its mask, or one that ends inside a
/// payload, fails with [`Cm11aError::MalformedUpload`]; events decoded
/// before the fault are still dispatched.
pub async fn fetch_upload<T: X10Transport + ?Sized>(
    transport: &mut T,
    listeners: &Listeners,
) -> Result<usize> {
    transport.clear_input();
    send(transport, &[REQUEST_BUFFER]).await?;

    let size = transport.read_byte().await?;
    if size < 2 {
        transport.clear_input();
        warn!(size, "Discarding upload too short to hold a mask and data");
        return Err(Cm11aError::MalformedUpload(format!("size byte {}", size)));
    }

    let mask = transport.read_byte().await?;
    let mut data = vec![0u8; usize::from(size - 1)];
    transport.read_exact(&mut data).await?;
    debug!(size, mask = format_args!("{:#010b}", mask), data = ?data, "Upload received");

    let mut events = Vec::with_capacity(data.len());
    let mut failure = None;
    for decoded in UploadDecoder::new(mask, &data) {
        match decoded {
            Ok(event) => events.push(event),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    let count = events.len();
    for event in &events {
        debug!(%event, "Received event");
    }
    listeners.notify_events(events);

    match failure {
        Some(e) => {
            transport.clear_input();
            warn!(error = %e, dispatched = count, "Upload truncated");
            Err(e)
        }
        None => Ok(count),
    }
}

/// React to a byte the bridge sent without being asked
pub async fn handle_unsolicited<T: X10Transport + ?Sized>(
    transport: &mut T,
    byte: u8,
    settings: ExchangeSettings,
    listeners: &Listeners,
) -> Result<()> {
    match byte {
        POWER_FAILURE => {
            transport.clear_input();
            recover_power_failure(transport, settings, listeners).await
        }
        EVENT_RECEIVED => fetch_upload(transport, listeners).await.map(|_| ()),
        noise => {
            warn!(byte = noise, "Discarding unexpected byte from bridge");
            transport.clear_input();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CLOCK_FRAME_LEN, TIME_UPLOAD};
    use crate::test_utils::{healthy_bridge, ScriptedTransport};
    use chrono::NaiveDate;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use x10_core::{UnitCode, X10Listener};

    fn settings(maximum_attempts: u32) -> ExchangeSettings {
        ExchangeSettings {
            maximum_attempts,
            monitored_house_code: HouseCode::A,
        }
    }

    fn a1() -> X10Event {
        X10Event::address(HouseCode::A, UnitCode::Unit1)
    }

    /// One buffered event: address A1
    const A1_UPLOAD: [u8; 3] = [2, 0b0, 0x66];

    struct Addresses(mpsc::UnboundedSender<X10Event>);

    impl X10Listener for Addresses {
        fn address(&self, event: &X10Event) {
            let _ = self.0.send(*event);
        }
    }

    fn is_clock_frame(write: &[u8]) -> bool {
        write.len() == CLOCK_FRAME_LEN && write[0] == TIME_UPLOAD
    }

    #[tokio::test]
    async fn test_deliver_first_try() {
        let listeners = Listeners::new();
        let (mut transport, bridge) = ScriptedTransport::new(healthy_bridge());
        let attempts = deliver(&mut transport, &a1(), settings(3), &listeners)
            .await
            .unwrap();
        assert_eq!(attempts, 1);
        assert_eq!(bridge.writes(), vec![vec![0x04, 0x66], vec![ACKNOWLEDGE]]);
    }

    #[tokio::test]
    async fn test_deliver_retries_bad_checksum() {
        let listeners = Listeners::new();
        let mut frames = 0;
        let (mut transport, bridge) = ScriptedTransport::new(Box::new(move |w: &[u8]| {
            match w {
                [ACKNOWLEDGE] => vec![READY],
                frame => {
                    frames += 1;
                    if frames == 1 {
                        vec![checksum(frame).wrapping_add(1)]
                    } else {
                        vec![checksum(frame)]
                    }
                }
            }
        }));
        let attempts = deliver(&mut transport, &a1(), settings(5), &listeners)
            .await
            .unwrap();
        assert_eq!(attempts, 2);
        assert_eq!(bridge.frames().len(), 2);
        assert_eq!(bridge.count_writes(&[ACKNOWLEDGE]), 1);
    }

    #[tokio::test]
    async fn test_deliver_exhausts_attempts() {
        let listeners = Listeners::new();
        let (mut transport, bridge) = ScriptedTransport::new(Box::new(|w: &[u8]| match w {
            [ACKNOWLEDGE] => vec![0x11],
            frame => vec![checksum(frame)],
        }));
        let err = deliver(&mut transport, &a1(), settings(4), &listeners)
            .await
            .unwrap_err();
        assert!(matches!(err, Cm11aError::DeliveryExhausted { attempts: 4 }));
        assert_eq!(bridge.frames().len(), 4);
    }

    #[tokio::test]
    async fn test_deliver_counts_timeouts() {
        let listeners = Listeners::new();
        let (transport, bridge) = ScriptedTransport::new(Box::new(|_: &[u8]| Vec::new()));
        let mut transport = transport.with_read_timeout(Duration::from_millis(5));
        let err = deliver(&mut transport, &a1(), settings(3), &listeners)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "DELIVERY_EXHAUSTED");
        assert_eq!(bridge.frames().len(), 3);
    }

    #[tokio::test]
    async fn test_deliver_stops_on_closed_transport() {
        let listeners = Listeners::new();
        let (mut transport, bridge) = ScriptedTransport::new(healthy_bridge());
        transport.close().await.unwrap();
        let err = deliver(&mut transport, &a1(), settings(20), &listeners)
            .await
            .unwrap_err();
        assert!(matches!(err, Cm11aError::Closed));
        assert!(bridge.writes().is_empty());
    }

    #[tokio::test]
    async fn test_deliver_fetches_upload_instead_of_checksum() {
        let listeners = Listeners::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        listeners.add_listener(Arc::new(Addresses(tx)));

        let mut frames = 0;
        let (mut transport, bridge) = ScriptedTransport::new(Box::new(move |w: &[u8]| {
            match w {
                [ACKNOWLEDGE] => vec![READY],
                [REQUEST_BUFFER] => A1_UPLOAD.to_vec(),
                frame => {
                    frames += 1;
                    if frames == 1 {
                        vec![EVENT_RECEIVED]
                    } else {
                        vec![checksum(frame)]
                    }
                }
            }
        }));
        let attempts = deliver(&mut transport, &a1(), settings(3), &listeners)
            .await
            .unwrap();

        assert_eq!(attempts, 2);
        assert_eq!(
            bridge.writes(),
            vec![
                vec![0x04, 0x66],
                vec![REQUEST_BUFFER],
                vec![0x04, 0x66],
                vec![ACKNOWLEDGE],
            ]
        );
        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(received, Some(a1()));
    }

    #[tokio::test]
    async fn test_deliver_sets_clock_on_power_failure_after_acknowledge() {
        let listeners = Listeners::new();
        let mut acks = 0;
        let (mut transport, bridge) = ScriptedTransport::new(Box::new(move |w: &[u8]| match w {
            [ACKNOWLEDGE] => {
                acks += 1;
                vec![if acks == 1 { POWER_FAILURE } else { READY }]
            }
            frame => vec![checksum(frame)],
        }));
        let attempts = deliver(&mut transport, &a1(), settings(3), &listeners)
            .await
            .unwrap();

        assert_eq!(attempts, 2);
        let writes = bridge.writes();
        assert_eq!(writes.len(), 6);
        assert_eq!(writes[0], vec![0x04, 0x66]);
        assert_eq!(writes[1], vec![ACKNOWLEDGE]);
        assert!(is_clock_frame(&writes[2]));
        assert_eq!(writes[2][6] >> 4, 0x6);
        assert_eq!(writes[3], vec![ACKNOWLEDGE]);
        assert_eq!(writes[4], vec![0x04, 0x66]);
        assert_eq!(writes[5], vec![ACKNOWLEDGE]);
    }

    #[tokio::test]
    async fn test_deliver_fetches_upload_after_acknowledge() {
        let listeners = Listeners::new();
        let mut acks = 0;
        let (mut transport, bridge) = ScriptedTransport::new(Box::new(move |w: &[u8]| match w {
            [ACKNOWLEDGE] => {
                acks += 1;
                vec![if acks == 1 { EVENT_RECEIVED } else { READY }]
            }
            [REQUEST_BUFFER] => A1_UPLOAD.to_vec(),
            frame => vec![checksum(frame)],
        }));
        let attempts = deliver(&mut transport, &a1(), settings(3), &listeners)
            .await
            .unwrap();

        assert_eq!(attempts, 2);
        assert_eq!(
            bridge.writes(),
            vec![
                vec![0x04, 0x66],
                vec![ACKNOWLEDGE],
                vec![REQUEST_BUFFER],
                vec![0x04, 0x66],
                vec![ACKNOWLEDGE],
            ]
        );
    }

    #[tokio::test]
    async fn test_set_clock_fetches_upload_instead_of_checksum() {
        let listeners = Listeners::new();
        let mut frames = 0;
        let (mut transport, bridge) = ScriptedTransport::new(Box::new(move |w: &[u8]| {
            match w {
                [ACKNOWLEDGE] => vec![READY],
                [REQUEST_BUFFER] => A1_UPLOAD.to_vec(),
                frame => {
                    frames += 1;
                    if frames == 1 {
                        vec![EVENT_RECEIVED]
                    } else {
                        vec![checksum(frame)]
                    }
                }
            }
        }));
        let now = Local::now().naive_local();
        let attempts = set_clock(
            &mut transport,
            &now,
            HouseCode::C,
            ClockFlags::NONE,
            settings(3),
            &listeners,
        )
        .await
        .unwrap();

        assert_eq!(attempts, 2);
        let writes = bridge.writes();
        assert_eq!(writes.len(), 4);
        assert!(is_clock_frame(&writes[0]));
        assert_eq!(writes[1], vec![REQUEST_BUFFER]);
        assert_eq!(writes[2], writes[0]);
        assert_eq!(writes[3], vec![ACKNOWLEDGE]);
    }

    #[tokio::test]
    async fn test_set_clock_writes_frame() {
        let listeners = Listeners::new();
        let (mut transport, bridge) = ScriptedTransport::new(healthy_bridge());
        let time = NaiveDate::from_ymd_opt(2024, 2, 13)
            .unwrap()
            .and_hms_opt(15, 42, 7)
            .unwrap();
        let attempts = set_clock(
            &mut transport,
            &time,
            HouseCode::A,
            ClockFlags::NONE,
            settings(3),
            &listeners,
        )
        .await
        .unwrap();
        assert_eq!(attempts, 1);
        let frames = bridge.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), CLOCK_FRAME_LEN);
        assert_eq!(frames[0][0], TIME_UPLOAD);
    }

    #[tokio::test]
    async fn test_set_clock_retries_power_failure_silently() {
        let listeners = Listeners::new();
        let mut acks = 0;
        let (mut transport, bridge) = ScriptedTransport::new(Box::new(move |w: &[u8]| match w {
            [ACKNOWLEDGE] => {
                acks += 1;
                vec![if acks == 1 { POWER_FAILURE } else { READY }]
            }
            frame => vec![checksum(frame)],
        }));
        let now = Local::now().naive_local();
        let attempts = set_clock(
            &mut transport,
            &now,
            HouseCode::B,
            ClockFlags::NONE,
            settings(5),
            &listeners,
        )
        .await
        .unwrap();
        assert_eq!(attempts, 2);
        assert_eq!(bridge.frames().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_upload_rejects_short_buffer() {
        let listeners = Listeners::new();
        let (mut transport, _bridge) = ScriptedTransport::new(Box::new(|w: &[u8]| match w {
            [REQUEST_BUFFER] => vec![1, 0xFF],
            _ => Vec::new(),
        }));
        let err = fetch_upload(&mut transport, &listeners).await.unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_UPLOAD");
        assert_eq!(transport.bytes_available(), 0);
    }

    #[tokio::test]
    async fn test_fetch_upload_counts_events() {
        let listeners = Listeners::new();
        let (mut transport, _bridge) = ScriptedTransport::new(Box::new(|w: &[u8]| match w {
            [REQUEST_BUFFER] => vec![3, 0b10, 0x66, 0x62],
            _ => Vec::new(),
        }));
        let count = fetch_upload(&mut transport, &listeners).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_noise_is_discarded() {
        let listeners = Listeners::new();
        let (mut transport, bridge) = ScriptedTransport::new(healthy_bridge());
        bridge.inject(&[0x12, 0x34]);
        handle_unsolicited(&mut transport, 0x77, settings(3), &listeners)
            .await
            .unwrap();
        assert_eq!(bridge.pending_input(), 0);
        assert!(bridge.writes().is_empty());
    }
}
