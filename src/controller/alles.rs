//! The entry point scripts use to drive a set of synths.
//!
//! ```no_run
//! use alles_rust::common::multicast_sock::SessionSettings;
//! use alles_rust::controller::alles::Alles;
//! use alles_rust::message::command_message::{Command, Waveform};
//!
//! let mut synths = Alles::open(SessionSettings::default())?;
//! let clients = synths.sync(10, 100);
//! println!("{} synths answered", clients.len());
//! synths.note_on(Command::for_voice(0).wave(Waveform::Fm).note(50).patch(15), 0.8);
//! synths.close()?;
//! # Ok::<(), alles_rust::common::box_error::BoxError>(())
//! ```
use std::{
    collections::BTreeMap,
    sync::{atomic::AtomicBool, Arc},
};

use crate::{
    common::{
        alles_time::{AllesClock, Clock},
        box_error::BoxError,
        multicast_sock::{MulticastSession, SessionSettings, Transport},
    },
    controller::{
        client_record::ClientRecord,
        sender::CommandSender,
        sync_engine::{SyncEngine, SyncOptions, SyncReport},
    },
    message::command_message::{ClientTarget, Command, ResetTarget},
};

/// A transport, a clock and the settings they were opened with
pub struct Alles<T: Transport = MulticastSession, C: Clock = AllesClock> {
    transport: T,
    clock: C,
    settings: SessionSettings,
}

impl Alles<MulticastSession, AllesClock> {
    /// join the multicast group.  Fails if the socket can't be set up.
    pub fn open(settings: SessionSettings) -> Result<Self, BoxError> {
        let session = MulticastSession::open(&settings)?;
        Ok(Alles::with_transport(session, AllesClock, settings))
    }

    /// leave the group and release the socket
    pub fn close(self) -> Result<(), BoxError> {
        self.transport.close()
    }
}

impl<T: Transport, C: Clock> Alles<T, C> {
    pub fn with_transport(transport: T, clock: C, settings: SessionSettings) -> Self {
        Alles {
            transport,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn transport(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn send(&mut self, cmd: &Command) {
        CommandSender::new(&mut self.transport, &self.clock).send(cmd);
    }

    pub fn send_with_retries(&mut self, cmd: &Command, retries: u32) {
        CommandSender::new(&mut self.transport, &self.clock).send_with_retries(cmd, retries);
    }

    /// Sync with every synth on the group and return what was heard, keyed by client id
    pub fn sync(&mut self, count: usize, delay_ms: i64) -> BTreeMap<i64, ClientRecord> {
        let options = SyncOptions::new(count, delay_ms).latency(self.settings.latency_ms);
        self.sync_with(options, None).clients
    }

    /// Sync with full control over the run, optionally cancellable
    pub fn sync_with(&mut self, options: SyncOptions, cancel: Option<Arc<AtomicBool>>) -> SyncReport {
        let mut engine = SyncEngine::new(&mut self.transport, &self.clock, options);
        if let Some(flag) = cancel {
            engine = engine.with_cancel(flag);
        }
        engine.run()
    }

    /// reset one voice or all of them (sent on voice 0, as other tooling does)
    pub fn reset(&mut self, target: ResetTarget) {
        let target = match target {
            // anything at or past the voice count is a full reset on the synth
            ResetTarget::Voice(v) if v >= self.settings.voices => ResetTarget::All,
            other => other,
        };
        self.send(&Command::for_voice(0).reset(target));
    }

    /// set master volume, right away
    pub fn volume(&mut self, volume: f64, client: Option<ClientTarget>) {
        let mut cmd = Command::for_voice(0).volume(volume).immediate();
        cmd.client = client;
        self.send(&cmd);
    }

    /// set the filter center frequency and resonance, right away
    pub fn filter(&mut self, center: f64, q: f64, client: Option<ClientTarget>) {
        let mut cmd = Command::for_voice(0)
            .filter_freq(center)
            .resonance(q)
            .immediate();
        cmd.client = client;
        self.send(&cmd);
    }

    /// play `cmd` with the given velocity
    pub fn note_on(&mut self, cmd: Command, velocity: f64) {
        self.send(&cmd.velocity(velocity));
    }

    /// a note off is just velocity zero
    pub fn note_off(&mut self, cmd: Command) {
        self.send(&cmd.velocity(0.0));
    }
}

#[cfg(test)]
mod test_alles {
    use super::*;
    use crate::common::{alles_time::MockClock, multicast_sock::MockTransport};
    use std::sync::{
        atomic::{AtomicI64, Ordering},
        Mutex,
    };

    fn capture(transport: &mut MockTransport) -> Arc<Mutex<Vec<String>>> {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = sent.clone();
        transport.expect_send().returning(move |data| {
            sink.lock()
                .unwrap()
                .push(String::from_utf8(data.to_vec()).unwrap());
            Ok(data.len())
        });
        sent
    }

    fn stepping_clock(step: i64) -> MockClock {
        let now = Arc::new(AtomicI64::new(0));
        let mut clock = MockClock::new();
        clock
            .expect_now_millis()
            .returning(move || now.fetch_add(step, Ordering::SeqCst) + step);
        clock
    }

    #[test]
    fn reset_all_twice_differs_only_in_time() {
        let mut transport = MockTransport::new();
        let sent = capture(&mut transport);
        let mut alles = Alles::with_transport(transport, stepping_clock(7), SessionSettings::default());
        alles.reset(ResetTarget::All);
        alles.reset(ResetTarget::All);
        let sent = sent.lock().unwrap();
        assert_eq!(*sent, vec!["t7v0S100".to_string(), "t14v0S100".to_string()]);
    }

    #[test]
    fn reset_past_voice_count_is_reset_all() {
        let mut transport = MockTransport::new();
        let sent = capture(&mut transport);
        let mut alles = Alles::with_transport(transport, stepping_clock(1), SessionSettings::default());
        alles.reset(ResetTarget::Voice(3));
        alles.reset(ResetTarget::Voice(12));
        let sent = sent.lock().unwrap();
        assert_eq!(*sent, vec!["t1v0S3".to_string(), "t2v0S100".to_string()]);
    }

    #[test]
    fn volume_and_filter_are_immediate() {
        let mut transport = MockTransport::new();
        let sent = capture(&mut transport);
        let mut alles = Alles::with_transport(transport, stepping_clock(1), SessionSettings::default());
        alles.volume(2.0, None);
        alles.filter(1000.0, 2.0, Some(ClientTarget::One(3)));
        let sent = sent.lock().unwrap();
        assert_eq!(
            *sent,
            vec![
                "t-1v0V2.000000".to_string(),
                "t-1v0c3R2.000000F1000.000000".to_string()
            ]
        );
    }

    #[test]
    fn note_on_and_off() {
        let mut transport = MockTransport::new();
        let sent = capture(&mut transport);
        let mut alles = Alles::with_transport(transport, stepping_clock(10), SessionSettings::default());
        alles.note_on(Command::for_voice(2).note(62), 0.5);
        alles.note_off(Command::for_voice(2));
        let sent = sent.lock().unwrap();
        assert_eq!(
            *sent,
            vec!["t10v2n62l0.500000".to_string(), "t20v2l0.000000".to_string()]
        );
    }

    #[test]
    fn retries_repeat() {
        let mut transport = MockTransport::new();
        let sent = capture(&mut transport);
        let mut alles = Alles::with_transport(transport, stepping_clock(10), SessionSettings::default());
        alles.send_with_retries(&Command::for_voice(1), 3);
        assert_eq!(sent.lock().unwrap().len(), 3);
        assert!(sent.lock().unwrap().iter().all(|m| m == "t10v1"));
    }
}
