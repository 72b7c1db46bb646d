//! Time sync / fleet health check.
//!
//! A run sends a numbered series of beacons to the group, `delay_ms` apart,
//! while polling for replies on the same socket.  Every synth answers each
//! beacon with its id, address and battery byte.  Once the requested
//! beacons are out the engine keeps sending (and listening) for a drain
//! period long enough for slow answers to arrive, then works out per synth
//! reliability and average round trip time.
//!
//! Everything happens on the calling thread: send, poll, repeat.  The
//! receive never blocks so it can't hold up the beacon schedule.
use log::{debug, info, trace, warn};
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::sleep,
    time::Duration,
};

use crate::{
    common::{
        alles_time::Clock,
        milli_timer::MilliTimer,
        multicast_sock::{Transport, ALLES_LATENCY_MS},
    },
    controller::client_record::ClientRecord,
    message::sync_message::{DecodeError, SyncBeacon, SyncResponse},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Armed,
    Running,
    Draining,
    Done,
}

/// Parameters for one sync run
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    /// beacons that count toward reliability
    pub count: usize,
    /// spacing between beacons (ms)
    pub delay_ms: i64,
    /// worst case answer time, sizes the drain period (ms)
    pub latency_ms: i64,
    /// index of the first beacon.  Runs that share a group can use
    /// disjoint ranges so answers left over from an earlier run are dropped
    pub first_index: i64,
    /// pause between polls
    pub poll_interval: Duration,
}

/// the synths read the beacon index into a signed byte
pub const MAX_SYNC_INDEX: i64 = i8::MAX as i64;

impl SyncOptions {
    pub fn new(count: usize, delay_ms: i64) -> SyncOptions {
        SyncOptions {
            count,
            delay_ms,
            latency_ms: ALLES_LATENCY_MS,
            first_index: 0,
            poll_interval: Duration::new(0, 1_000),
        }
    }
    pub fn latency(mut self, latency_ms: i64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
    pub fn first_index(mut self, first_index: i64) -> Self {
        self.first_index = first_index;
        self
    }
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
    /// extra beacons sent after `count` so late answers still get heard
    pub fn drain_beacons(&self) -> usize {
        let delay = self.delay_ms.max(1);
        let latency = self.latency_ms.max(0);
        1 + ((latency + delay - 1) / delay) as usize
    }
    /// the run ends once more than this many beacons have gone out
    pub fn beacon_limit(&self) -> usize {
        self.count.saturating_add(self.drain_beacons())
    }
    /// Pull `first_index` back so every beacon index of the run fits in a
    /// signed byte.  Indices past that wrap negative on the synth and are
    /// never answered.
    pub fn clamp_first_index(mut self) -> Self {
        let last_offset = self.beacon_limit().min(MAX_SYNC_INDEX as usize) as i64;
        let highest_first = MAX_SYNC_INDEX - last_offset;
        let clamped = self.first_index.clamp(0, highest_first);
        if clamped != self.first_index {
            warn!(
                "first index {} moved to {} so beacon indices stay within 0..={}",
                self.first_index, clamped, MAX_SYNC_INDEX
            );
            self.first_index = clamped;
        }
        if self.beacon_limit() as i64 > MAX_SYNC_INDEX {
            warn!(
                "{} beacons per run, indices past {} will not be answered",
                self.beacon_limit() + 1,
                MAX_SYNC_INDEX
            );
        }
        self
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions::new(10, 100)
    }
}

/// Result of a sync run.  Clients are keyed by the id they reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub clients: BTreeMap<i64, ClientRecord>,
    pub beacons_sent: usize,
    /// replies that started with '_' but could not be decoded
    pub malformed: usize,
    /// replies to beacons that are not part of this run
    pub stale: usize,
    /// unsolicited pings
    pub pings: usize,
    /// other traffic on the group (commands from other controllers etc)
    pub ignored: usize,
    pub cancelled: bool,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ clients: {}, sent: {}, malformed: {}, stale: {}, pings: {}, ignored: {}, cancelled: {} }}",
            self.clients.len(),
            self.beacons_sent,
            self.malformed,
            self.stale,
            self.pings,
            self.ignored,
            self.cancelled
        )
    }
}

/// what happened to one decoded reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    Counted,
    Ping,
    Stale,
}

/// Book keeping for a single run: when each beacon went out and what came back
#[derive(Debug, Default)]
pub struct RunTable {
    first_index: i64,
    sent_at: Vec<i64>,
    client_by_ip: HashMap<u32, i64>,
    battery_by_ip: HashMap<u32, u8>,
    rtt_by_ip: HashMap<u32, HashMap<i64, i64>>,
    // order in which each ip was first counted
    first_seen: HashMap<u32, u64>,
    replies: u64,
}

impl RunTable {
    pub fn new(first_index: i64) -> RunTable {
        RunTable {
            first_index,
            ..Default::default()
        }
    }

    /// note a beacon going out, returns the beacon to put on the wire
    pub fn add_beacon(&mut self, now: i64) -> SyncBeacon {
        let beacon = SyncBeacon {
            index: self.first_index + self.sent_at.len() as i64,
            sent_at: now,
        };
        self.sent_at.push(now);
        beacon
    }

    pub fn beacons_sent(&self) -> usize {
        self.sent_at.len()
    }

    /// Account for a reply received at `now`.
    ///
    /// Only answers to a beacon of this run that has gone out are counted.
    /// A second answer to the same beacon from the same address replaces
    /// the first.
    pub fn record(&mut self, resp: &SyncResponse, now: i64) -> ReplyOutcome {
        if resp.is_ping() {
            return ReplyOutcome::Ping;
        }
        let offset = resp.sync_index - self.first_index;
        if offset < 0 || offset >= self.sent_at.len() as i64 {
            return ReplyOutcome::Stale;
        }
        let rtt = now - self.sent_at[offset as usize];
        self.client_by_ip.insert(resp.ipv4, resp.client_id);
        self.battery_by_ip.insert(resp.ipv4, resp.battery);
        self.rtt_by_ip
            .entry(resp.ipv4)
            .or_default()
            .insert(resp.sync_index, rtt);
        self.replies += 1;
        self.first_seen.entry(resp.ipv4).or_insert(self.replies);
        ReplyOutcome::Counted
    }

    /// Per client summary over the first `count` beacons.
    ///
    /// Addresses are visited in the order they were first heard, so if two
    /// of them claim the same client id the one heard from later wins.
    pub fn summarize(&self, count: usize) -> BTreeMap<i64, ClientRecord> {
        let mut ips: Vec<(&u32, &u64)> = self.first_seen.iter().collect();
        ips.sort_by_key(|(_, seen)| **seen);
        let mut clients = BTreeMap::new();
        for (ip, _) in ips {
            let (Some(client_id), Some(rtts)) = (self.client_by_ip.get(ip), self.rtt_by_ip.get(ip)) else {
                continue;
            };
            let battery = self.battery_by_ip.get(ip).copied().unwrap_or(0);
            let rec = ClientRecord::summarize(*client_id, *ip, rtts, self.first_index, count, battery);
            if let Some(old) = clients.insert(*client_id, rec) {
                warn!(
                    "client id {} reported by both {} and {}, keeping {}",
                    client_id, old.ipv4, ip, ip
                );
            }
        }
        clients
    }
}

/// Runs sync passes over a borrowed transport
pub struct SyncEngine<'a, T: Transport, C: Clock> {
    transport: &'a mut T,
    clock: &'a C,
    options: SyncOptions,
    state: SyncState,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a, T: Transport, C: Clock> SyncEngine<'a, T, C> {
    pub fn new(transport: &'a mut T, clock: &'a C, options: SyncOptions) -> Self {
        SyncEngine {
            transport,
            clock,
            options: options.clamp_first_index(),
            state: SyncState::Armed,
            cancel: None,
        }
    }

    /// Stop the run early when `flag` goes true.  Checked once per poll.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    fn cancelled(&self) -> bool {
        match &self.cancel {
            Some(flag) => flag.load(Ordering::Relaxed),
            None => false,
        }
    }

    /// Do one full run.  Always finishes with a report, possibly missing some clients.
    pub fn run(&mut self) -> SyncReport {
        let mut report = SyncReport::default();
        let mut table = RunTable::new(self.options.first_index);
        let limit = self.options.beacon_limit();
        let start = self.clock.now_millis();
        let mut beacon_timer = MilliTimer::build(start, self.options.delay_ms);
        self.state = SyncState::Running;
        info!(
            "sync run: {} beacons every {}ms, {} more to drain",
            self.options.count,
            self.options.delay_ms,
            limit - self.options.count
        );

        loop {
            if self.cancelled() {
                info!("sync run cancelled after {} beacons", table.beacons_sent());
                report.cancelled = true;
                break;
            }
            let now = self.clock.now_millis();
            if beacon_timer.expired(now) {
                let beacon = table.add_beacon(self.clock.now_millis());
                trace!("beacon {}", beacon.encode());
                if let Err(e) = self.transport.send(beacon.encode().as_bytes()) {
                    warn!("beacon {} not sent: {}", beacon.index, e);
                }
                beacon_timer.reset(now);
                if table.beacons_sent() >= self.options.count {
                    self.state = SyncState::Draining;
                }
            }

            if let Some(dgram) = self.transport.try_receive() {
                match SyncResponse::decode(&dgram.data) {
                    Ok(resp) => match table.record(&resp, self.clock.now_millis()) {
                        ReplyOutcome::Counted => {
                            trace!("reply from {}: {:?}", dgram.source, resp)
                        }
                        ReplyOutcome::Ping => {
                            debug!("ping from client {} ({})", resp.client_id, dgram.source);
                            report.pings += 1;
                        }
                        ReplyOutcome::Stale => {
                            debug!("stale reply for beacon {} from {}", resp.sync_index, dgram.source);
                            report.stale += 1;
                        }
                    },
                    Err(DecodeError::MissingMarker) => {
                        report.ignored += 1;
                    }
                    Err(e) => {
                        warn!("bad reply from {}: {}", dgram.source, e);
                        report.malformed += 1;
                    }
                }
            }

            if table.beacons_sent() > limit {
                break;
            }
            if !self.options.poll_interval.is_zero() {
                sleep(self.options.poll_interval);
            }
        }

        self.state = SyncState::Done;
        report.beacons_sent = table.beacons_sent();
        report.clients = table.summarize(self.options.count);
        info!("sync done: {}", report);
        report
    }
}
