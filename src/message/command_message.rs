use num::ToPrimitive;
use simple_error::bail;
use std::{fmt, ops::BitOr, str::FromStr};

use crate::common::box_error::BoxError;

/// Oscillator type for a voice (the `w` field)
#[derive(FromPrimitive, ToPrimitive, PartialEq, Eq, Debug, Clone, Copy)]
pub enum Waveform {
    Sine = 0,
    Pulse,
    Saw,
    Triangle,
    Noise,
    Fm,
    Ks,
    Off,
}

/// Bitmask of parameters an envelope or LFO modulates (the `T` and `g` fields)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target(pub u32);

impl Target {
    pub const AMP: Target = Target(1);
    pub const DUTY: Target = Target(2);
    pub const FREQ: Target = Target(4);
    pub const FILTER_FREQ: Target = Target(8);
    pub const RESONANCE: Target = Target(16);

    pub fn contains(&self, other: Target) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Target {
    type Output = Target;
    fn bitor(self, rhs: Target) -> Target {
        Target(self.0 | rhs.0)
    }
}

/// ADSR envelope.  Attack, decay and release are in ms, sustain is a level.
///
/// Goes on the wire as `A<attack>,<decay>,<sustain>,<release>`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub attack_ms: u32,
    pub decay_ms: u32,
    pub sustain: f64,
    pub release_ms: u32,
}

impl Envelope {
    pub fn new(attack_ms: u32, decay_ms: u32, sustain: f64, release_ms: u32) -> Envelope {
        Envelope {
            attack_ms,
            decay_ms,
            sustain,
            release_ms,
        }
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.attack_ms, self.decay_ms, self.sustain, self.release_ms
        )
    }
}

impl FromStr for Envelope {
    type Err = BoxError;

    /// parse the "10,250,0.7,250" form scripts use
    fn from_str(s: &str) -> Result<Envelope, BoxError> {
        let parts: Vec<&str> = s.split(',').map(|p| p.trim()).collect();
        if parts.len() != 4 {
            bail!("envelope needs 4 comma separated values, got '{}'", s);
        }
        Ok(Envelope {
            attack_ms: parts[0].parse()?,
            decay_ms: parts[1].parse()?,
            sustain: parts[2].parse()?,
            release_ms: parts[3].parse()?,
        })
    }
}

/// Which synths a command is for (the `c` field).  Leave it off to hit everyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientTarget {
    /// just the synth with this id
    One(u16),
    /// every synth whose id is a multiple of this (must be at least 1)
    Group(u16),
}

/// ids above this are group addresses
pub const GROUP_BASE: u32 = 255;

impl ClientTarget {
    pub fn wire_value(&self) -> u32 {
        match self {
            ClientTarget::One(id) => *id as u32,
            ClientTarget::Group(modulus) => GROUP_BASE + *modulus as u32,
        }
    }
}

/// value of the `S` field that resets every voice (anything >= the voice count does)
pub const RESET_ALL_VOICES: u32 = 100;

/// Voice reset (the `S` field)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetTarget {
    Voice(u32),
    All,
}

impl ResetTarget {
    pub fn wire_value(&self) -> u32 {
        match self {
            ResetTarget::Voice(v) => *v,
            ResetTarget::All => RESET_ALL_VOICES,
        }
    }
}

/// When a synth should act on a command (the `t` field)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    /// stamp with the controller clock when encoded (the usual case)
    Now,
    /// no timing control, the synth plays it as soon as it arrives
    Immediate,
    /// explicit time in ms since local midnight
    At(i64),
}

/// what `Timestamp::Immediate` looks like on the wire
pub const IMMEDIATE_TIMESTAMP: i64 = -1;

impl Timestamp {
    pub fn resolve(&self, now: i64) -> i64 {
        match self {
            Timestamp::Now => now,
            Timestamp::Immediate => IMMEDIATE_TIMESTAMP,
            Timestamp::At(t) => *t,
        }
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::Now
    }
}

/// A change to one voice on one or all synths.
///
/// Only fields that are set (and not negative) are sent.  A missing field
/// means "leave it alone", not zero.  No range checking is done here, e.g.
/// velocity is not clamped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    pub timestamp: Timestamp,
    pub voice: Option<u32>,
    pub wave: Option<Waveform>,
    pub duty: Option<f64>,
    pub feedback: Option<f64>,
    pub freq: Option<f64>,
    pub note: Option<u32>,
    pub patch: Option<u32>,
    pub phase: Option<f64>,
    pub client: Option<ClientTarget>,
    pub velocity: Option<f64>,
    pub volume: Option<f64>,
    pub resonance: Option<f64>,
    pub filter_freq: Option<f64>,
    pub envelope: Option<Envelope>,
    pub adsr_target: Option<Target>,
    pub lfo_target: Option<Target>,
    pub lfo_source: Option<u32>,
    pub reset: Option<ResetTarget>,
}

impl Command {
    pub fn new() -> Command {
        Command::default()
    }
    /// shorthand for a command aimed at one voice
    pub fn for_voice(voice: u32) -> Command {
        Command::new().voice(voice)
    }
    pub fn timestamp(mut self, t: Timestamp) -> Self {
        self.timestamp = t;
        self
    }
    pub fn immediate(self) -> Self {
        self.timestamp(Timestamp::Immediate)
    }
    pub fn voice(mut self, v: u32) -> Self {
        self.voice = Some(v);
        self
    }
    pub fn wave(mut self, w: Waveform) -> Self {
        self.wave = Some(w);
        self
    }
    pub fn duty(mut self, d: f64) -> Self {
        self.duty = Some(d);
        self
    }
    pub fn feedback(mut self, b: f64) -> Self {
        self.feedback = Some(b);
        self
    }
    pub fn freq(mut self, f: f64) -> Self {
        self.freq = Some(f);
        self
    }
    pub fn note(mut self, n: u32) -> Self {
        self.note = Some(n);
        self
    }
    pub fn patch(mut self, p: u32) -> Self {
        self.patch = Some(p);
        self
    }
    pub fn phase(mut self, p: f64) -> Self {
        self.phase = Some(p);
        self
    }
    pub fn client(mut self, c: ClientTarget) -> Self {
        self.client = Some(c);
        self
    }
    pub fn velocity(mut self, l: f64) -> Self {
        self.velocity = Some(l);
        self
    }
    pub fn volume(mut self, v: f64) -> Self {
        self.volume = Some(v);
        self
    }
    pub fn resonance(mut self, r: f64) -> Self {
        self.resonance = Some(r);
        self
    }
    pub fn filter_freq(mut self, f: f64) -> Self {
        self.filter_freq = Some(f);
        self
    }
    pub fn envelope(mut self, e: Envelope) -> Self {
        self.envelope = Some(e);
        self
    }
    pub fn adsr_target(mut self, t: Target) -> Self {
        self.adsr_target = Some(t);
        self
    }
    pub fn lfo_target(mut self, t: Target) -> Self {
        self.lfo_target = Some(t);
        self
    }
    pub fn lfo_source(mut self, v: u32) -> Self {
        self.lfo_source = Some(v);
        self
    }
    pub fn reset(mut self, r: ResetTarget) -> Self {
        self.reset = Some(r);
        self
    }

    /// Build the wire form using `now` for a `Timestamp::Now` stamp.
    ///
    /// The tag order is fixed, but the synths find fields by tag so it
    /// only matters for reading packet dumps.
    pub fn encode(&self, now: i64) -> String {
        let mut m = format!("t{}", self.timestamp.resolve(now));
        push_int(&mut m, 'v', self.voice);
        push_int(&mut m, 'w', self.wave.and_then(|w| w.to_u32()));
        push_float(&mut m, 'd', self.duty);
        push_float(&mut m, 'b', self.feedback);
        push_float(&mut m, 'f', self.freq);
        push_int(&mut m, 'n', self.note);
        push_int(&mut m, 'p', self.patch);
        push_float(&mut m, 'P', self.phase);
        push_int(&mut m, 'c', self.client.map(|c| c.wire_value()));
        push_float(&mut m, 'l', self.velocity);
        push_float(&mut m, 'V', self.volume);
        push_float(&mut m, 'R', self.resonance);
        push_float(&mut m, 'F', self.filter_freq);
        if let Some(env) = &self.envelope {
            m.push('A');
            m.push_str(&env.to_string());
        }
        push_int(&mut m, 'T', self.adsr_target.map(|t| t.0));
        push_int(&mut m, 'g', self.lfo_target.map(|t| t.0));
        push_int(&mut m, 'L', self.lfo_source);
        push_int(&mut m, 'S', self.reset.map(|r| r.wire_value()));
        m
    }
}

fn push_int(m: &mut String, tag: char, val: Option<u32>) {
    if let Some(v) = val {
        m.push(tag);
        m.push_str(&v.to_string());
    }
}

// negative floats count as "not set"
fn push_float(m: &mut String, tag: char, val: Option<f64>) {
    if let Some(v) = val {
        if v >= 0.0 {
            m.push(tag);
            m.push_str(&format!("{:.6}", v));
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // show the unresolved form, "t0" stands in for "now"
        write!(f, "{}", self.encode(0))
    }
}

#[cfg(test)]
mod test_command_message {
    use super::*;

    #[test]
    fn bare_command_is_just_a_timestamp() {
        assert_eq!(Command::new().encode(12345), "t12345");
    }
    #[test]
    fn immediate_uses_sentinel() {
        assert_eq!(Command::for_voice(0).immediate().encode(12345), "t-1v0");
    }
    #[test]
    fn explicit_time_ignores_now() {
        let cmd = Command::for_voice(1).timestamp(Timestamp::At(500));
        assert_eq!(cmd.encode(12345), "t500v1");
    }
    #[test]
    fn note_on_fields() {
        let cmd = Command::for_voice(2)
            .wave(Waveform::Fm)
            .note(50)
            .patch(15)
            .velocity(0.8);
        assert_eq!(cmd.encode(1000), "t1000v2w5n50p15l0.800000");
    }
    #[test]
    fn full_field_order() {
        let cmd = Command::for_voice(0)
            .wave(Waveform::Pulse)
            .duty(0.5)
            .feedback(0.25)
            .freq(440.0)
            .note(60)
            .patch(3)
            .phase(0.5)
            .client(ClientTarget::One(4))
            .velocity(1.0)
            .volume(2.0)
            .resonance(0.7)
            .filter_freq(1000.0)
            .envelope(Envelope::new(10, 250, 0.7, 250))
            .adsr_target(Target::AMP | Target::FILTER_FREQ)
            .lfo_target(Target::FREQ)
            .lfo_source(1)
            .reset(ResetTarget::Voice(0));
        assert_eq!(
            cmd.encode(7),
            "t7v0w1d0.500000b0.250000f440.000000n60p3P0.500000c4l1.000000V2.000000\
             R0.700000F1000.000000A10,250,0.7,250T9g4L1S0"
        );
    }
    #[test]
    fn negative_floats_are_omitted() {
        let cmd = Command::for_voice(0).freq(-1.0).velocity(-0.5).duty(0.0);
        assert_eq!(cmd.encode(1), "t1v0d0.000000");
    }
    #[test]
    fn reset_all_and_groups() {
        assert_eq!(Command::new().reset(ResetTarget::All).encode(9), "t9S100");
        let cmd = Command::for_voice(0).client(ClientTarget::Group(2));
        assert_eq!(cmd.encode(9), "t9v0c257");
    }
    #[test]
    fn velocity_is_not_clamped() {
        assert_eq!(Command::new().velocity(1.5).encode(0), "t0l1.500000");
    }
    #[test]
    fn target_masks_combine() {
        let t = Target::AMP | Target::RESONANCE;
        assert_eq!(t.0, 17);
        assert!(t.contains(Target::AMP));
        assert!(!t.contains(Target::FREQ));
    }
    #[test]
    fn envelope_parses() {
        let env: Envelope = "10, 250,0.7,250".parse().unwrap();
        assert_eq!(env, Envelope::new(10, 250, 0.7, 250));
        assert_eq!(env.to_string(), "10,250,0.7,250");
        assert!("10,250,0.7".parse::<Envelope>().is_err());
        assert!("a,b,c,d".parse::<Envelope>().is_err());
    }
    #[test]
    fn waveform_values() {
        assert_eq!(Waveform::Sine.to_u32(), Some(0));
        assert_eq!(Waveform::Off.to_u32(), Some(7));
        let ks: Option<Waveform> = num::FromPrimitive::from_u32(6);
        assert_eq!(ks, Some(Waveform::Ks));
    }
}
