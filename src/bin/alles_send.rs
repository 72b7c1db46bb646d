use alles_rust::{
    common::{
        box_error::BoxError,
        config::{Config, SETTINGS_FILE},
        multicast_sock::SessionSettings,
    },
    controller::alles::Alles,
    message::command_message::{ClientTarget, Command, Envelope, ResetTarget, Target, Waveform},
};
use clap::Parser;
use log::info;
use simple_error::bail;

/// Send one command to the synths

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Settings file (json)
    #[arg(long, default_value = SETTINGS_FILE)]
    config: String,

    #[arg(short, long)]
    voice: Option<u32>,

    /// 0 sine, 1 pulse, 2 saw, 3 triangle, 4 noise, 5 fm, 6 ks, 7 off
    #[arg(short, long)]
    wave: Option<u32>,

    #[arg(short, long)]
    note: Option<u32>,

    #[arg(short, long)]
    patch: Option<u32>,

    #[arg(short = 'l', long)]
    vel: Option<f64>,

    #[arg(short, long)]
    freq: Option<f64>,

    #[arg(long)]
    duty: Option<f64>,

    #[arg(long)]
    feedback: Option<f64>,

    #[arg(long)]
    phase: Option<f64>,

    /// Only this synth
    #[arg(short, long)]
    client: Option<u16>,

    /// Only synths whose id is a multiple of this
    #[arg(long, conflicts_with = "client")]
    group: Option<u16>,

    #[arg(long)]
    volume: Option<f64>,

    #[arg(long)]
    filter_freq: Option<f64>,

    #[arg(long)]
    resonance: Option<f64>,

    /// attack,decay,sustain,release e.g. 10,250,0.7,250
    #[arg(short, long)]
    envelope: Option<Envelope>,

    /// bitmask: 1 amp, 2 duty, 4 freq, 8 filter freq, 16 resonance
    #[arg(long)]
    adsr_target: Option<u32>,

    #[arg(long)]
    lfo_target: Option<u32>,

    #[arg(long)]
    lfo_source: Option<u32>,

    /// Reset this voice
    #[arg(long)]
    reset: Option<u32>,

    /// Reset every voice
    #[arg(long, conflicts_with = "reset")]
    reset_all: bool,

    /// Play as soon as it arrives instead of at the stamped time
    #[arg(short, long)]
    immediate: bool,

    /// Send the packet this many times
    #[arg(short, long, default_value_t = 1)]
    retries: u32,
}

fn build_command(args: &Args) -> Result<Command, BoxError> {
    let mut cmd = Command::new();
    cmd.voice = args.voice;
    if let Some(w) = args.wave {
        let wave: Option<Waveform> = num::FromPrimitive::from_u32(w);
        if wave.is_none() {
            bail!("unknown wave {}", w);
        }
        cmd.wave = wave;
    }
    cmd.note = args.note;
    cmd.patch = args.patch;
    cmd.velocity = args.vel;
    cmd.freq = args.freq;
    cmd.duty = args.duty;
    cmd.feedback = args.feedback;
    cmd.phase = args.phase;
    if args.group == Some(0) {
        bail!("group must be at least 1");
    }
    cmd.client = match (args.client, args.group) {
        (Some(id), _) => Some(ClientTarget::One(id)),
        (None, Some(n)) => Some(ClientTarget::Group(n)),
        (None, None) => None,
    };
    cmd.volume = args.volume;
    cmd.filter_freq = args.filter_freq;
    cmd.resonance = args.resonance;
    cmd.envelope = args.envelope;
    cmd.adsr_target = args.adsr_target.map(Target);
    cmd.lfo_target = args.lfo_target.map(Target);
    cmd.lfo_source = args.lfo_source;
    if args.reset_all {
        cmd.reset = Some(ResetTarget::All);
    } else {
        cmd.reset = args.reset.map(ResetTarget::Voice);
    }
    if args.immediate {
        cmd = cmd.immediate();
    }
    Ok(cmd)
}

fn main() -> Result<(), BoxError> {
    env_logger::init();
    let args = Args::parse();
    let cmd = build_command(&args)?;

    let config = Config::build(args.config.clone(), Config::defaults())?;
    let mut synths = Alles::open(SessionSettings::from_config(&config)?)?;
    synths.send_with_retries(&cmd, args.retries);
    info!("sent {}", cmd);
    synths.close()?;
    Ok(())
}
