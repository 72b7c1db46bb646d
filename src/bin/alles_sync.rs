use alles_rust::{
    common::{
        box_error::BoxError,
        config::{Config, SETTINGS_FILE},
        multicast_sock::SessionSettings,
    },
    controller::{alles::Alles, client_record::ClientRecord, sync_engine::SyncOptions},
};
use clap::{Parser, ValueEnum};
use log::{debug, info};

/// Sync with every synth on the network and report round trip time,
/// reliability and battery state for each

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Settings file (json)
    #[arg(short, long, default_value = SETTINGS_FILE)]
    config: String,

    /// Number of beacons that count toward reliability
    #[arg(short = 'n', long, default_value_t = 10)]
    count: usize,

    /// Milliseconds between beacons
    #[arg(short, long, default_value_t = 100)]
    delay: i64,

    /// Index of the first beacon
    #[arg(long, default_value_t = 0)]
    first_index: i64,

    /// How to print the results
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    format: Format,

    /// Write csv here instead of stdout
    #[arg(short, long)]
    out_file: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Table,
    Json,
    Csv,
}

/// The Row is one synth's results flattened for csv
#[derive(serde::Serialize)]
struct Row {
    #[serde(rename = "clientId")]
    client_id: i64,
    ipv4: String,
    reliability: f64,
    #[serde(rename = "avgRttMs")]
    avg_rtt_ms: Option<f64>,
    #[serde(rename = "rttStdDevMs")]
    rtt_std_dev_ms: Option<f64>,
    battery: String,
    #[serde(rename = "batteryLevel")]
    battery_level: u8,
}

impl From<&ClientRecord> for Row {
    fn from(rec: &ClientRecord) -> Row {
        Row {
            client_id: rec.client_id,
            ipv4: rec.ipv4_addr().to_string(),
            reliability: rec.reliability,
            avg_rtt_ms: rec.avg_rtt_ms,
            rtt_std_dev_ms: rec.rtt_std_dev_ms,
            battery: rec.battery.state.to_string(),
            battery_level: rec.battery.level,
        }
    }
}

fn main() -> Result<(), BoxError> {
    env_logger::init();
    let args = Args::parse();

    let config = Config::build(args.config, Config::defaults())?;
    debug!("settings from {}: {}", config.get_filename(), config.dump());
    let settings = SessionSettings::from_config(&config)?;
    let options = SyncOptions::new(args.count, args.delay)
        .latency(settings.latency_ms)
        .first_index(args.first_index);

    let mut synths = Alles::open(settings)?;
    let report = synths.sync_with(options, None);
    synths.close()?;
    info!("{}", report);

    match args.format {
        Format::Table => {
            println!("{:>6} {:>15} {:>8} {:>10} {:>10}  battery", "client", "ipv4", "reliab", "rtt ms", "sigma");
            for rec in report.clients.values() {
                println!(
                    "{:>6} {:>15} {:>8.3} {:>10} {:>10}  {}",
                    rec.client_id,
                    rec.ipv4_addr().to_string(),
                    rec.reliability,
                    rec.avg_rtt_ms.map(|v| format!("{:.1}", v)).unwrap_or("-".to_string()),
                    rec.rtt_std_dev_ms.map(|v| format!("{:.1}", v)).unwrap_or("-".to_string()),
                    rec.battery
                );
            }
        }
        Format::Json => {
            let clients: Vec<&ClientRecord> = report.clients.values().collect();
            println!("{}", serde_json::to_string_pretty(&clients)?);
        }
        Format::Csv => {
            let mut wtr = match args.out_file {
                Some(path) => csv::Writer::from_writer(Box::new(std::fs::File::create(path)?) as Box<dyn std::io::Write>),
                None => csv::Writer::from_writer(Box::new(std::io::stdout()) as Box<dyn std::io::Write>),
            };
            for rec in report.clients.values() {
                wtr.serialize(Row::from(rec))?;
            }
            wtr.flush()?;
        }
    }
    Ok(())
}
