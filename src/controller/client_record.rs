//! What a sync run found out about one synth
use serde::Serialize;
use std::{collections::HashMap, fmt, net::Ipv4Addr};

use crate::message::battery::{decode_battery_mask, BatteryStatus};

/// Summary of one synth's answers during a sync run
///
/// - reliability - fraction of the run's beacons it answered, 0.0 to 1.0
/// - avg_rtt_ms - mean round trip of the answers (None if it answered none)
/// - rtt_std_dev_ms - spread of those round trips
/// - ipv4 - address as the synth reported it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientRecord {
    pub client_id: i64,
    pub ipv4: u32,
    pub reliability: f64,
    pub avg_rtt_ms: Option<f64>,
    pub rtt_std_dev_ms: Option<f64>,
    pub replies: usize,
    pub battery: BatteryStatus,
}

impl ClientRecord {
    /// Boil down the round trips seen from one address.
    ///
    /// `rtts` maps beacon index to round trip (ms).  Only indices in
    /// `first_index .. first_index + count` are counted, answers to drain
    /// beacons are ignored.
    pub fn summarize(
        client_id: i64,
        ipv4: u32,
        rtts: &HashMap<i64, i64>,
        first_index: i64,
        count: usize,
        battery_mask: u8,
    ) -> ClientRecord {
        let samples: Vec<f64> = (first_index..first_index + count as i64)
            .filter_map(|idx| rtts.get(&idx))
            .map(|ms| *ms as f64)
            .collect();
        let hits = samples.len();
        let reliability = if count == 0 {
            0.0
        } else {
            hits as f64 / count as f64
        };
        let (avg_rtt_ms, rtt_std_dev_ms) = if hits == 0 {
            (None, None)
        } else {
            let mean = samples.iter().sum::<f64>() / hits as f64;
            let var = samples.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / hits as f64;
            (Some(mean), Some(var.sqrt()))
        };
        ClientRecord {
            client_id,
            ipv4,
            reliability,
            avg_rtt_ms,
            rtt_std_dev_ms,
            replies: hits,
            battery: decode_battery_mask(battery_mask),
        }
    }

    /// the reported address as an Ipv4Addr (synths that only report their
    /// last octet show up as 0.0.0.x)
    pub fn ipv4_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.ipv4)
    }
}

impl fmt::Display for ClientRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match serde_json::to_string(&self) {
            Ok(s) => write!(f, "{}", s),
            Err(_) => write!(f, "{{ client_id: {} }}", self.client_id),
        }
    }
}

#[cfg(test)]
mod test_client_record {
    use super::*;
    use crate::message::battery::ChargeState;

    #[test]
    fn two_of_three() {
        let rtts = HashMap::from([(0, 20), (2, 35)]);
        let rec = ClientRecord::summarize(1, 42, &rtts, 0, 3, 0x11);
        assert!((rec.reliability - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(rec.avg_rtt_ms, Some(27.5));
        assert_eq!(rec.rtt_std_dev_ms, Some(7.5));
        assert_eq!(rec.replies, 2);
        assert_eq!(rec.battery.state, ChargeState::Charging);
        assert_eq!(rec.battery.level, 4);
    }
    #[test]
    fn drain_answers_do_not_count() {
        let rtts = HashMap::from([(5, 20), (6, 20)]);
        let rec = ClientRecord::summarize(1, 42, &rtts, 0, 3, 0);
        assert_eq!(rec.reliability, 0.0);
        assert_eq!(rec.avg_rtt_ms, None);
        assert_eq!(rec.rtt_std_dev_ms, None);
    }
    #[test]
    fn zero_count_is_zero_reliability() {
        let rtts = HashMap::from([(0, 20)]);
        let rec = ClientRecord::summarize(1, 42, &rtts, 0, 0, 0);
        assert_eq!(rec.reliability, 0.0);
        assert_eq!(rec.avg_rtt_ms, None);
    }
    #[test]
    fn offset_window() {
        let rtts = HashMap::from([(9, 10), (10, 30), (11, 50)]);
        let rec = ClientRecord::summarize(1, 42, &rtts, 10, 2, 0);
        assert_eq!(rec.reliability, 1.0);
        assert_eq!(rec.avg_rtt_ms, Some(40.0));
    }
    #[test]
    fn address_and_json() {
        let rec = ClientRecord::summarize(3, 0xC0A8_0102, &HashMap::new(), 0, 4, 0x24);
        assert_eq!(rec.ipv4_addr(), Ipv4Addr::new(192, 168, 1, 2));
        let json = rec.to_string();
        assert!(json.contains("\"client_id\":3"));
        assert!(json.contains("\"state\":\"discharging\""));
        assert!(json.contains("\"avg_rtt_ms\":null"));
    }
}
