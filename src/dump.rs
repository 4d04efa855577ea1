//! Print a parsed capture for debugging.
//! Run: uhid-replay dump <capture> to see what would be replayed.

use std::path::Path;

use uhid_replay::capture::{self, Report};
use uhid_replay::device::Model;
use uhid_replay::replay::dedup_consecutive;

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn timestamp(report: &Report) -> String {
    format!(
        "{}.{:06}",
        report.timestamp_us / 1_000_000,
        report.timestamp_us % 1_000_000
    )
}

pub fn run_dump(path: &Path) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let capture = capture::load(path)?;
    let model = Model::detect(capture.vendor_id, capture.product_id);
    let unique = dedup_consecutive(&capture.reports);

    println!("{}", capture);
    println!("model {}, {} reports after dedup", model, unique.len());
    println!("descriptor: {}\n", hex(&capture.descriptor));

    for (n, report) in capture.reports.iter().enumerate() {
        println!("{:6}  {:>14}  {}", n + 1, timestamp(report), hex(&report.payload));
    }
    Ok(())
}
