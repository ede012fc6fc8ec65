//! Salvage command implementation.

use super::open_shared;
use super::scan::FrameListing;
use rbf_core::salvage::salvage_scan;
use serde::Serialize;
use std::path::Path;

/// A damaged byte range for output.
#[derive(Debug, Serialize)]
pub struct SkippedListing {
    /// First skipped byte.
    pub start: u64,
    /// One past the last skipped byte.
    pub end: u64,
}

/// Salvage output.
#[derive(Debug, Serialize)]
pub struct SalvageListing {
    /// Every verified frame, newest first.
    pub frames: Vec<FrameListing>,
    /// Regions that belong to no verified frame, newest first.
    pub skipped: Vec<SkippedListing>,
    /// Total skipped bytes.
    pub skipped_bytes: u64,
}

/// Runs the salvage command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listing = salvage(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        _ => {
            print_text_output(&listing);
        }
    }

    Ok(())
}

/// Walks the whole file and collects every frame that still verifies.
pub fn salvage(path: &Path) -> Result<SalvageListing, Box<dyn std::error::Error>> {
    let file = open_shared(path)?;
    let report = salvage_scan(&file)?;
    file.close()?;

    Ok(SalvageListing {
        frames: report.frames.iter().map(FrameListing::from).collect(),
        skipped: report
            .skipped
            .iter()
            .map(|region| SkippedListing {
                start: region.start,
                end: region.end,
            })
            .collect(),
        skipped_bytes: report.skipped_bytes(),
    })
}

fn print_text_output(listing: &SalvageListing) {
    println!("Recovered {} frame(s)", listing.frames.len());
    for frame in &listing.frames {
        println!(
            "  {}+{} tag={:#010x}{}",
            frame.offset,
            frame.length,
            frame.tag,
            if frame.tombstone { " tombstone" } else { "" }
        );
    }
    if listing.skipped.is_empty() {
        println!("No damaged regions");
        return;
    }
    println!();
    println!("Skipped {} byte(s):", listing.skipped_bytes);
    for region in &listing.skipped {
        println!("  [{}, {})", region.start, region.end);
    }
}
