//! Console rendering surface

use core_pipeline::{ResultSurface, ScanReport, Status};
use tracing::debug;

/// Prints status to stderr and results to stdout
///
/// In JSON mode nothing is printed; the caller emits one JSON record per
/// capture instead.
pub struct ConsoleSurface {
    json: bool,
}

impl ConsoleSurface {
    pub fn new(json: bool) -> Self {
        Self { json }
    }
}

impl ResultSurface for ConsoleSurface {
    fn status(&self, status: Status) {
        if self.json {
            debug!("{}", status);
        } else {
            eprintln!("» {}", status);
        }
    }

    fn render(&self, report: &ScanReport) {
        if !self.json {
            println!("{}", format_report(report));
        }
    }
}

/// Plain-text rendering of a report
pub fn format_report(report: &ScanReport) -> String {
    let mut out = report.headline();
    match report {
        ScanReport::Draws { draws, .. } => {
            for draw in draws {
                out.push('\n');
                out.push_str(&draw.display);
            }
        }
        ScanReport::Unrecognized { raw_text } => {
            out.push('\n');
            out.push_str(raw_text.trim_end());
        }
        ScanReport::NoTextFound | ScanReport::Failed { .. } => {}
    }
    out
}
