use std::io::{self, Write};

use camino::Utf8Path;
use serde::Serialize;

use crate::collector::{CollectReport, ProgressEvent, ProgressSink, SyncAction};
use crate::descriptor::ResourceDescriptor;
use crate::error::CollectError;
use crate::index::DatasetIndex;
use crate::store::Store;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &CollectReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_catalog(resources: &[ResourceDescriptor]) -> io::Result<()> {
        Self::print_json(&resources)
    }

    pub fn print_index(index: &DatasetIndex) -> io::Result<()> {
        Self::print_json(&index.entries())
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Writes progress lines to stderr, leaving stdout to the report.
pub struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({} ms)", event.message, elapsed.as_millis()),
            None => eprintln!("{}", event.message),
        }
    }
}

pub fn print_summary(report: &CollectReport) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}stat-collect summary{reset}");
    println!(
        "{green}updated: {}  created: {}{reset}  skipped: {}  planned: {}",
        report.count(SyncAction::Updated),
        report.count(SyncAction::Created),
        report.count(SyncAction::Skipped),
        report.count(SyncAction::Planned),
    );
    println!(
        "{yellow}unresolved: {}{reset}  {red}failed: {}{reset}",
        report.count(SyncAction::Unresolved),
        report.failed()
    );

    for item in &report.items {
        let color = match item.action {
            SyncAction::Created | SyncAction::Updated => green,
            SyncAction::Planned => cyan,
            SyncAction::Unresolved => yellow,
            SyncAction::Failed => red,
            SyncAction::Skipped => reset,
        };
        let version = item
            .observed_version
            .as_ref()
            .or(item.recorded_version.as_ref())
            .map(|version| version.as_str())
            .unwrap_or("-");
        println!(
            "{color}{:<10} {}/{} @ {version}{reset}",
            item.action.as_str(),
            item.source,
            item.dataset
        );
        if let Some(location) = &item.location {
            println!("{color}   location: {location}{reset}");
        }
        if item.metadata_saved + item.metadata_missing + item.metadata_failed > 0 {
            println!(
                "{color}   metadata: {} saved, {} not listed, {} failed{reset}",
                item.metadata_saved, item.metadata_missing, item.metadata_failed
            );
        }
        if let Some(error) = &item.error {
            println!("{red}   error: {error}{reset}");
        }
    }
}

pub fn print_catalog_table(resources: &[ResourceDescriptor]) {
    for resource in resources {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            resource.name,
            resource.stage,
            resource.task_name,
            resource.data_version,
            resource.location
        );
    }
}

/// Writes the index as CSV to `out`, or to stdout.
pub fn write_index_csv(index: &DatasetIndex, out: Option<&Utf8Path>) -> Result<(), CollectError> {
    match out {
        Some(path) => {
            let mut buffer = Vec::new();
            index.write_csv(&mut buffer)?;
            Store::write_bytes_atomic(path, &buffer)
        }
        None => index.write_csv(io::stdout().lock()),
    }
}
