/// End-to-end run: fetch every page, normalize, export.
///
/// Stages run strictly in order. All pages are collected before
/// normalization starts, so a retrieval failure never leaves a partial
/// output file behind.

use std::path::PathBuf;
use tracing::info;

use crate::config::Settings;
use crate::export::export_to_path;
use crate::ingest::meetup::{PageSource, fetch_all};
use crate::logging::{Stage, log_run_summary};
use crate::model::{Page, Result};
use crate::normalize::normalize;

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub requests: u32,
    pub pages: usize,
    pub rows: usize,
    pub output_path: PathBuf,
}

pub fn run<S: PageSource>(source: S, settings: &Settings) -> Result<RunSummary> {
    let mut paginator = fetch_all(source, settings);
    let pages: Vec<Page> = paginator.by_ref().collect::<Result<_>>()?;
    let requests = paginator.requests_issued();

    let dataset = normalize(&pages, settings.offset_policy)?;
    log_run_summary(pages.len(), dataset.len());

    let rows = export_to_path(&dataset, &settings.output_path)?;
    info!(stage = %Stage::System, requests, rows, "Pipeline finished");

    Ok(RunSummary {
        requests,
        pages: pages.len(),
        rows,
        output_path: settings.output_path.clone(),
    })
}
