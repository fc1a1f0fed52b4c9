//! Line-oriented tokenizers for the kernel pseudo-files.
//!
//! These turn raw text into the records the domain layer consumes; they never
//! interpret cpumasks or build topology themselves.

use std::collections::HashSet;

use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::domain::{CpuId, CpuLoadSample, Diagnostics, DomainError, DomainRecord, SchedstatRecord};

/// First schedstat version printing the domain name before the mask.
pub const SCHEDSTAT_NAMED_VERSION: u32 = 17;

/// Tokenize `/proc/schedstat`.
///
/// A malformed `domain<K>` line poisons the record it belongs to; that record
/// is dropped and reported, the remaining records are kept.
#[instrument(level = "debug", skip_all)]
pub fn parse_schedstat(text: &str) -> (Vec<SchedstatRecord>, Diagnostics) {
    let mut records: Vec<SchedstatRecord> = Vec::new();
    let mut poisoned: HashSet<usize> = HashSet::new();
    let mut diagnostics = Diagnostics::new();
    let mut version: Option<u32> = None;

    for (lineno, line) in text.lines().enumerate() {
        let line_no = lineno + 1;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&head) = tokens.first() else {
            continue;
        };

        if head == "version" {
            version = tokens.get(1).and_then(|v| v.parse().ok());
        } else if let Some(id) = head.strip_prefix("cpu") {
            match id.parse::<CpuId>() {
                Ok(cpu) => records.push(SchedstatRecord {
                    cpu,
                    domains: Vec::new(),
                }),
                Err(_) => diagnostics.push(malformed(line_no, format!("bad cpu token {head:?}"))),
            }
        } else if let Some(k) = head.strip_prefix("domain") {
            let Some(current) = records.len().checked_sub(1) else {
                diagnostics.push(malformed(line_no, "domain line before any cpu line"));
                continue;
            };
            match domain_record(k, &tokens[1..], version) {
                Ok(domain) => records[current].domains.push(domain),
                Err(message) => {
                    diagnostics.push(malformed(line_no, message));
                    poisoned.insert(current);
                }
            }
        }
    }

    let records = records
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !poisoned.contains(i))
        .map(|(_, record)| record)
        .collect::<Vec<_>>();
    debug!(records = records.len(), ?version, "schedstat parsed");
    (records, diagnostics)
}

fn domain_record(k: &str, rest: &[&str], version: Option<u32>) -> Result<DomainRecord, String> {
    let index = k
        .parse::<usize>()
        .map_err(|_| format!("bad domain token \"domain{k}\""))?;

    let named = match version {
        Some(v) => v >= SCHEDSTAT_NAMED_VERSION,
        None => rest.first().is_some_and(|t| !looks_like_mask(t)) && rest.len() > 1,
    };
    let (name, mask) = match (named, rest) {
        (true, [name, mask, ..]) => (Some(name.to_string()), *mask),
        (false, [mask, ..]) => (None, *mask),
        _ => return Err(format!("domain{index} has no cpumask")),
    };

    Ok(DomainRecord {
        index,
        mask: mask.to_string(),
        name,
    })
}

fn looks_like_mask(token: &str) -> bool {
    token.chars().all(|c| c.is_ascii_hexdigit() || c == ',')
}

fn malformed(line: usize, message: impl Into<String>) -> DomainError {
    DomainError::MalformedRecord {
        line,
        message: message.into(),
    }
}

/// Extract the root cfs_rq `.load` of every CPU from `/proc/sched_debug`.
///
/// Only the root group (`cfs_rq[N]:/`) counts; task-group run queues
/// (`cfs_rq[N]:/user.slice`) are skipped.
#[instrument(level = "debug", skip_all)]
pub fn parse_sched_debug(text: &str) -> Result<CpuLoadSample, regex::Error> {
    let cfs_rq = Regex::new(r"^cfs_rq\[(\d+)\]:/\s*$")?;
    let load = Regex::new(r"^\s+\.load\s+:\s+(\d+)")?;

    let mut sample = CpuLoadSample::new();
    let mut current: Option<CpuId> = None;
    for line in text.lines() {
        if let Some(caps) = cfs_rq.captures(line) {
            current = caps[1].parse().ok();
        } else if line.starts_with("cfs_rq[") {
            current = None;
        } else if let Some(cpu) = current {
            if let Some(caps) = load.captures(line) {
                match caps[1].parse() {
                    Ok(value) => sample.insert(cpu, value),
                    Err(e) => warn!(cpu, "unparsable load {:?}: {}", &caps[1], e),
                }
                current = None;
            }
        }
    }

    debug!(cpus = sample.len(), total = ?sample.total(), "sched_debug parsed");
    Ok(sample)
}

/// List the CPU ids of every `processor : N` line of `/proc/cpuinfo`.
pub fn parse_cpuinfo(text: &str) -> Vec<CpuId> {
    text.lines()
        .filter(|line| line.trim_start().starts_with("processor"))
        .filter_map(|line| {
            let value = line.split(':').nth(1)?.trim();
            match value.parse() {
                Ok(cpu) => Some(cpu),
                Err(_) => {
                    warn!("unparsable processor line {:?}", line);
                    None
                }
            }
        })
        .collect()
}
