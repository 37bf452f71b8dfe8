//! Compiled output chains
//!
//! An output chain is the immutable product of compiling the `outputs`
//! configuration: an ordered list of `(pattern, processor)` rules plus
//! at most one default processor that catches unmatched categories.
//! Dispatch tries the non-default rules in configured order; first
//! match wins.
//!
//! Chains arriving from producers may interleave categories that route
//! to different processors. `dispatch` walks the chain, splitting it at
//! every processor boundary, so each processor still receives batched
//! contiguous runs while categories route independently.

use std::str::FromStr;
use std::sync::Arc;

use parchment_config::{OutputConfig, OutputKind};
use parchment_net::Address;
use parchment_protocol::Chain;
use parchment_sinks::{
    FileProcessor, Processor, RelayConfig, RelayProcessor, StdoutProcessor,
};
use parchment_spool::SpoolConfig;
use regex::bytes::Regex;

use crate::{Result, RouterError};

struct OutputRule {
    pattern: Regex,
    processor: Arc<dyn Processor>,
}

/// An immutable, compiled list of output rules
#[derive(Default)]
pub struct OutputChain {
    default: Option<Arc<dyn Processor>>,
    rules: Vec<OutputRule>,
}

impl OutputChain {
    /// A chain with no rules; everything dispatched to it is dropped
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile output configs into processors and matchers
    ///
    /// The entry with an empty pattern becomes the default. Two
    /// defaults are rejected (config validation also refuses them; this
    /// guards chains assembled in code).
    pub fn compile(outputs: &[OutputConfig]) -> Result<Self> {
        let mut chain = OutputChain::empty();
        for output in outputs {
            let processor = build_processor(output)?;
            if output.pattern.is_empty() {
                if chain.default.is_some() {
                    return Err(parchment_config::ConfigError::DuplicateDefault.into());
                }
                chain.default = Some(processor);
            } else {
                let pattern =
                    Regex::new(&output.pattern).map_err(|source| {
                        parchment_config::ConfigError::Pattern {
                            pattern: output.pattern.clone(),
                            source,
                        }
                    })?;
                chain.rules.push(OutputRule { pattern, processor });
            }
        }
        Ok(chain)
    }

    /// Append a rule directly, for dispatch tests with fake processors
    #[cfg(test)]
    pub(crate) fn push_rule_for_test(&mut self, pattern: Regex, processor: Arc<dyn Processor>) {
        self.rules.push(OutputRule { pattern, processor });
    }

    /// Set the default directly, for dispatch tests with fake processors
    #[cfg(test)]
    pub(crate) fn set_default_for_test(&mut self, processor: Arc<dyn Processor>) {
        self.default = Some(processor);
    }

    /// The processor a category routes to
    ///
    /// Non-default rules in configured order, then the default. `None`
    /// means the category has nowhere to go and its records are
    /// dropped.
    pub fn find_processor(&self, category: &[u8]) -> Option<&Arc<dyn Processor>> {
        for rule in &self.rules {
            if rule.pattern.is_match(category) {
                return Some(&rule.processor);
            }
        }
        self.default.as_ref()
    }

    /// Split off the longest prefix routing to a single processor
    ///
    /// Returns that prefix's processor and the detached remainder.
    fn split_for_processor(&self, chain: &mut Chain) -> (Option<Arc<dyn Processor>>, Chain) {
        let head_processor = chain
            .front()
            .and_then(|record| self.find_processor(&record.category))
            .cloned();

        let mut split_at = None;
        for (index, record) in chain.iter().enumerate().skip(1) {
            let processor = self.find_processor(&record.category);
            if !same_processor(head_processor.as_ref(), processor) {
                split_at = Some(index);
                break;
            }
        }

        let remainder = match split_at {
            Some(index) => chain.split_off_at(index),
            None => Chain::new(),
        };
        (head_processor, remainder)
    }

    /// Route a chain into its processors, splitting at rule boundaries
    ///
    /// Each single-processor run is written as one batch. A run whose
    /// category matches nothing (and no default exists) is dropped with
    /// a warning. Any processor failure aborts the dispatch; the caller
    /// must not acknowledge the chain.
    pub async fn dispatch(&self, mut chain: Chain) -> Result<()> {
        while !chain.is_empty() {
            let (processor, remainder) = self.split_for_processor(&mut chain);
            let segment = std::mem::replace(&mut chain, remainder);
            match processor {
                Some(processor) => {
                    let category = segment
                        .front()
                        .map(|record| String::from_utf8_lossy(&record.category).into_owned())
                        .unwrap_or_default();
                    processor
                        .write_chain(segment)
                        .await
                        .map_err(|source| RouterError::Dispatch { category, source })?;
                }
                None => {
                    let category = segment
                        .front()
                        .map(|record| String::from_utf8_lossy(&record.category).into_owned())
                        .unwrap_or_default();
                    tracing::warn!(
                        category = %category,
                        records = segment.len(),
                        "no output matches category, dropping records"
                    );
                }
            }
        }
        Ok(())
    }

    /// Close every processor, logging failures
    pub async fn close(&self) {
        for rule in &self.rules {
            if let Err(e) = rule.processor.close().await {
                tracing::error!(pattern = %rule.pattern, error = %e, "failed to close output");
            }
        }
        if let Some(default) = &self.default {
            if let Err(e) = default.close().await {
                tracing::error!(error = %e, "failed to close default output");
            }
        }
    }
}

fn same_processor(a: Option<&Arc<dyn Processor>>, b: Option<&Arc<dyn Processor>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Build the processor an output config describes
fn build_processor(output: &OutputConfig) -> Result<Arc<dyn Processor>> {
    match output.kind {
        OutputKind::Stdout => Ok(Arc::new(StdoutProcessor::new(output.format()))),
        OutputKind::File => {
            let path = output.path.as_deref().ok_or(
                parchment_config::ConfigError::MissingField {
                    kind: "file",
                    field: "path",
                },
            )?;
            Ok(Arc::new(FileProcessor::new(
                path,
                output.format(),
                output.directory_mode()?,
                output.file_mode()?,
            )))
        }
        OutputKind::Relay => {
            let remote = output.remote.as_deref().ok_or(
                parchment_config::ConfigError::MissingField {
                    kind: "relay",
                    field: "remote",
                },
            )?;
            let remote =
                Address::from_str(remote).map_err(parchment_config::ConfigError::Address)?;
            let spool_dir = output.spool_dir.as_ref().ok_or(
                parchment_config::ConfigError::MissingField {
                    kind: "relay",
                    field: "spool_dir",
                },
            )?;
            let basename = output.spool_basename.as_deref().unwrap_or("spool");
            let mut config = RelayConfig::new(remote, SpoolConfig::new(spool_dir, basename));
            config.max_segment_size = output.spool_max_bytes;
            Ok(Arc::new(RelayProcessor::new(config)))
        }
    }
}
