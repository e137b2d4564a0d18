//! Test assertions for stage results and errors.

use crate::errors::StagegateError;
use crate::stages::{StageKind, StageResult};

/// Asserts that a stage result starts with its kind's banner.
pub fn assert_banner(result: &StageResult) {
    match result.kind.banner() {
        Some(banner) => assert!(
            result.output.starts_with(&format!("{banner}\n")),
            "Expected output of {} to start with {banner:?}, got {:?}",
            result.kind,
            result.output
        ),
        None => panic!("Stage {} has no banner", result.kind),
    }
}

/// Asserts that an error is attributed to `kind`.
pub fn assert_stage_failed(err: &StagegateError, kind: StageKind) {
    assert_eq!(
        err.stage(),
        Some(kind),
        "Expected failure from {kind}, got: {err}"
    );
    assert!(
        err.to_string().contains(kind.token()),
        "Expected message to name {kind}, got: {err}"
    );
}

/// Asserts that an error is a composition failure at `phase`.
pub fn assert_failed_at_phase(err: &StagegateError, phase: usize, kind: StageKind) {
    match err {
        StagegateError::Phase {
            phase: actual,
            stage,
            ..
        } => {
            assert_eq!(*actual, phase, "Wrong failing phase: {err}");
            assert_eq!(*stage, kind, "Wrong failing stage: {err}");
        }
        other => panic!("Expected phase failure, got: {other}"),
    }
}

/// Asserts that `text` contains every needle, in order.
pub fn assert_transcript_order(text: &str, needles: &[&str]) {
    let mut rest = text;
    for needle in needles {
        match rest.find(needle) {
            Some(at) => rest = &rest[at + needle.len()..],
            None => panic!("Expected {needle:?} (in order) in transcript:\n{text}"),
        }
    }
}
