//! Repair module - Per-pair variation: variable alignment, fault
//! localization, statement alignment and patch synthesis.

pub mod align;
pub mod localize;
pub mod rng;
pub mod synthesis;
pub mod variables;

pub use align::{EditCandidates, InsertPosition, StatementAligner, lcs_pairs, merge_by_vote};
pub use localize::{Suspiciousness, above, divergence, jaccard, ranked, tarantula};
pub use rng::RepairRng;
pub use synthesis::{Edit, EditMap, FixHistory, Patch, PatchSynthesizer};
pub use variables::{VariableAligner, VariableMap, is_injective};

use crate::oracle::{Oracle, OracleError};
use crate::schema::{LocalizationMethod, RepairConfig, TraceReport};
use crate::syntax::{ParseError, parse, rename};

/// Failures that abort a single (buggy, reference) pairing.
#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("Synthesis failed: {0}")]
    Synthesis(String),
}

/// Everything one pairing produced, for the attempt log.
#[derive(Debug, Clone)]
pub struct Variation {
    pub patch: Patch,
    pub variable_map: VariableMap,
    pub suspiciousness: Suspiciousness,
    /// Full-suite report of the buggy program.
    pub buggy: TraceReport,
    /// Full-suite report of the reference program.
    pub reference: TraceReport,
}

/// Derive one patch for `buggy` guided by `reference`.
///
/// Both sources must be in normalized form so trace locations line up with
/// the parsed trees. Only failing tests of `buggy` drive alignment.
pub fn vary<O: Oracle + ?Sized>(
    oracle: &mut O,
    rng: &mut RepairRng,
    history: &mut FixHistory,
    config: &RepairConfig,
    buggy: &str,
    reference: &str,
) -> Result<Variation, RepairError> {
    let buggy_tree = parse(buggy)?;
    let reference_tree = parse(reference)?;
    let buggy_report = oracle.trace(buggy)?;
    let reference_report = oracle.trace(reference)?;

    let failed = buggy_report.failed();
    let buggy_failing = buggy_report.restricted_to(&failed);
    let reference_failing = reference_report.restricted_to(&failed);

    let variable_map = VariableAligner::new(
        &reference_tree,
        &reference_failing,
        &buggy_tree,
        &buggy_failing,
        &failed,
    )
    .align(rng);
    let renamed = rename(&reference_tree, &variable_map);

    let suspiciousness = match config.localization {
        LocalizationMethod::Divergence => divergence(
            &buggy_failing,
            &reference_failing,
            &variable_map,
            &config.divergence,
        ),
        LocalizationMethod::Tarantula => tarantula(&buggy_report),
        LocalizationMethod::Jaccard => jaccard(&buggy_report),
    };
    if failed.is_empty() {
        log::debug!("No failing tests; alignment has nothing to work with");
    }

    let candidates =
        StatementAligner::new(&buggy_tree, &renamed).align(rng, &buggy_report, &reference_report, &failed);
    log::debug!(
        "{} edit candidates, {} suspicious locations",
        candidates.len(),
        suspiciousness.len()
    );

    let patch = PatchSynthesizer::new(&buggy_tree, &renamed).synthesize(
        rng,
        candidates,
        suspiciousness.clone(),
        history,
    )?;

    Ok(Variation {
        patch,
        variable_map,
        suspiciousness,
        buggy: buggy_report,
        reference: reference_report,
    })
}
