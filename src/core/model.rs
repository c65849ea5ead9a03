// MedScan - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no
// platform dependencies. These types are the shared vocabulary across
// all layers: the raw remote response, its normalised projections, the
// session root, and the progress messages exchanged with the pipeline task.

use crate::util::error::AnalysisError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

// =============================================================================
// Scan state
// =============================================================================

/// Lifecycle state of the scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    /// Nothing in flight; waiting for the user.
    #[default]
    Idle,
    /// The user is capturing or selecting input.
    Scanning,
    /// A payload is in flight to the analysis service.
    Analyzing,
    /// The session reached a terminal outcome (success or failure).
    Results,
}

impl ScanState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Analyzing => "analyzing",
            Self::Results => "results",
        }
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Image payloads
// =============================================================================

/// An image as selected or captured by the user, before preprocessing.
#[derive(Clone, PartialEq, Eq)]
pub struct RawImage {
    /// Human-readable origin (file name, "camera", ...). Used in messages only.
    pub label: String,
    /// Encoded file bytes in any supported container format.
    pub bytes: Vec<u8>,
}

impl RawImage {
    pub fn new(label: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            bytes,
        }
    }
}

// Bytes are elided so payloads never end up in debug logs.
impl fmt::Debug for RawImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawImage")
            .field("label", &self.label)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A bounded-size, re-encoded payload ready for submission.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub label: String,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub mime_type: &'static str,
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("label", &self.label)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

// =============================================================================
// Analysis steps
// =============================================================================

/// Progress of a single analysis stage. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Complete,
}

/// Configured stage: a label and the minimum time it stays on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub title: String,
    pub min_duration: Duration,
}

impl StageSpec {
    pub fn new(title: impl Into<String>, min_duration: Duration) -> Self {
        Self {
            title: title.into(),
            min_duration,
        }
    }
}

/// Live view of a stage within the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisStep {
    pub title: String,
    pub status: StepStatus,
    #[serde(with = "duration_ms")]
    pub min_duration: Duration,
}

impl AnalysisStep {
    pub fn pending(stage: &StageSpec) -> Self {
        Self {
            title: stage.title.clone(),
            status: StepStatus::Pending,
            min_duration: stage.min_duration,
        }
    }

    /// Advance to `status`. Returns false (and leaves the step untouched)
    /// when that would move the step backwards.
    pub fn advance(&mut self, status: StepStatus) -> bool {
        if status < self.status {
            return false;
        }
        self.status = status;
        true
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

// =============================================================================
// Raw remote response
// =============================================================================

/// The analysis service's response, exactly as received.
///
/// Ambiguous by construction: `error` without `score` is a total failure,
/// `error` with `score` is a soft warning on otherwise valid data. Only
/// `core::reconcile` should look at these optional fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UnifiedAnalysisResult {
    // -- General info --
    pub uses: Option<String>,
    pub mechanism: Option<String>,
    pub indications: Option<String>,
    pub disclaimer: Option<String>,

    // -- Forensic --
    pub score: Option<f64>,
    pub verdict: Option<String>,
    pub imprint: Option<String>,
    pub sources: Option<Vec<String>>,
    pub comparison: Option<RawComparison>,
    pub detailed: Option<Vec<String>>,

    pub error: Option<String>,
}

/// Per-feature comparison block of the raw response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawComparison {
    pub color: Option<RawFeatureComparison>,
    pub shape: Option<RawFeatureComparison>,
    pub imprint: Option<RawFeatureComparison>,
    pub packaging: Option<RawFeatureComparison>,
}

/// A single feature comparison as sent by the service. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFeatureComparison {
    #[serde(rename = "match")]
    pub matched: Option<bool>,
    pub status: Option<String>,
    pub reason: Option<String>,
}

// =============================================================================
// Normalised projections
// =============================================================================

/// General medicine information. Absent optional fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizedMedicineInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mechanism: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indications: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disclaimer: Option<String>,
    /// Set only when the analysis failed outright.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Authenticity verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Authentic,
    Suspicious,
    Counterfeit,
    Inconclusive,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Authentic => "Authentic",
            Self::Suspicious => "Suspicious",
            Self::Counterfeit => "Counterfeit",
            Self::Inconclusive => "Inconclusive",
        }
    }

    /// Case-insensitive match against the known labels.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        [
            Self::Authentic,
            Self::Suspicious,
            Self::Counterfeit,
            Self::Inconclusive,
        ]
        .into_iter()
        .find(|v| v.label().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A feature comparison with every field guaranteed present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureComparison {
    #[serde(rename = "match")]
    pub matched: bool,
    pub status: String,
    pub reason: String,
}

/// All per-feature comparisons, each guaranteed present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureComparisons {
    pub color: FeatureComparison,
    pub shape: FeatureComparison,
    pub imprint: FeatureComparison,
    pub packaging: FeatureComparison,
}

/// Forensic verdict with every sub-field defaulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedForensicResult {
    pub score: u32,
    pub verdict: Verdict,
    pub imprint: String,
    pub sources: Vec<String>,
    pub comparison: FeatureComparisons,
    pub detailed: Vec<String>,
}

/// Strict classification of a resolved remote response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// No usable data accompanies the error.
    Fatal { info: NormalizedMedicineInfo },

    /// Valid data, optionally with a non-fatal warning.
    SuccessOrWarning {
        info: NormalizedMedicineInfo,
        forensic: NormalizedForensicResult,
        warning: Option<String>,
    },
}

/// Output of the reconciler: the classified outcome plus identifiers
/// generated locally for every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledScan {
    pub scan_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub outcome: ScanOutcome,
}

// =============================================================================
// Session history
// =============================================================================

/// Summary of one terminal session, kept for history and export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanRecord {
    pub scan_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub image: String,
    pub verdict: Option<Verdict>,
    pub score: Option<u32>,
    pub error: Option<String>,
    pub warning: Option<String>,
}

// =============================================================================
// Session root
// =============================================================================

/// The mutable root of a scan session. Lives for the whole process and is
/// mutated only by `app::scan::ScanStateMachine`.
#[derive(Debug, Clone, Default)]
pub struct ScanSession {
    pub state: ScanState,
    pub current_image: Option<EncodedImage>,
    pub steps: Vec<AnalysisStep>,
    pub medicine_info: Option<NormalizedMedicineInfo>,
    pub forensic_result: Option<NormalizedForensicResult>,
    pub error: Option<String>,
    pub warning: Option<String>,
    pub scan_id: Option<Uuid>,
    pub scanned_at: Option<DateTime<Utc>>,
}

impl ScanSession {
    /// Drop everything produced by the previous session. The state is left
    /// for the caller to set.
    pub fn clear_outcome(&mut self) {
        self.current_image = None;
        self.steps.clear();
        self.medicine_info = None;
        self.forensic_result = None;
        self.error = None;
        self.warning = None;
        self.scan_id = None;
        self.scanned_at = None;
    }
}

// =============================================================================
// Progress messages (pipeline task -> state machine)
// =============================================================================

/// Messages sent from the analysis task to the state machine.
#[derive(Debug)]
pub enum ScanProgress {
    /// Stage `index` became the in-progress stage.
    StepStarted { index: usize },

    /// Stage `index` finished its dwell.
    StepCompleted { index: usize },

    /// The remote call resolved and the final stage dwell elapsed.
    Finished {
        outcome: Result<UnifiedAnalysisResult, AnalysisError>,
    },
}
