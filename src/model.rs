use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Opaque job identifier handed out by the rendering service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Gif,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 2] = [OutputFormat::Mp4, OutputFormat::Gif];

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Gif => "gif",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output dimensions: one of the named presets, or explicit width/height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "720p")]
    P720,
    #[default]
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "4k")]
    K4,
    #[serde(rename = "custom")]
    Custom,
}

impl Resolution {
    pub const ALL: [Resolution; 4] = [
        Resolution::P720,
        Resolution::P1080,
        Resolution::K4,
        Resolution::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::P720 => "720p",
            Resolution::P1080 => "1080p",
            Resolution::K4 => "4k",
            Resolution::Custom => "custom",
        }
    }

    pub fn is_custom(self) -> bool {
        matches!(self, Resolution::Custom)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated render request. Only `FormState::build` produces one, so `width` and
/// `height` are both `Some` (and at least `MIN_CUSTOM_DIMENSION`) exactly when
/// `resolution` is `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderConfiguration {
    pub repo_path: String,
    pub branch: Option<String>,
    pub format: OutputFormat,
    pub resolution: Resolution,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub fps: u32,
    pub bg_color: String,
    pub text_color: String,
    pub font_size: u32,
    pub no_email: bool,
}

/// Job lifecycle status as reported by the service.
///
/// Anything the client does not recognise is kept verbatim in `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Unknown(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Unknown(s) => s,
        }
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => JobStatus::Pending,
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Unknown(s),
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time payload returned by one status poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusSnapshot {
    pub status: JobStatus,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub has_output: bool,
}

/// One entry of the service's job history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(alias = "job_id")]
    pub id: JobId,
    #[serde(default)]
    pub repo_path: String,
    #[serde(default)]
    pub format: String,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "epoch_seconds")]
    pub created_at: i64,
    #[serde(default)]
    pub has_output: bool,
}

// The service stamps jobs with a float epoch; only whole seconds are displayed.
fn epoch_seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Ok(secs.floor() as i64)
}

/// One selectable branch. `value == None` is the "use the server default" sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchOption {
    pub label: String,
    pub value: Option<String>,
}

/// Branch selector contents; the sentinel entry is always first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchList {
    options: Vec<BranchOption>,
}

impl BranchList {
    pub const SENTINEL_LABEL: &'static str = "Current branch";

    /// Sentinel followed by `names` in the order given.
    pub fn from_names(names: Vec<String>) -> Self {
        let mut options = Vec::with_capacity(names.len() + 1);
        options.push(Self::sentinel());
        options.extend(names.into_iter().map(|name| BranchOption {
            label: name.clone(),
            value: Some(name),
        }));
        Self { options }
    }

    fn sentinel() -> BranchOption {
        BranchOption {
            label: Self::SENTINEL_LABEL.to_string(),
            value: None,
        }
    }

    pub fn options(&self) -> &[BranchOption] {
        &self.options
    }

    /// Number of real branches, excluding the sentinel.
    pub fn branch_count(&self) -> usize {
        self.options.len() - 1
    }

    pub fn position_of(&self, value: &str) -> Option<usize> {
        if value.is_empty() {
            return Some(0);
        }
        self.options
            .iter()
            .position(|o| o.value.as_deref() == Some(value))
    }
}

impl Default for BranchList {
    fn default() -> Self {
        Self {
            options: vec![Self::sentinel()],
        }
    }
}

/// A rendered still frame returned by the preview endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewImage {
    pub bytes: Vec<u8>,
    pub format: image::ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl PreviewImage {
    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("img")
    }
}

/// State of a clickable control (submit button, branch loader).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ControlState {
    #[default]
    Ready,
    /// Disabled, showing the given label.
    Busy(String),
}

impl ControlState {
    pub fn busy(label: impl Into<String>) -> Self {
        ControlState::Busy(label.into())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ControlState::Ready)
    }
}

/// Visual bucket a job status collapses into in the history list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusBucket {
    Success,
    Failure,
    Running,
}

impl StatusBucket {
    pub fn for_status(status: &JobStatus) -> Self {
        match status {
            JobStatus::Completed => StatusBucket::Success,
            JobStatus::Failed => StatusBucket::Failure,
            _ => StatusBucket::Running,
        }
    }
}

/// One rendered line of the history list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HistoryRow {
    Placeholder,
    Entry(HistoryEntry),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub job_id: JobId,
    pub created: String,
    pub repo_path: String,
    pub format: String,
    pub status: String,
    pub bucket: StatusBucket,
    pub progress: u32,
    pub message: String,
    pub error: Option<String>,
    pub downloadable: bool,
}

/// Detail line under the progress bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusDetail {
    Processing,
    Ready,
    Failed(String),
}

impl StatusDetail {
    pub fn to_message(&self) -> String {
        match self {
            StatusDetail::Processing => "Processing... This may take a few minutes.".into(),
            StatusDetail::Ready => "Your time-lapse is ready!".into(),
            StatusDetail::Failed(err) => format!("Error: {err}"),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StatusDetail::Failed(_))
    }
}

/// Events emitted by the controllers and folded into the view by presentation layers.
#[derive(Debug, Clone)]
pub enum UiEvent {
    /// Blocking notification the user has to acknowledge.
    Alert { title: String, message: String },
    /// Transient status-bar message.
    Info(String),
    SubmitControl(ControlState),
    BranchControl(ControlState),
    BranchesLoaded(BranchList),
    /// A new job became the active one; resets the status area.
    JobStarted { job_id: JobId },
    JobProgress {
        job_id: JobId,
        progress: u32,
        message: String,
    },
    JobProcessing { job_id: JobId },
    JobCompleted { job_id: JobId },
    JobFailed { job_id: JobId, error: String },
    PreviewLoading,
    PreviewReady {
        path: PathBuf,
        format: image::ImageFormat,
        width: u32,
        height: u32,
        bytes: usize,
    },
    PreviewHidden,
    HistoryRendered(Vec<HistoryRow>),
    Downloaded { job_id: JobId, path: PathBuf, bytes: u64 },
}

impl UiEvent {
    pub fn alert(title: impl Into<String>, message: impl Into<String>) -> Self {
        UiEvent::Alert {
            title: title.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_list_keeps_sentinel_first_and_server_order() {
        let list = BranchList::from_names(vec!["zeta".into(), "alpha".into(), "main".into()]);
        let labels: Vec<_> = list.options().iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, ["Current branch", "zeta", "alpha", "main"]);
        assert_eq!(list.options()[0].value, None);
        assert_eq!(list.branch_count(), 3);
    }

    #[test]
    fn empty_branch_list_is_just_the_sentinel() {
        let list = BranchList::from_names(Vec::new());
        assert_eq!(list, BranchList::default());
        assert_eq!(list.position_of(""), Some(0));
        assert_eq!(list.position_of("main"), None);
    }

    #[test]
    fn unknown_status_strings_are_preserved() {
        let snap: JobStatusSnapshot =
            serde_json::from_str(r#"{"status":"queued","progress":3,"message":"wait"}"#).unwrap();
        assert_eq!(snap.status, JobStatus::Unknown("queued".into()));
        assert_eq!(snap.status.to_string(), "queued");
        assert_eq!(StatusBucket::for_status(&snap.status), StatusBucket::Running);
    }

    #[test]
    fn job_record_accepts_float_timestamps() {
        let rec: JobRecord = serde_json::from_str(
            r#"{"id":"1700000000_0","repo_path":"/r","format":"gif","status":"completed",
                "progress":100,"message":"done","error":null,"created_at":1700000000.75,
                "has_output":true}"#,
        )
        .unwrap();
        assert_eq!(rec.created_at, 1_700_000_000);
        assert_eq!(rec.id.as_str(), "1700000000_0");
        assert!(rec.has_output);
    }

    #[test]
    fn configuration_omits_dimensions_for_presets() {
        let cfg = RenderConfiguration {
            repo_path: "/repo".into(),
            branch: None,
            format: OutputFormat::Mp4,
            resolution: Resolution::P720,
            width: None,
            height: None,
            fps: 30,
            bg_color: "#141618".into(),
            text_color: "#FFFFFF".into(),
            font_size: 15,
            no_email: false,
        };
        let v = serde_json::to_value(&cfg).unwrap();
        assert_eq!(v["resolution"], "720p");
        assert_eq!(v["format"], "mp4");
        assert!(v["branch"].is_null());
        assert!(v.get("width").is_none());
        assert!(v.get("height").is_none());
    }
}
