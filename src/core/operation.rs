//! Operation Emulator
//!
//! GCP models every mutation as a long-running operation. The emulator has
//! nothing to provision, so operations are created and finished in the same
//! call; callers that poll get a DONE record straight away.

use chrono::{DateTime, SecondsFormat, Utc};

use super::error::ErrorEnvelope;
use super::ids::IdGenerator;
use super::store::Resource;

/// Type of operation being performed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationType {
    Insert,
    Delete,
    Patch,
    Update,
    Resize,
    SetLabels,
    Start,
    Stop,
    Other(String),
}

impl OperationType {
    pub fn from_method(method: &str) -> Self {
        match method {
            "insert" => Self::Insert,
            "delete" => Self::Delete,
            "patch" => Self::Patch,
            "update" => Self::Update,
            "resize" => Self::Resize,
            "setLabels" => Self::SetLabels,
            "start" => Self::Start,
            "stop" => Self::Stop,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire name (`operationType`)
    pub fn as_str(&self) -> &str {
        match self {
            Self::Insert => "insert",
            Self::Delete => "delete",
            Self::Patch => "patch",
            Self::Update => "update",
            Self::Resize => "resize",
            Self::SetLabels => "setLabels",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    Running,
    Done,
}

impl OperationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Done => "DONE",
        }
    }
}

/// Where an operation lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationScope {
    Global,
    Region(String),
    Zone(String),
}

impl OperationScope {
    /// Relative path segment (`global`, `regions/r`, `zones/z`)
    pub fn path(&self) -> String {
        match self {
            Self::Global => "global".to_string(),
            Self::Region(region) => format!("regions/{}", region),
            Self::Zone(zone) => format!("zones/{}", zone),
        }
    }
}

/// Inputs besides the type and target
#[derive(Debug, Clone)]
pub struct OperationParams {
    pub project: String,
    pub scope: OperationScope,
    /// Numeric id of the target resource
    pub target_id: Option<String>,
    pub user: Option<String>,
}

/// Emulated long-running operation
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub id: String,
    pub name: String,
    pub operation_type: OperationType,
    /// Canonical relative path of the affected resource
    pub target_link: String,
    pub target_id: Option<String>,
    pub status: OperationStatus,
    pub progress: u8,
    pub user: Option<String>,
    pub project: String,
    pub scope: OperationScope,
    pub insert_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<ErrorEnvelope>,
    path: String,
}

impl Resource for Operation {
    const KIND: &'static str = "compute-operations";

    fn key(&self) -> &str {
        &self.path
    }
}

impl Operation {
    /// New PENDING operation
    pub fn pending(
        ids: &mut IdGenerator,
        operation_type: OperationType,
        resource_link: &str,
        params: OperationParams,
    ) -> Self {
        let now = Utc::now();
        let name = format!(
            "operation-{}-{}-{}",
            now.timestamp_millis(),
            ids.hex_token(13),
            ids.hex_token(8)
        );
        let path = format!(
            "projects/{}/{}/operations/{}",
            params.project,
            params.scope.path(),
            name
        );

        Self {
            id: ids.generate("operation"),
            name,
            operation_type,
            target_link: resource_link.to_string(),
            target_id: params.target_id,
            status: OperationStatus::Pending,
            progress: 0,
            user: params.user,
            project: params.project,
            scope: params.scope,
            insert_time: now,
            start_time: None,
            end_time: None,
            error: None,
            path,
        }
    }

    pub fn start(&mut self) {
        self.status = OperationStatus::Running;
        self.start_time = Some(Utc::now());
    }

    /// Mark DONE. Unstarted operations get a start time too.
    pub fn finish(&mut self) {
        let now = Utc::now();
        self.start_time.get_or_insert(now);
        self.end_time = Some(now);
        self.status = OperationStatus::Done;
        self.progress = 100;
    }

    /// Mark DONE with an error attached
    pub fn fail(&mut self, error: ErrorEnvelope) {
        self.error = Some(error);
        self.finish();
    }

    pub fn is_done(&self) -> bool {
        self.status == OperationStatus::Done
    }

    /// Relative path of the operation itself
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// RFC 3339 timestamp with millisecond precision, as GCP renders them
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// Create an operation that is already DONE
pub fn make_operation(
    ids: &mut IdGenerator,
    operation_type: OperationType,
    resource_link: &str,
    params: OperationParams,
) -> Operation {
    let mut op = Operation::pending(ids, operation_type, resource_link, params);
    op.start();
    op.finish();
    op
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Dialect;

    fn params(scope: OperationScope) -> OperationParams {
        OperationParams {
            project: "demo".to_string(),
            scope,
            target_id: Some("123".to_string()),
            user: None,
        }
    }

    #[test]
    fn test_make_operation_is_done() {
        let mut ids = IdGenerator::seeded(Dialect::Gcp, 1);
        let link = "projects/demo/zones/us-central1-a/disks/data";
        let op = make_operation(
            &mut ids,
            OperationType::Insert,
            link,
            params(OperationScope::Zone("us-central1-a".into())),
        );

        assert!(op.is_done());
        assert_eq!(op.progress, 100);
        assert_eq!(op.target_link, link);
        assert!(op.error.is_none());
        assert!(op.end_time.is_some());
        assert!(op
            .key()
            .starts_with("projects/demo/zones/us-central1-a/operations/operation-"));
    }

    #[test]
    fn test_fail_attaches_error() {
        let mut ids = IdGenerator::seeded(Dialect::Gcp, 2);
        let mut op = Operation::pending(
            &mut ids,
            OperationType::Delete,
            "projects/demo/global/networks/default",
            params(OperationScope::Global),
        );
        assert_eq!(op.status, OperationStatus::Pending);

        op.fail(ErrorEnvelope::precondition(Dialect::Gcp, "in use"));
        assert!(op.is_done());
        assert_eq!(op.error.as_ref().map(|e| e.code.as_str()), Some("FAILED_PRECONDITION"));
    }

    #[test]
    fn test_operation_type_round_trip() {
        for method in ["insert", "delete", "patch", "resize", "setLabels", "start", "stop"] {
            assert_eq!(OperationType::from_method(method).as_str(), method);
        }
        assert_eq!(OperationType::from_method("attachDisk").as_str(), "attachDisk");
    }

    #[test]
    fn test_scope_paths() {
        assert_eq!(OperationScope::Global.path(), "global");
        assert_eq!(OperationScope::Region("us-east1".into()).path(), "regions/us-east1");
    }
}
