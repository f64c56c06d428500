//! Issue Model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Issue category chosen by the reporter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Pothole,
    Waste,
    #[serde(other)]
    Other,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pothole => "pothole",
            Self::Waste => "waste",
            Self::Other => "other",
        }
    }

    /// Lenient parse: anything unrecognised is `Other`
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pothole" => Self::Pothole,
            "waste" => Self::Waste,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issue lifecycle status
///
/// Serialized with the display labels the dashboards group by
/// (`"In Progress"`, `"Awaiting Verification"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueStatus {
    Pending,
    #[serde(rename = "In Progress", alias = "InProgress")]
    InProgress,
    #[serde(rename = "Awaiting Verification", alias = "AwaitingVerification")]
    AwaitingVerification,
    Closed,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::AwaitingVerification => "Awaiting Verification",
            Self::Closed => "Closed",
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "inprogress" => Ok(Self::InProgress),
            "awaitingverification" => Ok(Self::AwaitingVerification),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("Unknown issue status: {s}")),
        }
    }
}

/// Geographic point (WGS84 degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

/// Durable issue record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub ticket_id: String,
    pub issue_type: IssueType,
    pub title: String,
    pub description: String,
    pub location: Location,
    pub zone: String,
    pub status: IssueStatus,
    pub reporter_id: String,
    pub assigned_authority: Option<String>,
    pub issue_image_ref: String,
    pub resolution_image_ref: Option<String>,
    pub resolution_notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub resolution_date: Option<i64>,
}

/// Create issue payload
///
/// Coordinates are optional here so that a missing value is reported as a
/// validation error rather than a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCreate {
    pub issue_type: Option<IssueType>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    #[serde(default)]
    pub zone: String,
    pub issue_image_ref: Option<String>,
    /// Caller-chosen idempotency key; a repeat returns the first issue
    #[serde(default)]
    pub client_request_id: Option<String>,
}

/// Status change payload (`PUT issues/:ticketId/status`)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: String,
    #[serde(default)]
    pub resolution_notes: Option<String>,
}

/// Reporter confirmation payload (`PUT issues/:ticketId/verify`)
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyClosure {
    pub email: String,
}

/// Citizen "my reports" row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueSummary {
    pub ticket_id: String,
    pub issue_type: IssueType,
    pub status: IssueStatus,
    /// Creation date, `YYYY-MM-DD` (UTC)
    pub date: String,
    pub description: String,
}

/// Minimal public projection for anonymous tracking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTrack {
    pub ticket_id: String,
    pub status: IssueStatus,
    pub description: String,
    pub reported_at: i64,
}

impl From<&Issue> for IssueTrack {
    fn from(issue: &Issue) -> Self {
        Self {
            ticket_id: issue.ticket_id.clone(),
            status: issue.status,
            description: issue.description.clone(),
            reported_at: issue.created_at,
        }
    }
}

/// Result of a submission: ticket id plus current status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub ticket_id: String,
    pub status: IssueStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_with_display_labels() {
        let json = serde_json::to_string(&IssueStatus::AwaitingVerification).unwrap();
        assert_eq!(json, "\"Awaiting Verification\"");

        let status: IssueStatus = serde_json::from_str("\"In Progress\"").unwrap();
        assert_eq!(status, IssueStatus::InProgress);
        let status: IssueStatus = serde_json::from_str("\"InProgress\"").unwrap();
        assert_eq!(status, IssueStatus::InProgress);
    }

    #[test]
    fn test_status_from_str_is_lenient_on_spacing() {
        assert_eq!(
            "awaiting_verification".parse::<IssueStatus>(),
            Ok(IssueStatus::AwaitingVerification)
        );
        assert_eq!("In Progress".parse::<IssueStatus>(), Ok(IssueStatus::InProgress));
        assert!("reopened".parse::<IssueStatus>().is_err());
    }

    #[test]
    fn test_unknown_issue_type_is_other() {
        let t: IssueType = serde_json::from_str("\"graffiti\"").unwrap();
        assert_eq!(t, IssueType::Other);
        assert_eq!(IssueType::parse_lenient(" Waste "), IssueType::Waste);
    }

    #[test]
    fn test_issue_uses_camel_case() {
        let issue = Issue {
            ticket_id: "P-1".into(),
            issue_type: IssueType::Pothole,
            title: "Hole".into(),
            description: "Deep hole".into(),
            location: Location { lat: 1.0, lng: 2.0 },
            zone: "Central".into(),
            status: IssueStatus::Pending,
            reporter_id: "u1".into(),
            assigned_authority: None,
            issue_image_ref: "uploads/a.jpg".into(),
            resolution_image_ref: None,
            resolution_notes: None,
            created_at: 0,
            updated_at: 0,
            resolution_date: None,
        };
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["ticketId"], "P-1");
        assert_eq!(json["issueImageRef"], "uploads/a.jpg");
        assert!(json["resolutionDate"].is_null());
    }
}
