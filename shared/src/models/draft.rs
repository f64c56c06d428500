//! Anonymous Submission Draft

use serde::{Deserialize, Serialize};

use super::issue::IssueType;

/// Reporter contact details collected by the anonymous form
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    pub name: Option<String>,
    pub email: String,
    pub mobile: Option<String>,
}

/// Pending anonymous report awaiting one-time-code confirmation
///
/// Holds everything except the image (sent with the confirmation) and the
/// zone (assigned by the server).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnonymousDraft {
    pub contact: ContactInfo,
    pub issue_type: IssueType,
    pub title: Option<String>,
    pub description: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Wire form of `POST issues/otp-send`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpSendRequest {
    #[serde(default)]
    pub reporter_name: Option<String>,
    #[serde(default)]
    pub reporter_email: String,
    #[serde(default)]
    pub reporter_mobile: Option<String>,
    #[serde(default)]
    pub issue_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl From<OtpSendRequest> for AnonymousDraft {
    fn from(req: OtpSendRequest) -> Self {
        Self {
            contact: ContactInfo {
                name: req.reporter_name,
                email: req.reporter_email.trim().to_lowercase(),
                mobile: req.reporter_mobile,
            },
            issue_type: req
                .issue_type
                .as_deref()
                .map(IssueType::parse_lenient)
                .unwrap_or(IssueType::Other),
            title: req.title,
            description: req.description,
            lat: req.lat,
            lng: req.lng,
        }
    }
}

/// Response of `POST issues/otp-send`; the code itself is never returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpSent {
    pub session_id: String,
    pub expires_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_request_normalizes_email_and_type() {
        let req: OtpSendRequest = serde_json::from_str(
            r#"{"reporterEmail":"  A@X.com ","issueType":"Pothole","description":"hole","lat":1.5,"lng":2.5}"#,
        )
        .unwrap();
        let draft = AnonymousDraft::from(req);
        assert_eq!(draft.contact.email, "a@x.com");
        assert_eq!(draft.issue_type, IssueType::Pothole);
        assert_eq!(draft.lat, Some(1.5));
        assert!(draft.title.is_none());
    }
}
