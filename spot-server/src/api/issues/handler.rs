//! Issue API Handlers

use axum::{
    Json,
    extract::{Multipart, Path, State},
};
use shared::error::{ApiResponse, AppError, AppResult, ErrorCode};
use shared::models::{
    Issue, IssueCreate, IssueStatus, IssueSummary, IssueTrack, IssueType, OtpSendRequest, OtpSent,
    Role, StatusUpdate, SubmissionReceipt, VerifyClosure,
};

use super::form::Form;
use crate::auth::CurrentUser;
use crate::error::{CoreError, CoreResult};
use crate::lifecycle::TransitionExtra;
use crate::media::Upload;
use crate::state::ServerState;

/// Run a blocking core call (redb, argon2) off the async workers
async fn blocking<T, F>(f: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> CoreResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::internal(format!("Worker task failed: {e}")))?
        .map_err(AppError::from)
}

async fn store_image(state: &ServerState, upload: Upload) -> AppResult<String> {
    let media = state.media.clone();
    tokio::task::spawn_blocking(move || media.store(&upload))
        .await
        .map_err(|e| AppError::internal(format!("Worker task failed: {e}")))?
        .map_err(AppError::from)
}

fn required_image(form: &mut Form, field: &str) -> AppResult<Upload> {
    form.take_file(field).ok_or_else(|| {
        AppError::with_message(ErrorCode::NoFileProvided, format!("Field '{field}' is required"))
    })
}

/// POST /api/issues - authenticated submission
pub async fn create(
    State(state): State<ServerState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<ApiResponse<SubmissionReceipt>> {
    user.require_role(&[Role::Citizen, Role::Admin])?;
    let mut form = Form::read(multipart).await?;
    let upload = required_image(&mut form, "issueImage")?;

    let mut payload = IssueCreate {
        issue_type: form.text("issueType").map(IssueType::parse_lenient),
        title: form.text("title").unwrap_or_default().to_string(),
        description: form.text("description").unwrap_or_default().to_string(),
        lat: form.coordinate("lat"),
        lng: form.coordinate("lng"),
        zone: form.text("zone").unwrap_or_default().to_string(),
        issue_image_ref: None,
        client_request_id: form.text("clientRequestId").map(str::to_string),
    };

    let reference = store_image(&state, upload).await?;
    payload.issue_image_ref = Some(reference.clone());

    let lifecycle = state.lifecycle.clone();
    let reporter_id = user.id.clone();
    let result = blocking(move || lifecycle.create(payload, &reporter_id)).await;

    match result {
        Ok(issue) => {
            // A replayed request keeps the image of the first call
            if issue.issue_image_ref != reference {
                state.media.remove(&reference);
            }
            Ok(ApiResponse::success(SubmissionReceipt {
                ticket_id: issue.ticket_id,
                status: issue.status,
            }))
        }
        Err(e) => {
            state.media.remove(&reference);
            Err(e)
        }
    }
}

/// POST /api/issues/otp-send - anonymous step one, email a code
pub async fn otp_send(
    State(state): State<ServerState>,
    Json(request): Json<OtpSendRequest>,
) -> AppResult<ApiResponse<OtpSent>> {
    let (sent, warnings) = state.intake.start(request.into()).await?;
    Ok(ApiResponse::success(sent).with_warnings(warnings))
}

/// POST /api/issues/anonymous - anonymous step two, verify the code and create
pub async fn anonymous(
    State(state): State<ServerState>,
    multipart: Multipart,
) -> AppResult<ApiResponse<SubmissionReceipt>> {
    let mut form = Form::read(multipart).await?;
    let session_id = form.required("sessionId")?.to_string();
    let code = form.required("code")?.to_string();
    // Checked before the session is consumed so the reporter can retry
    let upload = required_image(&mut form, "issueImage")?;

    let reference = store_image(&state, upload).await?;
    match state
        .intake
        .finalize(&session_id, &code, reference.clone())
        .await
    {
        Ok((receipt, warnings)) => Ok(ApiResponse::success(receipt).with_warnings(warnings)),
        Err(e) => {
            state.media.remove(&reference);
            Err(e.into())
        }
    }
}

/// GET /api/issues/my-reports
pub async fn my_reports(
    State(state): State<ServerState>,
    user: CurrentUser,
) -> AppResult<ApiResponse<Vec<IssueSummary>>> {
    user.require_role(&[Role::Citizen])?;
    let lifecycle = state.lifecycle.clone();
    let reports = blocking(move || lifecycle.my_reports(&user.id)).await?;
    Ok(ApiResponse::success(reports))
}

/// GET /api/issues/track/{ticket_id} - public status lookup
pub async fn track(
    State(state): State<ServerState>,
    Path(ticket_id): Path<String>,
) -> AppResult<ApiResponse<IssueTrack>> {
    let lifecycle = state.lifecycle.clone();
    let issue = blocking(move || lifecycle.get(&ticket_id)).await?;
    Ok(ApiResponse::success(IssueTrack::from(&issue)))
}

/// PUT /api/issues/{ticket_id}/status
pub async fn update_status(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(ticket_id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> AppResult<ApiResponse<Issue>> {
    let actor = user.act_as(&[Role::Authority, Role::Admin])?;
    let to: IssueStatus = update.status.parse().map_err(CoreError::validation)?;

    let lifecycle = state.lifecycle.clone();
    let extra = TransitionExtra {
        resolution_image_ref: None,
        resolution_notes: update.resolution_notes,
    };
    let issue = blocking(move || lifecycle.transition(&ticket_id, &actor, to, extra)).await?;
    Ok(ApiResponse::success(issue))
}

/// PUT /api/issues/{ticket_id}/resolve - resolution photo, then await the reporter
pub async fn resolve(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(ticket_id): Path<String>,
    multipart: Multipart,
) -> AppResult<ApiResponse<Issue>> {
    let actor = user.act_as(&[Role::Authority, Role::Admin])?;
    let mut form = Form::read(multipart).await?;
    let notes = form.text("resolutionNotes").map(str::to_string);

    // Admins may resolve without a photo; the lifecycle enforces it for authorities
    let reference = match form.take_file("resolutionImage") {
        Some(upload) => Some(store_image(&state, upload).await?),
        None => None,
    };

    let lifecycle = state.lifecycle.clone();
    let extra = TransitionExtra {
        resolution_image_ref: reference.clone(),
        resolution_notes: notes,
    };
    let result = blocking(move || {
        lifecycle.transition(&ticket_id, &actor, IssueStatus::AwaitingVerification, extra)
    })
    .await;

    match (&result, &reference) {
        (Ok(issue), Some(r)) if issue.resolution_image_ref.as_ref() != Some(r) => {
            state.media.remove(r)
        }
        (Err(_), Some(r)) => state.media.remove(r),
        _ => {}
    }
    Ok(ApiResponse::success(result?))
}

/// PUT /api/issues/{ticket_id}/verify - reporter confirms closure
pub async fn verify(
    State(state): State<ServerState>,
    Path(ticket_id): Path<String>,
    Json(body): Json<VerifyClosure>,
) -> AppResult<ApiResponse<IssueTrack>> {
    let lifecycle = state.lifecycle.clone();
    let issue = blocking(move || lifecycle.verify_and_close(&ticket_id, &body.email)).await?;
    Ok(ApiResponse::success(IssueTrack::from(&issue)))
}

/// GET /api/issues/authority/dashboard - issues of the caller's zone
pub async fn dashboard(
    State(state): State<ServerState>,
    user: CurrentUser,
) -> AppResult<ApiResponse<Vec<Issue>>> {
    user.require_role(&[Role::Authority])?;
    let zone = user.zone.unwrap_or_default();
    let lifecycle = state.lifecycle.clone();
    let issues = blocking(move || lifecycle.zone_dashboard(&zone)).await?;
    Ok(ApiResponse::success(issues))
}

/// GET /api/issues - every issue (admin)
pub async fn list_all(
    State(state): State<ServerState>,
    user: CurrentUser,
) -> AppResult<ApiResponse<Vec<Issue>>> {
    user.require_role(&[Role::Admin])?;
    let lifecycle = state.lifecycle.clone();
    let issues = blocking(move || lifecycle.list_all()).await?;
    Ok(ApiResponse::success(issues))
}
