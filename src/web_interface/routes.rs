use std::convert::Infallible;

use log::{debug, error, warn};
use warp::http::StatusCode;
use warp::ws::Ws;
use warp::{reply, Filter, Rejection, Reply};

use super::types::{
    ApiError, ChallengeRequest, ChallengeRespondRequest, ChallengeRespondResponse, Identity,
    LaunchRequest, LaunchResponse, MatchStatusRequest, MessageResponse, QueueJoinRequest,
    QueueJoinResponse, QueueStatusResponse, WebState,
};
use crate::container_management::types::Launch;
use crate::error_handling::types::{ChallengeError, ContainerError, MatchError, QueueError};
use crate::matchmaking::types::{JoinOutcome, Preference};
use crate::terminal_bridge;
use crate::terminal_bridge::bridge::TerminalParams;

fn with_state(
    state: WebState,
) -> impl Filter<Extract = (WebState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Caller identity from the upstream identity proxy headers. A missing
/// or malformed `x-user-id` rejects the request before any handler
/// runs.
fn identity() -> impl Filter<Extract = (Identity,), Error = Rejection> + Clone {
    warp::header::<i64>("x-user-id")
        .and(warp::header::optional::<String>("x-admin"))
        .map(|user_id, admin: Option<String>| Identity {
            user_id,
            is_admin: admin
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
}

fn json_error(status: StatusCode, message: impl Into<String>) -> warp::reply::Response {
    reply::with_status(
        reply::json(&ApiError {
            message: message.into(),
        }),
        status,
    )
    .into_response()
}

fn launch_response(launch: &Launch, status: StatusCode) -> warp::reply::Response {
    reply::with_status(
        reply::json(&LaunchResponse {
            session_id: launch.session.id,
            token: launch.session.token.clone(),
            container_id: launch.container.as_ref().map(|c| c.id.clone()),
            simulated_mode: launch.simulated,
        }),
        status,
    )
    .into_response()
}

/// POST /api/sandbox/launch
pub fn launch_route(
    state: WebState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "sandbox" / "launch")
        .and(warp::post())
        .and(identity())
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(handle_launch)
}

async fn handle_launch(
    caller: Identity,
    request: LaunchRequest,
    state: WebState,
) -> Result<warp::reply::Response, Rejection> {
    // Reconnect semantics: an existing live lab session is returned
    // instead of provisioning a duplicate container.
    if let Some(existing) = state.sessions.active_session_for(caller.user_id, 0).await {
        debug!(
            "User {} reuses active lab session {}",
            caller.user_id, existing.id
        );
        let response = LaunchResponse {
            session_id: existing.id,
            token: existing.token.clone(),
            container_id: existing
                .has_container()
                .then(|| existing.container_id.clone()),
            simulated_mode: !existing.has_container(),
        };
        return Ok(reply::with_status(reply::json(&response), StatusCode::OK).into_response());
    }

    let image = request
        .image
        .unwrap_or_else(|| state.default_image.clone());
    let launch = state
        .containers
        .launch(&image, caller.user_id, 0)
        .await;
    Ok(launch_response(&launch, StatusCode::CREATED))
}

/// POST /api/sandbox/connect/:container_id
pub fn connect_route(
    state: WebState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "sandbox" / "connect" / String)
        .and(warp::post())
        .and(identity())
        .and(with_state(state))
        .and_then(handle_connect)
}

async fn handle_connect(
    container_id: String,
    caller: Identity,
    state: WebState,
) -> Result<warp::reply::Response, Rejection> {
    let record = match state.containers.get_record(&container_id).await {
        Some(record) => record,
        None => return Ok(json_error(StatusCode::NOT_FOUND, "Container not found")),
    };

    if !caller.is_admin && record.owner.user_id != caller.user_id {
        return Ok(json_error(
            StatusCode::FORBIDDEN,
            "You do not have access to this container",
        ));
    }

    match state
        .containers
        .connect_existing(&container_id, caller.user_id)
        .await
    {
        Ok(launch) => Ok(launch_response(&launch, StatusCode::OK)),
        Err(ContainerError::NotRunning(status)) => Ok(json_error(
            StatusCode::BAD_REQUEST,
            format!("Container is not running (status: {})", status),
        )),
        Err(ContainerError::UnknownContainer(_)) => {
            Ok(json_error(StatusCode::NOT_FOUND, "Container not found"))
        }
        Err(e) => {
            error!("Connect to container {} failed: {}", container_id, e);
            Ok(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to connect to container",
            ))
        }
    }
}

/// POST /api/sandbox/sessions/:id/close
pub fn close_session_route(
    state: WebState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "sandbox" / "sessions" / i64 / "close")
        .and(warp::post())
        .and(identity())
        .and(with_state(state))
        .and_then(handle_close_session)
}

async fn handle_close_session(
    session_id: i64,
    caller: Identity,
    state: WebState,
) -> Result<warp::reply::Response, Rejection> {
    let session = match state.sessions.get(session_id).await {
        Some(session) => session,
        None => return Ok(json_error(StatusCode::NOT_FOUND, "Session not found")),
    };
    if session.user_id != caller.user_id && !caller.is_admin {
        return Ok(json_error(
            StatusCode::FORBIDDEN,
            "You do not have permission to close this session",
        ));
    }

    // Best-effort container teardown; the stop cascade also invalidates
    // the session. Closing again afterwards is harmless.
    if session.has_container() {
        state.containers.stop_container(&session.container_id).await;
    }
    state.sessions.close(session_id).await;

    Ok(reply::with_status(
        reply::json(&MessageResponse {
            message: "Session closed successfully".to_string(),
        }),
        StatusCode::OK,
    )
    .into_response())
}

/// GET /api/sandbox/containers (admin)
pub fn list_containers_route(
    state: WebState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "sandbox" / "containers")
        .and(warp::get())
        .and(identity())
        .and(with_state(state))
        .and_then(handle_list_containers)
}

async fn handle_list_containers(
    caller: Identity,
    state: WebState,
) -> Result<warp::reply::Response, Rejection> {
    if !caller.is_admin {
        return Ok(json_error(StatusCode::FORBIDDEN, "Admin access required"));
    }
    let containers = match state.containers.list_owned(true).await {
        Ok(list) => list,
        Err(e) => {
            warn!("Container enumeration failed: {}", e);
            Vec::new()
        }
    };
    Ok(reply::with_status(reply::json(&containers), StatusCode::OK).into_response())
}

/// GET /api/sandbox/my-containers
pub fn my_containers_route(
    state: WebState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "sandbox" / "my-containers")
        .and(warp::get())
        .and(identity())
        .and(with_state(state))
        .and_then(handle_my_containers)
}

async fn handle_my_containers(
    caller: Identity,
    state: WebState,
) -> Result<warp::reply::Response, Rejection> {
    let containers = match state.containers.list_owned(true).await {
        Ok(list) => list,
        Err(e) => {
            warn!("Container enumeration failed: {}", e);
            Vec::new()
        }
    };
    let mine: Vec<_> = containers
        .into_iter()
        .filter(|c| c.owner.user_id == caller.user_id)
        .collect();
    Ok(reply::with_status(reply::json(&mine), StatusCode::OK).into_response())
}

/// GET /api/sandbox/terminal (WebSocket)
///
/// Credentials travel as query parameters; validation happens inside
/// the bridge so an invalid pair is answered with a policy-violation
/// close frame rather than an HTTP error.
pub fn terminal_route(
    state: WebState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "sandbox" / "terminal")
        .and(warp::ws())
        .and(warp::query::<TerminalParams>())
        .and(with_state(state))
        .map(|ws: Ws, params: TerminalParams, state: WebState| {
            ws.on_upgrade(move |socket| {
                terminal_bridge::bridge::handle_connection(
                    socket,
                    params,
                    state.sessions.clone(),
                    state.containers.clone(),
                )
            })
        })
}

/// GET /api/duels/terminal/active
///
/// Hands a duel participant the credentials of the terminal session
/// minted for them during match provisioning, so a reconnecting client
/// resumes instead of spawning duplicates.
pub fn duel_terminal_route(
    state: WebState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "duels" / "terminal" / "active")
        .and(warp::get())
        .and(identity())
        .and(with_state(state))
        .and_then(handle_duel_terminal)
}

async fn handle_duel_terminal(
    caller: Identity,
    state: WebState,
) -> Result<warp::reply::Response, Rejection> {
    let (_, active) = match state.duels.queue_status(caller.user_id).await {
        Ok(status) => status,
        Err(e) => {
            error!("Active match lookup failed for user {}: {}", caller.user_id, e);
            return Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "Server error"));
        }
    };
    let duel_match = match active {
        Some(m) => m,
        None => return Ok(json_error(StatusCode::NOT_FOUND, "No active match")),
    };

    match state
        .sessions
        .active_session_for(caller.user_id, duel_match.id)
        .await
    {
        Some(session) => {
            let response = LaunchResponse {
                session_id: session.id,
                token: session.token.clone(),
                container_id: session
                    .has_container()
                    .then(|| session.container_id.clone()),
                simulated_mode: !session.has_container(),
            };
            Ok(reply::with_status(reply::json(&response), StatusCode::OK).into_response())
        }
        None => Ok(json_error(
            StatusCode::NOT_FOUND,
            "No active terminal session for this match",
        )),
    }
}

/// POST /api/duels/queue/join
pub fn queue_join_route(
    state: WebState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "duels" / "queue" / "join")
        .and(warp::post())
        .and(identity())
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(handle_queue_join)
}

async fn handle_queue_join(
    caller: Identity,
    request: QueueJoinRequest,
    state: WebState,
) -> Result<warp::reply::Response, Rejection> {
    let prefs = crate::matchmaking::types::QueuePreferences {
        difficulty: request.preferred_difficulty.unwrap_or_default(),
        challenge_type: request.preferred_challenge_type.unwrap_or_default(),
    };

    match state.duels.join_queue(caller.user_id, prefs).await {
        Ok(JoinOutcome::Matched(duel_match)) => Ok(reply::with_status(
            reply::json(&QueueJoinResponse {
                message: "Match found!".to_string(),
                duel_match: Some(duel_match),
                queue_entry: None,
            }),
            StatusCode::CREATED,
        )
        .into_response()),
        Ok(JoinOutcome::Queued(entry)) => Ok(reply::with_status(
            reply::json(&QueueJoinResponse {
                message: "Added to queue".to_string(),
                duel_match: None,
                queue_entry: Some(entry),
            }),
            StatusCode::OK,
        )
        .into_response()),
        Err(QueueError::AlreadyQueued) => Ok(json_error(
            StatusCode::BAD_REQUEST,
            "You are already in the queue",
        )),
        Err(QueueError::AlreadyInMatch(match_id)) => Ok(json_error(
            StatusCode::BAD_REQUEST,
            format!("You are already in an active duel match ({})", match_id),
        )),
        Err(QueueError::StorageError(e)) => {
            error!("Queue join failed for user {}: {}", caller.user_id, e);
            Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "Server error"))
        }
    }
}

/// POST /api/duels/queue/leave
pub fn queue_leave_route(
    state: WebState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "duels" / "queue" / "leave")
        .and(warp::post())
        .and(identity())
        .and(with_state(state))
        .and_then(handle_queue_leave)
}

async fn handle_queue_leave(
    caller: Identity,
    state: WebState,
) -> Result<warp::reply::Response, Rejection> {
    if state.duels.leave_queue(caller.user_id).await {
        Ok(reply::with_status(
            reply::json(&MessageResponse {
                message: "Removed from queue".to_string(),
            }),
            StatusCode::OK,
        )
        .into_response())
    } else {
        Ok(json_error(StatusCode::BAD_REQUEST, "You are not in the queue"))
    }
}

/// GET /api/duels/queue/status
pub fn queue_status_route(
    state: WebState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "duels" / "queue" / "status")
        .and(warp::get())
        .and(identity())
        .and(with_state(state))
        .and_then(handle_queue_status)
}

async fn handle_queue_status(
    caller: Identity,
    state: WebState,
) -> Result<warp::reply::Response, Rejection> {
    match state.duels.queue_status(caller.user_id).await {
        Ok((in_queue, active_match)) => Ok(reply::with_status(
            reply::json(&QueueStatusResponse {
                in_queue,
                active_match,
            }),
            StatusCode::OK,
        )
        .into_response()),
        Err(e) => {
            error!("Queue status failed for user {}: {}", caller.user_id, e);
            Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "Server error"))
        }
    }
}

/// POST /api/duels/challenge
pub fn challenge_route(
    state: WebState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "duels" / "challenge")
        .and(warp::post())
        .and(identity())
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(handle_challenge)
}

async fn handle_challenge(
    caller: Identity,
    request: ChallengeRequest,
    state: WebState,
) -> Result<warp::reply::Response, Rejection> {
    let difficulty = request.difficulty.unwrap_or_else(Preference::any);
    match state
        .duels
        .create_challenge(caller.user_id, request.challenged_id, difficulty)
        .await
    {
        Ok(challenge) => {
            Ok(reply::with_status(reply::json(&challenge), StatusCode::CREATED).into_response())
        }
        Err(ChallengeError::SelfChallenge) => Ok(json_error(
            StatusCode::BAD_REQUEST,
            "You cannot challenge yourself",
        )),
        Err(ChallengeError::AlreadyPending(id)) => Ok(json_error(
            StatusCode::BAD_REQUEST,
            format!("There is already a pending challenge between you two ({})", id),
        )),
        Err(e) => {
            error!("Challenge creation failed: {}", e);
            Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "Server error"))
        }
    }
}

/// PUT /api/duels/challenge/:id/respond
pub fn challenge_respond_route(
    state: WebState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "duels" / "challenge" / i64 / "respond")
        .and(warp::put())
        .and(identity())
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(handle_challenge_respond)
}

async fn handle_challenge_respond(
    challenge_id: i64,
    caller: Identity,
    request: ChallengeRespondRequest,
    state: WebState,
) -> Result<warp::reply::Response, Rejection> {
    match state
        .duels
        .respond_challenge(challenge_id, caller.user_id, request.accept)
        .await
    {
        Ok((challenge, duel_match)) => Ok(reply::with_status(
            reply::json(&ChallengeRespondResponse {
                challenge,
                duel_match,
            }),
            StatusCode::OK,
        )
        .into_response()),
        Err(ChallengeError::NotFound(_)) => {
            Ok(json_error(StatusCode::NOT_FOUND, "Challenge not found"))
        }
        Err(ChallengeError::NotAddressee) => Ok(json_error(
            StatusCode::FORBIDDEN,
            "This challenge is not for you",
        )),
        Err(ChallengeError::AlreadyResponded(status)) => Ok(json_error(
            StatusCode::BAD_REQUEST,
            format!("This challenge has already been responded to (status: {})", status),
        )),
        Err(ChallengeError::Expired) => {
            Ok(json_error(StatusCode::BAD_REQUEST, "This challenge has expired"))
        }
        Err(e) => {
            error!("Challenge response failed: {}", e);
            Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "Server error"))
        }
    }
}

/// GET /api/duels/challenges
pub fn challenges_route(
    state: WebState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "duels" / "challenges")
        .and(warp::get())
        .and(identity())
        .and(with_state(state))
        .and_then(handle_challenges)
}

async fn handle_challenges(
    caller: Identity,
    state: WebState,
) -> Result<warp::reply::Response, Rejection> {
    match state.duels.challenges_for(caller.user_id).await {
        Ok(list) => Ok(reply::with_status(reply::json(&list), StatusCode::OK).into_response()),
        Err(e) => {
            error!("Challenge listing failed: {}", e);
            Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "Server error"))
        }
    }
}

/// GET /api/duels/matches
pub fn matches_route(
    state: WebState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "duels" / "matches")
        .and(warp::get())
        .and(identity())
        .and(with_state(state))
        .and_then(handle_matches)
}

async fn handle_matches(
    caller: Identity,
    state: WebState,
) -> Result<warp::reply::Response, Rejection> {
    match state.duels.matches_for(caller.user_id).await {
        Ok(list) => Ok(reply::with_status(reply::json(&list), StatusCode::OK).into_response()),
        Err(e) => {
            error!("Match listing failed: {}", e);
            Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "Server error"))
        }
    }
}

/// GET /api/duels/matches/:id
pub fn match_route(
    state: WebState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "duels" / "matches" / i64)
        .and(warp::get())
        .and(identity())
        .and(with_state(state))
        .and_then(handle_match)
}

async fn handle_match(
    match_id: i64,
    caller: Identity,
    state: WebState,
) -> Result<warp::reply::Response, Rejection> {
    match state.duels.get_match(match_id).await {
        Ok(Some(duel_match)) => {
            if !duel_match.is_participant(caller.user_id) && !caller.is_admin {
                return Ok(json_error(
                    StatusCode::FORBIDDEN,
                    "You are not part of this match",
                ));
            }
            Ok(reply::with_status(reply::json(&duel_match), StatusCode::OK).into_response())
        }
        Ok(None) => Ok(json_error(StatusCode::NOT_FOUND, "Match not found")),
        Err(e) => {
            error!("Match lookup failed: {}", e);
            Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "Server error"))
        }
    }
}

/// POST /api/duels/match/cancel
pub fn match_cancel_route(
    state: WebState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "duels" / "match" / "cancel")
        .and(warp::post())
        .and(identity())
        .and(with_state(state))
        .and_then(handle_match_cancel)
}

async fn handle_match_cancel(
    caller: Identity,
    state: WebState,
) -> Result<warp::reply::Response, Rejection> {
    match state.duels.cancel_active(caller.user_id).await {
        Ok(duel_match) => Ok(reply::with_status(
            reply::json(&duel_match),
            StatusCode::OK,
        )
        .into_response()),
        Err(MatchError::NoActiveMatch) => Ok(json_error(
            StatusCode::BAD_REQUEST,
            "You don't have an active match to cancel",
        )),
        Err(MatchError::NotCancellable(status)) => Ok(json_error(
            StatusCode::BAD_REQUEST,
            format!("Match cannot be cancelled in its current state ({})", status),
        )),
        Err(e) => {
            error!("Match cancel failed for user {}: {}", caller.user_id, e);
            Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "Server error"))
        }
    }
}

/// PUT /api/duels/matches/:id/status (admin)
pub fn match_status_route(
    state: WebState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "duels" / "matches" / i64 / "status")
        .and(warp::put())
        .and(identity())
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(handle_match_status)
}

async fn handle_match_status(
    match_id: i64,
    caller: Identity,
    request: MatchStatusRequest,
    state: WebState,
) -> Result<warp::reply::Response, Rejection> {
    if !caller.is_admin {
        return Ok(json_error(StatusCode::FORBIDDEN, "Admin access required"));
    }

    match state
        .duels
        .admin_override(match_id, request.status, request.winner_id, request.score_change)
        .await
    {
        Ok(duel_match) => {
            Ok(reply::with_status(reply::json(&duel_match), StatusCode::OK).into_response())
        }
        Err(MatchError::NotFound(_)) => Ok(json_error(StatusCode::NOT_FOUND, "Match not found")),
        Err(MatchError::InvalidWinner) => Ok(json_error(
            StatusCode::BAD_REQUEST,
            "Winner must be one of the match players",
        )),
        Err(MatchError::WrongState(status)) => Ok(json_error(
            StatusCode::BAD_REQUEST,
            format!("Match state {} does not allow this transition", status),
        )),
        Err(MatchError::NotCancellable(status)) => Ok(json_error(
            StatusCode::BAD_REQUEST,
            format!("Match cannot be cancelled in its current state ({})", status),
        )),
        Err(e) => {
            error!("Admin status override failed for match {}: {}", match_id, e);
            Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "Server error"))
        }
    }
}

/// Maps filter rejections onto the JSON error shape used everywhere
/// else.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    if err.is_not_found() {
        return Ok(json_error(StatusCode::NOT_FOUND, "Not found"));
    }
    if let Some(missing) = err.find::<warp::reject::MissingHeader>() {
        if missing.name() == "x-user-id" {
            return Ok(json_error(
                StatusCode::UNAUTHORIZED,
                "Authentication required",
            ));
        }
        return Ok(json_error(
            StatusCode::BAD_REQUEST,
            format!("Missing header: {}", missing.name()),
        ));
    }
    if err.find::<warp::reject::InvalidHeader>().is_some() {
        return Ok(json_error(StatusCode::UNAUTHORIZED, "Authentication required"));
    }
    if err.find::<warp::body::BodyDeserializeError>().is_some()
        || err.find::<warp::reject::InvalidQuery>().is_some()
    {
        return Ok(json_error(StatusCode::BAD_REQUEST, "Invalid input"));
    }
    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(json_error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"));
    }
    error!("Unhandled rejection: {:?}", err);
    Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "Server error"))
}
