use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warp::Filter;
use warp::http::StatusCode;

use coop_types::{Room, RoomError, RunState, UserProfile};

pub mod config;
pub mod identity;
pub mod rematch;
pub mod room_store;
pub mod websocket;

use identity::IdentityService;
use room_store::RoomStore;
use websocket::ConnectionManager;

#[derive(Deserialize)]
struct GuessRequest {
    room_id: String,
    guess_word: String,
}

#[derive(Deserialize)]
struct RoomActionRequest {
    room_id: String,
}

#[derive(Serialize)]
struct RoomReply {
    room: Room,
}

#[derive(Serialize)]
struct JoinRoomReply {
    room: Room,
    run: Option<RunState>,
}

#[derive(Serialize)]
struct MyRoomReply {
    room: Room,
    run: Option<RunState>,
    current_turn_player_id: Option<Uuid>,
}

pub fn create_routes(
    connections: Arc<ConnectionManager>,
    store: Arc<RoomStore>,
    identity: Arc<IdentityService>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let connections_filter = warp::any().map({
        let connections = connections.clone();
        move || connections.clone()
    });

    let store_filter = warp::any().map({
        let store = store.clone();
        move || store.clone()
    });

    let identity_filter = warp::any().map({
        let identity = identity.clone();
        move || identity.clone()
    });

    let auth_header = warp::header::optional::<String>("authorization");

    // Event channel endpoint
    let websocket_route = warp::path("ws")
        .and(warp::ws())
        .and(connections_filter.clone())
        .and(store_filter.clone())
        .and(identity_filter.clone())
        .map(
            |ws: warp::ws::Ws, connections, store, identity| {
                ws.on_upgrade(move |socket| {
                    websocket::handle_connection(socket, connections, store, identity)
                })
            },
        );

    let health = warp::path("health")
        .and(warp::get())
        .map(|| warp::reply::with_status("OK", StatusCode::OK));

    let create_room = warp::path!("coop" / "create-room")
        .and(warp::post())
        .and(auth_header.clone())
        .and(identity_filter.clone())
        .and(store_filter.clone())
        .and_then(handle_create_room);

    let join_room = warp::path!("coop" / "join-room" / String)
        .and(warp::post())
        .and(auth_header.clone())
        .and(identity_filter.clone())
        .and(store_filter.clone())
        .and(connections_filter.clone())
        .and_then(handle_join_room);

    let room_status = warp::path!("coop" / "room" / String)
        .and(warp::get())
        .and(auth_header.clone())
        .and(identity_filter.clone())
        .and(store_filter.clone())
        .and_then(handle_room_status);

    let my_room = warp::path!("coop" / "my-room")
        .and(warp::get())
        .and(auth_header.clone())
        .and(identity_filter.clone())
        .and(store_filter.clone())
        .and_then(handle_my_room);

    let guess = warp::path!("coop" / "guess")
        .and(warp::post())
        .and(auth_header.clone())
        .and(warp::body::json::<GuessRequest>())
        .and(identity_filter.clone())
        .and(store_filter.clone())
        .and(connections_filter.clone())
        .and_then(handle_guess);

    let abandon = warp::path!("coop" / "abandon")
        .and(warp::post())
        .and(auth_header.clone())
        .and(warp::body::json::<RoomActionRequest>())
        .and(identity_filter.clone())
        .and(store_filter.clone())
        .and(connections_filter.clone())
        .and_then(handle_abandon);

    let leave_room = warp::path!("coop" / "leave-room")
        .and(warp::post())
        .and(auth_header.clone())
        .and(warp::body::json::<RoomActionRequest>())
        .and(identity_filter.clone())
        .and(store_filter.clone())
        .and(connections_filter.clone())
        .and_then(handle_leave_room);

    let force_leave = warp::path!("coop" / "force-leave")
        .and(warp::post())
        .and(auth_header)
        .and(identity_filter)
        .and(store_filter)
        .and(connections_filter)
        .and_then(handle_force_leave);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type", "authorization"])
        .allow_methods(vec!["GET", "POST"]);

    websocket_route
        .or(health)
        .or(create_room)
        .or(join_room)
        .or(room_status)
        .or(my_room)
        .or(guess)
        .or(abandon)
        .or(leave_room)
        .or(force_leave)
        .with(cors)
        .with(warp::log("coop_server"))
}

type JsonReply = warp::reply::WithStatus<warp::reply::Json>;

/// Resolve the caller's identity or produce the 401 the handler replies
/// with. Identity issuance lives elsewhere; a missing header is simply an
/// unauthenticated request.
fn authorize(
    auth_header: Option<String>,
    identity: &IdentityService,
) -> Result<UserProfile, JsonReply> {
    let header = auth_header.ok_or_else(|| {
        error_reply(StatusCode::UNAUTHORIZED, "Authentication required")
    })?;
    let token = header.strip_prefix("Bearer ").unwrap_or(&header);

    identity
        .validate_token(token)
        .map_err(|_| error_reply(StatusCode::UNAUTHORIZED, "Invalid identity token"))
}

fn error_reply(status: StatusCode, message: &str) -> JsonReply {
    warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "error": message })),
        status,
    )
}

fn room_error_reply(err: &RoomError) -> JsonReply {
    let status = match err {
        RoomError::RoomNotFound { .. } => StatusCode::NOT_FOUND,
        RoomError::RoomFull { .. }
        | RoomError::AlreadyInRoom { .. }
        | RoomError::NotYourTurn
        | RoomError::RoomNotActive => StatusCode::CONFLICT,
        RoomError::InvalidWordLength { .. } | RoomError::WordNotAllowed { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        RoomError::EvaluatorUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    };
    error_reply(status, &err.to_string())
}

fn ok_json<T: Serialize>(value: &T) -> JsonReply {
    warp::reply::with_status(warp::reply::json(value), StatusCode::OK)
}

async fn handle_create_room(
    auth_header: Option<String>,
    identity: Arc<IdentityService>,
    store: Arc<RoomStore>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let user = match authorize(auth_header, &identity) {
        Ok(user) => user,
        Err(reply) => return Ok(reply),
    };

    match store.create_room(&user).await {
        Ok(room) => Ok(ok_json(&RoomReply { room })),
        Err(err) => Ok(room_error_reply(&err)),
    }
}

async fn handle_join_room(
    room_id: String,
    auth_header: Option<String>,
    identity: Arc<IdentityService>,
    store: Arc<RoomStore>,
    connections: Arc<ConnectionManager>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let user = match authorize(auth_header, &identity) {
        Ok(user) => user,
        Err(reply) => return Ok(reply),
    };

    match store.join_room(&room_id, &user).await {
        Ok(report) => {
            connections.deliver(&room_id, report.events).await;
            Ok(ok_json(&JoinRoomReply {
                room: report.room,
                run: report.run,
            }))
        }
        Err(err) => Ok(room_error_reply(&err)),
    }
}

async fn handle_room_status(
    room_id: String,
    auth_header: Option<String>,
    identity: Arc<IdentityService>,
    store: Arc<RoomStore>,
) -> Result<impl warp::Reply, warp::Rejection> {
    if let Err(reply) = authorize(auth_header, &identity) {
        return Ok(reply);
    }

    match store.room_status(&room_id).await {
        Ok(room) => Ok(ok_json(&RoomReply { room })),
        Err(err) => Ok(room_error_reply(&err)),
    }
}

async fn handle_my_room(
    auth_header: Option<String>,
    identity: Arc<IdentityService>,
    store: Arc<RoomStore>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let user = match authorize(auth_header, &identity) {
        Ok(user) => user,
        Err(reply) => return Ok(reply),
    };

    match store.find_room_for_user(user.id).await {
        Some(view) => Ok(ok_json(&MyRoomReply {
            room: view.room,
            run: view.run,
            current_turn_player_id: view.current_turn_player_id,
        })),
        None => Ok(error_reply(StatusCode::NOT_FOUND, "No active room")),
    }
}

async fn handle_guess(
    auth_header: Option<String>,
    request: GuessRequest,
    identity: Arc<IdentityService>,
    store: Arc<RoomStore>,
    connections: Arc<ConnectionManager>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let user = match authorize(auth_header, &identity) {
        Ok(user) => user,
        Err(reply) => return Ok(reply),
    };

    match store
        .submit_guess(&request.room_id, user.id, &request.guess_word)
        .await
    {
        Ok(report) => {
            connections.deliver(&request.room_id, report.events).await;
            Ok(ok_json(&report.run))
        }
        Err(err) => Ok(room_error_reply(&err)),
    }
}

async fn handle_abandon(
    auth_header: Option<String>,
    request: RoomActionRequest,
    identity: Arc<IdentityService>,
    store: Arc<RoomStore>,
    connections: Arc<ConnectionManager>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let user = match authorize(auth_header, &identity) {
        Ok(user) => user,
        Err(reply) => return Ok(reply),
    };

    match store.abandon(&request.room_id, user.id).await {
        Ok(report) => {
            connections.deliver(&request.room_id, report.events).await;
            Ok(ok_json(&serde_json::json!({})))
        }
        Err(err) => Ok(room_error_reply(&err)),
    }
}

async fn handle_leave_room(
    auth_header: Option<String>,
    request: RoomActionRequest,
    identity: Arc<IdentityService>,
    store: Arc<RoomStore>,
    connections: Arc<ConnectionManager>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let user = match authorize(auth_header, &identity) {
        Ok(user) => user,
        Err(reply) => return Ok(reply),
    };

    match store.leave_room(&request.room_id, user.id).await {
        Ok(report) => {
            connections.deliver(&request.room_id, report.events).await;
            Ok(ok_json(&serde_json::json!({})))
        }
        Err(err) => Ok(room_error_reply(&err)),
    }
}

async fn handle_force_leave(
    auth_header: Option<String>,
    identity: Arc<IdentityService>,
    store: Arc<RoomStore>,
    connections: Arc<ConnectionManager>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let user = match authorize(auth_header, &identity) {
        Ok(user) => user,
        Err(reply) => return Ok(reply),
    };

    match store.force_leave(user.id).await {
        Ok(Some(report)) => {
            connections.deliver(&report.room_id, report.events).await;
            Ok(ok_json(&serde_json::json!({})))
        }
        Ok(None) => Ok(ok_json(&serde_json::json!({}))),
        Err(err) => Ok(room_error_reply(&err)),
    }
}
