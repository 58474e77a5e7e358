use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::http::api::ApiState;
use crate::lifecycle::LifecycleState;
use crate::services::agent::CreateDispatchRequest;
use crate::services::ingress::CreateIngressRequest;
use crate::services::rooms::CreateRoomRequest;
use crate::services::sip::CreateTrunkRequest;
use crate::services::ServiceError;

type ApiResult<T> = Result<T, ServiceError>;

pub async fn health(State(state): State<ApiState>) -> Response {
    match state.lifecycle.get() {
        LifecycleState::Running => (StatusCode::OK, "OK").into_response(),
        other => (StatusCode::SERVICE_UNAVAILABLE, other.to_string()).into_response(),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Features {
    pub egress: bool,
    pub ingress: bool,
    pub sip: bool,
    pub agents: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node_id: String,
    pub region: String,
    pub mode: String,
    pub state: String,
    pub rooms: u32,
    pub features: Features,
}

pub async fn healthz(State(state): State<ApiState>) -> Json<NodeStatus> {
    let node = state.router.local_node();
    Json(NodeStatus {
        node_id: node.id,
        region: node.region,
        mode: state.mode.to_string(),
        state: state.lifecycle.get().to_string(),
        rooms: node.stats.num_rooms,
        features: Features {
            egress: state.egress.is_available(),
            ingress: state.ingress.is_available(),
            sip: state.sip.is_available(),
            agents: state.agents.is_available(),
        },
    })
}

pub async fn list_nodes(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    let nodes = state.router.list_nodes().await?;
    Ok(Json(nodes))
}

pub async fn list_rooms(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.rooms.list_rooms().await?))
}

pub async fn create_room(
    State(state): State<ApiState>,
    Json(request): Json<CreateRoomRequest>,
) -> ApiResult<impl IntoResponse> {
    let room = state.rooms.create_room(&request).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

pub async fn delete_room(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    state.rooms.delete_room(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct EgressQuery {
    pub room: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StartEgressRequest {
    pub room_name: String,
}

pub async fn list_egress(
    State(state): State<ApiState>,
    Query(query): Query<EgressQuery>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.egress.list_egress(query.room.as_deref()).await?))
}

pub async fn start_egress(
    State(state): State<ApiState>,
    Json(request): Json<StartEgressRequest>,
) -> ApiResult<impl IntoResponse> {
    let info = state.egress.start_room_egress(&request.room_name).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

pub async fn stop_egress(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.egress.stop_egress(&id).await?))
}

pub async fn list_ingress(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.ingress.list_ingress().await?))
}

pub async fn create_ingress(
    State(state): State<ApiState>,
    Json(request): Json<CreateIngressRequest>,
) -> ApiResult<impl IntoResponse> {
    let info = state.ingress.create_ingress(&request).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

pub async fn delete_ingress(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.ingress.delete_ingress(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_trunks(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.sip.list_trunks().await?))
}

pub async fn create_trunk(
    State(state): State<ApiState>,
    Json(request): Json<CreateTrunkRequest>,
) -> ApiResult<impl IntoResponse> {
    let trunk = state.sip.create_trunk(&request).await?;
    Ok((StatusCode::CREATED, Json(trunk)))
}

pub async fn delete_trunk(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.sip.delete_trunk(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_dispatches(
    State(state): State<ApiState>,
    Path(room): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.agents.list_dispatches(&room).await?))
}

pub async fn create_dispatch(
    State(state): State<ApiState>,
    Path(room): Path<String>,
    Json(request): Json<CreateDispatchRequest>,
) -> ApiResult<impl IntoResponse> {
    let dispatch = state.agents.create_dispatch(&room, &request).await?;
    Ok((StatusCode::CREATED, Json(dispatch)))
}

pub async fn delete_dispatch(
    State(state): State<ApiState>,
    Path((room, id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state.agents.delete_dispatch(&room, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
