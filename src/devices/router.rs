use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

use super::{
    entities::{Device, GatewayKind},
    error::DeviceError,
    service::{ConsoleReport, RegisterDeviceRequest},
};
use crate::{
    context::AppContext,
    notifications::entities::{Notification, NotificationRequest, SendOptions},
};

const DEVICES_TAG: &str = "devices";

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListDevicesQuery {
    /// Only list devices with this active flag
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSelection {
    pub registration_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedDevicesResponse {
    pub updated: u64,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    pub registration_ids: Vec<String>,
    pub notification: NotificationRequest,
    #[serde(default)]
    pub options: SendOptions,
    #[serde(default)]
    pub bulk: bool,
}

pub fn router() -> OpenApiRouter<Arc<AppContext>> {
    OpenApiRouter::new()
        .routes(routes!(register_device))
        .routes(routes!(list_devices))
        .routes(routes!(enable_devices))
        .routes(routes!(disable_devices))
        .routes(routes!(send_message))
        .routes(routes!(send_bulk_message))
        .routes(routes!(notify_devices))
}

#[utoipa::path(
    put,
    path = "/",
    request_body = RegisterDeviceRequest,
    responses(
        (status = 200, description = "Device registered", body = Device),
        (status = 400, description = "Bad request"),
        (status = 500, description = "Internal server error")
    ),
    tag = DEVICES_TAG
)]
async fn register_device(
    State(context): State<Arc<AppContext>>,
    Json(request): Json<RegisterDeviceRequest>,
) -> Result<impl IntoResponse, DeviceError> {
    context
        .device_service
        .register_device(request)
        .await
        .map(Json)
}

#[utoipa::path(
    get,
    path = "/{gateway}",
    params(
        ("gateway" = GatewayKind, Path, description = "Gateway the devices are registered with"),
        ListDevicesQuery
    ),
    responses(
        (status = 200, description = "Registered devices", body = Vec<Device>),
        (status = 500, description = "Internal server error")
    ),
    tag = DEVICES_TAG
)]
async fn list_devices(
    State(context): State<Arc<AppContext>>,
    Path(gateway): Path<GatewayKind>,
    Query(query): Query<ListDevicesQuery>,
) -> Result<impl IntoResponse, DeviceError> {
    context
        .device_service
        .list_devices(gateway, query.active)
        .await
        .map(Json)
}

#[utoipa::path(
    post,
    path = "/{gateway}/enable",
    params(("gateway" = GatewayKind, Path, description = "Gateway of the selected devices")),
    request_body = DeviceSelection,
    responses(
        (status = 200, description = "Selected devices enabled", body = UpdatedDevicesResponse),
        (status = 500, description = "Internal server error")
    ),
    tag = DEVICES_TAG
)]
async fn enable_devices(
    State(context): State<Arc<AppContext>>,
    Path(gateway): Path<GatewayKind>,
    Json(selection): Json<DeviceSelection>,
) -> Result<impl IntoResponse, DeviceError> {
    context
        .device_service
        .set_active(gateway, &selection.registration_ids, true)
        .await
        .map(|updated| Json(UpdatedDevicesResponse { updated }))
}

#[utoipa::path(
    post,
    path = "/{gateway}/disable",
    params(("gateway" = GatewayKind, Path, description = "Gateway of the selected devices")),
    request_body = DeviceSelection,
    responses(
        (status = 200, description = "Selected devices disabled", body = UpdatedDevicesResponse),
        (status = 500, description = "Internal server error")
    ),
    tag = DEVICES_TAG
)]
async fn disable_devices(
    State(context): State<Arc<AppContext>>,
    Path(gateway): Path<GatewayKind>,
    Json(selection): Json<DeviceSelection>,
) -> Result<impl IntoResponse, DeviceError> {
    context
        .device_service
        .set_active(gateway, &selection.registration_ids, false)
        .await
        .map(|updated| Json(UpdatedDevicesResponse { updated }))
}

#[utoipa::path(
    post,
    path = "/{gateway}/send",
    params(("gateway" = GatewayKind, Path, description = "Gateway of the selected devices")),
    request_body = DeviceSelection,
    responses(
        (status = 200, description = "Test message sent to each selected device", body = ConsoleReport),
        (status = 503, description = "Gateway not configured"),
        (status = 500, description = "Internal server error")
    ),
    tag = DEVICES_TAG
)]
async fn send_message(
    State(context): State<Arc<AppContext>>,
    Path(gateway): Path<GatewayKind>,
    Json(selection): Json<DeviceSelection>,
) -> Result<impl IntoResponse, DeviceError> {
    context
        .device_service
        .send_test_message(gateway, &selection.registration_ids, false)
        .await
        .map(Json)
}

#[utoipa::path(
    post,
    path = "/{gateway}/send-bulk",
    params(("gateway" = GatewayKind, Path, description = "Gateway of the selected devices")),
    request_body = DeviceSelection,
    responses(
        (status = 200, description = "Test message sent in bulk", body = ConsoleReport),
        (status = 503, description = "Gateway not configured"),
        (status = 500, description = "Internal server error")
    ),
    tag = DEVICES_TAG
)]
async fn send_bulk_message(
    State(context): State<Arc<AppContext>>,
    Path(gateway): Path<GatewayKind>,
    Json(selection): Json<DeviceSelection>,
) -> Result<impl IntoResponse, DeviceError> {
    context
        .device_service
        .send_test_message(gateway, &selection.registration_ids, true)
        .await
        .map(Json)
}

#[utoipa::path(
    post,
    path = "/{gateway}/notify",
    params(("gateway" = GatewayKind, Path, description = "Gateway of the selected devices")),
    request_body = NotifyRequest,
    responses(
        (status = 200, description = "Notification sent", body = ConsoleReport),
        (status = 503, description = "Gateway not configured"),
        (status = 500, description = "Internal server error")
    ),
    tag = DEVICES_TAG
)]
async fn notify_devices(
    State(context): State<Arc<AppContext>>,
    Path(gateway): Path<GatewayKind>,
    Json(request): Json<NotifyRequest>,
) -> Result<impl IntoResponse, DeviceError> {
    let notification = Notification::from(request.notification);
    context
        .device_service
        .notify(
            gateway,
            &request.registration_ids,
            &notification,
            &request.options,
            request.bulk,
        )
        .await
        .map(Json)
}
