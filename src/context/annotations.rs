//! Annotation fields added to outgoing payloads

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::{DeviceInfo, SDK_VERSION};
use crate::types::{DimensionSlot, EventCategory, SdkError};

use super::SessionContext;

fn device_fields(out: &mut Map<String, Value>, device: &DeviceInfo) {
    out.insert("sdk_version".into(), SDK_VERSION.into());
    out.insert("os_version".into(), device.os_version.clone().into());
    out.insert("manufacturer".into(), device.manufacturer.clone().into());
    out.insert("device".into(), device.device.clone().into());
    out.insert("platform".into(), device.platform.clone().into());
    if let Some(engine) = &device.engine_version {
        out.insert("engine_version".into(), engine.clone().into());
    }
}

fn external_user_id(out: &mut Map<String, Value>, ctx: &SessionContext) {
    if let Some(id) = &ctx.external_user_id {
        out.insert("external_user_id".into(), id.clone().into());
    }
}

/// Shared fields for every queued event; `client_ts` is the adjusted time
pub fn event_annotations(
    ctx: &SessionContext,
    device: &DeviceInfo,
    client_ts: i64,
) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert("v".into(), 2.into());
    out.insert("event_uuid".into(), Uuid::new_v4().to_string().into());
    out.insert("user_id".into(), ctx.user_id.clone().into());
    out.insert("client_ts".into(), client_ts.into());
    device_fields(&mut out, device);
    external_user_id(&mut out, ctx);

    if let Some(session_id) = &ctx.session_id {
        out.insert("session_id".into(), session_id.clone().into());
    }
    out.insert("session_num".into(), ctx.session_num.into());
    if !ctx.build.is_empty() {
        out.insert("build".into(), ctx.build.clone().into());
    }

    for slot in DimensionSlot::ALL {
        if let Some(value) = ctx.custom_dimension(slot) {
            out.insert(slot.field_name().into(), value.into());
        }
    }
    if let Some(ab_id) = &ctx.ab_id {
        out.insert("ab_id".into(), ab_id.clone().into());
    }
    if let Some(variant) = &ctx.ab_variant_id {
        out.insert("ab_variant_id".into(), variant.clone().into());
    }

    out
}

/// Body of the init request
pub fn init_annotations(ctx: &SessionContext, device: &DeviceInfo) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert("user_id".into(), ctx.user_id.clone().into());
    device_fields(&mut out, device);
    external_user_id(&mut out, ctx);
    if !ctx.build.is_empty() {
        out.insert("build".into(), ctx.build.clone().into());
    }
    if let Some(session_id) = &ctx.session_id {
        out.insert("session_id".into(), session_id.clone().into());
    }
    out.insert("session_num".into(), ctx.session_num.into());
    out.insert("random_salt".into(), ctx.session_num.into());
    if let Some(hash) = &ctx.configs_hash {
        out.insert("configs_hash".into(), hash.clone().into());
    }
    out
}

/// Payload of an `sdk_error` report
pub fn sdk_error_annotations(
    ctx: &SessionContext,
    device: &DeviceInfo,
    error: &SdkError,
    client_ts: i64,
) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert("v".into(), 2.into());
    out.insert("category".into(), EventCategory::SdkError.as_str().into());
    out.insert("event_uuid".into(), Uuid::new_v4().to_string().into());
    out.insert("user_id".into(), ctx.user_id.clone().into());
    out.insert("client_ts".into(), client_ts.into());
    device_fields(&mut out, device);

    out.insert("error_category".into(), error.category.as_str().into());
    out.insert("error_area".into(), error.area.as_str().into());
    out.insert("error_action".into(), error.action.as_str().into());
    if let Some(parameter) = error.parameter {
        out.insert("error_parameter".into(), parameter.as_str().into());
    }
    if !error.reason.is_empty() {
        out.insert("reason".into(), error.reason.clone().into());
    }
    out
}
