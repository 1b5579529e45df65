//! Direct light control.

use meshlink_core::{Destination, ModelId, UnicastAddress};
use meshlink_store::Store;

use crate::capability::Capability;
use crate::context::MeshContext;
use crate::error::{ControlError, Result};
use crate::transport::{MeshMessage, Transport};

/// Lowest color temperature in kelvin.
pub const MIN_KELVIN: u16 = 800;
/// Highest color temperature in kelvin.
pub const MAX_KELVIN: u16 = 20_000;

/// Percent (clamped to 100) to a 16-bit level.
#[must_use]
pub fn percent_to_level(percent: u8) -> u16 {
    let percent = u32::from(percent.min(100));
    u16::try_from(percent * 65_535 / 100).unwrap_or(u16::MAX)
}

/// 16-bit level to percent.
#[must_use]
pub fn level_to_percent(level: u16) -> u8 {
    u8::try_from(u32::from(level) * 100 / 65_535).unwrap_or(100)
}

/// Percent of the temperature range to kelvin.
#[must_use]
pub fn percent_to_kelvin(percent: u8) -> u16 {
    let span = u32::from(MAX_KELVIN - MIN_KELVIN);
    let offset = span * u32::from(percent.min(100)) / 100;
    MIN_KELVIN + u16::try_from(offset).unwrap_or(MAX_KELVIN - MIN_KELVIN)
}

/// Kelvin to percent of the temperature range, clamped to the range.
#[must_use]
pub fn kelvin_to_percent(kelvin: u16) -> u8 {
    let kelvin = kelvin.clamp(MIN_KELVIN, MAX_KELVIN);
    let span = u32::from(MAX_KELVIN - MIN_KELVIN);
    u8::try_from(u32::from(kelvin - MIN_KELVIN) * 100 / span).unwrap_or(100)
}

/// Hue in degrees (clamped to 360) to a 16-bit value.
#[must_use]
pub fn degrees_to_hue(degrees: u16) -> u16 {
    let degrees = u32::from(degrees.min(360));
    u16::try_from(degrees * 65_535 / 360).unwrap_or(u16::MAX)
}

/// Signed percent (clamped to +/-100) to a generic level delta.
#[must_use]
pub fn percent_to_delta(percent: i8) -> i32 {
    i32::from(percent.clamp(-100, 100)) * 65_535 / 100
}

fn element_for<S: Store, T: Transport>(
    ctx: &MeshContext<S, T>,
    address: UnicastAddress,
    capability: Capability,
) -> Result<UnicastAddress> {
    let node = ctx
        .registry
        .find(address)
        .ok_or(ControlError::DeviceNotFound(address))?;
    let model: ModelId = capability.into();
    node.composition
        .as_ref()
        .and_then(|cps| crate::capability::resolve(address, cps, model))
        .ok_or(ControlError::NotResolvable { address, model })
}

/// The element behind `capability` if it can also be ramped through the
/// generic level model.
fn level_element_for<S: Store, T: Transport>(
    ctx: &MeshContext<S, T>,
    address: UnicastAddress,
    capability: Capability,
) -> Result<UnicastAddress> {
    let node = ctx
        .registry
        .find(address)
        .ok_or(ControlError::DeviceNotFound(address))?;
    let model: ModelId = capability.into();
    let (element, has_level) = node
        .composition
        .as_ref()
        .and_then(|cps| crate::capability::resolve_with_level(address, cps, model))
        .ok_or(ControlError::NotResolvable { address, model })?;
    if has_level {
        Ok(element)
    } else {
        Err(ControlError::NotResolvable {
            address,
            model: ModelId::GENERIC_LEVEL_SERVER,
        })
    }
}

fn dispatch<S: Store, T: Transport>(ctx: &MeshContext<S, T>, message: MeshMessage) -> Result<()> {
    let label = format!("{message:?}");
    if ctx.transport.send(message) {
        Ok(())
    } else {
        tracing::warn!(message = %label, "Light command not dispatched");
        Err(ControlError::DispatchFailed(label))
    }
}

/// Switch a destination on or off.
///
/// Without autonomous status reporting the command is acknowledged and waits
/// for one reply per online node.
///
/// # Errors
///
/// Returns `ControlError::DispatchFailed` if the transport declined.
pub fn set_on_off<S: Store, T: Transport>(
    ctx: &MeshContext<S, T>,
    destination: Destination,
    on: bool,
) -> Result<()> {
    let ack = !ctx.config.online_status_enabled;
    let rsp_max = if ack {
        ctx.registry.online_nodes().count()
    } else {
        0
    };
    tracing::debug!(destination = %destination, on, rsp_max, "On/off");
    dispatch(
        ctx,
        MeshMessage::OnOffSet {
            destination,
            on,
            ack,
            rsp_max,
        },
    )
}

/// Switch every node on.
///
/// # Errors
///
/// Returns `ControlError::DispatchFailed` if the transport declined.
pub fn set_all_on<S: Store, T: Transport>(ctx: &MeshContext<S, T>) -> Result<()> {
    set_on_off(ctx, Destination::AllNodes, true)
}

/// Switch every node off.
///
/// # Errors
///
/// Returns `ControlError::DispatchFailed` if the transport declined.
pub fn set_all_off<S: Store, T: Transport>(ctx: &MeshContext<S, T>) -> Result<()> {
    set_on_off(ctx, Destination::AllNodes, false)
}

/// Set a node's lightness in percent.
///
/// # Errors
///
/// Returns `DeviceNotFound`, `NotResolvable` or `DispatchFailed`.
pub fn set_lightness<S: Store, T: Transport>(
    ctx: &MeshContext<S, T>,
    address: UnicastAddress,
    percent: u8,
) -> Result<()> {
    let element = element_for(ctx, address, Capability::Lightness)?;
    dispatch(
        ctx,
        MeshMessage::LightnessSet {
            element,
            lightness: percent_to_level(percent),
        },
    )
}

/// Set a node's color temperature in percent of the supported range.
///
/// # Errors
///
/// Returns `DeviceNotFound`, `NotResolvable` or `DispatchFailed`.
pub fn set_temperature<S: Store, T: Transport>(
    ctx: &MeshContext<S, T>,
    address: UnicastAddress,
    percent: u8,
) -> Result<()> {
    let element = element_for(ctx, address, Capability::ColorTemperature)?;
    dispatch(
        ctx,
        MeshMessage::CtlTemperatureSet {
            element,
            kelvin: percent_to_kelvin(percent),
        },
    )
}

/// Move a node's lightness or color temperature by a signed percent of its
/// range through the generic level server on the same element.
///
/// # Errors
///
/// Returns `DeviceNotFound`, `NotResolvable` when the element has no level
/// server, or `DispatchFailed`.
pub fn step_level<S: Store, T: Transport>(
    ctx: &MeshContext<S, T>,
    address: UnicastAddress,
    capability: Capability,
    delta_percent: i8,
) -> Result<()> {
    let element = level_element_for(ctx, address, capability)?;
    dispatch(
        ctx,
        MeshMessage::LevelDelta {
            element,
            delta: percent_to_delta(delta_percent),
        },
    )
}

/// Set a node's color from hue degrees and saturation/lightness percent.
///
/// # Errors
///
/// Returns `DeviceNotFound`, `NotResolvable` or `DispatchFailed`.
pub fn set_hsl<S: Store, T: Transport>(
    ctx: &MeshContext<S, T>,
    address: UnicastAddress,
    hue: u16,
    saturation: u8,
    lightness: u8,
) -> Result<()> {
    let element = element_for(ctx, address, Capability::Color)?;
    dispatch(
        ctx,
        MeshMessage::HslSet {
            element,
            hue: degrees_to_hue(hue),
            saturation: percent_to_level(saturation),
            lightness: percent_to_level(lightness),
        },
    )
}
