//! Capability resolution.
//!
//! Elements of a device are addressed consecutively from its primary unicast
//! address, in the order the composition data declares them. Resolving a
//! capability means finding the first element whose SIG or vendor model list
//! carries the model behind it.

use meshlink_core::{ModelId, UnicastAddress};
use meshlink_store::{CompositionData, Element};

/// A logical feature a caller wants to drive on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Power on/off.
    OnOff,
    /// Lightness level.
    Lightness,
    /// Color temperature.
    ColorTemperature,
    /// Hue/saturation/lightness color.
    Color,
    /// Scene store, delete and recall.
    SceneStorage,
    /// Time publication.
    TimePublication,
    /// Scheduler registers.
    Scheduler,
}

impl Capability {
    /// The model that implements this capability.
    #[must_use]
    pub const fn model_id(self) -> ModelId {
        match self {
            Self::OnOff => ModelId::GENERIC_ON_OFF_SERVER,
            Self::Lightness => ModelId::LIGHT_LIGHTNESS_SERVER,
            Self::ColorTemperature => ModelId::LIGHT_CTL_TEMPERATURE_SERVER,
            Self::Color => ModelId::LIGHT_HSL_SERVER,
            Self::SceneStorage => ModelId::SCENE_SERVER,
            Self::TimePublication => ModelId::TIME_SERVER,
            Self::Scheduler => ModelId::SCHEDULER_SERVER,
        }
    }
}

impl From<Capability> for ModelId {
    fn from(capability: Capability) -> Self {
        capability.model_id()
    }
}

fn element_address(primary: UnicastAddress, index: usize) -> Option<UnicastAddress> {
    u16::try_from(index).ok().and_then(|i| primary.offset(i))
}

/// Address of the first element implementing `model`, or `None`.
///
/// An element whose address would leave the unicast range never matches.
#[must_use]
pub fn resolve(
    primary: UnicastAddress,
    composition: &CompositionData,
    model: impl Into<ModelId>,
) -> Option<UnicastAddress> {
    resolve_element(primary, composition, model.into()).map(|(address, _)| address)
}

/// Like [`resolve`], also reporting whether the matched element exposes the
/// generic level model.
#[must_use]
pub fn resolve_with_level(
    primary: UnicastAddress,
    composition: &CompositionData,
    model: impl Into<ModelId>,
) -> Option<(UnicastAddress, bool)> {
    resolve_element(primary, composition, model.into())
        .map(|(address, element)| (address, element.supports(ModelId::GENERIC_LEVEL_SERVER)))
}

/// Address of every element carrying the generic on/off server.
#[must_use]
pub fn on_off_elements(primary: UnicastAddress, composition: &CompositionData) -> Vec<UnicastAddress> {
    composition
        .elements
        .iter()
        .enumerate()
        .filter(|(_, element)| element.supports(ModelId::GENERIC_ON_OFF_SERVER))
        .filter_map(|(index, _)| element_address(primary, index))
        .collect()
}

fn resolve_element(
    primary: UnicastAddress,
    composition: &CompositionData,
    model: ModelId,
) -> Option<(UnicastAddress, &Element)> {
    let (index, element) = composition
        .elements
        .iter()
        .enumerate()
        .find(|(_, element)| element.supports(model))?;
    element_address(primary, index).map(|address| (address, element))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(raw: u16) -> UnicastAddress {
        UnicastAddress::new(raw).unwrap()
    }

    fn light_composition() -> CompositionData {
        CompositionData::from_elements(vec![
            Element::with_sig_models([ModelId::GENERIC_ON_OFF_SERVER]),
            Element::with_sig_models([
                ModelId::LIGHT_LIGHTNESS_SERVER,
                ModelId::GENERIC_LEVEL_SERVER,
            ]),
        ])
    }

    #[test]
    fn first_match_in_declared_order() {
        let cps = light_composition();
        assert_eq!(
            resolve(addr(0x0100), &cps, Capability::Lightness),
            Some(addr(0x0101))
        );
        assert_eq!(
            resolve(addr(0x0100), &cps, Capability::OnOff),
            Some(addr(0x0100))
        );
    }

    #[test]
    fn duplicate_model_resolves_to_earliest_element() {
        let cps = CompositionData::from_elements(vec![
            Element::with_sig_models([ModelId::SCENE_SERVER]),
            Element::with_sig_models([ModelId::GENERIC_ON_OFF_SERVER]),
            Element::with_sig_models([ModelId::GENERIC_ON_OFF_SERVER]),
        ]);
        assert_eq!(resolve(addr(0x0010), &cps, Capability::OnOff), Some(addr(0x0011)));
        assert_eq!(
            on_off_elements(addr(0x0010), &cps),
            vec![addr(0x0011), addr(0x0012)]
        );
    }

    #[test]
    fn missing_model_is_not_found() {
        let cps = light_composition();
        assert_eq!(resolve(addr(0x0100), &cps, Capability::SceneStorage), None);
        assert_eq!(
            resolve(addr(0x0100), &CompositionData::default(), Capability::OnOff),
            None
        );
    }

    #[test]
    fn vendor_models_are_searched() {
        let vendor = ModelId::vendor(0x0211, 0x0000);
        let cps = CompositionData::from_elements(vec![
            Element::default(),
            Element {
                location: 0,
                sig_models: Vec::new(),
                vendor_models: vec![vendor],
            },
        ]);
        assert_eq!(resolve(addr(0x0002), &cps, vendor), Some(addr(0x0003)));
    }

    #[test]
    fn level_support_reported_for_matched_element() {
        let cps = light_composition();
        assert_eq!(
            resolve_with_level(addr(0x0100), &cps, Capability::Lightness),
            Some((addr(0x0101), true))
        );
        assert_eq!(
            resolve_with_level(addr(0x0100), &cps, Capability::OnOff),
            Some((addr(0x0100), false))
        );
    }

    #[test]
    fn element_past_unicast_range_never_matches() {
        let cps = CompositionData::from_elements(vec![
            Element::default(),
            Element::with_sig_models([ModelId::TIME_SERVER]),
        ]);
        assert_eq!(resolve(addr(0x7FFF), &cps, Capability::TimePublication), None);
    }
}
