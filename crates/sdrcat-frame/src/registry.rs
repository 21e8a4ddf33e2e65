use serde::Serialize;

use crate::section::{Element, Enumeration};
use crate::types::{Disposition, PROTOCOL_VERSION};

/// Negotiated capabilities of one link, keyed by id and by name.
///
/// Owned by exactly one coordinator. The device side builds it with
/// [`append`](Self::append); the client side replaces it wholesale from a
/// received enumeration. Lookups return the first match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    protocol_version: u8,
    elements: Vec<Element>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            elements: Vec::new(),
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.name == name)
    }

    pub fn find_by_id(&self, id: u16) -> Option<&Element> {
        self.elements.iter().find(|e| e.element_id == id)
    }

    /// Look up `id` and keep it only if its disposition passes `accept`.
    pub fn resolve_id(&self, id: u16, accept: impl Fn(Disposition) -> bool) -> Option<&Element> {
        self.find_by_id(id).filter(|e| accept(e.disposition))
    }

    /// Look up `name` and keep it only if its disposition passes `accept`.
    pub fn resolve_name(
        &self,
        name: &str,
        accept: impl Fn(Disposition) -> bool,
    ) -> Option<&Element> {
        self.find_by_name(name).filter(|e| accept(e.disposition))
    }

    pub fn append(&mut self, element: Element) {
        self.elements.push(element);
    }

    /// Forget every element and fall back to the local protocol version.
    pub fn clear(&mut self) {
        self.elements.clear();
        self.protocol_version = PROTOCOL_VERSION;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn protocol_version(&self) -> u8 {
        self.protocol_version
    }

    /// The wire section describing this registry.
    pub fn to_enumeration(&self) -> Enumeration {
        Enumeration {
            protocol_version: self.protocol_version,
            elements: self.elements.clone(),
        }
    }

    /// Snapshot for applications.
    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            protocol_version: self.protocol_version,
            elements: self.elements.clone(),
        }
    }
}

impl From<Enumeration> for Registry {
    fn from(enumeration: Enumeration) -> Self {
        Self {
            protocol_version: enumeration.protocol_version,
            elements: enumeration.elements,
        }
    }
}

/// What a client learned about a device from its enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub protocol_version: u8,
    pub elements: Vec<Element>,
}

impl DeviceInfo {
    pub fn element(&self, name: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.name == name)
    }

    /// Elements with the given disposition, in enumeration order.
    pub fn by_disposition(&self, disposition: Disposition) -> impl Iterator<Item = &Element> {
        self.elements
            .iter()
            .filter(move |e| e.disposition == disposition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    fn sample() -> Registry {
        let mut registry = Registry::new();
        registry.append(Element::new(
            1024,
            Disposition::EditableProperty,
            DataType::Uint32,
            "x",
        ));
        registry.append(Element::new(
            1025,
            Disposition::ReadonlyProperty,
            DataType::Utf8,
            "name",
        ));
        registry.append(Element::new(
            1026,
            Disposition::Metadata,
            DataType::Uint32,
            "sequence",
        ));
        registry
    }

    #[test]
    fn lookup_by_name_and_id() {
        let registry = sample();
        assert_eq!(registry.find_by_name("name").map(|e| e.element_id), Some(1025));
        assert_eq!(
            registry.find_by_id(1026).map(|e| e.name.as_str()),
            Some("sequence")
        );
        assert!(registry.find_by_name("missing").is_none());
        assert!(registry.find_by_id(1).is_none());
    }

    #[test]
    fn first_definition_wins() {
        let mut registry = sample();
        registry.append(Element::new(2000, Disposition::Metadata, DataType::Raw, "x"));
        assert_eq!(registry.find_by_name("x").map(|e| e.element_id), Some(1024));
    }

    #[test]
    fn resolve_checks_disposition() {
        let registry = sample();
        assert!(registry.resolve_id(1025, Disposition::is_readable).is_some());
        assert!(registry.resolve_id(1025, Disposition::is_writable).is_none());
        assert!(registry
            .resolve_name("sequence", |d| d == Disposition::Metadata)
            .is_some());
        assert!(registry.resolve_name("x", |d| d == Disposition::Metadata).is_none());
    }

    #[test]
    fn clear_and_len() {
        let mut registry = sample();
        assert_eq!(registry.len(), 3);
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.find_by_id(1024).is_none());
    }

    #[test]
    fn cleared_registry_matches_new() {
        let mut registry = Registry::from(Enumeration {
            protocol_version: 3,
            elements: vec![Element::new(1024, Disposition::Metadata, DataType::Uint8, "m")],
        });
        assert_eq!(registry.protocol_version(), 3);
        registry.clear();
        assert_eq!(registry, Registry::new());
        assert_eq!(registry.protocol_version(), PROTOCOL_VERSION);
    }

    #[test]
    fn enumeration_conversion_preserves_order() {
        let registry = sample();
        let enumeration = registry.to_enumeration();
        assert_eq!(enumeration.protocol_version, PROTOCOL_VERSION);
        let names: Vec<_> = enumeration.elements.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["x", "name", "sequence"]);
        assert_eq!(Registry::from(enumeration), registry);
    }

    #[test]
    fn device_info_snapshot() {
        let info = sample().device_info();
        assert_eq!(info.element("x").map(|e| e.data_type), Some(DataType::Uint32));
        assert_eq!(info.by_disposition(Disposition::Metadata).count(), 1);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["elements"][0]["name"], "x");
        assert_eq!(json["elements"][0]["disposition"], "editable_property");
        assert_eq!(json["elements"][0]["data_type"], "uint32");
    }
}
