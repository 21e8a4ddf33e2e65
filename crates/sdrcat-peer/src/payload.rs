//! Typed payload conversion shared by both coordinators.

use sdrcat_frame::{decode_scalar, encode_scalar, Disposition, MetadataItem, Registry};

use crate::message::Metadata;
use crate::outbox::Outbox;

fn is_metadata(disposition: Disposition) -> bool {
    disposition == Disposition::Metadata
}

/// Encode application metadata. Entries that do not resolve to a metadata
/// element, or whose value does not fit its type, are left out.
pub(crate) fn encode_metadata(
    registry: &Registry,
    metadata: &Metadata,
    out: &mut Outbox,
) -> Vec<MetadataItem> {
    let mut items = Vec::with_capacity(metadata.len());
    for (name, value) in metadata {
        let Some(element) = registry.resolve_name(name, is_metadata) else {
            out.information(format!("dropping unknown metadata '{name}'"));
            continue;
        };
        match encode_scalar(element.data_type, value) {
            Ok(bytes) => items.push(MetadataItem {
                metadata_id: element.element_id,
                value: bytes,
            }),
            Err(err) => out.information(format!("dropping metadata '{name}': {err}")),
        }
    }
    items
}

/// Decode wire metadata. Every item must resolve and decode, otherwise the
/// reason for rejecting the whole block is returned.
pub(crate) fn decode_metadata(
    registry: &Registry,
    items: &[MetadataItem],
) -> Result<Metadata, String> {
    let mut metadata = Metadata::new();
    for item in items {
        let element = registry
            .resolve_id(item.metadata_id, is_metadata)
            .ok_or_else(|| format!("unknown metadata id {}", item.metadata_id))?;
        let value = decode_scalar(element.data_type, &item.value)
            .map_err(|err| format!("metadata '{}': {err}", element.name))?;
        metadata.insert(element.name.clone(), value);
    }
    Ok(metadata)
}
