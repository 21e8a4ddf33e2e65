use std::io::Read;

use sdrcat_frame::codec::frame_body;
use sdrcat_frame::value::parse_hex;
use sdrcat_frame::{
    decode_scalar, decode_vector, Frame, FrameReassembler, Registry, Section, HEADER_SIZE,
};
use tracing::{debug, warn};

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{hex_string, print_frames, FrameReport, OutputFormat, SectionReport};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let input = read_input(&args)?;
    let (reports, trailing) = decode_capture(&input);
    print_frames(&reports, format);

    let failed = reports.iter().filter(|r| r.error.is_some()).count();
    if trailing > 0 {
        warn!(bytes = trailing, "capture ends inside a frame");
    }
    if failed > 0 || trailing > 0 {
        return Err(CliError::new(
            DATA_INVALID,
            format!(
                "{failed} of {} frames failed to decode, {trailing} trailing bytes",
                reports.len()
            ),
        ));
    }
    Ok(SUCCESS)
}

fn read_input(args: &DecodeArgs) -> CliResult<Vec<u8>> {
    if let Some(hex) = &args.hex {
        return parse_hex(hex).map_err(|err| frame_error("invalid --hex", err));
    }
    if let Some(path) = &args.file {
        return std::fs::read(path)
            .map_err(|err| io_error(&format!("cannot read {}", path.display()), err));
    }

    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .map_err(|err| io_error("cannot read stdin", err))?;
    parse_hex(&text).map_err(|err| frame_error("invalid hex on stdin", err))
}

/// Split `input` into frames and describe each one.
///
/// Property and stream payloads are decoded against the most recent
/// enumeration seen earlier in the same capture. Returns the reports and
/// the number of bytes left over after the last complete frame.
pub(crate) fn decode_capture(input: &[u8]) -> (Vec<FrameReport>, usize) {
    let mut reassembler = FrameReassembler::new();
    reassembler.feed(input);

    let mut registry = Registry::new();
    let mut reports = Vec::new();
    loop {
        let offset = input.len() - reassembler.buffered_len();
        let result = reassembler.next_frame();
        let length = input.len() - reassembler.buffered_len() - offset;
        let raw = &input[offset..offset + length];

        let (sections, error) = match result {
            Ok(Some(frame)) => (describe_frame(&frame, &mut registry), None),
            Ok(None) => break,
            Err(err) => (Vec::new(), Some(err.to_string())),
        };
        reports.push(FrameReport {
            index: reports.len(),
            offset,
            length,
            sections,
            error,
            header: raw[..raw.len().min(HEADER_SIZE)].to_vec(),
            body: frame_body(raw).to_vec(),
        });
        if length == 0 {
            break;
        }
    }
    debug!(frames = reports.len(), "capture decoded");
    (reports, reassembler.buffered_len())
}

fn describe_frame(frame: &Frame, registry: &mut Registry) -> Vec<SectionReport> {
    frame
        .sections
        .iter()
        .map(|section| describe_section(section, registry))
        .collect()
}

fn describe_section(section: &Section, registry: &mut Registry) -> SectionReport {
    let kind = format!("{:?}", section.section_type());
    match section {
        Section::Command(_) => SectionReport {
            kind,
            element_id: None,
            element: None,
            detail: String::new(),
        },
        Section::GetProperty { element_id } => SectionReport {
            kind,
            element_id: Some(*element_id),
            element: element_name(registry, *element_id),
            detail: String::new(),
        },
        Section::PropertyValue(pv) => {
            let detail = match registry.find_by_id(pv.element_id) {
                Some(element) => decode_scalar(element.data_type, &pv.value)
                    .map(|value| value.to_string())
                    .unwrap_or_else(|err| format!("<{err}>")),
                None => hex_string(&pv.value),
            };
            SectionReport {
                kind,
                element_id: Some(pv.element_id),
                element: element_name(registry, pv.element_id),
                detail,
            }
        }
        Section::DataTransfer(dt) => {
            let mut detail = match registry.find_by_id(dt.element_id) {
                Some(element) => decode_vector(element.data_type, &dt.data)
                    .map(|values| values.to_string())
                    .unwrap_or_else(|err| format!("<{err}>")),
                None => hex_string(&dt.data),
            };
            for item in &dt.metadata {
                let value = match registry.find_by_id(item.metadata_id) {
                    Some(element) => decode_scalar(element.data_type, &item.value)
                        .map(|value| value.to_string())
                        .unwrap_or_else(|err| format!("<{err}>")),
                    None => hex_string(&item.value),
                };
                let name = element_name(registry, item.metadata_id)
                    .unwrap_or_else(|| item.metadata_id.to_string());
                detail.push_str(&format!(" [{name}={value}]"));
            }
            SectionReport {
                kind,
                element_id: Some(dt.element_id),
                element: element_name(registry, dt.element_id),
                detail,
            }
        }
        Section::Enumeration(enumeration) => {
            *registry = Registry::from(enumeration.clone());
            let names: Vec<String> = enumeration
                .elements
                .iter()
                .map(|e| format!("{}:{}:{}", e.name, e.data_type, e.disposition))
                .collect();
            SectionReport {
                kind,
                element_id: None,
                element: None,
                detail: format!(
                    "version {} [{}]",
                    enumeration.protocol_version,
                    names.join(", ")
                ),
            }
        }
    }
}

fn element_name(registry: &Registry, id: u16) -> Option<String> {
    registry.find_by_id(id).map(|e| e.name.clone())
}
