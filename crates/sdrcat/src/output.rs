use std::fmt;
use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use sdrcat_frame::{DeviceInfo, Value, Values};
use sdrcat_peer::{ClientState, Metadata};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Hex,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Something the console or device wants to tell the user.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event<'a> {
    Status {
        state: ClientState,
    },
    DeviceInfo {
        protocol_version: u8,
        elements: usize,
    },
    Property {
        name: &'a str,
        value: &'a Value,
    },
    StreamData {
        stream: &'a str,
        data: &'a Values,
        metadata: &'a Metadata,
    },
    Information {
        text: &'a str,
    },
    Listening {
        addr: String,
    },
    Error {
        message: &'a str,
    },
}

impl fmt::Display for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { state } => write!(f, "Status is now {state}"),
            Self::DeviceInfo {
                protocol_version,
                elements,
            } => write!(
                f,
                "Device enumerated {elements} elements (protocol version {protocol_version})"
            ),
            Self::Property { name, value } => {
                write!(f, "Receiving Property Update: {name} = {value}")
            }
            Self::StreamData {
                stream,
                data,
                metadata,
            } => {
                write!(f, "Receiving Data on {stream}: {data}")?;
                for (name, value) in metadata.iter() {
                    write!(f, " [{name}={value}]")?;
                }
                Ok(())
            }
            Self::Information { text } => write!(f, "Info: {text}"),
            Self::Listening { addr } => write!(f, "Listening on {addr}"),
            Self::Error { message } => write!(f, "Error: {message}"),
        }
    }
}

pub fn print_event(event: &Event<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(event),
        OutputFormat::Table | OutputFormat::Pretty | OutputFormat::Hex => println!("{event}"),
    }
}

pub fn print_elements(info: &DeviceInfo, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(info),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ID", "NAME", "TYPE", "DISPOSITION"]);
            for element in &info.elements {
                table.add_row(vec![
                    element.element_id.to_string(),
                    element.name.clone(),
                    element.data_type.to_string(),
                    element.disposition.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Hex => {
            for element in &info.elements {
                println!(
                    "{}: {}, {}",
                    element.name, element.data_type, element.disposition
                );
            }
        }
    }
}

/// One decoded frame from a capture.
#[derive(Debug, Serialize)]
pub struct FrameReport {
    pub index: usize,
    pub offset: usize,
    pub length: usize,
    pub sections: Vec<SectionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub header: Vec<u8>,
    #[serde(skip)]
    pub body: Vec<u8>,
}

#[derive(Debug, Serialize)]
pub struct SectionReport {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    pub detail: String,
}

pub fn print_frames(reports: &[FrameReport], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for report in reports {
                print_json(report);
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "OFFSET", "LEN", "SECTION", "ELEMENT", "DETAIL"]);
            for report in reports {
                if let Some(err) = &report.error {
                    table.add_row(vec![
                        report.index.to_string(),
                        report.offset.to_string(),
                        report.length.to_string(),
                        "<error>".to_string(),
                        String::new(),
                        err.clone(),
                    ]);
                }
                for section in &report.sections {
                    table.add_row(vec![
                        report.index.to_string(),
                        report.offset.to_string(),
                        report.length.to_string(),
                        section.kind.clone(),
                        section_element(section),
                        section.detail.clone(),
                    ]);
                }
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for report in reports {
                println!(
                    "frame {} @{} ({} bytes)",
                    report.index, report.offset, report.length
                );
                if let Some(err) = &report.error {
                    println!("  error: {err}");
                }
                for section in &report.sections {
                    println!(
                        "  {} {} {}",
                        section.kind,
                        section_element(section),
                        section.detail
                    );
                }
            }
        }
        OutputFormat::Hex => {
            for report in reports {
                println!(
                    "frame {} @{} ({} bytes)",
                    report.index, report.offset, report.length
                );
                println!("  header  {}", hex_string(&report.header));
                for (row, chunk) in report.body.chunks(16).enumerate() {
                    println!("  {:06x}  {}", row * 16, hex_string(chunk));
                }
            }
        }
    }
}

/// Space-separated lowercase hex pairs.
pub fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn section_element(section: &SectionReport) -> String {
    match (&section.element, section.element_id) {
        (Some(name), Some(id)) => format!("{name} ({id})"),
        (None, Some(id)) => id.to_string(),
        _ => String::new(),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}
