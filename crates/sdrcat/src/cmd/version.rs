use sdrcat_frame::PROTOCOL_VERSION;
use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct VersionInfo {
    name: &'static str,
    version: &'static str,
    protocol_version: u8,
    target: &'static str,
    target_os: &'static str,
    target_arch: &'static str,
    features: Features,
}

#[derive(Serialize)]
struct Features {
    peer: bool,
    r#async: bool,
    cli: bool,
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    if !args.extended {
        println!("sdrcat {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let info = VersionInfo {
        name: "sdrcat",
        version: env!("CARGO_PKG_VERSION"),
        protocol_version: PROTOCOL_VERSION,
        target: option_env!("SDRCAT_BUILD_TARGET").unwrap_or("unknown"),
        target_os: std::env::consts::OS,
        target_arch: std::env::consts::ARCH,
        features: Features {
            peer: cfg!(feature = "peer"),
            r#async: cfg!(feature = "async"),
            cli: true,
        },
    };

    if matches!(format, OutputFormat::Json) {
        println!(
            "{}",
            serde_json::to_string(&info).unwrap_or_else(|_| "{}".to_string())
        );
        return Ok(SUCCESS);
    }

    println!("name: {}", info.name);
    println!("version: {}", info.version);
    println!("protocol_version: {}", info.protocol_version);
    println!("target: {}", info.target);
    println!("target_os: {}", info.target_os);
    println!("target_arch: {}", info.target_arch);
    println!(
        "features: peer={}, async={}, cli={}",
        info.features.peer, info.features.r#async, info.features.cli
    );

    Ok(SUCCESS)
}
