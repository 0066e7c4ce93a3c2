use std::fs::File;

use logmux_driver::LogMessage;
use logmux_frame::{FrameConfig, FrameReader, DEFAULT_MAX_PAYLOAD};
use tracing::warn;

use crate::cmd::DumpArgs;
use crate::exit::{frame_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: DumpArgs, format: OutputFormat) -> CliResult<i32> {
    let file = File::open(&args.path)
        .map_err(|err| io_error(&format!("failed opening {}", args.path.display()), err))?;
    let config = FrameConfig {
        max_payload_size: args.max_frame_size.unwrap_or(DEFAULT_MAX_PAYLOAD),
    };

    let mut skipped = 0usize;
    for entry in FrameReader::with_config(file, config) {
        match entry {
            Ok(entry) => print_message(&LogMessage::from(entry), &args.id, format),
            Err(err) if err.is_protocol_error() => {
                warn!(path = %args.path.display(), error = %err, "skipping undecodable frame");
                skipped = skipped.saturating_add(1);
            }
            Err(err) => return Err(frame_error("read failed", err)),
        }
    }

    if skipped > 0 {
        return Err(CliError::new(
            DATA_INVALID,
            format!("{skipped} frame(s) in {} could not be decoded", args.path.display()),
        ));
    }
    Ok(SUCCESS)
}
