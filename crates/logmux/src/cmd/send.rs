use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use chrono::Utc;
use logmux_frame::{FrameWriter, LogEntry};
use tracing::debug;

use crate::cmd::SendArgs;
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};

pub fn run(args: SendArgs) -> CliResult<i32> {
    let input: Box<dyn BufRead> = match &args.file {
        Some(path) => {
            let file = File::open(path).map_err(|err| {
                io_error(&format!("failed reading {}", path.display()), err)
            })?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(io::stdin().lock()),
    };

    let mut writer = FrameWriter::new(open_output(&args.path)?);
    let sent = send_lines(input, &mut writer, &args.source)?;
    debug!(path = %args.path.display(), frames = sent, "send complete");

    Ok(SUCCESS)
}

/// Opens a FIFO (blocking until a reader shows up) or appends to a file.
fn open_output(path: &Path) -> CliResult<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| io_error(&format!("failed opening {}", path.display()), err))
}

fn send_lines<R: BufRead, W: Write>(
    input: R,
    writer: &mut FrameWriter<W>,
    source: &str,
) -> CliResult<usize> {
    let mut sent = 0usize;
    for line in input.split(b'\n') {
        let mut line = line.map_err(|err| io_error("failed reading input", err))?;
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        let time_nano = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
        writer
            .write_entry(&LogEntry::new(source, line, time_nano))
            .map_err(|err| frame_error("send failed", err))?;
        sent = sent.saturating_add(1);
    }
    Ok(sent)
}
