use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use logmux_driver::{LogMessage, PartialMetadata};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    producer_id: &'a str,
    source: &'a str,
    timestamp: String,
    line: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    partial: Option<&'a PartialMetadata>,
}

pub fn print_message(message: &LogMessage, producer_id: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                producer_id,
                source: &message.source,
                timestamp: message.timestamp.to_rfc3339(),
                line: line_text(&message.line),
                partial: message.partial.as_ref(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TIME", "SOURCE", "PRODUCER", "LINE"])
                .add_row(vec![
                    message.timestamp.to_rfc3339(),
                    message.source.clone(),
                    producer_id.to_string(),
                    line_text(&message.line),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let partial = match &message.partial {
                Some(p) => {
                    let last = if p.last { " last" } else { "" };
                    format!(" partial={}#{}{}", p.id, p.ordinal, last)
                }
                None => String::new(),
            };
            println!(
                "{} {} [{}]{} {}",
                message.timestamp.to_rfc3339(),
                message.source,
                producer_id,
                partial,
                line_text(&message.line)
            );
        }
        OutputFormat::Raw => {
            let mut out = std::io::stdout().lock();
            let _ = out.write_all(&message.line);
            if !message.line.ends_with(b"\n") {
                let _ = out.write_all(b"\n");
            }
            let _ = out.flush();
        }
    }
}

fn line_text(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}
