//! The segmentation worker process (`mrag segment-worker`).
//!
//! Reads one JSON request per line from stdin, segments the text with the
//! jieba dictionary segmenter in precise mode, and writes one JSON reply
//! per line to stdout. A bad request produces an `{"error"}` line; the
//! loop only ends at EOF.

use std::collections::HashSet;
use std::io::{BufRead, Write};

use anyhow::Result;
use jieba_rs::Jieba;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
struct Request {
    text: String,
    #[serde(rename = "stopWords", default)]
    stop_words: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum Reply {
    Result(String),
    Error(String),
}

/// Segment `text`, dropping blank tokens and stop words.
pub fn segment_with(jieba: &Jieba, text: &str, stop_words: &HashSet<&str>) -> String {
    jieba
        .cut(text, false)
        .into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty() && !stop_words.contains(t))
        .collect::<Vec<_>>()
        .join(" ")
}

fn handle_line(jieba: &Jieba, line: &str) -> Reply {
    match serde_json::from_str::<Request>(line) {
        Ok(req) => {
            let stop: HashSet<&str> = req.stop_words.iter().map(String::as_str).collect();
            Reply::Result(segment_with(jieba, &req.text, &stop))
        }
        Err(e) => Reply::Error(format!("invalid request: {}", e)),
    }
}

/// Serve requests from `input` until EOF.
pub fn serve<R: BufRead, W: Write>(jieba: &Jieba, mut input: R, mut output: W) -> Result<()> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if input.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let reply = handle_line(jieba, line);
        serde_json::to_writer(&mut output, &reply)?;
        output.write_all(b"\n")?;
        output.flush()?;
    }
}

/// Entry point for `mrag segment-worker`.
pub fn run() -> Result<()> {
    let jieba = Jieba::new();
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve(&jieba, stdin.lock(), stdout.lock())
}
