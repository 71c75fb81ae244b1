// Copyright (c) 2026 the hls-fetchd contributors
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Thin, non-interactive driver: download one playlist from the command
//! line and exit. This is deliberately not a front-end — no prompts, no
//! progress UI beyond periodic log lines — the engine's public surface is
//! [`hls_fetchd::TaskManager`], consumed here the same way a caller embedding
//! this crate would.

use std::time::Duration;

use tracing::info;

use hls_fetchd::task::{OutputFormat, TaskOptionsInput};
use hls_fetchd::{Config, TaskManager, TaskStatus};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config.toml: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };
    hls_fetchd::logging::init(&config);

    let mut args = std::env::args().skip(1);
    let Some(url) = args.next() else {
        eprintln!("usage: hls-fetchd <playlist-url> [--mp4] [--title NAME]");
        return std::process::ExitCode::FAILURE;
    };

    let mut output_format = OutputFormat::Ts;
    let mut title = String::new();
    while let Some(flag) = args.next() {
        match flag.as_str() {
            "--mp4" => output_format = OutputFormat::Mp4,
            "--title" => title = args.next().unwrap_or_default(),
            other => {
                eprintln!("unrecognised flag: {other}");
                return std::process::ExitCode::FAILURE;
            }
        }
    }

    let manager = match TaskManager::new(&config) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("failed to build HTTP client: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let input = TaskOptionsInput {
        url,
        title,
        output_format,
        ..Default::default()
    };

    let id = match manager.create(input) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("invalid task: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    if let Err(e) = manager.start(&id) {
        eprintln!("failed to start task: {e}");
        return std::process::ExitCode::FAILURE;
    }

    loop {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let snapshot = match manager.snapshot(&id) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("task disappeared: {e}");
                return std::process::ExitCode::FAILURE;
            }
        };

        info!(
            status = %snapshot.status,
            progress = format!("{:.1}%", snapshot.progress * 100.0),
            speed_bps = snapshot.speed_bps,
            eta_seconds = snapshot.eta_seconds,
            "{}",
            snapshot.message
        );

        if snapshot.status.is_terminal() {
            match snapshot.status {
                TaskStatus::Completed | TaskStatus::Forced => {
                    if let Some(path) = snapshot.output_path {
                        println!("{path}");
                    }
                    return std::process::ExitCode::SUCCESS;
                }
                _ => {
                    eprintln!("{}", snapshot.message);
                    return std::process::ExitCode::FAILURE;
                }
            }
        }
    }
}
