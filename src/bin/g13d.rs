/* Copyright (C) 2026 g13d contributors
 *
 * This file is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This file is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this file.  If not, see <http://www.gnu.org/licenses/>.
 */

#[macro_use]
extern crate log;

use clap::{App, Arg};
use g13d::sink::{EventSink, Sink};
use g13d::supervisor::Supervisor;
use g13d::{built_info, logging, RUNNING};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn main() {
    logging::setup_logging();

    let version_info = format!(
        "{}{}",
        built_info::PKG_VERSION,
        built_info::GIT_VERSION
            .map(|v| format!(" (git {})", v))
            .unwrap_or_default(),
    );

    let matches = App::new("g13d")
        .version(version_info.as_str())
        .author("g13d contributors")
        .about("Adopts Logitech G13 keypads as virtual keyboards/gamepads")
        .arg(
            Arg::with_name("editor")
                .long("editor")
                .value_name("PATH")
                .help("Path to an external bindings editor (reserved, not yet launched)")
                .takes_value(true),
        )
        .get_matches();

    if let Some(editor) = matches.value_of("editor") {
        debug!("editor path configured but unused: {}", editor);
    }

    info!(
        "g13d {} built for {} by rustc {} ({} profile)",
        built_info::PKG_VERSION,
        built_info::TARGET,
        built_info::RUSTC_VERSION,
        built_info::PROFILE,
    );

    ctrlc::set_handler(move || {
        info!("shutdown requested");
        RUNNING.store(false, Ordering::SeqCst);
    })
    .expect("failed to install signal handler");

    let sink: Arc<dyn EventSink> = match Sink::create() {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            error!("failed to create virtual input sink: {}", e);
            std::process::exit(1);
        }
    };

    let supervisor = match Supervisor::new(sink) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!("failed to initialize USB context: {}", e);
            std::process::exit(1);
        }
    };

    supervisor.run();
    info!("g13d exiting");
}
