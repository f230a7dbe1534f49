//! Scouting: the player peeks at an adjacent room without moving there.
//!
//! MUME announces it with an untagged line in the middle of the text, then
//! sends the scouted room with the usual tags. Those must not be taken for
//! the player's position.

use log::{info, warn};
use regex::Regex;
use std::sync::OnceLock;

use crate::markup::SCOUTING_BUDGET;

/// Longest line kept for phrase matching.
const MAX_LINE: usize = 256;

fn start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^You quietly scout (north|east|south|west|up|down)wards\.\.\.\s*$")
            .expect("static regex")
    })
}

fn stop_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^You stop scouting\.\s*$").expect("static regex"))
}

#[derive(Debug, Default)]
pub(crate) struct ScoutingState {
    active: bool,
    bytes: usize,
    line: String,
}

impl ScoutingState {
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Feed decoded text. Phrases are matched on whole lines, so the result
    /// does not depend on how the text was chunked.
    pub fn push_text(&mut self, text: &str) {
        for ch in text.chars() {
            if self.active {
                self.bytes += ch.len_utf8();
                if self.bytes > SCOUTING_BUDGET {
                    warn!("Stopping scouting after {} bytes", self.bytes);
                    self.stop();
                }
            }
            if ch == '\n' {
                self.finish_line();
            } else if self.line.len() < MAX_LINE {
                self.line.push(ch);
            }
        }
    }

    /// A movement means the peek is over (typically scouting a oneway).
    pub fn end_tag(&mut self, name: &str) {
        if self.active && name == "movement" {
            self.stop();
        }
    }

    fn finish_line(&mut self) {
        let line = std::mem::take(&mut self.line);
        if start_re().is_match(&line) {
            info!("Starting to scout, ignoring new rooms");
            self.active = true;
            self.bytes = 0;
        } else if self.active && stop_re().is_match(&line) {
            self.stop();
        }
    }

    fn stop(&mut self) {
        if self.active {
            info!("Scouting over");
        }
        self.active = false;
        self.bytes = 0;
    }
}
