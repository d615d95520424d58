// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Progress reporting capability.
//!
//! The sender registers each outgoing file and reports cumulative payload
//! bytes through these traits; rendering is the caller's concern, and a
//! no-op sink is always acceptable.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Per-file byte counter handle.
pub trait Bar: Send {
    /// Report `n` additional payload bytes transmitted successfully.
    fn add(&mut self, n: usize);
}

/// Factory for per-file counters.
pub trait Progress: Send {
    /// Register a file of `len` bytes and return its counter.
    fn create(&mut self, name: &str, len: usize) -> Box<dyn Bar>;

    /// Release any rendering resources.
    fn shutdown(&mut self);
}

// ============================================================================
// No-op Sink
// ============================================================================

/// Sink that ignores all reports.
pub struct NoProgress;

struct NoBar;

impl Bar for NoBar {
    fn add(&mut self, _n: usize) {}
}

impl Progress for NoProgress {
    fn create(&mut self, _name: &str, _len: usize) -> Box<dyn Bar> {
        Box::new(NoBar)
    }

    fn shutdown(&mut self) {}
}

// ============================================================================
// Terminal Renderer
// ============================================================================

/// Terminal renderer drawing one indicatif bar per registered file.
pub struct TermProgress {
    multi: MultiProgress,
    bars: Vec<ProgressBar>,
}

struct TermBar {
    bar: ProgressBar,
}

impl TermProgress {
    pub fn new() -> Self {
        TermProgress {
            multi: MultiProgress::new(),
            bars: Vec::new(),
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%)")
            .unwrap()
            .progress_chars("=>-")
    }
}

impl Default for TermProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Bar for TermBar {
    fn add(&mut self, n: usize) {
        self.bar.inc(n as u64);
    }
}

impl Progress for TermProgress {
    fn create(&mut self, name: &str, len: usize) -> Box<dyn Bar> {
        let bar = self.multi.add(ProgressBar::new(len as u64));
        bar.set_style(Self::style());
        bar.set_message(name.to_string());
        self.bars.push(bar.clone());
        Box::new(TermBar { bar })
    }

    fn shutdown(&mut self) {
        for bar in self.bars.drain(..) {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    }
}
