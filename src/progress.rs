//! Progress reporting seam. The pipeline announces how many rows a section
//! will write before rendering starts, then ticks once per written row.

use std::collections::BTreeMap;

use log::info;

pub trait ProgressSink {
    fn set_total(&mut self, section: &str, count: usize);
    fn increment(&mut self, section: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn set_total(&mut self, _section: &str, _count: usize) {}
    fn increment(&mut self, _section: &str) {}
}

/// Logs every tenth of a section, plus its completion.
#[derive(Debug, Default)]
pub struct LogProgress {
    sections: BTreeMap<String, (usize, usize)>,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for LogProgress {
    fn set_total(&mut self, section: &str, count: usize) {
        info!("[{section}] writing {count} row(s)");
        self.sections.insert(section.to_string(), (0, count));
    }

    fn increment(&mut self, section: &str) {
        let (done, total) = self.sections.entry(section.to_string()).or_default();
        *done += 1;
        let step = (*total / 10).max(1);
        if *done == *total || *done % step == 0 {
            info!("[{section}] {done}/{total} row(s) written");
        }
    }
}
