use serde::Deserialize;
use tracing::debug;

use crate::ocr::Detection;

use super::geom::{hcenter, vcenter};

pub const DEFAULT_LINE_THRESHOLD: f32 = 10.0;

/// How detections are clustered into text lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LineGrouping {
    /// A detection joins the first line holding any member within the
    /// threshold, so a line can drift downwards through chained members.
    #[default]
    Greedy,
    /// A detection joins a line only when within the threshold of the line's
    /// mean vertical center.
    Anchored,
}

impl LineGrouping {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineGrouping::Greedy => "greedy",
            LineGrouping::Anchored => "anchored",
        }
    }
}

struct LineGroup {
    centers: Vec<f32>,
    members: Vec<Detection>,
}

impl LineGroup {
    fn new(center: f32, detection: Detection) -> Self {
        Self {
            centers: vec![center],
            members: vec![detection],
        }
    }

    fn accepts(&self, center: f32, threshold: f32, grouping: LineGrouping) -> bool {
        let distance = match grouping {
            LineGrouping::Greedy => self
                .centers
                .iter()
                .map(|value| (center - value).abs())
                .fold(f32::INFINITY, f32::min),
            LineGrouping::Anchored => {
                let mean = self.centers.iter().sum::<f32>() / self.centers.len() as f32;
                (center - mean).abs()
            }
        };
        distance < threshold
    }

    fn push(&mut self, center: f32, detection: Detection) {
        self.centers.push(center);
        self.members.push(detection);
    }
}

/// Orders detections top-to-bottom by line, then left-to-right within a line.
pub fn reconstruct(
    detections: Vec<Detection>,
    line_threshold: f32,
    grouping: LineGrouping,
) -> Vec<Detection> {
    let mut sorted = detections
        .into_iter()
        .map(|detection| (vcenter(&detection.bbox), detection))
        .collect::<Vec<_>>();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut lines: Vec<LineGroup> = Vec::new();
    for (center, detection) in sorted {
        match lines
            .iter_mut()
            .find(|line| line.accepts(center, line_threshold, grouping))
        {
            Some(line) => line.push(center, detection),
            None => lines.push(LineGroup::new(center, detection)),
        }
    }

    debug!(
        "reading order: {} line(s) via {} grouping",
        lines.len(),
        grouping.as_str()
    );

    lines
        .into_iter()
        .flat_map(|line| {
            let mut members = line.members;
            members.sort_by(|a, b| hcenter(&a.bbox).total_cmp(&hcenter(&b.bbox)));
            members
        })
        .collect()
}
