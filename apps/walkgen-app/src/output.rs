//! Sample writers.

use std::io::Write;

use clap::ValueEnum;
use serde::Serialize;

use walkgen_core::types::Sample;

/// Output encoding of the collected samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// One flat row per sample with a header.
    #[default]
    Csv,
    /// One JSON object per line, full sample.
    Jsonl,
}

/// Flat CSV record of one sample.
#[derive(Debug, Serialize)]
struct Row {
    time: f64,
    zmp_x: f64,
    zmp_y: f64,
    zmp_z: f64,
    com_x: f64,
    com_y: f64,
    com_z: f64,
    com_dx: f64,
    com_dy: f64,
    com_yaw: f64,
    left_x: f64,
    left_y: f64,
    left_z: f64,
    left_theta: f64,
    left_omega: f64,
    left_type: i32,
    right_x: f64,
    right_y: f64,
    right_z: f64,
    right_theta: f64,
    right_omega: f64,
    right_type: i32,
}

impl From<&Sample> for Row {
    fn from(s: &Sample) -> Self {
        let (l, r) = (&s.left_foot, &s.right_foot);
        Self {
            time: s.zmp.time,
            zmp_x: s.zmp.x,
            zmp_y: s.zmp.y,
            zmp_z: s.zmp.z,
            com_x: s.com.x[0],
            com_y: s.com.y[0],
            com_z: s.com.z[0],
            com_dx: s.com.x[1],
            com_dy: s.com.y[1],
            com_yaw: s.com.yaw[0],
            left_x: l.position.x,
            left_y: l.position.y,
            left_z: l.position.z,
            left_theta: l.theta,
            left_omega: l.omega,
            left_type: l.step_type.code(),
            right_x: r.position.x,
            right_y: r.position.y,
            right_z: r.position.z,
            right_theta: r.theta,
            right_omega: r.omega,
            right_type: r.step_type.code(),
        }
    }
}

pub fn write_csv<W: Write>(samples: &[Sample], writer: W) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for sample in samples {
        wtr.serialize(Row::from(sample))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json_lines<W: Write>(samples: &[Sample], mut writer: W) -> Result<(), serde_json::Error> {
    for sample in samples {
        serde_json::to_writer(&mut writer, sample)?;
        writer.write_all(b"\n").map_err(serde_json::Error::io)?;
    }
    writer.flush().map_err(serde_json::Error::io)
}
