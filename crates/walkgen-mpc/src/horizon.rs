//! Turn a support preview into the per-sample data of the QP.

use nalgebra::{Rotation2, Vector2, Vector3};

use walkgen_core::error::GenerationError;
use walkgen_core::types::{Foot, FootPair, FootPose, ReferenceVelocity, SupportState};

use crate::dynamics::step_count;
use crate::polygon::{FeasibilityRegions, LinearConstraints, linearize};
use crate::types::{AffinePoint, PreviewHorizon, ZmpBound, ZmpRegion};

/// State of the robot at the replan instant.
#[derive(Clone, Debug)]
pub struct HorizonInputs<'a> {
    /// Current support state.
    pub support: &'a SupportState,
    /// Previewed support states, one per sample.
    pub states: &'a [SupportState],
    /// Ground poses of both feet. A swinging foot is given at its target.
    pub feet: FootPair<FootPose>,
    pub trunk_yaw: f64,
    pub reference: ReferenceVelocity,
    pub state_x: Vector3<f64>,
    pub state_y: Vector3<f64>,
    /// Landing pose the first new step is committed to.
    pub pinned_step: Option<FootPose>,
}

/// Sampling of the horizon.
#[derive(Clone, Copy, Debug)]
pub struct HorizonTiming {
    /// QP sample period.
    pub period: f64,
    /// Control ticks per sample period.
    pub ticks: usize,
}

fn position(pose: &FootPose) -> Vector2<f64> {
    Vector2::new(pose.x, pose.y)
}

/// Build the horizon.
///
/// Samples still on the current step get a known anchor: the support foot in
/// single support, the middle of the feet in double support. Samples on new
/// step `k` are tied to its decision `f_k`, rotated by the yaw the trunk is
/// predicted to have when that step starts; double support after it sits
/// midway between `f_k` and `f_{k-1}`.
///
/// ZMP bounds are laid on every control tick. Over the sample period that
/// ends on a support change the region slides from the old support to the
/// new one.
pub fn build_horizon(
    regions: &FeasibilityRegions,
    inputs: &HorizonInputs<'_>,
    timing: HorizonTiming,
    neutral_offset: Vector2<f64>,
) -> Result<PreviewHorizon, GenerationError> {
    let feet = &inputs.feet;
    let n = inputs.states.len();
    let k_steps = step_count(inputs.states);
    let period = timing.period;
    let trunk_yaw_at = |i: usize| inputs.trunk_yaw + inputs.reference.yaw * (i + 1) as f64 * period;

    // Support foot of step 0.
    let first_foot = if inputs.support.is_double_support() {
        inputs
            .states
            .iter()
            .find(|s| !s.is_double_support() && s.step_number == 0)
            .map_or(inputs.support.foot, |s| s.foot)
    } else {
        inputs.support.foot
    };
    let first_pose = feet.get(first_foot);
    let pinned = inputs.pinned_step.filter(|_| k_steps > 0);

    let mut step_yaws = vec![first_pose.theta];
    let mut step_feet: Vec<Foot> = vec![first_foot];
    for k in 1..=k_steps {
        let i = inputs
            .states
            .iter()
            .position(|s| s.step_number as usize == k)
            .unwrap_or(0);
        let yaw = match pinned {
            Some(pose) if k == 1 => pose.theta,
            _ => trunk_yaw_at(i),
        };
        step_yaws.push(yaw);
        step_feet.push(inputs.states[i].foot);
    }

    let reach = (1..=k_steps)
        .map(|k| linearize(&regions.reach_local(step_yaws[k - 1], step_feet[k - 1])))
        .collect::<Result<Vec<_>, _>>()?;

    let first_support = AffinePoint::fixed(position(first_pose));
    let region_of = |state: &SupportState| {
        let (anchor, yaw) = match state.step_number as usize {
            0 if state.is_double_support() => (
                AffinePoint::fixed((position(&feet.left) + position(&feet.right)) / 2.0),
                (feet.left.theta + feet.right.theta) / 2.0,
            ),
            0 => {
                let pose = feet.get(state.foot);
                (AffinePoint::fixed(position(pose)), pose.theta)
            }
            k if state.is_double_support() => {
                let previous = if k == 1 {
                    first_support.clone()
                } else {
                    AffinePoint::step(k - 2)
                };
                (
                    AffinePoint::step(k - 1).lerp(&previous, 0.5),
                    (step_yaws[k] + step_yaws[k - 1]) / 2.0,
                )
            }
            k => (AffinePoint::step(k - 1), step_yaws[k]),
        };
        ZmpRegion {
            local: regions.zmp_local(yaw, state),
            anchor,
            yaw,
        }
    };

    let supports: Vec<ZmpRegion> = std::iter::once(inputs.support)
        .chain(inputs.states)
        .map(region_of)
        .collect();
    let edges = supports
        .iter()
        .map(|r| linearize(&r.local))
        .collect::<Result<Vec<_>, _>>()?;
    let centering = supports[1..].iter().map(|r| r.centre(neutral_offset)).collect();

    let ticks = timing.ticks.max(1);
    let mut zmp = Vec::with_capacity(n * ticks);
    for (j, state) in inputs.states.iter().enumerate() {
        for m in 1..=ticks {
            let bound = if m == ticks {
                bound_of(&edges[j + 1], &supports[j + 1])
            } else if state.state_changed {
                let s = m as f64 / ticks as f64;
                let blended = supports[j].blend(&supports[j + 1], s);
                ZmpBound {
                    edges: linearize(&blended.local)?,
                    anchor: blended.anchor,
                }
            } else {
                bound_of(&edges[j], &supports[j])
            };
            zmp.push(bound);
        }
    }

    let (vx, vy) = (inputs.reference.x, inputs.reference.y);
    let reference = (0..n)
        .map(|i| Rotation2::new(trunk_yaw_at(i)) * Vector2::new(vx, vy))
        .collect();

    Ok(PreviewHorizon {
        states: inputs.states.to_vec(),
        regions: supports,
        centering,
        zmp,
        reach,
        step_yaws: step_yaws[1..].to_vec(),
        first_support: position(first_pose),
        pinned_step: pinned.map(|pose| position(&pose)),
        reference,
        state_x: inputs.state_x,
        state_y: inputs.state_y,
    })
}

fn bound_of(edges: &LinearConstraints, region: &ZmpRegion) -> ZmpBound {
    ZmpBound {
        edges: edges.clone(),
        anchor: region.anchor.clone(),
    }
}
