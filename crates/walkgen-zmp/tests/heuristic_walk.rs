//! Integration tests for the heuristic ZMP generator.
//!
//! Covers the three-step reference walk, step-count conservation on random
//! sequences, online edits and stairs.

use approx::assert_relative_eq;
use walkgen_core::error::EditError;
use walkgen_core::traits::PatternGenerator;
use walkgen_core::types::{FootAbsolutePosition, FootPose, RelativeFootPosition, StepType, TrajectoryBuffers};
use walkgen_zmp::ZmpDiscretization;
use walkgen_test_utils::{example_steps, max_com_jump, max_foot_jump, random_steps, test_config, tick_range};

const DT: f64 = 0.005;

fn start_feet() -> (FootPose, FootPose) {
    (
        FootPose::new(0.0, 0.095, 0.0, 0.0),
        FootPose::new(0.0, -0.095, 0.0, 0.0),
    )
}

fn discretize(steps: &[RelativeFootPosition]) -> TrajectoryBuffers {
    let mut generator = ZmpDiscretization::new(test_config()).unwrap();
    let (left, right) = start_feet();
    generator.discretize(steps, left, right).unwrap()
}

fn swinging(left: &FootAbsolutePosition, right: &FootAbsolutePosition) -> bool {
    left.step_type == StepType::Swing || right.step_type == StepType::Swing
}

/// `(first sample index, length)` of every run of swinging samples.
fn swing_runs(buffers: &TrajectoryBuffers) -> Vec<(usize, usize)> {
    let mut runs: Vec<(usize, usize)> = Vec::new();
    let mut previous = false;
    for (i, sample) in buffers.iter().enumerate() {
        let now = swinging(&sample.left_foot, &sample.right_foot);
        match (previous, now) {
            (false, true) => runs.push((i, 1)),
            (true, true) => {
                if let Some(run) = runs.last_mut() {
                    run.1 += 1;
                }
            }
            _ => {}
        }
        previous = now;
    }
    runs
}

#[test]
fn three_step_walk() {
    let buffers = discretize(&example_steps());
    // DS 0.2 + 3 x (SS 0.8 + DS 0.2) + final DS 0.2 + end 1.0
    assert_eq!(buffers.len(), 880);
    assert_eq!(swing_runs(&buffers), vec![(40, 160), (240, 160), (440, 160)]);

    let last = buffers.last().unwrap();
    assert_relative_eq!(last.left_foot.position.x, 0.2, epsilon = 1e-9);
    assert_relative_eq!(last.right_foot.position.x, 0.4, epsilon = 1e-9);
    assert_relative_eq!(
        last.left_foot.position.y - last.right_foot.position.y,
        0.19,
        epsilon = 1e-9
    );

    // The CoM settles over the middle of the final stance.
    assert!((last.com.x[0] - 0.3).abs() < 0.02, "com x {}", last.com.x[0]);
    assert!((last.com.y[0] + 0.01).abs() < 0.02, "com y {}", last.com.y[0]);
    assert_relative_eq!(last.zmp.x, 0.3, epsilon = 1e-9);
}

#[test]
fn zmp_sits_on_the_support_foot_in_single_support() {
    let buffers = discretize(&example_steps());
    let mut checked = 0;
    for sample in buffers.iter() {
        let support = match (sample.left_foot.step_type, sample.right_foot.step_type) {
            (StepType::Swing, _) => sample.right_foot,
            (_, StepType::Swing) => sample.left_foot,
            _ => continue,
        };
        assert_eq!(sample.zmp.step_type, StepType::Support);
        assert_relative_eq!(sample.zmp.x, support.position.x, epsilon = 1e-12);
        assert_relative_eq!(sample.zmp.y, support.position.y, epsilon = 1e-12);
        checked += 1;
    }
    assert_eq!(checked, 480);
}

#[test]
fn every_step_gets_one_swing() {
    for seed in [1, 7, 42] {
        let steps = random_steps(8, seed);
        let buffers = discretize(&steps);
        let runs = swing_runs(&buffers);
        assert_eq!(runs.len(), 8, "seed {seed}");
        assert!(runs.iter().all(|&(_, len)| len == 160));
        // Swinging feet alternate, starting on the right.
        for (j, &(first, _)) in runs.iter().enumerate() {
            let sample = buffers.get(first).unwrap();
            let expected_right = j % 2 == 0;
            assert_eq!(sample.right_foot.step_type == StepType::Swing, expected_right);
        }
    }
}

#[test]
fn trajectories_are_continuous() {
    let buffers = discretize(&random_steps(6, 3));
    assert!(max_foot_jump(&buffers.left_foot) < 0.01);
    assert!(max_foot_jump(&buffers.right_foot) < 0.01);
    assert!(max_com_jump(&buffers.com) < 0.01);
}

#[test]
fn feet_return_to_the_ground_on_flat_steps() {
    let buffers = discretize(&example_steps());
    let mut apex: f64 = 0.0;
    for foot in buffers.left_foot.iter().chain(buffers.right_foot.iter()) {
        if foot.step_type == StepType::Swing {
            assert!(foot.position.z >= -1e-12);
            apex = apex.max(foot.position.z);
        } else {
            assert_eq!(foot.position.z, 0.0);
        }
    }
    assert!(apex > 0.069 && apex < 0.0701, "apex {apex}");
}

#[test]
fn stairs_raise_feet_and_com() {
    let steps = [
        RelativeFootPosition::with_height(0.0, -0.095, 0.05, 0.0),
        RelativeFootPosition::with_height(0.25, 0.19, 0.05, 0.0),
        RelativeFootPosition::with_height(0.25, -0.19, 0.05, 0.0),
    ];
    let buffers = discretize(&steps);
    let last = buffers.last().unwrap();
    assert_relative_eq!(last.left_foot.position.z, 0.1, epsilon = 1e-12);
    assert_relative_eq!(last.right_foot.position.z, 0.15, epsilon = 1e-12);
    assert_relative_eq!(last.com.z[0], 0.814 + 0.125, epsilon = 1e-12);
    // Each swing clears the higher of its two footholds.
    let highest = buffers
        .right_foot
        .iter()
        .map(|f| f.position.z)
        .fold(0.0, f64::max);
    assert!(highest > 0.15 + 0.06);
}

#[test]
fn ticking_matches_one_shot_discretization() {
    let reference = discretize(&example_steps());
    let mut generator = ZmpDiscretization::new(test_config()).unwrap();
    let (left, right) = start_feet();
    generator
        .init_online(0.0, left, right, &example_steps())
        .unwrap();
    generator.finish();
    let reports = tick_range(&mut generator, 0, 880, DT);
    assert!(reports.iter().all(|r| r.samples == 1));
    assert_eq!(generator.name(), "heuristic-zmp");
    let online = generator.drain();
    assert_eq!(online.len(), reference.len());
    assert!(online.iter().zip(reference.iter()).all(|(a, b)| *a == b));
}

#[test]
fn late_landing_change_is_refused() {
    let mut generator = ZmpDiscretization::new(test_config()).unwrap();
    let (left, right) = start_feet();
    generator
        .init_online(0.0, left, right, &example_steps())
        .unwrap();
    // Half-way through the second swing.
    tick_range(&mut generator, 0, 301, DT);
    let len = generator.buffers().len();
    let last = generator.buffers().last();

    let result = generator.online_foot_change(0.5, FootPose::new(0.1, -0.1, 0.0, 0.0));
    assert_eq!(result, Err(EditError::OutsideModifiableWindow { time: 0.5 }));
    assert_eq!(result.unwrap_err().status_code(), -1);
    assert_eq!(generator.buffers().len(), len);
    assert_eq!(generator.buffers().last(), last);
    assert_eq!(generator.steps(), example_steps().as_slice());
}

#[test]
fn pending_landing_change_moves_the_foot() {
    let mut generator = ZmpDiscretization::new(test_config()).unwrap();
    let (left, right) = start_feet();
    generator
        .init_online(0.0, left, right, &example_steps())
        .unwrap();
    tick_range(&mut generator, 0, 301, DT);

    let target = FootPose::new(0.45, -0.12, 0.0, 0.1);
    let start = generator.online_foot_change(2.5, target).unwrap();
    assert_relative_eq!(start, 2.2, epsilon = 1e-9);

    generator.finish();
    tick_range(&mut generator, 301, 880, DT);
    let last = generator.buffers().last().unwrap();
    assert_relative_eq!(last.right_foot.position.x, 0.45, epsilon = 1e-9);
    assert_relative_eq!(last.right_foot.position.y, -0.12, epsilon = 1e-9);
    assert_relative_eq!(last.right_foot.theta, 0.1, epsilon = 1e-9);
}

#[test]
fn steps_added_online_are_walked() {
    let mut generator = ZmpDiscretization::new(test_config()).unwrap();
    let (left, right) = start_feet();
    let steps = example_steps();
    generator.init_online(0.0, left, right, &steps[..1]).unwrap();
    tick_range(&mut generator, 0, 100, DT);
    for step in &steps[1..] {
        generator.online_add_foot(*step).unwrap();
    }
    generator.finish();
    let end = generator.plan_end().unwrap();
    assert_relative_eq!(end, 4.4, epsilon = 1e-9);
    tick_range(&mut generator, 100, 880, DT);

    let mut buffers = TrajectoryBuffers::default();
    for sample in generator.drain() {
        buffers.push(sample);
    }
    assert_eq!(swing_runs(&buffers).len(), 3);
    let last = buffers.last().unwrap();
    assert_relative_eq!(last.right_foot.position.x, 0.4, epsilon = 1e-9);
}
