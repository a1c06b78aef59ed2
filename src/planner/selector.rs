//! Target and release-point selection.
//!
//! A target is picked uniformly at random. If it sits on top of the previous
//! aim point the aim is nudged by a fixed radius in a random direction, so a
//! static scene does not get the identical shot again. The release point is
//! then chosen among the launch points the trajectory model offers.

use std::f64::consts::PI;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::config::SelectionConfig;
use crate::env::{Point, ProjectileType, Region, SceneObject, TrajectoryModel};

/// Where the selector decided to aim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AimSelection {
    /// Center of the chosen target.
    pub target: Point,
    /// The point actually aimed at (the target center, possibly jittered).
    pub aim: Point,
    pub jittered: bool,
}

/// How a release point was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseSource {
    LowArc,
    HighArc,
    /// The model offered exactly one launch point.
    OnlyCandidate,
    /// No launch point reached the target; fixed-angle release.
    AngleFallback,
    /// Forced fallback toward a fresh random target.
    RandomTarget,
    /// Forced fallback at a random angle.
    RandomAngle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseChoice {
    pub point: Point,
    pub source: ReleaseSource,
}

/// Chooses aim points and release points.
#[derive(Debug, Clone)]
pub struct TargetSelector {
    config: SelectionConfig,
}

impl TargetSelector {
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    /// Pick a target and the aim point for it. `None` when no target is
    /// visible.
    pub fn choose_aim<R: Rng + ?Sized>(
        &self,
        targets: &[SceneObject],
        previous_aim: Option<Point>,
        rng: &mut R,
    ) -> Option<AimSelection> {
        let target = targets.choose(rng)?.center();
        let (aim, jittered) = self.jitter_if_repeated(target, previous_aim, rng);
        if jittered {
            debug!(%target, %aim, "target repeats previous aim, jittering");
        }
        Some(AimSelection {
            target,
            aim,
            jittered,
        })
    }

    /// Offset `target` by the jitter radius along a random angle if it lies
    /// within the repeat radius of `previous_aim`.
    pub fn jitter_if_repeated<R: Rng + ?Sized>(
        &self,
        target: Point,
        previous_aim: Option<Point>,
        rng: &mut R,
    ) -> (Point, bool) {
        match previous_aim {
            Some(prev) if prev.distance(&target) < self.config.repeat_aim_radius => {
                let angle = rng.gen::<f64>() * 2.0 * PI;
                let aim = Point::new(
                    target.x + (angle.cos() * self.config.jitter_radius) as i32,
                    target.y + (angle.sin() * self.config.jitter_radius) as i32,
                );
                (aim, true)
            }
            _ => (target, false),
        }
    }

    /// Choose among the model's launch points (low arc first).
    ///
    /// - two candidates, high-arc projectile: high arc
    /// - one candidate: that one
    /// - two candidates otherwise: high arc with probability 1/high_arc_odds
    /// - none: `None`
    pub fn pick_candidate<R: Rng + ?Sized>(
        &self,
        candidates: &[Point],
        projectile: ProjectileType,
        rng: &mut R,
    ) -> Option<ReleaseChoice> {
        match candidates {
            [] => None,
            [only] => Some(ReleaseChoice {
                point: *only,
                source: ReleaseSource::OnlyCandidate,
            }),
            [low, high, ..] => {
                let take_high = projectile.prefers_high_arc()
                    || rng.gen_range(0..self.config.high_arc_odds.max(1)) == 0;
                Some(if take_high {
                    ReleaseChoice {
                        point: *high,
                        source: ReleaseSource::HighArc,
                    }
                } else {
                    ReleaseChoice {
                        point: *low,
                        source: ReleaseSource::LowArc,
                    }
                })
            }
        }
    }

    /// Resolve the release point for `aim`, falling back to a fixed-angle
    /// release when no launch point reaches it. `None` means not even the
    /// fallback could be resolved.
    pub fn resolve_release<T, R>(
        &self,
        trajectory: &T,
        sling: &Region,
        aim: Point,
        projectile: ProjectileType,
        rng: &mut R,
    ) -> Option<ReleaseChoice>
    where
        T: TrajectoryModel + ?Sized,
        R: Rng + ?Sized,
    {
        let candidates = trajectory.estimate_launch_points(sling, aim);
        if let Some(choice) = self.pick_candidate(&candidates, projectile, rng) {
            return Some(choice);
        }

        debug!(
            %aim,
            angle = self.config.fallback_angle_degrees,
            "no launch point reaches the target, trying fixed angle"
        );
        trajectory
            .release_point_for_angle(sling, self.config.fallback_angle_degrees.to_radians())
            .map(|point| ReleaseChoice {
                point,
                source: ReleaseSource::AngleFallback,
            })
    }

    /// Randomized release used once the rejection budget is spent.
    ///
    /// Half the time a fresh random target is aimed at (either arc, evenly);
    /// otherwise the release angle is drawn from `[0, max_angle_degrees)` and
    /// `current_aim` is kept. Returns the release and the aim it is timed
    /// against.
    pub fn forced_fallback<T, R>(
        &self,
        trajectory: &T,
        sling: &Region,
        targets: &[SceneObject],
        current_aim: Point,
        max_angle_degrees: f64,
        rng: &mut R,
    ) -> Option<(ReleaseChoice, Point)>
    where
        T: TrajectoryModel + ?Sized,
        R: Rng + ?Sized,
    {
        if rng.gen_bool(0.5) {
            if let Some(target) = targets.choose(rng) {
                let aim = target.center();
                let candidates = trajectory.estimate_launch_points(sling, aim);
                if let Some(point) = candidates.choose(rng) {
                    debug!(target = %aim, "fallback toward random target");
                    let choice = ReleaseChoice {
                        point: *point,
                        source: ReleaseSource::RandomTarget,
                    };
                    return Some((choice, aim));
                }
            }
        }

        let angle = rng.gen::<f64>() * max_angle_degrees;
        debug!(angle, "fallback at random angle");
        trajectory
            .release_point_for_angle(sling, angle.to_radians())
            .map(|point| {
                let choice = ReleaseChoice {
                    point,
                    source: ReleaseSource::RandomAngle,
                };
                (choice, current_aim)
            })
    }
}
