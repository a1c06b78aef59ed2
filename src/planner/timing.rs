//! Tap timing per projectile kind.
//!
//! The tap is expressed as a percentage of the flight time to the aim point.
//! Each [`TapBehaviour`] maps to a fixed percentage or a half-open range to
//! sample from; for some behaviours the range depends on the release angle.
//!
//! | behaviour            | angle       | percent     |
//! |----------------------|-------------|-------------|
//! | instant detonate     | any         | 0           |
//! | angle-sensitive tap  | < 45°       | [70, 80)    |
//! | angle-sensitive tap  | >= 45°      | [80, 90)    |
//! | area burst           | any         | [80, 95)    |
//! | proximity explode    | < 40°       | [90, 100)   |
//! | proximity explode    | >= 40°      | 100         |
//! | split on tap         | any         | [65, 80)    |
//! | default              | any         | 60          |

use rand::Rng;

use crate::env::TapBehaviour;

/// A percentage, or a half-open range of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapWindow {
    Fixed(u32),
    Range { low: u32, high: u32 },
}

impl TapWindow {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        match *self {
            TapWindow::Fixed(pct) => pct,
            TapWindow::Range { low, high } => rng.gen_range(low..high),
        }
    }
}

/// Release angles below `below_degrees` use `window`. `f64::INFINITY`
/// matches every angle.
#[derive(Debug, Clone, Copy)]
struct TapRule {
    behaviour: TapBehaviour,
    below_degrees: f64,
    window: TapWindow,
}

const fn rule(behaviour: TapBehaviour, below_degrees: f64, window: TapWindow) -> TapRule {
    TapRule {
        behaviour,
        below_degrees,
        window,
    }
}

// First matching rule wins.
const TAP_RULES: &[TapRule] = &[
    rule(TapBehaviour::InstantDetonate, f64::INFINITY, TapWindow::Fixed(0)),
    rule(TapBehaviour::AngleSensitiveTap, 45.0, TapWindow::Range { low: 70, high: 80 }),
    rule(TapBehaviour::AngleSensitiveTap, f64::INFINITY, TapWindow::Range { low: 80, high: 90 }),
    rule(TapBehaviour::AreaBurst, f64::INFINITY, TapWindow::Range { low: 80, high: 95 }),
    rule(TapBehaviour::ProximityExplode, 40.0, TapWindow::Range { low: 90, high: 100 }),
    rule(TapBehaviour::ProximityExplode, f64::INFINITY, TapWindow::Fixed(100)),
    rule(TapBehaviour::SplitOnTap, f64::INFINITY, TapWindow::Range { low: 65, high: 80 }),
];

const DEFAULT_WINDOW: TapWindow = TapWindow::Fixed(60);

/// The tap window for a behaviour released at `angle_degrees`.
pub fn tap_window(behaviour: TapBehaviour, angle_degrees: f64) -> TapWindow {
    TAP_RULES
        .iter()
        .find(|r| r.behaviour == behaviour && angle_degrees < r.below_degrees)
        .map(|r| r.window)
        .unwrap_or(DEFAULT_WINDOW)
}

/// Sample a tap percentage for a behaviour released at `angle_degrees`.
pub fn tap_percentage<R: Rng + ?Sized>(
    behaviour: TapBehaviour,
    angle_degrees: f64,
    rng: &mut R,
) -> u32 {
    tap_window(behaviour, angle_degrees).sample(rng)
}
